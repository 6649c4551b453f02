//! Error types for ldguard.

use std::fmt;
use thiserror::Error;

/// Result type for ldguard operations.
pub type DbResult<T> = Result<T, DbError>;

/// The kind of native resource a handle wraps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Resource {
    /// An open database.
    Database,
    /// A point-in-time snapshot.
    Snapshot,
    /// A cursor over the key space.
    Iterator,
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Resource::Database => "database",
            Resource::Snapshot => "snapshot",
            Resource::Iterator => "iterator",
        })
    }
}

/// Classification of a status message reported by the engine.
///
/// The engine renders its status codes as a fixed prefix followed by the
/// detail text; the prefix is all that is needed to recover the code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// A file or record the engine needed does not exist.
    NotFound,
    /// On-disk data failed a consistency or checksum check.
    Corruption,
    /// The engine does not implement the requested feature.
    NotSupported,
    /// The request was rejected (bad options, comparator mismatch, ...).
    InvalidArgument,
    /// The operating system reported an I/O failure.
    Io,
    /// Anything the engine did not tag.
    Other,
}

impl ErrorKind {
    /// Classifies a native status message by its prefix.
    pub fn classify(message: &str) -> Self {
        const PREFIXES: [(&str, ErrorKind); 5] = [
            ("NotFound: ", ErrorKind::NotFound),
            ("Corruption: ", ErrorKind::Corruption),
            ("Not implemented: ", ErrorKind::NotSupported),
            ("Invalid argument: ", ErrorKind::InvalidArgument),
            ("IO error: ", ErrorKind::Io),
        ];
        PREFIXES
            .iter()
            .find(|(prefix, _)| message.starts_with(prefix))
            .map_or(ErrorKind::Other, |(_, kind)| *kind)
    }
}

/// Errors that can occur in ldguard operations.
#[derive(Debug, Error)]
pub enum DbError {
    /// Opening, destroying or repairing a database failed.
    #[error("{op} failed: {message}")]
    Open {
        /// The native operation that failed.
        op: &'static str,
        /// Classification of the native status.
        kind: ErrorKind,
        /// Message reported by the engine.
        message: String,
    },

    /// A native operation on an open database failed.
    #[error("{op} failed: {message}")]
    Engine {
        /// The native operation that failed.
        op: &'static str,
        /// Classification of the native status.
        kind: ErrorKind,
        /// Message reported by the engine.
        message: String,
    },

    /// A handle was used after it was released.
    ///
    /// This is a programming error and is never worth retrying.
    #[error("{resource} used after it was released")]
    UseAfterClose {
        /// The released resource.
        resource: Resource,
    },

    /// The iterator is not positioned on an entry.
    #[error("iterator is not positioned: cannot {op}")]
    InvalidIteratorState {
        /// The iterator operation that was attempted.
        op: &'static str,
    },

    /// An option record was rejected before reaching the engine.
    #[error("invalid option: {message}")]
    InvalidOption {
        /// Why the option was rejected.
        message: String,
    },

    /// A path or name cannot be passed to the engine.
    #[error("invalid path {path:?}: contains an interior NUL byte")]
    InvalidPath {
        /// The offending path, lossily rendered.
        path: String,
    },

    /// A release was refused because dependent handles are still open.
    #[error("cannot release {resource}: {open_children} dependent handle(s) still open")]
    Busy {
        /// The resource whose release was refused.
        resource: Resource,
        /// Number of snapshots/iterators still borrowing it.
        open_children: usize,
    },
}

impl DbError {
    /// Creates an engine error, classifying the message.
    pub fn engine(op: &'static str, message: impl Into<String>) -> Self {
        let message = message.into();
        Self::Engine {
            op,
            kind: ErrorKind::classify(&message),
            message,
        }
    }

    /// Creates an open error, classifying the message.
    pub fn open(op: &'static str, message: impl Into<String>) -> Self {
        let message = message.into();
        Self::Open {
            op,
            kind: ErrorKind::classify(&message),
            message,
        }
    }

    /// Creates an invalid option error.
    pub fn invalid_option(message: impl Into<String>) -> Self {
        Self::InvalidOption {
            message: message.into(),
        }
    }

    /// Returns the engine's classification, if this error came from the engine.
    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            Self::Open { kind, .. } | Self::Engine { kind, .. } => Some(*kind),
            _ => None,
        }
    }

    /// Returns true for errors that indicate misuse of a released handle.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::UseAfterClose { .. })
    }
}
