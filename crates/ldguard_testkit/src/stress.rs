//! Stress drivers for ldguard.
//!
//! These run heavy and concurrent workloads against one database handle and
//! report how many operations succeeded.

use ldguard_core::{Database, DbResult, ReadOptions, WriteBatch, WriteOptions};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// Result of a stress test run.
#[derive(Debug, Clone)]
pub struct StressTestResult {
    /// Total operations performed.
    pub total_ops: usize,
    /// Successful operations.
    pub successful_ops: usize,
    /// Failed operations.
    pub failed_ops: usize,
    /// Total duration.
    pub duration: Duration,
    /// Operations per second.
    pub ops_per_second: f64,
}

impl StressTestResult {
    /// Creates a new result.
    pub fn new(successful: usize, failed: usize, duration: Duration) -> Self {
        let total = successful + failed;
        let ops_per_second = if duration.as_secs_f64() > 0.0 {
            total as f64 / duration.as_secs_f64()
        } else {
            0.0
        };

        Self {
            total_ops: total,
            successful_ops: successful,
            failed_ops: failed,
            duration,
            ops_per_second,
        }
    }

    /// Prints a summary of the test.
    pub fn print_summary(&self, name: &str) {
        println!("\n=== {} ===", name);
        println!("Total operations: {}", self.total_ops);
        println!("Successful: {}", self.successful_ops);
        println!("Failed: {}", self.failed_ops);
        println!("Duration: {:?}", self.duration);
        println!("Throughput: {:.2} ops/sec", self.ops_per_second);
    }
}

/// Configuration for stress tests.
#[derive(Debug, Clone)]
pub struct StressConfig {
    /// Number of operations to perform, split across threads for
    /// concurrent runs.
    pub operations: usize,
    /// Number of concurrent threads.
    pub threads: usize,
    /// Size of each value in bytes.
    pub value_size: usize,
    /// Number of distinct keys for read and mixed runs.
    pub key_count: usize,
}

impl Default for StressConfig {
    fn default() -> Self {
        Self {
            operations: 10_000,
            threads: 4,
            value_size: 256,
            key_count: 1_000,
        }
    }
}

impl StressConfig {
    fn ops_per_thread(&self) -> usize {
        self.operations / self.threads.max(1)
    }
}

/// Key written by thread `thread` at step `i`. Key ranges of different
/// threads never overlap.
pub fn thread_key(thread: usize, i: usize) -> Vec<u8> {
    format!("t{thread:03}/k{i:08}").into_bytes()
}

/// Value written by thread `thread` at step `i`, padded to `size` bytes.
pub fn thread_value(thread: usize, i: usize, size: usize) -> Vec<u8> {
    let mut value = format!("{thread}:{i}:").into_bytes();
    value.resize(size.max(value.len()), 0xAB);
    value
}

fn shared_key(i: usize) -> Vec<u8> {
    format!("shared{i:08}").into_bytes()
}

fn populate(db: &Database, config: &StressConfig) {
    let value = vec![0xABu8; config.value_size];
    let mut batch = WriteBatch::with_capacity(config.key_count);
    for i in 0..config.key_count {
        batch.put(shared_key(i), value.clone());
    }
    db.write(&WriteOptions::new(), &batch)
        .expect("Failed to populate database");
}

/// Run a sequential write stress test.
pub fn stress_sequential_writes(db: &Database, config: &StressConfig) -> StressTestResult {
    let w = WriteOptions::new();
    let value = vec![0xABu8; config.value_size];

    let start = Instant::now();
    let mut successful = 0usize;
    let mut failed = 0usize;

    for i in 0..config.operations {
        match db.put(&w, &shared_key(i % config.key_count.max(1)), &value) {
            Ok(()) => successful += 1,
            Err(_) => failed += 1,
        }
    }

    StressTestResult::new(successful, failed, start.elapsed())
}

/// Run a sequential read stress test.
pub fn stress_sequential_reads(db: &Database, config: &StressConfig) -> StressTestResult {
    populate(db, config);
    let r = ReadOptions::new();

    let start = Instant::now();
    let mut successful = 0usize;
    let mut failed = 0usize;

    for i in 0..config.operations {
        match db.get(&r, &shared_key(i % config.key_count.max(1))) {
            // Absence is still a successful read
            Ok(_) => successful += 1,
            Err(_) => failed += 1,
        }
    }

    StressTestResult::new(successful, failed, start.elapsed())
}

/// Run a mixed put/get/delete stress test.
pub fn stress_mixed_operations(db: &Database, config: &StressConfig) -> StressTestResult {
    let w = WriteOptions::new();
    let r = ReadOptions::new();
    let value = vec![0xABu8; config.value_size];

    let start = Instant::now();
    let mut successful = 0usize;
    let mut failed = 0usize;

    for i in 0..config.operations {
        let key = shared_key(i % config.key_count.max(1));
        let result = match i % 3 {
            0 => db.put(&w, &key, &value),
            1 => db.get(&r, &key).map(|_| ()),
            _ => db.delete(&w, &key),
        };

        match result {
            Ok(()) => successful += 1,
            Err(_) => failed += 1,
        }
    }

    StressTestResult::new(successful, failed, start.elapsed())
}

/// Run concurrent writers over disjoint key ranges.
///
/// Check the outcome with [`verify_concurrent_writes`].
pub fn stress_concurrent_writes(db: Arc<Database>, config: &StressConfig) -> StressTestResult {
    let successful = Arc::new(AtomicUsize::new(0));
    let failed = Arc::new(AtomicUsize::new(0));
    let ops_per_thread = config.ops_per_thread();
    let value_size = config.value_size;

    let start = Instant::now();

    let handles: Vec<_> = (0..config.threads)
        .map(|t| {
            let db = Arc::clone(&db);
            let successful = Arc::clone(&successful);
            let failed = Arc::clone(&failed);

            thread::spawn(move || {
                let w = WriteOptions::new();
                for i in 0..ops_per_thread {
                    match db.put(&w, &thread_key(t, i), &thread_value(t, i, value_size)) {
                        Ok(()) => {
                            successful.fetch_add(1, Ordering::Relaxed);
                        }
                        Err(_) => {
                            failed.fetch_add(1, Ordering::Relaxed);
                        }
                    }
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().expect("Thread panicked");
    }

    StressTestResult::new(
        successful.load(Ordering::Relaxed),
        failed.load(Ordering::Relaxed),
        start.elapsed(),
    )
}

/// Counts keys written by [`stress_concurrent_writes`] that are missing or
/// hold the wrong value.
pub fn verify_concurrent_writes(db: &Database, config: &StressConfig) -> usize {
    let r = ReadOptions::new();
    let mut wrong = 0;
    for t in 0..config.threads {
        for i in 0..config.ops_per_thread() {
            let expected = thread_value(t, i, config.value_size);
            if db.get(&r, &thread_key(t, i)).ok().flatten().as_ref() != Some(&expected) {
                wrong += 1;
            }
        }
    }
    wrong
}

/// Run a concurrent read stress test.
pub fn stress_concurrent_reads(db: Arc<Database>, config: &StressConfig) -> StressTestResult {
    populate(&db, config);

    let successful = Arc::new(AtomicUsize::new(0));
    let failed = Arc::new(AtomicUsize::new(0));
    let ops_per_thread = config.ops_per_thread();
    let key_count = config.key_count.max(1);

    let start = Instant::now();

    let handles: Vec<_> = (0..config.threads)
        .map(|t| {
            let db = Arc::clone(&db);
            let successful = Arc::clone(&successful);
            let failed = Arc::clone(&failed);

            thread::spawn(move || {
                let r = ReadOptions::new();
                for i in 0..ops_per_thread {
                    let idx = (t * ops_per_thread + i) % key_count;
                    match db.get(&r, &shared_key(idx)) {
                        Ok(Some(_)) => {
                            successful.fetch_add(1, Ordering::Relaxed);
                        }
                        Ok(None) | Err(_) => {
                            failed.fetch_add(1, Ordering::Relaxed);
                        }
                    }
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().expect("Thread panicked");
    }

    StressTestResult::new(
        successful.load(Ordering::Relaxed),
        failed.load(Ordering::Relaxed),
        start.elapsed(),
    )
}

/// Run snapshot scans on every thread but one while the remaining thread
/// keeps writing.
///
/// Each scan counts the entries visible in its snapshot; a scan succeeds if
/// the count matches a second pass over the same snapshot. Every snapshot and
/// iterator is released before the function returns.
pub fn stress_scans_during_writes(db: &Database, config: &StressConfig) -> StressTestResult {
    populate(db, config);

    let successful = AtomicUsize::new(0);
    let failed = AtomicUsize::new(0);
    let scanners = config.threads.max(2) - 1;
    let scans_per_thread = (config.operations / 100).max(1);

    let start = Instant::now();

    thread::scope(|scope| {
        scope.spawn(|| {
            let w = WriteOptions::new();
            for i in 0..config.operations {
                if db.put(&w, &thread_key(scanners, i), b"w").is_err() {
                    failed.fetch_add(1, Ordering::Relaxed);
                }
            }
        });

        for _ in 0..scanners {
            scope.spawn(|| {
                for _ in 0..scans_per_thread {
                    let outcome = db.with_snapshot(|snapshot| {
                        let count = || -> DbResult<usize> {
                            let mut iter = db.iter(ReadOptions::new().snapshot(snapshot))?;
                            iter.seek_to_first()?;
                            let mut n = 0;
                            for entry in iter.entries() {
                                entry?;
                                n += 1;
                            }
                            Ok(n)
                        };
                        Ok(count()? == count()?)
                    });

                    let counter = if matches!(outcome, Ok(true)) {
                        &successful
                    } else {
                        &failed
                    };
                    counter.fetch_add(1, Ordering::Relaxed);
                }
            });
        }
    });

    StressTestResult::new(
        successful.load(Ordering::Relaxed),
        failed.load(Ordering::Relaxed),
        start.elapsed(),
    )
}
