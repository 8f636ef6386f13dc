//! Stress tests for translog.
//!
//! These tests drive a domain from several producer threads at once and
//! replay it while it is being written.

use crate::fixtures::{packet, CommitLatch, TestDomain, WAIT};
use crate::integration::{flush, replay};
use parking_lot::Mutex;
use std::thread;
use std::time::{Duration, Instant};
use translog_core::{CoreResult, SerialNum};

/// Result of a stress test run.
#[derive(Debug, Clone)]
pub struct StressTestResult {
    /// Commits accepted by the domain.
    pub commits: usize,
    /// Callbacks that reported success.
    pub succeeded: usize,
    /// Callbacks that reported failure.
    pub failed: usize,
    /// Wall time from the first commit to the last callback.
    pub duration: Duration,
}

impl StressTestResult {
    /// Commits per second.
    pub fn commits_per_second(&self) -> f64 {
        let secs = self.duration.as_secs_f64();
        if secs > 0.0 {
            self.commits as f64 / secs
        } else {
            0.0
        }
    }
}

/// Configuration for stress tests.
#[derive(Debug, Clone)]
pub struct StressConfig {
    /// Producer threads.
    pub threads: usize,
    /// Commits per producer.
    pub commits_per_thread: usize,
    /// Entries in each committed packet.
    pub entries_per_commit: usize,
    /// Payload bytes per entry.
    pub payload_len: usize,
}

impl Default for StressConfig {
    fn default() -> Self {
        Self {
            threads: 4,
            commits_per_thread: 200,
            entries_per_commit: 2,
            payload_len: 48,
        }
    }
}

impl StressConfig {
    /// Total number of entries the run commits.
    pub fn total_entries(&self) -> usize {
        self.threads * self.commits_per_thread * self.entries_per_commit
    }
}

/// Commits from `config.threads` producers sharing one serial allocator,
/// then waits for every callback.
///
/// Callbacks in `latch` are tagged with the first serial of their packet.
///
/// # Errors
///
/// Returns the first commit error of any producer.
pub fn run_concurrent_commits(
    domain: &TestDomain,
    config: &StressConfig,
    latch: &CommitLatch,
) -> CoreResult<StressTestResult> {
    let allocator: Mutex<SerialNum> = Mutex::new(domain.last_serial());
    let started = Instant::now();
    let per_commit = config.entries_per_commit as SerialNum;

    let outcomes: Vec<CoreResult<()>> = thread::scope(|scope| {
        let handles: Vec<_> = (0..config.threads)
            .map(|_| {
                scope.spawn(|| -> CoreResult<()> {
                    for _ in 0..config.commits_per_thread {
                        // Allocation and commit must not interleave across producers.
                        let mut last = allocator.lock();
                        let from = *last + 1;
                        let to = *last + per_commit;
                        domain.commit(
                            &packet(from, to, config.payload_len),
                            latch.callback_tagged(from),
                        )?;
                        *last = to;
                    }
                    Ok(())
                })
            })
            .collect();
        handles
            .into_iter()
            .map(|handle| {
                handle
                    .join()
                    .unwrap_or_else(|panic| std::panic::resume_unwind(panic))
            })
            .collect()
    });
    outcomes.into_iter().collect::<CoreResult<()>>()?;

    flush(domain)?;
    let commits = config.threads * config.commits_per_thread;
    latch.wait(commits, WAIT);

    Ok(StressTestResult {
        commits,
        succeeded: latch.succeeded(),
        failed: latch.failed(),
        duration: started.elapsed(),
    })
}
