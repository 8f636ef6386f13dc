//! Domain statistics.
//!
//! Counters are updated by the commit pipeline and the session handling of
//! a [`Domain`](crate::Domain) and can be read at any time:
//!
//! ```rust,ignore
//! let stats = domain.stats().snapshot();
//! println!("persisted {} chunks, {} rotations", stats.chunks_persisted, stats.rotations);
//! ```

use std::sync::atomic::{AtomicU64, Ordering};

/// Domain statistics.
///
/// All counters are atomic and monotonically increasing.
#[derive(Debug, Default)]
pub struct DomainStats {
    /// Accepted commits.
    commits: AtomicU64,
    /// Entries in accepted commits.
    entries: AtomicU64,
    /// Chunks written to a part.
    chunks_persisted: AtomicU64,
    /// Payload bytes written to parts.
    bytes_persisted: AtomicU64,
    /// Part rotations.
    rotations: AtomicU64,
    /// Completed background syncs.
    syncs: AtomicU64,
    /// Chunks whose persist failed.
    persist_failures: AtomicU64,
    /// Sessions started.
    sessions_started: AtomicU64,
    /// Sessions closed.
    sessions_closed: AtomicU64,
}

impl DomainStats {
    /// Creates a new stats instance.
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_commit(&self, entries: u64) {
        self.commits.fetch_add(1, Ordering::Relaxed);
        self.entries.fetch_add(entries, Ordering::Relaxed);
    }

    pub(crate) fn record_persist(&self, bytes: u64) {
        self.chunks_persisted.fetch_add(1, Ordering::Relaxed);
        self.bytes_persisted.fetch_add(bytes, Ordering::Relaxed);
    }

    pub(crate) fn record_rotation(&self) {
        self.rotations.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_sync(&self) {
        self.syncs.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_persist_failure(&self) {
        self.persist_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_session_start(&self) {
        self.sessions_started.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_session_close(&self) {
        self.sessions_closed.fetch_add(1, Ordering::Relaxed);
    }

    /// Returns a snapshot of all counters.
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            commits: self.commits.load(Ordering::Relaxed),
            entries: self.entries.load(Ordering::Relaxed),
            chunks_persisted: self.chunks_persisted.load(Ordering::Relaxed),
            bytes_persisted: self.bytes_persisted.load(Ordering::Relaxed),
            rotations: self.rotations.load(Ordering::Relaxed),
            syncs: self.syncs.load(Ordering::Relaxed),
            persist_failures: self.persist_failures.load(Ordering::Relaxed),
            sessions_started: self.sessions_started.load(Ordering::Relaxed),
            sessions_closed: self.sessions_closed.load(Ordering::Relaxed),
        }
    }
}

/// A point-in-time copy of [`DomainStats`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StatsSnapshot {
    /// Accepted commits.
    pub commits: u64,
    /// Entries in accepted commits.
    pub entries: u64,
    /// Chunks written to a part.
    pub chunks_persisted: u64,
    /// Payload bytes written to parts.
    pub bytes_persisted: u64,
    /// Part rotations.
    pub rotations: u64,
    /// Completed background syncs.
    pub syncs: u64,
    /// Chunks whose persist failed.
    pub persist_failures: u64,
    /// Sessions started.
    pub sessions_started: u64,
    /// Sessions closed.
    pub sessions_closed: u64,
}
