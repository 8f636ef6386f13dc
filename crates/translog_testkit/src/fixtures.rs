//! Test fixtures and domain helpers.
//!
//! Provides temporary domains, destinations that collect what a session
//! streams, and latches for commit callbacks.

use parking_lot::{Condvar, Mutex};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tempfile::TempDir;
use translog_core::{
    scan_dir, CoreResult, Destination, DoneCallback, Domain, DomainConfig, Entry, Executor,
    Packet, SerialNum, SessionId, ThreadExecutor,
};

/// Name of the domain opened by [`TestDomain`].
pub const DOMAIN_NAME: &str = "test";

/// Default timeout for waiting on background work in tests.
pub const WAIT: Duration = Duration::from_secs(10);

/// A domain in a temporary directory with its own executors.
pub struct TestDomain {
    domain: Option<Domain>,
    config: DomainConfig,
    sync_executor: Arc<ThreadExecutor>,
    session_executor: Arc<ThreadExecutor>,
    temp_dir: TempDir,
}

impl TestDomain {
    /// Opens a fresh domain with `config`.
    pub fn new(config: DomainConfig) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let mut test = Self {
            domain: None,
            config,
            sync_executor: Arc::new(
                ThreadExecutor::new("test-sync", 1).expect("Failed to start sync executor"),
            ),
            session_executor: Arc::new(
                ThreadExecutor::new("test-visit", 4).expect("Failed to start session executor"),
            ),
            temp_dir,
        };
        test.reopen();
        test
    }

    /// Base directory holding the domain directory.
    pub fn base_dir(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Directory holding the part files.
    pub fn domain_dir(&self) -> PathBuf {
        self.base_dir().join(DOMAIN_NAME)
    }

    /// Path of the part file starting at `serial`.
    pub fn part_path(&self, serial: SerialNum) -> PathBuf {
        self.domain_dir()
            .join(translog_core::part_file_name(DOMAIN_NAME, serial))
    }

    /// Start serials of the part files on disk.
    pub fn part_files(&self) -> Vec<SerialNum> {
        scan_dir(&self.domain_dir(), DOMAIN_NAME).expect("Failed to scan domain directory")
    }

    /// Closes the domain, flushing its resident chunk.
    pub fn close(&mut self) {
        self.domain = None;
    }

    /// Closes and reopens the domain.
    pub fn reopen(&mut self) {
        self.try_reopen().expect("Failed to open domain");
    }

    /// Closes and reopens the domain, returning the open error.
    pub fn try_reopen(&mut self) -> CoreResult<()> {
        self.close();
        let sync_executor: Arc<dyn Executor> = self.sync_executor.clone();
        let session_executor: Arc<dyn Executor> = self.session_executor.clone();
        let domain = Domain::open(
            DOMAIN_NAME,
            self.temp_dir.path(),
            sync_executor,
            session_executor,
            self.config.clone(),
        )?;
        self.domain = Some(domain);
        Ok(())
    }

    /// Returns true while the domain is open.
    pub fn is_open(&self) -> bool {
        self.domain.is_some()
    }
}

impl std::ops::Deref for TestDomain {
    type Target = Domain;

    fn deref(&self) -> &Self::Target {
        self.domain.as_ref().expect("Domain is closed")
    }
}

/// Builds a packet with one entry per serial in `[from, to]`.
///
/// Each entry has type 1 and `payload_len` bytes of data, so its encoded
/// size is `ENTRY_HEADER_SIZE + payload_len`.
pub fn packet(from: SerialNum, to: SerialNum, payload_len: usize) -> Packet {
    let mut packet = Packet::new();
    for serial in from..=to {
        let data = vec![(serial % 251) as u8; payload_len];
        packet
            .add(&Entry::new(serial, 1, data))
            .expect("Serials are increasing");
    }
    packet
}

/// Splits consecutive serials starting at `first` into packets of `sizes`.
pub fn packets_of_sizes(first: SerialNum, sizes: &[usize], payload_len: usize) -> Vec<Packet> {
    let mut next = first;
    sizes
        .iter()
        .filter(|&&size| size > 0)
        .map(|&size| {
            let last = next + size as SerialNum - 1;
            let p = packet(next, last, payload_len);
            next = last + 1;
            p
        })
        .collect()
}

/// Polls `condition` until it holds or `timeout` elapses.
pub fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    loop {
        if condition() {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        std::thread::sleep(Duration::from_millis(2));
    }
}

#[derive(Debug, Default)]
struct Collected {
    entries: Vec<Entry>,
    packets: usize,
    done: bool,
}

type SharedCollected = Arc<(Mutex<Collected>, Condvar)>;

/// A [`Destination`] that keeps everything it receives.
pub struct CollectingDestination {
    shared: SharedCollected,
    accept_packets: usize,
}

/// Read side of a [`CollectingDestination`].
#[derive(Clone)]
pub struct CollectedHandle {
    shared: SharedCollected,
}

/// Creates a collecting destination and its handle.
pub fn collecting_destination() -> (CollectingDestination, CollectedHandle) {
    refusing_destination(usize::MAX)
}

/// Creates a destination that refuses every packet after the first
/// `accept_packets`.
pub fn refusing_destination(accept_packets: usize) -> (CollectingDestination, CollectedHandle) {
    let shared: SharedCollected = Arc::default();
    (
        CollectingDestination {
            shared: Arc::clone(&shared),
            accept_packets,
        },
        CollectedHandle { shared },
    )
}

impl Destination for CollectingDestination {
    fn send(&mut self, _session: SessionId, _domain: &str, packet: &Packet) -> bool {
        let mut collected = self.shared.0.lock();
        if collected.packets >= self.accept_packets {
            return false;
        }
        collected.packets += 1;
        collected
            .entries
            .extend(packet.iter().map(|e| e.expect("Packet entries decode")));
        true
    }

    fn send_done(&mut self, _session: SessionId, _domain: &str) -> bool {
        let (lock, done) = &*self.shared;
        lock.lock().done = true;
        done.notify_all();
        true
    }
}

impl CollectedHandle {
    /// Serials received so far.
    pub fn serials(&self) -> Vec<SerialNum> {
        self.shared.0.lock().entries.iter().map(Entry::serial).collect()
    }

    /// Entries received so far.
    pub fn entries(&self) -> Vec<Entry> {
        self.shared.0.lock().entries.clone()
    }

    /// Number of packets received.
    pub fn packets(&self) -> usize {
        self.shared.0.lock().packets
    }

    /// Whether `send_done` was called.
    pub fn is_done(&self) -> bool {
        self.shared.0.lock().done
    }

    /// Waits for `send_done`. Returns false on timeout.
    pub fn wait_done(&self, timeout: Duration) -> bool {
        let (lock, done) = &*self.shared;
        let deadline = Instant::now() + timeout;
        let mut collected = lock.lock();
        while !collected.done {
            if done.wait_until(&mut collected, deadline).timed_out() {
                return collected.done;
            }
        }
        true
    }
}

#[derive(Debug, Default)]
struct LatchState {
    handed_out: u64,
    ok: usize,
    failed: usize,
    order: Vec<u64>,
    errors: Vec<String>,
}

/// Counts commit callbacks and remembers the order they fired in.
#[derive(Clone, Default)]
pub struct CommitLatch {
    shared: Arc<(Mutex<LatchState>, Condvar)>,
}

impl CommitLatch {
    /// Creates a latch.
    pub fn new() -> Self {
        Self::default()
    }

    /// A callback that records completion under `tag`.
    pub fn callback_tagged(&self, tag: u64) -> DoneCallback {
        let shared = Arc::clone(&self.shared);
        Box::new(move |result| {
            let (lock, fired) = &*shared;
            let mut state = lock.lock();
            match result {
                Ok(()) => state.ok += 1,
                Err(err) => {
                    state.failed += 1;
                    state.errors.push(err.to_string());
                }
            }
            state.order.push(tag);
            fired.notify_all();
        })
    }

    /// A callback tagged with the number of callbacks handed out before it.
    pub fn callback(&self) -> DoneCallback {
        let tag = {
            let mut state = self.shared.0.lock();
            state.handed_out += 1;
            state.handed_out - 1
        };
        self.callback_tagged(tag)
    }

    /// Waits until `count` callbacks fired. Returns false on timeout.
    pub fn wait(&self, count: usize, timeout: Duration) -> bool {
        let (lock, fired) = &*self.shared;
        let deadline = Instant::now() + timeout;
        let mut state = lock.lock();
        while state.ok + state.failed < count {
            if fired.wait_until(&mut state, deadline).timed_out() {
                return state.ok + state.failed >= count;
            }
        }
        true
    }

    /// Callbacks that fired with `Ok`.
    pub fn succeeded(&self) -> usize {
        self.shared.0.lock().ok
    }

    /// Callbacks that fired with an error.
    pub fn failed(&self) -> usize {
        self.shared.0.lock().failed
    }

    /// All callbacks that fired.
    pub fn completed(&self) -> usize {
        let state = self.shared.0.lock();
        state.ok + state.failed
    }

    /// Tags in the order their callbacks fired.
    pub fn order(&self) -> Vec<u64> {
        self.shared.0.lock().order.clone()
    }

    /// Messages of the failed callbacks.
    pub fn errors(&self) -> Vec<String> {
        self.shared.0.lock().errors.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_domain_lifecycle() {
        let mut test = TestDomain::new(DomainConfig::default());
        assert!(test.is_open());
        assert_eq!(test.part_files(), vec![0]);
        assert!(test.part_path(0).exists());

        test.close();
        assert!(!test.is_open());
        test.reopen();
        assert_eq!(test.end(), 0);
    }

    #[test]
    fn packets_of_sizes_are_contiguous() {
        let packets = packets_of_sizes(5, &[2, 0, 3], 4);
        assert_eq!(packets.len(), 2);
        assert_eq!(packets[0].range().from(), 5);
        assert_eq!(packets[0].range().to(), 6);
        assert_eq!(packets[1].range().from(), 7);
        assert_eq!(packets[1].range().to(), 9);
    }

    #[test]
    fn latch_counts_callbacks() {
        let latch = CommitLatch::new();
        let first = latch.callback_tagged(7);
        let second = latch.callback_tagged(8);
        second(Ok(()));
        first(Ok(()));

        assert!(latch.wait(2, WAIT));
        assert_eq!(latch.succeeded(), 2);
        assert_eq!(latch.order(), vec![8, 7]);
        assert!(!latch.wait(3, Duration::from_millis(10)));
    }
}
