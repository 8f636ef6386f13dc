//! The log domain.
//!
//! A [`Domain`] owns the parts of one named log, the chunk that is being
//! filled by producers, the single-worker committer that persists chunks,
//! and the table of replay sessions.
//!
//! ## Locks
//!
//! - the chunk lock guards the resident chunk and `last_serial`;
//! - the part map lock guards the ordered parts;
//! - the session table lock guards the sessions;
//! - the sync monitor (pending flag + condvar) allows one outstanding
//!   background sync.
//!
//! None of them is held across a blocking wait, and the sync monitor is
//! never taken while holding another one.

use crate::chunk::{Chunk, CommitResult, DoneCallback};
use crate::config::DomainConfig;
use crate::dir::{create_directory, scan_dir, sync_directory};
use crate::error::{CoreError, CoreResult};
use crate::executor::{Executor, ThreadExecutor};
use crate::info::{DomainInfo, PartInfo};
use crate::part::{DefaultHeaderContext, DomainPart, FileHeaderContext};
use crate::session::{Destination, Session, SessionState};
use crate::stats::DomainStats;
use crate::types::SessionId;
use parking_lot::{Condvar, Mutex, RwLock};
use std::collections::BTreeMap;
use std::ops::Bound;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::Duration;
use translog_codec::{Packet, SerialNum, SerialNumRange};

/// Poll interval of [`Domain::close_session`].
const CLOSE_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// State shared between the domain handle and its background tasks.
pub(crate) struct DomainShared {
    name: String,
    dir: PathBuf,
    config: RwLock<DomainConfig>,
    header_context: Arc<dyn FileHeaderContext>,
    parts: Mutex<BTreeMap<SerialNum, Arc<DomainPart>>>,
    sessions: Mutex<BTreeMap<SessionId, Arc<Session>>>,
    sync_pending: Mutex<bool>,
    sync_done: Condvar,
    sync_executor: Arc<dyn Executor>,
    session_executor: Arc<dyn Executor>,
    max_session_run_time: Mutex<Duration>,
    failure: Mutex<Option<Arc<CoreError>>>,
    stats: DomainStats,
}

struct CurrentChunk {
    chunk: Chunk,
    last_serial: SerialNum,
}

/// Write-ahead log of one named stream.
///
/// # Example
///
/// ```rust,ignore
/// let domain = Domain::open("docs", base_dir, sync_executor, session_executor, DomainConfig::default())?;
/// domain.commit(&packet, Box::new(|result| assert!(result.is_ok())))?;
///
/// let id = domain.visit(1, 100, Box::new(my_destination));
/// domain.start_session(id)?;
/// // ... wait for the destination to see send_done
/// domain.close_session(id)?;
/// ```
pub struct Domain {
    shared: Arc<DomainShared>,
    current: Mutex<CurrentChunk>,
    committer: ThreadExecutor,
    next_session_id: AtomicU32,
}

impl Domain {
    /// Opens or creates the domain `name` below `base_dir`.
    ///
    /// Existing parts are loaded on `session_executor`. Background syncs run
    /// on `sync_executor` and replay sessions on `session_executor`.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::CreateDirectory`] if the base or domain
    /// directory cannot be created, or an error if an existing part cannot
    /// be loaded.
    pub fn open(
        name: &str,
        base_dir: impl AsRef<Path>,
        sync_executor: Arc<dyn Executor>,
        session_executor: Arc<dyn Executor>,
        config: DomainConfig,
    ) -> CoreResult<Self> {
        Self::open_with_header_context(
            name,
            base_dir,
            sync_executor,
            session_executor,
            config,
            Arc::new(DefaultHeaderContext),
        )
    }

    /// Like [`open`](Self::open), with custom tags for new part headers.
    ///
    /// # Errors
    ///
    /// See [`open`](Self::open).
    pub fn open_with_header_context(
        name: &str,
        base_dir: impl AsRef<Path>,
        sync_executor: Arc<dyn Executor>,
        session_executor: Arc<dyn Executor>,
        config: DomainConfig,
        header_context: Arc<dyn FileHeaderContext>,
    ) -> CoreResult<Self> {
        let base_dir = base_dir.as_ref();
        create_directory(base_dir)?;
        let dir = base_dir.join(name);
        create_directory(&dir)?;

        let serials = scan_dir(&dir, name)?;
        let loaded = load_parts(
            name,
            &dir,
            &serials,
            &config,
            &header_context,
            session_executor.as_ref(),
        )?;

        let mut parts = BTreeMap::new();
        for part in loaded {
            if part.size() == 0 {
                part.erase(part.range().to().saturating_add(1))?;
                tracing::info!(domain = name, file = %part.file_name().display(), "removed empty part");
                continue;
            }
            parts.insert(part.start_serial(), part);
        }
        for part in parts.values().rev().skip(1) {
            part.close()?;
        }
        if parts.is_empty() {
            let start = serials.last().copied().unwrap_or(0);
            let part = DomainPart::open(
                name,
                &dir,
                start,
                config.encoding,
                config.compression_level,
                header_context.as_ref(),
                true,
            )?;
            parts.insert(start, Arc::new(part));
            sync_directory(&dir)?;
        }

        let last_serial = parts
            .values()
            .next_back()
            .map_or(0, |part| part.range().to());
        tracing::info!(
            domain = name,
            parts = parts.len(),
            last_serial,
            "opened domain"
        );

        let committer = ThreadExecutor::new(&format!("tls-commit-{name}"), 1)?;
        let shared = Arc::new(DomainShared {
            name: name.to_string(),
            dir,
            config: RwLock::new(config),
            header_context,
            parts: Mutex::new(parts),
            sessions: Mutex::new(BTreeMap::new()),
            sync_pending: Mutex::new(false),
            sync_done: Condvar::new(),
            sync_executor,
            session_executor,
            max_session_run_time: Mutex::new(Duration::ZERO),
            failure: Mutex::new(None),
            stats: DomainStats::new(),
        });

        Ok(Self {
            shared,
            current: Mutex::new(CurrentChunk {
                chunk: Chunk::new(),
                last_serial,
            }),
            committer,
            next_session_id: AtomicU32::new(1),
        })
    }

    /// Accepts `packet` into the resident chunk.
    ///
    /// `on_done` fires exactly once, on the committer thread, after the
    /// chunk holding the packet has been persisted. It never fires inside
    /// this call. If the chunk exceeds the size limit it is handed to the
    /// committer right away.
    ///
    /// # Errors
    ///
    /// - [`CoreError::DomainFailed`] if an earlier persist failed
    /// - [`CoreError::InvalidOperation`] for an empty packet
    /// - [`CoreError::OutOfOrder`] unless the packet starts above
    ///   [`last_serial`](Self::last_serial)
    /// - [`CoreError::ExecutorShutdown`] if a full chunk cannot be submitted
    ///
    /// In the first three cases nothing changes and `on_done` is dropped
    /// without being called.
    pub fn commit(&self, packet: &Packet, on_done: DoneCallback) -> CoreResult<()> {
        self.shared.check_failure()?;
        if packet.is_empty() {
            return Err(CoreError::invalid_operation("cannot commit an empty packet"));
        }

        let mut current = self.current.lock();
        let range = packet.range();
        if range.from() <= current.last_serial {
            return Err(CoreError::OutOfOrder {
                incoming: range.from(),
                last: current.last_serial,
            });
        }
        current.chunk.add(packet, on_done)?;
        current.last_serial = range.to();
        self.shared.stats.record_commit(packet.size() as u64);

        let limit = self.shared.config.read().chunk_size_limit;
        if current.chunk.size_bytes() > limit {
            let chunk = std::mem::take(&mut current.chunk);
            self.commit_chunk(chunk)?;
        }
        Ok(())
    }

    /// Hands the resident chunk to the committer if it is non-empty and
    /// older than the age limit. Returns whether it did.
    ///
    /// # Errors
    ///
    /// Returns an error if the chunk cannot be submitted.
    pub fn commit_if_stale(&self) -> CoreResult<bool> {
        let mut current = self.current.lock();
        let limit = self.shared.config.read().chunk_age_limit;
        if current.chunk.is_empty() || current.chunk.age() <= limit {
            return Ok(false);
        }
        let chunk = std::mem::take(&mut current.chunk);
        self.commit_chunk(chunk)?;
        Ok(true)
    }

    fn commit_chunk(&self, chunk: Chunk) -> CoreResult<()> {
        if chunk.is_empty() {
            return Ok(());
        }
        let shared = Arc::clone(&self.shared);
        self.committer
            .execute(Box::new(move || shared.do_commit(chunk)))
    }

    /// Registers a session over `[from, to)` and returns its id.
    ///
    /// Nothing is streamed until [`start_session`](Self::start_session).
    pub fn visit(
        &self,
        from: SerialNum,
        to: SerialNum,
        destination: Box<dyn Destination>,
    ) -> SessionId {
        self.shared.clean_sessions();
        let id = SessionId::new(self.next_session_id.fetch_add(1, Ordering::Relaxed));
        let session = Arc::new(Session::new(id, from, to, destination));
        self.shared.sessions.lock().insert(id, session);
        tracing::debug!(domain = %self.shared.name, session = %id, from, to, "registered session");
        id
    }

    /// Starts streaming session `id` on the session executor.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::SessionNotFound`] for an unknown id and
    /// [`CoreError::InvalidOperation`] if the session was already started.
    /// If the task cannot be submitted the session is removed and the
    /// submit error returned.
    pub fn start_session(&self, id: SessionId) -> CoreResult<()> {
        let session = self
            .shared
            .sessions
            .lock()
            .get(&id)
            .cloned()
            .ok_or(CoreError::SessionNotFound { id })?;
        if session.state() != SessionState::Created {
            return Err(CoreError::invalid_operation(format!(
                "{id} was already started"
            )));
        }

        session.mark_started();
        let shared = Arc::clone(&self.shared);
        let task_session = Arc::clone(&session);
        let submitted = self
            .shared
            .session_executor
            .execute(Box::new(move || task_session.run(&shared)));
        if let Err(err) = submitted {
            session.mark_start_failed();
            self.shared.sessions.lock().remove(&id);
            return Err(err);
        }
        self.shared.stats.record_session_start();
        Ok(())
    }

    /// Stops session `id`, waits for its task to exit and removes it.
    ///
    /// Waits for pending background syncs first, but not for the commit
    /// pipeline, so it may be called from a commit callback. Unknown ids
    /// are ignored.
    ///
    /// # Errors
    ///
    /// Currently always succeeds.
    pub fn close_session(&self, id: SessionId) -> CoreResult<()> {
        let Some(session) = self.shared.sessions.lock().get(&id).cloned() else {
            return Ok(());
        };
        self.shared.sync_executor.sync();
        session.request_stop();
        while session.is_visit_running() {
            thread::sleep(CLOSE_POLL_INTERVAL);
        }

        self.shared.sessions.lock().remove(&id);
        let run_time = session.run_time();
        {
            let mut max = self.shared.max_session_run_time.lock();
            *max = (*max).max(run_time);
        }
        self.shared.stats.record_session_close();
        tracing::debug!(domain = %self.shared.name, session = %id, ?run_time, "closed session");
        Ok(())
    }

    /// State of session `id`, if it is still registered.
    #[must_use]
    pub fn session_state(&self, id: SessionId) -> Option<SessionState> {
        self.shared.sessions.lock().get(&id).map(|s| s.state())
    }

    /// Lowest `from` of all sessions that are neither in sync nor
    /// finished, or `SerialNum::MAX` if there are none.
    ///
    /// Callers must not [`erase`](Self::erase) past this serial.
    #[must_use]
    pub fn find_oldest_active_visit(&self) -> SerialNum {
        self.shared
            .sessions
            .lock()
            .values()
            .filter(|session| session.is_active())
            .map(|session| session.from())
            .min()
            .unwrap_or(SerialNum::MAX)
    }

    /// Drops log data below `to`.
    ///
    /// Whole parts ending below `to` are deleted while more than one part
    /// remains. The lowest remaining part then has its start raised to
    /// `min(to, range.to)`. The last part is never removed and
    /// [`end`](Self::end) does not change. Returns whether a part file was
    /// deleted.
    ///
    /// # Errors
    ///
    /// Returns an error if a part cannot be removed or the directory
    /// cannot be synced.
    pub fn erase(&self, to: SerialNum) -> CoreResult<bool> {
        let mut removed = false;
        loop {
            let first = {
                let parts = self.shared.parts.lock();
                if parts.len() <= 1 {
                    break;
                }
                parts.values().next().cloned()
            };
            let Some(first) = first else {
                break;
            };
            if first.range().to() >= to {
                break;
            }
            first.erase(to)?;
            self.shared.parts.lock().remove(&first.start_serial());
            sync_directory(&self.shared.dir)?;
            tracing::info!(
                domain = %self.shared.name,
                range = %first.range(),
                "erased part"
            );
            removed = true;
        }

        let first = self.shared.parts.lock().values().next().cloned();
        if let Some(first) = first {
            first.erase(to.min(first.range().to()))?;
        }
        Ok(removed)
    }

    /// Starts a background sync of the active part unless one is pending.
    ///
    /// # Errors
    ///
    /// Returns an error if the sync task cannot be submitted.
    pub fn trigger_sync_now(&self) -> CoreResult<()> {
        self.shared.trigger_sync_now()
    }

    /// First serial held by the domain.
    #[must_use]
    pub fn begin(&self) -> SerialNum {
        self.shared
            .parts
            .lock()
            .values()
            .next()
            .map_or(0, |part| part.range().from())
    }

    /// Last serial held by the domain.
    #[must_use]
    pub fn end(&self) -> SerialNum {
        self.shared
            .parts
            .lock()
            .values()
            .next_back()
            .map_or(0, |part| part.range().to())
    }

    /// Number of entries over all parts.
    #[must_use]
    pub fn size(&self) -> usize {
        self.shared.parts.lock().values().map(|part| part.size()).sum()
    }

    /// Bytes over all parts.
    #[must_use]
    pub fn byte_size(&self) -> u64 {
        self.shared
            .parts
            .lock()
            .values()
            .map(|part| part.byte_size())
            .sum()
    }

    /// Last serial known to be on stable storage.
    #[must_use]
    pub fn synced(&self) -> SerialNum {
        let parts = self.shared.parts.lock();
        let mut newest_first = parts.values().rev();
        let Some(active) = newest_first.next() else {
            return 0;
        };
        match active.get_synced() {
            0 => newest_first.next().map_or(0, |part| part.get_synced()),
            synced => synced,
        }
    }

    /// Highest serial accepted by [`commit`](Self::commit).
    #[must_use]
    pub fn last_serial(&self) -> SerialNum {
        self.current.lock().last_serial
    }

    /// Describes the domain and each of its parts.
    #[must_use]
    pub fn domain_info(&self) -> DomainInfo {
        let parts: Vec<PartInfo> = self
            .shared
            .parts
            .lock()
            .values()
            .map(|part| PartInfo {
                range: part.range(),
                num_entries: part.size(),
                byte_size: part.byte_size(),
                file: part.file_name().to_path_buf(),
                closed: part.is_closed(),
            })
            .collect();

        let range = match (parts.first(), parts.last()) {
            (Some(first), Some(last)) => SerialNumRange::new(first.range.from(), last.range.to()),
            _ => SerialNumRange::default(),
        };
        DomainInfo {
            range,
            num_entries: parts.iter().map(|p| p.num_entries).sum(),
            byte_size: parts.iter().map(|p| p.byte_size).sum(),
            max_session_run_time: *self.shared.max_session_run_time.lock(),
            parts,
        }
    }

    /// Name of the domain.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.shared.name
    }

    /// Directory holding the parts.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.shared.dir
    }

    /// Statistics counters.
    #[must_use]
    pub fn stats(&self) -> &DomainStats {
        &self.shared.stats
    }

    /// Current configuration.
    #[must_use]
    pub fn config(&self) -> DomainConfig {
        self.shared.config.read().clone()
    }

    /// Replaces the configuration. New limits apply from the next commit;
    /// existing parts keep their encoding.
    pub fn set_config(&self, config: DomainConfig) {
        *self.shared.config.write() = config;
    }
}

impl Drop for Domain {
    fn drop(&mut self) {
        let chunk = std::mem::take(&mut self.current.get_mut().chunk);
        if let Err(err) = self.commit_chunk(chunk) {
            tracing::error!(domain = %self.shared.name, error = %err, "failed flushing chunk on close");
        }
        self.committer.shutdown();
        self.shared.wait_pending_sync();
        if let Ok(active) = self.shared.active_part() {
            if let Err(err) = active.sync() {
                tracing::error!(domain = %self.shared.name, error = %err, "failed syncing part on close");
            }
        }
    }
}

impl std::fmt::Debug for Domain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Domain")
            .field("name", &self.shared.name)
            .field("dir", &self.shared.dir)
            .field("parts", &self.shared.parts.lock().len())
            .field("sessions", &self.shared.sessions.lock().len())
            .finish_non_exhaustive()
    }
}

impl DomainShared {
    pub(crate) fn name(&self) -> &str {
        &self.name
    }

    /// Whether sessions may only read synced data.
    pub(crate) fn durable_only(&self) -> bool {
        self.config.read().fsync_on_commit
    }

    /// The part holding `serial`, or else the first part starting above it.
    pub(crate) fn find_part(&self, serial: SerialNum) -> Option<Arc<DomainPart>> {
        let parts = self.parts.lock();
        if let Some((_, prev)) = parts.range(..=serial).next_back() {
            if prev.range().to() >= serial {
                return Some(Arc::clone(prev));
            }
        }
        parts
            .range((Bound::Excluded(serial), Bound::Unbounded))
            .next()
            .map(|(_, part)| Arc::clone(part))
    }

    pub(crate) fn is_active_part(&self, part: &Arc<DomainPart>) -> bool {
        self.parts
            .lock()
            .values()
            .next_back()
            .is_some_and(|active| Arc::ptr_eq(active, part))
    }

    fn active_part(&self) -> CoreResult<Arc<DomainPart>> {
        self.parts
            .lock()
            .values()
            .next_back()
            .cloned()
            .ok_or_else(|| CoreError::invalid_operation("domain has no parts"))
    }

    fn check_failure(&self) -> CoreResult<()> {
        match self.failure.lock().as_ref() {
            Some(err) => Err(CoreError::DomainFailed {
                domain: self.name.clone(),
                message: err.to_string(),
            }),
            None => Ok(()),
        }
    }

    /// Persists one chunk and releases its callbacks. Runs on the committer.
    fn do_commit(self: Arc<Self>, chunk: Chunk) {
        let result: CommitResult = match self.check_failure().and_then(|()| self.persist(chunk.packet())) {
            Ok(()) => {
                self.stats.record_persist(chunk.size_bytes() as u64);
                Ok(())
            }
            Err(err) => {
                tracing::error!(
                    domain = %self.name,
                    range = %chunk.packet().range(),
                    error = %err,
                    "failed persisting chunk"
                );
                self.stats.record_persist_failure();
                let err = Arc::new(err);
                let mut failure = self.failure.lock();
                if failure.is_none() {
                    *failure = Some(Arc::clone(&err));
                }
                Err(err)
            }
        };

        self.clean_sessions();
        tracing::debug!(
            domain = %self.name,
            range = %chunk.packet().range(),
            entries = chunk.packet().size(),
            callbacks = chunk.num_callbacks(),
            "releasing chunk"
        );
        chunk.release(&result);
    }

    fn persist(self: &Arc<Self>, packet: &Packet) -> CoreResult<()> {
        let config = self.config.read().clone();
        let first = packet.first_serial()?;

        let mut part = self.active_part()?;
        if part.byte_size() > config.part_size_limit && part.size() > 0 {
            part = self.rotate(&part, first, &config)?;
        }
        part.commit(packet)?;
        if config.fsync_on_commit {
            part.sync()?;
        }
        Ok(())
    }

    /// Closes `full` and makes a new part starting at `first` the active one.
    fn rotate(
        self: &Arc<Self>,
        full: &Arc<DomainPart>,
        first: SerialNum,
        config: &DomainConfig,
    ) -> CoreResult<Arc<DomainPart>> {
        self.wait_pending_sync();
        self.trigger_sync_now()?;
        self.wait_pending_sync();
        full.close()?;

        let part = Arc::new(DomainPart::open(
            &self.name,
            &self.dir,
            first,
            config.encoding,
            config.compression_level,
            self.header_context.as_ref(),
            true,
        )?);
        self.parts.lock().insert(first, Arc::clone(&part));
        sync_directory(&self.dir)?;

        self.stats.record_rotation();
        tracing::info!(
            domain = %self.name,
            closed = %full.range(),
            start = first,
            "rotated part"
        );
        Ok(part)
    }

    fn trigger_sync_now(self: &Arc<Self>) -> CoreResult<()> {
        let part = self.active_part()?;
        let mut pending = self.sync_pending.lock();
        if *pending {
            return Ok(());
        }
        *pending = true;

        let shared = Arc::clone(self);
        let submitted = self.sync_executor.execute(Box::new(move || {
            match part.sync() {
                Ok(()) => shared.stats.record_sync(),
                Err(err) => {
                    tracing::warn!(domain = %shared.name, error = %err, "background sync failed");
                }
            }
            *shared.sync_pending.lock() = false;
            shared.sync_done.notify_all();
        }));
        if let Err(err) = submitted {
            *pending = false;
            self.sync_done.notify_all();
            return Err(err);
        }
        Ok(())
    }

    fn wait_pending_sync(&self) {
        let mut pending = self.sync_pending.lock();
        while *pending {
            self.sync_done.wait(&mut pending);
        }
    }

    fn clean_sessions(&self) {
        self.sessions.lock().retain(|_, session| !session.is_done());
    }
}

/// Opens the parts starting at `serials` in parallel on `executor`.
fn load_parts(
    name: &str,
    dir: &Path,
    serials: &[SerialNum],
    config: &DomainConfig,
    header_context: &Arc<dyn FileHeaderContext>,
    executor: &dyn Executor,
) -> CoreResult<Vec<Arc<DomainPart>>> {
    let (sender, receiver) = mpsc::channel();
    let last = serials.last().copied();
    for &serial in serials {
        let sender = sender.clone();
        let name = name.to_string();
        let dir = dir.to_path_buf();
        let header_context = Arc::clone(header_context);
        let encoding = config.encoding;
        let compression_level = config.compression_level;
        executor.execute(Box::new(move || {
            let result = DomainPart::open(
                &name,
                &dir,
                serial,
                encoding,
                compression_level,
                header_context.as_ref(),
                Some(serial) == last,
            );
            let _ = sender.send((serial, result));
        }))?;
    }
    drop(sender);
    executor.sync();

    let mut loaded: Vec<_> = receiver.try_iter().collect();
    if loaded.len() != serials.len() {
        return Err(CoreError::part_corruption(format!(
            "loaded {} of {} parts of {name}",
            loaded.len(),
            serials.len()
        )));
    }
    loaded.sort_unstable_by_key(|(serial, _)| *serial);
    loaded
        .into_iter()
        .map(|(_, result)| result.map(Arc::new))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::{tempdir, TempDir};
    use translog_codec::Entry;

    fn executors() -> (Arc<dyn Executor>, Arc<dyn Executor>) {
        (
            Arc::new(ThreadExecutor::new("test-sync", 1).unwrap()),
            Arc::new(ThreadExecutor::new("test-visit", 2).unwrap()),
        )
    }

    fn open(dir: &TempDir, config: DomainConfig) -> Domain {
        let (sync, visit) = executors();
        Domain::open("docs", dir.path(), sync, visit, config).unwrap()
    }

    fn packet(from: u64, to: u64) -> Packet {
        let mut packet = Packet::new();
        for serial in from..=to {
            packet.add(&Entry::new(serial, 0, vec![0u8; 32])).unwrap();
        }
        packet
    }

    fn wait_persisted(domain: &Domain) {
        domain.committer.sync();
    }

    #[test]
    fn fresh_domain_has_one_empty_part() {
        let dir = tempdir().unwrap();
        let domain = open(&dir, DomainConfig::default());

        assert!(dir.path().join("docs").join("docs-0000000000000000").exists());
        assert_eq!(domain.begin(), 0);
        assert_eq!(domain.end(), 0);
        assert_eq!(domain.size(), 0);
        assert_eq!(domain.last_serial(), 0);
        assert_eq!(domain.domain_info().parts.len(), 1);
    }

    #[test]
    fn commit_rejects_empty_and_out_of_order() {
        let dir = tempdir().unwrap();
        let domain = open(&dir, DomainConfig::default());

        assert!(matches!(
            domain.commit(&Packet::new(), Box::new(|_| {})),
            Err(CoreError::InvalidOperation { .. })
        ));
        domain.commit(&packet(1, 5), Box::new(|_| {})).unwrap();
        assert!(matches!(
            domain.commit(&packet(5, 6), Box::new(|_| {})),
            Err(CoreError::OutOfOrder { incoming: 5, last: 5 })
        ));
        assert_eq!(domain.last_serial(), 5);
    }

    #[test]
    fn commit_if_stale_flushes_old_chunk() {
        let dir = tempdir().unwrap();
        let domain = open(&dir, DomainConfig::default().chunk_age_limit(Duration::ZERO));

        assert!(!domain.commit_if_stale().unwrap());
        domain.commit(&packet(1, 3), Box::new(|_| {})).unwrap();
        thread::sleep(Duration::from_millis(2));
        assert!(domain.commit_if_stale().unwrap());
        wait_persisted(&domain);

        assert_eq!(domain.end(), 3);
        assert_eq!(domain.size(), 3);
        assert_eq!(domain.stats().snapshot().chunks_persisted, 1);
    }

    #[test]
    fn find_part_skips_gaps() {
        let dir = tempdir().unwrap();
        let domain = open(&dir, DomainConfig::default().chunk_size_limit(0).part_size_limit(0));
        domain.commit(&packet(1, 10), Box::new(|_| {})).unwrap();
        domain.commit(&packet(11, 20), Box::new(|_| {})).unwrap();
        wait_persisted(&domain);

        let shared = &domain.shared;
        assert_eq!(shared.find_part(5).unwrap().start_serial(), 0);
        assert_eq!(shared.find_part(15).unwrap().start_serial(), 11);
        assert!(shared.find_part(21).is_none());
        assert!(shared.is_active_part(&shared.find_part(11).unwrap()));
    }

    #[test]
    fn trigger_sync_now_advances_synced() {
        let dir = tempdir().unwrap();
        let domain = open(&dir, DomainConfig::default().chunk_size_limit(0));
        domain.commit(&packet(1, 4), Box::new(|_| {})).unwrap();
        wait_persisted(&domain);

        domain.trigger_sync_now().unwrap();
        domain.shared.wait_pending_sync();
        assert_eq!(domain.synced(), 4);
        assert_eq!(domain.stats().snapshot().syncs, 1);
    }

    #[test]
    fn unknown_sessions() {
        let dir = tempdir().unwrap();
        let domain = open(&dir, DomainConfig::default());

        let err = domain.start_session(SessionId::new(42)).unwrap_err();
        assert!(matches!(err, CoreError::SessionNotFound { .. }));
        domain.close_session(SessionId::new(42)).unwrap();
        assert_eq!(domain.find_oldest_active_visit(), SerialNum::MAX);
    }

    struct Discard;

    impl Destination for Discard {
        fn send(&mut self, _session: SessionId, _domain: &str, _packet: &Packet) -> bool {
            true
        }

        fn send_done(&mut self, _session: SessionId, _domain: &str) -> bool {
            true
        }
    }

    #[test]
    fn close_session_from_commit_callback() {
        let dir = tempdir().unwrap();
        let domain = Arc::new(open(&dir, DomainConfig::default().chunk_size_limit(0)));
        let id = domain.visit(1, SerialNum::MAX, Box::new(Discard));
        assert_eq!(domain.session_state(id), Some(SessionState::Created));

        let (done_tx, done_rx) = mpsc::channel();
        let weak = Arc::downgrade(&domain);
        domain
            .commit(
                &packet(1, 2),
                Box::new(move |_| {
                    let closed = weak.upgrade().map(|domain| domain.close_session(id));
                    let _ = done_tx.send(closed);
                }),
            )
            .unwrap();

        let closed = done_rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert!(matches!(closed, Some(Ok(()))));
        assert_eq!(domain.session_state(id), None);
        assert_eq!(domain.stats().snapshot().sessions_closed, 1);
    }
}
