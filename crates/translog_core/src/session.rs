//! Replay sessions.
//!
//! A session streams the entries of a domain with serial in `[from, to)`
//! to a [`Destination`]. It is registered by `visit`, runs as one task on
//! the session executor after `start_session`, and ends either
//! [`Finished`](SessionState::Finished) (the range was delivered, or the
//! reader went away) or [`InSync`](SessionState::InSync) (it caught up
//! with the readable tail of the log).

use crate::domain::DomainShared;
use crate::error::CoreResult;
use crate::types::SessionId;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use translog_codec::{Packet, SerialNum};

/// Upper bound on the encoded size of one packet handed to a destination.
const MAX_PACKET_BYTES: usize = 1024 * 1024;

/// Receiver of the packets streamed by a session.
///
/// Returning `false` from [`send`](Self::send) or
/// [`send_done`](Self::send_done) ends the session.
pub trait Destination: Send {
    /// Delivers the next packet of `domain`.
    fn send(&mut self, session: SessionId, domain: &str, packet: &Packet) -> bool;

    /// Signals that the session has delivered everything it will deliver.
    fn send_done(&mut self, session: SessionId, domain: &str) -> bool;

    /// Whether the receiving end is still there.
    fn connected(&self) -> bool {
        true
    }

    /// Whether the destination is healthy.
    fn ok(&self) -> bool {
        true
    }
}

/// Lifecycle of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Registered by `visit`, not started.
    Created,
    /// Streaming.
    Running,
    /// The full range was delivered, or streaming was stopped.
    Finished,
    /// Caught up with the readable tail and idle.
    InSync,
}

/// Why a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Delivered,
    CaughtUp,
    Stopped,
    Refused,
}

pub(crate) struct Session {
    id: SessionId,
    from: SerialNum,
    to: SerialNum,
    destination: Mutex<Box<dyn Destination>>,
    state: Mutex<SessionState>,
    visit_running: AtomicBool,
    stop_requested: AtomicBool,
    start_time: Mutex<Option<Instant>>,
}

impl Session {
    pub(crate) fn new(
        id: SessionId,
        from: SerialNum,
        to: SerialNum,
        destination: Box<dyn Destination>,
    ) -> Self {
        Self {
            id,
            from,
            to,
            destination: Mutex::new(destination),
            state: Mutex::new(SessionState::Created),
            visit_running: AtomicBool::new(false),
            stop_requested: AtomicBool::new(false),
            start_time: Mutex::new(None),
        }
    }

    pub(crate) fn from(&self) -> SerialNum {
        self.from
    }

    pub(crate) fn state(&self) -> SessionState {
        *self.state.lock()
    }

    /// Neither in sync nor finished.
    pub(crate) fn is_active(&self) -> bool {
        !matches!(self.state(), SessionState::InSync | SessionState::Finished)
    }

    pub(crate) fn is_visit_running(&self) -> bool {
        self.visit_running.load(Ordering::Acquire)
    }

    /// Can be dropped from the session table without joining.
    pub(crate) fn is_done(&self) -> bool {
        !self.is_active() && !self.is_visit_running()
    }

    pub(crate) fn request_stop(&self) {
        self.stop_requested.store(true, Ordering::Release);
    }

    /// Marks the session as started, ahead of submitting its task.
    pub(crate) fn mark_started(&self) {
        *self.start_time.lock() = Some(Instant::now());
        *self.state.lock() = SessionState::Running;
        self.visit_running.store(true, Ordering::Release);
    }

    /// Undoes [`mark_started`](Self::mark_started) after a failed submit.
    pub(crate) fn mark_start_failed(&self) {
        *self.state.lock() = SessionState::Finished;
        self.visit_running.store(false, Ordering::Release);
    }

    /// Time since start, zero if never started.
    pub(crate) fn run_time(&self) -> Duration {
        self.start_time
            .lock()
            .map_or(Duration::ZERO, |start| start.elapsed())
    }

    /// Streams the range and records the final state.
    pub(crate) fn run(&self, shared: &DomainShared) {
        let state = match self.stream(shared) {
            Ok(Outcome::Delivered) => self.finish(shared, SessionState::Finished),
            Ok(Outcome::CaughtUp) => self.finish(shared, SessionState::InSync),
            Ok(Outcome::Stopped | Outcome::Refused) => SessionState::Finished,
            Err(err) => {
                tracing::warn!(
                    domain = %shared.name(),
                    session = %self.id,
                    error = %err,
                    "session failed reading log"
                );
                SessionState::Finished
            }
        };
        tracing::debug!(domain = %shared.name(), session = %self.id, ?state, "session ended");
        *self.state.lock() = state;
        self.visit_running.store(false, Ordering::Release);
    }

    fn finish(&self, shared: &DomainShared, state: SessionState) -> SessionState {
        if self.destination.lock().send_done(self.id, shared.name()) {
            state
        } else {
            SessionState::Finished
        }
    }

    fn stream(&self, shared: &DomainShared) -> CoreResult<Outcome> {
        let durable_only = shared.durable_only();
        let mut cursor = self.from;
        loop {
            if self.stop_requested.load(Ordering::Acquire) {
                return Ok(Outcome::Stopped);
            }
            if cursor >= self.to {
                return Ok(Outcome::Delivered);
            }
            let Some(part) = shared.find_part(cursor) else {
                return Ok(Outcome::CaughtUp);
            };

            let packet = part.read(cursor, self.to, durable_only, MAX_PACKET_BYTES)?;
            if packet.is_empty() {
                if part.readable_to(durable_only).saturating_add(1) >= self.to {
                    return Ok(Outcome::Delivered);
                }
                if shared.is_active_part(&part) {
                    return Ok(Outcome::CaughtUp);
                }
                let next = part.range().to().saturating_add(1);
                if next <= cursor {
                    return Ok(Outcome::CaughtUp);
                }
                cursor = next;
                continue;
            }

            let last = packet.range().to();
            let mut destination = self.destination.lock();
            if !destination.send(self.id, shared.name(), &packet)
                || !destination.ok()
                || !destination.connected()
            {
                return Ok(Outcome::Refused);
            }
            cursor = last.saturating_add(1);
        }
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("from", &self.from)
            .field("to", &self.to)
            .field("state", &self.state())
            .field("visit_running", &self.is_visit_running())
            .finish_non_exhaustive()
    }
}
