//! In-memory accumulation of commits awaiting persistence.

use crate::error::{CoreError, CoreResult};
use std::sync::Arc;
use std::time::{Duration, Instant};
use translog_codec::Packet;

/// Outcome delivered to a commit callback.
///
/// `Ok(())` means the batch was appended to its part; see the crate-level
/// durability notes for what that implies on disk.
pub type CommitResult = Result<(), Arc<CoreError>>;

/// Callback invoked exactly once when a committed batch has been persisted.
pub type DoneCallback = Box<dyn FnOnce(CommitResult) + Send + 'static>;

/// Merged packets plus the callbacks of the commits that produced them.
///
/// A chunk is filled under the domain's chunk lock, then moved as a whole
/// into the commit pipeline. Nothing else keeps a reference to it.
#[derive(Default)]
pub(crate) struct Chunk {
    packet: Packet,
    callbacks: Vec<DoneCallback>,
    first_arrival: Option<Instant>,
}

impl Chunk {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Merges `packet` and queues its callback.
    ///
    /// On error the chunk is unchanged and the callback is dropped unrun.
    pub(crate) fn add(&mut self, packet: &Packet, on_done: DoneCallback) -> CoreResult<()> {
        self.packet.merge(packet)?;
        if self.callbacks.is_empty() {
            self.first_arrival = Some(Instant::now());
        }
        self.callbacks.push(on_done);
        Ok(())
    }

    /// Time since the first commit arrived; zero for an empty chunk.
    pub(crate) fn age(&self) -> Duration {
        self.first_arrival
            .map_or(Duration::ZERO, |arrival| arrival.elapsed())
    }

    pub(crate) fn packet(&self) -> &Packet {
        &self.packet
    }

    pub(crate) fn size_bytes(&self) -> usize {
        self.packet.size_bytes()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.packet.is_empty()
    }

    pub(crate) fn num_callbacks(&self) -> usize {
        self.callbacks.len()
    }

    /// Fires every callback in insertion order, consuming the chunk.
    pub(crate) fn release(self, result: &CommitResult) {
        for callback in self.callbacks {
            callback(result.clone());
        }
    }
}

impl std::fmt::Debug for Chunk {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Chunk")
            .field("range", &self.packet.range())
            .field("entries", &self.packet.size())
            .field("bytes", &self.packet.size_bytes())
            .field("callbacks", &self.callbacks.len())
            .finish()
    }
}
