use std::collections::BTreeSet;
use std::time::Duration;

use tracing::debug;
use transfer_engine::{ChunkPriority, TransferEngine};

use crate::flush::StreamCursor;
use crate::stream_range::StreamRange;

/// A priority raise pushed to the engine for one chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkRequest {
    pub index: u64,
    pub deadline: Duration,
}

/// Computes which chunks to request next and pushes priority/deadline hints
/// to the transfer engine.
///
/// The demand window starts at the next chunk the flush controller needs and
/// holds at most `memory_budget / chunk_size` chunks, so the engine is never
/// asked to fetch more than the stream is willing to hold in memory. Raised
/// indices are remembered per stream instance so a chunk is requested exactly
/// once; priorities are never lowered.
pub struct RequestScheduler {
    range: StreamRange,
    window_size: u64,
    deadline_base: Duration,
    deadline_step: Duration,
    requested: BTreeSet<u64>,
}

impl RequestScheduler {
    pub fn new(range: StreamRange, memory_budget: u64, deadline_base: Duration, deadline_step: Duration) -> Self {
        Self {
            range,
            window_size: memory_budget / range.chunk_size(),
            deadline_base,
            deadline_step,
            requested: BTreeSet::new(),
        }
    }

    pub fn window_size(&self) -> u64 {
        self.window_size
    }

    /// Records a raise performed outside the scheduler (the forced request
    /// for the stream's first chunk at session start).
    pub fn note_forced(&mut self, index: u64) {
        self.requested.insert(index);
    }

    /// Raises priority for every window chunk not yet requested, attaching a
    /// deadline that grows with the chunk's slot so the engine fetches
    /// earlier-needed chunks first. Returns the raises performed.
    pub fn refill(&mut self, cursor: &StreamCursor, engine: &dyn TransferEngine) -> Vec<ChunkRequest> {
        let needed = cursor.needed(&self.range);
        let window_end = needed.saturating_add(self.window_size).min(self.range.last_chunk() + 1);

        let mut raised = Vec::new();

        for (slot, index) in (needed..window_end).enumerate() {
            if self.requested.contains(&index) {
                continue;
            }

            let deadline = self.deadline_base + self.deadline_step * slot as u32;
            engine.set_chunk_deadline(index, deadline);
            engine.set_chunk_priority(index, ChunkPriority::Fetch);
            debug!(chunk = index, deadline_ms = deadline.as_millis() as u64, "Requested chunk");

            self.requested.insert(index);
            raised.push(ChunkRequest { index, deadline });
        }

        // Indices behind the cursor are delivered; drop their bookkeeping.
        self.requested = self.requested.split_off(&needed);

        raised
    }
}
