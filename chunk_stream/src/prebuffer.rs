use tracing::info;

use crate::stream_range::StreamRange;

/// Admission gate for the first delivery: holds the stream back until a run
/// of consecutive leading chunks is complete, so playback does not start and
/// immediately starve.
///
/// Once satisfied the gate stays satisfied for the life of the stream; there
/// is no re-buffering mid-stream.
pub struct PrebufferGate {
    prebuffer_count: u64,
    satisfied: bool,
}

impl PrebufferGate {
    pub fn new(prebuffer_count: u64) -> Self {
        Self {
            prebuffer_count,
            satisfied: prebuffer_count == 0,
        }
    }

    /// Checks the gate. `is_complete` is the engine's chunk-completeness
    /// oracle; buffered-but-unverified chunks do not count. The demanded run
    /// must start exactly at the range's first chunk, and is clamped to the
    /// number of chunks the file actually spans.
    pub fn is_satisfied<F>(&mut self, has_delivered: bool, range: &StreamRange, is_complete: F) -> bool
    where
        F: Fn(u64) -> bool,
    {
        if self.satisfied {
            return true;
        }

        if has_delivered {
            self.satisfied = true;
            return true;
        }

        let wanted = self.prebuffer_count.min(range.data_chunk_count());
        let first = range.first_chunk();

        let run_complete = (first..first + wanted).all(&is_complete);
        if run_complete {
            info!(prebuffered_chunks = wanted, "Prebuffer satisfied; starting delivery");
            self.satisfied = true;
        }

        self.satisfied
    }
}
