use std::sync::Arc;
use std::time::Duration;

use crate::error::Result;

/// Fetch priority of a single chunk, as understood by the engine's piece
/// picker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChunkPriority {
    /// The engine must not spend peer capacity on this chunk.
    #[default]
    DoNotFetch,
    /// Normal fetch priority; the chunk is inside the active request window.
    Fetch,
    /// Fetch ahead of everything else; used to get a stream's first chunk
    /// moving immediately.
    Urgent,
}

/// One entry of a polled completion-event batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    /// A chunk has been fully received and verified.
    ChunkFinished(u64),
    /// Every selected chunk has been received.
    DownloadFinished,
    /// The session hit an unrecoverable error.
    Error(String),
}

/// Point-in-time snapshot of engine-level progress.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EngineStatus {
    pub completed_chunks: u64,
    pub total_chunks: u64,
    /// Current transfer rates in bytes per second.
    pub download_rate: u64,
    pub upload_rate: u64,
    pub paused: bool,
    pub finished: bool,
}

/// Storage hook the engine deposits received sub-pieces into. The engine may
/// call this from its own worker threads; implementations synchronize
/// internally.
pub trait ChunkSink: Send + Sync + 'static {
    /// Copy `data` into the chunk's buffer at `offset` within the chunk.
    /// Returns the number of bytes accepted; zero means the write was
    /// rejected.
    fn write(&self, index: u64, data: &[u8], offset: usize) -> usize;

    /// Whether any data for the chunk is buffered.
    fn has_chunk(&self, index: u64) -> bool;
}

/// Capability set of the external swarm/transfer engine: peer discovery, wire
/// protocol and chunk verification live behind this boundary. All methods are
/// callable from any thread; the engine synchronizes internally.
pub trait TransferEngine: Send + Sync {
    /// Start fetching the given file of the download, depositing received
    /// sub-pieces into `sink`.
    fn begin_session(&self, file_index: usize, sink: Arc<dyn ChunkSink>) -> Result<()>;

    /// Drain the engine's pending completion events. Non-blocking; returns an
    /// empty batch when nothing happened since the last poll.
    fn poll_events(&self) -> Vec<EngineEvent>;

    /// Whether the chunk has been fully received and verified.
    fn is_chunk_complete(&self, index: u64) -> bool;

    fn set_chunk_priority(&self, index: u64, priority: ChunkPriority);

    /// Attach a fetch urgency hint; chunks with smaller deadlines are fetched
    /// first from the available peers.
    fn set_chunk_deadline(&self, index: u64, deadline: Duration);

    /// Transfer rate limits in bytes per second; `None` lifts the limit.
    fn set_download_rate_limit(&self, limit: Option<u64>);
    fn set_upload_rate_limit(&self, limit: Option<u64>);

    /// Suspend fetching without discarding session state.
    fn pause_fetching(&self);
    fn resume_fetching(&self);

    /// Tear down the session and release engine-side resources.
    fn shutdown_session(&self);

    fn status(&self) -> EngineStatus;
}
