use std::io::Write;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use stream_config::{StreamConfig, stream_config};
use tracing::{debug, error, info, warn};
use transfer_engine::{ChunkPriority, DownloadLayout, EngineEvent, EngineStatus, FileEntry, TransferEngine};
use utils::ByteSize;

use crate::chunk_store::ChunkStore;
use crate::error::{Result, StreamError};
use crate::flush::{DrainOutcome, FlushController, StreamCursor};
use crate::output::{StreamOutput, new_output_writer};
use crate::prebuffer::PrebufferGate;
use crate::scheduler::RequestScheduler;
use crate::stream_range::StreamRange;

/// Lifecycle of one stream. `Buffering` and `Streaming` are the two faces of
/// a started stream; pausing is an orthogonal flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum StreamState {
    /// Accepting configuration; the session has not begun.
    Configuring = 0,
    /// Session running, prebuffer not yet satisfied.
    Buffering = 1,
    /// Delivering bytes to the consumer.
    Streaming = 2,
    /// The file's final byte was delivered and the session is torn down.
    Finished = 3,
    /// Torn down after an engine failure or a shutdown request.
    Aborted = 4,
}

impl StreamState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => StreamState::Configuring,
            1 => StreamState::Buffering,
            2 => StreamState::Streaming,
            3 => StreamState::Finished,
            _ => StreamState::Aborted,
        }
    }

    pub fn is_started(&self) -> bool {
        matches!(self, StreamState::Buffering | StreamState::Streaming)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, StreamState::Finished | StreamState::Aborted)
    }
}

/// State observable from outside the poll-loop thread.
struct Shared {
    state: AtomicU8,
    paused: AtomicBool,
    cancel: AtomicBool,
    store: OnceLock<Arc<ChunkStore>>,
    range: OnceLock<StreamRange>,
}

impl Shared {
    fn new() -> Self {
        Self {
            state: AtomicU8::new(StreamState::Configuring as u8),
            paused: AtomicBool::new(false),
            cancel: AtomicBool::new(false),
            store: OnceLock::new(),
            range: OnceLock::new(),
        }
    }

    fn state(&self) -> StreamState {
        StreamState::from_u8(self.state.load(Ordering::Relaxed))
    }

    fn set_state(&self, state: StreamState) {
        self.state.store(state as u8, Ordering::Relaxed);
    }
}

/// Cloneable handle for controlling and observing a running stream from other
/// threads while the poll loop owns the orchestrator.
#[derive(Clone)]
pub struct StreamControl {
    engine: Arc<dyn TransferEngine>,
    shared: Arc<Shared>,
}

impl StreamControl {
    /// Suspends engine fetching. Buffered chunks that are already complete
    /// keep flushing; only acquisition of new data stops.
    pub fn pause(&self) {
        if !self.shared.paused.swap(true, Ordering::Relaxed) {
            self.engine.pause_fetching();
            info!("Stream paused");
        }
    }

    pub fn resume(&self) {
        if self.shared.paused.swap(false, Ordering::Relaxed) {
            self.engine.resume_fetching();
            info!("Stream resumed");
        }
    }

    /// Requests cooperative shutdown; the poll loop tears the session down
    /// between deliveries and finishes as `Aborted`.
    pub fn shutdown(&self) {
        info!("Stream shutdown requested");
        self.shared.cancel.store(true, Ordering::Relaxed);
    }

    pub fn state(&self) -> StreamState {
        self.shared.state()
    }

    pub fn is_paused(&self) -> bool {
        self.shared.paused.load(Ordering::Relaxed)
    }

    /// Bytes of undelivered chunk data currently buffered.
    pub fn memory_in_use(&self) -> u64 {
        self.shared.store.get().map(|s| s.memory_in_use()).unwrap_or(0)
    }

    /// The stream's chunk range; available once the stream has started.
    pub fn stream_range(&self) -> Option<StreamRange> {
        self.shared.range.get().copied()
    }

    /// Ascending (chunk index, buffered length) listing for diagnostics.
    pub fn buffered_chunks(&self) -> Vec<(u64, usize)> {
        self.shared.store.get().map(|s| s.snapshot()).unwrap_or_default()
    }

    /// Engine-level progress snapshot.
    pub fn status(&self) -> EngineStatus {
        self.engine.status()
    }
}

/// Owns configuration and lifecycle of one stream and drives the poll loop
/// that turns engine completion events into ordered consumer deliveries.
///
/// Configuration happens through the `with_*` builders before [`run`] is
/// called; `run` consumes the orchestrator, so configuring or starting an
/// already-started stream is unrepresentable. Control after start goes
/// through [`StreamControl`].
///
/// [`run`]: StreamOrchestrator::run
pub struct StreamOrchestrator {
    engine: Arc<dyn TransferEngine>,
    layout: DownloadLayout,
    file_index: usize,
    output: Option<StreamOutput>,
    config: StreamingConfig,
    download_rate_limit: u64,
    upload_rate_limit: u64,
    shared: Arc<Shared>,
}

impl StreamOrchestrator {
    /// Creates an orchestrator for one file of the download described by
    /// `layout`, with defaults taken from the process configuration.
    pub fn new(engine: Arc<dyn TransferEngine>, layout: DownloadLayout) -> Self {
        let defaults = stream_config();

        Self {
            engine,
            layout,
            file_index: 0,
            output: None,
            config: defaults.streaming.clone(),
            download_rate_limit: defaults.engine.download_rate_limit,
            upload_rate_limit: defaults.engine.upload_rate_limit,
            shared: Arc::new(Shared::new()),
        }
    }

    /// Selects which file of the download to stream.
    pub fn with_file_index(self, file_index: usize) -> Self {
        Self { file_index, ..self }
    }

    /// Sets the consumer destination. Mandatory; `run` fails without it.
    pub fn with_output(self, output: StreamOutput) -> Self {
        Self {
            output: Some(output),
            ..self
        }
    }

    /// Replaces the whole streaming configuration group.
    pub fn with_config(self, config: impl AsRef<StreamingConfig>) -> Self {
        Self {
            config: config.as_ref().clone(),
            ..self
        }
    }

    pub fn with_memory_budget(mut self, budget: ByteSize) -> Self {
        self.config.memory_budget = budget;
        self
    }

    pub fn with_prebuffer_chunks(mut self, chunks: u64) -> Self {
        self.config.prebuffer_chunks = chunks;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.config.poll_interval = interval;
        self
    }

    /// Transfer rate limits in bytes per second; zero means unlimited.
    pub fn with_rate_limits(mut self, download: u64, upload: u64) -> Self {
        self.download_rate_limit = download;
        self.upload_rate_limit = upload;
        self
    }

    /// A control handle valid for the life of the stream.
    pub fn control(&self) -> StreamControl {
        StreamControl {
            engine: self.engine.clone(),
            shared: self.shared.clone(),
        }
    }

    /// Runs the stream to completion on a dedicated blocking thread and
    /// returns the number of bytes delivered.
    pub async fn run(self) -> Result<u64> {
        tokio::task::spawn_blocking(move || self.run_blocking())
            .await
            .map_err(|e| StreamError::InternalError(format!("Poll loop task failed: {e}")))?
    }

    /// Synchronous variant of [`run`]; the calling thread hosts the poll loop
    /// and every consumer delivery.
    ///
    /// [`run`]: StreamOrchestrator::run
    pub fn run_blocking(mut self) -> Result<u64> {
        // Configuration problems are reported synchronously, before any
        // session state exists.
        let output = self
            .output
            .take()
            .ok_or_else(|| StreamError::ConfigurationError("no output sink configured".to_string()))?;

        let entry = self
            .layout
            .file(self.file_index)
            .ok_or_else(|| {
                StreamError::ConfigurationError(format!(
                    "file index {} out of range ({} files in download)",
                    self.file_index,
                    self.layout.files.len()
                ))
            })?
            .clone();

        let range = StreamRange::compute(entry.offset, entry.size, self.layout.chunk_size)?;

        let engine = self.engine.clone();
        let shared = self.shared.clone();

        let result = self.stream_file(output, entry, range);

        engine.shutdown_session();
        if let Some(store) = shared.store.get() {
            store.clear();
        }

        match result {
            Ok(bytes) => {
                shared.set_state(StreamState::Finished);
                info!(bytes_delivered = bytes, "Stream finished");
                Ok(bytes)
            },
            Err(err) => {
                shared.set_state(StreamState::Aborted);
                error!(error = %err, "Stream aborted");
                Err(err)
            },
        }
    }

    fn stream_file(&self, output: StreamOutput, entry: FileEntry, range: StreamRange) -> Result<u64> {
        info!(
            file = %entry.name,
            file_index = self.file_index,
            byte_offset = entry.offset,
            file_size = entry.size,
            chunk_size = self.layout.chunk_size,
            first_chunk = range.first_chunk(),
            last_chunk = range.last_chunk(),
            "Starting stream session"
        );

        let budget = self.config.memory_budget.as_u64();
        if budget < self.layout.chunk_size {
            warn!(
                budget,
                chunk_size = self.layout.chunk_size,
                "Memory budget is below one chunk; no look-ahead will be requested"
            );
        }

        let store = Arc::new(ChunkStore::new(range, budget));
        let _ = self.shared.store.set(store.clone());
        let _ = self.shared.range.set(range);

        let mut sink = new_output_writer(output)?;

        self.engine
            .set_download_rate_limit((self.download_rate_limit > 0).then_some(self.download_rate_limit));
        self.engine
            .set_upload_rate_limit((self.upload_rate_limit > 0).then_some(self.upload_rate_limit));

        self.engine.begin_session(self.file_index, store.clone())?;

        // Nothing outside the demand window gets fetched; the first chunk is
        // forced so data starts flowing before the first refill.
        for index in 0..self.layout.chunk_count() {
            self.engine.set_chunk_priority(index, ChunkPriority::DoNotFetch);
        }
        self.engine.set_chunk_deadline(range.first_chunk(), self.config.deadline_base);
        self.engine.set_chunk_priority(range.first_chunk(), ChunkPriority::Urgent);

        let mut scheduler = RequestScheduler::new(range, budget, self.config.deadline_base, self.config.deadline_step);
        scheduler.note_forced(range.first_chunk());

        let mut gate = PrebufferGate::new(self.config.prebuffer_chunks);
        let mut cursor = StreamCursor::default();
        let mut flush = FlushController::new(range);

        self.shared.set_state(StreamState::Buffering);

        if range.file_size() == 0 {
            info!("Empty file; nothing to deliver");
            return Ok(0);
        }

        let mut download_finished = false;

        loop {
            if self.shared.cancel.load(Ordering::Relaxed) {
                return Err(StreamError::Aborted);
            }

            let mut complete = false;

            for event in self.engine.poll_events() {
                match event {
                    EngineEvent::ChunkFinished(index) => {
                        debug!(chunk = index, "Chunk finished");
                        complete = self.advance(&mut gate, &mut cursor, &mut flush, &store, &mut *sink, &mut scheduler, &range)?;
                        if complete {
                            break;
                        }
                    },
                    EngineEvent::DownloadFinished => {
                        info!("Engine reports download finished");
                        download_finished = true;
                    },
                    EngineEvent::Error(message) => {
                        return Err(StreamError::SessionFailure(message));
                    },
                }
            }

            // One unconditional pass per poll; covers chunks that complete
            // without a distinct event.
            if !complete {
                complete = self.advance(&mut gate, &mut cursor, &mut flush, &store, &mut *sink, &mut scheduler, &range)?;
            }

            // Keep the window requested even before the first delivery.
            scheduler.refill(&cursor, self.engine.as_ref());

            if complete {
                sink.flush()?;
                return Ok(flush.bytes_delivered());
            }

            if download_finished {
                return Err(StreamError::InternalError(
                    "download finished before the stream was fully delivered".to_string(),
                ));
            }

            std::thread::sleep(self.config.poll_interval);
        }
    }

    /// Gate check plus one drain pass; returns whether the stream completed.
    #[allow(clippy::too_many_arguments)]
    fn advance(
        &self,
        gate: &mut PrebufferGate,
        cursor: &mut StreamCursor,
        flush: &mut FlushController,
        store: &ChunkStore,
        sink: &mut dyn Write,
        scheduler: &mut RequestScheduler,
        range: &StreamRange,
    ) -> Result<bool> {
        if !gate.is_satisfied(cursor.has_delivered(), range, |index| self.engine.is_chunk_complete(index)) {
            return Ok(false);
        }

        let outcome = flush.drain(cursor, store, self.engine.as_ref(), sink, scheduler, &self.shared.cancel)?;

        if cursor.has_delivered() && self.shared.state() == StreamState::Buffering {
            self.shared.set_state(StreamState::Streaming);
            info!("Prebuffer complete; streaming");
        }

        Ok(outcome == DrainOutcome::Complete)
    }
}
