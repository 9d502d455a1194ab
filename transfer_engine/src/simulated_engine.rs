use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::Bytes;
use tracing::debug;

use crate::error::{EngineError, Result};
use crate::interface::{ChunkPriority, ChunkSink, EngineEvent, EngineStatus, TransferEngine};
use crate::layout::DownloadLayout;

/// An in-process transfer engine with fully scripted behavior, for testing the
/// streaming pipeline without a swarm.
///
/// Chunks "arrive" in a configurable order, restricted to chunks whose
/// priority has been raised above [`ChunkPriority::DoNotFetch`]. Each arrival
/// writes the chunk's bytes into the registered sink as two out-of-order
/// sub-piece writes, marks the chunk verified, and surfaces a
/// `ChunkFinished` event on the next poll.
pub struct SimulatedEngine {
    layout: DownloadLayout,
    content: Bytes,
    paused: AtomicBool,
    pause_calls: AtomicU32,
    resume_calls: AtomicU32,
    shutdown_calls: AtomicU32,
    inner: Mutex<Inner>,
}

struct Inner {
    sink: Option<Arc<dyn ChunkSink>>,
    arrival_order: Vec<u64>,
    batch_size: usize,
    unsolicited: Vec<u64>,
    fail_after: Option<usize>,
    completions: usize,
    priorities: BTreeMap<u64, ChunkPriority>,
    deadlines: BTreeMap<u64, Duration>,
    complete: HashSet<u64>,
    suppress_chunk_events: bool,
    download_finished_emitted: bool,
    max_outstanding: usize,
    download_rate_limit: Option<u64>,
    upload_rate_limit: Option<u64>,
}

impl SimulatedEngine {
    /// Creates an engine serving `content` as the download's full byte
    /// content. By default every chunk arrives in ascending order and all
    /// pending arrivals are delivered on each poll.
    pub fn new(layout: DownloadLayout, content: Bytes) -> Self {
        let arrival_order = (0..layout.chunk_count()).collect();

        Self {
            layout,
            content,
            paused: AtomicBool::new(false),
            pause_calls: AtomicU32::new(0),
            resume_calls: AtomicU32::new(0),
            shutdown_calls: AtomicU32::new(0),
            inner: Mutex::new(Inner {
                sink: None,
                arrival_order,
                batch_size: usize::MAX,
                unsolicited: Vec::new(),
                fail_after: None,
                completions: 0,
                priorities: BTreeMap::new(),
                deadlines: BTreeMap::new(),
                complete: HashSet::new(),
                suppress_chunk_events: false,
                download_finished_emitted: false,
                max_outstanding: 0,
                download_rate_limit: None,
                upload_rate_limit: None,
            }),
        }
    }

    /// Overrides the order in which requested chunks finish.
    pub fn with_arrival_order(self, order: Vec<u64>) -> Self {
        self.inner.lock().unwrap().arrival_order = order;
        self
    }

    /// Limits how many chunks may finish per poll.
    pub fn with_batch_size(self, batch_size: usize) -> Self {
        self.inner.lock().unwrap().batch_size = batch_size;
        self
    }

    /// Chunks written to the sink on the first poll regardless of their
    /// priority; models opportunistic or misbehaving deliveries.
    pub fn with_unsolicited_writes(self, chunks: Vec<u64>) -> Self {
        self.inner.lock().unwrap().unsolicited = chunks;
        self
    }

    /// Emits a fatal session error once this many chunks have finished.
    pub fn with_failure_after(self, completions: usize) -> Self {
        self.inner.lock().unwrap().fail_after = Some(completions);
        self
    }

    /// Suppresses per-chunk completion events; chunks still arrive and verify.
    pub fn with_suppressed_chunk_events(self) -> Self {
        self.inner.lock().unwrap().suppress_chunk_events = true;
        self
    }

    // ---- test introspection ----

    pub fn completed_count(&self) -> usize {
        self.inner.lock().unwrap().complete.len()
    }

    /// The highest number of chunks that were simultaneously requested
    /// (priority above DoNotFetch) but not yet complete.
    pub fn max_outstanding_requests(&self) -> usize {
        self.inner.lock().unwrap().max_outstanding
    }

    pub fn priority(&self, index: u64) -> ChunkPriority {
        self.inner.lock().unwrap().priorities.get(&index).copied().unwrap_or_default()
    }

    pub fn deadline(&self, index: u64) -> Option<Duration> {
        self.inner.lock().unwrap().deadlines.get(&index).copied()
    }

    pub fn pause_calls(&self) -> u32 {
        self.pause_calls.load(Ordering::Relaxed)
    }

    pub fn resume_calls(&self) -> u32 {
        self.resume_calls.load(Ordering::Relaxed)
    }

    pub fn shutdown_calls(&self) -> u32 {
        self.shutdown_calls.load(Ordering::Relaxed)
    }

    pub fn download_rate_limit(&self) -> Option<u64> {
        self.inner.lock().unwrap().download_rate_limit
    }

    pub fn upload_rate_limit(&self) -> Option<u64> {
        self.inner.lock().unwrap().upload_rate_limit
    }

    // ---- internals ----

    fn chunk_bytes(&self, index: u64) -> Bytes {
        let start = index * self.layout.chunk_size;
        if start >= self.content.len() as u64 {
            // A chunk the content does not cover; only reachable through
            // unsolicited writes targeting indices past the download end.
            return Bytes::from(vec![0u8; self.layout.chunk_size as usize]);
        }

        let end = (start + self.layout.chunk_size).min(self.content.len() as u64);
        self.content.slice(start as usize..end as usize)
    }

    fn deliver(&self, inner: &mut Inner, index: u64) {
        let Some(sink) = inner.sink.clone() else {
            return;
        };

        let data = self.chunk_bytes(index);
        let mid = data.len() / 2;

        // Sub-piece writes land tail-first, the way a swarm interleaves them.
        sink.write(index, &data[mid..], mid);
        sink.write(index, &data[..mid], 0);

        inner.complete.insert(index);
        inner.completions += 1;

        debug!(chunk = index, "simulated chunk finished");
    }

    fn failure_event(inner: &Inner) -> Option<EngineEvent> {
        match inner.fail_after {
            Some(n) if inner.completions >= n => Some(EngineEvent::Error("simulated session failure".to_string())),
            _ => None,
        }
    }
}

impl TransferEngine for SimulatedEngine {
    fn begin_session(&self, file_index: usize, sink: Arc<dyn ChunkSink>) -> Result<()> {
        if file_index >= self.layout.files.len() {
            return Err(EngineError::InvalidFileIndex(file_index));
        }

        debug!(file_index, "simulated session started");
        self.inner.lock().unwrap().sink = Some(sink);
        Ok(())
    }

    fn poll_events(&self) -> Vec<EngineEvent> {
        let mut inner = self.inner.lock().unwrap();

        if inner.sink.is_none() {
            return Vec::new();
        }

        let mut events = Vec::new();

        for index in std::mem::take(&mut inner.unsolicited) {
            self.deliver(&mut inner, index);
            if !inner.suppress_chunk_events {
                events.push(EngineEvent::ChunkFinished(index));
            }
        }

        if self.paused.load(Ordering::Relaxed) {
            return events;
        }

        if let Some(event) = Self::failure_event(&inner) {
            events.push(event);
            return events;
        }

        let mut delivered = 0;
        for index in inner.arrival_order.clone() {
            if delivered >= inner.batch_size {
                break;
            }
            if inner.complete.contains(&index) {
                continue;
            }
            if inner.priorities.get(&index).copied().unwrap_or_default() == ChunkPriority::DoNotFetch {
                continue;
            }

            self.deliver(&mut inner, index);
            delivered += 1;

            if !inner.suppress_chunk_events {
                events.push(EngineEvent::ChunkFinished(index));
            }
            if let Some(event) = Self::failure_event(&inner) {
                events.push(event);
                return events;
            }
        }

        if !inner.download_finished_emitted {
            let all_done = inner.arrival_order.iter().all(|i| inner.complete.contains(i));
            if all_done {
                inner.download_finished_emitted = true;
                events.push(EngineEvent::DownloadFinished);
            }
        }

        events
    }

    fn is_chunk_complete(&self, index: u64) -> bool {
        self.inner.lock().unwrap().complete.contains(&index)
    }

    fn set_chunk_priority(&self, index: u64, priority: ChunkPriority) {
        let mut inner = self.inner.lock().unwrap();
        inner.priorities.insert(index, priority);

        let outstanding = inner
            .priorities
            .iter()
            .filter(|&(i, &p)| p != ChunkPriority::DoNotFetch && !inner.complete.contains(i))
            .count();
        inner.max_outstanding = inner.max_outstanding.max(outstanding);
    }

    fn set_chunk_deadline(&self, index: u64, deadline: Duration) {
        self.inner.lock().unwrap().deadlines.insert(index, deadline);
    }

    fn set_download_rate_limit(&self, limit: Option<u64>) {
        self.inner.lock().unwrap().download_rate_limit = limit;
    }

    fn set_upload_rate_limit(&self, limit: Option<u64>) {
        self.inner.lock().unwrap().upload_rate_limit = limit;
    }

    fn pause_fetching(&self) {
        self.paused.store(true, Ordering::Relaxed);
        self.pause_calls.fetch_add(1, Ordering::Relaxed);
    }

    fn resume_fetching(&self) {
        self.paused.store(false, Ordering::Relaxed);
        self.resume_calls.fetch_add(1, Ordering::Relaxed);
    }

    fn shutdown_session(&self) {
        self.shutdown_calls.fetch_add(1, Ordering::Relaxed);
        self.inner.lock().unwrap().sink = None;
    }

    fn status(&self) -> EngineStatus {
        let inner = self.inner.lock().unwrap();
        EngineStatus {
            completed_chunks: inner.complete.len() as u64,
            total_chunks: self.layout.chunk_count(),
            download_rate: 0,
            upload_rate: 0,
            paused: self.paused.load(Ordering::Relaxed),
            finished: inner.download_finished_emitted,
        }
    }
}
