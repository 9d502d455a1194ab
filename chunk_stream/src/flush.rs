use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::{debug, info};
use transfer_engine::TransferEngine;

use crate::chunk_store::{ChunkStore, PeekOutcome};
use crate::error::Result;
use crate::scheduler::RequestScheduler;
use crate::stream_range::StreamRange;

/// Delivery position within the stream: the highest chunk index delivered so
/// far, or nothing before the first delivery. Advances strictly monotonically.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StreamCursor {
    last_delivered: Option<u64>,
}

impl StreamCursor {
    /// The chunk index that must be delivered next.
    pub fn needed(&self, range: &StreamRange) -> u64 {
        match self.last_delivered {
            Some(index) => index + 1,
            None => range.first_chunk(),
        }
    }

    pub fn has_delivered(&self) -> bool {
        self.last_delivered.is_some()
    }

    pub fn advance(&mut self, index: u64) {
        debug_assert!(self.last_delivered.is_none_or(|last| index > last));
        self.last_delivered = Some(index);
    }
}

/// Result of one drain pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrainOutcome {
    /// Nothing more can be delivered right now: the next chunk is missing,
    /// incomplete, or cancellation was requested.
    Stalled,
    /// The file's final byte has been delivered.
    Complete,
}

/// Drains the chunk store strictly in ascending chunk order, trimming each
/// chunk to the file's byte range and handing the bytes to the consumer.
///
/// The consumer write runs outside the store lock and may block arbitrarily
/// long; a blocking consumer stalls the drain, which is the stream's
/// backpressure mechanism.
pub struct FlushController {
    range: StreamRange,
    bytes_delivered: u64,
}

impl FlushController {
    pub fn new(range: StreamRange) -> Self {
        Self {
            range,
            bytes_delivered: 0,
        }
    }

    pub fn bytes_delivered(&self) -> u64 {
        self.bytes_delivered
    }

    /// Delivers every consecutively available complete chunk starting at the
    /// cursor. After each delivery the scheduler refills the request window
    /// so freed memory budget is reused immediately. Checks `cancel` between
    /// deliveries.
    ///
    /// A consumer write error propagates out; the chunk being delivered is
    /// already evicted at that point and is not replayed.
    pub fn drain(
        &mut self,
        cursor: &mut StreamCursor,
        store: &ChunkStore,
        engine: &dyn TransferEngine,
        sink: &mut dyn Write,
        scheduler: &mut RequestScheduler,
        cancel: &AtomicBool,
    ) -> Result<DrainOutcome> {
        loop {
            if cancel.load(Ordering::Relaxed) {
                return Ok(DrainOutcome::Stalled);
            }

            let needed = cursor.needed(&self.range);

            if store.peek_next(needed) == PeekOutcome::NotResident {
                return Ok(DrainOutcome::Stalled);
            }

            if !engine.is_chunk_complete(needed) {
                debug!(chunk = needed, "Skipping incomplete chunk");
                return Ok(DrainOutcome::Stalled);
            }

            // Takes ownership of the buffer; the chunk is evicted from here on.
            let Some(data) = store.read_and_remove(needed) else {
                return Ok(DrainOutcome::Stalled);
            };

            let span = self.range.flush_span(needed, data.len());
            if !span.is_empty() {
                debug!(chunk = needed, bytes = span.len(), "Flushing chunk");
                sink.write_all(&data[span.clone()])?;
                self.bytes_delivered += span.len() as u64;
            }

            cursor.advance(needed);
            scheduler.refill(cursor, engine);

            if self.bytes_delivered == self.range.file_size() || needed == self.range.last_chunk() {
                info!(
                    bytes_delivered = self.bytes_delivered,
                    last_chunk = needed,
                    "Stream delivery complete"
                );
                return Ok(DrainOutcome::Complete);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::io;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use bytes::Bytes;
    use transfer_engine::{ChunkSink, DownloadLayout, FileEntry, SimulatedEngine};

    use super::*;

    const CHUNK_SIZE: u64 = 16384;

    fn range() -> StreamRange {
        StreamRange::compute(20000, 50000, CHUNK_SIZE).unwrap()
    }

    /// Engine stub where completeness is exactly the scripted set; nothing is
    /// fetched or delivered by it.
    fn oracle_engine(complete: &[u64]) -> SimulatedEngine {
        let layout = DownloadLayout::new(
            CHUNK_SIZE,
            vec![FileEntry {
                name: "f".to_string(),
                offset: 0,
                size: 70000,
            }],
        );
        let engine = SimulatedEngine::new(layout, Bytes::from(vec![0u8; 70000]));
        engine.begin_session(0, Arc::new(NullSink)).unwrap();
        for &index in complete {
            engine.set_chunk_priority(index, transfer_engine::ChunkPriority::Fetch);
        }
        // Drive the scripted chunks to completion.
        engine.poll_events();
        engine
    }

    struct NullSink;
    impl ChunkSink for NullSink {
        fn write(&self, _index: u64, data: &[u8], _offset: usize) -> usize {
            data.len()
        }
        fn has_chunk(&self, _index: u64) -> bool {
            false
        }
    }

    fn content() -> Vec<u8> {
        (0..70000).map(|i| (i % 253) as u8).collect()
    }

    fn fill_store(store: &ChunkStore, content: &[u8], indices: &[u64]) {
        for &index in indices {
            let start = (index * CHUNK_SIZE) as usize;
            let end = (start + CHUNK_SIZE as usize).min(content.len());
            store.write(index, &content[start..end], 0);
        }
    }

    fn scheduler() -> RequestScheduler {
        RequestScheduler::new(range(), 10 * CHUNK_SIZE, Duration::from_millis(1000), Duration::from_millis(1))
    }

    struct VecSink(Vec<u8>);
    impl Write for VecSink {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.extend_from_slice(buf);
            Ok(buf.len())
        }
        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_drain_delivers_trimmed_file_bytes() {
        let content = content();
        let store = ChunkStore::new(range(), 100 << 20);
        fill_store(&store, &content, &[1, 2, 3, 4]);
        let engine = oracle_engine(&[1, 2, 3, 4]);

        let mut flush = FlushController::new(range());
        let mut cursor = StreamCursor::default();
        let mut sink = VecSink(Vec::new());

        let outcome = flush
            .drain(&mut cursor, &store, &engine, &mut sink, &mut scheduler(), &AtomicBool::new(false))
            .unwrap();

        assert_eq!(outcome, DrainOutcome::Complete);
        assert_eq!(flush.bytes_delivered(), 50000);
        assert_eq!(&sink.0[..], &content[20000..70000]);
        assert_eq!(store.memory_in_use(), 0);
    }

    #[test]
    fn test_drain_stalls_on_gap_and_resumes() {
        let content = content();
        let store = ChunkStore::new(range(), 100 << 20);
        fill_store(&store, &content, &[1, 2, 4]);
        let engine = oracle_engine(&[1, 2, 4]);

        let mut flush = FlushController::new(range());
        let mut cursor = StreamCursor::default();
        let mut sink = VecSink(Vec::new());
        let cancel = AtomicBool::new(false);

        let outcome = flush
            .drain(&mut cursor, &store, &engine, &mut sink, &mut scheduler(), &cancel)
            .unwrap();

        // Chunks 1 and 2 went out; 3 is missing, so 4 stays buffered.
        assert_eq!(outcome, DrainOutcome::Stalled);
        assert_eq!(cursor.needed(&range()), 3);
        assert_eq!(&sink.0[..], &content[20000..49152]);
        assert!(store.has_chunk(4));

        fill_store(&store, &content, &[3]);
        let engine = oracle_engine(&[1, 2, 3, 4]);

        let outcome = flush
            .drain(&mut cursor, &store, &engine, &mut sink, &mut scheduler(), &cancel)
            .unwrap();

        assert_eq!(outcome, DrainOutcome::Complete);
        assert_eq!(&sink.0[..], &content[20000..70000]);
    }

    #[test]
    fn test_drain_refuses_incomplete_chunk() {
        let content = content();
        let store = ChunkStore::new(range(), 100 << 20);
        fill_store(&store, &content, &[1]);
        // Buffered but the oracle has not verified it.
        let engine = oracle_engine(&[]);

        let mut flush = FlushController::new(range());
        let mut cursor = StreamCursor::default();
        let mut sink = VecSink(Vec::new());

        let outcome = flush
            .drain(&mut cursor, &store, &engine, &mut sink, &mut scheduler(), &AtomicBool::new(false))
            .unwrap();

        assert_eq!(outcome, DrainOutcome::Stalled);
        assert!(sink.0.is_empty());
        assert!(store.has_chunk(1));
    }

    #[test]
    fn test_consumer_error_propagates_after_eviction() {
        struct FailingSink;
        impl Write for FailingSink {
            fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
                Err(io::Error::other("consumer failure"))
            }
            fn flush(&mut self) -> io::Result<()> {
                Ok(())
            }
        }

        let content = content();
        let store = ChunkStore::new(range(), 100 << 20);
        fill_store(&store, &content, &[1, 2]);
        let engine = oracle_engine(&[1, 2]);

        let mut flush = FlushController::new(range());
        let mut cursor = StreamCursor::default();

        let result = flush.drain(
            &mut cursor,
            &store,
            &engine,
            &mut FailingSink,
            &mut scheduler(),
            &AtomicBool::new(false),
        );

        assert!(matches!(result, Err(crate::StreamError::IoError(_))));
        // The failed chunk was evicted before the write and is not replayed.
        assert!(!store.has_chunk(1));
        assert!(store.has_chunk(2));
    }

    #[test]
    fn test_cancel_stops_between_deliveries() {
        let content = content();
        let store = ChunkStore::new(range(), 100 << 20);
        fill_store(&store, &content, &[1, 2, 3, 4]);
        let engine = oracle_engine(&[1, 2, 3, 4]);

        let mut flush = FlushController::new(range());
        let mut cursor = StreamCursor::default();
        let mut sink = VecSink(Vec::new());
        let cancel = AtomicBool::new(true);

        let outcome = flush
            .drain(&mut cursor, &store, &engine, &mut sink, &mut scheduler(), &cancel)
            .unwrap();

        assert_eq!(outcome, DrainOutcome::Stalled);
        assert!(sink.0.is_empty());
    }

    #[test]
    fn test_no_chunk_delivered_twice() {
        // Tracks every index removed from the store across the whole run.
        let content = content();
        let store = ChunkStore::new(range(), 100 << 20);
        let engine = oracle_engine(&[1, 2, 3, 4]);

        let mut flush = FlushController::new(range());
        let mut cursor = StreamCursor::default();
        let mut sink = VecSink(Vec::new());
        let mut seen = HashSet::new();

        for batch in [&[2u64, 1][..], &[4, 3][..]] {
            fill_store(&store, &content, batch);
            let before: HashSet<u64> = store.snapshot().iter().map(|&(i, _)| i).collect();

            flush
                .drain(&mut cursor, &store, &engine, &mut sink, &mut scheduler(), &AtomicBool::new(false))
                .unwrap();

            let after: HashSet<u64> = store.snapshot().iter().map(|&(i, _)| i).collect();
            for delivered in before.difference(&after) {
                assert!(seen.insert(*delivered), "chunk {delivered} delivered twice");
            }
        }

        assert_eq!(seen, HashSet::from([1, 2, 3, 4]));
        assert_eq!(&sink.0[..], &content[20000..70000]);
    }

    #[test]
    fn test_cursor_needed_sequence() {
        let r = range();
        let mut cursor = StreamCursor::default();

        assert!(!cursor.has_delivered());
        assert_eq!(cursor.needed(&r), 1);

        cursor.advance(1);
        assert_eq!(cursor.needed(&r), 2);
        assert!(cursor.has_delivered());

        cursor.advance(4);
        assert_eq!(cursor.needed(&r), 5);
    }

    // Mirrors the Arc-shared usage the orchestrator has: the store is shared
    // with the engine side while drain runs.
    #[test]
    fn test_drain_with_shared_store() {
        let content = content();
        let store = Arc::new(ChunkStore::new(range(), 100 << 20));
        fill_store(&store, &content, &[1, 2, 3, 4]);
        let engine = oracle_engine(&[1, 2, 3, 4]);

        let sink = Arc::new(Mutex::new(Vec::new()));
        struct SharedSink(Arc<Mutex<Vec<u8>>>);
        impl Write for SharedSink {
            fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
                self.0.lock().unwrap().extend_from_slice(buf);
                Ok(buf.len())
            }
            fn flush(&mut self) -> io::Result<()> {
                Ok(())
            }
        }

        let mut flush = FlushController::new(range());
        let mut cursor = StreamCursor::default();
        let mut shared_sink = SharedSink(sink.clone());

        flush
            .drain(&mut cursor, &store, &engine, &mut shared_sink, &mut scheduler(), &AtomicBool::new(false))
            .unwrap();

        assert_eq!(&sink.lock().unwrap()[..], &content[20000..70000]);
    }
}
