use std::collections::BTreeMap;
use std::sync::Mutex;

use bytes::Bytes;
use tracing::{debug, warn};
use transfer_engine::ChunkSink;

use crate::stream_range::StreamRange;

/// Result of scanning the store for the next chunk to deliver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeekOutcome {
    /// The needed chunk's buffer is resident.
    Ready,
    /// The needed chunk has not arrived; either the store is drained or only
    /// later chunks are buffered (a gap).
    NotResident,
}

struct ChunkBuffer {
    data: Vec<u8>,
    /// High-water mark of bytes written; the actual received length of the
    /// chunk once the engine reports it complete.
    received: usize,
}

/// The only place chunk payloads live before delivery: a mutex-guarded map
/// from chunk index to buffer, fed by the engine's worker threads through the
/// [`ChunkSink`] hook and drained in ascending order by the flush controller.
///
/// Critical sections are map operations and buffer copies only; the consumer
/// callback never runs under this lock.
pub struct ChunkStore {
    range: StreamRange,
    memory_budget: u64,
    chunks: Mutex<BTreeMap<u64, ChunkBuffer>>,
}

impl ChunkStore {
    pub fn new(range: StreamRange, memory_budget: u64) -> Self {
        Self {
            range,
            memory_budget,
            chunks: Mutex::new(BTreeMap::new()),
        }
    }

    /// Copies `data` into the chunk's buffer, allocating a full-chunk buffer
    /// on the first write for an index. Writes outside the active range, or
    /// overflowing the chunk, are dropped with a warning and return 0.
    pub fn write(&self, index: u64, data: &[u8], offset: usize) -> usize {
        if !self.range.contains(index) {
            warn!(
                chunk = index,
                first = self.range.first_chunk(),
                last = self.range.last_chunk(),
                "Dropping write outside the active chunk range"
            );
            return 0;
        }

        let chunk_size = self.range.chunk_size() as usize;
        let end = offset + data.len();
        if end > chunk_size {
            warn!(chunk = index, offset, len = data.len(), "Dropping write overflowing the chunk");
            return 0;
        }

        let mut chunks = self.chunks.lock().unwrap();

        let buffer = chunks.entry(index).or_insert_with(|| ChunkBuffer {
            data: vec![0u8; chunk_size],
            received: 0,
        });

        buffer.data[offset..end].copy_from_slice(data);
        buffer.received = buffer.received.max(end);

        let resident: u64 = chunks.len() as u64 * self.range.chunk_size();
        if resident > self.memory_budget {
            debug!(
                resident_bytes = resident,
                budget = self.memory_budget,
                "Resident chunk data exceeds the memory budget"
            );
        }

        data.len()
    }

    /// Atomically removes and returns a chunk's bytes, truncated to the
    /// received length. A chunk read this way is gone; it can never be
    /// delivered twice.
    pub fn read_and_remove(&self, index: u64) -> Option<Bytes> {
        let buffer = self.chunks.lock().unwrap().remove(&index)?;

        let ChunkBuffer { mut data, received } = buffer;
        data.truncate(received);
        Some(Bytes::from(data))
    }

    /// Scans for `needed` in one critical section, discarding any stale
    /// entries below it. Stale entries cannot be part of the ascending
    /// delivery order anymore.
    pub fn peek_next(&self, needed: u64) -> PeekOutcome {
        let mut chunks = self.chunks.lock().unwrap();

        while let Some((&lowest, _)) = chunks.first_key_value() {
            if lowest < needed {
                chunks.remove(&lowest);
                debug!(chunk = lowest, needed, "Discarded stale chunk below the delivery cursor");
                continue;
            }
            if lowest == needed {
                return PeekOutcome::Ready;
            }
            break;
        }

        PeekOutcome::NotResident
    }

    /// Total bytes of buffered chunk data.
    pub fn memory_in_use(&self) -> u64 {
        self.chunks.lock().unwrap().values().map(|b| b.data.len() as u64).sum()
    }

    /// Ascending (index, received length) listing for diagnostics.
    pub fn snapshot(&self) -> Vec<(u64, usize)> {
        self.chunks.lock().unwrap().iter().map(|(&i, b)| (i, b.received)).collect()
    }

    /// Releases every buffered chunk.
    pub fn clear(&self) {
        self.chunks.lock().unwrap().clear();
    }
}

impl ChunkSink for ChunkStore {
    fn write(&self, index: u64, data: &[u8], offset: usize) -> usize {
        ChunkStore::write(self, index, data, offset)
    }

    fn has_chunk(&self, index: u64) -> bool {
        self.chunks.lock().unwrap().contains_key(&index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reference_store() -> ChunkStore {
        // Chunks 1..=5 active, 16384-byte chunks.
        let range = StreamRange::compute(20000, 50000, 16384).unwrap();
        ChunkStore::new(range, 100 << 20)
    }

    #[test]
    fn test_write_and_read_round_trip() {
        let store = reference_store();
        let payload: Vec<u8> = (0..16384).map(|i| (i % 256) as u8).collect();

        assert_eq!(store.write(2, &payload[..8000], 0), 8000);
        assert_eq!(store.write(2, &payload[8000..], 8000), 8384);

        let read = store.read_and_remove(2).unwrap();
        assert_eq!(&read[..], &payload[..]);
        assert!(store.read_and_remove(2).is_none());
    }

    #[test]
    fn test_out_of_order_sub_piece_writes() {
        let store = reference_store();
        let payload: Vec<u8> = (0..16384).map(|i| (i % 251) as u8).collect();

        assert_eq!(store.write(3, &payload[10000..], 10000), 6384);
        assert_eq!(store.write(3, &payload[..10000], 0), 10000);

        assert_eq!(&store.read_and_remove(3).unwrap()[..], &payload[..]);
    }

    #[test]
    fn test_out_of_range_write_rejected() {
        let store = reference_store();

        assert_eq!(store.write(0, &[1, 2, 3], 0), 0);
        assert_eq!(store.write(6, &[1, 2, 3], 0), 0);
        assert!(!store.has_chunk(0));
        assert!(!store.has_chunk(6));
        assert_eq!(store.memory_in_use(), 0);
    }

    #[test]
    fn test_overflowing_write_rejected() {
        let store = reference_store();
        assert_eq!(store.write(2, &[0u8; 64], 16384 - 32), 0);
        assert!(!store.has_chunk(2));
    }

    #[test]
    fn test_received_length_truncation() {
        let store = reference_store();

        // The download's final chunk carries only 4464 bytes.
        store.write(4, &vec![7u8; 4464], 0);
        let read = store.read_and_remove(4).unwrap();
        assert_eq!(read.len(), 4464);
        assert!(read.iter().all(|&b| b == 7));
    }

    #[test]
    fn test_memory_accounting_and_eviction() {
        let store = reference_store();

        store.write(1, &[1u8; 100], 0);
        store.write(2, &[2u8; 100], 0);
        assert_eq!(store.memory_in_use(), 2 * 16384);

        let before = store.memory_in_use();
        store.read_and_remove(1).unwrap();
        assert_eq!(store.memory_in_use(), before - 16384);

        store.clear();
        assert_eq!(store.memory_in_use(), 0);
    }

    #[test]
    fn test_peek_next_discards_stale_entries() {
        let store = reference_store();

        store.write(1, &[1u8; 10], 0);
        store.write(2, &[2u8; 10], 0);
        store.write(4, &[4u8; 10], 0);

        // Cursor has moved past chunks 1 and 2; they are unreachable now.
        assert_eq!(store.peek_next(3), PeekOutcome::NotResident);
        assert_eq!(store.snapshot(), vec![(4, 10)]);

        assert_eq!(store.peek_next(4), PeekOutcome::Ready);
        assert!(store.has_chunk(4));
    }

    #[test]
    fn test_peek_next_gap() {
        let store = reference_store();

        store.write(3, &[3u8; 10], 0);
        assert_eq!(store.peek_next(1), PeekOutcome::NotResident);
        // The future chunk stays buffered.
        assert!(store.has_chunk(3));
    }

    #[test]
    fn test_snapshot_ascending() {
        let store = reference_store();

        store.write(4, &[0u8; 5], 0);
        store.write(1, &[0u8; 7], 0);
        store.write(3, &[0u8; 6], 0);

        assert_eq!(store.snapshot(), vec![(1, 7), (3, 6), (4, 5)]);
    }
}
