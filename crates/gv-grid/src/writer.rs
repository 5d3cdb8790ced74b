use std::fmt;
use std::io;
use std::sync::Arc;

use bytes::BytesMut;
use chrono::Utc;
use gv_store::{ChunkStore, ObjectCatalog};
use gv_types::{ChecksumHasher, ObjectId, ObjectRecord};
use tracing::{debug, warn};

use crate::config::validate_chunk_size;
use crate::error::{GridError, GridResult};

/// Lifecycle of a write session.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WriterState {
    /// Id reserved, nothing written yet.
    Open,
    /// At least one `write` call accepted.
    Streaming,
    /// Record committed; the object is visible.
    Committed,
    /// Session abandoned; written chunks were (best-effort) removed.
    Aborted,
}

impl WriterState {
    fn name(self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Streaming => "streaming",
            Self::Committed => "committed",
            Self::Aborted => "aborted",
        }
    }
}

/// Streaming write session for one object.
///
/// Bytes are buffered until a full chunk is available, then handed to the
/// [`ChunkStore`]. At most one chunk is ever held in memory. The object
/// becomes visible only when [`commit`](Self::commit) inserts its catalog
/// record; until then readers get `ObjectNotFound`.
///
/// Dropping a session that was neither committed nor aborted aborts it.
pub struct ObjectWriter {
    id: ObjectId,
    filename: String,
    content_type: Option<String>,
    chunk_size: u32,
    chunks: Arc<dyn ChunkStore>,
    catalog: Arc<dyn ObjectCatalog>,
    buffer: BytesMut,
    seq: u32,
    size: u64,
    hasher: ChecksumHasher,
    state: WriterState,
}

impl ObjectWriter {
    /// Start a session, reserving a fresh id from the catalog.
    pub fn open(
        chunks: Arc<dyn ChunkStore>,
        catalog: Arc<dyn ObjectCatalog>,
        filename: &str,
        chunk_size: u32,
    ) -> GridResult<Self> {
        validate_chunk_size(chunk_size)?;
        let id = catalog.reserve_id();
        let content_type = mime_guess::from_path(filename)
            .first()
            .map(|mime| mime.essence_str().to_string());
        debug!(%id, filename, chunk_size, "write session opened");
        Ok(Self {
            id,
            filename: filename.to_string(),
            content_type,
            chunk_size,
            chunks,
            catalog,
            buffer: BytesMut::with_capacity(chunk_size as usize),
            seq: 0,
            size: 0,
            hasher: ChecksumHasher::new(),
            state: WriterState::Open,
        })
    }

    /// The id this object will be committed under.
    pub fn id(&self) -> ObjectId {
        self.id
    }

    pub fn state(&self) -> WriterState {
        self.state
    }

    pub fn filename(&self) -> &str {
        &self.filename
    }

    /// Bytes accepted so far, including the buffered tail.
    pub fn bytes_written(&self) -> u64 {
        self.size + self.buffer.len() as u64
    }

    /// Full chunks already handed to the chunk store.
    pub fn chunks_written(&self) -> u32 {
        self.seq
    }

    /// Append bytes to the object.
    ///
    /// Every time the buffer reaches the chunk size a chunk is stored. If
    /// storing fails, the session is aborted (written chunks are removed on a
    /// best-effort basis) and the storage error is returned.
    pub fn write(&mut self, mut data: &[u8]) -> GridResult<()> {
        self.ensure_writable()?;
        self.state = WriterState::Streaming;
        let chunk_size = self.chunk_size as usize;
        while !data.is_empty() {
            let take = (chunk_size - self.buffer.len()).min(data.len());
            self.buffer.extend_from_slice(&data[..take]);
            data = &data[take..];
            if self.buffer.len() == chunk_size {
                self.emit_chunk()?;
            }
        }
        Ok(())
    }

    /// Flush the tail chunk and commit the catalog record.
    ///
    /// Returns the committed record. On failure the session is aborted and
    /// nothing becomes visible.
    pub fn commit(mut self) -> GridResult<ObjectRecord> {
        self.ensure_writable()?;
        if !self.buffer.is_empty() {
            self.emit_chunk()?;
        }
        let record = ObjectRecord {
            id: self.id,
            filename: self.filename.clone(),
            size: self.size,
            chunk_size: self.chunk_size,
            chunk_count: self.seq,
            created_at: Utc::now(),
            checksum: self.hasher.finalize(),
            content_type: self.content_type.clone(),
        };
        if let Err(e) = self.catalog.commit(record.clone()) {
            self.discard();
            return Err(GridError::storage("commit record", self.id, e));
        }
        self.state = WriterState::Committed;
        debug!(id = %self.id, size = record.size, chunks = record.chunk_count, "object committed");
        Ok(record)
    }

    /// Abandon the session and remove any chunks already written.
    ///
    /// Returns the number of chunks removed. A cleanup failure is logged and
    /// returned, never retried; the leftover chunks are orphans for the sweep.
    pub fn abort(mut self) -> GridResult<usize> {
        self.ensure_writable()?;
        self.state = WriterState::Aborted;
        self.buffer.clear();
        self.chunks.delete_all(&self.id).map_err(|e| {
            warn!(id = %self.id, error = %e, "abort cleanup failed; chunks left orphaned");
            GridError::storage("abort cleanup", self.id, e)
        })
    }

    fn ensure_writable(&self) -> GridResult<()> {
        match self.state {
            WriterState::Open | WriterState::Streaming => Ok(()),
            state => Err(GridError::SessionClosed {
                id: self.id,
                state: state.name(),
            }),
        }
    }

    fn emit_chunk(&mut self) -> GridResult<()> {
        if self.seq == u32::MAX {
            self.discard();
            return Err(GridError::ObjectTooLarge {
                id: self.id,
                chunk_size: self.chunk_size,
            });
        }
        let chunk = self.buffer.split().freeze();
        let len = chunk.len();
        self.hasher.update(&chunk);
        if let Err(e) = self.chunks.put(&self.id, self.seq, chunk) {
            self.discard();
            return Err(GridError::storage("put chunk", self.id, e));
        }
        debug!(id = %self.id, seq = self.seq, len, "chunk stored");
        self.seq += 1;
        self.size += len as u64;
        self.buffer.reserve(self.chunk_size as usize);
        Ok(())
    }

    /// Best-effort cleanup after a failure or drop. Errors are only logged.
    fn discard(&mut self) {
        let was_streaming = self.state == WriterState::Streaming;
        self.state = WriterState::Aborted;
        self.buffer.clear();
        if !was_streaming {
            return;
        }
        match self.chunks.delete_all(&self.id) {
            Ok(removed) => debug!(id = %self.id, removed, "write session discarded"),
            Err(e) => warn!(id = %self.id, error = %e, "cleanup of discarded write failed; chunks left orphaned"),
        }
    }
}

impl Drop for ObjectWriter {
    fn drop(&mut self) {
        if matches!(self.state, WriterState::Open | WriterState::Streaming) {
            self.discard();
        }
    }
}

impl io::Write for ObjectWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        ObjectWriter::write(self, buf).map_err(io::Error::other)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl fmt::Debug for ObjectWriter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectWriter")
            .field("id", &self.id)
            .field("filename", &self.filename)
            .field("state", &self.state)
            .field("chunks_written", &self.seq)
            .field("buffered", &self.buffer.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::FlakyChunkStore;
    use gv_store::{InMemoryChunkStore, InMemoryObjectCatalog, StoreError};
    use gv_types::Checksum;
    use std::sync::atomic::Ordering;

    fn backends() -> (Arc<InMemoryChunkStore>, Arc<InMemoryObjectCatalog>) {
        (Arc::new(InMemoryChunkStore::new()), Arc::new(InMemoryObjectCatalog::new()))
    }

    #[test]
    fn splits_into_chunks_on_write() {
        let (chunks, catalog) = backends();
        let mut w = ObjectWriter::open(chunks.clone(), catalog.clone(), "letters.txt", 4).unwrap();
        assert_eq!(w.state(), WriterState::Open);

        w.write(b"abcdefghij").unwrap();
        assert_eq!(w.state(), WriterState::Streaming);
        assert_eq!(w.chunks_written(), 2);
        assert_eq!(w.bytes_written(), 10);

        let id = w.id();
        let record = w.commit().unwrap();
        assert_eq!(record.id, id);
        assert_eq!(record.size, 10);
        assert_eq!(record.chunk_count, 3);
        assert_eq!(record.chunk_size, 4);
        assert_eq!(record.checksum, Checksum::of(b"abcdefghij"));
        assert_eq!(record.content_type.as_deref(), Some("text/plain"));

        assert_eq!(chunks.get(&id, 0).unwrap().as_ref(), b"abcd");
        assert_eq!(chunks.get(&id, 1).unwrap().as_ref(), b"efgh");
        assert_eq!(chunks.get(&id, 2).unwrap().as_ref(), b"ij");
        assert_eq!(catalog.lookup(&id).unwrap(), record);
    }

    #[test]
    fn small_writes_accumulate() {
        let (chunks, catalog) = backends();
        let mut w = ObjectWriter::open(chunks.clone(), catalog, "", 4).unwrap();
        for byte in b"abcdefgh" {
            w.write(std::slice::from_ref(byte)).unwrap();
        }
        assert_eq!(w.chunks_written(), 2);
        let record = w.commit().unwrap();
        assert_eq!(record.chunk_count, 2);
        assert_eq!(chunks.len(), 2);
        assert_eq!(record.content_type, None);
    }

    #[test]
    fn record_invisible_until_commit() {
        let (chunks, catalog) = backends();
        let mut w = ObjectWriter::open(chunks, catalog.clone(), "a.bin", 4).unwrap();
        w.write(b"abcdefgh").unwrap();
        assert!(matches!(catalog.lookup(&w.id()), Err(StoreError::ObjectNotFound(_))));
        let id = w.id();
        w.commit().unwrap();
        assert!(catalog.contains(&id).unwrap());
    }

    #[test]
    fn empty_object_has_zero_chunks() {
        let (chunks, catalog) = backends();
        let w = ObjectWriter::open(chunks.clone(), catalog, "empty", 4).unwrap();
        let record = w.commit().unwrap();
        assert_eq!(record.size, 0);
        assert_eq!(record.chunk_count, 0);
        assert_eq!(record.checksum, Checksum::of(b""));
        assert!(chunks.is_empty());
    }

    #[test]
    fn exact_multiple_has_no_short_tail() {
        let (chunks, catalog) = backends();
        let mut w = ObjectWriter::open(chunks.clone(), catalog, "x", 4).unwrap();
        w.write(b"abcdefgh").unwrap();
        let record = w.commit().unwrap();
        assert_eq!(record.chunk_count, 2);
        assert_eq!(chunks.chunk_count(&record.id), 2);
    }

    #[test]
    fn abort_removes_written_chunks() {
        let (chunks, catalog) = backends();
        let mut w = ObjectWriter::open(chunks.clone(), catalog.clone(), "x", 4).unwrap();
        w.write(b"abcdefghijkl").unwrap();
        let id = w.id();
        assert_eq!(chunks.chunk_count(&id), 3);

        assert_eq!(w.abort().unwrap(), 3);
        assert_eq!(chunks.chunk_count(&id), 0);
        assert!(!catalog.contains(&id).unwrap());
    }

    #[test]
    fn drop_without_commit_cleans_up() {
        let (chunks, catalog) = backends();
        let id = {
            let mut w = ObjectWriter::open(chunks.clone(), catalog.clone(), "x", 4).unwrap();
            w.write(b"abcdefgh").unwrap();
            w.id()
        };
        assert!(chunks.is_empty());
        assert!(!catalog.contains(&id).unwrap());
    }

    #[test]
    fn failed_put_aborts_session() {
        let chunks = Arc::new(FlakyChunkStore::failing_puts_after(2));
        let catalog = Arc::new(InMemoryObjectCatalog::new());
        let mut w = ObjectWriter::open(chunks.clone(), catalog.clone(), "x", 4).unwrap();
        let id = w.id();

        let err = w.write(b"abcdefghijkl").unwrap_err();
        assert!(matches!(err, GridError::StorageIo { op: "put chunk", .. }));
        assert_eq!(w.state(), WriterState::Aborted);
        assert_eq!(chunks.inner.chunk_count(&id), 0);

        let err = w.write(b"more").unwrap_err();
        assert!(matches!(err, GridError::SessionClosed { state: "aborted", .. }));
        assert!(catalog.is_empty());
    }

    #[test]
    fn failed_cleanup_is_reported_not_retried() {
        let chunks = Arc::new(FlakyChunkStore::default());
        let catalog = Arc::new(InMemoryObjectCatalog::new());
        let mut w = ObjectWriter::open(chunks.clone(), catalog, "x", 4).unwrap();
        w.write(b"abcdefgh").unwrap();
        let id = w.id();

        chunks.fail_deletes.store(true, Ordering::SeqCst);
        let err = w.abort().unwrap_err();
        assert!(matches!(err, GridError::StorageIo { op: "abort cleanup", .. }));
        // Orphans stay behind for the sweep.
        assert_eq!(chunks.inner.chunk_count(&id), 2);
    }

    #[test]
    fn commit_failure_discards_chunks() {
        let chunks = Arc::new(InMemoryChunkStore::new());
        let catalog = Arc::new(InMemoryObjectCatalog::new());
        let mut w = ObjectWriter::open(chunks.clone(), catalog.clone(), "x", 4).unwrap();
        w.write(b"abcdef").unwrap();
        let id = w.id();

        // Occupy the id so the catalog refuses the commit.
        catalog
            .commit(ObjectRecord {
                id,
                filename: String::new(),
                size: 0,
                chunk_size: 4,
                chunk_count: 0,
                created_at: Utc::now(),
                checksum: Checksum::of(b""),
                content_type: None,
            })
            .unwrap();

        let err = w.commit().unwrap_err();
        assert!(matches!(
            err,
            GridError::StorageIo { source: StoreError::DuplicateObject(_), .. }
        ));
        assert_eq!(chunks.chunk_count(&id), 0);
    }

    #[test]
    fn rejects_invalid_chunk_size() {
        let (chunks, catalog) = backends();
        let err = ObjectWriter::open(chunks, catalog, "x", 0).unwrap_err();
        assert!(matches!(err, GridError::InvalidChunkSize(0)));
    }

    #[test]
    fn io_write_and_copy() {
        let (chunks, catalog) = backends();
        let mut w = ObjectWriter::open(chunks, catalog, "copy.bin", 3).unwrap();
        let mut src: &[u8] = b"streamed through io::copy";
        let copied = io::copy(&mut src, &mut w).unwrap();
        assert_eq!(copied, 25);
        let record = w.commit().unwrap();
        assert_eq!(record.size, 25);
        assert_eq!(record.chunk_count, 9);
    }

    #[test]
    fn io_write_surfaces_grid_error() {
        let chunks = Arc::new(FlakyChunkStore::failing_puts_after(0));
        let catalog = Arc::new(InMemoryObjectCatalog::new());
        let mut w = ObjectWriter::open(chunks, catalog, "x", 2).unwrap();
        let err = io::Write::write_all(&mut w, b"abcd").unwrap_err();
        let inner = err.get_ref().and_then(|e| e.downcast_ref::<GridError>());
        assert!(matches!(inner, Some(GridError::StorageIo { .. })));
    }

    #[test]
    fn debug_format() {
        let (chunks, catalog) = backends();
        let w = ObjectWriter::open(chunks, catalog, "x", 4).unwrap();
        let debug = format!("{w:?}");
        assert!(debug.contains("ObjectWriter"));
        assert!(debug.contains("Open"));
    }
}
