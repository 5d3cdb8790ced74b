use std::fmt;
use std::io::{self, Read, Seek, SeekFrom};
use std::sync::Arc;

use bytes::{Buf, Bytes};
use gv_store::{ChunkStore, ObjectCatalog, StoreError};
use gv_types::{ChecksumHasher, ObjectId, ObjectRecord};
use tracing::{debug, warn};

use crate::error::{GridError, GridResult};

/// Streaming read session for one committed object.
///
/// The catalog record is resolved once at [`open`](Self::open); chunks are
/// fetched lazily in ascending order as the caller consumes bytes. Committed
/// objects are immutable, so any number of readers may stream the same
/// object in parallel.
///
/// If the object is deleted while a session is streaming, chunks that are
/// already gone surface as [`GridError::CorruptedObject`]. Output is never
/// truncated or padded to hide a missing chunk.
pub struct ObjectReader {
    record: ObjectRecord,
    chunks: Arc<dyn ChunkStore>,
    /// Unconsumed bytes of the most recently fetched chunk.
    current: Bytes,
    /// Next chunk to fetch.
    next_seq: u32,
    /// Bytes to drop from the front of the next fetched chunk (after a seek).
    skip: usize,
    /// Logical offset of the next byte handed to the caller.
    position: u64,
    verify: bool,
    /// Running hash, present only while chunks are being consumed in order
    /// from offset 0 with verification requested.
    hasher: Option<ChecksumHasher>,
    /// Set once the iterator adapter has yielded an error.
    fused: bool,
}

impl ObjectReader {
    /// Resolve `id` in the catalog and start a session at offset 0.
    ///
    /// Fails with [`GridError::ObjectNotFound`] unless a committed record
    /// exists.
    pub fn open(
        chunks: Arc<dyn ChunkStore>,
        catalog: &dyn ObjectCatalog,
        id: &ObjectId,
    ) -> GridResult<Self> {
        let record = catalog
            .lookup(id)
            .map_err(|e| GridError::storage("lookup", *id, e))?;
        debug!(%id, size = record.size, chunks = record.chunk_count, "read session opened");
        Ok(Self {
            record,
            chunks,
            current: Bytes::new(),
            next_seq: 0,
            skip: 0,
            position: 0,
            verify: false,
            hasher: None,
            fused: false,
        })
    }

    /// Request checksum verification at end of stream.
    ///
    /// Verification covers chunks consumed sequentially from offset 0.
    /// Enabling it after reading has started, or seeking anywhere but 0,
    /// leaves the session unverified until it seeks back to 0.
    pub fn with_verification(mut self, verify: bool) -> Self {
        self.verify = verify;
        self.hasher = if verify && self.at_start() {
            Some(ChecksumHasher::new())
        } else {
            if verify {
                warn!(id = %self.record.id, "verification requested mid-stream; seek to 0 to verify");
            }
            None
        };
        self
    }

    pub fn id(&self) -> ObjectId {
        self.record.id
    }

    /// Total object size, from the record. No I/O.
    pub fn size(&self) -> u64 {
        self.record.size
    }

    pub fn record(&self) -> &ObjectRecord {
        &self.record
    }

    /// Offset of the next byte to be read.
    pub fn position(&self) -> u64 {
        self.position
    }

    /// Hand out the rest of the current chunk, fetching the next one if
    /// needed. `Ok(None)` at end of stream.
    pub fn next_chunk(&mut self) -> GridResult<Option<Bytes>> {
        if self.current.is_empty() && !self.fill()? {
            return Ok(None);
        }
        let out = std::mem::take(&mut self.current);
        self.position += out.len() as u64;
        Ok(Some(out))
    }

    /// Read everything from the current position to the end.
    pub fn read_to_vec(&mut self) -> GridResult<Vec<u8>> {
        let remaining = self.record.size.saturating_sub(self.position);
        let mut out = Vec::with_capacity(remaining.min(64 * 1024 * 1024) as usize);
        while let Some(chunk) = self.next_chunk()? {
            out.extend_from_slice(&chunk);
        }
        Ok(out)
    }

    /// Move to `offset`. Seeking at or past the end yields end of stream.
    ///
    /// No chunk is fetched until the next read.
    pub fn seek_to(&mut self, offset: u64) -> u64 {
        self.current = Bytes::new();
        self.position = offset;
        if offset >= self.record.size {
            self.next_seq = self.record.chunk_count;
            self.skip = 0;
        } else {
            let (seq, intra) = self.record.locate(offset);
            self.next_seq = seq;
            self.skip = intra;
        }
        if offset == 0 {
            self.hasher = self.verify.then(ChecksumHasher::new);
        } else if self.hasher.take().is_some() {
            warn!(id = %self.record.id, offset, "seek disables checksum verification");
        }
        offset
    }

    fn at_start(&self) -> bool {
        self.next_seq == 0 && self.current.is_empty() && self.skip == 0
    }

    /// Load the next chunk into `current`. Returns `false` at end of stream,
    /// after checking the checksum if one is being tracked.
    fn fill(&mut self) -> GridResult<bool> {
        if self.next_seq >= self.record.chunk_count {
            self.finish_verification()?;
            return Ok(false);
        }
        let seq = self.next_seq;
        let chunk = self.fetch(seq)?;
        if let Some(hasher) = self.hasher.as_mut() {
            hasher.update(&chunk);
        }
        self.next_seq += 1;
        if self.next_seq == self.record.chunk_count {
            // Check before the last bytes leave the session.
            self.finish_verification()?;
        }
        let mut chunk = chunk;
        chunk.advance(std::mem::take(&mut self.skip));
        self.current = chunk;
        Ok(true)
    }

    fn fetch(&self, seq: u32) -> GridResult<Bytes> {
        let id = self.record.id;
        let chunk = self.chunks.get(&id, seq).map_err(|e| match e {
            StoreError::ChunkNotFound { .. } => GridError::CorruptedObject {
                id,
                seq,
                reason: "chunk missing from store".into(),
            },
            e => GridError::storage("read chunk", id, e),
        })?;
        let expected = self.record.chunk_len(seq).unwrap_or(0);
        if chunk.len() != expected {
            return Err(GridError::CorruptedObject {
                id,
                seq,
                reason: format!("expected {expected} bytes, found {}", chunk.len()),
            });
        }
        Ok(chunk)
    }

    fn finish_verification(&mut self) -> GridResult<()> {
        let Some(hasher) = self.hasher.as_ref() else {
            return Ok(());
        };
        let computed = hasher.finalize();
        if computed != self.record.checksum {
            // Hasher stays in place so every later read fails the same way.
            return Err(GridError::IntegrityError {
                id: self.record.id,
                expected: self.record.checksum,
                computed,
            });
        }
        self.hasher = None;
        debug!(id = %self.record.id, "checksum verified");
        Ok(())
    }
}

impl Read for ObjectReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        if self.current.is_empty() && !self.fill().map_err(io::Error::other)? {
            return Ok(0);
        }
        let n = buf.len().min(self.current.len());
        buf[..n].copy_from_slice(&self.current[..n]);
        self.current.advance(n);
        self.position += n as u64;
        Ok(n)
    }
}

impl Seek for ObjectReader {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let target = match pos {
            SeekFrom::Start(offset) => Some(offset),
            SeekFrom::End(delta) => self.record.size.checked_add_signed(delta),
            SeekFrom::Current(delta) => self.position.checked_add_signed(delta),
        };
        let target = target.ok_or_else(|| {
            io::Error::new(io::ErrorKind::InvalidInput, "seek before start of object")
        })?;
        Ok(self.seek_to(target))
    }
}

/// Lazy sequence of byte slices. Stops after the first error.
impl Iterator for ObjectReader {
    type Item = GridResult<Bytes>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.fused {
            return None;
        }
        let item = self.next_chunk().transpose();
        if matches!(item, Some(Err(_))) {
            self.fused = true;
        }
        item
    }
}

impl fmt::Debug for ObjectReader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectReader")
            .field("id", &self.record.id)
            .field("size", &self.record.size)
            .field("position", &self.position)
            .field("verify", &self.verify)
            .finish()
    }
}
