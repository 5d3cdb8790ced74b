use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::checksum::Checksum;
use crate::error::TypeError;
use crate::object::ObjectId;

/// Catalog metadata for one committed object.
///
/// Records are immutable: an object is never updated in place, only deleted
/// and stored again under a new id.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectRecord {
    pub id: ObjectId,
    /// Original file name. Informational only; may be empty.
    pub filename: String,
    /// Total content length in bytes.
    pub size: u64,
    /// Bytes per chunk. Every chunk but the last has exactly this length.
    pub chunk_size: u32,
    /// Number of chunks, `ceil(size / chunk_size)`.
    pub chunk_count: u32,
    pub created_at: DateTime<Utc>,
    pub checksum: Checksum,
    /// MIME type guessed from the filename at write time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
}

impl ObjectRecord {
    /// Chunk count for an object of `size` bytes, or `None` if the chunk
    /// size is zero or the count does not fit a `u32` sequence number.
    pub fn chunk_count_for(size: u64, chunk_size: u32) -> Option<u32> {
        if chunk_size == 0 {
            return None;
        }
        u32::try_from(size.div_ceil(u64::from(chunk_size))).ok()
    }

    /// Check the structural invariants a catalog enforces on commit.
    pub fn validate(&self) -> Result<(), TypeError> {
        let expected = Self::chunk_count_for(self.size, self.chunk_size).ok_or_else(|| {
            TypeError::InvalidRecord(format!(
                "chunk size {} cannot hold {} bytes",
                self.chunk_size, self.size
            ))
        })?;
        if expected != self.chunk_count {
            return Err(TypeError::InvalidRecord(format!(
                "{} bytes at chunk size {} needs {} chunks, record says {}",
                self.size, self.chunk_size, expected, self.chunk_count
            )));
        }
        Ok(())
    }

    /// Returns `true` for the zero-byte, zero-chunk object.
    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    /// Expected length of chunk `seq`, or `None` if `seq` is out of range.
    pub fn chunk_len(&self, seq: u32) -> Option<usize> {
        if seq >= self.chunk_count {
            return None;
        }
        let start = u64::from(seq) * u64::from(self.chunk_size);
        let len = (self.size - start).min(u64::from(self.chunk_size));
        Some(len as usize)
    }

    /// Map a byte offset to `(sequence number, offset within that chunk)`.
    pub fn locate(&self, offset: u64) -> (u32, usize) {
        let chunk_size = u64::from(self.chunk_size.max(1));
        ((offset / chunk_size) as u32, (offset % chunk_size) as usize)
    }
}
