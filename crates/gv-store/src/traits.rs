use bytes::Bytes;
use gv_types::{ObjectId, ObjectRecord};

use crate::error::{StoreError, StoreResult};

/// Lazy sequence of catalog records.
pub type RecordIter<'a> = Box<dyn Iterator<Item = StoreResult<ObjectRecord>> + Send + 'a>;

/// Storage for fixed-size content chunks.
///
/// All implementations must satisfy these invariants:
/// - `put` is atomic per chunk: a reader sees the whole chunk or nothing.
/// - No ordering is promised between chunks of different objects. Within an
///   object the writer issues sequential `put`s and readers sequential `get`s.
/// - The store never interprets chunk contents.
pub trait ChunkStore: Send + Sync {
    /// Store chunk `seq` of `id`, replacing any previous chunk at that key.
    fn put(&self, id: &ObjectId, seq: u32, data: Bytes) -> StoreResult<()>;

    /// Fetch chunk `seq` of `id`.
    ///
    /// Returns [`StoreError::ChunkNotFound`] if the chunk is absent.
    fn get(&self, id: &ObjectId, seq: u32) -> StoreResult<Bytes>;

    /// Check whether chunk `seq` of `id` exists.
    fn exists(&self, id: &ObjectId, seq: u32) -> StoreResult<bool>;

    /// Remove every chunk of `id`, returning how many were removed.
    ///
    /// Removing chunks of an unknown id succeeds with `0`.
    fn delete_all(&self, id: &ObjectId) -> StoreResult<usize>;

    /// Ids that currently own at least one chunk.
    fn object_ids(&self) -> StoreResult<Vec<ObjectId>>;
}

/// Metadata records for committed objects.
///
/// All implementations must satisfy these invariants:
/// - `commit` validates the record and inserts it only if the id is unused.
/// - A record becomes visible to `lookup` atomically at commit.
/// - Records are never modified after commit; they can only be removed.
pub trait ObjectCatalog: Send + Sync {
    /// Allocate a fresh identifier for a new write session.
    ///
    /// No record exists for the id until [`commit`](Self::commit).
    fn reserve_id(&self) -> ObjectId {
        ObjectId::generate()
    }

    /// Insert a record.
    ///
    /// Fails with [`StoreError::DuplicateObject`] if the id is taken and
    /// [`StoreError::InvalidRecord`] if the chunk count does not match the
    /// size and chunk size.
    fn commit(&self, record: ObjectRecord) -> StoreResult<()>;

    /// Fetch the record for `id`.
    ///
    /// Returns [`StoreError::ObjectNotFound`] if there is none.
    fn lookup(&self, id: &ObjectId) -> StoreResult<ObjectRecord>;

    /// Remove the record for `id`. Returns `true` if it existed.
    fn remove(&self, id: &ObjectId) -> StoreResult<bool>;

    /// Enumerate all committed records.
    fn list(&self) -> StoreResult<RecordIter<'_>>;

    /// Check whether a record exists for `id`.
    fn contains(&self, id: &ObjectId) -> StoreResult<bool> {
        match self.lookup(id) {
            Ok(_) => Ok(true),
            Err(StoreError::ObjectNotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }
}

/// Validate a record before a catalog accepts it.
pub(crate) fn check_record(record: &ObjectRecord) -> StoreResult<()> {
    record.validate().map_err(|e| StoreError::InvalidRecord {
        id: record.id,
        reason: e.to_string(),
    })
}
