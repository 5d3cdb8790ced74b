use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;

use bytes::Bytes;
use gv_types::{ObjectId, ObjectRecord};

use crate::error::{StoreError, StoreResult};
use crate::traits::{check_record, ChunkStore, ObjectCatalog, RecordIter};

/// In-memory, HashMap-based chunk store.
///
/// Intended for tests and embedding. Chunks are held as [`Bytes`], so reads
/// hand out cheap reference-counted clones.
pub struct InMemoryChunkStore {
    chunks: RwLock<HashMap<ObjectId, BTreeMap<u32, Bytes>>>,
}

impl InMemoryChunkStore {
    /// Create a new empty store.
    pub fn new() -> Self {
        Self {
            chunks: RwLock::new(HashMap::new()),
        }
    }

    /// Total number of chunks across all objects.
    pub fn len(&self) -> usize {
        self.chunks
            .read()
            .expect("lock poisoned")
            .values()
            .map(BTreeMap::len)
            .sum()
    }

    /// Returns `true` if no chunks are stored.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of chunks stored for one object.
    pub fn chunk_count(&self, id: &ObjectId) -> usize {
        self.chunks
            .read()
            .expect("lock poisoned")
            .get(id)
            .map_or(0, BTreeMap::len)
    }

    /// Total bytes across all stored chunks.
    pub fn total_bytes(&self) -> u64 {
        self.chunks
            .read()
            .expect("lock poisoned")
            .values()
            .flat_map(BTreeMap::values)
            .map(|c| c.len() as u64)
            .sum()
    }
}

impl Default for InMemoryChunkStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ChunkStore for InMemoryChunkStore {
    fn put(&self, id: &ObjectId, seq: u32, data: Bytes) -> StoreResult<()> {
        let mut map = self.chunks.write().expect("lock poisoned");
        map.entry(*id).or_default().insert(seq, data);
        Ok(())
    }

    fn get(&self, id: &ObjectId, seq: u32) -> StoreResult<Bytes> {
        let map = self.chunks.read().expect("lock poisoned");
        map.get(id)
            .and_then(|chunks| chunks.get(&seq))
            .cloned()
            .ok_or(StoreError::ChunkNotFound { id: *id, seq })
    }

    fn exists(&self, id: &ObjectId, seq: u32) -> StoreResult<bool> {
        let map = self.chunks.read().expect("lock poisoned");
        Ok(map.get(id).is_some_and(|chunks| chunks.contains_key(&seq)))
    }

    fn delete_all(&self, id: &ObjectId) -> StoreResult<usize> {
        let mut map = self.chunks.write().expect("lock poisoned");
        Ok(map.remove(id).map_or(0, |chunks| chunks.len()))
    }

    fn object_ids(&self) -> StoreResult<Vec<ObjectId>> {
        let map = self.chunks.read().expect("lock poisoned");
        let mut ids: Vec<ObjectId> = map.keys().copied().collect();
        ids.sort();
        Ok(ids)
    }
}

impl std::fmt::Debug for InMemoryChunkStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryChunkStore")
            .field("chunk_count", &self.len())
            .finish()
    }
}

/// In-memory catalog keyed by object id.
pub struct InMemoryObjectCatalog {
    records: RwLock<BTreeMap<ObjectId, ObjectRecord>>,
}

impl InMemoryObjectCatalog {
    pub fn new() -> Self {
        Self {
            records: RwLock::new(BTreeMap::new()),
        }
    }

    /// Number of committed records.
    pub fn len(&self) -> usize {
        self.records.read().expect("lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for InMemoryObjectCatalog {
    fn default() -> Self {
        Self::new()
    }
}

impl ObjectCatalog for InMemoryObjectCatalog {
    fn commit(&self, record: ObjectRecord) -> StoreResult<()> {
        check_record(&record)?;
        let mut map = self.records.write().expect("lock poisoned");
        if map.contains_key(&record.id) {
            return Err(StoreError::DuplicateObject(record.id));
        }
        map.insert(record.id, record);
        Ok(())
    }

    fn lookup(&self, id: &ObjectId) -> StoreResult<ObjectRecord> {
        let map = self.records.read().expect("lock poisoned");
        map.get(id).cloned().ok_or(StoreError::ObjectNotFound(*id))
    }

    fn remove(&self, id: &ObjectId) -> StoreResult<bool> {
        let mut map = self.records.write().expect("lock poisoned");
        Ok(map.remove(id).is_some())
    }

    fn list(&self) -> StoreResult<RecordIter<'_>> {
        // Snapshot under the lock; iteration then runs without holding it.
        let records: Vec<ObjectRecord> = self
            .records
            .read()
            .expect("lock poisoned")
            .values()
            .cloned()
            .collect();
        Ok(Box::new(records.into_iter().map(Ok)))
    }
}

impl std::fmt::Debug for InMemoryObjectCatalog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryObjectCatalog")
            .field("record_count", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use gv_types::Checksum;

    fn id(n: u8) -> ObjectId {
        ObjectId::from_bytes([n; 12])
    }

    fn record(id: ObjectId, size: u64, chunk_size: u32) -> ObjectRecord {
        ObjectRecord {
            id,
            filename: "a.txt".into(),
            size,
            chunk_size,
            chunk_count: ObjectRecord::chunk_count_for(size, chunk_size).unwrap(),
            created_at: Utc::now(),
            checksum: Checksum::of(b""),
            content_type: None,
        }
    }

    // -----------------------------------------------------------------------
    // Chunk store
    // -----------------------------------------------------------------------

    #[test]
    fn put_and_get_chunk() {
        let store = InMemoryChunkStore::new();
        store.put(&id(1), 0, Bytes::from_static(b"abcd")).unwrap();
        assert_eq!(store.get(&id(1), 0).unwrap(), Bytes::from_static(b"abcd"));
        assert!(store.exists(&id(1), 0).unwrap());
        assert!(!store.exists(&id(1), 1).unwrap());
    }

    #[test]
    fn get_missing_chunk() {
        let store = InMemoryChunkStore::new();
        store.put(&id(1), 0, Bytes::from_static(b"x")).unwrap();
        let err = store.get(&id(1), 1).unwrap_err();
        assert!(matches!(err, StoreError::ChunkNotFound { seq: 1, .. }));
        let err = store.get(&id(2), 0).unwrap_err();
        assert!(matches!(err, StoreError::ChunkNotFound { seq: 0, .. }));
    }

    #[test]
    fn put_replaces_existing_chunk() {
        let store = InMemoryChunkStore::new();
        store.put(&id(1), 0, Bytes::from_static(b"old")).unwrap();
        store.put(&id(1), 0, Bytes::from_static(b"new")).unwrap();
        assert_eq!(store.get(&id(1), 0).unwrap(), Bytes::from_static(b"new"));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn delete_all_counts_chunks() {
        let store = InMemoryChunkStore::new();
        for seq in 0..3 {
            store.put(&id(1), seq, Bytes::from_static(b"c")).unwrap();
        }
        store.put(&id(2), 0, Bytes::from_static(b"other")).unwrap();

        assert_eq!(store.delete_all(&id(1)).unwrap(), 3);
        assert_eq!(store.chunk_count(&id(1)), 0);
        assert_eq!(store.chunk_count(&id(2)), 1);
        assert_eq!(store.delete_all(&id(1)).unwrap(), 0);
    }

    #[test]
    fn object_ids_sorted() {
        let store = InMemoryChunkStore::new();
        store.put(&id(3), 0, Bytes::from_static(b"c")).unwrap();
        store.put(&id(1), 0, Bytes::from_static(b"a")).unwrap();
        assert_eq!(store.object_ids().unwrap(), vec![id(1), id(3)]);
    }

    #[test]
    fn total_bytes_and_len() {
        let store = InMemoryChunkStore::new();
        assert!(store.is_empty());
        store.put(&id(1), 0, Bytes::from_static(b"abcd")).unwrap();
        store.put(&id(1), 1, Bytes::from_static(b"ef")).unwrap();
        assert_eq!(store.len(), 2);
        assert_eq!(store.total_bytes(), 6);
    }

    // -----------------------------------------------------------------------
    // Catalog
    // -----------------------------------------------------------------------

    #[test]
    fn commit_and_lookup() {
        let catalog = InMemoryObjectCatalog::new();
        let r = record(id(1), 10, 4);
        catalog.commit(r.clone()).unwrap();
        assert_eq!(catalog.lookup(&id(1)).unwrap(), r);
        assert!(catalog.contains(&id(1)).unwrap());
    }

    #[test]
    fn lookup_missing() {
        let catalog = InMemoryObjectCatalog::new();
        assert!(matches!(
            catalog.lookup(&id(9)),
            Err(StoreError::ObjectNotFound(missing)) if missing == id(9)
        ));
        assert!(!catalog.contains(&id(9)).unwrap());
    }

    #[test]
    fn commit_rejects_duplicate() {
        let catalog = InMemoryObjectCatalog::new();
        catalog.commit(record(id(1), 10, 4)).unwrap();
        let err = catalog.commit(record(id(1), 3, 4)).unwrap_err();
        assert!(matches!(err, StoreError::DuplicateObject(_)));
        assert_eq!(catalog.lookup(&id(1)).unwrap().size, 10);
    }

    #[test]
    fn commit_rejects_inconsistent_record() {
        let catalog = InMemoryObjectCatalog::new();
        let mut r = record(id(1), 10, 4);
        r.chunk_count = 2;
        assert!(matches!(catalog.commit(r), Err(StoreError::InvalidRecord { .. })));
        assert!(catalog.is_empty());
    }

    #[test]
    fn commit_accepts_empty_object() {
        let catalog = InMemoryObjectCatalog::new();
        catalog.commit(record(id(1), 0, 4)).unwrap();
        assert_eq!(catalog.lookup(&id(1)).unwrap().chunk_count, 0);
    }

    #[test]
    fn remove_reports_presence() {
        let catalog = InMemoryObjectCatalog::new();
        catalog.commit(record(id(1), 1, 4)).unwrap();
        assert!(catalog.remove(&id(1)).unwrap());
        assert!(!catalog.remove(&id(1)).unwrap());
        assert!(!catalog.contains(&id(1)).unwrap());
    }

    #[test]
    fn list_enumerates_records() {
        let catalog = InMemoryObjectCatalog::new();
        catalog.commit(record(id(2), 1, 4)).unwrap();
        catalog.commit(record(id(1), 1, 4)).unwrap();
        let ids: Vec<ObjectId> = catalog
            .list()
            .unwrap()
            .map(|r| r.unwrap().id)
            .collect();
        assert_eq!(ids, vec![id(1), id(2)]);
    }

    #[test]
    fn reserve_id_is_fresh() {
        let catalog = InMemoryObjectCatalog::new();
        assert_ne!(catalog.reserve_id(), catalog.reserve_id());
        assert!(catalog.is_empty());
    }

    #[test]
    fn concurrent_gets_are_safe() {
        use std::sync::Arc;
        use std::thread;

        let store = Arc::new(InMemoryChunkStore::new());
        store.put(&id(1), 0, Bytes::from_static(b"shared")).unwrap();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = Arc::clone(&store);
                thread::spawn(move || {
                    assert_eq!(store.get(&id(1), 0).unwrap(), Bytes::from_static(b"shared"));
                })
            })
            .collect();

        for h in handles {
            h.join().expect("thread should not panic");
        }
    }

    #[test]
    fn debug_format() {
        let store = InMemoryChunkStore::new();
        let debug = format!("{store:?}");
        assert!(debug.contains("InMemoryChunkStore"));
        let catalog = InMemoryObjectCatalog::new();
        assert!(format!("{catalog:?}").contains("record_count"));
    }
}
