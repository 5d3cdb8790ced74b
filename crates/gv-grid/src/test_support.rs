//! Fault-injecting backends for session tests.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use bytes::Bytes;
use gv_store::{ChunkStore, InMemoryChunkStore, StoreError, StoreResult};
use gv_types::ObjectId;

fn injected(what: &str) -> StoreError {
    StoreError::Io(std::io::Error::other(format!("injected {what} failure")))
}

/// In-memory chunk store whose puts and deletes can be made to fail.
#[derive(Debug, Default)]
pub struct FlakyChunkStore {
    pub inner: InMemoryChunkStore,
    /// Fail every put once this many puts have succeeded.
    pub fail_put_after: AtomicU32,
    pub puts: AtomicU32,
    pub fail_puts: AtomicBool,
    pub fail_deletes: AtomicBool,
}

impl FlakyChunkStore {
    pub fn failing_puts_after(n: u32) -> Self {
        let store = Self::default();
        store.fail_put_after.store(n, Ordering::SeqCst);
        store.fail_puts.store(true, Ordering::SeqCst);
        store
    }
}

impl ChunkStore for FlakyChunkStore {
    fn put(&self, id: &ObjectId, seq: u32, data: Bytes) -> StoreResult<()> {
        if self.fail_puts.load(Ordering::SeqCst)
            && self.puts.load(Ordering::SeqCst) >= self.fail_put_after.load(Ordering::SeqCst)
        {
            return Err(injected("put"));
        }
        self.puts.fetch_add(1, Ordering::SeqCst);
        self.inner.put(id, seq, data)
    }

    fn get(&self, id: &ObjectId, seq: u32) -> StoreResult<Bytes> {
        self.inner.get(id, seq)
    }

    fn exists(&self, id: &ObjectId, seq: u32) -> StoreResult<bool> {
        self.inner.exists(id, seq)
    }

    fn delete_all(&self, id: &ObjectId) -> StoreResult<usize> {
        if self.fail_deletes.load(Ordering::SeqCst) {
            return Err(injected("delete"));
        }
        self.inner.delete_all(id)
    }

    fn object_ids(&self) -> StoreResult<Vec<ObjectId>> {
        self.inner.object_ids()
    }
}
