use std::collections::HashSet;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use gv_store::{ChunkStore, ObjectCatalog, StoreError};
use gv_types::ObjectId;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::{GridError, GridResult};

/// Outcome of deleting one object.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct DeleteReport {
    pub id: ObjectId,
    pub chunks_removed: usize,
    /// Chunk removal failed after the record was gone. The object is
    /// logically deleted; its chunks wait for [`GarbageCollector::sweep`].
    pub orphaned: bool,
}

/// Result of an orphan sweep.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    /// Ids found owning chunks.
    pub objects_scanned: usize,
    /// Ids whose chunks were removed because no record references them.
    pub orphans_removed: usize,
    pub chunks_removed: usize,
    /// Unreferenced ids reserved within the grace period (possibly
    /// in-flight writes), left alone.
    pub skipped_recent: usize,
    /// Ids whose chunk removal failed; they will be retried next sweep.
    pub failures: usize,
}

/// Removes objects and reclaims orphaned chunks.
///
/// The catalog is the single source of truth for existence: a record is
/// always removed before its chunks, so a failure in between leaks chunks
/// but never leaves a record pointing at nothing.
pub struct GarbageCollector<'a> {
    chunks: &'a dyn ChunkStore,
    catalog: &'a dyn ObjectCatalog,
}

impl<'a> GarbageCollector<'a> {
    pub fn new(chunks: &'a dyn ChunkStore, catalog: &'a dyn ObjectCatalog) -> Self {
        Self { chunks, catalog }
    }

    /// Delete one object: record first, then chunks.
    ///
    /// Fails with [`GridError::ObjectNotFound`] if there is no record, and
    /// with [`GridError::StorageIo`] (chunks untouched) if removing the
    /// record fails. A chunk removal failure is not an error; it is reported
    /// through [`DeleteReport::orphaned`].
    pub fn delete(&self, id: &ObjectId) -> GridResult<DeleteReport> {
        let removed = self
            .catalog
            .remove(id)
            .map_err(|e| GridError::storage("remove record", *id, e))?;
        if !removed {
            return Err(GridError::ObjectNotFound(*id));
        }
        match self.chunks.delete_all(id) {
            Ok(chunks_removed) => {
                debug!(%id, chunks_removed, "object deleted");
                Ok(DeleteReport {
                    id: *id,
                    chunks_removed,
                    orphaned: false,
                })
            }
            Err(e) => {
                warn!(%id, error = %e, "record removed but chunk cleanup failed; chunks orphaned");
                Ok(DeleteReport {
                    id: *id,
                    chunks_removed: 0,
                    orphaned: true,
                })
            }
        }
    }

    /// Remove chunks that no catalog record references.
    ///
    /// Ids reserved less than `grace` ago are skipped: an uncommitted write
    /// looks exactly like an orphan until its record lands. `grace` must
    /// therefore exceed the longest expected write session.
    pub fn sweep(&self, grace: Duration) -> GridResult<SweepReport> {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();
        let ids = self
            .chunks
            .object_ids()
            .map_err(|source| GridError::Backend {
                op: "enumerate chunks",
                source,
            })?;
        let live = self.live_ids()?;

        let mut report = SweepReport {
            objects_scanned: ids.len(),
            ..SweepReport::default()
        };
        for id in ids {
            if live.contains(&id) {
                continue;
            }
            let age = now.saturating_sub(u64::from(id.reserved_secs()));
            if age < grace.as_secs() {
                report.skipped_recent += 1;
                continue;
            }
            match self.chunks.delete_all(&id) {
                Ok(n) => {
                    report.orphans_removed += 1;
                    report.chunks_removed += n;
                }
                Err(e) => {
                    warn!(%id, error = %e, "failed to remove orphaned chunks");
                    report.failures += 1;
                }
            }
        }
        info!(
            scanned = report.objects_scanned,
            removed = report.orphans_removed,
            chunks = report.chunks_removed,
            skipped = report.skipped_recent,
            failures = report.failures,
            "orphan sweep complete"
        );
        Ok(report)
    }

    fn live_ids(&self) -> GridResult<HashSet<ObjectId>> {
        let backend = |source: StoreError| GridError::Backend {
            op: "list records",
            source,
        };
        self.catalog
            .list()
            .map_err(backend)?
            .map(|r| r.map(|record| record.id).map_err(backend))
            .collect()
    }
}
