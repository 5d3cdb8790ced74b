use std::fmt;
use std::io::{self, Read};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use gv_store::{
    ChunkStore, DiskChunkStore, DiskObjectCatalog, InMemoryChunkStore, InMemoryObjectCatalog,
    ObjectCatalog, StoreError,
};
use gv_types::{ObjectId, ObjectRecord};
use serde::Serialize;

use crate::config::{BackendKind, GridConfig};
use crate::error::{GridError, GridResult};
use crate::gc::{DeleteReport, GarbageCollector, SweepReport};
use crate::reader::ObjectReader;
use crate::writer::ObjectWriter;

/// Size of the copy buffer used by [`GridStore::store`].
const COPY_BUF_SIZE: usize = 64 * 1024;

/// What a caller learns about an object without reading it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ObjectStat {
    pub id: ObjectId,
    pub filename: String,
    pub size: u64,
    pub created_at: DateTime<Utc>,
    pub content_type: Option<String>,
}

impl From<ObjectRecord> for ObjectStat {
    fn from(record: ObjectRecord) -> Self {
        Self {
            id: record.id,
            filename: record.filename,
            size: record.size,
            created_at: record.created_at,
            content_type: record.content_type,
        }
    }
}

/// Chunked object store facade.
///
/// This is the surface a file-field layer talks to: objects go in as byte
/// streams and come back under an opaque id. Ids are accepted as strings
/// because callers routinely probe with arbitrary names; strings that are
/// not ids behave like unknown ids.
pub struct GridStore {
    config: GridConfig,
    chunks: Arc<dyn ChunkStore>,
    catalog: Arc<dyn ObjectCatalog>,
}

impl GridStore {
    /// Build a store and its backends from a resolved configuration.
    pub fn from_config(config: GridConfig) -> GridResult<Self> {
        config.validate()?;
        let (chunks, catalog): (Arc<dyn ChunkStore>, Arc<dyn ObjectCatalog>) = match config.backend
        {
            BackendKind::Memory => (
                Arc::new(InMemoryChunkStore::new()),
                Arc::new(InMemoryObjectCatalog::new()),
            ),
            BackendKind::Disk => {
                let dir = config.collection_dir();
                let open_failed = |source: StoreError| GridError::Backend {
                    op: "open collection",
                    source,
                };
                (
                    Arc::new(
                        DiskChunkStore::open(&dir)
                            .map_err(open_failed)?
                            .with_sync(config.sync_writes),
                    ),
                    Arc::new(
                        DiskObjectCatalog::open(&dir)
                            .map_err(open_failed)?
                            .with_sync(config.sync_writes),
                    ),
                )
            }
        };
        Ok(Self {
            config,
            chunks,
            catalog,
        })
    }

    /// Build a store over caller-supplied backends. `config.backend`,
    /// `root` and `collection` are ignored.
    pub fn with_backends(
        config: GridConfig,
        chunks: Arc<dyn ChunkStore>,
        catalog: Arc<dyn ObjectCatalog>,
    ) -> GridResult<Self> {
        config.validate()?;
        Ok(Self {
            config,
            chunks,
            catalog,
        })
    }

    pub fn config(&self) -> &GridConfig {
        &self.config
    }

    /// Open a write session using the configured chunk size.
    pub fn create(&self, filename: &str) -> GridResult<ObjectWriter> {
        ObjectWriter::open(
            self.chunks.clone(),
            self.catalog.clone(),
            filename,
            self.config.chunk_size,
        )
    }

    /// Store everything `reader` yields as one object.
    ///
    /// If the input fails part-way the partial object is discarded and
    /// [`GridError::Input`] is returned.
    pub fn store<R: Read>(&self, mut reader: R, filename: &str) -> GridResult<ObjectId> {
        let mut writer = self.create(filename)?;
        let mut buf = vec![0u8; COPY_BUF_SIZE];
        loop {
            let n = match reader.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(source) => {
                    return Err(GridError::Input {
                        id: writer.id(),
                        source,
                    })
                }
            };
            writer.write(&buf[..n])?;
        }
        Ok(writer.commit()?.id)
    }

    /// Store an in-memory buffer as one object.
    pub fn store_bytes(&self, data: &[u8], filename: &str) -> GridResult<ObjectId> {
        let mut writer = self.create(filename)?;
        writer.write(data)?;
        Ok(writer.commit()?.id)
    }

    /// Open a read session. Verification follows `verify_on_read`.
    pub fn open(&self, id: &str) -> GridResult<ObjectReader> {
        self.open_id(&parse_id(id)?)
    }

    /// Open a read session by parsed id.
    pub fn open_id(&self, id: &ObjectId) -> GridResult<ObjectReader> {
        Ok(ObjectReader::open(self.chunks.clone(), self.catalog.as_ref(), id)?
            .with_verification(self.config.verify_on_read))
    }

    /// Delete an object. See [`GarbageCollector::delete`].
    pub fn delete(&self, id: &str) -> GridResult<DeleteReport> {
        let id = parse_id(id)?;
        self.collector().delete(&id)
    }

    /// `true` if a committed object has this id. Malformed ids are simply
    /// absent.
    pub fn exists(&self, id: &str) -> GridResult<bool> {
        let Ok(id) = ObjectId::parse(id) else {
            return Ok(false);
        };
        self.catalog
            .contains(&id)
            .map_err(|e| GridError::storage("exists", id, e))
    }

    /// Metadata for one object, without touching its chunks.
    pub fn stat(&self, id: &str) -> GridResult<ObjectStat> {
        let id = parse_id(id)?;
        let record = self
            .catalog
            .lookup(&id)
            .map_err(|e| GridError::storage("stat", id, e))?;
        Ok(record.into())
    }

    /// Ids of all committed objects, oldest reservation first.
    pub fn list(&self) -> GridResult<Vec<ObjectId>> {
        Ok(self.list_records()?.into_iter().map(|r| r.id).collect())
    }

    /// Every committed record, ordered by id.
    pub fn list_records(&self) -> GridResult<Vec<ObjectRecord>> {
        let backend = |source: StoreError| GridError::Backend {
            op: "list records",
            source,
        };
        let mut records = self
            .catalog
            .list()
            .map_err(backend)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(backend)?;
        records.sort_by_key(|r| r.id);
        Ok(records)
    }

    /// Reclaim orphaned chunks. See [`GarbageCollector::sweep`].
    pub fn sweep(&self, grace: Duration) -> GridResult<SweepReport> {
        self.collector().sweep(grace)
    }

    fn collector(&self) -> GarbageCollector<'_> {
        GarbageCollector::new(self.chunks.as_ref(), self.catalog.as_ref())
    }
}

fn parse_id(s: &str) -> GridResult<ObjectId> {
    ObjectId::parse(s).map_err(|_| GridError::InvalidIdentifier(s.to_string()))
}

impl fmt::Debug for GridStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GridStore")
            .field("backend", &self.config.backend)
            .field("collection", &self.config.collection)
            .field("chunk_size", &self.config.chunk_size)
            .finish()
    }
}
