use std::ffi::OsStr;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use bytes::Bytes;
use gv_types::{ObjectId, ObjectRecord};
use tempfile::NamedTempFile;
use tracing::{debug, warn};

use crate::error::{StoreError, StoreResult};
use crate::traits::{check_record, ChunkStore, ObjectCatalog, RecordIter};

const CHUNK_DIR: &str = "chunks";
const CATALOG_DIR: &str = "files";
const CHUNK_EXT: &str = "chunk";
const RECORD_EXT: &str = "json";

/// Write `data` to a temp file beside `target`, optionally fsync it, and
/// return it ready to be persisted. Temp files start with `.partial` and
/// carry no extension the stores enumerate, so a crash leaves nothing
/// visible.
fn stage(dir: &Path, data: &[u8], sync: bool) -> io::Result<NamedTempFile> {
    let mut tmp = tempfile::Builder::new().prefix(".partial").tempfile_in(dir)?;
    tmp.write_all(data)?;
    tmp.flush()?;
    if sync {
        tmp.as_file().sync_all()?;
    }
    Ok(tmp)
}

/// Flush a directory's entries, so a rename or link into it survives a
/// crash.
#[cfg(unix)]
fn sync_dir(dir: &Path) -> io::Result<()> {
    fs::File::open(dir)?.sync_all()
}

#[cfg(not(unix))]
fn sync_dir(_dir: &Path) -> io::Result<()> {
    Ok(())
}

/// Chunk store keeping one file per chunk.
///
/// Layout under the collection directory:
///
/// ```text
/// chunks/<object id>/<seq, zero-padded>.chunk
/// ```
///
/// Each chunk is staged in a temp file and renamed into place, so a chunk
/// file is either complete or absent.
#[derive(Debug)]
pub struct DiskChunkStore {
    dir: PathBuf,
    sync: bool,
}

impl DiskChunkStore {
    /// Open (or create) the chunk area of a collection directory.
    pub fn open(collection_dir: &Path) -> StoreResult<Self> {
        let dir = collection_dir.join(CHUNK_DIR);
        fs::create_dir_all(&dir)?;
        Ok(Self { dir, sync: true })
    }

    /// Enable or disable `fsync` of each chunk file and of the directories
    /// it is renamed into.
    pub fn with_sync(mut self, sync: bool) -> Self {
        self.sync = sync;
        self
    }

    fn object_dir(&self, id: &ObjectId) -> PathBuf {
        self.dir.join(id.to_hex())
    }

    fn chunk_path(&self, id: &ObjectId, seq: u32) -> PathBuf {
        self.object_dir(id).join(format!("{seq:010}.{CHUNK_EXT}"))
    }
}

impl ChunkStore for DiskChunkStore {
    fn put(&self, id: &ObjectId, seq: u32, data: Bytes) -> StoreResult<()> {
        let dir = self.object_dir(id);
        let created = !dir.is_dir();
        if created {
            fs::create_dir_all(&dir)?;
            if self.sync {
                sync_dir(&self.dir)?;
            }
        }
        let tmp = stage(&dir, &data, self.sync)?;
        tmp.persist(self.chunk_path(id, seq))
            .map_err(|e| StoreError::Io(e.error))?;
        if self.sync {
            sync_dir(&dir)?;
        }
        Ok(())
    }

    fn get(&self, id: &ObjectId, seq: u32) -> StoreResult<Bytes> {
        match fs::read(self.chunk_path(id, seq)) {
            Ok(data) => Ok(Bytes::from(data)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                Err(StoreError::ChunkNotFound { id: *id, seq })
            }
            Err(e) => Err(e.into()),
        }
    }

    fn exists(&self, id: &ObjectId, seq: u32) -> StoreResult<bool> {
        match fs::metadata(self.chunk_path(id, seq)) {
            Ok(meta) => Ok(meta.is_file()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    fn delete_all(&self, id: &ObjectId) -> StoreResult<usize> {
        let dir = self.object_dir(id);
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e.into()),
        };
        let mut count = 0;
        for entry in entries {
            if entry?.path().extension() == Some(OsStr::new(CHUNK_EXT)) {
                count += 1;
            }
        }
        match fs::remove_dir_all(&dir) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e.into()),
        }
        debug!(%id, count, "removed chunk directory");
        Ok(count)
    }

    fn object_ids(&self) -> StoreResult<Vec<ObjectId>> {
        let mut ids = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let entry = entry?;
            let name = entry.file_name();
            match name.to_str().map(ObjectId::parse) {
                Some(Ok(id)) => ids.push(id),
                _ => warn!(path = ?entry.path(), "ignoring unexpected entry in chunk area"),
            }
        }
        ids.sort();
        Ok(ids)
    }
}

/// Catalog keeping one JSON document per committed record.
///
/// Layout under the collection directory:
///
/// ```text
/// files/<object id>.json
/// ```
///
/// A record is staged in a temp file and linked into place without
/// clobbering, which is the commit point: the id either maps to a complete
/// record or to nothing, and a second commit of the same id fails.
#[derive(Debug)]
pub struct DiskObjectCatalog {
    dir: PathBuf,
    sync: bool,
}

impl DiskObjectCatalog {
    /// Open (or create) the catalog area of a collection directory.
    pub fn open(collection_dir: &Path) -> StoreResult<Self> {
        let dir = collection_dir.join(CATALOG_DIR);
        fs::create_dir_all(&dir)?;
        Ok(Self { dir, sync: true })
    }

    /// Enable or disable `fsync` of each record file and of `files/` after
    /// it is linked in.
    pub fn with_sync(mut self, sync: bool) -> Self {
        self.sync = sync;
        self
    }

    fn record_path(&self, id: &ObjectId) -> PathBuf {
        self.dir.join(format!("{}.{RECORD_EXT}", id.to_hex()))
    }
}

/// Read and validate a record file. `Ok(None)` if it vanished underneath us.
fn load_record(path: &Path) -> StoreResult<Option<ObjectRecord>> {
    let data = match fs::read(path) {
        Ok(data) => data,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    let record: ObjectRecord = serde_json::from_slice(&data)
        .map_err(|e| StoreError::Serialization(format!("{}: {e}", path.display())))?;
    check_record(&record)?;
    Ok(Some(record))
}

impl ObjectCatalog for DiskObjectCatalog {
    fn commit(&self, record: ObjectRecord) -> StoreResult<()> {
        check_record(&record)?;
        let data = serde_json::to_vec_pretty(&record)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        let tmp = stage(&self.dir, &data, self.sync)?;
        match tmp.persist_noclobber(self.record_path(&record.id)) {
            Ok(_) => {
                if self.sync {
                    sync_dir(&self.dir)?;
                }
                debug!(id = %record.id, size = record.size, "catalog record committed");
                Ok(())
            }
            Err(e) if e.error.kind() == io::ErrorKind::AlreadyExists => {
                Err(StoreError::DuplicateObject(record.id))
            }
            Err(e) => Err(StoreError::Io(e.error)),
        }
    }

    fn lookup(&self, id: &ObjectId) -> StoreResult<ObjectRecord> {
        load_record(&self.record_path(id))?.ok_or(StoreError::ObjectNotFound(*id))
    }

    fn remove(&self, id: &ObjectId) -> StoreResult<bool> {
        match fs::remove_file(self.record_path(id)) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    fn list(&self) -> StoreResult<RecordIter<'_>> {
        let entries = fs::read_dir(&self.dir)?;
        Ok(Box::new(entries.filter_map(|entry| {
            let path = match entry {
                Ok(entry) => entry.path(),
                Err(e) => return Some(Err(e.into())),
            };
            if path.extension() != Some(OsStr::new(RECORD_EXT)) {
                return None;
            }
            load_record(&path).transpose()
        })))
    }
}
