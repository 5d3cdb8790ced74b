use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{GridError, GridResult};

/// Default chunk size: 255 KiB, the classic GridFS value. Small enough to
/// bound per-chunk memory, large enough to amortize per-chunk overhead.
pub const DEFAULT_CHUNK_SIZE: u32 = 255 * 1024;

/// Upper bound on the configurable chunk size.
pub const MAX_CHUNK_SIZE: u32 = 16 * 1024 * 1024;

/// Where chunks and catalog records live.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Process-local maps; contents vanish with the store.
    Memory,
    /// Files under `<root>/<collection>/`.
    #[default]
    Disk,
}

/// Resolved configuration for one [`GridStore`](crate::GridStore).
///
/// Resolution order for every field: per-instance [`GridOverrides`], then
/// process-wide defaults (usually a TOML file), then the built-in defaults.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GridConfig {
    pub backend: BackendKind,
    /// Directory holding all collections.
    pub root: PathBuf,
    /// Namespace inside `root`; objects in different collections never meet.
    pub collection: String,
    /// Bytes per chunk for newly written objects.
    pub chunk_size: u32,
    /// Verify checksums on every read opened through the facade.
    pub verify_on_read: bool,
    /// `fsync` chunk and record files before they become visible.
    pub sync_writes: bool,
}

impl Default for GridConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::Disk,
            root: PathBuf::from("gridvault-data"),
            collection: "fs".into(),
            chunk_size: DEFAULT_CHUNK_SIZE,
            verify_on_read: false,
            sync_writes: true,
        }
    }
}

impl GridConfig {
    /// In-memory configuration, handy for tests and embedding.
    pub fn memory() -> Self {
        Self {
            backend: BackendKind::Memory,
            ..Self::default()
        }
    }

    /// Parse from TOML. Missing keys take their built-in defaults.
    pub fn from_toml_str(s: &str) -> GridResult<Self> {
        toml::from_str(s).map_err(|e| GridError::Config(e.to_string()))
    }

    /// Load process-wide defaults from a TOML file.
    pub fn from_toml_file(path: &Path) -> GridResult<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| GridError::Config(format!("{}: {e}", path.display())))?;
        Self::from_toml_str(&text)
    }

    /// Check that every field is usable.
    pub fn validate(&self) -> GridResult<()> {
        validate_chunk_size(self.chunk_size)?;
        let c = self.collection.as_str();
        if c.is_empty() || c == "." || c == ".." || c.contains(['/', '\\']) {
            return Err(GridError::Config(format!(
                "collection name {c:?} must be a single non-empty path component"
            )));
        }
        Ok(())
    }

    /// Directory holding this collection's chunks and records.
    pub fn collection_dir(&self) -> PathBuf {
        self.root.join(&self.collection)
    }
}

pub(crate) fn validate_chunk_size(chunk_size: u32) -> GridResult<()> {
    if chunk_size == 0 || chunk_size > MAX_CHUNK_SIZE {
        return Err(GridError::InvalidChunkSize(chunk_size));
    }
    Ok(())
}

/// Per-instance settings that take precedence over the defaults.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct GridOverrides {
    pub backend: Option<BackendKind>,
    pub root: Option<PathBuf>,
    pub collection: Option<String>,
    pub chunk_size: Option<u32>,
    pub verify_on_read: Option<bool>,
}

impl GridOverrides {
    /// Fill every unset field from `defaults`.
    pub fn apply(&self, defaults: &GridConfig) -> GridConfig {
        GridConfig {
            backend: self.backend.unwrap_or(defaults.backend),
            root: self.root.clone().unwrap_or_else(|| defaults.root.clone()),
            collection: self
                .collection
                .clone()
                .unwrap_or_else(|| defaults.collection.clone()),
            chunk_size: self.chunk_size.unwrap_or(defaults.chunk_size),
            verify_on_read: self.verify_on_read.unwrap_or(defaults.verify_on_read),
            sync_writes: defaults.sync_writes,
        }
    }
}
