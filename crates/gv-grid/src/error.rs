use gv_store::StoreError;
use gv_types::{Checksum, ObjectId};

/// Errors surfaced by gridvault sessions and the [`GridStore`](crate::GridStore) facade.
///
/// Nothing here is fatal to the process and nothing is retried internally;
/// callers decide what to do.
#[derive(Debug, thiserror::Error)]
pub enum GridError {
    /// No committed object has this id.
    #[error("object not found: {0}")]
    ObjectNotFound(ObjectId),

    /// The caller supplied a string that is not an object id.
    #[error("invalid object identifier: {0:?}")]
    InvalidIdentifier(String),

    /// A chunk the catalog promises is missing or malformed.
    #[error("object {id} is corrupted at chunk {seq}: {reason}")]
    CorruptedObject {
        id: ObjectId,
        seq: u32,
        reason: String,
    },

    /// The streamed content does not hash to the recorded checksum.
    #[error("checksum mismatch for {id}: expected {expected}, computed {computed}")]
    IntegrityError {
        id: ObjectId,
        expected: Checksum,
        computed: Checksum,
    },

    /// The backing medium failed during a logical operation.
    #[error("{op} failed for object {id}: {source}")]
    StorageIo {
        op: &'static str,
        id: ObjectId,
        #[source]
        source: StoreError,
    },

    /// A collection-wide backend operation failed.
    #[error("{op} failed: {source}")]
    Backend {
        op: &'static str,
        #[source]
        source: StoreError,
    },

    /// The caller's input stream failed while storing an object.
    #[error("failed to read input for object {id}: {source}")]
    Input {
        id: ObjectId,
        #[source]
        source: std::io::Error,
    },

    /// The write session was already committed or aborted.
    #[error("write session for {id} is already {state}")]
    SessionClosed { id: ObjectId, state: &'static str },

    /// Chunk size outside the supported range.
    #[error("invalid chunk size {0}: must be between 1 and {max}", max = crate::config::MAX_CHUNK_SIZE)]
    InvalidChunkSize(u32),

    /// The object needs more chunks than a sequence number can address.
    #[error("object {id} exceeds the maximum chunk count at chunk size {chunk_size}")]
    ObjectTooLarge { id: ObjectId, chunk_size: u32 },

    /// Configuration could not be loaded or is inconsistent.
    #[error("configuration error: {0}")]
    Config(String),
}

impl GridError {
    /// Wrap a backend failure with the operation and object it belongs to.
    ///
    /// A catalog miss keeps its meaning and becomes [`GridError::ObjectNotFound`].
    pub fn storage(op: &'static str, id: ObjectId, source: StoreError) -> Self {
        match source {
            StoreError::ObjectNotFound(missing) => Self::ObjectNotFound(missing),
            source => Self::StorageIo { op, id, source },
        }
    }

    /// `true` for unknown ids and for strings that cannot be ids at all.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::ObjectNotFound(_) | Self::InvalidIdentifier(_))
    }
}

/// Result alias for grid operations.
pub type GridResult<T> = Result<T, GridError>;
