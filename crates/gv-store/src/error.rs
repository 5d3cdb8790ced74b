use gv_types::ObjectId;

/// Errors from chunk store and catalog operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The requested chunk does not exist.
    #[error("chunk {seq} of object {id} not found")]
    ChunkNotFound { id: ObjectId, seq: u32 },

    /// No catalog record exists for the id.
    #[error("object not found: {0}")]
    ObjectNotFound(ObjectId),

    /// A record with this id was already committed.
    #[error("object already committed: {0}")]
    DuplicateObject(ObjectId),

    /// The record violates a structural invariant.
    #[error("invalid record for {id}: {reason}")]
    InvalidRecord { id: ObjectId, reason: String },

    /// Serialization or deserialization failure.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// I/O error from the underlying storage medium.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
