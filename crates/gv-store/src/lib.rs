//! Chunk and catalog storage for gridvault.
//!
//! An object is stored in two places that never reference each other:
//!
//! - a [`ChunkStore`] holds the content, split into fixed-size chunks keyed
//!   by `(ObjectId, sequence number)`;
//! - an [`ObjectCatalog`] holds one [`ObjectRecord`](gv_types::ObjectRecord)
//!   per committed object.
//!
//! The shared [`ObjectId`](gv_types::ObjectId) is the only link. Higher
//! layers decide ordering (chunks before record on write, record before
//! chunks on delete); the backends here only promise per-call atomicity.
//!
//! # Storage Backends
//!
//! - [`InMemoryChunkStore`] / [`InMemoryObjectCatalog`] -- lock-protected
//!   maps for tests and embedding
//! - [`DiskChunkStore`] / [`DiskObjectCatalog`] -- one file per chunk and
//!   one JSON document per record under a collection directory
//!
//! # Design Rules
//!
//! 1. Committed records and their chunks are immutable.
//! 2. A catalog commit is all-or-nothing and never replaces an existing id.
//! 3. Concurrent reads are always safe.
//! 4. All I/O errors are propagated, never silently ignored.

pub mod disk;
pub mod error;
pub mod memory;
pub mod traits;

pub use disk::{DiskChunkStore, DiskObjectCatalog};
pub use error::{StoreError, StoreResult};
pub use memory::{InMemoryChunkStore, InMemoryObjectCatalog};
pub use traits::{ChunkStore, ObjectCatalog, RecordIter};
