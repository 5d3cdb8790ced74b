//! Streaming chunked object storage.
//!
//! Objects are written through an [`ObjectWriter`] that splits the incoming
//! stream into fixed-size chunks, read back through an [`ObjectReader`] that
//! reassembles them lazily, and removed through a [`GarbageCollector`].
//! [`GridStore`] wires these to a pair of backends chosen by [`GridConfig`].
//!
//! # Protocol
//!
//! 1. Write: reserve id, store chunks `0..n` in order, then commit the
//!    catalog record. The commit is the only point at which an object
//!    becomes visible.
//! 2. Read: resolve the record once, then fetch chunks in ascending order.
//!    A missing chunk is corruption, never end of file.
//! 3. Delete: remove the record, then the chunks. A failure between the two
//!    leaks chunks (reclaimed by [`GarbageCollector::sweep`]) but never
//!    exposes a record without data.
//!
//! Sessions are blocking and `Send`. Concurrent readers of one object are
//! always safe; writers never share an id.

pub mod config;
pub mod error;
pub mod gc;
pub mod grid;
pub mod reader;
pub mod writer;

#[cfg(test)]
mod test_support;

pub use config::{BackendKind, GridConfig, GridOverrides, DEFAULT_CHUNK_SIZE, MAX_CHUNK_SIZE};
pub use error::{GridError, GridResult};
pub use gc::{DeleteReport, GarbageCollector, SweepReport};
pub use grid::{GridStore, ObjectStat};
pub use reader::ObjectReader;
pub use writer::{ObjectWriter, WriterState};

pub use gv_types::{Checksum, ObjectId, ObjectRecord};
