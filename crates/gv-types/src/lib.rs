//! Foundation types for gridvault.
//!
//! This crate provides the identity, metadata, and integrity types shared by
//! every other gridvault crate.
//!
//! # Key Types
//!
//! - [`ObjectId`]: 96-bit identifier reserved when a write session opens
//! - [`ObjectRecord`]: catalog metadata describing one committed object
//! - [`Checksum`]: BLAKE3 digest of an object's full content
//! - [`ChecksumHasher`]: incremental hasher fed chunk by chunk

pub mod checksum;
pub mod error;
pub mod object;
pub mod record;

pub use checksum::{Checksum, ChecksumHasher};
pub use error::TypeError;
pub use object::ObjectId;
pub use record::ObjectRecord;
