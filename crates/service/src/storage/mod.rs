//! Storage abstractions for service layer
//!
//! Blob backends the catalog mirror writes through: a directory-per-bucket
//! store for real deployments and an in-memory one for tests.

pub mod blob_store;
pub mod fs_blob_store;

pub use blob_store::{memory::MemoryBlobStore, BlobError, BlobStore};
pub use fs_blob_store::FsBlobStore;
