//! Catalog module: records, id allocation, exact ratings, index store and blob mirror.
//!
//! Layered like the other service modules: domain types, a repository trait
//! (`IndexStore`) with a SeaORM implementation under `repo`, and the
//! orchestrating `CatalogService`.

pub mod allocator;
pub mod domain;
pub mod mirror;
pub mod numeric;
pub mod repo;
pub mod repository;
pub mod seed;
pub mod service;

pub use domain::{Book, BookInput, BookPatch, CongruenceReport, NewBook, SeedData};
pub use mirror::BlobMirror;
pub use repo::seaorm::SeaOrmIndexStore;
pub use repository::{memory::MemoryIndexStore, IndexStore};
pub use service::{CatalogOptions, CatalogService};
