//! Persistence and synchronisation layer for the book catalog.
//! - `catalog`: records, id allocation, exact ratings, the index store and blob mirror.
//! - `storage`: blob store backends the mirror writes through.
//! - Errors are reported as `ServiceError`; the HTTP layer maps them to status codes.

pub mod errors;
pub mod catalog;
pub mod storage;
pub mod observability;
