//! Initial dataset used when the index starts out empty.

use std::path::Path;

use super::domain::{Book, SeedData};
use crate::errors::ServiceError;

const BUNDLED: &str = include_str!("../../data/books.json");

pub fn parse(bytes: &[u8]) -> Result<Vec<Book>, ServiceError> {
    let data: SeedData = serde_json::from_slice(bytes)
        .map_err(|e| ServiceError::Validation(format!("invalid seed data: {e}")))?;
    Ok(data.books)
}

/// The dataset compiled into this crate.
pub fn bundled() -> Result<Vec<Book>, ServiceError> {
    parse(BUNDLED.as_bytes())
}

/// Load `{"books": [...]}` from `path`, or the bundled dataset when `path` is `None`.
pub async fn load(path: Option<&Path>) -> Result<Vec<Book>, ServiceError> {
    match path {
        Some(p) => {
            let bytes = tokio::fs::read(p)
                .await
                .map_err(|e| ServiceError::Validation(format!("cannot read seed file {}: {e}", p.display())))?;
            parse(&bytes)
        }
        None => bundled(),
    }
}
