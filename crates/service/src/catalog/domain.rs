use serde::{Deserialize, Serialize};

use super::numeric;
use crate::errors::ServiceError;

/// A catalog record as seen by callers and as written to the blob mirror.
///
/// `id` is assigned once at creation and never changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Book {
    pub id: i64,
    pub title: String,
    #[serde(serialize_with = "numeric::serialize_plain")]
    pub rating: f64,
}

/// Create payload. Both fields are optional at the wire level so that a
/// missing field becomes a `Validation` error instead of a decode failure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BookInput {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub rating: Option<f64>,
}

/// Validated create payload.
#[derive(Debug, Clone, PartialEq)]
pub struct NewBook {
    pub title: String,
    pub rating: f64,
}

impl BookInput {
    pub fn validate(self) -> Result<NewBook, ServiceError> {
        let title = self.title.ok_or_else(|| ServiceError::Validation("title is required".into()))?;
        let rating = self.rating.ok_or_else(|| ServiceError::Validation("rating is required".into()))?;
        check_title(&title)?;
        check_rating(rating)?;
        Ok(NewBook { title, rating })
    }
}

/// Partial update: only the fields present are applied.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BookPatch {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub rating: Option<f64>,
}

impl BookPatch {
    pub fn is_empty(&self) -> bool {
        self.title.is_none() && self.rating.is_none()
    }

    pub fn validate(&self) -> Result<(), ServiceError> {
        if self.is_empty() {
            return Err(ServiceError::Validation("update body must contain title or rating".into()));
        }
        if let Some(title) = &self.title {
            check_title(title)?;
        }
        if let Some(rating) = self.rating {
            check_rating(rating)?;
        }
        Ok(())
    }

    /// The record with this patch applied; `id` is always carried over.
    pub fn apply_to(&self, current: &Book) -> Book {
        Book {
            id: current.id,
            title: self.title.clone().unwrap_or_else(|| current.title.clone()),
            rating: self.rating.unwrap_or(current.rating),
        }
    }
}

fn check_title(title: &str) -> Result<(), ServiceError> {
    models::book::validate_title(title).map_err(|e| ServiceError::Validation(e.to_string()))
}

fn check_rating(rating: f64) -> Result<(), ServiceError> {
    numeric::to_storage(rating)
        .map(|_| ())
        .map_err(|e| ServiceError::Validation(e.to_string()))
}

/// Bundled/initial dataset layout: `{"books": [...]}`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SeedData {
    pub books: Vec<Book>,
}

/// Divergence between the index and the blob mirror found by a congruence check.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CongruenceReport {
    /// Index ids whose derived blob key has no stored object.
    pub missing_blobs: Vec<i64>,
    /// Stored blob keys that no index row derives.
    pub orphaned_blobs: Vec<String>,
}

impl CongruenceReport {
    pub fn is_congruent(&self) -> bool {
        self.missing_blobs.is_empty() && self.orphaned_blobs.is_empty()
    }
}
