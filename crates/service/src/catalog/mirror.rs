use std::sync::Arc;

use configs::KeyScheme;
use futures::stream::{self, BoxStream, StreamExt};
use tracing::{debug, warn};

use super::domain::Book;
use crate::errors::ServiceError;
use crate::observability;
use crate::storage::{BlobError, BlobStore};

/// Keeps one serialized object per record in a blob store.
///
/// The key scheme is fixed at construction. Under [`KeyScheme::Title`] a key
/// depends on a mutable field, so callers that rename a record must delete
/// the object at the old key themselves (see `CatalogService::update`).
#[derive(Clone)]
pub struct BlobMirror {
    store: Arc<dyn BlobStore>,
    scheme: KeyScheme,
}

impl BlobMirror {
    pub fn new(store: Arc<dyn BlobStore>, scheme: KeyScheme) -> Self {
        Self { store, scheme }
    }

    pub fn scheme(&self) -> KeyScheme { self.scheme }

    /// Object key for `book` under the configured scheme.
    pub fn derive_key(&self, book: &Book) -> String {
        match self.scheme {
            KeyScheme::Id => format!("book_{}.json", book.id),
            KeyScheme::Title => format!("{}.json", book.title),
        }
    }

    /// Serialize `book` and write it at its derived key, overwriting any object there.
    pub async fn put(&self, book: &Book) -> Result<(), ServiceError> {
        let key = self.derive_key(book);
        let body = serde_json::to_vec(book)
            .map_err(|e| BlobError::Corrupt { key: key.clone(), reason: e.to_string() })?;
        self.store.put(&key, body).await.map_err(|e| {
            observability::BLOB_MIRROR_FAILURES_TOTAL.inc();
            warn!(%key, error = %e, "blob mirror write failed");
            ServiceError::from(e)
        })?;
        debug!(%key, id = book.id, "book mirrored");
        Ok(())
    }

    /// Remove the object at `key`. An absent object is logged as divergence, not an error.
    pub async fn delete(&self, key: &str) -> Result<(), ServiceError> {
        match self.store.delete(key).await {
            Ok(true) => Ok(()),
            Ok(false) => {
                observability::DIVERGENCE_TOTAL.inc();
                warn!(%key, "blob already absent; index and mirror had diverged");
                Ok(())
            }
            Err(e) => {
                observability::BLOB_MIRROR_FAILURES_TOTAL.inc();
                warn!(%key, error = %e, "blob mirror delete failed");
                Err(e.into())
            }
        }
    }

    /// Every stored key; an unreachable store yields an empty list.
    pub async fn keys(&self) -> Vec<String> {
        match self.store.list_keys().await {
            Ok(keys) => keys,
            Err(e) => {
                observability::DEGRADED_SCANS_TOTAL.inc();
                warn!(error = %e, "blob listing failed; treating mirror as empty");
                Vec::new()
            }
        }
    }

    /// Lazily read every stored record.
    ///
    /// Each call re-enumerates the store. Objects are fetched as the stream is
    /// polled; unreadable objects are skipped with a warning, and a store that
    /// cannot be listed produces an empty stream.
    pub fn list_all(&self) -> BoxStream<'_, Book> {
        stream::once(self.keys())
            .flat_map(|keys| stream::iter(keys))
            .filter_map(move |key| async move {
                match self.store.get(&key).await {
                    Ok(Some(bytes)) => match decode(&key, &bytes) {
                        Ok(book) => Some(book),
                        Err(e) => {
                            observability::DIVERGENCE_TOTAL.inc();
                            warn!(%key, error = %e, "skipping unreadable blob");
                            None
                        }
                    },
                    Ok(None) => None,
                    Err(e) => {
                        warn!(%key, error = %e, "skipping blob that failed to load");
                        None
                    }
                }
            })
            .boxed()
    }
}

fn decode(key: &str, bytes: &[u8]) -> Result<Book, BlobError> {
    serde_json::from_slice(bytes).map_err(|e| BlobError::Corrupt { key: key.to_string(), reason: e.to_string() })
}
