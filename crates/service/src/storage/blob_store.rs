use async_trait::async_trait;
use thiserror::Error;

/// Failures reported by blob backends.
#[derive(Debug, Error)]
pub enum BlobError {
    #[error("blob io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid blob key: {0:?}")]
    InvalidKey(String),
    #[error("blob store unavailable: {0}")]
    Unavailable(String),
    #[error("corrupt blob {key}: {reason}")]
    Corrupt { key: String, reason: String },
}

/// Object store addressed by opaque string keys.
///
/// Writes overwrite whatever is stored at the key. There is no notion of
/// uniqueness beyond key collision.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Store `body` under `key`, replacing any existing object.
    async fn put(&self, key: &str, body: Vec<u8>) -> Result<(), BlobError>;

    /// `Ok(None)` when nothing is stored under `key`.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, BlobError>;

    /// Remove the object; returns whether it existed.
    async fn delete(&self, key: &str) -> Result<bool, BlobError>;

    /// Enumerate every stored key. Each call re-reads the backend.
    async fn list_keys(&self) -> Result<Vec<String>, BlobError>;
}

/// In-memory blob store for tests and development.
pub mod memory {
    use super::*;
    use std::collections::BTreeMap;
    use std::sync::atomic::{AtomicBool, Ordering};
    use tokio::sync::RwLock;

    #[derive(Default)]
    pub struct MemoryBlobStore {
        objects: RwLock<BTreeMap<String, Vec<u8>>>,
        unavailable: AtomicBool,
    }

    impl MemoryBlobStore {
        pub fn new() -> Self { Self::default() }

        /// Make every subsequent call fail with `BlobError::Unavailable` until reset.
        pub fn set_unavailable(&self, down: bool) {
            self.unavailable.store(down, Ordering::SeqCst);
        }

        fn check(&self) -> Result<(), BlobError> {
            if self.unavailable.load(Ordering::SeqCst) {
                return Err(BlobError::Unavailable("memory blob store switched off".into()));
            }
            Ok(())
        }
    }

    #[async_trait]
    impl BlobStore for MemoryBlobStore {
        async fn put(&self, key: &str, body: Vec<u8>) -> Result<(), BlobError> {
            self.check()?;
            self.objects.write().await.insert(key.to_string(), body);
            Ok(())
        }

        async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, BlobError> {
            self.check()?;
            Ok(self.objects.read().await.get(key).cloned())
        }

        async fn delete(&self, key: &str) -> Result<bool, BlobError> {
            self.check()?;
            Ok(self.objects.write().await.remove(key).is_some())
        }

        async fn list_keys(&self) -> Result<Vec<String>, BlobError> {
            self.check()?;
            Ok(self.objects.read().await.keys().cloned().collect())
        }
    }
}
