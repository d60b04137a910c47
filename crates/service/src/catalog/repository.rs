use async_trait::async_trait;

use super::domain::Book;
use crate::errors::ServiceError;

/// Authoritative store for catalog records, keyed by numeric id.
///
/// Implementations persist `rating` through [`super::numeric`], never as a
/// binary float.
#[async_trait]
pub trait IndexStore: Send + Sync {
    async fn get(&self, id: i64) -> Result<Option<Book>, ServiceError>;
    /// Create the row or fully replace the one with the same id.
    async fn put(&self, book: &Book) -> Result<(), ServiceError>;
    /// Remove by id; absent ids are not an error.
    async fn delete(&self, id: i64) -> Result<(), ServiceError>;
    /// Every row, in no particular order.
    async fn scan_all(&self) -> Result<Vec<Book>, ServiceError>;
    async fn count(&self) -> Result<u64, ServiceError>;
}

/// In-memory index for tests and `index_backend = "memory"`.
pub mod memory {
    use super::*;
    use crate::catalog::numeric;
    use sea_orm::prelude::Decimal;
    use std::collections::BTreeMap;
    use std::sync::atomic::{AtomicBool, Ordering};
    use tokio::sync::RwLock;

    #[derive(Debug, Clone)]
    struct Row {
        title: String,
        rating: Decimal,
    }

    #[derive(Default)]
    pub struct MemoryIndexStore {
        rows: RwLock<BTreeMap<i64, Row>>,
        unavailable: AtomicBool,
    }

    impl MemoryIndexStore {
        pub fn new() -> Self { Self::default() }

        /// Make every subsequent call fail with `ServiceError::Db` until reset.
        pub fn set_unavailable(&self, down: bool) {
            self.unavailable.store(down, Ordering::SeqCst);
        }

        /// Stored decimal for `id`, bypassing the read-side codec.
        pub async fn raw_rating(&self, id: i64) -> Option<Decimal> {
            self.rows.read().await.get(&id).map(|r| r.rating)
        }

        fn check(&self) -> Result<(), ServiceError> {
            if self.unavailable.load(Ordering::SeqCst) {
                return Err(ServiceError::Db("memory index switched off".into()));
            }
            Ok(())
        }

        fn to_book(id: i64, row: &Row) -> Result<Book, ServiceError> {
            let rating = numeric::from_storage(row.rating).map_err(|e| ServiceError::Db(e.to_string()))?;
            Ok(Book { id, title: row.title.clone(), rating })
        }
    }

    #[async_trait]
    impl IndexStore for MemoryIndexStore {
        async fn get(&self, id: i64) -> Result<Option<Book>, ServiceError> {
            self.check()?;
            let rows = self.rows.read().await;
            rows.get(&id).map(|row| Self::to_book(id, row)).transpose()
        }

        async fn put(&self, book: &Book) -> Result<(), ServiceError> {
            self.check()?;
            let rating = numeric::to_storage(book.rating).map_err(|e| ServiceError::Validation(e.to_string()))?;
            self.rows.write().await.insert(book.id, Row { title: book.title.clone(), rating });
            Ok(())
        }

        async fn delete(&self, id: i64) -> Result<(), ServiceError> {
            self.check()?;
            self.rows.write().await.remove(&id);
            Ok(())
        }

        async fn scan_all(&self) -> Result<Vec<Book>, ServiceError> {
            self.check()?;
            let rows = self.rows.read().await;
            rows.iter().map(|(id, row)| Self::to_book(*id, row)).collect()
        }

        async fn count(&self) -> Result<u64, ServiceError> {
            self.check()?;
            Ok(self.rows.read().await.len() as u64)
        }
    }
}
