use sea_orm::DatabaseConnection;

use crate::catalog::domain::Book;
use crate::catalog::numeric;
use crate::catalog::repository::IndexStore;
use crate::errors::ServiceError;

/// Postgres-backed index over the `book` table.
pub struct SeaOrmIndexStore {
    pub db: DatabaseConnection,
}

impl SeaOrmIndexStore {
    pub fn new(db: DatabaseConnection) -> Self { Self { db } }
}

fn to_book(m: models::book::Model) -> Result<Book, ServiceError> {
    let rating = numeric::from_storage(m.rating).map_err(|e| ServiceError::Db(e.to_string()))?;
    Ok(Book { id: m.id, title: m.title, rating })
}

#[async_trait::async_trait]
impl IndexStore for SeaOrmIndexStore {
    async fn get(&self, id: i64) -> Result<Option<Book>, ServiceError> {
        models::book::find(&self.db, id).await?.map(to_book).transpose()
    }

    async fn put(&self, book: &Book) -> Result<(), ServiceError> {
        let rating = numeric::to_storage(book.rating).map_err(|e| ServiceError::Validation(e.to_string()))?;
        models::book::upsert(&self.db, book.id, &book.title, rating).await?;
        Ok(())
    }

    async fn delete(&self, id: i64) -> Result<(), ServiceError> {
        models::book::delete(&self.db, id).await?;
        Ok(())
    }

    async fn scan_all(&self) -> Result<Vec<Book>, ServiceError> {
        models::book::all(&self.db).await?.into_iter().map(to_book).collect()
    }

    async fn count(&self) -> Result<u64, ServiceError> {
        Ok(models::book::count(&self.db).await?)
    }
}
