use std::collections::BTreeSet;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

use super::allocator;
use super::domain::{Book, BookInput, BookPatch, CongruenceReport};
use super::mirror::BlobMirror;
use super::repository::IndexStore;
use crate::errors::ServiceError;
use crate::observability::{self, record_op};

/// Tunables for [`CatalogService`].
#[derive(Debug, Clone, Copy, Default)]
pub struct CatalogOptions {
    /// Hold a process-local lock from the id read until the index write, so
    /// concurrent creates in this process never share an id. Off by default:
    /// two creates racing on the same maximum then collide, last writer wins.
    pub serialize_creates: bool,
}

/// Catalog business service over the authoritative index and the blob mirror.
///
/// Every call re-reads the index; nothing about records is cached between
/// calls. Writes go to the index first and the mirror second, with no
/// rollback if the mirror write fails.
pub struct CatalogService {
    index: Arc<dyn IndexStore>,
    mirror: BlobMirror,
    create_lock: Option<Mutex<()>>,
}

impl CatalogService {
    pub fn new(index: Arc<dyn IndexStore>, mirror: BlobMirror, opts: CatalogOptions) -> Self {
        let create_lock = opts.serialize_creates.then(|| Mutex::new(()));
        Self { index, mirror, create_lock }
    }

    pub fn mirror(&self) -> &BlobMirror { &self.mirror }

    /// Full catalog in scan order. A failing index scan is logged and reported as empty.
    #[instrument(skip(self))]
    pub async fn list(&self) -> Vec<Book> {
        match self.index.scan_all().await {
            Ok(books) => {
                record_op("list", true);
                books
            }
            Err(e) => {
                record_op("list", false);
                observability::DEGRADED_SCANS_TOTAL.inc();
                warn!(error = %e, "index scan failed; returning empty catalog");
                Vec::new()
            }
        }
    }

    /// Create a record with the next free id.
    ///
    /// # Examples
    /// ```
    /// use std::sync::Arc;
    /// use configs::KeyScheme;
    /// use service::catalog::{BlobMirror, BookInput, CatalogOptions, CatalogService, MemoryIndexStore};
    /// use service::storage::MemoryBlobStore;
    /// let mirror = BlobMirror::new(Arc::new(MemoryBlobStore::new()), KeyScheme::Id);
    /// let svc = CatalogService::new(Arc::new(MemoryIndexStore::new()), mirror, CatalogOptions::default());
    /// let input = BookInput { title: Some("Dune".into()), rating: Some(4.5) };
    /// let book = tokio_test::block_on(svc.create(input)).unwrap();
    /// assert_eq!(book.id, 1);
    /// assert_eq!(book.rating, 4.5);
    /// ```
    #[instrument(skip(self, input))]
    pub async fn create(&self, input: BookInput) -> Result<Book, ServiceError> {
        let res = self.create_inner(input).await;
        record_op("create", res.is_ok());
        res
    }

    async fn create_inner(&self, input: BookInput) -> Result<Book, ServiceError> {
        let new = input.validate()?;

        let guard = match &self.create_lock {
            Some(lock) => Some(lock.lock().await),
            None => None,
        };
        let current = self.index.scan_all().await?;
        let id = allocator::next_id(&current);
        let book = Book { id, title: new.title, rating: new.rating };
        self.index.put(&book).await?;
        drop(guard);
        debug!(id, existing = current.len(), "id allocated and indexed");

        self.mirror.put(&book).await?;
        info!(id, title = %book.title, "book_created");
        Ok(book)
    }

    /// Apply the fields present in `patch` to record `id`.
    ///
    /// An empty patch is rejected before the index is touched. When the blob
    /// key depends on a changed field, the object at the old key is removed
    /// before the new one is written.
    #[instrument(skip(self, patch))]
    pub async fn update(&self, id: i64, patch: BookPatch) -> Result<Book, ServiceError> {
        let res = self.update_inner(id, patch).await;
        record_op("update", res.is_ok());
        res
    }

    async fn update_inner(&self, id: i64, patch: BookPatch) -> Result<Book, ServiceError> {
        patch.validate()?;
        let current = self.index.get(id).await?.ok_or_else(|| ServiceError::not_found("Book"))?;
        let updated = patch.apply_to(&current);

        let old_key = self.mirror.derive_key(&current);
        let new_key = self.mirror.derive_key(&updated);

        self.index.put(&updated).await?;
        if old_key != new_key {
            debug!(%old_key, %new_key, "blob key changed; removing stale object");
            self.mirror.delete(&old_key).await?;
        }
        self.mirror.put(&updated).await?;
        info!(id, "book_updated");
        Ok(updated)
    }

    /// Remove record `id` from both stores; returns the removed record.
    #[instrument(skip(self))]
    pub async fn delete(&self, id: i64) -> Result<Book, ServiceError> {
        let res = self.delete_inner(id).await;
        record_op("delete", res.is_ok());
        res
    }

    async fn delete_inner(&self, id: i64) -> Result<Book, ServiceError> {
        let current = self.index.get(id).await?.ok_or_else(|| ServiceError::not_found("Book"))?;
        self.index.delete(id).await?;
        self.mirror.delete(&self.mirror.derive_key(&current)).await?;
        info!(id, "book_deleted");
        Ok(current)
    }

    /// Write `books` to both stores if, and only if, the index is empty.
    /// Returns how many records were seeded.
    #[instrument(skip(self, books), fields(candidates = books.len()))]
    pub async fn seed_if_empty(&self, books: &[Book]) -> Result<usize, ServiceError> {
        let existing = self.index.count().await?;
        if existing > 0 {
            info!(existing, "index already populated; seed skipped");
            return Ok(0);
        }
        for book in books {
            self.index.put(book).await?;
            self.mirror.put(book).await?;
        }
        info!(seeded = books.len(), "catalog_seeded");
        Ok(books.len())
    }

    /// Compare the index with the blob mirror. Divergence is logged and counted, never repaired.
    #[instrument(skip(self))]
    pub async fn check_congruence(&self) -> Result<CongruenceReport, ServiceError> {
        let books = self.index.scan_all().await?;
        let stored: BTreeSet<String> = self.mirror.keys().await.into_iter().collect();

        let mut expected = BTreeSet::new();
        let mut missing_blobs = Vec::new();
        for book in &books {
            let key = self.mirror.derive_key(book);
            if !stored.contains(&key) {
                missing_blobs.push(book.id);
            }
            expected.insert(key);
        }
        missing_blobs.sort_unstable();
        let orphaned_blobs: Vec<String> = stored.difference(&expected).cloned().collect();

        let report = CongruenceReport { missing_blobs, orphaned_blobs };
        if report.is_congruent() {
            debug!(records = books.len(), "index and blob mirror congruent");
        } else {
            let diverged = (report.missing_blobs.len() + report.orphaned_blobs.len()) as u64;
            observability::DIVERGENCE_TOTAL.inc_by(diverged);
            warn!(
                missing = ?report.missing_blobs,
                orphaned = ?report.orphaned_blobs,
                "index and blob mirror diverged"
            );
        }
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::repository::memory::MemoryIndexStore;
    use crate::catalog::seed;
    use crate::storage::{BlobStore, MemoryBlobStore};
    use configs::KeyScheme;
    use futures::future::join_all;
    use sea_orm::prelude::Decimal;
    use std::str::FromStr;

    struct Fixture {
        svc: CatalogService,
        index: Arc<MemoryIndexStore>,
        blobs: Arc<MemoryBlobStore>,
    }

    async fn fixture_with(scheme: KeyScheme, opts: CatalogOptions) -> Fixture {
        let index = Arc::new(MemoryIndexStore::new());
        let blobs = Arc::new(MemoryBlobStore::new());
        let mirror = BlobMirror::new(blobs.clone(), scheme);
        let svc = CatalogService::new(index.clone(), mirror, opts);
        svc.seed_if_empty(&seed::bundled().unwrap()).await.expect("seed");
        Fixture { svc, index, blobs }
    }

    async fn fixture() -> Fixture {
        fixture_with(KeyScheme::Id, CatalogOptions::default()).await
    }

    fn input(title: &str, rating: f64) -> BookInput {
        BookInput { title: Some(title.into()), rating: Some(rating) }
    }

    async fn index_ids(f: &Fixture) -> BTreeSet<i64> {
        f.index.scan_all().await.unwrap().into_iter().map(|b| b.id).collect()
    }

    async fn blob_keys(f: &Fixture) -> BTreeSet<String> {
        f.blobs.list_keys().await.unwrap().into_iter().collect()
    }

    async fn assert_congruent(f: &Fixture) {
        let expected: BTreeSet<String> = index_ids(f).await.into_iter().map(|id| format!("book_{id}.json")).collect();
        assert_eq!(blob_keys(f).await, expected);
        assert!(f.svc.check_congruence().await.unwrap().is_congruent());
    }

    #[tokio::test]
    async fn ratings_survive_round_trip_exactly() -> Result<(), ServiceError> {
        let f = fixture().await;
        let created = f.svc.create(input("Precise", 0.3)).await?;
        assert_eq!(f.index.raw_rating(created.id).await, Some(Decimal::from_str("0.3").unwrap()));

        let listed = f.svc.list().await.into_iter().find(|b| b.id == created.id).unwrap();
        assert_eq!(listed.rating, 0.3);

        let updated = f.svc.update(created.id, BookPatch { title: None, rating: Some(5.1) }).await?;
        assert_eq!(updated.rating, 5.1);
        let listed = f.svc.list().await.into_iter().find(|b| b.id == created.id).unwrap();
        assert_eq!(listed.rating, 5.1);
        Ok(())
    }

    #[tokio::test]
    async fn sequential_creates_allocate_increasing_ids() -> Result<(), ServiceError> {
        let f = fixture().await;
        assert_eq!(f.svc.create(input("Duplicate Book", 3.0)).await?.id, 3);
        assert_eq!(f.svc.create(input("Duplicate Book", 3.0)).await?.id, 4);
        assert_eq!(f.svc.list().await.len(), 4);
        Ok(())
    }

    #[tokio::test]
    async fn stores_stay_congruent_across_mutations() -> Result<(), ServiceError> {
        let f = fixture().await;
        assert_congruent(&f).await;

        let created = f.svc.create(input("New Book", 4.0)).await?;
        assert_congruent(&f).await;

        f.svc.update(created.id, BookPatch { title: Some("Renamed".into()), rating: Some(1.0) }).await?;
        assert_congruent(&f).await;
        let body = f.blobs.get(&format!("book_{}.json", created.id)).await?.unwrap();
        let mirrored: Book = serde_json::from_slice(&body).unwrap();
        assert_eq!(mirrored, Book { id: created.id, title: "Renamed".into(), rating: 1.0 });

        f.svc.delete(1).await?;
        assert_congruent(&f).await;
        assert!(!blob_keys(&f).await.contains("book_1.json"));
        Ok(())
    }

    #[tokio::test]
    async fn seeding_a_populated_index_is_a_no_op() -> Result<(), ServiceError> {
        let f = fixture().await;
        let before = f.svc.list().await;
        let seeded = f.svc.seed_if_empty(&seed::bundled()?).await?;
        assert_eq!(seeded, 0);
        assert_eq!(f.index.count().await?, 2);
        assert_eq!(f.svc.list().await, before);
        assert_eq!(blob_keys(&f).await.len(), 2);
        Ok(())
    }

    #[tokio::test]
    async fn unknown_ids_are_not_found_and_change_nothing() {
        let f = fixture().await;
        let ids = index_ids(&f).await;
        let keys = blob_keys(&f).await;

        let res = f.svc.update(999, BookPatch { title: Some("Ghost Book".into()), rating: Some(5.0) }).await;
        assert!(matches!(res, Err(ServiceError::NotFound(ref m)) if m == "Book not found"));
        assert!(matches!(f.svc.delete(999).await, Err(ServiceError::NotFound(_))));

        assert_eq!(index_ids(&f).await, ids);
        assert_eq!(blob_keys(&f).await, keys);
    }

    #[tokio::test]
    async fn partial_update_keeps_other_fields() -> Result<(), ServiceError> {
        let f = fixture().await;
        let updated = f.svc.update(1, BookPatch { title: None, rating: Some(1.0) }).await?;
        assert_eq!(updated, Book { id: 1, title: "Harry Potter".into(), rating: 1.0 });
        assert_eq!(f.index.get(1).await?, Some(updated));
        Ok(())
    }

    #[tokio::test]
    async fn empty_index_lists_empty() {
        let index = Arc::new(MemoryIndexStore::new());
        let mirror = BlobMirror::new(Arc::new(MemoryBlobStore::new()), KeyScheme::Id);
        let svc = CatalogService::new(index, mirror, CatalogOptions::default());
        assert!(svc.list().await.is_empty());
    }

    #[tokio::test]
    async fn invalid_input_has_no_side_effects() {
        let f = fixture().await;
        let missing_rating = BookInput { title: Some("x".into()), rating: None };
        assert!(matches!(f.svc.create(missing_rating).await, Err(ServiceError::Validation(_))));
        assert!(matches!(f.svc.create(BookInput::default()).await, Err(ServiceError::Validation(_))));
        assert!(matches!(f.svc.update(1, BookPatch::default()).await, Err(ServiceError::Validation(_))));
        // an empty patch is rejected even for unknown ids
        assert!(matches!(f.svc.update(999, BookPatch::default()).await, Err(ServiceError::Validation(_))));
        assert_eq!(index_ids(&f).await.len(), 2);
        assert_eq!(blob_keys(&f).await.len(), 2);
    }

    #[tokio::test]
    async fn title_keyed_rename_removes_stale_blob() -> Result<(), ServiceError> {
        let f = fixture_with(KeyScheme::Title, CatalogOptions::default()).await;
        assert!(blob_keys(&f).await.contains("Harry Potter.json"));

        f.svc.update(1, BookPatch { title: Some("New Title".into()), rating: None }).await?;
        let keys = blob_keys(&f).await;
        assert!(!keys.contains("Harry Potter.json"));
        assert!(keys.contains("New Title.json"));
        assert!(f.svc.check_congruence().await?.is_congruent());

        // rating-only change keeps the key
        f.svc.update(1, BookPatch { title: None, rating: Some(2.5) }).await?;
        assert_eq!(blob_keys(&f).await, keys);
        Ok(())
    }

    #[tokio::test]
    async fn blob_failure_after_index_write_is_not_rolled_back() {
        let f = fixture().await;
        f.blobs.set_unavailable(true);
        let res = f.svc.create(input("Half Written", 3.0)).await;
        assert!(matches!(res, Err(ServiceError::Blob(_))));
        f.blobs.set_unavailable(false);

        // the index kept the row; the mirror is missing it
        assert!(index_ids(&f).await.contains(&3));
        let report = f.svc.check_congruence().await.unwrap();
        assert_eq!(report.missing_blobs, vec![3]);
        assert!(report.orphaned_blobs.is_empty());
    }

    #[tokio::test]
    async fn orphaned_blobs_are_reported() -> Result<(), ServiceError> {
        let f = fixture().await;
        f.blobs.put("book_77.json", b"{}".to_vec()).await?;
        let report = f.svc.check_congruence().await?;
        assert_eq!(report.orphaned_blobs, vec!["book_77.json".to_string()]);
        assert!(report.missing_blobs.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn delete_tolerates_missing_blob() -> Result<(), ServiceError> {
        let f = fixture().await;
        f.blobs.delete("book_2.json").await?;
        let removed = f.svc.delete(2).await?;
        assert_eq!(removed.title, "The Tempest");
        assert!(!index_ids(&f).await.contains(&2));
        Ok(())
    }

    #[tokio::test]
    async fn index_outage_degrades_list_but_fails_writes() {
        let f = fixture().await;
        f.index.set_unavailable(true);
        assert!(f.svc.list().await.is_empty());
        assert!(matches!(f.svc.create(input("x", 1.0)).await, Err(ServiceError::Db(_))));
        assert!(matches!(f.svc.delete(1).await, Err(ServiceError::Db(_))));
        f.index.set_unavailable(false);
        assert_eq!(f.svc.list().await.len(), 2);
    }

    #[tokio::test]
    async fn deleting_the_maximum_frees_its_id() -> Result<(), ServiceError> {
        let f = fixture().await;
        let created = f.svc.create(input("Temp", 1.0)).await?;
        f.svc.delete(created.id).await?;
        assert_eq!(f.svc.create(input("Again", 1.0)).await?.id, created.id);
        Ok(())
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn serialized_creates_never_share_an_id() {
        let f = fixture_with(KeyScheme::Id, CatalogOptions { serialize_creates: true }).await;
        let svc = &f.svc;
        let results = join_all((0..20).map(|i| svc.create(input(&format!("Concurrent {i}"), 1.0)))).await;
        let ids: BTreeSet<i64> = results.into_iter().map(|r| r.unwrap().id).collect();
        assert_eq!(ids.len(), 20);
        assert_eq!(ids, (3..23).collect());
        assert_eq!(f.index.count().await.unwrap(), 22);
        assert_congruent(&f).await;
    }

    /// Memory index whose scans park on a barrier while armed, so two creates
    /// both read the same snapshot before either writes.
    struct GatedIndex {
        inner: MemoryIndexStore,
        gate: tokio::sync::Barrier,
        armed: std::sync::atomic::AtomicBool,
    }

    #[async_trait::async_trait]
    impl IndexStore for GatedIndex {
        async fn get(&self, id: i64) -> Result<Option<Book>, ServiceError> { self.inner.get(id).await }
        async fn put(&self, book: &Book) -> Result<(), ServiceError> { self.inner.put(book).await }
        async fn delete(&self, id: i64) -> Result<(), ServiceError> { self.inner.delete(id).await }
        async fn count(&self) -> Result<u64, ServiceError> { self.inner.count().await }

        async fn scan_all(&self) -> Result<Vec<Book>, ServiceError> {
            let snapshot = self.inner.scan_all().await?;
            if self.armed.load(std::sync::atomic::Ordering::SeqCst) {
                self.gate.wait().await;
            }
            Ok(snapshot)
        }
    }

    #[tokio::test]
    async fn unserialized_creates_can_share_an_id() -> Result<(), ServiceError> {
        let index = Arc::new(GatedIndex {
            inner: MemoryIndexStore::new(),
            gate: tokio::sync::Barrier::new(2),
            armed: std::sync::atomic::AtomicBool::new(false),
        });
        let blobs = Arc::new(MemoryBlobStore::new());
        let svc = CatalogService::new(index.clone(), BlobMirror::new(blobs.clone(), KeyScheme::Id), CatalogOptions::default());
        svc.seed_if_empty(&seed::bundled()?).await?;

        index.armed.store(true, std::sync::atomic::Ordering::SeqCst);
        let (a, b) = tokio::join!(svc.create(input("First", 1.0)), svc.create(input("Second", 2.0)));
        index.armed.store(false, std::sync::atomic::Ordering::SeqCst);
        let (a, b) = (a?, b?);

        // both allocated from max = 2; the later write replaced the earlier one
        assert_eq!(a.id, 3);
        assert_eq!(b.id, 3);
        assert_eq!(index.count().await?, 3);
        let stored = index.get(3).await?.expect("row 3");
        assert!(stored == a || stored == b);

        let body = blobs.get("book_3.json").await?.expect("blob 3");
        let mirrored: Book = serde_json::from_slice(&body).unwrap();
        assert_eq!(mirrored, stored);
        assert!(svc.check_congruence().await?.is_congruent());
        Ok(())
    }

    #[tokio::test]
    async fn rejected_ratings_and_titles_leave_both_stores_untouched() {
        let f = fixture().await;
        for rating in [1e-30, 1.2345678901234567e-15] {
            assert!(matches!(f.svc.create(input("Tiny", rating)).await, Err(ServiceError::Validation(_))));
        }
        let long = "x".repeat(513);
        assert!(matches!(f.svc.create(input(&long, 3.0)).await, Err(ServiceError::Validation(_))));
        let patch = BookPatch { title: Some(long), rating: None };
        assert!(matches!(f.svc.update(1, patch).await, Err(ServiceError::Validation(_))));

        assert_eq!(index_ids(&f).await, BTreeSet::from([1, 2]));
        assert_eq!(blob_keys(&f).await.len(), 2);
        assert_eq!(f.index.get(1).await.unwrap().unwrap().title, "Harry Potter");
    }
}
