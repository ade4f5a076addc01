//! Shared fixtures for the object-core integration tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use futures::Stream;
use objkit::{
    kernel, Catalog, Edit, ObjectId, Record, RecordStore, System, SystemBuilder, Value,
};
use std::pin::Pin;

/// Boot a server-side system over the standard demo store.
pub async fn boot() -> Arc<System> {
    SystemBuilder::new(kernel::demo_store())
        .with_site(kernel::SITE)
        .boot()
        .await
        .expect("boot")
}

/// Insert a raw data catalog and return its id.
pub async fn insert(system: &Arc<System>, data: Catalog) -> ObjectId {
    system.insert_data(data).await.expect("insert").id
}

/// Store wrapper counting `select` calls per id, for single-flight checks.
pub struct CountingStore {
    inner: Arc<dyn RecordStore>,
    selects: DashMap<i64, AtomicUsize>,
}

impl CountingStore {
    pub fn new(inner: Arc<dyn RecordStore>) -> Arc<CountingStore> {
        Arc::new(CountingStore {
            inner,
            selects: DashMap::new(),
        })
    }

    pub fn selects_of(&self, id: ObjectId) -> usize {
        self.selects
            .get(&id.0)
            .map(|c| c.load(Ordering::SeqCst))
            .unwrap_or(0)
    }
}

#[async_trait]
impl RecordStore for CountingStore {
    async fn select(&self, id: ObjectId) -> objkit::Result<String> {
        self.selects
            .entry(id.0)
            .or_insert_with(|| AtomicUsize::new(0))
            .fetch_add(1, Ordering::SeqCst);
        self.inner.select(id).await
    }

    async fn insert(&self, data: Catalog, id: Option<ObjectId>) -> objkit::Result<Record> {
        self.inner.insert(data, id).await
    }

    async fn insert_many(
        &self,
        items: Vec<(ObjectId, Catalog)>,
    ) -> objkit::Result<Vec<Record>> {
        self.inner.insert_many(items).await
    }

    async fn update(&self, id: ObjectId, edits: &[Edit]) -> objkit::Result<Record> {
        self.inner.update(id, edits).await
    }

    async fn delete(&self, id: ObjectId) -> objkit::Result<bool> {
        self.inner.delete(id).await
    }

    fn scan(&self, category: Option<ObjectId>) -> Pin<Box<dyn Stream<Item = Record> + Send + '_>> {
        self.inner.scan(category)
    }
}

/// Data catalog of a category whose members carry a repeated, inherited
/// `tags` field with a category-level default.
pub fn tagged_category() -> Catalog {
    Catalog::new()
        .with("__category", Value::Ref(kernel::ROOT_CATEGORY))
        .with("name", "Tagged")
        .with(
            "schema",
            Catalog::new().with(
                "tags",
                Catalog::new().with("type", "string").with("repeated", true),
            ),
        )
        .with("defaults", Catalog::new().with("tags", "d"))
}
