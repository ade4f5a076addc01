//! The record store: key→bytes layered lookup behind the record API.
//!
//! The physical format is deliberately out of the core's sight; the in-tree
//! layers are a memory map and a YAML-seeded file. Layers compose into a
//! [`LayeredStore`]: reads fall through top-down, writes land in the top
//! writable layer (a read-only layer forwards writes upward by
//! construction), deletes leave tombstones so seed records underneath stay
//! hidden.

mod file;
mod memory;

pub use file::FileLayer;
pub use memory::MemoryLayer;

use std::collections::HashMap;
use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use catalog::{Catalog, Edit, ObjectId, Record, Value};
use dashmap::DashMap;
use futures::Stream;

use crate::error::{CoreError, Result};
use crate::schema::FIELD_CATEGORY;

/// What a layer knows about an id.
#[derive(Debug, Clone, PartialEq)]
pub enum LayerHit {
    /// Serialized catalog of the record.
    Data(String),
    /// The record was deleted in this layer; lower layers must not be
    /// consulted.
    Tombstone,
}

/// One storage layer. Ids are allocated per layer from its configured
/// range, so layers can be merged without collisions.
#[async_trait]
pub trait StoreLayer: Send + Sync {
    fn readonly(&self) -> bool;

    async fn get(&self, id: ObjectId) -> Result<Option<LayerHit>>;

    /// Install or replace the serialized record. Clears a tombstone.
    async fn put(&self, id: ObjectId, data: String) -> Result<()>;

    /// Mark the id deleted in this layer.
    async fn tombstone(&self, id: ObjectId) -> Result<()>;

    /// Next free id from this layer's range.
    fn allocate_id(&self) -> Result<ObjectId>;

    /// Snapshot of ids present in this layer (tombstones included).
    fn ids(&self) -> Vec<(ObjectId, Option<String>)>;
}

/// The record API consumed by the object core.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Serialized catalog for `id`; `ObjectNotFound` on miss.
    async fn select(&self, id: ObjectId) -> Result<String>;

    /// Commit a new record; the store assigns the id unless a pre-assigned
    /// persistent id is passed in.
    async fn insert(&self, data: Catalog, id: Option<ObjectId>) -> Result<Record>;

    /// Commit several cross-referencing newborns at once. Keys are the
    /// provisional (negative) ids used in the catalogs; all references to
    /// them are remapped to store-assigned ids before anything is written.
    async fn insert_many(&self, items: Vec<(ObjectId, Catalog)>) -> Result<Vec<Record>>;

    /// Apply edits under the exclusive per-id lock; returns the new record.
    async fn update(&self, id: ObjectId, edits: &[Edit]) -> Result<Record>;

    /// Remove the record; `Ok(false)` when it did not exist.
    async fn delete(&self, id: ObjectId) -> Result<bool>;

    /// All records, optionally restricted to members of one category,
    /// ordered by id.
    fn scan(&self, category: Option<ObjectId>) -> Pin<Box<dyn Stream<Item = Record> + Send + '_>>;
}

/// Ordered composition of layers; index 0 is the top.
pub struct LayeredStore {
    layers: Vec<Arc<dyn StoreLayer>>,
    locks: DashMap<i64, Arc<tokio::sync::Mutex<()>>>,
}

impl LayeredStore {
    /// `layers` ordered top-first; at least one writable layer is required
    /// for any mutation to succeed.
    pub fn new(layers: Vec<Arc<dyn StoreLayer>>) -> Self {
        LayeredStore {
            layers,
            locks: DashMap::new(),
        }
    }

    fn top_writable(&self) -> Result<&Arc<dyn StoreLayer>> {
        self.layers
            .iter()
            .find(|l| !l.readonly())
            .ok_or(CoreError::ReadOnlyStore)
    }

    fn lock_for(&self, id: ObjectId) -> Arc<tokio::sync::Mutex<()>> {
        self.locks
            .entry(id.0)
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }

    async fn lookup(&self, id: ObjectId) -> Result<Option<String>> {
        for layer in &self.layers {
            match layer.get(id).await? {
                Some(LayerHit::Data(text)) => return Ok(Some(text)),
                Some(LayerHit::Tombstone) => return Ok(None),
                None => continue,
            }
        }
        Ok(None)
    }

    /// Merged `(id, data)` snapshot with top layers winning and tombstones
    /// erasing.
    fn snapshot(&self) -> Vec<(ObjectId, String)> {
        let mut merged: HashMap<i64, Option<String>> = HashMap::new();
        for layer in self.layers.iter().rev() {
            for (id, data) in layer.ids() {
                merged.insert(id.0, data);
            }
        }
        let mut records: Vec<(ObjectId, String)> = merged
            .into_iter()
            .filter_map(|(id, data)| data.map(|d| (ObjectId(id), d)))
            .collect();
        records.sort_by_key(|(id, _)| *id);
        records
    }
}

#[async_trait]
impl RecordStore for LayeredStore {
    async fn select(&self, id: ObjectId) -> Result<String> {
        self.lookup(id)
            .await?
            .ok_or(CoreError::ObjectNotFound { id })
    }

    async fn insert(&self, data: Catalog, id: Option<ObjectId>) -> Result<Record> {
        let layer = self.top_writable()?;
        let id = match id {
            Some(id) if id.is_persistent() => id,
            Some(id) => return Err(CoreError::Internal(format!("provisional id {id} in insert"))),
            None => layer.allocate_id()?,
        };
        let record = Record::new(id, data);
        layer.put(id, record.encode_data()).await?;
        tracing::debug!(id = id.0, "record inserted");
        Ok(record)
    }

    async fn insert_many(&self, items: Vec<(ObjectId, Catalog)>) -> Result<Vec<Record>> {
        let layer = self.top_writable()?;

        // First pass: allocate persistent ids for all provisional ones, so
        // that references among the newborns resolve after the commit.
        let mut mapping: HashMap<i64, ObjectId> = HashMap::new();
        let mut assigned = Vec::with_capacity(items.len());
        for (provisional, data) in items {
            let id = if provisional.is_provisional() {
                let id = layer.allocate_id()?;
                mapping.insert(provisional.0, id);
                id
            } else {
                provisional
            };
            assigned.push((id, data));
        }

        // Second pass: remap provisional references, then write.
        let mut records = Vec::with_capacity(assigned.len());
        for (id, mut data) in assigned {
            data.map_values(&mut |value| {
                if let Value::Ref(target) = value {
                    if let Some(real) = mapping.get(&target.0) {
                        *value = Value::Ref(*real);
                    }
                }
            });
            let record = Record::new(id, data);
            layer.put(id, record.encode_data()).await?;
            records.push(record);
        }
        tracing::debug!(count = records.len(), "batch insert committed");
        Ok(records)
    }

    async fn update(&self, id: ObjectId, edits: &[Edit]) -> Result<Record> {
        let lock = self.lock_for(id);
        let _guard = lock.lock().await;

        let text = self
            .lookup(id)
            .await?
            .ok_or(CoreError::ObjectNotFound { id })?;
        let mut record = Record::decode(id, &text)?;
        for edit in edits {
            edit.apply(&mut record.data)?;
        }
        self.top_writable()?.put(id, record.encode_data()).await?;
        Ok(record)
    }

    async fn delete(&self, id: ObjectId) -> Result<bool> {
        let lock = self.lock_for(id);
        let _guard = lock.lock().await;

        if self.lookup(id).await?.is_none() {
            return Ok(false);
        }
        self.top_writable()?.tombstone(id).await?;
        tracing::debug!(id = id.0, "record deleted");
        Ok(true)
    }

    fn scan(&self, category: Option<ObjectId>) -> Pin<Box<dyn Stream<Item = Record> + Send + '_>> {
        let records = self.snapshot();
        Box::pin(futures::stream::iter(
            records
                .into_iter()
                .filter_map(|(id, text)| Record::decode(id, &text).ok())
                .filter(move |rec| match category {
                    None => true,
                    Some(cat) => rec
                        .data
                        .get(FIELD_CATEGORY)
                        .and_then(|v| v.as_ref_id())
                        .map(|r| r == cat)
                        .unwrap_or(false),
                }),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use catalog::Step;
    use futures::StreamExt;

    fn store_with_memory() -> LayeredStore {
        LayeredStore::new(vec![Arc::new(MemoryLayer::new(100, None))])
    }

    #[tokio::test]
    async fn insert_select_round_trip() {
        let store = store_with_memory();
        let rec = store
            .insert(Catalog::new().with("name", "thing"), None)
            .await
            .unwrap();
        assert_eq!(rec.id.0, 100);
        let text = store.select(rec.id).await.unwrap();
        assert_eq!(Record::decode(rec.id, &text).unwrap(), rec);
    }

    #[tokio::test]
    async fn select_miss_is_object_not_found() {
        let store = store_with_memory();
        let err = store.select(ObjectId(7)).await.unwrap_err();
        assert!(matches!(err, CoreError::ObjectNotFound { id } if id.0 == 7));
    }

    #[tokio::test]
    async fn ids_come_from_the_layer_range() {
        let store = store_with_memory();
        let a = store.insert(Catalog::new(), None).await.unwrap();
        let b = store.insert(Catalog::new(), None).await.unwrap();
        assert_eq!((a.id.0, b.id.0), (100, 101));
    }

    #[tokio::test]
    async fn update_applies_edits_in_order() {
        let store = store_with_memory();
        let rec = store
            .insert(Catalog::new().with("x", 1i64), None)
            .await
            .unwrap();
        let updated = store
            .update(
                rec.id,
                &[
                    Edit::Insert {
                        path: vec![],
                        pos: 1,
                        key: "y".into(),
                        value: Value::Int(2),
                    },
                    Edit::Delete {
                        path: vec![Step::Key("x".into())],
                    },
                ],
            )
            .await
            .unwrap();
        assert_eq!(updated.data, Catalog::new().with("y", 2i64));
        // And the stored copy matches what was returned.
        let text = store.select(rec.id).await.unwrap();
        assert_eq!(Record::decode(rec.id, &text).unwrap(), updated);
    }

    #[tokio::test]
    async fn delete_hides_seed_records_with_a_tombstone() {
        let seed = Arc::new(MemoryLayer::readonly_with(vec![Record::new(
            1,
            Catalog::new().with("name", "seeded"),
        )]));
        let top = Arc::new(MemoryLayer::new(100, None));
        let store = LayeredStore::new(vec![top, seed]);

        assert!(store.select(ObjectId(1)).await.is_ok());
        assert!(store.delete(ObjectId(1)).await.unwrap());
        assert!(matches!(
            store.select(ObjectId(1)).await.unwrap_err(),
            CoreError::ObjectNotFound { .. }
        ));
        // Deleting again reports absence.
        assert!(!store.delete(ObjectId(1)).await.unwrap());
    }

    #[tokio::test]
    async fn top_layer_shadows_lower_layers() {
        let seed = Arc::new(MemoryLayer::readonly_with(vec![Record::new(
            1,
            Catalog::new().with("v", 1i64),
        )]));
        let top = Arc::new(MemoryLayer::new(100, None));
        let store = LayeredStore::new(vec![top, seed]);

        // An update of a seed record lands in the writable layer above.
        store
            .update(
                ObjectId(1),
                &[Edit::Update {
                    path: vec![Step::Key("v".into())],
                    key: None,
                    value: Some(Value::Int(2)),
                }],
            )
            .await
            .unwrap();
        let text = store.select(ObjectId(1)).await.unwrap();
        let rec = Record::decode(ObjectId(1), &text).unwrap();
        assert_eq!(rec.data.get("v").unwrap().as_int(), Some(2));
    }

    #[tokio::test]
    async fn insert_many_remaps_provisional_references() {
        let store = store_with_memory();
        // Two newborns referencing each other through provisional ids.
        let records = store
            .insert_many(vec![
                (
                    ObjectId(-1),
                    Catalog::new().with("peer", Value::Ref(ObjectId(-2))),
                ),
                (
                    ObjectId(-2),
                    Catalog::new().with("peer", Value::Ref(ObjectId(-1))),
                ),
            ])
            .await
            .unwrap();

        let [a, b] = &records[..] else { panic!() };
        assert!(a.id.is_persistent() && b.id.is_persistent());
        assert_eq!(a.data.get("peer").unwrap().as_ref_id(), Some(b.id));
        assert_eq!(b.data.get("peer").unwrap().as_ref_id(), Some(a.id));
    }

    #[tokio::test]
    async fn scan_filters_by_category() {
        let store = store_with_memory();
        store
            .insert(
                Catalog::new().with(FIELD_CATEGORY, Value::Ref(ObjectId(5))),
                None,
            )
            .await
            .unwrap();
        store
            .insert(
                Catalog::new().with(FIELD_CATEGORY, Value::Ref(ObjectId(6))),
                None,
            )
            .await
            .unwrap();

        let members: Vec<Record> = store.scan(Some(ObjectId(5))).collect().await;
        assert_eq!(members.len(), 1);
        let all: Vec<Record> = store.scan(None).collect().await;
        assert_eq!(all.len(), 2);
    }
}
