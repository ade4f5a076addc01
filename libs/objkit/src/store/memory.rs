use std::collections::BTreeMap;
use std::sync::atomic::{AtomicI64, Ordering};

use async_trait::async_trait;
use catalog::{ObjectId, Record};
use parking_lot::RwLock;

use crate::error::{CoreError, Result};
use crate::store::{LayerHit, StoreLayer};

/// In-memory layer: a map of serialized records plus an id sequence over
/// the layer's configured range. `None` values are tombstones.
pub struct MemoryLayer {
    records: RwLock<BTreeMap<i64, Option<String>>>,
    readonly: bool,
    range_start: i64,
    range_stop: Option<i64>,
    next_id: AtomicI64,
}

impl MemoryLayer {
    /// Writable layer allocating ids from `start..stop`.
    pub fn new(start: i64, stop: Option<i64>) -> Self {
        MemoryLayer {
            records: RwLock::new(BTreeMap::new()),
            readonly: false,
            range_start: start,
            range_stop: stop,
            next_id: AtomicI64::new(start),
        }
    }

    /// Read-only layer pre-populated with records (seed data in tests).
    pub fn readonly_with(records: Vec<Record>) -> Self {
        let map: BTreeMap<i64, Option<String>> = records
            .iter()
            .map(|rec| (rec.id.0, Some(rec.encode_data())))
            .collect();
        MemoryLayer {
            records: RwLock::new(map),
            readonly: true,
            range_start: 0,
            range_stop: None,
            next_id: AtomicI64::new(0),
        }
    }

    /// Writable layer pre-populated with records; the id sequence starts
    /// above both `start` and the highest seeded id.
    pub fn writable_with(records: Vec<Record>, start: i64, stop: Option<i64>) -> Self {
        let map: BTreeMap<i64, Option<String>> = records
            .iter()
            .map(|rec| (rec.id.0, Some(rec.encode_data())))
            .collect();
        let top = map.keys().max().copied().unwrap_or(start - 1);
        MemoryLayer {
            records: RwLock::new(map),
            readonly: false,
            range_start: start,
            range_stop: stop,
            next_id: AtomicI64::new(start.max(top + 1)),
        }
    }
}

#[async_trait]
impl StoreLayer for MemoryLayer {
    fn readonly(&self) -> bool {
        self.readonly
    }

    async fn get(&self, id: ObjectId) -> Result<Option<LayerHit>> {
        Ok(self.records.read().get(&id.0).map(|slot| match slot {
            Some(text) => LayerHit::Data(text.clone()),
            None => LayerHit::Tombstone,
        }))
    }

    async fn put(&self, id: ObjectId, data: String) -> Result<()> {
        if self.readonly {
            return Err(CoreError::ReadOnlyStore);
        }
        self.records.write().insert(id.0, Some(data));
        Ok(())
    }

    async fn tombstone(&self, id: ObjectId) -> Result<()> {
        if self.readonly {
            return Err(CoreError::ReadOnlyStore);
        }
        self.records.write().insert(id.0, None);
        Ok(())
    }

    fn allocate_id(&self) -> Result<ObjectId> {
        if self.readonly {
            return Err(CoreError::ReadOnlyStore);
        }
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        if let Some(stop) = self.range_stop {
            if id >= stop {
                return Err(CoreError::Internal(format!(
                    "id range [{}, {stop}) exhausted",
                    self.range_start
                )));
            }
        }
        Ok(ObjectId(id))
    }

    fn ids(&self) -> Vec<(ObjectId, Option<String>)> {
        self.records
            .read()
            .iter()
            .map(|(id, slot)| (ObjectId(*id), slot.clone()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use catalog::Catalog;

    #[tokio::test]
    async fn readonly_layer_rejects_writes() {
        let layer = MemoryLayer::readonly_with(vec![Record::new(1, Catalog::new())]);
        assert!(layer.put(ObjectId(2), "{}".into()).await.is_err());
        assert!(layer.allocate_id().is_err());
        assert!(layer.get(ObjectId(1)).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn id_sequence_skips_seeded_ids() {
        let layer = MemoryLayer::writable_with(
            vec![Record::new(105, Catalog::new())],
            100,
            Some(200),
        );
        assert_eq!(layer.allocate_id().unwrap().0, 106);
    }

    #[tokio::test]
    async fn exhausted_range_errors() {
        let layer = MemoryLayer::new(10, Some(11));
        assert_eq!(layer.allocate_id().unwrap().0, 10);
        assert!(layer.allocate_id().is_err());
    }
}
