//! Process-wide cache of web objects, keyed by id.
//!
//! The registry guarantees at most one cached instance per id, collapses
//! concurrent loads of the same id into one store read (the object's load
//! slot does the single-flighting), evicts entries by TTL, and re-ensures
//! the root category after every purge. Mutable objects never enter the
//! registry.

use std::sync::Arc;

use catalog::{ObjectId, Record};
use dashmap::DashMap;

use crate::error::Result;
use crate::object::WebObject;
use crate::system::System;

pub struct ObjectRegistry {
    objects: DashMap<i64, Arc<WebObject>>,
}

impl Default for ObjectRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ObjectRegistry {
    pub fn new() -> Self {
        ObjectRegistry {
            objects: DashMap::new(),
        }
    }

    /// Cached instance, loaded or not.
    pub fn cached(&self, id: ObjectId) -> Option<Arc<WebObject>> {
        self.objects.get(&id.0).map(|entry| entry.clone())
    }

    /// The canonical instance for `id`: an existing entry or a fresh stub.
    pub fn stub_for(&self, id: ObjectId) -> Arc<WebObject> {
        self.objects
            .entry(id.0)
            .or_insert_with(|| WebObject::stub(id))
            .clone()
    }

    /// A fully loaded, immutable instance. Concurrent callers for the same
    /// id share one in-flight load and resolve to the same instance.
    pub async fn get_loaded(
        &self,
        system: &Arc<System>,
        id: ObjectId,
    ) -> Result<Arc<WebObject>> {
        let obj = self.stub_for(id);
        obj.load_core(system, &[]).await?;
        obj.set_expiry(now_millis() + obj.ttl() * 1000);
        Ok(obj)
    }

    /// Install or refresh a record received externally (over the wire, or
    /// returned by a store mutation). A newer record supersedes an older
    /// instance of the same id: the entry is replaced with a fresh
    /// record-seeded stub, so the next access re-loads from it.
    pub fn register_record(&self, record: Record) -> Arc<WebObject> {
        let id = record.id;
        let obj = WebObject::stub_with_record(record);
        self.objects.insert(id.0, obj.clone());
        obj
    }

    /// Drop one entry.
    pub fn remove(&self, id: ObjectId) {
        self.objects.remove(&id.0);
    }

    /// Remove entries whose residency expired, then make sure the root
    /// category is still resolvable — reloading it when the purge (or
    /// anything else) removed it.
    pub async fn evict(&self, system: &Arc<System>) -> Result<()> {
        let now = now_millis();
        let expired: Vec<i64> = self
            .objects
            .iter()
            .filter(|entry| entry.value().expiry() < now)
            .map(|entry| *entry.key())
            .collect();
        let count = expired.len();
        for id in expired {
            self.objects.remove(&id);
        }
        if count > 0 {
            tracing::debug!(count, "registry purge");
        }

        if !self.objects.contains_key(&ObjectId::ROOT_CATEGORY.0) {
            self.get_loaded(system, ObjectId::ROOT_CATEGORY).await?;
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }
}

pub(crate) fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
