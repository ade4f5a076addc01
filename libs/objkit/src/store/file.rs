use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicI64, Ordering};

use async_trait::async_trait;
use catalog::{jsonx, ObjectId};
use parking_lot::RwLock;

use crate::error::{CoreError, Result};
use crate::store::{LayerHit, StoreLayer};

/// YAML-file layer. The file is a sequence of `{id, data}` mappings (plus
/// `{id, deleted: true}` tombstones in writable files); `data` is the JSONx
/// catalog form written as YAML. Read-only by default — the standard seed
/// layer of a site; a writable variant persists the whole file on every
/// mutation.
pub struct FileLayer {
    path: PathBuf,
    records: RwLock<BTreeMap<i64, Option<String>>>,
    readonly: bool,
    range_start: i64,
    range_stop: Option<i64>,
    next_id: AtomicI64,
}

impl FileLayer {
    /// Load a read-only seed layer.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::open_inner(path.as_ref(), true, 0, None)
    }

    /// Load (or start) a writable layer allocating ids from `start..stop`.
    pub fn open_writable(
        path: impl AsRef<Path>,
        start: i64,
        stop: Option<i64>,
    ) -> Result<Self> {
        Self::open_inner(path.as_ref(), false, start, stop)
    }

    fn open_inner(path: &Path, readonly: bool, start: i64, stop: Option<i64>) -> Result<Self> {
        let records = if path.exists() {
            Self::parse(&std::fs::read_to_string(path)?)?
        } else if readonly {
            return Err(CoreError::Internal(format!(
                "store file not found: {}",
                path.display()
            )));
        } else {
            BTreeMap::new()
        };

        let top = records.keys().max().copied().unwrap_or(start - 1);
        Ok(FileLayer {
            path: path.to_path_buf(),
            records: RwLock::new(records),
            readonly,
            range_start: start,
            range_stop: stop,
            next_id: AtomicI64::new(start.max(top + 1)),
        })
    }

    fn parse(text: &str) -> Result<BTreeMap<i64, Option<String>>> {
        let raw: serde_yaml::Value = serde_yaml::from_str(text)
            .map_err(|e| CoreError::Decode(format!("store file: {e}")))?;
        let items = match raw {
            serde_yaml::Value::Null => return Ok(BTreeMap::new()),
            serde_yaml::Value::Sequence(items) => items,
            _ => {
                return Err(CoreError::Decode(
                    "store file must be a YAML sequence of records".into(),
                ))
            }
        };

        let mut records = BTreeMap::new();
        for item in items {
            let id = item
                .get("id")
                .and_then(|v| v.as_i64())
                .ok_or_else(|| CoreError::Decode("record without integer 'id'".into()))?;
            if item.get("deleted").and_then(|v| v.as_bool()) == Some(true) {
                records.insert(id, None);
                continue;
            }
            let data = item
                .get("data")
                .ok_or_else(|| CoreError::Decode(format!("record [{id}] without 'data'")))?;
            let json = serde_json::to_value(data)
                .map_err(|e| CoreError::Decode(format!("record [{id}]: {e}")))?;
            let cat = jsonx::catalog_from_json(&json)
                .map_err(|e| CoreError::Decode(format!("record [{id}]: {e}")))?;
            records.insert(id, Some(jsonx::catalog_to_json(&cat).to_string()));
        }
        Ok(records)
    }

    /// Rewrite the whole file from the current map.
    fn save(&self) -> Result<()> {
        let records = self.records.read();
        let mut items: Vec<serde_yaml::Value> = Vec::with_capacity(records.len());
        for (id, slot) in records.iter() {
            let mut map = serde_yaml::Mapping::new();
            map.insert("id".into(), (*id).into());
            match slot {
                Some(text) => {
                    let json: serde_json::Value = serde_json::from_str(text)
                        .map_err(|e| CoreError::Internal(e.to_string()))?;
                    let yaml: serde_yaml::Value = serde_yaml::to_value(json)
                        .map_err(|e| CoreError::Internal(e.to_string()))?;
                    map.insert("data".into(), yaml);
                }
                None => {
                    map.insert("deleted".into(), true.into());
                }
            }
            items.push(serde_yaml::Value::Mapping(map));
        }
        let text = serde_yaml::to_string(&serde_yaml::Value::Sequence(items))
            .map_err(|e| CoreError::Internal(e.to_string()))?;
        std::fs::write(&self.path, text)?;
        Ok(())
    }
}

#[async_trait]
impl StoreLayer for FileLayer {
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
        self.save()
    }

    async fn tombstone(&self, id: ObjectId) -> Result<()> {
        if self.readonly {
            return Err(CoreError::ReadOnlyStore);
        }
        self.records.write().insert(id.0, None);
        self.save()
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
