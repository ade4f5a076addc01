use serde::{Deserialize, Serialize};

use crate::{Catalog, CatalogError, Entry, Path, Step, Value};

/// A structured mutation of a catalog tree.
///
/// Edits are the only legitimate mutation of a stored object's data. They
/// are applied server-side, under the store's exclusive per-id lock, in
/// submission order; each application is deterministic.
///
/// `path` addressing: for `Insert` and `Move` the path names the *container*
/// catalog (empty path = the root catalog); for `Delete` and `Update` it
/// names the entry itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Edit {
    /// Replace the whole catalog.
    Overwrite { data: Catalog },

    /// Insert `(key, value)` at position `pos` of the container at `path`.
    Insert {
        path: Path,
        pos: usize,
        key: String,
        value: Value,
    },

    /// Remove the entry at `path`.
    Delete { path: Path },

    /// Patch the entry at `path`: replace its key and/or value.
    Update {
        path: Path,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        key: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        value: Option<Value>,
    },

    /// Within the container at `path`, move the entry at `pos` to `pos_new`.
    Move {
        path: Path,
        pos: usize,
        pos_new: usize,
    },
}

impl Edit {
    pub fn apply(&self, data: &mut Catalog) -> Result<(), CatalogError> {
        match self {
            Edit::Overwrite { data: replacement } => {
                *data = replacement.clone();
                Ok(())
            }
            Edit::Insert {
                path,
                pos,
                key,
                value,
            } => {
                let container = data.catalog_at_mut(path)?;
                container.insert_entry(*pos, Entry::new(key.clone(), value.clone()))
            }
            Edit::Delete { path } => {
                let (last, parent) = path.split_last().ok_or(CatalogError::EmptyPath)?;
                let container = data.catalog_at_mut(parent)?;
                container.remove_step(last).map(|_| ())
            }
            Edit::Update { path, key, value } => {
                let (last, parent) = path.split_last().ok_or(CatalogError::EmptyPath)?;
                let container = data.catalog_at_mut(parent)?;
                let entry = container.entry_mut_step(last)?;
                if let Some(key) = key {
                    entry.key = key.clone();
                }
                if let Some(value) = value {
                    entry.value = value.clone();
                }
                Ok(())
            }
            Edit::Move { path, pos, pos_new } => {
                let container = data.catalog_at_mut(path)?;
                container.move_entry(*pos, *pos_new)
            }
        }
    }
}

// Steps travel as plain JSON scalars: a string addresses a key, a
// non-negative number addresses a position.
impl Serialize for Step {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Step::Key(key) => serializer.serialize_str(key),
            Step::Index(index) => serializer.serialize_u64(*index as u64),
        }
    }
}

impl<'de> Deserialize<'de> for Step {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        use serde::de::Error;
        let raw = serde_json::Value::deserialize(deserializer)?;
        match raw {
            serde_json::Value::String(key) => Ok(Step::Key(key)),
            serde_json::Value::Number(n) => n
                .as_u64()
                .map(|index| Step::Index(index as usize))
                .ok_or_else(|| D::Error::custom("path index must be a non-negative integer")),
            other => Err(D::Error::custom(format!(
                "path step must be a string or an index, got {other}"
            ))),
        }
    }
}
