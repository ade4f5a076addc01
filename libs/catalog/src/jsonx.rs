//! JSONx — the tagged JSON form of catalogs.
//!
//! Plain scalars and arrays map directly. Object references become
//! `{"@id": N}` tokens. A catalog becomes a plain JSON object when its keys
//! are unique and none of them starts with `@`; otherwise it is written in
//! the explicit pair form `{"@cat": [[key, value], ...]}`, which preserves
//! repeated keys. Entry order survives both forms (`serde_json` is built
//! with `preserve_order`).

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::{Catalog, CatalogError, Value};

const REF_TAG: &str = "@id";
const CATALOG_TAG: &str = "@cat";

pub fn to_json(value: &Value) -> serde_json::Value {
    match value {
        Value::Null => serde_json::Value::Null,
        Value::Bool(b) => json!(b),
        Value::Int(n) => json!(n),
        Value::Float(x) => json!(x),
        Value::String(s) => json!(s),
        Value::Ref(id) => json!({ REF_TAG: id.0 }),
        Value::List(items) => serde_json::Value::Array(items.iter().map(to_json).collect()),
        Value::Catalog(cat) => catalog_to_json(cat),
    }
}

pub fn catalog_to_json(cat: &Catalog) -> serde_json::Value {
    let plain = cat.keys().all(|k| !k.starts_with('@'))
        && cat
            .keys()
            .enumerate()
            .all(|(i, k)| cat.keys().take(i).all(|seen| seen != k));
    if plain {
        let mut map = serde_json::Map::new();
        for entry in cat.iter() {
            map.insert(entry.key.clone(), to_json(&entry.value));
        }
        serde_json::Value::Object(map)
    } else {
        let pairs: Vec<serde_json::Value> = cat
            .iter()
            .map(|entry| json!([entry.key, to_json(&entry.value)]))
            .collect();
        json!({ CATALOG_TAG: pairs })
    }
}

pub fn from_json(raw: &serde_json::Value) -> Result<Value, CatalogError> {
    match raw {
        serde_json::Value::Null => Ok(Value::Null),
        serde_json::Value::Bool(b) => Ok(Value::Bool(*b)),
        serde_json::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Ok(Value::Int(i))
            } else if let Some(x) = n.as_f64() {
                Ok(Value::Float(x))
            } else {
                Err(CatalogError::Decode(format!("unrepresentable number {n}")))
            }
        }
        serde_json::Value::String(s) => Ok(Value::String(s.clone())),
        serde_json::Value::Array(items) => items
            .iter()
            .map(from_json)
            .collect::<Result<Vec<_>, _>>()
            .map(Value::List),
        serde_json::Value::Object(map) => {
            if map.len() == 1 {
                if let Some(id) = map.get(REF_TAG) {
                    let id = id.as_i64().ok_or_else(|| {
                        CatalogError::Decode(format!("\"{REF_TAG}\" must be an integer, got {id}"))
                    })?;
                    return Ok(Value::Ref(id.into()));
                }
                if map.contains_key(CATALOG_TAG) {
                    return catalog_from_json(raw).map(Value::Catalog);
                }
            }
            catalog_from_json(raw).map(Value::Catalog)
        }
    }
}

pub fn catalog_from_json(raw: &serde_json::Value) -> Result<Catalog, CatalogError> {
    let map = raw
        .as_object()
        .ok_or_else(|| CatalogError::Decode(format!("catalog must be a JSON object, got {raw}")))?;

    if map.len() == 1 {
        if let Some(pairs) = map.get(CATALOG_TAG) {
            let pairs = pairs.as_array().ok_or_else(|| {
                CatalogError::Decode(format!("\"{CATALOG_TAG}\" must hold an array of pairs"))
            })?;
            let mut cat = Catalog::new();
            for pair in pairs {
                let (key, value) = pair
                    .as_array()
                    .filter(|p| p.len() == 2)
                    .and_then(|p| p[0].as_str().map(|k| (k, &p[1])))
                    .ok_or_else(|| {
                        CatalogError::Decode(format!("malformed catalog pair {pair}"))
                    })?;
                cat.push(key, from_json(value)?);
            }
            return Ok(cat);
        }
    }

    let mut cat = Catalog::new();
    for (key, value) in map {
        cat.push(key.clone(), from_json(value)?);
    }
    Ok(cat)
}

impl Serialize for Value {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        to_json(self).serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Value {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = serde_json::Value::deserialize(deserializer)?;
        from_json(&raw).map_err(serde::de::Error::custom)
    }
}

impl Serialize for Catalog {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        catalog_to_json(self).serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Catalog {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = serde_json::Value::deserialize(deserializer)?;
        catalog_from_json(&raw).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ObjectId;

    #[test]
    fn references_become_id_tokens() {
        let value = Value::Ref(ObjectId(42));
        let raw = to_json(&value);
        assert_eq!(raw, json!({"@id": 42}));
        assert_eq!(from_json(&raw).unwrap(), value);
    }

    #[test]
    fn unique_keys_serialize_as_plain_object() {
        let cat = Catalog::new()
            .with("name", "site")
            .with("root", ObjectId(5))
            .with("nested", Catalog::new().with("k", 1i64));
        let raw = catalog_to_json(&cat);
        assert_eq!(
            raw,
            json!({"name": "site", "root": {"@id": 5}, "nested": {"k": 1}})
        );
        assert_eq!(catalog_from_json(&raw).unwrap(), cat);
    }

    #[test]
    fn repeated_keys_fall_back_to_pair_form() {
        let cat = Catalog::new().with("tag", "a").with("tag", "b");
        let raw = catalog_to_json(&cat);
        assert_eq!(raw, json!({"@cat": [["tag", "a"], ["tag", "b"]]}));
        let back = catalog_from_json(&raw).unwrap();
        assert_eq!(back, cat);
    }

    #[test]
    fn entry_order_survives_round_trip() {
        let cat = Catalog::new()
            .with("z", 1i64)
            .with("a", 2i64)
            .with("m", 3i64);
        let text = serde_json::to_string(&cat).unwrap();
        let back: Catalog = serde_json::from_str(&text).unwrap();
        assert_eq!(
            back.keys().collect::<Vec<_>>(),
            cat.keys().collect::<Vec<_>>()
        );
    }

    #[test]
    fn numbers_keep_their_kind() {
        let raw = json!([1, 2.5]);
        let value = from_json(&raw).unwrap();
        assert_eq!(value, Value::List(vec![Value::Int(1), Value::Float(2.5)]));
    }

    #[test]
    fn malformed_ref_is_rejected() {
        let raw = json!({"@id": "not-a-number"});
        assert!(from_json(&raw).is_err());
    }
}
