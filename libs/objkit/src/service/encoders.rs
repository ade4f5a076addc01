//! The message encoders of the service layer.
//!
//! | Encoder | Wire form |
//! |---|---|
//! | `String` | identity pass-through |
//! | `QueryString` | `k=v&...` |
//! | `Json` / `JsonArray` | plain JSON (references degrade to bare ids) |
//! | `Jsonx` / `JsonxArray` | typed JSON preserving `{"@id": N}` references |
//! | `DataRecord` | `{id, data}`, registered on decode |
//! | `WebObjects` | array of records, each registered then loaded |
//! | `ActionResult` | `{status?, result?, records?}` |

use std::sync::Arc;

use async_trait::async_trait;
use catalog::{jsonx, Catalog, Record, Value};
use serde_json::json;

use crate::error::{CoreError, Result};
use crate::service::MessageEncoder;
use crate::system::System;

/// Plain (untagged) JSON projection: references degrade to bare id
/// numbers, repeated catalog keys collapse.
fn plain_to_json(value: &Value) -> serde_json::Value {
    match value {
        Value::Null => serde_json::Value::Null,
        Value::Bool(b) => json!(b),
        Value::Int(n) => json!(n),
        Value::Float(x) => json!(x),
        Value::String(s) => json!(s),
        Value::Ref(id) => json!(id.0),
        Value::List(items) => serde_json::Value::Array(items.iter().map(plain_to_json).collect()),
        Value::Catalog(cat) => {
            let mut map = serde_json::Map::new();
            for entry in cat.iter() {
                map.entry(entry.key.clone())
                    .or_insert_with(|| plain_to_json(&entry.value));
            }
            serde_json::Value::Object(map)
        }
    }
}

fn record_to_json(system: &Arc<System>, value: &Value) -> Result<serde_json::Value> {
    let record = value_to_record(system, value)?;
    Ok(json!({ "id": record.id.0, "data": jsonx::catalog_to_json(&record.data) }))
}

fn record_from_json(raw: &serde_json::Value) -> Result<Record> {
    let id = raw
        .get("id")
        .and_then(|v| v.as_i64())
        .ok_or_else(|| CoreError::Decode("record without integer 'id'".into()))?;
    let data = raw
        .get("data")
        .ok_or_else(|| CoreError::Decode(format!("record [{id}] without 'data'")))?;
    Ok(Record::new(id, jsonx::catalog_from_json(data)?))
}

/// Accept either a `{id, data}` catalog or a reference to a cached object.
fn value_to_record(system: &Arc<System>, value: &Value) -> Result<Record> {
    match value {
        Value::Catalog(cat) => {
            let id = cat
                .get("id")
                .and_then(|v| v.as_int())
                .ok_or_else(|| CoreError::Decode("record value without 'id'".into()))?;
            let data = cat
                .get("data")
                .and_then(|v| v.as_catalog())
                .cloned()
                .ok_or_else(|| CoreError::Decode("record value without 'data'".into()))?;
            Ok(Record::new(id, data))
        }
        Value::Ref(id) => {
            let obj = system
                .registry()
                .cached(*id)
                .ok_or(CoreError::NotLoaded { id: *id })?;
            obj.record()
        }
        other => Err(CoreError::Decode(format!(
            "expected a record or reference, got {other:?}"
        ))),
    }
}

/// Build the catalog form `{id, data}` of a record, the value shape the
/// record-carrying encoders exchange with server functions.
pub fn record_to_value(record: &Record) -> Value {
    Value::Catalog(
        Catalog::new()
            .with("id", record.id.0)
            .with("data", record.data.clone()),
    )
}

fn single<'a>(values: &'a [Value], encoder: &str) -> Result<&'a Value> {
    match values {
        [value] => Ok(value),
        _ => Err(CoreError::Internal(format!(
            "{encoder} encoder carries exactly one value, got {}",
            values.len()
        ))),
    }
}

// ---- String ----

pub struct StringEncoder;

#[async_trait]
impl MessageEncoder for StringEncoder {
    fn content_type(&self) -> &'static str {
        "text/plain; charset=utf-8"
    }

    fn encode(&self, _system: &Arc<System>, values: &[Value]) -> Result<String> {
        if values.is_empty() {
            return Ok(String::new());
        }
        let value = single(values, "String")?;
        Ok(match value {
            Value::String(s) => s.clone(),
            other => plain_to_json(other).to_string(),
        })
    }

    async fn decode(&self, _system: &Arc<System>, text: &str) -> Result<Vec<Value>> {
        Ok(vec![Value::String(text.to_string())])
    }
}

/// Same pass-through, served as HTML.
pub struct HtmlEncoder;

#[async_trait]
impl MessageEncoder for HtmlEncoder {
    fn content_type(&self) -> &'static str {
        "text/html; charset=utf-8"
    }

    fn encode(&self, system: &Arc<System>, values: &[Value]) -> Result<String> {
        StringEncoder.encode(system, values)
    }

    async fn decode(&self, _system: &Arc<System>, text: &str) -> Result<Vec<Value>> {
        Ok(vec![Value::String(text.to_string())])
    }
}

// ---- QueryString ----

pub struct QueryStringEncoder;

#[async_trait]
impl MessageEncoder for QueryStringEncoder {
    fn content_type(&self) -> &'static str {
        "application/x-www-form-urlencoded"
    }

    fn encode(&self, _system: &Arc<System>, values: &[Value]) -> Result<String> {
        if values.is_empty() {
            return Ok(String::new());
        }
        let value = single(values, "QueryString")?;
        let cat = value
            .as_catalog()
            .ok_or_else(|| CoreError::Decode("query string payload must be a catalog".into()))?;
        Ok(cat
            .iter()
            .map(|entry| {
                let text = match &entry.value {
                    Value::String(s) => s.clone(),
                    other => plain_to_json(other).to_string(),
                };
                format!(
                    "{}={}",
                    urlencoding::encode(&entry.key),
                    urlencoding::encode(&text)
                )
            })
            .collect::<Vec<_>>()
            .join("&"))
    }

    async fn decode(&self, _system: &Arc<System>, text: &str) -> Result<Vec<Value>> {
        let mut cat = Catalog::new();
        for pair in text.split('&').filter(|p| !p.is_empty()) {
            let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
            let key = urlencoding::decode(key)
                .map_err(|e| CoreError::Decode(e.to_string()))?
                .into_owned();
            let value = urlencoding::decode(value)
                .map_err(|e| CoreError::Decode(e.to_string()))?
                .into_owned();
            cat.push(key, value);
        }
        Ok(vec![Value::Catalog(cat)])
    }
}

// ---- Json / JsonArray ----

pub struct JsonEncoder;

#[async_trait]
impl MessageEncoder for JsonEncoder {
    fn encode(&self, _system: &Arc<System>, values: &[Value]) -> Result<String> {
        if values.is_empty() {
            return Ok("null".into());
        }
        Ok(plain_to_json(single(values, "Json")?).to_string())
    }

    async fn decode(&self, _system: &Arc<System>, text: &str) -> Result<Vec<Value>> {
        if text.is_empty() {
            return Ok(vec![Value::Null]);
        }
        let raw: serde_json::Value = serde_json::from_str(text)?;
        Ok(vec![jsonx::from_json(&raw)?])
    }
}

pub struct JsonArrayEncoder;

#[async_trait]
impl MessageEncoder for JsonArrayEncoder {
    fn is_array(&self) -> bool {
        true
    }

    fn encode(&self, _system: &Arc<System>, values: &[Value]) -> Result<String> {
        Ok(serde_json::Value::Array(values.iter().map(plain_to_json).collect()).to_string())
    }

    async fn decode(&self, _system: &Arc<System>, text: &str) -> Result<Vec<Value>> {
        if text.is_empty() {
            return Ok(Vec::new());
        }
        let raw: serde_json::Value = serde_json::from_str(text)?;
        let items = raw
            .as_array()
            .ok_or_else(|| CoreError::Decode("expected a JSON array".into()))?;
        items.iter().map(|item| Ok(jsonx::from_json(item)?)).collect()
    }
}

// ---- Jsonx / JsonxArray ----

pub struct JsonxEncoder;

#[async_trait]
impl MessageEncoder for JsonxEncoder {
    fn encode(&self, _system: &Arc<System>, values: &[Value]) -> Result<String> {
        if values.is_empty() {
            return Ok("null".into());
        }
        Ok(jsonx::to_json(single(values, "Jsonx")?).to_string())
    }

    async fn decode(&self, _system: &Arc<System>, text: &str) -> Result<Vec<Value>> {
        if text.is_empty() {
            return Ok(vec![Value::Null]);
        }
        let raw: serde_json::Value = serde_json::from_str(text)?;
        Ok(vec![jsonx::from_json(&raw)?])
    }
}

pub struct JsonxArrayEncoder;

#[async_trait]
impl MessageEncoder for JsonxArrayEncoder {
    fn is_array(&self) -> bool {
        true
    }

    fn encode(&self, _system: &Arc<System>, values: &[Value]) -> Result<String> {
        Ok(
            serde_json::Value::Array(values.iter().map(jsonx::to_json).collect())
                .to_string(),
        )
    }

    async fn decode(&self, _system: &Arc<System>, text: &str) -> Result<Vec<Value>> {
        if text.is_empty() {
            return Ok(Vec::new());
        }
        let raw: serde_json::Value = serde_json::from_str(text)?;
        let items = raw
            .as_array()
            .ok_or_else(|| CoreError::Decode("expected a JSON array".into()))?;
        items.iter().map(|item| Ok(jsonx::from_json(item)?)).collect()
    }
}

// ---- DataRecord ----

/// `{id, data}`; the decoded record is installed in the registry so the
/// returned reference is immediately loadable.
pub struct DataRecordEncoder;

#[async_trait]
impl MessageEncoder for DataRecordEncoder {
    fn encode(&self, system: &Arc<System>, values: &[Value]) -> Result<String> {
        Ok(record_to_json(system, single(values, "DataRecord")?)?.to_string())
    }

    async fn decode(&self, system: &Arc<System>, text: &str) -> Result<Vec<Value>> {
        let raw: serde_json::Value = serde_json::from_str(text)?;
        let record = record_from_json(&raw)?;
        let id = record.id;
        system.registry().register_record(record);
        Ok(vec![Value::Ref(id)])
    }
}

// ---- WebObjects ----

/// Array of records; each is registered and loaded on decode.
pub struct WebObjectsEncoder;

#[async_trait]
impl MessageEncoder for WebObjectsEncoder {
    fn is_array(&self) -> bool {
        true
    }

    fn encode(&self, system: &Arc<System>, values: &[Value]) -> Result<String> {
        let items: Result<Vec<serde_json::Value>> =
            values.iter().map(|v| record_to_json(system, v)).collect();
        Ok(serde_json::Value::Array(items?).to_string())
    }

    async fn decode(&self, system: &Arc<System>, text: &str) -> Result<Vec<Value>> {
        let raw: serde_json::Value = serde_json::from_str(text)?;
        let items = raw
            .as_array()
            .ok_or_else(|| CoreError::Decode("expected a JSON array of records".into()))?;
        let mut refs = Vec::with_capacity(items.len());
        for item in items {
            let record = record_from_json(item)?;
            let id = record.id;
            system.registry().register_record(record);
            system.registry().get_loaded(system, id).await?;
            refs.push(Value::Ref(id));
        }
        Ok(refs)
    }
}

// ---- ActionResult ----

/// `{status?, result?, records?}`: the result of a mutating action
/// bundled with the records it touched; the caller's registry absorbs the
/// records on decode.
pub struct ActionResultEncoder;

#[async_trait]
impl MessageEncoder for ActionResultEncoder {
    fn encode(&self, system: &Arc<System>, values: &[Value]) -> Result<String> {
        let value = single(values, "ActionResult")?;
        let cat = value
            .as_catalog()
            .ok_or_else(|| CoreError::Decode("action result must be a catalog".into()))?;

        let mut out = serde_json::Map::new();
        if let Some(status) = cat.get("status") {
            out.insert("status".into(), plain_to_json(status));
        }
        if let Some(result) = cat.get("result") {
            out.insert("result".into(), jsonx::to_json(result));
        }
        if let Some(records) = cat.get("records").and_then(|v| v.as_list()) {
            let items: Result<Vec<serde_json::Value>> = records
                .iter()
                .map(|v| record_to_json(system, v))
                .collect();
            out.insert("records".into(), serde_json::Value::Array(items?));
        }
        Ok(serde_json::Value::Object(out).to_string())
    }

    async fn decode(&self, system: &Arc<System>, text: &str) -> Result<Vec<Value>> {
        let raw: serde_json::Value = serde_json::from_str(text)?;
        let mut cat = Catalog::new();
        if let Some(status) = raw.get("status") {
            cat.push("status", jsonx::from_json(status)?);
        }
        if let Some(result) = raw.get("result") {
            cat.push("result", jsonx::from_json(result)?);
        }
        if let Some(records) = raw.get("records").and_then(|v| v.as_array()) {
            let mut refs = Vec::with_capacity(records.len());
            for item in records {
                let record = record_from_json(item)?;
                let id = record.id;
                system.registry().register_record(record);
                refs.push(Value::Ref(id));
            }
            cat.push("records", Value::List(refs));
        }
        Ok(vec![Value::Catalog(cat)])
    }
}

