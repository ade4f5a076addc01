use serde::{Deserialize, Serialize};

use crate::{Catalog, CatalogError, ObjectId};

/// The unit of storage: an id paired with its catalog of own data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub id: ObjectId,
    pub data: Catalog,
}

impl Record {
    pub fn new(id: impl Into<ObjectId>, data: Catalog) -> Self {
        Record {
            id: id.into(),
            data,
        }
    }

    /// Serialize the data catalog into its JSONx string form.
    pub fn encode_data(&self) -> String {
        crate::jsonx::catalog_to_json(&self.data).to_string()
    }

    /// Rebuild a record from an id and a serialized catalog.
    pub fn decode(id: ObjectId, data: &str) -> Result<Self, CatalogError> {
        let raw: serde_json::Value =
            serde_json::from_str(data).map_err(|e| CatalogError::Decode(e.to_string()))?;
        Ok(Record {
            id,
            data: crate::jsonx::catalog_from_json(&raw)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Value;

    #[test]
    fn encode_decode_round_trip() {
        let rec = Record::new(
            17,
            Catalog::new()
                .with("name", "thing")
                .with("owner", Value::Ref(ObjectId(3))),
        );
        let text = rec.encode_data();
        let back = Record::decode(ObjectId(17), &text).unwrap();
        assert_eq!(back, rec);
    }

    #[test]
    fn garbage_is_a_decode_error() {
        assert!(Record::decode(ObjectId(1), "not json").is_err());
    }
}
