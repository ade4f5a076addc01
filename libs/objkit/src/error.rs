use catalog::{CatalogError, ObjectId};
use serde::{Deserialize, Serialize};
use serde_json::json;

/// Result alias used across the object core.
pub type Result<T> = std::result::Result<T, CoreError>;

/// The error taxonomy of the object core.
///
/// Every variant maps to a default HTTP status; the wire form is
/// [`ErrorBody`] — `{name, message, code, args}` — which the client leg of
/// a service decodes back into the same variant where possible.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    // -- not-found --
    #[error("object [{id}] not found in the store")]
    ObjectNotFound { id: ObjectId },

    #[error("URL path not found: '{path}'")]
    UrlPathNotFound { path: String },

    #[error("endpoint '{endpoint}' not found on object [{id}]")]
    EndpointNotFound { endpoint: String, id: ObjectId },

    #[error("module not found: '{path}'")]
    ModuleNotFound { path: String },

    // -- validation --
    #[error("unknown field '{key}' and custom fields are not allowed")]
    UnknownField { key: String },

    #[error("field '{key}' is single-valued but holds {count} values")]
    RepeatedValue { key: String, count: usize },

    #[error("field '{key}' failed validation: expected {expected}")]
    InvalidValue { key: String, expected: String },

    #[error("object failed validation: {reason}")]
    InvalidObject { reason: String },

    // -- module loader --
    #[error("circular import: {}", chain.join(" -> "))]
    CircularImport { chain: Vec<String> },

    #[error("path '{path}' escapes the module root")]
    PathEscape { path: String },

    // -- network --
    #[error("request timed out")]
    ServerTimeout,

    #[error("request failed with status {status}: {message}")]
    RequestFailed { status: u16, message: String },

    #[error("network error: {0}")]
    Network(String),

    // -- consistency / internal --
    #[error("store layers disagree about object [{id}]: {detail}")]
    StoreConsistency { id: ObjectId, detail: String },

    #[error("object [{id}] is not loaded")]
    NotLoaded { id: ObjectId },

    #[error("object has no id assigned yet")]
    MissingId,

    #[error("object [{id}] is immutable; mutation requires an edit operation")]
    Immutable { id: ObjectId },

    #[error("store is read-only")]
    ReadOnlyStore,

    #[error("not implemented: {0}")]
    NotImplemented(String),

    #[error("decode error: {0}")]
    Decode(String),

    #[error(transparent)]
    Catalog(#[from] CatalogError),

    #[error("internal error: {0}")]
    Internal(String),
}

impl CoreError {
    /// Stable machine name of the error kind.
    pub fn name(&self) -> &'static str {
        match self {
            CoreError::ObjectNotFound { .. } => "ObjectNotFound",
            CoreError::UrlPathNotFound { .. } => "UrlPathNotFound",
            CoreError::EndpointNotFound { .. } => "EndpointNotFound",
            CoreError::ModuleNotFound { .. } => "ModuleNotFound",
            CoreError::UnknownField { .. } => "UnknownField",
            CoreError::RepeatedValue { .. } => "RepeatedValue",
            CoreError::InvalidValue { .. } => "InvalidValue",
            CoreError::InvalidObject { .. } => "InvalidObject",
            CoreError::CircularImport { .. } => "CircularImport",
            CoreError::PathEscape { .. } => "PathEscape",
            CoreError::ServerTimeout => "ServerTimeout",
            CoreError::RequestFailed { .. } => "RequestFailed",
            CoreError::Network(_) => "Network",
            CoreError::StoreConsistency { .. } => "StoreConsistency",
            CoreError::NotLoaded { .. } => "NotLoaded",
            CoreError::MissingId => "MissingId",
            CoreError::Immutable { .. } => "Immutable",
            CoreError::ReadOnlyStore => "ReadOnlyStore",
            CoreError::NotImplemented(_) => "NotImplemented",
            CoreError::Decode(_) => "Decode",
            CoreError::Catalog(_) => "Catalog",
            CoreError::Internal(_) => "Internal",
        }
    }

    /// Default HTTP status for this error kind.
    pub fn status(&self) -> u16 {
        match self {
            CoreError::ObjectNotFound { .. }
            | CoreError::UrlPathNotFound { .. }
            | CoreError::EndpointNotFound { .. }
            | CoreError::ModuleNotFound { .. } => 404,

            CoreError::UnknownField { .. }
            | CoreError::RepeatedValue { .. }
            | CoreError::InvalidValue { .. }
            | CoreError::InvalidObject { .. }
            | CoreError::Decode(_) => 400,

            CoreError::ServerTimeout => 504,
            CoreError::RequestFailed { status, .. } => *status,

            _ => 500,
        }
    }

    /// Structured arguments carried next to `name` and `message`.
    pub fn args(&self) -> serde_json::Value {
        match self {
            CoreError::ObjectNotFound { id } => json!({ "id": id.0 }),
            CoreError::UrlPathNotFound { path } => json!({ "path": path }),
            CoreError::EndpointNotFound { endpoint, id } => {
                json!({ "endpoint": endpoint, "id": id.0 })
            }
            CoreError::ModuleNotFound { path } => json!({ "path": path }),
            CoreError::UnknownField { key } => json!({ "key": key }),
            CoreError::RepeatedValue { key, count } => json!({ "key": key, "count": count }),
            CoreError::InvalidValue { key, expected } => {
                json!({ "key": key, "expected": expected })
            }
            CoreError::CircularImport { chain } => json!({ "chain": chain }),
            CoreError::PathEscape { path } => json!({ "path": path }),
            CoreError::StoreConsistency { id, detail } => {
                json!({ "id": id.0, "detail": detail })
            }
            CoreError::NotLoaded { id } => json!({ "id": id.0 }),
            CoreError::Immutable { id } => json!({ "id": id.0 }),
            _ => json!({}),
        }
    }

    pub fn to_body(&self) -> ErrorBody {
        ErrorBody {
            name: self.name().to_string(),
            message: self.to_string(),
            code: self.status(),
            args: self.args(),
        }
    }
}

/// Wire form of a core error.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub name: String,
    pub message: String,
    pub code: u16,
    #[serde(default)]
    pub args: serde_json::Value,
}

impl ErrorBody {
    /// Re-raise a decoded error body as a structured exception. Kinds that
    /// carry reconstructible arguments map back onto their variant; the
    /// rest surface as `RequestFailed` with the original message.
    pub fn into_error(self) -> CoreError {
        match self.name.as_str() {
            "ObjectNotFound" => {
                let id = self.args.get("id").and_then(|v| v.as_i64()).unwrap_or(-1);
                CoreError::ObjectNotFound { id: id.into() }
            }
            "UrlPathNotFound" => CoreError::UrlPathNotFound {
                path: self
                    .args
                    .get("path")
                    .and_then(|v| v.as_str())
                    .unwrap_or_default()
                    .to_string(),
            },
            "ServerTimeout" => CoreError::ServerTimeout,
            _ => CoreError::RequestFailed {
                status: self.code,
                message: self.message,
            },
        }
    }
}

impl From<serde_json::Error> for CoreError {
    fn from(e: serde_json::Error) -> Self {
        CoreError::Decode(e.to_string())
    }
}

impl From<std::io::Error> for CoreError {
    fn from(e: std::io::Error) -> Self {
        CoreError::Internal(e.to_string())
    }
}
