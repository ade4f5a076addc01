//! Catalog — the data model of Schemat records.
//!
//! A *catalog* is an ordered sequence of `(key, value)` entries that allows
//! repeated keys and nests freely. It is the unit of serialization for web
//! objects: every record in the store is `(id, catalog)`. Values are tagged
//! variants (primitive | object reference | list | catalog) and serialize to
//! a JSON form that preserves entry order and encodes references as
//! `{"@id": N}` tokens.

pub mod edit;
pub mod id;
pub mod jsonx;
pub mod record;
pub mod value;

mod catalog;

pub use catalog::{Catalog, Entry, Path, Step};
pub use edit::Edit;
pub use id::ObjectId;
pub use record::Record;
pub use value::Value;

/// Errors raised by catalog navigation and edit application.
#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("no entry at path {0:?}")]
    PathNotFound(Path),

    #[error("value at path {0:?} is not a catalog")]
    NotACatalog(Path),

    #[error("position {pos} out of range (len {len})")]
    PositionOutOfRange { pos: usize, len: usize },

    #[error("empty path where an entry address was required")]
    EmptyPath,

    #[error("malformed serialized catalog: {0}")]
    Decode(String),
}
