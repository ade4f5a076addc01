//! # ObjKit — the Schemat object core
//!
//! Every entity of a Schemat site — category, page, route, source file — is
//! a **web object**: the runtime projection of an `(id, catalog)` record
//! kept in a layered store. This crate implements the whole object core:
//!
//! - **store** — the record API (`select`/`insert`/`update`/`delete`/`scan`)
//!   with memory and YAML-file layers composed into a layered store;
//! - **registry** — the process-wide cache of loaded objects with TTL
//!   eviction and single-flight loading;
//! - **object** / **schema** — object lifecycle, property resolution with
//!   prototype inheritance and schema defaults/imputation, validation;
//! - **behavior** — native classes bound to categories, discovered through
//!   `inventory`;
//! - **container** — URL routing through directories, id spaces and
//!   category spaces, with access-path/URL duality;
//! - **service** — endpoint-bound services with isomorphic client/server
//!   invocation and pluggable message encoders;
//! - **dispatch** — `path::endpoint` request resolution;
//! - **loader** — module loading by local or SUN path with circular-import
//!   detection;
//! - **system** — the explicit process context handle and boot sequence.

pub mod behavior;
pub mod container;
pub mod dispatch;
pub mod error;
pub mod loader;
pub mod object;
pub mod registry;
pub mod schema;
pub mod service;
pub mod store;
pub mod system;

pub use behavior::{Api, Behavior, BehaviorEntry};
pub use catalog::{Catalog, Edit, Entry, ObjectId, Record, Value};
pub use container::{ContainerFacet, Resolution};
pub use dispatch::{dispatch, WebRequest, WebResponse};
pub use error::{CoreError, ErrorBody, Result};
pub use loader::{Module, ModuleLoader};
pub use object::WebObject;
pub use registry::ObjectRegistry;
pub use schema::{FieldType, Schema};
pub use service::{Endpoint, MessageEncoder, Protocol, RpcService, Service, Transport};
pub use store::{FileLayer, LayeredStore, MemoryLayer, RecordStore, StoreLayer};
pub use system::{kernel, Role, System, SystemBuilder};
