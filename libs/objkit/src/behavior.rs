//! Native classes bound to categories.
//!
//! A category's `class` field names a code path (`/sys/directory`, ...);
//! the core resolves it to a [`Behavior`] implementation through the
//! process-wide behavior table, which is assembled at boot from
//! `inventory`-submitted entries. A behavior carries the user hooks
//! (`__init__`, `__validate__`, `__teardown__`, `__create__`), the
//! endpoint table of its instances, and an optional container facet.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use catalog::{Catalog, Edit, Value};
use futures::FutureExt;

use crate::container::ContainerFacet;
use crate::error::{CoreError, Result};
use crate::object::WebObject;
use crate::schema::{FIELD_CATEGORY, FIELD_CONTENT};
use crate::service::{
    DataRecordEncoder, Endpoint, HtmlEncoder, Invocation, JsonEncoder, JsonxArrayEncoder,
    JsonxEncoder, QueryStringEncoder, RpcService, Service,
};
use crate::system::System;

/// Endpoint table of a class: `PROTOCOL.name` → service. Assembled lazily
/// per class and cached by the system.
#[derive(Default, Clone)]
pub struct Api {
    entries: Vec<(Endpoint, Arc<dyn Service>)>,
}

impl Api {
    pub fn new() -> Api {
        Api::default()
    }

    /// Bind a service under a `"PROTOCOL.name"` label. Rebinding an
    /// existing endpoint replaces it, so subclasses can override built-ins.
    pub fn bind(mut self, label: &str, service: Arc<dyn Service>) -> Api {
        let endpoint = Endpoint::parse(label)
            .unwrap_or_else(|| panic!("malformed endpoint label '{label}'"));
        self.entries.retain(|(ep, _)| *ep != endpoint);
        self.entries.push((endpoint, service));
        self
    }

    pub fn find(&self, endpoint: &Endpoint) -> Option<Arc<dyn Service>> {
        self.entries
            .iter()
            .find(|(ep, _)| ep == endpoint)
            .map(|(_, svc)| svc.clone())
    }

    pub fn endpoints(&self) -> impl Iterator<Item = &Endpoint> {
        self.entries.iter().map(|(ep, _)| ep)
    }
}

/// Behavior of a class of web objects.
#[async_trait]
pub trait Behavior: Send + Sync + 'static {
    /// The SUN path this class is registered under.
    fn class_path(&self) -> &'static str;

    /// Post-load hook.
    async fn init(&self, _obj: &Arc<WebObject>, _system: &Arc<System>) -> Result<()> {
        Ok(())
    }

    /// Populate a newborn from creation attributes.
    async fn create(
        &self,
        obj: &Arc<WebObject>,
        _system: &Arc<System>,
        attrs: &Catalog,
    ) -> Result<()> {
        for entry in attrs.iter() {
            obj.append(&entry.key, entry.value.clone())?;
        }
        Ok(())
    }

    /// Object-level validation, after the schema checks.
    fn validate(&self, _obj: &WebObject) -> Result<()> {
        Ok(())
    }

    /// Pre-delete hook.
    async fn teardown(&self, _obj: &Arc<WebObject>, _system: &Arc<System>) -> Result<()> {
        Ok(())
    }

    /// Endpoint table for instances of this class.
    fn api(&self) -> Api {
        base_api()
    }

    /// Container facet, when instances of this class map URL segments to
    /// members.
    fn container(&self) -> Option<&dyn ContainerFacet> {
        None
    }
}

/// One class registration, linked in through `inventory`.
pub struct BehaviorEntry {
    pub path: &'static str,
    pub construct: fn() -> Arc<dyn Behavior>,
}

inventory::collect!(BehaviorEntry);

/// Behavior table built once at boot from all linked registrations.
pub(crate) struct BehaviorTable {
    map: HashMap<&'static str, Arc<dyn Behavior>>,
    default: Arc<dyn Behavior>,
}

impl BehaviorTable {
    pub fn discover() -> BehaviorTable {
        let mut map: HashMap<&'static str, Arc<dyn Behavior>> = HashMap::new();
        for entry in inventory::iter::<BehaviorEntry> {
            let behavior = (entry.construct)();
            if map.insert(entry.path, behavior).is_some() {
                panic!("behavior '{}' is registered twice", entry.path);
            }
        }
        tracing::debug!(classes = map.len(), "behavior table assembled");
        BehaviorTable {
            map,
            default: Arc::new(ItemBehavior),
        }
    }

    /// Resolve a class path; unknown or absent paths fall back to the
    /// default Item class.
    pub fn resolve(&self, class: Option<&str>) -> Arc<dyn Behavior> {
        match class {
            Some(path) => match self.map.get(path) {
                Some(behavior) => behavior.clone(),
                None => {
                    tracing::warn!(class = path, "unknown class; using the default Item class");
                    self.default.clone()
                }
            },
            None => self.default.clone(),
        }
    }
}

/// The default class of plain web objects.
pub struct ItemBehavior;

#[async_trait]
impl Behavior for ItemBehavior {
    fn class_path(&self) -> &'static str {
        "/sys/item"
    }
}

inventory::submit! {
    BehaviorEntry { path: "/sys/item", construct: || Arc::new(ItemBehavior) }
}

/// The class of categories, root category included. `POST.insert` on a
/// category creates a member: the category reference is stamped onto the
/// submitted data.
pub struct CategoryBehavior;

#[async_trait]
impl Behavior for CategoryBehavior {
    fn class_path(&self) -> &'static str {
        "/sys/category"
    }

    fn api(&self) -> Api {
        base_api().bind(
            "POST.insert",
            RpcService::new(
                Arc::new(JsonxEncoder),
                Arc::new(DataRecordEncoder),
                Arc::new(|inv: Invocation| {
                    async move {
                        let mut data = match inv.args.into_iter().next() {
                            Some(Value::Catalog(cat)) => cat,
                            _ => Catalog::new(),
                        };
                        let id = inv.target.require_id()?;
                        if data.get(FIELD_CATEGORY).is_none() {
                            data.push(FIELD_CATEGORY, Value::Ref(id));
                        }
                        let record = inv.system.insert_data(data).await?;
                        Ok(crate::service::encoders::record_to_value(&record))
                    }
                    .boxed()
                }),
            ),
        )
    }
}

inventory::submit! {
    BehaviorEntry { path: "/sys/category", construct: || Arc::new(CategoryBehavior) }
}

/// The class of the site object.
pub struct SiteBehavior;

#[async_trait]
impl Behavior for SiteBehavior {
    fn class_path(&self) -> &'static str {
        "/sys/site"
    }
}

inventory::submit! {
    BehaviorEntry { path: "/sys/site", construct: || Arc::new(SiteBehavior) }
}

/// Built-in endpoints every object answers.
pub fn base_api() -> Api {
    Api::new()
        .bind(
            "GET.json",
            RpcService::new(
                Arc::new(QueryStringEncoder),
                Arc::new(DataRecordEncoder),
                Arc::new(|inv: Invocation| {
                    async move {
                        let record = inv.target.record()?;
                        Ok(crate::service::encoders::record_to_value(&record))
                    }
                    .boxed()
                }),
            ),
        )
        .bind(
            "GET.inspect",
            RpcService::new(
                Arc::new(QueryStringEncoder),
                Arc::new(HtmlEncoder),
                Arc::new(|inv: Invocation| {
                    async move { Ok(Value::String(inspect_page(&inv.target)?)) }.boxed()
                }),
            ),
        )
        .bind(
            "LOCAL.text",
            RpcService::new(
                Arc::new(QueryStringEncoder),
                Arc::new(crate::service::StringEncoder),
                Arc::new(|inv: Invocation| {
                    async move {
                        inv.target
                            .get_str(FIELD_CONTENT)
                            .map(Value::String)
                            .ok_or_else(|| {
                                CoreError::NotImplemented(
                                    "object has no text representation".into(),
                                )
                            })
                    }
                    .boxed()
                }),
            ),
        )
        .bind(
            "LOCAL.self",
            RpcService::new(
                Arc::new(QueryStringEncoder),
                Arc::new(JsonxEncoder),
                Arc::new(|inv: Invocation| {
                    async move { Ok(Value::Ref(inv.target.require_id()?)) }.boxed()
                }),
            ),
        )
        .bind(
            "POST.submit_edits",
            RpcService::new(
                Arc::new(JsonxArrayEncoder),
                Arc::new(DataRecordEncoder),
                Arc::new(|inv: Invocation| {
                    async move {
                        let edits: Result<Vec<Edit>> = inv
                            .args
                            .iter()
                            .map(|arg| {
                                serde_json::from_value(catalog::jsonx::to_json(arg))
                                    .map_err(|e| CoreError::Decode(format!("bad edit: {e}")))
                            })
                            .collect();
                        let record = inv
                            .system
                            .submit_edits(inv.target.require_id()?, &edits?)
                            .await?;
                        Ok(crate::service::encoders::record_to_value(&record))
                    }
                    .boxed()
                }),
            ),
        )
        .bind(
            "POST.delete_object",
            RpcService::new(
                Arc::new(JsonxArrayEncoder),
                Arc::new(JsonEncoder),
                Arc::new(|inv: Invocation| {
                    async move {
                        let existed = inv.system.delete_object(&inv.target).await?;
                        Ok(Value::Bool(existed))
                    }
                    .boxed()
                }),
            ),
        )
        .bind(
            "POST.insert",
            RpcService::new(
                Arc::new(JsonxEncoder),
                Arc::new(DataRecordEncoder),
                Arc::new(|inv: Invocation| {
                    async move {
                        let data = match inv.args.into_iter().next() {
                            Some(Value::Catalog(cat)) => cat,
                            _ => Catalog::new(),
                        };
                        let record = inv.system.insert_data(data).await?;
                        Ok(crate::service::encoders::record_to_value(&record))
                    }
                    .boxed()
                }),
            ),
        )
}

/// Minimal admin HTML of an object.
fn inspect_page(obj: &Arc<WebObject>) -> Result<String> {
    let record = obj.record()?;
    let title = obj
        .get_str("name")
        .unwrap_or_else(|| format!("object {}", record.id));
    let category = obj
        .category()
        .and_then(|cat| cat.get_str("name"))
        .unwrap_or_else(|| "—".to_string());
    let data = serde_json::to_string_pretty(&catalog::jsonx::catalog_to_json(&record.data))
        .unwrap_or_default();
    Ok(format!(
        "<!DOCTYPE html>\n<html><head><meta charset=\"utf-8\"/><title>{title}</title></head>\n\
         <body><h1>{title} <small>[{id}]</small></h1>\n\
         <p>category: {category}</p>\n\
         <pre>{data}</pre></body></html>",
        id = record.id,
        data = html_escape(&data),
    ))
}

fn html_escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}
