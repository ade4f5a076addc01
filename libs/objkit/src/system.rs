//! The process context of the object core.
//!
//! One [`System`] handle owns the store, the registry, the module loader,
//! the behavior table, and the site pointer; it is built once at boot and
//! passed explicitly into everything that needs it — there are no ambient
//! globals. The `kernel` submodule provides the seed records (root
//! category, container categories, site, the `/$` id space) that every
//! store starts from.

use std::path::PathBuf;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use arc_swap::ArcSwapOption;
use catalog::{Catalog, Edit, ObjectId, Record};
use dashmap::DashMap;

use crate::behavior::{Api, Behavior, BehaviorTable};
use crate::error::{CoreError, Result};
use crate::loader::ModuleLoader;
use crate::object::WebObject;
use crate::registry::ObjectRegistry;
use crate::schema::{Schema, FIELD_CATEGORY, FIELD_DEFAULT_PATH, FIELD_ROOT};
use crate::service::{HttpTransport, Transport};
use crate::store::RecordStore;

/// Which side of the wire this process plays. The server side hosts the
/// objects and runs service handlers directly; a client reaches them
/// through the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Server,
    Client,
}

pub struct System {
    store: Arc<dyn RecordStore>,
    registry: ObjectRegistry,
    loader: ModuleLoader,
    behaviors: BehaviorTable,
    apis: DashMap<&'static str, Arc<Api>>,
    site: ArcSwapOption<WebObject>,
    site_id: Option<ObjectId>,
    role: Role,
    transport: Arc<dyn Transport>,
    default_ttl: i64,
    provisional_seq: AtomicI64,
}

pub struct SystemBuilder {
    store: Arc<dyn RecordStore>,
    site_id: Option<ObjectId>,
    code_root: PathBuf,
    role: Role,
    transport: Option<Arc<dyn Transport>>,
    default_ttl: i64,
}

impl SystemBuilder {
    pub fn new(store: Arc<dyn RecordStore>) -> SystemBuilder {
        SystemBuilder {
            store,
            site_id: None,
            code_root: PathBuf::from("."),
            role: Role::Server,
            transport: None,
            default_ttl: 60,
        }
    }

    /// Which object is the site; resolution and URLs hang off its `root`.
    pub fn with_site(mut self, id: ObjectId) -> Self {
        self.site_id = Some(id);
        self
    }

    pub fn with_code_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.code_root = root.into();
        self
    }

    pub fn with_role(mut self, role: Role) -> Self {
        self.role = role;
        self
    }

    pub fn with_transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Registry residency in seconds for objects that do not declare a
    /// `ttl` of their own.
    pub fn with_default_ttl(mut self, seconds: i64) -> Self {
        self.default_ttl = seconds;
        self
    }

    /// Build the handle and run the boot sequence: load the root category,
    /// then the site object.
    pub async fn boot(self) -> Result<Arc<System>> {
        let system = Arc::new(System {
            store: self.store,
            registry: ObjectRegistry::new(),
            loader: ModuleLoader::new(self.code_root),
            behaviors: BehaviorTable::discover(),
            apis: DashMap::new(),
            site: ArcSwapOption::empty(),
            site_id: self.site_id,
            role: self.role,
            transport: self
                .transport
                .unwrap_or_else(|| Arc::new(HttpTransport::new("http://127.0.0.1:8220"))),
            default_ttl: self.default_ttl,
            provisional_seq: AtomicI64::new(-1),
        });

        system
            .registry
            .get_loaded(&system, ObjectId::ROOT_CATEGORY)
            .await?;

        if let Some(site_id) = system.site_id {
            let site = system.registry.get_loaded(&system, site_id).await?;
            system.site.store(Some(site));
            tracing::info!(site = site_id.0, "site loaded");
        }
        Ok(system)
    }
}

impl System {
    pub fn store(&self) -> &Arc<dyn RecordStore> {
        &self.store
    }

    pub fn registry(&self) -> &ObjectRegistry {
        &self.registry
    }

    pub fn loader(&self) -> &ModuleLoader {
        &self.loader
    }

    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    pub fn is_server(&self) -> bool {
        self.role == Role::Server
    }

    pub fn default_ttl(&self) -> i64 {
        self.default_ttl
    }

    /// Resolve a class path to its behavior; unknown classes fall back to
    /// the Item default.
    pub fn behavior(&self, class: Option<&str>) -> Arc<dyn Behavior> {
        self.behaviors.resolve(class)
    }

    /// Endpoint table of the target's class, assembled lazily and cached
    /// per class path.
    pub fn api_for(&self, target: &Arc<WebObject>) -> Result<Arc<Api>> {
        let behavior = target.behavior()?;
        let key = behavior.class_path();
        if let Some(api) = self.apis.get(key) {
            return Ok(api.clone());
        }
        let api = Arc::new(behavior.api());
        Ok(self.apis.entry(key).or_insert(api).clone())
    }

    // ---- site ----

    pub fn site(&self) -> Option<Arc<WebObject>> {
        self.site.load_full()
    }

    /// The site's root container; everything resolves under it.
    pub async fn root_container(self: &Arc<Self>) -> Result<Arc<WebObject>> {
        let site = self
            .site()
            .ok_or_else(|| CoreError::Internal("no site is booted".into()))?;
        let root = site
            .get_ref(FIELD_ROOT)
            .ok_or_else(|| CoreError::Internal("site has no root container".into()))?;
        self.registry.get_loaded(self, root).await
    }

    /// URL prefix of the id-space every object is canonically served
    /// under (`<default_path>/<id>`).
    pub fn default_path(&self) -> String {
        self.site()
            .and_then(|site| site.get_str(FIELD_DEFAULT_PATH))
            .unwrap_or_else(|| "/$".to_string())
    }

    pub fn is_root_container(&self, id: ObjectId) -> bool {
        self.site()
            .and_then(|site| site.get_ref(FIELD_ROOT))
            .map(|root| root == id)
            .unwrap_or(false)
    }

    // ---- object lifecycle ----

    /// A fresh provisional id for a newborn.
    pub fn new_provisional(&self) -> ObjectId {
        ObjectId(self.provisional_seq.fetch_sub(1, Ordering::SeqCst))
    }

    /// Create a newborn of `category` and run its `__create__` hook over
    /// the given attributes.
    pub async fn create(
        self: &Arc<Self>,
        category: Option<Arc<WebObject>>,
        attrs: Catalog,
    ) -> Result<Arc<WebObject>> {
        let newborn = WebObject::newborn(self.new_provisional(), category.clone());
        let class = category
            .as_ref()
            .and_then(|cat| cat.get_str(crate::schema::FIELD_CLASS));
        let behavior = self.behavior(class.as_deref());
        behavior.create(&newborn, self, &attrs).await?;
        if let Some(cat) = &category {
            if newborn.get_ref(FIELD_CATEGORY).is_none() {
                newborn.set(FIELD_CATEGORY, catalog::Value::Ref(cat.require_id()?))?;
            }
        }
        Ok(newborn)
    }

    /// Validate and commit newborns in one batch; cross-references through
    /// provisional ids resolve after the commit. Returns the loaded,
    /// now-persistent instances.
    pub async fn insert(
        self: &Arc<Self>,
        newborns: &[Arc<WebObject>],
    ) -> Result<Vec<Arc<WebObject>>> {
        let mut items = Vec::with_capacity(newborns.len());
        for newborn in newborns {
            newborn.validate(self)?;
            let provisional = newborn
                .provisional_id()
                .unwrap_or_else(|| self.new_provisional());
            items.push((provisional, newborn.own_data()?));
        }

        let records = self.store.insert_many(items).await?;

        let mut loaded = Vec::with_capacity(records.len());
        for (newborn, record) in newborns.iter().zip(&records) {
            newborn.assign_id(record.id)?;
            self.registry.register_record(record.clone());
            loaded.push(self.registry.get_loaded(self, record.id).await?);
        }
        Ok(loaded)
    }

    pub async fn insert_one(self: &Arc<Self>, newborn: Arc<WebObject>) -> Result<Arc<WebObject>> {
        self.insert(&[newborn])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| CoreError::Internal("empty insert batch".into()))
    }

    /// Validate and commit a raw data catalog (the `POST::insert`
    /// endpoint); the record lands in the registry.
    pub async fn insert_data(self: &Arc<Self>, data: Catalog) -> Result<Record> {
        let schema = match data.get(FIELD_CATEGORY).and_then(|v| v.as_ref_id()) {
            Some(cid) => self.registry.get_loaded(self, cid).await?.child_schema()?,
            None => Arc::new(Schema::generic()),
        };
        schema.validate_data(&data)?;
        let record = self.store.insert(data, None).await?;
        self.registry.register_record(record.clone());
        Ok(record)
    }

    /// Apply edits to a stored object under its per-id lock; the registry
    /// picks up the new record.
    pub async fn submit_edits(
        self: &Arc<Self>,
        id: ObjectId,
        edits: &[Edit],
    ) -> Result<Record> {
        let record = self.store.update(id, edits).await?;
        self.registry.register_record(record.clone());
        Ok(record)
    }

    /// Delete a stored object: `__teardown__`, store removal, registry
    /// removal.
    pub async fn delete_object(self: &Arc<Self>, target: &Arc<WebObject>) -> Result<bool> {
        let id = target.require_id()?;
        if target.is_loaded() {
            target.behavior()?.teardown(target, self).await?;
        }
        let existed = self.store.delete(id).await?;
        self.registry.remove(id);
        Ok(existed)
    }

    /// Registry purge; re-ensures the root category afterwards.
    pub async fn purge(self: &Arc<Self>) -> Result<()> {
        self.registry.evict(self).await
    }
}

/// Kernel objects every Schemat store starts from.
pub mod kernel {
    use super::*;
    use crate::schema::{
        FIELD_ALLOW_CUSTOM, FIELD_CLASS, FIELD_CONTAINER, FIELD_DEFAULTS, FIELD_ENTRIES,
        FIELD_NAME, FIELD_SCHEMA, FIELD_SPACES,
    };
    use crate::store::{LayeredStore, MemoryLayer};
    use catalog::Value;

    pub const ROOT_CATEGORY: ObjectId = ObjectId(0);
    pub const SITE_CATEGORY: ObjectId = ObjectId(1);
    pub const DIRECTORY_CATEGORY: ObjectId = ObjectId(2);
    pub const OBJECT_SPACE_CATEGORY: ObjectId = ObjectId(3);
    pub const CATEGORY_SPACE_CATEGORY: ObjectId = ObjectId(4);
    pub const LOCAL_FOLDER_CATEGORY: ObjectId = ObjectId(5);
    pub const SOURCE_FILE_CATEGORY: ObjectId = ObjectId(6);
    pub const SITE: ObjectId = ObjectId(8);
    pub const ROOT_DIRECTORY: ObjectId = ObjectId(9);
    pub const DEFAULT_SPACE: ObjectId = ObjectId(10);

    /// First id handed out to user objects by the standard writable layer.
    pub const USER_ID_START: i64 = 100;

    fn field(kind: &str) -> Value {
        Value::String(kind.to_string())
    }

    fn category(name: &str, class: &str, schema: Catalog) -> Catalog {
        Catalog::new()
            .with(FIELD_CATEGORY, Value::Ref(ROOT_CATEGORY))
            .with(FIELD_NAME, name)
            .with(FIELD_CLASS, class)
            .with(FIELD_SCHEMA, schema)
    }

    /// The seed records: root category, the container categories, the site
    /// with its root directory, and the `/$` id space serving every object
    /// canonically.
    pub fn seed_records() -> Vec<Record> {
        let root_category = Catalog::new()
            .with(FIELD_NAME, "Category")
            .with(FIELD_CLASS, "/sys/category")
            .with(
                FIELD_SCHEMA,
                Catalog::new()
                    .with(FIELD_SCHEMA, field("catalog"))
                    .with(
                        FIELD_DEFAULTS,
                        Catalog::new().with("type", "catalog").with("mergeable", true),
                    )
                    .with(FIELD_CLASS, field("string"))
                    .with(FIELD_ALLOW_CUSTOM, field("boolean")),
            );

        vec![
            Record::new(ROOT_CATEGORY, root_category),
            Record::new(
                SITE_CATEGORY,
                category(
                    "Site",
                    "/sys/site",
                    Catalog::new()
                        .with(FIELD_ROOT, field("ref"))
                        .with(FIELD_DEFAULT_PATH, field("string")),
                ),
            ),
            Record::new(
                DIRECTORY_CATEGORY,
                category(
                    "Directory",
                    "/sys/directory",
                    Catalog::new().with(
                        FIELD_ENTRIES,
                        Catalog::new().with("type", "catalog").with("mergeable", true),
                    ),
                ),
            ),
            Record::new(
                OBJECT_SPACE_CATEGORY,
                category("ObjectSpace", "/sys/object_space", Catalog::new()),
            ),
            Record::new(
                CATEGORY_SPACE_CATEGORY,
                category(
                    "CategorySpace",
                    "/sys/category_space",
                    Catalog::new().with(FIELD_SPACES, field("catalog")),
                ),
            ),
            Record::new(
                LOCAL_FOLDER_CATEGORY,
                category(
                    "LocalFolder",
                    "/sys/local_folder",
                    Catalog::new().with("local_path", field("string")),
                ),
            ),
            Record::new(
                SOURCE_FILE_CATEGORY,
                category(
                    "SourceFile",
                    "/sys/item",
                    Catalog::new().with(crate::schema::FIELD_CONTENT, field("string")),
                ),
            ),
            Record::new(
                SITE,
                Catalog::new()
                    .with(FIELD_CATEGORY, Value::Ref(SITE_CATEGORY))
                    .with(FIELD_NAME, "site")
                    .with(FIELD_ROOT, Value::Ref(ROOT_DIRECTORY))
                    .with(FIELD_DEFAULT_PATH, "/$"),
            ),
            Record::new(
                ROOT_DIRECTORY,
                Catalog::new()
                    .with(FIELD_CATEGORY, Value::Ref(DIRECTORY_CATEGORY))
                    .with(FIELD_NAME, "root")
                    .with(FIELD_ENTRIES, Catalog::new().with("$", Value::Ref(DEFAULT_SPACE))),
            ),
            Record::new(
                DEFAULT_SPACE,
                Catalog::new()
                    .with(FIELD_CATEGORY, Value::Ref(OBJECT_SPACE_CATEGORY))
                    .with(FIELD_NAME, "default space")
                    .with(FIELD_CONTAINER, Value::Ref(ROOT_DIRECTORY)),
            ),
        ]
    }

    /// Standard store for demos and tests: read-only kernel seed under a
    /// writable memory layer allocating user ids from `USER_ID_START`.
    pub fn demo_store() -> Arc<LayeredStore> {
        Arc::new(LayeredStore::new(vec![
            Arc::new(MemoryLayer::new(USER_ID_START, None)),
            Arc::new(MemoryLayer::readonly_with(seed_records())),
        ]))
    }
}
