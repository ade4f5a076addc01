//! Web objects: the runtime projection of records.
//!
//! An object starts as a *stub* (id only), transitions through *loading*
//! into *loaded* (data, category, prototypes, behavior, schema resolved),
//! and may later be evicted by the registry. A *newborn* is a mutable
//! in-memory object without an id; it bypasses the registry entirely and
//! becomes persistent through `System::insert`.
//!
//! Concurrency: the load slot collapses concurrent `load()` callers into a
//! single store read; a failed load clears the slot so the next attempt can
//! proceed. The URL is computed at most once per load, lazily, so that
//! cyclic object↔container graphs cannot deadlock the loader.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, OnceLock};

use catalog::{Catalog, ObjectId, Record, Value};
use dashmap::DashMap;
use futures::future::BoxFuture;
use futures::FutureExt;
use parking_lot::{Mutex, RwLock};

use crate::behavior::Behavior;
use crate::error::{CoreError, Result};
use crate::schema::{
    merge_catalogs, Schema, FIELD_CATEGORY, FIELD_CLASS, FIELD_CONTAINER, FIELD_DEFAULTS,
    FIELD_EXTENDS, FIELD_STATUS, FIELD_TTL, PLURAL_SUFFIX,
};
use crate::system::System;

/// Fully resolved state of a loaded object.
pub(crate) struct Core {
    pub data: Catalog,
    pub category: Option<Arc<WebObject>>,
    pub prototypes: Vec<Arc<WebObject>>,
    /// C3-linearized ancestors, nearest first, self excluded.
    pub ancestry: Vec<Arc<WebObject>>,
    pub schema: Arc<Schema>,
    pub behavior: Arc<dyn Behavior>,
    pub ttl: i64,
}

enum LoadState {
    Virgin,
    Loading(tokio::sync::watch::Receiver<()>),
    Ready(Arc<Core>),
}

/// Access path and derived URL of an object. The path keeps explicit blank
/// segments (`/*name`); the URL is the de-blanked form.
#[derive(Debug, Clone, PartialEq)]
pub struct UrlInfo {
    pub path: String,
    pub url: String,
}

pub struct WebObject {
    id: OnceLock<ObjectId>,
    mutable: bool,
    provisional: OnceLock<ObjectId>,
    /// Record provided externally (wire, seed); consumed by the next load.
    seed: Mutex<Option<Record>>,
    state: Mutex<LoadState>,
    url_cell: tokio::sync::OnceCell<UrlInfo>,
    /// Memoized plural property resolutions; present key = resolved,
    /// empty vector = resolved to undefined.
    props: DashMap<String, Vec<Value>>,
    child_schema_cell: OnceLock<Arc<Schema>>,
    /// Registry residency deadline, epoch millis.
    expiry: AtomicI64,
    /// Own data of a mutable (newborn) object.
    draft: RwLock<Catalog>,
    draft_category: Option<Arc<WebObject>>,
}

impl WebObject {
    /// Immutable stub: id known, nothing loaded.
    pub fn stub(id: ObjectId) -> Arc<WebObject> {
        let obj = Arc::new(Self::blank(false, None));
        obj.id.set(id).ok();
        obj
    }

    /// Stub pre-seeded with a record, so the next load skips the store.
    pub fn stub_with_record(record: Record) -> Arc<WebObject> {
        let obj = Self::stub(record.id);
        *obj.seed.lock() = Some(record);
        obj
    }

    /// Mutable newborn under a provisional (negative) id.
    pub fn newborn(provisional: ObjectId, category: Option<Arc<WebObject>>) -> Arc<WebObject> {
        let obj = Arc::new(Self::blank(true, category));
        obj.provisional.set(provisional).ok();
        obj
    }

    fn blank(mutable: bool, draft_category: Option<Arc<WebObject>>) -> WebObject {
        WebObject {
            id: OnceLock::new(),
            mutable,
            provisional: OnceLock::new(),
            seed: Mutex::new(None),
            state: Mutex::new(LoadState::Virgin),
            url_cell: tokio::sync::OnceCell::new(),
            props: DashMap::new(),
            child_schema_cell: OnceLock::new(),
            expiry: AtomicI64::new(i64::MAX),
            draft: RwLock::new(Catalog::new()),
            draft_category,
        }
    }

    // ---- identity ----

    pub fn id(&self) -> Option<ObjectId> {
        self.id.get().copied()
    }

    pub fn require_id(&self) -> Result<ObjectId> {
        self.id().ok_or(CoreError::MissingId)
    }

    /// Write-once id assignment; re-assigning the same value is a no-op,
    /// a different value is an error.
    pub fn assign_id(&self, id: ObjectId) -> Result<()> {
        match self.id.set(id) {
            Ok(()) => Ok(()),
            Err(_) if self.id() == Some(id) => Ok(()),
            Err(_) => Err(CoreError::Internal(format!(
                "id {} already assigned, cannot change to {id}",
                self.id().unwrap_or_default()
            ))),
        }
    }

    pub fn provisional_id(&self) -> Option<ObjectId> {
        self.provisional.get().copied()
    }

    pub fn is_mutable(&self) -> bool {
        self.mutable
    }

    pub fn is_loaded(&self) -> bool {
        matches!(&*self.state.lock(), LoadState::Ready(_))
    }

    // ---- loading ----

    pub(crate) fn core(&self) -> Result<Arc<Core>> {
        match &*self.state.lock() {
            LoadState::Ready(core) => Ok(core.clone()),
            _ => Err(CoreError::NotLoaded {
                id: self.id().unwrap_or_default(),
            }),
        }
    }

    fn core_opt(&self) -> Option<Arc<Core>> {
        match &*self.state.lock() {
            LoadState::Ready(core) => Some(core.clone()),
            _ => None,
        }
    }

    /// Full load: data, prototypes, category, behavior, `__init__`, URL.
    pub async fn load(self: &Arc<Self>, system: &Arc<System>) -> Result<()> {
        self.load_with(system, None, true).await
    }

    /// Load with an externally supplied record and optional URL await.
    /// Idempotent and reentrant: concurrent callers share one in-flight
    /// load; a loaded object short-circuits.
    pub async fn load_with(
        self: &Arc<Self>,
        system: &Arc<System>,
        record: Option<Record>,
        await_url: bool,
    ) -> Result<()> {
        if let Some(record) = record {
            if !self.is_loaded() {
                *self.seed.lock() = Some(record);
            }
        }
        self.load_core(system, &[]).await?;
        if await_url {
            self.url_path(system, &[]).await;
        }
        Ok(())
    }

    /// Load the core without touching the URL — the form used for
    /// prototypes and categories, so cycles through containers cannot
    /// block a load.
    pub(crate) fn load_core<'a>(
        self: &'a Arc<Self>,
        system: &'a Arc<System>,
        chain: &'a [ObjectId],
    ) -> BoxFuture<'a, Result<()>> {
        enum Turn {
            Done,
            Wait(tokio::sync::watch::Receiver<()>),
            Perform(tokio::sync::watch::Sender<()>),
        }

        async move {
            loop {
                let turn = {
                    let mut state = self.state.lock();
                    match &*state {
                        LoadState::Ready(_) => Turn::Done,
                        LoadState::Loading(rx) => Turn::Wait(rx.clone()),
                        LoadState::Virgin => {
                            let (tx, rx) = tokio::sync::watch::channel(());
                            *state = LoadState::Loading(rx);
                            Turn::Perform(tx)
                        }
                    }
                };
                match turn {
                    Turn::Done => return Ok(()),
                    Turn::Wait(mut waiter) => {
                        // Another caller owns the in-flight load; wait for
                        // it to finish (sender drop wakes us), re-check.
                        let _ = waiter.changed().await;
                    }
                    Turn::Perform(tx) => {
                        let outcome = self.perform_load(system, chain).await;
                        {
                            let mut state = self.state.lock();
                            match &outcome {
                                Ok(core) => *state = LoadState::Ready(core.clone()),
                                Err(_) => *state = LoadState::Virgin,
                            }
                        }
                        drop(tx);
                        return outcome.map(|_| ());
                    }
                }
            }
        }
        .boxed()
    }

    async fn perform_load(
        self: &Arc<Self>,
        system: &Arc<System>,
        chain: &[ObjectId],
    ) -> Result<Arc<Core>> {
        let id = self.require_id()?;
        if chain.contains(&id) {
            return Err(CoreError::Internal(format!(
                "circular inheritance through object [{id}]"
            )));
        }
        let mut chain2 = chain.to_vec();
        chain2.push(id);

        let seeded = self.seed.lock().take();
        let record = match seeded {
            Some(record) => record,
            None => {
                let text = system.store().select(id).await?;
                Record::decode(id, &text)?
            }
        };
        let data = record.data;

        // Prototypes load before the category so the ancestry is complete
        // when `__init__` runs.
        let mut prototypes = Vec::new();
        let proto_ids: Vec<ObjectId> = data
            .get_all(FIELD_EXTENDS)
            .filter_map(|v| v.as_ref_id())
            .collect();
        for pid in proto_ids {
            let proto = system.registry().stub_for(pid);
            proto.load_core(system, &chain2).await?;
            prototypes.push(proto);
        }
        let ancestry = linearize(id, &prototypes)?;

        let category = match data.get(FIELD_CATEGORY).and_then(|v| v.as_ref_id()) {
            Some(cid) => {
                let cat = system.registry().stub_for(cid);
                cat.load_core(system, &chain2).await?;
                Some(cat)
            }
            None => None,
        };

        // The effective schema comes from the category; the root category
        // describes itself, with its own fields merged over the built-in
        // default field catalog inside `Schema::from_category_data`.
        let schema = match &category {
            Some(cat) => cat.child_schema()?,
            None if id == ObjectId::ROOT_CATEGORY => {
                Arc::new(Schema::from_category_data(&data)?)
            }
            None => Arc::new(Schema::generic()),
        };

        let class = match &category {
            Some(cat) => cat.get_str(FIELD_CLASS),
            None => data.get(FIELD_CLASS).and_then(|v| v.as_str().map(String::from)),
        };
        let behavior = system.behavior(class.as_deref());

        let ttl = data
            .get(FIELD_TTL)
            .and_then(|v| v.as_int())
            .or_else(|| schema.defaults.get(FIELD_TTL).and_then(|v| v.as_int()))
            .unwrap_or_else(|| system.default_ttl());

        let core = Arc::new(Core {
            data,
            category,
            prototypes,
            ancestry,
            schema,
            behavior: behavior.clone(),
            ttl,
        });

        // Install the core provisionally so the `__init__` hook can read
        // properties of its own object; the caller rolls the state back on
        // failure, which also clears the data.
        *self.state.lock() = LoadState::Ready(core.clone());
        if let Err(e) = behavior.init(self, system).await {
            self.props.clear();
            return Err(e);
        }
        Ok(core)
    }

    // ---- data access ----

    /// The object's own record (id + own data).
    pub fn record(&self) -> Result<Record> {
        let id = self.require_id()?;
        Ok(Record::new(id, self.own_data()?))
    }

    /// Clone of the own data catalog.
    pub fn own_data(&self) -> Result<Catalog> {
        if self.mutable {
            return Ok(self.draft.read().clone());
        }
        Ok(self.core()?.data.clone())
    }

    pub fn category(&self) -> Option<Arc<WebObject>> {
        if self.mutable {
            return self.draft_category.clone();
        }
        self.core_opt().and_then(|c| c.category.clone())
    }

    pub fn prototypes(&self) -> Vec<Arc<WebObject>> {
        self.core_opt().map(|c| c.prototypes.clone()).unwrap_or_default()
    }

    pub fn behavior(&self) -> Result<Arc<dyn Behavior>> {
        Ok(self.core()?.behavior.clone())
    }

    pub fn ttl(&self) -> i64 {
        self.core_opt().map(|c| c.ttl).unwrap_or(0)
    }

    pub fn status(&self) -> Option<String> {
        self.get_str(FIELD_STATUS)
    }

    /// The schema this object applies to its members (categories only in
    /// practice, but any object can be asked).
    pub fn child_schema(&self) -> Result<Arc<Schema>> {
        if let Some(schema) = self.child_schema_cell.get() {
            return Ok(schema.clone());
        }
        let schema = Arc::new(Schema::from_category_data(&self.core()?.data)?);
        Ok(self
            .child_schema_cell
            .get_or_init(|| schema)
            .clone())
    }

    // ---- property resolution ----

    /// Read a property. A trailing `$` requests the plural form and yields
    /// `Value::List` of all values; otherwise the first value is returned.
    pub fn get(&self, key: &str) -> Option<Value> {
        if let Some(base) = key.strip_suffix(PLURAL_SUFFIX) {
            return Some(Value::List(self.get_all(base)));
        }
        self.resolve(key).into_iter().next()
    }

    /// All values of a property, after inheritance/default combination.
    pub fn get_all(&self, key: &str) -> Vec<Value> {
        self.resolve(key)
    }

    pub fn get_str(&self, key: &str) -> Option<String> {
        self.get(key).and_then(|v| v.as_str().map(String::from))
    }

    pub fn get_int(&self, key: &str) -> Option<i64> {
        self.get(key).and_then(|v| v.as_int())
    }

    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.get(key).and_then(|v| v.as_bool())
    }

    pub fn get_ref(&self, key: &str) -> Option<ObjectId> {
        self.get(key).and_then(|v| v.as_ref_id())
    }

    fn resolve(&self, key: &str) -> Vec<Value> {
        if self.mutable {
            return self.resolve_draft(key);
        }
        if let Some(cached) = self.props.get(key) {
            return cached.clone();
        }
        let Some(core) = self.core_opt() else {
            return Vec::new();
        };

        let ty = core.schema.effective_field(key);
        let mut values: Vec<Value> = Vec::new();

        // Fast path: atomic own value shadows everything.
        if !ty.repeated && !ty.mergeable {
            if let Some(own) = core.data.get(key) {
                let count = core.data.get_all(key).count();
                if count > 1 {
                    tracing::warn!(
                        key,
                        count,
                        id = self.id().unwrap_or_default().0,
                        "single-valued property holds multiple values; using the first"
                    );
                }
                values.push(own.clone());
            }
        }

        if values.is_empty() {
            // Ancestor stream: self first, then the C3 linearization, then
            // the category defaults.
            let ancestors: Vec<Arc<Core>> = if ty.inherit {
                std::iter::once(core.clone())
                    .chain(core.ancestry.iter().filter_map(|a| a.core_opt()))
                    .collect()
            } else {
                vec![core.clone()]
            };

            let mut stream: Vec<Value> = ancestors
                .iter()
                .flat_map(|a| a.data.get_all(key))
                .cloned()
                .collect();
            if key != FIELD_DEFAULTS {
                stream.extend(core.schema.defaults.get_all(key).cloned());
            }

            values = combine(&ty, stream);
        }

        if values.is_empty() {
            if let Some(imputed) = ty.impute_for(self) {
                values.push(imputed);
            } else if let Some(default) = &ty.default {
                values.push(default.clone());
            }
        }

        self.props.insert(key.to_string(), values.clone());
        values
    }

    fn resolve_draft(&self, key: &str) -> Vec<Value> {
        let draft = self.draft.read();
        let mut values: Vec<Value> = draft.get_all(key).cloned().collect();
        if values.is_empty() {
            if let Some(cat) = &self.draft_category {
                if let Ok(schema) = cat.child_schema() {
                    values.extend(schema.defaults.get_all(key).cloned());
                }
            }
        }
        values
    }

    // ---- newborn mutation ----

    /// Replace all values of `key` in the draft. Only valid on mutable
    /// objects.
    pub fn set(&self, key: &str, value: impl Into<Value>) -> Result<()> {
        if !self.mutable {
            return Err(CoreError::Immutable {
                id: self.id().unwrap_or_default(),
            });
        }
        self.draft.write().set(key, value);
        Ok(())
    }

    /// Append one more value under `key` in the draft.
    pub fn append(&self, key: &str, value: impl Into<Value>) -> Result<()> {
        if !self.mutable {
            return Err(CoreError::Immutable {
                id: self.id().unwrap_or_default(),
            });
        }
        self.draft.write().push(key, value);
        Ok(())
    }

    /// Validate own data against the category's child schema and run the
    /// `__validate__` hook of the behavior.
    pub fn validate(&self, system: &Arc<System>) -> Result<()> {
        let data = self.own_data()?;
        let schema = match self.category() {
            Some(cat) => cat.child_schema()?,
            None => Arc::new(Schema::generic()),
        };
        schema.validate_data(&data)?;
        let class = self
            .category()
            .and_then(|cat| cat.get_str(FIELD_CLASS));
        system.behavior(class.as_deref()).validate(self)?;
        Ok(())
    }

    // ---- registry bookkeeping ----

    pub fn expiry(&self) -> i64 {
        self.expiry.load(Ordering::Relaxed)
    }

    pub fn set_expiry(&self, at: i64) {
        self.expiry.store(at, Ordering::Relaxed);
    }

    // ---- URL ----

    /// Access path and URL; computed once per load, lazily.
    pub async fn url_info(self: &Arc<Self>, system: &Arc<System>) -> UrlInfo {
        self.url_path(system, &[]).await
    }

    pub async fn url(self: &Arc<Self>, system: &Arc<System>) -> String {
        self.url_info(system).await.url
    }

    pub async fn access_path(self: &Arc<Self>, system: &Arc<System>) -> String {
        self.url_info(system).await.path
    }

    /// Cached at the top level only: recursive ancestor computations pass a
    /// non-empty chain and bypass the cell, so two objects computing each
    /// other's URL cannot deadlock on it.
    pub(crate) fn url_path<'a>(
        self: &'a Arc<Self>,
        system: &'a Arc<System>,
        chain: &'a [ObjectId],
    ) -> BoxFuture<'a, UrlInfo> {
        async move {
            if chain.is_empty() {
                return self
                    .url_cell
                    .get_or_init(|| self.compute_url(system, chain))
                    .await
                    .clone();
            }
            if let Some(cached) = self.url_cell.get() {
                return cached.clone();
            }
            self.compute_url(system, chain).await
        }
        .boxed()
    }

    async fn compute_url(self: &Arc<Self>, system: &Arc<System>, chain: &[ObjectId]) -> UrlInfo {
        let Some(id) = self.id() else {
            return UrlInfo {
                path: String::new(),
                url: String::new(),
            };
        };
        let default = |path_note: &str| {
            if !path_note.is_empty() {
                tracing::warn!(id = id.0, note = path_note, "falling back to the default URL");
            }
            let url = format!("{}/{}", system.default_path(), id);
            UrlInfo {
                path: url.clone(),
                url,
            }
        };

        if system.is_root_container(id) {
            return UrlInfo {
                path: String::new(),
                url: "/".to_string(),
            };
        }
        if chain.contains(&id) {
            return default("container chain forms a cycle");
        }

        let Some(cid) = self.get_ref(FIELD_CONTAINER) else {
            return default("");
        };
        let container = match system.registry().get_loaded(system, cid).await {
            Ok(container) => container,
            Err(_) => return default("container is missing"),
        };
        let Some(ident) = container.identify_member(self) else {
            return default("not identifiable within its container");
        };

        let mut chain2 = chain.to_vec();
        chain2.push(id);
        let parent = container.url_path(system, &chain2).await;

        let path = format!("{}/{}", parent.path, ident);
        let url = strip_blanks(&path);
        // A URL already claimed by an ancestor (e.g. a terminal blank
        // segment) collides; the object keeps its access path but takes
        // the default URL.
        if url.is_empty() || url == parent.url {
            let fallback = default("URL collides with an ancestor container");
            return UrlInfo {
                path,
                url: fallback.url,
            };
        }
        UrlInfo { path, url }
    }

    /// Ask this object's container facet to name `member`.
    pub fn identify_member(self: &Arc<Self>, member: &Arc<WebObject>) -> Option<String> {
        let core = self.core_opt()?;
        core.behavior.container()?.identify(self, member)
    }
}

impl PartialEq for WebObject {
    /// Two instances of the same persisted object are equivalent.
    fn eq(&self, other: &Self) -> bool {
        match (self.id(), other.id()) {
            (Some(a), Some(b)) => a == b,
            _ => std::ptr::eq(self, other),
        }
    }
}

impl std::fmt::Debug for WebObject {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebObject")
            .field("id", &self.id())
            .field("loaded", &self.is_loaded())
            .field("mutable", &self.mutable)
            .finish()
    }
}

/// Remove `/*blank` segments from an access path.
pub fn strip_blanks(path: &str) -> String {
    let kept: Vec<&str> = path
        .split('/')
        .filter(|seg| !seg.is_empty() && !seg.starts_with('*'))
        .collect();
    if kept.is_empty() {
        String::new()
    } else {
        format!("/{}", kept.join("/"))
    }
}

/// Combine an ordered value stream according to the field type: repeated
/// keys concatenate, mergeable catalogs deep-merge, atomic types take the
/// first value.
fn combine(ty: &crate::schema::FieldType, stream: Vec<Value>) -> Vec<Value> {
    if stream.is_empty() {
        return stream;
    }
    if ty.repeated {
        return stream;
    }
    if ty.mergeable {
        let layers: Vec<&Catalog> = stream.iter().filter_map(|v| v.as_catalog()).collect();
        if !layers.is_empty() {
            return vec![Value::Catalog(merge_catalogs(&layers))];
        }
    }
    stream.into_iter().take(1).collect()
}

/// C3 linearization of the prototype graph, by id. Falls back to an
/// order-preserving dedup when the hierarchy is C3-inconsistent.
fn linearize(id: ObjectId, prototypes: &[Arc<WebObject>]) -> Result<Vec<Arc<WebObject>>> {
    let mut sequences: Vec<Vec<Arc<WebObject>>> = Vec::new();
    for proto in prototypes {
        let mut seq = vec![proto.clone()];
        seq.extend(proto.core()?.ancestry.iter().cloned());
        sequences.push(seq);
    }
    sequences.push(prototypes.to_vec());

    match c3_merge(&mut sequences) {
        Some(merged) => Ok(merged),
        None => {
            tracing::warn!(
                id = id.0,
                "prototype hierarchy is not C3-consistent; using first-seen order"
            );
            let mut seen = Vec::new();
            let mut merged = Vec::new();
            for proto in prototypes {
                let mut seq = vec![proto.clone()];
                seq.extend(proto.core()?.ancestry.iter().cloned());
                for obj in seq {
                    let oid = obj.id();
                    if !seen.contains(&oid) {
                        seen.push(oid);
                        merged.push(obj);
                    }
                }
            }
            Ok(merged)
        }
    }
}

fn c3_merge(sequences: &mut Vec<Vec<Arc<WebObject>>>) -> Option<Vec<Arc<WebObject>>> {
    let mut merged = Vec::new();
    loop {
        sequences.retain(|seq| !seq.is_empty());
        if sequences.is_empty() {
            return Some(merged);
        }
        // A head is good when it appears in no other sequence's tail.
        let candidate = sequences.iter().find_map(|seq| {
            let head = &seq[0];
            let blocked = sequences
                .iter()
                .any(|other| other[1..].iter().any(|o| o.id() == head.id()));
            (!blocked).then(|| head.clone())
        })?;
        for seq in sequences.iter_mut() {
            seq.retain(|o| o.id() != candidate.id());
        }
        merged.push(candidate);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn id_is_write_once() {
        let obj = WebObject::stub(ObjectId(5));
        assert_eq!(obj.id(), Some(ObjectId(5)));
        assert!(obj.assign_id(ObjectId(5)).is_ok());
        assert!(obj.assign_id(ObjectId(6)).is_err());
        assert_eq!(obj.id(), Some(ObjectId(5)));
    }

    #[test]
    fn same_id_objects_are_equivalent() {
        let a = WebObject::stub(ObjectId(3));
        let b = WebObject::stub(ObjectId(3));
        let c = WebObject::stub(ObjectId(4));
        assert_eq!(*a, *b);
        assert_ne!(*a, *c);
    }

    #[test]
    fn newborn_draft_reads_and_writes() {
        let obj = WebObject::newborn(ObjectId(-1), None);
        assert!(obj.is_mutable());
        obj.set("name", "draft").unwrap();
        obj.append("tag", "a").unwrap();
        obj.append("tag", "b").unwrap();
        assert_eq!(obj.get_str("name").as_deref(), Some("draft"));
        assert_eq!(obj.get_all("tag").len(), 2);
    }

    #[test]
    fn immutable_object_rejects_draft_writes() {
        let obj = WebObject::stub(ObjectId(1));
        assert!(matches!(
            obj.set("x", 1i64).unwrap_err(),
            CoreError::Immutable { .. }
        ));
    }

    #[test]
    fn blank_segments_disappear_from_urls() {
        assert_eq!(strip_blanks("/*sys/users/42"), "/users/42");
        assert_eq!(strip_blanks("/a/*b/c"), "/a/c");
        assert_eq!(strip_blanks("/*only"), "");
        assert_eq!(strip_blanks(""), "");
    }
}
