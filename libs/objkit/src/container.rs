//! Containers: web objects that map URL segments to members.
//!
//! Three concrete forms plus a filesystem mount:
//! `Directory` (static name→object entries, with `*blank` entries that are
//! transparent in URLs), `ObjectSpace` (every object by id),
//! `CategorySpace` (`SPACE:ID` segments bound to categories), and
//! `LocalFolder`, which serves raw files through a *tail function* instead
//! of resolving to an object.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use catalog::ObjectId;
use futures::future::BoxFuture;
use futures::FutureExt;

use crate::behavior::{Behavior, BehaviorEntry};
use crate::dispatch::{WebRequest, WebResponse};
use crate::error::{CoreError, Result};
use crate::object::WebObject;
use crate::schema::{FIELD_ENTRIES, FIELD_SPACES};
use crate::system::System;

/// A handler that finalizes the response inline, bypassing endpoint
/// dispatch (filesystem mounts).
pub type TailHandler =
    Box<dyn FnOnce(WebRequest) -> BoxFuture<'static, Result<WebResponse>> + Send>;

/// Outcome of resolving a path inside a container.
pub enum Resolution {
    Object(Arc<WebObject>),
    Tail(TailHandler),
    None,
}

/// The container facet of a behavior.
#[async_trait]
pub trait ContainerFacet: Send + Sync {
    /// Consume as much of `path` as this container understands. `path`
    /// carries no leading slash; an empty path resolves to the container
    /// itself (handled by [`resolve_path`]).
    async fn resolve(
        &self,
        obj: &Arc<WebObject>,
        system: &Arc<System>,
        path: &str,
    ) -> Result<Resolution>;

    /// Segment naming `member` inside this container, unique within it;
    /// a leading `*` marks a blank segment. `None` when the member does
    /// not belong here.
    fn identify(&self, obj: &Arc<WebObject>, member: &Arc<WebObject>) -> Option<String>;
}

/// Resolve `path` starting at `obj`: empty path is the object itself,
/// otherwise the object must be a container.
pub fn resolve_path<'a>(
    obj: &'a Arc<WebObject>,
    system: &'a Arc<System>,
    path: &'a str,
) -> BoxFuture<'a, Result<Resolution>> {
    async move {
        if path.is_empty() {
            return Ok(Resolution::Object(obj.clone()));
        }
        match obj.behavior()?.container() {
            Some(facet) => facet.resolve(obj, system, path).await,
            None => Ok(Resolution::None),
        }
    }
    .boxed()
}

fn split_segment(path: &str) -> (&str, &str) {
    match path.split_once('/') {
        Some((head, rest)) => (head, rest),
        None => (path, ""),
    }
}

// ---- Directory ----

struct DirectoryFacet;

#[async_trait]
impl ContainerFacet for DirectoryFacet {
    async fn resolve(
        &self,
        obj: &Arc<WebObject>,
        system: &Arc<System>,
        path: &str,
    ) -> Result<Resolution> {
        let (segment, rest) = split_segment(path);
        let entries = match obj.get(FIELD_ENTRIES) {
            Some(catalog::Value::Catalog(entries)) => entries,
            _ => return Ok(Resolution::None),
        };

        // Exact segment first.
        if let Some(id) = entries.get(segment).and_then(|v| v.as_ref_id()) {
            let member = system.registry().get_loaded(system, id).await?;
            return resolve_path(&member, system, rest).await;
        }

        // Blank entries are invisible in URLs: descend into each with the
        // whole path until one resolves.
        for entry in entries.iter().filter(|e| e.key.starts_with('*')) {
            let Some(id) = entry.value.as_ref_id() else {
                continue;
            };
            let member = system.registry().get_loaded(system, id).await?;
            match resolve_path(&member, system, path).await? {
                Resolution::None => continue,
                hit => return Ok(hit),
            }
        }
        Ok(Resolution::None)
    }

    fn identify(&self, obj: &Arc<WebObject>, member: &Arc<WebObject>) -> Option<String> {
        let member_id = member.id()?;
        let entries = obj.get(FIELD_ENTRIES)?;
        let entries = entries.as_catalog()?;
        let result = entries
            .iter()
            .find(|e| e.value.as_ref_id() == Some(member_id))
            .map(|e| e.key.clone());
        result
    }
}

pub struct DirectoryBehavior {
    facet: DirectoryFacet,
}

#[async_trait]
impl Behavior for DirectoryBehavior {
    fn class_path(&self) -> &'static str {
        "/sys/directory"
    }

    fn container(&self) -> Option<&dyn ContainerFacet> {
        Some(&self.facet)
    }
}

inventory::submit! {
    BehaviorEntry {
        path: "/sys/directory",
        construct: || Arc::new(DirectoryBehavior { facet: DirectoryFacet }),
    }
}

// ---- ObjectSpace ----

struct ObjectSpaceFacet;

#[async_trait]
impl ContainerFacet for ObjectSpaceFacet {
    async fn resolve(
        &self,
        _obj: &Arc<WebObject>,
        system: &Arc<System>,
        path: &str,
    ) -> Result<Resolution> {
        let (segment, rest) = split_segment(path);
        let Ok(id) = segment.parse::<ObjectId>() else {
            return Ok(Resolution::None);
        };
        if !id.is_persistent() {
            return Ok(Resolution::None);
        }
        let member = system.registry().get_loaded(system, id).await?;
        resolve_path(&member, system, rest).await
    }

    fn identify(&self, _obj: &Arc<WebObject>, member: &Arc<WebObject>) -> Option<String> {
        member.id().map(|id| id.to_string())
    }
}

pub struct ObjectSpaceBehavior {
    facet: ObjectSpaceFacet,
}

#[async_trait]
impl Behavior for ObjectSpaceBehavior {
    fn class_path(&self) -> &'static str {
        "/sys/object_space"
    }

    fn container(&self) -> Option<&dyn ContainerFacet> {
        Some(&self.facet)
    }
}

inventory::submit! {
    BehaviorEntry {
        path: "/sys/object_space",
        construct: || Arc::new(ObjectSpaceBehavior { facet: ObjectSpaceFacet }),
    }
}

// ---- CategorySpace ----

struct CategorySpaceFacet;

#[async_trait]
impl ContainerFacet for CategorySpaceFacet {
    async fn resolve(
        &self,
        obj: &Arc<WebObject>,
        system: &Arc<System>,
        path: &str,
    ) -> Result<Resolution> {
        let (segment, rest) = split_segment(path);
        let Some((space, raw_id)) = segment.split_once(':') else {
            return Ok(Resolution::None);
        };
        let spaces = match obj.get(FIELD_SPACES) {
            Some(catalog::Value::Catalog(spaces)) => spaces,
            _ => return Ok(Resolution::None),
        };
        let Some(category) = spaces.get(space).and_then(|v| v.as_ref_id()) else {
            return Ok(Resolution::None);
        };
        let Ok(id) = raw_id.parse::<ObjectId>() else {
            return Ok(Resolution::None);
        };
        let member = system.registry().get_loaded(system, id).await?;
        // The space names a category; members of other categories do not
        // live under it.
        if member.category().and_then(|c| c.id()) != Some(category) {
            return Ok(Resolution::None);
        }
        resolve_path(&member, system, rest).await
    }

    fn identify(&self, obj: &Arc<WebObject>, member: &Arc<WebObject>) -> Option<String> {
        let member_id = member.id()?;
        let category = member.category().and_then(|c| c.id())?;
        let spaces = obj.get(FIELD_SPACES)?;
        let spaces = spaces.as_catalog()?;
        let result = spaces
            .iter()
            .find(|e| e.value.as_ref_id() == Some(category))
            .map(|e| format!("{}:{}", e.key, member_id));
        result
    }
}

pub struct CategorySpaceBehavior {
    facet: CategorySpaceFacet,
}

#[async_trait]
impl Behavior for CategorySpaceBehavior {
    fn class_path(&self) -> &'static str {
        "/sys/category_space"
    }

    fn container(&self) -> Option<&dyn ContainerFacet> {
        Some(&self.facet)
    }
}

inventory::submit! {
    BehaviorEntry {
        path: "/sys/category_space",
        construct: || Arc::new(CategorySpaceBehavior { facet: CategorySpaceFacet }),
    }
}

// ---- LocalFolder ----

struct LocalFolderFacet;

#[async_trait]
impl ContainerFacet for LocalFolderFacet {
    async fn resolve(
        &self,
        obj: &Arc<WebObject>,
        _system: &Arc<System>,
        path: &str,
    ) -> Result<Resolution> {
        let Some(root) = obj.get_str("local_path") else {
            return Ok(Resolution::None);
        };
        let Some(file) = safe_join(Path::new(&root), path) else {
            return Ok(Resolution::None);
        };
        // Finalize inline: the mounted file is the whole response.
        Ok(Resolution::Tail(Box::new(move |_req: WebRequest| {
            async move {
                let bytes = tokio::fs::read(&file).await.map_err(|_| {
                    CoreError::UrlPathNotFound {
                        path: file.to_string_lossy().into_owned(),
                    }
                })?;
                let body = String::from_utf8_lossy(&bytes).into_owned();
                Ok(WebResponse::ok(content_type_of(&file), body))
            }
            .boxed()
        })))
    }

    fn identify(&self, _obj: &Arc<WebObject>, _member: &Arc<WebObject>) -> Option<String> {
        // Files are not web objects; nothing inside is identifiable.
        None
    }
}

pub struct LocalFolderBehavior {
    facet: LocalFolderFacet,
}

#[async_trait]
impl Behavior for LocalFolderBehavior {
    fn class_path(&self) -> &'static str {
        "/sys/local_folder"
    }

    fn container(&self) -> Option<&dyn ContainerFacet> {
        Some(&self.facet)
    }
}

inventory::submit! {
    BehaviorEntry {
        path: "/sys/local_folder",
        construct: || Arc::new(LocalFolderBehavior { facet: LocalFolderFacet }),
    }
}

/// Join a relative URL path onto a mount root, refusing any traversal
/// above it.
fn safe_join(root: &Path, rel: &str) -> Option<PathBuf> {
    let mut out = root.to_path_buf();
    for segment in rel.split('/') {
        match segment {
            "" | "." => continue,
            ".." => return None,
            seg => out.push(seg),
        }
    }
    Some(out)
}

fn content_type_of(path: &Path) -> &'static str {
    match path.extension().and_then(|e| e.to_str()).unwrap_or("") {
        "html" | "htm" => "text/html; charset=utf-8",
        "css" => "text/css",
        "js" | "mjs" => "text/javascript",
        "json" => "application/json",
        "svg" => "image/svg+xml",
        "txt" | "md" => "text/plain; charset=utf-8",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn safe_join_refuses_traversal() {
        let root = Path::new("/srv/site");
        assert_eq!(
            safe_join(root, "a/b.css"),
            Some(PathBuf::from("/srv/site/a/b.css"))
        );
        assert_eq!(
            safe_join(root, "./a//b.css"),
            Some(PathBuf::from("/srv/site/a/b.css"))
        );
        assert!(safe_join(root, "../etc/passwd").is_none());
        assert!(safe_join(root, "a/../../x").is_none());
    }

    #[test]
    fn content_types_by_extension() {
        assert_eq!(
            content_type_of(Path::new("x.html")),
            "text/html; charset=utf-8"
        );
        assert_eq!(content_type_of(Path::new("x.js")), "text/javascript");
        assert_eq!(content_type_of(Path::new("x.bin")), "application/octet-stream");
    }
}
