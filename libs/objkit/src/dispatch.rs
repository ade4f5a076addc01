//! Request dispatch: `path::endpoint?query` → container resolution →
//! endpoint selection → service handler.

use std::sync::Arc;

use crate::container::{resolve_path, Resolution};
use crate::error::{CoreError, Result};
use crate::schema::FIELD_DEFAULT_ENDPOINTS;
use crate::service::{Endpoint, Protocol, ENDPOINT_SEPARATOR};
use crate::system::System;

/// A protocol-level request, already stripped of transport details.
#[derive(Debug, Clone)]
pub struct WebRequest {
    pub protocol: Protocol,
    /// Decoded URL path, with the leading slash, endpoint part removed.
    pub path: String,
    /// Explicit endpoint name after `::`, if any.
    pub endpoint: Option<String>,
    pub query: Vec<(String, String)>,
    pub body: String,
}

impl WebRequest {
    /// Split `target` of the form `/path/to/object::endpoint`.
    pub fn parse(
        protocol: Protocol,
        target: &str,
        query: Vec<(String, String)>,
        body: String,
    ) -> WebRequest {
        let (path, endpoint) = match target.split_once(ENDPOINT_SEPARATOR) {
            Some((path, endpoint)) if !endpoint.is_empty() => {
                (path.to_string(), Some(endpoint.to_string()))
            }
            Some((path, _)) => (path.to_string(), None),
            None => (target.to_string(), None),
        };
        let path = urlencoding::decode(&path)
            .map(|p| p.into_owned())
            .unwrap_or(path);
        WebRequest {
            protocol,
            path,
            endpoint,
            query,
            body,
        }
    }

    pub fn get(target: &str) -> WebRequest {
        WebRequest::parse(Protocol::Get, target, Vec::new(), String::new())
    }

    pub fn post(target: &str, body: impl Into<String>) -> WebRequest {
        WebRequest::parse(Protocol::Post, target, Vec::new(), body.into())
    }

    pub fn local(target: &str) -> WebRequest {
        WebRequest::parse(Protocol::Local, target, Vec::new(), String::new())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct WebResponse {
    pub status: u16,
    pub content_type: String,
    pub body: String,
}

impl WebResponse {
    pub fn new(status: u16, content_type: impl Into<String>, body: impl Into<String>) -> Self {
        WebResponse {
            status,
            content_type: content_type.into(),
            body: body.into(),
        }
    }

    pub fn ok(content_type: impl Into<String>, body: impl Into<String>) -> Self {
        WebResponse::new(200, content_type, body)
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Built-in endpoint fallbacks per protocol, used when neither the request
/// nor the category names one.
fn builtin_candidates(protocol: Protocol) -> &'static [&'static str] {
    match protocol {
        Protocol::Get => &["view", "admin", "inspect"],
        Protocol::Local => &["self"],
        Protocol::Post => &[],
    }
}

/// Resolve and serve one request.
pub async fn dispatch(system: &Arc<System>, req: WebRequest) -> Result<WebResponse> {
    let root = system.root_container().await?;
    let path = req.path.trim_start_matches('/').to_string();

    let target = match resolve_path(&root, system, &path).await? {
        Resolution::Object(target) => target,
        Resolution::Tail(finish) => return finish(req).await,
        Resolution::None => {
            return Err(CoreError::UrlPathNotFound {
                path: req.path.clone(),
            })
        }
    };

    // Candidate endpoints: explicit name, else the category's declared
    // defaults for this protocol, else the built-in fallback list.
    let mut candidates: Vec<String> = Vec::new();
    if let Some(name) = &req.endpoint {
        candidates.push(name.clone());
    } else {
        if let Some(declared) = target
            .category()
            .and_then(|cat| cat.get(FIELD_DEFAULT_ENDPOINTS))
            .and_then(|v| v.as_catalog().cloned())
        {
            match declared.get(req.protocol.as_str()) {
                Some(catalog::Value::String(name)) => candidates.push(name.clone()),
                Some(catalog::Value::List(names)) => candidates.extend(
                    names
                        .iter()
                        .filter_map(|v| v.as_str().map(String::from)),
                ),
                _ => {}
            }
        }
        if candidates.is_empty() {
            candidates.extend(builtin_candidates(req.protocol).iter().map(|s| s.to_string()));
        }
    }

    let api = system.api_for(&target)?;
    for name in &candidates {
        let endpoint = Endpoint::new(req.protocol, name.clone());
        if let Some(service) = api.find(&endpoint) {
            tracing::debug!(
                path = %req.path,
                endpoint = %endpoint.label(),
                id = target.id().unwrap_or_default().0,
                "dispatch"
            );
            return Ok(service.handle(target, system.clone(), req).await);
        }
    }

    Err(CoreError::EndpointNotFound {
        endpoint: candidates.join(","),
        id: target.require_id()?,
    })
}

/// Intra-process call of a `LOCAL` endpoint by URL path; returns the raw
/// response body on success.
pub async fn local_call(system: &Arc<System>, path: &str, endpoint: &str) -> Result<String> {
    let req = WebRequest::parse(
        Protocol::Local,
        &format!("{path}{ENDPOINT_SEPARATOR}{endpoint}"),
        Vec::new(),
        String::new(),
    );
    let response = dispatch(system, req).await?;
    if response.is_success() {
        Ok(response.body)
    } else {
        Err(CoreError::RequestFailed {
            status: response.status,
            message: response.body.chars().take(200).collect(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn target_parsing_splits_path_and_endpoint() {
        let req = WebRequest::get("/a/b::json");
        assert_eq!(req.path, "/a/b");
        assert_eq!(req.endpoint.as_deref(), Some("json"));

        let req = WebRequest::get("/a/b");
        assert_eq!(req.path, "/a/b");
        assert!(req.endpoint.is_none());

        // Trailing separator without a name means no explicit endpoint.
        let req = WebRequest::get("/a/b::");
        assert!(req.endpoint.is_none());
    }

    #[test]
    fn percent_encoded_paths_are_decoded() {
        let req = WebRequest::get("/docs/hello%20world::view");
        assert_eq!(req.path, "/docs/hello world");
    }

    #[test]
    fn builtin_fallbacks_per_protocol() {
        assert_eq!(builtin_candidates(Protocol::Get), &["view", "admin", "inspect"]);
        assert_eq!(builtin_candidates(Protocol::Local), &["self"]);
        assert!(builtin_candidates(Protocol::Post).is_empty());
    }
}
