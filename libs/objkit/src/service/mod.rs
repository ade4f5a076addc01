//! Endpoint-bound services with isomorphic client/server invocation.
//!
//! An endpoint is `PROTOCOL.name` (`GET`, `POST`, or `LOCAL` for
//! intra-process calls). A [`RpcService`] carries three message encoders
//! (input, output, error) and a server function; `handle` is the server
//! request→response orchestration, `invoke` dispatches to the server
//! function directly on the hosting side and through the HTTP transport
//! elsewhere.

pub mod encoders;

pub use encoders::{
    record_to_value, ActionResultEncoder, DataRecordEncoder, HtmlEncoder, JsonArrayEncoder,
    JsonEncoder, JsonxArrayEncoder, JsonxEncoder, QueryStringEncoder, StringEncoder,
    WebObjectsEncoder,
};

use std::sync::Arc;

use async_trait::async_trait;
use catalog::Value;
use futures::future::BoxFuture;

use crate::dispatch::{WebRequest, WebResponse};
use crate::error::{CoreError, ErrorBody, Result};
use crate::object::WebObject;
use crate::system::System;

/// Endpoint separator in URLs: `/path/to/object::endpoint`.
pub const ENDPOINT_SEPARATOR: &str = "::";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Protocol {
    Get,
    Post,
    Local,
}

impl Protocol {
    pub fn as_str(self) -> &'static str {
        match self {
            Protocol::Get => "GET",
            Protocol::Post => "POST",
            Protocol::Local => "LOCAL",
        }
    }

    pub fn parse(s: &str) -> Option<Protocol> {
        match s {
            "GET" => Some(Protocol::Get),
            "POST" => Some(Protocol::Post),
            "LOCAL" => Some(Protocol::Local),
            _ => None,
        }
    }
}

impl std::fmt::Display for Protocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A named entry point on an object: protocol + endpoint name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Endpoint {
    pub protocol: Protocol,
    pub name: String,
}

impl Endpoint {
    pub fn new(protocol: Protocol, name: impl Into<String>) -> Self {
        Endpoint {
            protocol,
            name: name.into(),
        }
    }

    /// Parse the declaration form `"GET.json"`.
    pub fn parse(label: &str) -> Option<Endpoint> {
        let (proto, name) = label.split_once('.')?;
        Some(Endpoint::new(Protocol::parse(proto)?, name))
    }

    pub fn label(&self) -> String {
        format!("{}.{}", self.protocol, self.name)
    }
}

/// How argument and result messages cross the wire. Default error
/// encoding — shared by all encoders — is the structured
/// `{name, message, code, args}` body.
#[async_trait]
pub trait MessageEncoder: Send + Sync {
    fn content_type(&self) -> &'static str {
        "application/json"
    }

    /// Array encoders spread their payload into multiple arguments.
    fn is_array(&self) -> bool {
        false
    }

    fn encode(&self, system: &Arc<System>, values: &[Value]) -> Result<String>;

    async fn decode(&self, system: &Arc<System>, text: &str) -> Result<Vec<Value>>;

    fn encode_error(&self, err: &CoreError) -> (u16, String) {
        let body = err.to_body();
        let text = serde_json::to_string(&body)
            .unwrap_or_else(|_| r#"{"name":"Internal","message":"","code":500}"#.to_string());
        (body.code, text)
    }

    fn decode_error(&self, text: &str, code: u16) -> CoreError {
        match serde_json::from_str::<ErrorBody>(text) {
            Ok(body) => body.into_error(),
            Err(_) => CoreError::RequestFailed {
                status: code,
                message: text.chars().take(200).collect(),
            },
        }
    }
}

/// The network leg used by the client side of a service. Pluggable so
/// tests can loop a request back into dispatch without sockets.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Issue a request; returns `(status, body)`.
    async fn fetch(
        &self,
        protocol: Protocol,
        url: &str,
        content_type: &'static str,
        body: String,
    ) -> Result<(u16, String)>;
}

/// HTTP transport over reqwest, pointed at the origin serving the site.
pub struct HttpTransport {
    client: reqwest::Client,
    origin: String,
}

impl HttpTransport {
    pub fn new(origin: impl Into<String>) -> Self {
        HttpTransport {
            client: reqwest::Client::new(),
            origin: origin.into(),
        }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn fetch(
        &self,
        protocol: Protocol,
        url: &str,
        content_type: &'static str,
        body: String,
    ) -> Result<(u16, String)> {
        let full = format!("{}{}", self.origin, url);
        let request = match protocol {
            Protocol::Get => {
                let full = if body.is_empty() {
                    full
                } else {
                    format!("{full}?{body}")
                };
                self.client.get(full)
            }
            Protocol::Post => self
                .client
                .post(full)
                .header(reqwest::header::CONTENT_TYPE, content_type)
                .body(body),
            Protocol::Local => {
                return Err(CoreError::Internal(
                    "LOCAL endpoints never cross the network".into(),
                ))
            }
        };
        let response = request
            .send()
            .await
            .map_err(|e| CoreError::Network(e.to_string()))?;
        let status = response.status().as_u16();
        let text = response
            .text()
            .await
            .map_err(|e| CoreError::Network(e.to_string()))?;
        Ok((status, text))
    }
}

/// What a server function receives.
pub struct Invocation {
    pub target: Arc<WebObject>,
    pub system: Arc<System>,
    pub args: Vec<Value>,
}

pub type ServerFn = Arc<dyn Fn(Invocation) -> BoxFuture<'static, Result<Value>> + Send + Sync>;

/// An endpoint handler: either a full RPC service or a plain function.
#[async_trait]
pub trait Service: Send + Sync {
    /// Server-side request→response orchestration; exceptions come back
    /// encoded with the service's error encoder.
    async fn handle(
        &self,
        target: Arc<WebObject>,
        system: Arc<System>,
        req: WebRequest,
    ) -> WebResponse;

    /// Isomorphic dispatcher: direct call on the hosting side, network
    /// round-trip elsewhere. Array outputs spread into several values.
    async fn invoke(
        &self,
        target: Arc<WebObject>,
        system: Arc<System>,
        endpoint: &Endpoint,
        args: Vec<Value>,
    ) -> Result<Vec<Value>>;
}

pub struct RpcService {
    input: Arc<dyn MessageEncoder>,
    output: Arc<dyn MessageEncoder>,
    error: Arc<dyn MessageEncoder>,
    server: ServerFn,
}

impl RpcService {
    pub fn new(
        input: Arc<dyn MessageEncoder>,
        output: Arc<dyn MessageEncoder>,
        server: ServerFn,
    ) -> Arc<RpcService> {
        Arc::new(RpcService {
            input,
            output: output.clone(),
            error: output,
            server,
        })
    }

    pub fn with_error(
        input: Arc<dyn MessageEncoder>,
        output: Arc<dyn MessageEncoder>,
        error: Arc<dyn MessageEncoder>,
        server: ServerFn,
    ) -> Arc<RpcService> {
        Arc::new(RpcService {
            input,
            output,
            error,
            server,
        })
    }

    fn wire_input(req: &WebRequest) -> String {
        match req.protocol {
            Protocol::Get => req
                .query
                .iter()
                .map(|(k, v)| {
                    format!("{}={}", urlencoding::encode(k), urlencoding::encode(v))
                })
                .collect::<Vec<_>>()
                .join("&"),
            _ => req.body.clone(),
        }
    }
}

#[async_trait]
impl Service for RpcService {
    async fn handle(
        &self,
        target: Arc<WebObject>,
        system: Arc<System>,
        req: WebRequest,
    ) -> WebResponse {
        let wire = Self::wire_input(&req);
        let outcome = async {
            let args = self.input.decode(&system, &wire).await?;
            let value = (self.server)(Invocation {
                target: target.clone(),
                system: system.clone(),
                args,
            })
            .await?;
            let values = if self.output.is_array() {
                match value {
                    Value::List(items) => items,
                    other => vec![other],
                }
            } else {
                vec![value]
            };
            self.output.encode(&system, &values)
        }
        .await;

        match outcome {
            Ok(body) => WebResponse::ok(self.output.content_type(), body),
            Err(err) => {
                tracing::debug!(error = %err, "service handler failed");
                let (status, body) = self.error.encode_error(&err);
                WebResponse::new(status, "application/json", body)
            }
        }
    }

    async fn invoke(
        &self,
        target: Arc<WebObject>,
        system: Arc<System>,
        endpoint: &Endpoint,
        args: Vec<Value>,
    ) -> Result<Vec<Value>> {
        if system.is_server() || endpoint.protocol == Protocol::Local {
            let value = (self.server)(Invocation {
                target,
                system,
                args,
            })
            .await?;
            return Ok(match value {
                Value::List(items) if self.output.is_array() => items,
                other => vec![other],
            });
        }

        // Client leg: encode, cross the transport, decode.
        let body = self.input.encode(&system, &args)?;
        let url = format!(
            "{}{}{}",
            target.url(&system).await,
            ENDPOINT_SEPARATOR,
            endpoint.name
        );
        let (status, text) = system
            .transport()
            .fetch(endpoint.protocol, &url, self.input.content_type(), body)
            .await?;
        if (200..300).contains(&status) {
            self.output.decode(&system, &text).await
        } else {
            Err(self.error.decode_error(&text, status))
        }
    }
}

/// A plain handler function bound directly to an endpoint, for endpoints
/// that produce a finished response (views, admin pages).
pub struct FnService {
    handler: Arc<
        dyn Fn(Arc<WebObject>, Arc<System>, WebRequest) -> BoxFuture<'static, Result<WebResponse>>
            + Send
            + Sync,
    >,
}

impl FnService {
    pub fn new(
        handler: impl Fn(Arc<WebObject>, Arc<System>, WebRequest) -> BoxFuture<'static, Result<WebResponse>>
            + Send
            + Sync
            + 'static,
    ) -> Arc<FnService> {
        Arc::new(FnService {
            handler: Arc::new(handler),
        })
    }
}

#[async_trait]
impl Service for FnService {
    async fn handle(
        &self,
        target: Arc<WebObject>,
        system: Arc<System>,
        req: WebRequest,
    ) -> WebResponse {
        match (self.handler)(target, system, req).await {
            Ok(response) => response,
            Err(err) => {
                let body = err.to_body();
                WebResponse::new(
                    body.code,
                    "application/json",
                    serde_json::to_string(&body).unwrap_or_default(),
                )
            }
        }
    }

    async fn invoke(
        &self,
        _target: Arc<WebObject>,
        _system: Arc<System>,
        endpoint: &Endpoint,
        _args: Vec<Value>,
    ) -> Result<Vec<Value>> {
        Err(CoreError::NotImplemented(format!(
            "plain handler '{}' cannot be invoked as an RPC service",
            endpoint.label()
        )))
    }
}
