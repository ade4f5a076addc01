//! Web ingress: the HTTP adapter binding request dispatch to axum.
//!
//! Every `GET`/`POST` falls through one handler that converts the HTTP
//! request into a protocol-level [`WebRequest`], runs it through the
//! object core's dispatch, and renders the outcome — an encoded service
//! response, a tail-function payload, or an error page/body. Middleware:
//! request-id make/propagate, trace layer, request body limit. The
//! configured deadline surfaces as the 504 `ServerTimeout` mapping.

pub mod error;
pub mod request_id;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::extract::{Request, State};
use axum::http::{header, HeaderValue, Method, StatusCode};
use axum::middleware::from_fn;
use axum::response::Response;
use axum::Router;
use objkit::dispatch::{dispatch, WebRequest};
use objkit::service::Protocol;
use objkit::{CoreError, System};
use tokio_util::sync::CancellationToken;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::request_id::{PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;

use crate::error::error_response;

const MAX_BODY_BYTES: usize = 8 * 1024 * 1024;

#[derive(Clone)]
pub struct WebServerConfig {
    /// Per-request deadline; expiry maps to 504.
    pub timeout: Duration,
    /// Registry purge cadence.
    pub purge_interval: Duration,
}

impl Default for WebServerConfig {
    fn default() -> Self {
        WebServerConfig {
            timeout: Duration::from_secs(30),
            purge_interval: Duration::from_secs(60),
        }
    }
}

#[derive(Clone)]
struct AppState {
    system: Arc<System>,
    config: WebServerConfig,
}

/// The ingress router: middlewares plus the catch-all dispatch handler.
pub fn build_router(system: Arc<System>, config: WebServerConfig) -> Router {
    let state = AppState { system, config };
    Router::new()
        .fallback(handle)
        .layer(from_fn(request_id::push_req_id_to_extensions))
        .layer(PropagateRequestIdLayer::new(request_id::header()))
        .layer(SetRequestIdLayer::new(
            request_id::header(),
            request_id::MakeReqId,
        ))
        .layer(TraceLayer::new_for_http())
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
        .with_state(state)
}

/// Serve until the token cancels; runs the periodic registry purge in the
/// background.
pub async fn serve(
    system: Arc<System>,
    addr: SocketAddr,
    config: WebServerConfig,
    cancel: CancellationToken,
) -> anyhow::Result<()> {
    let router = build_router(system.clone(), config.clone());

    let purge_cancel = cancel.clone();
    let purge_system = system.clone();
    tokio::spawn(async move {
        let mut tick = tokio::time::interval(config.purge_interval);
        tick.tick().await; // the immediate first tick
        loop {
            tokio::select! {
                _ = purge_cancel.cancelled() => break,
                _ = tick.tick() => {
                    if let Err(e) = purge_system.purge().await {
                        tracing::warn!(error = %e, "registry purge failed");
                    }
                }
            }
        }
    });

    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "web ingress listening");
    axum::serve(listener, router)
        .with_graceful_shutdown(async move { cancel.cancelled().await })
        .await?;
    Ok(())
}

async fn handle(State(state): State<AppState>, request: Request) -> Response {
    let wants_html = request
        .headers()
        .get(header::ACCEPT)
        .and_then(|v| v.to_str().ok())
        .map(|accept| accept.contains("text/html"))
        .unwrap_or(false);

    let method = request.method();
    let protocol = if method == Method::GET || method == Method::HEAD {
        Protocol::Get
    } else if method == Method::POST {
        Protocol::Post
    } else {
        return error_response(
            &CoreError::NotImplemented("only GET and POST are served".into()),
            wants_html,
        );
    };

    let uri = request.uri().clone();
    let query: Vec<(String, String)> = uri
        .query()
        .map(|q| {
            url::form_urlencoded::parse(q.as_bytes())
                .map(|(k, v)| (k.into_owned(), v.into_owned()))
                .collect()
        })
        .unwrap_or_default();

    let body = match axum::body::to_bytes(request.into_body(), MAX_BODY_BYTES).await {
        Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
        Err(e) => return error_response(&CoreError::Decode(e.to_string()), wants_html),
    };

    let wreq = WebRequest::parse(protocol, uri.path(), query, body);
    let outcome = tokio::time::timeout(state.config.timeout, dispatch(&state.system, wreq)).await;

    match outcome {
        Err(_elapsed) => error_response(&CoreError::ServerTimeout, wants_html),
        Ok(Err(err)) => {
            tracing::debug!(path = uri.path(), error = %err, "dispatch failed");
            error_response(&err, wants_html)
        }
        Ok(Ok(response)) => {
            let status =
                StatusCode::from_u16(response.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
            let content_type = HeaderValue::from_str(&response.content_type)
                .unwrap_or_else(|_| HeaderValue::from_static("application/octet-stream"));
            let mut resp = Response::new(Body::from(response.body));
            *resp.status_mut() = status;
            resp.headers_mut().insert(header::CONTENT_TYPE, content_type);
            resp
        }
    }
}
