//! Ingress router behavior, exercised without sockets via tower oneshot.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use objkit::{kernel, Catalog, System, SystemBuilder};
use tower::ServiceExt;
use web_ingress::{build_router, WebServerConfig};

async fn boot() -> Arc<System> {
    SystemBuilder::new(kernel::demo_store())
        .with_site(kernel::SITE)
        .boot()
        .await
        .unwrap()
}

async fn body_string(response: axum::response::Response) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), 1024 * 1024)
        .await
        .unwrap();
    String::from_utf8_lossy(&bytes).into_owned()
}

#[tokio::test]
async fn get_json_serves_the_record() {
    let system = boot().await;
    let id = system
        .insert_data(Catalog::new().with("name", "served"))
        .await
        .unwrap()
        .id;

    let router = build_router(system, WebServerConfig::default());
    let response = router
        .oneshot(
            Request::get(format!("/$/{id}::json"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let raw: serde_json::Value = serde_json::from_str(&body_string(response).await).unwrap();
    assert_eq!(raw["id"].as_i64(), Some(id.0));
    assert_eq!(raw["data"]["name"].as_str(), Some("served"));
}

#[tokio::test]
async fn unknown_path_renders_html_for_browsers_and_json_for_rpc() {
    let system = boot().await;
    let router = build_router(system, WebServerConfig::default());

    let browser = router
        .clone()
        .oneshot(
            Request::get("/no/such/path")
                .header(header::ACCEPT, "text/html,application/xhtml+xml")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(browser.status(), StatusCode::NOT_FOUND);
    let page = body_string(browser).await;
    assert!(page.contains("<h1>404 UrlPathNotFound</h1>"));

    let rpc = router
        .oneshot(Request::get("/no/such/path").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(rpc.status(), StatusCode::NOT_FOUND);
    let raw: serde_json::Value = serde_json::from_str(&body_string(rpc).await).unwrap();
    assert_eq!(raw["name"].as_str(), Some("UrlPathNotFound"));
    assert_eq!(raw["code"].as_u64(), Some(404));
}

#[tokio::test]
async fn request_ids_are_assigned_and_propagated() {
    let system = boot().await;
    let router = build_router(system, WebServerConfig::default());

    // A client-supplied id is echoed back.
    let response = router
        .clone()
        .oneshot(
            Request::get("/$/0::json")
                .header("x-request-id", "req-abc")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(
        response
            .headers()
            .get("x-request-id")
            .and_then(|v| v.to_str().ok()),
        Some("req-abc")
    );

    // Absent one, the ingress mints an id.
    let response = router
        .oneshot(Request::get("/$/0::json").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert!(response.headers().get("x-request-id").is_some());
}

#[tokio::test]
async fn post_submit_edits_round_trips_through_http() {
    let system = boot().await;
    let id = system
        .insert_data(Catalog::new().with("x", 1i64))
        .await
        .unwrap()
        .id;

    let body = serde_json::json!([
        {"op": "update", "path": ["x"], "value": 5}
    ])
    .to_string();

    let router = build_router(system.clone(), WebServerConfig::default());
    let response = router
        .oneshot(
            Request::post(format!("/$/{id}::submit_edits"))
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let raw: serde_json::Value = serde_json::from_str(&body_string(response).await).unwrap();
    assert_eq!(raw["data"]["x"].as_i64(), Some(5));
}

#[tokio::test]
async fn unsupported_methods_are_rejected() {
    let system = boot().await;
    let router = build_router(system, WebServerConfig::default());
    let response = router
        .oneshot(
            Request::builder()
                .method("PUT")
                .uri("/$/0::json")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
}
