use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use objkit::CoreError;

/// Render a core error for the wire: browsers get a minimal HTML page,
/// RPC clients get the structured `{name, message, code, args}` body.
pub fn error_response(err: &CoreError, wants_html: bool) -> Response {
    let body = err.to_body();
    let status = StatusCode::from_u16(body.code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

    if wants_html {
        let page = error_page(body.code, &body.name, &body.message);
        let mut resp = (status, page).into_response();
        resp.headers_mut().insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("text/html; charset=utf-8"),
        );
        return resp;
    }

    let text = serde_json::to_string(&body)
        .unwrap_or_else(|_| r#"{"name":"Internal","message":"","code":500}"#.to_string());
    let mut resp = (status, text).into_response();
    resp.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/json"),
    );
    resp
}

fn error_page(code: u16, name: &str, message: &str) -> String {
    format!(
        "<!DOCTYPE html>\n<html><head><meta charset=\"utf-8\"/><title>{code} {name}</title></head>\n\
         <body><h1>{code} {name}</h1><p>{message}</p></body></html>",
        message = escape(message),
    )
}

fn escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

#[cfg(test)]
mod tests {
    use super::*;
    use catalog::ObjectId;

    #[test]
    fn html_and_json_renderings() {
        let err = CoreError::ObjectNotFound { id: ObjectId(3) };

        let html = error_response(&err, true);
        assert_eq!(html.status(), StatusCode::NOT_FOUND);
        let ct = html
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("");
        assert!(ct.starts_with("text/html"));

        let json = error_response(&err, false);
        assert_eq!(json.status(), StatusCode::NOT_FOUND);
        let ct = json
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("");
        assert_eq!(ct, "application/json");
    }
}
