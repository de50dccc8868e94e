use std::sync::Arc;

use axum::{
    body::{Body, to_bytes},
    extract::State,
    http::Request,
    middleware::Next,
    response::Response,
};
use serde_json::json;
use tracing::error;

use crate::error::ErrorDetail;
use crate::event_log::{EventLevel, EventLog};

/// 记录所有 5xx 响应，并写入事件日志
pub async fn log_errors(
    State(events): State<Arc<EventLog>>,
    req: Request<Body>,
    next: Next,
) -> Response {
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let response = next.run(req).await;

    if !response.status().is_server_error() {
        return response;
    }

    let status = response.status();
    let known = response.extensions().get::<ErrorDetail>().cloned();
    let (response, detail) = match known {
        Some(detail) => (response, detail.0),
        None => {
            let (mut parts, body) = response.into_parts();
            let bytes = match to_bytes(body, 1024).await {
                Ok(b) => b,
                Err(e) => {
                    error!("Failed to read error response body: {}", e);
                    return Response::from_parts(parts, Body::empty());
                }
            };
            let detail = String::from_utf8_lossy(&bytes).to_string();
            // 重置body以便重新构建响应
            parts.headers.remove(axum::http::header::CONTENT_LENGTH);
            (Response::from_parts(parts, Body::from(bytes)), detail)
        }
    };

    error!(
        "Server error occurred - {} {} Status: {}, Detail: {}",
        method, path, status, detail
    );
    events
        .record(
            EventLevel::Error,
            "server_error",
            json!({
                "method": method.as_str(),
                "path": path,
                "status": status.as_u16(),
                "detail": detail,
            }),
        )
        .await;

    response
}
