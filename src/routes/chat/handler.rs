use axum::{
    Extension,
    body::Body,
    extract::{Json, State},
    http::header,
    response::{IntoResponse, Response},
};
use futures_util::TryStreamExt;
use serde::Deserialize;

use crate::{
    AppState,
    error::{AppError, AppResult},
    infrastructure::chat::ChatMessage,
    middleware::CurrentUser,
    utils::success_to_api_response,
};

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub messages: Vec<ChatMessage>,
    pub model: Option<String>,
    #[serde(default)]
    pub stream: bool,
}

#[axum::debug_handler]
pub async fn chat(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Json(req): Json<ChatRequest>,
) -> AppResult<Response> {
    let client = state.chat.as_ref().ok_or(AppError::NotConfigured("AI 对话"))?;
    tracing::debug!(
        "Chat request from {} with {} messages (stream={})",
        current.email,
        req.messages.len(),
        req.stream
    );

    if !req.stream {
        let reply = client.complete(&req.messages, req.model.as_deref()).await?;
        return Ok(success_to_api_response(reply).into_response());
    }

    // SSE 原样透传
    let upstream = client.stream(&req.messages, req.model.as_deref()).await?;
    let stream = upstream.bytes_stream().map_err(|e| {
        tracing::warn!("Chat stream interrupted: {}", e);
        e
    });

    Ok((
        [
            (header::CONTENT_TYPE, "text/event-stream"),
            (header::CACHE_CONTROL, "no-cache"),
        ],
        Body::from_stream(stream),
    )
        .into_response())
}
