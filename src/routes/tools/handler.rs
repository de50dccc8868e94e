use axum::{
    extract::{Json, Query, State},
    http::header,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};

use crate::{
    AppState,
    common::ApiResponse,
    error::{AppError, AppResult},
    infrastructure::speech::fetch_qrcode,
    utils::success_to_api_response,
};

pub const MAX_TRANSLATE_CHARS: usize = 5000;

#[derive(Debug, Deserialize)]
pub struct TranslateRequest {
    pub text: String,
    pub target: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct TranslateResponse {
    pub text: String,
    pub target: String,
}

#[derive(Debug, Deserialize)]
pub struct QrQuery {
    pub data: String,
    pub size: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct TtsRequest {
    pub text: String,
    pub voice: Option<String>,
}

fn validate_translation(req: &TranslateRequest) -> AppResult<(String, String)> {
    let text = req.text.trim();
    if text.is_empty() || text.chars().count() > MAX_TRANSLATE_CHARS {
        return Err(AppError::Validation(format!(
            "文本长度必须在1到{}个字符之间",
            MAX_TRANSLATE_CHARS
        )));
    }
    let target = req
        .target
        .as_deref()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .unwrap_or("简体中文");
    if target.chars().count() > 32 {
        return Err(AppError::Validation("目标语言无效".into()));
    }
    Ok((text.to_string(), target.to_string()))
}

#[axum::debug_handler]
pub async fn translate(
    State(state): State<AppState>,
    Json(req): Json<TranslateRequest>,
) -> AppResult<Json<ApiResponse<TranslateResponse>>> {
    let client = state.chat.as_ref().ok_or(AppError::NotConfigured("翻译"))?;
    let (text, target) = validate_translation(&req)?;
    let translated = client.translate(&text, &target).await?;
    Ok(success_to_api_response(TranslateResponse {
        text: translated,
        target,
    }))
}

#[axum::debug_handler]
pub async fn qrcode(State(state): State<AppState>, Query(query): Query<QrQuery>) -> AppResult<Response> {
    let (content_type, bytes) =
        fetch_qrcode(&state.http, &state.config.qr_api_url, &query.data, query.size).await?;
    Ok(([(header::CONTENT_TYPE, content_type)], bytes).into_response())
}

#[axum::debug_handler]
pub async fn tts(State(state): State<AppState>, Json(req): Json<TtsRequest>) -> AppResult<Response> {
    let client = state.speech.as_ref().ok_or(AppError::NotConfigured("语音合成"))?;
    let audio = client.synthesize(&req.text, req.voice.as_deref()).await?;
    Ok(([(header::CONTENT_TYPE, "audio/mpeg")], audio).into_response())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn translation_defaults_target() {
        let req = TranslateRequest {
            text: "  hello ".into(),
            target: None,
        };
        assert_eq!(
            validate_translation(&req).unwrap(),
            ("hello".to_string(), "简体中文".to_string())
        );
    }

    #[test]
    fn translation_length_is_bounded() {
        let req = TranslateRequest {
            text: "x".repeat(MAX_TRANSLATE_CHARS + 1),
            target: Some("English".into()),
        };
        assert!(validate_translation(&req).is_err());

        let req = TranslateRequest {
            text: "   ".into(),
            target: None,
        };
        assert!(validate_translation(&req).is_err());
    }
}
