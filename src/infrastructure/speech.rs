use axum::body::Bytes;
use serde::Serialize;

use crate::config::Config;
use crate::error::{AppError, AppResult};
use crate::infrastructure::ensure_success;

pub const MAX_TTS_CHARS: usize = 4096;
const ALLOWED_VOICES: [&str; 6] = ["alloy", "echo", "fable", "onyx", "nova", "shimmer"];
const DEFAULT_VOICE: &str = "alloy";

#[derive(Debug, Serialize)]
struct SpeechRequest<'a> {
    model: &'a str,
    input: &'a str,
    voice: &'a str,
    response_format: &'a str,
}

/// OpenAI 兼容的语音合成接口
#[derive(Clone)]
pub struct SpeechClient {
    http: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
    model: String,
}

impl SpeechClient {
    pub fn from_config(http: reqwest::Client, config: &Config) -> Option<Self> {
        Some(Self {
            http,
            endpoint: speech_endpoint(config.tts_api_url.as_deref()?),
            api_key: config.tts_api_key.clone().or_else(|| config.chat_api_key.clone()),
            model: config.tts_model.clone(),
        })
    }

    /// 返回 mp3 音频
    pub async fn synthesize(&self, text: &str, voice: Option<&str>) -> AppResult<Bytes> {
        let text = text.trim();
        if text.is_empty() || text.chars().count() > MAX_TTS_CHARS {
            return Err(AppError::Validation(format!(
                "文本长度必须在1到{}个字符之间",
                MAX_TTS_CHARS
            )));
        }
        let voice = resolve_voice(voice)?;

        let mut request = self.http.post(&self.endpoint).json(&SpeechRequest {
            model: &self.model,
            input: text,
            voice,
            response_format: "mp3",
        });
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| AppError::Upstream(format!("tts api request failed: {e}")))?;
        let response = ensure_success("tts api", response).await?;
        Ok(response.bytes().await?)
    }
}

fn speech_endpoint(base: &str) -> String {
    let base = base.trim_end_matches('/');
    if base.ends_with("/audio/speech") {
        base.to_string()
    } else {
        format!("{base}/audio/speech")
    }
}

fn resolve_voice(voice: Option<&str>) -> AppResult<&'static str> {
    match voice.map(str::trim).filter(|v| !v.is_empty()) {
        None => Ok(DEFAULT_VOICE),
        Some(v) => ALLOWED_VOICES
            .iter()
            .copied()
            .find(|allowed| allowed.eq_ignore_ascii_case(v))
            .ok_or_else(|| AppError::Validation(format!("不支持的音色: {v}"))),
    }
}

pub const QR_MIN_SIZE: u32 = 100;
pub const QR_MAX_SIZE: u32 = 1000;
pub const QR_MAX_DATA: usize = 2000;

/// 二维码图片转发
pub async fn fetch_qrcode(
    http: &reqwest::Client,
    api_url: &str,
    data: &str,
    size: Option<u32>,
) -> AppResult<(String, Bytes)> {
    if data.is_empty() || data.chars().count() > QR_MAX_DATA {
        return Err(AppError::Validation(format!(
            "二维码内容长度必须在1到{}个字符之间",
            QR_MAX_DATA
        )));
    }
    let url = qrcode_url(api_url, data, size)?;

    let response = http
        .get(url)
        .send()
        .await
        .map_err(|e| AppError::Upstream(format!("qr api request failed: {e}")))?;
    let response = ensure_success("qr api", response).await?;
    let content_type = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("image/png")
        .to_string();
    Ok((content_type, response.bytes().await?))
}

fn qrcode_url(api_url: &str, data: &str, size: Option<u32>) -> AppResult<reqwest::Url> {
    let size = size.unwrap_or(300).clamp(QR_MIN_SIZE, QR_MAX_SIZE);
    let dimension = format!("{size}x{size}");
    reqwest::Url::parse_with_params(api_url, &[("data", data), ("size", dimension.as_str())])
        .map_err(|e| AppError::Internal(format!("invalid QR_API_URL: {e}")))
}
