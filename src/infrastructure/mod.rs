// 第三方服务客户端
// 邮件、OAuth、AI 对话、语音合成与图床，全部共用一个 reqwest::Client

pub mod chat;
pub mod image_host;
pub mod mail;
pub mod oauth;
pub mod speech;

use std::time::Duration;

use crate::error::{AppError, AppResult};

pub fn build_http_client(timeout: Duration) -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(timeout)
        .user_agent(concat!("cloud-image-storage/", env!("CARGO_PKG_VERSION")))
        .build()
        .unwrap_or_else(|e| {
            tracing::warn!("Failed to build HTTP client with timeout: {}", e);
            reqwest::Client::new()
        })
}

/// 非 2xx 响应转换为上游错误，携带状态码与部分响应体
pub(crate) async fn ensure_success(
    service: &str,
    response: reqwest::Response,
) -> AppResult<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(AppError::Upstream(format!(
        "{service} returned status={status}: {}",
        truncate(&body, 500)
    )))
}

pub(crate) fn truncate(s: &str, max_chars: usize) -> &str {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncate_respects_char_boundaries() {
        assert_eq!(truncate("hello", 10), "hello");
        assert_eq!(truncate("hello", 2), "he");
        assert_eq!(truncate("你好世界", 2), "你好");
    }
}
