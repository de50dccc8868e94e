use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::Config;
use crate::error::{AppError, AppResult};
use crate::infrastructure::ensure_success;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: &str, content: impl Into<String>) -> Self {
        Self {
            role: role.to_string(),
            content: content.into(),
        }
    }
}

#[derive(Debug, Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    choices: Vec<CompletionChoice>,
    #[serde(default)]
    usage: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct CompletionChoice {
    message: ChatMessage,
}

#[derive(Debug, Serialize)]
pub struct ChatReply {
    pub reply: String,
    pub model: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<Value>,
}

const ALLOWED_ROLES: [&str; 3] = ["system", "user", "assistant"];

/// OpenAI 兼容的对话接口客户端
#[derive(Clone)]
pub struct ChatClient {
    http: reqwest::Client,
    endpoint: String,
    api_key: String,
    default_model: String,
    max_chars: usize,
}

impl ChatClient {
    pub fn from_config(http: reqwest::Client, config: &Config) -> Option<Self> {
        Some(Self {
            http,
            endpoint: completions_endpoint(config.chat_api_url.as_deref()?),
            api_key: config.chat_api_key.clone()?,
            default_model: config.chat_model.clone(),
            max_chars: config.chat_max_chars,
        })
    }

    pub fn validate(&self, messages: &[ChatMessage]) -> AppResult<()> {
        validate_messages(messages, self.max_chars)
    }

    fn model<'a>(&'a self, model: Option<&'a str>) -> &'a str {
        model
            .map(str::trim)
            .filter(|m| !m.is_empty())
            .unwrap_or(&self.default_model)
    }

    async fn post(&self, model: &str, messages: &[ChatMessage], stream: bool) -> AppResult<reqwest::Response> {
        let response = self
            .http
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&CompletionRequest {
                model,
                messages,
                stream,
            })
            .send()
            .await
            .map_err(|e| AppError::Upstream(format!("chat api request failed: {e}")))?;
        ensure_success("chat api", response).await
    }

    pub async fn complete(&self, messages: &[ChatMessage], model: Option<&str>) -> AppResult<ChatReply> {
        self.validate(messages)?;
        let model = self.model(model);
        let response = self.post(model, messages, false).await?;
        let body: CompletionResponse = response
            .json()
            .await
            .map_err(|e| AppError::Upstream(format!("chat api returned invalid JSON: {e}")))?;
        reply_from(body, model)
    }

    /// 返回上游 SSE 响应，由调用方透传
    pub async fn stream(&self, messages: &[ChatMessage], model: Option<&str>) -> AppResult<reqwest::Response> {
        self.validate(messages)?;
        let model = self.model(model);
        self.post(model, messages, true).await
    }

    pub async fn translate(&self, text: &str, target: &str) -> AppResult<String> {
        let messages = translation_messages(text, target);
        Ok(self.complete(&messages, None).await?.reply)
    }
}

fn completions_endpoint(base: &str) -> String {
    let base = base.trim_end_matches('/');
    if base.ends_with("/chat/completions") {
        base.to_string()
    } else {
        format!("{base}/chat/completions")
    }
}

pub fn validate_messages(messages: &[ChatMessage], max_chars: usize) -> AppResult<()> {
    if messages.is_empty() {
        return Err(AppError::Validation("消息不能为空".into()));
    }
    let mut total = 0usize;
    for message in messages {
        if !ALLOWED_ROLES.contains(&message.role.as_str()) {
            return Err(AppError::Validation(format!("不支持的角色: {}", message.role)));
        }
        total += message.content.chars().count();
    }
    if total > max_chars {
        return Err(AppError::Validation(format!("消息总长度不能超过{}个字符", max_chars)));
    }
    Ok(())
}

fn reply_from(body: CompletionResponse, requested_model: &str) -> AppResult<ChatReply> {
    let choice = body
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| AppError::Upstream("chat api returned no choices".into()))?;
    Ok(ChatReply {
        reply: choice.message.content,
        model: body.model.unwrap_or_else(|| requested_model.to_string()),
        usage: body.usage,
    })
}

fn translation_messages(text: &str, target: &str) -> Vec<ChatMessage> {
    vec![
        ChatMessage::new(
            "system",
            format!(
                "You are a professional translator. Translate the user's text into {target}. \
                 Output only the translation without explanations."
            ),
        ),
        ChatMessage::new("user", text),
    ]
}
