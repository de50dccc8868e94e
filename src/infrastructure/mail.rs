use serde::Serialize;

use crate::config::Config;
use crate::error::{AppError, AppResult};
use crate::infrastructure::ensure_success;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct MailAddress {
    email: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SendMailBody {
    sender: MailAddress,
    to: Vec<MailAddress>,
    subject: String,
    html_content: String,
    text_content: String,
}

/// 事务邮件 HTTP API 客户端（Brevo 兼容格式）
#[derive(Clone)]
pub struct MailClient {
    http: reqwest::Client,
    api_url: String,
    api_key: String,
    sender: String,
    sender_name: String,
}

pub struct MailContent {
    pub subject: String,
    pub html: String,
    pub text: String,
}

impl MailClient {
    /// 邮件 API 未完整配置时返回 None
    pub fn from_config(http: reqwest::Client, config: &Config) -> Option<Self> {
        Some(Self {
            http,
            api_url: config.mail_api_url.clone()?,
            api_key: config.mail_api_key.clone()?,
            sender: config.mail_sender.clone()?,
            sender_name: config.mail_sender_name.clone(),
        })
    }

    pub async fn send(&self, to: &str, content: MailContent) -> AppResult<()> {
        let body = SendMailBody {
            sender: MailAddress {
                email: self.sender.clone(),
                name: Some(self.sender_name.clone()),
            },
            to: vec![MailAddress {
                email: to.to_string(),
                name: None,
            }],
            subject: content.subject,
            html_content: content.html,
            text_content: content.text,
        };

        let response = self
            .http
            .post(&self.api_url)
            .header("api-key", &self.api_key)
            .header(reqwest::header::ACCEPT, "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| AppError::Upstream(format!("mail api request failed: {e}")))?;

        ensure_success("mail api", response).await?;
        Ok(())
    }
}

pub fn verification_mail(code: &str, ttl_minutes: u64) -> MailContent {
    MailContent {
        subject: format!("【云图存储】登录验证码 {code}"),
        html: format!(
            "<div style=\"font-family:sans-serif\">\
             <p>您好，</p>\
             <p>您的登录验证码为：<b style=\"font-size:20px;letter-spacing:4px\">{code}</b></p>\
             <p>验证码 {ttl_minutes} 分钟内有效，请勿泄露给他人。</p>\
             <p>如果这不是您本人的操作，请忽略本邮件。</p></div>"
        ),
        text: format!(
            "您的登录验证码为：{code}，{ttl_minutes} 分钟内有效。如果这不是您本人的操作，请忽略本邮件。"
        ),
    }
}
