use std::str::FromStr;

use reqwest::multipart::{Form, Part};
use serde::Serialize;
use serde_json::Value;

use crate::config::{Config, CustomImageHost};
use crate::error::{AppError, AppResult};
use crate::infrastructure::{ensure_success, truncate};

const SMMS_UPLOAD_URL: &str = "https://sm.ms/api/v2/upload";
const IMGUR_UPLOAD_URL: &str = "https://api.imgur.com/3/image";

const IMAGE_EXTENSIONS: [&str; 8] = ["jpg", "jpeg", "png", "gif", "webp", "bmp", "svg", "avif"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageHost {
    Smms,
    Imgur,
    Custom,
}

impl ImageHost {
    pub fn as_str(&self) -> &'static str {
        match self {
            ImageHost::Smms => "smms",
            ImageHost::Imgur => "imgur",
            ImageHost::Custom => "custom",
        }
    }

    pub fn is_configured(&self, config: &Config) -> bool {
        match self {
            ImageHost::Smms => config.smms_token.is_some(),
            ImageHost::Imgur => config.imgur_client_id.is_some(),
            ImageHost::Custom => config.custom_image_host.is_some(),
        }
    }

    /// 已配置的图床，按优先级排列
    pub fn configured(config: &Config) -> Vec<ImageHost> {
        [ImageHost::Smms, ImageHost::Imgur, ImageHost::Custom]
            .into_iter()
            .filter(|h| h.is_configured(config))
            .collect()
    }
}

impl FromStr for ImageHost {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "smms" | "sm.ms" => Ok(ImageHost::Smms),
            "imgur" => Ok(ImageHost::Imgur),
            "custom" => Ok(ImageHost::Custom),
            _ => Err(AppError::Validation(format!("不支持的图床: {s}"))),
        }
    }
}

/// 待上传的文件
pub struct ImageFile {
    pub name: String,
    pub content_type: Option<String>,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone, Serialize)]
pub struct UploadedImage {
    pub url: String,
    pub size: u64,
    pub name: String,
    pub host: ImageHost,
}

pub fn is_image(content_type: Option<&str>, file_name: &str) -> bool {
    if let Some(ct) = content_type {
        if ct.to_ascii_lowercase().starts_with("image/") {
            return true;
        }
    }
    file_name
        .rsplit_once('.')
        .map(|(_, ext)| IMAGE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

/// 只保留文件名最后一段，去掉路径与控制字符
pub fn sanitize_file_name(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or(name);
    let cleaned: String = base.chars().filter(|c| !c.is_control()).collect();
    let cleaned = cleaned.trim();
    if cleaned.is_empty() {
        "image".to_string()
    } else {
        cleaned.to_string()
    }
}

pub async fn upload(
    http: &reqwest::Client,
    config: &Config,
    host: ImageHost,
    file: ImageFile,
) -> AppResult<UploadedImage> {
    let size = file.bytes.len() as u64;
    let name = file.name.clone();

    let url = match host {
        ImageHost::Smms => {
            let token = config
                .smms_token
                .as_deref()
                .ok_or(AppError::NotConfigured("SM.MS 图床"))?;
            let response = http
                .post(SMMS_UPLOAD_URL)
                .header(reqwest::header::AUTHORIZATION, token)
                .multipart(form_for("smfile", file)?)
                .send()
                .await
                .map_err(|e| AppError::Upstream(format!("smms upload failed: {e}")))?;
            let body = json_body("smms", response).await?;
            smms_url(&body)?
        }
        ImageHost::Imgur => {
            let client_id = config
                .imgur_client_id
                .as_deref()
                .ok_or(AppError::NotConfigured("Imgur 图床"))?;
            let response = http
                .post(IMGUR_UPLOAD_URL)
                .header(reqwest::header::AUTHORIZATION, format!("Client-ID {client_id}"))
                .multipart(form_for("image", file)?)
                .send()
                .await
                .map_err(|e| AppError::Upstream(format!("imgur upload failed: {e}")))?;
            let body = json_body("imgur", response).await?;
            pointer_url(&body, "/data/link")?
        }
        ImageHost::Custom => {
            let custom: &CustomImageHost = config
                .custom_image_host
                .as_ref()
                .ok_or(AppError::NotConfigured("自定义图床"))?;
            let mut request = http.post(&custom.url).multipart(form_for(&custom.field, file)?);
            if let Some((name, value)) = &custom.auth_header {
                request = request.header(name.as_str(), value.as_str());
            }
            let response = request
                .send()
                .await
                .map_err(|e| AppError::Upstream(format!("custom host upload failed: {e}")))?;
            let body = json_body("custom host", response).await?;
            pointer_url(&body, &custom.url_pointer)?
        }
    };

    Ok(UploadedImage { url, size, name, host })
}

fn form_for(field: &str, file: ImageFile) -> AppResult<Form> {
    let mut part = Part::bytes(file.bytes).file_name(file.name);
    if let Some(ct) = file.content_type {
        part = part
            .mime_str(&ct)
            .map_err(|e| AppError::Validation(format!("文件类型无效: {e}")))?;
    }
    Ok(Form::new().part(field.to_string(), part))
}

async fn json_body(service: &str, response: reqwest::Response) -> AppResult<Value> {
    let response = ensure_success(service, response).await?;
    let text = response.text().await?;
    serde_json::from_str(&text).map_err(|e| {
        AppError::Upstream(format!(
            "{service} returned non-JSON ({e}): {}",
            truncate(&text, 300)
        ))
    })
}

/// SM.MS 重复上传时返回已有图片地址
fn smms_url(body: &Value) -> AppResult<String> {
    if body.get("success").and_then(Value::as_bool) == Some(true) {
        return pointer_url(body, "/data/url");
    }
    if body.get("code").and_then(Value::as_str) == Some("image_repeated") {
        if let Some(url) = body.get("images").and_then(Value::as_str) {
            return Ok(url.to_string());
        }
    }
    let message = body
        .get("message")
        .and_then(Value::as_str)
        .unwrap_or("unknown error");
    Err(AppError::Upstream(format!("smms upload rejected: {message}")))
}

fn pointer_url(body: &Value, pointer: &str) -> AppResult<String> {
    body.pointer(pointer)
        .and_then(Value::as_str)
        .filter(|u| u.starts_with("http://") || u.starts_with("https://"))
        .map(str::to_string)
        .ok_or_else(|| AppError::Upstream(format!("image host response has no url at {pointer}")))
}
