use axum::{
    Extension,
    extract::{Json, Multipart, Query, State, multipart::Field},
};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::{
    AppState,
    common::ApiResponse,
    error::{AppError, AppResult},
    event_log::EventLevel,
    infrastructure::image_host::{self, ImageFile, ImageHost, UploadedImage, is_image, sanitize_file_name},
    middleware::CurrentUser,
    storage::{NewPhoto, PhotoRecord},
    utils::success_to_api_response,
};

const FILE_FIELD: &str = "file";

#[derive(Debug, Deserialize)]
pub struct UploadQuery {
    pub host: Option<String>,
    pub album: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct UploadResponse {
    #[serde(flatten)]
    pub image: UploadedImage,
    /// 同时写入相册时的照片记录
    #[serde(skip_serializing_if = "Option::is_none")]
    pub photo: Option<PhotoRecord>,
}

#[axum::debug_handler]
pub async fn hosts(State(state): State<AppState>) -> Json<ApiResponse<Vec<ImageHost>>> {
    success_to_api_response(ImageHost::configured(&state.config))
}

fn choose_host(requested: Option<&str>, configured: &[ImageHost]) -> AppResult<ImageHost> {
    match requested.map(str::trim).filter(|h| !h.is_empty()) {
        Some(name) => {
            let host: ImageHost = name.parse()?;
            if !configured.contains(&host) {
                return Err(AppError::NotConfigured("所选图床"));
            }
            Ok(host)
        }
        None => configured.first().copied().ok_or(AppError::NotConfigured("图床")),
    }
}

async fn read_limited(mut field: Field<'_>, max_bytes: usize) -> AppResult<Vec<u8>> {
    let mut buf = Vec::new();
    while let Some(chunk) = field
        .chunk()
        .await
        .map_err(|e| AppError::Validation(format!("上传数据无效: {e}")))?
    {
        if buf.len() + chunk.len() > max_bytes {
            return Err(AppError::Validation(format!(
                "文件不能超过{}MB",
                max_bytes.div_ceil(1024 * 1024)
            )));
        }
        buf.extend_from_slice(&chunk);
    }
    Ok(buf)
}

/// 读取名为 file 的表单字段，其余字段忽略
async fn read_image(multipart: &mut Multipart, max_bytes: usize) -> AppResult<ImageFile> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::Validation(format!("上传数据无效: {e}")))?
    {
        if field.name() != Some(FILE_FIELD) {
            continue;
        }
        let name = sanitize_file_name(field.file_name().unwrap_or("image"));
        let content_type = field.content_type().map(str::to_string);
        if !is_image(content_type.as_deref(), &name) {
            return Err(AppError::Validation("只能上传图片文件".into()));
        }

        let bytes = read_limited(field, max_bytes).await?;
        if bytes.is_empty() {
            return Err(AppError::Validation("文件为空".into()));
        }
        return Ok(ImageFile {
            name,
            content_type,
            bytes,
        });
    }
    Err(AppError::Validation("缺少 file 字段".into()))
}

#[axum::debug_handler]
pub async fn upload(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Query(query): Query<UploadQuery>,
    mut multipart: Multipart,
) -> AppResult<Json<ApiResponse<UploadResponse>>> {
    let host = choose_host(query.host.as_deref(), &ImageHost::configured(&state.config))?;

    // 先确认相册存在，避免上传后才失败
    if let Some(album_id) = &query.album {
        state.albums.get(&current.email, album_id).await?;
    }

    let file = read_image(&mut multipart, state.config.upload_max_bytes).await?;
    let image = image_host::upload(&state.http, &state.config, host, file).await?;

    let photo = match &query.album {
        Some(album_id) => state
            .albums
            .add_photos(
                &current.email,
                album_id,
                vec![NewPhoto {
                    url: image.url.clone(),
                    name: Some(image.name.clone()),
                    size: Some(image.size),
                    ..Default::default()
                }],
            )
            .await?
            .pop(),
        None => None,
    };

    state
        .events
        .record(
            EventLevel::Info,
            "image_uploaded",
            json!({
                "email": current.email,
                "host": host.as_str(),
                "size": image.size,
                "album": query.album,
            }),
        )
        .await;

    Ok(success_to_api_response(UploadResponse { image, photo }))
}
