use axum::{
    Extension,
    extract::{Json, Path, Query, State},
    http::StatusCode,
};
use serde_json::json;

use crate::{
    AppState,
    common::ApiResponse,
    error::AppResult,
    event_log::EventLevel,
    middleware::CurrentUser,
    storage::{AlbumMeta, AlbumUpdate, PhotoRecord, PhotoUpdate},
    utils::success_to_api_response,
};

use super::model::{AddPhotosRequest, AlbumDetail, CreateAlbumRequest, PhotosQuery};

#[axum::debug_handler]
pub async fn list_albums(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
) -> AppResult<Json<ApiResponse<Vec<AlbumMeta>>>> {
    let albums = state.albums.list(&current.email).await?;
    Ok(success_to_api_response(albums))
}

#[axum::debug_handler]
pub async fn create_album(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Json(req): Json<CreateAlbumRequest>,
) -> AppResult<(StatusCode, Json<ApiResponse<AlbumMeta>>)> {
    let album = state
        .albums
        .create(&current.email, &req.name, req.description.as_deref())
        .await?;

    state
        .events
        .record(
            EventLevel::Info,
            "album_created",
            json!({ "email": current.email, "album": album.id }),
        )
        .await;
    Ok((StatusCode::CREATED, success_to_api_response(album)))
}

#[axum::debug_handler]
pub async fn update_album(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Path(album_id): Path<String>,
    Json(req): Json<AlbumUpdate>,
) -> AppResult<Json<ApiResponse<AlbumMeta>>> {
    let album = state.albums.update(&current.email, &album_id, req).await?;
    Ok(success_to_api_response(album))
}

#[axum::debug_handler]
pub async fn delete_album(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Path(album_id): Path<String>,
) -> AppResult<Json<ApiResponse<()>>> {
    state.albums.delete(&current.email, &album_id).await?;

    state
        .events
        .record(
            EventLevel::Info,
            "album_deleted",
            json!({ "email": current.email, "album": album_id }),
        )
        .await;
    Ok(success_to_api_response(()))
}

#[axum::debug_handler]
pub async fn list_photos(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Path(album_id): Path<String>,
    Query(query): Query<PhotosQuery>,
) -> AppResult<Json<ApiResponse<AlbumDetail>>> {
    let (album, photos) = state.albums.get(&current.email, &album_id).await?;
    Ok(success_to_api_response(AlbumDetail::filtered(
        album,
        photos,
        query.tag.as_deref(),
    )))
}

#[axum::debug_handler]
pub async fn add_photos(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Path(album_id): Path<String>,
    Json(req): Json<AddPhotosRequest>,
) -> AppResult<(StatusCode, Json<ApiResponse<Vec<PhotoRecord>>>)> {
    let added = state
        .albums
        .add_photos(&current.email, &album_id, req.photos)
        .await?;
    Ok((StatusCode::CREATED, success_to_api_response(added)))
}

#[axum::debug_handler]
pub async fn update_photo(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Path((album_id, photo_id)): Path<(String, String)>,
    Json(req): Json<PhotoUpdate>,
) -> AppResult<Json<ApiResponse<PhotoRecord>>> {
    let photo = state
        .albums
        .update_photo(&current.email, &album_id, &photo_id, req)
        .await?;
    Ok(success_to_api_response(photo))
}

#[axum::debug_handler]
pub async fn delete_photo(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Path((album_id, photo_id)): Path<(String, String)>,
) -> AppResult<Json<ApiResponse<AlbumMeta>>> {
    let album = state
        .albums
        .delete_photo(&current.email, &album_id, &photo_id)
        .await?;
    Ok(success_to_api_response(album))
}
