use axum::{
    Json, Router,
    extract::DefaultBodyLimit,
    routing::{get, post, put},
};
use serde::Serialize;
use tower_http::{services::ServeDir, trace::TraceLayer};

use crate::{
    AppState,
    common::ApiResponse,
    middleware::{admin_middleware, auth_middleware, log_errors},
    utils::success_to_api_response,
};

pub mod admin;
pub mod album;
pub mod chat;
pub mod oauth;
pub mod tools;
pub mod upload;
pub mod user;

/// multipart 表单除文件外的额外开销
const MULTIPART_OVERHEAD: usize = 64 * 1024;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}

pub async fn health() -> Json<ApiResponse<HealthResponse>> {
    success_to_api_response(HealthResponse { status: "ok" })
}

/// 组装全部路由，限流与 CORS 由调用方追加
pub fn create_router(state: AppState) -> Router {
    // 公开路由
    let public_routes = Router::new()
        .route("/health", get(health))
        .route("/auth/send-code", post(user::send_code))
        .route("/auth/verify-code", post(user::verify_code))
        .route("/oauth/providers", get(oauth::providers))
        .route("/oauth/{provider}/login", get(oauth::login))
        .route("/oauth/{provider}/callback", get(oauth::callback))
        .route("/admin/login", post(admin::login));

    // 需要登录的路由
    let protected_routes = Router::new()
        .route("/auth/me", get(user::me))
        .route("/auth/logout", post(user::logout))
        // 相册
        .route("/albums", get(album::list_albums).post(album::create_album))
        .route(
            "/albums/{album_id}",
            put(album::update_album).delete(album::delete_album),
        )
        .route(
            "/albums/{album_id}/photos",
            get(album::list_photos).post(album::add_photos),
        )
        .route(
            "/albums/{album_id}/photos/{photo_id}",
            put(album::update_photo).delete(album::delete_photo),
        )
        // AI 对话与工具
        .route("/chat", post(chat::chat))
        .route("/tools/translate", post(tools::translate))
        .route("/tools/qrcode", get(tools::qrcode))
        .route("/tools/tts", post(tools::tts))
        // 图床上传
        .route("/upload/hosts", get(upload::hosts))
        .route(
            "/upload",
            post(upload::upload).layer(DefaultBodyLimit::max(
                state.config.upload_max_bytes + MULTIPART_OVERHEAD,
            )),
        )
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    // 管理后台
    let admin_routes = Router::new()
        .route("/admin/stats", get(admin::stats))
        .route("/admin/users", get(admin::users).delete(admin::delete_user))
        .route("/admin/users/revoke", post(admin::revoke_token))
        .route("/admin/logs", get(admin::logs))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            admin_middleware,
        ));

    let api = Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .merge(admin_routes);

    let mut router = Router::new().nest(&state.config.api_base_uri, api);

    if let Some(dir) = &state.config.static_dir {
        tracing::info!("Serving static files from {}", dir.display());
        router = router.fallback_service(ServeDir::new(dir));
    }

    router
        .layer(axum::middleware::from_fn_with_state(
            state.events.clone(),
            log_errors,
        ))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
