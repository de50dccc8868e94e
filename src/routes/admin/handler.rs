use axum::{
    Extension,
    extract::{Json, Query, State},
};
use serde_json::json;

use crate::{
    AppState,
    cache::TokenCacheOperations,
    common::{ApiResponse, PageQuery, Paged},
    error::{AppError, AppResult},
    event_log::{EventLevel, EventRecord},
    routes::user::User,
    utils::{AdminClaims, generate_admin_token, normalize_email, success_to_api_response, verify_password},
};

use super::model::{
    AdminLoginRequest, AdminLoginResponse, EmailRequest, LogsQuery, StatsResponse, UserSummary,
};

#[axum::debug_handler]
pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<AdminLoginRequest>,
) -> AppResult<Json<ApiResponse<AdminLoginResponse>>> {
    let hash = state
        .config
        .admin_password_hash
        .as_deref()
        .ok_or(AppError::NotConfigured("管理员密码"))?;

    let password_ok = verify_password(&req.password, hash)
        .map_err(|e| AppError::Internal(format!("invalid ADMIN_PASSWORD_HASH: {e}")))?;
    if req.username != state.config.admin_username || !password_ok {
        state
            .events
            .record(EventLevel::Warn, "admin_login_failed", json!({ "username": req.username }))
            .await;
        return Err(AppError::AuthFailed("用户名或密码错误".into()));
    }

    let (token, expires_at) = generate_admin_token(&req.username, &state.config)
        .map_err(|e| AppError::Internal(format!("failed to sign admin token: {e}")))?;

    state
        .events
        .record(EventLevel::Info, "admin_login", json!({ "username": req.username }))
        .await;
    Ok(success_to_api_response(AdminLoginResponse { token, expires_at }))
}

#[axum::debug_handler]
pub async fn stats(State(state): State<AppState>) -> AppResult<Json<ApiResponse<StatsResponse>>> {
    let user_count = User::count(&state.pool).await?;
    let albums = state.albums.stats().await?;
    Ok(success_to_api_response(StatsResponse { user_count, albums }))
}

#[axum::debug_handler]
pub async fn users(
    State(state): State<AppState>,
    Query(query): Query<PageQuery>,
) -> AppResult<Json<ApiResponse<Paged<UserSummary>>>> {
    let (page, page_size) = query.normalized();
    let total = User::count(&state.pool).await?;
    let items = User::list(&state.pool, page_size, query.offset())
        .await?
        .into_iter()
        .map(UserSummary::from)
        .collect();

    Ok(success_to_api_response(Paged {
        items,
        total,
        page,
        page_size,
    }))
}

#[axum::debug_handler]
pub async fn revoke_token(
    State(state): State<AppState>,
    Extension(admin): Extension<AdminClaims>,
    Json(req): Json<EmailRequest>,
) -> AppResult<Json<ApiResponse<()>>> {
    let email = normalize_email(&req.email);
    let old_token = match User::clear_token_for(&state.pool, &email).await {
        Ok(token) => token,
        Err(sqlx::Error::RowNotFound) => return Err(AppError::NotFound("用户不存在".into())),
        Err(e) => return Err(e.into()),
    };
    if let Some(token) = old_token {
        TokenCacheOperations::remove_token(&state.redis, &token).await?;
    }

    state
        .events
        .record(
            EventLevel::Info,
            "admin_revoke_token",
            json!({ "admin": admin.sub, "email": email }),
        )
        .await;
    Ok(success_to_api_response(()))
}

#[axum::debug_handler]
pub async fn delete_user(
    State(state): State<AppState>,
    Extension(admin): Extension<AdminClaims>,
    Json(req): Json<EmailRequest>,
) -> AppResult<Json<ApiResponse<()>>> {
    let email = normalize_email(&req.email);
    let user = User::find_by_email(&state.pool, &email)
        .await?
        .ok_or_else(|| AppError::NotFound("用户不存在".into()))?;

    User::delete(&state.pool, &email).await?;
    if let Some(token) = user.token {
        if let Err(e) = TokenCacheOperations::remove_token(&state.redis, &token).await {
            tracing::warn!("Failed to evict token of deleted user: {}", e);
        }
    }
    state.albums.delete_user(&email).await?;

    state
        .events
        .record(
            EventLevel::Warn,
            "admin_delete_user",
            json!({ "admin": admin.sub, "email": email }),
        )
        .await;
    Ok(success_to_api_response(()))
}

#[axum::debug_handler]
pub async fn logs(
    State(state): State<AppState>,
    Query(query): Query<LogsQuery>,
) -> AppResult<Json<ApiResponse<Vec<EventRecord>>>> {
    let records = state.events.tail(query.lines()).await?;
    Ok(success_to_api_response(records))
}
