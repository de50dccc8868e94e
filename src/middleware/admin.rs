use axum::{
    body::Body,
    extract::State,
    http::Request,
    middleware::Next,
    response::Response,
};

use crate::{
    AppState,
    error::AppError,
    middleware::extract_bearer,
    utils::{ADMIN_ROLE, verify_admin_token},
};

/// 管理后台接口校验 JWT，声明写入请求扩展
pub async fn admin_middleware(
    State(state): State<AppState>,
    mut req: Request<Body>,
    next: Next,
) -> Result<Response, AppError> {
    let token = extract_bearer(req.headers()).ok_or(AppError::Unauthorized)?;

    let claims = verify_admin_token(&token, &state.config).map_err(|e| {
        tracing::debug!("Admin token rejected: {}", e);
        AppError::Unauthorized
    })?;

    if claims.role != ADMIN_ROLE {
        return Err(AppError::PermissionDenied);
    }

    req.extensions_mut().insert(claims);
    Ok(next.run(req).await)
}
