use axum::{
    body::Body,
    extract::State,
    http::{HeaderMap, Request, header::AUTHORIZATION},
    middleware::Next,
    response::Response,
};
use axum_extra::extract::cookie::CookieJar;

use crate::{
    AppState,
    cache::TokenCacheOperations,
    error::AppError,
    routes::user::User,
    utils::is_valid_token,
};

/// 当前登录用户，由认证中间件写入请求扩展
#[derive(Debug, Clone)]
pub struct CurrentUser {
    pub email: String,
    pub token: String,
}

/// 解析 `Authorization: Bearer <token>`
pub fn extract_bearer(headers: &HeaderMap) -> Option<String> {
    let raw = headers.get(AUTHORIZATION)?.to_str().ok()?.trim();
    let (scheme, rest) = raw.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = rest.trim();
    (!token.is_empty()).then(|| token.to_string())
}

/// 优先读取 Cookie，其次读取 Bearer 头
pub fn extract_session_token(headers: &HeaderMap, cookie_name: &str) -> Option<String> {
    let jar = CookieJar::from_headers(headers);
    jar.get(cookie_name)
        .map(|c| c.value().trim().to_string())
        .filter(|v| !v.is_empty())
        .or_else(|| extract_bearer(headers))
}

/// 令牌换取邮箱：先查 Redis，再查数据库并回填缓存
pub async fn resolve_session(state: &AppState, token: &str) -> Result<Option<String>, AppError> {
    if !is_valid_token(token) {
        return Ok(None);
    }

    match TokenCacheOperations::get_cached_token(&state.redis, token).await {
        Ok(Some(session)) => return Ok(Some(session.email)),
        Ok(None) => {}
        Err(e) => tracing::warn!("Token cache lookup failed: {}", e),
    }

    let Some(user) = User::find_by_token(&state.pool, token).await? else {
        return Ok(None);
    };

    if let Err(e) = TokenCacheOperations::cache_token(
        &state.redis,
        token,
        &user.email,
        state.config.token_cache_ttl_secs,
    )
    .await
    {
        tracing::warn!("Failed to cache token: {}", e);
    }

    Ok(Some(user.email))
}

pub async fn auth_middleware(
    State(state): State<AppState>,
    mut req: Request<Body>,
    next: Next,
) -> Result<Response, AppError> {
    let token = extract_session_token(req.headers(), &state.config.token_cookie_name)
        .ok_or(AppError::Unauthorized)?;

    let email = resolve_session(&state, &token)
        .await?
        .ok_or(AppError::Unauthorized)?;

    req.extensions_mut().insert(CurrentUser { email, token });
    Ok(next.run(req).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;
    use axum::http::header::COOKIE;

    #[test]
    fn bearer_is_parsed() {
        let mut headers = HeaderMap::new();
        assert_eq!(extract_bearer(&headers), None);

        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer  abc "));
        assert_eq!(extract_bearer(&headers).as_deref(), Some("abc"));

        headers.insert(AUTHORIZATION, HeaderValue::from_static("bearer xyz"));
        assert_eq!(extract_bearer(&headers).as_deref(), Some("xyz"));

        headers.insert(AUTHORIZATION, HeaderValue::from_static("Basic abc"));
        assert_eq!(extract_bearer(&headers), None);

        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer "));
        assert_eq!(extract_bearer(&headers), None);
    }

    #[test]
    fn cookie_wins_over_bearer() {
        let mut headers = HeaderMap::new();
        headers.insert(COOKIE, HeaderValue::from_static("theme=dark; token=fromcookie"));
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer fromheader"));
        assert_eq!(
            extract_session_token(&headers, "token").as_deref(),
            Some("fromcookie")
        );
        assert_eq!(
            extract_session_token(&headers, "sid").as_deref(),
            Some("fromheader")
        );
    }
}
