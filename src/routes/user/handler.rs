use std::future::Future;

use axum::{
    Extension,
    extract::{Json, State},
};
use axum_extra::extract::cookie::{Cookie, CookieJar};
use chrono::{Duration, Utc};
use serde_json::json;

use crate::{
    AppState,
    cache::{CooldownCacheOperations, TokenCacheOperations},
    common::ApiResponse,
    config::Config,
    error::{AppError, AppResult},
    event_log::EventLevel,
    infrastructure::mail::verification_mail,
    middleware::CurrentUser,
    utils::{generate_verify_code, is_valid_email, normalize_email, success_to_api_response},
};

use super::model::{
    CodeCheck, LoginResponse, MeResponse, SendCodeRequest, SendCodeResponse, User, VerifyCodeRequest,
};

/// 会话 Cookie：HttpOnly、SameSite=Lax、整站有效
pub fn session_cookie(config: &Config, token: &str) -> Cookie<'static> {
    let mut raw = format!(
        "{}={}; Path=/; Max-Age={}; HttpOnly; SameSite=Lax",
        config.token_cookie_name, token, config.token_cookie_max_age_secs
    );
    if config.cookie_secure {
        raw.push_str("; Secure");
    }
    Cookie::parse(raw).unwrap_or_else(|e| {
        tracing::warn!("Failed to build session cookie: {}", e);
        Cookie::new(config.token_cookie_name.clone(), token.to_string())
    })
}

pub fn removal_cookie(config: &Config) -> Cookie<'static> {
    let mut cookie = Cookie::new(config.token_cookie_name.clone(), "");
    cookie.set_path("/");
    cookie
}

/// 登录成功后的公共流程：签发令牌、刷新缓存、记录事件
pub(crate) async fn complete_login(
    state: &AppState,
    email: &str,
    previous_token: Option<String>,
    method: &str,
) -> AppResult<String> {
    let token = User::issue_token(&state.pool, email).await?;

    if let Some(old) = previous_token {
        if let Err(e) = TokenCacheOperations::remove_token(&state.redis, &old).await {
            tracing::warn!("Failed to evict old token: {}", e);
        }
    }
    if let Err(e) =
        TokenCacheOperations::cache_token(&state.redis, &token, email, state.config.token_cache_ttl_secs)
            .await
    {
        tracing::warn!("Failed to cache token: {}", e);
    }

    tracing::info!("User {} logged in via {}", email, method);
    state
        .events
        .record(EventLevel::Info, "login", json!({ "email": email, "method": method }))
        .await;
    Ok(token)
}

/// 写库并发送验证码
async fn deliver_code(state: &AppState, email: &str, code: &str, ttl_secs: u64) -> AppResult<()> {
    User::upsert_email(&state.pool, email).await?;
    User::store_verify_code(&state.pool, email, code, Utc::now()).await?;

    match &state.mail {
        Some(mail) => mail.send(email, verification_mail(code, ttl_secs.div_ceil(60))).await,
        None => {
            tracing::warn!("Mail service not configured, verification code for {}: {}", email, code);
            Ok(())
        }
    }
}

/// 验证码没有发出去时释放冷却，允许立即重试
async fn release_on_error<T, F, Fut>(result: AppResult<T>, release: F) -> AppResult<T>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<(), redis::RedisError>>,
{
    if result.is_err() {
        if let Err(e) = release().await {
            tracing::warn!("Failed to release send-code cooldown: {}", e);
        }
    }
    result
}

#[axum::debug_handler]
pub async fn send_code(
    State(state): State<AppState>,
    Json(req): Json<SendCodeRequest>,
) -> AppResult<Json<ApiResponse<SendCodeResponse>>> {
    let email = normalize_email(&req.email);
    if !is_valid_email(&email) {
        return Err(AppError::Validation("邮箱格式不正确".into()));
    }
    // 发布版本必须配置邮件服务
    if state.mail.is_none() && !cfg!(debug_assertions) {
        return Err(AppError::NotConfigured("邮件服务"));
    }

    let cooldown = state.config.verify_resend_cooldown_secs;
    if let Err(remaining) = CooldownCacheOperations::try_acquire(&state.redis, &email, cooldown).await? {
        return Err(AppError::RateLimited(format!(
            "验证码发送过于频繁，请在{}秒后重试",
            remaining
        )));
    }

    let code = generate_verify_code();
    let ttl_secs = state.config.verify_code_ttl_secs;
    let delivered = deliver_code(&state, &email, &code, ttl_secs).await;
    release_on_error(delivered, || CooldownCacheOperations::release(&state.redis, &email)).await?;

    state
        .events
        .record(EventLevel::Info, "send_code", json!({ "email": email }))
        .await;

    Ok(success_to_api_response(SendCodeResponse {
        email,
        expires_in: ttl_secs,
        resend_after: cooldown,
    }))
}

#[axum::debug_handler]
pub async fn verify_code(
    State(state): State<AppState>,
    jar: CookieJar,
    Json(req): Json<VerifyCodeRequest>,
) -> AppResult<(CookieJar, Json<ApiResponse<LoginResponse>>)> {
    let email = normalize_email(&req.email);
    if !is_valid_email(&email) {
        return Err(AppError::Validation("邮箱格式不正确".into()));
    }

    let user = User::find_by_email(&state.pool, &email)
        .await?
        .ok_or_else(|| AppError::AuthFailed("请先获取验证码".into()))?;

    let max_failures = state.config.verify_max_failures;
    let ttl = Duration::seconds(state.config.verify_code_ttl_secs as i64);
    let check = user.check_code(&req.code, Utc::now(), ttl, max_failures);

    // 每次比对先在数据库里占用一次机会，成功后 issue_token 会清零计数
    let claimed = check.needs_attempt()
        && User::claim_verify_attempt(&state.pool, &email, max_failures).await?;
    if let (CodeCheck::Mismatch { remaining }, true) = (check, claimed) {
        state
            .events
            .record(
                EventLevel::Warn,
                "verify_failed",
                json!({ "email": email, "remaining": remaining }),
            )
            .await;
    }
    check.settle(claimed)?;

    let token = complete_login(&state, &email, user.token, "email").await?;
    let jar = jar.add(session_cookie(&state.config, &token));

    Ok((jar, success_to_api_response(LoginResponse { email, token })))
}

#[axum::debug_handler]
pub async fn me(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
) -> AppResult<Json<ApiResponse<MeResponse>>> {
    let user = User::find_by_email(&state.pool, &current.email)
        .await?
        .ok_or(AppError::Unauthorized)?;

    Ok(success_to_api_response(MeResponse {
        email: user.email,
        created_at: user.created_at,
    }))
}

#[axum::debug_handler]
pub async fn logout(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    jar: CookieJar,
) -> AppResult<(CookieJar, Json<ApiResponse<()>>)> {
    User::clear_token(&state.pool, &current.token).await?;
    if let Err(e) = TokenCacheOperations::remove_token(&state.redis, &current.token).await {
        tracing::warn!("Failed to evict token on logout: {}", e);
    }

    state
        .events
        .record(EventLevel::Info, "logout", json!({ "email": current.email }))
        .await;

    let jar = jar.remove(removal_cookie(&state.config));
    Ok((jar, success_to_api_response(())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::test_config;
    use axum_extra::extract::cookie::SameSite;

    #[test]
    fn session_cookie_attributes() {
        let mut config = test_config();
        let token = "a".repeat(64);
        let cookie = session_cookie(&config, &token);
        assert_eq!(cookie.name(), "token");
        assert_eq!(cookie.value(), token);
        assert_eq!(cookie.path(), Some("/"));
        assert_eq!(cookie.http_only(), Some(true));
        assert_eq!(cookie.same_site(), Some(SameSite::Lax));
        assert_eq!(cookie.max_age().map(|d| d.whole_seconds()), Some(3600));
        assert_ne!(cookie.secure(), Some(true));

        config.cookie_secure = true;
        assert_eq!(session_cookie(&config, &token).secure(), Some(true));
    }

    #[tokio::test]
    async fn failed_delivery_releases_cooldown() {
        let mut released = false;
        let result: AppResult<()> = release_on_error(Err(AppError::Upstream("mail down".into())), || {
            released = true;
            async { Ok::<(), redis::RedisError>(()) }
        })
        .await;
        assert!(matches!(result, Err(AppError::Upstream(_))));
        assert!(released);

        // 数据库失败同样释放，释放失败不覆盖原错误
        let result: AppResult<()> = release_on_error(Err(AppError::Internal("db".into())), || async {
            Err(redis::RedisError::from((redis::ErrorKind::IoError, "redis down")))
        })
        .await;
        assert!(matches!(result, Err(AppError::Internal(_))));
    }

    #[tokio::test]
    async fn successful_delivery_keeps_cooldown() {
        let mut released = false;
        let result = release_on_error(Ok(7), || {
            released = true;
            async { Ok::<(), redis::RedisError>(()) }
        })
        .await;
        assert_eq!(result.unwrap(), 7);
        assert!(!released);
    }

    #[test]
    fn removal_cookie_targets_same_path() {
        let config = test_config();
        let cookie = removal_cookie(&config);
        assert_eq!(cookie.name(), "token");
        assert_eq!(cookie.path(), Some("/"));
    }
}
