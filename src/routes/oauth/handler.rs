use axum::{
    extract::{Json, Path, Query, State},
    response::{IntoResponse, Redirect, Response},
};
use axum_extra::extract::cookie::CookieJar;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::{
    AppState,
    cache::OAuthStateCacheOperations,
    common::ApiResponse,
    error::{AppError, AppResult},
    event_log::EventLevel,
    infrastructure::oauth::{self, OAuthProvider},
    routes::user::{User, complete_login, session_cookie},
    utils::{generate_state, success_to_api_response},
};

#[derive(Debug, Deserialize)]
pub struct CallbackQuery {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ProviderInfo {
    pub name: &'static str,
    pub login_url: String,
}

/// 已配置的第三方登录方式
#[axum::debug_handler]
pub async fn providers(State(state): State<AppState>) -> Json<ApiResponse<Vec<ProviderInfo>>> {
    let base = state.config.api_base_uri.trim_end_matches('/');
    let list = OAuthProvider::ALL
        .into_iter()
        .filter(|p| p.client(&state.config).is_some())
        .map(|p| ProviderInfo {
            name: p.as_str(),
            login_url: format!("{base}/oauth/{p}/login"),
        })
        .collect();
    success_to_api_response(list)
}

#[axum::debug_handler]
pub async fn login(
    State(state): State<AppState>,
    Path(provider): Path<String>,
) -> AppResult<Redirect> {
    let provider: OAuthProvider = provider.parse()?;
    let client = provider
        .client(&state.config)
        .ok_or(AppError::NotConfigured(provider.display_name()))?;

    let oauth_state = generate_state();
    OAuthStateCacheOperations::store_state(&state.redis, &oauth_state, provider.as_str()).await?;

    let url = oauth::authorize_url(provider, client, &oauth_state)?;
    Ok(Redirect::to(url.as_str()))
}

#[axum::debug_handler]
pub async fn callback(
    State(state): State<AppState>,
    Path(provider): Path<String>,
    Query(query): Query<CallbackQuery>,
    jar: CookieJar,
) -> Response {
    let provider: OAuthProvider = match provider.parse() {
        Ok(p) => p,
        Err(e) => return e.into_response(),
    };

    match finish_login(&state, provider, query).await {
        Ok(token) => {
            let jar = jar.add(session_cookie(&state.config, &token));
            (jar, Redirect::to(&state.config.oauth_success_redirect)).into_response()
        }
        Err(e) => {
            tracing::warn!("OAuth login via {} failed: {}", provider, e);
            state
                .events
                .record(
                    EventLevel::Warn,
                    "oauth_failed",
                    json!({ "provider": provider.as_str(), "error": e.to_string() }),
                )
                .await;
            Redirect::to(&failure_redirect(
                &state.config.oauth_failure_redirect,
                failure_reason(&e),
            ))
            .into_response()
        }
    }
}

async fn finish_login(state: &AppState, provider: OAuthProvider, query: CallbackQuery) -> AppResult<String> {
    if let Some(error) = query.error {
        return Err(AppError::AuthFailed(format!("用户拒绝授权: {error}")));
    }
    let client = provider
        .client(&state.config)
        .ok_or(AppError::NotConfigured(provider.display_name()))?;
    let code = query
        .code
        .filter(|c| !c.is_empty())
        .ok_or_else(|| AppError::Validation("缺少授权码".into()))?;
    let oauth_state = query
        .state
        .filter(|s| !s.is_empty())
        .ok_or_else(|| AppError::Validation("缺少 state".into()))?;

    // state 只能使用一次，且必须属于同一提供方
    let stored = OAuthStateCacheOperations::take_state(&state.redis, &oauth_state).await?;
    if stored.as_deref() != Some(provider.as_str()) {
        return Err(AppError::AuthFailed("state 无效或已过期".into()));
    }

    let access_token = oauth::exchange_code(&state.http, provider, client, &code).await?;
    let email = oauth::fetch_email(&state.http, provider, &access_token).await?;

    let user = User::upsert_email(&state.pool, &email).await?;
    complete_login(state, &email, user.token, provider.as_str()).await
}

fn failure_reason(error: &AppError) -> &'static str {
    match error {
        AppError::Validation(_) => "invalid_request",
        AppError::AuthFailed(_) => "access_denied",
        AppError::NotConfigured(_) => "not_configured",
        AppError::Upstream(_) | AppError::Http(_) => "provider_error",
        _ => "server_error",
    }
}

fn failure_redirect(base: &str, reason: &str) -> String {
    let sep = if base.contains('?') { '&' } else { '?' };
    format!("{base}{sep}error={reason}")
}
