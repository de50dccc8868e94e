use std::fmt;
use std::str::FromStr;

use serde::Deserialize;
use serde_json::Value;

use crate::config::{Config, OAuthClient};
use crate::error::{AppError, AppResult};
use crate::infrastructure::ensure_success;
use crate::utils::{is_valid_email, normalize_email};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OAuthProvider {
    GitHub,
    Google,
    LinuxDo,
}

struct Endpoints {
    authorize: &'static str,
    token: &'static str,
    user: &'static str,
    scope: &'static str,
}

impl OAuthProvider {
    pub const ALL: [OAuthProvider; 3] = [OAuthProvider::GitHub, OAuthProvider::Google, OAuthProvider::LinuxDo];

    pub fn as_str(&self) -> &'static str {
        match self {
            OAuthProvider::GitHub => "github",
            OAuthProvider::Google => "google",
            OAuthProvider::LinuxDo => "linuxdo",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            OAuthProvider::GitHub => "GitHub 登录",
            OAuthProvider::Google => "Google 登录",
            OAuthProvider::LinuxDo => "LinuxDo 登录",
        }
    }

    fn endpoints(&self) -> Endpoints {
        match self {
            OAuthProvider::GitHub => Endpoints {
                authorize: "https://github.com/login/oauth/authorize",
                token: "https://github.com/login/oauth/access_token",
                user: "https://api.github.com/user",
                scope: "read:user user:email",
            },
            OAuthProvider::Google => Endpoints {
                authorize: "https://accounts.google.com/o/oauth2/v2/auth",
                token: "https://oauth2.googleapis.com/token",
                user: "https://openidconnect.googleapis.com/v1/userinfo",
                scope: "openid email",
            },
            OAuthProvider::LinuxDo => Endpoints {
                authorize: "https://connect.linux.do/oauth2/authorize",
                token: "https://connect.linux.do/oauth2/token",
                user: "https://connect.linux.do/api/user",
                scope: "user",
            },
        }
    }

    pub fn client<'a>(&self, config: &'a Config) -> Option<&'a OAuthClient> {
        match self {
            OAuthProvider::GitHub => config.github.as_ref(),
            OAuthProvider::Google => config.google.as_ref(),
            OAuthProvider::LinuxDo => config.linuxdo.as_ref(),
        }
    }
}

impl fmt::Display for OAuthProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OAuthProvider {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "github" => Ok(OAuthProvider::GitHub),
            "google" => Ok(OAuthProvider::Google),
            "linuxdo" | "linux.do" => Ok(OAuthProvider::LinuxDo),
            _ => Err(AppError::NotFound(format!("不支持的登录方式: {s}"))),
        }
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
    error: Option<String>,
    error_description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GitHubEmail {
    email: String,
    #[serde(default)]
    primary: bool,
    #[serde(default)]
    verified: bool,
}

pub fn authorize_url(provider: OAuthProvider, client: &OAuthClient, state: &str) -> AppResult<reqwest::Url> {
    let endpoints = provider.endpoints();
    reqwest::Url::parse_with_params(
        endpoints.authorize,
        &[
            ("client_id", client.client_id.as_str()),
            ("redirect_uri", client.redirect_uri.as_str()),
            ("response_type", "code"),
            ("scope", endpoints.scope),
            ("state", state),
        ],
    )
    .map_err(|e| AppError::Internal(format!("invalid authorize url: {e}")))
}

/// 用授权码换取 access token
pub async fn exchange_code(
    http: &reqwest::Client,
    provider: OAuthProvider,
    client: &OAuthClient,
    code: &str,
) -> AppResult<String> {
    let response = http
        .post(provider.endpoints().token)
        .header(reqwest::header::ACCEPT, "application/json")
        .form(&[
            ("client_id", client.client_id.as_str()),
            ("client_secret", client.client_secret.as_str()),
            ("code", code),
            ("redirect_uri", client.redirect_uri.as_str()),
            ("grant_type", "authorization_code"),
        ])
        .send()
        .await
        .map_err(|e| AppError::Upstream(format!("{provider} token request failed: {e}")))?;
    let response = ensure_success(provider.as_str(), response).await?;
    let body: TokenResponse = response
        .json()
        .await
        .map_err(|e| AppError::Upstream(format!("{provider} token response invalid: {e}")))?;
    access_token_from(provider, body)
}

fn access_token_from(provider: OAuthProvider, body: TokenResponse) -> AppResult<String> {
    match body.access_token.filter(|t| !t.is_empty()) {
        Some(token) => Ok(token),
        None => Err(AppError::Upstream(format!(
            "{provider} returned no access token: {} {}",
            body.error.unwrap_or_default(),
            body.error_description.unwrap_or_default()
        ))),
    }
}

async fn get_json(http: &reqwest::Client, provider: OAuthProvider, url: &str, token: &str) -> AppResult<Value> {
    let response = http
        .get(url)
        .bearer_auth(token)
        .header(reqwest::header::ACCEPT, "application/json")
        .send()
        .await
        .map_err(|e| AppError::Upstream(format!("{provider} profile request failed: {e}")))?;
    let response = ensure_success(provider.as_str(), response).await?;
    response
        .json()
        .await
        .map_err(|e| AppError::Upstream(format!("{provider} profile invalid: {e}")))
}

/// 获取用户邮箱，作为本地账号标识
pub async fn fetch_email(http: &reqwest::Client, provider: OAuthProvider, token: &str) -> AppResult<String> {
    let profile = get_json(http, provider, provider.endpoints().user, token).await?;
    if let Some(email) = email_from_profile(provider, &profile)? {
        return Ok(email);
    }

    // GitHub 隐藏邮箱时需要单独查询
    if provider == OAuthProvider::GitHub {
        let emails = get_json(http, provider, "https://api.github.com/user/emails", token).await?;
        let emails: Vec<GitHubEmail> = serde_json::from_value(emails)
            .map_err(|e| AppError::Upstream(format!("github emails invalid: {e}")))?;
        if let Some(email) = primary_github_email(&emails) {
            return Ok(email);
        }
    }

    Err(AppError::AuthFailed(format!("{} 账号没有可用的邮箱", provider.as_str())))
}

pub fn email_from_profile(provider: OAuthProvider, profile: &Value) -> AppResult<Option<String>> {
    let email = profile
        .get("email")
        .and_then(Value::as_str)
        .map(normalize_email)
        .filter(|e| is_valid_email(e));

    match provider {
        OAuthProvider::GitHub => Ok(email),
        OAuthProvider::Google => {
            let verified = profile
                .get("email_verified")
                .map(|v| v.as_bool().unwrap_or_else(|| v.as_str() == Some("true")))
                .unwrap_or(false);
            if email.is_some() && !verified {
                return Err(AppError::AuthFailed("Google 邮箱未验证".into()));
            }
            Ok(email)
        }
        OAuthProvider::LinuxDo => {
            if email.is_some() {
                return Ok(email);
            }
            let username = profile
                .get("username")
                .and_then(Value::as_str)
                .map(str::trim)
                .filter(|u| !u.is_empty());
            Ok(username
                .map(|u| normalize_email(&format!("{u}@linux.do")))
                .filter(|e| is_valid_email(e)))
        }
    }
}

fn primary_github_email(emails: &[GitHubEmail]) -> Option<String> {
    emails
        .iter()
        .find(|e| e.primary && e.verified)
        .or_else(|| emails.iter().find(|e| e.verified))
        .map(|e| normalize_email(&e.email))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn client() -> OAuthClient {
        OAuthClient {
            client_id: "cid".into(),
            client_secret: "secret".into(),
            redirect_uri: "https://img.example.com/api/oauth/github/callback".into(),
        }
    }

    #[test]
    fn provider_names_round_trip() {
        for provider in OAuthProvider::ALL {
            assert_eq!(provider.as_str().parse::<OAuthProvider>().unwrap(), provider);
        }
        assert_eq!("GitHub".parse::<OAuthProvider>().unwrap(), OAuthProvider::GitHub);
        assert!("gitlab".parse::<OAuthProvider>().is_err());
    }

    #[test]
    fn authorize_url_carries_state_and_redirect() {
        let url = authorize_url(OAuthProvider::GitHub, &client(), "abc123").unwrap();
        assert!(url.as_str().starts_with("https://github.com/login/oauth/authorize?"));
        let query: std::collections::HashMap<_, _> = url.query_pairs().into_owned().collect();
        assert_eq!(query["client_id"], "cid");
        assert_eq!(query["state"], "abc123");
        assert_eq!(query["response_type"], "code");
        assert_eq!(
            query["redirect_uri"],
            "https://img.example.com/api/oauth/github/callback"
        );
        assert!(!query.contains_key("client_secret"));
    }

    #[test]
    fn missing_access_token_is_an_error() {
        let body = TokenResponse {
            access_token: None,
            error: Some("bad_verification_code".into()),
            error_description: None,
        };
        let err = access_token_from(OAuthProvider::GitHub, body).unwrap_err();
        assert!(err.to_string().contains("bad_verification_code"));
    }

    #[test]
    fn github_profile_email() {
        let email = email_from_profile(OAuthProvider::GitHub, &json!({"email": "Octo@GitHub.com"})).unwrap();
        assert_eq!(email.as_deref(), Some("octo@github.com"));
        let email = email_from_profile(OAuthProvider::GitHub, &json!({"email": null})).unwrap();
        assert_eq!(email, None);
    }

    #[test]
    fn github_primary_verified_email_is_preferred() {
        let emails = vec![
            GitHubEmail { email: "a@x.com".into(), primary: false, verified: true },
            GitHubEmail { email: "b@x.com".into(), primary: true, verified: true },
        ];
        assert_eq!(primary_github_email(&emails).as_deref(), Some("b@x.com"));

        let emails = vec![
            GitHubEmail { email: "a@x.com".into(), primary: true, verified: false },
            GitHubEmail { email: "c@x.com".into(), primary: false, verified: true },
        ];
        assert_eq!(primary_github_email(&emails).as_deref(), Some("c@x.com"));
        assert_eq!(primary_github_email(&[]), None);
    }

    #[test]
    fn google_requires_verified_email() {
        let ok = email_from_profile(
            OAuthProvider::Google,
            &json!({"email": "g@gmail.com", "email_verified": true}),
        )
        .unwrap();
        assert_eq!(ok.as_deref(), Some("g@gmail.com"));

        let ok = email_from_profile(
            OAuthProvider::Google,
            &json!({"email": "g@gmail.com", "email_verified": "true"}),
        )
        .unwrap();
        assert!(ok.is_some());

        let err = email_from_profile(
            OAuthProvider::Google,
            &json!({"email": "g@gmail.com", "email_verified": false}),
        );
        assert!(matches!(err, Err(AppError::AuthFailed(_))));
    }

    #[test]
    fn linuxdo_falls_back_to_username() {
        let email = email_from_profile(OAuthProvider::LinuxDo, &json!({"id": 1, "username": "Neo"})).unwrap();
        assert_eq!(email.as_deref(), Some("neo@linux.do"));

        let email = email_from_profile(
            OAuthProvider::LinuxDo,
            &json!({"username": "neo", "email": "neo@example.com"}),
        )
        .unwrap();
        assert_eq!(email.as_deref(), Some("neo@example.com"));

        let email = email_from_profile(OAuthProvider::LinuxDo, &json!({"id": 1})).unwrap();
        assert_eq!(email, None);
    }
}
