use axum::Json;
use bcrypt::verify;
use chrono::Utc;
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use rand::Rng;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::common::ApiResponse;
use crate::config::Config;

/// 会话令牌长度（十六进制字符）
pub const TOKEN_LEN: usize = 64;

pub fn verify_password(password: &str, hash: &str) -> Result<bool, bcrypt::BcryptError> {
    verify(password.as_bytes(), hash)
}

/// 管理后台 JWT 声明
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdminClaims {
    pub sub: String,
    pub exp: i64,
    pub iat: i64,
    pub role: String,
}

pub const ADMIN_ROLE: &str = "admin";

pub fn generate_admin_token(
    username: &str,
    config: &Config,
) -> Result<(String, i64), jsonwebtoken::errors::Error> {
    let now = Utc::now().timestamp();
    let expiration = now + config.admin_jwt_expiration_secs as i64;

    let claims = AdminClaims {
        sub: username.to_string(),
        exp: expiration,
        iat: now,
        role: ADMIN_ROLE.to_string(),
    };

    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(config.admin_jwt_secret.as_bytes()),
    )?;

    Ok((token, expiration))
}

pub fn verify_admin_token(
    token: &str,
    config: &Config,
) -> Result<AdminClaims, jsonwebtoken::errors::Error> {
    let token_data = decode::<AdminClaims>(
        token,
        &DecodingKey::from_secret(config.admin_jwt_secret.as_bytes()),
        &Validation::default(),
    )?;

    Ok(token_data.claims)
}

/// 生成 64 位十六进制会话令牌
pub fn generate_session_token() -> String {
    format!(
        "{}{}",
        Uuid::new_v4().simple(),
        Uuid::new_v4().simple()
    )
}

pub fn is_valid_token(token: &str) -> bool {
    token.len() == TOKEN_LEN && is_lower_hex(token)
}

pub fn is_lower_hex(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
}

/// 生成 6 位数字验证码（补零）
pub fn generate_verify_code() -> String {
    let n: u32 = rand::thread_rng().gen_range(0..1_000_000);
    format!("{:06}", n)
}

/// OAuth state 随机串
pub fn generate_state() -> String {
    Uuid::new_v4().simple().to_string()
}

pub fn sha256_hex(input: &str) -> String {
    hex::encode(Sha256::digest(input.as_bytes()))
}

/// 邮箱统一转小写并去除空白
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

pub fn is_valid_email(email: &str) -> bool {
    if email.is_empty() || email.len() > 254 || email.chars().any(char::is_whitespace) {
        return false;
    }
    let Some((local, domain)) = email.rsplit_once('@') else {
        return false;
    };
    !local.is_empty()
        && !local.contains('@')
        && domain.contains('.')
        && !domain.starts_with('.')
        && !domain.ends_with('.')
}

pub fn success_to_api_response<T: Serialize>(data: T) -> Json<ApiResponse<T>> {
    Json(ApiResponse {
        code: error_codes::SUCCESS,
        msg: "success".into(),
        resp_data: Some(data),
    })
}

pub mod error_codes {
    pub const SUCCESS: i32 = 0;
    pub const VALIDATION_ERROR: i32 = 1000;
    pub const AUTH_FAILED: i32 = 1002;
    pub const PERMISSION_DENIED: i32 = 1003;
    pub const NOT_FOUND: i32 = 1004;
    pub const RATE_LIMIT: i32 = 1005;
    pub const CODE_EXPIRED: i32 = 1006;
    pub const TOO_MANY_ATTEMPTS: i32 = 1007;
    pub const NOT_CONFIGURED: i32 = 1008;
    pub const UPSTREAM_FAILED: i32 = 1009;
    pub const INTERNAL_ERROR: i32 = 5000;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::test_config;

    #[test]
    fn session_tokens_are_64_lower_hex() {
        let a = generate_session_token();
        let b = generate_session_token();
        assert!(is_valid_token(&a));
        assert!(is_valid_token(&b));
        assert_ne!(a, b);
    }

    #[test]
    fn token_shape_is_checked() {
        assert!(!is_valid_token(""));
        assert!(!is_valid_token(&"A".repeat(TOKEN_LEN)));
        assert!(!is_valid_token(&"a".repeat(TOKEN_LEN - 1)));
        assert!(!is_valid_token(&format!("{}/", "a".repeat(TOKEN_LEN - 1))));
    }

    #[test]
    fn verify_codes_are_six_digits() {
        for _ in 0..200 {
            let code = generate_verify_code();
            assert_eq!(code.len(), 6);
            assert!(code.bytes().all(|b| b.is_ascii_digit()));
        }
    }

    #[test]
    fn email_validation() {
        assert!(is_valid_email("alice@example.com"));
        assert!(is_valid_email("a.b+tag@mail.example.org"));
        assert!(!is_valid_email("alice"));
        assert!(!is_valid_email("@example.com"));
        assert!(!is_valid_email("alice@localhost"));
        assert!(!is_valid_email("alice@example."));
        assert!(!is_valid_email("al ice@example.com"));
        assert!(!is_valid_email(&format!("{}@example.com", "a".repeat(260))));
        assert_eq!(normalize_email("  Alice@Example.COM "), "alice@example.com");
    }

    #[test]
    fn sha256_hex_is_stable() {
        assert_eq!(
            sha256_hex("abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn admin_token_round_trip_and_wrong_secret() {
        let config = test_config();
        let (token, exp) = generate_admin_token("admin", &config).unwrap();
        let claims = verify_admin_token(&token, &config).unwrap();
        assert_eq!(claims.sub, "admin");
        assert_eq!(claims.role, ADMIN_ROLE);
        assert_eq!(claims.exp, exp);

        let mut other = test_config();
        other.admin_jwt_secret = "another-secret".into();
        assert!(verify_admin_token(&token, &other).is_err());
    }
}
