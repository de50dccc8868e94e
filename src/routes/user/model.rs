use std::future::Future;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, MySqlPool, mysql::MySqlQueryResult};

use crate::error::{AppError, AppResult};
use crate::utils::generate_session_token;

/// 令牌冲突时的最大重试次数
const TOKEN_ISSUE_ATTEMPTS: usize = 5;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: i64,
    pub email: String,
    #[serde(skip_serializing)]
    pub token: Option<String>,
    #[serde(skip_serializing)]
    pub verify_code: Option<String>,
    #[serde(skip_serializing)]
    pub verify_code_time: Option<DateTime<Utc>>,
    #[serde(skip_serializing)]
    pub verify_fail_count: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct SendCodeRequest {
    pub email: String,
}

#[derive(Debug, Serialize)]
pub struct SendCodeResponse {
    pub email: String,
    pub expires_in: u64,
    pub resend_after: u64,
}

#[derive(Debug, Deserialize)]
pub struct VerifyCodeRequest {
    pub email: String,
    pub code: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub email: String,
    pub token: String,
}

#[derive(Debug, Serialize)]
pub struct MeResponse {
    pub email: String,
    pub created_at: DateTime<Utc>,
}

/// 验证码校验结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodeCheck {
    Accepted,
    Missing,
    Expired,
    Exhausted,
    Mismatch { remaining: i32 },
}

impl CodeCheck {
    /// 比对结果只有在成功占用一次尝试机会后才生效
    pub fn settle(self, attempt_claimed: bool) -> AppResult<()> {
        match self {
            CodeCheck::Missing => Err(AppError::AuthFailed("请先获取验证码".into())),
            CodeCheck::Expired => Err(AppError::CodeExpired),
            CodeCheck::Exhausted => Err(AppError::TooManyAttempts),
            _ if !attempt_claimed => Err(AppError::TooManyAttempts),
            CodeCheck::Accepted => Ok(()),
            CodeCheck::Mismatch { remaining } => Err(AppError::AuthFailed(format!(
                "验证码错误，还可尝试{}次",
                remaining
            ))),
        }
    }

    /// 需要占用尝试次数的结果
    pub fn needs_attempt(self) -> bool {
        matches!(self, CodeCheck::Accepted | CodeCheck::Mismatch { .. })
    }
}

/// 单次写入令牌的结果
#[derive(Debug)]
pub(crate) enum IssueAttempt {
    Updated(u64),
    Collision,
    Failed(sqlx::Error),
}

impl From<Result<MySqlQueryResult, sqlx::Error>> for IssueAttempt {
    fn from(result: Result<MySqlQueryResult, sqlx::Error>) -> Self {
        match result {
            Ok(done) => IssueAttempt::Updated(done.rows_affected()),
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => IssueAttempt::Collision,
            Err(e) => IssueAttempt::Failed(e),
        }
    }
}

/// 生成令牌并交给 `attempt` 写入，唯一键冲突时换新令牌重试
pub(crate) async fn issue_with_retry<F, Fut>(mut attempt: F) -> Result<String, sqlx::Error>
where
    F: FnMut(String) -> Fut,
    Fut: Future<Output = IssueAttempt>,
{
    for n in 1..=TOKEN_ISSUE_ATTEMPTS {
        let token = generate_session_token();
        match attempt(token.clone()).await {
            IssueAttempt::Updated(0) => return Err(sqlx::Error::RowNotFound),
            IssueAttempt::Updated(_) => return Ok(token),
            IssueAttempt::Collision => {
                tracing::warn!("Token collision on attempt {}, regenerating", n);
            }
            IssueAttempt::Failed(e) => return Err(e),
        }
    }

    Err(sqlx::Error::Protocol(format!(
        "Failed to issue a unique token after {} attempts",
        TOKEN_ISSUE_ATTEMPTS
    )))
}

const USER_COLUMNS: &str =
    "id, email, token, verify_code, verify_code_time, verify_fail_count, created_at, updated_at";

impl User {
    /// 校验验证码，不修改数据库
    pub fn check_code(
        &self,
        code: &str,
        now: DateTime<Utc>,
        ttl: Duration,
        max_failures: i32,
    ) -> CodeCheck {
        let (Some(expected), Some(sent_at)) = (&self.verify_code, self.verify_code_time) else {
            return CodeCheck::Missing;
        };
        if self.verify_fail_count >= max_failures {
            return CodeCheck::Exhausted;
        }
        if now - sent_at > ttl {
            return CodeCheck::Expired;
        }
        if expected != code.trim() {
            // 本次失败也计入次数
            return CodeCheck::Mismatch {
                remaining: (max_failures - self.verify_fail_count - 1).max(0),
            };
        }
        CodeCheck::Accepted
    }

    pub async fn find_by_email(pool: &MySqlPool, email: &str) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, User>(&format!("SELECT {USER_COLUMNS} FROM users WHERE email = ?"))
            .bind(email)
            .fetch_optional(pool)
            .await
    }

    pub async fn find_by_token(pool: &MySqlPool, token: &str) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, User>(&format!("SELECT {USER_COLUMNS} FROM users WHERE token = ?"))
            .bind(token)
            .fetch_optional(pool)
            .await
    }

    /// 不存在则插入，返回最新记录
    pub async fn upsert_email(pool: &MySqlPool, email: &str) -> Result<Self, sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO users (email) VALUES (?)
            ON DUPLICATE KEY UPDATE email = email
            "#,
        )
        .bind(email)
        .execute(pool)
        .await?;

        Self::find_by_email(pool, email)
            .await?
            .ok_or(sqlx::Error::RowNotFound)
    }

    /// 写入新验证码并重置失败次数
    pub async fn store_verify_code(
        pool: &MySqlPool,
        email: &str,
        code: &str,
        now: DateTime<Utc>,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            UPDATE users
            SET verify_code = ?, verify_code_time = ?, verify_fail_count = 0
            WHERE email = ?
            "#,
        )
        .bind(code)
        .bind(now)
        .bind(email)
        .execute(pool)
        .await?;
        Ok(())
    }

    /// 先占用一次尝试机会再比对验证码；次数已用完时返回 false
    ///
    /// 计数在一条 UPDATE 里判断并递增，并发请求最多只能占用 `max_failures` 次。
    pub async fn claim_verify_attempt(
        pool: &MySqlPool,
        email: &str,
        max_failures: i32,
    ) -> Result<bool, sqlx::Error> {
        let done = sqlx::query(
            r#"
            UPDATE users
            SET verify_fail_count = verify_fail_count + 1
            WHERE email = ? AND verify_code IS NOT NULL AND verify_fail_count < ?
            "#,
        )
        .bind(email)
        .bind(max_failures)
        .execute(pool)
        .await?;
        Ok(done.rows_affected() > 0)
    }

    /// 生成新令牌并写入，同时清除验证码和失败计数
    pub async fn issue_token(pool: &MySqlPool, email: &str) -> Result<String, sqlx::Error> {
        issue_with_retry(move |token| async move {
            let result = sqlx::query(
                r#"
                UPDATE users
                SET token = ?, verify_code = NULL, verify_code_time = NULL, verify_fail_count = 0
                WHERE email = ?
                "#,
            )
            .bind(token)
            .bind(email)
            .execute(pool)
            .await;
            IssueAttempt::from(result)
        })
        .await
    }

    pub async fn clear_token(pool: &MySqlPool, token: &str) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE users SET token = NULL WHERE token = ?")
            .bind(token)
            .execute(pool)
            .await?;
        Ok(())
    }

    /// 清除某个用户的令牌，返回被清除的旧令牌
    pub async fn clear_token_for(pool: &MySqlPool, email: &str) -> Result<Option<String>, sqlx::Error> {
        let Some(user) = Self::find_by_email(pool, email).await? else {
            return Err(sqlx::Error::RowNotFound);
        };
        sqlx::query("UPDATE users SET token = NULL WHERE email = ?")
            .bind(email)
            .execute(pool)
            .await?;
        Ok(user.token)
    }

    pub async fn list(pool: &MySqlPool, limit: u32, offset: u64) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users ORDER BY id DESC LIMIT ? OFFSET ?"
        ))
        .bind(limit)
        .bind(offset)
        .fetch_all(pool)
        .await
    }

    pub async fn count(pool: &MySqlPool) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM users")
            .fetch_one(pool)
            .await
    }

    /// 删除用户，返回是否存在
    pub async fn delete(pool: &MySqlPool, email: &str) -> Result<bool, sqlx::Error> {
        let done = sqlx::query("DELETE FROM users WHERE email = ?")
            .bind(email)
            .execute(pool)
            .await?;
        Ok(done.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user_with_code(code: Option<&str>, sent_at: Option<DateTime<Utc>>, failures: i32) -> User {
        let now = Utc::now();
        User {
            id: 1,
            email: "alice@example.com".into(),
            token: None,
            verify_code: code.map(str::to_string),
            verify_code_time: sent_at,
            verify_fail_count: failures,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn matching_code_is_accepted() {
        let now = Utc::now();
        let user = user_with_code(Some("012345"), Some(now - Duration::seconds(30)), 0);
        assert_eq!(
            user.check_code(" 012345 ", now, Duration::seconds(600), 5),
            CodeCheck::Accepted
        );
    }

    #[test]
    fn missing_code_is_reported() {
        let now = Utc::now();
        let user = user_with_code(None, None, 0);
        assert_eq!(user.check_code("000000", now, Duration::seconds(600), 5), CodeCheck::Missing);
        let user = user_with_code(Some("000000"), None, 0);
        assert_eq!(user.check_code("000000", now, Duration::seconds(600), 5), CodeCheck::Missing);
    }

    #[test]
    fn expired_code_is_rejected_even_if_correct() {
        let now = Utc::now();
        let user = user_with_code(Some("111111"), Some(now - Duration::seconds(601)), 0);
        assert_eq!(user.check_code("111111", now, Duration::seconds(600), 5), CodeCheck::Expired);
    }

    #[test]
    fn exhausted_code_is_rejected_even_if_correct() {
        let now = Utc::now();
        let user = user_with_code(Some("111111"), Some(now), 5);
        assert_eq!(user.check_code("111111", now, Duration::seconds(600), 5), CodeCheck::Exhausted);
    }

    #[test]
    fn mismatch_reports_remaining_attempts() {
        let now = Utc::now();
        let user = user_with_code(Some("111111"), Some(now), 0);
        assert_eq!(
            user.check_code("222222", now, Duration::seconds(600), 5),
            CodeCheck::Mismatch { remaining: 4 }
        );
        let user = user_with_code(Some("111111"), Some(now), 4);
        assert_eq!(
            user.check_code("222222", now, Duration::seconds(600), 5),
            CodeCheck::Mismatch { remaining: 0 }
        );
    }

    #[test]
    fn verdict_needs_a_claimed_attempt() {
        assert!(CodeCheck::Accepted.settle(true).is_ok());
        // 并发请求抢不到尝试机会时，即使验证码正确也拒绝
        assert!(matches!(
            CodeCheck::Accepted.settle(false),
            Err(AppError::TooManyAttempts)
        ));
        assert!(matches!(
            CodeCheck::Mismatch { remaining: 3 }.settle(false),
            Err(AppError::TooManyAttempts)
        ));
        let err = CodeCheck::Mismatch { remaining: 3 }.settle(true).unwrap_err();
        assert!(matches!(&err, AppError::AuthFailed(msg) if msg.contains('3')));

        assert!(matches!(CodeCheck::Expired.settle(true), Err(AppError::CodeExpired)));
        assert!(matches!(CodeCheck::Exhausted.settle(true), Err(AppError::TooManyAttempts)));
        assert!(matches!(CodeCheck::Missing.settle(true), Err(AppError::AuthFailed(_))));
    }

    #[test]
    fn only_comparisons_consume_attempts() {
        assert!(CodeCheck::Accepted.needs_attempt());
        assert!(CodeCheck::Mismatch { remaining: 0 }.needs_attempt());
        assert!(!CodeCheck::Missing.needs_attempt());
        assert!(!CodeCheck::Expired.needs_attempt());
        assert!(!CodeCheck::Exhausted.needs_attempt());
    }

    #[tokio::test]
    async fn token_issue_returns_written_token() {
        let mut written = Vec::new();
        let token = issue_with_retry(|t| {
            written.push(t);
            async { IssueAttempt::Updated(1) }
        })
        .await
        .unwrap();
        assert_eq!(written, vec![token.clone()]);
        assert_eq!(token.len(), 64);
    }

    #[tokio::test]
    async fn token_collisions_are_retried_with_fresh_tokens() {
        let mut written = Vec::new();
        let token = issue_with_retry(|t| {
            written.push(t);
            let n = written.len();
            async move {
                if n < 3 {
                    IssueAttempt::Collision
                } else {
                    IssueAttempt::Updated(1)
                }
            }
        })
        .await
        .unwrap();
        assert_eq!(written.len(), 3);
        assert_eq!(written.last(), Some(&token));
        assert_ne!(written[0], written[1]);
        assert_ne!(written[1], written[2]);
    }

    #[tokio::test]
    async fn token_issue_gives_up_after_five_collisions() {
        let mut calls = 0;
        let result = issue_with_retry(|_| {
            calls += 1;
            async { IssueAttempt::Collision }
        })
        .await;
        assert!(matches!(result, Err(sqlx::Error::Protocol(_))));
        assert_eq!(calls, TOKEN_ISSUE_ATTEMPTS);
    }

    #[tokio::test]
    async fn token_issue_for_missing_user_and_db_errors_stop_at_once() {
        let mut calls = 0;
        let result = issue_with_retry(|_| {
            calls += 1;
            async { IssueAttempt::Updated(0) }
        })
        .await;
        assert!(matches!(result, Err(sqlx::Error::RowNotFound)));
        assert_eq!(calls, 1);

        let mut calls = 0;
        let result = issue_with_retry(|_| {
            calls += 1;
            async { IssueAttempt::Failed(sqlx::Error::PoolTimedOut) }
        })
        .await;
        assert!(matches!(result, Err(sqlx::Error::PoolTimedOut)));
        assert_eq!(calls, 1);
    }

    #[test]
    fn secrets_are_not_serialized() {
        let mut user = user_with_code(Some("123456"), Some(Utc::now()), 2);
        user.token = Some("a".repeat(64));
        let json = serde_json::to_value(&user).unwrap();
        assert!(json.get("token").is_none());
        assert!(json.get("verify_code").is_none());
        assert!(json.get("verify_fail_count").is_none());
        assert_eq!(json["email"], "alice@example.com");
    }
}
