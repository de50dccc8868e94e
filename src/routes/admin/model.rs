use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::routes::user::User;
use crate::storage::AlbumStats;

#[derive(Debug, Deserialize)]
pub struct AdminLoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct AdminLoginResponse {
    pub token: String,
    pub expires_at: i64,
}

#[derive(Debug, Serialize)]
pub struct StatsResponse {
    pub user_count: i64,
    #[serde(flatten)]
    pub albums: AlbumStats,
}

/// 管理后台展示的用户信息，不含令牌与验证码
#[derive(Debug, Serialize)]
pub struct UserSummary {
    pub id: i64,
    pub email: String,
    pub logged_in: bool,
    pub verify_fail_count: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<User> for UserSummary {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            email: user.email,
            logged_in: user.token.is_some(),
            verify_fail_count: user.verify_fail_count,
            created_at: user.created_at,
            updated_at: user.updated_at,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct EmailRequest {
    pub email: String,
}

#[derive(Debug, Deserialize)]
pub struct LogsQuery {
    pub lines: Option<usize>,
}

impl LogsQuery {
    pub const DEFAULT_LINES: usize = 200;

    pub fn lines(&self) -> usize {
        self.lines.unwrap_or(Self::DEFAULT_LINES).clamp(1, crate::event_log::EventLog::MAX_TAIL)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn summary_hides_secrets() {
        let now = Utc::now();
        let user = User {
            id: 7,
            email: "alice@example.com".into(),
            token: Some("f".repeat(64)),
            verify_code: Some("123456".into()),
            verify_code_time: Some(now),
            verify_fail_count: 2,
            created_at: now,
            updated_at: now,
        };
        let summary = UserSummary::from(user);
        assert!(summary.logged_in);
        let json = serde_json::to_value(&summary).unwrap();
        assert!(json.get("token").is_none());
        assert!(json.get("verify_code").is_none());
        assert_eq!(json["verify_fail_count"], 2);
    }

    #[test]
    fn log_lines_are_clamped() {
        assert_eq!(LogsQuery { lines: None }.lines(), LogsQuery::DEFAULT_LINES);
        assert_eq!(LogsQuery { lines: Some(0) }.lines(), 1);
        assert_eq!(LogsQuery { lines: Some(1_000_000) }.lines(), 1000);
    }
}
