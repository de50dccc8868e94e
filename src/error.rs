use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

use crate::common::ApiResponse;
use crate::utils::error_codes;

pub type AppResult<T> = Result<T, AppError>;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("{0}")]
    Validation(String),

    #[error("未登录或登录已失效")]
    Unauthorized,

    #[error("{0}")]
    AuthFailed(String),

    #[error("无权访问")]
    PermissionDenied,

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    RateLimited(String),

    #[error("验证码已过期，请重新获取")]
    CodeExpired,

    #[error("验证失败次数过多，请重新获取验证码")]
    TooManyAttempts,

    #[error("{0} 未配置")]
    NotConfigured(&'static str),

    #[error("上游服务错误: {0}")]
    Upstream(String),

    #[error("数据库错误: {0}")]
    Database(#[from] sqlx::Error),

    #[error("缓存错误: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("文件读写错误: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP 请求错误: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON 解析错误: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Internal(String),
}

/// 内部错误的详细信息，由错误日志中间件写入事件日志
#[derive(Debug, Clone)]
pub struct ErrorDetail(pub String);

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthorized | AppError::AuthFailed(_) => StatusCode::UNAUTHORIZED,
            AppError::PermissionDenied => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::RateLimited(_) | AppError::TooManyAttempts => StatusCode::TOO_MANY_REQUESTS,
            AppError::CodeExpired => StatusCode::BAD_REQUEST,
            AppError::NotConfigured(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Upstream(_) | AppError::Http(_) => StatusCode::BAD_GATEWAY,
            AppError::Database(_)
            | AppError::Redis(_)
            | AppError::Io(_)
            | AppError::Json(_)
            | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> i32 {
        match self {
            AppError::Validation(_) => error_codes::VALIDATION_ERROR,
            AppError::Unauthorized | AppError::AuthFailed(_) => error_codes::AUTH_FAILED,
            AppError::PermissionDenied => error_codes::PERMISSION_DENIED,
            AppError::NotFound(_) => error_codes::NOT_FOUND,
            AppError::RateLimited(_) => error_codes::RATE_LIMIT,
            AppError::CodeExpired => error_codes::CODE_EXPIRED,
            AppError::TooManyAttempts => error_codes::TOO_MANY_ATTEMPTS,
            AppError::NotConfigured(_) => error_codes::NOT_CONFIGURED,
            AppError::Upstream(_) | AppError::Http(_) => error_codes::UPSTREAM_FAILED,
            _ => error_codes::INTERNAL_ERROR,
        }
    }

    /// 返回给客户端的信息；内部错误不暴露细节
    pub fn public_message(&self) -> String {
        match self {
            AppError::Upstream(_) | AppError::Http(_) => "上游服务暂时不可用".to_string(),
            AppError::Database(_)
            | AppError::Redis(_)
            | AppError::Io(_)
            | AppError::Json(_)
            | AppError::Internal(_) => "内部服务器错误".to_string(),
            other => other.to_string(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = Json(ApiResponse::<()> {
            code: self.code(),
            msg: self.public_message(),
            resp_data: None,
        });

        let mut response = (status, body).into_response();
        if status.is_server_error() {
            tracing::error!("{}", self);
            response
                .extensions_mut()
                .insert(ErrorDetail(self.to_string()));
        }
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn internal_errors_hide_details() {
        let err = AppError::Internal("disk on fire".into());
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.code(), error_codes::INTERNAL_ERROR);
        assert_eq!(err.public_message(), "内部服务器错误");
    }

    #[test]
    fn client_errors_keep_their_message() {
        let err = AppError::Validation("邮箱格式不正确".into());
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        assert_eq!(err.public_message(), "邮箱格式不正确");

        assert_eq!(AppError::TooManyAttempts.code(), error_codes::TOO_MANY_ATTEMPTS);
        assert_eq!(
            AppError::NotConfigured("GitHub 登录").to_string(),
            "GitHub 登录 未配置"
        );
    }

    #[test]
    fn server_errors_carry_detail_extension() {
        let response = AppError::Upstream("status=500".into()).into_response();
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
        let detail = response.extensions().get::<ErrorDetail>().unwrap();
        assert!(detail.0.contains("status=500"));

        let response = AppError::NotFound("相册不存在".into()).into_response();
        assert!(response.extensions().get::<ErrorDetail>().is_none());
    }
}
