use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::{HeaderMap, Request},
    middleware::Next,
    response::{IntoResponse, Response},
};
use redis::AsyncCommands;

use crate::{cache::keys::rate_limit_key, config::Config, error::AppError};

#[derive(Clone)]
pub struct RateLimiter {
    redis: Arc<redis::Client>,
    config: Arc<Config>,
}

/// 取客户端 IP：x-real-ip、x-forwarded-for 第一个非空值、连接地址
pub fn client_ip(headers: &HeaderMap, remote: Option<SocketAddr>) -> String {
    headers
        .get("x-real-ip")
        .and_then(|h| h.to_str().ok())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .or_else(|| {
            headers
                .get("x-forwarded-for")
                .and_then(|h| h.to_str().ok())
                .and_then(|s| s.split(',').map(str::trim).find(|ip| !ip.is_empty()))
                .map(str::to_string)
        })
        .or_else(|| remote.map(|addr| addr.ip().to_string()))
        .unwrap_or_else(|| "unknown".to_string())
}

impl RateLimiter {
    pub fn new(redis: Arc<redis::Client>, config: Arc<Config>) -> Self {
        Self { redis, config }
    }

    /// 计数加一，返回窗口内的请求数
    async fn hit(&self, ip: &str) -> Result<i64, redis::RedisError> {
        let key = rate_limit_key(ip);
        let mut conn = self.redis.get_multiplexed_async_connection().await?;

        // 使用 Redis 的 INCR 和 EXPIRE 命令实现计数器
        let count: i64 = conn.incr(&key, 1).await?;
        if count == 1 {
            let _: () = conn
                .expire(&key, self.config.rate_limit_window().as_secs() as i64)
                .await?;
        }
        Ok(count)
    }

    pub async fn check_rate_limit(self: Arc<Self>, req: Request<Body>, next: Next) -> Response {
        let remote = req
            .extensions()
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ci| ci.0);
        let ip = client_ip(req.headers(), remote);

        match self.hit(&ip).await {
            Ok(count) if count > self.config.rate_limit_requests as i64 => {
                tracing::info!("Rate limit exceeded for {}", ip);
                return AppError::RateLimited(format!(
                    "请求过于频繁，请在{}秒后重试",
                    self.config.rate_limit_window().as_secs()
                ))
                .into_response();
            }
            Ok(_) => {}
            // Redis 不可用时放行
            Err(e) => tracing::warn!("Rate limiter unavailable: {}", e),
        }

        next.run(req).await
    }
}

pub async fn rate_limit(
    State(limiter): State<Arc<RateLimiter>>,
    req: Request<Body>,
    next: Next,
) -> Response {
    limiter.check_rate_limit(req, next).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn client_ip_prefers_headers() {
        let remote: SocketAddr = "10.0.0.9:5000".parse().unwrap();
        let mut headers = HeaderMap::new();
        assert_eq!(client_ip(&headers, Some(remote)), "10.0.0.9");
        assert_eq!(client_ip(&headers, None), "unknown");

        headers.insert("x-forwarded-for", HeaderValue::from_static(" , 1.2.3.4, 5.6.7.8"));
        assert_eq!(client_ip(&headers, Some(remote)), "1.2.3.4");

        headers.insert("x-real-ip", HeaderValue::from_static("9.9.9.9"));
        assert_eq!(client_ip(&headers, Some(remote)), "9.9.9.9");
    }
}
