use crate::cache::keys::token_key;
use redis::{AsyncCommands, Client as RedisClient};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// 令牌对应的会话信息
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct CachedSession {
    pub email: String,
}

/// 令牌缓存操作
pub struct TokenCacheOperations;

impl TokenCacheOperations {
    /// 缓存令牌
    pub async fn cache_token(
        redis: &Arc<RedisClient>,
        token: &str,
        email: &str,
        ttl_secs: u64,
    ) -> Result<(), redis::RedisError> {
        if ttl_secs == 0 {
            return Ok(());
        }
        let mut conn = redis.get_multiplexed_async_connection().await?;

        let session = CachedSession {
            email: email.to_string(),
        };
        let json = serde_json::to_string(&session).map_err(|e| {
            redis::RedisError::from((redis::ErrorKind::IoError, "序列化错误", e.to_string()))
        })?;

        let _: () = conn.set_ex(token_key(token), json, ttl_secs).await?;
        Ok(())
    }

    /// 获取令牌缓存
    pub async fn get_cached_token(
        redis: &Arc<RedisClient>,
        token: &str,
    ) -> Result<Option<CachedSession>, redis::RedisError> {
        let mut conn = redis.get_multiplexed_async_connection().await?;

        let result: Option<String> = conn.get(token_key(token)).await?;

        match result {
            Some(json) => {
                let session = serde_json::from_str(&json).map_err(|e| {
                    redis::RedisError::from((
                        redis::ErrorKind::IoError,
                        "反序列化错误",
                        e.to_string(),
                    ))
                })?;
                Ok(Some(session))
            }
            None => Ok(None),
        }
    }

    /// 删除令牌缓存
    pub async fn remove_token(
        redis: &Arc<RedisClient>,
        token: &str,
    ) -> Result<(), redis::RedisError> {
        let mut conn = redis.get_multiplexed_async_connection().await?;
        let _: () = conn.del(token_key(token)).await?;
        Ok(())
    }
}
