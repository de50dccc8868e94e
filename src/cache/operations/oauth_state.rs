use crate::cache::keys::oauth_state_key;
use redis::{AsyncCommands, Client as RedisClient};
use std::sync::Arc;

/// OAuth state 有效期
pub const OAUTH_STATE_TTL_SECS: u64 = 600;

/// OAuth state 缓存操作
pub struct OAuthStateCacheOperations;

impl OAuthStateCacheOperations {
    /// 保存 state，值为发起登录的提供方
    pub async fn store_state(
        redis: &Arc<RedisClient>,
        state: &str,
        provider: &str,
    ) -> Result<(), redis::RedisError> {
        let mut conn = redis.get_multiplexed_async_connection().await?;
        let _: () = conn
            .set_ex(oauth_state_key(state), provider, OAUTH_STATE_TTL_SECS)
            .await?;
        Ok(())
    }

    /// 取出并删除 state，只能使用一次
    pub async fn take_state(
        redis: &Arc<RedisClient>,
        state: &str,
    ) -> Result<Option<String>, redis::RedisError> {
        let mut conn = redis.get_multiplexed_async_connection().await?;
        let provider: Option<String> = redis::cmd("GETDEL")
            .arg(oauth_state_key(state))
            .query_async(&mut conn)
            .await?;
        Ok(provider)
    }
}
