use crate::cache::keys::send_code_cooldown_key;
use redis::Client as RedisClient;
use std::sync::Arc;

/// 验证码发送冷却
pub struct CooldownCacheOperations;

impl CooldownCacheOperations {
    /// 尝试占用冷却窗口，已在冷却中返回剩余秒数
    pub async fn try_acquire(
        redis: &Arc<RedisClient>,
        email: &str,
        cooldown_secs: u64,
    ) -> Result<Result<(), u64>, redis::RedisError> {
        if cooldown_secs == 0 {
            return Ok(Ok(()));
        }
        let mut conn = redis.get_multiplexed_async_connection().await?;
        let key = send_code_cooldown_key(email);

        // SET key 1 NX EX <secs>
        let acquired: Option<String> = redis::cmd("SET")
            .arg(&key)
            .arg(1)
            .arg("NX")
            .arg("EX")
            .arg(cooldown_secs)
            .query_async(&mut conn)
            .await?;

        if acquired.is_some() {
            return Ok(Ok(()));
        }

        let ttl: i64 = redis::cmd("TTL").arg(&key).query_async(&mut conn).await?;
        Ok(Err(ttl.max(1) as u64))
    }

    /// 发送失败时释放冷却，允许立即重试
    pub async fn release(redis: &Arc<RedisClient>, email: &str) -> Result<(), redis::RedisError> {
        let mut conn = redis.get_multiplexed_async_connection().await?;
        let _: () = redis::cmd("DEL")
            .arg(send_code_cooldown_key(email))
            .query_async(&mut conn)
            .await?;
        Ok(())
    }
}
