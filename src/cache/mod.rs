// 缓存模块
// 令牌缓存、OAuth state 与验证码发送冷却，全部存放在 Redis

pub mod keys;
pub mod operations;

pub use operations::cooldown::CooldownCacheOperations;
pub use operations::oauth_state::OAuthStateCacheOperations;
pub use operations::token::{CachedSession, TokenCacheOperations};
