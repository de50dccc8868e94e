use std::sync::Arc;

use config::Config;
use event_log::EventLog;
use infrastructure::{chat::ChatClient, mail::MailClient, speech::SpeechClient};
use redis::Client as RedisClient;
use sqlx::MySqlPool;
use storage::AlbumStore;

pub mod cache;
pub mod common;
pub mod config;
pub mod error;
pub mod event_log;
pub mod infrastructure;
pub mod middleware;
pub mod routes;
pub mod storage;
pub mod utils;

#[derive(Clone)]
pub struct AppState {
    pub pool: MySqlPool,
    pub config: Arc<Config>,
    pub redis: Arc<RedisClient>,
    pub http: reqwest::Client,
    pub albums: Arc<AlbumStore>,
    pub events: Arc<EventLog>,
    pub mail: Option<MailClient>,
    pub chat: Option<ChatClient>,
    pub speech: Option<SpeechClient>,
}

impl AppState {
    pub fn new(pool: MySqlPool, redis: RedisClient, config: Config) -> Self {
        let http = infrastructure::build_http_client(config.http_timeout());
        Self {
            pool,
            redis: Arc::new(redis),
            albums: Arc::new(AlbumStore::new(config.users_dir())),
            events: Arc::new(EventLog::new(config.log_file.clone())),
            mail: MailClient::from_config(http.clone(), &config),
            chat: ChatClient::from_config(http.clone(), &config),
            speech: SpeechClient::from_config(http.clone(), &config),
            http,
            config: Arc::new(config),
        }
    }
}
