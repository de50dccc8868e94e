mod admin;
mod auth;
mod error_handler;
mod rate_limit;

pub use admin::admin_middleware;
pub use auth::{CurrentUser, auth_middleware, extract_bearer, extract_session_token, resolve_session};
pub use error_handler::log_errors;
pub use rate_limit::{RateLimiter, client_ip, rate_limit};
