mod handler;
mod model;

pub use handler::{delete_user, login, logs, revoke_token, stats, users};
