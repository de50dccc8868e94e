mod handler;
mod model;

pub use handler::{logout, me, removal_cookie, send_code, session_cookie, verify_code};
pub(crate) use handler::complete_login;
pub use model::{CodeCheck, User};
