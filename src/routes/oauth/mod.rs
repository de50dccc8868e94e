mod handler;

pub use handler::{callback, login, providers};
