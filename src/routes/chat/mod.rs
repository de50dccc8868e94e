mod handler;

pub use handler::chat;
