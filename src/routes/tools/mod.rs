mod handler;

pub use handler::{qrcode, translate, tts};
