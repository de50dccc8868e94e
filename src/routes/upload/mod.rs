mod handler;

pub use handler::{hosts, upload};
