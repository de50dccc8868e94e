// 文件存储模块
// 每个相册一个目录：p.json 保存元数据，ls.json 保存照片列表

pub mod album;

pub use album::{AlbumMeta, AlbumStats, AlbumStore, AlbumUpdate, NewPhoto, PhotoRecord, PhotoUpdate};
