use serde::{Deserialize, Serialize};

use crate::storage::{AlbumMeta, NewPhoto, PhotoRecord};

#[derive(Debug, Deserialize)]
pub struct CreateAlbumRequest {
    pub name: String,
    pub description: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct AddPhotosRequest {
    pub photos: Vec<NewPhoto>,
}

#[derive(Debug, Deserialize)]
pub struct PhotosQuery {
    pub tag: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct AlbumDetail {
    pub album: AlbumMeta,
    pub photos: Vec<PhotoRecord>,
}

impl AlbumDetail {
    /// 按标签过滤照片，空标签视为不过滤
    pub fn filtered(album: AlbumMeta, photos: Vec<PhotoRecord>, tag: Option<&str>) -> Self {
        let photos = match tag.map(str::trim).filter(|t| !t.is_empty()) {
            Some(tag) => photos
                .into_iter()
                .filter(|p| p.tags.iter().any(|t| t == tag))
                .collect(),
            None => photos,
        };
        Self { album, photos }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn photo(id: &str, tags: &[&str]) -> PhotoRecord {
        PhotoRecord {
            id: id.into(),
            url: format!("https://x.example.com/{id}.png"),
            name: format!("{id}.png"),
            size: 1,
            tags: tags.iter().map(|t| t.to_string()).collect(),
            remark: String::new(),
            created_at: Utc::now(),
        }
    }

    fn album() -> AlbumMeta {
        let now = Utc::now();
        AlbumMeta {
            id: "0".repeat(32),
            name: "a".into(),
            description: String::new(),
            cover: None,
            photo_count: 3,
            total_size: 3,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn tag_filter() {
        let photos = vec![photo("a", &["cat"]), photo("b", &["dog"]), photo("c", &["cat", "dog"])];

        let detail = AlbumDetail::filtered(album(), photos.clone(), Some(" cat "));
        let ids: Vec<_> = detail.photos.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "c"]);

        let detail = AlbumDetail::filtered(album(), photos.clone(), Some(""));
        assert_eq!(detail.photos.len(), 3);

        let detail = AlbumDetail::filtered(album(), photos, None);
        assert_eq!(detail.photos.len(), 3);
        // 过滤不影响相册计数
        assert_eq!(detail.album.photo_count, 3);
    }
}
