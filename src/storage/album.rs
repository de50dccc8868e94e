use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex as StdMutex};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use tokio::fs;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::utils::{is_lower_hex, sha256_hex};

const META_FILE: &str = "p.json";
const LIST_FILE: &str = "ls.json";

pub const MAX_ALBUM_NAME_CHARS: usize = 64;
pub const MAX_DESCRIPTION_CHARS: usize = 500;
pub const MAX_REMARK_CHARS: usize = 500;
pub const MAX_TAGS: usize = 16;
pub const MAX_TAG_CHARS: usize = 32;
pub const MAX_PHOTOS_PER_REQUEST: usize = 100;
/// 单张照片登记的大小上限（1 GiB）
pub const MAX_PHOTO_BYTES: u64 = 1 << 30;
const MAX_URL_LEN: usize = 2048;

/// 相册元数据（p.json）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlbumMeta {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub cover: Option<String>,
    #[serde(default)]
    pub photo_count: usize,
    #[serde(default)]
    pub total_size: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// 照片记录（ls.json 中的一项）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhotoRecord {
    pub id: String,
    pub url: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub size: u64,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub remark: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewPhoto {
    pub url: String,
    pub name: Option<String>,
    pub size: Option<u64>,
    pub tags: Option<Vec<String>>,
    pub remark: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AlbumUpdate {
    pub name: Option<String>,
    pub description: Option<String>,
    /// 封面照片 ID
    pub cover: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PhotoUpdate {
    pub name: Option<String>,
    pub tags: Option<Vec<String>>,
    pub remark: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AlbumStats {
    pub users: usize,
    pub albums: usize,
    pub photos: usize,
    pub total_size: u64,
}

/// 基于 JSON 文件的相册存储
///
/// 每次修改都整体重写 ls.json 与 p.json（先写临时文件再 rename），
/// 同一相册的修改通过进程内锁串行执行。
pub struct AlbumStore {
    root: PathBuf,
    locks: StdMutex<HashMap<PathBuf, Arc<Mutex<()>>>>,
}

impl AlbumStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            locks: StdMutex::new(HashMap::new()),
        }
    }

    /// 用户目录名为邮箱的 sha256
    pub fn user_dir(&self, email: &str) -> PathBuf {
        self.root.join(sha256_hex(email))
    }

    fn album_dir(&self, email: &str, album_id: &str) -> AppResult<PathBuf> {
        if !is_valid_id(album_id) {
            return Err(AppError::Validation("相册 ID 无效".into()));
        }
        Ok(self.user_dir(email).join(album_id))
    }

    /// 只为已存在的相册分配锁，不存在的 ID 不会留下条目
    async fn lock_for(&self, dir: &Path) -> AppResult<Arc<Mutex<()>>> {
        let existing = {
            let locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
            locks.get(dir).cloned()
        };
        if let Some(lock) = existing {
            return Ok(lock);
        }

        if !fs::try_exists(dir.join(META_FILE)).await? {
            return Err(AppError::NotFound("相册不存在".into()));
        }
        let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        Ok(locks
            .entry(dir.to_path_buf())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone())
    }

    #[cfg(test)]
    fn lock_count(&self) -> usize {
        self.locks.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    fn forget_lock(&self, dir: &Path) {
        let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        locks.remove(dir);
    }

    pub async fn list(&self, email: &str) -> AppResult<Vec<AlbumMeta>> {
        let user_dir = self.user_dir(email);
        let mut entries = match fs::read_dir(&user_dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut albums = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            if !is_valid_id(name) || !entry.file_type().await?.is_dir() {
                continue;
            }
            match read_json::<AlbumMeta>(&entry.path().join(META_FILE)).await {
                Ok(Some(meta)) => albums.push(meta),
                Ok(None) => {}
                Err(e) => tracing::warn!("Skipping unreadable album {}: {}", name, e),
            }
        }

        albums.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(albums)
    }

    pub async fn create(
        &self,
        email: &str,
        name: &str,
        description: Option<&str>,
    ) -> AppResult<AlbumMeta> {
        let name = validate_album_name(name)?;
        let description = validate_description(description.unwrap_or_default())?;

        let id = Uuid::new_v4().simple().to_string();
        let dir = self.album_dir(email, &id)?;
        fs::create_dir_all(&dir).await?;

        let now = Utc::now();
        let meta = AlbumMeta {
            id,
            name,
            description,
            cover: None,
            photo_count: 0,
            total_size: 0,
            created_at: now,
            updated_at: now,
        };

        write_json(&dir.join(LIST_FILE), &Vec::<PhotoRecord>::new()).await?;
        write_json(&dir.join(META_FILE), &meta).await?;
        Ok(meta)
    }

    pub async fn get(&self, email: &str, album_id: &str) -> AppResult<(AlbumMeta, Vec<PhotoRecord>)> {
        let dir = self.album_dir(email, album_id)?;
        load_album(&dir).await
    }

    pub async fn update(&self, email: &str, album_id: &str, update: AlbumUpdate) -> AppResult<AlbumMeta> {
        let dir = self.album_dir(email, album_id)?;
        let lock = self.lock_for(&dir).await?;
        let _guard = lock.lock().await;

        let (mut meta, photos) = load_album(&dir).await?;
        if let Some(name) = update.name {
            meta.name = validate_album_name(&name)?;
        }
        if let Some(description) = update.description {
            meta.description = validate_description(&description)?;
        }
        if let Some(cover) = update.cover {
            let photo = photos
                .iter()
                .find(|p| p.id == cover)
                .ok_or_else(|| AppError::NotFound("封面照片不存在".into()))?;
            meta.cover = Some(photo.url.clone());
        }

        save_album(&dir, &mut meta, &photos).await?;
        Ok(meta)
    }

    pub async fn delete(&self, email: &str, album_id: &str) -> AppResult<()> {
        let dir = self.album_dir(email, album_id)?;
        let lock = self.lock_for(&dir).await?;
        {
            let _guard = lock.lock().await;
            // 等锁期间可能已被删除
            if !fs::try_exists(dir.join(META_FILE)).await? {
                return Err(AppError::NotFound("相册不存在".into()));
            }
            fs::remove_dir_all(&dir).await?;
        }
        self.forget_lock(&dir);
        Ok(())
    }

    pub async fn add_photos(
        &self,
        email: &str,
        album_id: &str,
        new_photos: Vec<NewPhoto>,
    ) -> AppResult<Vec<PhotoRecord>> {
        if new_photos.is_empty() {
            return Err(AppError::Validation("没有要添加的照片".into()));
        }
        if new_photos.len() > MAX_PHOTOS_PER_REQUEST {
            return Err(AppError::Validation(format!(
                "每次最多添加 {} 张照片",
                MAX_PHOTOS_PER_REQUEST
            )));
        }

        let now = Utc::now();
        let mut added = Vec::with_capacity(new_photos.len());
        for photo in new_photos {
            let url = validate_url(&photo.url)?;
            let size = photo.size.unwrap_or(0);
            if size > MAX_PHOTO_BYTES {
                return Err(AppError::Validation(format!(
                    "单张照片大小不能超过{}MB",
                    MAX_PHOTO_BYTES / (1024 * 1024)
                )));
            }
            let name = match photo.name.map(|n| n.trim().to_string()) {
                Some(n) if !n.is_empty() => n,
                _ => name_from_url(&url),
            };
            added.push(PhotoRecord {
                id: Uuid::new_v4().simple().to_string(),
                url,
                name,
                size,
                tags: normalize_tags(photo.tags.unwrap_or_default())?,
                remark: validate_remark(photo.remark.as_deref().unwrap_or_default())?,
                created_at: now,
            });
        }

        let dir = self.album_dir(email, album_id)?;
        let lock = self.lock_for(&dir).await?;
        let _guard = lock.lock().await;

        let (mut meta, mut photos) = load_album(&dir).await?;
        photos.extend(added.iter().cloned());
        if meta.cover.is_none() {
            meta.cover = photos.first().map(|p| p.url.clone());
        }
        save_album(&dir, &mut meta, &photos).await?;
        Ok(added)
    }

    pub async fn update_photo(
        &self,
        email: &str,
        album_id: &str,
        photo_id: &str,
        update: PhotoUpdate,
    ) -> AppResult<PhotoRecord> {
        if !is_valid_id(photo_id) {
            return Err(AppError::Validation("照片 ID 无效".into()));
        }
        let dir = self.album_dir(email, album_id)?;
        let lock = self.lock_for(&dir).await?;
        let _guard = lock.lock().await;

        let (mut meta, mut photos) = load_album(&dir).await?;
        let photo = photos
            .iter_mut()
            .find(|p| p.id == photo_id)
            .ok_or_else(|| AppError::NotFound("照片不存在".into()))?;

        if let Some(name) = update.name {
            let name = name.trim();
            if !name.is_empty() {
                photo.name = name.to_string();
            }
        }
        if let Some(tags) = update.tags {
            photo.tags = normalize_tags(tags)?;
        }
        if let Some(remark) = update.remark {
            photo.remark = validate_remark(&remark)?;
        }
        let updated = photo.clone();

        save_album(&dir, &mut meta, &photos).await?;
        Ok(updated)
    }

    pub async fn delete_photo(&self, email: &str, album_id: &str, photo_id: &str) -> AppResult<AlbumMeta> {
        if !is_valid_id(photo_id) {
            return Err(AppError::Validation("照片 ID 无效".into()));
        }
        let dir = self.album_dir(email, album_id)?;
        let lock = self.lock_for(&dir).await?;
        let _guard = lock.lock().await;

        let (mut meta, mut photos) = load_album(&dir).await?;
        let index = photos
            .iter()
            .position(|p| p.id == photo_id)
            .ok_or_else(|| AppError::NotFound("照片不存在".into()))?;
        let removed = photos.remove(index);

        if meta.cover.as_deref() == Some(removed.url.as_str())
            && !photos.iter().any(|p| p.url == removed.url)
        {
            meta.cover = photos.first().map(|p| p.url.clone());
        }
        save_album(&dir, &mut meta, &photos).await?;
        Ok(meta)
    }

    /// 删除用户的全部相册
    pub async fn delete_user(&self, email: &str) -> AppResult<()> {
        match fs::remove_dir_all(self.user_dir(email)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// 遍历所有用户目录统计相册数据
    pub async fn stats(&self) -> AppResult<AlbumStats> {
        let mut stats = AlbumStats::default();
        let mut users = match fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(stats),
            Err(e) => return Err(e.into()),
        };

        while let Some(user) = users.next_entry().await? {
            if !user.file_type().await?.is_dir() {
                continue;
            }
            stats.users += 1;
            let mut albums = fs::read_dir(user.path()).await?;
            while let Some(album) = albums.next_entry().await? {
                match read_json::<AlbumMeta>(&album.path().join(META_FILE)).await {
                    Ok(Some(meta)) => {
                        stats.albums += 1;
                        stats.photos = stats.photos.saturating_add(meta.photo_count);
                        stats.total_size = stats.total_size.saturating_add(meta.total_size);
                    }
                    Ok(None) => {}
                    Err(e) => tracing::warn!("Skipping album {}: {}", album.path().display(), e),
                }
            }
        }
        Ok(stats)
    }
}

async fn load_album(dir: &Path) -> AppResult<(AlbumMeta, Vec<PhotoRecord>)> {
    let meta = read_json::<AlbumMeta>(&dir.join(META_FILE))
        .await?
        .ok_or_else(|| AppError::NotFound("相册不存在".into()))?;
    let photos = read_json::<Vec<PhotoRecord>>(&dir.join(LIST_FILE))
        .await?
        .unwrap_or_default();
    Ok((meta, photos))
}

/// 重新计算计数后整体写回两个文件
async fn save_album(dir: &Path, meta: &mut AlbumMeta, photos: &[PhotoRecord]) -> AppResult<()> {
    meta.photo_count = photos.len();
    meta.total_size = photos
        .iter()
        .try_fold(0u64, |acc, p| acc.checked_add(p.size))
        .ok_or_else(|| AppError::Validation("照片总大小超出范围".into()))?;
    meta.updated_at = Utc::now();

    write_json(&dir.join(LIST_FILE), &photos).await?;
    write_json(&dir.join(META_FILE), &*meta).await?;
    Ok(())
}

async fn read_json<T: DeserializeOwned>(path: &Path) -> AppResult<Option<T>> {
    match fs::read(path).await {
        Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

async fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> AppResult<()> {
    let bytes = serde_json::to_vec_pretty(value)?;
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, bytes).await?;
    fs::rename(&tmp, path).await?;
    Ok(())
}

/// 相册与照片 ID 都是 32 位十六进制
pub fn is_valid_id(id: &str) -> bool {
    id.len() == 32 && is_lower_hex(id)
}

fn validate_album_name(name: &str) -> AppResult<String> {
    let name = name.trim();
    let len = name.chars().count();
    if len == 0 || len > MAX_ALBUM_NAME_CHARS {
        return Err(AppError::Validation(format!(
            "相册名称长度必须在1到{}个字符之间",
            MAX_ALBUM_NAME_CHARS
        )));
    }
    Ok(name.to_string())
}

fn validate_description(description: &str) -> AppResult<String> {
    let description = description.trim();
    if description.chars().count() > MAX_DESCRIPTION_CHARS {
        return Err(AppError::Validation(format!(
            "相册描述不能超过{}个字符",
            MAX_DESCRIPTION_CHARS
        )));
    }
    Ok(description.to_string())
}

fn validate_remark(remark: &str) -> AppResult<String> {
    let remark = remark.trim();
    if remark.chars().count() > MAX_REMARK_CHARS {
        return Err(AppError::Validation(format!(
            "备注不能超过{}个字符",
            MAX_REMARK_CHARS
        )));
    }
    Ok(remark.to_string())
}

fn validate_url(url: &str) -> AppResult<String> {
    let url = url.trim();
    if url.len() > MAX_URL_LEN || !(url.starts_with("http://") || url.starts_with("https://")) {
        return Err(AppError::Validation("图片地址必须是 http(s) 链接".into()));
    }
    Ok(url.to_string())
}

/// 去空白、去重、丢弃空标签
pub fn normalize_tags(tags: Vec<String>) -> AppResult<Vec<String>> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for tag in tags {
        let tag = tag.trim().to_string();
        if tag.is_empty() || !seen.insert(tag.clone()) {
            continue;
        }
        if tag.chars().count() > MAX_TAG_CHARS {
            return Err(AppError::Validation(format!(
                "标签不能超过{}个字符",
                MAX_TAG_CHARS
            )));
        }
        out.push(tag);
    }
    if out.len() > MAX_TAGS {
        return Err(AppError::Validation(format!("每张照片最多{}个标签", MAX_TAGS)));
    }
    Ok(out)
}

fn name_from_url(url: &str) -> String {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    path.rsplit('/')
        .find(|s| !s.is_empty() && !s.contains(':'))
        .unwrap_or("image")
        .to_string()
}
