use anyhow::{anyhow, Result};
use std::path::{Component, Path, PathBuf};

use crate::config::StorageConfig;

/// Object storage for user uploads, kept on local disk under
/// `{root}/{bucket}/` and served back through a public URL.
#[derive(Clone)]
pub struct StorageService {
    root: PathBuf,
    bucket: String,
    public_url: String,
}

impl StorageService {
    pub fn new(config: StorageConfig) -> Self {
        Self {
            root: PathBuf::from(config.root),
            bucket: config.bucket,
            public_url: config.public_url,
        }
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    pub fn avatar_path(user_id: &str, ext: &str, timestamp_ms: i64) -> String {
        format!("avatars/{}-{}.{}", user_id, timestamp_ms, ext)
    }

    pub fn banner_path(user_id: &str, filename: &str) -> Result<String> {
        let filename = filename.trim();
        if filename.is_empty() || filename.contains('/') || filename.contains('\\') || filename.starts_with('.') {
            return Err(anyhow!("Invalid banner file name: {:?}", filename));
        }
        Ok(format!("banners/{}/{}", user_id, filename))
    }

    pub fn public_url(&self, object_path: &str) -> String {
        format!(
            "{}/storage/v1/object/public/{}/{}",
            self.public_url.trim_end_matches('/'),
            self.bucket,
            object_path
        )
    }

    pub async fn upload(&self, object_path: &str, bytes: &[u8]) -> Result<String> {
        let full_path = self.resolve(object_path)?;
        if let Some(parent) = full_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&full_path, bytes).await?;

        log::info!("Stored {} bytes at {}/{}", bytes.len(), self.bucket, object_path);
        Ok(self.public_url(object_path))
    }

    pub async fn download(&self, object_path: &str) -> Result<Option<Vec<u8>>> {
        let full_path = self.resolve(object_path)?;
        match tokio::fs::read(&full_path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Relative, non-empty and free of `..` or root components.
    pub fn is_valid_object_path(object_path: &str) -> bool {
        !object_path.is_empty()
            && Path::new(object_path)
                .components()
                .all(|c| matches!(c, Component::Normal(_)))
    }

    /// Map an object path to disk, refusing anything that escapes the bucket.
    fn resolve(&self, object_path: &str) -> Result<PathBuf> {
        if !Self::is_valid_object_path(object_path) {
            return Err(anyhow!("Invalid object path: {}", object_path));
        }
        Ok(self.root.join(&self.bucket).join(object_path))
    }
}

pub fn extension_for_content_type(content_type: &str) -> Option<&'static str> {
    let mime = content_type.split(';').next().unwrap_or("").trim().to_ascii_lowercase();
    match mime.as_str() {
        "image/png" => Some("png"),
        "image/jpeg" | "image/jpg" => Some("jpg"),
        "image/webp" => Some("webp"),
        "image/gif" => Some("gif"),
        _ => None,
    }
}

pub fn content_type_for_path(object_path: &str) -> &'static str {
    match object_path.rsplit('.').next().map(|e| e.to_ascii_lowercase()).as_deref() {
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("webp") => "image/webp",
        Some("gif") => "image/gif",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn storage(root: &Path) -> StorageService {
        StorageService::new(StorageConfig {
            root: root.to_string_lossy().to_string(),
            bucket: "user-uploads".to_string(),
            public_url: "http://localhost:8080/".to_string(),
        })
    }

    #[test]
    fn test_object_paths() {
        assert_eq!(StorageService::avatar_path("u1", "png", 1700000000000), "avatars/u1-1700000000000.png");
        assert_eq!(StorageService::banner_path("u1", "sky.jpg").unwrap(), "banners/u1/sky.jpg");
        assert!(StorageService::banner_path("u1", "../etc/passwd").is_err());
        assert!(StorageService::banner_path("u1", ".hidden").is_err());
    }

    #[test]
    fn test_content_types() {
        assert_eq!(extension_for_content_type("image/jpeg; charset=binary"), Some("jpg"));
        assert_eq!(extension_for_content_type("text/html"), None);
        assert_eq!(content_type_for_path("avatars/u1-1.webp"), "image/webp");
    }

    #[tokio::test]
    async fn test_upload_then_download() {
        let dir = tempfile::tempdir().unwrap();
        let storage = storage(dir.path());

        let url = storage.upload("avatars/u1-1.png", b"png-bytes").await.unwrap();
        assert_eq!(
            url,
            "http://localhost:8080/storage/v1/object/public/user-uploads/avatars/u1-1.png"
        );
        assert_eq!(
            storage.download("avatars/u1-1.png").await.unwrap(),
            Some(b"png-bytes".to_vec())
        );
        assert_eq!(storage.download("avatars/missing.png").await.unwrap(), None);
        assert!(storage.download("../outside.png").await.is_err());
    }

    #[test]
    fn test_object_path_validation() {
        assert!(StorageService::is_valid_object_path("avatars/u1-1.png"));
        assert!(!StorageService::is_valid_object_path(""));
        assert!(!StorageService::is_valid_object_path("../outside.png"));
        assert!(!StorageService::is_valid_object_path("/etc/passwd"));
    }

    #[tokio::test]
    async fn test_read_failure_is_an_error_not_a_miss() {
        let dir = tempfile::tempdir().unwrap();
        let storage = storage(dir.path());
        // a directory where a file is expected fails to read
        tokio::fs::create_dir_all(dir.path().join("user-uploads/avatars/folder.png"))
            .await
            .unwrap();

        assert!(storage.download("avatars/folder.png").await.is_err());
    }
}
