//! Image upload capability.
//!
//! The gallery only needs "bytes and a name in, public URL and file id out".
//! [`LocalUploader`] keeps files in a directory the server also serves under
//! `/uploads`; other providers plug in behind [`ImageUploader`].

use std::path::PathBuf;

use async_trait::async_trait;
use base64::{engine::general_purpose, Engine as _};
use chrono::Utc;
use rand::{distributions::Alphanumeric, Rng};
use serde::{Deserialize, Serialize};
use tokio::fs;

use crate::error::{GalleryError, GalleryResult};

pub const DEFAULT_MAX_IMAGE_BYTES: usize = 10 * 1024 * 1024;
pub const UPLOADS_ROUTE: &str = "/uploads";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedImage {
    pub url: String,
    pub file_id: String,
    pub file_name: String,
    pub size: usize,
}

#[async_trait]
pub trait ImageUploader: Send + Sync {
    fn provider_name(&self) -> &str;

    async fn upload(&self, bytes: &[u8], desired_name: &str) -> GalleryResult<UploadedImage>;
}

/// JSON body of `POST /api/upload`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadRequest {
    #[serde(default)]
    pub image_data: Option<String>,
    #[serde(default)]
    pub file_name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadResponse {
    pub success: bool,
    pub image_url: String,
    pub file_name: String,
    pub file_id: String,
    pub image_size: usize,
}

impl From<UploadedImage> for UploadResponse {
    fn from(image: UploadedImage) -> Self {
        Self {
            success: true,
            image_url: image.url,
            file_name: image.file_name,
            file_id: image.file_id,
            image_size: image.size,
        }
    }
}

/// Decode base64 image data, with or without a `data:image/...;base64,`
/// prefix.
pub fn decode_image_data(image_data: &str, max_bytes: usize) -> GalleryResult<Vec<u8>> {
    let payload = match image_data.split_once(',') {
        Some((header, rest)) if header.starts_with("data:") => {
            if !header.ends_with(";base64") {
                return Err(GalleryError::invalid("image data must be base64 encoded"));
            }
            rest
        }
        _ => image_data,
    };

    let bytes = general_purpose::STANDARD
        .decode(payload.trim())
        .map_err(|e| GalleryError::invalid(format!("invalid base64 image data: {e}")))?;

    if bytes.is_empty() {
        return Err(GalleryError::invalid("image data is empty"));
    }
    if bytes.len() > max_bytes {
        return Err(GalleryError::invalid(format!(
            "image too large: {:.2}MB (max {:.0}MB)",
            bytes.len() as f64 / 1024.0 / 1024.0,
            max_bytes as f64 / 1024.0 / 1024.0
        )));
    }

    Ok(bytes)
}

/// `photo_<millis>_<random>.<ext>`, extension from the desired name.
pub fn unique_file_name(desired_name: &str) -> String {
    let extension = desired_name
        .rsplit_once('.')
        .map(|(_, ext)| ext)
        .filter(|ext| !ext.is_empty() && ext.len() <= 5 && ext.chars().all(|c| c.is_ascii_alphanumeric()))
        .map(|ext| ext.to_ascii_lowercase())
        .unwrap_or_else(|| "jpg".to_string());

    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(12)
        .map(char::from)
        .collect::<String>()
        .to_ascii_lowercase();

    format!("photo_{}_{}.{}", Utc::now().timestamp_millis(), suffix, extension)
}

pub struct LocalUploader {
    dir: PathBuf,
    public_url: String,
}

impl LocalUploader {
    pub fn new(dir: impl Into<PathBuf>, public_url: &str) -> Self {
        Self {
            dir: dir.into(),
            public_url: public_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn dir(&self) -> &std::path::Path {
        &self.dir
    }
}

#[async_trait]
impl ImageUploader for LocalUploader {
    fn provider_name(&self) -> &str {
        "local"
    }

    async fn upload(&self, bytes: &[u8], desired_name: &str) -> GalleryResult<UploadedImage> {
        let file_name = unique_file_name(desired_name);
        let path = self.dir.join(&file_name);

        let write = async {
            fs::create_dir_all(&self.dir).await?;
            fs::write(&path, bytes).await?;
            Ok::<_, std::io::Error>(())
        };
        write.await.map_err(|e| {
            tracing::warn!("Failed to store upload {}: {}", path.display(), e);
            GalleryError::UpstreamUnavailable(format!("could not store image: {e}"))
        })?;

        tracing::info!("Stored upload {} ({} bytes)", file_name, bytes.len());

        Ok(UploadedImage {
            url: format!("{}{}/{}", self.public_url, UPLOADS_ROUTE, file_name),
            file_id: blake3::hash(bytes).to_hex().to_string(),
            file_name,
            size: bytes.len(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_plain_and_data_url() {
        let encoded = general_purpose::STANDARD.encode(b"fake-jpeg");

        assert_eq!(decode_image_data(&encoded, 1024).unwrap(), b"fake-jpeg");
        let data_url = format!("data:image/jpeg;base64,{encoded}");
        assert_eq!(decode_image_data(&data_url, 1024).unwrap(), b"fake-jpeg");
    }

    #[test]
    fn test_decode_rejects_bad_input() {
        assert!(decode_image_data("!!!not base64!!!", 1024).is_err());
        assert!(decode_image_data("", 1024).is_err());
        assert!(decode_image_data("data:image/png,abcd", 1024).is_err());
    }

    #[test]
    fn test_decode_rejects_oversize() {
        let encoded = general_purpose::STANDARD.encode(vec![7u8; 2048]);

        let err = decode_image_data(&encoded, 1024).unwrap_err();
        assert!(matches!(err, GalleryError::InvalidInput(_)));
        assert!(decode_image_data(&encoded, 4096).is_ok());
    }

    #[test]
    fn test_unique_file_name_keeps_extension() {
        let name = unique_file_name("Holiday.PNG");
        assert!(name.starts_with("photo_"));
        assert!(name.ends_with(".png"));

        assert!(unique_file_name("no-extension").ends_with(".jpg"));
        assert!(unique_file_name("../../etc/passwd.").ends_with(".jpg"));
        assert_ne!(unique_file_name("a.jpg"), unique_file_name("a.jpg"));
    }

    #[tokio::test]
    async fn test_local_upload_writes_file_and_builds_url() {
        let dir = tempfile::tempdir().unwrap();
        let uploader = LocalUploader::new(dir.path().join("uploads"), "http://localhost:3000/");

        let image = uploader.upload(b"bytes", "cat.jpg").await.unwrap();

        assert!(image.url.starts_with("http://localhost:3000/uploads/photo_"));
        assert_eq!(image.size, 5);
        assert_eq!(image.file_id, blake3::hash(b"bytes").to_hex().to_string());
        let stored = std::fs::read(uploader.dir().join(&image.file_name)).unwrap();
        assert_eq!(stored, b"bytes");
    }

    #[tokio::test]
    async fn test_local_upload_failure_is_upstream_error() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, "x").unwrap();
        let uploader = LocalUploader::new(blocker.join("uploads"), "http://localhost");

        let err = uploader.upload(b"bytes", "cat.jpg").await.unwrap_err();
        assert!(matches!(err, GalleryError::UpstreamUnavailable(_)));
    }
}
