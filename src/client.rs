//! Client side of the gallery HTTP API.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use base64::{engine::general_purpose, Engine as _};
use reqwest::{Client as HttpClient, Response};
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::photo::{NewPhoto, PhotoPatch, PhotoRecord};
use crate::upload::{UploadRequest, UploadResponse};

/// Operations the sync loop needs from a gallery server.
#[async_trait]
pub trait GalleryApi: Send + Sync {
    async fn list(&self) -> Result<Vec<PhotoRecord>>;

    async fn create(&self, photo: &NewPhoto) -> Result<PhotoRecord>;

    async fn update(&self, id: u64, patch: &PhotoPatch) -> Result<PhotoRecord>;

    async fn delete(&self, id: u64) -> Result<PhotoRecord>;

    /// Push image bytes to the upload collaborator, returning its URL.
    async fn upload(&self, bytes: &[u8], file_name: &str) -> Result<UploadResponse>;
}

pub struct HttpGalleryClient {
    base_url: String,
    http_client: HttpClient,
}

impl HttpGalleryClient {
    pub fn new(base_url: &str) -> Result<Self> {
        let http_client = HttpClient::builder()
            .connect_timeout(Duration::from_secs(5))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            http_client,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn photo_url(&self, id: u64) -> String {
        format!("{}/api/photos?id={}", self.base_url, id)
    }
}

/// Decode a success body, or turn `{"error": ...}` into an error naming the status.
async fn read_json<T: DeserializeOwned>(response: Response) -> Result<T> {
    let status = response.status();
    if status.is_success() {
        return response
            .json::<T>()
            .await
            .context("Failed to decode gallery response");
    }

    let body = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<Value>(&body)
        .ok()
        .and_then(|v| v.get("error").and_then(Value::as_str).map(str::to_string))
        .unwrap_or(body);
    anyhow::bail!("gallery server returned {}: {}", status, message)
}

#[async_trait]
impl GalleryApi for HttpGalleryClient {
    async fn list(&self) -> Result<Vec<PhotoRecord>> {
        let response = self
            .http_client
            .get(self.url("/api/photos"))
            .send()
            .await
            .context("Failed to fetch photos")?;
        read_json(response).await
    }

    async fn create(&self, photo: &NewPhoto) -> Result<PhotoRecord> {
        let response = self
            .http_client
            .post(self.url("/api/photos"))
            .json(photo)
            .send()
            .await
            .context("Failed to create photo")?;
        read_json(response).await
    }

    async fn update(&self, id: u64, patch: &PhotoPatch) -> Result<PhotoRecord> {
        let response = self
            .http_client
            .put(self.photo_url(id))
            .json(patch)
            .send()
            .await
            .context("Failed to update photo")?;
        read_json(response).await
    }

    async fn delete(&self, id: u64) -> Result<PhotoRecord> {
        let response = self
            .http_client
            .delete(self.photo_url(id))
            .send()
            .await
            .context("Failed to delete photo")?;
        read_json(response).await
    }

    async fn upload(&self, bytes: &[u8], file_name: &str) -> Result<UploadResponse> {
        let request = UploadRequest {
            image_data: Some(general_purpose::STANDARD.encode(bytes)),
            file_name: Some(file_name.to_string()),
        };
        let response = self
            .http_client
            .post(self.url("/api/upload"))
            .json(&request)
            .send()
            .await
            .context("Failed to upload image")?;
        read_json(response).await
    }
}
