use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum GalleryError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Photo {0} not found")]
    NotFound(u64),

    #[error("Storage unavailable: {0}")]
    StorageUnavailable(String),

    #[error("Upload service unavailable: {0}")]
    UpstreamUnavailable(String),
}

impl GalleryError {
    pub fn invalid(msg: impl Into<String>) -> Self {
        GalleryError::InvalidInput(msg.into())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            GalleryError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            GalleryError::NotFound(_) => StatusCode::NOT_FOUND,
            GalleryError::StorageUnavailable(_) => StatusCode::INTERNAL_SERVER_ERROR,
            GalleryError::UpstreamUnavailable(_) => StatusCode::BAD_GATEWAY,
        }
    }
}

impl IntoResponse for GalleryError {
    fn into_response(self) -> Response {
        let status = self.status();
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

pub type GalleryResult<T> = std::result::Result<T, GalleryError>;
