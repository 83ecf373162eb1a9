//! HTTP surface: the photo collection API, image upload, and the uploaded
//! files themselves.
//!
//! | Route | Methods |
//! |---|---|
//! | `/api/photos` | GET (list), POST (create), PUT `?id=` (merge), DELETE `?id=` |
//! | `/api/upload` | POST `{imageData, fileName}` |
//! | `/uploads/*` | GET stored images |

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use axum::{
    body::Bytes,
    extract::{rejection::BytesRejection, DefaultBodyLimit, Query, State},
    http::{header::CONTENT_TYPE, Method, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::{de::DeserializeOwned, Deserialize};
use tokio::{net::TcpListener, signal};
use tower_http::{
    cors::{Any, CorsLayer},
    services::ServeDir,
    trace::TraceLayer,
};
use tracing::info;

use crate::config::Config;
use crate::error::{GalleryError, GalleryResult};
use crate::photo::{NewPhoto, PhotoPatch, PhotoRecord};
use crate::storage::LocalStorage;
use crate::store::PhotoStore;
use crate::upload::{
    decode_image_data, ImageUploader, LocalUploader, UploadRequest, UploadResponse, UPLOADS_ROUTE,
};

const DEFAULT_UPLOAD_NAME: &str = "photo.jpg";

pub struct AppState {
    pub store: PhotoStore,
    pub uploader: Box<dyn ImageUploader>,
    pub max_image_bytes: usize,
}

#[derive(Debug, Deserialize)]
pub struct IdQuery {
    id: Option<String>,
}

impl IdQuery {
    fn photo_id(&self) -> GalleryResult<u64> {
        let raw = self
            .id
            .as_deref()
            .ok_or_else(|| GalleryError::invalid("missing id"))?;
        raw.trim()
            .parse()
            .map_err(|_| GalleryError::invalid(format!("invalid id: {raw}")))
    }
}

fn parse_body<T: DeserializeOwned>(body: &Bytes) -> GalleryResult<T> {
    serde_json::from_slice(body).map_err(|e| GalleryError::invalid(format!("malformed payload: {e}")))
}

pub async fn list_photos(State(state): State<Arc<AppState>>) -> Json<Vec<PhotoRecord>> {
    Json(state.store.list().await)
}

pub async fn create_photo(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> GalleryResult<impl IntoResponse> {
    let fields: NewPhoto = parse_body(&body)?;
    let created = state.store.create(fields).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

pub async fn update_photo(
    State(state): State<Arc<AppState>>,
    Query(query): Query<IdQuery>,
    body: Bytes,
) -> GalleryResult<Json<PhotoRecord>> {
    let id = query.photo_id()?;
    let patch: PhotoPatch = parse_body(&body)?;
    Ok(Json(state.store.update(id, &patch).await?))
}

pub async fn delete_photo(
    State(state): State<Arc<AppState>>,
    Query(query): Query<IdQuery>,
) -> GalleryResult<Json<PhotoRecord>> {
    let id = query.photo_id()?;
    Ok(Json(state.store.delete(id).await?))
}

/// A body the extractor refused. Overrunning the body limit is reported as
/// an oversize image, the same way an image that decodes too large is.
fn upload_rejection(rejection: BytesRejection, max_image_bytes: usize) -> GalleryError {
    if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
        GalleryError::invalid(format!(
            "image too large (max {:.0}MB)",
            max_image_bytes as f64 / (1024.0 * 1024.0)
        ))
    } else {
        GalleryError::invalid(rejection.body_text())
    }
}

pub async fn upload_image(
    State(state): State<Arc<AppState>>,
    body: Result<Bytes, BytesRejection>,
) -> GalleryResult<Json<UploadResponse>> {
    let body = body.map_err(|rejection| upload_rejection(rejection, state.max_image_bytes))?;
    let request: UploadRequest = parse_body(&body)?;
    let image_data = request
        .image_data
        .as_deref()
        .ok_or_else(|| GalleryError::invalid("missing image data"))?;
    let bytes = decode_image_data(image_data, state.max_image_bytes)?;
    let name = request.file_name.as_deref().unwrap_or(DEFAULT_UPLOAD_NAME);

    let image = state.uploader.upload(&bytes, name).await?;
    Ok(Json(UploadResponse::from(image)))
}

pub fn router(state: Arc<AppState>, uploads: ServeDir) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::OPTIONS])
        .allow_headers([CONTENT_TYPE])
        .max_age(Duration::from_secs(60 * 60));

    // base64 inflates by 4/3; leave room for the JSON envelope
    let body_limit = state.max_image_bytes / 3 * 4 + 64 * 1024;

    Router::new()
        .route(
            "/api/photos",
            get(list_photos)
                .post(create_photo)
                .put(update_photo)
                .delete(delete_photo),
        )
        .route("/api/upload", post(upload_image))
        .nest_service(UPLOADS_ROUTE, uploads)
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

pub async fn start_server(config: Config) -> Result<()> {
    let photos_path = config.storage.photos_path();
    info!("Opening photo store at {}", photos_path.display());
    let store = PhotoStore::open(Arc::new(LocalStorage::new(photos_path))).await;

    let uploads_dir = config.uploads.uploads_dir();
    tokio::fs::create_dir_all(&uploads_dir)
        .await
        .with_context(|| format!("Failed to create uploads directory {}", uploads_dir.display()))?;
    let uploader = LocalUploader::new(&uploads_dir, &config.server.public_url);
    info!("Uploads stored in {} ({} provider)", uploads_dir.display(), uploader.provider_name());

    let state = Arc::new(AppState {
        store,
        uploader: Box::new(uploader),
        max_image_bytes: config.uploads.max_image_bytes,
    });
    let app = router(state.clone(), ServeDir::new(&uploads_dir));

    let address = config.server.bind_address();
    let listener = TcpListener::bind(&address)
        .await
        .with_context(|| format!("Failed to bind {address}"))?;
    info!("Server running on {address}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server shutting down...");
    match Arc::try_unwrap(state) {
        Ok(state) => state.store.close().await?,
        Err(_) => tracing::warn!("Photo store still in use at shutdown, skipping final flush"),
    }

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c().await.expect("Failed to install Ctrl+C handler");

        info!("Received Ctrl+C, shutting down");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;

        info!("Received terminate signal, shutting down");
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
