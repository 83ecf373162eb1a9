//! The authoritative photo collection.
//!
//! One in-memory copy guarded by an async mutex, written back in full to a
//! [`CollectionStorage`] after every mutation. A mutation is applied to a
//! scratch copy first; the copy only replaces the live collection once the
//! write succeeded, so a failed save leaves nothing half-applied.
//!
//! Several processes sharing one backing file are not coordinated: the last
//! writer wins.

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::Mutex;

use crate::error::{GalleryError, GalleryResult};
use crate::photo::{self, NewPhoto, PhotoPatch, PhotoRecord};
use crate::storage::CollectionStorage;

#[derive(Debug, Clone, Default)]
struct Collection {
    photos: Vec<PhotoRecord>,
    last_id: u64,
}

impl Collection {
    fn from_photos(photos: Vec<PhotoRecord>) -> Self {
        let last_id = photos.iter().map(|p| p.id).max().unwrap_or(0);
        Self { photos, last_id }
    }

    /// Millisecond timestamp, bumped past the last id handed out so two
    /// creates in the same millisecond still get distinct ids.
    fn next_id(&mut self) -> GalleryResult<u64> {
        let bumped = self.last_id.checked_add(1).ok_or_else(|| {
            GalleryError::StorageUnavailable(format!("photo ids exhausted after {}", self.last_id))
        })?;
        let now = u64::try_from(Utc::now().timestamp_millis()).unwrap_or(0);
        let id = now.max(bumped);
        self.last_id = id;
        Ok(id)
    }

    fn position(&self, id: u64) -> GalleryResult<usize> {
        self.photos
            .iter()
            .position(|p| p.id == id)
            .ok_or(GalleryError::NotFound(id))
    }
}

pub struct PhotoStore {
    storage: Arc<dyn CollectionStorage>,
    state: Mutex<Collection>,
}

impl PhotoStore {
    /// Load the collection from `storage`.
    ///
    /// Never fails: a missing document starts an empty collection (and
    /// writes it), an unreadable or corrupt one is logged and treated as
    /// empty without being overwritten until the next mutation.
    pub async fn open(storage: Arc<dyn CollectionStorage>) -> Self {
        let photos = match storage.read().await {
            Ok(Some(contents)) => match photo::decode_collection(&contents) {
                Ok(photos) => photos,
                Err(e) => {
                    tracing::warn!("Photo store is corrupt, starting empty: {}", e);
                    Vec::new()
                }
            },
            Ok(None) => {
                tracing::info!("No photo store found, initializing an empty one");
                if let Err(e) = write_collection(storage.as_ref(), &[]).await {
                    tracing::warn!("Could not initialize photo store: {}", e);
                }
                Vec::new()
            }
            Err(e) => {
                tracing::warn!("Could not read photo store, starting empty: {:#}", e);
                Vec::new()
            }
        };

        tracing::info!(
            "Photo store opened ({} backend, {} photos)",
            storage.backend_name(),
            photos.len()
        );

        Self {
            storage,
            state: Mutex::new(Collection::from_photos(photos)),
        }
    }

    /// Flush the collection one last time and release the backend.
    pub async fn close(self) -> GalleryResult<()> {
        let state = self.state.into_inner();
        write_collection(self.storage.as_ref(), &state.photos).await?;
        tracing::info!("Photo store closed ({} photos)", state.photos.len());
        Ok(())
    }

    pub async fn list(&self) -> Vec<PhotoRecord> {
        self.state.lock().await.photos.clone()
    }

    pub async fn create(&self, fields: NewPhoto) -> GalleryResult<PhotoRecord> {
        let created = self
            .mutate(|collection| {
                let id = collection.next_id()?;
                let record = fields.into_record(id)?;
                collection.photos.push(record.clone());
                Ok(record)
            })
            .await?;

        tracing::debug!("Created photo {}", created.id);
        Ok(created)
    }

    pub async fn update(&self, id: u64, patch: &PhotoPatch) -> GalleryResult<PhotoRecord> {
        self.mutate(|collection| {
            let index = collection.position(id)?;
            let record = &mut collection.photos[index];
            patch.apply_to(record)?;
            Ok(record.clone())
        })
        .await
    }

    pub async fn delete(&self, id: u64) -> GalleryResult<PhotoRecord> {
        let removed = self
            .mutate(|collection| {
                let index = collection.position(id)?;
                Ok(collection.photos.remove(index))
            })
            .await?;

        tracing::debug!("Deleted photo {}", removed.id);
        Ok(removed)
    }

    async fn mutate<T>(
        &self,
        apply: impl FnOnce(&mut Collection) -> GalleryResult<T>,
    ) -> GalleryResult<T> {
        let mut live = self.state.lock().await;
        let mut scratch = live.clone();
        let output = apply(&mut scratch)?;

        write_collection(self.storage.as_ref(), &scratch.photos).await?;
        *live = scratch;
        Ok(output)
    }
}

async fn write_collection(storage: &dyn CollectionStorage, photos: &[PhotoRecord]) -> GalleryResult<()> {
    let contents = photo::encode_collection(photos)
        .map_err(|e| GalleryError::StorageUnavailable(e.to_string()))?;

    storage.write(&contents).await.map_err(|e| {
        tracing::warn!("Failed to persist photo store: {:#}", e);
        GalleryError::StorageUnavailable(format!("{e:#}"))
    })
}
