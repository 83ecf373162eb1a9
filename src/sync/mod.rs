//! Client-side reconciliation with a gallery server.
//!
//! The server never pushes. The local view is only ever replaced wholesale
//! by a full-collection fetch, which happens:
//!
//! - on [`GallerySync::mount`],
//! - right after every successful local mutation, plus once more after
//!   `verify_delay` in case the server's read path lags its write path,
//! - when the poll timer fires, unless a local mutation happened within the
//!   quiet period.
//!
//! A failed or timed-out fetch keeps the previous view and raises an error
//! notification. Mutations are attempted once; the user retries.

pub mod policy;
pub mod state;

use std::collections::VecDeque;
use std::future::Future;
use std::time::{Duration, Instant};

use chrono::Utc;

use crate::client::GalleryApi;
use crate::photo::{NewPhoto, PhotoPatch, PhotoRecord};
use policy::{PollTimer, QuietPeriod, VerifySchedule};

pub use state::{FetchOutcome, Notification, NotificationKind, SyncSettings, TickAction};

const MAX_NOTIFICATIONS: usize = 20;
const MAX_TICK: Duration = Duration::from_secs(1);

pub struct GallerySync<A: GalleryApi> {
    api: A,
    settings: SyncSettings,
    photos: Vec<PhotoRecord>,
    loaded: bool,
    quiet: QuietPeriod,
    poll_timer: PollTimer,
    verify: VerifySchedule,
    notifications: VecDeque<Notification>,
}

impl<A: GalleryApi> GallerySync<A> {
    pub fn new(api: A, settings: SyncSettings) -> Self {
        let now = Instant::now();
        Self {
            quiet: QuietPeriod::new(settings.quiet_period),
            poll_timer: PollTimer::new(settings.poll_interval, now),
            verify: VerifySchedule::default(),
            api,
            settings,
            photos: Vec::new(),
            loaded: false,
            notifications: VecDeque::new(),
        }
    }

    pub fn api(&self) -> &A {
        &self.api
    }

    pub fn photos(&self) -> &[PhotoRecord] {
        &self.photos
    }

    /// False until the first successful fetch.
    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    pub fn verification_pending(&self) -> bool {
        self.verify.is_pending()
    }

    pub fn notifications(&self) -> impl Iterator<Item = &Notification> {
        self.notifications.iter()
    }

    pub fn latest_notification(&self) -> Option<&Notification> {
        self.notifications.back()
    }

    /// Initial load when the gallery view opens.
    pub async fn mount(&mut self) -> FetchOutcome {
        self.refresh().await
    }

    /// Fetch the full collection and replace the local view with it.
    pub async fn refresh(&mut self) -> FetchOutcome {
        match tokio::time::timeout(self.settings.fetch_timeout, self.api.list()).await {
            Ok(Ok(photos)) => {
                let count = photos.len();
                if photos != self.photos {
                    tracing::info!("⟳ Gallery synced from server ({} photos)", count);
                }
                self.photos = photos;
                self.loaded = true;
                FetchOutcome::Updated(count)
            }
            Ok(Err(e)) => {
                tracing::warn!("Gallery fetch failed: {:#}", e);
                self.notify_error("Failed to load the gallery".to_string());
                FetchOutcome::Failed
            }
            Err(_) => {
                tracing::warn!(
                    "Gallery fetch timed out after {:?}",
                    self.settings.fetch_timeout
                );
                self.notify_error("Loading the gallery timed out".to_string());
                FetchOutcome::TimedOut
            }
        }
    }

    pub async fn tick(&mut self) -> TickAction {
        self.tick_at(Instant::now()).await
    }

    /// Run whatever is due at `now`: a pending verification refetch first,
    /// otherwise the poll timer.
    pub async fn tick_at(&mut self, now: Instant) -> TickAction {
        if self.verify.take_due(now) {
            tracing::debug!("Running post-mutation verification fetch");
            return TickAction::Verified(self.refresh().await);
        }

        if !self.poll_timer.fire(now) {
            return TickAction::Idle;
        }

        if self.quiet.allows_poll(now) {
            TickAction::Polled(self.refresh().await)
        } else {
            tracing::debug!("Poll skipped, recent local action");
            TickAction::Suppressed
        }
    }

    pub async fn toggle_favorite(&mut self, id: u64) -> Option<PhotoRecord> {
        let Some(current) = self.photos.iter().find(|p| p.id == id) else {
            self.notify_error(format!("Photo {id} is not in the gallery"));
            return None;
        };
        let was_favorite = current.is_favorite;

        match self.api.update(id, &PhotoPatch::favorite(!was_favorite)).await {
            Ok(updated) => {
                self.after_mutation().await;
                self.notify_info(if was_favorite {
                    "Removed from favorites".to_string()
                } else {
                    "Added to favorites".to_string()
                });
                Some(updated)
            }
            Err(e) => {
                tracing::warn!("Favorite toggle for {} failed: {:#}", id, e);
                self.notify_error("Failed to update the photo".to_string());
                None
            }
        }
    }

    pub async fn delete(&mut self, id: u64) -> Option<PhotoRecord> {
        if !self.photos.iter().any(|p| p.id == id) {
            self.notify_error(format!("Photo {id} is not in the gallery"));
            return None;
        }

        match self.api.delete(id).await {
            Ok(removed) => {
                self.after_mutation().await;
                self.notify_info("Photo deleted".to_string());
                Some(removed)
            }
            Err(e) => {
                tracing::warn!("Delete of {} failed: {:#}", id, e);
                self.notify_error("Failed to delete the photo".to_string());
                None
            }
        }
    }

    /// Upload the bytes, then add a record pointing at the returned URL. No
    /// record is created unless the upload produced one.
    pub async fn upload(&mut self, bytes: &[u8], file_name: &str) -> Option<PhotoRecord> {
        let uploaded = match self.api.upload(bytes, file_name).await {
            Ok(uploaded) => uploaded,
            Err(e) => {
                tracing::warn!("Upload of {} failed: {:#}", file_name, e);
                self.notify_error(format!("Failed to upload {file_name}"));
                return None;
            }
        };

        let photo = NewPhoto {
            url: Some(uploaded.image_url),
            title: Some(format!("Photo {}", Utc::now().timestamp_millis())),
            is_favorite: Some(false),
        };
        match self.api.create(&photo).await {
            Ok(created) => {
                self.after_mutation().await;
                self.notify_info(format!("{file_name} uploaded"));
                Some(created)
            }
            Err(e) => {
                tracing::warn!("Adding uploaded {} to the gallery failed: {:#}", file_name, e);
                self.notify_error(format!("Failed to add {file_name} to the gallery"));
                None
            }
        }
    }

    /// Drive the loop until `shutdown` resolves.
    pub async fn run(&mut self, shutdown: impl Future<Output = ()>) {
        self.mount().await;

        let mut ticker = tokio::time::interval(self.settings.poll_interval.min(MAX_TICK));
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                _ = ticker.tick() => {
                    self.tick().await;
                    self.clear_expired_notifications();
                }
            }
        }
    }

    pub fn clear_expired_notifications(&mut self) {
        self.clear_expired_notifications_at(Instant::now());
    }

    pub fn clear_expired_notifications_at(&mut self, now: Instant) {
        self.notifications.retain(|n| !n.is_expired(now));
    }

    async fn after_mutation(&mut self) {
        let now = Instant::now();
        self.quiet.mark(now);
        self.refresh().await;
        self.verify.schedule(now, self.settings.verify_delay);
    }

    fn notify_info(&mut self, message: String) {
        tracing::info!("{}", message);
        self.push_notification(message, NotificationKind::Info);
    }

    fn notify_error(&mut self, message: String) {
        self.push_notification(message, NotificationKind::Error);
    }

    fn push_notification(&mut self, message: String, kind: NotificationKind) {
        self.notifications.push_back(Notification {
            message,
            kind,
            created_at: Instant::now(),
        });
        while self.notifications.len() > MAX_NOTIFICATIONS {
            self.notifications.pop_front();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
    use std::sync::Arc;

    use anyhow::Result;
    use async_trait::async_trait;

    use crate::storage::MemoryStorage;
    use crate::store::PhotoStore;
    use crate::upload::UploadResponse;

    /// A gallery server without the HTTP in between.
    struct FakeApi {
        store: PhotoStore,
        list_calls: AtomicUsize,
        fail_list: AtomicBool,
        fail_upload: AtomicBool,
        list_delay_ms: AtomicU64,
    }

    impl FakeApi {
        async fn new() -> Self {
            Self {
                store: PhotoStore::open(Arc::new(MemoryStorage::new())).await,
                list_calls: AtomicUsize::new(0),
                fail_list: AtomicBool::new(false),
                fail_upload: AtomicBool::new(false),
                list_delay_ms: AtomicU64::new(0),
            }
        }

        fn list_calls(&self) -> usize {
            self.list_calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl GalleryApi for FakeApi {
        async fn list(&self) -> Result<Vec<PhotoRecord>> {
            self.list_calls.fetch_add(1, Ordering::SeqCst);
            let delay = self.list_delay_ms.load(Ordering::SeqCst);
            if delay > 0 {
                tokio::time::sleep(Duration::from_millis(delay)).await;
            }
            if self.fail_list.load(Ordering::SeqCst) {
                anyhow::bail!("server unreachable");
            }
            Ok(self.store.list().await)
        }

        async fn create(&self, photo: &NewPhoto) -> Result<PhotoRecord> {
            Ok(self.store.create(photo.clone()).await?)
        }

        async fn update(&self, id: u64, patch: &PhotoPatch) -> Result<PhotoRecord> {
            Ok(self.store.update(id, patch).await?)
        }

        async fn delete(&self, id: u64) -> Result<PhotoRecord> {
            Ok(self.store.delete(id).await?)
        }

        async fn upload(&self, bytes: &[u8], file_name: &str) -> Result<UploadResponse> {
            if self.fail_upload.load(Ordering::SeqCst) {
                anyhow::bail!("upload provider down");
            }
            Ok(UploadResponse {
                success: true,
                image_url: format!("http://cdn/{file_name}"),
                file_name: file_name.to_string(),
                file_id: "abc".to_string(),
                image_size: bytes.len(),
            })
        }
    }

    fn settings() -> SyncSettings {
        SyncSettings {
            poll_interval: Duration::from_secs(5),
            quiet_period: Duration::from_secs(30),
            verify_delay: Duration::from_secs(2),
            fetch_timeout: Duration::from_secs(10),
        }
    }

    async fn synced_with(urls: &[&str]) -> GallerySync<FakeApi> {
        let api = FakeApi::new().await;
        for url in urls {
            api.store.create(NewPhoto::with_url(*url)).await.unwrap();
        }
        let mut sync = GallerySync::new(api, settings());
        assert!(sync.mount().await.is_success());
        sync
    }

    #[tokio::test]
    async fn test_mount_loads_full_collection() {
        let sync = synced_with(&["http://x/1.jpg", "http://x/2.jpg"]).await;

        assert!(sync.is_loaded());
        assert_eq!(sync.photos().len(), 2);
        assert_eq!(sync.photos()[0].url, "http://x/1.jpg");
        assert_eq!(sync.api().list_calls(), 1);
    }

    #[tokio::test]
    async fn test_mount_against_unreachable_server_is_not_success() {
        let api = FakeApi::new().await;
        api.fail_list.store(true, Ordering::SeqCst);
        let mut sync = GallerySync::new(api, settings());

        assert!(!sync.mount().await.is_success());
        assert!(!sync.is_loaded());
    }

    #[tokio::test]
    async fn test_failed_fetch_keeps_previous_view() {
        let mut sync = synced_with(&["http://x/1.jpg"]).await;
        sync.api().fail_list.store(true, Ordering::SeqCst);

        assert_eq!(sync.refresh().await, FetchOutcome::Failed);

        assert_eq!(sync.photos().len(), 1);
        assert!(sync.latest_notification().unwrap().is_error());
    }

    #[tokio::test]
    async fn test_fetch_timeout_is_reported() {
        let mut sync = synced_with(&["http://x/1.jpg"]).await;
        sync.settings.fetch_timeout = Duration::from_millis(20);
        sync.api().list_delay_ms.store(500, Ordering::SeqCst);

        assert_eq!(sync.refresh().await, FetchOutcome::TimedOut);

        assert_eq!(sync.photos().len(), 1);
        assert!(sync.latest_notification().unwrap().is_error());
    }

    #[tokio::test]
    async fn test_toggle_favorite_refetches_and_schedules_verification() {
        let mut sync = synced_with(&["http://x/1.jpg"]).await;
        let id = sync.photos()[0].id;

        let updated = sync.toggle_favorite(id).await.unwrap();

        assert!(updated.is_favorite);
        assert!(sync.photos()[0].is_favorite);
        assert_eq!(sync.api().list_calls(), 2);
        assert!(sync.verification_pending());
        let note = sync.latest_notification().unwrap();
        assert_eq!(note.kind, NotificationKind::Info);
        assert_eq!(note.message, "Added to favorites");

        sync.toggle_favorite(id).await.unwrap();
        assert!(!sync.photos()[0].is_favorite);
        assert_eq!(sync.latest_notification().unwrap().message, "Removed from favorites");
    }

    #[tokio::test]
    async fn test_delete_refetches() {
        let mut sync = synced_with(&["http://x/1.jpg", "http://x/2.jpg"]).await;
        let first = sync.photos()[0].id;

        sync.delete(first).await.unwrap();

        assert_eq!(sync.photos().len(), 1);
        assert_eq!(sync.photos()[0].url, "http://x/2.jpg");
    }

    #[tokio::test]
    async fn test_mutation_on_unknown_id_sends_nothing() {
        let mut sync = synced_with(&["http://x/1.jpg"]).await;

        assert!(sync.toggle_favorite(424242).await.is_none());
        assert!(sync.delete(424242).await.is_none());

        assert_eq!(sync.api().list_calls(), 1);
        assert!(!sync.verification_pending());
        assert!(sync.latest_notification().unwrap().is_error());
    }

    #[tokio::test]
    async fn test_server_side_not_found_is_notified() {
        let mut sync = synced_with(&["http://x/1.jpg"]).await;
        let id = sync.photos()[0].id;
        // Another client removed it behind our back.
        sync.api().store.delete(id).await.unwrap();

        assert!(sync.delete(id).await.is_none());

        assert!(sync.latest_notification().unwrap().is_error());
        assert_eq!(sync.photos().len(), 1);
        assert!(!sync.verification_pending());
    }

    #[tokio::test]
    async fn test_upload_creates_record_with_returned_url() {
        let mut sync = synced_with(&[]).await;

        let created = sync.upload(b"jpeg", "beach.jpg").await.unwrap();

        assert_eq!(created.url, "http://cdn/beach.jpg");
        assert!(created.title.starts_with("Photo "));
        assert!(!created.is_favorite);
        assert_eq!(sync.photos(), &[created]);
    }

    #[tokio::test]
    async fn test_failed_upload_never_creates() {
        let mut sync = synced_with(&[]).await;
        sync.api().fail_upload.store(true, Ordering::SeqCst);

        assert!(sync.upload(b"jpeg", "beach.jpg").await.is_none());

        assert!(sync.api().store.list().await.is_empty());
        assert!(sync.latest_notification().unwrap().is_error());
    }

    #[tokio::test]
    async fn test_tick_sequence_after_mutation() {
        let mut sync = synced_with(&["http://x/1.jpg"]).await;
        let id = sync.photos()[0].id;
        sync.toggle_favorite(id).await.unwrap();
        let start = Instant::now();

        assert_eq!(sync.tick_at(start + Duration::from_secs(1)).await, TickAction::Idle);
        assert_eq!(
            sync.tick_at(start + Duration::from_secs(3)).await,
            TickAction::Verified(FetchOutcome::Updated(1))
        );
        assert_eq!(sync.tick_at(start + Duration::from_secs(10)).await, TickAction::Suppressed);
        assert_eq!(sync.tick_at(start + Duration::from_secs(12)).await, TickAction::Idle);
        assert_eq!(
            sync.tick_at(start + Duration::from_secs(31)).await,
            TickAction::Polled(FetchOutcome::Updated(1))
        );
        // mount + mutation refetch + verification + poll
        assert_eq!(sync.api().list_calls(), 4);
    }

    #[tokio::test]
    async fn test_poll_picks_up_changes_from_other_clients() {
        let mut sync = synced_with(&[]).await;
        sync.api().store.create(NewPhoto::with_url("http://x/other.jpg")).await.unwrap();
        let start = Instant::now();

        assert_eq!(
            sync.tick_at(start + Duration::from_secs(6)).await,
            TickAction::Polled(FetchOutcome::Updated(1))
        );
        assert_eq!(sync.photos()[0].url, "http://x/other.jpg");
    }

    #[tokio::test]
    async fn test_notifications_expire() {
        let mut sync = synced_with(&["http://x/1.jpg"]).await;
        let id = sync.photos()[0].id;
        sync.toggle_favorite(id).await.unwrap();
        assert_eq!(sync.notifications().count(), 1);

        sync.clear_expired_notifications_at(Instant::now() + Duration::from_secs(1));
        assert_eq!(sync.notifications().count(), 1);

        sync.clear_expired_notifications_at(Instant::now() + Duration::from_secs(4));
        assert_eq!(sync.notifications().count(), 0);
    }

    #[tokio::test]
    async fn test_run_stops_on_shutdown() {
        let api = FakeApi::new().await;
        let mut sync = GallerySync::new(api, settings());

        sync.run(tokio::time::sleep(Duration::from_millis(50))).await;

        assert!(sync.is_loaded());
    }
}
