use std::time::{Duration, Instant};

use crate::config::SyncConfig;

pub const NOTIFICATION_LIFETIME: Duration = Duration::from_secs(3);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationKind {
    Info,
    Error,
}

/// Transient user-facing message.
#[derive(Debug, Clone)]
pub struct Notification {
    pub message: String,
    pub kind: NotificationKind,
    pub created_at: Instant,
}

impl Notification {
    pub fn is_error(&self) -> bool {
        self.kind == NotificationKind::Error
    }

    pub fn is_expired(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.created_at) > NOTIFICATION_LIFETIME
    }
}

/// Result of one full-collection fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchOutcome {
    /// The local view was replaced with this many photos.
    Updated(usize),
    Failed,
    TimedOut,
}

impl FetchOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, FetchOutcome::Updated(_))
    }
}

/// What a timer tick did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickAction {
    /// Nothing was due.
    Idle,
    /// The post-mutation verification refetch ran.
    Verified(FetchOutcome),
    /// The poll timer fired and a refetch ran.
    Polled(FetchOutcome),
    /// The poll timer fired inside the quiet period; no request was made.
    Suppressed,
}

#[derive(Debug, Clone)]
pub struct SyncSettings {
    pub poll_interval: Duration,
    pub quiet_period: Duration,
    pub verify_delay: Duration,
    pub fetch_timeout: Duration,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self::from(&SyncConfig::default())
    }
}

impl From<&SyncConfig> for SyncSettings {
    fn from(config: &SyncConfig) -> Self {
        Self {
            poll_interval: config.poll_interval(),
            quiet_period: config.quiet_period(),
            verify_delay: config.verify_delay(),
            fetch_timeout: config.fetch_timeout(),
        }
    }
}
