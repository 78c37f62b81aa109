pub mod channels;
pub mod rate_limit;
pub mod registry;

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{RwLock, watch};

use crate::{
    config::AppConfig,
    dao::score_store::ScoreStore,
    error::ServiceError,
    state::{rate_limit::RateLimiter, registry::ConnectionRegistry},
};

pub type SharedState = Arc<AppState>;

/// Central application state: the installed store backend, the live
/// connection registry, and the score-update rate limiter.
pub struct AppState {
    score_store: RwLock<Option<Arc<dyn ScoreStore>>>,
    registry: ConnectionRegistry,
    rate_limiter: RateLimiter,
    config: AppConfig,
    degraded: watch::Sender<bool>,
    started_at: Instant,
}

impl AppState {
    /// Construct a new [`AppState`] wrapped in an [`Arc`] so it can be cloned cheaply.
    ///
    /// The application starts in degraded mode until a storage backend is installed.
    pub fn new(config: AppConfig) -> SharedState {
        let (degraded_tx, _rx) = watch::channel(true);
        let rate_limiter = RateLimiter::new(
            config.max_updates_per_minute(),
            Duration::from_secs(60),
        );
        Arc::new(Self {
            score_store: RwLock::new(None),
            registry: ConnectionRegistry::new(),
            rate_limiter,
            config,
            degraded: degraded_tx,
            started_at: Instant::now(),
        })
    }

    /// Obtain a handle to the current score store, if one is installed.
    pub async fn score_store(&self) -> Option<Arc<dyn ScoreStore>> {
        let guard = self.score_store.read().await;
        guard.as_ref().cloned()
    }

    /// Obtain the score store or fail with the degraded-mode service error.
    pub async fn require_score_store(&self) -> Result<Arc<dyn ScoreStore>, ServiceError> {
        self.score_store().await.ok_or(ServiceError::Degraded)
    }

    /// Install a new score store implementation and leave degraded mode.
    pub async fn install_score_store(&self, store: Arc<dyn ScoreStore>) {
        {
            let mut guard = self.score_store.write().await;
            *guard = Some(store);
        }
        self.update_degraded(false).await;
    }

    /// Remove the current score store and enter degraded mode.
    pub async fn clear_score_store(&self) {
        {
            let mut guard = self.score_store.write().await;
            guard.take();
        }
        self.update_degraded(true).await;
    }

    /// Current degraded flag.
    pub async fn is_degraded(&self) -> bool {
        let guard = self.score_store.read().await;
        guard.is_none()
    }

    /// Subscribe to degraded mode updates.
    pub fn degraded_watcher(&self) -> watch::Receiver<bool> {
        self.degraded.subscribe()
    }

    /// Registry of live connections and their channel subscriptions.
    pub fn registry(&self) -> &ConnectionRegistry {
        &self.registry
    }

    /// Sliding-window limiter for live score updates.
    pub fn rate_limiter(&self) -> &RateLimiter {
        &self.rate_limiter
    }

    /// Immutable runtime configuration.
    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Time elapsed since this state was built, for the health probe.
    pub fn uptime(&self) -> Duration {
        self.started_at.elapsed()
    }

    /// Update and broadcast the degraded flag when the value changes.
    async fn update_degraded(&self, value: bool) {
        if self.is_degraded().await == value {
            return;
        }

        let _ = self.degraded.send(value);
    }
}
