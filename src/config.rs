//! Application-level configuration loading for the leaderboard runtime knobs.

use std::{env, fs, io::ErrorKind, path::PathBuf, time::Duration};

use serde::Deserialize;
use tracing::{info, warn};

/// Default location on disk where the server looks for the JSON configuration.
const DEFAULT_CONFIG_PATH: &str = "config/app.json";
/// Environment variable that overrides [`DEFAULT_CONFIG_PATH`].
const CONFIG_PATH_ENV: &str = "SCORE_PULSE_BACK_CONFIG_PATH";

const DEFAULT_MAX_UPDATES_PER_MINUTE: usize = 60;
const DEFAULT_IDLE_SWEEP_INTERVAL_SECS: u64 = 5 * 60;
const DEFAULT_IDLE_TIMEOUT_SECS: u64 = 10 * 60;
const DEFAULT_RECENT_WINDOW_SECS: u64 = 5 * 60;

#[derive(Debug, Clone)]
/// Immutable runtime configuration shared across the application.
pub struct AppConfig {
    max_updates_per_minute: usize,
    idle_sweep_interval: Duration,
    idle_timeout: Duration,
    recent_window: Duration,
}

impl AppConfig {
    /// Load the application configuration from disk, falling back to baked-in defaults.
    pub fn load() -> Self {
        let path = resolve_config_path();
        match fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str::<RawConfig>(&contents) {
                Ok(raw) => {
                    let config: Self = raw.into();
                    info!(
                        path = %path.display(),
                        max_updates_per_minute = config.max_updates_per_minute,
                        "loaded runtime configuration"
                    );
                    config
                }
                Err(err) => {
                    warn!(
                        path = %path.display(),
                        error = %err,
                        "failed to parse config; falling back to defaults"
                    );
                    Self::default()
                }
            },
            Err(err) if err.kind() == ErrorKind::NotFound => {
                info!(
                    path = %path.display(),
                    "config file not found; using built-in defaults"
                );
                Self::default()
            }
            Err(err) => {
                warn!(
                    path = %path.display(),
                    error = %err,
                    "failed to read config; falling back to defaults"
                );
                Self::default()
            }
        }
    }

    /// Cap on live score updates per player per rolling minute.
    pub fn max_updates_per_minute(&self) -> usize {
        self.max_updates_per_minute
    }

    /// How often the idle sweep task runs.
    pub fn idle_sweep_interval(&self) -> Duration {
        self.idle_sweep_interval
    }

    /// Inactivity span after which a connection is forcibly evicted.
    pub fn idle_timeout(&self) -> Duration {
        self.idle_timeout
    }

    /// Trailing window used by the recently-active leaderboard query.
    pub fn recent_window(&self) -> Duration {
        self.recent_window
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            max_updates_per_minute: DEFAULT_MAX_UPDATES_PER_MINUTE,
            idle_sweep_interval: Duration::from_secs(DEFAULT_IDLE_SWEEP_INTERVAL_SECS),
            idle_timeout: Duration::from_secs(DEFAULT_IDLE_TIMEOUT_SECS),
            recent_window: Duration::from_secs(DEFAULT_RECENT_WINDOW_SECS),
        }
    }
}

#[derive(Debug, Deserialize)]
/// JSON representation of the configuration file located at [`DEFAULT_CONFIG_PATH`].
struct RawConfig {
    max_updates_per_minute: Option<usize>,
    idle_sweep_interval_secs: Option<u64>,
    idle_timeout_secs: Option<u64>,
    recent_window_secs: Option<u64>,
}

impl From<RawConfig> for AppConfig {
    fn from(value: RawConfig) -> Self {
        let defaults = Self::default();
        Self {
            max_updates_per_minute: value
                .max_updates_per_minute
                .unwrap_or(defaults.max_updates_per_minute),
            idle_sweep_interval: value
                .idle_sweep_interval_secs
                .map(Duration::from_secs)
                .unwrap_or(defaults.idle_sweep_interval),
            idle_timeout: value
                .idle_timeout_secs
                .map(Duration::from_secs)
                .unwrap_or(defaults.idle_timeout),
            recent_window: value
                .recent_window_secs
                .map(Duration::from_secs)
                .unwrap_or(defaults.recent_window),
        }
    }
}

/// Resolve the configuration path taking the environment override into account.
fn resolve_config_path() -> PathBuf {
    env::var_os(CONFIG_PATH_ENV)
        .map(PathBuf::from)
        .filter(|path| !path.as_os_str().is_empty())
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}
