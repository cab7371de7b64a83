//! Load configuration via `config` crate with env-override support.

use std::{ops::Deref, sync::Arc, time::Duration};

use serde::Deserialize;

use crate::base::messages;

use super::types::{Res, Void};

/// Default backend endpoint (the mock backend's route on the default port).
fn default_backend_url() -> String {
    "http://127.0.0.1:8080/v1/chat/stream".to_string()
}

/// Default number of pool workers.
fn default_worker_count() -> usize {
    100
}

/// Default delay between two outbound fragments, in milliseconds.
fn default_pacing_delay_ms() -> u64 {
    500
}

/// Default total number of backend connection attempts.
fn default_retry_attempts() -> u32 {
    3
}

/// Default backoff unit between attempts, in milliseconds.
fn default_retry_backoff_ms() -> u64 {
    1000
}

/// Default connect timeout for a single backend attempt, in seconds.
fn default_backend_connect_timeout_secs() -> u64 {
    10
}

/// Default bound on a single backend read, in seconds.
fn default_backend_read_timeout_secs() -> u64 {
    30
}

/// Default text sent when the backend cannot be reached.
fn default_unavailable_message() -> String {
    messages::SERVICE_UNAVAILABLE.to_string()
}

/// Default text sent when the backend rejects a request.
fn default_rejected_message() -> String {
    messages::REQUEST_REJECTED.to_string()
}

/// Default port of the mock backend.
fn default_mock_backend_port() -> u16 {
    8080
}

/// Configuration for the chat relay bot.
///
/// Loaded once at startup and handed to each component by value; it is
/// trivially cloneable and never mutated afterwards.
#[derive(Debug, Clone, Default)]
pub struct Config {
    pub inner: Arc<ConfigInner>,
}

impl Deref for Config {
    type Target = ConfigInner;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

impl From<ConfigInner> for Config {
    fn from(inner: ConfigInner) -> Self {
        Self { inner: Arc::new(inner) }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ConfigInner {
    /// Slack app token (`CHAT_RELAY_SLACK_APP_TOKEN`).
    #[serde(default)]
    pub slack_app_token: String,
    /// Slack bot token (`CHAT_RELAY_SLACK_BOT_TOKEN`).
    #[serde(default)]
    pub slack_bot_token: String,
    /// Backend endpoint URL (`CHAT_RELAY_BACKEND_URL`).
    #[serde(default = "default_backend_url")]
    pub backend_url: String,
    /// Number of concurrent relay workers (`CHAT_RELAY_WORKER_COUNT`).
    /// The task queue holds twice as many pending tasks.
    #[serde(default = "default_worker_count")]
    pub worker_count: usize,
    /// Delay between two outbound fragments of one reply (`CHAT_RELAY_PACING_DELAY_MS`).
    #[serde(default = "default_pacing_delay_ms")]
    pub pacing_delay_ms: u64,
    /// Total backend connection attempts (`CHAT_RELAY_RETRY_ATTEMPTS`).
    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: u32,
    /// Linear backoff unit; attempt `n` waits `n * unit` (`CHAT_RELAY_RETRY_BACKOFF_MS`).
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
    /// Connect timeout of a single backend attempt (`CHAT_RELAY_BACKEND_CONNECT_TIMEOUT_SECS`).
    #[serde(default = "default_backend_connect_timeout_secs")]
    pub backend_connect_timeout_secs: u64,
    /// Longest silence tolerated while reading a backend response (`CHAT_RELAY_BACKEND_READ_TIMEOUT_SECS`).
    /// A stalled stream ends after the fragments already received.
    #[serde(default = "default_backend_read_timeout_secs")]
    pub backend_read_timeout_secs: u64,
    /// Text sent when the backend is unreachable (`CHAT_RELAY_UNAVAILABLE_MESSAGE`).
    #[serde(default = "default_unavailable_message")]
    pub unavailable_message: String,
    /// Text sent when the backend rejects a request (`CHAT_RELAY_REJECTED_MESSAGE`).
    #[serde(default = "default_rejected_message")]
    pub rejected_message: String,
    /// Serve the built-in mock backend (`CHAT_RELAY_MOCK_BACKEND`).
    #[serde(default)]
    pub mock_backend: bool,
    /// Port of the built-in mock backend (`CHAT_RELAY_MOCK_BACKEND_PORT`).
    #[serde(default = "default_mock_backend_port")]
    pub mock_backend_port: u16,
}

impl Default for ConfigInner {
    fn default() -> Self {
        Self {
            slack_app_token: String::new(),
            slack_bot_token: String::new(),
            backend_url: default_backend_url(),
            worker_count: default_worker_count(),
            pacing_delay_ms: default_pacing_delay_ms(),
            retry_attempts: default_retry_attempts(),
            retry_backoff_ms: default_retry_backoff_ms(),
            backend_connect_timeout_secs: default_backend_connect_timeout_secs(),
            backend_read_timeout_secs: default_backend_read_timeout_secs(),
            unavailable_message: default_unavailable_message(),
            rejected_message: default_rejected_message(),
            mock_backend: false,
            mock_backend_port: default_mock_backend_port(),
        }
    }
}

impl ConfigInner {
    pub fn pacing_delay(&self) -> Duration {
        Duration::from_millis(self.pacing_delay_ms)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }

    pub fn backend_connect_timeout(&self) -> Duration {
        Duration::from_secs(self.backend_connect_timeout_secs)
    }

    pub fn backend_read_timeout(&self) -> Duration {
        Duration::from_secs(self.backend_read_timeout_secs)
    }

    /// Check value ranges that serde cannot express.
    pub fn validate(&self) -> Void {
        if self.worker_count < 1 || self.worker_count > 1024 {
            return Err(anyhow::anyhow!("Worker count must be between 1 and 1024."));
        }

        if self.retry_attempts < 1 || self.retry_attempts > 10 {
            return Err(anyhow::anyhow!("Retry attempts must be between 1 and 10."));
        }

        if self.backend_connect_timeout_secs < 1 {
            return Err(anyhow::anyhow!("Backend connect timeout must be at least 1 second."));
        }

        if self.backend_read_timeout_secs < 1 {
            return Err(anyhow::anyhow!("Backend read timeout must be at least 1 second."));
        }

        if self.backend_url.trim().is_empty() {
            return Err(anyhow::anyhow!("Backend URL must not be empty."));
        }

        Ok(())
    }
}

impl Config {
    pub fn load(explicit_path: Option<&std::path::Path>) -> Res<Self> {
        let mut cfg = config::Config::builder().add_source(config::Environment::default().prefix("CHAT_RELAY"));

        if let Some(p) = explicit_path {
            cfg = cfg.add_source(config::File::from(p.to_path_buf()));
        } else if std::path::Path::new(".hidden/config.toml").exists() {
            cfg = cfg.add_source(config::File::with_name(".hidden/config.toml"));
        }

        let inner: ConfigInner = cfg.build()?.try_deserialize()?;
        inner.validate()?;

        Ok(Self::from(inner))
    }
}
