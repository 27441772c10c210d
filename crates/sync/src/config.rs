use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::error::ConfigError;

/// Bounded retry with exponential backoff for remote calls.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: usize,
    pub base_backoff_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_backoff_ms: 250,
        }
    }
}

impl RetryPolicy {
    /// Single attempt, no waiting.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            base_backoff_ms: 0,
        }
    }

    /// Delay before attempt `attempt + 1`, doubling from the base.
    pub fn backoff(&self, attempt: usize) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16) as u32;
        Duration::from_millis(self.base_backoff_ms.saturating_mul(1u64 << exponent))
    }
}

/// Limits applied to inline (data url) media before it reaches the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaLimits {
    /// Inline payloads above this many bytes are compressed (images) or
    /// reported (audio, video).
    pub inline_threshold_bytes: usize,
    /// Bounding box for downsampled images.
    pub max_dimension: u32,
    pub start_quality: u8,
    pub min_quality: u8,
    pub quality_step: u8,
    /// Stop lowering quality once the encoded image fits.
    pub target_bytes: usize,
}

impl Default for MediaLimits {
    fn default() -> Self {
        Self {
            inline_threshold_bytes: 500 * 1024,
            max_dimension: 1200,
            start_quality: 80,
            min_quality: 30,
            quality_step: 10,
            target_bytes: 300 * 1024,
        }
    }
}

/// Everything that decides how the data service picks its sinks.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Base url of the content API (e.g. `https://church.example/api`).
    /// `None` runs against the local store only.
    pub api_base_url: Option<String>,
    /// Bearer token sent with remote requests.
    pub auth_token: Option<String>,
    /// Mirror successful remote writes into the local store.
    pub dual_write: bool,
    /// Serve reads and accept writes locally when the remote fails.
    pub local_fallback: bool,
    /// Queue locally-applied writes for later replay against the remote.
    pub record_pending: bool,
    pub retry: RetryPolicy,
    pub request_timeout: Duration,
    /// Records kept per collection by the quota cleanup pass.
    pub keep_per_type: usize,
    pub media: MediaLimits,
    /// Renderer full-reload period, independent of signals.
    pub poll_interval: Duration,
    pub signal_capacity: usize,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            api_base_url: None,
            auth_token: None,
            dual_write: true,
            local_fallback: true,
            record_pending: true,
            retry: RetryPolicy::default(),
            request_timeout: Duration::from_secs(15),
            keep_per_type: 10,
            media: MediaLimits::default(),
            poll_interval: Duration::from_secs(60),
            signal_capacity: 256,
        }
    }
}

impl ServiceConfig {
    /// Local-store-only configuration.
    pub fn offline() -> Self {
        Self::default()
    }

    pub fn with_remote(mut self, base_url: impl Into<String>) -> Self {
        self.api_base_url = Some(base_url.into());
        self
    }

    /// Load from `CHURCH_*` environment variables on top of the defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();
        let defaults = Self::default();
        Ok(Self {
            api_base_url: env::var("CHURCH_API_URL").ok().filter(|v| !v.trim().is_empty()),
            auth_token: env::var("CHURCH_API_TOKEN").ok().filter(|v| !v.trim().is_empty()),
            dual_write: parse_var("CHURCH_DUAL_WRITE", defaults.dual_write)?,
            local_fallback: parse_var("CHURCH_LOCAL_FALLBACK", defaults.local_fallback)?,
            record_pending: parse_var("CHURCH_RECORD_PENDING", defaults.record_pending)?,
            retry: RetryPolicy {
                max_attempts: parse_var("CHURCH_RETRY_ATTEMPTS", defaults.retry.max_attempts)?,
                base_backoff_ms: parse_var("CHURCH_RETRY_BACKOFF_MS", defaults.retry.base_backoff_ms)?,
            },
            request_timeout: Duration::from_secs(parse_var(
                "CHURCH_REQUEST_TIMEOUT_SECS",
                defaults.request_timeout.as_secs(),
            )?),
            keep_per_type: parse_var("CHURCH_KEEP_PER_TYPE", defaults.keep_per_type)?,
            media: defaults.media,
            poll_interval: Duration::from_secs(parse_var(
                "CHURCH_POLL_INTERVAL_SECS",
                defaults.poll_interval.as_secs(),
            )?),
            signal_capacity: defaults.signal_capacity,
        })
    }
}

fn parse_var<T: FromStr>(key: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(key) {
        Ok(value) if !value.trim().is_empty() => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { key, value }),
        _ => Ok(default),
    }
}
