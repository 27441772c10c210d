use church_core::content::validate::ValidationError;
use thiserror::Error;

/// Failures of the local persistent store.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("storage quota exceeded ({0}); try a smaller file or clear data")]
    QuotaExceeded(String),

    #[error("invalid storage key: {0}")]
    InvalidKey(String),

    #[error("storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("storage serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StorageError {
    pub fn is_quota(&self) -> bool {
        matches!(self, StorageError::QuotaExceeded(_))
    }
}

/// Failures talking to the remote content API.
#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("remote unreachable: {0}")]
    Transport(String),

    #[error("remote rejected credentials")]
    Unauthorized,

    #[error("remote answered {status}: {message}")]
    Status { status: u16, message: String },

    #[error("remote reported failure: {0}")]
    Rejected(String),

    #[error("remote payload malformed: {0}")]
    Decode(String),
}

impl RemoteError {
    /// Worth another attempt: transport failures, 5xx and 429.
    pub fn is_retryable(&self) -> bool {
        match self {
            RemoteError::Transport(_) => true,
            RemoteError::Status { status, .. } => *status >= 500 || *status == 429,
            _ => false,
        }
    }
}

impl From<reqwest::Error> for RemoteError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            RemoteError::Decode(err.to_string())
        } else {
            RemoteError::Transport(err.to_string())
        }
    }
}

/// Failures surfaced by the data service. Remote-only failures never show up
/// here while the local fallback succeeds.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("authentication required")]
    Unauthorized,

    #[error(transparent)]
    Invalid(#[from] ValidationError),

    #[error("remote write failed and local fallback is disabled: {0}")]
    RemoteOnly(RemoteError),

    #[error("record payload invalid: {0}")]
    InvalidRecord(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for {key}: {value:?}")]
    Invalid { key: &'static str, value: String },
}
