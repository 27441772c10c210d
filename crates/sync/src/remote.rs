//! Client for the remote content API.

use std::sync::RwLock;
use std::time::Duration;

use async_trait::async_trait;
use church_core::content::PublishedFilter;
use church_core::{ApiEnvelope, ContentRecord, ContentType, Fields};
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use tracing::{debug, instrument, warn};

use crate::config::{RetryPolicy, ServiceConfig};
use crate::error::RemoteError;

const NO_QUERY: &[(&str, &str)] = &[];
const PUBLISHED_QUERY: &[(&str, &str)] = &[("published", "true")];

/// The remote sink as the data service sees it. `Ok(None)` / `Ok(false)`
/// mean the remote answered and does not have the record.
#[async_trait]
pub trait ContentRemote: Send + Sync {
    async fn list(&self, content_type: ContentType, published_only: bool) -> Result<Vec<ContentRecord>, RemoteError>;

    async fn get(&self, content_type: ContentType, id: &str) -> Result<Option<ContentRecord>, RemoteError>;

    async fn create(&self, content_type: ContentType, fields: &Fields) -> Result<ContentRecord, RemoteError>;

    async fn update(
        &self,
        content_type: ContentType,
        id: &str,
        fields: &Fields,
    ) -> Result<Option<ContentRecord>, RemoteError>;

    async fn delete(&self, content_type: ContentType, id: &str) -> Result<bool, RemoteError>;
}

/// `reqwest`-backed implementation speaking the `{ success, message, data }`
/// envelope.
#[derive(Debug)]
pub struct HttpRemote {
    client: reqwest::Client,
    base_url: String,
    token: RwLock<Option<String>>,
    retry: RetryPolicy,
}

impl HttpRemote {
    pub fn new(base_url: &str, retry: RetryPolicy, timeout: Duration) -> Result<Self, RemoteError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: RwLock::new(None),
            retry,
        })
    }

    /// `None` when the configuration has no API base url.
    pub fn from_config(config: &ServiceConfig) -> Result<Option<Self>, RemoteError> {
        let Some(base_url) = config.api_base_url.as_deref() else {
            return Ok(None);
        };
        let remote = Self::new(base_url, config.retry.clone(), config.request_timeout)?;
        remote.set_token(config.auth_token.clone());
        Ok(Some(remote))
    }

    pub fn set_token(&self, token: Option<String>) {
        match self.token.write() {
            Ok(mut slot) => *slot = token,
            Err(poisoned) => *poisoned.into_inner() = token,
        }
    }

    fn token(&self) -> Option<String> {
        match self.token.read() {
            Ok(slot) => slot.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    fn collection_url(&self, content_type: ContentType) -> String {
        format!("{}/{}", self.base_url, content_type.path_segment())
    }

    fn record_url(&self, content_type: ContentType, id: &str) -> String {
        format!("{}/{}", self.collection_url(content_type), id)
    }

    /// Send with bounded retries. `Ok(None)` is a 404.
    #[instrument(name = "remote_send", skip(self, query, body))]
    async fn send<T: DeserializeOwned>(
        &self,
        method: Method,
        url: &str,
        query: &[(&str, &str)],
        body: Option<&Fields>,
    ) -> Result<Option<T>, RemoteError> {
        let token = self.token();
        let max_attempts = self.retry.max_attempts.max(1);
        let mut attempt = 0;
        loop {
            attempt += 1;
            let mut request = self.client.request(method.clone(), url).query(query);
            if let Some(token) = &token {
                request = request.bearer_auth(token);
            }
            if let Some(body) = body {
                request = request.json(body);
            }

            let error = match request.send().await {
                Ok(response) => match response.status() {
                    StatusCode::UNAUTHORIZED => return Err(RemoteError::Unauthorized),
                    StatusCode::NOT_FOUND => return Ok(None),
                    status if status.is_success() => {
                        let envelope: ApiEnvelope<T> = response.json().await?;
                        if !envelope.success {
                            return Err(RemoteError::Rejected(envelope.message.unwrap_or_default()));
                        }
                        return envelope
                            .data
                            .map(Some)
                            .ok_or_else(|| RemoteError::Decode("envelope without data".into()));
                    }
                    status => {
                        let message = response
                            .json::<ApiEnvelope<serde_json::Value>>()
                            .await
                            .ok()
                            .and_then(|env| env.message)
                            .unwrap_or_else(|| status.to_string());
                        RemoteError::Status {
                            status: status.as_u16(),
                            message,
                        }
                    }
                },
                Err(err) => RemoteError::from(err),
            };

            if !error.is_retryable() || attempt >= max_attempts {
                return Err(error);
            }
            let delay = self.retry.backoff(attempt);
            warn!(url, attempt, error = %error, delay_ms = delay.as_millis() as u64, "remote call failed, retrying");
            tokio::time::sleep(delay).await;
        }
    }
}

#[async_trait]
impl ContentRemote for HttpRemote {
    async fn list(&self, content_type: ContentType, published_only: bool) -> Result<Vec<ContentRecord>, RemoteError> {
        let (url, query) = match (published_only, content_type.published_filter()) {
            (false, _) => (self.collection_url(content_type), NO_QUERY),
            (true, PublishedFilter::PathSuffix) => (format!("{}/public", self.collection_url(content_type)), NO_QUERY),
            (true, PublishedFilter::QueryParam) => (self.collection_url(content_type), PUBLISHED_QUERY),
        };
        let records = self.send::<Vec<ContentRecord>>(Method::GET, &url, query, None).await?;
        debug!(%content_type, published_only, count = records.as_ref().map_or(0, Vec::len), "remote list");
        records.ok_or_else(|| RemoteError::Status {
            status: 404,
            message: format!("{url} not found"),
        })
    }

    async fn get(&self, content_type: ContentType, id: &str) -> Result<Option<ContentRecord>, RemoteError> {
        self.send(Method::GET, &self.record_url(content_type, id), &[], None).await
    }

    async fn create(&self, content_type: ContentType, fields: &Fields) -> Result<ContentRecord, RemoteError> {
        let url = self.collection_url(content_type);
        self.send(Method::POST, &url, &[], Some(fields))
            .await?
            .ok_or_else(|| RemoteError::Status {
                status: 404,
                message: format!("{url} not found"),
            })
    }

    async fn update(
        &self,
        content_type: ContentType,
        id: &str,
        fields: &Fields,
    ) -> Result<Option<ContentRecord>, RemoteError> {
        self.send(Method::PUT, &self.record_url(content_type, id), &[], Some(fields))
            .await
    }

    async fn delete(&self, content_type: ContentType, id: &str) -> Result<bool, RemoteError> {
        let deleted = self
            .send::<serde_json::Value>(Method::DELETE, &self.record_url(content_type, id), &[], None)
            .await?;
        Ok(deleted.is_some())
    }
}
