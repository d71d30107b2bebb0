//! HTTP API client for the Miso data API
//!
//! One `reqwest::Client` is shared by every call of a run. Transient
//! failures are retried with exponential backoff before the response (or the
//! error) is handed back to the caller.

use crate::api::{endpoints, ApiError};
use crate::classify::EntityKind;
use crate::record::Record;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde_json::{json, Map, Value};
use std::collections::{BTreeSet, HashSet};
use std::time::Duration;
use tracing::{debug, warn};

// ============================================================================
// API Client Constants
// ============================================================================

/// Default timeout for one request in seconds.
/// Large product batches can take minutes to be accepted.
pub const DEFAULT_API_TIMEOUT_SECS: u64 = 300;

/// Total attempts per request, the first one included.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Backoff before the second attempt; doubles for each later attempt.
pub const DEFAULT_INITIAL_BACKOFF_MS: u64 = 1000;

/// Statuses worth retrying. Miso answers 401/403 transiently under load.
pub const RETRYABLE_STATUSES: [u16; 7] = [401, 403, 429, 500, 502, 503, 504];

/// Retry settings for one request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            initial_backoff: Duration::from_millis(DEFAULT_INITIAL_BACKOFF_MS),
        }
    }
}

impl RetryPolicy {
    /// Delay after failed attempt number `attempt` (1-based), saturating
    /// instead of overflowing for large attempt counts
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2_u32
            .checked_pow(attempt.saturating_sub(1))
            .unwrap_or(u32::MAX);
        self.initial_backoff.saturating_mul(factor)
    }
}

/// Connection settings for [`MisoClient`]
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub base_url: String,
    pub api_key: String,
    pub use_async: bool,
    pub timeout: Duration,
    pub retry: RetryPolicy,
}

impl ClientConfig {
    /// Settings with default timeout and retry policy
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: api_key.into(),
            use_async: false,
            timeout: Duration::from_secs(DEFAULT_API_TIMEOUT_SECS),
            retry: RetryPolicy::default(),
        }
    }
}

/// Whether a status should be retried
pub fn is_retryable_status(status: StatusCode) -> bool {
    RETRYABLE_STATUSES.contains(&status.as_u16())
}

fn is_retryable_error(error: &reqwest::Error) -> bool {
    error.is_connect() || error.is_timeout()
}

/// API client for the Miso server
pub struct MisoClient {
    client: Client,
    config: ClientConfig,
}

impl MisoClient {
    /// Create a new API client
    pub fn new(config: ClientConfig) -> Result<Self, ApiError> {
        let client = Client::builder().timeout(config.timeout).build()?;

        Ok(Self { client, config })
    }

    /// Server base URL
    pub fn base_url(&self) -> &str {
        &self.config.base_url
    }

    /// Upload one batch of records
    ///
    /// Returns the response body of the accepted request.
    pub async fn upload(&self, kind: EntityKind, records: &[Record]) -> Result<String, ApiError> {
        let url = endpoints::upload_url(
            &self.config.base_url,
            kind,
            &self.config.api_key,
            self.config.use_async,
        );
        let body = json!({ "data": records });

        let response = self
            .send_with_retry(kind, || self.client.post(&url).json(&body))
            .await?;
        let response = ensure_success(kind, response).await?;

        Ok(response.text().await?)
    }

    /// List the ids the server currently holds for a kind
    ///
    /// A 404 means the collection is empty.
    pub async fn existing_ids(&self, kind: EntityKind) -> Result<HashSet<String>, ApiError> {
        let url = endpoints::ids_url(&self.config.base_url, kind, &self.config.api_key);

        let response = self.send_with_retry(kind, || self.client.get(&url)).await?;

        if response.status() == StatusCode::NOT_FOUND {
            debug!(kind = %kind, "No ids stored remotely");
            return Ok(HashSet::new());
        }

        let response = ensure_success(kind, response).await?;
        let body: Value = response.json().await?;

        parse_ids(&body)
    }

    /// Delete records by id
    pub async fn delete(&self, kind: EntityKind, ids: &BTreeSet<String>) -> Result<(), ApiError> {
        let field = kind
            .id_list_field()
            .ok_or_else(|| ApiError::invalid_response(format!("{} cannot be deleted", kind)))?;
        let url = endpoints::delete_url(&self.config.base_url, kind, &self.config.api_key);

        let mut id_list = Map::new();
        id_list.insert(
            field.to_string(),
            Value::Array(ids.iter().cloned().map(Value::String).collect()),
        );
        let body = json!({ "data": Value::Object(id_list) });

        let response = self
            .send_with_retry(kind, || self.client.post(&url).json(&body))
            .await?;
        ensure_success(kind, response).await?;

        Ok(())
    }

    /// Send a request, retrying transient failures
    ///
    /// After the last attempt the final response is returned whatever its
    /// status, so callers see the real server answer.
    async fn send_with_retry<F>(&self, kind: EntityKind, build: F) -> Result<Response, ApiError>
    where
        F: Fn() -> RequestBuilder,
    {
        let policy = self.config.retry;
        let max_attempts = policy.max_attempts.max(1);
        let mut attempt = 0;

        loop {
            attempt += 1;

            match build().send().await {
                Ok(response) => {
                    let status = response.status();
                    if !is_retryable_status(status) || attempt >= max_attempts {
                        return Ok(response);
                    }
                    let backoff_ms = policy.backoff(attempt).as_millis() as u64;
                    warn!(
                        kind = %kind,
                        status = status.as_u16(),
                        attempt = attempt,
                        backoff_ms = backoff_ms,
                        "Request failed, retrying..."
                    );
                },
                Err(e) => {
                    if !is_retryable_error(&e) || attempt >= max_attempts {
                        return Err(e.into());
                    }
                    let backoff_ms = policy.backoff(attempt).as_millis() as u64;
                    warn!(
                        kind = %kind,
                        error = %e,
                        attempt = attempt,
                        backoff_ms = backoff_ms,
                        "Request failed, retrying..."
                    );
                },
            }

            tokio::time::sleep(policy.backoff(attempt)).await;
        }
    }
}

async fn ensure_success(kind: EntityKind, response: Response) -> Result<Response, ApiError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    Err(ApiError::Status { kind, status, body })
}

fn parse_ids(body: &Value) -> Result<HashSet<String>, ApiError> {
    let ids = body
        .pointer("/data/ids")
        .and_then(Value::as_array)
        .ok_or_else(|| ApiError::invalid_response("missing 'data.ids' array in id listing"))?;

    ids.iter()
        .map(|id| match id {
            Value::String(s) => Ok(s.clone()),
            Value::Number(n) => Ok(n.to_string()),
            other => Err(ApiError::invalid_response(format!("invalid id {}", other))),
        })
        .collect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_policy_defaults() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts, 3);
        assert_eq!(policy.backoff(1), Duration::from_millis(1000));
        assert_eq!(policy.backoff(2), Duration::from_millis(2000));
        assert_eq!(policy.backoff(3), Duration::from_millis(4000));
    }

    #[test]
    fn test_backoff_saturates_for_large_attempts() {
        let policy = RetryPolicy {
            max_attempts: 100,
            initial_backoff: Duration::from_millis(1000),
        };
        assert_eq!(policy.backoff(33), Duration::from_millis(1000) * u32::MAX);
        assert_eq!(policy.backoff(u32::MAX), Duration::from_millis(1000) * u32::MAX);

        let huge = RetryPolicy {
            max_attempts: 3,
            initial_backoff: Duration::MAX,
        };
        assert_eq!(huge.backoff(2), Duration::MAX);
    }

    #[test]
    fn test_retryable_statuses() {
        for code in [401, 403, 429, 500, 502, 503, 504] {
            assert!(is_retryable_status(StatusCode::from_u16(code).unwrap()));
        }
        for code in [200, 400, 404, 422, 501] {
            assert!(!is_retryable_status(StatusCode::from_u16(code).unwrap()));
        }
    }

    #[test]
    fn test_parse_ids() {
        let ids = parse_ids(&json!({"data": {"ids": ["a", 7]}})).unwrap();
        assert_eq!(ids, HashSet::from(["a".to_string(), "7".to_string()]));

        assert!(parse_ids(&json!({"data": {}})).is_err());
        assert!(parse_ids(&json!({"data": {"ids": [null]}})).is_err());
    }

    #[test]
    fn test_client_config_defaults() {
        let config = ClientConfig::new("http://localhost", "key");
        assert!(!config.use_async);
        assert_eq!(config.timeout, Duration::from_secs(300));
        assert_eq!(config.retry, RetryPolicy::default());
    }
}
