//! FinOS backend HTTP client
//!
//! Wraps `reqwest::Client` with the API key, base URL construction, a
//! request timeout and automatic handling of `429 Too Many Requests`.
//! Non-success statuses become [`RemoteError`]s whose messages carry the
//! status code, so callers can tell transient failures from permanent ones.

use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::RemoteError;

/// Default retry-after duration when header is missing (30 seconds)
const DEFAULT_RETRY_AFTER: Duration = Duration::from_secs(30);

/// Longest server-requested pause honoured before giving up
const MAX_RETRY_AFTER: Duration = Duration::from_secs(3600);

/// Maximum number of retries for 429 responses
const DEFAULT_MAX_RETRIES: u32 = 5;

/// HTTP client for the FinOS sync API
#[derive(Debug, Clone)]
pub struct RestClient {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    max_retries: u32,
}

impl RestClient {
    /// Creates a client for `base_url` with a per-request timeout
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: None,
            max_retries: DEFAULT_MAX_RETRIES,
        })
    }

    /// Sends `key` as a bearer token on every request
    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// Caps the number of 429 retries
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Creates an authenticated request builder for the given method and path
    ///
    /// # Arguments
    /// * `method` - HTTP method
    /// * `path` - API path relative to base URL (e.g., "/v1/sync/versions")
    pub fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let url = format!("{}{}", self.base_url, path);
        let builder = self.client.request(method, &url);
        match &self.api_key {
            Some(key) => builder.bearer_auth(key),
            None => builder,
        }
    }

    /// Sends a request, retrying on 429 and failing on any other error status
    ///
    /// `build` is called once per attempt because request builders cannot be
    /// reused.
    pub async fn execute<F>(&self, path: &str, build: F) -> Result<Response>
    where
        F: Fn() -> RequestBuilder,
    {
        for attempt in 0..=self.max_retries {
            let response = build()
                .send()
                .await
                .map_err(RemoteError::from)
                .with_context(|| format!("Request to {path} failed"))?;

            let status = response.status();
            if status == StatusCode::TOO_MANY_REQUESTS {
                let retry_after = response
                    .headers()
                    .get("Retry-After")
                    .and_then(|v| v.to_str().ok())
                    .map(|v| parse_retry_after(v, DEFAULT_RETRY_AFTER))
                    .unwrap_or(DEFAULT_RETRY_AFTER);

                if attempt >= self.max_retries {
                    warn!(path, attempts = attempt + 1, "429 retry limit exhausted");
                    return Err(anyhow::Error::new(RemoteError::TooManyRequests { retry_after }))
                        .with_context(|| format!("Request to {path} was throttled"));
                }

                info!(
                    path,
                    attempt,
                    retry_after_ms = retry_after.as_millis() as u64,
                    "Received 429, backing off"
                );
                tokio::time::sleep(retry_after).await;
                continue;
            }

            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                return Err(anyhow::Error::new(RemoteError::from_status(status, &body)))
                    .with_context(|| format!("Request to {path} failed"));
            }

            if attempt > 0 {
                info!(path, attempt, "Request succeeded after retry");
            }
            return Ok(response);
        }

        Err(anyhow::anyhow!(
            "Request failed: retry loop exited unexpectedly for {}",
            path
        ))
    }

    /// `GET path` and parse the JSON body
    pub async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T> {
        debug!(path, "GET");
        let response = self
            .execute(path, || self.request(Method::GET, path).query(query))
            .await?;
        parse_json(path, response).await
    }

    /// `POST path` with a JSON body and parse the JSON response
    pub async fn post_json<B, T>(&self, path: &str, body: &B) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        debug!(path, "POST");
        let response = self
            .execute(path, || self.request(Method::POST, path).json(body))
            .await?;
        parse_json(path, response).await
    }

    /// Returns a reference to the underlying reqwest Client
    pub fn client(&self) -> &Client {
        &self.client
    }
}

pub(crate) async fn parse_json<T: DeserializeOwned>(path: &str, response: Response) -> Result<T> {
    let bytes = response
        .bytes()
        .await
        .map_err(RemoteError::from)
        .with_context(|| format!("Failed to read response from {path}"))?;
    serde_json::from_slice(&bytes)
        .map_err(|e| RemoteError::InvalidResponse(e.to_string()))
        .with_context(|| format!("Failed to parse response from {path}"))
}

/// Parses a `Retry-After` header value
///
/// Accepts integer seconds or an HTTP date. Anything else, or a date more
/// than an hour away, yields `default`.
pub fn parse_retry_after(value: &str, default: Duration) -> Duration {
    if let Ok(seconds) = value.trim().parse::<u64>() {
        return Duration::from_secs(seconds).min(MAX_RETRY_AFTER);
    }

    if let Ok(date) = chrono::DateTime::parse_from_rfc2822(value.trim()) {
        let now = chrono::Utc::now();
        let target = date.with_timezone(&chrono::Utc);
        if target > now {
            if let Ok(wait) = (target - now).to_std() {
                if wait <= MAX_RETRY_AFTER {
                    return wait;
                }
            }
        }
    }

    warn!(value, "Could not parse Retry-After header, using default");
    default
}
