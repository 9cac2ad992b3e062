//! Core HTTP operations with rate limiting
//!
//! This module provides the fundamental HTTP request operations with
//! client-side rate limiting and server status mapping. Retry policy lives
//! one layer up in the retry coordinator, so there is exactly one place
//! deciding when a request is re-attempted.

use std::num::NonZeroU32;
use std::time::Duration;

use governor::{clock::DefaultClock, state::InMemoryState, Jitter, Quota, RateLimiter};
use reqwest::Client;
use url::Url;

use crate::constants::http;
use crate::errors::{ConfigError, ConfigResult, DownloadError, DownloadResult};

/// HTTP operations handler with client-side rate limiting
#[derive(Debug)]
pub struct HttpHandler {
    client: Client,
    rate_limiter: RateLimiter<governor::state::NotKeyed, InMemoryState, DefaultClock>,
}

impl HttpHandler {
    /// Creates a new HttpHandler with the given client and rate limiting
    ///
    /// # Arguments
    ///
    /// * `client` - The HTTP client to use for requests
    /// * `rate_limit_rps` - Requests per second rate limit
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the rate limit is zero.
    pub fn new(client: Client, rate_limit_rps: u32) -> ConfigResult<Self> {
        let rate_limiter = Self::build_rate_limiter(rate_limit_rps)?;
        Ok(Self {
            client,
            rate_limiter,
        })
    }

    /// Builds the rate limiter with the specified rate limit
    fn build_rate_limiter(
        rate_limit_rps: u32,
    ) -> ConfigResult<RateLimiter<governor::state::NotKeyed, InMemoryState, DefaultClock>> {
        let quota = Quota::per_second(NonZeroU32::new(rate_limit_rps).ok_or_else(|| {
            ConfigError::InvalidValue {
                field: "rate_limit_rps".to_string(),
                value: "0".to_string(),
                reason: "rate limit must be non-zero".to_string(),
            }
        })?);
        Ok(RateLimiter::direct(quota))
    }

    /// Fetches the HTTP response for a single GET request
    ///
    /// Returns the raw `reqwest::Response` for streaming downloads. Error
    /// statuses are mapped to typed download errors; no retrying happens at
    /// this level.
    ///
    /// # Errors
    ///
    /// Returns `DownloadError` if the request fails or the server responds
    /// with an error status.
    pub async fn get_response(&self, url: &Url) -> DownloadResult<reqwest::Response> {
        // Jittered rate limiting to avoid thundering herd against mirrors
        self.rate_limiter
            .until_ready_with_jitter(Jitter::up_to(Duration::from_millis(100)))
            .await;

        let response = self.client.get(url.as_str()).send().await?;

        let status = response.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(DownloadError::RateLimitExceeded);
        }
        if !status.is_success() {
            return Err(DownloadError::ServerError {
                status: status.as_u16(),
            });
        }

        tracing::debug!("Fetched response: {} ({})", url, status);
        Ok(response)
    }

    /// Issues a HEAD request, rate limited, without status mapping
    ///
    /// Used by the mirror resolver's reachability probe.
    pub async fn head(&self, url: &Url) -> DownloadResult<reqwest::Response> {
        self.rate_limiter
            .until_ready_with_jitter(Jitter::up_to(Duration::from_millis(100)))
            .await;

        Ok(self.client.head(url.as_str()).send().await?)
    }

    /// Connectivity check consulted before starting a batch
    ///
    /// A HEAD probe against the configured connectivity URL with a bounded
    /// timeout. Advisory: the orchestrator refuses to start a batch while
    /// offline, but an `true` answer guarantees nothing about later requests.
    pub async fn is_online(&self, probe_url: &str) -> bool {
        let url = match Url::parse(probe_url) {
            Ok(url) => url,
            Err(e) => {
                tracing::warn!("Invalid connectivity probe URL '{}': {}", probe_url, e);
                return false;
            }
        };

        match tokio::time::timeout(http::PROBE_TIMEOUT, self.client.head(url.as_str()).send())
            .await
        {
            Ok(Ok(_)) => true,
            Ok(Err(e)) => {
                tracing::debug!("Connectivity probe failed: {}", e);
                false
            }
            Err(_) => {
                tracing::debug!("Connectivity probe timed out");
                false
            }
        }
    }

    /// Get a reference to the underlying HTTP client
    pub fn client(&self) -> &Client {
        &self.client
    }
}
