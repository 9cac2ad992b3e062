//! Bounded download retries with mirror fallback
//!
//! The coordinator wraps the download engine with the retry policy: each
//! candidate URL gets a bounded number of attempts for transient failures,
//! with exponential backoff plus jitter between attempts; a digest mismatch
//! moves straight to the next mirror (never the same URL back-to-back) and
//! mismatch attempts are capped across all mirrors; a security failure
//! (missing digest) aborts immediately with zero retries.

use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use backoff::backoff::Backoff;
use backoff::ExponentialBackoffBuilder;
use tracing::{debug, info, warn};

use crate::app::client::download::DownloadEngine;
use crate::app::mirrors::MirrorResolver;
use crate::app::models::{ComponentSpec, DownloadOutcome, FailureClass};
use crate::app::progress::ProgressSink;
use crate::constants::limits;
use crate::errors::DownloadError;

/// Retry policy configuration
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Attempt budget per candidate URL (and cap on mismatch attempts)
    pub max_attempts: u32,
    /// Initial backoff delay
    pub initial_delay: Duration,
    /// Upper bound on a single backoff delay
    pub max_delay: Duration,
    /// Backoff multiplier between successive attempts
    pub multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: limits::MAX_ATTEMPTS,
            initial_delay: limits::RETRY_INITIAL_DELAY,
            max_delay: limits::RETRY_MAX_DELAY,
            multiplier: limits::RETRY_MULTIPLIER,
        }
    }
}

impl RetryConfig {
    /// Configuration for tests: same attempt budget, negligible delays
    pub fn for_testing() -> Self {
        Self {
            max_attempts: limits::MAX_ATTEMPTS,
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
            multiplier: 1.5,
        }
    }
}

/// Drives the download engine across mirror candidates with backoff
#[derive(Debug)]
pub struct RetryCoordinator {
    engine: Arc<DownloadEngine>,
    resolver: Arc<MirrorResolver>,
    config: RetryConfig,
}

impl RetryCoordinator {
    /// Create a coordinator over an engine and a mirror resolver
    pub fn new(
        engine: Arc<DownloadEngine>,
        resolver: Arc<MirrorResolver>,
        config: RetryConfig,
    ) -> Self {
        Self {
            engine,
            resolver,
            config,
        }
    }

    /// Download a component's artifact, retrying across mirrors
    ///
    /// Returns a terminal `DownloadOutcome`; component-level failures are
    /// captured in the outcome rather than propagated as errors. On success
    /// the serving host is reported to the resolver so later downloads try
    /// it first.
    pub async fn download_with_retry(
        &self,
        spec: &ComponentSpec,
        destination: &Path,
        sink: &dyn ProgressSink,
    ) -> DownloadOutcome {
        let start = Instant::now();
        let candidates = self.resolver.candidates(spec).await;

        if candidates.is_empty() {
            return DownloadOutcome::failure(
                FailureClass::Configuration,
                format!(
                    "no usable download URL for '{}'. Fix the catalog entry's url field",
                    spec.name
                ),
                0,
                start.elapsed(),
                0,
            );
        }

        let mut failed_attempts: u32 = 0;
        let mut verification_attempts: u32 = 0;
        let mut attempted_urls: Vec<String> = Vec::new();
        let mut last_error: Option<DownloadError> = None;

        'candidates: for url in &candidates {
            let mut backoff = ExponentialBackoffBuilder::new()
                .with_initial_interval(self.config.initial_delay)
                .with_multiplier(self.config.multiplier)
                .with_max_interval(self.config.max_delay)
                .with_max_elapsed_time(None)
                .build();

            for attempt in 1..=self.config.max_attempts {
                match self.engine.fetch(spec, url, destination, sink).await {
                    Ok(summary) => {
                        self.resolver.record_success(url).await;
                        info!(
                            "Download of '{}' succeeded from {} after {} failed attempts",
                            spec.name, url, failed_attempts
                        );
                        return DownloadOutcome::success(
                            destination.to_path_buf(),
                            summary.bytes_transferred,
                            start.elapsed(),
                            failed_attempts,
                            url.as_str(),
                        );
                    }

                    Err(e @ DownloadError::MissingDigest { .. }) => {
                        // Security precondition: terminal, zero retries
                        warn!("{}", e);
                        return DownloadOutcome::failure(
                            FailureClass::Security,
                            e.to_string(),
                            0,
                            start.elapsed(),
                            0,
                        );
                    }

                    Err(e @ DownloadError::DigestMismatch { .. }) => {
                        failed_attempts += 1;
                        verification_attempts += 1;
                        push_unique(&mut attempted_urls, url.as_str());
                        warn!(
                            "Verification failed for '{}' from {} (mismatch {}/{})",
                            spec.name, url, verification_attempts, self.config.max_attempts
                        );
                        last_error = Some(e);
                        if verification_attempts >= self.config.max_attempts {
                            break 'candidates;
                        }
                        // A mirror serving wrong bytes will keep serving
                        // them; move on instead of retrying the same URL.
                        continue 'candidates;
                    }

                    Err(e) => {
                        failed_attempts += 1;
                        push_unique(&mut attempted_urls, url.as_str());
                        last_error = Some(e);

                        if attempt < self.config.max_attempts {
                            let delay = backoff
                                .next_backoff()
                                .unwrap_or(self.config.max_delay);
                            debug!(
                                "Transient failure for '{}' from {} (attempt {}/{}), backing off {:?}",
                                spec.name, url, attempt, self.config.max_attempts, delay
                            );
                            tokio::time::sleep(delay).await;
                        } else {
                            debug!(
                                "Candidate {} exhausted for '{}', trying next mirror",
                                url, spec.name
                            );
                        }
                    }
                }
            }
        }

        let class = last_error
            .as_ref()
            .map(FailureClass::from)
            .unwrap_or(FailureClass::TransientNetwork);

        let exhausted = DownloadError::MirrorsExhausted {
            component: spec.name.clone(),
            attempts: failed_attempts,
            attempted_urls: attempted_urls.clone(),
            primary_url: spec.url.clone(),
        };
        warn!("{}", exhausted);

        DownloadOutcome::failure(
            class,
            exhausted.to_string(),
            failed_attempts,
            start.elapsed(),
            0,
        )
    }

    /// Retry policy in effect
    pub fn config(&self) -> &RetryConfig {
        &self.config
    }
}

fn push_unique(urls: &mut Vec<String>, url: &str) {
    if !urls.iter().any(|u| u == url) {
        urls.push(url.to_string());
    }
}
