//! Streaming file downloads with staging and atomic promotion
//!
//! The engine streams a response body chunk by chunk into a `.part` staging
//! file, hashing as it writes, and only promotes the file to its public
//! destination after the digest verifies. A failed or mismatched transfer
//! leaves nothing at the destination path.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::StreamExt;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use url::Url;

use crate::app::client::http::HttpHandler;
use crate::app::digest::{Digest, StreamingDigest};
use crate::app::models::ComponentSpec;
use crate::app::progress::{ProgressEvent, ProgressSink, ProgressUpdate, RateCalculator};
use crate::constants::files;
use crate::errors::{DownloadError, DownloadResult};

/// Raw result of a single successful fetch attempt
#[derive(Debug, Clone)]
pub struct FetchSummary {
    /// Bytes transferred over the network
    pub bytes_transferred: u64,
    /// Time spent on this attempt
    pub elapsed: Duration,
    /// Verified digest of the artifact
    pub digest: Digest,
}

/// Streaming download engine with mandatory digest verification
#[derive(Debug)]
pub struct DownloadEngine {
    http: Arc<HttpHandler>,
    staging_dir: PathBuf,
    _staging_guard: Option<tempfile::TempDir>,
}

impl DownloadEngine {
    /// Create an engine staging into the given directory
    ///
    /// The staging directory should live on the same filesystem as the
    /// final destinations so promotion stays a single atomic rename.
    pub fn new(http: Arc<HttpHandler>, staging_dir: PathBuf) -> Self {
        Self {
            http,
            staging_dir,
            _staging_guard: None,
        }
    }

    /// Create an engine staging into a private temporary directory
    ///
    /// The directory lives as long as the engine. Intended for tests and
    /// one-shot tools.
    pub fn with_temp_staging(http: Arc<HttpHandler>) -> DownloadResult<Self> {
        let guard = tempfile::tempdir()?;
        Ok(Self {
            http,
            staging_dir: guard.path().to_path_buf(),
            _staging_guard: Some(guard),
        })
    }

    /// Download one URL to a destination path, verifying the digest
    ///
    /// Hard precondition: the spec must declare a non-empty digest. A spec
    /// without one is refused before any network activity - that is a
    /// security failure, not a retryable condition.
    ///
    /// On digest mismatch the staged file is deleted and the error carries
    /// both digests. The destination path is only ever populated with a
    /// fully verified artifact, via atomic rename from staging.
    ///
    /// # Errors
    ///
    /// Returns `DownloadError` on precondition, network, I/O or
    /// verification failure.
    pub async fn fetch(
        &self,
        spec: &ComponentSpec,
        url: &Url,
        destination: &Path,
        sink: &dyn ProgressSink,
    ) -> DownloadResult<FetchSummary> {
        let expected = match &spec.digest {
            Some(digest) if !digest.is_empty() => digest.clone(),
            _ => {
                return Err(DownloadError::MissingDigest {
                    component: spec.name.clone(),
                })
            }
        };

        tokio::fs::create_dir_all(&self.staging_dir).await?;
        let staging_path = self.staging_dir.join(format!(
            "{}-{}{}",
            spec.name, spec.version, files::STAGING_SUFFIX
        ));

        let start = Instant::now();
        let result = self
            .stream_to_staging(spec, url, &staging_path, &expected, sink)
            .await;

        let bytes_transferred = match result {
            Ok(bytes) => bytes,
            Err(e) => {
                // Never leave partial state behind
                let _ = tokio::fs::remove_file(&staging_path).await;
                return Err(e);
            }
        };

        // Promote: the destination becomes visible only now, fully verified
        if let Some(parent) = destination.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::rename(&staging_path, destination)
            .await
            .map_err(|_| DownloadError::AtomicOperationFailed {
                staging_path: staging_path.clone(),
                final_path: destination.to_path_buf(),
            })?;

        tracing::info!(
            "Downloaded and verified '{}' from {} ({} bytes)",
            spec.name,
            url,
            bytes_transferred
        );

        Ok(FetchSummary {
            bytes_transferred,
            elapsed: start.elapsed(),
            digest: expected,
        })
    }

    /// Stream the response body into the staging file and verify its digest
    ///
    /// Returns the byte count on success. The caller cleans up staging on
    /// error.
    async fn stream_to_staging(
        &self,
        spec: &ComponentSpec,
        url: &Url,
        staging_path: &Path,
        expected: &Digest,
        sink: &dyn ProgressSink,
    ) -> DownloadResult<u64> {
        let response = self.http.get_response(url).await?;
        let content_length = response.content_length();
        // The size estimate feeds progress display only; completeness is
        // judged against the server's advertised length alone.
        let total_bytes = content_length.or(spec.size_estimate);

        let mut file = File::create(staging_path).await?;
        let mut hasher = StreamingDigest::new(expected.algorithm);
        let mut rate = RateCalculator::with_default_window();
        let mut bytes_so_far: u64 = 0;
        let mut last_reported: u64 = 0;

        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            file.write_all(&chunk).await?;
            hasher.update(&chunk);
            bytes_so_far += chunk.len() as u64;

            if bytes_so_far - last_reported >= files::PROGRESS_CHUNK_BYTES {
                last_reported = bytes_so_far;
                rate.add_sample(bytes_so_far);
                sink.notify(ProgressEvent::Update(ProgressUpdate {
                    component: spec.name.clone(),
                    bytes_so_far,
                    total_bytes,
                    instantaneous_bps: rate.instantaneous_rate(),
                    average_bps: rate.average_rate(),
                    eta: total_bytes
                        .and_then(|total| rate.eta(total.saturating_sub(bytes_so_far))),
                }));
            }
        }

        file.flush().await?;
        drop(file);

        // An advertised content length must be honored in full
        if let Some(expected_len) = content_length {
            if expected_len > 0 && bytes_so_far != expected_len {
                return Err(DownloadError::IncompleteDownload {
                    received: bytes_so_far,
                    expected: expected_len,
                });
            }
        }

        let actual = hasher.finalize();
        if actual != *expected {
            tracing::warn!(
                "Digest mismatch for '{}' from {}: expected {}, got {}",
                spec.name,
                url,
                expected,
                actual
            );
            return Err(DownloadError::DigestMismatch {
                component: spec.name.clone(),
                expected: expected.to_string(),
                actual: actual.to_string(),
            });
        }

        Ok(bytes_so_far)
    }
}
