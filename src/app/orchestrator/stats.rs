//! Batch statistics aggregation
//!
//! Summarizes a finished batch for logging and CLI display.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::app::models::{BatchResult, ComponentState};

/// Aggregate statistics for one batch run
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BatchStats {
    /// Components requested
    pub total_components: usize,
    /// Components fully installed
    pub completed: usize,
    /// Components that failed (download or install)
    pub failed: usize,
    /// Components skipped because a dependency failed
    pub skipped: usize,
    /// Components cancelled before being attempted
    pub cancelled: usize,
    /// Bytes actually transferred over the network
    pub bytes_downloaded: u64,
    /// Downloads served from the cache
    pub cache_hits: usize,
    /// Total failed download attempts across all components
    pub download_retries: u32,
    /// Total wall-clock time
    #[serde(with = "humantime_serde")]
    pub elapsed: Duration,
}

impl BatchStats {
    /// Derive statistics from a finished batch result
    pub fn from_result(result: &BatchResult) -> Self {
        let mut stats = Self {
            total_components: result.reports.len(),
            elapsed: result.elapsed,
            ..Default::default()
        };

        for report in &result.reports {
            match &report.state {
                ComponentState::Completed => stats.completed += 1,
                ComponentState::Failed { .. } => stats.failed += 1,
                ComponentState::Skipped { .. } => stats.skipped += 1,
                ComponentState::Cancelled => stats.cancelled += 1,
                _ => {}
            }
            if let Some(outcome) = &report.download {
                stats.bytes_downloaded += outcome.bytes_transferred;
                stats.download_retries += outcome.retry_count;
                if outcome.success && outcome.bytes_transferred == 0 {
                    stats.cache_hits += 1;
                }
            }
        }

        stats
    }

    /// Success rate as a percentage of requested components
    pub fn success_rate(&self) -> f64 {
        if self.total_components == 0 {
            0.0
        } else {
            (self.completed as f64 / self.total_components as f64) * 100.0
        }
    }

    /// One-line human summary
    pub fn summary(&self) -> String {
        format!(
            "{}/{} installed ({} failed, {} skipped, {} cancelled), {} bytes fetched, {} cache hits, {} retries in {:.1}s",
            self.completed,
            self.total_components,
            self.failed,
            self.skipped,
            self.cancelled,
            self.bytes_downloaded,
            self.cache_hits,
            self.download_retries,
            self.elapsed.as_secs_f64(),
        )
    }
}
