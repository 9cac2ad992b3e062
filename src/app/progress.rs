//! Progress reporting primitives
//!
//! Download and install progress flows through a fire-and-forget sink: the
//! core never blocks on a slow or absent consumer. Rate calculations use a
//! rolling sample window so the reported speed and ETA track recent
//! throughput rather than the whole transfer.

use std::time::{Duration, Instant};

use tokio::sync::mpsc;
use tracing::debug;

use crate::app::models::DownloadOutcome;
use crate::constants::progress;

/// A point-in-time snapshot of one component's download progress
#[derive(Debug, Clone)]
pub struct ProgressUpdate {
    /// Component name
    pub component: String,
    /// Bytes transferred so far
    pub bytes_so_far: u64,
    /// Total expected bytes, when the server advertised a content length
    pub total_bytes: Option<u64>,
    /// Speed over the last two samples (bytes/sec)
    pub instantaneous_bps: f64,
    /// Speed over the rolling window (bytes/sec)
    pub average_bps: f64,
    /// Estimated time to completion, when computable
    pub eta: Option<Duration>,
}

/// Events delivered to a progress sink
#[derive(Debug, Clone)]
pub enum ProgressEvent {
    /// Mid-transfer snapshot
    Update(ProgressUpdate),
    /// Terminal download outcome for a component
    Outcome {
        component: String,
        outcome: DownloadOutcome,
    },
}

/// Consumer of progress events
///
/// Implementations must not block: the core calls `notify` inline from
/// worker tasks and drops events rather than waiting.
pub trait ProgressSink: Send + Sync {
    /// Deliver an event. Best-effort; implementations drop on overflow.
    fn notify(&self, event: ProgressEvent);
}

/// Sink that forwards events over a bounded channel, dropping on overflow
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::Sender<ProgressEvent>,
}

impl ChannelSink {
    /// Create a sink and the receiving half for a display task
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<ProgressEvent>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx }, rx)
    }
}

impl ProgressSink for ChannelSink {
    fn notify(&self, event: ProgressEvent) {
        // Fire-and-forget: a full or closed channel drops the event
        if let Err(e) = self.tx.try_send(event) {
            debug!("Dropped progress event: {}", e);
        }
    }
}

/// Sink that discards everything
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl ProgressSink for NullSink {
    fn notify(&self, _event: ProgressEvent) {}
}

/// Rate calculator for download speed tracking
///
/// Keeps a rolling window of (time, cumulative bytes) samples.
#[derive(Debug)]
pub struct RateCalculator {
    window: Vec<(Instant, u64)>,
    window_size: usize,
}

impl RateCalculator {
    /// Create a new rate calculator with the specified window size
    pub fn new(window_size: usize) -> Self {
        Self {
            window: Vec::new(),
            window_size,
        }
    }

    /// Create a calculator with the default window size
    pub fn with_default_window() -> Self {
        Self::new(progress::RATE_WINDOW_SIZE)
    }

    /// Add a new cumulative-bytes sample
    pub fn add_sample(&mut self, bytes: u64) {
        self.window.push((Instant::now(), bytes));

        // Keep only the most recent samples
        if self.window.len() > self.window_size {
            self.window.remove(0);
        }
    }

    /// Average rate over the whole window in bytes per second
    pub fn average_rate(&self) -> f64 {
        self.rate_between(0, self.window.len().saturating_sub(1))
    }

    /// Rate over the two most recent samples in bytes per second
    pub fn instantaneous_rate(&self) -> f64 {
        let len = self.window.len();
        if len < 2 {
            return 0.0;
        }
        self.rate_between(len - 2, len - 1)
    }

    /// Estimated time until `remaining_bytes` more bytes arrive
    ///
    /// Returns `None` until enough samples exist or while the rate is zero.
    pub fn eta(&self, remaining_bytes: u64) -> Option<Duration> {
        if self.window.len() < progress::MIN_ETA_SAMPLES {
            return None;
        }
        let rate = self.average_rate();
        if rate <= 0.0 {
            return None;
        }
        Some(Duration::from_secs_f64(remaining_bytes as f64 / rate))
    }

    fn rate_between(&self, start: usize, end: usize) -> f64 {
        if end <= start || end >= self.window.len() {
            return 0.0;
        }
        let (t0, b0) = self.window[start];
        let (t1, b1) = self.window[end];
        let time_diff = t1.duration_since(t0).as_secs_f64();
        let bytes_diff = b1.saturating_sub(b0);

        if time_diff > 0.0 {
            bytes_diff as f64 / time_diff
        } else {
            0.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rate_calculator_needs_two_samples() {
        let mut calc = RateCalculator::new(5);
        assert_eq!(calc.average_rate(), 0.0);

        calc.add_sample(1000);
        assert_eq!(calc.average_rate(), 0.0);
        assert_eq!(calc.instantaneous_rate(), 0.0);
    }

    #[test]
    fn test_rate_calculator_window_bound() {
        let mut calc = RateCalculator::new(3);
        for i in 0..10 {
            calc.add_sample(i * 100);
        }
        assert_eq!(calc.window.len(), 3);
    }

    #[tokio::test]
    async fn test_rate_and_eta_with_spaced_samples() {
        let mut calc = RateCalculator::new(10);
        calc.add_sample(0);
        tokio::time::sleep(Duration::from_millis(50)).await;
        calc.add_sample(50_000);

        let rate = calc.average_rate();
        assert!(rate > 0.0, "rate should be positive, got {rate}");

        let eta = calc.eta(100_000).unwrap();
        assert!(eta > Duration::ZERO);
    }

    #[test]
    fn test_channel_sink_drops_on_overflow() {
        let (sink, mut rx) = ChannelSink::new(1);
        let update = ProgressUpdate {
            component: "tool".to_string(),
            bytes_so_far: 10,
            total_bytes: Some(100),
            instantaneous_bps: 0.0,
            average_bps: 0.0,
            eta: None,
        };

        // Second notify overflows the capacity-1 channel; neither blocks
        sink.notify(ProgressEvent::Update(update.clone()));
        sink.notify(ProgressEvent::Update(update));

        assert!(rx.try_recv().is_ok());
        assert!(rx.try_recv().is_err());
    }
}
