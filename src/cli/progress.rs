//! Real-time progress display for batch runs
//!
//! Renders the orchestrator's progress events as per-component indicatif
//! bars under a single MultiProgress. The display consumes a bounded
//! channel fed by the fire-and-forget progress sink; dropped events only
//! cost display smoothness, never correctness.

use std::collections::HashMap;

use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::app::progress::{ProgressEvent, ProgressUpdate};

/// Multi-bar progress display driven by orchestrator events
pub struct ProgressDisplay {
    multi: MultiProgress,
    bars: HashMap<String, ProgressBar>,
    enabled: bool,
}

impl ProgressDisplay {
    /// Create a display; disabled displays swallow events silently
    pub fn new(enabled: bool) -> Self {
        Self {
            multi: MultiProgress::new(),
            bars: HashMap::new(),
            enabled,
        }
    }

    /// Consume events from the sink channel until it closes
    pub fn spawn(mut self, mut rx: mpsc::Receiver<ProgressEvent>) -> JoinHandle<()> {
        tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                self.handle(event);
            }
            self.finish();
            debug!("Progress display finished");
        })
    }

    fn handle(&mut self, event: ProgressEvent) {
        if !self.enabled {
            return;
        }
        match event {
            ProgressEvent::Update(update) => self.handle_update(update),
            ProgressEvent::Outcome { component, outcome } => {
                if let Some(bar) = self.bars.get(&component) {
                    if outcome.success {
                        bar.finish_with_message(format!("{}: {}", component, outcome.message));
                    } else {
                        bar.abandon_with_message(format!("{}: {}", component, outcome.message));
                    }
                } else if !outcome.success {
                    // Failures without any transfer progress still get a line
                    let bar = self.multi.add(ProgressBar::new_spinner());
                    bar.abandon_with_message(format!("{}: {}", component, outcome.message));
                }
            }
        }
    }

    fn handle_update(&mut self, update: ProgressUpdate) {
        let bar = self
            .bars
            .entry(update.component.clone())
            .or_insert_with(|| {
                let bar = match update.total_bytes {
                    Some(total) => {
                        let bar = self.multi.add(ProgressBar::new(total));
                        bar.set_style(
                            ProgressStyle::default_bar()
                                .template(
                                    "{msg:20} [{bar:30.cyan/blue}] {bytes}/{total_bytes} ({bytes_per_sec}, {eta})",
                                )
                                .unwrap_or_else(|_| ProgressStyle::default_bar())
                                .progress_chars("=> "),
                        );
                        bar
                    }
                    None => {
                        let bar = self.multi.add(ProgressBar::new_spinner());
                        bar.set_style(
                            ProgressStyle::default_spinner()
                                .template("{spinner:.green} {msg:20} {bytes} ({bytes_per_sec})")
                                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
                        );
                        bar
                    }
                };
                bar.set_message(update.component.clone());
                bar
            });

        bar.set_position(update.bytes_so_far);
        if let Some(total) = update.total_bytes {
            bar.set_length(total);
        }
    }

    fn finish(&self) {
        for bar in self.bars.values() {
            if !bar.is_finished() {
                bar.finish_and_clear();
            }
        }
    }
}
