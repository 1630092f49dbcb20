//! Progress tracking and cancellation for import runs

use crate::session::Outcome;
use indicatif::{ProgressBar, ProgressStyle};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Caller-supplied cancellation signal, checked between records and units
#[derive(Debug, Clone, Default)]
pub struct CancellationFlag(Arc<AtomicBool>);

impl CancellationFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }

    /// Resolves once the flag is set
    ///
    /// The flag is set from signal handlers and other threads without a
    /// waker, so this polls.
    pub async fn cancelled(&self) {
        while !self.is_cancelled() {
            tokio::time::sleep(Duration::from_millis(25)).await;
        }
    }
}

/// Snapshot of progress counters
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProgressStats {
    pub processed: usize,
    pub created: usize,
    pub updated: usize,
    pub skipped: usize,
    pub failed: usize,
    pub elapsed_seconds: f64,
    pub items_per_second: f64,
}

/// Progress tracker for one import run
pub struct ImportProgress {
    /// Spinner (None in quiet mode)
    progress_bar: Option<ProgressBar>,
    start_time: Instant,
    processed: AtomicUsize,
    created: AtomicUsize,
    updated: AtomicUsize,
    skipped: AtomicUsize,
    failed: AtomicUsize,
    cancel: CancellationFlag,
}

impl ImportProgress {
    pub fn new(quiet: bool, cancel: CancellationFlag) -> Self {
        let progress_bar = if !quiet {
            let pb = ProgressBar::new_spinner();
            pb.set_style(
                ProgressStyle::default_spinner()
                    .template("{spinner:.green} [{elapsed_precise}] {prefix:.bold} {pos} items {msg}")
                    .unwrap_or_else(|_| ProgressStyle::default_spinner()),
            );
            pb.enable_steady_tick(Duration::from_millis(120));
            Some(pb)
        } else {
            None
        };

        Self {
            progress_bar,
            start_time: Instant::now(),
            processed: AtomicUsize::new(0),
            created: AtomicUsize::new(0),
            updated: AtomicUsize::new(0),
            skipped: AtomicUsize::new(0),
            failed: AtomicUsize::new(0),
            cancel,
        }
    }

    /// Quiet tracker with its own cancellation flag
    pub fn quiet() -> Self {
        Self::new(true, CancellationFlag::new())
    }

    /// Show the current phase next to the spinner
    pub fn set_phase(&self, phase: &str) {
        if let Some(ref pb) = self.progress_bar {
            pb.set_prefix(phase.to_string());
        }
    }

    /// Count one finished record or unit
    pub fn item_done(&self, label: &str, outcome: &Outcome) {
        let processed = self.processed.fetch_add(1, Ordering::Relaxed) + 1;
        let counter = match outcome {
            Outcome::Created => &self.created,
            Outcome::Updated => &self.updated,
            Outcome::Skipped => &self.skipped,
            Outcome::Failed(_) => &self.failed,
        };
        counter.fetch_add(1, Ordering::Relaxed);

        if let Some(ref pb) = self.progress_bar {
            pb.set_position(processed as u64);
            // truncate on chars, labels are often non-ASCII titles
            let display = if label.chars().count() > 30 {
                let truncated: String = label.chars().take(27).collect();
                format!("{}...", truncated)
            } else {
                label.to_string()
            };
            pb.set_message(display);
        }
    }

    pub fn get_stats(&self) -> ProgressStats {
        let elapsed = self.start_time.elapsed().as_secs_f64();
        let processed = self.processed.load(Ordering::Relaxed);
        ProgressStats {
            processed,
            created: self.created.load(Ordering::Relaxed),
            updated: self.updated.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            elapsed_seconds: elapsed,
            items_per_second: if elapsed > 0.0 {
                processed as f64 / elapsed
            } else {
                0.0
            },
        }
    }

    pub fn cancel_flag(&self) -> &CancellationFlag {
        &self.cancel
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
        if let Some(ref pb) = self.progress_bar {
            pb.abandon_with_message("Cancelled");
        }
    }

    pub fn finish(&self) {
        if let Some(ref pb) = self.progress_bar {
            let stats = self.get_stats();
            pb.finish_with_message(format!(
                "Done! {} created, {} updated, {} skipped, {} failed",
                stats.created, stats.updated, stats.skipped, stats.failed
            ));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::FailureReason;

    #[test]
    fn test_progress_tracking() {
        let progress = ImportProgress::quiet();
        progress.item_done("Hello world", &Outcome::Created);
        progress.item_done("About", &Outcome::Skipped);
        progress.item_done("Broken", &Outcome::Failed(FailureReason::Write("x".into())));

        let stats = progress.get_stats();
        assert_eq!(stats.processed, 3);
        assert_eq!(stats.created, 1);
        assert_eq!(stats.skipped, 1);
        assert_eq!(stats.failed, 1);
    }

    #[test]
    fn test_cancellation_is_shared() {
        let flag = CancellationFlag::new();
        let progress = ImportProgress::new(true, flag.clone());
        assert!(!progress.is_cancelled());
        flag.cancel();
        assert!(progress.is_cancelled());
    }
}
