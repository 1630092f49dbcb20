//! Run status and the final import report

use crate::materialize::MaterializeSummary;
use crate::session::{ItemOutcome, OutcomeCounts, SignificantPages};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Lifecycle of one run
///
/// `NotStarted → FetchingAssets → MaterializingEntities →
/// ImportingSecondaryData → Completed | CompletedWithErrors`, or `Failed`
/// from any phase when the primary bundle cannot be read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImportPhase {
    NotStarted,
    FetchingAssets,
    MaterializingEntities,
    ImportingSecondaryData,
    Completed,
    CompletedWithErrors,
    Failed,
}

impl ImportPhase {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::CompletedWithErrors | Self::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotStarted => "not started",
            Self::FetchingAssets => "fetching assets",
            Self::MaterializingEntities => "materializing entities",
            Self::ImportingSecondaryData => "importing secondary data",
            Self::Completed => "completed",
            Self::CompletedWithErrors => "completed with errors",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for ImportPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Everything a caller learns about a finished run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportReport {
    pub session_id: Uuid,
    pub bundle: String,
    pub status: ImportPhase,
    pub started_at: DateTime<Utc>,
    pub duration_seconds: f64,
    pub counts: OutcomeCounts,
    pub outcomes: Vec<ItemOutcome>,
    pub significant_pages: SignificantPages,
    pub materialize: MaterializeSummary,
    pub cancelled: bool,
    /// Cause of a `Failed` run
    pub error: Option<String>,
}

impl ImportReport {
    pub fn is_success(&self) -> bool {
        self.status == ImportPhase::Completed
    }

    pub fn failures(&self) -> impl Iterator<Item = &ItemOutcome> {
        self.outcomes.iter().filter(|o| o.outcome.is_failed())
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    /// Print summary to console
    pub fn print_summary(&self) {
        println!("\nImport Summary");
        println!("==============");
        println!("Bundle:        {}", self.bundle);
        println!("Status:        {}", self.status);
        println!("Created:       {}", self.counts.created);
        println!("Updated:       {}", self.counts.updated);
        println!("Skipped:       {}", self.counts.skipped);
        println!("Failed:        {}", self.counts.failed);
        println!("Elapsed time:  {:.1}s", self.duration_seconds);
        if self.cancelled {
            println!("Run was cancelled; work done so far was kept.");
        }
        if let Some(ref error) = self.error {
            println!("Error:         {}", error);
        }

        let failures: Vec<_> = self.failures().collect();
        if !failures.is_empty() {
            println!("\nFailures");
            println!("--------");
            for failure in failures {
                if let crate::session::Outcome::Failed(ref reason) = failure.outcome {
                    println!("  {} ({}): {}", failure.item, failure.label, reason);
                }
            }
        }
    }
}
