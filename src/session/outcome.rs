//! Per-record and per-unit outcomes collected during a run

use crate::types::{EntityKind, SourceId};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Which secondary importer produced a unit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnitKind {
    Widget,
    CustomizerSetting,
    OptionTree,
    /// Settings written by the coordinator itself (front page, menu locations)
    SiteSetting,
}

impl fmt::Display for UnitKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Widget => "widget",
            Self::CustomizerSetting => "customizer_setting",
            Self::OptionTree => "option_tree",
            Self::SiteSetting => "site_setting",
        })
    }
}

/// What an outcome refers to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ItemRef {
    /// A bundle record, by source identity
    Record { kind: EntityKind, source_id: SourceId },
    /// A unit of a secondary bundle
    Unit { unit: UnitKind, name: String },
    /// A bundle element that could not be parsed into a record
    Element { offset: u64 },
    /// A bundle asset (file or URL)
    Asset { locator: String },
}

impl fmt::Display for ItemRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ItemRef::Record { kind, source_id } => write!(f, "{} #{}", kind, source_id),
            ItemRef::Unit { unit, name } => write!(f, "{} '{}'", unit, name),
            ItemRef::Element { offset } => write!(f, "element at byte {}", offset),
            ItemRef::Asset { locator } => write!(f, "asset {}", locator),
        }
    }
}

/// Why an item failed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", content = "detail", rename_all = "snake_case")]
pub enum FailureReason {
    /// References that never resolved, rendered as `kind #id`
    UnresolvedDependency(Vec<String>),
    /// The destination store rejected the write
    Write(String),
    /// The bundle element was malformed
    Parse(String),
    /// An asset could not be fetched
    Fetch(String),
    /// The unit's target (e.g. a sidebar) does not exist in the destination
    MissingTarget(String),
    /// The secondary bundle could not be decoded
    Decode(String),
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnresolvedDependency(missing) => {
                write!(f, "unresolved dependency: {}", missing.join(", "))
            }
            Self::Write(msg) => write!(f, "write failed: {}", msg),
            Self::Parse(msg) => write!(f, "parse error: {}", msg),
            Self::Fetch(msg) => write!(f, "fetch failed: {}", msg),
            Self::MissingTarget(msg) => write!(f, "missing target: {}", msg),
            Self::Decode(msg) => write!(f, "decode failed: {}", msg),
        }
    }
}

/// Result of handling one record or unit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "failure", rename_all = "snake_case")]
pub enum Outcome {
    Created,
    Updated,
    Skipped,
    Failed(FailureReason),
}

impl Outcome {
    pub fn is_failed(&self) -> bool {
        matches!(self, Outcome::Failed(_))
    }
}

/// One line of the outcome log
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemOutcome {
    pub item: ItemRef,
    /// Human readable name (title, login, slug, setting name)
    pub label: String,
    pub outcome: Outcome,
}

/// Aggregate counts over an outcome log
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutcomeCounts {
    pub created: usize,
    pub updated: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl OutcomeCounts {
    pub fn total(&self) -> usize {
        self.created + self.updated + self.skipped + self.failed
    }

    pub fn tally<'a>(outcomes: impl IntoIterator<Item = &'a ItemOutcome>) -> Self {
        let mut counts = Self::default();
        for o in outcomes {
            match o.outcome {
                Outcome::Created => counts.created += 1,
                Outcome::Updated => counts.updated += 1,
                Outcome::Skipped => counts.skipped += 1,
                Outcome::Failed(_) => counts.failed += 1,
            }
        }
        counts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tally() {
        let record = |outcome| ItemOutcome {
            item: ItemRef::Record {
                kind: EntityKind::Post,
                source_id: SourceId(1),
            },
            label: "x".to_string(),
            outcome,
        };
        let log = vec![
            record(Outcome::Created),
            record(Outcome::Skipped),
            record(Outcome::Skipped),
            record(Outcome::Failed(FailureReason::Write("nope".into()))),
        ];
        let counts = OutcomeCounts::tally(&log);
        assert_eq!(counts.created, 1);
        assert_eq!(counts.skipped, 2);
        assert_eq!(counts.failed, 1);
        assert_eq!(counts.total(), 4);
    }

    #[test]
    fn test_display() {
        let reason = FailureReason::UnresolvedDependency(vec!["post #3".into()]);
        assert_eq!(reason.to_string(), "unresolved dependency: post #3");
        let item = ItemRef::Unit {
            unit: UnitKind::Widget,
            name: "sidebar-1/text-2".into(),
        };
        assert_eq!(item.to_string(), "widget 'sidebar-1/text-2'");
    }

    #[test]
    fn test_outcome_serializes_with_reason() {
        let json = serde_json::to_string(&Outcome::Failed(FailureReason::Fetch("404".into()))).unwrap();
        assert_eq!(json, r#"{"status":"failed","failure":{"reason":"fetch","detail":"404"}}"#);
        assert_eq!(serde_json::to_string(&Outcome::Created).unwrap(), r#"{"status":"created"}"#);
    }
}
