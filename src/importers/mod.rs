//! Secondary importers: widgets, customizer settings and option trees
//!
//! Each importer decodes its document into one [`ValueTree`] per unit, runs
//! the unit through the shared [`Remapper`] and writes it with the store's
//! settings API. A failing unit is recorded and its siblings carry on.

mod customizer;
mod option_tree;
mod widgets;

pub use customizer::CustomizerImporter;
pub use option_tree::OptionTreeImporter;
pub use widgets::WidgetImporter;

use crate::import::{CancellationFlag, ImportProgress};
use crate::logging::{LogSink, Severity};
use crate::remap::{RemapPatterns, Remapper, ValueTree};
use crate::session::{FailureReason, ImportSession, ItemOutcome, ItemRef, Outcome, UnitKind};
use crate::store::ContentStore;

/// Read-only view of a finished materialization shared by the importers
#[derive(Clone, Copy)]
pub struct ImportContext<'a> {
    pub session: &'a ImportSession,
    pub store: &'a dyn ContentStore,
    pub patterns: &'a RemapPatterns,
    pub sink: &'a dyn LogSink,
    pub cancel: &'a CancellationFlag,
    pub progress: Option<&'a ImportProgress>,
}

impl<'a> ImportContext<'a> {
    pub fn remapper(&self) -> Remapper<'a> {
        Remapper::new(self.patterns, self.session, self.store, self.sink)
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Write one setting unless the store already holds the same value
    pub fn write_unit(
        &self,
        unit: UnitKind,
        name: &str,
        namespace: &str,
        key: &str,
        value: &ValueTree,
    ) -> ItemOutcome {
        let outcome = match self.store.read_setting(namespace, key) {
            Some(ref existing) if existing == value => Outcome::Skipped,
            existing => match self.store.write_setting(namespace, key, value) {
                Ok(()) if existing.is_some() => Outcome::Updated,
                Ok(()) => Outcome::Created,
                Err(e) => Outcome::Failed(FailureReason::Write(e.to_string())),
            },
        };
        self.finish(unit, name, outcome)
    }

    /// Record a unit that never reached the store
    pub fn fail_unit(&self, unit: UnitKind, name: &str, reason: FailureReason) -> ItemOutcome {
        self.finish(unit, name, Outcome::Failed(reason))
    }

    fn finish(&self, unit: UnitKind, name: &str, outcome: Outcome) -> ItemOutcome {
        if let Outcome::Failed(ref reason) = outcome {
            self.sink.record(
                Severity::Error,
                "Unit failed",
                &[
                    ("unit", unit.to_string()),
                    ("name", name.to_string()),
                    ("reason", reason.to_string()),
                ],
            );
        }
        if let Some(progress) = self.progress {
            progress.item_done(name, &outcome);
        }
        ItemOutcome {
            item: ItemRef::Unit {
                unit,
                name: name.to_string(),
            },
            label: name.to_string(),
            outcome,
        }
    }
}

/// An importer for one secondary document
pub trait SecondaryImporter: Send + Sync {
    /// Short name used in logs and progress output
    fn name(&self) -> &str;

    /// Import every unit of the document, one outcome per unit
    fn import(&self, ctx: &ImportContext<'_>) -> Vec<ItemOutcome>;
}

/// Decode a JSON document, turning a syntax error into one failed unit
fn decode_document(
    ctx: &ImportContext<'_>,
    unit: UnitKind,
    name: &str,
    json: &str,
) -> Result<ValueTree, ItemOutcome> {
    ValueTree::from_json_str(json)
        .map_err(|e| ctx.fail_unit(unit, name, FailureReason::Decode(e.to_string())))
}
