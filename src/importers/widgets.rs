//! Widget import
//!
//! The document maps each sidebar to its widgets in display order:
//!
//! ```json
//! { "sidebar-1": { "text-2": { "title": "About", "text": "..." } } }
//! ```
//!
//! A widget id is `<base>-<number>`. The instance is written to the
//! `widget_<base>` namespace under key `<number>`, and the sidebar's widget
//! list in `sidebars_widgets` gains the ids it did not already contain.

use super::{decode_document, ImportContext, SecondaryImporter};
use crate::remap::{KindSet, ValueTree};
use crate::session::{FailureReason, ItemOutcome, UnitKind};

const SIDEBARS_NAMESPACE: &str = "sidebars_widgets";

pub struct WidgetImporter {
    source: String,
    json: String,
}

impl WidgetImporter {
    /// `source` names the document in logs
    pub fn new(source: impl Into<String>, json: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            json: json.into(),
        }
    }
}

impl SecondaryImporter for WidgetImporter {
    fn name(&self) -> &str {
        "widgets"
    }

    fn import(&self, ctx: &ImportContext<'_>) -> Vec<ItemOutcome> {
        let document = match decode_document(ctx, UnitKind::Widget, &self.source, &self.json) {
            Ok(ValueTree::Mapping(sidebars)) => sidebars,
            Ok(_) => {
                return vec![ctx.fail_unit(
                    UnitKind::Widget,
                    &self.source,
                    FailureReason::Decode("expected an object of sidebars".to_string()),
                )]
            }
            Err(outcome) => return vec![outcome],
        };

        let remapper = ctx.remapper();
        let mut outcomes = Vec::new();

        for (sidebar, widgets) in &document {
            let ValueTree::Mapping(widgets) = widgets else {
                outcomes.push(ctx.fail_unit(
                    UnitKind::Widget,
                    sidebar,
                    FailureReason::Decode("expected an object of widgets".to_string()),
                ));
                continue;
            };
            let sidebar_known = ctx.store.sidebar_exists(sidebar);
            let mut placed = Vec::new();

            for (widget_id, instance) in widgets {
                if ctx.is_cancelled() {
                    return outcomes;
                }
                let name = format!("{}/{}", sidebar, widget_id);
                if !sidebar_known {
                    outcomes.push(ctx.fail_unit(
                        UnitKind::Widget,
                        &name,
                        FailureReason::MissingTarget(format!("sidebar '{}'", sidebar)),
                    ));
                    continue;
                }
                let Some((base, number)) = split_widget_id(widget_id) else {
                    outcomes.push(ctx.fail_unit(
                        UnitKind::Widget,
                        &name,
                        FailureReason::Decode(format!("invalid widget id '{}'", widget_id)),
                    ));
                    continue;
                };

                let remapped = remapper.remap_named(&format!("widgets/{}", name), instance, KindSet::all());
                let outcome = ctx.write_unit(
                    UnitKind::Widget,
                    &name,
                    &format!("widget_{}", base),
                    number,
                    &remapped.tree,
                );
                if !outcome.outcome.is_failed() {
                    placed.push(widget_id.clone());
                }
                outcomes.push(outcome);
            }

            if let Some(failed) = place_widgets(ctx, sidebar, placed) {
                outcomes.push(failed);
            }
        }

        outcomes
    }
}

/// Append `placed` to the sidebar's widget list, keeping what is there
///
/// Returns a failed unit named `sidebars_widgets/<sidebar>` when the list
/// cannot be written.
fn place_widgets(ctx: &ImportContext<'_>, sidebar: &str, placed: Vec<String>) -> Option<ItemOutcome> {
    if placed.is_empty() {
        return None;
    }
    let mut list = match ctx.store.read_setting(SIDEBARS_NAMESPACE, sidebar) {
        Some(ValueTree::Sequence(items)) => items,
        _ => Vec::new(),
    };
    let before = list.clone();
    for id in placed {
        if !list.iter().any(|existing| existing.as_str() == Some(id.as_str())) {
            list.push(ValueTree::String(id));
        }
    }
    if list == before {
        return None;
    }
    ctx.store
        .write_setting(SIDEBARS_NAMESPACE, sidebar, &ValueTree::Sequence(list))
        .err()
        .map(|e| {
            ctx.fail_unit(
                UnitKind::Widget,
                &format!("{}/{}", SIDEBARS_NAMESPACE, sidebar),
                FailureReason::Write(e.to_string()),
            )
        })
}

/// `text-2` → (`text`, `2`)
fn split_widget_id(id: &str) -> Option<(&str, &str)> {
    let (base, number) = id.rsplit_once('-')?;
    if base.is_empty() || number.is_empty() || !number.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    Some((base, number))
}
