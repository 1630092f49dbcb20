//! Theme customizer import
//!
//! Document shape:
//!
//! ```json
//! { "template": "twentytwenty", "mods": { "custom_logo": 9 }, "options": { "blogdescription": "..." }, "wp_css": "" }
//! ```
//!
//! Theme mods go to `theme_mods_<template>`, options to `options`, and custom
//! CSS to `custom_css/<template>`. Every setting is one unit.

use super::{decode_document, ImportContext, SecondaryImporter};
use crate::remap::{KindSet, ValueTree};
use crate::session::{FailureReason, ItemOutcome, UnitKind};

pub struct CustomizerImporter {
    source: String,
    json: String,
}

impl CustomizerImporter {
    pub fn new(source: impl Into<String>, json: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            json: json.into(),
        }
    }
}

impl SecondaryImporter for CustomizerImporter {
    fn name(&self) -> &str {
        "customizer"
    }

    fn import(&self, ctx: &ImportContext<'_>) -> Vec<ItemOutcome> {
        let unit = UnitKind::CustomizerSetting;
        let document = match decode_document(ctx, unit, &self.source, &self.json) {
            Ok(doc @ ValueTree::Mapping(_)) => doc,
            Ok(_) => {
                return vec![ctx.fail_unit(
                    unit,
                    &self.source,
                    FailureReason::Decode("expected a customizer object".to_string()),
                )]
            }
            Err(outcome) => return vec![outcome],
        };

        let template = document
            .get("template")
            .and_then(|v| v.as_str())
            .filter(|t| !t.is_empty());
        let mods_namespace = match template {
            Some(t) => format!("theme_mods_{}", t),
            None => "theme_mods".to_string(),
        };

        let remapper = ctx.remapper();
        let mut outcomes = Vec::new();
        let sections = [("mods", mods_namespace.as_str()), ("options", "options")];

        for (section, namespace) in sections {
            let settings = match document.get(section) {
                Some(ValueTree::Mapping(entries)) => entries,
                None | Some(ValueTree::Null) => continue,
                Some(_) => {
                    outcomes.push(ctx.fail_unit(
                        unit,
                        section,
                        FailureReason::Decode(format!("'{}' is not an object", section)),
                    ));
                    continue;
                }
            };
            for (key, value) in settings {
                if ctx.is_cancelled() {
                    return outcomes;
                }
                let name = format!("{}/{}", section, key);
                let remapped = remapper.remap_entry(&format!("customizer/{}", name), key, value, KindSet::all());
                outcomes.push(ctx.write_unit(unit, &name, namespace, key, &remapped.tree));
            }
        }

        if let Some(css) = document.get("wp_css").and_then(|v| v.as_str()).filter(|c| !c.is_empty()) {
            if !ctx.is_cancelled() {
                let remapped = remapper.rewrite_text(css, "customizer/wp_css");
                outcomes.push(ctx.write_unit(
                    unit,
                    "wp_css",
                    "custom_css",
                    template.unwrap_or("default"),
                    &remapped.tree,
                ));
            }
        }

        outcomes
    }
}
