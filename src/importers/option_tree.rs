//! Option-tree import (framework option panels such as Redux)
//!
//! The whole document is the value of one option. Only leaves the remapper
//! positively identifies are touched; every other key keeps its position and
//! its exact encoding.

use super::{decode_document, ImportContext, SecondaryImporter};
use crate::remap::KindSet;
use crate::session::{ItemOutcome, UnitKind};

const OPTIONS_NAMESPACE: &str = "options";

pub struct OptionTreeImporter {
    option_name: String,
    json: String,
}

impl OptionTreeImporter {
    pub fn new(option_name: impl Into<String>, json: impl Into<String>) -> Self {
        Self {
            option_name: option_name.into(),
            json: json.into(),
        }
    }
}

impl SecondaryImporter for OptionTreeImporter {
    fn name(&self) -> &str {
        &self.option_name
    }

    fn import(&self, ctx: &ImportContext<'_>) -> Vec<ItemOutcome> {
        let unit = UnitKind::OptionTree;
        if ctx.is_cancelled() {
            return Vec::new();
        }
        let tree = match decode_document(ctx, unit, &self.option_name, &self.json) {
            Ok(tree) => tree,
            Err(outcome) => return vec![outcome],
        };

        let remapped = ctx
            .remapper()
            .remap_named(&format!("option_tree/{}", self.option_name), &tree, KindSet::all());
        vec![ctx.write_unit(
            unit,
            &self.option_name,
            OPTIONS_NAMESPACE,
            &self.option_name,
            &remapped.tree,
        )]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::importers::test_support::Fixture;
    use crate::remap::ValueTree;
    use crate::session::{FailureReason, Outcome};
    use crate::store::ContentStore;

    #[test]
    fn test_unknown_keys_pass_through() {
        let fixture = Fixture::new();
        let json = r#"{"zeta":{"b":1.50,"a":[true,null,"x"]},"opt-logo":{"url":"https://src.test/wp-content/uploads/2024/01/photo.jpg","id":"9","width":"640"},"alpha":1e3,"big":123456789012345678901234567890}"#;
        let outcomes = OptionTreeImporter::new("theme_options", json).import(&fixture.ctx());
        assert_eq!(outcomes[0].outcome, Outcome::Created);

        let stored = fixture.store.read_setting("options", "theme_options").unwrap();
        assert_eq!(
            stored.to_json_string(),
            r#"{"zeta":{"b":1.50,"a":[true,null,"x"]},"opt-logo":{"url":"https://dest.test/wp-content/uploads/imported/77/photo.jpg","id":"77","width":"640"},"alpha":1e3,"big":123456789012345678901234567890}"#
        );
    }

    #[test]
    fn test_tree_without_references_is_unchanged() {
        let fixture = Fixture::new();
        let json = r#"{"layout":"wide","sections":[{"title":"Intro","columns":3}],"empty":{}}"#;
        OptionTreeImporter::new("panel", json).import(&fixture.ctx());

        let stored = fixture.store.read_setting("options", "panel").unwrap();
        assert_eq!(stored.to_json_string(), json);
        assert_eq!(fixture.sink.entries().len(), 0);
    }

    #[test]
    fn test_decode_failure() {
        let fixture = Fixture::new();
        let outcomes = OptionTreeImporter::new("panel", "[1, 2").import(&fixture.ctx());
        assert!(matches!(
            outcomes[0].outcome,
            Outcome::Failed(FailureReason::Decode(_))
        ));
        let again = OptionTreeImporter::new("panel", r#"{"a":1}"#);
        assert_eq!(again.import(&fixture.ctx())[0].outcome, Outcome::Created);
        assert_eq!(again.import(&fixture.ctx())[0].outcome, Outcome::Skipped);
    }
}
