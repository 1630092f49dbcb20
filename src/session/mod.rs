//! Import session: the identifier remap table plus everything learned during one run
//!
//! A session is created at the start of one coordinator run and dropped at its
//! end. The materializer is its only writer; once materialization finishes the
//! secondary importers share it read-only.

mod outcome;
mod remap;

pub use outcome::{FailureReason, ItemOutcome, ItemRef, Outcome, OutcomeCounts, UnitKind};
pub use remap::{Insert, RemapTable};

use crate::remap::upload_relative_path;
use crate::types::{DestinationId, EntityKind, SourceId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Destination ids of pages with a structural role on the site
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignificantPages {
    pub front_page: Option<DestinationId>,
    pub blog_page: Option<DestinationId>,
}

/// State of one import run
#[derive(Debug)]
pub struct ImportSession {
    id: Uuid,
    started_at: DateTime<Utc>,
    remap: RemapTable,
    outcomes: Vec<ItemOutcome>,
    /// Author login → source id
    authors_by_login: HashMap<String, SourceId>,
    /// (taxonomy, slug) → source id
    terms_by_slug: HashMap<(String, String), SourceId>,
    /// Attachment file path below the upload prefix → source id
    attachments_by_path: HashMap<String, SourceId>,
    significant: SignificantPages,
}

impl Default for ImportSession {
    fn default() -> Self {
        Self::new()
    }
}

impl ImportSession {
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            started_at: Utc::now(),
            remap: RemapTable::new(),
            outcomes: Vec::new(),
            authors_by_login: HashMap::new(),
            terms_by_slug: HashMap::new(),
            attachments_by_path: HashMap::new(),
            significant: SignificantPages::default(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Destination id for a source entity of exactly `kind`
    pub fn remap(&self, kind: EntityKind, source: SourceId) -> Option<DestinationId> {
        self.remap.get(kind, source)
    }

    /// Destination id for a reference found inside content or settings
    ///
    /// Posts and attachments share one id space in exported bundles, so a
    /// reference of either kind also matches the other.
    pub fn resolve_reference(&self, kind: EntityKind, source: SourceId) -> Option<DestinationId> {
        self.remap.get(kind, source).or_else(|| match kind {
            EntityKind::Post => self.remap.get(EntityKind::Attachment, source),
            EntityKind::Attachment => self.remap.get(EntityKind::Post, source),
            _ => None,
        })
    }

    pub fn record_mapping(
        &mut self,
        kind: EntityKind,
        source: SourceId,
        destination: DestinationId,
    ) -> Insert {
        self.remap.insert(kind, source, destination)
    }

    pub fn remap_table(&self) -> &RemapTable {
        &self.remap
    }

    // ------------------------------------------------------------------
    // Outcome log
    // ------------------------------------------------------------------

    pub fn record_outcome(&mut self, item: ItemRef, label: impl Into<String>, outcome: Outcome) {
        self.outcomes.push(ItemOutcome {
            item,
            label: label.into(),
            outcome,
        });
    }

    /// Append outcomes produced elsewhere (secondary importers)
    pub fn extend_outcomes(&mut self, outcomes: impl IntoIterator<Item = ItemOutcome>) {
        self.outcomes.extend(outcomes);
    }

    pub fn outcomes(&self) -> &[ItemOutcome] {
        &self.outcomes
    }

    pub fn into_outcomes(self) -> Vec<ItemOutcome> {
        self.outcomes
    }

    pub fn failures(&self) -> impl Iterator<Item = &ItemOutcome> {
        self.outcomes.iter().filter(|o| o.outcome.is_failed())
    }

    pub fn has_failures(&self) -> bool {
        self.failures().next().is_some()
    }

    pub fn counts(&self) -> OutcomeCounts {
        OutcomeCounts::tally(&self.outcomes)
    }

    // ------------------------------------------------------------------
    // Natural-key indices
    // ------------------------------------------------------------------

    pub fn index_author(&mut self, login: &str, source: SourceId) {
        self.authors_by_login.entry(login.to_string()).or_insert(source);
    }

    pub fn author_by_login(&self, login: &str) -> Option<SourceId> {
        self.authors_by_login.get(login).copied()
    }

    pub fn index_term(&mut self, taxonomy: &str, slug: &str, source: SourceId) {
        self.terms_by_slug
            .entry((taxonomy.to_string(), slug.to_string()))
            .or_insert(source);
    }

    pub fn term_by_slug(&self, taxonomy: &str, slug: &str) -> Option<SourceId> {
        self.terms_by_slug
            .get(&(taxonomy.to_string(), slug.to_string()))
            .copied()
    }

    /// Remember where an attachment's file lived on the source site
    ///
    /// Returns false when the URL is not below `upload_prefix`.
    pub fn index_attachment_url(&mut self, url: &str, upload_prefix: &str, source: SourceId) -> bool {
        match upload_relative_path(url, upload_prefix) {
            Some(path) => {
                self.attachments_by_path.entry(path.to_string()).or_insert(source);
                true
            }
            None => false,
        }
    }

    pub fn attachment_by_path(&self, relative_path: &str) -> Option<SourceId> {
        self.attachments_by_path.get(relative_path).copied()
    }

    // ------------------------------------------------------------------
    // Significant pages
    // ------------------------------------------------------------------

    pub fn significant_pages(&self) -> SignificantPages {
        self.significant
    }

    pub fn set_front_page(&mut self, id: DestinationId) {
        self.significant.front_page = Some(id);
    }

    pub fn set_blog_page(&mut self, id: DestinationId) {
        self.significant.blog_page = Some(id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_reference_crosses_post_and_attachment() {
        let mut session = ImportSession::new();
        session.record_mapping(EntityKind::Attachment, SourceId(9), DestinationId(77));

        assert_eq!(session.remap(EntityKind::Post, SourceId(9)), None);
        assert_eq!(
            session.resolve_reference(EntityKind::Post, SourceId(9)),
            Some(DestinationId(77))
        );
        assert_eq!(session.resolve_reference(EntityKind::Term, SourceId(9)), None);
    }

    #[test]
    fn test_attachment_index_strips_host_and_query() {
        let mut session = ImportSession::new();
        assert!(session.index_attachment_url(
            "https://demo.example.com/wp-content/uploads/2024/01/photo.jpg?ver=2",
            "/wp-content/uploads/",
            SourceId(9)
        ));
        assert!(!session.index_attachment_url(
            "https://demo.example.com/files/other.jpg",
            "/wp-content/uploads/",
            SourceId(10)
        ));
        assert_eq!(session.attachment_by_path("2024/01/photo.jpg"), Some(SourceId(9)));
    }

    #[test]
    fn test_failures_and_counts() {
        let mut session = ImportSession::new();
        session.record_outcome(
            ItemRef::Record {
                kind: EntityKind::Term,
                source_id: SourceId(5),
            },
            "Demo",
            Outcome::Created,
        );
        assert!(!session.has_failures());
        session.record_outcome(
            ItemRef::Element { offset: 120 },
            "item",
            Outcome::Failed(FailureReason::Parse("bad".into())),
        );
        assert!(session.has_failures());
        assert_eq!(session.counts().created, 1);
        assert_eq!(session.failures().count(), 1);
    }

    #[test]
    fn test_indices_keep_first_entry() {
        let mut session = ImportSession::new();
        session.index_term("category", "demo", SourceId(5));
        session.index_term("category", "demo", SourceId(6));
        session.index_author("admin", SourceId(1));
        assert_eq!(session.term_by_slug("category", "demo"), Some(SourceId(5)));
        assert_eq!(session.term_by_slug("post_tag", "demo"), None);
        assert_eq!(session.author_by_login("admin"), Some(SourceId(1)));
    }
}
