//! Destination content store API
//!
//! The engine never talks to a database directly. Every write goes through this
//! narrow trait; the concrete destination (a CMS, a test double, a JSON
//! snapshot) implements it.

pub mod memory;

pub use memory::{MemoryStore, StoredEntity};

use crate::remap::ValueTree;
use crate::types::{DestinationId, EntityKind, NaturalKey};
use thiserror::Error;

/// Errors reported by a destination store
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Store rejected {kind} write: {reason}")]
    Rejected { kind: String, reason: String },

    #[error("Missing capability: {0}")]
    Forbidden(String),

    #[error("Entity not found: {0}")]
    NotFound(DestinationId),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Ordered attribute set for an entity write
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Attributes(Vec<(String, ValueTree)>);

impl Attributes {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set `key`, replacing a previous value
    pub fn set(&mut self, key: impl Into<String>, value: ValueTree) {
        let key = key.into();
        match self.0.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = value,
            None => self.0.push((key, value)),
        }
    }

    pub fn with(mut self, key: impl Into<String>, value: ValueTree) -> Self {
        self.set(key, value);
        self
    }

    /// Set a string attribute unless `value` is empty
    pub fn with_text(self, key: impl Into<String>, value: &str) -> Self {
        if value.is_empty() {
            self
        } else {
            self.with(key, ValueTree::string(value))
        }
    }

    pub fn get(&self, key: &str) -> Option<&ValueTree> {
        self.0.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn iter(&self) -> impl Iterator<Item = &(String, ValueTree)> {
        self.0.iter()
    }

    pub fn into_tree(self) -> ValueTree {
        ValueTree::Mapping(self.0)
    }
}

/// Result of [`ContentStore::create_or_get_entity`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntityWrite {
    pub id: DestinationId,
    /// False when an entity with the same natural key already existed
    pub created: bool,
}

/// Operations the import engine needs from the destination
pub trait ContentStore: Send + Sync {
    /// Create an entity, or return the existing one with the same natural key
    ///
    /// An attachment's `file` attribute, when present, is a local path that
    /// only lives for the duration of the import. The store must take its own
    /// copy during the call and never keep the path itself.
    fn create_or_get_entity(
        &self,
        kind: EntityKind,
        key: &NaturalKey,
        attributes: &Attributes,
    ) -> Result<EntityWrite, StoreError>;

    /// Merge `attributes` into an existing entity
    fn update_entity(
        &self,
        kind: EntityKind,
        id: DestinationId,
        attributes: &Attributes,
    ) -> Result<(), StoreError>;

    /// Find an entity of `kind` by its title
    fn find_entity_by_title(&self, kind: EntityKind, title: &str) -> Option<DestinationId>;

    /// Public URL of an attachment's file
    fn attachment_url(&self, id: DestinationId) -> Option<String>;

    fn write_setting(&self, namespace: &str, key: &str, value: &ValueTree) -> Result<(), StoreError>;

    fn read_setting(&self, namespace: &str, key: &str) -> Option<ValueTree>;

    /// Whether a widget area exists on the destination
    fn sidebar_exists(&self, _sidebar: &str) -> bool {
        true
    }
}
