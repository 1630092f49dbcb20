//! Append-only source → destination identifier table

use crate::types::{DestinationId, EntityKind, SourceId};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Result of [`RemapTable::insert`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Insert {
    /// The entry was new
    Inserted(DestinationId),
    /// An entry already existed; the table is unchanged
    Existing(DestinationId),
}

impl Insert {
    pub fn id(&self) -> DestinationId {
        match self {
            Insert::Inserted(id) | Insert::Existing(id) => *id,
        }
    }
}

/// `(kind, source_id) → destination_id`, each key written at most once
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RemapTable {
    entries: HashMap<EntityKind, HashMap<SourceId, DestinationId>>,
}

impl RemapTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, kind: EntityKind, source: SourceId) -> Option<DestinationId> {
        self.entries.get(&kind)?.get(&source).copied()
    }

    pub fn contains(&self, kind: EntityKind, source: SourceId) -> bool {
        self.get(kind, source).is_some()
    }

    /// Record a mapping; a second insert for the same key keeps the first value
    pub fn insert(&mut self, kind: EntityKind, source: SourceId, destination: DestinationId) -> Insert {
        let by_kind = self.entries.entry(kind).or_default();
        match by_kind.get(&source) {
            Some(existing) => Insert::Existing(*existing),
            None => {
                by_kind.insert(source, destination);
                Insert::Inserted(destination)
            }
        }
    }

    pub fn len(&self) -> usize {
        self.entries.values().map(|m| m.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn count(&self, kind: EntityKind) -> usize {
        self.entries.get(&kind).map(|m| m.len()).unwrap_or(0)
    }
}
