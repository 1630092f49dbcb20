//! In-memory content store with JSON snapshot persistence
//!
//! Backs the command line tool (the snapshot file plays the role of the live
//! site, so re-running an import against it exercises idempotency) and the
//! test suite.

use super::{Attributes, ContentStore, EntityWrite, StoreError};
use crate::remap::ValueTree;
use crate::types::{DestinationId, EntityKind, NaturalKey};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// An entity held by the store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredEntity {
    pub id: DestinationId,
    pub kind: EntityKind,
    pub natural_key: NaturalKey,
    pub attributes: Vec<(String, ValueTree)>,
}

impl StoredEntity {
    pub fn attribute(&self, key: &str) -> Option<&ValueTree> {
        self.attributes.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn title(&self) -> Option<&str> {
        self.attribute("title").and_then(|v| v.as_str())
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct StoreState {
    next_id: u64,
    entities: BTreeMap<u64, StoredEntity>,
    /// `kind|natural key` → id
    keys: BTreeMap<String, u64>,
    settings: BTreeMap<String, BTreeMap<String, ValueTree>>,
    /// Registered widget areas; `None` accepts every sidebar
    sidebars: Option<BTreeSet<String>>,
}

/// Thread-safe in-memory [`ContentStore`]
#[derive(Debug)]
pub struct MemoryStore {
    base_url: String,
    state: RwLock<StoreState>,
    /// Kinds whose writes are refused, to exercise failure handling
    forbidden: RwLock<HashSet<EntityKind>>,
    /// Setting namespaces whose writes are refused
    forbidden_namespaces: RwLock<HashSet<String>>,
    /// Where attachment files are copied; without one they are not kept
    media_dir: Option<PathBuf>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new("https://destination.test")
    }
}

impl MemoryStore {
    /// Create an empty store whose attachment URLs live under `base_url`
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            state: RwLock::new(StoreState {
                next_id: 1,
                ..StoreState::default()
            }),
            forbidden: RwLock::new(HashSet::new()),
            forbidden_namespaces: RwLock::new(HashSet::new()),
            media_dir: None,
        }
    }

    /// Keep copies of imported attachment files below `dir`
    pub fn with_media_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.media_dir = Some(dir.into());
        self
    }

    /// Restrict widget areas to `sidebars`
    pub fn with_sidebars<I, S>(self, sidebars: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.state.write().sidebars = Some(sidebars.into_iter().map(Into::into).collect());
        self
    }

    /// Refuse every create/update of `kind`
    pub fn forbid(&self, kind: EntityKind) {
        self.forbidden.write().insert(kind);
    }

    /// Refuse every setting write to `namespace`
    pub fn forbid_namespace(&self, namespace: &str) {
        self.forbidden_namespaces.write().insert(namespace.to_string());
    }

    /// Load a snapshot written by [`MemoryStore::save`], or start empty
    pub fn load_or_new(path: &Path, base_url: &str) -> Result<Self, StoreError> {
        let store = Self::new(base_url);
        if path.exists() {
            let json = std::fs::read_to_string(path)?;
            let state: StoreState = serde_json::from_str(&json)?;
            info!(
                "Loaded store snapshot {} ({} entities)",
                path.display(),
                state.entities.len()
            );
            *store.state.write() = state;
        }
        Ok(store)
    }

    /// Persist the whole store as JSON
    pub fn save(&self, path: &Path) -> Result<(), StoreError> {
        let json = serde_json::to_string_pretty(&*self.state.read())?;
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        std::fs::write(path, json)?;
        debug!("Saved store snapshot to {}", path.display());
        Ok(())
    }

    pub fn entity(&self, id: DestinationId) -> Option<StoredEntity> {
        self.state.read().entities.get(&id.0).cloned()
    }

    pub fn entities(&self, kind: EntityKind) -> Vec<StoredEntity> {
        self.state
            .read()
            .entities
            .values()
            .filter(|e| e.kind == kind)
            .cloned()
            .collect()
    }

    pub fn entity_count(&self) -> usize {
        self.state.read().entities.len()
    }

    /// Every setting in `namespace`, in key order
    pub fn settings(&self, namespace: &str) -> BTreeMap<String, ValueTree> {
        self.state
            .read()
            .settings
            .get(namespace)
            .cloned()
            .unwrap_or_default()
    }

    fn check_allowed(&self, kind: EntityKind) -> Result<(), StoreError> {
        if self.forbidden.read().contains(&kind) {
            return Err(StoreError::Forbidden(format!("create_{}", kind)));
        }
        Ok(())
    }

    /// Replace a transient `file` path with the store's own copy
    fn ingest_file(&self, id: u64, attributes: &mut Vec<(String, ValueTree)>) -> Result<(), StoreError> {
        let Some(pos) = attributes.iter().position(|(k, _)| k == "file") else {
            return Ok(());
        };
        let (_, value) = attributes.remove(pos);
        let (Some(dir), Some(source)) = (&self.media_dir, value.as_str()) else {
            return Ok(());
        };
        let source = Path::new(source);
        let name = source.file_name().map(PathBuf::from).unwrap_or_else(|| PathBuf::from("file"));
        let target_dir = dir.join(id.to_string());
        std::fs::create_dir_all(&target_dir)?;
        let target = target_dir.join(name);
        std::fs::copy(source, &target)?;
        debug!("Copied attachment file to {}", target.display());
        attributes.push(("file".to_string(), ValueTree::string(target.to_string_lossy())));
        Ok(())
    }

    fn index_key(kind: EntityKind, key: &NaturalKey) -> String {
        format!("{}|{}", kind, key)
    }
}

impl ContentStore for MemoryStore {
    fn create_or_get_entity(
        &self,
        kind: EntityKind,
        key: &NaturalKey,
        attributes: &Attributes,
    ) -> Result<EntityWrite, StoreError> {
        self.check_allowed(kind)?;
        if key.as_str().is_empty() {
            return Err(StoreError::Rejected {
                kind: kind.to_string(),
                reason: "empty natural key".to_string(),
            });
        }

        let mut state = self.state.write();
        let index_key = Self::index_key(kind, key);
        if let Some(&id) = state.keys.get(&index_key) {
            return Ok(EntityWrite {
                id: DestinationId(id),
                created: false,
            });
        }

        let id = state.next_id.max(1);
        state.next_id = id + 1;
        let mut stored: Vec<(String, ValueTree)> = attributes.iter().cloned().collect();
        if kind == EntityKind::Attachment {
            let file_name = attributes
                .get("source_url")
                .and_then(|v| v.as_str())
                .and_then(|url| url.rsplit('/').next())
                .filter(|name| !name.is_empty())
                .unwrap_or("file");
            let url = format!("{}/wp-content/uploads/imported/{}/{}", self.base_url, id, file_name);
            stored.retain(|(k, _)| k != "url");
            stored.push(("url".to_string(), ValueTree::String(url)));
            self.ingest_file(id, &mut stored)?;
        }

        state.entities.insert(
            id,
            StoredEntity {
                id: DestinationId(id),
                kind,
                natural_key: key.clone(),
                attributes: stored,
            },
        );
        state.keys.insert(index_key, id);
        Ok(EntityWrite {
            id: DestinationId(id),
            created: true,
        })
    }

    fn update_entity(
        &self,
        kind: EntityKind,
        id: DestinationId,
        attributes: &Attributes,
    ) -> Result<(), StoreError> {
        self.check_allowed(kind)?;
        let mut incoming: Vec<(String, ValueTree)> = attributes.iter().cloned().collect();
        if kind == EntityKind::Attachment {
            self.ingest_file(id.0, &mut incoming)?;
        } else {
            incoming.retain(|(k, _)| k != "file");
        }
        let mut state = self.state.write();
        let entity = state
            .entities
            .get_mut(&id.0)
            .filter(|e| e.kind == kind)
            .ok_or(StoreError::NotFound(id))?;

        for (key, value) in incoming {
            // the store owns attachment URLs
            if key == "url" && kind == EntityKind::Attachment {
                continue;
            }
            match entity.attributes.iter_mut().find(|(k, _)| *k == key) {
                Some(existing) => existing.1 = value,
                None => entity.attributes.push((key, value)),
            }
        }
        Ok(())
    }

    fn find_entity_by_title(&self, kind: EntityKind, title: &str) -> Option<DestinationId> {
        self.state
            .read()
            .entities
            .values()
            .find(|e| e.kind == kind && e.title() == Some(title))
            .map(|e| e.id)
    }

    fn attachment_url(&self, id: DestinationId) -> Option<String> {
        let state = self.state.read();
        let entity = state.entities.get(&id.0)?;
        if entity.kind != EntityKind::Attachment {
            return None;
        }
        entity.attribute("url").and_then(|v| v.as_str()).map(str::to_string)
    }

    fn write_setting(&self, namespace: &str, key: &str, value: &ValueTree) -> Result<(), StoreError> {
        if namespace.is_empty() || key.is_empty() {
            return Err(StoreError::Rejected {
                kind: "setting".to_string(),
                reason: "empty namespace or key".to_string(),
            });
        }
        if self.forbidden_namespaces.read().contains(namespace) {
            return Err(StoreError::Forbidden(format!("write_setting {}", namespace)));
        }
        self.state
            .write()
            .settings
            .entry(namespace.to_string())
            .or_default()
            .insert(key.to_string(), value.clone());
        Ok(())
    }

    fn read_setting(&self, namespace: &str, key: &str) -> Option<ValueTree> {
        self.state.read().settings.get(namespace)?.get(key).cloned()
    }

    fn sidebar_exists(&self, sidebar: &str) -> bool {
        match self.state.read().sidebars {
            Some(ref sidebars) => sidebars.contains(sidebar),
            None => true,
        }
    }
}
