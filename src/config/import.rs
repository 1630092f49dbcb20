//! Import behaviour configuration

use serde::{Deserialize, Serialize};

/// Defaults for every import run, overridable per run from the command line
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ImportSettings {
    /// Download attachment files referenced by the bundle before materializing
    pub fetch_attachments: bool,
    /// Overwrite attributes of entities that already exist in the store
    pub update_existing: bool,
    /// Login used for posts whose author is missing from the bundle
    pub default_author: Option<String>,
}

impl Default for ImportSettings {
    fn default() -> Self {
        Self {
            fetch_attachments: true,
            update_existing: false,
            default_author: None,
        }
    }
}
