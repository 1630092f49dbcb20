//! Configuration for siteimport

mod fetch;
mod import;
mod logging;
mod remap;

pub use fetch::FetchConfig;
pub use import::ImportSettings;
pub use logging::{LogFormat, LogLevel, LoggingConfig};
pub use remap::RemapConfig;

use crate::import::BundleDescriptor;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

/// Default user agent for all remote fetches
pub const DEFAULT_USER_AGENT: &str = "siteimport/0.1 (+https://github.com/siteimport/siteimport)";

/// Main configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Resource fetcher configuration
    #[serde(default)]
    pub fetch: FetchConfig,
    /// Import behaviour defaults
    #[serde(default)]
    pub import: ImportSettings,
    /// Reference patterns for value remapping
    #[serde(default)]
    pub remap: RemapConfig,
    /// Importable bundles, selectable by name
    #[serde(default)]
    pub bundles: Vec<BundleDescriptor>,
}

impl Config {
    /// Load configuration from a TOML file and validate it.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Failed to read config file '{}': {}", path.display(), e))?;
        let config: Config = toml::from_str(&content)
            .map_err(|e| anyhow::anyhow!("Failed to parse config file '{}': {}", path.display(), e))?;
        config.validate()?;
        Ok(config)
    }

    /// Load `path` if it exists, otherwise fall back to defaults
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Find a configured bundle by name
    pub fn bundle(&self, name: &str) -> Option<&BundleDescriptor> {
        self.bundles.iter().find(|b| b.name == name)
    }

    /// Validate all configuration fields.
    ///
    /// Collects every problem and reports them together.
    pub fn validate(&self) -> Result<()> {
        let mut errors: Vec<String> = Vec::new();

        // Fetch validation
        if self.fetch.timeout_secs == 0 {
            errors.push("fetch timeout_secs must be positive".to_string());
        }
        if self.fetch.concurrency == 0 {
            errors.push("fetch concurrency must be positive".to_string());
        }
        if self.fetch.max_content_size == 0 {
            errors.push("fetch max_content_size must be positive".to_string());
        }
        if self.fetch.backoff_base_ms > self.fetch.backoff_max_ms {
            errors.push("fetch backoff_base_ms must not exceed backoff_max_ms".to_string());
        }

        // Remap validation
        let prefix = &self.remap.upload_path_prefix;
        if !prefix.starts_with('/') || !prefix.ends_with('/') || prefix.len() < 2 {
            errors.push(format!(
                "remap upload_path_prefix must start and end with '/', got '{}'",
                prefix
            ));
        }

        // Bundle validation
        let mut names = HashSet::new();
        for bundle in &self.bundles {
            if bundle.name.trim().is_empty() {
                errors.push("bundle name must not be empty".to_string());
            } else if !names.insert(bundle.name.as_str()) {
                errors.push(format!("duplicate bundle name '{}'", bundle.name));
            }
            for tree in &bundle.option_trees {
                if tree.option_name.trim().is_empty() {
                    errors.push(format!(
                        "bundle '{}' has an option tree without option_name",
                        bundle.name
                    ));
                }
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            anyhow::bail!(
                "Configuration validation failed:\n  - {}",
                errors.join("\n  - ")
            );
        }
    }
}
