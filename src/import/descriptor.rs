//! What to import and how

use crate::config::ImportSettings;
use crate::fetch::Locator;
use crate::import::CancellationFlag;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// An option-tree document and the option it is stored under
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OptionTreeSource {
    pub option_name: String,
    pub file: Locator,
}

/// The assets that make up one importable site bundle
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BundleDescriptor {
    pub name: String,
    /// Primary WXR content bundle
    pub content: Locator,
    /// Expected SHA-256 of the content bundle
    #[serde(default)]
    pub content_sha256: Option<String>,
    #[serde(default)]
    pub widgets: Option<Locator>,
    #[serde(default)]
    pub customizer: Option<Locator>,
    #[serde(default)]
    pub option_trees: Vec<OptionTreeSource>,
    /// Title of the page to use as the static front page
    #[serde(default)]
    pub front_page_title: Option<String>,
    /// Title of the page that lists posts
    #[serde(default)]
    pub blog_page_title: Option<String>,
    /// Theme menu location → menu slug
    #[serde(default)]
    pub menu_locations: BTreeMap<String, String>,
}

impl BundleDescriptor {
    /// A bundle with only primary content
    pub fn from_content(name: impl Into<String>, content: Locator) -> Self {
        Self {
            name: name.into(),
            content,
            content_sha256: None,
            widgets: None,
            customizer: None,
            option_trees: Vec::new(),
            front_page_title: None,
            blog_page_title: None,
            menu_locations: BTreeMap::new(),
        }
    }

    /// Resolve relative local paths against `base`
    pub fn relative_to(&self, base: &Path) -> Self {
        Self {
            content: self.content.relative_to(base),
            widgets: self.widgets.as_ref().map(|l| l.relative_to(base)),
            customizer: self.customizer.as_ref().map(|l| l.relative_to(base)),
            option_trees: self
                .option_trees
                .iter()
                .map(|t| OptionTreeSource {
                    option_name: t.option_name.clone(),
                    file: t.file.relative_to(base),
                })
                .collect(),
            ..self.clone()
        }
    }

    /// Secondary documents, in import order
    pub fn secondary_assets(&self) -> Vec<(SecondaryAsset, Locator)> {
        let mut assets = Vec::new();
        if let Some(ref widgets) = self.widgets {
            assets.push((SecondaryAsset::Widgets, widgets.clone()));
        }
        if let Some(ref customizer) = self.customizer {
            assets.push((SecondaryAsset::Customizer, customizer.clone()));
        }
        for tree in &self.option_trees {
            assets.push((SecondaryAsset::OptionTree(tree.option_name.clone()), tree.file.clone()));
        }
        assets
    }
}

/// Role of a secondary document
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SecondaryAsset {
    Widgets,
    Customizer,
    OptionTree(String),
}

/// Per-run options
#[derive(Debug, Clone, Default)]
pub struct ImportOptions {
    pub settings: ImportSettings,
    /// Suppress the progress spinner
    pub quiet: bool,
    pub cancel: CancellationFlag,
}

impl ImportOptions {
    pub fn new(settings: ImportSettings) -> Self {
        Self {
            settings,
            ..Self::default()
        }
    }

    pub fn with_quiet(mut self, quiet: bool) -> Self {
        self.quiet = quiet;
        self
    }

    pub fn with_cancellation(mut self, cancel: CancellationFlag) -> Self {
        self.cancel = cancel;
        self
    }
}
