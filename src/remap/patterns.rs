//! Compiled reference patterns

use crate::config::RemapConfig;
use crate::types::EntityKind;
use regex_lite::Regex;

/// How a value found under a given key must be interpreted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rule {
    /// No reference expected; strings are still scanned for attachment URLs
    Plain,
    /// A single id, or a sequence of ids
    Id(EntityKind),
    /// Comma separated ids in a string
    IdList(EntityKind),
    /// Every child of the mapping is an id
    Container(EntityKind),
}

/// Set of entity kinds a remap pass is allowed to rewrite
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KindSet(u8);

impl KindSet {
    pub fn all() -> Self {
        Self::only(&EntityKind::ALL)
    }

    pub fn none() -> Self {
        KindSet(0)
    }

    pub fn only(kinds: &[EntityKind]) -> Self {
        KindSet(kinds.iter().fold(0, |bits, k| bits | Self::bit(*k)))
    }

    pub fn contains(&self, kind: EntityKind) -> bool {
        self.0 & Self::bit(kind) != 0
    }

    fn bit(kind: EntityKind) -> u8 {
        match kind {
            EntityKind::Author => 1,
            EntityKind::Term => 1 << 1,
            EntityKind::Post => 1 << 2,
            EntityKind::Attachment => 1 << 3,
            EntityKind::Comment => 1 << 4,
            EntityKind::MenuItem => 1 << 5,
        }
    }
}

/// [`RemapConfig`] plus the compiled URL matcher
#[derive(Debug, Clone)]
pub struct RemapPatterns {
    config: RemapConfig,
    upload_url: Option<Regex>,
}

impl RemapPatterns {
    pub fn new(config: RemapConfig) -> Self {
        let stop = r#"[^\s"'<>()\[\],]"#;
        let pattern = format!(
            "{stop}*{prefix}{stop}+",
            stop = stop,
            prefix = regex_lite::escape(&config.upload_path_prefix)
        );
        let upload_url = Regex::new(&pattern).ok();
        Self { config, upload_url }
    }

    pub fn config(&self) -> &RemapConfig {
        &self.config
    }

    pub fn upload_prefix(&self) -> &str {
        &self.config.upload_path_prefix
    }

    /// Matches URLs (absolute, protocol relative or root relative) below the upload prefix
    pub fn upload_url_regex(&self) -> Option<&Regex> {
        self.upload_url.as_ref()
    }

    /// Rule for the value stored under `key` in a mapping
    ///
    /// `media_object` is true when the mapping holds both `url` and `id`.
    pub fn rule_for_key(&self, key: &str, media_object: bool) -> Rule {
        if let Some(kind) = self.config.id_keys.get(key) {
            return Rule::Id(*kind);
        }
        if let Some(kind) = self.config.id_list_keys.get(key) {
            return Rule::IdList(*kind);
        }
        if let Some(kind) = self.config.container_keys.get(key) {
            return Rule::Container(*kind);
        }
        if media_object && self.config.media_objects && key == "id" {
            return Rule::Id(EntityKind::Attachment);
        }
        Rule::Plain
    }
}

impl Default for RemapPatterns {
    fn default() -> Self {
        Self::new(RemapConfig::default())
    }
}

/// Path of `url` below `prefix`, without query or fragment
pub fn upload_relative_path<'a>(url: &'a str, prefix: &str) -> Option<&'a str> {
    let start = url.find(prefix)? + prefix.len();
    let rest = &url[start..];
    let end = rest.find(['?', '#']).unwrap_or(rest.len());
    let path = &rest[..end];
    if path.is_empty() {
        None
    } else {
        Some(path)
    }
}

/// Split `2024/01/photo-300x200.jpg` into (`2024/01/photo.jpg`, `-300x200`)
pub fn split_size_variant(path: &str) -> Option<(String, String)> {
    let dot = path.rfind('.')?;
    let (stem, ext) = path.split_at(dot);
    let dash = stem.rfind('-')?;
    let size = &stem[dash + 1..];
    let (w, h) = size.split_once('x')?;
    let numeric = |s: &str| !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit());
    if !numeric(w) || !numeric(h) {
        return None;
    }
    Some((format!("{}{}", &stem[..dash], ext), stem[dash..].to_string()))
}

/// Insert a size variant before the extension of the last path segment
pub fn apply_size_variant(url: &str, variant: &str) -> String {
    let segment_start = url.rfind('/').map(|i| i + 1).unwrap_or(0);
    match url[segment_start..].rfind('.') {
        Some(dot) => {
            let at = segment_start + dot;
            format!("{}{}{}", &url[..at], variant, &url[at..])
        }
        None => format!("{}{}", url, variant),
    }
}
