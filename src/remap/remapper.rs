//! Depth-first reference rewriting over value trees
//!
//! The same [`Remapper`] serves post content, post meta, widgets, customizer
//! settings and option trees. It only reads the session, so one remapper can be
//! shared by importers running in parallel.

use super::patterns::{apply_size_variant, split_size_variant, upload_relative_path, KindSet, RemapPatterns, Rule};
use super::serialized;
use super::value::ValueTree;
use crate::logging::{LogSink, Severity};
use crate::session::ImportSession;
use crate::store::ContentStore;
use crate::types::{DestinationId, EntityKind, SourceId};

/// A reference that could not be resolved
///
/// The leaf it was found in is left untouched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemapMiss {
    pub kind: EntityKind,
    pub source_id: SourceId,
    /// The raw leaf text (id or URL)
    pub reference: String,
    /// Location inside the tree, `/` separated
    pub path: String,
}

/// Result of one [`Remapper::remap_value`] call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemapOutcome {
    pub tree: ValueTree,
    /// Number of references rewritten
    pub rewritten: usize,
    pub misses: Vec<RemapMiss>,
}

impl RemapOutcome {
    pub fn changed(&self) -> bool {
        self.rewritten > 0
    }
}

/// How a URL found in a string leaf resolved
enum UrlMatch {
    Rewritten(String),
    Miss(SourceId),
    /// Not an attachment of this bundle
    Unknown,
}

#[derive(Default)]
struct Walk {
    rewritten: usize,
    misses: Vec<RemapMiss>,
}

/// Rewrites source references into destination references
pub struct Remapper<'a> {
    patterns: &'a RemapPatterns,
    session: &'a ImportSession,
    store: &'a dyn ContentStore,
    sink: &'a dyn LogSink,
}

impl<'a> Remapper<'a> {
    pub fn new(
        patterns: &'a RemapPatterns,
        session: &'a ImportSession,
        store: &'a dyn ContentStore,
        sink: &'a dyn LogSink,
    ) -> Self {
        Self {
            patterns,
            session,
            store,
            sink,
        }
    }

    pub fn patterns(&self) -> &RemapPatterns {
        self.patterns
    }

    /// Remap a whole tree
    pub fn remap_value(&self, tree: &ValueTree, kinds: KindSet) -> RemapOutcome {
        self.remap_named("", tree, kinds)
    }

    /// Remap a tree, reporting miss paths below `root`
    pub fn remap_named(&self, root: &str, tree: &ValueTree, kinds: KindSet) -> RemapOutcome {
        self.remap_with_rule(root, tree, Rule::Plain, kinds)
    }

    /// Remap the value stored under `key`, applying the key's own rule
    ///
    /// Settings stored one per key (`custom_logo`, `page_on_front`,
    /// `nav_menu_locations`) carry their meaning in the key rather than in a
    /// parent mapping.
    pub fn remap_entry(&self, root: &str, key: &str, value: &ValueTree, kinds: KindSet) -> RemapOutcome {
        let rule = self.patterns.rule_for_key(key, false);
        self.remap_with_rule(root, value, rule, kinds)
    }

    fn remap_with_rule(&self, root: &str, tree: &ValueTree, rule: Rule, kinds: KindSet) -> RemapOutcome {
        let mut walk = Walk::default();
        let tree = self.walk(tree, rule, root, kinds, &mut walk);
        RemapOutcome {
            tree,
            rewritten: walk.rewritten,
            misses: walk.misses,
        }
    }

    /// Remap a single id of `kind`, logging a miss when it does not resolve
    pub fn resolve(&self, kind: EntityKind, source: SourceId, path: &str) -> Option<DestinationId> {
        let mut walk = Walk::default();
        self.resolve_into(kind, source, &source.to_string(), path, &mut walk)
    }

    /// Rewrite attachment URLs embedded in free text (HTML, shortcodes)
    pub fn rewrite_text(&self, text: &str, path: &str) -> RemapOutcome {
        let mut walk = Walk::default();
        let text = self.rewrite_urls(text, path, &mut walk);
        RemapOutcome {
            tree: ValueTree::String(text),
            rewritten: walk.rewritten,
            misses: walk.misses,
        }
    }

    fn walk(&self, tree: &ValueTree, rule: Rule, path: &str, kinds: KindSet, walk: &mut Walk) -> ValueTree {
        if let ValueTree::Escaped { text, .. } = tree {
            // keep the source spelling unless the leaf is rewritten
            let plain = ValueTree::String(text.clone());
            let remapped = self.walk(&plain, rule, path, kinds, walk);
            return if remapped == plain { tree.clone() } else { remapped };
        }
        match (tree, rule) {
            (ValueTree::Mapping(entries), Rule::Container(kind)) => ValueTree::Mapping(
                entries
                    .iter()
                    .map(|(key, value)| {
                        let child = join(path, key);
                        (key.clone(), self.walk(value, Rule::Id(kind), &child, kinds, walk))
                    })
                    .collect(),
            ),
            (ValueTree::Mapping(entries), _) => {
                let media = tree.get("url").is_some() && tree.get("id").is_some();
                ValueTree::Mapping(
                    entries
                        .iter()
                        .map(|(key, value)| {
                            let rule = self.patterns.rule_for_key(key, media);
                            let child = join(path, key);
                            (key.clone(), self.walk(value, rule, &child, kinds, walk))
                        })
                        .collect(),
                )
            }
            (ValueTree::Sequence(items), _) => {
                let rule = match rule {
                    Rule::Id(kind) | Rule::IdList(kind) => Rule::Id(kind),
                    _ => Rule::Plain,
                };
                ValueTree::Sequence(
                    items
                        .iter()
                        .enumerate()
                        .map(|(i, item)| self.walk(item, rule, &join(path, &i.to_string()), kinds, walk))
                        .collect(),
                )
            }
            (ValueTree::Number(_), Rule::Id(kind) | Rule::IdList(kind))
            | (ValueTree::String(_), Rule::Id(kind)) => self.remap_id_leaf(tree, kind, path, kinds, walk),
            (ValueTree::String(raw), Rule::IdList(kind)) => {
                if kinds.contains(kind) {
                    ValueTree::String(self.remap_id_list(raw, kind, path, walk))
                } else {
                    tree.clone()
                }
            }
            (ValueTree::String(raw), _) => ValueTree::String(self.remap_string(raw, path, kinds, walk)),
            _ => tree.clone(),
        }
    }

    fn remap_id_leaf(
        &self,
        leaf: &ValueTree,
        kind: EntityKind,
        path: &str,
        kinds: KindSet,
        walk: &mut Walk,
    ) -> ValueTree {
        if !kinds.contains(kind) {
            return leaf.clone();
        }
        let source = match leaf.as_u64() {
            Some(0) | None => return leaf.clone(),
            Some(id) => SourceId(id),
        };
        let reference = match leaf {
            ValueTree::String(s) => s.clone(),
            ValueTree::Number(n) => n.clone(),
            _ => source.to_string(),
        };
        match self.resolve_into(kind, source, &reference, path, walk) {
            Some(dest) => match leaf {
                ValueTree::String(_) => ValueTree::String(dest.to_string()),
                _ => ValueTree::number(dest.0),
            },
            None => leaf.clone(),
        }
    }

    fn remap_id_list(&self, raw: &str, kind: EntityKind, path: &str, walk: &mut Walk) -> String {
        raw.split(',')
            .map(|piece| {
                let trimmed = piece.trim();
                match SourceId::parse_ref(trimmed) {
                    Some(source) if trimmed.bytes().all(|b| b.is_ascii_digit()) => {
                        match self.resolve_into(kind, source, trimmed, path, walk) {
                            Some(dest) => piece.replacen(trimmed, &dest.to_string(), 1),
                            None => piece.to_string(),
                        }
                    }
                    _ => piece.to_string(),
                }
            })
            .collect::<Vec<_>>()
            .join(",")
    }

    fn remap_string(&self, raw: &str, path: &str, kinds: KindSet, walk: &mut Walk) -> String {
        if serialized::looks_serialized(raw) {
            // undecodable payloads stay opaque; rewriting inside them would break length prefixes
            let Some(decoded) = serialized::decode(raw) else {
                return raw.to_string();
            };
            let before = walk.rewritten;
            let remapped = self.walk(&decoded, Rule::Plain, path, kinds, walk);
            return if walk.rewritten > before {
                serialized::encode(&remapped)
            } else {
                raw.to_string()
            };
        }
        if kinds.contains(EntityKind::Attachment) {
            self.rewrite_urls(raw, path, walk)
        } else {
            raw.to_string()
        }
    }

    fn rewrite_urls(&self, text: &str, path: &str, walk: &mut Walk) -> String {
        let Some(regex) = self.patterns.upload_url_regex() else {
            return text.to_string();
        };
        if !text.contains(self.patterns.upload_prefix()) {
            return text.to_string();
        }
        regex
            .replace_all(text, |caps: &regex_lite::Captures<'_>| {
                let url = &caps[0];
                match self.match_attachment_url(url) {
                    UrlMatch::Rewritten(new_url) => {
                        walk.rewritten += 1;
                        new_url
                    }
                    UrlMatch::Miss(source) => {
                        self.miss(EntityKind::Attachment, source, url, path, walk);
                        url.to_string()
                    }
                    UrlMatch::Unknown => url.to_string(),
                }
            })
            .into_owned()
    }

    fn match_attachment_url(&self, url: &str) -> UrlMatch {
        let prefix = self.patterns.upload_prefix();
        let Some(relative) = upload_relative_path(url, prefix) else {
            return UrlMatch::Unknown;
        };
        let tail_start = url.find(prefix).map(|i| i + prefix.len() + relative.len()).unwrap_or(url.len());
        let tail = &url[tail_start..];

        let (source, variant) = match self.session.attachment_by_path(relative) {
            Some(source) => (source, None),
            None => match split_size_variant(relative) {
                Some((base, variant)) => match self.session.attachment_by_path(&base) {
                    Some(source) => (source, Some(variant)),
                    None => return UrlMatch::Unknown,
                },
                None => return UrlMatch::Unknown,
            },
        };

        let new_url = self
            .session
            .remap(EntityKind::Attachment, source)
            .and_then(|dest| self.store.attachment_url(dest));
        match new_url {
            Some(new_url) => {
                let new_url = match variant {
                    Some(variant) => apply_size_variant(&new_url, &variant),
                    None => new_url,
                };
                UrlMatch::Rewritten(format!("{}{}", new_url, tail))
            }
            None => UrlMatch::Miss(source),
        }
    }

    fn resolve_into(
        &self,
        kind: EntityKind,
        source: SourceId,
        reference: &str,
        path: &str,
        walk: &mut Walk,
    ) -> Option<DestinationId> {
        match self.session.resolve_reference(kind, source) {
            Some(dest) => {
                walk.rewritten += 1;
                Some(dest)
            }
            None => {
                self.miss(kind, source, reference, path, walk);
                None
            }
        }
    }

    fn miss(&self, kind: EntityKind, source: SourceId, reference: &str, path: &str, walk: &mut Walk) {
        self.sink.record(
            Severity::Warning,
            "Unresolved reference left unchanged",
            &[
                ("kind", kind.to_string()),
                ("source_id", source.to_string()),
                ("path", path.to_string()),
            ],
        );
        walk.misses.push(RemapMiss {
            kind,
            source_id: source,
            reference: reference.to_string(),
            path: path.to_string(),
        });
    }
}

fn join(path: &str, key: &str) -> String {
    if path.is_empty() {
        key.to_string()
    } else {
        format!("{}/{}", path, key)
    }
}
