//! Reference rewriting inside post content
//!
//! Besides attachment URLs, post bodies reference attachments by id in a few
//! fixed shapes: gallery shortcodes, caption shortcodes and the `wp-image-N`
//! class the editor puts on inserted images.

use crate::remap::Remapper;
use crate::types::{EntityKind, SourceId};
use regex_lite::{Captures, Regex};
use std::sync::OnceLock;

static RE_GALLERY_IDS: OnceLock<Regex> = OnceLock::new();
static RE_CAPTION_ID: OnceLock<Regex> = OnceLock::new();
static RE_IMAGE_CLASS: OnceLock<Regex> = OnceLock::new();

/// Rewritten text plus the number of references replaced
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentRewrite {
    pub text: String,
    pub rewritten: usize,
}

/// Rewrite attachment URLs and id references in `html`
pub fn rewrite_content(remapper: &Remapper<'_>, html: &str, path: &str) -> ContentRewrite {
    let urls = remapper.rewrite_text(html, path);
    let mut rewritten = urls.rewritten;
    let mut text = match urls.tree.as_str() {
        Some(t) => t.to_string(),
        None => html.to_string(),
    };

    if text.contains("[gallery") {
        let re = RE_GALLERY_IDS
            .get_or_init(|| Regex::new(r#"(\[gallery\b[^\]]*?\bids=")([0-9,\s]+)(")"#).unwrap());
        text = re
            .replace_all(&text, |caps: &Captures<'_>| {
                let ids = caps[2]
                    .split(',')
                    .map(|piece| {
                        let trimmed = piece.trim();
                        match resolve(remapper, trimmed, path) {
                            Some(dest) => {
                                rewritten += 1;
                                piece.replacen(trimmed, &dest, 1)
                            }
                            None => piece.to_string(),
                        }
                    })
                    .collect::<Vec<_>>()
                    .join(",");
                format!("{}{}{}", &caps[1], ids, &caps[3])
            })
            .into_owned();
    }

    if text.contains("[caption") {
        let re = RE_CAPTION_ID
            .get_or_init(|| Regex::new(r#"(\[caption\b[^\]]*?\bid=")attachment_([0-9]+)(")"#).unwrap());
        text = re
            .replace_all(&text, |caps: &Captures<'_>| match resolve(remapper, &caps[2], path) {
                Some(dest) => {
                    rewritten += 1;
                    format!("{}attachment_{}{}", &caps[1], dest, &caps[3])
                }
                None => caps[0].to_string(),
            })
            .into_owned();
    }

    if text.contains("wp-image-") {
        let re = RE_IMAGE_CLASS.get_or_init(|| Regex::new(r"\bwp-image-([0-9]+)\b").unwrap());
        text = re
            .replace_all(&text, |caps: &Captures<'_>| match resolve(remapper, &caps[1], path) {
                Some(dest) => {
                    rewritten += 1;
                    format!("wp-image-{}", dest)
                }
                None => caps[0].to_string(),
            })
            .into_owned();
    }

    ContentRewrite { text, rewritten }
}

fn resolve(remapper: &Remapper<'_>, raw: &str, path: &str) -> Option<String> {
    let source = SourceId::parse_ref(raw)?;
    remapper
        .resolve(EntityKind::Attachment, source, path)
        .map(|dest| dest.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logging::{RecordingSink, Severity};
    use crate::remap::RemapPatterns;
    use crate::session::ImportSession;
    use crate::store::MemoryStore;
    use crate::types::DestinationId;

    #[test]
    fn test_shortcodes_and_classes_rewritten() {
        let store = MemoryStore::default();
        let mut session = ImportSession::new();
        session.record_mapping(EntityKind::Attachment, SourceId(9), DestinationId(77));
        session.record_mapping(EntityKind::Attachment, SourceId(10), DestinationId(78));
        let patterns = RemapPatterns::default();
        let sink = RecordingSink::new();
        let remapper = Remapper::new(&patterns, &session, &store, &sink);

        let html = r#"[gallery columns="2" ids="9, 10,11"]
[caption id="attachment_9" align="alignnone"]<img class="size-full wp-image-9" />[/caption]"#;
        let out = rewrite_content(&remapper, html, "post/12");

        assert_eq!(
            out.text,
            r#"[gallery columns="2" ids="77, 78,11"]
[caption id="attachment_77" align="alignnone"]<img class="size-full wp-image-77" />[/caption]"#
        );
        assert_eq!(out.rewritten, 4);
        // attachment 11 was never imported
        assert_eq!(sink.count(Severity::Warning), 1);
    }

    #[test]
    fn test_plain_text_untouched() {
        let store = MemoryStore::default();
        let session = ImportSession::new();
        let patterns = RemapPatterns::default();
        let sink = RecordingSink::new();
        let remapper = Remapper::new(&patterns, &session, &store, &sink);

        let out = rewrite_content(&remapper, "<p>No references here.</p>", "post/1");
        assert_eq!(out.text, "<p>No references here.</p>");
        assert_eq!(out.rewritten, 0);
    }
}
