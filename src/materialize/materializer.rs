//! Two-pass entity materialization
//!
//! Pass 1 creates authors, terms and attachments. Pass 2 rewinds the bundle
//! and creates posts, menu items and comments. Records whose references are
//! not materialized yet are parked on a worklist that is retried until a
//! round makes no progress; whatever is left then fails with an unresolved
//! dependency. Each round either shrinks the worklist or ends it, so N
//! records need at most N rounds.

use super::content::rewrite_content;
use crate::bundle::{
    AttachmentRecord, AuthorRecord, BundleParser, CommentRecord, MenuItemRecord, MenuTarget,
    ParseError, PostRecord, Record, TermRecord,
};
use crate::config::ImportSettings;
use crate::import::{CancellationFlag, ImportProgress};
use crate::logging::{LogSink, RecordingSink, Severity};
use crate::remap::{KindSet, RemapOutcome, RemapPatterns, Remapper, ValueTree};
use crate::session::{FailureReason, ImportSession, ItemRef, Outcome};
use crate::store::{Attributes, ContentStore};
use crate::types::{DestinationId, EntityKind, NaturalKey, SourceId};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use thiserror::Error;
use tracing::{debug, info};

/// Errors that abort materialization
#[derive(Debug, Error)]
pub enum MaterializeError {
    #[error("Bundle parse failed: {0}")]
    Parse(#[from] ParseError),

    #[error("Failed to rewind bundle: {0}")]
    Rewind(#[from] std::io::Error),
}

/// References of a record that are not materialized yet
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unresolved dependency: {}", .missing.join(", "))]
pub struct UnresolvedDependency {
    pub missing: Vec<String>,
}

impl UnresolvedDependency {
    fn new(missing: Vec<String>) -> Self {
        Self { missing }
    }
}

/// Statistics about one materialization
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaterializeSummary {
    /// Worklist rounds over both passes
    pub rounds: usize,
    /// Times a record was put back on the worklist
    pub deferrals: usize,
    /// Records that failed with an unresolved dependency
    pub unresolved: usize,
    /// Malformed elements skipped
    pub parse_errors: usize,
    pub cancelled: bool,
}

/// Mutable state of one run
struct Run<'s> {
    session: &'s mut ImportSession,
    summary: MaterializeSummary,
    /// (attachment, parent post) pairs to back-fill after pass 2
    attachment_parents: Vec<(SourceId, SourceId)>,
    /// Posts whose meta named posts not materialized yet
    forward_meta: Vec<ForwardMeta>,
}

/// Post meta to remap again once every post has a destination
struct ForwardMeta {
    post: SourceId,
    meta: Vec<(String, String)>,
    path: String,
    /// The tree written with the post
    written: ValueTree,
}

/// Creates destination entities from bundle records
pub struct Materializer<'a> {
    store: &'a dyn ContentStore,
    patterns: &'a RemapPatterns,
    sink: &'a dyn LogSink,
    settings: &'a ImportSettings,
    /// Source attachment URL → pre-fetched local file
    attachment_files: HashMap<String, PathBuf>,
    progress: Option<&'a ImportProgress>,
    cancel: CancellationFlag,
}

impl<'a> Materializer<'a> {
    pub fn new(
        store: &'a dyn ContentStore,
        patterns: &'a RemapPatterns,
        sink: &'a dyn LogSink,
        settings: &'a ImportSettings,
    ) -> Self {
        Self {
            store,
            patterns,
            sink,
            settings,
            attachment_files: HashMap::new(),
            progress: None,
            cancel: CancellationFlag::new(),
        }
    }

    pub fn with_attachment_files(mut self, files: HashMap<String, PathBuf>) -> Self {
        self.attachment_files = files;
        self
    }

    /// Report per-record progress and honour the tracker's cancellation flag
    pub fn with_progress(mut self, progress: &'a ImportProgress) -> Self {
        self.cancel = progress.cancel_flag().clone();
        self.progress = Some(progress);
        self
    }

    pub fn with_cancellation(mut self, cancel: CancellationFlag) -> Self {
        self.cancel = cancel;
        self
    }

    /// Materialize every record of `parser` into the store
    pub fn run(
        &self,
        parser: &mut BundleParser,
        session: &mut ImportSession,
    ) -> Result<MaterializeSummary, MaterializeError> {
        let mut run = Run {
            session,
            summary: MaterializeSummary::default(),
            attachment_parents: Vec::new(),
            forward_meta: Vec::new(),
        };

        self.pass_one(parser, &mut run)?;
        info!(
            "Pass 1 complete: {} entries in remap table",
            run.session.remap_table().len()
        );
        if run.summary.cancelled {
            return Ok(run.summary);
        }

        parser.rewind()?;
        self.pass_two(parser, &mut run)?;
        if !run.summary.cancelled {
            self.backfill_attachment_parents(&mut run);
            self.remap_forward_meta(&mut run);
        }
        info!(
            "Pass 2 complete: {} rounds, {} deferrals, {} unresolved",
            run.summary.rounds, run.summary.deferrals, run.summary.unresolved
        );
        Ok(run.summary)
    }

    fn pass_one(&self, parser: &mut BundleParser, run: &mut Run<'_>) -> Result<(), MaterializeError> {
        let prefix = self.patterns.upload_prefix();
        let mut terms = Vec::new();
        let mut attachments = Vec::new();

        for result in parser.records() {
            if self.cancel.is_cancelled() {
                run.summary.cancelled = true;
                return Ok(());
            }
            match result {
                Err(e) if e.is_fatal() => return Err(e.into()),
                Err(e) => self.record_parse_error(run, &e),
                Ok(Record::Author(author)) => {
                    run.session.index_author(&author.login, author.id);
                    self.author(&author, run);
                }
                Ok(Record::Term(term)) => {
                    run.session.index_term(&term.taxonomy, &term.slug, term.id);
                    terms.push(Record::Term(term));
                }
                Ok(Record::Attachment(attachment)) => {
                    run.session.index_attachment_url(&attachment.url, prefix, attachment.id);
                    attachments.push(Record::Attachment(attachment));
                }
                Ok(_) => {}
            }
        }

        // attachments wait for every author so the bundle order does not matter
        self.drain(terms, run);
        self.drain(attachments, run);
        Ok(())
    }

    fn pass_two(&self, parser: &mut BundleParser, run: &mut Run<'_>) -> Result<(), MaterializeError> {
        let mut deferred = Vec::new();

        for result in parser.records() {
            if self.cancel.is_cancelled() {
                run.summary.cancelled = true;
                return Ok(());
            }
            match result {
                Err(e) if e.is_fatal() => return Err(e.into()),
                // already reported in pass 1
                Err(_) => {}
                Ok(record) if record.kind().is_first_pass() => {}
                Ok(record) => {
                    if self.attempt(&record, run).is_err() {
                        run.summary.deferrals += 1;
                        deferred.push(record);
                    }
                }
            }
        }

        self.drain(deferred, run);
        Ok(())
    }

    /// Retry `pending` until it is empty or a round makes no progress
    fn drain(&self, mut pending: Vec<Record>, run: &mut Run<'_>) {
        while !pending.is_empty() {
            if self.cancel.is_cancelled() {
                run.summary.cancelled = true;
                return;
            }
            run.summary.rounds += 1;
            let before = pending.len();
            let mut blocked = Vec::new();
            for record in pending {
                if let Err(unresolved) = self.attempt(&record, run) {
                    blocked.push((record, unresolved));
                }
            }

            if blocked.len() == before {
                for (record, unresolved) in blocked {
                    run.summary.unresolved += 1;
                    self.finish(
                        run,
                        record.kind(),
                        record.source_id(),
                        &record.label(),
                        Outcome::Failed(FailureReason::UnresolvedDependency(unresolved.missing)),
                    );
                }
                return;
            }
            run.summary.deferrals += blocked.len();
            pending = blocked.into_iter().map(|(record, _)| record).collect();
        }
    }

    /// Materialize one record, or report what it is still waiting for
    fn attempt(&self, record: &Record, run: &mut Run<'_>) -> Result<(), UnresolvedDependency> {
        if run.session.remap(record.kind(), record.source_id()).is_some() {
            // duplicate record in the bundle
            self.finish(run, record.kind(), record.source_id(), &record.label(), Outcome::Skipped);
            return Ok(());
        }
        match record {
            Record::Author(author) => {
                self.author(author, run);
                Ok(())
            }
            Record::Term(term) => self.term(term, run),
            Record::Attachment(attachment) => {
                self.attachment(attachment, run);
                Ok(())
            }
            Record::Post(post) => self.post(post, run),
            Record::Comment(comment) => self.comment(comment, run),
            Record::MenuItem(item) => self.menu_item(item, run),
        }
    }

    fn author(&self, author: &AuthorRecord, run: &mut Run<'_>) {
        if run.session.remap(EntityKind::Author, author.id).is_some() {
            self.finish(run, EntityKind::Author, author.id, &author.login, Outcome::Skipped);
            return;
        }
        let attrs = Attributes::new()
            .with_text("login", &author.login)
            .with_text("email", &author.email)
            .with_text("display_name", &author.display_name)
            .with_text("first_name", &author.first_name)
            .with_text("last_name", &author.last_name);
        self.commit(
            run,
            EntityKind::Author,
            author.id,
            &author.login,
            NaturalKey::author(&author.login),
            &attrs,
        );
    }

    fn term(&self, term: &TermRecord, run: &mut Run<'_>) -> Result<(), UnresolvedDependency> {
        let mut attrs = Attributes::new()
            .with_text("taxonomy", &term.taxonomy)
            .with_text("slug", &term.slug)
            .with_text("name", &term.name)
            .with_text("description", &term.description);

        if let Some(ref parent_slug) = term.parent_slug {
            let parent = run
                .session
                .term_by_slug(&term.taxonomy, parent_slug)
                .and_then(|source| run.session.remap(EntityKind::Term, source));
            match parent {
                Some(dest) => attrs.set("parent", id_value(dest)),
                None => {
                    return Err(UnresolvedDependency::new(vec![format!(
                        "term {}/{}",
                        term.taxonomy, parent_slug
                    )]))
                }
            }
        }

        let label = format!("{}/{}", term.taxonomy, term.slug);
        self.commit(
            run,
            EntityKind::Term,
            term.id,
            &label,
            NaturalKey::term(&term.taxonomy, &term.slug),
            &attrs,
        );
        Ok(())
    }

    fn attachment(&self, attachment: &AttachmentRecord, run: &mut Run<'_>) {
        let path = format!("attachment/{}", attachment.id);
        let author = self.author_id(run.session, attachment.author_login.as_deref(), &path);
        let remapper = Remapper::new(self.patterns, run.session, self.store, self.sink);
        let meta = remap_meta(&remapper, &attachment.meta, &path).tree;

        let mut attrs = Attributes::new()
            .with_text("title", &attachment.title)
            .with_text("slug", &attachment.slug)
            .with_text("source_url", &attachment.url)
            .with_text("date", &attachment.date)
            .with("meta", meta);
        if let Some(author) = author {
            attrs.set("author", id_value(author));
        }
        if let Some(file) = self.attachment_files.get(&attachment.url) {
            attrs.set("file", ValueTree::string(file.to_string_lossy()));
        }

        let key = NaturalKey::post("attachment", natural_guid(&attachment.guid, &attachment.url));
        let outcome = self.commit(run, EntityKind::Attachment, attachment.id, &attachment.title, key, &attrs);
        if let (Some(parent), Outcome::Created | Outcome::Updated) = (attachment.parent, outcome) {
            run.attachment_parents.push((attachment.id, parent));
        }
    }

    fn post(&self, post: &PostRecord, run: &mut Run<'_>) -> Result<(), UnresolvedDependency> {
        let parent = match post.parent {
            Some(source) => match run.session.resolve_reference(EntityKind::Post, source) {
                Some(dest) => Some(dest),
                None => return Err(UnresolvedDependency::new(vec![format!("post #{}", source)])),
            },
            None => None,
        };

        let path = format!("{}/{}", post.post_type, post.id);
        let author = self.author_id(run.session, post.author_login.as_deref(), &path);
        let remapper = Remapper::new(self.patterns, run.session, self.store, self.sink);
        let content = rewrite_content(&remapper, &post.content, &path);
        let excerpt = rewrite_content(&remapper, &post.excerpt, &path);
        let thumbnail = post
            .thumbnail
            .and_then(|source| remapper.resolve(EntityKind::Attachment, source, &path));
        // misses of later posts are expected here, so hold their warnings
        let meta_sink = RecordingSink::new();
        let meta = remap_meta(
            &Remapper::new(self.patterns, run.session, self.store, &meta_sink),
            &post.meta,
            &path,
        );
        let forward = meta.misses.iter().any(|miss| !miss.kind.is_first_pass());
        if !forward {
            replay(&meta_sink, self.sink);
        }
        let meta = meta.tree;

        let mut terms = Vec::with_capacity(post.terms.len());
        for term in &post.terms {
            let dest = run
                .session
                .term_by_slug(&term.taxonomy, &term.slug)
                .and_then(|source| run.session.remap(EntityKind::Term, source));
            match dest {
                Some(dest) => terms.push(id_value(dest)),
                None => self.sink.record(
                    Severity::Warning,
                    "Post term not imported, dropping assignment",
                    &[("post", path.clone()), ("term", term.to_string())],
                ),
            }
        }

        let mut attrs = Attributes::new()
            .with_text("post_type", &post.post_type)
            .with_text("title", &post.title)
            .with_text("slug", &post.slug)
            .with_text("content", &content.text)
            .with_text("excerpt", &excerpt.text)
            .with_text("status", &post.status)
            .with_text("date", &post.date)
            .with("menu_order", ValueTree::number(post.menu_order))
            .with("sticky", ValueTree::Bool(post.sticky))
            .with("terms", ValueTree::Sequence(terms))
            .with("meta", meta.clone());
        if let Some(author) = author {
            attrs.set("author", id_value(author));
        }
        if let Some(parent) = parent {
            attrs.set("parent", id_value(parent));
        }
        if let Some(thumbnail) = thumbnail {
            attrs.set("thumbnail_id", id_value(thumbnail));
        }

        let key = NaturalKey::post(&post.post_type, &natural_guid(&post.guid, &format!("source:{}", post.id)));
        let outcome = self.commit(run, EntityKind::Post, post.id, &post.title, key, &attrs);
        if forward && matches!(outcome, Outcome::Created | Outcome::Updated) {
            run.forward_meta.push(ForwardMeta {
                post: post.id,
                meta: post.meta.clone(),
                path,
                written: meta,
            });
        }
        Ok(())
    }

    fn comment(&self, comment: &CommentRecord, run: &mut Run<'_>) -> Result<(), UnresolvedDependency> {
        let mut missing = Vec::new();
        let post = run.session.resolve_reference(EntityKind::Post, comment.post);
        if post.is_none() {
            missing.push(format!("post #{}", comment.post));
        }
        let parent = comment.parent.map(|source| {
            let dest = run.session.remap(EntityKind::Comment, source);
            if dest.is_none() {
                missing.push(format!("comment #{}", source));
            }
            dest
        });
        let post = match post {
            Some(post) if missing.is_empty() => post,
            _ => return Err(UnresolvedDependency::new(missing)),
        };

        let mut attrs = Attributes::new()
            .with("post", id_value(post))
            .with_text("author", &comment.author)
            .with_text("author_email", &comment.author_email)
            .with_text("date", &comment.date)
            .with_text("content", &comment.content)
            .with_text("approved", &comment.approved)
            .with_text("comment_type", &comment.comment_type);
        if let Some(Some(parent)) = parent {
            attrs.set("parent", id_value(parent));
        }

        let key = NaturalKey::comment(post, &comment.author, &comment.date);
        let label = format!("comment by {}", comment.author);
        self.commit(run, EntityKind::Comment, comment.id, &label, key, &attrs);
        Ok(())
    }

    fn menu_item(&self, item: &MenuItemRecord, run: &mut Run<'_>) -> Result<(), UnresolvedDependency> {
        let session = &*run.session;
        let mut missing = Vec::new();

        let menu = item.menu.as_ref().and_then(|menu| {
            let dest = session
                .term_by_slug(&menu.taxonomy, &menu.slug)
                .and_then(|source| session.remap(EntityKind::Term, source));
            if dest.is_none() {
                missing.push(format!("term {}", menu));
            }
            dest
        });
        let parent = item.parent_item.and_then(|source| {
            let dest = session.remap(EntityKind::MenuItem, source);
            if dest.is_none() {
                missing.push(format!("menu_item #{}", source));
            }
            dest
        });

        let remapper = Remapper::new(self.patterns, session, self.store, self.sink);
        let (item_type, object, object_id, url) = match &item.target {
            MenuTarget::Post { object, id } => {
                let dest = session.resolve_reference(EntityKind::Post, *id);
                if dest.is_none() {
                    missing.push(format!("post #{}", id));
                }
                ("post_type", object.as_str(), dest, String::new())
            }
            MenuTarget::Term { object, id } => {
                let dest = session.remap(EntityKind::Term, *id);
                if dest.is_none() {
                    missing.push(format!("term #{}", id));
                }
                ("taxonomy", object.as_str(), dest, String::new())
            }
            MenuTarget::Custom { url } => {
                let path = format!("menu_item/{}", item.id);
                let rewritten = remapper.rewrite_text(url, &path);
                let url = rewritten.tree.as_str().unwrap_or(url).to_string();
                ("custom", "custom", None, url)
            }
        };
        if !missing.is_empty() {
            return Err(UnresolvedDependency::new(missing));
        }

        let mut attrs = Attributes::new()
            .with_text("title", &item.title)
            .with_text("type", item_type)
            .with_text("object", object)
            .with_text("url", &url)
            .with("menu_order", ValueTree::number(item.menu_order))
            .with_text("status", &item.status);
        if let Some(menu) = menu {
            attrs.set("menu", id_value(menu));
        }
        if let Some(parent) = parent {
            attrs.set("parent_item", id_value(parent));
        }
        if let Some(object_id) = object_id {
            attrs.set("object_id", id_value(object_id));
        }

        let key = NaturalKey::post("nav_menu_item", &natural_guid(&item.guid, &format!("source:{}", item.id)));
        self.commit(run, EntityKind::MenuItem, item.id, &item.title, key, &attrs);
        Ok(())
    }

    /// Destination author for a login, falling back to the configured default
    fn author_id(&self, session: &ImportSession, login: Option<&str>, path: &str) -> Option<DestinationId> {
        let lookup = |login: &str| {
            session
                .author_by_login(login)
                .and_then(|source| session.remap(EntityKind::Author, source))
        };
        if let Some(dest) = login.and_then(lookup) {
            return Some(dest);
        }
        let fallback = self.settings.default_author.as_deref().and_then(lookup);
        if let Some(login) = login {
            self.sink.record(
                Severity::Warning,
                "Author not imported, using default author",
                &[
                    ("login", login.to_string()),
                    ("path", path.to_string()),
                    (
                        "default",
                        self.settings.default_author.clone().unwrap_or_default(),
                    ),
                ],
            );
        }
        fallback
    }

    fn backfill_attachment_parents(&self, run: &mut Run<'_>) {
        for (attachment, parent) in std::mem::take(&mut run.attachment_parents) {
            let Some(dest) = run.session.remap(EntityKind::Attachment, attachment) else {
                continue;
            };
            let Some(parent_dest) = run.session.resolve_reference(EntityKind::Post, parent) else {
                self.sink.record(
                    Severity::Warning,
                    "Attachment parent not imported",
                    &[
                        ("attachment", attachment.to_string()),
                        ("parent", parent.to_string()),
                    ],
                );
                continue;
            };
            let attrs = Attributes::new().with("parent", id_value(parent_dest));
            if let Err(e) = self.store.update_entity(EntityKind::Attachment, dest, &attrs) {
                self.sink.record(
                    Severity::Warning,
                    "Failed to set attachment parent",
                    &[("attachment", attachment.to_string()), ("error", e.to_string())],
                );
            }
        }
    }

    /// Remap held-back post meta now that every post has been attempted
    fn remap_forward_meta(&self, run: &mut Run<'_>) {
        let pending = std::mem::take(&mut run.forward_meta);
        if pending.is_empty() {
            return;
        }
        let remapper = Remapper::new(self.patterns, run.session, self.store, self.sink);
        let mut updated = 0;
        for entry in pending {
            let Some(dest) = run.session.remap(EntityKind::Post, entry.post) else {
                continue;
            };
            let meta = remap_meta(&remapper, &entry.meta, &entry.path).tree;
            if meta == entry.written {
                continue;
            }
            let attrs = Attributes::new().with("meta", meta);
            match self.store.update_entity(EntityKind::Post, dest, &attrs) {
                Ok(()) => updated += 1,
                Err(e) => self.sink.record(
                    Severity::Warning,
                    "Failed to update post meta references",
                    &[("post", entry.post.to_string()), ("error", e.to_string())],
                ),
            }
        }
        debug!("Remapped forward meta references of {} posts", updated);
    }

    /// Write an entity and log the outcome
    fn commit(
        &self,
        run: &mut Run<'_>,
        kind: EntityKind,
        source: SourceId,
        label: &str,
        key: NaturalKey,
        attrs: &Attributes,
    ) -> Outcome {
        let outcome = match self.store.create_or_get_entity(kind, &key, attrs) {
            Ok(write) => {
                run.session.record_mapping(kind, source, write.id);
                if write.created {
                    Outcome::Created
                } else if self.settings.update_existing {
                    match self.store.update_entity(kind, write.id, attrs) {
                        Ok(()) => Outcome::Updated,
                        Err(e) => Outcome::Failed(FailureReason::Write(e.to_string())),
                    }
                } else {
                    Outcome::Skipped
                }
            }
            Err(e) => Outcome::Failed(FailureReason::Write(e.to_string())),
        };
        self.finish(run, kind, source, label, outcome.clone());
        outcome
    }

    fn finish(&self, run: &mut Run<'_>, kind: EntityKind, source: SourceId, label: &str, outcome: Outcome) {
        match outcome {
            Outcome::Failed(ref reason) => self.sink.record(
                Severity::Error,
                "Record failed",
                &[
                    ("kind", kind.to_string()),
                    ("source_id", source.to_string()),
                    ("reason", reason.to_string()),
                ],
            ),
            _ => self.sink.record(
                Severity::Debug,
                "Record materialized",
                &[
                    ("kind", kind.to_string()),
                    ("source_id", source.to_string()),
                    ("outcome", format!("{:?}", outcome)),
                ],
            ),
        }
        if let Some(progress) = self.progress {
            progress.item_done(label, &outcome);
        }
        run.session.record_outcome(
            ItemRef::Record {
                kind,
                source_id: source,
            },
            label,
            outcome,
        );
    }

    fn record_parse_error(&self, run: &mut Run<'_>, err: &ParseError) {
        run.summary.parse_errors += 1;
        self.sink.record(
            Severity::Warning,
            "Skipped malformed bundle element",
            &[("offset", err.offset.to_string()), ("error", err.kind.to_string())],
        );
        let outcome = Outcome::Failed(FailureReason::Parse(err.kind.to_string()));
        if let Some(progress) = self.progress {
            progress.item_done("malformed element", &outcome);
        }
        run.session
            .record_outcome(ItemRef::Element { offset: err.offset }, "malformed element", outcome);
    }
}

fn id_value(id: DestinationId) -> ValueTree {
    ValueTree::number(id.0)
}

fn natural_guid<'g>(guid: &'g str, fallback: &'g str) -> &'g str {
    if guid.trim().is_empty() {
        fallback
    } else {
        guid
    }
}

/// Re-emit records held in `buffer`
fn replay(buffer: &RecordingSink, sink: &dyn LogSink) {
    for entry in buffer.entries() {
        let context: Vec<(&str, String)> = entry
            .context
            .iter()
            .map(|(k, v)| (k.as_str(), v.clone()))
            .collect();
        sink.record(entry.level, &entry.message, &context);
    }
}

/// Post meta as a mapping, remapped as one tree
fn remap_meta(remapper: &Remapper<'_>, meta: &[(String, String)], path: &str) -> RemapOutcome {
    let tree = ValueTree::Mapping(
        meta.iter()
            .map(|(k, v)| (k.clone(), ValueTree::string(v.as_str())))
            .collect(),
    );
    remapper.remap_named(&format!("{}/meta", path), &tree, KindSet::all())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logging::RecordingSink;
    use crate::store::MemoryStore;

    fn write_bundle(items: &str) -> tempfile::NamedTempFile {
        let xml = format!(
            r#"<?xml version="1.0"?>
<rss xmlns:wp="http://wordpress.org/export/1.2/" xmlns:dc="http://purl.org/dc/elements/1.1/" xmlns:content="http://purl.org/rss/1.0/modules/content/">
<channel>{}</channel></rss>"#,
            items
        );
        let mut file = tempfile::NamedTempFile::new().unwrap();
        std::io::Write::write_all(&mut file, xml.as_bytes()).unwrap();
        file
    }

    fn page(id: u64, parent: u64) -> String {
        format!(
            "<item><title>Page {id}</title><guid>https://src.test/?page_id={id}</guid>\
             <wp:post_id>{id}</wp:post_id><wp:post_type>page</wp:post_type>\
             <wp:post_parent>{parent}</wp:post_parent></item>"
        )
    }

    fn materialize(
        file: &tempfile::NamedTempFile,
        store: &MemoryStore,
        settings: &ImportSettings,
    ) -> (ImportSession, MaterializeSummary) {
        let patterns = RemapPatterns::default();
        let sink = RecordingSink::new();
        let mut parser = BundleParser::open(file.path()).unwrap();
        let mut session = ImportSession::new();
        let summary = Materializer::new(store, &patterns, &sink, settings)
            .run(&mut parser, &mut session)
            .unwrap();
        (session, summary)
    }

    #[test]
    fn test_child_before_parent_is_deferred() {
        let file = write_bundle(&format!("{}{}{}", page(3, 2), page(2, 1), page(1, 0)));
        let store = MemoryStore::default();
        let (session, summary) = materialize(&file, &store, &ImportSettings::default());

        assert_eq!(session.counts().created, 3);
        assert!(!session.has_failures());
        assert!(summary.deferrals >= 2);

        let child = session.remap(EntityKind::Post, SourceId(3)).unwrap();
        let parent = session.remap(EntityKind::Post, SourceId(2)).unwrap();
        let stored = store.entity(child).unwrap();
        assert_eq!(stored.attribute("parent"), Some(&id_value(parent)));
    }

    #[test]
    fn test_cycle_fails_without_looping() {
        let file = write_bundle(&format!("{}{}{}", page(1, 2), page(2, 1), page(3, 3)));
        let store = MemoryStore::default();
        let (session, summary) = materialize(&file, &store, &ImportSettings::default());

        assert_eq!(summary.unresolved, 3);
        assert!(summary.rounds <= 3);
        assert_eq!(store.entity_count(), 0);
        for failure in session.failures() {
            assert!(matches!(
                failure.outcome,
                Outcome::Failed(FailureReason::UnresolvedDependency(_))
            ));
        }
    }

    #[test]
    fn test_rerun_skips_existing_entities() {
        let file = write_bundle(&format!("{}{}", page(1, 0), page(2, 1)));
        let store = MemoryStore::default();
        materialize(&file, &store, &ImportSettings::default());
        let (second, _) = materialize(&file, &store, &ImportSettings::default());

        assert_eq!(store.entity_count(), 2);
        assert_eq!(second.counts().created, 0);
        assert_eq!(second.counts().skipped, 2);

        let settings = ImportSettings {
            update_existing: true,
            ..ImportSettings::default()
        };
        let (third, _) = materialize(&file, &store, &settings);
        assert_eq!(third.counts().updated, 2);
    }

    #[test]
    fn test_write_failure_recorded_and_run_continues() {
        let file = write_bundle(&format!(
            "{}<wp:category><wp:term_id>5</wp:term_id><wp:category_nicename>demo</wp:category_nicename></wp:category>",
            page(1, 0)
        ));
        let store = MemoryStore::default();
        store.forbid(EntityKind::Term);
        let (session, _) = materialize(&file, &store, &ImportSettings::default());

        assert_eq!(session.counts().created, 1);
        assert_eq!(session.counts().failed, 1);
        assert!(matches!(
            session.failures().next().unwrap().outcome,
            Outcome::Failed(FailureReason::Write(_))
        ));
    }

    #[test]
    fn test_comment_and_attachment_parent() {
        let file = write_bundle(
            r#"<item><title>photo</title><wp:post_id>9</wp:post_id><wp:post_type>attachment</wp:post_type>
               <wp:post_parent>12</wp:post_parent>
               <wp:attachment_url>https://src.test/wp-content/uploads/2024/01/photo.jpg</wp:attachment_url></item>
               <item><title>Post</title><guid>https://src.test/?p=12</guid><wp:post_id>12</wp:post_id>
               <content:encoded><![CDATA[<img src="https://src.test/wp-content/uploads/2024/01/photo.jpg" class="wp-image-9">]]></content:encoded>
               <wp:comment><wp:comment_id>4</wp:comment_id><wp:comment_author>Ann</wp:comment_author>
               <wp:comment_parent>5</wp:comment_parent><wp:comment_date>2024-01-01</wp:comment_date></wp:comment>
               <wp:comment><wp:comment_id>5</wp:comment_id><wp:comment_author>Bob</wp:comment_author>
               <wp:comment_date>2024-01-01</wp:comment_date></wp:comment></item>"#,
        );
        let store = MemoryStore::new("https://dest.test");
        let (session, _) = materialize(&file, &store, &ImportSettings::default());
        assert!(!session.has_failures());

        let attachment = session.remap(EntityKind::Attachment, SourceId(9)).unwrap();
        let post = session.remap(EntityKind::Post, SourceId(12)).unwrap();
        let stored_attachment = store.entity(attachment).unwrap();
        assert_eq!(stored_attachment.attribute("parent"), Some(&id_value(post)));

        let content = store.entity(post).unwrap().attribute("content").cloned().unwrap();
        let expected = format!(
            r#"<img src="https://dest.test/wp-content/uploads/imported/{0}/photo.jpg" class="wp-image-{0}">"#,
            attachment
        );
        assert_eq!(content.as_str(), Some(expected.as_str()));

        let reply = session.remap(EntityKind::Comment, SourceId(4)).unwrap();
        let first = session.remap(EntityKind::Comment, SourceId(5)).unwrap();
        assert_eq!(store.entity(reply).unwrap().attribute("parent"), Some(&id_value(first)));
    }

    fn page_linking(id: u64, target: u64) -> String {
        format!(
            "<item><title>Page {id}</title><guid>https://src.test/?page_id={id}</guid>\
             <wp:post_id>{id}</wp:post_id><wp:post_type>page</wp:post_type>\
             <wp:postmeta><wp:meta_key>page_id</wp:meta_key><wp:meta_value>{target}</wp:meta_value></wp:postmeta></item>"
        )
    }

    #[test]
    fn test_meta_reference_to_later_post_is_remapped() {
        for items in [
            format!("{}{}", page_linking(101, 102), page(102, 0)),
            format!("{}{}", page(102, 0), page_linking(101, 102)),
        ] {
            let file = write_bundle(&items);
            let store = MemoryStore::default();
            let patterns = RemapPatterns::default();
            let sink = RecordingSink::new();
            let mut parser = BundleParser::open(file.path()).unwrap();
            let mut session = ImportSession::new();
            Materializer::new(&store, &patterns, &sink, &ImportSettings::default())
                .run(&mut parser, &mut session)
                .unwrap();

            let linking = session.remap(EntityKind::Post, SourceId(101)).unwrap();
            let target = session.remap(EntityKind::Post, SourceId(102)).unwrap();
            let meta = store.entity(linking).unwrap().attribute("meta").cloned().unwrap();
            assert_eq!(meta.get("page_id"), Some(&ValueTree::string(target.to_string())));
            // a reference that resolves later is not reported
            assert_eq!(sink.count(Severity::Warning), 0);
        }
    }

    #[test]
    fn test_meta_reference_never_imported_is_reported_once() {
        let file = write_bundle(&page_linking(101, 555));
        let store = MemoryStore::default();
        let patterns = RemapPatterns::default();
        let sink = RecordingSink::new();
        let mut parser = BundleParser::open(file.path()).unwrap();
        let mut session = ImportSession::new();
        Materializer::new(&store, &patterns, &sink, &ImportSettings::default())
            .run(&mut parser, &mut session)
            .unwrap();

        let linking = session.remap(EntityKind::Post, SourceId(101)).unwrap();
        let meta = store.entity(linking).unwrap().attribute("meta").cloned().unwrap();
        assert_eq!(meta.get("page_id"), Some(&ValueTree::string("555")));
        let misses: Vec<_> = sink
            .entries()
            .into_iter()
            .filter(|e| e.message == "Unresolved reference left unchanged")
            .collect();
        assert_eq!(misses.len(), 1);
        assert_eq!(misses[0].context_value("source_id"), Some("555"));
    }
}
