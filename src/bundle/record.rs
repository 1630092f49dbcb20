//! Typed records yielded by the bundle parser

use crate::types::{EntityKind, SourceId};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Channel-level information about the exporting site
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BundleHeader {
    pub title: Option<String>,
    pub wxr_version: Option<String>,
    pub base_site_url: Option<String>,
    pub base_blog_url: Option<String>,
}

/// A reference to a term by natural key
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TermRef {
    pub taxonomy: String,
    pub slug: String,
}

impl fmt::Display for TermRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.taxonomy, self.slug)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorRecord {
    pub id: SourceId,
    pub login: String,
    pub email: String,
    pub display_name: String,
    pub first_name: String,
    pub last_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TermRecord {
    pub id: SourceId,
    pub taxonomy: String,
    pub slug: String,
    pub name: String,
    pub description: String,
    /// Slug of the parent term in the same taxonomy
    pub parent_slug: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostRecord {
    pub id: SourceId,
    /// `post`, `page` or a custom type
    pub post_type: String,
    pub guid: String,
    pub title: String,
    pub slug: String,
    pub content: String,
    pub excerpt: String,
    pub status: String,
    pub date: String,
    pub author_login: Option<String>,
    pub parent: Option<SourceId>,
    pub menu_order: i64,
    pub sticky: bool,
    pub terms: Vec<TermRef>,
    /// Featured image
    pub thumbnail: Option<SourceId>,
    /// Raw `wp:postmeta` pairs in bundle order
    pub meta: Vec<(String, String)>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttachmentRecord {
    pub id: SourceId,
    pub guid: String,
    pub title: String,
    pub slug: String,
    /// Where the file lived on the source site
    pub url: String,
    pub date: String,
    pub author_login: Option<String>,
    pub parent: Option<SourceId>,
    pub meta: Vec<(String, String)>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommentRecord {
    pub id: SourceId,
    pub post: SourceId,
    pub parent: Option<SourceId>,
    pub author: String,
    pub author_email: String,
    pub date: String,
    pub content: String,
    pub approved: String,
    pub comment_type: String,
}

/// What a menu item points at
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MenuTarget {
    /// A post or page, `object` is its post type
    Post { object: String, id: SourceId },
    /// A term, `object` is its taxonomy
    Term { object: String, id: SourceId },
    /// A literal link
    Custom { url: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MenuItemRecord {
    pub id: SourceId,
    pub guid: String,
    pub title: String,
    pub menu: Option<TermRef>,
    pub parent_item: Option<SourceId>,
    pub target: MenuTarget,
    pub menu_order: i64,
    pub status: String,
}

/// One entity of the content bundle
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "record", rename_all = "snake_case")]
pub enum Record {
    Author(AuthorRecord),
    Term(TermRecord),
    Post(PostRecord),
    Attachment(AttachmentRecord),
    Comment(CommentRecord),
    MenuItem(MenuItemRecord),
}

impl Record {
    pub fn kind(&self) -> EntityKind {
        match self {
            Record::Author(_) => EntityKind::Author,
            Record::Term(_) => EntityKind::Term,
            Record::Post(_) => EntityKind::Post,
            Record::Attachment(_) => EntityKind::Attachment,
            Record::Comment(_) => EntityKind::Comment,
            Record::MenuItem(_) => EntityKind::MenuItem,
        }
    }

    pub fn source_id(&self) -> SourceId {
        match self {
            Record::Author(r) => r.id,
            Record::Term(r) => r.id,
            Record::Post(r) => r.id,
            Record::Attachment(r) => r.id,
            Record::Comment(r) => r.id,
            Record::MenuItem(r) => r.id,
        }
    }

    /// Human readable name for logs and reports
    pub fn label(&self) -> String {
        match self {
            Record::Author(r) => r.login.clone(),
            Record::Term(r) => format!("{}/{}", r.taxonomy, r.slug),
            Record::Post(r) => r.title.clone(),
            Record::Attachment(r) => r.title.clone(),
            Record::Comment(r) => format!("comment by {}", r.author),
            Record::MenuItem(r) => r.title.clone(),
        }
    }
}

/// A bundle element that could not be turned into a record
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind} at byte {offset}")]
pub struct ParseError {
    /// Byte offset of the element (or of the failure, for fatal errors)
    pub offset: u64,
    pub kind: ParseErrorKind,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseErrorKind {
    #[error("mismatched closing tag </{found}> inside <{expected}>")]
    Mismatched { expected: String, found: String },

    #[error("invalid text encoding: {0}")]
    Encoding(String),

    #[error("missing required field <{0}>")]
    MissingField(String),

    #[error("malformed XML: {0}")]
    Syntax(String),

    #[error("I/O error: {0}")]
    Io(String),
}

impl ParseError {
    pub fn new(offset: u64, kind: ParseErrorKind) -> Self {
        Self { offset, kind }
    }

    /// Fatal errors end the record stream; the rest skip one element
    pub fn is_fatal(&self) -> bool {
        matches!(self.kind, ParseErrorKind::Syntax(_) | ParseErrorKind::Io(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_error_fatality() {
        let skip = ParseError::new(10, ParseErrorKind::MissingField("wp:post_id".into()));
        assert!(!skip.is_fatal());
        assert_eq!(skip.to_string(), "missing required field <wp:post_id> at byte 10");

        let fatal = ParseError::new(99, ParseErrorKind::Syntax("unexpected EOF".into()));
        assert!(fatal.is_fatal());
    }
}
