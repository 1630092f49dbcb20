//! Core identifier types shared by every stage of an import

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Kind of entity a bundle record materializes into
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Author,
    Term,
    Post,
    Attachment,
    Comment,
    MenuItem,
}

impl EntityKind {
    /// Every kind, in materialization order
    pub const ALL: [EntityKind; 6] = [
        EntityKind::Author,
        EntityKind::Term,
        EntityKind::Attachment,
        EntityKind::Post,
        EntityKind::MenuItem,
        EntityKind::Comment,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Author => "author",
            Self::Term => "term",
            Self::Post => "post",
            Self::Attachment => "attachment",
            Self::Comment => "comment",
            Self::MenuItem => "menu_item",
        }
    }

    /// Whether records of this kind are materialized in the first pass
    ///
    /// First-pass kinds are referenced by later records but never reference
    /// second-pass records themselves.
    pub fn is_first_pass(&self) -> bool {
        matches!(self, Self::Author | Self::Term | Self::Attachment)
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "author" => Ok(Self::Author),
            "term" => Ok(Self::Term),
            "post" => Ok(Self::Post),
            "attachment" => Ok(Self::Attachment),
            "comment" => Ok(Self::Comment),
            "menu_item" => Ok(Self::MenuItem),
            other => Err(format!("unknown entity kind '{}'", other)),
        }
    }
}

/// Identifier of a record inside the bundle being imported
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SourceId(pub u64);

impl SourceId {
    /// Parse a source id, treating `0` and blanks as "no reference"
    pub fn parse_ref(raw: &str) -> Option<Self> {
        match raw.trim().parse::<u64>() {
            Ok(0) | Err(_) => None,
            Ok(id) => Some(SourceId(id)),
        }
    }
}

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier assigned by the destination store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DestinationId(pub u64);

impl fmt::Display for DestinationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Key the destination store uses to recognise an entity that already exists
///
/// Rendered as `kind-specific:parts` so it can be stored and compared as a plain string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NaturalKey(pub String);

impl NaturalKey {
    pub fn author(login: &str) -> Self {
        NaturalKey(format!("login:{}", login))
    }

    pub fn term(taxonomy: &str, slug: &str) -> Self {
        NaturalKey(format!("term:{}:{}", taxonomy, slug))
    }

    pub fn post(post_type: &str, guid: &str) -> Self {
        NaturalKey(format!("guid:{}:{}", post_type, guid))
    }

    pub fn comment(post: DestinationId, author: &str, date: &str) -> Self {
        NaturalKey(format!("comment:{}:{}:{}", post, author, date))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NaturalKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_id_parse_ref() {
        assert_eq!(SourceId::parse_ref("12"), Some(SourceId(12)));
        assert_eq!(SourceId::parse_ref(" 7 "), Some(SourceId(7)));
        assert_eq!(SourceId::parse_ref("0"), None);
        assert_eq!(SourceId::parse_ref(""), None);
        assert_eq!(SourceId::parse_ref("abc"), None);
    }

    #[test]
    fn test_entity_kind_round_trip_str() {
        for kind in EntityKind::ALL {
            assert_eq!(kind.as_str().parse::<EntityKind>().unwrap(), kind);
        }
        assert!("widget".parse::<EntityKind>().is_err());
    }

    #[test]
    fn test_natural_keys_distinguish_kinds() {
        assert_ne!(NaturalKey::post("page", "x"), NaturalKey::post("post", "x"));
        assert_eq!(NaturalKey::term("category", "demo").as_str(), "term:category:demo");
    }
}
