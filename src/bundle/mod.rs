//! Primary content bundle (WXR) parsing
//!
//! The bundle is read as a stream: records are produced in document order as
//! their closing tag is seen, and the parser can be rewound for a second pass.

mod parser;
mod record;

pub use parser::{BundleParser, Records};
pub use record::{
    AttachmentRecord, AuthorRecord, BundleHeader, CommentRecord, MenuItemRecord, MenuTarget,
    ParseError, ParseErrorKind, PostRecord, Record, TermRecord, TermRef,
};
