//! Turning bundle records into destination entities

mod content;
mod materializer;

pub use content::{rewrite_content, ContentRewrite};
pub use materializer::{MaterializeError, MaterializeSummary, Materializer, UnresolvedDependency};
