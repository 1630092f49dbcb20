//! Nested-value remapping
//!
//! Walks [`ValueTree`]s and rewrites the leaves that positively match a known
//! reference shape. Which keys and URL paths count as references is driven by
//! [`crate::config::RemapConfig`].

mod patterns;
mod remapper;
pub mod serialized;
mod value;

pub use patterns::{
    apply_size_variant, split_size_variant, upload_relative_path, KindSet, RemapPatterns, Rule,
};
pub use remapper::{RemapMiss, RemapOutcome, Remapper};
pub use value::ValueTree;
