//! siteimport: content-bundle import engine
//!
//! Takes an exported site bundle (WXR content plus widget, customizer and
//! option-tree documents) and materializes it into a destination store:
//! - Streaming WXR parsing with per-element error recovery
//! - Two-pass, dependency-ordered entity materialization with idempotent re-runs
//! - An identifier remap session shared by every importer
//! - Structure-preserving remapping of ids and upload URLs inside nested values
//! - Asset fetching with retry, checksums and scoped temporary files

pub mod bundle;
pub mod config;
pub mod fetch;
pub mod import;
pub mod importers;
pub mod logging;
pub mod materialize;
pub mod remap;
pub mod session;
pub mod store;
pub mod types;

pub use config::Config;
pub use types::*;
