//! Subcommand implementations

mod bundles;
mod import;
mod init;
mod inspect;

pub use bundles::list_bundles;
pub use import::{import_bundle, ImportArgs};
pub use init::init_config;
pub use inspect::inspect_bundle;
