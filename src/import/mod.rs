//! Import orchestration
//!
//! One run moves a bundle through these phases:
//!
//! ```text
//! FetchingAssets          content bundle, secondary documents, attachment files
//!        │
//!        ▼
//! MaterializingEntities   pass 1: authors, terms, attachments
//!        │                pass 2: posts, menu items, comments (worklist)
//!        ▼
//! ImportingSecondaryData  site settings, then widgets / customizer / option
//!        │                trees side by side against the read-only session
//!        ▼
//! Completed | CompletedWithErrors          (Failed: primary bundle unreadable)
//! ```
//!
//! # Example Usage
//!
//! ```no_run
//! use siteimport::import::{BundleDescriptor, ImportCoordinatorBuilder, ImportOptions};
//! use siteimport::store::MemoryStore;
//! use std::sync::Arc;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let store = Arc::new(MemoryStore::default());
//! let coordinator = ImportCoordinatorBuilder::new(store).build()?;
//!
//! let bundle = BundleDescriptor::from_content("demo", "demo/content.xml".parse()?);
//! let report = coordinator.run_import(&bundle, &ImportOptions::default()).await?;
//! println!("{} created", report.counts.created);
//! # Ok(())
//! # }
//! ```

pub mod coordinator;
pub mod descriptor;
pub mod hooks;
pub mod progress;
pub mod report;

pub use coordinator::{ImportCoordinator, ImportCoordinatorBuilder, ImportError};
pub use descriptor::{BundleDescriptor, ImportOptions, OptionTreeSource, SecondaryAsset};
pub use hooks::ImportHook;
pub use progress::{CancellationFlag, ImportProgress, ProgressStats};
pub use report::{ImportPhase, ImportReport};
