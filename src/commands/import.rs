use anyhow::{Context, Result};
use siteimport::{
    config::Config,
    import::{BundleDescriptor, CancellationFlag, ImportCoordinatorBuilder, ImportOptions},
    store::MemoryStore,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

/// Options of the `import` subcommand
pub struct ImportArgs {
    /// Configured bundle name or a path/URL of a WXR file
    pub bundle: String,
    pub store: PathBuf,
    pub base_url: String,
    pub quiet: bool,
    pub update_existing: bool,
    pub no_attachments: bool,
    pub report: Option<PathBuf>,
}

pub async fn import_bundle(
    config: Config,
    config_dir: &Path,
    args: ImportArgs,
    cancel: CancellationFlag,
) -> Result<()> {
    let descriptor = match config.bundle(&args.bundle) {
        Some(bundle) => bundle.relative_to(config_dir),
        None => {
            let locator = args.bundle.parse().map_err(|e: String| {
                anyhow::anyhow!("'{}' is neither a configured bundle nor a path: {}", args.bundle, e)
            })?;
            let name = Path::new(&args.bundle)
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_else(|| args.bundle.clone());
            BundleDescriptor::from_content(name, locator)
        }
    };

    // attachment files are copied next to the snapshot
    let store = Arc::new(
        MemoryStore::load_or_new(&args.store, &args.base_url)
            .with_context(|| format!("Failed to open store {}", args.store.display()))?
            .with_media_dir(args.store.with_extension("media")),
    );
    let coordinator = ImportCoordinatorBuilder::new(store.clone())
        .with_config(&config)
        .build()?;

    let mut settings = config.import.clone();
    if args.update_existing {
        settings.update_existing = true;
    }
    if args.no_attachments {
        settings.fetch_attachments = false;
    }
    let options = ImportOptions::new(settings)
        .with_quiet(args.quiet)
        .with_cancellation(cancel);

    info!("Importing bundle '{}' from {}", descriptor.name, descriptor.content);
    let result = coordinator.run_import(&descriptor, &options).await;

    // keep partial work even when the run failed
    store
        .save(&args.store)
        .with_context(|| format!("Failed to save store {}", args.store.display()))?;

    let report = result?;
    if let Some(ref path) = args.report {
        std::fs::write(path, report.to_json()?)
            .with_context(|| format!("Failed to write report {}", path.display()))?;
        info!("Wrote report to {}", path.display());
    }
    if !args.quiet {
        report.print_summary();
    }
    if !report.is_success() {
        warn!("Import finished with {} failed items", report.counts.failed);
    }
    Ok(())
}
