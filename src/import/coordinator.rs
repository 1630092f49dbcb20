//! Import coordinator that drives one bundle through every phase

use super::descriptor::{BundleDescriptor, ImportOptions, SecondaryAsset};
use super::hooks::ImportHook;
use super::progress::{CancellationFlag, ImportProgress};
use super::report::{ImportPhase, ImportReport};
use crate::bundle::{BundleParser, ParseError, Record};
use crate::config::{Config, FetchConfig, ImportSettings, RemapConfig};
use crate::fetch::{FetchError, FetchResult, Locator, ResourceFetcher};
use crate::importers::{
    CustomizerImporter, ImportContext, OptionTreeImporter, SecondaryImporter, WidgetImporter,
};
use crate::logging::{LogSink, Severity, TracingSink};
use crate::materialize::{MaterializeError, MaterializeSummary, Materializer};
use crate::remap::{RemapPatterns, ValueTree};
use crate::session::{FailureReason, ImportSession, ItemOutcome, ItemRef, Outcome, UnitKind};
use crate::store::ContentStore;
use crate::types::EntityKind;
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tracing::{debug, error, info, warn};

/// Errors that end a run before it completes
#[derive(Debug, Error)]
pub enum ImportError {
    #[error("Failed to fetch bundle {locator}: {source}")]
    Fetch {
        locator: String,
        #[source]
        source: FetchError,
    },

    #[error("Bundle could not be parsed: {0}")]
    Parse(#[from] ParseError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Import task failed: {0}")]
    Task(String),
}

impl From<MaterializeError> for ImportError {
    fn from(e: MaterializeError) -> Self {
        match e {
            MaterializeError::Parse(e) => ImportError::Parse(e),
            MaterializeError::Rewind(e) => ImportError::Io(e),
        }
    }
}

/// A decoded-later secondary document
struct SecondaryDocument {
    asset: SecondaryAsset,
    label: String,
    json: String,
}

/// Runs imports against one destination store
pub struct ImportCoordinator {
    store: Arc<dyn ContentStore>,
    fetcher: ResourceFetcher,
    patterns: RemapPatterns,
    sink: Arc<dyn LogSink>,
    hooks: Vec<Arc<dyn ImportHook>>,
}

impl ImportCoordinator {
    pub fn store(&self) -> &Arc<dyn ContentStore> {
        &self.store
    }

    /// Import one bundle
    ///
    /// Per-item failures end the run as `CompletedWithErrors`. An unreadable
    /// primary bundle is fatal: the session is discarded, hooks see a
    /// `Failed` report and the error is returned.
    pub async fn run_import(
        &self,
        descriptor: &BundleDescriptor,
        options: &ImportOptions,
    ) -> Result<ImportReport, ImportError> {
        let started = Instant::now();
        info!("Starting import of bundle '{}'", descriptor.name);
        for hook in &self.hooks {
            hook.before_import(descriptor);
        }

        let progress = Arc::new(ImportProgress::new(options.quiet, options.cancel.clone()));
        let mut session = ImportSession::new();
        let result = self.execute(descriptor, options, &progress, &mut session).await;
        progress.finish();

        match result {
            Ok(summary) => {
                let cancelled = summary.cancelled || options.cancel.is_cancelled();
                let status = if cancelled || session.has_failures() {
                    ImportPhase::CompletedWithErrors
                } else {
                    ImportPhase::Completed
                };
                let report = ImportReport {
                    session_id: session.id(),
                    bundle: descriptor.name.clone(),
                    status,
                    started_at: session.started_at(),
                    duration_seconds: started.elapsed().as_secs_f64(),
                    counts: session.counts(),
                    significant_pages: session.significant_pages(),
                    materialize: summary,
                    cancelled,
                    error: None,
                    outcomes: session.into_outcomes(),
                };
                info!(
                    "Import of '{}' {}: {} created, {} updated, {} skipped, {} failed",
                    report.bundle,
                    report.status,
                    report.counts.created,
                    report.counts.updated,
                    report.counts.skipped,
                    report.counts.failed
                );
                self.run_after_hooks(descriptor, &report);
                Ok(report)
            }
            Err(e) => {
                error!("Import of '{}' failed: {}", descriptor.name, e);
                let report = ImportReport {
                    session_id: session.id(),
                    bundle: descriptor.name.clone(),
                    status: ImportPhase::Failed,
                    started_at: session.started_at(),
                    duration_seconds: started.elapsed().as_secs_f64(),
                    counts: Default::default(),
                    outcomes: Vec::new(),
                    significant_pages: Default::default(),
                    materialize: MaterializeSummary::default(),
                    cancelled: options.cancel.is_cancelled(),
                    error: Some(e.to_string()),
                };
                self.run_after_hooks(descriptor, &report);
                Err(e)
            }
        }
    }

    async fn execute(
        &self,
        descriptor: &BundleDescriptor,
        options: &ImportOptions,
        progress: &Arc<ImportProgress>,
        session: &mut ImportSession,
    ) -> Result<MaterializeSummary, ImportError> {
        let cancel = &options.cancel;

        enter(ImportPhase::FetchingAssets, progress);
        let content = match self
            .fetcher
            .fetch_verified(&descriptor.content, descriptor.content_sha256.as_deref(), cancel)
            .await
        {
            Ok(content) => content,
            Err(FetchError::Cancelled) => return Ok(cancelled_summary()),
            Err(source) => {
                return Err(ImportError::Fetch {
                    locator: descriptor.content.to_string(),
                    source,
                })
            }
        };
        let documents = self.fetch_secondary(descriptor, options, progress, session).await;
        // downloaded files must outlive materialization
        let (attachment_files, _downloads) = if options.settings.fetch_attachments {
            self.prefetch_attachments(&content, options, progress, session).await?
        } else {
            (HashMap::new(), Vec::new())
        };
        if cancel.is_cancelled() {
            return Ok(cancelled_summary());
        }

        // store writes block, so the rest of the run leaves the executor
        let job = StoreJob {
            store: self.store.clone(),
            patterns: self.patterns.clone(),
            sink: self.sink.clone(),
            settings: options.settings.clone(),
            progress: progress.clone(),
            cancel: cancel.clone(),
            descriptor: descriptor.clone(),
            bundle_path: content.path().to_path_buf(),
            attachment_files,
            documents,
        };
        let mut owned = std::mem::replace(session, ImportSession::new());
        let (owned, result) = tokio::task::spawn_blocking(move || {
            let result = job.run(&mut owned);
            (owned, result)
        })
        .await
        .map_err(|e| ImportError::Task(e.to_string()))?;
        *session = owned;
        result
    }

    /// Fetch widget, customizer and option-tree documents concurrently
    async fn fetch_secondary(
        &self,
        descriptor: &BundleDescriptor,
        options: &ImportOptions,
        progress: &ImportProgress,
        session: &mut ImportSession,
    ) -> Vec<SecondaryDocument> {
        let assets = descriptor.secondary_assets();
        if assets.is_empty() {
            return Vec::new();
        }
        let locators = assets.iter().map(|(_, locator)| locator.clone()).collect();
        let mut fetched = self.fetcher.fetch_all(locators, &options.cancel).await;

        let mut documents = Vec::new();
        for (asset, locator) in assets {
            let Some(index) = fetched.iter().position(|(l, _)| *l == locator) else {
                continue;
            };
            let (_, result) = fetched.swap_remove(index);
            let label = locator.file_name().unwrap_or_else(|| locator.to_string());
            let json = result
                .map_err(|e| e.to_string())
                .and_then(|r| r.read_to_string().map_err(|e| e.to_string()));
            match json {
                Ok(json) => documents.push(SecondaryDocument { asset, label, json }),
                Err(reason) => self.asset_failed(&locator, &label, reason, progress, session),
            }
        }
        documents
    }

    /// Download remote attachment files named by the bundle
    async fn prefetch_attachments(
        &self,
        content: &FetchResult,
        options: &ImportOptions,
        progress: &ImportProgress,
        session: &mut ImportSession,
    ) -> Result<(HashMap<String, PathBuf>, Vec<FetchResult>), ImportError> {
        let mut parser = BundleParser::open(content.path())?;
        let mut seen = HashSet::new();
        let mut locators = Vec::new();
        for result in parser.records() {
            match result {
                Ok(Record::Attachment(attachment)) => {
                    if let Ok(locator @ Locator::Remote(_)) = attachment.url.parse::<Locator>() {
                        if seen.insert(attachment.url.clone()) {
                            locators.push(locator);
                        }
                    }
                }
                // fatal errors surface again during materialization
                Err(e) if e.is_fatal() => break,
                _ => {}
            }
        }
        if locators.is_empty() {
            return Ok((HashMap::new(), Vec::new()));
        }

        info!("Fetching {} attachment files", locators.len());
        let mut files = HashMap::new();
        let mut downloads = Vec::new();
        for (locator, result) in self.fetcher.fetch_all(locators, &options.cancel).await {
            let label = locator.file_name().unwrap_or_else(|| locator.to_string());
            match result {
                Ok(fetched) => {
                    files.insert(locator.to_string(), fetched.path().to_path_buf());
                    downloads.push(fetched);
                }
                Err(FetchError::Cancelled) => {}
                Err(e) => self.asset_failed(&locator, &label, e.to_string(), progress, session),
            }
        }
        Ok((files, downloads))
    }

    fn asset_failed(
        &self,
        locator: &Locator,
        label: &str,
        reason: String,
        progress: &ImportProgress,
        session: &mut ImportSession,
    ) {
        self.sink.record(
            Severity::Error,
            "Asset fetch failed",
            &[("locator", locator.to_string()), ("error", reason.clone())],
        );
        let outcome = Outcome::Failed(FailureReason::Fetch(reason));
        progress.item_done(label, &outcome);
        session.record_outcome(
            ItemRef::Asset {
                locator: locator.to_string(),
            },
            label,
            outcome,
        );
    }

    fn run_after_hooks(&self, descriptor: &BundleDescriptor, report: &ImportReport) {
        for hook in &self.hooks {
            hook.after_import(descriptor, report);
        }
    }
}

/// Materialization and secondary import, run on a blocking thread
struct StoreJob {
    store: Arc<dyn ContentStore>,
    patterns: RemapPatterns,
    sink: Arc<dyn LogSink>,
    settings: ImportSettings,
    progress: Arc<ImportProgress>,
    cancel: CancellationFlag,
    descriptor: BundleDescriptor,
    bundle_path: PathBuf,
    /// Source attachment URL → downloaded file
    attachment_files: HashMap<String, PathBuf>,
    documents: Vec<SecondaryDocument>,
}

impl StoreJob {
    fn run(self, session: &mut ImportSession) -> Result<MaterializeSummary, ImportError> {
        enter(ImportPhase::MaterializingEntities, &self.progress);
        let mut parser = BundleParser::open(&self.bundle_path)?;
        let summary = Materializer::new(
            self.store.as_ref(),
            &self.patterns,
            self.sink.as_ref(),
            &self.settings,
        )
        .with_attachment_files(self.attachment_files)
        .with_progress(&self.progress)
        .run(&mut parser, session)?;
        if summary.cancelled || self.cancel.is_cancelled() {
            return Ok(summary);
        }

        enter(ImportPhase::ImportingSecondaryData, &self.progress);
        let find_page = |title: Option<&str>| {
            title.map(|t| (t.to_string(), self.store.find_entity_by_title(EntityKind::Post, t)))
        };
        let front = find_page(self.descriptor.front_page_title.as_deref());
        let blog = find_page(self.descriptor.blog_page_title.as_deref());
        if let Some((_, Some(id))) = front {
            session.set_front_page(id);
        }
        if let Some((_, Some(id))) = blog {
            session.set_blog_page(id);
        }

        let outcomes = {
            let ctx = ImportContext {
                session: &*session,
                store: self.store.as_ref(),
                patterns: &self.patterns,
                sink: self.sink.as_ref(),
                cancel: &self.cancel,
                progress: Some(self.progress.as_ref()),
            };
            let mut outcomes = Vec::new();
            if let Some((title, id)) = front {
                outcomes.extend(write_page_setting(&ctx, "page_on_front", &title, id));
            }
            if let Some((title, id)) = blog {
                outcomes.extend(write_page_setting(&ctx, "page_for_posts", &title, id));
            }
            outcomes.extend(write_menu_locations(&ctx, &self.descriptor));
            outcomes.extend(run_secondary(self.documents, &ctx));
            outcomes
        };
        session.extend_outcomes(outcomes);
        Ok(summary)
    }
}

fn enter(phase: ImportPhase, progress: &ImportProgress) {
    info!("Import phase: {}", phase);
    progress.set_phase(phase.as_str());
}

fn cancelled_summary() -> MaterializeSummary {
    MaterializeSummary {
        cancelled: true,
        ..MaterializeSummary::default()
    }
}

/// Point `option` at the page found by title and switch the front page to static
fn write_page_setting(
    ctx: &ImportContext<'_>,
    option: &str,
    title: &str,
    id: Option<crate::types::DestinationId>,
) -> Vec<ItemOutcome> {
    let Some(id) = id else {
        return vec![ctx.fail_unit(
            UnitKind::SiteSetting,
            option,
            FailureReason::MissingTarget(format!("page titled '{}'", title)),
        )];
    };
    let mut outcomes = Vec::new();
    if option == "page_on_front" {
        outcomes.push(ctx.write_unit(
            UnitKind::SiteSetting,
            "show_on_front",
            "options",
            "show_on_front",
            &ValueTree::string("page"),
        ));
    }
    outcomes.push(ctx.write_unit(
        UnitKind::SiteSetting,
        option,
        "options",
        option,
        &ValueTree::number(id.0),
    ));
    outcomes
}

/// Assign imported menus to theme locations
fn write_menu_locations(ctx: &ImportContext<'_>, descriptor: &BundleDescriptor) -> Vec<ItemOutcome> {
    if descriptor.menu_locations.is_empty() {
        return Vec::new();
    }
    let mut outcomes = Vec::new();
    let mut locations = match ctx.store.read_setting("theme_mods", "nav_menu_locations") {
        Some(ValueTree::Mapping(entries)) => entries,
        _ => Vec::new(),
    };

    for (location, slug) in &descriptor.menu_locations {
        let menu = ctx
            .session
            .term_by_slug("nav_menu", slug)
            .and_then(|source| ctx.session.remap(EntityKind::Term, source));
        let Some(menu) = menu else {
            outcomes.push(ctx.fail_unit(
                UnitKind::SiteSetting,
                &format!("nav_menu_locations/{}", location),
                FailureReason::MissingTarget(format!("menu '{}'", slug)),
            ));
            continue;
        };
        let value = ValueTree::number(menu.0);
        match locations.iter_mut().find(|(k, _)| k == location) {
            Some(entry) => entry.1 = value,
            None => locations.push((location.clone(), value)),
        }
    }

    outcomes.push(ctx.write_unit(
        UnitKind::SiteSetting,
        "nav_menu_locations",
        "theme_mods",
        "nav_menu_locations",
        &ValueTree::Mapping(locations),
    ));
    outcomes
}

/// Run the secondary importers side by side against the finished session
fn run_secondary(documents: Vec<SecondaryDocument>, ctx: &ImportContext<'_>) -> Vec<ItemOutcome> {
    let importers: Vec<(UnitKind, Box<dyn SecondaryImporter>)> = documents
        .into_iter()
        .map(|doc| -> (UnitKind, Box<dyn SecondaryImporter>) {
            match doc.asset {
                SecondaryAsset::Widgets => (
                    UnitKind::Widget,
                    Box::new(WidgetImporter::new(doc.label, doc.json)),
                ),
                SecondaryAsset::Customizer => (
                    UnitKind::CustomizerSetting,
                    Box::new(CustomizerImporter::new(doc.label, doc.json)),
                ),
                SecondaryAsset::OptionTree(name) => (
                    UnitKind::OptionTree,
                    Box::new(OptionTreeImporter::new(name, doc.json)),
                ),
            }
        })
        .collect();

    std::thread::scope(|s| {
        let handles: Vec<_> = importers
            .iter()
            .map(|(unit, importer)| {
                let ctx = *ctx;
                let handle = s.spawn(move || {
                    debug!("Running {} importer", importer.name());
                    importer.import(&ctx)
                });
                (*unit, importer.name(), handle)
            })
            .collect();

        handles
            .into_iter()
            .flat_map(|(unit, name, handle)| {
                handle.join().unwrap_or_else(|_| {
                    warn!("{} importer panicked", name);
                    vec![ctx.fail_unit(unit, name, FailureReason::Write("importer panicked".to_string()))]
                })
            })
            .collect()
    })
}

/// Builder for [`ImportCoordinator`]
pub struct ImportCoordinatorBuilder {
    store: Arc<dyn ContentStore>,
    fetch_config: FetchConfig,
    remap_config: RemapConfig,
    sink: Arc<dyn LogSink>,
    hooks: Vec<Arc<dyn ImportHook>>,
}

impl ImportCoordinatorBuilder {
    pub fn new(store: Arc<dyn ContentStore>) -> Self {
        Self {
            store,
            fetch_config: FetchConfig::default(),
            remap_config: RemapConfig::default(),
            sink: Arc::new(TracingSink),
            hooks: Vec::new(),
        }
    }

    /// Take fetch and remap settings from a loaded [`Config`]
    pub fn with_config(self, config: &Config) -> Self {
        self.with_fetch_config(config.fetch.clone())
            .with_remap_config(config.remap.clone())
    }

    pub fn with_fetch_config(mut self, config: FetchConfig) -> Self {
        self.fetch_config = config;
        self
    }

    pub fn with_remap_config(mut self, config: RemapConfig) -> Self {
        self.remap_config = config;
        self
    }

    pub fn with_sink(mut self, sink: Arc<dyn LogSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn with_hook(mut self, hook: impl ImportHook + 'static) -> Self {
        self.hooks.push(Arc::new(hook));
        self
    }

    pub fn build(self) -> Result<ImportCoordinator, ImportError> {
        let fetcher = ResourceFetcher::new(self.fetch_config)
            .map_err(|e| ImportError::Config(format!("Failed to build HTTP client: {}", e)))?;
        Ok(ImportCoordinator {
            store: self.store,
            fetcher,
            patterns: RemapPatterns::new(self.remap_config),
            sink: self.sink,
            hooks: self.hooks,
        })
    }
}
