//! siteimport: import WXR content bundles into a content store
//!
//! Streams the bundle, materializes every entity in dependency order and
//! rewrites cross-references from source to destination identifiers.

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};
use commands::ImportArgs;
use siteimport::{config::Config, import::CancellationFlag, logging::init_subscriber};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "siteimport")]
#[command(about = "Import WXR content bundles and remap every cross-reference")]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = "siteimport.toml")]
    config: PathBuf,

    /// Verbosity level
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Import a configured bundle or a WXR file
    Import {
        /// Bundle name from the configuration, or a path/URL of a WXR file
        bundle: String,

        /// Store snapshot to import into (created if missing)
        #[arg(short, long, default_value = "store.json")]
        store: PathBuf,

        /// Public base URL of the destination site
        #[arg(long, default_value = "https://destination.test")]
        base_url: String,

        /// Overwrite entities that already exist
        #[arg(long)]
        update_existing: bool,

        /// Do not download attachment files
        #[arg(long)]
        no_attachments: bool,

        /// Write the JSON report to this file
        #[arg(long)]
        report: Option<PathBuf>,

        /// Quiet mode (no progress output)
        #[arg(short, long)]
        quiet: bool,
    },

    /// Parse a bundle and print what it contains
    Inspect {
        /// Path to the WXR file
        path: PathBuf,

        /// List every malformed element
        #[arg(long)]
        errors: bool,
    },

    /// List configured bundles
    Bundles,

    /// Write a default configuration file
    Init {
        /// Output directory
        #[arg(default_value = ".")]
        path: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = Config::load_or_default(&cli.config)?;
    init_subscriber(&config.logging, cli.verbose)?;

    match cli.command {
        Commands::Import {
            bundle,
            store,
            base_url,
            update_existing,
            no_attachments,
            report,
            quiet,
        } => {
            let cancel = CancellationFlag::new();
            let on_signal = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    warn!("Interrupt received, stopping after the current item");
                    on_signal.cancel();
                }
            });

            let config_dir = cli
                .config
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .unwrap_or(Path::new("."))
                .to_path_buf();
            info!("Using configuration directory {}", config_dir.display());
            let args = ImportArgs {
                bundle,
                store,
                base_url,
                quiet,
                update_existing,
                no_attachments,
                report,
            };
            commands::import_bundle(config, &config_dir, args, cancel).await
        }
        Commands::Inspect { path, errors } => commands::inspect_bundle(path, errors).await,
        Commands::Bundles => commands::list_bundles(config).await,
        Commands::Init { path } => commands::init_config(path).await,
    }
}
