use anyhow::{Context, Result};
use siteimport::{bundle::BundleParser, types::EntityKind};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Parse a bundle without importing it and print what it contains
pub async fn inspect_bundle(path: PathBuf, show_errors: bool) -> Result<()> {
    let mut parser = BundleParser::open(&path)
        .with_context(|| format!("Failed to open bundle {}", path.display()))?;

    let mut counts: BTreeMap<EntityKind, usize> = BTreeMap::new();
    let mut errors = Vec::new();
    let mut fatal = None;
    for result in parser.records() {
        match result {
            Ok(record) => *counts.entry(record.kind()).or_default() += 1,
            Err(e) if e.is_fatal() => {
                fatal = Some(e);
                break;
            }
            Err(e) => errors.push(e),
        }
    }

    let header = parser.header();
    println!("\nBundle: {}", path.display());
    println!("==============");
    if let Some(ref title) = header.title {
        println!("Site title:    {}", title);
    }
    if let Some(ref url) = header.base_site_url {
        println!("Source site:   {}", url);
    }
    if let Some(ref version) = header.wxr_version {
        println!("WXR version:   {}", version);
    }
    for kind in EntityKind::ALL {
        println!("{:<14} {}", format!("{}:", kind), counts.get(&kind).copied().unwrap_or(0));
    }
    println!("Parse errors:  {}", errors.len());
    if show_errors {
        for e in &errors {
            println!("  {}", e);
        }
    }

    if let Some(e) = fatal {
        anyhow::bail!("Bundle is unreadable: {}", e);
    }
    Ok(())
}
