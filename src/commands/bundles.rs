use anyhow::Result;
use siteimport::config::Config;

pub async fn list_bundles(config: Config) -> Result<()> {
    if config.bundles.is_empty() {
        println!("No bundles configured.");
        println!("\nAdd a [[bundles]] section to the configuration, or import a file directly:");
        println!("  siteimport import path/to/content.xml");
        return Ok(());
    }

    println!("\nConfigured bundles");
    println!("==================");
    for bundle in &config.bundles {
        println!("{}", bundle.name);
        println!("  content:     {}", bundle.content);
        if let Some(ref widgets) = bundle.widgets {
            println!("  widgets:     {}", widgets);
        }
        if let Some(ref customizer) = bundle.customizer {
            println!("  customizer:  {}", customizer);
        }
        for tree in &bundle.option_trees {
            println!("  option tree: {} ({})", tree.option_name, tree.file);
        }
        if let Some(ref title) = bundle.front_page_title {
            println!("  front page:  {}", title);
        }
    }
    Ok(())
}
