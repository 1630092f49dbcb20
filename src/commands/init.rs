use anyhow::{Context, Result};
use siteimport::config::Config;
use std::path::PathBuf;

pub async fn init_config(path: PathBuf) -> Result<()> {
    let config = Config::default();
    let config_path = path.join("siteimport.toml");
    if config_path.exists() {
        anyhow::bail!("Configuration file already exists: {}", config_path.display());
    }

    let toml_content = format!(
        r#"# siteimport configuration

[logging]
format = "text"
level = "info"

[fetch]
timeout_secs = {}
connect_timeout_secs = {}
max_retries = {}
backoff_base_ms = {}
backoff_max_ms = {}
concurrency = {}

[import]
fetch_attachments = {}
update_existing = {}
# default_author = "admin"

[remap]
upload_path_prefix = "{}"
media_objects = {}

# [remap.id_keys]
# hero_image = "attachment"

# [[bundles]]
# name = "demo"
# content = "demo/content.xml"
# widgets = "demo/widgets.wie"
# customizer = "demo/customizer.json"
# front_page_title = "Home"
# blog_page_title = "Blog"
#
# [bundles.menu_locations]
# primary = "main-menu"
#
# [[bundles.option_trees]]
# option_name = "theme_options"
# file = "demo/redux.json"
"#,
        config.fetch.timeout_secs,
        config.fetch.connect_timeout_secs,
        config.fetch.max_retries,
        config.fetch.backoff_base_ms,
        config.fetch.backoff_max_ms,
        config.fetch.concurrency,
        config.import.fetch_attachments,
        config.import.update_existing,
        config.remap.upload_path_prefix,
        config.remap.media_objects,
    );

    std::fs::create_dir_all(&path)
        .with_context(|| format!("Failed to create directory {}", path.display()))?;
    std::fs::write(&config_path, toml_content)?;
    println!("Created configuration file: {}", config_path.display());

    Ok(())
}
