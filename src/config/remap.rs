//! Reference pattern configuration for the nested-value remapper
//!
//! ```toml
//! [remap]
//! upload_path_prefix = "/wp-content/uploads/"
//! media_objects = true
//!
//! [remap.id_keys]
//! attachment_id = "attachment"
//! page_on_front = "post"
//!
//! [remap.id_list_keys]
//! ids = "attachment"
//!
//! [remap.container_keys]
//! nav_menu_locations = "term"
//! ```

use crate::types::EntityKind;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Which value shapes are recognised as references
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RemapConfig {
    /// URL path segment under which attachment files live
    pub upload_path_prefix: String,
    /// Keys whose value is a single id (or a sequence of ids)
    pub id_keys: BTreeMap<String, EntityKind>,
    /// Keys whose value is a comma separated id list
    pub id_list_keys: BTreeMap<String, EntityKind>,
    /// Keys whose children are all ids, whatever their own keys
    pub container_keys: BTreeMap<String, EntityKind>,
    /// Treat `id` inside a mapping that also has `url` as an attachment id
    pub media_objects: bool,
}

impl Default for RemapConfig {
    fn default() -> Self {
        let id_keys = [
            ("attachment_id", EntityKind::Attachment),
            ("image_id", EntityKind::Attachment),
            ("thumbnail_id", EntityKind::Attachment),
            ("_thumbnail_id", EntityKind::Attachment),
            ("custom_logo", EntityKind::Attachment),
            ("site_icon", EntityKind::Attachment),
            ("background_image_id", EntityKind::Attachment),
            ("logo_id", EntityKind::Attachment),
            ("page_id", EntityKind::Post),
            ("post_id", EntityKind::Post),
            ("page_on_front", EntityKind::Post),
            ("page_for_posts", EntityKind::Post),
            ("nav_menu", EntityKind::Term),
            ("menu_id", EntityKind::Term),
            ("term_id", EntityKind::Term),
        ];
        let id_list_keys = [
            ("ids", EntityKind::Attachment),
            ("include", EntityKind::Post),
            ("exclude", EntityKind::Post),
        ];
        let container_keys = [("nav_menu_locations", EntityKind::Term)];

        Self {
            upload_path_prefix: "/wp-content/uploads/".to_string(),
            id_keys: to_map(&id_keys),
            id_list_keys: to_map(&id_list_keys),
            container_keys: to_map(&container_keys),
            media_objects: true,
        }
    }
}

fn to_map(pairs: &[(&str, EntityKind)]) -> BTreeMap<String, EntityKind> {
    pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config: RemapConfig = toml::from_str(
            r#"
            upload_path_prefix = "/media/"
            [id_keys]
            hero_image = "attachment"
            "#,
        )
        .unwrap();

        assert_eq!(config.upload_path_prefix, "/media/");
        assert_eq!(config.id_keys.get("hero_image"), Some(&EntityKind::Attachment));
        // A provided table replaces the default table
        assert!(!config.id_keys.contains_key("attachment_id"));
        assert!(config.container_keys.contains_key("nav_menu_locations"));
        assert!(config.media_objects);
    }
}
