//! On-disk JSON configuration with defaults merged at load.
//!
//! `config.json` lives next to the database in the data directory. Loading
//! deserializes the file into the same shape as [`Config::default`] and then
//! overlays only the keys present on disk, so a catalog created with an older
//! config file still picks up new defaults without a migration step. If any
//! default was not present on disk, the merged result is written back.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TagConfig {
    pub min_length: usize,
    pub max_length: usize,
    pub valid_chars: String,
}

impl Default for TagConfig {
    fn default() -> Self {
        TagConfig {
            min_length: 1,
            max_length: 32,
            valid_chars: "abcdefghijklmnopqrstuvwxyz0123456789_()".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UserConfig {
    pub min_username_length: usize,
    pub max_username_length: usize,
    pub min_password_length: usize,
    pub valid_chars: String,
}

impl Default for UserConfig {
    fn default() -> Self {
        UserConfig {
            min_username_length: 2,
            max_username_length: 24,
            min_password_length: 6,
            valid_chars:
                "abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789~!@#$%^*()[]{}:;,.<>/\\-_+="
                    .to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CacheSizeConfig {
    pub album: usize,
    pub bookmark: usize,
    pub photo: usize,
    pub tag: usize,
    pub user: usize,
}

impl Default for CacheSizeConfig {
    fn default() -> Self {
        CacheSizeConfig {
            album: 1000,
            bookmark: 100,
            photo: 100_000,
            tag: 1000,
            user: 200,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EnableFeatureConfig {
    #[serde(flatten)]
    pub flags: HashMap<String, bool>,
}

impl Default for EnableFeatureConfig {
    fn default() -> Self {
        let mut flags = HashMap::new();
        for key in [
            "album.edit",
            "album.new",
            "bookmark.edit",
            "bookmark.new",
            "photo.add_remove_tag",
            "photo.new",
            "photo.edit",
            "photo.generate_thumbnail",
            "photo.reload_metadata",
            "tag.edit",
            "tag.new",
            "user.login",
            "user.new",
        ] {
            flags.insert(key.to_string(), true);
        }
        EnableFeatureConfig { flags }
    }
}

impl EnableFeatureConfig {
    pub fn is_enabled(&self, key: &str) -> bool {
        self.flags.get(key).copied().unwrap_or(true)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub log_level: String,
    #[serde(default)]
    pub cache_size: CacheSizeConfig,
    #[serde(default)]
    pub enable_feature: EnableFeatureConfig,
    #[serde(default)]
    pub tag: TagConfig,
    #[serde(default)]
    pub user: UserConfig,
    #[serde(default)]
    pub digest_exclude_files: Vec<String>,
    #[serde(default)]
    pub digest_exclude_dirs: Vec<String>,
    #[serde(default)]
    pub file_read_chunk: usize,
    #[serde(default)]
    pub id_length: usize,
    #[serde(default)]
    pub thumbnail_width: u32,
    #[serde(default)]
    pub thumbnail_height: u32,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            log_level: "info".to_string(),
            cache_size: CacheSizeConfig::default(),
            enable_feature: EnableFeatureConfig::default(),
            tag: TagConfig::default(),
            user: UserConfig::default(),
            digest_exclude_files: vec![
                "phototagger.db".to_string(),
                "desktop.ini".to_string(),
                "thumbs.db".to_string(),
            ],
            digest_exclude_dirs: vec!["_site_thumbnails".to_string()],
            file_read_chunk: 1 << 20,
            id_length: 12,
            thumbnail_width: 400,
            thumbnail_height: 400,
        }
    }
}

impl Config {
    /// Loads `config.json` from `dir`, merging file contents over the
    /// defaults. Writes the merged result back if the file was missing or
    /// did not already contain every default key.
    pub fn load(dir: &Path) -> std::io::Result<Self> {
        let path = dir.join("config.json");
        let on_disk = match std::fs::read_to_string(&path) {
            Ok(text) => serde_json::from_str::<serde_json::Value>(&text).unwrap_or_default(),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => serde_json::Value::Null,
            Err(e) => return Err(e),
        };

        let default_value = serde_json::to_value(Config::default()).expect("config is json");
        let merged_value = merge_json(default_value.clone(), on_disk.clone());
        let config: Config = serde_json::from_value(merged_value.clone())
            .unwrap_or_else(|_| Config::default());

        if merged_value != on_disk {
            let pretty = serde_json::to_string_pretty(&merged_value).expect("config is json");
            std::fs::write(&path, pretty)?;
        }

        Ok(config)
    }

    pub fn required_feature(&self, key: &str) -> crate::error::Result<()> {
        if self.enable_feature.is_enabled(key) {
            Ok(())
        } else {
            Err(crate::error::CatalogError::FeatureDisabled(key.to_string()))
        }
    }
}

fn merge_json(base: serde_json::Value, overlay: serde_json::Value) -> serde_json::Value {
    match (base, overlay) {
        (serde_json::Value::Object(mut base_map), serde_json::Value::Object(overlay_map)) => {
            for (key, overlay_value) in overlay_map {
                let merged = match base_map.remove(&key) {
                    Some(base_value) => merge_json(base_value, overlay_value),
                    None => overlay_value,
                };
                base_map.insert(key, merged);
            }
            serde_json::Value::Object(base_map)
        }
        (_, overlay) if !overlay.is_null() => overlay,
        (base, _) => base,
    }
}
