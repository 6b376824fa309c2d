//! Persistent user settings, stored as a flat JSON object.
//!
//! Loading never fails: a missing or corrupt file yields the defaults, and any key
//! absent from the file is filled in from the defaults. Saving merges into whatever
//! is currently on disk so that updating one key never drops the others.
//! Concurrent writers race; the last write wins.

use std::path::{Path, PathBuf};

use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use crate::metadata::{AnnotationStyle, TagStyle};
use crate::tag_filter::AliasMode;

pub const HOST_URL: &str = "eagle.autosend.hostUrl";
pub const TOKEN: &str = "eagle.autosend.token";
pub const ENABLE: &str = "eagle.autosend.enable";
pub const FOLDER_NAME: &str = "eagle.autosend.folderName";
pub const ANNOTATION: &str = "eagle.autosend.annotation";
pub const TAGS: &str = "eagle.autosend.tags";
pub const TAGS_CSV: &str = "eagle.autosend.tagsCsv";
pub const TAGS_ALIAS: &str = "eagle.autosend.tagsAlias";

pub const DEFAULT_HOST_URL: &str = "http://localhost:41595";

/// A snapshot of the settings mapping.
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    values: Map<String, Value>,
}

impl Default for Settings {
    fn default() -> Self {
        let mut values = Map::new();
        values.insert(HOST_URL.into(), Value::from(DEFAULT_HOST_URL));
        values.insert(TOKEN.into(), Value::from(""));
        values.insert(ENABLE.into(), Value::from(true));
        values.insert(FOLDER_NAME.into(), Value::from(""));
        values.insert(ANNOTATION.into(), Value::from("Parameters"));
        values.insert(TAGS.into(), Value::from("Positive"));
        values.insert(TAGS_CSV.into(), Value::from(""));
        values.insert(TAGS_ALIAS.into(), Value::from("Use main"));
        Settings { values }
    }
}

impl Settings {
    /// Wraps a stored object, filling in defaults for missing keys.
    pub fn from_map(mut values: Map<String, Value>) -> Self {
        for (key, value) in Settings::default().values {
            values.entry(key).or_insert(value);
        }
        Settings { values }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    pub fn set(&mut self, key: impl Into<String>, value: Value) {
        self.values.insert(key.into(), value);
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.values
    }

    pub fn into_map(self) -> Map<String, Value> {
        self.values
    }

    fn str_value(&self, key: &str) -> Option<&str> {
        self.values.get(key).and_then(Value::as_str)
    }

    /// Non-empty string setting, if any.
    fn non_empty(&self, key: &str) -> Option<&str> {
        self.str_value(key).filter(|s| !s.is_empty())
    }

    pub fn host_url(&self) -> &str {
        self.non_empty(HOST_URL).unwrap_or(DEFAULT_HOST_URL)
    }

    pub fn token(&self) -> Option<&str> {
        self.non_empty(TOKEN)
    }

    pub fn enabled(&self) -> bool {
        self.values.get(ENABLE).and_then(Value::as_bool).unwrap_or(true)
    }

    pub fn folder_name(&self) -> Option<&str> {
        self.non_empty(FOLDER_NAME)
    }

    pub fn annotation_style(&self) -> AnnotationStyle {
        AnnotationStyle::from(self.str_value(ANNOTATION).unwrap_or("Parameters"))
    }

    pub fn tag_style(&self) -> TagStyle {
        TagStyle::from(self.str_value(TAGS).unwrap_or("Positive"))
    }

    pub fn tags_csv(&self) -> Option<&str> {
        self.non_empty(TAGS_CSV)
    }

    pub fn alias_mode(&self) -> AliasMode {
        AliasMode::from(self.str_value(TAGS_ALIAS).unwrap_or("Use main"))
    }
}

/// File-backed settings store.
#[derive(Debug, Clone)]
pub struct SettingsStore {
    path: PathBuf,
}

impl SettingsStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        SettingsStore { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> Settings {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) => {
                debug!(error = ?e, path = %self.path.display(), "Settings file not readable, using defaults");
                return Settings::default();
            }
        };
        match serde_json::from_str::<Value>(&content) {
            Ok(Value::Object(map)) => Settings::from_map(map),
            Ok(_) => {
                warn!(path = %self.path.display(), "Settings file is not a JSON object, using defaults");
                Settings::default()
            }
            Err(e) => {
                warn!(error = %e, path = %self.path.display(), "Settings file is not valid JSON, using defaults");
                Settings::default()
            }
        }
    }

    /// Merges `settings` over the stored content and writes it back.
    pub fn save(&self, settings: &Settings) -> std::io::Result<()> {
        let mut merged = self.load().into_map();
        for (key, value) in settings.as_map() {
            merged.insert(key.clone(), value.clone());
        }
        let mut out = Vec::new();
        let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
        let mut serializer = serde_json::Serializer::with_formatter(&mut out, formatter);
        serde::Serialize::serialize(&merged, &mut serializer)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&self.path, out)?;
        info!(path = %self.path.display(), keys = merged.len(), "Saved settings");
        Ok(())
    }

    /// Updates a single key.
    pub fn set(&self, key: &str, value: Value) -> std::io::Result<()> {
        let mut settings = self.load();
        settings.set(key, value);
        self.save(&settings)
    }
}
