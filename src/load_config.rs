/// `load_config` module: loads the service configuration from a YAML file.
///
/// The service configuration says where to listen and where the runtime state lives.
/// User-facing settings (library URL, token, tag rules) are not part of it; they are
/// kept in the JSON settings file managed by [`crate::settings::SettingsStore`].
///
/// # Errors
/// All errors in this module use `anyhow::Error` and are surfaced at the CLI boundary.
use anyhow::Result;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{error, info};

use crate::settings::SettingsStore;
use crate::server::AppState;

pub const DEFAULT_BIND: &str = "127.0.0.1:8189";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Socket address for the HTTP service.
    pub bind: String,
    /// JSON settings file.
    pub settings_file: PathBuf,
    /// Directory scanned for tag CSV files.
    pub csv_dir: PathBuf,
}

impl Default for AppConfig {
    fn default() -> Self {
        AppConfig {
            bind: DEFAULT_BIND.to_string(),
            settings_file: PathBuf::from("settings.json"),
            csv_dir: PathBuf::from("__csv__"),
        }
    }
}

impl AppConfig {
    pub fn app_state(&self) -> AppState {
        AppState::new(SettingsStore::new(&self.settings_file), &self.csv_dir)
    }

    pub fn trace_loaded(&self) {
        info!(
            bind = %self.bind,
            settings_file = %self.settings_file.display(),
            csv_dir = %self.csv_dir.display(),
            "Loaded AppConfig"
        );
    }
}

/// Loads a YAML config file. Keys missing from the file take their defaults.
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<AppConfig> {
    let path_ref = path.as_ref();
    info!(config_path = ?path_ref, "Loading configuration from file");

    let config_content = match fs::read_to_string(path_ref) {
        Ok(content) => content,
        Err(e) => {
            error!(error = ?e, config_path = ?path_ref, "Failed to read config file");
            return Err(anyhow::anyhow!(
                "Failed to read config file {:?}: {}",
                path_ref,
                e
            ));
        }
    };

    let config: AppConfig = if config_content.trim().is_empty() {
        AppConfig::default()
    } else {
        match serde_yaml::from_str(&config_content) {
            Ok(conf) => conf,
            Err(e) => {
                error!(error = ?e, config_path = ?path_ref, "Failed to parse config YAML");
                return Err(anyhow::anyhow!("Failed to parse config YAML: {e}"));
            }
        }
    };

    config.trace_loaded();
    Ok(config)
}

/// Loads `path` when given, otherwise returns the defaults.
pub fn load_or_default(path: Option<&Path>) -> Result<AppConfig> {
    match path {
        Some(path) => load_config(path),
        None => {
            let config = AppConfig::default();
            config.trace_loaded();
            Ok(config)
        }
    }
}
