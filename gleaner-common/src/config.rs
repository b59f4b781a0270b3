//! Configuration loading and root folder resolution
//!
//! Root folder priority order:
//! 1. Command-line argument (highest priority)
//! 2. Environment variable (`GLEANER_ROOT_FOLDER`)
//! 3. TOML config file (`root_folder` key)
//! 4. OS-dependent compiled default (fallback)
//!
//! A missing or unreadable TOML file never stops startup: a warning is logged
//! and compiled defaults are used instead.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Environment variable overriding the root folder
pub const ROOT_FOLDER_ENV: &str = "GLEANER_ROOT_FOLDER";

/// Environment variable overriding the TOML config file location
pub const CONFIG_FILE_ENV: &str = "GLEANER_CONFIG";

/// Database file name inside the root folder
pub const DATABASE_FILE: &str = "gleaner.db";

/// Image store directory inside the root folder
pub const IMAGE_DIR: &str = "images";

/// Thumbnail directory inside the image store
pub const THUMBNAIL_DIR: &str = "thumbnails";

/// Logging section of the TOML config
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoggingConfig {
    /// tracing filter directive used when `RUST_LOG` is unset
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Optional log file path, in addition to stderr
    #[serde(default)]
    pub file: Option<PathBuf>,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: None,
        }
    }
}

/// Credentials section of the TOML config (lowest-priority source)
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct CredentialsConfig {
    pub username: Option<String>,
    pub password: Option<String>,
}

/// Top-level TOML configuration file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TomlConfig {
    #[serde(default)]
    pub root_folder: Option<PathBuf>,
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Raw `[acquisition]` table, interpreted by the acquisition crate
    #[serde(default)]
    pub acquisition: Option<toml::Value>,
    #[serde(default)]
    pub credentials: Option<CredentialsConfig>,
}

/// Get the TOML config file path
///
/// `GLEANER_CONFIG` wins; otherwise `<config_dir>/gleaner/config.toml`.
pub fn config_file_path() -> Option<PathBuf> {
    if let Ok(path) = std::env::var(CONFIG_FILE_ENV) {
        if !path.trim().is_empty() {
            return Some(PathBuf::from(path));
        }
    }
    dirs::config_dir().map(|d| d.join("gleaner").join("config.toml"))
}

/// Load TOML config from `path`
///
/// Missing file → defaults (debug log). Unparseable file → defaults (warning).
pub fn load_toml_config(path: &Path) -> TomlConfig {
    if !path.exists() {
        debug!(path = %path.display(), "Config file not found, using defaults");
        return TomlConfig::default();
    }

    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Failed to read config file, using defaults");
            return TomlConfig::default();
        }
    };

    match toml::from_str::<TomlConfig>(&content) {
        Ok(config) => {
            info!(path = %path.display(), "Loaded config file");
            config
        }
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Failed to parse config file, using defaults");
            TomlConfig::default()
        }
    }
}

/// Write TOML config atomically (temp file + rename)
pub fn write_toml_config(config: &TomlConfig, path: &Path) -> Result<()> {
    let content = toml::to_string_pretty(config)
        .map_err(|e| Error::Config(format!("Serialize TOML failed: {}", e)))?;

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let tmp_path = path.with_extension("toml.tmp");
    std::fs::write(&tmp_path, content)?;
    std::fs::rename(&tmp_path, path)?;

    debug!(path = %path.display(), "Config file written");
    Ok(())
}

/// Get OS-dependent default root folder path
fn default_root_folder() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("gleaner"))
        .unwrap_or_else(|| PathBuf::from("./gleaner_data"))
}

/// Resolves the root folder following the priority order in the module docs
pub struct RootFolderResolver {
    cli_arg: Option<PathBuf>,
    toml: TomlConfig,
}

impl RootFolderResolver {
    pub fn new(cli_arg: Option<PathBuf>, toml: TomlConfig) -> Self {
        Self { cli_arg, toml }
    }

    /// Resolve the root folder path (never fails; falls back to the compiled default)
    pub fn resolve(&self) -> PathBuf {
        if let Some(path) = &self.cli_arg {
            info!(path = %path.display(), "Root folder from command line");
            return path.clone();
        }

        if let Ok(path) = std::env::var(ROOT_FOLDER_ENV) {
            if !path.trim().is_empty() {
                info!(path = %path, "Root folder from {}", ROOT_FOLDER_ENV);
                return PathBuf::from(path);
            }
        }

        if let Some(path) = &self.toml.root_folder {
            info!(path = %path.display(), "Root folder from config file");
            return path.clone();
        }

        let path = default_root_folder();
        info!(path = %path.display(), "Root folder from compiled default");
        path
    }
}

/// Creates the root folder layout and hands out well-known paths
pub struct RootFolderInitializer {
    root_folder: PathBuf,
}

impl RootFolderInitializer {
    pub fn new(root_folder: PathBuf) -> Self {
        Self { root_folder }
    }

    /// Create root, image and thumbnail directories if missing
    pub fn ensure_directory_exists(&self) -> Result<()> {
        let thumbnails = self.thumbnail_dir();
        if !thumbnails.exists() {
            info!(path = %self.root_folder.display(), "Creating root folder layout");
        }
        std::fs::create_dir_all(&thumbnails)?;
        Ok(())
    }

    pub fn root_folder(&self) -> &Path {
        &self.root_folder
    }

    pub fn database_path(&self) -> PathBuf {
        self.root_folder.join(DATABASE_FILE)
    }

    pub fn image_dir(&self) -> PathBuf {
        self.root_folder.join(IMAGE_DIR)
    }

    pub fn thumbnail_dir(&self) -> PathBuf {
        self.image_dir().join(THUMBNAIL_DIR)
    }
}
