//! Configuration loading and root folder resolution
//!
//! Bootstrap configuration comes from a TOML file; every field is optional
//! and a missing file is not an error (warning + compiled defaults).
//!
//! # Root folder priority
//!
//! 1. Command-line argument (highest priority)
//! 2. `MCAT_ROOT_FOLDER` environment variable
//! 3. `root_folder` in the TOML config file
//! 4. OS-dependent compiled default (fallback)

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Environment variable overriding the root folder
pub const ROOT_FOLDER_ENV: &str = "MCAT_ROOT_FOLDER";
/// Environment variable overriding the config file location
pub const CONFIG_PATH_ENV: &str = "MCAT_CONFIG";
/// Environment variable overriding the analysis endpoint
pub const ANALYSIS_ENDPOINT_ENV: &str = "MCAT_ANALYSIS_ENDPOINT";

/// Bootstrap configuration loaded from TOML file
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TomlConfig {
    /// Root folder for the database and staged files
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub root_folder: Option<PathBuf>,

    /// Staging cache directory (defaults to `<root>/cache`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_dir: Option<PathBuf>,

    /// SQLite database file (defaults to `<root>/mcat.db`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database_path: Option<PathBuf>,

    /// Analysis service settings
    #[serde(default)]
    pub analysis: AnalysisConfig,

    /// Usage quota settings
    #[serde(default)]
    pub quota: QuotaConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Analysis service configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisConfig {
    /// Batch analysis endpoint URL; analysis is unavailable when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,

    /// Request timeout in seconds
    #[serde(default = "default_analysis_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            timeout_secs: default_analysis_timeout_secs(),
        }
    }
}

/// Quota configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuotaConfig {
    /// Tier name ("free", "pro", "unlimited")
    #[serde(default = "default_tier")]
    pub tier: String,

    /// Explicit monthly cap; overrides the tier default when set
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub monthly_cap: Option<u64>,
}

impl Default for QuotaConfig {
    fn default() -> Self {
        Self {
            tier: default_tier(),
            monthly_cap: None,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log file path (optional, logs to stderr if not specified)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: None,
        }
    }
}

fn default_analysis_timeout_secs() -> u64 {
    600
}

fn default_tier() -> String {
    "free".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

impl TomlConfig {
    /// Load configuration from the default location
    ///
    /// Missing or unreadable files fall back to defaults with a warning;
    /// environment overrides are applied afterwards.
    pub fn load_or_default() -> Self {
        let mut config = match config_file_path() {
            Some(path) if path.exists() => match load_toml_config(&path) {
                Ok(config) => {
                    info!("Loaded configuration from {}", path.display());
                    config
                }
                Err(e) => {
                    warn!("Ignoring unreadable config {}: {}", path.display(), e);
                    TomlConfig::default()
                }
            },
            Some(path) => {
                warn!(
                    "Config file not found at {}, using compiled defaults",
                    path.display()
                );
                TomlConfig::default()
            }
            None => {
                warn!("Could not determine config directory, using compiled defaults");
                TomlConfig::default()
            }
        };
        config.apply_env_overrides();
        config
    }

    /// Apply environment variable overrides
    pub fn apply_env_overrides(&mut self) {
        if let Ok(endpoint) = std::env::var(ANALYSIS_ENDPOINT_ENV) {
            if !endpoint.trim().is_empty() {
                debug!("Analysis endpoint overridden from {}", ANALYSIS_ENDPOINT_ENV);
                self.analysis.endpoint = Some(endpoint);
            }
        }
    }
}

/// Default configuration file path for the platform
///
/// `MCAT_CONFIG` wins; otherwise `<config_dir>/mcat/config.toml`.
pub fn config_file_path() -> Option<PathBuf> {
    if let Ok(path) = std::env::var(CONFIG_PATH_ENV) {
        return Some(PathBuf::from(path));
    }
    dirs::config_dir().map(|d| d.join("mcat").join("config.toml"))
}

/// Parse a TOML config file
pub fn load_toml_config(path: &Path) -> Result<TomlConfig> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("Read TOML failed: {}", e)))?;
    toml::from_str(&content).map_err(|e| Error::Config(format!("Parse TOML failed: {}", e)))
}

/// OS-dependent compiled defaults
#[derive(Debug, Clone)]
pub struct CompiledDefaults {
    pub root_folder: PathBuf,
    pub log_level: String,
    pub log_file: Option<PathBuf>,
}

impl CompiledDefaults {
    /// Defaults for the platform this binary was compiled for
    pub fn for_current_platform() -> Self {
        let root_folder = if cfg!(target_os = "linux") {
            // ~/.local/share/mcat
            dirs::data_local_dir()
                .map(|d| d.join("mcat"))
                .unwrap_or_else(|| PathBuf::from("/var/lib/mcat"))
        } else if cfg!(target_os = "macos") {
            // ~/Library/Application Support/mcat
            dirs::data_dir()
                .map(|d| d.join("mcat"))
                .unwrap_or_else(|| PathBuf::from("/Library/Application Support/mcat"))
        } else if cfg!(target_os = "windows") {
            // %LOCALAPPDATA%\mcat
            dirs::data_local_dir()
                .map(|d| d.join("mcat"))
                .unwrap_or_else(|| PathBuf::from("C:\\ProgramData\\mcat"))
        } else {
            PathBuf::from("./mcat_data")
        };

        Self {
            root_folder,
            log_level: default_log_level(),
            log_file: None,
        }
    }
}

/// Resolves the root folder from CLI, environment, TOML and defaults
#[derive(Debug, Clone, Default)]
pub struct RootFolderResolver {
    cli_arg: Option<PathBuf>,
    toml_root: Option<PathBuf>,
}

impl RootFolderResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Root folder given on the command line
    pub fn with_cli_arg(mut self, path: Option<PathBuf>) -> Self {
        self.cli_arg = path;
        self
    }

    /// Root folder from the loaded TOML config
    pub fn with_toml(mut self, config: &TomlConfig) -> Self {
        self.toml_root = config.root_folder.clone();
        self
    }

    /// Resolve following the documented priority order
    pub fn resolve(&self) -> PathBuf {
        if let Some(path) = &self.cli_arg {
            debug!("Root folder from command line: {}", path.display());
            return path.clone();
        }

        if let Ok(path) = std::env::var(ROOT_FOLDER_ENV) {
            if !path.trim().is_empty() {
                debug!("Root folder from {}: {}", ROOT_FOLDER_ENV, path);
                return PathBuf::from(path);
            }
        }

        if let Some(path) = &self.toml_root {
            debug!("Root folder from TOML: {}", path.display());
            return path.clone();
        }

        CompiledDefaults::for_current_platform().root_folder
    }
}

/// Creates the root folder and derives well-known paths inside it
#[derive(Debug, Clone)]
pub struct RootFolderInitializer {
    root: PathBuf,
}

impl RootFolderInitializer {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Create the root folder if missing (idempotent)
    pub fn ensure_directory_exists(&self) -> Result<()> {
        if !self.root.exists() {
            info!("Creating root folder: {}", self.root.display());
        }
        std::fs::create_dir_all(&self.root)?;
        Ok(())
    }

    /// Database path inside the root folder
    pub fn database_path(&self) -> PathBuf {
        self.root.join("mcat.db")
    }

    /// Staging cache directory inside the root folder
    pub fn cache_dir(&self) -> PathBuf {
        self.root.join("cache")
    }
}
