//! Configuration loading and root folder resolution
//!
//! Root folder priority order:
//! 1. Command-line argument (highest priority)
//! 2. `ROWKEEP_ROOT_FOLDER`, then `ROWKEEP_ROOT` environment variables
//! 3. TOML config file (`~/.config/rowkeep/<module>.toml`, then `/etc/rowkeep/<module>.toml`)
//! 4. OS-dependent compiled default (fallback)
//!
//! A missing or unparseable TOML file never aborts startup: a warning is logged
//! and the compiled defaults are used.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Database file name inside the root folder
pub const DATABASE_FILE_NAME: &str = "rowkeep.db";

/// Object-store directory inside the root folder
pub const MEDIA_DIR_NAME: &str = "media";

/// Bootstrap configuration loaded from TOML
///
/// Runtime settings live in the database `settings` table; this file only
/// carries what is needed before the database is open.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TomlConfig {
    /// Root folder holding the database and media store
    #[serde(default)]
    pub root_folder: Option<PathBuf>,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Object-store root, defaults to `<root>/media`
    #[serde(default)]
    pub media_root: Option<PathBuf>,

    /// Bucket used for edit-request media
    #[serde(default)]
    pub media_bucket: Option<String>,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log file path (logs to stderr if not specified)
    #[serde(default)]
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

fn default_log_level() -> String {
    "info".to_string()
}

/// Compiled defaults used when nothing else is configured
#[derive(Debug, Clone)]
pub struct CompiledDefaults {
    pub root_folder: PathBuf,
    pub log_level: String,
    pub log_file: Option<PathBuf>,
}

impl CompiledDefaults {
    pub fn for_current_platform() -> Self {
        Self {
            root_folder: default_root_folder(),
            log_level: default_log_level(),
            log_file: None,
        }
    }
}

/// Get OS-dependent default root folder path
fn default_root_folder() -> PathBuf {
    if cfg!(target_os = "linux") {
        // ~/.local/share/rowkeep (or /var/lib/rowkeep for system-wide)
        dirs::data_local_dir()
            .map(|d| d.join("rowkeep"))
            .unwrap_or_else(|| PathBuf::from("/var/lib/rowkeep"))
    } else if cfg!(target_os = "macos") {
        dirs::data_dir()
            .map(|d| d.join("rowkeep"))
            .unwrap_or_else(|| PathBuf::from("/Library/Application Support/rowkeep"))
    } else if cfg!(target_os = "windows") {
        dirs::data_local_dir()
            .map(|d| d.join("rowkeep"))
            .unwrap_or_else(|| PathBuf::from("C:\\ProgramData\\rowkeep"))
    } else {
        PathBuf::from("./rowkeep_data")
    }
}

/// Candidate TOML paths for a module, most specific first
pub fn config_file_candidates(module_name: &str) -> Vec<PathBuf> {
    let file_name = format!("{}.toml", module_name);
    let mut candidates = Vec::new();
    if let Some(dir) = dirs::config_dir() {
        candidates.push(dir.join("rowkeep").join(&file_name));
    }
    if cfg!(unix) {
        candidates.push(PathBuf::from("/etc/rowkeep").join(&file_name));
    }
    candidates
}

/// Load a TOML config file
pub fn load_toml_config(path: &Path) -> Result<TomlConfig> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("Read {} failed: {}", path.display(), e)))?;
    toml::from_str(&content)
        .map_err(|e| Error::Config(format!("Parse {} failed: {}", path.display(), e)))
}

/// Resolves the root folder and bootstrap configuration for one module
pub struct RootFolderResolver {
    module_name: String,
    cli_override: Option<PathBuf>,
}

impl RootFolderResolver {
    pub fn new(module_name: &str) -> Self {
        Self {
            module_name: module_name.to_string(),
            cli_override: None,
        }
    }

    /// Highest-priority override, normally from `--root-folder`
    pub fn with_cli_override(mut self, path: Option<PathBuf>) -> Self {
        self.cli_override = path;
        self
    }

    /// Load the module's TOML config, falling back to defaults
    pub fn load_toml(&self) -> TomlConfig {
        for candidate in config_file_candidates(&self.module_name) {
            if !candidate.exists() {
                continue;
            }
            match load_toml_config(&candidate) {
                Ok(config) => {
                    debug!("Loaded config file {}", candidate.display());
                    return config;
                }
                Err(e) => {
                    warn!("Ignoring config file: {}", e);
                }
            }
        }
        TomlConfig::default()
    }

    /// Resolve the root folder following the priority order
    pub fn resolve(&self) -> PathBuf {
        if let Some(path) = &self.cli_override {
            return path.clone();
        }

        if let Ok(path) = std::env::var("ROWKEEP_ROOT_FOLDER") {
            if !path.is_empty() {
                return PathBuf::from(path);
            }
        }
        if let Ok(path) = std::env::var("ROWKEEP_ROOT") {
            if !path.is_empty() {
                return PathBuf::from(path);
            }
        }

        if let Some(path) = self.load_toml().root_folder {
            return path;
        }

        CompiledDefaults::for_current_platform().root_folder
    }
}

/// Creates the root folder layout
pub struct RootFolderInitializer {
    root_folder: PathBuf,
}

impl RootFolderInitializer {
    pub fn new(root_folder: PathBuf) -> Self {
        Self { root_folder }
    }

    pub fn root_folder(&self) -> &Path {
        &self.root_folder
    }

    pub fn database_path(&self) -> PathBuf {
        self.root_folder.join(DATABASE_FILE_NAME)
    }

    pub fn media_path(&self) -> PathBuf {
        self.root_folder.join(MEDIA_DIR_NAME)
    }

    pub fn database_exists(&self) -> bool {
        self.database_path().exists()
    }

    /// Create the root and media directories (idempotent)
    pub fn ensure_directory_exists(&self) -> Result<()> {
        std::fs::create_dir_all(&self.root_folder)?;
        std::fs::create_dir_all(self.media_path())?;
        Ok(())
    }
}
