//! Configuration file loading and the resolved run configuration.
//!
//! An optional TOML file supplies defaults for the organize options and the
//! file filtering rules. Command-line flags override the `[organize]` section;
//! command-line include/exclude globs are appended to the `[filters]` lists.
//!
//! # Configuration File Format
//!
//! ```toml
//! [organize]
//! by = "date"
//! date_field = "mtime"
//! date_granularity = "month"
//! copy = false
//! overwrite = false
//! max_depth = 2
//!
//! [filters]
//! enable_hidden_files = false
//!
//! [filters.exclude]
//! filenames = [".DS_Store", "Thumbs.db"]
//! patterns = ["*.tmp", "cache/**"]
//! extensions = ["bak", "tmp"]
//! regex = []
//!
//! [filters.include]
//! patterns = []
//! ```

use crate::classifier::{DateField, DateGranularity, GroupBy, Strategy};
use crate::filter::FileFilter;
use crate::planner::{ActionKind, PlanOptions};
use crate::scanner::ScanOptions;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// File name of the configuration file looked up in the working directory.
pub const LOCAL_CONFIG_FILE: &str = ".sortdirrc.toml";

/// File name of the manifest written into the organized root by default.
pub const MANIFEST_FILE_NAME: &str = ".sortdir_manifest.jsonl";

/// Folder created under the root when no destination is given.
pub const DEFAULT_DEST_DIR: &str = "organized";

/// Errors that can occur during configuration loading and compilation.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("configuration file not found: {}", .0.display())]
    ConfigNotFound(PathBuf),

    #[error("invalid configuration in {}: {reason}", path.display())]
    ConfigInvalid { path: PathBuf, reason: String },

    #[error("invalid glob pattern '{0}'")]
    InvalidGlobPattern(String),

    #[error("invalid regex pattern '{pattern}': {reason}")]
    InvalidRegexPattern { pattern: String, reason: String },

    #[error("failed to read configuration {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Contents of a configuration file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FileConfig {
    #[serde(default)]
    pub organize: OrganizeDefaults,

    #[serde(default)]
    pub filters: FilterRules,
}

/// Defaults for the organize options. Every field is optional.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OrganizeDefaults {
    pub by: Option<GroupBy>,
    pub date_field: Option<DateField>,
    pub date_granularity: Option<DateGranularity>,
    pub dest: Option<PathBuf>,
    pub copy: Option<bool>,
    pub overwrite: Option<bool>,
    pub max_depth: Option<usize>,
    pub manifest: Option<PathBuf>,
}

/// File filtering rules.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FilterRules {
    /// Whether to include hidden files and directories. Defaults to false.
    #[serde(default)]
    pub enable_hidden_files: bool,

    #[serde(default)]
    pub exclude: ExcludeRules,

    #[serde(default)]
    pub include: IncludeRules,
}

/// Rules for excluding files.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExcludeRules {
    /// Exact filenames to exclude (e.g., ".DS_Store", "Thumbs.db").
    #[serde(default)]
    pub filenames: Vec<String>,

    /// Glob patterns to exclude (e.g., "*.tmp", "node_modules/**").
    #[serde(default)]
    pub patterns: Vec<String>,

    /// File extensions to exclude, case-insensitive (e.g., "bak", "tmp").
    #[serde(default)]
    pub extensions: Vec<String>,

    /// Regex patterns matched against the file name.
    #[serde(default)]
    pub regex: Vec<String>,
}

/// Glob patterns a file must match (any of) to be organized.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IncludeRules {
    #[serde(default)]
    pub patterns: Vec<String>,
}

impl FileConfig {
    /// Load configuration, falling back to defaults.
    ///
    /// Lookup order:
    /// 1. `config_path`, if provided
    /// 2. `.sortdirrc.toml` in the current directory
    /// 3. `~/.config/sortdir/config.toml`
    /// 4. built-in defaults
    ///
    /// # Errors
    ///
    /// Returns an error if a configuration file is explicitly provided but
    /// cannot be read, or if any found file fails to parse.
    pub fn load(config_path: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = config_path {
            return Self::load_from_file(path);
        }

        let local_config = PathBuf::from(LOCAL_CONFIG_FILE);
        if local_config.exists() {
            return Self::load_from_file(&local_config);
        }

        if let Ok(home) = std::env::var("HOME") {
            let home_config = PathBuf::from(home)
                .join(".config")
                .join("sortdir")
                .join("config.toml");
            if home_config.exists() {
                return Self::load_from_file(&home_config);
            }
        }

        Ok(Self::default())
    }

    /// Load configuration from a specific file.
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::ConfigNotFound(path.to_path_buf()));
        }

        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        Self::parse(&content).map_err(|reason| ConfigError::ConfigInvalid {
            path: path.to_path_buf(),
            reason,
        })
    }

    /// Parse configuration from TOML text.
    pub fn parse(content: &str) -> Result<Self, String> {
        toml::from_str(content).map_err(|e| e.to_string())
    }
}

/// Fully resolved settings for one organize run.
#[derive(Debug, Clone)]
pub struct OrganizeConfig {
    /// Directory that is scanned.
    pub root: PathBuf,
    /// Base directory receiving the group folders.
    pub dest: PathBuf,
    pub strategy: Strategy,
    pub action: ActionKind,
    /// Replace existing files at a destination instead of renaming around them.
    pub allow_overwrite: bool,
    /// `None` scans without a depth limit; `Some(0)` only the root's own files.
    pub max_depth: Option<usize>,
    pub manifest_path: PathBuf,
    pub filters: FilterRules,
}

impl OrganizeConfig {
    /// Settings with every option at its default: group by extension, move,
    /// no overwrite, unlimited depth, manifest inside `root`.
    pub fn new(root: impl Into<PathBuf>, dest: impl Into<PathBuf>) -> Self {
        let root = root.into();
        Self {
            manifest_path: default_manifest_path(&root),
            dest: dest.into(),
            root,
            strategy: Strategy::Extension,
            action: ActionKind::Move,
            allow_overwrite: false,
            max_depth: None,
            filters: FilterRules::default(),
        }
    }

    /// Builds scanner options, compiling the filter rules.
    pub fn scan_options(&self) -> Result<ScanOptions, ConfigError> {
        Ok(ScanOptions {
            max_depth: self.max_depth,
            filter: FileFilter::new(&self.filters)?,
            excluded_paths: vec![self.dest.clone(), self.manifest_path.clone()],
            sniff_content: self.strategy.needs_content_sniffing(),
        })
    }

    pub fn plan_options(&self) -> PlanOptions {
        PlanOptions {
            dest_base: self.dest.clone(),
            strategy: self.strategy,
            action: self.action,
            allow_overwrite: self.allow_overwrite,
        }
    }
}

/// Default manifest location for a scan root.
pub fn default_manifest_path(root: &Path) -> PathBuf {
    root.join(MANIFEST_FILE_NAME)
}
