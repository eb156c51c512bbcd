//! Organize settings and file filtering configuration.
//!
//! Configuration is loaded from a TOML file and controls which extensions are
//! planned, which of them carry embedded capture metadata, the name of the
//! per-bucket backup folder, and which scanned files are filtered out before
//! planning.
//!
//! # Configuration File Format
//!
//! ```toml
//! [organize]
//! extensions = ["mp4", "mov", "jpeg", "jpg", "png", "gif"]
//! metadata_extensions = ["jpeg", "jpg"]
//! backup_dir = "bk"
//! prune_empty_dirs = false
//!
//! [filters]
//! enable_hidden_files = false
//!
//! [filters.exclude]
//! filenames = ["Thumbs.db"]
//! patterns = ["**/@eaDir/**"]
//! extensions = []
//! regex = []
//!
//! [filters.include]
//! patterns = []
//! ```

use glob::Pattern;
use log::debug;
use regex::Regex;
use serde::Deserialize;
use std::collections::HashSet;
use std::fs;
use std::path::{Component, Path, PathBuf};

/// Extensions planned when the configuration does not override them.
pub const DEFAULT_EXTENSIONS: [&str; 6] = ["mp4", "mov", "jpeg", "jpg", "png", "gif"];

/// Extensions whose embedded metadata is consulted for a capture time.
pub const DEFAULT_METADATA_EXTENSIONS: [&str; 2] = ["jpeg", "jpg"];

/// Folder, inside each year-month directory, that receives colliding duplicates.
pub const DEFAULT_BACKUP_DIR: &str = "bk";

/// Errors that can occur during configuration loading and compilation.
#[derive(Debug, Clone)]
pub enum ConfigError {
    /// Configuration file not found at the specified path.
    ConfigNotFound(PathBuf),
    /// Invalid TOML syntax or structure.
    ConfigInvalid(String),
    /// Invalid glob pattern provided.
    InvalidGlobPattern(String),
    /// Invalid regex pattern provided with the actual error reason.
    InvalidRegexPattern {
        /// The regex pattern that failed to compile.
        pattern: String,
        /// The reason why the pattern is invalid.
        reason: String,
    },
    /// The backup folder name is not a single plain path component.
    InvalidBackupDir(String),
    /// IO error while reading configuration.
    IoError(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::ConfigNotFound(path) => {
                write!(f, "Configuration file not found: {}", path.display())
            }
            ConfigError::ConfigInvalid(msg) => write!(f, "Invalid configuration: {}", msg),
            ConfigError::InvalidGlobPattern(pattern) => {
                write!(
                    f,
                    "Invalid glob pattern '{}': expected *.ext or dir/**",
                    pattern
                )
            }
            ConfigError::InvalidRegexPattern { pattern, reason } => {
                write!(f, "Invalid regex pattern '{}': {}", pattern, reason)
            }
            ConfigError::InvalidBackupDir(name) => {
                write!(
                    f,
                    "Invalid backup_dir '{}': expected a single folder name",
                    name
                )
            }
            ConfigError::IoError(msg) => write!(f, "IO error reading configuration: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {}

/// Top-level configuration, deserialized from TOML.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub organize: OrganizeRules,
    #[serde(default)]
    pub filters: FilterRules,
}

/// Rules that shape the plan itself.
#[derive(Debug, Clone, Deserialize)]
pub struct OrganizeRules {
    /// Extensions that are planned and moved. Everything else is reported and left alone.
    #[serde(default = "default_extensions")]
    pub extensions: Vec<String>,

    /// Extensions whose embedded metadata is read before falling back to mtime.
    #[serde(default = "default_metadata_extensions")]
    pub metadata_extensions: Vec<String>,

    /// Name of the per-bucket backup folder.
    #[serde(default = "default_backup_dir")]
    pub backup_dir: String,

    /// Remove directories left empty by an executed plan.
    #[serde(default)]
    pub prune_empty_dirs: bool,
}

fn default_extensions() -> Vec<String> {
    DEFAULT_EXTENSIONS.iter().map(|ext| ext.to_string()).collect()
}

fn default_metadata_extensions() -> Vec<String> {
    DEFAULT_METADATA_EXTENSIONS
        .iter()
        .map(|ext| ext.to_string())
        .collect()
}

fn default_backup_dir() -> String {
    DEFAULT_BACKUP_DIR.to_string()
}

impl Default for OrganizeRules {
    fn default() -> Self {
        Self {
            extensions: default_extensions(),
            metadata_extensions: default_metadata_extensions(),
            backup_dir: default_backup_dir(),
            prune_empty_dirs: false,
        }
    }
}

/// Root-level filter rules configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FilterRules {
    /// Whether to include hidden files and directories (starting with "."). Defaults to false.
    #[serde(default)]
    pub enable_hidden_files: bool,

    /// Rules for excluding files.
    #[serde(default)]
    pub exclude: ExcludeRules,

    /// Rules for including files (whitelist, overrides exclude rules).
    #[serde(default)]
    pub include: IncludeRules,
}

/// Rules for excluding files from scanning.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ExcludeRules {
    /// Exact filenames to exclude (e.g., ".DS_Store", "Thumbs.db").
    #[serde(default)]
    pub filenames: Vec<String>,

    /// Glob patterns to exclude, matched against the path relative to the base directory.
    #[serde(default)]
    pub patterns: Vec<String>,

    /// File extensions to exclude (e.g., "bak", "tmp").
    #[serde(default)]
    pub extensions: Vec<String>,

    /// Regex patterns matched against the file name.
    #[serde(default)]
    pub regex: Vec<String>,
}

/// Rules for including files, overriding exclude rules (whitelist).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct IncludeRules {
    /// Glob patterns that override exclude rules.
    #[serde(default)]
    pub patterns: Vec<String>,
}

impl Config {
    /// Load configuration from a file, with fallback to defaults.
    ///
    /// Attempts to load configuration in the following order:
    /// 1. If `config_path` is provided, load from that file
    /// 2. Look for `.phototidyrc.toml` in the current directory
    /// 3. Look for `~/.config/phototidy/config.toml` in home directory
    /// 4. Fall back to default configuration
    ///
    /// # Errors
    ///
    /// Returns an error if a configuration file is explicitly provided but cannot be read,
    /// or if any discovered file is not valid TOML.
    pub fn load(config_path: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = config_path {
            return Self::load_from_file(path);
        }

        let local_config = PathBuf::from(".phototidyrc.toml");
        if local_config.exists() {
            return Self::load_from_file(&local_config);
        }

        if let Ok(home) = std::env::var("HOME") {
            let home_config = PathBuf::from(home)
                .join(".config")
                .join("phototidy")
                .join("config.toml");
            if home_config.exists() {
                return Self::load_from_file(&home_config);
            }
        }

        debug!("no configuration file found, using defaults");
        Ok(Self::default())
    }

    /// Load configuration from a specific file.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ConfigNotFound` if file does not exist.
    /// Returns `ConfigError::ConfigInvalid` if TOML parsing fails.
    /// Returns `ConfigError::IoError` if file cannot be read.
    fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::ConfigNotFound(path.to_path_buf()));
        }

        let content = fs::read_to_string(path).map_err(|e| ConfigError::IoError(e.to_string()))?;
        debug!("loading configuration from {}", path.display());

        toml::from_str(&content).map_err(|e| ConfigError::ConfigInvalid(e.to_string()))
    }

    /// Validate the configuration and compile it into the structures used at runtime.
    ///
    /// # Errors
    ///
    /// Returns an error if any regex or glob pattern is invalid, or if the
    /// backup folder name is not a single plain component.
    pub fn compile(self) -> Result<CompiledConfig, ConfigError> {
        Ok(CompiledConfig {
            settings: OrganizeSettings::new(self.organize)?,
            filters: CompiledFilters::new(self.filters)?,
        })
    }
}

/// Validated configuration, ready for scanning, planning and execution.
#[derive(Debug)]
pub struct CompiledConfig {
    pub settings: OrganizeSettings,
    pub filters: CompiledFilters,
}

/// Normalized organize rules.
#[derive(Debug, Clone)]
pub struct OrganizeSettings {
    extensions: HashSet<String>,
    metadata_extensions: HashSet<String>,
    backup_dir: String,
    prune_empty_dirs: bool,
}

impl OrganizeSettings {
    fn new(rules: OrganizeRules) -> Result<Self, ConfigError> {
        let mut components = Path::new(&rules.backup_dir).components();
        let is_plain = matches!(
            (components.next(), components.next()),
            (Some(Component::Normal(_)), None)
        );
        if !is_plain {
            return Err(ConfigError::InvalidBackupDir(rules.backup_dir));
        }

        Ok(Self {
            extensions: normalize_extensions(&rules.extensions),
            metadata_extensions: normalize_extensions(&rules.metadata_extensions),
            backup_dir: rules.backup_dir,
            prune_empty_dirs: rules.prune_empty_dirs,
        })
    }

    /// True if files with this (lowercased) extension are planned.
    pub fn is_target(&self, extension: &str) -> bool {
        self.extensions.contains(extension)
    }

    /// True if files with this extension are checked for embedded capture metadata.
    pub fn reads_metadata(&self, extension: &str) -> bool {
        self.metadata_extensions.contains(extension)
    }

    pub fn backup_dir(&self) -> &str {
        &self.backup_dir
    }

    pub fn prune_empty_dirs(&self) -> bool {
        self.prune_empty_dirs
    }

    /// Enables pruning regardless of what the configuration file said.
    pub fn with_prune_empty_dirs(mut self, prune: bool) -> Self {
        self.prune_empty_dirs = self.prune_empty_dirs || prune;
        self
    }
}

impl Default for OrganizeSettings {
    fn default() -> Self {
        Self {
            extensions: normalize_extensions(&default_extensions()),
            metadata_extensions: normalize_extensions(&default_metadata_extensions()),
            backup_dir: default_backup_dir(),
            prune_empty_dirs: false,
        }
    }
}

fn normalize_extensions(extensions: &[String]) -> HashSet<String> {
    extensions
        .iter()
        .map(|ext| ext.trim().trim_start_matches('.').to_lowercase())
        .filter(|ext| !ext.is_empty())
        .collect()
}

/// Compiled, optimized filter structures for efficient file matching.
///
/// Glob and regex patterns are compiled once so that matching a scanned file
/// never reparses them.
#[derive(Debug)]
pub struct CompiledFilters {
    enable_hidden_files: bool,
    exclude_filenames: HashSet<String>,
    exclude_extensions: HashSet<String>,
    exclude_patterns: Vec<Pattern>,
    exclude_regexes: Vec<Regex>,
    include_patterns: Vec<Pattern>,
}

impl CompiledFilters {
    /// Create compiled filters from filter rules.
    ///
    /// # Errors
    ///
    /// Returns an error if any glob or regex patterns are invalid.
    fn new(rules: FilterRules) -> Result<Self, ConfigError> {
        let exclude_patterns = compile_globs(&rules.exclude.patterns)?;
        let include_patterns = compile_globs(&rules.include.patterns)?;

        let exclude_regexes = rules
            .exclude
            .regex
            .iter()
            .map(|pattern| {
                Regex::new(pattern).map_err(|e| ConfigError::InvalidRegexPattern {
                    pattern: pattern.clone(),
                    reason: e.to_string(),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            enable_hidden_files: rules.enable_hidden_files,
            exclude_filenames: rules.exclude.filenames.into_iter().collect(),
            exclude_extensions: normalize_extensions(&rules.exclude.extensions),
            exclude_patterns,
            exclude_regexes,
            include_patterns,
        })
    }

    /// Check if a scanned file (path relative to the base directory) should be kept.
    ///
    /// Checks are performed in this order, with early termination:
    /// 1. Include patterns (whitelist) - if matched, always include
    /// 2. Hidden file filter - if hidden and disabled, exclude
    /// 3. Exact filename match - if matched, exclude
    /// 4. File extension match - if matched, exclude
    /// 5. Glob pattern match - if matched, exclude
    /// 6. Regex pattern match - if matched, exclude
    /// 7. Default: include
    pub fn should_include(&self, file_path: &Path) -> bool {
        let file_name = file_path
            .file_name()
            .map(|n| n.to_string_lossy())
            .unwrap_or_default();

        if self.matches_include_patterns(file_path) {
            return true;
        }

        if !self.enable_hidden_files && file_name.starts_with('.') {
            return false;
        }

        if self.exclude_filenames.contains(file_name.as_ref()) {
            return false;
        }

        if let Some(ext) = file_path.extension() {
            let ext_lower = ext.to_string_lossy().to_lowercase();
            if self.exclude_extensions.contains(&ext_lower) {
                return false;
            }
        }

        if self.matches_exclude_patterns(file_path) {
            return false;
        }

        !self.matches_exclude_regex(&file_name)
    }

    /// Check if the scanner should walk into a directory with this name.
    pub fn should_descend(&self, dir_name: &str) -> bool {
        self.enable_hidden_files || !dir_name.starts_with('.')
    }

    fn matches_include_patterns(&self, file_path: &Path) -> bool {
        self.include_patterns
            .iter()
            .any(|pattern| pattern.matches_path(file_path))
    }

    fn matches_exclude_patterns(&self, file_path: &Path) -> bool {
        self.exclude_patterns
            .iter()
            .any(|pattern| pattern.matches_path(file_path))
    }

    fn matches_exclude_regex(&self, file_name: &str) -> bool {
        self.exclude_regexes
            .iter()
            .any(|regex| regex.is_match(file_name))
    }
}

impl Default for CompiledFilters {
    fn default() -> Self {
        Self {
            enable_hidden_files: false,
            exclude_filenames: HashSet::new(),
            exclude_extensions: HashSet::new(),
            exclude_patterns: Vec::new(),
            exclude_regexes: Vec::new(),
            include_patterns: Vec::new(),
        }
    }
}

fn compile_globs(patterns: &[String]) -> Result<Vec<Pattern>, ConfigError> {
    patterns
        .iter()
        .map(|pattern| {
            Pattern::new(pattern).map_err(|_| ConfigError::InvalidGlobPattern(pattern.clone()))
        })
        .collect()
}
