use config::{Config as ConfigBuilder, File};
use serde::{Deserialize, Serialize};
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};

use crate::errors::{SearchError, SearchResult};
use crate::search::PatternMatcher;

/// Default number of files that may be open for content scanning at once.
pub const DEFAULT_MAX_OPEN_FILES: usize = 10;

/// Default capacity of every bounded result stream.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 256;

/// Settings for one search run.
///
/// # Configuration Locations
///
/// Settings can be loaded from several YAML files, later ones overriding earlier ones:
/// 1. Global `$HOME/.config/findscout/config.yaml`
/// 2. Local `.findscout.yaml` in the current directory
/// 3. A file passed explicitly (the CLI's `--config` flag)
///
/// ```yaml
/// pattern: "TODO|FIXME"
/// ignore_pattern: "^target$"
/// root_path: "."
/// grep: true
/// include_hidden: false
/// max_open_files: 10
/// ```
///
/// Command-line values take precedence, see [`SearchConfig::merge_with_cli`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Regular expression matched against base names and, with `grep`, file lines
    #[serde(default)]
    pub pattern: String,

    /// Regular expression; matching names are pruned and matching lines are dropped
    #[serde(default)]
    pub ignore_pattern: Option<String>,

    /// Root directory to start search from
    #[serde(default = "default_root_path")]
    pub root_path: PathBuf,

    /// Report directories whose name matches
    #[serde(default = "default_true")]
    pub find_dirs: bool,

    /// Report regular files whose name matches
    #[serde(default = "default_true")]
    pub find_files: bool,

    /// Report symbolic links whose name matches
    #[serde(default = "default_true")]
    pub find_symlinks: bool,

    /// Search file contents
    #[serde(default)]
    pub grep: bool,

    /// Search inside files classified as binary
    #[serde(default)]
    pub include_binary: bool,

    /// Descend into and report entries whose name starts with '.'
    #[serde(default)]
    pub include_hidden: bool,

    /// Number of worker threads for directory expansion and content scanning
    #[serde(default = "default_thread_count")]
    pub thread_count: NonZeroUsize,

    /// Upper bound on files open for content scanning at the same time
    #[serde(default = "default_max_open_files")]
    pub max_open_files: usize,

    /// Capacity of each bounded result stream
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,

    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_root_path() -> PathBuf {
    PathBuf::from(".")
}

fn default_true() -> bool {
    true
}

fn default_thread_count() -> NonZeroUsize {
    NonZeroUsize::new(num_cpus::get()).unwrap_or(NonZeroUsize::MIN)
}

fn default_max_open_files() -> usize {
    DEFAULT_MAX_OPEN_FILES
}

fn default_channel_capacity() -> usize {
    DEFAULT_CHANNEL_CAPACITY
}

fn default_log_level() -> String {
    "warn".to_string()
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            pattern: String::new(),
            ignore_pattern: None,
            root_path: default_root_path(),
            find_dirs: true,
            find_files: true,
            find_symlinks: true,
            grep: false,
            include_binary: false,
            include_hidden: false,
            thread_count: default_thread_count(),
            max_open_files: DEFAULT_MAX_OPEN_FILES,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            log_level: default_log_level(),
        }
    }
}

impl SearchConfig {
    /// Creates a config for `pattern` rooted at `root_path` with default scope flags
    pub fn new(pattern: impl Into<String>, root_path: impl Into<PathBuf>) -> Self {
        Self {
            pattern: pattern.into(),
            root_path: root_path.into(),
            ..Self::default()
        }
    }

    /// Loads configuration from the default locations
    pub fn load() -> SearchResult<Self> {
        Self::load_from(None)
    }

    /// Loads configuration from the default locations plus an explicit file
    pub fn load_from(config_path: Option<&Path>) -> SearchResult<Self> {
        let mut builder = ConfigBuilder::builder();

        let config_files = [
            dirs::config_dir().map(|p| p.join("findscout/config.yaml")),
            Some(PathBuf::from(".findscout.yaml")),
        ];

        for path in config_files.iter().flatten() {
            if path.exists() {
                builder = builder.add_source(File::from(path.as_path()));
            }
        }

        // An explicit file must exist
        if let Some(path) = config_path {
            builder = builder.add_source(File::from(path).required(true));
        }

        Ok(builder.build()?.try_deserialize()?)
    }

    /// Merges CLI arguments with configuration file values.
    ///
    /// Text and numeric fields in `cli_config` win whenever they differ from
    /// their defaults. Boolean switches can only move a setting away from its
    /// default here (`grep` on, `find_dirs` off, ...); a front end that wants
    /// to switch a file setting back must set the field on the merged value.
    pub fn merge_with_cli(mut self, cli_config: SearchConfig) -> Self {
        let defaults = SearchConfig::default();

        if !cli_config.pattern.is_empty() {
            self.pattern = cli_config.pattern;
        }
        if cli_config.ignore_pattern.is_some() {
            self.ignore_pattern = cli_config.ignore_pattern;
        }
        if cli_config.root_path != defaults.root_path {
            self.root_path = cli_config.root_path;
        }
        // Scope flags only override when they differ from their defaults
        if !cli_config.find_dirs {
            self.find_dirs = false;
        }
        if !cli_config.find_files {
            self.find_files = false;
        }
        if !cli_config.find_symlinks {
            self.find_symlinks = false;
        }
        if cli_config.grep {
            self.grep = true;
        }
        if cli_config.include_binary {
            self.include_binary = true;
        }
        if cli_config.include_hidden {
            self.include_hidden = true;
        }
        if cli_config.thread_count != defaults.thread_count {
            self.thread_count = cli_config.thread_count;
        }
        if cli_config.max_open_files != defaults.max_open_files {
            self.max_open_files = cli_config.max_open_files;
        }
        if cli_config.channel_capacity != defaults.channel_capacity {
            self.channel_capacity = cli_config.channel_capacity;
        }
        if cli_config.log_level != defaults.log_level {
            self.log_level = cli_config.log_level;
        }
        self
    }

    /// Renders the settings in the same YAML form [`SearchConfig::load_from`] reads
    pub fn to_yaml(&self) -> SearchResult<String> {
        serde_yaml::to_string(self).map_err(|e| SearchError::config_error(e.to_string()))
    }

    /// Rejects settings the pipeline cannot run with
    pub fn validate(&self) -> SearchResult<()> {
        if self.pattern.is_empty() {
            return Err(SearchError::config_error("a search pattern is required"));
        }
        if self.max_open_files == 0 {
            return Err(SearchError::config_error(
                "max_open_files must be at least 1",
            ));
        }
        if self.channel_capacity == 0 {
            return Err(SearchError::config_error(
                "channel_capacity must be at least 1",
            ));
        }
        Ok(())
    }

    /// Validates the settings and compiles both patterns
    pub fn compile(&self) -> SearchResult<CompiledConfig> {
        self.validate()?;
        let pattern = PatternMatcher::new(&self.pattern)?;
        let ignore = match self.ignore_pattern.as_deref() {
            Some(text) if !text.is_empty() => Some(PatternMatcher::new(text)?),
            _ => None,
        };

        Ok(CompiledConfig {
            pattern,
            ignore,
            scope: Scope {
                dirs: self.find_dirs,
                files: self.find_files,
                symlinks: self.find_symlinks,
                content: self.grep,
                binary: self.include_binary,
                hidden: self.include_hidden,
            },
            root_path: self.root_path.clone(),
            thread_count: self.thread_count,
            max_open_files: self.max_open_files,
            channel_capacity: self.channel_capacity,
        })
    }
}

/// Which entry categories and content the run reports
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Scope {
    pub dirs: bool,
    pub files: bool,
    pub symlinks: bool,
    pub content: bool,
    pub binary: bool,
    pub hidden: bool,
}

/// The immutable form of [`SearchConfig`] shared by every task of a run
#[derive(Debug, Clone)]
pub struct CompiledConfig {
    pub pattern: PatternMatcher,
    pub ignore: Option<PatternMatcher>,
    pub scope: Scope,
    pub root_path: PathBuf,
    pub thread_count: NonZeroUsize,
    pub max_open_files: usize,
    pub channel_capacity: usize,
}
