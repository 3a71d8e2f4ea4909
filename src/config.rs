//! Layered configuration.
//!
//! Settings are resolved from, lowest to highest priority:
//!
//! 1. built-in defaults
//! 2. a TOML file (`--config PATH`, else `config.toml` in the platform
//!    config directory)
//! 3. `CHUNKDUPE_*` environment variables (`__` separates nested keys)
//! 4. command-line flags, applied with [`Config::merge_scan_args`]
//!
//! ```toml
//! memory_budget = "8GiB"
//! parallelism_ceiling = 8
//! min_chunk_floor = "64MiB"
//! media_types = ["video"]
//! ```

use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Deserializer, Serialize};

use crate::cli::{parse_size, ScanArgs};
use crate::duplicates::scheduler::{
    DEFAULT_MEMORY_BUDGET, DEFAULT_MIN_CHUNK_FLOOR, DEFAULT_PARALLELISM_CEILING,
};
use crate::duplicates::{FinderConfig, SchedulerConfig};
use crate::scanner::{MediaType, WalkerConfig};

/// Prefix of environment variables read by [`Config::load`].
pub const ENV_PREFIX: &str = "CHUNKDUPE_";

const KNOWN_KEYS: &[&str] = &[
    "memory_budget",
    "parallelism_ceiling",
    "min_chunk_floor",
    "strict",
    "skip_hidden",
    "min_size",
    "media_types",
    "size_limited_merge",
];

/// Errors from loading or validating configuration.
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    /// An explicitly requested config file does not exist.
    #[error("Config file not found: {0}")]
    NotFound(PathBuf),

    /// A setting has a value the engine cannot run with.
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Resolved settings for a scan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Upper bound on chunk bytes in memory at once
    #[serde(deserialize_with = "deserialize_size")]
    pub memory_budget: u64,
    /// Maximum files hashed concurrently within a size group
    pub parallelism_ceiling: usize,
    /// Smallest chunk size the scheduler may choose
    #[serde(deserialize_with = "deserialize_size")]
    pub min_chunk_floor: u64,
    /// Abort on the first unreadable file
    pub strict: bool,
    /// Skip hidden files and directories
    pub skip_hidden: bool,
    /// Ignore files smaller than this
    #[serde(deserialize_with = "deserialize_optional_size")]
    pub min_size: Option<u64>,
    /// Media categories to scan
    pub media_types: Vec<MediaType>,
    /// Import only target files whose size occurs among the sources
    pub size_limited_merge: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            memory_budget: DEFAULT_MEMORY_BUDGET,
            parallelism_ceiling: DEFAULT_PARALLELISM_CEILING,
            min_chunk_floor: DEFAULT_MIN_CHUNK_FLOOR,
            strict: false,
            skip_hidden: false,
            min_size: None,
            media_types: MediaType::ALL.to_vec(),
            size_limited_merge: true,
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum SizeValue {
    Bytes(u64),
    Human(String),
}

impl SizeValue {
    fn into_bytes<E: serde::de::Error>(self) -> Result<u64, E> {
        match self {
            Self::Bytes(bytes) => Ok(bytes),
            Self::Human(text) => parse_size(&text).map_err(E::custom),
        }
    }
}

fn deserialize_size<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
    SizeValue::deserialize(deserializer)?.into_bytes()
}

fn deserialize_optional_size<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<u64>, D::Error> {
    Option::<SizeValue>::deserialize(deserializer)?
        .map(SizeValue::into_bytes)
        .transpose()
}

impl Config {
    /// The platform config file location, e.g.
    /// `~/.config/chunkdupe/config.toml` on Linux.
    #[must_use]
    pub fn default_path() -> Option<PathBuf> {
        ProjectDirs::from("com", "chunkdupe", "chunkdupe")
            .map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// Load configuration from `explicit`, or from the default location.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::NotFound`] if `explicit` names a missing file.
    /// A missing default file is not an error.
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        match explicit {
            Some(path) if !path.is_file() => Err(ConfigError::NotFound(path.to_path_buf())),
            Some(path) => Ok(Self::load_from_path(path)),
            None => Ok(Self::default_path().map_or_else(Self::from_env, Self::load_from_path)),
        }
    }

    /// Load defaults, then `path` if it exists, then the environment.
    ///
    /// Unknown keys are reported with a suggestion. A value of the wrong type
    /// makes the whole configuration fall back to defaults with a warning.
    pub fn load_from_path(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        let mut figment = Figment::from(Serialized::defaults(Config::default()));
        if path.is_file() {
            log::debug!("Loading config from {}", path.display());
            warn_unknown_keys(path);
            figment = figment.merge(Toml::file(path));
        }
        Self::extract(figment.merge(Env::prefixed(ENV_PREFIX).split("__")))
    }

    /// Load defaults and the environment only.
    #[must_use]
    pub fn from_env() -> Self {
        Self::extract(
            Figment::from(Serialized::defaults(Config::default()))
                .merge(Env::prefixed(ENV_PREFIX).split("__")),
        )
    }

    fn extract(figment: Figment) -> Self {
        match figment.extract::<Config>() {
            Ok(config) => config,
            Err(e) => {
                log::warn!("Ignoring invalid configuration, using defaults: {e}");
                Config::default()
            }
        }
    }

    /// Apply flags given on the command line.
    pub fn merge_scan_args(&mut self, args: &ScanArgs) {
        if let Some(budget) = args.memory_budget {
            self.memory_budget = budget;
        }
        if let Some(threads) = args.parallelism {
            self.parallelism_ceiling = threads;
        }
        if let Some(floor) = args.min_chunk {
            self.min_chunk_floor = floor;
        }
        if args.min_size.is_some() {
            self.min_size = args.min_size;
        }
        if !args.media.is_empty() {
            self.media_types = args.media.clone();
        }
        self.strict |= args.strict;
        self.skip_hidden |= args.skip_hidden;
        if args.no_size_limit {
            self.size_limited_merge = false;
        }
    }

    /// Reject settings the scheduler cannot work with.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] for a zero memory budget, parallelism
    /// ceiling or chunk floor, or an empty media type list.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.memory_budget == 0 {
            return Err(ConfigError::Invalid("memory_budget must be greater than 0".into()));
        }
        if self.parallelism_ceiling == 0 {
            return Err(ConfigError::Invalid(
                "parallelism_ceiling must be greater than 0".into(),
            ));
        }
        if self.min_chunk_floor == 0 {
            return Err(ConfigError::Invalid("min_chunk_floor must be greater than 0".into()));
        }
        if self.media_types.is_empty() {
            return Err(ConfigError::Invalid("media_types must not be empty".into()));
        }
        Ok(())
    }

    /// Lower the memory budget to the machine's physical memory if it
    /// exceeds it. Returns whether the budget changed.
    pub fn clamp_to_physical_memory(&mut self) -> bool {
        let mut sys = sysinfo::System::new();
        sys.refresh_memory();
        self.clamp_memory_budget(sys.total_memory())
    }

    /// Lower the memory budget to `physical` bytes. Zero means unknown.
    pub fn clamp_memory_budget(&mut self, physical: u64) -> bool {
        if physical == 0 || self.memory_budget <= physical {
            return false;
        }
        log::warn!(
            "Memory budget {} exceeds physical memory {}, using {}",
            bytesize::ByteSize(self.memory_budget),
            bytesize::ByteSize(physical),
            bytesize::ByteSize(physical)
        );
        self.memory_budget = physical;
        true
    }

    /// Scanner settings.
    #[must_use]
    pub fn walker_config(&self) -> WalkerConfig {
        WalkerConfig {
            skip_hidden: self.skip_hidden,
            min_size: self.min_size,
            media_types: self.media_types.clone(),
        }
    }

    /// Engine settings, without progress reporting or a shutdown flag.
    #[must_use]
    pub fn finder_config(&self) -> FinderConfig {
        FinderConfig::default()
            .with_scheduler(
                SchedulerConfig::default()
                    .with_memory_budget(self.memory_budget)
                    .with_parallelism_ceiling(self.parallelism_ceiling)
                    .with_min_chunk_floor(self.min_chunk_floor),
            )
            .with_strict(self.strict)
            .with_walker_config(self.walker_config())
            .with_size_limited_merge(self.size_limited_merge)
    }
}

fn warn_unknown_keys(path: &Path) {
    let Ok(content) = std::fs::read_to_string(path) else {
        return;
    };
    let Ok(table) = content.parse::<toml::Table>() else {
        // Figment reports the syntax error on extract
        return;
    };
    for key in table.keys() {
        if KNOWN_KEYS.contains(&key.as_str()) {
            continue;
        }
        match suggest_key(key) {
            Some(suggestion) => log::warn!(
                "Unknown config key '{key}' in {}, did you mean '{suggestion}'?",
                path.display()
            ),
            None => log::warn!("Unknown config key '{key}' in {}", path.display()),
        }
    }
}

/// Closest known key to `unknown`, if any is reasonably close.
#[must_use]
pub fn suggest_key(unknown: &str) -> Option<&'static str> {
    KNOWN_KEYS
        .iter()
        .map(|known| (*known, strsim::jaro_winkler(unknown, known)))
        .filter(|(_, score)| *score > 0.8)
        .max_by(|a, b| a.1.total_cmp(&b.1))
        .map(|(known, _)| known)
}
