//! Configuration file handling for llm-bench
//!
//! Manages configuration stored in `~/.config/llm-bench/config.toml` (or platform equivalent).
//!
//! ## Configuration Layers
//!
//! Configuration values are resolved in this order (later overrides earlier):
//! 1. Hard-coded defaults
//! 2. Config file (`~/.config/llm-bench/config.toml`)
//! 3. Environment variables (`LLM_BENCH_*`)
//! 4. Command-line arguments
//!
//! ## Example Config File
//!
//! ```toml
//! [pipeline]
//! default_days = 14
//! alignment = "nearest"
//!
//! [display]
//! registry_path = "/var/lib/llm-bench/registry.json"
//!
//! [display.model_aliases]
//! "gpt-4-0613" = "gpt-4"
//!
//! [table]
//! hide_flagged = true
//! ```

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::PathBuf;
use std::time::Duration;

use crate::display::{ProviderAliases, RegistryCacheConfig, StaticDisplayTable};
use crate::lifecycle::LifecycleStatus;
use crate::projection::{AlignmentPolicy, DensityConfig, TableFilter};

// =============================================================================
// Configuration Structures
// =============================================================================

// Config file format version
// Bump this when making breaking changes to the config structure
const CONFIG_VERSION: u32 = 1;
const LEGACY_CONFIG_VERSION: u32 = 0;

pub const ENV_DAYS: &str = "LLM_BENCH_DAYS";
pub const ENV_REGISTRY: &str = "LLM_BENCH_REGISTRY";
pub const ENV_HIDE_FLAGGED: &str = "LLM_BENCH_HIDE_FLAGGED";

/// Root configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BenchConfig {
    /// Config file format version for migrations
    #[serde(default = "default_config_version")]
    pub version: u32,

    #[serde(default)]
    pub pipeline: PipelineConfig,

    #[serde(default)]
    pub display: DisplayConfig,

    #[serde(default)]
    pub table: TableConfig,

    #[serde(default)]
    pub density: DensitySection,

    #[serde(default)]
    pub output: OutputConfig,
}

fn default_config_version() -> u32 {
    LEGACY_CONFIG_VERSION
}

/// Batch settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Time-series window when `--days` is not given
    #[serde(default = "default_days")]
    pub default_days: u32,

    /// Upper bound applied to any requested window
    #[serde(default = "default_max_days")]
    pub max_days: u32,

    /// "resample" or "nearest"
    #[serde(default = "default_alignment")]
    pub alignment: String,

    /// Tolerance for nearest-timestamp alignment
    #[serde(default = "default_tolerance")]
    pub nearest_tolerance_minutes: i64,

    /// Whole-batch timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,
}

/// Display-name resolution settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DisplayConfig {
    /// JSON registry file; `None` uses the static table only
    #[serde(default)]
    pub registry_path: Option<PathBuf>,

    #[serde(default = "default_registry_ttl")]
    pub registry_ttl_seconds: u64,

    #[serde(default = "default_registry_timeout")]
    pub registry_timeout_ms: u64,

    /// Extra model id → display name mappings
    #[serde(default)]
    pub model_aliases: BTreeMap<String, String>,

    /// Extra provider id → label mappings
    #[serde(default)]
    pub provider_aliases: BTreeMap<String, String>,
}

/// Table filtering defaults
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TableConfig {
    #[serde(default)]
    pub hide_flagged: bool,

    /// Empty means every status is allowed
    #[serde(default)]
    pub allowed_statuses: Vec<String>,
}

/// Density estimation settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DensitySection {
    #[serde(default = "default_bandwidth")]
    pub bandwidth: f64,

    #[serde(default = "default_display_ceiling")]
    pub display_ceiling: f64,

    #[serde(default = "default_density_points")]
    pub points: usize,
}

/// Output format configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Default output format (json, human, csv)
    #[serde(default = "default_format")]
    pub default_format: String,

    /// Pretty-print JSON
    #[serde(default = "default_true")]
    pub pretty: bool,

    /// Use colored output
    #[serde(default = "default_true")]
    pub color: bool,
}

// =============================================================================
// Default Value Functions
// =============================================================================

fn default_days() -> u32 {
    7
}

fn default_max_days() -> u32 {
    90
}

fn default_alignment() -> String {
    "resample".to_string()
}

fn default_tolerance() -> i64 {
    5
}

fn default_timeout() -> u64 {
    30
}

fn default_registry_ttl() -> u64 {
    300
}

fn default_registry_timeout() -> u64 {
    2000
}

fn default_bandwidth() -> f64 {
    7.0
}

fn default_display_ceiling() -> f64 {
    140.0
}

fn default_density_points() -> usize {
    100
}

fn default_format() -> String {
    "json".to_string()
}

fn default_true() -> bool {
    true
}

fn normalize_alignment(value: &str) -> String {
    match value.trim().to_lowercase().as_str() {
        "resample" | "index" | "subsample" => "resample".to_string(),
        "nearest" | "nearest_timestamp" | "nearest-timestamp" | "timestamp" => {
            "nearest".to_string()
        }
        _ => value.trim().to_lowercase(),
    }
}

// =============================================================================
// Default Implementations
// =============================================================================

impl Default for BenchConfig {
    fn default() -> Self {
        Self {
            version: CONFIG_VERSION,
            pipeline: PipelineConfig::default(),
            display: DisplayConfig::default(),
            table: TableConfig::default(),
            density: DensitySection::default(),
            output: OutputConfig::default(),
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            default_days: default_days(),
            max_days: default_max_days(),
            alignment: default_alignment(),
            nearest_tolerance_minutes: default_tolerance(),
            timeout_seconds: default_timeout(),
        }
    }
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            registry_path: None,
            registry_ttl_seconds: default_registry_ttl(),
            registry_timeout_ms: default_registry_timeout(),
            model_aliases: BTreeMap::new(),
            provider_aliases: BTreeMap::new(),
        }
    }
}

impl Default for DensitySection {
    fn default() -> Self {
        Self {
            bandwidth: default_bandwidth(),
            display_ceiling: default_display_ceiling(),
            points: default_density_points(),
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            default_format: default_format(),
            pretty: true,
            color: true,
        }
    }
}

// =============================================================================
// Configuration Loading and Saving
// =============================================================================

impl BenchConfig {
    /// Get the default configuration file path
    ///
    /// Returns platform-specific config directory:
    /// - Linux: `~/.config/llm-bench/config.toml`
    /// - macOS: `~/Library/Application Support/llm-bench/config.toml`
    /// - Windows: `%APPDATA%\llm-bench\config.toml`
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("llm-bench")
            .join("config.toml")
    }

    /// Load configuration from the default path
    pub fn load() -> Self {
        Self::load_from(Self::default_path())
    }

    /// Load configuration from a specific path
    ///
    /// Returns default configuration if the file doesn't exist or can't be parsed.
    /// Performs automatic migration if the config version is outdated.
    pub fn load_from(path: PathBuf) -> Self {
        let content = match std::fs::read_to_string(&path) {
            Ok(content) => content,
            Err(_) => {
                tracing::debug!("Config file not found at {:?}, using defaults", path);
                return Self::default();
            }
        };

        let mut config = match toml::from_str::<Self>(&content) {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!("Failed to parse config at {:?}: {}", path, e);
                return Self::default();
            }
        };
        tracing::debug!("Loaded config from {:?}", path);

        let original_version = config.version;
        config.migrate_if_needed();

        let normalized = normalize_alignment(&config.pipeline.alignment);
        let changed = normalized != config.pipeline.alignment;
        config.pipeline.alignment = normalized;

        if config.version != original_version || changed {
            tracing::info!(
                "Config migrated from version {} to {}",
                original_version,
                config.version
            );
            if let Err(e) = config.save_to(path.clone()) {
                tracing::warn!("Failed to persist migrated config {:?}: {}", path, e);
            }
        }
        config
    }

    /// Migrate config to the latest version if needed
    fn migrate_if_needed(&mut self) {
        match self.version {
            0 => {
                // Unversioned files could carry a default window above the cap
                if self.pipeline.default_days > self.pipeline.max_days {
                    self.pipeline.default_days = self.pipeline.max_days;
                }
                self.pipeline.alignment = normalize_alignment(&self.pipeline.alignment);
                self.version = CONFIG_VERSION;
            }
            CONFIG_VERSION => {}
            _ => {
                tracing::warn!(
                    "Config version {} is newer than supported version {}",
                    self.version,
                    CONFIG_VERSION
                );
            }
        }
    }

    /// Save configuration to the default path
    pub fn save(&self) -> std::io::Result<()> {
        self.save_to(Self::default_path())
    }

    /// Save configuration to a specific path
    ///
    /// Creates parent directories if they don't exist.
    pub fn save_to(&self, path: PathBuf) -> std::io::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;

        std::fs::write(&path, content)?;
        tracing::debug!("Saved config to {:?}", path);

        Ok(())
    }

    /// Apply `LLM_BENCH_*` environment overrides
    pub fn apply_env(&mut self) {
        self.apply_env_from(|name| std::env::var(name).ok());
    }

    /// Apply overrides from any variable source
    ///
    /// Invalid values are logged and ignored.
    pub fn apply_env_from(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let overrides = [
            (ENV_DAYS, "pipeline.default_days"),
            (ENV_REGISTRY, "display.registry_path"),
            (ENV_HIDE_FLAGGED, "table.hide_flagged"),
        ];
        for (var, key) in overrides {
            if let Some(value) = lookup(var) {
                if let Err(e) = self.set(key, &value) {
                    tracing::warn!("Ignoring {}: {}", var, e);
                }
            }
        }
    }

    /// Get a configuration value by key path
    ///
    /// Key path uses dot notation: `pipeline.default_days`
    pub fn get(&self, key: &str) -> Option<String> {
        let parts: Vec<&str> = key.splitn(3, '.').collect();

        match parts.as_slice() {
            ["pipeline", "default_days"] => Some(self.pipeline.default_days.to_string()),
            ["pipeline", "max_days"] => Some(self.pipeline.max_days.to_string()),
            ["pipeline", "alignment"] => Some(self.pipeline.alignment.clone()),
            ["pipeline", "nearest_tolerance_minutes"] => {
                Some(self.pipeline.nearest_tolerance_minutes.to_string())
            }
            ["pipeline", "timeout_seconds"] => Some(self.pipeline.timeout_seconds.to_string()),
            ["display", "registry_path"] => Some(
                self.display
                    .registry_path
                    .as_ref()
                    .map(|p| p.display().to_string())
                    .unwrap_or_default(),
            ),
            ["display", "registry_ttl_seconds"] => {
                Some(self.display.registry_ttl_seconds.to_string())
            }
            ["display", "registry_timeout_ms"] => Some(self.display.registry_timeout_ms.to_string()),
            ["display", "model_aliases", model] => self.display.model_aliases.get(*model).cloned(),
            ["display", "provider_aliases", provider] => {
                self.display.provider_aliases.get(*provider).cloned()
            }
            ["table", "hide_flagged"] => Some(self.table.hide_flagged.to_string()),
            ["table", "allowed_statuses"] => Some(self.table.allowed_statuses.join(",")),
            ["density", "bandwidth"] => Some(self.density.bandwidth.to_string()),
            ["density", "display_ceiling"] => Some(self.density.display_ceiling.to_string()),
            ["density", "points"] => Some(self.density.points.to_string()),
            ["output", "default_format"] => Some(self.output.default_format.clone()),
            ["output", "pretty"] => Some(self.output.pretty.to_string()),
            ["output", "color"] => Some(self.output.color.to_string()),
            _ => None,
        }
    }

    /// Set a configuration value by key path
    ///
    /// Key path uses dot notation: `pipeline.default_days`. Alias keys take
    /// the rest of the path verbatim: `display.model_aliases.gpt-4-0613`.
    pub fn set(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        let parts: Vec<&str> = key.splitn(3, '.').collect();

        match parts.as_slice() {
            ["pipeline", "default_days"] => {
                let days: u32 = parse_value(key, value, "positive integer")?;
                if days == 0 {
                    return Err(invalid(key, value, "positive integer"));
                }
                self.pipeline.default_days = days;
            }
            ["pipeline", "max_days"] => {
                let days: u32 = parse_value(key, value, "positive integer")?;
                if days == 0 {
                    return Err(invalid(key, value, "positive integer"));
                }
                self.pipeline.max_days = days;
            }
            ["pipeline", "alignment"] => {
                let normalized = normalize_alignment(value);
                if !["resample", "nearest"].contains(&normalized.as_str()) {
                    return Err(invalid(key, value, "resample or nearest"));
                }
                self.pipeline.alignment = normalized;
            }
            ["pipeline", "nearest_tolerance_minutes"] => {
                let minutes: i64 = parse_value(key, value, "non-negative integer")?;
                if minutes < 0 {
                    return Err(invalid(key, value, "non-negative integer"));
                }
                self.pipeline.nearest_tolerance_minutes = minutes;
            }
            ["pipeline", "timeout_seconds"] => {
                self.pipeline.timeout_seconds = parse_value(key, value, "positive integer")?;
            }
            ["display", "registry_path"] => {
                self.display.registry_path = match value.trim() {
                    "" => None,
                    path => Some(PathBuf::from(path)),
                };
            }
            ["display", "registry_ttl_seconds"] => {
                self.display.registry_ttl_seconds = parse_value(key, value, "positive integer")?;
            }
            ["display", "registry_timeout_ms"] => {
                self.display.registry_timeout_ms = parse_value(key, value, "positive integer")?;
            }
            ["display", "model_aliases", model] => {
                set_alias(&mut self.display.model_aliases, model, value);
            }
            ["display", "provider_aliases", provider] => {
                set_alias(&mut self.display.provider_aliases, provider, value);
            }
            ["table", "hide_flagged"] => {
                self.table.hide_flagged = parse_value(key, value, "true or false")?;
            }
            ["table", "allowed_statuses"] => {
                let statuses = parse_statuses(value.split(',').map(str::trim).filter(|s| !s.is_empty()))
                    .map_err(|_| invalid(key, value, "comma-separated lifecycle statuses"))?;
                let mut names: Vec<String> = statuses.iter().map(|s| s.to_string()).collect();
                names.sort();
                self.table.allowed_statuses = names;
            }
            ["density", "bandwidth"] => {
                let bandwidth: f64 = parse_value(key, value, "positive number")?;
                if !(bandwidth > 0.0 && bandwidth.is_finite()) {
                    return Err(invalid(key, value, "positive number"));
                }
                self.density.bandwidth = bandwidth;
            }
            ["density", "display_ceiling"] => {
                let ceiling: f64 = parse_value(key, value, "positive number")?;
                if !(ceiling > 0.0) {
                    return Err(invalid(key, value, "positive number"));
                }
                self.density.display_ceiling = ceiling;
            }
            ["density", "points"] => {
                let points: usize = parse_value(key, value, "integer of at least 2")?;
                if points < 2 {
                    return Err(invalid(key, value, "integer of at least 2"));
                }
                self.density.points = points;
            }
            ["output", "default_format"] => {
                if !["json", "human", "csv"].contains(&value) {
                    return Err(invalid(key, value, "json, human, or csv"));
                }
                self.output.default_format = value.to_string();
            }
            ["output", "pretty"] => {
                self.output.pretty = parse_value(key, value, "true or false")?;
            }
            ["output", "color"] => {
                self.output.color = parse_value(key, value, "true or false")?;
            }
            _ => {
                return Err(ConfigError::UnknownKey(key.to_string()));
            }
        }

        Ok(())
    }

    /// List all configuration keys with their current values
    pub fn list(&self) -> Vec<(String, String)> {
        let mut keys: Vec<String> = [
            "pipeline.default_days",
            "pipeline.max_days",
            "pipeline.alignment",
            "pipeline.nearest_tolerance_minutes",
            "pipeline.timeout_seconds",
            "display.registry_path",
            "display.registry_ttl_seconds",
            "display.registry_timeout_ms",
            "table.hide_flagged",
            "table.allowed_statuses",
            "density.bandwidth",
            "density.display_ceiling",
            "density.points",
            "output.default_format",
            "output.pretty",
            "output.color",
        ]
        .iter()
        .map(|k| k.to_string())
        .collect();
        keys.extend(
            self.display
                .model_aliases
                .keys()
                .map(|m| format!("display.model_aliases.{}", m)),
        );
        keys.extend(
            self.display
                .provider_aliases
                .keys()
                .map(|p| format!("display.provider_aliases.{}", p)),
        );

        keys.into_iter()
            .filter_map(|key| self.get(&key).map(|value| (key, value)))
            .collect()
    }

    // =========================================================================
    // Typed views for the pipeline
    // =========================================================================

    /// Requested window capped at `pipeline.max_days`
    pub fn effective_days(&self, requested: Option<u32>) -> u32 {
        let days = requested.unwrap_or(self.pipeline.default_days);
        if days > self.pipeline.max_days {
            tracing::warn!(
                "Requested {} days, capped at {}",
                days,
                self.pipeline.max_days
            );
            return self.pipeline.max_days;
        }
        days
    }

    pub fn alignment_policy(&self) -> AlignmentPolicy {
        match self.pipeline.alignment.as_str() {
            "nearest" => AlignmentPolicy::NearestTimestamp {
                tolerance: chrono::Duration::minutes(self.pipeline.nearest_tolerance_minutes),
            },
            _ => AlignmentPolicy::Resample,
        }
    }

    pub fn table_filter(&self) -> Result<TableFilter, ConfigError> {
        let allowed_statuses = if self.table.allowed_statuses.is_empty() {
            None
        } else {
            let statuses = parse_statuses(self.table.allowed_statuses.iter().map(String::as_str))
                .map_err(|bad| {
                    invalid("table.allowed_statuses", &bad, "lifecycle status")
                })?;
            Some(statuses)
        };
        Ok(TableFilter {
            allowed_statuses,
            hide_flagged: self.table.hide_flagged,
        })
    }

    pub fn density_config(&self) -> DensityConfig {
        DensityConfig {
            bandwidth: self.density.bandwidth,
            display_ceiling: self.density.display_ceiling,
            points: self.density.points,
        }
    }

    pub fn registry_cache_config(&self) -> RegistryCacheConfig {
        RegistryCacheConfig {
            ttl: Duration::from_secs(self.display.registry_ttl_seconds),
            refresh_timeout: Duration::from_millis(self.display.registry_timeout_ms),
            ..RegistryCacheConfig::default()
        }
    }

    /// Built-in display table overlaid with configured aliases
    pub fn static_table(&self) -> StaticDisplayTable {
        let mut table = StaticDisplayTable::builtin();
        table.extend(&self.display.model_aliases);
        table
    }

    pub fn provider_aliases(&self) -> ProviderAliases {
        ProviderAliases::from_config(&self.display.provider_aliases)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.pipeline.timeout_seconds)
    }
}

fn invalid(key: &str, value: &str, expected: &str) -> ConfigError {
    ConfigError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
        expected: expected.to_string(),
    }
}

fn parse_value<T: std::str::FromStr>(key: &str, value: &str, expected: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| invalid(key, value, expected))
}

/// Empty value removes the alias
fn set_alias(aliases: &mut BTreeMap<String, String>, from: &str, to: &str) {
    if to.trim().is_empty() {
        aliases.remove(from);
    } else {
        aliases.insert(from.to_string(), to.trim().to_string());
    }
}

/// Parse status names, returning the first unknown one on failure
fn parse_statuses<'a>(
    names: impl IntoIterator<Item = &'a str>,
) -> Result<HashSet<LifecycleStatus>, String> {
    names
        .into_iter()
        .map(|name| name.parse::<LifecycleStatus>().map_err(|_| name.to_string()))
        .collect()
}

// =============================================================================
// Errors
// =============================================================================

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Unknown configuration key: {0}")]
    UnknownKey(String),

    #[error("Invalid value for {key}: '{value}' (expected {expected})")]
    InvalidValue {
        key: String,
        value: String,
        expected: String,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

// =============================================================================
// Tests
// =============================================================================
