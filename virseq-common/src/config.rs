//! Configuration loading and config-file resolution
//!
//! Config file resolution priority:
//! 1. Command-line argument (highest priority)
//! 2. `VIRSEQ_CONFIG` environment variable
//! 3. `<user config dir>/virseq/config.toml`
//! 4. Built-in defaults (fallback)
//!
//! Every field carries a serde default, so a partial file only overrides what
//! it names.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Environment variable naming an explicit config file
pub const CONFIG_ENV_VAR: &str = "VIRSEQ_CONFIG";

/// Top-level TOML configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TomlConfig {
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub assembly: AssemblyConfig,
    #[serde(default)]
    pub naming: NamingConfig,
    #[serde(default)]
    pub search: SearchConfig,
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error); RUST_LOG wins when set
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

/// Consensus assembly settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssemblyConfig {
    /// Phred threshold for end trimming
    #[serde(default = "default_quality_threshold")]
    pub quality_threshold: u8,

    /// Virus type selecting builtin primers ("Hanta", "Corona", "Paramyxo", "Flavi", "Other")
    #[serde(default = "default_virus_type")]
    pub virus_type: String,

    /// Upper bound on aligner DP cells before falling back to a degraded score
    #[serde(default = "default_max_alignment_cells")]
    pub max_alignment_cells: usize,

    #[serde(default)]
    pub trimming: TrimmingConfig,
}

impl Default for AssemblyConfig {
    fn default() -> Self {
        Self {
            quality_threshold: default_quality_threshold(),
            virus_type: default_virus_type(),
            max_alignment_cells: default_max_alignment_cells(),
            trimming: TrimmingConfig::default(),
        }
    }
}

/// Primer trimming settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrimmingConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub custom_start: Option<String>,
    #[serde(default)]
    pub custom_end: Option<String>,
}

impl Default for TrimmingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            custom_start: None,
            custom_end: None,
        }
    }
}

/// How forward/reverse markers are embedded in read file names
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatternStyle {
    /// `SAMPLE-F`, `SAMPLE_R`
    #[default]
    Standard,
    /// Virus name before the marker: `SAMPLE-hanta_F`
    VirusSuffix,
    /// Marker glued to the virus name: `SAMPLE-FHanta`
    VirusEmbedded,
    /// Caller-supplied forward/reverse marker strings
    Custom,
}

/// File-name parsing settings for the read source
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NamingConfig {
    #[serde(default)]
    pub style: PatternStyle,
    #[serde(default = "default_forward_marker")]
    pub forward_marker: String,
    #[serde(default = "default_reverse_marker")]
    pub reverse_marker: String,
    /// Regex stripping instrument suffixes such as `_A01_01_RapidSeq50`
    #[serde(default = "default_suffix_pattern")]
    pub suffix_pattern: Option<String>,
}

impl Default for NamingConfig {
    fn default() -> Self {
        Self {
            style: PatternStyle::default(),
            forward_marker: default_forward_marker(),
            reverse_marker: default_reverse_marker(),
            suffix_pattern: default_suffix_pattern(),
        }
    }
}

/// Search program selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchProgram {
    /// Megablast, efficient for mixed batches
    #[default]
    Auto,
    Blastn,
    Megablast,
    Blastx,
}

/// Target corpus restriction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchMode {
    /// Restrict to `viruses[organism]`
    #[default]
    Viruses,
    All,
}

/// Remote search orchestration settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchConfig {
    #[serde(default)]
    pub program: SearchProgram,
    #[serde(default)]
    pub mode: SearchMode,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_initial_retry_delay_secs")]
    pub initial_retry_delay_secs: u64,
    /// Timeout applied to each remote call attempt
    #[serde(default = "default_attempt_timeout_secs")]
    pub attempt_timeout_secs: u64,
    #[serde(default = "default_hitlist_size")]
    pub hitlist_size: usize,
    #[serde(default = "default_expect")]
    pub expect: f64,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    /// Minimum spacing between any two requests to the service
    #[serde(default = "default_request_interval_secs")]
    pub request_interval_secs: u64,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            program: SearchProgram::default(),
            mode: SearchMode::default(),
            batch_size: default_batch_size(),
            max_concurrent: default_max_concurrent(),
            max_retries: default_max_retries(),
            initial_retry_delay_secs: default_initial_retry_delay_secs(),
            attempt_timeout_secs: default_attempt_timeout_secs(),
            hitlist_size: default_hitlist_size(),
            expect: default_expect(),
            base_url: default_base_url(),
            poll_interval_secs: default_poll_interval_secs(),
            request_interval_secs: default_request_interval_secs(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_quality_threshold() -> u8 {
    20
}

fn default_virus_type() -> String {
    "Other".to_string()
}

fn default_max_alignment_cells() -> usize {
    64_000_000
}

fn default_true() -> bool {
    true
}

fn default_forward_marker() -> String {
    "-F".to_string()
}

fn default_reverse_marker() -> String {
    "-R".to_string()
}

fn default_suffix_pattern() -> Option<String> {
    Some(r"_[A-Z]\d+.*$".to_string())
}

fn default_batch_size() -> usize {
    5
}

fn default_max_concurrent() -> usize {
    2
}

fn default_max_retries() -> u32 {
    3
}

fn default_initial_retry_delay_secs() -> u64 {
    5
}

fn default_attempt_timeout_secs() -> u64 {
    900
}

fn default_hitlist_size() -> usize {
    10
}

fn default_expect() -> f64 {
    10.0
}

fn default_base_url() -> String {
    "https://blast.ncbi.nlm.nih.gov/Blast.cgi".to_string()
}

fn default_poll_interval_secs() -> u64 {
    10
}

fn default_request_interval_secs() -> u64 {
    3
}

/// Resolve which config file to read, if any
///
/// Returns the path plus whether it was requested explicitly (CLI or ENV).
/// An explicit path must exist; the default location is optional.
pub fn resolve_config_path(cli_arg: Option<&Path>) -> Option<(PathBuf, bool)> {
    // Priority 1: Command-line argument
    if let Some(path) = cli_arg {
        return Some((path.to_path_buf(), true));
    }

    // Priority 2: Environment variable
    if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
        if !path.trim().is_empty() {
            return Some((PathBuf::from(path), true));
        }
    }

    // Priority 3: user config directory
    default_config_path().map(|p| (p, false))
}

/// `<config dir>/virseq/config.toml` for the current platform
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("virseq").join("config.toml"))
}

/// Load configuration following the resolution priority
pub fn load_config(cli_arg: Option<&Path>) -> Result<TomlConfig> {
    match resolve_config_path(cli_arg) {
        Some((path, explicit)) => {
            if path.exists() {
                let config = load_toml_config(&path)?;
                info!("Configuration loaded from {}", path.display());
                Ok(config)
            } else if explicit {
                Err(Error::Config(format!(
                    "Config file not found: {}",
                    path.display()
                )))
            } else {
                debug!(
                    "No config file at {}, using built-in defaults",
                    path.display()
                );
                Ok(TomlConfig::default())
            }
        }
        None => Ok(TomlConfig::default()),
    }
}

/// Parse a TOML config file
pub fn load_toml_config(path: &Path) -> Result<TomlConfig> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("Read TOML failed ({}): {}", path.display(), e)))?;
    toml::from_str(&content)
        .map_err(|e| Error::Config(format!("Parse TOML failed ({}): {}", path.display(), e)))
}

/// Write a TOML config file atomically (temp file + rename)
pub fn write_toml_config(config: &TomlConfig, path: &Path) -> Result<()> {
    let content = toml::to_string_pretty(config)
        .map_err(|e| Error::Config(format!("Serialize TOML failed: {}", e)))?;

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let tmp_path = path.with_extension("toml.tmp");
    std::fs::write(&tmp_path, content)?;
    std::fs::rename(&tmp_path, path)?;
    Ok(())
}
