//! Worker configuration loading from file and environment variables.

use std::path::PathBuf;
use std::str::FromStr;

use parley_agents::improv::ImprovSettings;
use serde::Deserialize;
use thiserror::Error;

/// Top-level worker configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// Which agent this process hosts.
    #[serde(default)]
    pub agent: AgentConfig,

    /// Artifact and database settings.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Round bounds for the improv agent.
    #[serde(default)]
    pub improv: ImprovSettings,

    /// Replacement reference data files. Unset entries use the built-in data.
    #[serde(default)]
    pub reference: ReferenceConfig,
}

/// The agents a worker can host.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentDomain {
    #[default]
    Coffee,
    Improv,
    Sales,
    Grocery,
    Adventure,
    Fraud,
}

impl FromStr for AgentDomain {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "coffee" => Ok(Self::Coffee),
            "improv" => Ok(Self::Improv),
            "sales" => Ok(Self::Sales),
            "grocery" => Ok(Self::Grocery),
            "adventure" => Ok(Self::Adventure),
            "fraud" => Ok(Self::Fraud),
            other => Err(format!("unknown agent domain: {other}")),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AgentConfig {
    #[serde(default)]
    pub domain: AgentDomain,
}

/// Where terminal commits land for every agent except fraud, which always
/// writes its case row.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SinkKind {
    #[default]
    Json,
    Sqlite,
}

impl FromStr for SinkKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "sqlite" => Ok(Self::Sqlite),
            other => Err(format!("unknown sink: {other}")),
        }
    }
}

/// Storage configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    #[serde(default)]
    pub sink: SinkKind,

    /// Directory for JSON artifacts.
    #[serde(default = "default_artifacts_dir")]
    pub artifacts_dir: PathBuf,

    /// Path to the SQLite database file.
    #[serde(default = "default_db_path")]
    pub database_path: String,

    /// SQLite busy timeout in milliseconds.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,

    /// Maximum number of pooled connections.
    #[serde(default = "default_pool_max_size")]
    pub pool_max_size: u32,

    /// Insert a demo fraud case when the case table is empty.
    #[serde(default)]
    pub seed_demo_case: bool,
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter (e.g., "info", "debug", "parley_core=debug,info").
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Whether to output logs in JSON format.
    #[serde(default)]
    pub json: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ReferenceConfig {
    pub improv_scenarios: Option<PathBuf>,
    pub sales_faq: Option<PathBuf>,
    pub grocery_catalog: Option<PathBuf>,
    pub adventure_world: Option<PathBuf>,
}

fn default_artifacts_dir() -> PathBuf {
    PathBuf::from("artifacts")
}

fn default_db_path() -> String {
    "parley.db".to_string()
}

fn default_busy_timeout_ms() -> u64 {
    5_000
}

fn default_pool_max_size() -> u32 {
    8
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            sink: SinkKind::default(),
            artifacts_dir: default_artifacts_dir(),
            database_path: default_db_path(),
            busy_timeout_ms: default_busy_timeout_ms(),
            pool_max_size: default_pool_max_size(),
            seed_demo_case: false,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

/// Errors that can occur when loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read the configuration file.
    #[error("failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),

    /// Failed to parse the configuration file.
    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Loads configuration from a TOML file, falling back to defaults.
///
/// Environment variable overrides:
/// - `PARLEY_DOMAIN` overrides `agent.domain`
/// - `PARLEY_SINK` overrides `storage.sink`
/// - `PARLEY_ARTIFACTS_DIR` overrides `storage.artifacts_dir`
/// - `PARLEY_DB_PATH` overrides `storage.database_path`
/// - `PARLEY_LOG_LEVEL` overrides `logging.level`
/// - `PARLEY_LOG_JSON` overrides `logging.json` (set to "true" to enable)
///
/// # Errors
///
/// Returns `ConfigError` if the file exists but cannot be read or parsed.
pub fn load_config(path: Option<&str>) -> Result<Config, ConfigError> {
    let mut config = match path {
        Some(p) => match std::fs::read_to_string(p) {
            Ok(contents) => toml::from_str(&contents)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(path = p, "config file not found, using defaults");
                Config::default()
            }
            Err(e) => return Err(ConfigError::FileRead(e)),
        },
        None => Config::default(),
    };

    apply_overrides(&mut config, |key| std::env::var(key).ok());
    Ok(config)
}

/// Applies `PARLEY_*` overrides read through `lookup`. Unparseable values
/// are ignored with a warning.
fn apply_overrides(config: &mut Config, lookup: impl Fn(&str) -> Option<String>) {
    if let Some(domain) = lookup("PARLEY_DOMAIN") {
        match domain.parse() {
            Ok(parsed) => config.agent.domain = parsed,
            Err(err) => tracing::warn!(%err, "ignoring PARLEY_DOMAIN"),
        }
    }
    if let Some(sink) = lookup("PARLEY_SINK") {
        match sink.parse() {
            Ok(parsed) => config.storage.sink = parsed,
            Err(err) => tracing::warn!(%err, "ignoring PARLEY_SINK"),
        }
    }
    if let Some(dir) = lookup("PARLEY_ARTIFACTS_DIR") {
        config.storage.artifacts_dir = PathBuf::from(dir);
    }
    if let Some(db_path) = lookup("PARLEY_DB_PATH") {
        config.storage.database_path = db_path;
    }
    if let Some(level) = lookup("PARLEY_LOG_LEVEL") {
        config.logging.level = level;
    }
    if let Some(json) = lookup("PARLEY_LOG_JSON") {
        config.logging.json = json == "true" || json == "1";
    }
}
