//! Configuration for the metadata control plane
//!
//! Loaded from YAML, organised by section

use serde::{Deserialize, Serialize};

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetaplaneConfig {
    /// Cross-thread metadata cache
    #[serde(default)]
    pub cache: CacheConfig,
    /// Defaults applied to new tables
    #[serde(default)]
    pub tables: TableDefaults,
    /// Namespace interface cache
    #[serde(default)]
    pub namespaces: NamespaceConfig,
    /// Reserved database that user operations may not touch
    #[serde(default = "default_system_database")]
    pub system_database: String,
    /// Logging configuration
    #[serde(default)]
    pub log: LogConfig,
}

impl Default for MetaplaneConfig {
    fn default() -> Self {
        Self {
            cache: CacheConfig::default(),
            tables: TableDefaults::default(),
            namespaces: NamespaceConfig::default(),
            system_database: default_system_database(),
            log: LogConfig::default(),
        }
    }
}

impl MetaplaneConfig {
    /// Load configuration from YAML file
    pub fn from_file(path: impl AsRef<std::path::Path>) -> Result<Self, ConfigError> {
        let content =
            std::fs::read_to_string(path).map_err(|e| ConfigError::IoError(e.to_string()))?;
        Self::from_yaml(&content)
    }

    /// Load configuration from YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        serde_yaml::from_str(yaml).map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    /// Save configuration to YAML file
    pub fn to_file(&self, path: impl AsRef<std::path::Path>) -> Result<(), ConfigError> {
        let yaml =
            serde_yaml::to_string(self).map_err(|e| ConfigError::SerializeError(e.to_string()))?;
        std::fs::write(path, yaml).map_err(|e| ConfigError::IoError(e.to_string()))?;
        Ok(())
    }

    /// Merge with another config (other takes precedence)
    pub fn merge(&mut self, other: MetaplaneConfig) {
        self.cache.merge(other.cache);
        self.tables.merge(other.tables);
        self.namespaces.merge(other.namespaces);
        if !other.system_database.is_empty() {
            self.system_database = other.system_database;
        }
        self.log.merge(other.log);
    }
}

/// Which mirrors a mutation waits on before returning
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Propagation {
    /// Only the mirror of the thread running the barrier
    ///
    /// Reads after the barrier see the write only if the task stays on that
    /// thread, i.e. on a current-thread runtime.
    Local,
    /// Every mirror, so a read from any worker sees the write
    #[default]
    All,
}

/// Cross-thread cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Number of per-worker mirrors
    #[serde(default = "default_num_workers")]
    pub num_workers: usize,
    #[serde(default)]
    pub propagation: Propagation,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            num_workers: default_num_workers(),
            propagation: Propagation::default(),
        }
    }
}

impl CacheConfig {
    fn merge(&mut self, other: Self) {
        if other.num_workers > 0 {
            self.num_workers = other.num_workers;
        }
        self.propagation = other.propagation;
    }
}

/// Table defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableDefaults {
    /// Replica count when the caller supplies none
    #[serde(default = "default_replicas")]
    pub replicas: usize,
    /// Server tag used for default placement
    #[serde(default = "default_server_tag")]
    pub server_tag: String,
    /// Upper bound on shards per table
    #[serde(default = "default_max_shards")]
    pub max_shards: usize,
}

impl Default for TableDefaults {
    fn default() -> Self {
        Self {
            replicas: default_replicas(),
            server_tag: default_server_tag(),
            max_shards: default_max_shards(),
        }
    }
}

impl TableDefaults {
    fn merge(&mut self, other: Self) {
        if other.replicas > 0 {
            self.replicas = other.replicas;
        }
        if !other.server_tag.is_empty() {
            self.server_tag = other.server_tag;
        }
        if other.max_shards > 0 {
            self.max_shards = other.max_shards;
        }
    }
}

/// Namespace interface cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NamespaceConfig {
    /// Evict interfaces unused for this long (milliseconds)
    #[serde(default = "default_expiration_ms")]
    pub expiration_ms: u64,
}

impl Default for NamespaceConfig {
    fn default() -> Self {
        Self {
            expiration_ms: default_expiration_ms(),
        }
    }
}

impl NamespaceConfig {
    fn merge(&mut self, other: Self) {
        if other.expiration_ms > 0 {
            self.expiration_ms = other.expiration_ms;
        }
    }

    pub fn expiration(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.expiration_ms)
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl LogConfig {
    fn merge(&mut self, other: Self) {
        if !other.level.is_empty() {
            self.level = other.level;
        }
    }
}

// Default value functions

fn default_num_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

fn default_replicas() -> usize {
    1
}

fn default_server_tag() -> String {
    "default".to_string()
}

fn default_max_shards() -> usize {
    32
}

fn default_expiration_ms() -> u64 {
    60_000 // 1 minute
}

fn default_system_database() -> String {
    "system".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Configuration error
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    IoError(String),
    #[error("Parse error: {0}")]
    ParseError(String),
    #[error("Serialize error: {0}")]
    SerializeError(String),
}
