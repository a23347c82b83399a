//! Configuration model and hierarchical loader.
//!
//! Grounded on the teacher's `ConfigLoader`: defaults merged with a
//! project config file, then an optional local-override file, then
//! environment variables (highest priority), via `figment`.

use std::path::{Path, PathBuf};

use figment::providers::{Env, Format, Serialized, Yaml};
use figment::Figment;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid max_agents_per_org: {0}. Must be between 1 and 10000")]
    InvalidMaxAgents(u32),

    #[error("database path cannot be empty")]
    EmptyDatabasePath,

    #[error("invalid max_connections: {0}. Must be at least 1")]
    InvalidMaxConnections(u32),

    #[error("invalid log level: {0}. Must be one of: trace, debug, info, warn, error")]
    InvalidLogLevel(String),

    #[error("invalid scheduler tick interval: {0}s. Must be at least 1")]
    InvalidTickInterval(u64),

    #[error("failed to load configuration: {0}")]
    Load(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Json,
    Pretty,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
    pub log_dir: Option<PathBuf>,
    pub enable_stdout: bool,
    pub retention_days: u32,
    /// Path to the append-only audit trail (spec §10.6), distinct from
    /// the tracing output above.
    pub audit_log_path: PathBuf,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
            log_dir: None,
            enable_stdout: true,
            retention_days: 30,
            audit_log_path: PathBuf::from(".foreman/audit.log"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub path: String,
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: ".foreman/foreman.db".to_string(),
            max_connections: 10,
        }
    }
}

/// Scheduler tick cadence and grace defaults (spec §4.9).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    pub tick_interval_secs: u64,
    pub default_grace_period_minutes: u32,
    pub approval_sweep_interval_secs: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_interval_secs: 60,
            default_grace_period_minutes: 5,
            approval_sweep_interval_secs: 60,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ControlPlaneConfig {
    pub max_agents_per_org: u32,
    pub database: DatabaseConfig,
    pub logging: LoggingConfig,
    pub scheduler: SchedulerConfig,
}

impl Default for ControlPlaneConfig {
    fn default() -> Self {
        Self {
            max_agents_per_org: 100,
            database: DatabaseConfig::default(),
            logging: LoggingConfig::default(),
            scheduler: SchedulerConfig::default(),
        }
    }
}

pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration with hierarchical merging.
    ///
    /// Precedence (lowest to highest):
    /// 1. Programmatic defaults
    /// 2. `.foreman/config.yaml` (project config)
    /// 3. `.foreman/local.yaml` (optional local overrides)
    /// 4. Environment variables (`FOREMAN_` prefix, `__` nested separator)
    pub fn load() -> Result<ControlPlaneConfig, ConfigError> {
        let config: ControlPlaneConfig = Figment::new()
            .merge(Serialized::defaults(ControlPlaneConfig::default()))
            .merge(Yaml::file(".foreman/config.yaml"))
            .merge(Yaml::file(".foreman/local.yaml"))
            .merge(Env::prefixed("FOREMAN_").split("__"))
            .extract()
            .map_err(|e| ConfigError::Load(e.to_string()))?;

        Self::validate(&config)?;
        Ok(config)
    }

    pub fn load_from_file(path: impl AsRef<Path>) -> Result<ControlPlaneConfig, ConfigError> {
        let config: ControlPlaneConfig = Figment::new()
            .merge(Serialized::defaults(ControlPlaneConfig::default()))
            .merge(Yaml::file(path.as_ref()))
            .extract()
            .map_err(|e| ConfigError::Load(e.to_string()))?;

        Self::validate(&config)?;
        Ok(config)
    }

    pub fn validate(config: &ControlPlaneConfig) -> Result<(), ConfigError> {
        if config.max_agents_per_org == 0 || config.max_agents_per_org > 10_000 {
            return Err(ConfigError::InvalidMaxAgents(config.max_agents_per_org));
        }
        if config.database.path.is_empty() {
            return Err(ConfigError::EmptyDatabasePath);
        }
        if config.database.max_connections == 0 {
            return Err(ConfigError::InvalidMaxConnections(config.database.max_connections));
        }
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&config.logging.level.as_str()) {
            return Err(ConfigError::InvalidLogLevel(config.logging.level.clone()));
        }
        if config.scheduler.tick_interval_secs == 0 {
            return Err(ConfigError::InvalidTickInterval(config.scheduler.tick_interval_secs));
        }
        Ok(())
    }
}

impl Default for LogFormat {
    fn default() -> Self {
        Self::Pretty
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = ControlPlaneConfig {
            max_agents_per_org: 50,
            ..Default::default()
        };
        ConfigLoader::validate(&config).expect("default config should validate");
    }

    #[test]
    fn rejects_zero_max_agents() {
        let config = ControlPlaneConfig {
            max_agents_per_org: 0,
            ..Default::default()
        };
        assert!(matches!(
            ConfigLoader::validate(&config),
            Err(ConfigError::InvalidMaxAgents(0))
        ));
    }

    #[test]
    fn rejects_invalid_log_level() {
        let mut config = ControlPlaneConfig {
            max_agents_per_org: 10,
            ..Default::default()
        };
        config.logging.level = "verbose".to_string();
        assert!(matches!(
            ConfigLoader::validate(&config),
            Err(ConfigError::InvalidLogLevel(_))
        ));
    }

    #[test]
    fn yaml_overrides_merge_over_defaults() {
        let yaml = "max_agents_per_org: 75\nlogging:\n  level: debug\n";
        let config: ControlPlaneConfig = Figment::new()
            .merge(Serialized::defaults(ControlPlaneConfig::default()))
            .merge(figment::providers::Yaml::string(yaml))
            .extract()
            .unwrap();
        assert_eq!(config.max_agents_per_org, 75);
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.database.path, DatabaseConfig::default().path);
    }
}
