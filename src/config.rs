//! Configuration management
//!
//! Handles loading and validating pipeline configuration from TOML files.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

/// Root configuration structure
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub pool: PoolConfig,
    #[serde(default)]
    pub split: SplitConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Frame pool configuration
#[derive(Debug, Clone, Deserialize)]
pub struct PoolConfig {
    /// Free-registry capacity reserved up front
    #[serde(default = "default_reserve_regions")]
    pub reserve_regions: usize,
}

/// Channel splitter configuration
#[derive(Debug, Clone, Deserialize)]
pub struct SplitConfig {
    /// Element counts below this run the serial path on the calling thread
    #[serde(default = "default_parallel_cutoff")]
    pub parallel_cutoff: usize,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Output format: "json" or "pretty"
    #[serde(default = "default_log_format")]
    pub format: String,
}

// Default value functions
fn default_reserve_regions() -> usize { 128 }
fn default_parallel_cutoff() -> usize { 4096 }
fn default_log_level() -> String { "info".to_string() }
fn default_log_format() -> String { "json".to_string() }

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            reserve_regions: default_reserve_regions(),
        }
    }
}

impl Default for SplitConfig {
    fn default() -> Self {
        Self {
            parallel_cutoff: default_parallel_cutoff(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;

        let config: Config = toml::from_str(&contents)
            .with_context(|| "Failed to parse config file")?;

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values
    fn validate(&self) -> Result<()> {
        match self.logging.format.as_str() {
            "json" | "pretty" => {}
            other => anyhow::bail!("unknown logging format: {}", other),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_from_empty_config() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.pool.reserve_regions, 128);
        assert_eq!(config.split.parallel_cutoff, 4096);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_partial_override() {
        let config: Config = toml::from_str(
            r#"
            [split]
            parallel_cutoff = 1024
            "#,
        )
        .unwrap();
        assert_eq!(config.split.parallel_cutoff, 1024);
        assert_eq!(config.pool.reserve_regions, 128);
    }

    #[test]
    fn test_bad_logging_format_rejected() {
        let config: Config = toml::from_str(
            r#"
            [logging]
            format = "xml"
            "#,
        )
        .unwrap();
        assert!(config.validate().is_err());
    }
}
