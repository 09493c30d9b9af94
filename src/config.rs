//! Configuration loading helpers.

use std::env;
use std::fs;
use std::path::Path;

use serde::Deserialize;

use crate::ahi::AhiConfig;
use crate::buf::BufferPoolConfig;

const ENV_PREFIX: &str = "OXIAHI__";

/// Errors returned by configuration loading.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// I/O error while reading config files.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    /// TOML parse error.
    #[error("toml parse error: {0}")]
    Toml(#[from] toml::de::Error),
    /// Invalid value for a key.
    #[error("invalid value for {key}: {value}")]
    InvalidValue {
        /// Configuration key.
        key: String,
        /// Raw value string.
        value: String,
    },
    /// Unknown configuration key.
    #[error("unknown config key: {0}")]
    UnknownKey(String),
    /// Missing required configuration field.
    #[error("missing required field: {0}")]
    MissingField(String),
}

/// Top-level configuration schema.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OxiahiConfig {
    /// Adaptive hash index configuration.
    pub ahi: Option<AhiConfigSpec>,
    /// Buffer pool configuration.
    pub buffer_pool: Option<BufferPoolConfigSpec>,
}

impl OxiahiConfig {
    /// Load configuration from a TOML file.
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path)?;
        Ok(toml::from_str(&contents)?)
    }

    /// Load configuration from the `OXIAHI_CONFIG` env var (if set),
    /// then apply `OXIAHI__section__field` overrides.
    pub fn load_from_env() -> Result<Self, ConfigError> {
        let mut config = match env::var("OXIAHI_CONFIG").ok() {
            Some(path) => Self::load_from_path(path)?,
            None => Self::default(),
        };
        config.apply_env_overrides()?;
        Ok(config)
    }

    /// Apply environment overrides in-place.
    pub fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        for (key, value) in env::vars() {
            let Some(path) = key.strip_prefix(ENV_PREFIX) else {
                continue;
            };
            let path = path.to_ascii_lowercase();
            let parts: Vec<&str> = path.split("__").collect();
            let value = value.trim();

            match parts.as_slice() {
                ["ahi", "enabled"] => {
                    self.ahi_mut().enabled = Some(parse_value(&key, value)?);
                }
                ["ahi", "hash_size"] => {
                    self.ahi_mut().hash_size = Some(parse_value(&key, value)?);
                }
                ["ahi", "partitions"] => {
                    self.ahi_mut().partitions = Some(parse_value(&key, value)?);
                }
                ["ahi", "heap_block_nodes"] => {
                    self.ahi_mut().heap_block_nodes = Some(parse_value(&key, value)?);
                }
                ["buffer_pool", "blocks"] => {
                    self.buffer_pool_mut().blocks = Some(parse_value(&key, value)?);
                }
                ["buffer_pool", "page_capacity"] => {
                    self.buffer_pool_mut().page_capacity = Some(parse_value(&key, value)?);
                }
                _ => return Err(ConfigError::UnknownKey(key)),
            }
        }

        Ok(())
    }

    /// Build an `AhiConfig` using defaults plus overrides.
    pub fn to_ahi_config(&self) -> AhiConfig {
        let mut config = AhiConfig::default();
        if let Some(ahi) = &self.ahi {
            ahi.apply_to(&mut config);
        }
        config
    }

    /// Build a `BufferPoolConfig` using defaults plus overrides.
    pub fn to_buffer_pool_config(&self) -> BufferPoolConfig {
        let mut config = BufferPoolConfig::default();
        if let Some(pool) = &self.buffer_pool {
            pool.apply_to(&mut config);
        }
        config
    }

    /// Check the resolved configuration.
    ///
    /// A whole page must fit into one heap block, and pages must hold at
    /// least two records.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let ahi = self.to_ahi_config();
        let pool = self.to_buffer_pool_config();

        if ahi.partitions == 0 {
            return Err(invalid("ahi.partitions", ahi.partitions));
        }
        if ahi.hash_size < ahi.partitions as u64 {
            return Err(invalid("ahi.hash_size", ahi.hash_size));
        }
        if ahi.heap_block_nodes < pool.page_capacity {
            return Err(invalid("ahi.heap_block_nodes", ahi.heap_block_nodes));
        }
        if pool.blocks == 0 {
            return Err(invalid("buffer_pool.blocks", pool.blocks));
        }
        if pool.page_capacity < 2 {
            return Err(invalid("buffer_pool.page_capacity", pool.page_capacity));
        }
        Ok(())
    }

    fn ahi_mut(&mut self) -> &mut AhiConfigSpec {
        self.ahi.get_or_insert_with(AhiConfigSpec::default)
    }

    fn buffer_pool_mut(&mut self) -> &mut BufferPoolConfigSpec {
        self.buffer_pool.get_or_insert_with(BufferPoolConfigSpec::default)
    }
}

/// Adaptive hash index configuration overrides.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AhiConfigSpec {
    /// Whether the index starts enabled.
    pub enabled: Option<bool>,
    /// Total bucket count across all partitions.
    pub hash_size: Option<u64>,
    /// Number of partitions.
    pub partitions: Option<usize>,
    /// Hash nodes per heap block.
    pub heap_block_nodes: Option<usize>,
}

impl AhiConfigSpec {
    fn apply_to(&self, config: &mut AhiConfig) {
        if let Some(value) = self.enabled {
            config.enabled = value;
        }
        if let Some(value) = self.hash_size {
            config.hash_size = value;
        }
        if let Some(value) = self.partitions {
            config.partitions = value;
        }
        if let Some(value) = self.heap_block_nodes {
            config.heap_block_nodes = value;
        }
    }
}

/// Buffer pool configuration overrides.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BufferPoolConfigSpec {
    /// Number of block frames.
    pub blocks: Option<usize>,
    /// Maximum user records per page.
    pub page_capacity: Option<usize>,
}

impl BufferPoolConfigSpec {
    fn apply_to(&self, config: &mut BufferPoolConfig) {
        if let Some(value) = self.blocks {
            config.blocks = value;
        }
        if let Some(value) = self.page_capacity {
            config.page_capacity = value;
        }
    }
}

fn parse_value<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value.parse().map_err(|_| ConfigError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn invalid(key: &str, value: impl ToString) -> ConfigError {
    ConfigError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
    }
}
