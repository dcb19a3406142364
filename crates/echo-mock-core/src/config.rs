//! Mock configuration.
//!
//! Configuration can be loaded from:
//! - The file named by `ECHO_MOCK_CONFIG`
//! - `echo-mock.toml` in the working directory
//! - `~/.config/echo-mock/echo-mock.toml`
//!
//! ```toml
//! [subscription_ids]
//! strategy = "random"   # or "sequential"
//! upper_bound = 1000
//! seed = 42
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

/// Environment variable naming a configuration file.
pub const CONFIG_ENV: &str = "ECHO_MOCK_CONFIG";

/// Default exclusive upper bound for random subscription ids.
pub const DEFAULT_ID_UPPER_BOUND: u32 = 1000;

const CONFIG_PATHS: [&str; 2] = ["echo-mock.toml", "~/.config/echo-mock/echo-mock.toml"];

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("Failed to read config file {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The configuration could not be parsed.
    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    /// Random ids need a non-empty range.
    #[error("subscription_ids.upper_bound must be greater than zero")]
    InvalidUpperBound,
}

/// How subscription ids are assigned to joining members.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IdStrategy {
    /// Uniform in `0..upper_bound`, collisions possible.
    #[default]
    Random,
    /// Counting up from zero.
    Sequential,
}

/// Subscription id configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionIdConfig {
    /// Assignment strategy.
    #[serde(default)]
    pub strategy: IdStrategy,

    /// Exclusive upper bound for random ids.
    #[serde(default = "default_upper_bound")]
    pub upper_bound: u32,

    /// Seed for reproducible random ids.
    #[serde(default)]
    pub seed: Option<u64>,
}

/// Registry configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryConfig {
    /// Subscription id assignment for presence channels.
    #[serde(default)]
    pub subscription_ids: SubscriptionIdConfig,
}

fn default_upper_bound() -> u32 {
    DEFAULT_ID_UPPER_BOUND
}

impl Default for SubscriptionIdConfig {
    fn default() -> Self {
        Self {
            strategy: IdStrategy::Random,
            upper_bound: default_upper_bound(),
            seed: None,
        }
    }
}

impl RegistryConfig {
    /// Load configuration from the environment, the default paths, or defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if a config file exists but cannot be read or parsed.
    pub fn load() -> Result<Self, ConfigError> {
        if let Ok(path) = std::env::var(CONFIG_ENV) {
            let expanded = shellexpand::tilde(&path);
            return Self::from_file(expanded.as_ref());
        }

        for path in &CONFIG_PATHS {
            let expanded = shellexpand::tilde(path);
            if Path::new(expanded.as_ref()).exists() {
                return Self::from_file(expanded.as_ref());
            }
        }

        Ok(Self::default())
    }

    /// Load configuration from a specific file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed or validated.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        debug!(path = %path.display(), "Loading config file");
        Self::from_toml_str(&contents)
    }

    /// Parse configuration from TOML.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML is malformed or fails validation.
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        let config: RegistryConfig = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Check that the configuration is usable.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidUpperBound`] for an empty random id range.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let ids = &self.subscription_ids;
        if ids.strategy == IdStrategy::Random && ids.upper_bound == 0 {
            return Err(ConfigError::InvalidUpperBound);
        }
        Ok(())
    }
}
