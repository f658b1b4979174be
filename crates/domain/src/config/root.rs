use super::errors::ConfigError;
use super::fanout::FanoutConfig;
use super::logging::LoggingConfig;
use super::server::ServerConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Top-level configuration record, loaded from a TOML file.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub logging: LoggingConfig,

    pub fanout: FanoutConfig,
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|err| ConfigError::Read {
            path: path.display().to_string(),
            reason: err.to_string(),
        })?;
        toml::from_str(&raw).map_err(|err| ConfigError::Parse(err.to_string()))
    }

    pub fn validate(&mut self) -> Result<(), ConfigError> {
        self.fanout.validate()
    }
}
