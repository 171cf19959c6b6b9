//! Environment configuration for the CLI

use std::env;
use std::time::Duration;

use simulplay_core::{PositionUnit, SyncConfig};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid value for {name}: {reason}")]
    Invalid { name: String, reason: String },
}

/// Where and how to reach one remote player
#[derive(Debug, Clone)]
pub struct EndpointConfig {
    pub base_url: String,
    pub token: Option<String>,
    pub unit: PositionUnit,
}

/// One side of the pair
#[derive(Debug, Clone)]
pub struct PlayerConfig {
    /// Present only when running against real players
    pub endpoint: Option<EndpointConfig>,
    /// Item to load at startup
    pub item: Option<String>,
}

#[derive(Debug, Clone)]
pub struct CliConfig {
    pub video: PlayerConfig,
    pub audio: PlayerConfig,
    pub tick_interval: Option<Duration>,
    pub drift_threshold: Option<Duration>,
}

impl CliConfig {
    /// Load configuration from the process environment
    pub fn from_env(simulate: bool) -> Result<Self, ConfigError> {
        Self::from_lookup(simulate, |name| env::var(name).ok())
    }

    /// Load configuration through `lookup`; endpoints are required unless simulating
    pub fn from_lookup(simulate: bool, lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        Ok(Self {
            video: PlayerConfig::load("VIDEO", simulate, PositionUnit::Seconds, &lookup)?,
            audio: PlayerConfig::load("AUDIO", simulate, PositionUnit::Millis, &lookup)?,
            tick_interval: parse_millis("SIMULPLAY_TICK_MS", &lookup)?,
            drift_threshold: parse_millis("SIMULPLAY_DRIFT_THRESHOLD_MS", &lookup)?,
        })
    }

    pub fn sync_config(&self) -> SyncConfig {
        let mut config = SyncConfig::default();
        if let Some(interval) = self.tick_interval {
            config = config.with_tick_interval(interval);
        }
        if let Some(threshold) = self.drift_threshold {
            config = config.with_drift_threshold(threshold);
        }
        config
    }
}

impl PlayerConfig {
    fn load(
        side: &str,
        simulate: bool,
        default_unit: PositionUnit,
        lookup: &impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let item = lookup(&format!("SIMULPLAY_{side}_ITEM")).filter(|s| !s.trim().is_empty());
        if simulate {
            return Ok(Self { endpoint: None, item });
        }

        let url_var = format!("SIMULPLAY_{side}_URL");
        let base_url = lookup(&url_var).ok_or(ConfigError::MissingEnvVar(url_var))?;

        let unit_var = format!("SIMULPLAY_{side}_UNIT");
        let unit = match lookup(&unit_var) {
            Some(raw) => raw
                .parse()
                .map_err(|reason| ConfigError::Invalid { name: unit_var, reason })?,
            None => default_unit,
        };

        Ok(Self {
            endpoint: Some(EndpointConfig {
                base_url,
                token: lookup(&format!("SIMULPLAY_{side}_TOKEN")),
                unit,
            }),
            item,
        })
    }
}

fn parse_millis(name: &str, lookup: &impl Fn(&str) -> Option<String>) -> Result<Option<Duration>, ConfigError> {
    lookup(name)
        .map(|raw| {
            raw.trim()
                .parse::<u64>()
                .map(Duration::from_millis)
                .map_err(|e| ConfigError::Invalid {
                    name: name.to_string(),
                    reason: e.to_string(),
                })
        })
        .transpose()
}
