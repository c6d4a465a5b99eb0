use std::{env, num::NonZeroU32, path::PathBuf, time::Duration};
use thiserror::Error;

use super::persist::OutputColumns;

pub const API_KEY_VAR: &str = "GOOGLE_MAPS_API_KEY";
pub const ENDPOINT_VAR: &str = "DIRECTIONS_ENDPOINT";
pub const TIMEOUT_VAR: &str = "DIRECTIONS_TIMEOUT_SECS";
pub const RATE_VAR: &str = "DIRECTIONS_REQUESTS_PER_MINUTE";

pub const DEFAULT_ENDPOINT: &str = "https://maps.googleapis.com/maps/api/directions/json";
pub const DEFAULT_TIMEOUT_SECS: u64 = 15;

/// Per-request waypoint ceiling of the directions API.
pub const WAYPOINT_CEILING: usize = 25;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("API key not found. Please set the GOOGLE_MAPS_API_KEY environment variable.")]
    MissingApiKey,

    #[error("Invalid value for {name}: {value:?} ({reason})")]
    Invalid {
        name: &'static str,
        value: String,
        reason: String,
    },
}

/// Everything the directions provider needs, resolved once at startup.
#[derive(Debug, Clone)]
pub struct DirectionsConfig {
    pub api_key: String,
    pub endpoint: String,
    pub timeout: Duration,
    pub requests_per_minute: Option<NonZeroU32>,
}

impl DirectionsConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            endpoint: DEFAULT_ENDPOINT.to_string(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            requests_per_minute: None,
        }
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Builds the config from an arbitrary variable lookup, so tests never touch the
    /// process environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let api_key = lookup(API_KEY_VAR)
            .map(|key| key.trim().to_string())
            .filter(|key| !key.is_empty())
            .ok_or(ConfigError::MissingApiKey)?;

        let mut config = Self::new(api_key);

        if let Some(endpoint) = lookup(ENDPOINT_VAR).filter(|v| !v.trim().is_empty()) {
            config.endpoint = endpoint.trim().to_string();
        }

        if let Some(raw) = lookup(TIMEOUT_VAR) {
            let secs: u64 = raw.trim().parse().map_err(|e: std::num::ParseIntError| {
                ConfigError::Invalid {
                    name: TIMEOUT_VAR,
                    value: raw.clone(),
                    reason: e.to_string(),
                }
            })?;
            config.timeout = Duration::from_secs(secs);
        }

        if let Some(raw) = lookup(RATE_VAR) {
            let rate: u32 = raw.trim().parse().map_err(|e: std::num::ParseIntError| {
                ConfigError::Invalid {
                    name: RATE_VAR,
                    value: raw.clone(),
                    reason: e.to_string(),
                }
            })?;
            let rate = NonZeroU32::new(rate).ok_or_else(|| ConfigError::Invalid {
                name: RATE_VAR,
                value: raw.clone(),
                reason: "must be greater than zero".to_string(),
            })?;
            config.requests_per_minute = Some(rate);
        }

        Ok(config)
    }
}

/// Point-count validity policy applied to every decoded route.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PointFilter {
    pub min_exclusive: usize,
    pub max_exclusive: Option<usize>,
}

impl PointFilter {
    /// More than one point, no upper bound.
    pub fn lenient() -> Self {
        Self {
            min_exclusive: 1,
            max_exclusive: None,
        }
    }

    /// More than one point and fewer than the waypoint ceiling.
    pub fn strict() -> Self {
        Self {
            min_exclusive: 1,
            max_exclusive: Some(WAYPOINT_CEILING),
        }
    }

    /// Strict for identifier-bearing loads, lenient otherwise.
    pub fn for_records(has_ids: bool) -> Self {
        if has_ids {
            Self::strict()
        } else {
            Self::lenient()
        }
    }

    pub fn with_max(self, max_exclusive: Option<usize>) -> Self {
        Self {
            max_exclusive,
            ..self
        }
    }

    pub fn accepts(&self, points: usize) -> bool {
        points > self.min_exclusive && self.max_exclusive.map_or(true, |max| points < max)
    }
}

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    // Private so it can only be set through the non-zero check in `new`
    batch_size: usize,
    pub filter: PointFilter,
    pub output_dir: PathBuf,
    pub prefix: String,
    pub label: Option<String>,
    /// Table columns for every batch file; derived from the records when unset.
    pub columns: Option<OutputColumns>,
}

impl PipelineConfig {
    pub fn new(batch_size: usize, output_dir: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        if batch_size == 0 {
            return Err(ConfigError::Invalid {
                name: "batch_size",
                value: batch_size.to_string(),
                reason: "must be greater than zero".to_string(),
            });
        }
        Ok(Self {
            batch_size,
            filter: PointFilter::lenient(),
            output_dir: output_dir.into(),
            prefix: "trip_routes".to_string(),
            label: None,
            columns: None,
        })
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }
}
