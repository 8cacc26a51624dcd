//! Environment-backed configuration.
//!
//! Every setting has a default except the database API key. Override with
//! `NUTRIMATCH_*` environment variables.

pub mod error;


pub use error::ConfigError;

use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::lookup::cache::DEFAULT_SWEEP_INTERVAL;
use crate::lookup::fdc::{
    FdcConfig, DEFAULT_BASE_URL, DEFAULT_BURST, DEFAULT_REQUESTS_PER_HOUR, DEFAULT_TIMEOUT,
};
use crate::lookup::matching::{MatchConfig, DEFAULT_FUZZY_EDIT_DISTANCE, DEFAULT_MIN_CONFIDENCE};
use crate::lookup::service::{ServiceConfig, DEFAULT_CACHE_TTL};

/// Where lookup results are cached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheBackend {
    Memory,
    Sqlite,
}

impl FromStr for CacheBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "memory" => Ok(CacheBackend::Memory),
            "sqlite" => Ok(CacheBackend::Sqlite),
            other => Err(format!("unknown cache backend '{other}' (expected memory or sqlite)")),
        }
    }
}

/// Engine configuration loaded from environment variables.
///
/// Use [`Config::from_env`] to read `NUTRIMATCH_*` overrides on top of defaults.
#[derive(Debug, Clone)]
pub struct Config {
    /// FoodData Central API key. Required to build the live client.
    pub fdc_api_key: Option<String>,

    /// Default: `https://api.nal.usda.gov/fdc`.
    pub fdc_base_url: String,

    /// Lifetime of cached lookups. Default: 30 days.
    pub cache_ttl: Duration,

    /// Default: in-memory.
    pub cache_backend: CacheBackend,

    /// Database file for the sqlite backend.
    pub cache_path: Option<PathBuf>,

    /// Interval of the expired-entry sweep. Default: 10 minutes.
    pub cache_sweep_interval: Duration,

    /// Matches scoring below this are reported as low confidence. Must lie in
    /// `(0, 100]`. Default: `40`.
    pub min_confidence: f64,

    /// Default: `true`.
    pub fuzzy_enabled: bool,

    /// Maximum edit distance of a fuzzy token match. Default: `1`.
    pub fuzzy_edit_distance: usize,

    /// Sustained outbound request quota. Default: `1000`.
    pub requests_per_hour: u32,

    /// Requests allowed back to back before throttling. Default: `10`.
    pub burst: u32,

    /// Per-request HTTP timeout. Default: 30 seconds.
    pub http_timeout: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            fdc_api_key: None,
            fdc_base_url: DEFAULT_BASE_URL.to_string(),
            cache_ttl: DEFAULT_CACHE_TTL,
            cache_backend: CacheBackend::Memory,
            cache_path: None,
            cache_sweep_interval: DEFAULT_SWEEP_INTERVAL,
            min_confidence: DEFAULT_MIN_CONFIDENCE,
            fuzzy_enabled: true,
            fuzzy_edit_distance: DEFAULT_FUZZY_EDIT_DISTANCE,
            requests_per_hour: DEFAULT_REQUESTS_PER_HOUR,
            burst: DEFAULT_BURST,
            http_timeout: DEFAULT_TIMEOUT,
        }
    }
}

impl Config {
    const ENV_FDC_API_KEY: &'static str = "NUTRIMATCH_FDC_API_KEY";
    const ENV_FDC_BASE_URL: &'static str = "NUTRIMATCH_FDC_BASE_URL";
    const ENV_CACHE_TTL_SECS: &'static str = "NUTRIMATCH_CACHE_TTL_SECS";
    const ENV_CACHE_BACKEND: &'static str = "NUTRIMATCH_CACHE_BACKEND";
    const ENV_CACHE_PATH: &'static str = "NUTRIMATCH_CACHE_PATH";
    const ENV_CACHE_SWEEP_SECS: &'static str = "NUTRIMATCH_CACHE_SWEEP_SECS";
    const ENV_MIN_CONFIDENCE: &'static str = "NUTRIMATCH_MIN_CONFIDENCE";
    const ENV_FUZZY: &'static str = "NUTRIMATCH_FUZZY";
    const ENV_FUZZY_DISTANCE: &'static str = "NUTRIMATCH_FUZZY_DISTANCE";
    const ENV_REQUESTS_PER_HOUR: &'static str = "NUTRIMATCH_REQUESTS_PER_HOUR";
    const ENV_BURST: &'static str = "NUTRIMATCH_BURST";
    const ENV_HTTP_TIMEOUT_SECS: &'static str = "NUTRIMATCH_HTTP_TIMEOUT_SECS";

    /// Loads configuration from environment variables (falling back to defaults).
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        Ok(Self {
            fdc_api_key: Self::parse_optional_string_from_env(Self::ENV_FDC_API_KEY),
            fdc_base_url: Self::parse_optional_string_from_env(Self::ENV_FDC_BASE_URL)
                .unwrap_or(defaults.fdc_base_url),
            cache_ttl: Self::parse_secs_from_env(Self::ENV_CACHE_TTL_SECS, defaults.cache_ttl)?,
            cache_backend: Self::parse_from_env(Self::ENV_CACHE_BACKEND, defaults.cache_backend)?,
            cache_path: Self::parse_optional_string_from_env(Self::ENV_CACHE_PATH)
                .map(PathBuf::from),
            cache_sweep_interval: Self::parse_secs_from_env(
                Self::ENV_CACHE_SWEEP_SECS,
                defaults.cache_sweep_interval,
            )?,
            min_confidence: Self::parse_from_env(Self::ENV_MIN_CONFIDENCE, defaults.min_confidence)?,
            fuzzy_enabled: Self::parse_bool_from_env(Self::ENV_FUZZY, defaults.fuzzy_enabled)?,
            fuzzy_edit_distance: Self::parse_from_env(
                Self::ENV_FUZZY_DISTANCE,
                defaults.fuzzy_edit_distance,
            )?,
            requests_per_hour: Self::parse_from_env(
                Self::ENV_REQUESTS_PER_HOUR,
                defaults.requests_per_hour,
            )?,
            burst: Self::parse_from_env(Self::ENV_BURST, defaults.burst)?,
            http_timeout: Self::parse_secs_from_env(
                Self::ENV_HTTP_TIMEOUT_SECS,
                defaults.http_timeout,
            )?,
        })
    }

    /// Checks value ranges and backend requirements (does not touch the network).
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.min_confidence > 0.0 && self.min_confidence <= 100.0) {
            return Err(ConfigError::ConfidenceOutOfRange {
                value: self.min_confidence,
            });
        }
        if self.requests_per_hour == 0 {
            return Err(ConfigError::NotPositive {
                name: Self::ENV_REQUESTS_PER_HOUR,
            });
        }
        if self.burst == 0 {
            return Err(ConfigError::NotPositive {
                name: Self::ENV_BURST,
            });
        }
        if self.cache_sweep_interval.is_zero() {
            return Err(ConfigError::NotPositive {
                name: Self::ENV_CACHE_SWEEP_SECS,
            });
        }

        if self.cache_backend == CacheBackend::Sqlite {
            let path = self.cache_path.as_ref().ok_or(ConfigError::MissingCachePath)?;
            if path.is_dir() {
                return Err(ConfigError::NotAFile { path: path.clone() });
            }
        }

        Ok(())
    }

    /// Client settings; fails when no API key is configured.
    pub fn fdc_config(&self) -> Result<FdcConfig, ConfigError> {
        let api_key = self
            .fdc_api_key
            .clone()
            .ok_or(ConfigError::MissingEnvVar {
                name: Self::ENV_FDC_API_KEY,
            })?;

        let mut fdc = FdcConfig::new(api_key).with_base_url(self.fdc_base_url.clone());
        fdc.timeout = self.http_timeout;
        fdc.requests_per_hour = self.requests_per_hour;
        fdc.burst = self.burst;
        Ok(fdc)
    }

    pub fn service_config(&self) -> ServiceConfig {
        ServiceConfig {
            cache_ttl: self.cache_ttl,
            matching: MatchConfig {
                min_confidence: self.min_confidence,
                fuzzy_enabled: self.fuzzy_enabled,
                fuzzy_edit_distance: self.fuzzy_edit_distance,
            },
        }
    }

    fn parse_optional_string_from_env(var_name: &str) -> Option<String> {
        env::var(var_name)
            .ok()
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn parse_from_env<T>(var_name: &'static str, default: T) -> Result<T, ConfigError>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        match Self::parse_optional_string_from_env(var_name) {
            Some(value) => value.parse().map_err(|e: T::Err| ConfigError::InvalidValue {
                name: var_name,
                reason: e.to_string(),
                value,
            }),
            None => Ok(default),
        }
    }

    fn parse_secs_from_env(var_name: &'static str, default: Duration) -> Result<Duration, ConfigError> {
        Self::parse_from_env::<u64>(var_name, default.as_secs()).map(Duration::from_secs)
    }

    fn parse_bool_from_env(var_name: &'static str, default: bool) -> Result<bool, ConfigError> {
        match Self::parse_optional_string_from_env(var_name) {
            Some(value) => match value.to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => Ok(true),
                "0" | "false" | "no" | "off" => Ok(false),
                _ => Err(ConfigError::InvalidValue {
                    name: var_name,
                    value,
                    reason: "expected true or false".into(),
                }),
            },
            None => Ok(default),
        }
    }
}
