use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub mod defaults;
pub mod duration_serde;

use crate::errors::{AppError, AppResult};
use defaults::*;
use duration_serde::duration;

/// Top-level service configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub web: WebConfig,
    #[serde(default)]
    pub fetch: FetchConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub transform: TransformConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Upper bound on draining open connections after a shutdown signal
    #[serde(default = "default_shutdown_timeout", with = "duration")]
    pub shutdown_timeout: Duration,
}

/// Outbound fetch settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchConfig {
    #[serde(default = "default_connect_timeout", with = "duration")]
    pub connect_timeout: Duration,
    /// Whole-request deadline including the body transfer
    #[serde(default = "default_request_timeout", with = "duration")]
    pub request_timeout: Duration,
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Maximum number of previews kept on disk
    #[serde(default = "default_cache_capacity")]
    pub capacity: usize,
    /// Storage directory; a temporary one is allocated (and removed on exit) when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub directory: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransformConfig {
    #[serde(default = "default_jpeg_quality")]
    pub jpeg_quality: u8,
    /// Requests whose rendering needs more pixels than this fail instead of allocating
    #[serde(default = "default_max_output_pixels")]
    pub max_output_pixels: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub format: LogFormat,
}

/// Log output format
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

fn default_host() -> String {
    DEFAULT_HOST.to_string()
}
fn default_port() -> u16 {
    DEFAULT_PORT
}
fn default_shutdown_timeout() -> Duration {
    DEFAULT_SHUTDOWN_TIMEOUT
}
fn default_connect_timeout() -> Duration {
    DEFAULT_CONNECT_TIMEOUT
}
fn default_request_timeout() -> Duration {
    DEFAULT_REQUEST_TIMEOUT
}
fn default_max_body_bytes() -> u64 {
    DEFAULT_MAX_BODY_BYTES
}
fn default_cache_capacity() -> usize {
    DEFAULT_CACHE_CAPACITY
}
fn default_jpeg_quality() -> u8 {
    DEFAULT_JPEG_QUALITY
}
fn default_max_output_pixels() -> u64 {
    DEFAULT_MAX_OUTPUT_PIXELS
}
fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            shutdown_timeout: default_shutdown_timeout(),
        }
    }
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            connect_timeout: default_connect_timeout(),
            request_timeout: default_request_timeout(),
            max_body_bytes: default_max_body_bytes(),
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            capacity: default_cache_capacity(),
            directory: None,
        }
    }
}

impl Default for TransformConfig {
    fn default() -> Self {
        Self {
            jpeg_quality: default_jpeg_quality(),
            max_output_pixels: default_max_output_pixels(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

impl Config {
    /// Layered sources: built-in defaults, then the optional TOML file, then
    /// `IMAGE_PREVIEWER_*` environment variables (`__` separates sections).
    pub fn figment(config_file: Option<&Path>) -> Figment {
        let mut figment = Figment::from(Serialized::defaults(Config::default()));
        if let Some(path) = config_file {
            figment = figment.merge(Toml::file(path));
        }
        figment.merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    pub fn load(config_file: Option<&Path>) -> AppResult<Self> {
        if let Some(path) = config_file.filter(|path| !path.exists()) {
            return Err(AppError::configuration(format!(
                "config file not found: {}",
                path.display()
            )));
        }
        Self::from_figment(Self::figment(config_file))
    }

    pub fn from_figment(figment: Figment) -> AppResult<Self> {
        let config: Config = figment
            .extract()
            .map_err(|e| AppError::configuration(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> AppResult<()> {
        if self.cache.capacity == 0 {
            return Err(AppError::configuration("cache.capacity must be at least 1"));
        }
        if !(1..=100).contains(&self.transform.jpeg_quality) {
            return Err(AppError::configuration(
                "transform.jpeg_quality must be between 1 and 100",
            ));
        }
        if self.transform.max_output_pixels == 0 {
            return Err(AppError::configuration(
                "transform.max_output_pixels must be non-zero",
            ));
        }
        if self.fetch.connect_timeout.is_zero() || self.fetch.request_timeout.is_zero() {
            return Err(AppError::configuration("fetch timeouts must be non-zero"));
        }
        if self.fetch.max_body_bytes == 0 {
            return Err(AppError::configuration("fetch.max_body_bytes must be non-zero"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_matches_documented_defaults() {
        let config = Config::default();
        assert_eq!(config.web.port, 8081);
        assert_eq!(config.web.shutdown_timeout, Duration::from_secs(30));
        assert_eq!(config.fetch.connect_timeout, Duration::from_secs(25));
        assert_eq!(config.fetch.request_timeout, Duration::from_secs(25));
        assert_eq!(config.cache.capacity, 5);
        assert!(config.cache.directory.is_none());
        assert_eq!(config.transform.max_output_pixels, 40_000_000);
        assert_eq!(config.logging.format, LogFormat::Text);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_toml_overrides_defaults() {
        let figment = Figment::from(Serialized::defaults(Config::default())).merge(Toml::string(
            r#"
            [web]
            port = 9000

            [fetch]
            connect_timeout = "2s"
            request_timeout = 10

            [cache]
            capacity = 64
            directory = "/var/cache/previews"

            [logging]
            format = "json"
            "#,
        ));

        let config = Config::from_figment(figment).unwrap();
        assert_eq!(config.web.port, 9000);
        assert_eq!(config.web.host, DEFAULT_HOST);
        assert_eq!(config.fetch.connect_timeout, Duration::from_secs(2));
        assert_eq!(config.fetch.request_timeout, Duration::from_secs(10));
        assert_eq!(config.cache.capacity, 64);
        assert_eq!(
            config.cache.directory.as_deref(),
            Some(Path::new("/var/cache/previews"))
        );
        assert_eq!(config.logging.format, LogFormat::Json);
    }

    #[test]
    fn test_zero_capacity_is_rejected() {
        let figment = Figment::from(Serialized::defaults(Config::default()))
            .merge(Toml::string("[cache]\ncapacity = 0"));
        let err = Config::from_figment(figment).unwrap_err();
        assert!(err.to_string().contains("cache.capacity"));
    }

    #[test]
    fn test_out_of_range_quality_is_rejected() {
        let mut config = Config::default();
        config.transform.jpeg_quality = 0;
        assert!(config.validate().is_err());
        config.transform.jpeg_quality = 101;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_pixel_budget_is_configurable_and_must_be_non_zero() {
        let figment = Figment::from(Serialized::defaults(Config::default()))
            .merge(Toml::string("[transform]\nmax_output_pixels = 1000000"));
        let config = Config::from_figment(figment).unwrap();
        assert_eq!(config.transform.max_output_pixels, 1_000_000);

        let figment = Figment::from(Serialized::defaults(Config::default()))
            .merge(Toml::string("[transform]\nmax_output_pixels = 0"));
        let err = Config::from_figment(figment).unwrap_err();
        assert!(err.to_string().contains("max_output_pixels"));
    }

    #[test]
    fn test_missing_config_file_is_an_error() {
        let err = Config::load(Some(Path::new("/nonexistent/image-previewer.toml"))).unwrap_err();
        assert!(matches!(err, AppError::Configuration { .. }));
    }
}
