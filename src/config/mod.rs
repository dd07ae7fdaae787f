//! Configuration management
//!
//! Loads and saves configuration from XDG-compliant paths.
//! Config location: ~/.config/guia-turistico/config.toml

pub mod defaults;

use crate::error::{Error, Result};
use defaults::*;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Geolocation provider settings
    #[serde(default)]
    pub geolocation: GeolocationConfig,

    /// Position gate settings
    #[serde(default)]
    pub position: PositionConfig,

    /// Reverse geocoding settings
    #[serde(default)]
    pub geocoder: GeocoderConfig,

    /// Address cache settings
    #[serde(default)]
    pub cache: CacheConfig,

    /// Server settings
    #[serde(default)]
    pub server: ServerConfig,

    /// Output settings
    #[serde(default)]
    pub output: OutputConfig,
}

/// Geolocation provider settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeolocationConfig {
    /// Provider used by `locate` when none is given ("ip" or "replay")
    #[serde(default = "default_provider")]
    pub provider: String,

    /// Ask for the most accurate fix available
    #[serde(default = "default_high_accuracy")]
    pub enable_high_accuracy: bool,

    /// Timeout for a single position request in milliseconds
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Maximum age of a cached fix in milliseconds
    #[serde(default = "default_maximum_age_ms")]
    pub maximum_age_ms: u64,
}

/// Position gate settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PositionConfig {
    /// Minimum movement in meters before a position is republished
    #[serde(default = "default_min_distance")]
    pub min_distance_meters: f64,

    /// Minimum time in milliseconds before a stationary position is republished
    #[serde(default = "default_min_interval")]
    pub min_interval_ms: i64,

    /// Reject fixes with a larger accuracy radius (0 disables)
    #[serde(default = "default_max_accuracy")]
    pub max_accuracy_meters: f64,
}

/// Reverse geocoding settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeocoderConfig {
    /// Reverse geocoding endpoint
    #[serde(default = "default_geocoder_url")]
    pub base_url: String,

    /// User-Agent header
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Accept-Language header
    #[serde(default = "default_accept_language")]
    pub accept_language: String,

    /// Proxy prefix used for one retry after a CORS/network failure (empty disables)
    #[serde(default)]
    pub cors_proxy: String,
}

/// Address cache settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_cache_enabled")]
    pub enabled: bool,

    /// Entry lifetime in seconds
    #[serde(default = "default_cache_ttl")]
    pub ttl_secs: u64,

    /// Maximum number of entries
    #[serde(default = "default_cache_max_entries")]
    pub max_entries: usize,

    /// Interval of the background sweep in seconds
    #[serde(default = "default_cache_cleanup_interval")]
    pub cleanup_interval_secs: u64,
}

/// Server settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Server host address
    #[serde(default = "default_host")]
    pub host: String,

    /// Server port
    #[serde(default = "default_port")]
    pub port: u16,
}

/// Output settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Default output format
    #[serde(default = "default_format")]
    pub format: String,
}

// Default value functions for serde
fn default_provider() -> String {
    DEFAULT_PROVIDER.to_string()
}
fn default_high_accuracy() -> bool {
    DEFAULT_HIGH_ACCURACY
}
fn default_timeout_ms() -> u64 {
    DEFAULT_TIMEOUT_MS
}
fn default_maximum_age_ms() -> u64 {
    DEFAULT_MAXIMUM_AGE_MS
}
fn default_min_distance() -> f64 {
    DEFAULT_MIN_DISTANCE_METERS
}
fn default_min_interval() -> i64 {
    DEFAULT_MIN_INTERVAL_MS
}
fn default_max_accuracy() -> f64 {
    DEFAULT_MAX_ACCURACY_METERS
}
fn default_geocoder_url() -> String {
    DEFAULT_GEOCODER_URL.to_string()
}
fn default_user_agent() -> String {
    DEFAULT_USER_AGENT.to_string()
}
fn default_accept_language() -> String {
    DEFAULT_ACCEPT_LANGUAGE.to_string()
}
fn default_cache_enabled() -> bool {
    DEFAULT_CACHE_ENABLED
}
fn default_cache_ttl() -> u64 {
    DEFAULT_CACHE_TTL_SECS
}
fn default_cache_max_entries() -> usize {
    DEFAULT_CACHE_MAX_ENTRIES
}
fn default_cache_cleanup_interval() -> u64 {
    DEFAULT_CACHE_CLEANUP_INTERVAL_SECS
}
fn default_host() -> String {
    DEFAULT_HOST.to_string()
}
fn default_port() -> u16 {
    DEFAULT_PORT
}
fn default_format() -> String {
    DEFAULT_FORMAT.to_string()
}

impl Default for GeolocationConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            enable_high_accuracy: default_high_accuracy(),
            timeout_ms: default_timeout_ms(),
            maximum_age_ms: default_maximum_age_ms(),
        }
    }
}

impl Default for PositionConfig {
    fn default() -> Self {
        Self {
            min_distance_meters: default_min_distance(),
            min_interval_ms: default_min_interval(),
            max_accuracy_meters: default_max_accuracy(),
        }
    }
}

impl Default for GeocoderConfig {
    fn default() -> Self {
        Self {
            base_url: default_geocoder_url(),
            user_agent: default_user_agent(),
            accept_language: default_accept_language(),
            cors_proxy: String::new(),
        }
    }
}

impl GeocoderConfig {
    /// The proxy prefix, if one is configured
    pub fn proxy(&self) -> Option<&str> {
        let proxy = self.cors_proxy.trim();
        (!proxy.is_empty()).then_some(proxy)
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: default_cache_enabled(),
            ttl_secs: default_cache_ttl(),
            max_entries: default_cache_max_entries(),
            cleanup_interval_secs: default_cache_cleanup_interval(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            format: default_format(),
        }
    }
}

impl Config {
    /// Get the config directory path
    pub fn config_dir() -> Result<PathBuf> {
        dirs::config_dir()
            .map(|p| p.join(APP_DIR_NAME))
            .ok_or_else(|| Error::Config("Could not determine config directory".to_string()))
    }

    /// Get the config file path
    pub fn config_path() -> Result<PathBuf> {
        Ok(Self::config_dir()?.join(CONFIG_FILE_NAME))
    }

    /// Load configuration from the default path
    ///
    /// Creates default config if file doesn't exist
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;

        if path.exists() {
            let content = fs::read_to_string(&path).map_err(|e| {
                Error::Config(format!("Failed to read config file: {}", e))
            })?;

            toml::from_str(&content).map_err(|e| {
                Error::Config(format!("Failed to parse config file: {}", e))
            })
        } else {
            let config = Config::default();
            config.save()?;
            Ok(config)
        }
    }

    /// Save configuration to the default path
    pub fn save(&self) -> Result<()> {
        let path = Self::config_path()?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                Error::Config(format!("Failed to create config directory: {}", e))
            })?;
        }

        let content = toml::to_string_pretty(self).map_err(|e| {
            Error::Config(format!("Failed to serialize config: {}", e))
        })?;

        fs::write(&path, content).map_err(|e| {
            Error::Config(format!("Failed to write config file: {}", e))
        })?;

        Ok(())
    }

    /// Get a configuration value by key path
    ///
    /// Key format: "section.key"
    /// Returns the value as a string, or None if not found
    pub fn get(&self, key: &str) -> Option<String> {
        let parts: Vec<&str> = key.split('.').collect();

        match parts.as_slice() {
            ["geolocation", "provider"] => Some(self.geolocation.provider.clone()),
            ["geolocation", "enable_high_accuracy"] => {
                Some(self.geolocation.enable_high_accuracy.to_string())
            }
            ["geolocation", "timeout_ms"] => Some(self.geolocation.timeout_ms.to_string()),
            ["geolocation", "maximum_age_ms"] => {
                Some(self.geolocation.maximum_age_ms.to_string())
            }

            ["position", "min_distance_meters"] => {
                Some(self.position.min_distance_meters.to_string())
            }
            ["position", "min_interval_ms"] => Some(self.position.min_interval_ms.to_string()),
            ["position", "max_accuracy_meters"] => {
                Some(self.position.max_accuracy_meters.to_string())
            }

            ["geocoder", "base_url"] => Some(self.geocoder.base_url.clone()),
            ["geocoder", "user_agent"] => Some(self.geocoder.user_agent.clone()),
            ["geocoder", "accept_language"] => Some(self.geocoder.accept_language.clone()),
            ["geocoder", "cors_proxy"] => Some(self.geocoder.cors_proxy.clone()),

            ["cache", "enabled"] => Some(self.cache.enabled.to_string()),
            ["cache", "ttl_secs"] => Some(self.cache.ttl_secs.to_string()),
            ["cache", "max_entries"] => Some(self.cache.max_entries.to_string()),
            ["cache", "cleanup_interval_secs"] => {
                Some(self.cache.cleanup_interval_secs.to_string())
            }

            ["server", "host"] => Some(self.server.host.clone()),
            ["server", "port"] => Some(self.server.port.to_string()),

            ["output", "format"] => Some(self.output.format.clone()),

            _ => None,
        }
    }

    /// Set a configuration value by key path
    ///
    /// Key format: "section.key"
    /// Returns error if key is invalid or value type is wrong
    pub fn set(&mut self, key: &str, value: &str) -> Result<()> {
        let parts: Vec<&str> = key.split('.').collect();

        match parts.as_slice() {
            ["geolocation", "provider"] => {
                self.geolocation.provider = value.to_string();
            }
            ["geolocation", "enable_high_accuracy"] => {
                self.geolocation.enable_high_accuracy = parse_value(key, value)?;
            }
            ["geolocation", "timeout_ms"] => {
                self.geolocation.timeout_ms = parse_value(key, value)?;
            }
            ["geolocation", "maximum_age_ms"] => {
                self.geolocation.maximum_age_ms = parse_value(key, value)?;
            }

            ["position", "min_distance_meters"] => {
                self.position.min_distance_meters = parse_value(key, value)?;
            }
            ["position", "min_interval_ms"] => {
                self.position.min_interval_ms = parse_value(key, value)?;
            }
            ["position", "max_accuracy_meters"] => {
                self.position.max_accuracy_meters = parse_value(key, value)?;
            }

            ["geocoder", "base_url"] => {
                self.geocoder.base_url = value.to_string();
            }
            ["geocoder", "user_agent"] => {
                self.geocoder.user_agent = value.to_string();
            }
            ["geocoder", "accept_language"] => {
                self.geocoder.accept_language = value.to_string();
            }
            ["geocoder", "cors_proxy"] => {
                self.geocoder.cors_proxy = value.to_string();
            }

            ["cache", "enabled"] => {
                self.cache.enabled = parse_value(key, value)?;
            }
            ["cache", "ttl_secs"] => {
                self.cache.ttl_secs = parse_value(key, value)?;
            }
            ["cache", "max_entries"] => {
                self.cache.max_entries = parse_value(key, value)?;
            }
            ["cache", "cleanup_interval_secs"] => {
                self.cache.cleanup_interval_secs = parse_value(key, value)?;
            }

            ["server", "host"] => {
                self.server.host = value.to_string();
            }
            ["server", "port"] => {
                self.server.port = parse_value(key, value)?;
            }

            ["output", "format"] => {
                self.output.format = value.to_string();
            }

            _ => {
                return Err(Error::Config(format!("Unknown config key: {}", key)));
            }
        }

        Ok(())
    }

    /// List all available config keys
    pub fn available_keys() -> Vec<&'static str> {
        vec![
            "geolocation.provider",
            "geolocation.enable_high_accuracy",
            "geolocation.timeout_ms",
            "geolocation.maximum_age_ms",
            "position.min_distance_meters",
            "position.min_interval_ms",
            "position.max_accuracy_meters",
            "geocoder.base_url",
            "geocoder.user_agent",
            "geocoder.accept_language",
            "geocoder.cors_proxy",
            "cache.enabled",
            "cache.ttl_secs",
            "cache.max_entries",
            "cache.cleanup_interval_secs",
            "server.host",
            "server.port",
            "output.format",
        ]
    }

    /// Get server address as "host:port"
    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

fn parse_value<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .parse()
        .map_err(|_| Error::Config(format!("Invalid value for {}: {}", key, value)))
}
