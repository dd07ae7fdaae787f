//! Default configuration values
//!
//! Named constants for all tunable parameters

use crate::constants::{api, cache, position};

/// Default geolocation provider ("ip" or "replay")
pub const DEFAULT_PROVIDER: &str = "ip";

/// Ask providers for their most accurate fix
pub const DEFAULT_HIGH_ACCURACY: bool = true;

/// Provider timeout in milliseconds
pub const DEFAULT_TIMEOUT_MS: u64 = position::GEOLOCATION_TIMEOUT_MS;

/// Maximum age of a cached provider fix in milliseconds
pub const DEFAULT_MAXIMUM_AGE_MS: u64 = 0;

/// Minimum movement before a position is republished
pub const DEFAULT_MIN_DISTANCE_METERS: f64 = position::MIN_DISTANCE_METERS;

/// Minimum time between republished positions
pub const DEFAULT_MIN_INTERVAL_MS: i64 = position::MIN_INTERVAL_MS;

/// Maximum accepted accuracy radius (0 disables the check)
pub const DEFAULT_MAX_ACCURACY_METERS: f64 = 0.0;

/// Reverse geocoding endpoint
pub const DEFAULT_GEOCODER_URL: &str = api::NOMINATIM_REVERSE_URL;

/// User-Agent sent to Nominatim (required by its usage policy)
pub const DEFAULT_USER_AGENT: &str = concat!("guia-turistico/", env!("CARGO_PKG_VERSION"));

/// Preferred response language
pub const DEFAULT_ACCEPT_LANGUAGE: &str = "pt-BR";

/// Address cache defaults
pub const DEFAULT_CACHE_ENABLED: bool = true;
pub const DEFAULT_CACHE_TTL_SECS: u64 = cache::ADDRESS_TTL_SECS;
pub const DEFAULT_CACHE_MAX_ENTRIES: usize = cache::ADDRESS_MAX_ENTRIES;
pub const DEFAULT_CACHE_CLEANUP_INTERVAL_SECS: u64 = cache::ADDRESS_CLEANUP_INTERVAL_SECS;

/// Default server host
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Default server port
pub const DEFAULT_PORT: u16 = 7879;

/// Default output format
pub const DEFAULT_FORMAT: &str = "text";

/// Config file name
pub const CONFIG_FILE_NAME: &str = "config.toml";

/// Application directory name (for XDG paths)
pub const APP_DIR_NAME: &str = "guia-turistico";
