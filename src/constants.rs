//! Centralized constants for the guia-turistico crate
//!
//! This module consolidates constants that are used across multiple modules
//! to avoid duplication and ensure consistency.

/// Geographic constants
pub mod geo {
    /// Mean Earth radius in meters (WGS84 approximation)
    pub const EARTH_RADIUS_METERS: f64 = 6_371_000.0;

    /// Decimal places kept when coordinates are used as cache keys (~11 m)
    pub const CACHE_KEY_PRECISION: i32 = 4;
}

/// External API endpoints
pub mod api {
    /// OpenStreetMap Nominatim reverse geocoding endpoint
    pub const NOMINATIM_REVERSE_URL: &str = "https://nominatim.openstreetmap.org/reverse";

    /// IP geolocation API (free, no key required)
    pub const IP_API_URL: &str = "http://ip-api.com/json";

    /// Zoom level requested from Nominatim (building level)
    pub const NOMINATIM_ZOOM: u8 = 18;
}

/// Position gate and geolocation defaults
pub mod position {
    /// Minimum movement before a new position is republished
    pub const MIN_DISTANCE_METERS: f64 = 20.0;

    /// Minimum time between republished positions when not moving
    pub const MIN_INTERVAL_MS: i64 = 30_000;

    /// Provider timeout for a single position request
    pub const GEOLOCATION_TIMEOUT_MS: u64 = 20_000;

    /// Accuracy quality thresholds in meters
    pub const ACCURACY_EXCELLENT: f64 = 10.0;
    pub const ACCURACY_GOOD: f64 = 30.0;
    pub const ACCURACY_MEDIUM: f64 = 100.0;
    pub const ACCURACY_BAD: f64 = 200.0;

    /// Accuracy reported for IP based positions
    pub const IP_ACCURACY_METERS: f64 = 5_000.0;
}

/// Event names carried in notifications
pub mod events {
    /// Emitted by the reverse geocoder after each fetch cycle
    pub const ADDRESS_FETCHED_EVENT: &str = "Address fetched";

    pub const LOGRADOURO_CHANGED: &str = "LogradouroChanged";
    pub const BAIRRO_CHANGED: &str = "BairroChanged";
    pub const MUNICIPIO_CHANGED: &str = "MunicipioChanged";
}

/// Nominatim `address` keys, in priority order, for each Brazilian component
pub mod fields {
    pub const LOGRADOURO: &[&str] = &["road", "street", "pedestrian", "footway", "path"];
    pub const BAIRRO: &[&str] = &["neighbourhood", "suburb", "quarter", "hamlet"];
    pub const MUNICIPIO: &[&str] = &["city", "town", "city_district", "municipality", "village"];
    pub const STATE_ISO: &str = "ISO3166-2-lvl4";
}

/// Cache settings
pub mod cache {
    /// Address cache entry lifetime in seconds
    pub const ADDRESS_TTL_SECS: u64 = 300;

    /// Maximum number of cached addresses
    pub const ADDRESS_MAX_ENTRIES: usize = 50;

    /// Interval of the expired-entry sweep in seconds
    pub const ADDRESS_CLEANUP_INTERVAL_SECS: u64 = 60;

    /// IP location cache duration in seconds (1 hour)
    pub const IP_LOCATION_TTL_SECS: u64 = 3600;

    /// IP location cache file name
    pub const IP_LOCATION_CACHE_FILE: &str = "ip_location_cache.json";
}
