//! Server shared state
//!
//! Holds configuration and the geocoder shared by all requests.

use crate::address::cache::AddressCache;
use crate::config::Config;
use crate::error::Result;
use crate::geocoder::reverse::ReverseGeocoderBuilder;
use crate::geocoder::ReverseGeocoder;
use std::sync::Arc;
use std::time::Instant;

/// Shared state for the HTTP server
pub struct AppState {
    /// Configuration
    pub config: Config,

    /// Used only through `lookup`, so requests never share geocoder state
    pub geocoder: ReverseGeocoder,

    pub cache: Option<Arc<AddressCache>>,

    started: Instant,
}

impl AppState {
    /// Create new application state from configuration
    pub fn new(config: Config) -> Result<Self> {
        Self::with_geocoder(config, ReverseGeocoderBuilder::from_config)
    }

    /// Create state with a customised geocoder builder
    pub fn with_geocoder<F>(config: Config, builder: F) -> Result<Self>
    where
        F: FnOnce(&crate::config::GeocoderConfig) -> ReverseGeocoderBuilder,
    {
        let cache = config
            .cache
            .enabled
            .then(|| Arc::new(AddressCache::from_config(&config.cache)));

        let mut builder = builder(&config.geocoder);
        if let Some(cache) = &cache {
            builder = builder.cache(Arc::clone(cache));
        }

        Ok(Self {
            geocoder: builder.build()?,
            cache,
            config,
            started: Instant::now(),
        })
    }

    /// Seconds since the state was created
    pub fn uptime_secs(&self) -> u64 {
        self.started.elapsed().as_secs()
    }
}

impl Drop for AppState {
    fn drop(&mut self) {
        if let Some(cache) = &self.cache {
            cache.close();
        }
    }
}
