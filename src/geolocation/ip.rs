//! IP-based geolocation provider
//!
//! Uses ip-api.com for a coarse fix with file-based caching. Suitable for a
//! terminal without a GPS receiver; accuracy is reported as several
//! kilometers and continuous watching is not supported.

use crate::constants::api::IP_API_URL;
use crate::constants::cache::{IP_LOCATION_CACHE_FILE, IP_LOCATION_TTL_SECS};
use crate::constants::position::IP_ACCURACY_METERS;
use crate::config::defaults::APP_DIR_NAME;
use crate::geolocation::{
    GeolocationProvider, PositionOptions, ProviderError, ProviderResult, WatchHandle, WatchId,
};
use crate::position::Position;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use std::time::Duration;
use tracing::debug;

/// IP location provider with caching
#[derive(Debug)]
pub struct IpProvider {
    client: reqwest::Client,
    endpoint: String,
    cache_path: Option<PathBuf>,
}

/// ip-api.com response
#[derive(Debug, Deserialize)]
struct IpApiResponse {
    status: String,
    message: Option<String>,
    lat: Option<f64>,
    lon: Option<f64>,
}

/// Cached fix
#[derive(Debug, Clone, Serialize, Deserialize)]
struct CachedLocation {
    latitude: f64,
    longitude: f64,
    /// Unix seconds
    timestamp: i64,
}

impl IpProvider {
    /// Create a provider with the default cache path
    pub fn new() -> Self {
        let cache_path = dirs::cache_dir().map(|p| p.join(APP_DIR_NAME).join(IP_LOCATION_CACHE_FILE));

        Self {
            client: reqwest::Client::new(),
            endpoint: IP_API_URL.to_string(),
            cache_path,
        }
    }

    /// Create a provider with a specific cache path
    pub fn with_cache_path(cache_path: PathBuf) -> Self {
        Self {
            cache_path: Some(cache_path),
            ..Self::new()
        }
    }

    /// Create a provider without caching
    pub fn without_cache() -> Self {
        Self {
            cache_path: None,
            ..Self::new()
        }
    }

    /// Query a different endpoint (used by tests)
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    async fn fetch_location(&self, timeout_ms: u64) -> ProviderResult<(f64, f64)> {
        let response = self
            .client
            .get(&self.endpoint)
            .timeout(Duration::from_millis(timeout_ms))
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ProviderError::timeout(format!("IP location request timed out: {}", e))
                } else {
                    ProviderError::position_unavailable(format!("IP location request failed: {}", e))
                }
            })?;

        if !response.status().is_success() {
            return Err(ProviderError::position_unavailable(format!(
                "IP location API returned status: {}",
                response.status()
            )));
        }

        let data: IpApiResponse = response.json().await.map_err(|e| {
            ProviderError::position_unavailable(format!(
                "Failed to parse IP location response: {}",
                e
            ))
        })?;

        if data.status != "success" {
            return Err(ProviderError::position_unavailable(format!(
                "IP location lookup failed: {}",
                data.message.unwrap_or_else(|| data.status.clone())
            )));
        }

        match (data.lat, data.lon) {
            (Some(lat), Some(lon)) => Ok((lat, lon)),
            _ => Err(ProviderError::position_unavailable(
                "No coordinates in IP location response",
            )),
        }
    }

    /// Load the cached fix if still valid
    ///
    /// `maximum_age_ms` of zero falls back to the default cache lifetime.
    fn load_cache(&self, maximum_age_ms: u64) -> Option<Position> {
        let cache_path = self.cache_path.as_ref()?;
        let content = fs::read_to_string(cache_path).ok()?;
        let cached: CachedLocation = serde_json::from_str(&content).ok()?;

        let max_age_secs = if maximum_age_ms == 0 {
            IP_LOCATION_TTL_SECS as i64
        } else {
            (maximum_age_ms / 1000) as i64
        };
        let age = chrono::Utc::now().timestamp() - cached.timestamp;
        if age < 0 || age >= max_age_secs {
            return None;
        }

        Position::new(
            cached.latitude,
            cached.longitude,
            IP_ACCURACY_METERS,
            cached.timestamp * 1000,
        )
        .ok()
    }

    fn save_cache(&self, position: &Position) {
        let Some(cache_path) = &self.cache_path else {
            return;
        };

        if let Some(parent) = cache_path.parent() {
            let _ = fs::create_dir_all(parent);
        }

        let cached = CachedLocation {
            latitude: position.latitude(),
            longitude: position.longitude(),
            timestamp: position.timestamp() / 1000,
        };

        if let Ok(content) = serde_json::to_string_pretty(&cached) {
            let _ = fs::write(cache_path, content);
        }
    }

    /// Remove the cached fix
    pub fn clear_cache(&self) {
        if let Some(cache_path) = &self.cache_path {
            let _ = fs::remove_file(cache_path);
        }
    }
}

impl Default for IpProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl GeolocationProvider for IpProvider {
    fn name(&self) -> &'static str {
        "ip"
    }

    async fn current_position(&self, options: &PositionOptions) -> ProviderResult<Position> {
        if let Some(cached) = self.load_cache(options.maximum_age_ms) {
            debug!("Using cached IP location");
            return Ok(cached);
        }

        let (lat, lon) = self.fetch_location(options.timeout_ms).await?;
        let position = Position::now(lat, lon, IP_ACCURACY_METERS)
            .map_err(|e| ProviderError::position_unavailable(e.to_string()))?;
        self.save_cache(&position);
        Ok(position)
    }

    fn watch_position(&self, _options: &PositionOptions) -> ProviderResult<WatchHandle> {
        Err(ProviderError::not_supported(
            "IP geolocation cannot watch position",
        ))
    }

    fn clear_watch(&self, _id: WatchId) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_ip_provider_creation() {
        assert!(IpProvider::new().cache_path.is_some());
        assert!(IpProvider::without_cache().cache_path.is_none());
    }

    #[test]
    fn test_cache_operations() {
        let temp_dir = TempDir::new().unwrap();
        let provider = IpProvider::with_cache_path(temp_dir.path().join("ip.json"));

        assert!(provider.load_cache(0).is_none());

        let position = Position::now(-23.5505, -46.6333, IP_ACCURACY_METERS).unwrap();
        provider.save_cache(&position);

        let loaded = provider.load_cache(0).unwrap();
        assert_eq!(loaded.latitude(), -23.5505);
        assert_eq!(loaded.accuracy(), IP_ACCURACY_METERS);

        provider.clear_cache();
        assert!(provider.load_cache(0).is_none());
    }

    #[test]
    fn test_expired_cache_is_ignored() {
        let temp_dir = TempDir::new().unwrap();
        let cache_path = temp_dir.path().join("ip.json");
        let stale = CachedLocation {
            latitude: -23.5505,
            longitude: -46.6333,
            timestamp: chrono::Utc::now().timestamp() - IP_LOCATION_TTL_SECS as i64 - 10,
        };
        fs::write(&cache_path, serde_json::to_string(&stale).unwrap()).unwrap();

        let provider = IpProvider::with_cache_path(cache_path);
        assert!(provider.load_cache(0).is_none());
    }

    #[tokio::test]
    async fn test_current_position_from_api() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "status": "success",
                "lat": -22.9068,
                "lon": -43.1729,
                "city": "Rio de Janeiro"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let temp_dir = TempDir::new().unwrap();
        let provider = IpProvider::with_cache_path(temp_dir.path().join("ip.json"))
            .with_endpoint(server.uri());
        let options = PositionOptions::default();

        let first = provider.current_position(&options).await.unwrap();
        assert_eq!(first.latitude(), -22.9068);
        assert_eq!(first.accuracy(), IP_ACCURACY_METERS);

        // Served from cache, so the mock still sees one request
        let second = provider.current_position(&options).await.unwrap();
        assert_eq!(second.longitude(), -43.1729);
    }

    #[tokio::test]
    async fn test_failed_lookup_is_position_unavailable() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "status": "fail",
                "message": "reserved range"
            })))
            .mount(&server)
            .await;

        let provider = IpProvider::without_cache().with_endpoint(server.uri());
        let err = provider
            .current_position(&PositionOptions::default())
            .await
            .unwrap_err();
        assert_eq!(err.code, ProviderError::POSITION_UNAVAILABLE);
        assert!(err.message.contains("reserved range"));
    }

    #[test]
    fn test_watch_not_supported() {
        let provider = IpProvider::without_cache();
        let err = provider
            .watch_position(&PositionOptions::default())
            .unwrap_err();
        assert_eq!(err.code, ProviderError::NOT_SUPPORTED);
    }
}
