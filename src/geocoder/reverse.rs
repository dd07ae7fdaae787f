//! Position to standardized address
//!
//! `ReverseGeocoder` observes the position manager. Every accepted position
//! starts a geocode cycle: fetch the raw address, standardize it, and notify
//! the geocoder's own observers with an `AddressEvent`.
//!
//! Cycles are numbered. Responses can come back out of order, so only the
//! cycle issued last is applied and notified; older ones resolve to
//! `GeocodeOutcome::Superseded`. In-flight requests are never cancelled.

use crate::address::cache::AddressCache;
use crate::address::{AddressExtractor, RawAddressResponse, StandardizedAddress};
use crate::config::GeocoderConfig;
use crate::constants::events::ADDRESS_FETCHED_EVENT;
use crate::error::{Error, Result};
use crate::geocoder::{build_reverse_url, parse_response, proxy_url, FetchManager, HttpFetcher};
use crate::observer::{NotifyReport, Observer, ObserverSubject};
use crate::position::manager::PositionUpdate;
use crate::position::{Coordinates, Position};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use tracing::{debug, warn};

/// Failure details handed to observers
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GeocodeFailure {
    /// Portuguese text for the end user
    pub user_message: String,
    /// Technical message
    pub detail: String,
    /// HTTP status, when the failure came from one
    pub status: Option<u16>,
}

impl From<&Error> for GeocodeFailure {
    fn from(err: &Error) -> Self {
        Self {
            user_message: err.user_message(),
            detail: err.to_string(),
            status: err.http_status(),
        }
    }
}

/// Notification sent after each applied geocode cycle
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AddressEvent {
    /// Raw provider response, `None` on failure
    pub raw: Option<RawAddressResponse>,
    pub standardized: Option<StandardizedAddress>,
    pub event: &'static str,
    pub loading: bool,
    pub error: Option<GeocodeFailure>,
    /// Position that started the cycle, if it came from the position manager
    pub position: Option<Position>,
    pub generation: u64,
}

/// Result of a geocode cycle that did not fail
#[derive(Debug, Clone, PartialEq)]
pub enum GeocodeOutcome {
    /// Latest cycle; state updated and observers notified
    Applied {
        raw: RawAddressResponse,
        standardized: StandardizedAddress,
    },
    /// A newer cycle was issued before this one finished; nothing applied
    Superseded { generation: u64, latest: u64 },
}

impl GeocodeOutcome {
    pub fn standardized(&self) -> Option<&StandardizedAddress> {
        match self {
            Self::Applied { standardized, .. } => Some(standardized),
            Self::Superseded { .. } => None,
        }
    }

    pub fn is_superseded(&self) -> bool {
        matches!(self, Self::Superseded { .. })
    }
}

#[derive(Debug, Default)]
struct GeocoderState {
    coordinates: Option<Coordinates>,
    url: Option<String>,
    loading: bool,
    error: Option<GeocodeFailure>,
    current_address: Option<RawAddressResponse>,
    standardized: Option<StandardizedAddress>,
    position: Option<Position>,
}

struct Cycle {
    generation: u64,
    coordinates: Coordinates,
    url: String,
    position: Option<Position>,
}

struct Inner {
    base_url: String,
    cors_proxy: Option<String>,
    fetch_manager: Option<Arc<dyn FetchManager>>,
    http: HttpFetcher,
    extractor: Arc<AddressExtractor>,
    cache: Option<Arc<AddressCache>>,
    observers: ObserverSubject<AddressEvent>,
    generation: AtomicU64,
    apply: Mutex<()>,
    state: RwLock<GeocoderState>,
}

/// Builder for `ReverseGeocoder`
pub struct ReverseGeocoderBuilder {
    base_url: String,
    user_agent: String,
    accept_language: String,
    cors_proxy: Option<String>,
    fetch_manager: Option<Arc<dyn FetchManager>>,
    extractor: Option<Arc<AddressExtractor>>,
    cache: Option<Arc<AddressCache>>,
}

impl ReverseGeocoderBuilder {
    pub fn from_config(config: &GeocoderConfig) -> Self {
        Self {
            base_url: config.base_url.clone(),
            user_agent: config.user_agent.clone(),
            accept_language: config.accept_language.clone(),
            cors_proxy: config.proxy().map(str::to_string),
            fetch_manager: None,
            extractor: None,
            cache: None,
        }
    }

    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn cors_proxy(mut self, proxy: impl Into<String>) -> Self {
        self.cors_proxy = Some(proxy.into()).filter(|p: &String| !p.is_empty());
        self
    }

    /// Use `fetch_manager` instead of the built-in HTTP client
    pub fn fetch_manager(mut self, fetch_manager: Arc<dyn FetchManager>) -> Self {
        self.fetch_manager = Some(fetch_manager);
        self
    }

    pub fn extractor(mut self, extractor: Arc<AddressExtractor>) -> Self {
        self.extractor = Some(extractor);
        self
    }

    pub fn cache(mut self, cache: Arc<AddressCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn build(self) -> Result<ReverseGeocoder> {
        let http = HttpFetcher::new(&self.user_agent, &self.accept_language)?;
        Ok(ReverseGeocoder {
            inner: Arc::new(Inner {
                base_url: self.base_url,
                cors_proxy: self.cors_proxy,
                fetch_manager: self.fetch_manager,
                http,
                extractor: self.extractor.unwrap_or_default(),
                cache: self.cache,
                observers: ObserverSubject::new(),
                generation: AtomicU64::new(0),
                apply: Mutex::new(()),
                state: RwLock::new(GeocoderState::default()),
            }),
        })
    }
}

impl Default for ReverseGeocoderBuilder {
    fn default() -> Self {
        Self::from_config(&GeocoderConfig::default())
    }
}

/// Reverse geocoder handle
///
/// Cheap to clone; clones share state, observers and the cycle counter.
#[derive(Clone)]
pub struct ReverseGeocoder {
    inner: Arc<Inner>,
}

impl ReverseGeocoder {
    pub fn builder() -> ReverseGeocoderBuilder {
        ReverseGeocoderBuilder::default()
    }

    pub fn new(config: &GeocoderConfig) -> Result<Self> {
        ReverseGeocoderBuilder::from_config(config).build()
    }

    /// Store coordinates for the next cycle and build its URL
    ///
    /// Resets the error, loading flag, address data and position. Returns false, leaving
    /// everything untouched, for non-finite or out-of-range values. Zero is a
    /// valid coordinate.
    pub fn set_coordinates(&self, lat: f64, lon: f64) -> bool {
        let coordinates = Coordinates::new(lat, lon);
        if coordinates.validate().is_err() {
            debug!("Ignoring invalid coordinates");
            return false;
        }
        let mut state = self.write_state();
        self.reset_for(&mut state, coordinates);
        true
    }

    fn reset_for(&self, state: &mut GeocoderState, coordinates: Coordinates) {
        state.url = Some(build_reverse_url(
            &self.inner.base_url,
            coordinates.lat,
            coordinates.lng,
        ));
        state.coordinates = Some(coordinates);
        state.error = None;
        state.loading = false;
        state.current_address = None;
        state.standardized = None;
        state.position = None;
    }

    /// Fetch the raw address for the stored coordinates
    ///
    /// Builds the URL if `set_coordinates` did not. Errors are returned as
    /// they come; no retry happens here.
    pub async fn reverse_geocode(&self) -> Result<RawAddressResponse> {
        let (coordinates, url) = {
            let mut state = self.write_state();
            let coordinates = state
                .coordinates
                .ok_or_else(|| Error::InvalidCoordinates("no coordinates set".to_string()))?;
            let url = state
                .url
                .get_or_insert_with(|| {
                    build_reverse_url(&self.inner.base_url, coordinates.lat, coordinates.lng)
                })
                .clone();
            (coordinates, url)
        };
        self.fetch_parsed(coordinates, &url).await
    }

    /// Fetch the raw address for `coordinates` without touching any state
    pub async fn lookup(&self, coordinates: Coordinates) -> Result<RawAddressResponse> {
        coordinates.validate()?;
        let url = build_reverse_url(&self.inner.base_url, coordinates.lat, coordinates.lng);
        self.fetch_parsed(coordinates, &url).await
    }

    /// Run one cycle for the stored coordinates and notify observers
    pub async fn fetch_address(&self) -> Result<GeocodeOutcome> {
        let cycle = self.begin_cycle(None)?;
        self.run_cycle(cycle).await
    }

    /// Run one cycle for `position` and notify observers
    ///
    /// Returns `Superseded` when a newer cycle was issued meanwhile.
    pub async fn geocode_position(&self, position: Position) -> Result<GeocodeOutcome> {
        let cycle = self.begin_cycle(Some(position))?;
        self.run_cycle(cycle).await
    }

    /// Fetch and apply an already numbered cycle
    async fn run_cycle(&self, cycle: Cycle) -> Result<GeocodeOutcome> {
        let result = self.resolve(cycle.coordinates, &cycle.url).await;
        self.finish(cycle, result)
    }

    /// Number of the most recently issued cycle
    pub fn latest_generation(&self) -> u64 {
        self.inner.generation.load(Ordering::SeqCst)
    }

    fn begin_cycle(&self, position: Option<Position>) -> Result<Cycle> {
        let mut state = self.write_state();

        if let Some(position) = position {
            self.reset_for(&mut state, position.coordinates());
            state.position = Some(position);
        }

        let coordinates = state
            .coordinates
            .ok_or_else(|| Error::InvalidCoordinates("no coordinates set".to_string()))?;
        let url = state
            .url
            .get_or_insert_with(|| {
                build_reverse_url(&self.inner.base_url, coordinates.lat, coordinates.lng)
            })
            .clone();
        state.loading = true;

        let generation = self.inner.generation.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(Cycle {
            generation,
            coordinates,
            url,
            position: state.position,
        })
    }

    async fn fetch_json(&self, url: &str) -> Result<serde_json::Value> {
        match &self.inner.fetch_manager {
            Some(fetch_manager) => fetch_manager.fetch(url).await,
            None => self.inner.http.fetch(url).await,
        }
    }

    async fn fetch_parsed(&self, coordinates: Coordinates, url: &str) -> Result<RawAddressResponse> {
        if let Some(cache) = &self.inner.cache {
            if let Some(hit) = cache.get(coordinates) {
                debug!("Address cache hit");
                return Ok(hit);
            }
        }

        let raw = parse_response(self.fetch_json(url).await?)?;
        if let Some(cache) = &self.inner.cache {
            cache.insert(coordinates, raw.clone());
        }
        Ok(raw)
    }

    /// Fetch with classification and at most one proxy retry
    async fn resolve(&self, coordinates: Coordinates, url: &str) -> Result<RawAddressResponse> {
        let err = match self.fetch_parsed(coordinates, url).await {
            Ok(raw) => return Ok(raw),
            Err(e) => e.without_url().classify_geocoding(),
        };

        match self.inner.cors_proxy.as_deref() {
            Some(proxy) if err.is_proxy_retryable() => {
                warn!("Geocoding request failed ({}), retrying through proxy", err);
                let value = self
                    .fetch_json(&proxy_url(proxy, url))
                    .await
                    .map_err(|e| e.without_url().classify_geocoding())?;
                let raw = parse_response(value)?;
                if let Some(cache) = &self.inner.cache {
                    cache.insert(coordinates, raw.clone());
                }
                Ok(raw)
            }
            _ => Err(err),
        }
    }

    fn finish(&self, cycle: Cycle, result: Result<RawAddressResponse>) -> Result<GeocodeOutcome> {
        let _apply = self.inner.apply.lock().unwrap_or_else(|e| e.into_inner());

        let latest = self.latest_generation();
        if cycle.generation != latest {
            match &result {
                Ok(_) => debug!("Discarding address of cycle {} (latest {})", cycle.generation, latest),
                Err(e) => debug!("Discarding failure of cycle {} (latest {}): {}", cycle.generation, latest, e),
            }
            return Ok(GeocodeOutcome::Superseded {
                generation: cycle.generation,
                latest,
            });
        }

        match result {
            Ok(raw) => {
                let standardized = AddressExtractor::get_brazilian_standard_address(&raw);
                {
                    let mut state = self.write_state();
                    state.current_address = Some(raw.clone());
                    state.standardized = Some(standardized.clone());
                    state.error = None;
                    state.loading = false;
                }
                // Fires component change callbacks against the previous address
                self.inner.extractor.process(&raw);

                self.notify_observers(&AddressEvent {
                    raw: Some(raw.clone()),
                    standardized: Some(standardized.clone()),
                    event: ADDRESS_FETCHED_EVENT,
                    loading: false,
                    error: None,
                    position: cycle.position,
                    generation: cycle.generation,
                });
                Ok(GeocodeOutcome::Applied { raw, standardized })
            }
            Err(err) => {
                warn!("Reverse geocoding failed: {}", err);
                let failure = GeocodeFailure::from(&err);
                {
                    let mut state = self.write_state();
                    state.error = Some(failure.clone());
                    state.loading = false;
                }
                self.notify_observers(&AddressEvent {
                    raw: None,
                    standardized: None,
                    event: ADDRESS_FETCHED_EVENT,
                    loading: false,
                    error: Some(failure),
                    position: cycle.position,
                    generation: cycle.generation,
                });
                Err(err)
            }
        }
    }

    pub fn notify_observers(&self, event: &AddressEvent) -> NotifyReport {
        self.inner.observers.notify_observers(event)
    }

    pub fn subscribe(&self, observer: Arc<dyn Observer<AddressEvent>>) {
        self.inner.observers.subscribe(observer);
    }

    pub fn subscribe_fn<F>(&self, f: F) -> Arc<dyn Observer<AddressEvent>>
    where
        F: Fn(&AddressEvent) + Send + Sync + 'static,
    {
        self.inner.observers.subscribe_fn(f)
    }

    pub fn unsubscribe(&self, observer: &Arc<dyn Observer<AddressEvent>>) -> usize {
        self.inner.observers.unsubscribe(observer)
    }

    pub fn observer_count(&self) -> usize {
        self.inner.observers.len()
    }

    pub fn extractor(&self) -> &Arc<AddressExtractor> {
        &self.inner.extractor
    }

    pub fn base_url(&self) -> &str {
        &self.inner.base_url
    }

    pub fn coordinates(&self) -> Option<Coordinates> {
        self.read_state().coordinates
    }

    pub fn url(&self) -> Option<String> {
        self.read_state().url.clone()
    }

    pub fn current_address(&self) -> Option<RawAddressResponse> {
        self.read_state().current_address.clone()
    }

    pub fn standardized_address(&self) -> Option<StandardizedAddress> {
        self.read_state().standardized.clone()
    }

    pub fn current_position(&self) -> Option<Position> {
        self.read_state().position
    }

    pub fn last_error(&self) -> Option<GeocodeFailure> {
        self.read_state().error.clone()
    }

    pub fn is_loading(&self) -> bool {
        self.read_state().loading
    }

    fn read_state(&self) -> std::sync::RwLockReadGuard<'_, GeocoderState> {
        self.inner.state.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write_state(&self) -> std::sync::RwLockWriteGuard<'_, GeocoderState> {
        self.inner.state.write().unwrap_or_else(|e| e.into_inner())
    }
}

impl std::fmt::Debug for ReverseGeocoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReverseGeocoder")
            .field("base_url", &self.inner.base_url)
            .field("cors_proxy", &self.inner.cors_proxy)
            .field("observers", &self.inner.observers.len())
            .field("generation", &self.latest_generation())
            .finish_non_exhaustive()
    }
}

/// Reactive path: every accepted position starts a cycle in the background
///
/// Returns as soon as the cycle is spawned. Its failure reaches observers
/// through `AddressEvent::error` and the log.
impl Observer<PositionUpdate> for ReverseGeocoder {
    fn update(&self, event: &PositionUpdate) -> Result<()> {
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|_| Error::Geocoding("no async runtime to geocode position".to_string()))?;

        // numbered here, in delivery order, so a later fix always wins the fence
        let cycle = self.begin_cycle(Some(event.position))?;
        let geocoder = self.clone();
        runtime.spawn(async move {
            match geocoder.run_cycle(cycle).await {
                Ok(GeocodeOutcome::Superseded { generation, .. }) => {
                    debug!("Geocode cycle {} superseded", generation)
                }
                Ok(GeocodeOutcome::Applied { .. }) => {}
                Err(e) => debug!("Geocode cycle ended with error: {}", e),
            }
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geocoder::FetchFuture;
    use crate::position::manager::{PositionGate, PositionManager};
    use std::time::Duration;
    use tokio::sync::mpsc;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn sao_paulo() -> serde_json::Value {
        serde_json::json!({
            "place_id": 1,
            "lat": "-23.5505",
            "lon": "-46.6333",
            "display_name": "Praça da Sé, Sé, São Paulo, Brasil",
            "address": {
                "road": "Praça da Sé",
                "suburb": "Sé",
                "city": "São Paulo",
                "state": "São Paulo",
                "ISO3166-2-lvl4": "BR-SP",
                "postcode": "01001-000",
                "country": "Brasil"
            },
            "boundingbox": ["-23.551", "-23.550", "-46.634", "-46.633"]
        })
    }

    fn rio() -> serde_json::Value {
        serde_json::json!({
            "display_name": "Copacabana, Rio de Janeiro, Brasil",
            "address": {
                "road": "Avenida Atlântica",
                "suburb": "Copacabana",
                "city": "Rio de Janeiro",
                "ISO3166-2-lvl4": "BR-RJ",
                "country": "Brasil"
            }
        })
    }

    fn position(lat: f64, lon: f64) -> Position {
        Position::new(lat, lon, 10.0, 1_700_000_000_000).unwrap()
    }

    async fn geocoder_for(server: &MockServer) -> ReverseGeocoder {
        ReverseGeocoder::builder()
            .base_url(format!("{}/reverse", server.uri()))
            .build()
            .unwrap()
    }

    fn collect_events(geocoder: &ReverseGeocoder) -> Arc<std::sync::Mutex<Vec<AddressEvent>>> {
        let events = Arc::new(std::sync::Mutex::new(Vec::new()));
        let sink = Arc::clone(&events);
        geocoder.subscribe_fn(move |event: &AddressEvent| sink.lock().unwrap().push(event.clone()));
        events
    }

    /// Fails direct requests with a CORS error, answers proxied ones
    struct CorsBlocked {
        calls: std::sync::Mutex<Vec<String>>,
    }

    impl FetchManager for CorsBlocked {
        fn fetch<'a>(&'a self, url: &'a str) -> FetchFuture<'a> {
            Box::pin(async move {
                self.calls.lock().unwrap().push(url.to_string());
                if url.starts_with("https://proxy.test/") {
                    Ok(sao_paulo())
                } else {
                    Err(Error::Geocoding("Blocked by CORS policy".to_string()))
                }
            })
        }
    }

    /// Answers instantly with the requested latitude as the road name
    struct EchoLatitude;

    impl FetchManager for EchoLatitude {
        fn fetch<'a>(&'a self, url: &'a str) -> FetchFuture<'a> {
            Box::pin(async move {
                let lat = url
                    .split(['?', '&'])
                    .find_map(|pair| pair.strip_prefix("lat="))
                    .unwrap_or_default()
                    .to_string();
                Ok(serde_json::json!({ "address": { "road": lat } }))
            })
        }
    }

    fn echo_geocoder() -> ReverseGeocoder {
        ReverseGeocoder::builder()
            .fetch_manager(Arc::new(EchoLatitude))
            .build()
            .unwrap()
    }

    #[test]
    fn test_set_coordinates() {
        let geocoder = ReverseGeocoder::builder().build().unwrap();

        assert!(geocoder.set_coordinates(0.0, 0.0));
        assert_eq!(geocoder.coordinates(), Some(Coordinates::new(0.0, 0.0)));
        assert!(geocoder.url().unwrap().contains("lat=0&lon=0"));

        assert!(!geocoder.set_coordinates(91.0, 0.0));
        assert!(!geocoder.set_coordinates(f64::NAN, 0.0));
        assert_eq!(geocoder.coordinates(), Some(Coordinates::new(0.0, 0.0)));
    }

    #[tokio::test]
    async fn test_reverse_geocode_without_coordinates() {
        let geocoder = ReverseGeocoder::builder().build().unwrap();

        let err = geocoder.reverse_geocode().await.unwrap_err();
        assert!(matches!(err, Error::InvalidCoordinates(_)));

        let err = geocoder.fetch_address().await.unwrap_err();
        assert!(matches!(err, Error::InvalidCoordinates(_)));
    }

    #[tokio::test]
    async fn test_fetch_address_notifies_once() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/reverse"))
            .and(query_param("lat", "-23.5505"))
            .and(query_param("addressdetails", "1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(sao_paulo()))
            .expect(1)
            .mount(&server)
            .await;

        let geocoder = geocoder_for(&server).await;
        let events = collect_events(&geocoder);

        assert!(geocoder.set_coordinates(-23.5505, -46.6333));
        let outcome = geocoder.fetch_address().await.unwrap();

        let standardized = outcome.standardized().unwrap();
        assert_eq!(standardized.municipio.as_deref(), Some("São Paulo"));
        assert_eq!(standardized.sigla_uf.as_deref(), Some("SP"));

        let events = events.lock().unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event, ADDRESS_FETCHED_EVENT);
        assert!(!events[0].loading);
        assert!(events[0].error.is_none());
        assert_eq!(geocoder.standardized_address().as_ref(), Some(standardized));
        assert!(!geocoder.is_loading());
    }

    #[tokio::test]
    async fn test_rate_limit_is_reported_to_observers() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(429))
            .mount(&server)
            .await;

        let geocoder = geocoder_for(&server).await;
        let events = collect_events(&geocoder);

        let err = geocoder
            .geocode_position(position(-23.5505, -46.6333))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::RateLimited));

        let events = events.lock().unwrap();
        assert_eq!(events.len(), 1);
        assert!(events[0].raw.is_none());
        let failure = events[0].error.as_ref().unwrap();
        assert_eq!(failure.status, Some(429));
        assert!(failure.user_message.contains("Limite de requisições"));
        assert_eq!(geocoder.last_error().unwrap().status, Some(429));
    }

    #[tokio::test]
    async fn test_temporarily_unavailable() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(425))
            .mount(&server)
            .await;

        let geocoder = geocoder_for(&server).await;
        let err = geocoder
            .geocode_position(position(-23.5505, -46.6333))
            .await
            .unwrap_err();

        assert!(matches!(err, Error::TemporarilyUnavailable));
        assert!(err.user_message().contains("temporariamente indisponível"));
    }

    #[tokio::test]
    async fn test_latest_issued_cycle_wins() {
        let server = MockServer::start().await;
        // First request answers slowly, second one immediately
        Mock::given(method("GET"))
            .and(query_param("lat", "-23.5505"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(sao_paulo())
                    .set_delay(Duration::from_millis(200)),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(query_param("lat", "-22.9711"))
            .respond_with(ResponseTemplate::new(200).set_body_json(rio()))
            .mount(&server)
            .await;

        let geocoder = geocoder_for(&server).await;
        let events = collect_events(&geocoder);

        let (first, second) = tokio::join!(
            geocoder.geocode_position(position(-23.5505, -46.6333)),
            geocoder.geocode_position(position(-22.9711, -43.1822)),
        );

        assert!(first.unwrap().is_superseded());
        assert_eq!(
            second.unwrap().standardized().unwrap().municipio.as_deref(),
            Some("Rio de Janeiro")
        );

        let events = events.lock().unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].generation, 2);
        assert_eq!(
            geocoder.standardized_address().unwrap().municipio.as_deref(),
            Some("Rio de Janeiro")
        );
    }

    #[tokio::test]
    async fn test_cors_failure_retries_once_through_proxy() {
        let fetcher = Arc::new(CorsBlocked {
            calls: std::sync::Mutex::new(Vec::new()),
        });
        let geocoder = ReverseGeocoder::builder()
            .fetch_manager(fetcher.clone())
            .cors_proxy("https://proxy.test/?url=")
            .build()
            .unwrap();

        let outcome = geocoder
            .geocode_position(position(-23.5505, -46.6333))
            .await
            .unwrap();

        assert!(outcome.standardized().is_some());
        let calls = fetcher.calls.lock().unwrap();
        assert_eq!(calls.len(), 2);
        assert!(calls[1].starts_with("https://proxy.test/?url=https%3A%2F%2F"));
    }

    #[tokio::test]
    async fn test_cors_failure_without_proxy_is_classified() {
        let fetcher = Arc::new(CorsBlocked {
            calls: std::sync::Mutex::new(Vec::new()),
        });
        let geocoder = ReverseGeocoder::builder()
            .fetch_manager(fetcher.clone())
            .build()
            .unwrap();

        let err = geocoder
            .geocode_position(position(-23.5505, -46.6333))
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Cors(_)));
        assert_eq!(fetcher.calls.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_rate_limit_is_not_retried_through_proxy() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(429))
            .expect(1)
            .mount(&server)
            .await;

        let geocoder = ReverseGeocoder::builder()
            .base_url(format!("{}/reverse", server.uri()))
            .cors_proxy(format!("{}/proxy?url=", server.uri()))
            .build()
            .unwrap();

        assert!(geocoder
            .geocode_position(position(-23.5505, -46.6333))
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_cache_avoids_second_request() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(sao_paulo()))
            .expect(1)
            .mount(&server)
            .await;

        let geocoder = ReverseGeocoder::builder()
            .base_url(format!("{}/reverse", server.uri()))
            .cache(Arc::new(AddressCache::new(Duration::from_secs(60), 10)))
            .build()
            .unwrap();

        geocoder.geocode_position(position(-23.5505, -46.6333)).await.unwrap();
        let outcome = geocoder
            .geocode_position(position(-23.55051, -46.63331))
            .await
            .unwrap();

        assert!(outcome.standardized().is_some());
    }

    #[tokio::test]
    async fn test_lookup_leaves_state_alone() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(sao_paulo()))
            .mount(&server)
            .await;

        let geocoder = geocoder_for(&server).await;
        let events = collect_events(&geocoder);

        let raw = geocoder
            .lookup(Coordinates::new(-23.5505, -46.6333))
            .await
            .unwrap();

        assert_eq!(raw.address_field("city"), Some("São Paulo"));
        assert!(events.lock().unwrap().is_empty());
        assert!(geocoder.coordinates().is_none());
        assert_eq!(geocoder.latest_generation(), 0);
    }

    #[tokio::test]
    async fn test_reactive_update_from_position_manager() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(sao_paulo()))
            .mount(&server)
            .await;

        let geocoder = geocoder_for(&server).await;
        let (tx, mut rx) = mpsc::unbounded_channel();
        geocoder.subscribe_fn(move |event: &AddressEvent| {
            let _ = tx.send(event.clone());
        });

        let manager = PositionManager::new(PositionGate::default());
        manager.subscribe(Arc::new(geocoder.clone()));
        assert!(manager.update(position(-23.5505, -46.6333)).is_accepted());

        let event = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(event.position, Some(position(-23.5505, -46.6333)));
        assert_eq!(
            event.standardized.unwrap().pais.as_deref(),
            Some("Brasil")
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_reactive_updates_apply_latest_accepted_position() {
        let gate = PositionGate {
            min_distance_meters: 0.0,
            min_interval_ms: 0,
            max_accuracy_meters: None,
        };

        for _ in 0..100 {
            let geocoder = echo_geocoder();
            let (tx, mut rx) = mpsc::unbounded_channel();
            geocoder.subscribe_fn(move |event: &AddressEvent| {
                let _ = tx.send(event.clone());
            });
            let manager = PositionManager::new(gate);
            manager.subscribe(Arc::new(geocoder.clone()));

            let first = Position::new(-23.5505, -46.6333, 10.0, 1_700_000_000_000).unwrap();
            let second = Position::new(-23.5431, -46.6428, 10.0, 1_700_000_001_000).unwrap();
            assert!(manager.update(first).is_accepted());
            assert!(manager.update(second).is_accepted());

            let event = tokio::time::timeout(Duration::from_secs(5), rx.recv())
                .await
                .unwrap()
                .unwrap();
            assert_eq!(event.position, Some(second));
            assert_eq!(event.generation, geocoder.latest_generation());
            assert_eq!(
                event.standardized.unwrap().logradouro.as_deref(),
                Some("-23.5431")
            );

            tokio::time::sleep(Duration::from_millis(20)).await;
            assert!(rx.try_recv().is_err());
            assert_eq!(geocoder.current_position(), Some(second));
        }
    }

    #[tokio::test]
    async fn test_set_coordinates_forgets_previous_position() {
        let geocoder = echo_geocoder();
        let events = collect_events(&geocoder);

        geocoder.geocode_position(position(-23.0, -46.0)).await.unwrap();
        assert!(geocoder.set_coordinates(-10.0, -40.0));
        assert!(geocoder.current_position().is_none());
        geocoder.fetch_address().await.unwrap();

        let events = events.lock().unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].position, Some(position(-23.0, -46.0)));
        assert!(events[1].position.is_none());
        assert_eq!(
            events[1].standardized.as_ref().unwrap().logradouro.as_deref(),
            Some("-10")
        );
    }

    #[test]
    fn test_reactive_update_without_runtime_fails() {
        let geocoder = ReverseGeocoder::builder().build().unwrap();
        let update = PositionUpdate {
            position: position(-23.5505, -46.6333),
            previous: None,
            distance_meters: None,
        };
        assert!(geocoder.update(&update).is_err());
    }
}
