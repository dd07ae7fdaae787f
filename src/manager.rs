//! Composition root
//!
//! `GeocodingManager` builds and wires the pipeline:
//!
//! ```text
//! provider -> GeolocationService -> PositionManager (gate)
//!                                     |-> GeocodingState
//!                                     '-> ReverseGeocoder -> AddressExtractor
//!                                           |                  '-> ChangeDetectionCoordinator
//!                                           '-> address observers    '-> change observers
//! ```
//!
//! Everything is an explicit instance owned here; nothing is global. `close()`
//! stops tracking, detaches the observers it registered and stops the cache
//! sweep task.

use crate::address::cache::AddressCache;
use crate::address::AddressExtractor;
use crate::change_detection::{AddressChangeEvent, ChangeDetectionCoordinator};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::geocoder::reverse::ReverseGeocoderBuilder;
use crate::geocoder::{AddressEvent, ReverseGeocoder};
use crate::geolocation::{
    GeolocationProvider, GeolocationService, PermissionState, PositionOptions, WatchId,
};
use crate::observer::Observer;
use crate::position::manager::{PositionGate, PositionManager, PositionUpdate};
use crate::position::state::GeocodingState;
use crate::position::Position;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::info;

/// Owns and wires every pipeline component
pub struct GeocodingManager<P: GeolocationProvider> {
    position_manager: Arc<PositionManager>,
    state: Arc<GeocodingState>,
    service: GeolocationService<P>,
    geocoder: ReverseGeocoder,
    coordinator: Arc<ChangeDetectionCoordinator>,
    cache: Option<Arc<AddressCache>>,
    wired: Vec<Arc<dyn Observer<PositionUpdate>>>,
    closed: AtomicBool,
}

impl<P: GeolocationProvider> GeocodingManager<P> {
    /// Build the pipeline from configuration
    ///
    /// Must be called inside a tokio runtime when the cache is enabled, since
    /// the cache sweep task is spawned here.
    pub fn new(config: &Config, provider: P) -> Result<Self> {
        Self::with_geocoder(config, provider, ReverseGeocoderBuilder::from_config(&config.geocoder))
    }

    /// Build the pipeline with a customised geocoder (e.g. an injected fetch manager)
    pub fn with_geocoder(config: &Config, provider: P, builder: ReverseGeocoderBuilder) -> Result<Self> {
        let position_manager = Arc::new(PositionManager::new(PositionGate::from_config(
            &config.position,
        )));
        let state = Arc::new(GeocodingState::new());

        let cache = config.cache.enabled.then(|| {
            let cache = Arc::new(AddressCache::from_config(&config.cache));
            cache.spawn_cleanup(Duration::from_secs(config.cache.cleanup_interval_secs.max(1)));
            cache
        });

        let mut builder = builder.extractor(Arc::new(AddressExtractor::new()));
        if let Some(cache) = &cache {
            builder = builder.cache(Arc::clone(cache));
        }
        let geocoder = builder.build()?;

        let coordinator = ChangeDetectionCoordinator::new(Arc::clone(&state), geocoder.clone());
        coordinator.setup_change_detection();

        // State first, so change events see the position that caused them
        let state_sink = Arc::clone(&state);
        let state_observer =
            position_manager.subscribe_fn(move |update: &PositionUpdate| {
                state_sink.set_position(Some(update.position));
            });
        let geocoder_observer: Arc<dyn Observer<PositionUpdate>> = Arc::new(geocoder.clone());
        position_manager.subscribe(Arc::clone(&geocoder_observer));

        let service = GeolocationService::new(
            Arc::new(provider),
            Arc::clone(&position_manager),
            PositionOptions::from_config(&config.geolocation),
        );

        info!(
            "Geocoding pipeline ready (provider {}, cache {})",
            service.provider().name(),
            if cache.is_some() { "on" } else { "off" }
        );

        Ok(Self {
            position_manager,
            state,
            service,
            geocoder,
            coordinator,
            cache,
            wired: vec![state_observer, geocoder_observer],
            closed: AtomicBool::new(false),
        })
    }

    /// Request one position; geocoding follows in the background
    pub async fn locate_once(&self) -> Result<Position> {
        self.service.get_single_location_update().await
    }

    /// Request one position and wait for its address
    ///
    /// When the gate does not republish the fix (too close to the last one),
    /// the position is geocoded directly.
    pub async fn locate_address(&self, wait: Duration) -> Result<AddressEvent> {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let listener = self.geocoder.subscribe_fn(move |event: &AddressEvent| {
            let _ = tx.send(event.clone());
        });

        let result = self.locate_and_wait(&mut rx, wait).await;
        self.geocoder.unsubscribe(&listener);
        result
    }

    async fn locate_and_wait(
        &self,
        rx: &mut mpsc::UnboundedReceiver<AddressEvent>,
        wait: Duration,
    ) -> Result<AddressEvent> {
        let position = self.locate_once().await?;

        if self.position_manager.last_position() != Some(position) {
            self.geocoder.geocode_position(position).await?;
        }

        let event = tokio::time::timeout(wait, rx.recv())
            .await
            .map_err(|_| Error::Timeout("no address within the wait time".to_string()))?
            .ok_or_else(|| Error::Geocoding("address listener closed".to_string()))?;

        match &event.error {
            Some(failure) => Err(Error::Geocoding(failure.detail.clone())),
            None => Ok(event),
        }
    }

    /// Start continuous tracking
    pub fn start_tracking(&self) -> Result<WatchId> {
        self.service.watch_current_location()
    }

    /// Stop continuous tracking
    pub fn stop_tracking(&self) -> bool {
        self.service.stop_watching()
    }

    pub fn is_tracking(&self) -> bool {
        self.service.is_watching()
    }

    pub async fn check_permissions(&self) -> PermissionState {
        self.service.check_permissions().await
    }

    pub fn subscribe_address(&self, observer: Arc<dyn Observer<AddressEvent>>) {
        self.geocoder.subscribe(observer);
    }

    pub fn subscribe_address_fn<F>(&self, f: F) -> Arc<dyn Observer<AddressEvent>>
    where
        F: Fn(&AddressEvent) + Send + Sync + 'static,
    {
        self.geocoder.subscribe_fn(f)
    }

    pub fn subscribe_changes(&self, observer: Arc<dyn Observer<AddressChangeEvent>>) {
        self.coordinator.subscribe(observer);
    }

    pub fn subscribe_changes_fn<F>(&self, f: F) -> Arc<dyn Observer<AddressChangeEvent>>
    where
        F: Fn(&AddressChangeEvent) + Send + Sync + 'static,
    {
        self.coordinator.subscribe_fn(f)
    }

    pub fn subscribe_position_fn<F>(&self, f: F) -> Arc<dyn Observer<PositionUpdate>>
    where
        F: Fn(&PositionUpdate) + Send + Sync + 'static,
    {
        self.position_manager.subscribe_fn(f)
    }

    pub fn position_manager(&self) -> &Arc<PositionManager> {
        &self.position_manager
    }

    pub fn state(&self) -> &Arc<GeocodingState> {
        &self.state
    }

    pub fn service(&self) -> &GeolocationService<P> {
        &self.service
    }

    pub fn geocoder(&self) -> &ReverseGeocoder {
        &self.geocoder
    }

    pub fn coordinator(&self) -> &Arc<ChangeDetectionCoordinator> {
        &self.coordinator
    }

    pub fn cache(&self) -> Option<&Arc<AddressCache>> {
        self.cache.as_ref()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Tear the pipeline down. Safe to call more than once.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        if self.service.is_watching() {
            self.service.stop_watching();
        }
        for observer in &self.wired {
            self.position_manager.unsubscribe(observer);
        }
        self.coordinator.remove_all_change_detection();
        if let Some(cache) = &self.cache {
            cache.close();
        }
        info!("Geocoding pipeline closed");
    }
}

impl<P: GeolocationProvider> Drop for GeocodingManager<P> {
    fn drop(&mut self) {
        self.close();
    }
}
