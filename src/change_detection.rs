//! Component-level address change notifications
//!
//! `ChangeDetectionCoordinator` registers with the address extractor for
//! logradouro, bairro and municipio changes and republishes each one as an
//! `AddressChangeEvent`. A change is a value difference of that one component
//! between consecutive standardized addresses; a different postcode alone
//! fires nothing.

use crate::address::extractor::ChangeCallback;
use crate::address::{
    AddressComponent, AddressExtractor, ChangeDetails, RawAddressResponse, StandardizedAddress,
};
use crate::geocoder::ReverseGeocoder;
use crate::observer::{NotifyReport, Observer, ObserverSubject};
use crate::position::state::GeocodingState;
use crate::position::Position;
use serde::Serialize;
use std::sync::{Arc, Weak};
use tracing::{debug, info};

/// Published for every detected component change
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AddressChangeEvent {
    /// Event name, e.g. "BairroChanged"
    pub change_type: &'static str,
    pub details: ChangeDetails,
    pub position: Option<Position>,
    pub raw_address: Option<RawAddressResponse>,
    pub standardized: StandardizedAddress,
}

/// Turns extractor change callbacks into observer notifications
pub struct ChangeDetectionCoordinator {
    extractor: Arc<AddressExtractor>,
    state: Arc<GeocodingState>,
    geocoder: ReverseGeocoder,
    observers: ObserverSubject<AddressChangeEvent>,
}

impl ChangeDetectionCoordinator {
    pub fn new(state: Arc<GeocodingState>, geocoder: ReverseGeocoder) -> Arc<Self> {
        Arc::new(Self {
            extractor: Arc::clone(geocoder.extractor()),
            state,
            geocoder,
            observers: ObserverSubject::new(),
        })
    }

    /// Register for all three components
    pub fn setup_change_detection(self: &Arc<Self>) {
        self.setup_logradouro_change_detection();
        self.setup_bairro_change_detection();
        self.setup_municipio_change_detection();
    }

    pub fn setup_logradouro_change_detection(self: &Arc<Self>) {
        self.extractor
            .set_logradouro_change_callback(Some(self.callback(Self::handle_logradouro_change)));
    }

    pub fn setup_bairro_change_detection(self: &Arc<Self>) {
        self.extractor
            .set_bairro_change_callback(Some(self.callback(Self::handle_bairro_change)));
    }

    pub fn setup_municipio_change_detection(self: &Arc<Self>) {
        self.extractor
            .set_municipio_change_callback(Some(self.callback(Self::handle_municipio_change)));
    }

    /// The extractor only holds a weak reference back to the coordinator
    fn callback(
        self: &Arc<Self>,
        handler: fn(&Self, &ChangeDetails, &StandardizedAddress) -> NotifyReport,
    ) -> ChangeCallback {
        let weak: Weak<Self> = Arc::downgrade(self);
        Arc::new(move |details: &ChangeDetails, standardized: &StandardizedAddress| {
            if let Some(coordinator) = weak.upgrade() {
                handler(&coordinator, details, standardized);
            }
        })
    }

    /// Unregister from the extractor
    pub fn remove_all_change_detection(&self) {
        for component in AddressComponent::ALL {
            self.extractor.set_change_callback(component, None);
        }
    }

    pub fn is_detecting(&self, component: AddressComponent) -> bool {
        self.extractor.has_change_callback(component)
    }

    pub fn handle_logradouro_change(
        &self,
        details: &ChangeDetails,
        standardized: &StandardizedAddress,
    ) -> NotifyReport {
        self.notify_address_change_observers(details, standardized)
    }

    pub fn handle_bairro_change(
        &self,
        details: &ChangeDetails,
        standardized: &StandardizedAddress,
    ) -> NotifyReport {
        self.notify_address_change_observers(details, standardized)
    }

    pub fn handle_municipio_change(
        &self,
        details: &ChangeDetails,
        standardized: &StandardizedAddress,
    ) -> NotifyReport {
        self.notify_address_change_observers(details, standardized)
    }

    /// Build the change event and notify every observer
    ///
    /// Details without an actual change are dropped.
    pub fn notify_address_change_observers(
        &self,
        details: &ChangeDetails,
        standardized: &StandardizedAddress,
    ) -> NotifyReport {
        if !details.has_changed {
            debug!("Ignoring unchanged {}", details.component);
            return NotifyReport::default();
        }

        let event = AddressChangeEvent {
            change_type: details.component.event_name(),
            details: details.clone(),
            position: self
                .state
                .current_position()
                .or_else(|| self.geocoder.current_position()),
            raw_address: self.geocoder.current_address(),
            standardized: standardized.clone(),
        };

        info!("{} changed", details.component);
        let report = self.observers.notify_observers(&event);
        if report.failed > 0 {
            debug!(
                "{} of {} change observers failed",
                report.failed,
                report.failed + report.delivered
            );
        }
        report
    }

    pub fn subscribe(&self, observer: Arc<dyn Observer<AddressChangeEvent>>) {
        self.observers.subscribe(observer);
    }

    pub fn subscribe_fn<F>(&self, f: F) -> Arc<dyn Observer<AddressChangeEvent>>
    where
        F: Fn(&AddressChangeEvent) + Send + Sync + 'static,
    {
        self.observers.subscribe_fn(f)
    }

    pub fn unsubscribe(&self, observer: &Arc<dyn Observer<AddressChangeEvent>>) -> usize {
        self.observers.unsubscribe(observer)
    }

    pub fn observer_count(&self) -> usize {
        self.observers.len()
    }
}

impl std::fmt::Debug for ChangeDetectionCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChangeDetectionCoordinator")
            .field("observers", &self.observers.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::events;
    use crate::error::{Error, Result};
    use crate::geocoder::{FetchFuture, FetchManager};
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Answers each request with the next scripted body
    struct Scripted(Mutex<VecDeque<serde_json::Value>>);

    impl FetchManager for Scripted {
        fn fetch<'a>(&'a self, _url: &'a str) -> FetchFuture<'a> {
            let next = self.0.lock().unwrap().pop_front();
            Box::pin(async move { next.ok_or_else(|| Error::Geocoding("script exhausted".into())) })
        }
    }

    struct Failing;

    impl Observer<AddressChangeEvent> for Failing {
        fn update(&self, _event: &AddressChangeEvent) -> Result<()> {
            Err(Error::Server("display offline".to_string()))
        }
    }

    fn body(road: &str, suburb: &str, city: &str, postcode: &str) -> serde_json::Value {
        serde_json::json!({
            "address": {
                "road": road,
                "suburb": suburb,
                "city": city,
                "postcode": postcode,
                "ISO3166-2-lvl4": "BR-SP",
                "country": "Brasil"
            }
        })
    }

    fn setup(bodies: Vec<serde_json::Value>) -> (Arc<ChangeDetectionCoordinator>, ReverseGeocoder, Arc<GeocodingState>) {
        let geocoder = ReverseGeocoder::builder()
            .fetch_manager(Arc::new(Scripted(Mutex::new(bodies.into()))))
            .build()
            .unwrap();
        let state = Arc::new(GeocodingState::new());
        let coordinator = ChangeDetectionCoordinator::new(Arc::clone(&state), geocoder.clone());
        coordinator.setup_change_detection();
        (coordinator, geocoder, state)
    }

    fn record(coordinator: &ChangeDetectionCoordinator) -> Arc<Mutex<Vec<AddressChangeEvent>>> {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        coordinator.subscribe_fn(move |event: &AddressChangeEvent| sink.lock().unwrap().push(event.clone()));
        seen
    }

    fn position(lat: f64) -> Position {
        Position::new(lat, -46.6333, 10.0, 1_700_000_000_000).unwrap()
    }

    #[tokio::test]
    async fn test_bairro_change_fires_once() {
        let (coordinator, geocoder, _state) = setup(vec![
            body("Rua Augusta", "Consolação", "São Paulo", "01305-000"),
            body("Rua Augusta", "Jardins", "São Paulo", "01412-000"),
        ]);
        let seen = record(&coordinator);

        geocoder.geocode_position(position(-23.5530)).await.unwrap();
        assert!(seen.lock().unwrap().is_empty());

        geocoder.geocode_position(position(-23.5610)).await.unwrap();
        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].change_type, events::BAIRRO_CHANGED);
        assert_eq!(seen[0].details.previous.as_deref(), Some("Consolação"));
        assert_eq!(seen[0].details.current.as_deref(), Some("Jardins"));
        assert_eq!(seen[0].standardized.bairro.as_deref(), Some("Jardins"));
        assert!(seen[0].raw_address.is_some());
    }

    #[tokio::test]
    async fn test_cep_only_change_fires_nothing() {
        let (coordinator, geocoder, _state) = setup(vec![
            body("Rua Augusta", "Consolação", "São Paulo", "01305-000"),
            body("Rua Augusta", "Consolação", "São Paulo", "01305-100"),
        ]);
        let seen = record(&coordinator);

        geocoder.geocode_position(position(-23.5530)).await.unwrap();
        geocoder.geocode_position(position(-23.5532)).await.unwrap();

        assert!(seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_each_changed_component_fires() {
        let (coordinator, geocoder, _state) = setup(vec![
            body("Rua Augusta", "Consolação", "São Paulo", "01305-000"),
            body("Avenida Brasil", "Centro", "Guarulhos", "07000-000"),
        ]);
        let seen = record(&coordinator);

        geocoder.geocode_position(position(-23.5530)).await.unwrap();
        geocoder.geocode_position(position(-23.4540)).await.unwrap();

        let types: Vec<_> = seen.lock().unwrap().iter().map(|e| e.change_type).collect();
        assert_eq!(
            types,
            vec![
                events::LOGRADOURO_CHANGED,
                events::BAIRRO_CHANGED,
                events::MUNICIPIO_CHANGED
            ]
        );
    }

    #[tokio::test]
    async fn test_event_carries_state_position() {
        let (coordinator, geocoder, state) = setup(vec![
            body("Rua A", "Sé", "São Paulo", ""),
            body("Rua B", "Sé", "São Paulo", ""),
        ]);
        let seen = record(&coordinator);
        state.set_position(Some(position(-23.5505)));

        geocoder.geocode_position(position(-23.5505)).await.unwrap();
        geocoder.geocode_position(position(-23.5509)).await.unwrap();

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].position, Some(position(-23.5505)));
    }

    #[tokio::test]
    async fn test_failing_observer_does_not_block_others() {
        let (coordinator, geocoder, _state) = setup(vec![
            body("Rua A", "Sé", "São Paulo", ""),
            body("Rua A", "República", "São Paulo", ""),
        ]);
        coordinator.subscribe(Arc::new(Failing));
        coordinator.subscribe_fn(|_| panic!("broken display"));
        let seen = record(&coordinator);

        geocoder.geocode_position(position(-23.5505)).await.unwrap();
        geocoder.geocode_position(position(-23.5435)).await.unwrap();

        assert_eq!(seen.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_remove_all_change_detection() {
        let (coordinator, geocoder, _state) = setup(vec![
            body("Rua A", "Sé", "São Paulo", ""),
            body("Rua B", "República", "Osasco", ""),
        ]);
        let seen = record(&coordinator);

        coordinator.remove_all_change_detection();
        assert!(!coordinator.is_detecting(AddressComponent::Bairro));

        geocoder.geocode_position(position(-23.5505)).await.unwrap();
        geocoder.geocode_position(position(-23.5325)).await.unwrap();

        assert!(seen.lock().unwrap().is_empty());
    }

    #[test]
    fn test_unchanged_details_are_dropped() {
        let (coordinator, _geocoder, _state) = setup(Vec::new());
        let seen = record(&coordinator);
        let address = StandardizedAddress::default();
        let details = ChangeDetails::between(AddressComponent::Bairro, &address, &address);

        let report = coordinator.handle_bairro_change(&details, &address);

        assert_eq!(report, NotifyReport::default());
        assert!(seen.lock().unwrap().is_empty());
    }

    #[test]
    fn test_dropped_coordinator_callback_is_inert() {
        let (coordinator, geocoder, _state) = setup(Vec::new());
        drop(coordinator);

        let extractor = geocoder.extractor();
        extractor.process(&RawAddressResponse::default());
        let mut raw = RawAddressResponse::default();
        raw.address.insert("road".to_string(), "Rua Nova".to_string());
        extractor.process(&raw);

        assert_eq!(extractor.last_address().unwrap().logradouro.as_deref(), Some("Rua Nova"));
    }
}
