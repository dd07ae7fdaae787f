//! Position in, standardized address and change events out, against a mock Nominatim

use guia_turistico::constants::events::{ADDRESS_FETCHED_EVENT, BAIRRO_CHANGED};
use guia_turistico::geolocation::replay::{ReplayProvider, ReplayStep};
use guia_turistico::{AddressChangeEvent, AddressEvent, Config, GeocodingManager, Position};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn nominatim_body(road: &str, suburb: &str) -> serde_json::Value {
    serde_json::json!({
        "place_id": 1,
        "display_name": format!("{}, {}, São Paulo, Brasil", road, suburb),
        "address": {
            "road": road,
            "suburb": suburb,
            "city": "São Paulo",
            "state": "São Paulo",
            "ISO3166-2-lvl4": "BR-SP",
            "postcode": "01001-000",
            "country": "Brasil"
        }
    })
}

async fn mock_nominatim(responses: &[(&str, serde_json::Value)]) -> MockServer {
    let server = MockServer::start().await;
    for (lat, body) in responses {
        Mock::given(method("GET"))
            .and(path("/reverse"))
            .and(query_param("lat", *lat))
            .and(query_param("format", "json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(body.clone()))
            .mount(&server)
            .await;
    }
    server
}

fn config_for(server: &MockServer) -> Config {
    let mut config = Config::default();
    config.geocoder.base_url = format!("{}/reverse", server.uri());
    config.cache.enabled = false;
    config
}

fn recorder<T: Clone + Send + 'static>() -> (Arc<Mutex<Vec<T>>>, impl Fn(&T) + Send + Sync + 'static) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    (seen, move |event: &T| sink.lock().unwrap().push(event.clone()))
}

#[tokio::test]
async fn test_sao_paulo_position_to_standardized_address() {
    let server = mock_nominatim(&[("-23.5505", nominatim_body("Praça da Sé", "Sé"))]).await;
    let provider = ReplayProvider::new(vec![ReplayStep::fix(
        Position::new(-23.5505, -46.6333, 10.0, 1_700_000_000_000).unwrap(),
    )]);
    let manager = GeocodingManager::new(&config_for(&server), provider).unwrap();

    let (first, first_fn) = recorder::<AddressEvent>();
    let (second, second_fn) = recorder::<AddressEvent>();
    manager.subscribe_address_fn(first_fn);
    manager.subscribe_address_fn(second_fn);

    let event = manager.locate_address(Duration::from_secs(5)).await.unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;

    let address = event.standardized.unwrap();
    assert_eq!(address.logradouro.as_deref(), Some("Praça da Sé"));
    assert_eq!(address.municipio.as_deref(), Some("São Paulo"));
    assert_eq!(address.sigla_uf.as_deref(), Some("SP"));
    assert_eq!(address.pais.as_deref(), Some("Brasil"));

    for seen in [first, second] {
        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].event, ADDRESS_FETCHED_EVENT);
        assert!(!seen[0].loading);
        assert!(seen[0].error.is_none());
    }

    manager.close();
}

#[tokio::test]
async fn test_tracking_reports_bairro_change_once() {
    let server = mock_nominatim(&[
        ("-23.5505", nominatim_body("Praça da Sé", "Sé")),
        ("-23.5431", nominatim_body("Praça da República", "República")),
    ])
    .await;
    let provider = ReplayProvider::new(vec![
        ReplayStep::fix(Position::new(-23.5505, -46.6333, 10.0, 1_700_000_000_000).unwrap()),
        ReplayStep::fix(Position::new(-23.5431, -46.6428, 10.0, 1_700_000_060_000).unwrap())
            .after_ms(300),
    ]);
    let manager = GeocodingManager::new(&config_for(&server), provider).unwrap();

    let (addresses, addresses_fn) = recorder::<AddressEvent>();
    let (changes, changes_fn) = recorder::<AddressChangeEvent>();
    manager.subscribe_address_fn(addresses_fn);
    manager.subscribe_changes_fn(changes_fn);

    manager.start_tracking().unwrap();
    tokio::time::sleep(Duration::from_millis(800)).await;
    manager.close();

    assert_eq!(addresses.lock().unwrap().len(), 2);

    let changes = changes.lock().unwrap();
    let bairro: Vec<_> = changes
        .iter()
        .filter(|c| c.change_type == BAIRRO_CHANGED)
        .collect();
    assert_eq!(bairro.len(), 1);
    assert_eq!(bairro[0].details.previous.as_deref(), Some("Sé"));
    assert_eq!(bairro[0].details.current.as_deref(), Some("República"));
    assert!(changes.iter().all(|c| c.change_type != "MunicipioChanged"));
}
