//! HTTP API routes
//!
//! Defines all REST API endpoints for the server.

use crate::address::{AddressExtractor, StandardizedAddress};
use crate::error::Error;
use crate::position::Coordinates;
use crate::server::state::AppState;

use axum::{
    extract::{rejection::QueryRejection, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::warn;

/// Create the API router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/status", get(status_handler))
        .route("/api/address", get(address_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// API error response
#[derive(Debug, Serialize)]
pub struct ApiError {
    pub error: String,
    /// Portuguese text for the end user
    pub message: String,
    pub code: String,
    #[serde(skip)]
    pub status: StatusCode,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        (self.status, Json(self)).into_response()
    }
}

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        let (status, code) = match &err {
            Error::InvalidCoordinates(_) => (StatusCode::BAD_REQUEST, "INVALID_COORDINATES"),
            Error::RateLimited => (StatusCode::TOO_MANY_REQUESTS, "RATE_LIMITED"),
            Error::TemporarilyUnavailable => (StatusCode::SERVICE_UNAVAILABLE, "UNAVAILABLE"),
            Error::Geocoding(_) => (StatusCode::NOT_FOUND, "ADDRESS_NOT_FOUND"),
            Error::Cors(_) | Error::HttpStatus(_) | Error::Http(_) | Error::Json(_) => {
                (StatusCode::BAD_GATEWAY, "UPSTREAM_ERROR")
            }
            _ => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
        };
        let err = err.without_url();
        ApiError {
            error: err.to_string(),
            message: err.user_message(),
            code: code.to_string(),
            status,
        }
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        Error::InvalidCoordinates(rejection.body_text()).into()
    }
}

/// Status response
#[derive(Debug, Serialize, Deserialize)]
pub struct StatusResponse {
    pub running: bool,
    pub version: String,
    pub uptime_secs: u64,
    /// Reverse geocoding endpoint in use
    pub geocoder: String,
    pub cache_entries: Option<usize>,
}

/// Server status endpoint
///
/// GET /api/status
async fn status_handler(State(state): State<Arc<AppState>>) -> Json<StatusResponse> {
    Json(StatusResponse {
        running: true,
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_secs: state.uptime_secs(),
        geocoder: state.geocoder.base_url().to_string(),
        cache_entries: state.cache.as_ref().map(|c| c.len()),
    })
}

/// Address query parameters
#[derive(Debug, Deserialize)]
pub struct AddressQuery {
    pub lat: f64,
    pub lon: f64,
}

/// Address response
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddressResponse {
    pub lat: f64,
    pub lon: f64,
    pub address: StandardizedAddress,
    /// One-line Brazilian format
    pub formatted: String,
    pub display_name: Option<String>,
}

/// Reverse geocode coordinates into a standardized address
///
/// GET /api/address?lat=-23.5505&lon=-46.6333
async fn address_handler(
    State(state): State<Arc<AppState>>,
    query: Result<Query<AddressQuery>, QueryRejection>,
) -> Result<Json<AddressResponse>, ApiError> {
    let Query(query) = query?;
    let coordinates = Coordinates::new(query.lat, query.lon);
    coordinates.validate()?;

    let raw = state.geocoder.lookup(coordinates).await.map_err(|e| {
        let e = e.without_url();
        warn!("Address lookup failed: {}", e);
        e
    })?;
    let address = AddressExtractor::get_brazilian_standard_address(&raw);

    Ok(Json(AddressResponse {
        lat: query.lat,
        lon: query.lon,
        formatted: address.to_brazilian_format(),
        address,
        display_name: raw.display_name,
    }))
}
