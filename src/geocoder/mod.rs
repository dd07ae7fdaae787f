//! Reverse geocoding over HTTP
//!
//! The `FetchManager` trait is the seam for the HTTP call: `ReverseGeocoder`
//! uses an injected fetch manager when one is given and falls back to
//! `HttpFetcher` (reqwest) otherwise.
//!
//! Uses the Nominatim API. Its usage policy requires an identifying
//! User-Agent and allows about one request per second.

pub mod reverse;

use crate::address::RawAddressResponse;
use crate::config::GeocoderConfig;
use crate::constants::api::NOMINATIM_ZOOM;
use crate::error::{Error, Result};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT_LANGUAGE};
use reqwest::StatusCode;
use std::future::Future;
use std::pin::Pin;

pub use reverse::{AddressEvent, GeocodeFailure, GeocodeOutcome, ReverseGeocoder};

/// Boxed future returned by `FetchManager::fetch`
pub type FetchFuture<'a> = Pin<Box<dyn Future<Output = Result<serde_json::Value>> + Send + 'a>>;

/// Performs the GET request for a fully built URL and returns the JSON body
///
/// Object safe so it can be injected as `Arc<dyn FetchManager>`.
pub trait FetchManager: Send + Sync {
    fn fetch<'a>(&'a self, url: &'a str) -> FetchFuture<'a>;
}

/// Plain reqwest fetcher
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new(user_agent: &str, accept_language: &str) -> Result<Self> {
        let mut headers = HeaderMap::new();
        if let Ok(value) = HeaderValue::from_str(accept_language) {
            headers.insert(ACCEPT_LANGUAGE, value);
        }

        let client = reqwest::Client::builder()
            .user_agent(user_agent)
            .default_headers(headers)
            .build()?;

        Ok(Self { client })
    }

    pub fn from_config(config: &GeocoderConfig) -> Result<Self> {
        Self::new(&config.user_agent, &config.accept_language)
    }

    async fn get_json(&self, url: &str) -> Result<serde_json::Value> {
        let response = self.client.get(url).send().await?;
        check_status(response.status())?;
        Ok(response.json().await?)
    }
}

impl FetchManager for HttpFetcher {
    fn fetch<'a>(&'a self, url: &'a str) -> FetchFuture<'a> {
        Box::pin(self.get_json(url))
    }
}

/// Map HTTP status codes to error kinds
pub fn check_status(status: StatusCode) -> Result<()> {
    match status.as_u16() {
        429 => Err(Error::RateLimited),
        425 => Err(Error::TemporarilyUnavailable),
        _ if status.is_success() => Ok(()),
        code => Err(Error::HttpStatus(code)),
    }
}

/// Build the reverse geocoding URL for a base endpoint
pub fn build_reverse_url(base_url: &str, lat: f64, lon: f64) -> String {
    let separator = if base_url.contains('?') { '&' } else { '?' };
    format!(
        "{}{}format=json&lat={}&lon={}&zoom={}&addressdetails=1",
        base_url, separator, lat, lon, NOMINATIM_ZOOM
    )
}

/// Wrap a target URL for a CORS proxy of the `https://proxy/?url=` kind
pub fn proxy_url(proxy: &str, target: &str) -> String {
    format!("{}{}", proxy, urlencoding::encode(target))
}

/// Turn a JSON body into a raw address response
///
/// Nominatim reports "Unable to geocode" and similar as `{"error": "..."}`
/// with status 200.
pub fn parse_response(value: serde_json::Value) -> Result<RawAddressResponse> {
    if let Some(message) = value.get("error") {
        let message = message
            .as_str()
            .map(str::to_string)
            .or_else(|| {
                message
                    .get("message")
                    .and_then(|m| m.as_str())
                    .map(str::to_string)
            })
            .unwrap_or_else(|| message.to_string());
        return Err(Error::Geocoding(message));
    }
    Ok(serde_json::from_value(value)?)
}
