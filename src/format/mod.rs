//! Output formatters
//!
//! Provides trait-based output formatting for address reports and change
//! events.

pub mod json;
pub mod text;

use crate::address::{AddressExtractor, RawAddressResponse, StandardizedAddress};
use crate::change_detection::AddressChangeEvent;
use crate::error::Result;
use crate::geocoder::{AddressEvent, GeocodeFailure};
use crate::position::{AccuracyQuality, Position};
use serde::{Deserialize, Serialize};

/// Information about an output format
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FormatInfo {
    /// Format name
    pub name: String,
    /// Format description
    pub description: String,
}

/// What `locate`, `reverse` and `track` print for one address
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AddressReport {
    pub position: Option<Position>,
    pub accuracy_quality: Option<AccuracyQuality>,
    pub address: Option<StandardizedAddress>,
    pub display_name: Option<String>,
    pub error: Option<GeocodeFailure>,
}

impl AddressReport {
    pub fn from_event(event: &AddressEvent) -> Self {
        Self {
            position: event.position,
            accuracy_quality: event.position.map(|p| p.accuracy_quality()),
            address: event.standardized.clone(),
            display_name: event.raw.as_ref().and_then(|r| r.display_name.clone()),
            error: event.error.clone(),
        }
    }

    pub fn from_raw(position: Option<Position>, raw: &RawAddressResponse) -> Self {
        Self {
            position,
            accuracy_quality: position.map(|p| p.accuracy_quality()),
            address: Some(AddressExtractor::get_brazilian_standard_address(raw)),
            display_name: raw.display_name.clone(),
            error: None,
        }
    }
}

/// Trait for output formatters
pub trait OutputFormatter: Send + Sync {
    /// Get the format name
    fn name(&self) -> &str;

    /// Get the format description
    fn description(&self) -> &str;

    /// Format one address report
    fn format(&self, report: &AddressReport) -> Result<String>;

    /// Format one component change
    fn format_change(&self, event: &AddressChangeEvent) -> Result<String>;
}

/// Get a formatter by name
pub fn get_formatter(name: &str) -> Option<Box<dyn OutputFormatter>> {
    match name.to_lowercase().as_str() {
        "json" => Some(Box::new(json::JsonFormatter)),
        "text" => Some(Box::new(text::TextFormatter)),
        _ => None,
    }
}

/// List all available formatters
pub fn available_formats() -> Vec<FormatInfo> {
    vec![
        FormatInfo {
            name: "json".to_string(),
            description: "JSON document per report".to_string(),
        },
        FormatInfo {
            name: "text".to_string(),
            description: "Human-readable Brazilian address".to_string(),
        },
    ]
}
