//! Positions and coordinates
//!
//! This module handles:
//! - The validated `Position` record produced by geolocation providers
//! - Plain `Coordinates` pairs and haversine distance
//! - Accuracy quality classification
//! - The position gate (`manager`) and the current-position store (`state`)

pub mod manager;
pub mod state;

use crate::constants::geo::EARTH_RADIUS_METERS;
use crate::constants::position::{
    ACCURACY_BAD, ACCURACY_EXCELLENT, ACCURACY_GOOD, ACCURACY_MEDIUM,
};
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

/// A geographic coordinate (latitude, longitude)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub lat: f64,
    pub lng: f64,
}

impl Coordinates {
    /// Create new coordinates
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    /// Validate that coordinates are finite and within valid ranges
    ///
    /// Latitude: -90 to 90
    /// Longitude: -180 to 180
    pub fn validate(&self) -> Result<()> {
        if !self.lat.is_finite() || !(-90.0..=90.0).contains(&self.lat) {
            return Err(Error::InvalidCoordinates(format!(
                "Latitude {} is out of range [-90, 90]",
                self.lat
            )));
        }
        if !self.lng.is_finite() || !(-180.0..=180.0).contains(&self.lng) {
            return Err(Error::InvalidCoordinates(format!(
                "Longitude {} is out of range [-180, 180]",
                self.lng
            )));
        }
        Ok(())
    }
}

/// One GPS fix
///
/// Always holds validated values; construct with `Position::new` or by
/// deserializing (which runs the same checks).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawPosition")]
pub struct Position {
    latitude: f64,
    longitude: f64,
    accuracy: f64,
    timestamp: i64,
}

#[derive(Deserialize)]
struct RawPosition {
    latitude: f64,
    longitude: f64,
    accuracy: f64,
    timestamp: i64,
}

impl TryFrom<RawPosition> for Position {
    type Error = Error;

    fn try_from(raw: RawPosition) -> Result<Self> {
        Position::new(raw.latitude, raw.longitude, raw.accuracy, raw.timestamp)
    }
}

impl Position {
    /// Create a validated position
    ///
    /// `timestamp` is milliseconds since the Unix epoch.
    pub fn new(latitude: f64, longitude: f64, accuracy: f64, timestamp: i64) -> Result<Self> {
        Coordinates::new(latitude, longitude)
            .validate()
            .map_err(|e| Error::InvalidPosition(e.to_string()))?;

        if !accuracy.is_finite() || accuracy < 0.0 {
            return Err(Error::InvalidPosition(format!(
                "Accuracy must be a non-negative number, got {}",
                accuracy
            )));
        }

        Ok(Self {
            latitude,
            longitude,
            accuracy,
            timestamp,
        })
    }

    /// Create a position stamped with the current time
    pub fn now(latitude: f64, longitude: f64, accuracy: f64) -> Result<Self> {
        Self::new(
            latitude,
            longitude,
            accuracy,
            chrono::Utc::now().timestamp_millis(),
        )
    }

    /// Parse an untyped JSON value
    ///
    /// Anything that is not an object with numeric `latitude`, `longitude`,
    /// `accuracy` and `timestamp` is rejected with `Error::InvalidPosition`.
    pub fn from_value(value: &serde_json::Value) -> Result<Self> {
        if !value.is_object() {
            return Err(Error::InvalidPosition(format!(
                "Expected a position object, got {}",
                json_kind(value)
            )));
        }
        serde_json::from_value(value.clone()).map_err(|e| Error::InvalidPosition(e.to_string()))
    }

    pub fn latitude(&self) -> f64 {
        self.latitude
    }

    pub fn longitude(&self) -> f64 {
        self.longitude
    }

    /// Accuracy radius in meters
    pub fn accuracy(&self) -> f64 {
        self.accuracy
    }

    /// Milliseconds since the Unix epoch
    pub fn timestamp(&self) -> i64 {
        self.timestamp
    }

    pub fn coordinates(&self) -> Coordinates {
        Coordinates::new(self.latitude, self.longitude)
    }

    pub fn accuracy_quality(&self) -> AccuracyQuality {
        AccuracyQuality::from_meters(self.accuracy)
    }

    /// Distance in meters to another position
    pub fn distance_to(&self, other: &Position) -> f64 {
        haversine_distance(self.coordinates(), other.coordinates())
    }
}

fn json_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "a boolean",
        serde_json::Value::Number(_) => "a number",
        serde_json::Value::String(_) => "a string",
        serde_json::Value::Array(_) => "an array",
        serde_json::Value::Object(_) => "an object",
    }
}

/// Coarse classification of a fix's accuracy radius
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccuracyQuality {
    Excellent,
    Good,
    Medium,
    Bad,
    VeryBad,
}

impl AccuracyQuality {
    pub fn from_meters(accuracy: f64) -> Self {
        if accuracy <= ACCURACY_EXCELLENT {
            Self::Excellent
        } else if accuracy <= ACCURACY_GOOD {
            Self::Good
        } else if accuracy <= ACCURACY_MEDIUM {
            Self::Medium
        } else if accuracy <= ACCURACY_BAD {
            Self::Bad
        } else {
            Self::VeryBad
        }
    }
}

impl std::fmt::Display for AccuracyQuality {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Excellent => write!(f, "excellent"),
            Self::Good => write!(f, "good"),
            Self::Medium => write!(f, "medium"),
            Self::Bad => write!(f, "bad"),
            Self::VeryBad => write!(f, "very_bad"),
        }
    }
}

/// Calculate the distance between two points in meters (Haversine formula)
pub fn haversine_distance(p1: Coordinates, p2: Coordinates) -> f64 {
    let lat1 = p1.lat * PI / 180.0;
    let lat2 = p2.lat * PI / 180.0;
    let delta_lat = (p2.lat - p1.lat) * PI / 180.0;
    let delta_lng = (p2.lng - p1.lng) * PI / 180.0;

    let a = (delta_lat / 2.0).sin().powi(2)
        + lat1.cos() * lat2.cos() * (delta_lng / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());

    EARTH_RADIUS_METERS * c
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use serde_json::json;

    #[test]
    fn test_valid_position() {
        let pos = Position::new(-23.5505, -46.6333, 15.0, 1_700_000_000_000).unwrap();
        assert_eq!(pos.latitude(), -23.5505);
        assert_eq!(pos.longitude(), -46.6333);
        assert_eq!(pos.accuracy_quality(), AccuracyQuality::Good);
    }

    #[test]
    fn test_position_at_origin_is_valid() {
        assert!(Position::new(0.0, 0.0, 5.0, 0).is_ok());
    }

    #[test]
    fn test_invalid_positions() {
        assert!(matches!(
            Position::new(91.0, 0.0, 5.0, 0),
            Err(Error::InvalidPosition(_))
        ));
        assert!(Position::new(0.0, 181.0, 5.0, 0).is_err());
        assert!(Position::new(f64::NAN, 0.0, 5.0, 0).is_err());
        assert!(Position::new(0.0, 0.0, -1.0, 0).is_err());
        assert!(Position::new(0.0, 0.0, f64::INFINITY, 0).is_err());
    }

    #[test]
    fn test_from_value_accepts_position_object() {
        let value = json!({
            "latitude": -23.5505,
            "longitude": -46.6333,
            "accuracy": 12.0,
            "timestamp": 1_700_000_000_000i64
        });
        let pos = Position::from_value(&value).unwrap();
        assert_eq!(pos.timestamp(), 1_700_000_000_000);
    }

    #[test]
    fn test_from_value_rejects_non_positions() {
        for value in [
            json!(42),
            json!("São Paulo"),
            json!([1.0, 2.0]),
            json!(true),
            json!({"latitude": 1.0, "longitude": 2.0}),
            json!({"latitude": "x", "longitude": 2.0, "accuracy": 1.0, "timestamp": 0}),
            json!({"latitude": 100.0, "longitude": 2.0, "accuracy": 1.0, "timestamp": 0}),
        ] {
            assert!(
                matches!(Position::from_value(&value), Err(Error::InvalidPosition(_))),
                "accepted {}",
                value
            );
        }
    }

    #[test]
    fn test_accuracy_quality_thresholds() {
        assert_eq!(AccuracyQuality::from_meters(5.0), AccuracyQuality::Excellent);
        assert_eq!(AccuracyQuality::from_meters(30.0), AccuracyQuality::Good);
        assert_eq!(AccuracyQuality::from_meters(99.0), AccuracyQuality::Medium);
        assert_eq!(AccuracyQuality::from_meters(150.0), AccuracyQuality::Bad);
        assert_eq!(AccuracyQuality::from_meters(5000.0), AccuracyQuality::VeryBad);
    }

    #[test]
    fn test_haversine_distance() {
        // One degree of latitude is roughly 111 km
        let a = Coordinates::new(-23.0, -46.0);
        let b = Coordinates::new(-22.0, -46.0);
        let distance = haversine_distance(a, b);
        assert!((distance - 111_000.0).abs() < 1000.0);
    }

    #[test]
    fn test_distance_to_self_is_zero() {
        let pos = Position::new(-23.5505, -46.6333, 10.0, 0).unwrap();
        assert_relative_eq!(pos.distance_to(&pos), 0.0);
    }
}
