//! guia-turistico: where am I, as a Brazilian address
//!
//! A library and CLI tool that turns GPS positions into standardized Brazilian
//! addresses (logradouro, bairro, município, UF) through OpenStreetMap
//! Nominatim reverse geocoding, and tells observers when the user crosses
//! into a new street, neighbourhood or municipality.
//!
//! ## Features
//!
//! - Pluggable geolocation providers (IP geolocation, scripted replay)
//! - Distance/time gated position updates
//! - Reverse geocoding with rate-limit classification, proxy fallback and cache
//! - Change detection per address component, with Portuguese announcements
//! - HTTP API + CLI interface
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use guia_turistico::geocoder::ReverseGeocoder;
//! use guia_turistico::address::AddressExtractor;
//! use guia_turistico::config::Config;
//! use guia_turistico::position::Coordinates;
//!
//! # async fn example() -> guia_turistico::Result<()> {
//! let config = Config::default();
//! let geocoder = ReverseGeocoder::new(&config.geocoder)?;
//!
//! let raw = geocoder.lookup(Coordinates::new(-23.5505, -46.6333)).await?;
//! let address = AddressExtractor::get_brazilian_standard_address(&raw);
//! println!("{}", address.to_brazilian_format());
//! # Ok(())
//! # }
//! ```

pub mod address;
pub mod announce;
pub mod change_detection;
pub mod cli;
pub mod config;
pub mod constants;
pub mod error;
pub mod format;
pub mod geocoder;
pub mod geolocation;
pub mod manager;
pub mod observer;
pub mod position;
pub mod server;

// Re-export commonly used types
pub use address::{AddressComponent, AddressExtractor, ChangeDetails, RawAddressResponse, StandardizedAddress};
pub use change_detection::{AddressChangeEvent, ChangeDetectionCoordinator};
pub use config::Config;
pub use error::{Error, Result};
pub use geocoder::{AddressEvent, GeocodeOutcome, ReverseGeocoder};
pub use manager::GeocodingManager;
pub use observer::{Observer, ObserverSubject};
pub use position::{Coordinates, Position};
