//! Address data model
//!
//! `RawAddressResponse` is the Nominatim reverse geocoding payload, kept as
//! opaque input. `StandardizedAddress` is the Brazilian address record derived
//! from it by `extractor::AddressExtractor`.

pub mod cache;
pub mod extractor;
pub mod states;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub use extractor::AddressExtractor;

/// Nominatim `/reverse?format=json` response
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawAddressResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub place_id: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub licence: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub osm_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub osm_id: Option<u64>,
    /// Latitude as returned (a decimal string)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lat: Option<String>,
    /// Longitude as returned (a decimal string)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lon: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub class: Option<String>,
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub place_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    /// Locale-specific keys such as `road`, `suburb`, `city_district`
    #[serde(default)]
    pub address: BTreeMap<String, String>,
    /// `[min_lat, max_lat, min_lon, max_lon]` as strings
    #[serde(default)]
    pub boundingbox: Vec<String>,
}

impl RawAddressResponse {
    /// Non-empty value of an `address` key
    pub fn address_field(&self, key: &str) -> Option<&str> {
        self.address
            .get(key)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
    }

    /// First non-empty value among `keys`, in order
    pub fn first_field(&self, keys: &[&str]) -> Option<&str> {
        keys.iter().find_map(|key| self.address_field(key))
    }
}

/// Address component tracked for changes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AddressComponent {
    Logradouro,
    Bairro,
    Municipio,
}

impl AddressComponent {
    pub const ALL: [AddressComponent; 3] = [Self::Logradouro, Self::Bairro, Self::Municipio];

    /// Event name carried by change notifications
    pub fn event_name(&self) -> &'static str {
        use crate::constants::events;
        match self {
            Self::Logradouro => events::LOGRADOURO_CHANGED,
            Self::Bairro => events::BAIRRO_CHANGED,
            Self::Municipio => events::MUNICIPIO_CHANGED,
        }
    }
}

impl std::fmt::Display for AddressComponent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Logradouro => write!(f, "logradouro"),
            Self::Bairro => write!(f, "bairro"),
            Self::Municipio => write!(f, "municipio"),
        }
    }
}

/// Brazilian standard address
///
/// Absent fields are `None` and serialize as `null`, never as an empty string.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StandardizedAddress {
    pub logradouro: Option<String>,
    pub numero: Option<String>,
    pub bairro: Option<String>,
    pub municipio: Option<String>,
    /// Full state name
    pub uf: Option<String>,
    /// Two-letter state code
    #[serde(rename = "siglaUF")]
    pub sigla_uf: Option<String>,
    pub cep: Option<String>,
    pub pais: Option<String>,
}

impl StandardizedAddress {
    /// Value of one tracked component
    pub fn component(&self, component: AddressComponent) -> Option<&str> {
        match component {
            AddressComponent::Logradouro => self.logradouro.as_deref(),
            AddressComponent::Bairro => self.bairro.as_deref(),
            AddressComponent::Municipio => self.municipio.as_deref(),
        }
    }

    /// Street with house number, e.g. "Rua Direita, 123"
    pub fn logradouro_completo(&self) -> Option<String> {
        let logradouro = self.logradouro.as_deref()?;
        Some(match self.numero.as_deref() {
            Some(numero) => format!("{}, {}", logradouro, numero),
            None => logradouro.to_string(),
        })
    }

    /// Municipality with state code, e.g. "São Paulo, SP"
    pub fn municipio_completo(&self) -> Option<String> {
        let municipio = self.municipio.as_deref()?;
        Some(match self.sigla_uf.as_deref() {
            Some(sigla) => format!("{}, {}", municipio, sigla),
            None => municipio.to_string(),
        })
    }

    /// One-line address: "Rua X, 123, Bairro, Cidade, UF, CEP"
    pub fn to_brazilian_format(&self) -> String {
        let parts = [
            self.logradouro_completo(),
            self.bairro.clone(),
            self.municipio_completo(),
            self.cep.clone(),
        ];
        parts.into_iter().flatten().collect::<Vec<_>>().join(", ")
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// Previous and current values of one component across an update
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeDetails {
    pub component: AddressComponent,
    pub previous: Option<String>,
    pub current: Option<String>,
    pub has_changed: bool,
}

impl ChangeDetails {
    /// Compare one component of two addresses
    pub fn between(
        component: AddressComponent,
        previous: &StandardizedAddress,
        current: &StandardizedAddress,
    ) -> Self {
        let before = previous.component(component).map(str::to_string);
        let after = current.component(component).map(str::to_string);
        Self {
            component,
            has_changed: before != after,
            previous: before,
            current: after,
        }
    }
}
