//! Brazilian address standardization
//!
//! Field priorities (first non-empty wins):
//! - logradouro: road, street, pedestrian, footway, path
//! - bairro: neighbourhood, suburb, quarter, hamlet
//! - municipio: city, town, city_district, municipality, village
//! - siglaUF: `ISO3166-2-lvl4` after the `-`, else looked up from the state name
//!
//! `AddressExtractor::process` also remembers the last standardized address
//! and fires a per-component callback when that component's value differs.

use crate::address::states::{state_for_uf, uf_for_state};
use crate::address::{AddressComponent, ChangeDetails, RawAddressResponse, StandardizedAddress};
use crate::constants::fields;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, RwLock};
use tracing::{debug, error};

/// Called with the change and the new standardized address
pub type ChangeCallback = Arc<dyn Fn(&ChangeDetails, &StandardizedAddress) + Send + Sync>;

#[derive(Default)]
struct Callbacks {
    logradouro: Option<ChangeCallback>,
    bairro: Option<ChangeCallback>,
    municipio: Option<ChangeCallback>,
}

impl Callbacks {
    fn get(&self, component: AddressComponent) -> Option<ChangeCallback> {
        match component {
            AddressComponent::Logradouro => self.logradouro.clone(),
            AddressComponent::Bairro => self.bairro.clone(),
            AddressComponent::Municipio => self.municipio.clone(),
        }
    }

    fn slot(&mut self, component: AddressComponent) -> &mut Option<ChangeCallback> {
        match component {
            AddressComponent::Logradouro => &mut self.logradouro,
            AddressComponent::Bairro => &mut self.bairro,
            AddressComponent::Municipio => &mut self.municipio,
        }
    }
}

/// Standardizes raw responses and detects component changes
#[derive(Default)]
pub struct AddressExtractor {
    last: RwLock<Option<StandardizedAddress>>,
    callbacks: RwLock<Callbacks>,
}

impl AddressExtractor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Derive the standardized address from a raw response
    pub fn get_brazilian_standard_address(raw: &RawAddressResponse) -> StandardizedAddress {
        let owned = |v: Option<&str>| v.map(str::to_string);

        let mut uf = owned(raw.address_field("state"));
        let mut sigla_uf = raw
            .address_field(fields::STATE_ISO)
            .and_then(|iso| iso.split_once('-'))
            .map(|(_, code)| code.trim().to_uppercase())
            .filter(|code| !code.is_empty());

        if sigla_uf.is_none() {
            sigla_uf = uf.as_deref().and_then(uf_for_state).map(str::to_string);
        }
        if uf.is_none() {
            uf = sigla_uf.as_deref().and_then(state_for_uf).map(str::to_string);
        }

        StandardizedAddress {
            logradouro: owned(raw.first_field(fields::LOGRADOURO)),
            numero: owned(raw.address_field("house_number")),
            bairro: owned(raw.first_field(fields::BAIRRO)),
            municipio: owned(raw.first_field(fields::MUNICIPIO)),
            uf,
            sigla_uf,
            cep: owned(raw.address_field("postcode")),
            pais: owned(raw.address_field("country")),
        }
    }

    /// Standardize `raw`, remember it, and fire change callbacks
    ///
    /// The first address has nothing to compare with and fires no callbacks.
    pub fn process(&self, raw: &RawAddressResponse) -> StandardizedAddress {
        let current = Self::get_brazilian_standard_address(raw);
        let previous = self
            .last
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .replace(current.clone());

        if let Some(previous) = previous {
            for component in AddressComponent::ALL {
                let details = ChangeDetails::between(component, &previous, &current);
                if details.has_changed {
                    self.fire(&details, &current);
                }
            }
        }

        current
    }

    fn fire(&self, details: &ChangeDetails, current: &StandardizedAddress) {
        let callback = self
            .callbacks
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(details.component);

        let Some(callback) = callback else {
            debug!("No callback registered for {} change", details.component);
            return;
        };

        if catch_unwind(AssertUnwindSafe(|| callback(details, current))).is_err() {
            error!("{} change callback panicked", details.component);
        }
    }

    /// Last standardized address
    pub fn last_address(&self) -> Option<StandardizedAddress> {
        self.last.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Register (or clear with `None`) the callback for one component
    pub fn set_change_callback(&self, component: AddressComponent, callback: Option<ChangeCallback>) {
        *self
            .callbacks
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .slot(component) = callback;
    }

    pub fn set_logradouro_change_callback(&self, callback: Option<ChangeCallback>) {
        self.set_change_callback(AddressComponent::Logradouro, callback);
    }

    pub fn set_bairro_change_callback(&self, callback: Option<ChangeCallback>) {
        self.set_change_callback(AddressComponent::Bairro, callback);
    }

    pub fn set_municipio_change_callback(&self, callback: Option<ChangeCallback>) {
        self.set_change_callback(AddressComponent::Municipio, callback);
    }

    pub fn has_change_callback(&self, component: AddressComponent) -> bool {
        self.callbacks
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(component)
            .is_some()
    }

    /// Forget the last address
    pub fn reset(&self) {
        *self.last.write().unwrap_or_else(|e| e.into_inner()) = None;
    }
}

impl std::fmt::Debug for AddressExtractor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AddressExtractor")
            .field("last", &self.last_address())
            .finish_non_exhaustive()
    }
}
