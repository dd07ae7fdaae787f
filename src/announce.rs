//! Spoken-style announcements for address changes
//!
//! One geocode cycle can change several components at once. The announcer
//! collects the change events of a cycle and, when the cycle's
//! `AddressEvent` arrives, emits only the most important one:
//! municipio over bairro over logradouro.

use crate::address::{AddressComponent, StandardizedAddress};
use crate::change_detection::AddressChangeEvent;
use crate::error::Result;
use crate::geocoder::AddressEvent;
use crate::observer::Observer;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

/// Higher wins
pub fn priority(component: AddressComponent) -> u8 {
    match component {
        AddressComponent::Municipio => 3,
        AddressComponent::Bairro => 2,
        AddressComponent::Logradouro => 1,
    }
}

/// Text to announce
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Announcement {
    /// `None` for the first address of a session
    pub component: Option<AddressComponent>,
    pub text: String,
}

/// Phrase for one component change, `None` when the component disappeared
pub fn change_phrase(component: AddressComponent, address: &StandardizedAddress) -> Option<String> {
    match component {
        AddressComponent::Municipio => address
            .municipio_completo()
            .map(|m| format!("Você entrou no município de {}", m)),
        AddressComponent::Bairro => address
            .bairro
            .as_deref()
            .map(|b| format!("Você está agora no bairro {}", b)),
        AddressComponent::Logradouro => address
            .logradouro
            .as_deref()
            .map(|l| format!("Você está na {}", l)),
    }
}

/// Phrase describing where the user is
pub fn location_phrase(address: &StandardizedAddress) -> Option<String> {
    let location = address.to_brazilian_format();
    (!location.is_empty()).then(|| format!("Você está em {}", location))
}

/// Picks one announcement per geocode cycle and hands it to a sink
pub struct Announcer {
    pending: Mutex<Option<(u8, Announcement)>>,
    announced_first: AtomicBool,
    sink: Box<dyn Fn(&Announcement) + Send + Sync>,
}

impl Announcer {
    pub fn new<F>(sink: F) -> Self
    where
        F: Fn(&Announcement) + Send + Sync + 'static,
    {
        Self {
            pending: Mutex::new(None),
            announced_first: AtomicBool::new(false),
            sink: Box::new(sink),
        }
    }

    /// Queue a change, keeping the highest priority one
    pub fn offer(&self, component: AddressComponent, address: &StandardizedAddress) {
        let Some(text) = change_phrase(component, address) else {
            return;
        };
        let rank = priority(component);
        let mut pending = self.pending.lock().unwrap_or_else(|e| e.into_inner());
        if pending.as_ref().map_or(true, |(current, _)| rank > *current) {
            *pending = Some((
                rank,
                Announcement {
                    component: Some(component),
                    text,
                },
            ));
        }
    }

    /// Emit the queued announcement, if any
    pub fn flush(&self) -> Option<Announcement> {
        let announcement = self
            .pending
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take()
            .map(|(_, a)| a)?;
        (self.sink)(&announcement);
        Some(announcement)
    }
}

impl Observer<AddressChangeEvent> for Announcer {
    fn update(&self, event: &AddressChangeEvent) -> Result<()> {
        self.offer(event.details.component, &event.standardized);
        Ok(())
    }
}

impl Observer<AddressEvent> for Announcer {
    fn update(&self, event: &AddressEvent) -> Result<()> {
        let Some(address) = event.standardized.as_ref() else {
            return Ok(());
        };

        if self.flush().is_none() && !self.announced_first.swap(true, Ordering::SeqCst) {
            if let Some(text) = location_phrase(address) {
                (self.sink)(&Announcement {
                    component: None,
                    text,
                });
            }
        }
        self.announced_first.store(true, Ordering::SeqCst);
        Ok(())
    }
}

impl std::fmt::Debug for Announcer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Announcer")
            .field("announced_first", &self.announced_first.load(Ordering::SeqCst))
            .finish_non_exhaustive()
    }
}
