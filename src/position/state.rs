//! Current position store
//!
//! Single source of truth for "where is the user now". Callbacks are a plain
//! list, separate from `ObserverSubject`.

use crate::error::Result;
use crate::position::{Coordinates, Position};
use std::sync::{Arc, RwLock};

/// What subscribers receive after each change
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PositionSnapshot {
    pub position: Option<Position>,
    pub coordinates: Option<Coordinates>,
}

/// Callback registered with `GeocodingState::subscribe`
pub type StateCallback = Arc<dyn Fn(&PositionSnapshot) + Send + Sync>;

#[derive(Debug, Default)]
struct Inner {
    current: Option<Position>,
    previous: Option<Position>,
}

/// Current and previous position
#[derive(Default)]
pub struct GeocodingState {
    inner: RwLock<Inner>,
    callbacks: RwLock<Vec<StateCallback>>,
}

impl GeocodingState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a new position (or clear it with `None`)
    ///
    /// The current value moves to `previous` and every callback is invoked
    /// with the new snapshot.
    pub fn set_position(&self, position: Option<Position>) {
        {
            let mut inner = self.inner.write().unwrap_or_else(|e| e.into_inner());
            inner.previous = inner.current.take();
            inner.current = position;
        }

        let snapshot = PositionSnapshot {
            position,
            coordinates: position.map(|p| p.coordinates()),
        };
        let callbacks = self
            .callbacks
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone();
        for callback in callbacks {
            callback(&snapshot);
        }
    }

    /// Store a position given as untyped JSON
    ///
    /// `null` clears the state; anything else must be a position object or
    /// `Error::InvalidPosition` is returned and the state is left untouched.
    pub fn set_position_value(&self, value: &serde_json::Value) -> Result<()> {
        let position = if value.is_null() {
            None
        } else {
            Some(Position::from_value(value)?)
        };
        self.set_position(position);
        Ok(())
    }

    pub fn current_position(&self) -> Option<Position> {
        self.inner.read().unwrap_or_else(|e| e.into_inner()).current
    }

    pub fn previous_position(&self) -> Option<Position> {
        self.inner.read().unwrap_or_else(|e| e.into_inner()).previous
    }

    /// Coordinates of the current position, as an independent copy
    pub fn current_coordinates(&self) -> Option<Coordinates> {
        self.current_position().map(|p| p.coordinates())
    }

    pub fn has_position(&self) -> bool {
        self.current_position().is_some()
    }

    pub fn subscribe(&self, callback: StateCallback) {
        self.callbacks
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .push(callback);
    }

    /// Remove a callback; returns false if it was not subscribed
    pub fn unsubscribe(&self, callback: &StateCallback) -> bool {
        let mut callbacks = self.callbacks.write().unwrap_or_else(|e| e.into_inner());
        let before = callbacks.len();
        callbacks.retain(|c| {
            !std::ptr::eq(Arc::as_ptr(c) as *const (), Arc::as_ptr(callback) as *const ())
        });
        callbacks.len() != before
    }

    pub fn subscriber_count(&self) -> usize {
        self.callbacks.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Clear both positions without notifying
    pub fn clear(&self) {
        let mut inner = self.inner.write().unwrap_or_else(|e| e.into_inner());
        inner.current = None;
        inner.previous = None;
    }
}

impl std::fmt::Debug for GeocodingState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeocodingState")
            .field("current", &self.current_position())
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}
