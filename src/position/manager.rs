//! Position gate
//!
//! `PositionManager` keeps the last accepted fix and decides whether a new
//! one is worth republishing: the first fix always passes, later fixes pass
//! when the user moved far enough or enough time went by.

use crate::config::PositionConfig;
use crate::observer::{Observer, ObserverSubject};
use crate::position::Position;
use serde::Serialize;
use std::sync::{Arc, RwLock};
use tracing::debug;

/// Event republished for every accepted position
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PositionUpdate {
    /// The accepted fix
    pub position: Position,
    /// The previously accepted fix, if any
    pub previous: Option<Position>,
    /// Distance from the previous fix in meters
    pub distance_meters: Option<f64>,
}

/// Why a position was or was not republished
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum GateDecision {
    /// Accepted and republished to observers
    Accepted,
    /// Older than the last accepted position
    Stale,
    /// Accuracy radius above the configured maximum
    LowAccuracy { accuracy: f64 },
    /// Too close to the last position and too soon after it
    TooSoon { distance_meters: f64, elapsed_ms: i64 },
}

impl GateDecision {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Self::Accepted)
    }
}

/// Gate thresholds
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PositionGate {
    pub min_distance_meters: f64,
    pub min_interval_ms: i64,
    /// `None` disables the accuracy check
    pub max_accuracy_meters: Option<f64>,
}

impl PositionGate {
    pub fn from_config(config: &PositionConfig) -> Self {
        Self {
            min_distance_meters: config.min_distance_meters,
            min_interval_ms: config.min_interval_ms,
            max_accuracy_meters: (config.max_accuracy_meters > 0.0)
                .then_some(config.max_accuracy_meters),
        }
    }
}

impl Default for PositionGate {
    fn default() -> Self {
        Self::from_config(&PositionConfig::default())
    }
}

/// Holds the last accepted position and republishes accepted updates
#[derive(Debug)]
pub struct PositionManager {
    gate: PositionGate,
    last: RwLock<Option<Position>>,
    observers: ObserverSubject<PositionUpdate>,
}

impl PositionManager {
    pub fn new(gate: PositionGate) -> Self {
        Self {
            gate,
            last: RwLock::new(None),
            observers: ObserverSubject::new(),
        }
    }

    pub fn gate(&self) -> PositionGate {
        self.gate
    }

    /// Last accepted position
    pub fn last_position(&self) -> Option<Position> {
        *self.last.read().unwrap_or_else(|e| e.into_inner())
    }

    pub fn subscribe(&self, observer: Arc<dyn Observer<PositionUpdate>>) {
        self.observers.subscribe(observer);
    }

    pub fn subscribe_fn<F>(&self, f: F) -> Arc<dyn Observer<PositionUpdate>>
    where
        F: Fn(&PositionUpdate) + Send + Sync + 'static,
    {
        self.observers.subscribe_fn(f)
    }

    pub fn unsubscribe(&self, observer: &Arc<dyn Observer<PositionUpdate>>) -> usize {
        self.observers.unsubscribe(observer)
    }

    pub fn observer_count(&self) -> usize {
        self.observers.len()
    }

    /// Offer a new fix
    ///
    /// Observers are notified synchronously, after the lock on the last
    /// position is released, and only when the fix is accepted.
    pub fn update(&self, position: Position) -> GateDecision {
        let update = {
            let mut last = self.last.write().unwrap_or_else(|e| e.into_inner());
            let decision = self.evaluate(last.as_ref(), &position);
            if !decision.is_accepted() {
                debug!("Position not republished: {:?}", decision);
                return decision;
            }

            let previous = last.replace(position);
            PositionUpdate {
                position,
                previous,
                distance_meters: previous.map(|p| p.distance_to(&position)),
            }
        };

        debug!(
            "Position accepted (accuracy {:.0} m, {})",
            position.accuracy(),
            position.accuracy_quality()
        );
        self.observers.notify_observers(&update);
        GateDecision::Accepted
    }

    /// Forget the last accepted position so the next fix always passes
    pub fn reset(&self) {
        *self.last.write().unwrap_or_else(|e| e.into_inner()) = None;
    }

    fn evaluate(&self, last: Option<&Position>, position: &Position) -> GateDecision {
        if let Some(max) = self.gate.max_accuracy_meters {
            if position.accuracy() > max {
                return GateDecision::LowAccuracy {
                    accuracy: position.accuracy(),
                };
            }
        }

        let Some(last) = last else {
            return GateDecision::Accepted;
        };

        let elapsed_ms = position.timestamp() - last.timestamp();
        if elapsed_ms < 0 {
            return GateDecision::Stale;
        }

        let distance_meters = last.distance_to(position);
        if distance_meters >= self.gate.min_distance_meters
            || elapsed_ms >= self.gate.min_interval_ms
        {
            GateDecision::Accepted
        } else {
            GateDecision::TooSoon {
                distance_meters,
                elapsed_ms,
            }
        }
    }
}

impl Default for PositionManager {
    fn default() -> Self {
        Self::new(PositionGate::default())
    }
}
