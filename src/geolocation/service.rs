//! Guarded access to a geolocation provider
//!
//! States of the single-shot path: `Idle -> Pending -> (Resolved | Rejected) -> Idle`.
//! At most one single-shot request is in flight; a second one fails right
//! away with `Error::RequestPending`. Watching is an independent channel that
//! never looks at the pending flag.

use crate::error::{Error, Result};
use crate::geolocation::{
    GeolocationProvider, PermissionState, PositionOptions, ProviderError, WatchId,
};
use crate::position::manager::PositionManager;
use crate::position::Position;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{info, warn};

struct ActiveWatch {
    id: WatchId,
    task: JoinHandle<()>,
}

/// Clears the pending flag however the request ends (including cancellation)
struct PendingGuard<'a>(&'a AtomicBool);

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// De-duplicated access to a `GeolocationProvider`
pub struct GeolocationService<P: GeolocationProvider> {
    provider: Arc<P>,
    position_manager: Arc<PositionManager>,
    options: PositionOptions,
    pending: AtomicBool,
    last_known: Arc<RwLock<Option<Position>>>,
    watch: Mutex<Option<ActiveWatch>>,
}

impl<P: GeolocationProvider> GeolocationService<P> {
    pub fn new(
        provider: Arc<P>,
        position_manager: Arc<PositionManager>,
        options: PositionOptions,
    ) -> Self {
        Self {
            provider,
            position_manager,
            options,
            pending: AtomicBool::new(false),
            last_known: Arc::new(RwLock::new(None)),
            watch: Mutex::new(None),
        }
    }

    pub fn provider(&self) -> &Arc<P> {
        &self.provider
    }

    pub fn options(&self) -> PositionOptions {
        self.options
    }

    /// Request one fix from the provider
    ///
    /// On success the fix is stored as the last known position and offered
    /// to the position manager. Provider failures are mapped to the typed
    /// error kinds; only the message is logged.
    pub async fn get_single_location_update(&self) -> Result<Position> {
        if self
            .pending
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(Error::RequestPending);
        }
        let guard = PendingGuard(&self.pending);

        let timeout = Duration::from_millis(self.options.timeout_ms);
        let outcome =
            match tokio::time::timeout(timeout, self.provider.current_position(&self.options))
                .await
            {
                Ok(result) => result,
                Err(_) => Err(ProviderError::timeout(format!(
                    "No position within {} ms",
                    self.options.timeout_ms
                ))),
            };
        drop(guard);

        match outcome {
            Ok(position) => {
                self.remember(position);
                self.position_manager.update(position);
                Ok(position)
            }
            Err(provider_error) => {
                let err = Error::from(provider_error);
                warn!("Geolocation request failed: {}", err);
                Err(err)
            }
        }
    }

    /// Start continuous tracking
    ///
    /// Idempotent: while a watch is active its id is returned and the
    /// provider is not asked again. Must be called inside a tokio runtime.
    pub fn watch_current_location(&self) -> Result<WatchId> {
        let mut watch = self.watch.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(active) = watch.as_ref() {
            return Ok(active.id);
        }

        let handle = self.provider.watch_position(&self.options).map_err(|e| {
            let err = Error::from(e);
            warn!("Could not start watching position: {}", err);
            err
        })?;

        let id = handle.id;
        let mut updates = handle.updates;
        let manager = Arc::clone(&self.position_manager);
        let last_known = Arc::clone(&self.last_known);
        let task = tokio::spawn(async move {
            while let Some(update) = updates.recv().await {
                match update {
                    Ok(position) => {
                        *last_known.write().unwrap_or_else(|e| e.into_inner()) = Some(position);
                        manager.update(position);
                    }
                    Err(provider_error) => {
                        warn!("Watch update failed: {}", Error::from(provider_error));
                    }
                }
            }
        });

        info!("Started watching position via {} (watch {})", self.provider.name(), id);
        *watch = Some(ActiveWatch { id, task });
        Ok(id)
    }

    /// Stop tracking. Returns false (and logs) when not watching.
    pub fn stop_watching(&self) -> bool {
        let active = self.watch.lock().unwrap_or_else(|e| e.into_inner()).take();
        match active {
            Some(active) => {
                self.provider.clear_watch(active.id);
                active.task.abort();
                info!("Stopped watching position (watch {})", active.id);
                true
            }
            None => {
                info!("stop_watching called while not watching");
                false
            }
        }
    }

    pub fn is_watching(&self) -> bool {
        self.watch_id().is_some()
    }

    /// True once the provider's update stream of the active watch has ended
    pub fn watch_exhausted(&self) -> bool {
        self.watch
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .as_ref()
            .is_some_and(|w| w.task.is_finished())
    }

    pub fn watch_id(&self) -> Option<WatchId> {
        self.watch
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .as_ref()
            .map(|w| w.id)
    }

    /// Permission state, failing open to `Prompt`
    ///
    /// A missing capability or a failed query yields `Prompt`, so the caller
    /// can still try to request a position.
    pub async fn check_permissions(&self) -> PermissionState {
        match self.provider.permission_state().await {
            Some(Ok(state)) => state,
            Some(Err(e)) => {
                warn!("Permission query failed: {}", e.message);
                PermissionState::Prompt
            }
            None => PermissionState::Prompt,
        }
    }

    /// True while a single-shot request is in flight
    pub fn has_pending_request(&self) -> bool {
        self.pending.load(Ordering::Acquire)
    }

    pub fn last_known_position(&self) -> Option<Position> {
        *self.last_known.read().unwrap_or_else(|e| e.into_inner())
    }

    fn remember(&self, position: Position) {
        *self.last_known.write().unwrap_or_else(|e| e.into_inner()) = Some(position);
    }
}

impl<P: GeolocationProvider> Drop for GeolocationService<P> {
    fn drop(&mut self) {
        let active = self.watch.get_mut().unwrap_or_else(|e| e.into_inner()).take();
        if let Some(active) = active {
            self.provider.clear_watch(active.id);
            active.task.abort();
        }
    }
}
