//! Geolocation providers
//!
//! This module defines the `GeolocationProvider` trait, the Rust side of the
//! platform "get current position" / "watch position" capability, and the
//! service that guards access to it.
//!
//! ## Flex Point
//! Adding a new provider requires:
//! 1. Create `src/geolocation/{provider}.rs` implementing `GeolocationProvider`
//! 2. Add `pub mod {provider};` below
//! 3. Handle its name in `cli::build_provider`

pub mod ip;
pub mod replay;
pub mod service;

use crate::config::GeolocationConfig;
use crate::error::Error;
use crate::position::Position;
use serde::{Deserialize, Serialize};
use std::future::Future;
use tokio::sync::mpsc;

pub use service::GeolocationService;

/// Identifier of an active watch
pub type WatchId = u64;

/// Result type produced by providers
pub type ProviderResult<T> = std::result::Result<T, ProviderError>;

/// Options passed to every provider request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PositionOptions {
    pub enable_high_accuracy: bool,
    pub timeout_ms: u64,
    pub maximum_age_ms: u64,
}

impl PositionOptions {
    pub fn from_config(config: &GeolocationConfig) -> Self {
        Self {
            enable_high_accuracy: config.enable_high_accuracy,
            timeout_ms: config.timeout_ms,
            maximum_age_ms: config.maximum_age_ms,
        }
    }
}

impl Default for PositionOptions {
    fn default() -> Self {
        Self::from_config(&GeolocationConfig::default())
    }
}

/// Raw provider failure: a numeric code and a message
///
/// Codes follow the platform convention (1 permission denied, 2 position
/// unavailable, 3 timeout). Code 0 means the capability is absent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderError {
    pub code: u16,
    pub message: String,
}

impl ProviderError {
    pub const NOT_SUPPORTED: u16 = 0;
    pub const PERMISSION_DENIED: u16 = 1;
    pub const POSITION_UNAVAILABLE: u16 = 2;
    pub const TIMEOUT: u16 = 3;

    pub fn new(code: u16, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn not_supported(message: impl Into<String>) -> Self {
        Self::new(Self::NOT_SUPPORTED, message)
    }

    pub fn permission_denied(message: impl Into<String>) -> Self {
        Self::new(Self::PERMISSION_DENIED, message)
    }

    pub fn position_unavailable(message: impl Into<String>) -> Self {
        Self::new(Self::POSITION_UNAVAILABLE, message)
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(Self::TIMEOUT, message)
    }
}

impl From<ProviderError> for Error {
    fn from(err: ProviderError) -> Self {
        match err.code {
            ProviderError::NOT_SUPPORTED => Error::NotSupported,
            ProviderError::PERMISSION_DENIED => Error::PermissionDenied(err.message),
            ProviderError::POSITION_UNAVAILABLE => Error::PositionUnavailable(err.message),
            ProviderError::TIMEOUT => Error::Timeout(err.message),
            code => Error::UnknownGeolocation {
                code,
                message: err.message,
            },
        }
    }
}

/// Geolocation permission as reported by the platform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PermissionState {
    Granted,
    Denied,
    Prompt,
}

impl std::fmt::Display for PermissionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Granted => write!(f, "granted"),
            Self::Denied => write!(f, "denied"),
            Self::Prompt => write!(f, "prompt"),
        }
    }
}

/// A started watch: its id and the stream of fixes/errors it produces
///
/// The stream ends when the provider has nothing more to report or the
/// watch is cleared.
#[derive(Debug)]
pub struct WatchHandle {
    pub id: WatchId,
    pub updates: mpsc::UnboundedReceiver<ProviderResult<Position>>,
}

/// Trait for platform geolocation capabilities
///
/// Implementations must be thread-safe (Send + Sync) to work with the async runtime.
pub trait GeolocationProvider: Send + Sync + 'static {
    /// Returns the provider name (e.g., "ip", "replay")
    fn name(&self) -> &'static str;

    /// Request one fix
    fn current_position(
        &self,
        options: &PositionOptions,
    ) -> impl Future<Output = ProviderResult<Position>> + Send;

    /// Start continuous updates
    fn watch_position(&self, options: &PositionOptions) -> ProviderResult<WatchHandle>;

    /// Stop a watch started by `watch_position`
    fn clear_watch(&self, id: WatchId);

    /// Query the permission state
    ///
    /// `None` means the provider has no permission capability.
    fn permission_state(
        &self,
    ) -> impl Future<Output = Option<ProviderResult<PermissionState>>> + Send {
        async { None }
    }
}
