//! Scripted geolocation provider
//!
//! Plays back a fixed sequence of fixes and errors, each after an optional
//! delay. Single-shot requests consume the script one step at a time; a watch
//! streams every remaining step and then ends.
//!
//! Scripts can be loaded from JSON lines, one step per line:
//!
//! ```text
//! {"latitude": -23.5505, "longitude": -46.6333, "accuracy": 10, "timestamp": 1700000000000}
//! {"delay_ms": 2000, "latitude": -23.5489, "longitude": -46.6388, "accuracy": 12}
//! {"error": {"code": 1, "message": "User denied Geolocation"}}
//! ```
//!
//! A missing `timestamp` is filled with the wall-clock time at playback.

use crate::error::{Error, Result};
use crate::geolocation::{
    GeolocationProvider, PermissionState, PositionOptions, ProviderError, ProviderResult,
    WatchHandle, WatchId,
};
use crate::position::Position;
use serde::Deserialize;
use std::collections::{HashMap, VecDeque};
use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// What a step yields
#[derive(Debug, Clone, PartialEq)]
pub enum ReplayOutcome {
    Fix(Position),
    /// A fix stamped with the playback time
    FixNow { latitude: f64, longitude: f64, accuracy: f64 },
    Error(ProviderError),
}

/// One scripted step
#[derive(Debug, Clone, PartialEq)]
pub struct ReplayStep {
    pub delay_ms: u64,
    pub outcome: ReplayOutcome,
}

impl ReplayStep {
    pub fn fix(position: Position) -> Self {
        Self {
            delay_ms: 0,
            outcome: ReplayOutcome::Fix(position),
        }
    }

    pub fn error(error: ProviderError) -> Self {
        Self {
            delay_ms: 0,
            outcome: ReplayOutcome::Error(error),
        }
    }

    /// Delay this step
    pub fn after_ms(mut self, delay_ms: u64) -> Self {
        self.delay_ms = delay_ms;
        self
    }

    async fn play(self) -> ProviderResult<Position> {
        if self.delay_ms > 0 {
            tokio::time::sleep(Duration::from_millis(self.delay_ms)).await;
        }
        match self.outcome {
            ReplayOutcome::Fix(position) => Ok(position),
            ReplayOutcome::FixNow {
                latitude,
                longitude,
                accuracy,
            } => Position::now(latitude, longitude, accuracy)
                .map_err(|e| ProviderError::position_unavailable(e.to_string())),
            ReplayOutcome::Error(error) => Err(error),
        }
    }
}

/// JSON-lines step
#[derive(Debug, Deserialize)]
struct StepLine {
    #[serde(default)]
    delay_ms: u64,
    latitude: Option<f64>,
    longitude: Option<f64>,
    accuracy: Option<f64>,
    timestamp: Option<i64>,
    error: Option<ProviderError>,
}

impl StepLine {
    fn into_step(self, line_no: usize) -> Result<ReplayStep> {
        let outcome = match (self.error, self.latitude, self.longitude) {
            (Some(error), _, _) => ReplayOutcome::Error(error),
            (None, Some(latitude), Some(longitude)) => {
                let accuracy = self.accuracy.unwrap_or(10.0);
                match self.timestamp {
                    Some(timestamp) => ReplayOutcome::Fix(
                        Position::new(latitude, longitude, accuracy, timestamp)?,
                    ),
                    None => {
                        // Validate now so a bad line fails at load time
                        Position::new(latitude, longitude, accuracy, 0)?;
                        ReplayOutcome::FixNow {
                            latitude,
                            longitude,
                            accuracy,
                        }
                    }
                }
            }
            _ => {
                return Err(Error::InvalidPosition(format!(
                    "Line {}: expected latitude/longitude or error",
                    line_no
                )))
            }
        };
        Ok(ReplayStep {
            delay_ms: self.delay_ms,
            outcome,
        })
    }
}

/// Scripted provider
#[derive(Debug)]
pub struct ReplayProvider {
    steps: Mutex<VecDeque<ReplayStep>>,
    permission: Option<PermissionState>,
    next_watch_id: AtomicU64,
    watch_starts: AtomicUsize,
    watches: Mutex<HashMap<WatchId, JoinHandle<()>>>,
    cleared: Mutex<Vec<WatchId>>,
}

impl ReplayProvider {
    /// Create a provider that plays `steps` in order
    pub fn new(steps: Vec<ReplayStep>) -> Self {
        Self {
            steps: Mutex::new(steps.into()),
            permission: None,
            next_watch_id: AtomicU64::new(1),
            watch_starts: AtomicUsize::new(0),
            watches: Mutex::new(HashMap::new()),
            cleared: Mutex::new(Vec::new()),
        }
    }

    /// Report a permission state (otherwise the capability is absent)
    pub fn with_permission(mut self, permission: PermissionState) -> Self {
        self.permission = Some(permission);
        self
    }

    /// Parse a JSON-lines script; blank lines and `#` comments are skipped
    pub fn from_jsonl(content: &str) -> Result<Self> {
        let mut steps = Vec::new();
        for (index, line) in content.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let parsed: StepLine = serde_json::from_str(line).map_err(|e| {
                Error::InvalidPosition(format!("Line {}: {}", index + 1, e))
            })?;
            steps.push(parsed.into_step(index + 1)?);
        }
        Ok(Self::new(steps))
    }

    /// Load a JSON-lines script from a file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Self::from_jsonl(&content)
    }

    /// Steps not yet played
    pub fn remaining(&self) -> usize {
        self.steps.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// How many times `watch_position` was called
    pub fn watch_starts(&self) -> usize {
        self.watch_starts.load(Ordering::SeqCst)
    }

    /// Ids passed to `clear_watch`, in order
    pub fn cleared_watches(&self) -> Vec<WatchId> {
        self.cleared.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    fn next_step(&self) -> Option<ReplayStep> {
        self.steps.lock().unwrap_or_else(|e| e.into_inner()).pop_front()
    }
}

impl GeolocationProvider for ReplayProvider {
    fn name(&self) -> &'static str {
        "replay"
    }

    async fn current_position(&self, _options: &PositionOptions) -> ProviderResult<Position> {
        match self.next_step() {
            Some(step) => step.play().await,
            None => Err(ProviderError::position_unavailable("Replay script exhausted")),
        }
    }

    fn watch_position(&self, _options: &PositionOptions) -> ProviderResult<WatchHandle> {
        self.watch_starts.fetch_add(1, Ordering::SeqCst);
        let id = self.next_watch_id.fetch_add(1, Ordering::SeqCst);
        let steps: Vec<ReplayStep> = self
            .steps
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .drain(..)
            .collect();

        let (tx, rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(async move {
            for step in steps {
                if tx.send(step.play().await).is_err() {
                    break;
                }
            }
        });
        self.watches
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(id, task);

        Ok(WatchHandle { id, updates: rx })
    }

    fn clear_watch(&self, id: WatchId) {
        if let Some(task) = self
            .watches
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&id)
        {
            task.abort();
        }
        self.cleared
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(id);
    }

    async fn permission_state(&self) -> Option<ProviderResult<PermissionState>> {
        self.permission.map(Ok)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SCRIPT: &str = r#"
# Praça da Sé, then a short walk
{"latitude": -23.5505, "longitude": -46.6333, "accuracy": 10, "timestamp": 1700000000000}
{"delay_ms": 5, "latitude": -23.5489, "longitude": -46.6388}
{"error": {"code": 3, "message": "Timeout expired"}}
"#;

    #[test]
    fn test_from_jsonl() {
        let provider = ReplayProvider::from_jsonl(SCRIPT).unwrap();
        assert_eq!(provider.remaining(), 3);
    }

    #[test]
    fn test_from_jsonl_rejects_bad_lines() {
        assert!(ReplayProvider::from_jsonl("{\"latitude\": 1.0}").is_err());
        assert!(ReplayProvider::from_jsonl("not json").is_err());
        assert!(ReplayProvider::from_jsonl(
            "{\"latitude\": 95.0, \"longitude\": 0.0, \"timestamp\": 1}"
        )
        .is_err());
    }

    #[tokio::test]
    async fn test_single_shot_consumes_script() {
        let provider = ReplayProvider::from_jsonl(SCRIPT).unwrap();
        let options = PositionOptions::default();

        let first = provider.current_position(&options).await.unwrap();
        assert_eq!(first.timestamp(), 1_700_000_000_000);

        let second = provider.current_position(&options).await.unwrap();
        assert!(second.timestamp() > 1_700_000_000_000);

        let third = provider.current_position(&options).await;
        assert_eq!(third.unwrap_err().code, ProviderError::TIMEOUT);

        let exhausted = provider.current_position(&options).await;
        assert_eq!(exhausted.unwrap_err().code, ProviderError::POSITION_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_watch_streams_remaining_steps() {
        let provider = ReplayProvider::from_jsonl(SCRIPT).unwrap();
        let mut handle = provider.watch_position(&PositionOptions::default()).unwrap();

        let mut fixes = 0;
        let mut errors = 0;
        while let Some(update) = handle.updates.recv().await {
            match update {
                Ok(_) => fixes += 1,
                Err(_) => errors += 1,
            }
        }

        assert_eq!((fixes, errors), (2, 1));
        assert_eq!(provider.remaining(), 0);
        assert_eq!(provider.watch_starts(), 1);
    }

    #[tokio::test]
    async fn test_permission_capability() {
        let provider = ReplayProvider::new(Vec::new());
        assert!(provider.permission_state().await.is_none());

        let provider = provider.with_permission(PermissionState::Granted);
        assert_eq!(
            provider.permission_state().await,
            Some(Ok(PermissionState::Granted))
        );
    }
}
