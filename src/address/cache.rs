//! Reverse geocoding cache
//!
//! Raw responses keyed by coordinates rounded to `CACHE_KEY_PRECISION`
//! decimals. Entries expire after a TTL; when full, the oldest entry is
//! evicted. Expired entries are swept by a background task owned by the
//! cache and stopped with `close()`.

use crate::address::RawAddressResponse;
use crate::config::CacheConfig;
use crate::constants::geo::CACHE_KEY_PRECISION;
use crate::position::Coordinates;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tracing::debug;

type CacheKey = (i64, i64);

#[derive(Debug)]
struct Entry {
    raw: RawAddressResponse,
    inserted: Instant,
}

/// Capped TTL map of raw geocoding responses
#[derive(Debug)]
pub struct AddressCache {
    entries: Mutex<HashMap<CacheKey, Entry>>,
    ttl: Duration,
    max_entries: usize,
    cleanup: Mutex<Option<JoinHandle<()>>>,
}

impl AddressCache {
    pub fn new(ttl: Duration, max_entries: usize) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            ttl,
            max_entries: max_entries.max(1),
            cleanup: Mutex::new(None),
        }
    }

    pub fn from_config(config: &CacheConfig) -> Self {
        Self::new(Duration::from_secs(config.ttl_secs), config.max_entries)
    }

    fn key(coords: Coordinates) -> CacheKey {
        let scale = 10f64.powi(CACHE_KEY_PRECISION);
        (
            (coords.lat * scale).round() as i64,
            (coords.lng * scale).round() as i64,
        )
    }

    /// Cached response for `coords`, if present and fresh
    pub fn get(&self, coords: Coordinates) -> Option<RawAddressResponse> {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        let key = Self::key(coords);
        match entries.get(&key) {
            Some(entry) if entry.inserted.elapsed() < self.ttl => Some(entry.raw.clone()),
            Some(_) => {
                entries.remove(&key);
                None
            }
            None => None,
        }
    }

    /// Store a response, evicting the oldest entry when full
    pub fn insert(&self, coords: Coordinates, raw: RawAddressResponse) {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        let key = Self::key(coords);

        if !entries.contains_key(&key) && entries.len() >= self.max_entries {
            let oldest = entries
                .iter()
                .min_by_key(|(_, entry)| entry.inserted)
                .map(|(key, _)| *key);
            if let Some(oldest) = oldest {
                entries.remove(&oldest);
            }
        }

        entries.insert(
            key,
            Entry {
                raw,
                inserted: Instant::now(),
            },
        );
    }

    /// Drop expired entries, returning how many were removed
    pub fn remove_expired(&self) -> usize {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        let before = entries.len();
        entries.retain(|_, entry| entry.inserted.elapsed() < self.ttl);
        before - entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.entries.lock().unwrap_or_else(|e| e.into_inner()).clear();
    }

    /// Start the periodic sweep
    ///
    /// The task holds only a weak reference and ends on its own once the
    /// cache is dropped. Calling this while a sweep is running does nothing.
    pub fn spawn_cleanup(self: &Arc<Self>, every: Duration) {
        let mut cleanup = self.cleanup.lock().unwrap_or_else(|e| e.into_inner());
        if cleanup.is_some() {
            return;
        }

        let weak = Arc::downgrade(self);
        *cleanup = Some(tokio::spawn(async move {
            let mut interval = tokio::time::interval(every);
            // First tick completes immediately
            interval.tick().await;
            loop {
                interval.tick().await;
                let Some(cache) = weak.upgrade() else {
                    break;
                };
                let removed = cache.remove_expired();
                if removed > 0 {
                    debug!("Address cache sweep removed {} entries", removed);
                }
            }
        }));
    }

    pub fn is_cleanup_running(&self) -> bool {
        self.cleanup
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .as_ref()
            .is_some_and(|task| !task.is_finished())
    }

    /// Stop the sweep task
    pub fn close(&self) {
        if let Some(task) = self.cleanup.lock().unwrap_or_else(|e| e.into_inner()).take() {
            task.abort();
        }
    }
}

impl Drop for AddressCache {
    fn drop(&mut self) {
        if let Some(task) = self.cleanup.get_mut().unwrap_or_else(|e| e.into_inner()).take() {
            task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(name: &str) -> RawAddressResponse {
        RawAddressResponse {
            display_name: Some(name.to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_nearby_coordinates_share_a_key() {
        let cache = AddressCache::new(Duration::from_secs(60), 10);
        cache.insert(Coordinates::new(-23.55051, -46.63331), raw("Sé"));

        let hit = cache.get(Coordinates::new(-23.55049, -46.63329)).unwrap();
        assert_eq!(hit.display_name.as_deref(), Some("Sé"));
        assert!(cache.get(Coordinates::new(-23.5515, -46.6333)).is_none());
    }

    #[test]
    fn test_expired_entries_are_not_returned() {
        let cache = AddressCache::new(Duration::from_millis(20), 10);
        let coords = Coordinates::new(-23.5505, -46.6333);
        cache.insert(coords, raw("Sé"));

        std::thread::sleep(Duration::from_millis(40));

        assert!(cache.get(coords).is_none());
        assert!(cache.is_empty());
    }

    #[test]
    fn test_capacity_evicts_oldest() {
        let cache = AddressCache::new(Duration::from_secs(60), 2);
        let a = Coordinates::new(-23.0, -46.0);
        let b = Coordinates::new(-22.0, -43.0);
        let c = Coordinates::new(-19.9, -43.9);

        cache.insert(a, raw("a"));
        std::thread::sleep(Duration::from_millis(2));
        cache.insert(b, raw("b"));
        std::thread::sleep(Duration::from_millis(2));
        cache.insert(c, raw("c"));

        assert_eq!(cache.len(), 2);
        assert!(cache.get(a).is_none());
        assert!(cache.get(b).is_some());
        assert!(cache.get(c).is_some());
    }

    #[test]
    fn test_remove_expired() {
        let cache = AddressCache::new(Duration::from_millis(10), 10);
        cache.insert(Coordinates::new(-23.0, -46.0), raw("a"));
        cache.insert(Coordinates::new(-22.0, -43.0), raw("b"));

        std::thread::sleep(Duration::from_millis(20));

        assert_eq!(cache.remove_expired(), 2);
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_cleanup_task_sweeps_and_closes() {
        let cache = Arc::new(AddressCache::new(Duration::from_millis(5), 10));
        cache.insert(Coordinates::new(-23.0, -46.0), raw("a"));

        cache.spawn_cleanup(Duration::from_millis(10));
        assert!(cache.is_cleanup_running());

        tokio::time::sleep(Duration::from_millis(60)).await;
        assert!(cache.is_empty());

        cache.close();
        tokio::task::yield_now().await;
        assert!(!cache.is_cleanup_running());
    }
}
