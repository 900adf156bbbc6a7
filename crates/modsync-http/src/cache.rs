//! Time-bounded cache of `GET` response bodies.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::time::Instant;

pub struct ResponseCache {
    ttl: Duration,
    entries: Mutex<HashMap<String, (Instant, Vec<u8>)>>,
}

impl ResponseCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, (Instant, Vec<u8>)>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Body stored under `key` if it has not expired.
    pub fn get(&self, key: &str) -> Option<Vec<u8>> {
        let mut entries = self.lock();
        match entries.get(key) {
            Some((stored, body)) if stored.elapsed() < self.ttl => Some(body.clone()),
            Some(_) => {
                entries.remove(key);
                None
            }
            None => None,
        }
    }

    pub fn insert(&self, key: String, body: Vec<u8>) {
        if self.ttl.is_zero() {
            return;
        }
        self.lock().insert(key, (Instant::now(), body));
    }

    /// Drop every entry. Called after any mutation.
    pub fn clear(&self) {
        self.lock().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_entries_expire() {
        let cache = ResponseCache::new(Duration::from_secs(10));
        cache.insert("a".into(), b"1".to_vec());
        assert_eq!(cache.get("a"), Some(b"1".to_vec()));

        tokio::time::advance(Duration::from_secs(11)).await;
        assert_eq!(cache.get("a"), None);
    }

    #[test]
    fn test_zero_ttl_disables_cache() {
        let cache = ResponseCache::new(Duration::ZERO);
        cache.insert("a".into(), b"1".to_vec());
        assert_eq!(cache.get("a"), None);
    }

    #[test]
    fn test_clear() {
        let cache = ResponseCache::new(Duration::from_secs(10));
        cache.insert("a".into(), b"1".to_vec());
        cache.clear();
        assert_eq!(cache.get("a"), None);
    }
}
