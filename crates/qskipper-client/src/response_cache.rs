//! Short-lived cache of raw GET response bodies, keyed by request path.
//!
//! Absorbs rapid repeated list reads. Holds bytes, never decoded records,
//! and is independent of the image cache.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use tokio::sync::Mutex;
use tracing::debug;

#[derive(Debug, Clone)]
struct CachedResponse {
    body: Bytes,
    stored_at: Instant,
}

#[derive(Debug, Clone)]
pub struct ResponseCache {
    entries: Arc<Mutex<HashMap<String, CachedResponse>>>,
    ttl: Duration,
}

impl ResponseCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: Arc::new(Mutex::new(HashMap::new())),
            ttl,
        }
    }

    pub async fn get(&self, path: &str) -> Option<Bytes> {
        let mut entries = self.entries.lock().await;
        let (fresh, body) = entries
            .get(path)
            .map(|entry| (entry.stored_at.elapsed() < self.ttl, entry.body.clone()))?;
        if !fresh {
            entries.remove(path);
            return None;
        }
        debug!(path, "Response cache hit");
        Some(body)
    }

    pub async fn put(&self, path: &str, body: Bytes) {
        self.entries.lock().await.insert(
            path.to_string(),
            CachedResponse {
                body,
                stored_at: Instant::now(),
            },
        );
    }

    /// Drop every entry whose path starts with `prefix`.
    pub async fn invalidate_prefix(&self, prefix: &str) {
        let mut entries = self.entries.lock().await;
        let before = entries.len();
        entries.retain(|path, _| !path.starts_with(prefix));
        let dropped = before - entries.len();
        if dropped > 0 {
            debug!(prefix, dropped, "Invalidated cached responses");
        }
    }

    pub async fn clear(&self) {
        self.entries.lock().await.clear();
    }

    pub async fn purge_expired(&self) {
        let ttl = self.ttl;
        self.entries
            .lock()
            .await
            .retain(|_, entry| entry.stored_at.elapsed() < ttl);
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }
}
