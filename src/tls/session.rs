//! Persistable TLS session-ticket cache.
//!
//! Sessions are keyed `"{proto}:{host}:{port}"` and stored as DER blobs so
//! they survive snapshot export/import. The cache is LRU-bounded and
//! anything older than 24 hours is refused on load.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, Utc};

/// Maximum age for a cached TLS session; tickets typically expire after
/// 24-48 hours server-side.
pub const SESSION_MAX_AGE_HOURS: i64 = 24;

/// LRU bound on cached sessions.
pub const SESSION_CACHE_MAX: usize = 32;

#[derive(Debug, Clone)]
struct CachedTicket {
    der: Vec<u8>,
    created_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct Inner {
    tickets: HashMap<String, CachedTicket>,
    /// LRU order: oldest at the front.
    access_order: Vec<String>,
}

impl Inner {
    fn touch(&mut self, key: &str) {
        if let Some(pos) = self.access_order.iter().position(|k| k == key) {
            let k = self.access_order.remove(pos);
            self.access_order.push(k);
        }
    }

    fn evict_to_bound(&mut self) {
        while self.tickets.len() > SESSION_CACHE_MAX && !self.access_order.is_empty() {
            let oldest = self.access_order.remove(0);
            self.tickets.remove(&oldest);
        }
    }
}

/// Shared, cloneable ticket cache.
#[derive(Debug, Clone, Default)]
pub struct TicketCache {
    inner: Arc<Mutex<Inner>>,
}

/// Cache key for one origin over one protocol.
pub fn ticket_key(proto: &str, host: &str, port: u16) -> String {
    format!("{}:{}:{}", proto, host, port)
}

impl TicketCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a serialized session from the handshake callback.
    pub fn put(&self, key: &str, der: Vec<u8>) {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let fresh = !inner.tickets.contains_key(key);
        inner.tickets.insert(
            key.to_string(),
            CachedTicket {
                der,
                created_at: Utc::now(),
            },
        );
        if fresh {
            inner.access_order.push(key.to_string());
        } else {
            inner.touch(key);
        }
        inner.evict_to_bound();
    }

    /// Fetch a session for resumption, refreshing its LRU position.
    pub fn get(&self, key: &str) -> Option<Vec<u8>> {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let expired = match inner.tickets.get(key) {
            Some(ticket) => Utc::now() - ticket.created_at > Duration::hours(SESSION_MAX_AGE_HOURS),
            None => return None,
        };
        if expired {
            inner.tickets.remove(key);
            inner.access_order.retain(|k| k != key);
            return None;
        }
        inner.touch(key);
        inner.tickets.get(key).map(|t| t.der.clone())
    }

    /// Drop a ticket the peer rejected.
    pub fn invalidate(&self, key: &str) {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.tickets.remove(key);
        inner.access_order.retain(|k| k != key);
    }

    pub fn clear(&self) {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.tickets.clear();
        inner.access_order.clear();
    }

    pub fn len(&self) -> usize {
        self.inner
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .tickets
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Export every non-expired session as `(key, der, created_at)`.
    pub fn export(&self) -> Vec<(String, Vec<u8>, DateTime<Utc>)> {
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let now = Utc::now();
        inner
            .tickets
            .iter()
            .filter(|(_, t)| now - t.created_at <= Duration::hours(SESSION_MAX_AGE_HOURS))
            .map(|(k, t)| (k.clone(), t.der.clone(), t.created_at))
            .collect()
    }

    /// Import serialized sessions; entries older than the max age are
    /// skipped, and the LRU bound is enforced afterwards.
    pub fn import(
        &self,
        sessions: impl IntoIterator<Item = (String, Vec<u8>, DateTime<Utc>)>,
    ) {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let now = Utc::now();
        for (key, der, created_at) in sessions {
            if now - created_at > Duration::hours(SESSION_MAX_AGE_HOURS) {
                continue;
            }
            if !inner.tickets.contains_key(&key) {
                inner.access_order.push(key.clone());
            }
            inner.tickets.insert(key, CachedTicket { der, created_at });
        }
        inner.evict_to_bound();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_get_and_invalidate() {
        let cache = TicketCache::new();
        let key = ticket_key("h2", "example.test", 443);
        assert_eq!(key, "h2:example.test:443");

        cache.put(&key, vec![1, 2, 3]);
        assert_eq!(cache.get(&key), Some(vec![1, 2, 3]));

        cache.invalidate(&key);
        assert_eq!(cache.get(&key), None);
    }

    #[test]
    fn lru_bound_evicts_oldest() {
        let cache = TicketCache::new();
        for i in 0..(SESSION_CACHE_MAX + 4) {
            cache.put(&format!("h2:host{}:443", i), vec![i as u8]);
        }
        assert_eq!(cache.len(), SESSION_CACHE_MAX);
        // The first four inserts were evicted.
        assert_eq!(cache.get("h2:host0:443"), None);
        assert!(cache.get(&format!("h2:host{}:443", SESSION_CACHE_MAX + 3)).is_some());
    }

    #[test]
    fn import_skips_stale_sessions() {
        let cache = TicketCache::new();
        let stale = Utc::now() - Duration::hours(SESSION_MAX_AGE_HOURS + 1);
        cache.import(vec![
            ("h2:old:443".to_string(), vec![1], stale),
            ("h2:new:443".to_string(), vec![2], Utc::now()),
        ]);
        assert_eq!(cache.get("h2:old:443"), None);
        assert_eq!(cache.get("h2:new:443"), Some(vec![2]));
    }

    #[test]
    fn reimport_is_idempotent() {
        let cache = TicketCache::new();
        cache.put("h3:a:443", vec![9]);
        let exported = cache.export();
        cache.import(exported.clone());
        cache.import(exported);
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get("h3:a:443"), Some(vec![9]));
    }
}
