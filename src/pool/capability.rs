//! Per-origin protocol-capability cache.
//!
//! Tracks what each origin is known to speak. Successful negotiation
//! promotes a protocol to supported; a typed failure (ALPN mismatch, QUIC
//! version negotiation) demotes it for a TTL; network errors change
//! nothing. Expired entries revert to unknown.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use super::Origin;

/// How long a typed "unsupported" verdict holds without an Alt-Svc ma.
pub const DEFAULT_UNSUPPORTED_TTL: Duration = Duration::from_secs(600);

/// Knowledge about one protocol at one origin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TriState {
    #[default]
    Unknown,
    Supported,
    Unsupported,
}

/// Capability snapshot for one origin.
#[derive(Debug, Clone, Copy, Default)]
pub struct Capabilities {
    pub h3: TriState,
    pub h2: TriState,
}

#[derive(Debug, Clone, Copy)]
struct Entry {
    h3: TriState,
    h2: TriState,
    last_probe: Instant,
    /// After this instant the entry reverts to unknown (Alt-Svc ma, or
    /// the default TTL for typed failures).
    expires_at: Option<Instant>,
}

/// Shared capability cache.
#[derive(Debug, Default)]
pub struct CapabilityCache {
    entries: Mutex<HashMap<Origin, Entry>>,
}

impl CapabilityCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current knowledge, with expiry applied.
    pub fn snapshot(&self, origin: &Origin) -> Capabilities {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        match entries.get(origin) {
            Some(entry) => {
                if entry.expires_at.map(|t| t <= Instant::now()).unwrap_or(false) {
                    entries.remove(origin);
                    return Capabilities::default();
                }
                Capabilities {
                    h3: entry.h3,
                    h2: entry.h2,
                }
            }
            None => Capabilities::default(),
        }
    }

    /// A handshake over H3 completed.
    pub fn note_h3_supported(&self, origin: &Origin, expiry: Option<Duration>) {
        self.update(origin, |e| {
            e.h3 = TriState::Supported;
            if let Some(ttl) = expiry {
                e.expires_at = Some(Instant::now() + ttl);
            }
        });
    }

    /// A handshake negotiated H2.
    pub fn note_h2_supported(&self, origin: &Origin) {
        self.update(origin, |e| e.h2 = TriState::Supported);
    }

    /// Typed failure: the origin does not speak H3.
    pub fn note_h3_unsupported(&self, origin: &Origin) {
        self.update(origin, |e| {
            e.h3 = TriState::Unsupported;
            e.expires_at = Some(Instant::now() + DEFAULT_UNSUPPORTED_TTL);
        });
    }

    /// Typed failure: ALPN selected something other than h2.
    pub fn note_h2_unsupported(&self, origin: &Origin) {
        self.update(origin, |e| {
            e.h2 = TriState::Unsupported;
            e.expires_at = Some(Instant::now() + DEFAULT_UNSUPPORTED_TTL);
        });
    }

    /// Alt-Svc advertisement for h3 with its max-age.
    pub fn note_alt_svc_h3(&self, origin: &Origin, max_age: Duration) {
        self.note_h3_supported(origin, Some(max_age));
    }

    /// Alt-Svc `clear` directive.
    pub fn clear_origin(&self, origin: &Origin) {
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(origin);
    }

    fn update(&self, origin: &Origin, f: impl FnOnce(&mut Entry)) {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        let entry = entries.entry(origin.clone()).or_insert(Entry {
            h3: TriState::Unknown,
            h2: TriState::Unknown,
            last_probe: Instant::now(),
            expires_at: None,
        });
        entry.last_probe = Instant::now();
        f(entry);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn origin() -> Origin {
        Origin {
            scheme: "https".into(),
            host: "example.test".into(),
            port: 443,
        }
    }

    #[test]
    fn initial_state_is_unknown() {
        let cache = CapabilityCache::new();
        let caps = cache.snapshot(&origin());
        assert_eq!(caps.h3, TriState::Unknown);
        assert_eq!(caps.h2, TriState::Unknown);
    }

    #[test]
    fn success_promotes_and_typed_failure_demotes() {
        let cache = CapabilityCache::new();
        cache.note_h2_supported(&origin());
        assert_eq!(cache.snapshot(&origin()).h2, TriState::Supported);

        cache.note_h3_unsupported(&origin());
        let caps = cache.snapshot(&origin());
        assert_eq!(caps.h3, TriState::Unsupported);
        assert_eq!(caps.h2, TriState::Supported);
    }

    #[test]
    fn expired_entries_revert_to_unknown() {
        let cache = CapabilityCache::new();
        cache.note_alt_svc_h3(&origin(), Duration::from_millis(0));
        std::thread::sleep(Duration::from_millis(5));
        assert_eq!(cache.snapshot(&origin()).h3, TriState::Unknown);
    }

    #[test]
    fn clear_resets_the_origin() {
        let cache = CapabilityCache::new();
        cache.note_h3_supported(&origin(), None);
        cache.clear_origin(&origin());
        assert_eq!(cache.snapshot(&origin()).h3, TriState::Unknown);
    }
}
