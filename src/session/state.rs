//! Versioned session snapshot.
//!
//! Version 5 keys cookies by domain; version 4 stored a flat list and is
//! migrated on load, inferring `host_only` from the absence of a leading
//! dot on the stored domain.

use std::collections::BTreeMap;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::cookie::{Cookie, SameSite};
use crate::error::{Error, Result};

/// Current snapshot format version.
pub const SNAPSHOT_VERSION: u32 = 5;

/// Profile reference plus session-level overrides.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConfigState {
    pub profile: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
}

/// One serialized cookie.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CookieState {
    pub name: String,
    pub value: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub domain: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_age: Option<i64>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub secure: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub http_only: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub same_site: Option<String>,
    /// v5 only; used for RFC 6265 §5.4 ordering.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

fn is_false(v: &bool) -> bool {
    !v
}

impl CookieState {
    pub fn from_cookie(cookie: &Cookie) -> Self {
        Self {
            name: cookie.name.clone(),
            value: cookie.value.clone(),
            domain: cookie.domain.clone(),
            path: cookie.path.clone(),
            expires: cookie.expires,
            max_age: cookie.max_age,
            secure: cookie.secure,
            http_only: cookie.http_only,
            same_site: cookie.same_site.map(|s| s.as_str().to_string()),
            created_at: Some(cookie.created_at),
        }
    }

    /// Rehydrate; `fallback_domain` is the v5 map key.
    pub fn into_cookie(self, fallback_domain: &str) -> Cookie {
        let domain = if self.domain.is_empty() {
            fallback_domain.to_string()
        } else {
            self.domain.to_ascii_lowercase()
        };
        Cookie {
            name: self.name,
            value: self.value,
            host_only: !domain.starts_with('.'),
            domain,
            path: if self.path.is_empty() {
                "/".to_string()
            } else {
                self.path
            },
            expires: self.expires,
            max_age: self.max_age,
            secure: self.secure,
            http_only: self.http_only,
            same_site: self.same_site.as_deref().and_then(SameSite::parse),
            created_at: self.created_at.unwrap_or_else(Utc::now),
        }
    }
}

/// Serialized TLS session. Under BoringSSL the resumption state is one
/// self-contained DER blob carried in `ticket`; `state` is retained for
/// schema compatibility with older snapshots.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TlsSessionState {
    pub ticket: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub state: String,
    pub created_at: DateTime<Utc>,
}

impl TlsSessionState {
    pub fn from_der(der: &[u8], created_at: DateTime<Utc>) -> Self {
        Self {
            ticket: BASE64.encode(der),
            state: String::new(),
            created_at,
        }
    }

    pub fn der(&self) -> Result<Vec<u8>> {
        BASE64
            .decode(&self.ticket)
            .map_err(|e| Error::Snapshot(format!("ticket base64: {}", e)))
    }
}

/// The complete saveable session state (v5).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionState {
    pub version: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub config: ConfigState,
    /// Cookies keyed by domain (".example.com" for domain cookies,
    /// "example.com" for host-only).
    pub cookies: BTreeMap<String, Vec<CookieState>>,
    /// TLS sessions keyed by "protocol:host:port".
    #[serde(default)]
    pub tls_sessions: BTreeMap<String, TlsSessionState>,
    /// ECH configs per host, base64.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub ech_configs: BTreeMap<String, String>,
}

/// The v4 layout: flat cookie list.
#[derive(Debug, Deserialize)]
struct SessionStateV4 {
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    config: ConfigState,
    #[serde(default)]
    cookies: Vec<CookieState>,
    #[serde(default)]
    tls_sessions: BTreeMap<String, TlsSessionState>,
    #[serde(default)]
    ech_configs: BTreeMap<String, String>,
}

#[derive(Deserialize)]
struct VersionProbe {
    version: u32,
}

impl SessionState {
    /// Parse a snapshot, migrating v4 to the current layout.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let probe: VersionProbe = serde_json::from_slice(bytes)?;
        match probe.version {
            SNAPSHOT_VERSION => Ok(serde_json::from_slice(bytes)?),
            4 => {
                let v4: SessionStateV4 = serde_json::from_slice(bytes)?;
                Ok(Self::migrate_v4(v4))
            }
            other => Err(Error::Snapshot(format!(
                "unsupported snapshot version {}",
                other
            ))),
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    fn migrate_v4(v4: SessionStateV4) -> Self {
        let mut cookies: BTreeMap<String, Vec<CookieState>> = BTreeMap::new();
        for mut cookie in v4.cookies {
            cookie.domain = cookie.domain.to_ascii_lowercase();
            // The leading dot is the only host-only signal v4 carries; the
            // domain key preserves it for rehydration.
            let key = cookie.domain.clone();
            cookies.entry(key).or_default().push(cookie);
        }
        Self {
            version: SNAPSHOT_VERSION,
            created_at: v4.created_at,
            updated_at: v4.updated_at,
            config: v4.config,
            cookies,
            tls_sessions: v4.tls_sessions,
            ech_configs: v4.ech_configs,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn v4_migration_groups_by_domain_and_infers_host_only() {
        let v4 = serde_json::json!({
            "version": 4,
            "created_at": "2026-01-01T00:00:00Z",
            "updated_at": "2026-01-02T00:00:00Z",
            "config": {"profile": "chrome-143"},
            "cookies": [
                {"name": "a", "value": "1", "domain": ".example.com", "path": "/"},
                {"name": "b", "value": "2", "domain": "example.com", "path": "/"},
                {"name": "c", "value": "3", "domain": ".example.com", "path": "/x"}
            ]
        });
        let state = SessionState::decode(v4.to_string().as_bytes()).unwrap();
        assert_eq!(state.version, SNAPSHOT_VERSION);
        assert_eq!(state.cookies[".example.com"].len(), 2);
        assert_eq!(state.cookies["example.com"].len(), 1);

        let domain_cookie = state.cookies[".example.com"][0]
            .clone()
            .into_cookie(".example.com");
        assert!(!domain_cookie.host_only);
        let host_cookie = state.cookies["example.com"][0]
            .clone()
            .into_cookie("example.com");
        assert!(host_cookie.host_only);
    }

    #[test]
    fn unknown_version_is_rejected() {
        let bad = serde_json::json!({"version": 9}).to_string();
        assert!(matches!(
            SessionState::decode(bad.as_bytes()),
            Err(Error::Snapshot(_))
        ));
    }

    #[test]
    fn v5_round_trip_is_stable() {
        let state = SessionState {
            version: SNAPSHOT_VERSION,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            config: ConfigState {
                profile: "chrome-143".into(),
                timeout_secs: None,
            },
            cookies: BTreeMap::new(),
            tls_sessions: BTreeMap::from([(
                "h3:example.test:443".to_string(),
                TlsSessionState::from_der(&[1, 2, 3], Utc::now()),
            )]),
            ech_configs: BTreeMap::new(),
        };
        let encoded = state.encode().unwrap();
        let decoded = SessionState::decode(&encoded).unwrap();
        assert_eq!(decoded.tls_sessions, state.tls_sessions);
        assert_eq!(
            decoded.tls_sessions["h3:example.test:443"].der().unwrap(),
            vec![1, 2, 3]
        );
    }
}
