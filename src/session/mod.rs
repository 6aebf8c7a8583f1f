//! Session: the public entry point.
//!
//! A session owns the cross-cutting state one browsing identity
//! accumulates: cookie jar, TLS session tickets, ECH configs, and the
//! per-origin protocol-capability records. Multiple requests may run
//! concurrently against one session.

pub mod engine;
pub mod state;
pub mod warmup;

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use chrono::{DateTime, Utc};

use crate::cookie::{Cookie, CookieJar};
use crate::dns::Resolver;
use crate::error::{Error, Result};
use crate::pool::ConnectionPool;
use crate::profile::{self, Profile};
use crate::request::Request;
use crate::response::Response;
use crate::tls::session::TicketCache;
use crate::tls::TlsConnector;

use state::{ConfigState, CookieState, SessionState, TlsSessionState, SNAPSHOT_VERSION};

/// Session-level options.
#[derive(Debug, Clone)]
pub struct SessionOptions {
    /// Default per-request deadline.
    pub timeout: Duration,
    /// Redirect hops before giving up.
    pub redirect_cap: u32,
    /// Transparent retries on a fresh connection after GOAWAY or
    /// REFUSED_STREAM.
    pub retry_cap: u32,
    /// Disable certificate verification (test setups only).
    pub danger_accept_invalid_certs: bool,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            redirect_cap: 10,
            retry_cap: 1,
            danger_accept_invalid_certs: false,
        }
    }
}

/// One browsing identity.
pub struct Session {
    pub(crate) profile: &'static Profile,
    pub(crate) options: SessionOptions,
    pub(crate) pool: Arc<ConnectionPool>,
    resolver: Arc<Resolver>,
    tickets: TicketCache,
    jar: Mutex<CookieJar>,
    created_at: DateTime<Utc>,
}

impl Session {
    /// Create a session for a named profile.
    pub fn new(profile_name: &str, options: SessionOptions) -> Result<Self> {
        let profile = profile::get(profile_name)?;
        let resolver = Arc::new(Resolver::new());
        let tickets = TicketCache::new();
        let tls = TlsConnector::new(profile.tls, tickets.clone())
            .danger_accept_invalid_certs(options.danger_accept_invalid_certs);
        let pool = Arc::new(ConnectionPool::new(profile, resolver.clone(), tls));

        Ok(Self {
            profile,
            options,
            pool,
            resolver,
            tickets,
            jar: Mutex::new(CookieJar::new()),
            created_at: Utc::now(),
        })
    }

    pub fn profile(&self) -> &'static Profile {
        self.profile
    }

    /// Execute one request: profile headers, cookies, protocol selection,
    /// redirects.
    pub async fn execute(&self, request: Request) -> Result<Response> {
        engine::execute(self, request).await
    }

    /// Convenience GET.
    pub async fn get(&self, url: impl Into<String>) -> Result<Response> {
        self.execute(Request::get(url)).await
    }

    /// Navigate to a page and fetch its subresources like a browser,
    /// accumulating cookies, tickets, and capability records.
    pub async fn warmup(&self, url: &str) -> Result<()> {
        warmup::warmup(self, url).await
    }

    // Cookie surface.

    /// The Cookie header value this session would send to `url`.
    pub fn cookie_header_for(&self, url: &str) -> Result<Option<String>> {
        let parsed = url::Url::parse(url)?;
        let host = parsed.host_str().ok_or_else(|| Error::missing("host"))?;
        Ok(self.jar(|jar| {
            jar.header_for(host, parsed.path(), parsed.scheme() == "https")
        }))
    }

    /// Apply a Set-Cookie header as if `host` had sent it over HTTPS.
    pub fn set_cookie(&self, host: &str, header: &str) -> Result<bool> {
        let cookie = Cookie::parse(header)?;
        Ok(self.jar_mut(|jar| jar.set(host, true, cookie)))
    }

    pub fn cookie_count(&self) -> usize {
        self.jar(|jar| jar.count())
    }

    pub fn clear_cookies(&self) {
        self.jar_mut(|jar| jar.clear());
    }

    /// Drop expired cookies eagerly.
    pub fn sweep_cookies(&self) {
        self.jar_mut(|jar| jar.sweep_expired());
    }

    // Snapshot surface.

    /// Serialize cookies, TLS tickets, and ECH configs.
    pub fn export_state(&self) -> Result<Vec<u8>> {
        let cookies: BTreeMap<String, Vec<CookieState>> = self
            .jar(|jar| jar.export_by_domain())
            .into_iter()
            .map(|(domain, cookies)| {
                (
                    domain,
                    cookies.iter().map(CookieState::from_cookie).collect(),
                )
            })
            .collect();

        let tls_sessions: BTreeMap<String, TlsSessionState> = self
            .tickets
            .export()
            .into_iter()
            .map(|(key, der, created_at)| (key, TlsSessionState::from_der(&der, created_at)))
            .collect();

        let ech_configs: BTreeMap<String, String> = self
            .resolver
            .export_ech_configs()
            .into_iter()
            .map(|(host, config)| (host, BASE64.encode(config)))
            .collect();

        SessionState {
            version: SNAPSHOT_VERSION,
            created_at: self.created_at,
            updated_at: Utc::now(),
            config: ConfigState {
                profile: self.profile.name.to_string(),
                timeout_secs: Some(self.options.timeout.as_secs()),
            },
            cookies,
            tls_sessions,
            ech_configs,
        }
        .encode()
    }

    /// Load a snapshot (v4 or v5). Cookies and tickets merge into the
    /// current state; TLS sessions older than 24 hours are dropped.
    /// Imported ECH configs are treated as stale hints and re-fetched on
    /// first use.
    pub fn import_state(&self, bytes: &[u8]) -> Result<()> {
        let snapshot = SessionState::decode(bytes)?;

        self.jar_mut(|jar| {
            for (domain, cookies) in &snapshot.cookies {
                jar.import(
                    cookies
                        .iter()
                        .cloned()
                        .map(|state| state.into_cookie(domain)),
                );
            }
        });

        let mut sessions = Vec::new();
        for (key, state) in &snapshot.tls_sessions {
            let der = state.der()?;
            sessions.push((key.clone(), der, state.created_at));
        }
        self.tickets.import(sessions);

        for (host, config) in &snapshot.ech_configs {
            if let Ok(der) = BASE64.decode(config) {
                self.resolver.seed_ech_config(host, der);
            }
        }

        Ok(())
    }

    pub(crate) fn jar<T>(&self, f: impl FnOnce(&CookieJar) -> T) -> T {
        f(&self.jar.lock().unwrap_or_else(|e| e.into_inner()))
    }

    pub(crate) fn jar_mut<T>(&self, f: impl FnOnce(&mut CookieJar) -> T) -> T {
        f(&mut self.jar.lock().unwrap_or_else(|e| e.into_inner()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn session_requires_a_known_profile() {
        assert!(Session::new("chrome-143", SessionOptions::default()).is_ok());
        assert!(matches!(
            Session::new("ie-6", SessionOptions::default()),
            Err(Error::UnknownProfile(_))
        ));
    }

    #[tokio::test]
    async fn cookie_surface_round_trip() {
        let session = Session::new("chrome-143", SessionOptions::default()).unwrap();
        assert!(session
            .set_cookie("api.example.test", "sid=abc; Domain=example.test; Path=/")
            .unwrap());
        assert_eq!(session.cookie_count(), 1);
        assert_eq!(
            session
                .cookie_header_for("https://example.test/page")
                .unwrap(),
            Some("sid=abc".to_string())
        );
        assert_eq!(
            session.cookie_header_for("https://other.test/").unwrap(),
            None
        );
        session.clear_cookies();
        assert_eq!(session.cookie_count(), 0);
    }
}
