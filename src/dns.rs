//! DNS resolution and ECH config discovery via hickory-dns.
//!
//! Two lookups: standard A/AAAA with an in-process TTL cache, and an
//! HTTPS-record (type 65) query extracting the `ech` SvcParam. ECH lookups
//! are best-effort and time-bounded; failure yields `None` and never fails
//! the surrounding request.

use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use hickory_resolver::config::{LookupIpStrategy, ResolverConfig};
use hickory_resolver::name_server::TokioConnectionProvider;
use hickory_resolver::proto::rr::rdata::svcb::SvcParamValue;
use hickory_resolver::proto::rr::{RData, RecordType};
use hickory_resolver::TokioResolver;

use crate::error::{Error, Result};

/// How long a negative ECH lookup is remembered.
const ECH_NEGATIVE_TTL: Duration = Duration::from_secs(60);

/// Upper bound on ECH HTTPS-record queries; past this the request proceeds
/// without ECH.
const ECH_LOOKUP_TIMEOUT: Duration = Duration::from_millis(500);

struct CachedAddrs {
    addrs: Vec<IpAddr>,
    valid_until: Instant,
}

struct CachedEch {
    config: Option<Vec<u8>>,
    valid_until: Instant,
}

/// Async resolver with address and ECH caches.
pub struct Resolver {
    inner: TokioResolver,
    addr_cache: Mutex<HashMap<String, CachedAddrs>>,
    ech_cache: Mutex<HashMap<String, CachedEch>>,
}

impl Resolver {
    /// Build from system DNS configuration, falling back to defaults.
    pub fn new() -> Self {
        let mut builder = match TokioResolver::builder_tokio() {
            Ok(builder) => {
                tracing::debug!("using system DNS configuration");
                builder
            }
            Err(e) => {
                tracing::warn!(error = %e, "failed to read system DNS config, using defaults");
                TokioResolver::builder_with_config(
                    ResolverConfig::default(),
                    TokioConnectionProvider::default(),
                )
            }
        };
        builder.options_mut().ip_strategy = LookupIpStrategy::Ipv4AndIpv6;

        Self {
            inner: builder.build(),
            addr_cache: Mutex::new(HashMap::new()),
            ech_cache: Mutex::new(HashMap::new()),
        }
    }

    /// Resolve a host to addresses, consulting the TTL cache first.
    pub async fn resolve(&self, host: &str) -> Result<Vec<IpAddr>> {
        if let Ok(ip) = host.trim_matches(|c| c == '[' || c == ']').parse::<IpAddr>() {
            return Ok(vec![ip]);
        }

        if let Some(cached) = self.cached_addrs(host) {
            return Ok(cached);
        }

        let lookup = self
            .inner
            .lookup_ip(host)
            .await
            .map_err(|e| Error::Dns(format!("{}: {}", host, e)))?;
        let valid_until = lookup.valid_until();
        let addrs: Vec<IpAddr> = lookup.iter().collect();
        if addrs.is_empty() {
            return Err(Error::Dns(format!("{}: no addresses returned", host)));
        }

        tracing::debug!(host, count = addrs.len(), "resolved");
        self.addr_cache.lock().unwrap_or_else(|e| e.into_inner()).insert(
            host.to_string(),
            CachedAddrs {
                addrs: addrs.clone(),
                valid_until,
            },
        );
        Ok(addrs)
    }

    /// Fetch the ECHConfigList published in the host's HTTPS record.
    ///
    /// Best-effort: lookup errors, timeouts, and absent records all return
    /// `None`. A positive result is cached for the record's TTL.
    pub async fn fetch_ech_config(&self, host: &str) -> Option<Vec<u8>> {
        if let Some(cached) = self.cached_ech(host) {
            return cached;
        }

        let lookup = match tokio::time::timeout(
            ECH_LOOKUP_TIMEOUT,
            self.inner.lookup(host, RecordType::HTTPS),
        )
        .await
        {
            Ok(Ok(lookup)) => lookup,
            Ok(Err(e)) => {
                tracing::debug!(host, error = %e, "HTTPS record lookup failed");
                self.remember_ech(host, None, ECH_NEGATIVE_TTL);
                return None;
            }
            Err(_) => {
                tracing::debug!(host, "HTTPS record lookup timed out");
                self.remember_ech(host, None, ECH_NEGATIVE_TTL);
                return None;
            }
        };

        for record in lookup.record_iter() {
            let RData::HTTPS(https) = record.data() else {
                continue;
            };
            for (_, value) in https.svc_params() {
                if let SvcParamValue::EchConfigList(ech) = value {
                    let config = ech.0.clone();
                    let ttl = Duration::from_secs(record.ttl() as u64);
                    tracing::debug!(host, len = config.len(), "ECH config discovered");
                    self.remember_ech(host, Some(config.clone()), ttl);
                    return Some(config);
                }
            }
        }

        self.remember_ech(host, None, ECH_NEGATIVE_TTL);
        None
    }

    /// Seed the ECH cache (snapshot import). Imported configs are given a
    /// short TTL so a fresh HTTPS lookup replaces them promptly.
    pub fn seed_ech_config(&self, host: &str, config: Vec<u8>) {
        self.remember_ech(host, Some(config), ECH_NEGATIVE_TTL);
    }

    /// Current positive ECH entries (snapshot export).
    pub fn export_ech_configs(&self) -> HashMap<String, Vec<u8>> {
        let cache = self.ech_cache.lock().unwrap_or_else(|e| e.into_inner());
        let now = Instant::now();
        cache
            .iter()
            .filter(|(_, e)| e.valid_until > now)
            .filter_map(|(host, e)| e.config.clone().map(|c| (host.clone(), c)))
            .collect()
    }

    fn cached_addrs(&self, host: &str) -> Option<Vec<IpAddr>> {
        let mut cache = self.addr_cache.lock().unwrap_or_else(|e| e.into_inner());
        match cache.get(host) {
            Some(entry) if entry.valid_until > Instant::now() => Some(entry.addrs.clone()),
            Some(_) => {
                cache.remove(host);
                None
            }
            None => None,
        }
    }

    fn cached_ech(&self, host: &str) -> Option<Option<Vec<u8>>> {
        let mut cache = self.ech_cache.lock().unwrap_or_else(|e| e.into_inner());
        match cache.get(host) {
            Some(entry) if entry.valid_until > Instant::now() => Some(entry.config.clone()),
            Some(_) => {
                cache.remove(host);
                None
            }
            None => None,
        }
    }

    fn remember_ech(&self, host: &str, config: Option<Vec<u8>>, ttl: Duration) {
        self.ech_cache
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(
                host.to_string(),
                CachedEch {
                    config,
                    valid_until: Instant::now() + ttl,
                },
            );
    }
}

impl Default for Resolver {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn literal_addresses_skip_the_resolver() {
        let resolver = Resolver::new();
        let v4 = resolver.resolve("127.0.0.1").await.unwrap();
        assert_eq!(v4, vec!["127.0.0.1".parse::<IpAddr>().unwrap()]);
        let v6 = resolver.resolve("[::1]").await.unwrap();
        assert_eq!(v6, vec!["::1".parse::<IpAddr>().unwrap()]);
    }

    #[tokio::test]
    async fn ech_seed_and_export_round_trip() {
        let resolver = Resolver::new();
        resolver.seed_ech_config("example.test", vec![1, 2, 3]);
        let exported = resolver.export_ech_configs();
        assert_eq!(exported.get("example.test"), Some(&vec![1, 2, 3]));
    }
}
