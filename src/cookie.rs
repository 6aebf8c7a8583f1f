//! RFC 6265 cookie jar with domain/path scoping.
//!
//! Storage is keyed by normalized domain, then by (path, name). Domain
//! cookies carry a leading dot; host-only cookies do not and are returned
//! only for an exact host match.

use std::collections::HashMap;

use chrono::{DateTime, TimeZone, Utc};

use crate::error::{Error, Result};

/// SameSite attribute (RFC 6265bis).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum SameSite {
    Strict,
    Lax,
    None,
}

impl SameSite {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Strict => "Strict",
            Self::Lax => "Lax",
            Self::None => "None",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "strict" => Some(Self::Strict),
            "lax" => Some(Self::Lax),
            "none" => Some(Self::None),
            _ => None,
        }
    }
}

/// One stored cookie.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cookie {
    pub name: String,
    pub value: String,
    /// Normalized domain; leading dot marks a domain cookie.
    pub domain: String,
    /// True when the cookie is only sent to the exact host that set it.
    pub host_only: bool,
    pub path: String,
    pub expires: Option<DateTime<Utc>>,
    pub max_age: Option<i64>,
    pub secure: bool,
    pub http_only: bool,
    pub same_site: Option<SameSite>,
    /// Creation time, used for RFC 6265 §5.4 ordering.
    pub created_at: DateTime<Utc>,
}

impl Cookie {
    /// Parse a `Set-Cookie` header value. Scoping rules (domain
    /// validation, secure rejection) are applied by [`CookieJar::set`],
    /// which knows the request context.
    pub fn parse(header: &str) -> Result<Self> {
        let mut parts = header.split(';').map(str::trim);

        let first = parts
            .next()
            .ok_or_else(|| Error::CookieParse("empty Set-Cookie".into()))?;
        let (name, value) = first
            .split_once('=')
            .ok_or_else(|| Error::CookieParse("no = in cookie pair".into()))?;
        let name = name.trim();
        if name.is_empty() {
            return Err(Error::CookieParse("empty cookie name".into()));
        }

        let mut cookie = Cookie {
            name: name.to_string(),
            value: value.trim().to_string(),
            domain: String::new(),
            host_only: true,
            path: String::new(),
            expires: None,
            max_age: None,
            secure: false,
            http_only: false,
            same_site: None,
            created_at: Utc::now(),
        };

        for attr in parts {
            if attr.eq_ignore_ascii_case("secure") {
                cookie.secure = true;
            } else if attr.eq_ignore_ascii_case("httponly") {
                cookie.http_only = true;
            } else if let Some((key, val)) = attr.split_once('=') {
                let val = val.trim();
                match key.trim().to_ascii_lowercase().as_str() {
                    "domain" => cookie.domain = val.to_ascii_lowercase(),
                    "path" => cookie.path = val.to_string(),
                    "expires" => cookie.expires = parse_cookie_date(val),
                    "max-age" => cookie.max_age = val.parse().ok(),
                    "samesite" => cookie.same_site = SameSite::parse(val),
                    _ => {}
                }
            }
        }

        // RFC 6265 §5.3: Max-Age takes precedence over Expires.
        if let Some(max_age) = cookie.max_age {
            cookie.expires = if max_age > 0 {
                Some(Utc::now() + chrono::Duration::seconds(max_age))
            } else {
                Some(Utc::now() - chrono::Duration::seconds(1))
            };
        }

        Ok(cookie)
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires.map(|e| e < now).unwrap_or(false)
    }

    /// RFC 6265 §5.1.4 path matching.
    pub fn path_matches(&self, request_path: &str) -> bool {
        let cookie_path = self.path.as_str();
        if request_path == cookie_path {
            return true;
        }
        if !request_path.starts_with(cookie_path) {
            return false;
        }
        if cookie_path.ends_with('/') {
            return true;
        }
        request_path.as_bytes().get(cookie_path.len()) == Some(&b'/')
    }

    /// RFC 6265 §5.1.3 domain matching against a normalized request host.
    pub fn domain_matches(&self, request_host: &str) -> bool {
        if self.host_only {
            return request_host == self.domain;
        }
        let bare = self.domain.trim_start_matches('.');
        request_host == bare || request_host.ends_with(&format!(".{}", bare))
    }
}

/// Cookie jar: normalized domain → (path, name) → cookie.
#[derive(Debug, Clone, Default)]
pub struct CookieJar {
    cookies: HashMap<String, HashMap<(String, String), Cookie>>,
}

impl CookieJar {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply a parsed cookie from a response.
    ///
    /// `request_host` is the host that sent the Set-Cookie header;
    /// `request_secure` is true for HTTPS. Returns whether the cookie was
    /// accepted.
    pub fn set(&mut self, request_host: &str, request_secure: bool, mut cookie: Cookie) -> bool {
        let request_host = normalize_host(request_host);

        if cookie.domain.is_empty() {
            // No Domain attribute: host-only.
            cookie.domain = request_host.clone();
            cookie.host_only = true;
        } else {
            let bare = cookie.domain.trim_start_matches('.').to_string();
            // Request host must be the domain itself or a subdomain of it.
            if request_host != bare && !request_host.ends_with(&format!(".{}", bare)) {
                return false;
            }
            // Refuse cookies scoped to a public suffix.
            if is_public_suffix(&bare) {
                return false;
            }
            cookie.domain = format!(".{}", bare);
            cookie.host_only = false;
        }

        if cookie.secure && !request_secure {
            return false;
        }

        // RFC 6265bis: SameSite=None requires Secure.
        if cookie.same_site == Some(SameSite::None) && !cookie.secure {
            return false;
        }

        if cookie.path.is_empty() || !cookie.path.starts_with('/') {
            cookie.path = "/".to_string();
        }

        let key = (cookie.path.clone(), cookie.name.clone());
        let domain_key = cookie.domain.clone();
        let slot = self.cookies.entry(domain_key).or_default();
        // Replacement keeps the original creation time per RFC 6265 §5.3.
        if let Some(old) = slot.get(&key) {
            cookie.created_at = old.created_at;
        }
        slot.insert(key, cookie);
        true
    }

    /// Parse and apply every `Set-Cookie` header from a response.
    pub fn set_from_headers(&mut self, request_host: &str, request_secure: bool, headers: &[&str]) {
        for header in headers {
            if let Ok(cookie) = Cookie::parse(header) {
                self.set(request_host, request_secure, cookie);
            }
        }
    }

    /// All cookies to send for a request, sorted per RFC 6265 §5.4
    /// (path length descending, then creation time ascending).
    pub fn cookies_for(
        &self,
        request_host: &str,
        request_path: &str,
        request_secure: bool,
    ) -> Vec<&Cookie> {
        let request_host = normalize_host(request_host);
        let request_path = if request_path.is_empty() {
            "/"
        } else {
            request_path
        };
        let now = Utc::now();

        let mut matches: Vec<&Cookie> = self
            .cookies
            .values()
            .flat_map(|m| m.values())
            .filter(|c| c.domain_matches(&request_host))
            .filter(|c| c.path_matches(request_path))
            .filter(|c| !c.secure || request_secure)
            .filter(|c| !c.is_expired(now))
            .collect();

        matches.sort_by(|a, b| {
            b.path
                .len()
                .cmp(&a.path.len())
                .then_with(|| a.created_at.cmp(&b.created_at))
        });
        matches
    }

    /// `Cookie` header value for a request, or `None` when nothing matches.
    pub fn header_for(
        &self,
        request_host: &str,
        request_path: &str,
        request_secure: bool,
    ) -> Option<String> {
        let cookies = self.cookies_for(request_host, request_path, request_secure);
        if cookies.is_empty() {
            return None;
        }
        Some(
            cookies
                .iter()
                .map(|c| format!("{}={}", c.name, c.value))
                .collect::<Vec<_>>()
                .join("; "),
        )
    }

    pub fn get(&self, domain: &str, name: &str) -> Option<&Cookie> {
        self.cookies
            .get(domain)
            .or_else(|| self.cookies.get(&format!(".{}", domain.trim_start_matches('.'))))?
            .values()
            .find(|c| c.name == name)
    }

    pub fn remove(&mut self, domain: &str, name: &str) -> Option<Cookie> {
        let slot = self.cookies.get_mut(domain)?;
        let key = slot
            .iter()
            .find(|((_, n), _)| n == name)
            .map(|(k, _)| k.clone())?;
        slot.remove(&key)
    }

    pub fn clear(&mut self) {
        self.cookies.clear();
    }

    /// Eagerly drop expired cookies and empty domain buckets.
    pub fn sweep_expired(&mut self) {
        let now = Utc::now();
        for slot in self.cookies.values_mut() {
            slot.retain(|_, c| !c.is_expired(now));
        }
        self.cookies.retain(|_, slot| !slot.is_empty());
    }

    pub fn count(&self) -> usize {
        self.cookies.values().map(|m| m.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.count() == 0
    }

    /// Non-expired cookies grouped by domain key (snapshot export).
    pub fn export_by_domain(&self) -> HashMap<String, Vec<Cookie>> {
        let now = Utc::now();
        let mut out: HashMap<String, Vec<Cookie>> = HashMap::new();
        for (domain, slot) in &self.cookies {
            let cookies: Vec<Cookie> = slot
                .values()
                .filter(|c| !c.is_expired(now))
                .cloned()
                .collect();
            if !cookies.is_empty() {
                out.insert(domain.clone(), cookies);
            }
        }
        out
    }

    /// Insert already-scoped cookies (snapshot import). `host_only` is
    /// re-derived from the stored domain's leading dot.
    pub fn import(&mut self, cookies: impl IntoIterator<Item = Cookie>) {
        let now = Utc::now();
        for mut cookie in cookies {
            if cookie.is_expired(now) {
                continue;
            }
            if cookie.path.is_empty() {
                cookie.path = "/".to_string();
            }
            cookie.host_only = !cookie.domain.starts_with('.');
            let key = (cookie.path.clone(), cookie.name.clone());
            self.cookies
                .entry(cookie.domain.clone())
                .or_default()
                .insert(key, cookie);
        }
    }
}

/// Lowercase a request host and strip any port, preserving IPv6 brackets.
pub fn normalize_host(host: &str) -> String {
    let host = host.to_ascii_lowercase();
    if let Some(idx) = host.rfind(':') {
        // "[::1]:8443" strips the port; "[::1]" and bare "::1" do not.
        match host.rfind(']') {
            Some(bracket) if idx < bracket => host,
            Some(_) | None if host.matches(':').count() > 1 && !host.contains('[') => host,
            _ => host[..idx].to_string(),
        }
    } else {
        host
    }
}

fn parse_cookie_date(date_str: &str) -> Option<DateTime<Utc>> {
    // RFC 6265 §5.1.1 cookie date formats plus common variations.
    const FORMATS: &[&str] = &[
        "%a, %d %b %Y %H:%M:%S GMT",
        "%A, %d-%b-%y %H:%M:%S GMT",
        "%a %b %e %H:%M:%S %Y",
        "%a, %d-%b-%Y %H:%M:%S GMT",
        "%d %b %Y %H:%M:%S GMT",
        "%a, %d %b %Y %H:%M:%S %z",
        "%Y-%m-%dT%H:%M:%SZ",
        "%Y-%m-%dT%H:%M:%S%.fZ",
    ];

    for fmt in FORMATS {
        if let Ok(dt) = DateTime::parse_from_str(date_str, fmt) {
            return Some(dt.with_timezone(&Utc));
        }
        if let Ok(dt) = chrono::NaiveDateTime::parse_from_str(date_str, fmt) {
            return Some(Utc.from_utc_datetime(&dt));
        }
    }

    date_str
        .parse::<i64>()
        .ok()
        .and_then(|ts| Utc.timestamp_opt(ts, 0).single())
}

/// RFC 6265 §5.3: no cookies for public suffixes like "com" or "co.uk".
fn is_public_suffix(domain: &str) -> bool {
    psl::suffix(domain.as_bytes())
        .map(|suffix| suffix.is_known() && suffix.as_bytes() == domain.as_bytes())
        .unwrap_or(false)
}
