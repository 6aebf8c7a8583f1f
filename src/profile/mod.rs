//! Browser profile catalog.
//!
//! A profile bundles every fingerprint dimension — TLS, HTTP/2, HTTP/3,
//! the default header template, and the keep-alive discipline — for one
//! browser family and version. Mixing dimensions across families is itself
//! a fingerprint, so the `Profile` struct has no optional dimensions and
//! the catalog is the single source of truth for all three protocol
//! stacks.
//!
//! Profiles are constructed from literal tables at compile time and are
//! immutable for the process lifetime.

pub mod http2;
pub mod http3;
pub mod tls;

mod chrome;
mod firefox;
mod safari;

use std::time::Duration;

use crate::error::{Error, Result};
use crate::headers::FetchSite;
use crate::request::{FetchMode, SubresourceKind};

pub use http2::{
    HeadersPriority, HpackIndexing, Http2Profile, Indexing, InitialPriority, PriorityMode,
    PseudoHeader, PseudoHeaderOrder,
};
pub use http3::{H3Profile, TransportParam};
pub use tls::TlsProfile;

/// Browser family, driving header ordering and family-wide quirks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BrowserFamily {
    Chrome,
    Firefox,
    Safari,
}

/// HTTP/1.1 connection-reuse discipline.
///
/// Reuse behavior is observable via timing, so it is a profile dimension
/// like any wire byte.
#[derive(Debug, Clone, Copy)]
pub struct KeepAlivePolicy {
    /// Requests served before the connection is retired.
    pub max_requests: u32,
    /// Idle lifetime before the connection is dropped.
    pub idle_timeout: Duration,
    /// Send `Connection: keep-alive` explicitly rather than relying on the
    /// HTTP/1.1 default.
    pub explicit_header: bool,
    /// Open a second connection eagerly for same-origin parallelism.
    pub prewarm_second: bool,
}

impl KeepAlivePolicy {
    pub const fn chrome() -> Self {
        Self {
            max_requests: 100,
            idle_timeout: Duration::from_secs(300),
            explicit_header: true,
            prewarm_second: true,
        }
    }

    pub const fn firefox() -> Self {
        Self {
            max_requests: 100,
            idle_timeout: Duration::from_secs(115),
            explicit_header: true,
            prewarm_second: false,
        }
    }

    pub const fn off() -> Self {
        Self {
            max_requests: 1,
            idle_timeout: Duration::from_secs(0),
            explicit_header: false,
            prewarm_second: false,
        }
    }
}

/// Default header values for a profile.
#[derive(Debug, Clone, Copy)]
pub struct HeaderTemplate {
    pub user_agent: &'static str,
    pub accept_navigate: &'static str,
    pub accept_language: &'static str,
    pub accept_encoding: &'static str,
    pub sec_ch_ua: Option<&'static str>,
    pub sec_ch_ua_mobile: Option<&'static str>,
    pub sec_ch_ua_platform: Option<&'static str>,
}

/// A complete browser fingerprint.
#[derive(Debug, Clone, Copy)]
pub struct Profile {
    pub name: &'static str,
    pub family: BrowserFamily,
    pub tls: TlsProfile,
    pub http2: Http2Profile,
    pub http3: H3Profile,
    pub headers: HeaderTemplate,
    pub keep_alive: KeepAlivePolicy,
}

static PROFILES: &[Profile] = &[chrome::CHROME_143, firefox::FIREFOX_133, safari::SAFARI_17];

/// Names of all registered profiles.
pub fn available() -> Vec<&'static str> {
    PROFILES.iter().map(|p| p.name).collect()
}

/// Look up a profile by name.
pub fn get(name: &str) -> Result<&'static Profile> {
    PROFILES
        .iter()
        .find(|p| p.name == name)
        .ok_or_else(|| Error::UnknownProfile(name.to_string()))
}

impl Profile {
    /// The Accept value for a request context.
    fn accept_for(&self, mode: FetchMode) -> &'static str {
        match mode {
            FetchMode::Navigate => self.headers.accept_navigate,
            FetchMode::Fetch | FetchMode::Xhr => "*/*",
            FetchMode::Subresource(SubresourceKind::Style) => "text/css,*/*;q=0.1",
            FetchMode::Subresource(SubresourceKind::Script) => "*/*",
            FetchMode::Subresource(SubresourceKind::Image) => {
                "image/avif,image/webp,image/apng,image/svg+xml,image/*,*/*;q=0.8"
            }
            FetchMode::Subresource(SubresourceKind::Font) => "*/*",
        }
    }

    /// The Priority header value for a request context (Chrome/Firefox).
    fn priority_for(&self, mode: FetchMode) -> Option<&'static str> {
        match mode {
            FetchMode::Navigate => Some("u=0, i"),
            FetchMode::Fetch | FetchMode::Xhr => Some("u=1, i"),
            FetchMode::Subresource(SubresourceKind::Style) => Some("u=0, i"),
            FetchMode::Subresource(SubresourceKind::Script) => Some("u=1"),
            FetchMode::Subresource(SubresourceKind::Image) => Some("u=2"),
            FetchMode::Subresource(SubresourceKind::Font) => Some("u=3"),
        }
    }

    /// Default headers for one request, in the profile's wire order.
    ///
    /// The engine merges caller headers on top of these (caller wins) and
    /// appends Cookie/Referer afterwards.
    pub fn default_headers(&self, mode: FetchMode, site: FetchSite) -> Vec<(&'static str, String)> {
        let (dest, fetch_mode) = mode.dest_and_mode();
        let navigation = mode.is_navigation();
        let mut out: Vec<(&'static str, String)> = Vec::with_capacity(14);

        match self.family {
            BrowserFamily::Chrome => {
                if let Some(v) = self.headers.sec_ch_ua {
                    out.push(("sec-ch-ua", v.to_string()));
                }
                if let Some(v) = self.headers.sec_ch_ua_mobile {
                    out.push(("sec-ch-ua-mobile", v.to_string()));
                }
                if let Some(v) = self.headers.sec_ch_ua_platform {
                    out.push(("sec-ch-ua-platform", v.to_string()));
                }
                if navigation {
                    out.push(("upgrade-insecure-requests", "1".to_string()));
                }
                out.push(("user-agent", self.headers.user_agent.to_string()));
                out.push(("accept", self.accept_for(mode).to_string()));
                out.push(("sec-fetch-site", site.as_str().to_string()));
                out.push(("sec-fetch-mode", fetch_mode.to_string()));
                if navigation {
                    out.push(("sec-fetch-user", "?1".to_string()));
                }
                out.push(("sec-fetch-dest", dest.to_string()));
                out.push(("accept-encoding", self.headers.accept_encoding.to_string()));
                out.push(("accept-language", self.headers.accept_language.to_string()));
                if let Some(priority) = self.priority_for(mode) {
                    out.push(("priority", priority.to_string()));
                }
            }
            BrowserFamily::Firefox => {
                out.push(("user-agent", self.headers.user_agent.to_string()));
                out.push(("accept", self.accept_for(mode).to_string()));
                out.push(("accept-language", self.headers.accept_language.to_string()));
                out.push(("accept-encoding", self.headers.accept_encoding.to_string()));
                if navigation {
                    out.push(("upgrade-insecure-requests", "1".to_string()));
                }
                out.push(("sec-fetch-dest", dest.to_string()));
                out.push(("sec-fetch-mode", fetch_mode.to_string()));
                out.push(("sec-fetch-site", site.as_str().to_string()));
                if navigation {
                    out.push(("sec-fetch-user", "?1".to_string()));
                }
                if let Some(priority) = self.priority_for(mode) {
                    out.push(("priority", priority.to_string()));
                }
            }
            BrowserFamily::Safari => {
                out.push(("user-agent", self.headers.user_agent.to_string()));
                out.push(("accept", self.accept_for(mode).to_string()));
                out.push(("sec-fetch-site", site.as_str().to_string()));
                out.push(("sec-fetch-mode", fetch_mode.to_string()));
                out.push(("sec-fetch-dest", dest.to_string()));
                out.push(("accept-language", self.headers.accept_language.to_string()));
                out.push(("accept-encoding", self.headers.accept_encoding.to_string()));
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn catalog_lists_all_profiles() {
        let names = available();
        assert!(names.contains(&"chrome-143"));
        assert!(names.contains(&"firefox-133"));
        assert!(names.contains(&"safari-17"));
    }

    #[test]
    fn unknown_profile_is_an_error() {
        assert!(matches!(get("netscape-4"), Err(Error::UnknownProfile(_))));
    }

    #[test]
    fn chrome_reference_wire_values() {
        let p = get("chrome-143").unwrap();
        assert_eq!(
            p.http2.settings,
            &[(0x1, 65536), (0x2, 0), (0x4, 6291456), (0x6, 262144)]
        );
        // MAX_CONCURRENT_STREAMS is deliberately absent.
        assert_eq!(p.http2.setting(0x3), None);
        assert_eq!(p.http2.connection_window_increment, 15663105);
        assert_eq!(p.http2.pseudo_order.akamai_string(), "m,a,s,p");
        let prio = p.http2.headers_priority.unwrap();
        assert_eq!((prio.weight, prio.exclusive, prio.depends_on), (256, true, 0));
    }

    #[test]
    fn navigation_headers_include_sec_fetch_user_only_for_navigation() {
        let p = get("chrome-143").unwrap();
        let nav = p.default_headers(FetchMode::Navigate, FetchSite::None);
        assert!(nav.iter().any(|(n, _)| *n == "sec-fetch-user"));
        let sub = p.default_headers(
            FetchMode::Subresource(SubresourceKind::Image),
            FetchSite::SameOrigin,
        );
        assert!(!sub.iter().any(|(n, _)| *n == "sec-fetch-user"));
        assert!(sub
            .iter()
            .any(|(n, v)| *n == "sec-fetch-mode" && v == "no-cors"));
    }
}
