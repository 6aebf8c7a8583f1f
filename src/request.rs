//! Request type with ordered headers and per-request overrides.

use std::time::Duration;

use bytes::Bytes;
use http::Method;

use crate::headers::OrderedHeaders;

/// Protocol selection for one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ForceProtocol {
    /// Negotiate per the origin's capability record (H3 → H2 → H1).
    #[default]
    Auto,
    Http1,
    Http2,
    Http3,
}

/// Browser request context, feeding the `Sec-Fetch-*` family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FetchMode {
    /// Top-level navigation (address bar, link click).
    #[default]
    Navigate,
    /// `fetch()` call from page script.
    Fetch,
    /// XMLHttpRequest from page script.
    Xhr,
    /// Subresource load issued during page rendering.
    Subresource(SubresourceKind),
}

/// Subresource classes the warmup planner schedules.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubresourceKind {
    Style,
    Script,
    Image,
    Font,
}

impl FetchMode {
    /// (`Sec-Fetch-Dest`, `Sec-Fetch-Mode`) for this context.
    pub fn dest_and_mode(&self) -> (&'static str, &'static str) {
        match self {
            FetchMode::Navigate => ("document", "navigate"),
            FetchMode::Fetch => ("empty", "cors"),
            FetchMode::Xhr => ("empty", "cors"),
            FetchMode::Subresource(SubresourceKind::Style) => ("style", "no-cors"),
            FetchMode::Subresource(SubresourceKind::Script) => ("script", "no-cors"),
            FetchMode::Subresource(SubresourceKind::Image) => ("image", "no-cors"),
            FetchMode::Subresource(SubresourceKind::Font) => ("font", "cors"),
        }
    }

    pub fn is_navigation(&self) -> bool {
        matches!(self, FetchMode::Navigate)
    }
}

/// One logical HTTP request.
#[derive(Debug, Clone)]
pub struct Request {
    pub method: Method,
    pub url: String,
    /// Insertion-ordered header multimap; emission order is this order
    /// unless a `Header-Order` override is present.
    pub headers: OrderedHeaders,
    pub body: Option<Bytes>,
    pub force_protocol: ForceProtocol,
    /// Per-request deadline; the session default applies when `None`.
    pub timeout: Option<Duration>,
    /// Browser context for `Sec-Fetch-*` derivation; defaults to
    /// navigation for top-level GETs.
    pub fetch_mode: Option<FetchMode>,
    /// Referring page URL, if any (drives `Sec-Fetch-Site` and `Referer`).
    pub page_url: Option<String>,
    /// Redirect following; on by default.
    pub follow_redirects: bool,
    /// Marks a non-idempotent request as safe to retry on a fresh
    /// connection after GOAWAY/REFUSED_STREAM.
    pub retryable: bool,
}

impl Request {
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: OrderedHeaders::new(),
            body: None,
            force_protocol: ForceProtocol::Auto,
            timeout: None,
            fetch_mode: None,
            page_url: None,
            follow_redirects: true,
            retryable: false,
        }
    }

    pub fn get(url: impl Into<String>) -> Self {
        Self::new(Method::GET, url)
    }

    pub fn post(url: impl Into<String>, body: impl Into<Bytes>) -> Self {
        let mut req = Self::new(Method::POST, url);
        req.body = Some(body.into());
        req
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.append(name, value);
        self
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = Some(body.into());
        self
    }

    pub fn with_fetch_mode(mut self, mode: FetchMode) -> Self {
        self.fetch_mode = Some(mode);
        self
    }

    pub fn with_page_url(mut self, page: impl Into<String>) -> Self {
        self.page_url = Some(page.into());
        self
    }

    pub fn with_force_protocol(mut self, force: ForceProtocol) -> Self {
        self.force_protocol = force;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn no_redirects(mut self) -> Self {
        self.follow_redirects = false;
        self
    }

    /// Effective fetch mode: the caller's, or navigation for GET/HEAD.
    pub fn effective_fetch_mode(&self) -> FetchMode {
        self.fetch_mode.unwrap_or_else(|| {
            if self.method == Method::GET || self.method == Method::HEAD {
                FetchMode::Navigate
            } else {
                FetchMode::Fetch
            }
        })
    }

    /// Idempotent methods are retried on connection-level failures.
    pub fn is_idempotent(&self) -> bool {
        self.method == Method::GET || self.method == Method::HEAD
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_fetch_mode_is_navigate_for_get() {
        assert_eq!(
            Request::get("https://example.test/").effective_fetch_mode(),
            FetchMode::Navigate
        );
        assert_eq!(
            Request::post("https://example.test/", "x").effective_fetch_mode(),
            FetchMode::Fetch
        );
    }

    #[test]
    fn subresource_dest_and_mode() {
        let (dest, mode) = FetchMode::Subresource(SubresourceKind::Font).dest_and_mode();
        assert_eq!((dest, mode), ("font", "cors"));
        let (dest, mode) = FetchMode::Subresource(SubresourceKind::Style).dest_and_mode();
        assert_eq!((dest, mode), ("style", "no-cors"));
    }
}
