//! # Mirage
//!
//! Browser-impersonating HTTPS client. Mirage issues HTTP/1.1, HTTP/2,
//! and HTTP/3 requests whose wire artifacts — TLS ClientHello, HTTP/2
//! SETTINGS and HPACK behavior, QUIC transport parameters, header
//! ordering — match a named browser profile, with BoringSSL-based TLS
//! across all protocols.

// Core types
pub mod cookie;
pub mod error;
pub mod headers;
pub mod request;
pub mod response;

// Fingerprint catalog
pub mod profile;

// Resolution and TLS
pub mod dns;
pub mod tls;

// Transports
pub mod transport;

// Connection pooling
pub mod pool;

// Session / request engine
pub mod session;

// Re-exports for convenient access
pub use cookie::{Cookie, CookieJar, SameSite};
pub use error::{Error, Result};
pub use headers::OrderedHeaders;
pub use profile::Profile;
pub use request::{FetchMode, ForceProtocol, Request, SubresourceKind};
pub use response::{Protocol, Response};
pub use session::{Session, SessionOptions};

// Pool re-exports
pub use pool::{Capabilities, CapabilityCache, ConnectionPool, Origin, TriState};

/// Names of all registered browser profiles.
pub fn available_profiles() -> Vec<&'static str> {
    profile::available()
}
