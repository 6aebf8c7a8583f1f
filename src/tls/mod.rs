//! TLS fingerprint adapter over BoringSSL.
//!
//! Authors the ClientHello for both TCP TLS and QUIC from one profile:
//! cipher/group/sigalg order, GREASE and extension permutation, the
//! TCP-vs-QUIC extension divergence, real ECH vs GREASE ECH, and session
//! resumption from the persistable ticket cache.

pub mod session;

use std::io;
use std::os::raw::c_int;
use std::pin::Pin;
use std::sync::OnceLock;
use std::task::{Context, Poll};

use boring::ex_data::Index;
use boring::ssl::{
    Ssl, SslConnector, SslConnectorBuilder, SslContext, SslContextBuilder, SslMethod, SslSession,
    SslSessionCacheMode, SslVerifyMode, SslVersion,
};
use foreign_types_shared::ForeignTypeRef;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::TcpStream;
use tokio_boring::SslStream;

use crate::error::{Error, Result};
use crate::profile::tls::{TlsProfile, TLS1_2, TLS1_3};

use boring_sys::{SSL, SSL_CTX};

// BoringSSL knobs the safe wrapper does not surface.
extern "C" {
    /// GREASE values peppered through the ClientHello (Chrome family).
    fn SSL_CTX_set_grease_enabled(ctx: *mut SSL_CTX, enabled: c_int) -> c_int;
    /// Extension order permutation (Chrome 110+ / Firefox 135+ behavior).
    fn SSL_CTX_set_permute_extensions(ctx: *mut SSL_CTX, enabled: c_int) -> c_int;
    /// TLS 1.2 status_request extension (OCSP stapling).
    fn SSL_CTX_enable_ocsp_stapling(ctx: *mut SSL_CTX);
    /// TLS 1.2 signed_certificate_timestamp extension.
    fn SSL_CTX_enable_signed_cert_timestamps(ctx: *mut SSL_CTX);
    /// Offer 0-RTT on resumption.
    fn SSL_CTX_set_early_data_enabled(ctx: *mut SSL_CTX, enabled: c_int);
    /// Install a real ECHConfigList for this handshake.
    fn SSL_set1_ech_config_list(ssl: *mut SSL, list: *const u8, len: usize) -> c_int;
    /// Emit a GREASE ECH extension when no config is installed.
    fn SSL_set_enable_ech_grease(ssl: *mut SSL, enabled: c_int);
}

/// Which transport the ClientHello is authored for. QUIC is TLS 1.3 only
/// and must omit the TLS 1.2 legacy extensions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportKind {
    Tcp,
    Quic,
}

/// Negotiated ALPN protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlpnProtocol {
    H2,
    Http1,
    H3,
    Unknown,
}

impl AlpnProtocol {
    pub fn from_selected(selected: Option<&[u8]>) -> Self {
        match selected {
            Some(b"h2") => Self::H2,
            Some(b"http/1.1") => Self::Http1,
            Some(b"h3") => Self::H3,
            _ => Self::Unknown,
        }
    }

    pub fn is_h2(&self) -> bool {
        matches!(self, Self::H2)
    }
}

/// Index carrying the ticket-cache key through the new-session callback.
fn ticket_key_index() -> &'static Index<Ssl, String> {
    static INDEX: OnceLock<Index<Ssl, String>> = OnceLock::new();
    INDEX.get_or_init(|| Ssl::new_ex_index::<String>().expect("ex_data index"))
}

/// TLS connector configured from one profile.
#[derive(Clone)]
pub struct TlsConnector {
    profile: TlsProfile,
    tickets: session::TicketCache,
    verify_certs: bool,
}

impl TlsConnector {
    pub fn new(profile: TlsProfile, tickets: session::TicketCache) -> Self {
        Self {
            profile,
            tickets,
            verify_certs: true,
        }
    }

    pub fn danger_accept_invalid_certs(mut self, accept: bool) -> Self {
        self.verify_certs = !accept;
        self
    }

    pub fn tickets(&self) -> &session::TicketCache {
        &self.tickets
    }

    /// Apply the profile's fingerprint to a context builder. One authoring
    /// path serves both TCP TLS and QUIC, keeping the two ClientHellos
    /// coherent.
    fn apply_profile(&self, builder: &mut SslContextBuilder, kind: TransportKind) -> Result<()> {
        let fp = &self.profile;

        if !fp.cipher_list.is_empty() {
            builder
                .set_cipher_list(&fp.cipher_list.join(":"))
                .map_err(|e| Error::tls(format!("cipher list: {}", e)))?;
        }
        if !fp.groups.is_empty() {
            builder
                .set_curves_list(&fp.groups.join(":"))
                .map_err(|e| Error::tls(format!("groups: {}", e)))?;
        }
        if !fp.sigalgs.is_empty() {
            builder
                .set_sigalgs_list(&fp.sigalgs.join(":"))
                .map_err(|e| Error::tls(format!("sigalgs: {}", e)))?;
        }

        let min = if kind == TransportKind::Quic || !fp.versions.contains(&TLS1_2) {
            SslVersion::TLS1_3
        } else {
            SslVersion::TLS1_2
        };
        let max = if fp.versions.contains(&TLS1_3) {
            SslVersion::TLS1_3
        } else {
            SslVersion::TLS1_2
        };
        builder
            .set_min_proto_version(Some(min))
            .map_err(|e| Error::tls(format!("min version: {}", e)))?;
        builder
            .set_max_proto_version(Some(max))
            .map_err(|e| Error::tls(format!("max version: {}", e)))?;

        unsafe {
            let ctx = builder.as_ptr() as *mut SSL_CTX;
            SSL_CTX_set_grease_enabled(ctx, fp.grease as c_int);
            SSL_CTX_set_permute_extensions(ctx, fp.permute_extensions as c_int);

            // The TLS 1.2 legacy extensions exist only on TCP; QUIC
            // ClientHellos must not carry them.
            if kind == TransportKind::Tcp {
                if fp.ocsp_stapling {
                    SSL_CTX_enable_ocsp_stapling(ctx);
                }
                if fp.signed_cert_timestamps {
                    SSL_CTX_enable_signed_cert_timestamps(ctx);
                }
            }

            if fp.early_data {
                SSL_CTX_set_early_data_enabled(ctx, 1);
            }
        }

        let alpn = match kind {
            TransportKind::Tcp => TlsProfile::alpn_wire(fp.alpn_tcp),
            TransportKind::Quic => TlsProfile::alpn_wire(fp.alpn_quic),
        };
        builder
            .set_alpn_protos(&alpn)
            .map_err(|e| Error::tls(format!("ALPN: {}", e)))?;

        if !self.verify_certs {
            builder.set_verify(SslVerifyMode::NONE);
        }

        Ok(())
    }

    /// Build the TCP-TLS connector builder with ticket capture wired in.
    pub fn ssl_builder(&self) -> Result<SslConnectorBuilder> {
        let mut builder = SslConnector::builder(SslMethod::tls_client())
            .map_err(|e| Error::tls(format!("SSL connector: {}", e)))?;
        self.apply_profile(&mut builder, TransportKind::Tcp)?;

        if self.profile.session_tickets {
            builder.set_session_cache_mode(SslSessionCacheMode::CLIENT);
            let tickets = self.tickets.clone();
            builder.set_new_session_callback(move |ssl, ssl_session| {
                if let Some(key) = ssl.ex_data(*ticket_key_index()) {
                    match ssl_session.to_der() {
                        Ok(der) => {
                            tracing::debug!(key = %key, "TLS session ticket cached");
                            tickets.put(key, der);
                        }
                        Err(e) => tracing::debug!(error = %e, "session serialization failed"),
                    }
                }
            });
        }

        Ok(builder)
    }

    /// Build a raw context builder for the QUIC stack (quiche accepts a
    /// boring context builder). QUIC session resumption goes through
    /// quiche's own session API, so no callback is installed here.
    pub fn quic_ctx_builder(&self) -> Result<SslContextBuilder> {
        let mut builder = SslContext::builder(SslMethod::tls_client())
            .map_err(|e| Error::tls(format!("SSL context: {}", e)))?;
        builder
            .set_default_verify_paths()
            .map_err(|e| Error::tls(format!("verify paths: {}", e)))?;
        self.apply_profile(&mut builder, TransportKind::Quic)?;
        Ok(builder)
    }

    /// Handshake over an established TCP stream.
    ///
    /// A cached session for `ticket_key` is offered via the pre_shared_key
    /// extension; a resumption rejection invalidates the ticket and
    /// surfaces as `TicketInvalid` so the caller can redial for a full
    /// handshake. `ech_config` installs real ECH; absent that, the profile
    /// decides whether to GREASE. `alpn_override` narrows the ALPN list
    /// for forced-protocol dials.
    pub async fn handshake(
        &self,
        host: &str,
        stream: TcpStream,
        ticket_key: &str,
        ech_config: Option<&[u8]>,
        alpn_override: Option<&[&str]>,
    ) -> Result<SslStream<TcpStream>> {
        let connector = self.ssl_builder()?.build();
        let mut config = connector
            .configure()
            .map_err(|e| Error::tls(format!("SSL configure: {}", e)))?;

        config.set_ex_data(*ticket_key_index(), ticket_key.to_string());

        if let Some(protocols) = alpn_override {
            config
                .set_alpn_protos(&TlsProfile::alpn_wire(protocols))
                .map_err(|e| Error::tls(format!("ALPN override: {}", e)))?;
        }

        unsafe {
            let ssl = config.as_ptr() as *mut SSL;
            match ech_config {
                Some(list) if !list.is_empty() => {
                    if SSL_set1_ech_config_list(ssl, list.as_ptr(), list.len()) != 1 {
                        tracing::debug!(host, "ECH config rejected, falling back to GREASE");
                        if self.profile.ech_grease {
                            SSL_set_enable_ech_grease(ssl, 1);
                        }
                    }
                }
                _ => {
                    if self.profile.ech_grease {
                        SSL_set_enable_ech_grease(ssl, 1);
                    }
                }
            }
        }

        let mut resumed = false;
        if self.profile.session_tickets {
            if let Some(der) = self.tickets.get(ticket_key) {
                if let Ok(ssl_session) = SslSession::from_der(&der) {
                    // Offered via pre_shared_key in the profile's slot.
                    unsafe {
                        let _ = config.set_session(&ssl_session);
                    }
                    resumed = true;
                }
            }
        }

        match tokio_boring::connect(config, host, stream).await {
            Ok(ssl_stream) => Ok(ssl_stream),
            Err(e) => {
                let msg = e.to_string();
                if msg.contains("certificate") {
                    return Err(Error::CertVerification(msg));
                }
                if resumed {
                    // Drop the rejected ticket; the retry dials fresh and
                    // performs a full handshake.
                    self.tickets.invalidate(ticket_key);
                    return Err(Error::TicketInvalid(msg));
                }
                Err(Error::Handshake(msg))
            }
        }
    }
}

/// Stream that is either plain TCP (http) or TLS (https).
pub enum MaybeTlsStream {
    Plain(TcpStream),
    Tls(SslStream<TcpStream>),
}

impl MaybeTlsStream {
    /// ALPN result; plain TCP has none.
    pub fn alpn(&self) -> AlpnProtocol {
        match self {
            Self::Plain(_) => AlpnProtocol::Unknown,
            Self::Tls(stream) => {
                AlpnProtocol::from_selected(stream.ssl().selected_alpn_protocol())
            }
        }
    }
}

impl AsyncRead for MaybeTlsStream {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match &mut *self {
            Self::Plain(s) => Pin::new(s).poll_read(cx, buf),
            Self::Tls(s) => Pin::new(s).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for MaybeTlsStream {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        match &mut *self {
            Self::Plain(s) => Pin::new(s).poll_write(cx, buf),
            Self::Tls(s) => Pin::new(s).poll_write(cx, buf),
        }
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match &mut *self {
            Self::Plain(s) => Pin::new(s).poll_flush(cx),
            Self::Tls(s) => Pin::new(s).poll_flush(cx),
        }
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match &mut *self {
            Self::Plain(s) => Pin::new(s).poll_shutdown(cx),
            Self::Tls(s) => Pin::new(s).poll_shutdown(cx),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alpn_mapping() {
        assert_eq!(AlpnProtocol::from_selected(Some(b"h2")), AlpnProtocol::H2);
        assert_eq!(
            AlpnProtocol::from_selected(Some(b"http/1.1")),
            AlpnProtocol::Http1
        );
        assert_eq!(AlpnProtocol::from_selected(None), AlpnProtocol::Unknown);
    }

    #[test]
    fn alpn_wire_format() {
        assert_eq!(
            TlsProfile::alpn_wire(&["h2", "http/1.1"]),
            b"\x02h2\x08http/1.1".to_vec()
        );
    }
}
