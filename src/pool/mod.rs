//! Multi-protocol connection pool.
//!
//! Owns dialing: protocol selection from the per-origin capability cache,
//! the H3-vs-H2 race with an H3 head start, H1 fallback on typed protocol
//! failures, and a bounded per-origin idle list. A connection is owned by
//! exactly one request at a time; `release` decides whether it returns to
//! the idle list.

pub mod alt_svc;
pub mod capability;

use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tokio::net::TcpStream;
use url::Url;

use crate::dns::Resolver;
use crate::error::{Error, Result};
use crate::profile::Profile;
use crate::request::ForceProtocol;
use crate::response::Protocol;
use crate::tls::session::ticket_key;
use crate::tls::{AlpnProtocol, MaybeTlsStream, TlsConnector};
use crate::transport::h1::H1Connection;
use crate::transport::h2::H2Connection;
use crate::transport::h3::H3Connection;

pub use capability::{Capabilities, CapabilityCache, TriState};

/// H3 gets this much head start before the parallel H2 dial begins.
pub const H3_HEAD_START: Duration = Duration::from_millis(50);

/// Idle connections kept per origin.
const MAX_IDLE_PER_ORIGIN: usize = 4;

/// The unit of connection keying and capability caching.
#[derive(Debug, Clone, Hash, PartialEq, Eq)]
pub struct Origin {
    pub scheme: String,
    pub host: String,
    pub port: u16,
}

impl Origin {
    pub fn from_url(url: &Url) -> Result<Self> {
        let host = url
            .host_str()
            .ok_or_else(|| Error::missing("host in URL"))?
            .to_ascii_lowercase();
        let scheme = url.scheme().to_string();
        let port = url
            .port_or_known_default()
            .ok_or_else(|| Error::missing("port for scheme"))?;
        Ok(Self { scheme, host, port })
    }

    pub fn is_https(&self) -> bool {
        self.scheme == "https"
    }
}

impl std::fmt::Display for Origin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}://{}:{}", self.scheme, self.host, self.port)
    }
}

/// A live connection of one protocol.
pub enum Connection {
    H1(H1Connection),
    H2(H2Connection<MaybeTlsStream>),
    H3(H3Connection),
}

impl Connection {
    pub fn protocol(&self) -> Protocol {
        match self {
            Self::H1(_) => Protocol::H1,
            Self::H2(_) => Protocol::H2,
            Self::H3(_) => Protocol::H3,
        }
    }

    fn is_reusable(&self) -> bool {
        match self {
            Self::H1(c) => c.is_reusable(),
            Self::H2(c) => c.is_reusable(),
            Self::H3(c) => c.is_reusable(),
        }
    }
}

/// How the request that held the connection ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReleaseOutcome {
    Clean,
    Errored,
}

struct IdleConn {
    conn: Connection,
    idled_at: Instant,
}

/// The pool.
pub struct ConnectionPool {
    profile: &'static Profile,
    resolver: Arc<Resolver>,
    tls: TlsConnector,
    capabilities: Arc<CapabilityCache>,
    idle: Mutex<HashMap<Origin, Vec<IdleConn>>>,
}

impl ConnectionPool {
    pub fn new(profile: &'static Profile, resolver: Arc<Resolver>, tls: TlsConnector) -> Self {
        Self {
            profile,
            resolver,
            tls,
            capabilities: Arc::new(CapabilityCache::new()),
            idle: Mutex::new(HashMap::new()),
        }
    }

    pub fn capabilities(&self) -> &CapabilityCache {
        &self.capabilities
    }

    /// Take an idle connection or dial per the capability record.
    pub async fn acquire(&self, origin: &Origin, force: ForceProtocol) -> Result<Connection> {
        if let Some(conn) = self.take_idle(origin, force) {
            tracing::debug!(origin = %origin, protocol = %conn.protocol(), "reusing idle connection");
            return Ok(conn);
        }
        self.dial(origin, force).await
    }

    /// Return a connection; it goes back to the idle list only after a
    /// clean release of a still-healthy connection.
    pub fn release(&self, origin: &Origin, conn: Connection, outcome: ReleaseOutcome) {
        if outcome != ReleaseOutcome::Clean || !conn.is_reusable() {
            return;
        }
        let mut idle = self.idle.lock().unwrap_or_else(|e| e.into_inner());
        let list = idle.entry(origin.clone()).or_default();
        if list.len() >= MAX_IDLE_PER_ORIGIN {
            // Evict the least recently idled.
            list.remove(0);
        }
        list.push(IdleConn {
            conn,
            idled_at: Instant::now(),
        });
    }

    /// Chrome opens a second connection eagerly for same-origin H1
    /// parallelism; dial one in the background and park it idle.
    pub(crate) fn spawn_prewarm(self: &Arc<Self>, origin: &Origin) {
        if !self.profile.keep_alive.prewarm_second || self.has_idle(origin) {
            return;
        }
        let pool = Arc::clone(self);
        let origin = origin.clone();
        tokio::spawn(async move {
            match pool.dial(&origin, ForceProtocol::Http1).await {
                Ok(conn) => pool.release(&origin, conn, ReleaseOutcome::Clean),
                Err(e) => tracing::debug!(origin = %origin, error = %e, "prewarm dial failed"),
            }
        });
    }

    fn has_idle(&self, origin: &Origin) -> bool {
        self.idle
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(origin)
            .map(|list| !list.is_empty())
            .unwrap_or(false)
    }

    fn take_idle(&self, origin: &Origin, force: ForceProtocol) -> Option<Connection> {
        let mut idle = self.idle.lock().unwrap_or_else(|e| e.into_inner());
        let list = idle.get_mut(origin)?;
        let max_idle = self.profile.keep_alive.idle_timeout;
        list.retain(|c| c.idled_at.elapsed() < max_idle && c.conn.is_reusable());

        let wanted = |p: Protocol| match force {
            ForceProtocol::Auto => true,
            ForceProtocol::Http1 => p == Protocol::H1,
            ForceProtocol::Http2 => p == Protocol::H2,
            ForceProtocol::Http3 => p == Protocol::H3,
        };
        // Most recently idled first.
        let pos = list
            .iter()
            .rposition(|c| wanted(c.conn.protocol()))?;
        Some(list.remove(pos).conn)
    }

    async fn dial(&self, origin: &Origin, force: ForceProtocol) -> Result<Connection> {
        if !origin.is_https() {
            return self.dial_plain(origin).await;
        }

        match force {
            ForceProtocol::Http1 => self.dial_tls(origin, Some(&["http/1.1"])).await,
            ForceProtocol::Http2 => self.dial_tls(origin, Some(&["h2"])).await,
            ForceProtocol::Http3 => self.dial_h3(origin).await,
            ForceProtocol::Auto => self.dial_auto(origin).await,
        }
    }

    async fn dial_auto(&self, origin: &Origin) -> Result<Connection> {
        let caps = self.capabilities.snapshot(origin);

        if caps.h3 == TriState::Supported {
            match self.dial_h3(origin).await {
                Ok(conn) => return Ok(conn),
                Err(e) if e.is_protocol_unsupported() => {
                    tracing::debug!(origin = %origin, "H3 no longer supported, falling back");
                }
                Err(e) => return Err(e),
            }
        } else if caps.h2 == TriState::Supported {
            // Known-good H2: exactly one dial, no UDP.
            return self.dial_tls(origin, None).await;
        } else if caps.h3 != TriState::Unsupported {
            // Unknown territory: race H3 against H2 with a head start.
            return self.race_h3_h2(origin).await;
        }

        self.dial_tls(origin, None).await
    }

    /// Dial H3 and (after a short head start) H2 in parallel; first usable
    /// handshake wins and the loser is dropped mid-dial.
    async fn race_h3_h2(&self, origin: &Origin) -> Result<Connection> {
        let mut h3_fut = Box::pin(self.dial_h3(origin));
        let mut tcp_fut = Box::pin(async {
            tokio::time::sleep(H3_HEAD_START).await;
            self.dial_tls(origin, None).await
        });

        let mut h3_err: Option<Error> = None;
        let mut tcp_err: Option<Error> = None;

        loop {
            tokio::select! {
                res = &mut h3_fut, if h3_err.is_none() => match res {
                    Ok(conn) => return Ok(conn),
                    Err(e) => h3_err = Some(e),
                },
                res = &mut tcp_fut, if tcp_err.is_none() => match res {
                    Ok(conn) => return Ok(conn),
                    Err(e) => tcp_err = Some(e),
                },
            }
            if h3_err.is_some() && tcp_err.is_some() {
                break;
            }
        }

        let h3_err = h3_err.expect("set before break");
        let tcp_err = tcp_err.expect("set before break");

        // Both protocol-level refusals: the origin is plain H1.
        if h3_err.is_protocol_unsupported() && tcp_err.is_protocol_unsupported() {
            return self.dial_tls(origin, Some(&["http/1.1"])).await;
        }
        // Prefer surfacing the TCP-side error; it is the broader attempt.
        Err(tcp_err)
    }

    /// TCP + TLS dial. ALPN decides whether the connection comes up as H2
    /// or H1; either way the capability cache learns from it.
    async fn dial_tls(&self, origin: &Origin, alpn: Option<&[&str]>) -> Result<Connection> {
        let addr = self.pick_addr(origin).await?;
        let ech = self.resolver.fetch_ech_config(&origin.host).await;
        let key = ticket_key("h2", &origin.host, origin.port);

        // One transparent retry after a rejected resumption ticket; the
        // adapter has already dropped the ticket so this is a full
        // handshake.
        let mut attempt = 0;
        let stream = loop {
            attempt += 1;
            let tcp = TcpStream::connect((addr, origin.port))
                .await
                .map_err(|e| Error::connection(format!("{}: {}", origin, e)))?;
            match self
                .tls
                .handshake(&origin.host, tcp, &key, ech.as_deref(), alpn)
                .await
            {
                Ok(stream) => break stream,
                Err(Error::TicketInvalid(msg)) if attempt == 1 => {
                    tracing::debug!(origin = %origin, %msg, "resumption rejected, retrying full handshake");
                }
                Err(e) => return Err(e),
            }
        };

        match AlpnProtocol::from_selected(stream.ssl().selected_alpn_protocol()) {
            AlpnProtocol::H2 => {
                self.capabilities.note_h2_supported(origin);
                let conn =
                    H2Connection::connect(MaybeTlsStream::Tls(stream), self.profile.http2).await?;
                Ok(Connection::H2(conn))
            }
            AlpnProtocol::Http1 | AlpnProtocol::Unknown => {
                if alpn.is_none() {
                    // The origin answered TLS but chose http/1.1.
                    self.capabilities.note_h2_unsupported(origin);
                }
                Ok(Connection::H1(H1Connection::new(
                    MaybeTlsStream::Tls(stream),
                    self.profile.keep_alive,
                )))
            }
            AlpnProtocol::H3 => Err(Error::NoProtocolNegotiated(
                "h3 selected on a TCP connection".into(),
            )),
        }
    }

    async fn dial_h3(&self, origin: &Origin) -> Result<Connection> {
        let addr = self.pick_addr(origin).await?;
        let key = ticket_key("h3", &origin.host, origin.port);
        match H3Connection::connect(
            &origin.host,
            origin.port,
            addr,
            &self.tls,
            &self.profile.http3,
            &key,
        )
        .await
        {
            Ok(conn) => {
                self.capabilities.note_h3_supported(origin, None);
                Ok(Connection::H3(conn))
            }
            Err(e) => {
                if e.is_protocol_unsupported() {
                    self.capabilities.note_h3_unsupported(origin);
                }
                Err(e)
            }
        }
    }

    async fn dial_plain(&self, origin: &Origin) -> Result<Connection> {
        let addr = self.pick_addr(origin).await?;
        let tcp = TcpStream::connect((addr, origin.port))
            .await
            .map_err(|e| Error::connection(format!("{}: {}", origin, e)))?;
        Ok(Connection::H1(H1Connection::new(
            MaybeTlsStream::Plain(tcp),
            self.profile.keep_alive,
        )))
    }

    async fn pick_addr(&self, origin: &Origin) -> Result<IpAddr> {
        let addrs = self.resolver.resolve(&origin.host).await?;
        addrs
            .into_iter()
            .next()
            .ok_or_else(|| Error::dns(format!("{}: no usable address", origin.host)))
    }
}
