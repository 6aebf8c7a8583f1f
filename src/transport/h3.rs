//! HTTP/3 transport over quiche.
//!
//! The QUIC handshake reuses the TLS adapter's BoringSSL context, so the
//! QUIC ClientHello carries the same cipher/group/sigalg fingerprint as
//! the TCP path (minus the TCP-only legacy extensions). Transport
//! parameters are applied in the profile's declared order; quiche pads
//! client initial packets to the RFC 9000 minimum (>= 1200 bytes), which
//! matches Chrome. 0-RTT is attempted only when the profile allows it and
//! a cached session exists.

use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use bytes::Bytes;
use getrandom::getrandom;
use http::Method;
use quiche::h3::NameValue;
use tokio::net::UdpSocket;

use crate::error::{Error, Result};
use crate::profile::http2::{PseudoHeader, PseudoHeaderOrder};
use crate::profile::http3::{h3_settings_ids, H3Profile, TransportParam};
use crate::tls::session::TicketCache;
use crate::tls::TlsConnector;
use crate::transport::h2::StreamResponse;

/// UDP datagram buffer size.
const MAX_DATAGRAM_SIZE: usize = 1500;

/// Polling granularity while waiting for peer packets.
const RECV_POLL: Duration = Duration::from_millis(25);

/// One QUIC + HTTP/3 connection.
pub struct H3Connection {
    conn: quiche::Connection,
    h3: quiche::h3::Connection,
    socket: UdpSocket,
    peer: SocketAddr,
    ticket_key: String,
    tickets: TicketCache,
    early_data_attempted: bool,
    broken: bool,
}

impl H3Connection {
    /// Dial QUIC and set up the H3 control stream.
    pub async fn connect(
        host: &str,
        port: u16,
        addr: IpAddr,
        tls: &TlsConnector,
        profile: &H3Profile,
        ticket_key: &str,
    ) -> Result<Self> {
        let mut config = quiche::Config::with_boring_ssl_ctx_builder(
            quiche::PROTOCOL_VERSION,
            tls.quic_ctx_builder()?,
        )
        .map_err(|e| Error::quic(format!("config: {}", e)))?;

        config
            .set_application_protos(quiche::h3::APPLICATION_PROTOCOL)
            .map_err(|e| Error::quic(format!("ALPN: {}", e)))?;

        // Transport parameters in the profile's declared order.
        for &(param, value) in profile.transport_params {
            match param {
                TransportParam::MaxIdleTimeout => config.set_max_idle_timeout(value),
                TransportParam::MaxUdpPayloadSize => {
                    config.set_max_send_udp_payload_size(value as usize)
                }
                TransportParam::InitialMaxData => config.set_initial_max_data(value),
                TransportParam::InitialMaxStreamDataBidiLocal => {
                    config.set_initial_max_stream_data_bidi_local(value)
                }
                TransportParam::InitialMaxStreamDataBidiRemote => {
                    config.set_initial_max_stream_data_bidi_remote(value)
                }
                TransportParam::InitialMaxStreamDataUni => {
                    config.set_initial_max_stream_data_uni(value)
                }
                TransportParam::InitialMaxStreamsBidi => config.set_initial_max_streams_bidi(value),
                TransportParam::InitialMaxStreamsUni => config.set_initial_max_streams_uni(value),
                TransportParam::ActiveConnectionIdLimit => {
                    config.set_active_connection_id_limit(value)
                }
            }
        }
        config.set_max_recv_udp_payload_size(65535);
        config.set_disable_active_migration(true);
        config.grease(true);

        let tickets = tls.tickets().clone();
        let cached_session = tickets.get(ticket_key);
        let mut early_data_attempted = false;
        if profile.early_data && cached_session.is_some() {
            config.enable_early_data();
        }

        let local = match addr {
            IpAddr::V4(_) => SocketAddr::new(std::net::Ipv4Addr::UNSPECIFIED.into(), 0),
            IpAddr::V6(_) => SocketAddr::new(std::net::Ipv6Addr::UNSPECIFIED.into(), 0),
        };
        let socket = UdpSocket::bind(local).await.map_err(Error::Io)?;
        let peer = SocketAddr::new(addr, port);

        // Chrome-length (8 byte) connection IDs, fresh per connection.
        let mut scid_bytes = [0u8; 8];
        getrandom(&mut scid_bytes).map_err(|e| Error::quic(format!("scid: {}", e)))?;
        let scid = quiche::ConnectionId::from_ref(&scid_bytes);

        let local_addr = socket.local_addr().map_err(Error::Io)?;
        let mut conn = quiche::connect(Some(host), &scid, local_addr, peer, &mut config)
            .map_err(|e| Error::quic(format!("connect: {}", e)))?;

        if let Some(session) = cached_session {
            if conn.set_session(&session).is_ok() && profile.early_data {
                early_data_attempted = true;
            }
        }

        // Drive the handshake (or reach early data).
        let idle_deadline = tokio::time::Instant::now()
            + Duration::from_millis(profile.idle_timeout_ms());
        loop {
            flush_egress(&mut conn, &socket, peer).await?;

            if conn.is_established() || conn.is_in_early_data() {
                break;
            }
            if conn.is_closed() {
                return Err(Error::Handshake("QUIC connection closed".into()));
            }
            if tokio::time::Instant::now() > idle_deadline {
                return Err(Error::timeout("QUIC handshake"));
            }

            recv_ingress(&socket, &mut conn, peer).await?;
        }

        let mut h3_config =
            quiche::h3::Config::new().map_err(|e| Error::quic(format!("h3 config: {}", e)))?;
        for &(id, value) in profile.settings {
            match id {
                h3_settings_ids::QPACK_MAX_TABLE_CAPACITY => {
                    h3_config.set_qpack_max_table_capacity(value)
                }
                h3_settings_ids::QPACK_BLOCKED_STREAMS => h3_config.set_qpack_blocked_streams(value),
                h3_settings_ids::MAX_FIELD_SECTION_SIZE => h3_config.set_max_field_section_size(value),
                _ => {}
            }
        }

        let h3 = quiche::h3::Connection::with_transport(&mut conn, &h3_config)
            .map_err(|e| Error::quic(format!("h3 setup: {}", e)))?;

        Ok(Self {
            conn,
            h3,
            socket,
            peer,
            ticket_key: ticket_key.to_string(),
            tickets,
            early_data_attempted,
            broken: false,
        })
    }

    /// Whether this connection offered 0-RTT on its handshake.
    pub fn used_early_data(&self) -> bool {
        self.early_data_attempted
    }

    pub fn is_reusable(&self) -> bool {
        !self.broken && !self.conn.is_closed() && !self.conn.is_draining()
    }

    /// Send one request and read its response.
    pub async fn send_request(
        &mut self,
        method: &Method,
        authority: &str,
        path: &str,
        headers: &[(String, String)],
        body: Option<Bytes>,
        pseudo_order: Option<PseudoHeaderOrder>,
    ) -> Result<StreamResponse> {
        let order = pseudo_order.unwrap_or(PseudoHeaderOrder::CHROME);
        let mut h3_headers: Vec<quiche::h3::Header> = Vec::with_capacity(4 + headers.len());
        for pseudo in order.0 {
            let (name, value): (&[u8], &[u8]) = match pseudo {
                PseudoHeader::Method => (b":method", method.as_str().as_bytes()),
                PseudoHeader::Authority => (b":authority", authority.as_bytes()),
                PseudoHeader::Scheme => (b":scheme", b"https"),
                PseudoHeader::Path => (b":path", path.as_bytes()),
            };
            h3_headers.push(quiche::h3::Header::new(name, value));
        }
        for (name, value) in headers {
            if name.is_empty() || name.starts_with(':') {
                continue;
            }
            let lower = name.to_ascii_lowercase();
            if matches!(
                lower.as_str(),
                "host" | "connection" | "keep-alive" | "proxy-connection" | "transfer-encoding"
                    | "upgrade"
            ) {
                continue;
            }
            h3_headers.push(quiche::h3::Header::new(lower.as_bytes(), value.as_bytes()));
        }

        let body = body.unwrap_or_default();
        let stream_id = self
            .h3
            .send_request(&mut self.conn, &h3_headers, body.is_empty())
            .map_err(|e| Error::quic(format!("send request: {}", e)))?;

        if !body.is_empty() {
            let mut offset = 0;
            while offset < body.len() {
                match self
                    .h3
                    .send_body(&mut self.conn, stream_id, &body[offset..], true)
                {
                    Ok(sent) => offset += sent,
                    Err(quiche::h3::Error::Done) => {
                        flush_egress(&mut self.conn, &self.socket, self.peer).await?;
                        recv_ingress(&self.socket, &mut self.conn, self.peer).await?;
                    }
                    Err(e) => return Err(Error::quic(format!("send body: {}", e))),
                }
            }
        }

        let response = self.read_response(stream_id).await;

        // TLS 1.3 tickets arrive after the handshake; capture whatever the
        // connection holds now for resumption and 0-RTT next dial.
        if let Some(session) = self.conn.session() {
            self.tickets.put(&self.ticket_key, session.to_vec());
        }

        response
    }

    async fn read_response(&mut self, stream_id: u64) -> Result<StreamResponse> {
        let mut status = 0u16;
        let mut headers: Vec<(String, String)> = Vec::new();
        let mut body = Vec::new();
        let mut finished = false;

        while !finished {
            flush_egress(&mut self.conn, &self.socket, self.peer).await?;

            loop {
                match self.h3.poll(&mut self.conn) {
                    Ok((id, quiche::h3::Event::Headers { list, .. })) if id == stream_id => {
                        for header in list {
                            let name = String::from_utf8_lossy(header.name()).into_owned();
                            let value = String::from_utf8_lossy(header.value()).into_owned();
                            if name == ":status" {
                                status = value.parse().unwrap_or(0);
                            } else if !name.starts_with(':') {
                                headers.push((name, value));
                            }
                        }
                    }
                    Ok((id, quiche::h3::Event::Data)) if id == stream_id => {
                        let mut chunk = [0u8; 16384];
                        loop {
                            match self.h3.recv_body(&mut self.conn, stream_id, &mut chunk) {
                                Ok(n) => body.extend_from_slice(&chunk[..n]),
                                Err(quiche::h3::Error::Done) => break,
                                Err(e) => {
                                    self.broken = true;
                                    return Err(Error::quic(format!("recv body: {}", e)));
                                }
                            }
                        }
                    }
                    Ok((id, quiche::h3::Event::Finished)) if id == stream_id => {
                        finished = true;
                    }
                    Ok((id, quiche::h3::Event::Reset(code))) if id == stream_id => {
                        return Err(Error::StreamReset { code });
                    }
                    Ok((_, quiche::h3::Event::GoAway)) => {
                        self.broken = true;
                        return Err(Error::GoAway {
                            last_stream_id: stream_id as u32,
                        });
                    }
                    Ok(_) => {}
                    Err(quiche::h3::Error::Done) => break,
                    Err(e) => {
                        self.broken = true;
                        return Err(Error::quic(format!("poll: {}", e)));
                    }
                }
            }

            if finished {
                break;
            }
            if self.conn.is_closed() {
                self.broken = true;
                return Err(Error::TruncatedBody {
                    received: body.len(),
                });
            }

            recv_ingress(&self.socket, &mut self.conn, self.peer).await?;
        }

        Ok(StreamResponse {
            status,
            headers,
            body: Bytes::from(body),
        })
    }
}

async fn flush_egress(
    conn: &mut quiche::Connection,
    socket: &UdpSocket,
    peer: SocketAddr,
) -> Result<()> {
    let mut out = [0u8; MAX_DATAGRAM_SIZE];
    loop {
        match conn.send(&mut out) {
            Ok((len, _info)) => {
                socket.send_to(&out[..len], peer).await.map_err(Error::Io)?;
            }
            Err(quiche::Error::Done) => return Ok(()),
            Err(e) => return Err(Error::quic(format!("send: {}", e))),
        }
    }
}

async fn recv_ingress(
    socket: &UdpSocket,
    conn: &mut quiche::Connection,
    peer: SocketAddr,
) -> Result<()> {
    let mut buf = [0u8; 65535];
    match tokio::time::timeout(RECV_POLL, socket.recv_from(&mut buf)).await {
        Ok(Ok((len, from))) => {
            let info = quiche::RecvInfo {
                from,
                to: socket.local_addr().map_err(Error::Io)?,
            };
            match conn.recv(&mut buf[..len], info) {
                Ok(_) => Ok(()),
                Err(quiche::Error::Done) => Ok(()),
                Err(quiche::Error::UnknownVersion) => Err(Error::VersionNegotiation {
                    advertised: vec![quiche::PROTOCOL_VERSION],
                }),
                Err(e) => Err(Error::quic(format!("recv: {} (from {})", e, peer))),
            }
        }
        Ok(Err(e)) => Err(Error::Io(e)),
        // No packet within the poll window; the caller re-checks timers.
        Err(_) => {
            conn.on_timeout();
            Ok(())
        }
    }
}
