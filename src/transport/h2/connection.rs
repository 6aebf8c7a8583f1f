//! HTTP/2 connection with full fingerprint control.
//!
//! Handshake order is profile-exact: connection preface, SETTINGS (declared
//! list in declared order, optionally a trailing GREASE entry), connection
//! WINDOW_UPDATE, then any initial PRIORITY tree. Requests encode their
//! pseudo-headers and regular headers in the caller-resolved order through
//! the connection's single HPACK encoder.

use bytes::{Buf, Bytes, BytesMut};
use http::Method;
use rand::Rng;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::{Error, Result};
use crate::profile::http2::{
    HeadersPriority, Http2Profile, PriorityMode, PseudoHeader, PseudoHeaderOrder,
};

use super::frame::*;
use super::hpack;

/// RFC 9113 default stream/connection window.
const DEFAULT_WINDOW: i64 = 65535;

/// Receive-window threshold below which WINDOW_UPDATE is sent.
const WINDOW_UPDATE_THRESHOLD: i64 = 16384;

/// Peer settings, updated from SETTINGS frames.
#[derive(Debug, Clone, Copy)]
pub struct PeerSettings {
    pub header_table_size: u32,
    pub enable_push: bool,
    pub max_concurrent_streams: u32,
    pub initial_window_size: u32,
    pub max_frame_size: u32,
}

impl Default for PeerSettings {
    fn default() -> Self {
        Self {
            header_table_size: 4096,
            enable_push: true,
            max_concurrent_streams: u32::MAX,
            initial_window_size: DEFAULT_WINDOW as u32,
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
        }
    }
}

/// Response pieces surfaced by one stream.
#[derive(Debug)]
pub struct StreamResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Bytes,
}

/// HTTP/2 client connection over any async stream.
pub struct H2Connection<S> {
    stream: S,
    encoder: hpack::Encoder,
    decoder: hpack::Decoder,
    profile: Http2Profile,
    next_stream_id: u32,
    peer: PeerSettings,
    conn_send_window: i64,
    conn_recv_window: i64,
    read_buf: BytesMut,
    /// Control replies (SETTINGS ACK, PING ACK) written before the next
    /// blocking read.
    pending_writes: Vec<Bytes>,
    goaway_last_stream: Option<u32>,
    broken: bool,
}

impl<S> H2Connection<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    /// Perform the client-side HTTP/2 handshake.
    ///
    /// The browsers this crate impersonates do not wait for the server's
    /// SETTINGS before sending the first request; the peer's SETTINGS are
    /// applied when they show up in the read loop.
    pub async fn connect(mut stream: S, profile: Http2Profile) -> Result<Self> {
        let mut settings = SettingsFrame::new();
        for &(id, value) in profile.settings {
            settings.push(id, value);
        }
        if profile.settings_grease {
            settings.push(grease_settings_id(), 0);
        }

        let mut handshake = BytesMut::new();
        handshake.extend_from_slice(CONNECTION_PREFACE);
        handshake.extend_from_slice(&settings.serialize());
        handshake.extend_from_slice(
            &WindowUpdateFrame::new(0, profile.connection_window_increment).serialize(),
        );
        if profile.priority_mode == PriorityMode::Firefox {
            for p in profile.initial_priorities {
                handshake.extend_from_slice(
                    &PriorityFrame::new(p.stream_id, p.depends_on, p.weight, p.exclusive)
                        .serialize(),
                );
            }
        }

        stream
            .write_all(&handshake)
            .await
            .map_err(|e| Error::http_protocol(format!("handshake write: {}", e)))?;
        stream
            .flush()
            .await
            .map_err(|e| Error::http_protocol(format!("handshake flush: {}", e)))?;

        let mut decoder = hpack::Decoder::new();
        decoder.set_max_table_size(profile.header_table_size() as usize);

        Ok(Self {
            stream,
            encoder: hpack::Encoder::new(),
            decoder,
            profile,
            next_stream_id: 1,
            peer: PeerSettings::default(),
            conn_send_window: DEFAULT_WINDOW,
            conn_recv_window: DEFAULT_WINDOW + profile.connection_window_increment as i64,
            read_buf: BytesMut::with_capacity(16384),
            pending_writes: Vec::new(),
            goaway_last_stream: None,
            broken: false,
        })
    }

    /// True when the connection can go back to the idle pool.
    pub fn is_reusable(&self) -> bool {
        self.goaway_last_stream.is_none() && !self.broken
    }

    pub fn peer_settings(&self) -> &PeerSettings {
        &self.peer
    }

    /// Send one request and read its response.
    ///
    /// `headers` is the fully-resolved ordered list of regular headers.
    /// `pseudo_order` and `priority` override the profile when present.
    pub async fn send_request(
        &mut self,
        method: &Method,
        scheme: &str,
        authority: &str,
        path: &str,
        headers: &[(String, String)],
        body: Option<Bytes>,
        pseudo_order: Option<PseudoHeaderOrder>,
        priority: Option<HeadersPriority>,
    ) -> Result<StreamResponse> {
        let stream_id = self.next_stream_id;
        self.next_stream_id += 2;

        if let Some(last) = self.goaway_last_stream {
            if stream_id > last {
                return Err(Error::GoAway {
                    last_stream_id: last,
                });
            }
        }

        let body = body.unwrap_or_default();
        let end_stream = body.is_empty();
        self.write_headers(
            stream_id,
            method,
            scheme,
            authority,
            path,
            headers,
            end_stream,
            pseudo_order,
            priority,
        )
        .await?;

        if !end_stream {
            self.write_body(stream_id, &body).await?;
        }

        self.read_response(stream_id).await
    }

    #[allow(clippy::too_many_arguments)]
    async fn write_headers(
        &mut self,
        stream_id: u32,
        method: &Method,
        scheme: &str,
        authority: &str,
        path: &str,
        headers: &[(String, String)],
        end_stream: bool,
        pseudo_order: Option<PseudoHeaderOrder>,
        priority: Option<HeadersPriority>,
    ) -> Result<()> {
        if authority.is_empty() || path.is_empty() {
            return Err(Error::http_protocol("empty :authority or :path"));
        }

        let order = pseudo_order.unwrap_or(self.profile.pseudo_order);
        let pseudo_indexing = hpack::classify_pseudo(&self.profile.indexing);

        let mut fields: Vec<hpack::Field> = Vec::with_capacity(4 + headers.len());
        for pseudo in order.0 {
            let (name, value): (&str, &str) = match pseudo {
                PseudoHeader::Method => (":method", method.as_str()),
                PseudoHeader::Authority => (":authority", authority),
                PseudoHeader::Scheme => (":scheme", scheme),
                PseudoHeader::Path => (":path", path),
            };
            fields.push(hpack::Field::new(name, value, pseudo_indexing));
        }

        for (name, value) in headers {
            if name.is_empty() || name.starts_with(':') {
                continue;
            }
            // HTTP/2 forbids connection-specific headers (RFC 9113 §8.2.2);
            // host travels as :authority.
            let lower = name.to_ascii_lowercase();
            if matches!(
                lower.as_str(),
                "host" | "connection" | "keep-alive" | "proxy-connection" | "transfer-encoding"
                    | "upgrade"
            ) {
                continue;
            }
            if lower == "te" && !value.eq_ignore_ascii_case("trailers") {
                continue;
            }
            let indexing = self.profile.indexing.classify(&lower);
            fields.push(hpack::Field::new(lower, value.as_str(), indexing));
        }

        let block = self.encoder.encode(&fields);
        if block.is_empty() {
            return Err(Error::http_protocol("empty header block"));
        }

        let headers_priority = match self.profile.priority_mode {
            PriorityMode::Off => None,
            _ => priority.or(self.profile.headers_priority),
        }
        .map(|p| PriorityData {
            exclusive: p.exclusive,
            stream_dependency: p.depends_on,
            weight: p.weight,
        });

        let max_frame = self.peer.max_frame_size as usize;
        let mut out = BytesMut::new();
        if block.len() <= max_frame {
            out.extend_from_slice(
                &HeadersFrame::new(stream_id, block)
                    .end_stream(end_stream)
                    .end_headers(true)
                    .with_priority(headers_priority)
                    .serialize(),
            );
        } else {
            let chunks: Vec<Bytes> = block.chunks(max_frame).map(Bytes::copy_from_slice).collect();
            let last = chunks.len() - 1;
            for (i, chunk) in chunks.into_iter().enumerate() {
                if i == 0 {
                    out.extend_from_slice(
                        &HeadersFrame::new(stream_id, chunk)
                            .end_stream(end_stream)
                            .end_headers(false)
                            .with_priority(headers_priority)
                            .serialize(),
                    );
                } else {
                    out.extend_from_slice(
                        &ContinuationFrame::new(stream_id, chunk, i == last).serialize(),
                    );
                }
            }
        }

        self.stream
            .write_all(&out)
            .await
            .map_err(|e| Error::http_protocol(format!("HEADERS write: {}", e)))?;
        self.stream
            .flush()
            .await
            .map_err(|e| Error::http_protocol(format!("flush: {}", e)))?;
        Ok(())
    }

    /// Send the request body with flow control, reading interleaved frames
    /// when the window is exhausted.
    async fn write_body(&mut self, stream_id: u32, body: &Bytes) -> Result<()> {
        let mut offset = 0usize;
        let mut stream_window = self.peer.initial_window_size as i64;

        while offset < body.len() {
            let window = self.conn_send_window.min(stream_window);
            if window <= 0 {
                // Blocked: process frames until a WINDOW_UPDATE arrives.
                let (header, payload) = self.read_frame().await?;
                match self.apply_control_frame(&header, payload, stream_id)? {
                    ControlEvent::WindowUpdate { stream, increment } => {
                        if stream == stream_id {
                            stream_window += increment as i64;
                        }
                    }
                    ControlEvent::StreamClosed(code) => {
                        self.broken = true;
                        return Err(Error::StreamReset { code: code as u64 });
                    }
                    ControlEvent::GoAway(last) => {
                        return Err(Error::GoAway {
                            last_stream_id: last,
                        });
                    }
                    ControlEvent::None => {}
                }
                continue;
            }

            let chunk_len = (body.len() - offset)
                .min(window as usize)
                .min(self.peer.max_frame_size as usize);
            let end_stream = offset + chunk_len == body.len();
            let chunk = body.slice(offset..offset + chunk_len);
            self.stream
                .write_all(&DataFrame::new(stream_id, chunk, end_stream).serialize())
                .await
                .map_err(|e| Error::http_protocol(format!("DATA write: {}", e)))?;
            self.stream
                .flush()
                .await
                .map_err(|e| Error::http_protocol(format!("flush: {}", e)))?;
            self.conn_send_window -= chunk_len as i64;
            stream_window -= chunk_len as i64;
            offset += chunk_len;
        }
        Ok(())
    }

    /// Read frames until the stream completes.
    async fn read_response(&mut self, stream_id: u32) -> Result<StreamResponse> {
        let mut status = 0u16;
        let mut headers: Vec<(String, String)> = Vec::new();
        let mut body = BytesMut::new();
        let mut stream_recv_window = self.profile.initial_window_size() as i64;

        loop {
            let (header, payload) = match self.read_frame().await {
                Ok(ok) => ok,
                Err(Error::Connection(_)) | Err(Error::Io(_)) if !body.is_empty() || status != 0 => {
                    self.broken = true;
                    return Err(Error::TruncatedBody {
                        received: body.len(),
                    });
                }
                Err(e) => {
                    self.broken = true;
                    return Err(e);
                }
            };

            match header.frame_type {
                FrameType::Headers => {
                    if header.stream_id != stream_id {
                        continue;
                    }
                    let frame = HeadersFrame::parse(header.stream_id, header.flags, payload)
                        .map_err(Error::HttpProtocol)?;
                    let mut block = BytesMut::from(frame.header_block.as_ref());
                    if !frame.end_headers {
                        self.read_continuations(stream_id, &mut block).await?;
                    }
                    let decoded = self
                        .decoder
                        .decode(&block)
                        .map_err(|e| Error::http_protocol(format!("HPACK: {}", e)))?;
                    for (name, value) in decoded {
                        if name == ":status" {
                            status = value.parse().unwrap_or(0);
                        } else if !name.starts_with(':') {
                            headers.push((name, value));
                        }
                    }
                    if frame.end_stream {
                        break;
                    }
                }
                FrameType::Data => {
                    if header.stream_id != stream_id {
                        continue;
                    }
                    let frame = DataFrame::parse(header.stream_id, header.flags, payload)
                        .map_err(Error::HttpProtocol)?;
                    let len = frame.data.len() as i64;
                    self.conn_recv_window -= len;
                    stream_recv_window -= len;
                    body.extend_from_slice(&frame.data);

                    if self.conn_recv_window < WINDOW_UPDATE_THRESHOLD {
                        self.send_window_update(0, DEFAULT_WINDOW as u32).await?;
                        self.conn_recv_window += DEFAULT_WINDOW;
                    }
                    if stream_recv_window < WINDOW_UPDATE_THRESHOLD && !frame.end_stream {
                        self.send_window_update(stream_id, DEFAULT_WINDOW as u32).await?;
                        stream_recv_window += DEFAULT_WINDOW;
                    }

                    if frame.end_stream {
                        break;
                    }
                }
                _ => match self.apply_control_frame(&header, payload, stream_id)? {
                    ControlEvent::StreamClosed(code) => {
                        self.broken = true;
                        return Err(Error::StreamReset { code: code as u64 });
                    }
                    ControlEvent::GoAway(last) => {
                        if stream_id > last {
                            return Err(Error::GoAway {
                                last_stream_id: last,
                            });
                        }
                    }
                    _ => {}
                },
            }
        }

        Ok(StreamResponse {
            status,
            headers,
            body: body.freeze(),
        })
    }

    async fn read_continuations(&mut self, stream_id: u32, block: &mut BytesMut) -> Result<()> {
        loop {
            let (header, payload) = self.read_frame().await?;
            if header.frame_type != FrameType::Continuation || header.stream_id != stream_id {
                return Err(Error::http_protocol("expected CONTINUATION"));
            }
            block.extend_from_slice(&payload);
            if header.flags & flags::END_HEADERS != 0 {
                return Ok(());
            }
        }
    }

    /// Apply SETTINGS / PING / WINDOW_UPDATE / RST_STREAM / GOAWAY.
    fn apply_control_frame(
        &mut self,
        header: &FrameHeader,
        payload: Bytes,
        current_stream: u32,
    ) -> Result<ControlEvent> {
        match header.frame_type {
            FrameType::Settings => {
                let settings = SettingsFrame::parse(header.flags, payload);
                if !settings.ack {
                    self.apply_peer_settings(&settings);
                    self.queue_write(SettingsFrame::ack().serialize().freeze());
                }
                Ok(ControlEvent::None)
            }
            FrameType::Ping => {
                if let Some(ping) = PingFrame::parse(header.flags, &payload) {
                    if !ping.ack {
                        self.queue_write(PingFrame::ack(ping.data).serialize().freeze());
                    }
                }
                Ok(ControlEvent::None)
            }
            FrameType::WindowUpdate => {
                let wu = WindowUpdateFrame::parse(header.stream_id, payload)
                    .ok_or_else(|| Error::http_protocol("zero WINDOW_UPDATE increment"))?;
                if wu.stream_id == 0 {
                    self.conn_send_window += wu.increment as i64;
                }
                Ok(ControlEvent::WindowUpdate {
                    stream: wu.stream_id,
                    increment: wu.increment,
                })
            }
            FrameType::RstStream => {
                match RstStreamFrame::parse(header.stream_id, payload) {
                    Some(rst) if rst.stream_id == current_stream => {
                        Ok(ControlEvent::StreamClosed(rst.error_code))
                    }
                    Some(_) => Ok(ControlEvent::None),
                    None => Err(Error::http_protocol("malformed RST_STREAM")),
                }
            }
            FrameType::GoAway => {
                let goaway = GoAwayFrame::parse(payload)
                    .ok_or_else(|| Error::http_protocol("malformed GOAWAY"))?;
                self.goaway_last_stream = Some(goaway.last_stream_id);
                Ok(ControlEvent::GoAway(goaway.last_stream_id))
            }
            FrameType::PushPromise => {
                // Push is disabled in every browser profile; refuse it.
                self.queue_write(
                    RstStreamFrame::new(header.stream_id, 0x8 /* CANCEL */)
                        .serialize()
                        .freeze(),
                );
                Ok(ControlEvent::None)
            }
            _ => Ok(ControlEvent::None),
        }
    }

    fn apply_peer_settings(&mut self, settings: &SettingsFrame) {
        for &(id, value) in &settings.settings {
            match id {
                0x1 => {
                    self.peer.header_table_size = value;
                    self.encoder.set_max_table_size(value as usize);
                }
                0x2 => self.peer.enable_push = value != 0,
                0x3 => self.peer.max_concurrent_streams = value,
                0x4 => {
                    if value <= i32::MAX as u32 {
                        self.peer.initial_window_size = value;
                    }
                }
                0x5 => {
                    if (16384..=16_777_215).contains(&value) {
                        self.peer.max_frame_size = value;
                    }
                }
                _ => {} // Unknown and GREASE settings are ignored.
            }
        }
    }

    /// Queue a control reply; flushed before the next blocking read.
    fn queue_write(&mut self, bytes: Bytes) {
        self.pending_writes.push(bytes);
    }

    async fn send_window_update(&mut self, stream_id: u32, increment: u32) -> Result<()> {
        self.stream
            .write_all(&WindowUpdateFrame::new(stream_id, increment).serialize())
            .await
            .map_err(|e| Error::http_protocol(format!("WINDOW_UPDATE write: {}", e)))?;
        self.stream
            .flush()
            .await
            .map_err(|e| Error::http_protocol(format!("flush: {}", e)))?;
        Ok(())
    }

    /// Read one full frame, validating size against our limits.
    async fn read_frame(&mut self) -> Result<(FrameHeader, Bytes)> {
        // Flush any queued control replies before blocking on reads.
        if !self.pending_writes.is_empty() {
            for bytes in std::mem::take(&mut self.pending_writes) {
                self.stream
                    .write_all(&bytes)
                    .await
                    .map_err(|e| Error::http_protocol(format!("control write: {}", e)))?;
            }
            self.stream
                .flush()
                .await
                .map_err(|e| Error::http_protocol(format!("flush: {}", e)))?;
        }

        while self.read_buf.len() < FRAME_HEADER_LEN {
            self.fill_read_buf().await?;
        }
        let header = FrameHeader::parse(&self.read_buf[..FRAME_HEADER_LEN])
            .ok_or_else(|| Error::http_protocol("invalid frame header"))?;

        let our_max = self
            .profile
            .setting(0x5)
            .unwrap_or(DEFAULT_MAX_FRAME_SIZE)
            .max(DEFAULT_MAX_FRAME_SIZE);
        if header.length > our_max {
            return Err(Error::http_protocol(format!(
                "frame of {} bytes exceeds max frame size {}",
                header.length, our_max
            )));
        }

        let total = FRAME_HEADER_LEN + header.length as usize;
        while self.read_buf.len() < total {
            self.fill_read_buf().await?;
        }
        let payload = Bytes::copy_from_slice(&self.read_buf[FRAME_HEADER_LEN..total]);
        self.read_buf.advance(total);
        Ok((header, payload))
    }

    async fn fill_read_buf(&mut self) -> Result<()> {
        let mut buf = [0u8; 16384];
        let n = self
            .stream
            .read(&mut buf)
            .await
            .map_err(|e| Error::connection(format!("read: {}", e)))?;
        if n == 0 {
            return Err(Error::connection("connection closed by peer"));
        }
        self.read_buf.extend_from_slice(&buf[..n]);
        Ok(())
    }
}

#[derive(Debug)]
enum ControlEvent {
    None,
    WindowUpdate { stream: u32, increment: u32 },
    StreamClosed(u32),
    GoAway(u32),
}

/// Reserved GREASE settings id (RFC 8701: 0x0a0a, 0x1a1a, ... 0xfafa),
/// varied per connection.
fn grease_settings_id() -> u16 {
    let k = rand::thread_rng().gen_range(0..16u16);
    0x0a0a + k * 0x1010
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile;

    #[tokio::test]
    async fn handshake_is_preface_settings_window_update() {
        let (client, mut server) = tokio::io::duplex(65536);
        let p = profile::get("chrome-143").unwrap();
        let _conn = H2Connection::connect(client, p.http2).await.unwrap();

        let mut buf = vec![0u8; CONNECTION_PREFACE.len()];
        server.read_exact(&mut buf).await.unwrap();
        assert_eq!(buf, CONNECTION_PREFACE);

        // SETTINGS: 4 declared entries plus one GREASE entry.
        let mut header = [0u8; 9];
        server.read_exact(&mut header).await.unwrap();
        let parsed = FrameHeader::parse(&header).unwrap();
        assert_eq!(parsed.frame_type, FrameType::Settings);
        assert_eq!(parsed.length, 5 * 6);

        let mut payload = vec![0u8; parsed.length as usize];
        server.read_exact(&mut payload).await.unwrap();
        let settings = SettingsFrame::parse(0, Bytes::from(payload));
        assert_eq!(
            &settings.settings[..4],
            &[(0x1, 65536), (0x2, 0), (0x4, 6291456), (0x6, 262144)]
        );
        // Trailing GREASE id has the 0x?a?a shape.
        let (grease_id, _) = settings.settings[4];
        assert_eq!(grease_id & 0x0f0f, 0x0a0a);

        // Then the connection WINDOW_UPDATE.
        server.read_exact(&mut header).await.unwrap();
        let parsed = FrameHeader::parse(&header).unwrap();
        assert_eq!(parsed.frame_type, FrameType::WindowUpdate);
        let mut payload = vec![0u8; 4];
        server.read_exact(&mut payload).await.unwrap();
        assert_eq!(u32::from_be_bytes(payload.try_into().unwrap()), 15663105);
    }

    #[tokio::test]
    async fn firefox_handshake_emits_priority_tree() {
        let (client, mut server) = tokio::io::duplex(65536);
        let p = profile::get("firefox-133").unwrap();
        let _conn = H2Connection::connect(client, p.http2).await.unwrap();

        let mut preface = vec![0u8; CONNECTION_PREFACE.len()];
        server.read_exact(&mut preface).await.unwrap();

        // Skip SETTINGS (3 entries, no GREASE) and WINDOW_UPDATE.
        let mut header = [0u8; 9];
        server.read_exact(&mut header).await.unwrap();
        let settings = FrameHeader::parse(&header).unwrap();
        assert_eq!(settings.length, 3 * 6);
        let mut skip = vec![0u8; settings.length as usize];
        server.read_exact(&mut skip).await.unwrap();
        server.read_exact(&mut header).await.unwrap();
        let mut skip = vec![0u8; 4];
        server.read_exact(&mut skip).await.unwrap();

        // Six PRIORITY frames for streams 3,5,7,9,11,13.
        let mut stream_ids = Vec::new();
        for _ in 0..6 {
            server.read_exact(&mut header).await.unwrap();
            let parsed = FrameHeader::parse(&header).unwrap();
            assert_eq!(parsed.frame_type, FrameType::Priority);
            stream_ids.push(parsed.stream_id);
            let mut skip = vec![0u8; 5];
            server.read_exact(&mut skip).await.unwrap();
        }
        assert_eq!(stream_ids, vec![3, 5, 7, 9, 11, 13]);
    }
}
