//! HTTP/2 frame codec (RFC 9113 §4-§6).
//!
//! Serialization keeps full control over frame ordering and content; the
//! SETTINGS payload in particular preserves the order settings were added
//! in, since that order is fingerprint-visible.

use bytes::{Buf, BufMut, Bytes, BytesMut};

/// Frame header size (RFC 9113 §4.1).
pub const FRAME_HEADER_LEN: usize = 9;

/// Default SETTINGS_MAX_FRAME_SIZE.
pub const DEFAULT_MAX_FRAME_SIZE: u32 = 16384;

/// Client connection preface.
pub const CONNECTION_PREFACE: &[u8] = b"PRI * HTTP/2.0\r\n\r\nSM\r\n\r\n";

/// Frame type identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameType {
    Data,
    Headers,
    Priority,
    RstStream,
    Settings,
    PushPromise,
    Ping,
    GoAway,
    WindowUpdate,
    Continuation,
    Unknown(u8),
}

impl From<u8> for FrameType {
    fn from(v: u8) -> Self {
        match v {
            0x0 => Self::Data,
            0x1 => Self::Headers,
            0x2 => Self::Priority,
            0x3 => Self::RstStream,
            0x4 => Self::Settings,
            0x5 => Self::PushPromise,
            0x6 => Self::Ping,
            0x7 => Self::GoAway,
            0x8 => Self::WindowUpdate,
            0x9 => Self::Continuation,
            other => Self::Unknown(other),
        }
    }
}

impl From<FrameType> for u8 {
    fn from(t: FrameType) -> u8 {
        match t {
            FrameType::Data => 0x0,
            FrameType::Headers => 0x1,
            FrameType::Priority => 0x2,
            FrameType::RstStream => 0x3,
            FrameType::Settings => 0x4,
            FrameType::PushPromise => 0x5,
            FrameType::Ping => 0x6,
            FrameType::GoAway => 0x7,
            FrameType::WindowUpdate => 0x8,
            FrameType::Continuation => 0x9,
            FrameType::Unknown(v) => v,
        }
    }
}

/// Frame flag bits.
pub mod flags {
    pub const END_STREAM: u8 = 0x1;
    /// Same bit as END_STREAM, in SETTINGS/PING context.
    pub const ACK: u8 = 0x1;
    pub const END_HEADERS: u8 = 0x4;
    pub const PADDED: u8 = 0x8;
    pub const PRIORITY: u8 = 0x20;
}

/// Parsed 9-byte frame header.
#[derive(Debug, Clone, Copy)]
pub struct FrameHeader {
    pub length: u32,
    pub frame_type: FrameType,
    pub flags: u8,
    pub stream_id: u32,
}

impl FrameHeader {
    /// Parse; `None` when the reserved stream-id bit is set.
    pub fn parse(buf: &[u8]) -> Option<Self> {
        if buf.len() < FRAME_HEADER_LEN {
            return None;
        }
        if buf[5] & 0x80 != 0 {
            return None;
        }
        Some(Self {
            length: ((buf[0] as u32) << 16) | ((buf[1] as u32) << 8) | buf[2] as u32,
            frame_type: FrameType::from(buf[3]),
            flags: buf[4],
            stream_id: ((buf[5] as u32 & 0x7f) << 24)
                | ((buf[6] as u32) << 16)
                | ((buf[7] as u32) << 8)
                | buf[8] as u32,
        })
    }

    pub fn write(&self, buf: &mut BytesMut) {
        buf.put_u8((self.length >> 16) as u8);
        buf.put_u8((self.length >> 8) as u8);
        buf.put_u8(self.length as u8);
        buf.put_u8(self.frame_type.into());
        buf.put_u8(self.flags);
        buf.put_u32(self.stream_id & 0x7fff_ffff);
    }
}

fn frame(frame_type: FrameType, frame_flags: u8, stream_id: u32, payload: &[u8]) -> BytesMut {
    let mut buf = BytesMut::with_capacity(FRAME_HEADER_LEN + payload.len());
    FrameHeader {
        length: payload.len() as u32,
        frame_type,
        flags: frame_flags,
        stream_id,
    }
    .write(&mut buf);
    buf.extend_from_slice(payload);
    buf
}

/// SETTINGS frame with order-preserving payload.
#[derive(Debug, Clone, Default)]
pub struct SettingsFrame {
    /// (id, value) pairs; wire order is this order.
    pub settings: Vec<(u16, u32)>,
    pub ack: bool,
}

impl SettingsFrame {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ack() -> Self {
        Self {
            settings: Vec::new(),
            ack: true,
        }
    }

    pub fn push(&mut self, id: u16, value: u32) -> &mut Self {
        self.settings.push((id, value));
        self
    }

    pub fn serialize(&self) -> BytesMut {
        let mut payload = Vec::with_capacity(self.settings.len() * 6);
        if !self.ack {
            for (id, value) in &self.settings {
                payload.extend_from_slice(&id.to_be_bytes());
                payload.extend_from_slice(&value.to_be_bytes());
            }
        }
        frame(
            FrameType::Settings,
            if self.ack { flags::ACK } else { 0 },
            0,
            &payload,
        )
    }

    pub fn parse(frame_flags: u8, mut payload: Bytes) -> Self {
        let mut settings = Vec::new();
        while payload.remaining() >= 6 {
            settings.push((payload.get_u16(), payload.get_u32()));
        }
        Self {
            settings,
            ack: frame_flags & flags::ACK != 0,
        }
    }
}

/// WINDOW_UPDATE frame.
#[derive(Debug, Clone, Copy)]
pub struct WindowUpdateFrame {
    pub stream_id: u32,
    pub increment: u32,
}

impl WindowUpdateFrame {
    pub fn new(stream_id: u32, increment: u32) -> Self {
        Self {
            stream_id,
            increment,
        }
    }

    pub fn serialize(&self) -> BytesMut {
        frame(
            FrameType::WindowUpdate,
            0,
            self.stream_id,
            &(self.increment & 0x7fff_ffff).to_be_bytes(),
        )
    }

    /// `None` for a zero increment (FLOW_CONTROL_ERROR per §6.9.1).
    pub fn parse(stream_id: u32, mut payload: Bytes) -> Option<Self> {
        if payload.remaining() < 4 {
            return None;
        }
        let increment = payload.get_u32() & 0x7fff_ffff;
        if increment == 0 {
            return None;
        }
        Some(Self {
            stream_id,
            increment,
        })
    }
}

/// Priority fields carried on a HEADERS frame.
#[derive(Debug, Clone, Copy)]
pub struct PriorityData {
    pub exclusive: bool,
    pub stream_dependency: u32,
    /// Effective weight 1..=256 (wire encodes weight - 1).
    pub weight: u16,
}

/// HEADERS frame.
#[derive(Debug, Clone)]
pub struct HeadersFrame {
    pub stream_id: u32,
    pub header_block: Bytes,
    pub end_stream: bool,
    pub end_headers: bool,
    pub priority: Option<PriorityData>,
}

impl HeadersFrame {
    pub fn new(stream_id: u32, header_block: Bytes) -> Self {
        Self {
            stream_id,
            header_block,
            end_stream: false,
            end_headers: true,
            priority: None,
        }
    }

    pub fn end_stream(mut self, end: bool) -> Self {
        self.end_stream = end;
        self
    }

    pub fn end_headers(mut self, end: bool) -> Self {
        self.end_headers = end;
        self
    }

    pub fn with_priority(mut self, priority: Option<PriorityData>) -> Self {
        self.priority = priority;
        self
    }

    pub fn serialize(&self) -> BytesMut {
        let mut payload = Vec::with_capacity(5 + self.header_block.len());
        let mut frame_flags = 0u8;
        if self.end_stream {
            frame_flags |= flags::END_STREAM;
        }
        if self.end_headers {
            frame_flags |= flags::END_HEADERS;
        }
        if let Some(p) = &self.priority {
            frame_flags |= flags::PRIORITY;
            let dep = if p.exclusive {
                p.stream_dependency | 0x8000_0000
            } else {
                p.stream_dependency
            };
            payload.extend_from_slice(&dep.to_be_bytes());
            payload.push((p.weight.saturating_sub(1)).min(255) as u8);
        }
        payload.extend_from_slice(&self.header_block);
        frame(FrameType::Headers, frame_flags, self.stream_id, &payload)
    }

    /// Parse, handling PADDED and PRIORITY.
    pub fn parse(stream_id: u32, frame_flags: u8, mut payload: Bytes) -> Result<Self, String> {
        if stream_id == 0 {
            return Err("HEADERS on stream 0".into());
        }
        let pad_len = take_pad_length(frame_flags, &mut payload)?;
        let priority = if frame_flags & flags::PRIORITY != 0 {
            if payload.remaining() < 5 {
                return Err("HEADERS priority fields truncated".into());
            }
            let dep = payload.get_u32();
            let weight = payload.get_u8();
            Some(PriorityData {
                exclusive: dep & 0x8000_0000 != 0,
                stream_dependency: dep & 0x7fff_ffff,
                weight: weight as u16 + 1,
            })
        } else {
            None
        };
        if payload.remaining() < pad_len {
            return Err("padding exceeds payload".into());
        }
        let block_len = payload.remaining() - pad_len;
        let header_block = payload.copy_to_bytes(block_len);
        Ok(Self {
            stream_id,
            header_block,
            end_stream: frame_flags & flags::END_STREAM != 0,
            end_headers: frame_flags & flags::END_HEADERS != 0,
            priority,
        })
    }
}

/// CONTINUATION frame.
#[derive(Debug, Clone)]
pub struct ContinuationFrame {
    pub stream_id: u32,
    pub fragment: Bytes,
    pub end_headers: bool,
}

impl ContinuationFrame {
    pub fn new(stream_id: u32, fragment: Bytes, end_headers: bool) -> Self {
        Self {
            stream_id,
            fragment,
            end_headers,
        }
    }

    pub fn serialize(&self) -> BytesMut {
        frame(
            FrameType::Continuation,
            if self.end_headers { flags::END_HEADERS } else { 0 },
            self.stream_id,
            &self.fragment,
        )
    }
}

/// DATA frame.
#[derive(Debug, Clone)]
pub struct DataFrame {
    pub stream_id: u32,
    pub data: Bytes,
    pub end_stream: bool,
}

impl DataFrame {
    pub fn new(stream_id: u32, data: Bytes, end_stream: bool) -> Self {
        Self {
            stream_id,
            data,
            end_stream,
        }
    }

    pub fn serialize(&self) -> BytesMut {
        frame(
            FrameType::Data,
            if self.end_stream { flags::END_STREAM } else { 0 },
            self.stream_id,
            &self.data,
        )
    }

    pub fn parse(stream_id: u32, frame_flags: u8, mut payload: Bytes) -> Result<Self, String> {
        if stream_id == 0 {
            return Err("DATA on stream 0".into());
        }
        let pad_len = take_pad_length(frame_flags, &mut payload)?;
        if payload.remaining() < pad_len {
            return Err("padding exceeds payload".into());
        }
        let data_len = payload.remaining() - pad_len;
        Ok(Self {
            stream_id,
            data: payload.copy_to_bytes(data_len),
            end_stream: frame_flags & flags::END_STREAM != 0,
        })
    }
}

/// PING frame.
#[derive(Debug, Clone, Copy)]
pub struct PingFrame {
    pub ack: bool,
    pub data: [u8; 8],
}

impl PingFrame {
    pub fn ack(data: [u8; 8]) -> Self {
        Self { ack: true, data }
    }

    pub fn serialize(&self) -> BytesMut {
        frame(
            FrameType::Ping,
            if self.ack { flags::ACK } else { 0 },
            0,
            &self.data,
        )
    }

    pub fn parse(frame_flags: u8, payload: &[u8]) -> Option<Self> {
        if payload.len() != 8 {
            return None;
        }
        let mut data = [0u8; 8];
        data.copy_from_slice(payload);
        Some(Self {
            ack: frame_flags & flags::ACK != 0,
            data,
        })
    }
}

/// GOAWAY frame.
#[derive(Debug, Clone)]
pub struct GoAwayFrame {
    pub last_stream_id: u32,
    pub error_code: u32,
}

impl GoAwayFrame {
    pub fn parse(mut payload: Bytes) -> Option<Self> {
        if payload.remaining() < 8 {
            return None;
        }
        Some(Self {
            last_stream_id: payload.get_u32() & 0x7fff_ffff,
            error_code: payload.get_u32(),
        })
    }
}

/// RST_STREAM frame.
#[derive(Debug, Clone, Copy)]
pub struct RstStreamFrame {
    pub stream_id: u32,
    pub error_code: u32,
}

impl RstStreamFrame {
    pub fn new(stream_id: u32, error_code: u32) -> Self {
        Self {
            stream_id,
            error_code,
        }
    }

    pub fn serialize(&self) -> BytesMut {
        frame(
            FrameType::RstStream,
            0,
            self.stream_id,
            &self.error_code.to_be_bytes(),
        )
    }

    pub fn parse(stream_id: u32, mut payload: Bytes) -> Option<Self> {
        if stream_id == 0 || payload.remaining() < 4 {
            return None;
        }
        Some(Self {
            stream_id,
            error_code: payload.get_u32(),
        })
    }
}

/// Standalone PRIORITY frame (initial priority trees).
#[derive(Debug, Clone, Copy)]
pub struct PriorityFrame {
    pub stream_id: u32,
    pub stream_dependency: u32,
    /// Effective weight 1..=256.
    pub weight: u16,
    pub exclusive: bool,
}

impl PriorityFrame {
    pub fn new(stream_id: u32, stream_dependency: u32, weight: u16, exclusive: bool) -> Self {
        Self {
            stream_id,
            stream_dependency,
            weight,
            exclusive,
        }
    }

    pub fn serialize(&self) -> BytesMut {
        let dep = if self.exclusive {
            self.stream_dependency | 0x8000_0000
        } else {
            self.stream_dependency
        };
        let mut payload = [0u8; 5];
        payload[..4].copy_from_slice(&dep.to_be_bytes());
        payload[4] = (self.weight.saturating_sub(1)).min(255) as u8;
        frame(FrameType::Priority, 0, self.stream_id, &payload)
    }
}

fn take_pad_length(frame_flags: u8, payload: &mut Bytes) -> Result<usize, String> {
    if frame_flags & flags::PADDED == 0 {
        return Ok(0);
    }
    if payload.remaining() < 1 {
        return Err("PADDED frame missing pad length".into());
    }
    let pad_len = payload.get_u8() as usize;
    if pad_len >= payload.remaining() + 1 {
        return Err("pad length exceeds payload".into());
    }
    Ok(pad_len)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn settings_payload_preserves_declared_order() {
        let mut settings = SettingsFrame::new();
        settings.push(0x1, 65536).push(0x2, 0).push(0x4, 6291456).push(0x6, 262144);
        let buf = settings.serialize();

        assert_eq!(buf.len(), 9 + 4 * 6);
        assert_eq!(&buf[..3], &[0, 0, 24]);
        assert_eq!(buf[3], 0x4);
        // First entry id 0x1, value 65536.
        assert_eq!(&buf[9..15], &[0x00, 0x01, 0x00, 0x01, 0x00, 0x00]);
        // Second entry id 0x2, value 0.
        assert_eq!(&buf[15..21], &[0x00, 0x02, 0x00, 0x00, 0x00, 0x00]);
    }

    #[test]
    fn window_update_round_trip() {
        let buf = WindowUpdateFrame::new(0, 15663105).serialize();
        assert_eq!(buf.len(), 13);
        let header = FrameHeader::parse(&buf).unwrap();
        assert_eq!(header.frame_type, FrameType::WindowUpdate);
        let parsed = WindowUpdateFrame::parse(0, Bytes::copy_from_slice(&buf[9..])).unwrap();
        assert_eq!(parsed.increment, 15663105);
    }

    #[test]
    fn headers_priority_weight_encoding() {
        let headers = HeadersFrame::new(1, Bytes::from_static(b"\x82"))
            .end_stream(true)
            .with_priority(Some(PriorityData {
                exclusive: true,
                stream_dependency: 0,
                weight: 256,
            }));
        let buf = headers.serialize();
        let header = FrameHeader::parse(&buf).unwrap();
        assert_eq!(header.flags & flags::PRIORITY, flags::PRIORITY);
        // Exclusive bit on the dependency, weight byte 255 (=256 effective).
        assert_eq!(&buf[9..13], &[0x80, 0, 0, 0]);
        assert_eq!(buf[13], 255);
    }

    #[test]
    fn reserved_stream_bit_rejected() {
        let bytes = [0, 0, 0, 0x4, 0, 0x80, 0, 0, 0];
        assert!(FrameHeader::parse(&bytes).is_none());
    }
}
