//! HTTP/3 / QUIC fingerprint dimension of a browser profile.

/// QUIC transport parameters a profile declares, in wire-relevant order.
///
/// The ordered list is the fingerprint surface; values are applied to the
/// QUIC configuration in this order. (Reordering the encoded transport
/// parameters themselves is a knob of the vendored QUIC stack.)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportParam {
    MaxIdleTimeout,
    MaxUdpPayloadSize,
    InitialMaxData,
    InitialMaxStreamDataBidiLocal,
    InitialMaxStreamDataBidiRemote,
    InitialMaxStreamDataUni,
    InitialMaxStreamsBidi,
    InitialMaxStreamsUni,
    ActiveConnectionIdLimit,
}

/// HTTP/3 SETTINGS identifiers (RFC 9114 §7.2.4, RFC 9204).
pub mod h3_settings_ids {
    pub const QPACK_MAX_TABLE_CAPACITY: u64 = 0x1;
    pub const MAX_FIELD_SECTION_SIZE: u64 = 0x6;
    pub const QPACK_BLOCKED_STREAMS: u64 = 0x7;
}

/// HTTP/3 fingerprint configuration.
#[derive(Debug, Clone, Copy)]
pub struct H3Profile {
    /// Transport parameters in declared order.
    pub transport_params: &'static [(TransportParam, u64)],
    /// H3 SETTINGS emitted on the control stream, in declared order.
    pub settings: &'static [(u64, u64)],
    /// Attempt 0-RTT when the profile and a cached ticket both allow it.
    pub early_data: bool,
    /// QUIC versions acceptable for retry after version negotiation.
    pub versions: &'static [u32],
}

impl H3Profile {
    pub fn transport_param(&self, param: TransportParam) -> Option<u64> {
        self.transport_params
            .iter()
            .find(|(p, _)| *p == param)
            .map(|(_, v)| *v)
    }

    pub fn idle_timeout_ms(&self) -> u64 {
        self.transport_param(TransportParam::MaxIdleTimeout)
            .unwrap_or(30_000)
    }
}
