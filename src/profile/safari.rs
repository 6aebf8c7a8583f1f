//! Safari 17 on macOS.

use super::http2::{HpackIndexing, Http2Profile, PriorityMode, PseudoHeaderOrder};
use super::http3::{h3_settings_ids, H3Profile, TransportParam};
use super::tls::{self, TlsProfile, TLS1_2, TLS1_3};
use super::{BrowserFamily, HeaderTemplate, KeepAlivePolicy, Profile};

pub(super) const SAFARI_17: Profile = Profile {
    name: "safari-17",
    family: BrowserFamily::Safari,
    tls: TlsProfile {
        cipher_list: tls::SAFARI_CIPHER_SUITES,
        sigalgs: tls::SAFARI_SIGALGS,
        groups: tls::SAFARI_GROUPS,
        versions: &[TLS1_3, TLS1_2],
        alpn_tcp: &["h2", "http/1.1"],
        alpn_quic: &["h3"],
        extension_order: tls::SAFARI_EXTENSIONS,
        grease: true,
        permute_extensions: false,
        ech_grease: false,
        session_tickets: true,
        early_data: false,
        ocsp_stapling: true,
        signed_cert_timestamps: true,
    },
    http2: Http2Profile {
        settings: &[(0x2, 0), (0x3, 100), (0x4, 2097152), (0x8, 1)],
        settings_grease: false,
        connection_window_increment: 10420225,
        pseudo_order: PseudoHeaderOrder::SAFARI,
        // Safari sends no priority signal at all.
        headers_priority: None,
        priority_mode: PriorityMode::Off,
        initial_priorities: &[],
        indexing: HpackIndexing::Always,
    },
    http3: H3Profile {
        transport_params: &[
            (TransportParam::MaxIdleTimeout, 30_000),
            (TransportParam::MaxUdpPayloadSize, 1452),
            (TransportParam::InitialMaxData, 2_097_152),
            (TransportParam::InitialMaxStreamDataBidiLocal, 1_048_576),
            (TransportParam::InitialMaxStreamDataBidiRemote, 1_048_576),
            (TransportParam::InitialMaxStreamDataUni, 1_048_576),
            (TransportParam::InitialMaxStreamsBidi, 100),
            (TransportParam::InitialMaxStreamsUni, 100),
            (TransportParam::ActiveConnectionIdLimit, 8),
        ],
        settings: &[
            (h3_settings_ids::QPACK_MAX_TABLE_CAPACITY, 4096),
            (h3_settings_ids::QPACK_BLOCKED_STREAMS, 100),
        ],
        early_data: false,
        versions: &[0x0000_0001],
    },
    headers: HeaderTemplate {
        user_agent: "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.6 Safari/605.1.15",
        accept_navigate: "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8",
        accept_language: "en-US,en;q=0.9",
        accept_encoding: "gzip, deflate, br",
        sec_ch_ua: None,
        sec_ch_ua_mobile: None,
        sec_ch_ua_platform: None,
    },
    keep_alive: KeepAlivePolicy::chrome(),
};
