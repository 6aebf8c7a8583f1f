//! Firefox 133 on Windows.

use super::http2::{
    HeadersPriority, HpackIndexing, Http2Profile, InitialPriority, PriorityMode,
    PseudoHeaderOrder,
};
use super::http3::{h3_settings_ids, H3Profile, TransportParam};
use super::tls::{self, TlsProfile, TLS1_2, TLS1_3};
use super::{BrowserFamily, HeaderTemplate, KeepAlivePolicy, Profile};

/// Firefox announces a fixed tree of idle streams at connection start and
/// hangs request streams off it.
const FIREFOX_PRIORITY_TREE: &[InitialPriority] = &[
    InitialPriority { stream_id: 3, depends_on: 0, weight: 201, exclusive: false },
    InitialPriority { stream_id: 5, depends_on: 0, weight: 101, exclusive: false },
    InitialPriority { stream_id: 7, depends_on: 0, weight: 1, exclusive: false },
    InitialPriority { stream_id: 9, depends_on: 7, weight: 1, exclusive: false },
    InitialPriority { stream_id: 11, depends_on: 3, weight: 1, exclusive: false },
    InitialPriority { stream_id: 13, depends_on: 0, weight: 241, exclusive: false },
];

pub(super) const FIREFOX_133: Profile = Profile {
    name: "firefox-133",
    family: BrowserFamily::Firefox,
    tls: TlsProfile {
        cipher_list: tls::FIREFOX_CIPHER_SUITES,
        sigalgs: tls::FIREFOX_SIGALGS,
        groups: tls::FIREFOX_GROUPS,
        versions: &[TLS1_3, TLS1_2],
        alpn_tcp: &["h2", "http/1.1"],
        alpn_quic: &["h3"],
        extension_order: tls::FIREFOX_EXTENSIONS,
        // Firefox permutes extensions but does not GREASE.
        grease: false,
        permute_extensions: true,
        ech_grease: true,
        session_tickets: true,
        early_data: true,
        ocsp_stapling: true,
        signed_cert_timestamps: false,
    },
    http2: Http2Profile {
        settings: &[(0x1, 65536), (0x4, 131072), (0x5, 16384)],
        settings_grease: false,
        connection_window_increment: 12517377,
        pseudo_order: PseudoHeaderOrder::FIREFOX,
        headers_priority: Some(HeadersPriority {
            weight: 42,
            exclusive: false,
            depends_on: 13,
        }),
        priority_mode: PriorityMode::Firefox,
        initial_priorities: FIREFOX_PRIORITY_TREE,
        indexing: HpackIndexing::Chrome,
    },
    http3: H3Profile {
        transport_params: &[
            (TransportParam::MaxIdleTimeout, 30_000),
            (TransportParam::MaxUdpPayloadSize, 1452),
            (TransportParam::InitialMaxData, 25_165_824),
            (TransportParam::InitialMaxStreamDataBidiLocal, 12_582_912),
            (TransportParam::InitialMaxStreamDataBidiRemote, 1_048_576),
            (TransportParam::InitialMaxStreamDataUni, 1_048_576),
            (TransportParam::InitialMaxStreamsBidi, 16),
            (TransportParam::InitialMaxStreamsUni, 16),
            (TransportParam::ActiveConnectionIdLimit, 8),
        ],
        settings: &[
            (h3_settings_ids::QPACK_MAX_TABLE_CAPACITY, 65536),
            (h3_settings_ids::QPACK_BLOCKED_STREAMS, 20),
        ],
        early_data: true,
        versions: &[0x0000_0001],
    },
    headers: HeaderTemplate {
        user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:133.0) Gecko/20100101 Firefox/133.0",
        accept_navigate: "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,image/png,image/svg+xml,*/*;q=0.8",
        accept_language: "en-US,en;q=0.5",
        accept_encoding: "gzip, deflate, br, zstd",
        sec_ch_ua: None,
        sec_ch_ua_mobile: None,
        sec_ch_ua_platform: None,
    },
    keep_alive: KeepAlivePolicy::firefox(),
};
