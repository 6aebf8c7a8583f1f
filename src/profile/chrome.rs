//! Chrome 143 on Windows.

use super::http2::{
    HeadersPriority, HpackIndexing, Http2Profile, PriorityMode, PseudoHeaderOrder,
};
use super::http3::{h3_settings_ids, H3Profile, TransportParam};
use super::tls::{self, TlsProfile, TLS1_2, TLS1_3};
use super::{BrowserFamily, HeaderTemplate, KeepAlivePolicy, Profile};

pub(super) const CHROME_143: Profile = Profile {
    name: "chrome-143",
    family: BrowserFamily::Chrome,
    tls: TlsProfile {
        cipher_list: tls::CHROME_CIPHER_SUITES,
        sigalgs: tls::CHROME_SIGALGS,
        groups: tls::CHROME_GROUPS,
        versions: &[TLS1_3, TLS1_2],
        alpn_tcp: &["h2", "http/1.1"],
        alpn_quic: &["h3"],
        extension_order: tls::CHROME_EXTENSIONS,
        grease: true,
        permute_extensions: true,
        ech_grease: true,
        session_tickets: true,
        early_data: true,
        ocsp_stapling: true,
        signed_cert_timestamps: true,
    },
    http2: Http2Profile {
        // Chrome omits MAX_CONCURRENT_STREAMS and MAX_FRAME_SIZE.
        settings: &[
            (0x1, 65536),
            (0x2, 0),
            (0x4, 6291456),
            (0x6, 262144),
        ],
        settings_grease: true,
        connection_window_increment: 15663105,
        pseudo_order: PseudoHeaderOrder::CHROME,
        headers_priority: Some(HeadersPriority {
            weight: 256,
            exclusive: true,
            depends_on: 0,
        }),
        priority_mode: PriorityMode::Chrome,
        initial_priorities: &[],
        indexing: HpackIndexing::Chrome,
    },
    http3: H3Profile {
        transport_params: &[
            (TransportParam::MaxIdleTimeout, 30_000),
            (TransportParam::MaxUdpPayloadSize, 1472),
            (TransportParam::InitialMaxData, 15_728_640),
            (TransportParam::InitialMaxStreamDataBidiLocal, 6_291_456),
            (TransportParam::InitialMaxStreamDataBidiRemote, 6_291_456),
            (TransportParam::InitialMaxStreamDataUni, 6_291_456),
            (TransportParam::InitialMaxStreamsBidi, 100),
            (TransportParam::InitialMaxStreamsUni, 103),
            (TransportParam::ActiveConnectionIdLimit, 8),
        ],
        settings: &[
            (h3_settings_ids::QPACK_MAX_TABLE_CAPACITY, 65536),
            (h3_settings_ids::QPACK_BLOCKED_STREAMS, 100),
        ],
        early_data: true,
        versions: &[0x0000_0001],
    },
    headers: HeaderTemplate {
        user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/143.0.0.0 Safari/537.36",
        accept_navigate: "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,image/apng,*/*;q=0.8,application/signed-exchange;v=b3;q=0.7",
        accept_language: "en-US,en;q=0.9",
        accept_encoding: "gzip, deflate, br, zstd",
        sec_ch_ua: Some(r#""Google Chrome";v="143", "Chromium";v="143", "Not_A Brand";v="24""#),
        sec_ch_ua_mobile: Some("?0"),
        sec_ch_ua_platform: Some(r#""Windows""#),
    },
    keep_alive: KeepAlivePolicy::chrome(),
};
