//! TLS fingerprint dimension of a browser profile.
//!
//! A profile pins the cipher order, signature algorithms, key-share groups,
//! ALPN lists, and the GREASE/permutation policy. Extension order is
//! randomized by modern Chrome and Firefox; the reference extension list is
//! carried for JA3/JA4 tooling, while placement on the wire is delegated to
//! BoringSSL's permutation with GREASE enabled per the profile.

/// TLS 1.3 / TLS 1.2 version codepoints for the supported_versions list.
pub const TLS1_3: u16 = 0x0304;
pub const TLS1_2: u16 = 0x0303;

/// TLS fingerprint configuration.
#[derive(Debug, Clone, Copy)]
pub struct TlsProfile {
    /// Cipher suites in exact advertisement order.
    pub cipher_list: &'static [&'static str],
    /// Signature algorithms in order.
    pub sigalgs: &'static [&'static str],
    /// Key-share groups in order (key shares themselves are fresh per
    /// handshake; only the advertised set is profile-fixed).
    pub groups: &'static [&'static str],
    /// supported_versions list, newest first.
    pub versions: &'static [u16],
    /// ALPN for TCP TLS, preference order.
    pub alpn_tcp: &'static [&'static str],
    /// ALPN for QUIC.
    pub alpn_quic: &'static [&'static str],
    /// Reference extension ids in a representative wire order.
    pub extension_order: &'static [u16],
    /// Emit GREASE values (Chrome family; Firefox does not).
    pub grease: bool,
    /// Permute extension order per handshake (Chrome 110+, Firefox 135+).
    pub permute_extensions: bool,
    /// Emit a GREASE ECH extension when no real ECH config is available.
    pub ech_grease: bool,
    /// Advertise the pre_shared_key extension when a ticket is cached.
    pub session_tickets: bool,
    /// Offer 0-RTT when resuming (requires `session_tickets`).
    pub early_data: bool,
    /// TCP-only legacy extensions; always omitted in QUIC mode.
    pub ocsp_stapling: bool,
    pub signed_cert_timestamps: bool,
}

impl TlsProfile {
    /// ALPN list in TLS wire format (length-prefixed protocol names).
    pub fn alpn_wire(protocols: &[&str]) -> Vec<u8> {
        let mut out = Vec::new();
        for proto in protocols {
            out.push(proto.len() as u8);
            out.extend_from_slice(proto.as_bytes());
        }
        out
    }
}

/// Chrome 143 cipher suites in exact order.
pub const CHROME_CIPHER_SUITES: &[&str] = &[
    "TLS_AES_128_GCM_SHA256",
    "TLS_AES_256_GCM_SHA384",
    "TLS_CHACHA20_POLY1305_SHA256",
    "TLS_ECDHE_ECDSA_WITH_AES_128_GCM_SHA256",
    "TLS_ECDHE_RSA_WITH_AES_128_GCM_SHA256",
    "TLS_ECDHE_ECDSA_WITH_AES_256_GCM_SHA384",
    "TLS_ECDHE_RSA_WITH_AES_256_GCM_SHA384",
    "TLS_ECDHE_ECDSA_WITH_CHACHA20_POLY1305_SHA256",
    "TLS_ECDHE_RSA_WITH_CHACHA20_POLY1305_SHA256",
    "TLS_ECDHE_RSA_WITH_AES_128_CBC_SHA",
    "TLS_ECDHE_RSA_WITH_AES_256_CBC_SHA",
    "TLS_RSA_WITH_AES_128_GCM_SHA256",
    "TLS_RSA_WITH_AES_256_GCM_SHA384",
    "TLS_RSA_WITH_AES_128_CBC_SHA",
    "TLS_RSA_WITH_AES_256_CBC_SHA",
];

pub const CHROME_SIGALGS: &[&str] = &[
    "ecdsa_secp256r1_sha256",
    "rsa_pss_rsae_sha256",
    "rsa_pkcs1_sha256",
    "ecdsa_secp384r1_sha384",
    "rsa_pss_rsae_sha384",
    "rsa_pkcs1_sha384",
    "rsa_pss_rsae_sha512",
    "rsa_pkcs1_sha512",
];

/// Chrome 143 groups: hybrid post-quantum first.
pub const CHROME_GROUPS: &[&str] = &["X25519MLKEM768", "x25519", "P-256", "P-384"];

/// Representative Chrome extension order (pre-permutation), ECH included.
pub const CHROME_EXTENSIONS: &[u16] = &[
    0, 23, 65281, 10, 11, 35, 16, 5, 13, 18, 51, 45, 43, 27, 17513, 65037, 21,
];

/// Firefox 133 cipher suites; ChaCha20 ranked above AES-256.
pub const FIREFOX_CIPHER_SUITES: &[&str] = &[
    "TLS_AES_128_GCM_SHA256",
    "TLS_CHACHA20_POLY1305_SHA256",
    "TLS_AES_256_GCM_SHA384",
    "TLS_ECDHE_ECDSA_WITH_AES_128_GCM_SHA256",
    "TLS_ECDHE_RSA_WITH_AES_128_GCM_SHA256",
    "TLS_ECDHE_ECDSA_WITH_CHACHA20_POLY1305_SHA256",
    "TLS_ECDHE_RSA_WITH_CHACHA20_POLY1305_SHA256",
    "TLS_ECDHE_ECDSA_WITH_AES_256_GCM_SHA384",
    "TLS_ECDHE_RSA_WITH_AES_256_GCM_SHA384",
    "TLS_ECDHE_RSA_WITH_AES_128_CBC_SHA",
    "TLS_ECDHE_RSA_WITH_AES_256_CBC_SHA",
    "TLS_RSA_WITH_AES_128_GCM_SHA256",
    "TLS_RSA_WITH_AES_256_GCM_SHA384",
    "TLS_RSA_WITH_AES_128_CBC_SHA",
    "TLS_RSA_WITH_AES_256_CBC_SHA",
];

pub const FIREFOX_SIGALGS: &[&str] = &[
    "ecdsa_secp256r1_sha256",
    "ecdsa_secp384r1_sha384",
    "ecdsa_secp521r1_sha512",
    "rsa_pss_rsae_sha256",
    "rsa_pss_rsae_sha384",
    "rsa_pss_rsae_sha512",
    "rsa_pkcs1_sha256",
    "rsa_pkcs1_sha384",
    "rsa_pkcs1_sha512",
];

/// Firefox supports P-521 in addition to Chrome's set.
pub const FIREFOX_GROUPS: &[&str] = &["X25519MLKEM768", "x25519", "P-256", "P-384", "P-521"];

pub const FIREFOX_EXTENSIONS: &[u16] = &[
    0, 23, 65281, 10, 11, 35, 16, 5, 34, 51, 43, 13, 45, 28, 65037, 21,
];

/// Safari 17 cipher suites.
pub const SAFARI_CIPHER_SUITES: &[&str] = &[
    "TLS_AES_128_GCM_SHA256",
    "TLS_AES_256_GCM_SHA384",
    "TLS_CHACHA20_POLY1305_SHA256",
    "TLS_ECDHE_ECDSA_WITH_AES_256_GCM_SHA384",
    "TLS_ECDHE_ECDSA_WITH_AES_128_GCM_SHA256",
    "TLS_ECDHE_ECDSA_WITH_CHACHA20_POLY1305_SHA256",
    "TLS_ECDHE_RSA_WITH_AES_256_GCM_SHA384",
    "TLS_ECDHE_RSA_WITH_AES_128_GCM_SHA256",
    "TLS_ECDHE_RSA_WITH_CHACHA20_POLY1305_SHA256",
    "TLS_ECDHE_ECDSA_WITH_AES_256_CBC_SHA",
    "TLS_ECDHE_ECDSA_WITH_AES_128_CBC_SHA",
    "TLS_ECDHE_RSA_WITH_AES_256_CBC_SHA",
    "TLS_ECDHE_RSA_WITH_AES_128_CBC_SHA",
    "TLS_RSA_WITH_AES_256_GCM_SHA384",
    "TLS_RSA_WITH_AES_128_GCM_SHA256",
    "TLS_RSA_WITH_AES_256_CBC_SHA",
    "TLS_RSA_WITH_AES_128_CBC_SHA",
];

pub const SAFARI_SIGALGS: &[&str] = &[
    "ecdsa_secp256r1_sha256",
    "rsa_pss_rsae_sha256",
    "rsa_pkcs1_sha256",
    "ecdsa_secp384r1_sha384",
    "ecdsa_sha1",
    "rsa_pss_rsae_sha384",
    "rsa_pkcs1_sha384",
    "rsa_pss_rsae_sha512",
    "rsa_pkcs1_sha512",
    "rsa_pkcs1_sha1",
];

pub const SAFARI_GROUPS: &[&str] = &["x25519", "P-256", "P-384", "P-521"];

pub const SAFARI_EXTENSIONS: &[u16] = &[0, 23, 65281, 10, 11, 16, 5, 13, 18, 51, 45, 43, 27, 21];
