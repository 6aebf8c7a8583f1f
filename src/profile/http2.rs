//! HTTP/2 fingerprint dimension of a browser profile.
//!
//! Everything observable in the Akamai HTTP/2 fingerprint lives here: the
//! SETTINGS list in declared order (unlisted settings are never sent), the
//! connection WINDOW_UPDATE increment, pseudo-header order, HEADERS-frame
//! priority, the priority-tree mode, and the HPACK indexing policy.

/// SETTINGS parameter identifiers (RFC 9113 §6.5.2).
pub mod settings_ids {
    pub const HEADER_TABLE_SIZE: u16 = 0x1;
    pub const ENABLE_PUSH: u16 = 0x2;
    pub const MAX_CONCURRENT_STREAMS: u16 = 0x3;
    pub const INITIAL_WINDOW_SIZE: u16 = 0x4;
    pub const MAX_FRAME_SIZE: u16 = 0x5;
    pub const MAX_HEADER_LIST_SIZE: u16 = 0x6;
    pub const ENABLE_CONNECT_PROTOCOL: u16 = 0x8;
}

/// One pseudo-header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PseudoHeader {
    Method,
    Authority,
    Scheme,
    Path,
}

impl PseudoHeader {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Method => ":method",
            Self::Authority => ":authority",
            Self::Scheme => ":scheme",
            Self::Path => ":path",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            ":method" => Some(Self::Method),
            ":authority" => Some(Self::Authority),
            ":scheme" => Some(Self::Scheme),
            ":path" => Some(Self::Path),
            _ => None,
        }
    }
}

/// Pseudo-header emission order, visible in the Akamai fingerprint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PseudoHeaderOrder(pub [PseudoHeader; 4]);

impl PseudoHeaderOrder {
    /// Chrome: m,a,s,p
    pub const CHROME: Self = Self([
        PseudoHeader::Method,
        PseudoHeader::Authority,
        PseudoHeader::Scheme,
        PseudoHeader::Path,
    ]);
    /// Firefox: m,p,a,s
    pub const FIREFOX: Self = Self([
        PseudoHeader::Method,
        PseudoHeader::Path,
        PseudoHeader::Authority,
        PseudoHeader::Scheme,
    ]);
    /// Safari: m,s,p,a
    pub const SAFARI: Self = Self([
        PseudoHeader::Method,
        PseudoHeader::Scheme,
        PseudoHeader::Path,
        PseudoHeader::Authority,
    ]);

    /// Parse a per-request override like
    /// `[":method", ":authority", ":scheme", ":path"]` (already split).
    /// All four pseudo-headers must appear exactly once.
    pub fn from_names(names: &[String]) -> Option<Self> {
        if names.len() != 4 {
            return None;
        }
        let mut order = [PseudoHeader::Method; 4];
        let mut seen = [false; 4];
        for (i, name) in names.iter().enumerate() {
            let ph = PseudoHeader::from_name(name)?;
            let idx = ph as usize;
            if seen[idx] {
                return None;
            }
            seen[idx] = true;
            order[i] = ph;
        }
        Some(Self(order))
    }

    /// Akamai fingerprint notation, e.g. "m,a,s,p".
    pub fn akamai_string(&self) -> String {
        self.0
            .iter()
            .map(|p| match p {
                PseudoHeader::Method => "m",
                PseudoHeader::Authority => "a",
                PseudoHeader::Scheme => "s",
                PseudoHeader::Path => "p",
            })
            .collect::<Vec<_>>()
            .join(",")
    }
}

/// Priority carried on HEADERS frames.
///
/// `weight` is the effective weight (1..=256); the wire encodes it minus
/// one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeadersPriority {
    pub weight: u16,
    pub exclusive: bool,
    pub depends_on: u32,
}

/// A standalone PRIORITY frame sent at connection start.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InitialPriority {
    pub stream_id: u32,
    pub depends_on: u32,
    pub weight: u16,
    pub exclusive: bool,
}

/// How the profile builds its stream priority tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PriorityMode {
    /// Exclusive dependency chain carried on each HEADERS frame; no
    /// standalone PRIORITY frames.
    Chrome,
    /// Fixed tree of idle streams announced at connection start
    /// (`initial_priorities`), HEADERS depending into it.
    Firefox,
    /// No priority signaling at all.
    Off,
}

/// Literal representation choice for one header field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Indexing {
    /// Incremental indexing: enters the dynamic table.
    Incremental,
    /// Literal without indexing.
    WithoutIndexing,
    /// Never indexed (sensitive; survives re-encoding by intermediaries).
    NeverIndexed,
}

/// HPACK indexing policy, applied per header at encode time.
#[derive(Clone, Copy)]
pub enum HpackIndexing {
    /// Chrome's mix: sensitive headers never indexed, a stable allow-list
    /// incrementally indexed, everything else literal without indexing.
    Chrome,
    /// Literal without indexing for every header.
    Never,
    /// Incremental indexing for every header.
    Always,
    /// Per-header predicate.
    Custom(fn(&str) -> Indexing),
}

impl std::fmt::Debug for HpackIndexing {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Chrome => f.write_str("Chrome"),
            Self::Never => f.write_str("Never"),
            Self::Always => f.write_str("Always"),
            Self::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

/// Headers Chrome treats as sensitive: emitted never-indexed.
const CHROME_NEVER_INDEXED: &[&str] = &["cookie", "authorization", "proxy-authorization"];

/// Headers Chrome lets into the dynamic table: stable across the page load.
const CHROME_INDEXED: &[&str] = &[
    "user-agent",
    "accept",
    "accept-language",
    "accept-encoding",
    "sec-ch-ua",
    "sec-ch-ua-mobile",
    "sec-ch-ua-platform",
    "sec-fetch-site",
    "sec-fetch-mode",
    "sec-fetch-dest",
    "sec-fetch-user",
    "upgrade-insecure-requests",
    "referer",
    "origin",
    "priority",
    "cache-control",
    "pragma",
];

impl HpackIndexing {
    /// Resolve the representation for one (lowercased) header name.
    pub fn classify(&self, name: &str) -> Indexing {
        match self {
            Self::Always => Indexing::Incremental,
            Self::Never => Indexing::WithoutIndexing,
            Self::Custom(f) => f(name),
            Self::Chrome => {
                if CHROME_NEVER_INDEXED.contains(&name) {
                    Indexing::NeverIndexed
                } else if CHROME_INDEXED.contains(&name) {
                    Indexing::Incremental
                } else {
                    Indexing::WithoutIndexing
                }
            }
        }
    }
}

/// HTTP/2 fingerprint configuration.
#[derive(Debug, Clone, Copy)]
pub struct Http2Profile {
    /// SETTINGS to send, in this exact order. Settings not listed here are
    /// never emitted (Chrome's omission of MAX_CONCURRENT_STREAMS is part
    /// of its fingerprint).
    pub settings: &'static [(u16, u32)],
    /// Append a reserved GREASE settings entry after the declared list.
    pub settings_grease: bool,
    /// Connection-level WINDOW_UPDATE increment sent right after SETTINGS.
    pub connection_window_increment: u32,
    pub pseudo_order: PseudoHeaderOrder,
    /// Priority carried on request HEADERS, if any.
    pub headers_priority: Option<HeadersPriority>,
    pub priority_mode: PriorityMode,
    /// PRIORITY frames sent at connection start (Firefox tree).
    pub initial_priorities: &'static [InitialPriority],
    pub indexing: HpackIndexing,
}

impl Http2Profile {
    /// Declared value for a settings id, if listed.
    pub fn setting(&self, id: u16) -> Option<u32> {
        self.settings.iter().find(|(i, _)| *i == id).map(|(_, v)| *v)
    }

    /// Our advertised header table size (default 4096 when unlisted).
    pub fn header_table_size(&self) -> u32 {
        self.setting(settings_ids::HEADER_TABLE_SIZE).unwrap_or(4096)
    }

    /// Our advertised initial stream window (default 65535 when unlisted).
    pub fn initial_window_size(&self) -> u32 {
        self.setting(settings_ids::INITIAL_WINDOW_SIZE).unwrap_or(65535)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pseudo_order_akamai_strings() {
        assert_eq!(PseudoHeaderOrder::CHROME.akamai_string(), "m,a,s,p");
        assert_eq!(PseudoHeaderOrder::FIREFOX.akamai_string(), "m,p,a,s");
        assert_eq!(PseudoHeaderOrder::SAFARI.akamai_string(), "m,s,p,a");
    }

    #[test]
    fn pseudo_order_override_parsing() {
        let names: Vec<String> = [":method", ":scheme", ":authority", ":path"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let order = PseudoHeaderOrder::from_names(&names).unwrap();
        assert_eq!(order.akamai_string(), "m,s,a,p");

        // Duplicates and unknown names are rejected.
        let dup: Vec<String> = [":method", ":method", ":scheme", ":path"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        assert!(PseudoHeaderOrder::from_names(&dup).is_none());
    }

    #[test]
    fn chrome_indexing_classes() {
        let policy = HpackIndexing::Chrome;
        assert_eq!(policy.classify("cookie"), Indexing::NeverIndexed);
        assert_eq!(policy.classify("authorization"), Indexing::NeverIndexed);
        assert_eq!(policy.classify("user-agent"), Indexing::Incremental);
        assert_eq!(policy.classify("x-request-id"), Indexing::WithoutIndexing);
    }
}
