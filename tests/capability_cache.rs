//! Protocol-capability cache transitions.

use std::time::Duration;

use mirage::pool::alt_svc::{self, AltSvc};
use mirage::{CapabilityCache, Origin, TriState};

fn origin() -> Origin {
    Origin {
        scheme: "https".into(),
        host: "example.test".into(),
        port: 443,
    }
}

#[test]
fn successful_negotiation_promotes() {
    let cache = CapabilityCache::new();
    assert_eq!(cache.snapshot(&origin()).h2, TriState::Unknown);

    cache.note_h2_supported(&origin());
    assert_eq!(cache.snapshot(&origin()).h2, TriState::Supported);

    cache.note_h3_supported(&origin(), None);
    let caps = cache.snapshot(&origin());
    assert_eq!(caps.h2, TriState::Supported);
    assert_eq!(caps.h3, TriState::Supported);
}

#[test]
fn typed_failure_demotes_but_network_errors_do_not_touch_state() {
    let cache = CapabilityCache::new();
    cache.note_h2_supported(&origin());

    // An ALPN mismatch is a typed failure: demote.
    cache.note_h2_unsupported(&origin());
    assert_eq!(cache.snapshot(&origin()).h2, TriState::Unsupported);

    // A network timeout is not typed: the dialer never calls the cache.
    // (The classification itself lives on Error.)
    let timeout = mirage::Error::Timeout("dial".into());
    assert!(!timeout.is_protocol_unsupported());
    let vn = mirage::Error::VersionNegotiation { advertised: vec![1] };
    assert!(vn.is_protocol_unsupported());

    assert_eq!(cache.snapshot(&origin()).h2, TriState::Unsupported);
}

#[test]
fn entries_expire_back_to_unknown() {
    let cache = CapabilityCache::new();
    cache.note_alt_svc_h3(&origin(), Duration::from_millis(10));
    assert_eq!(cache.snapshot(&origin()).h3, TriState::Supported);

    std::thread::sleep(Duration::from_millis(25));
    assert_eq!(cache.snapshot(&origin()).h3, TriState::Unknown);
}

#[test]
fn alt_svc_header_feeds_h3_capability() {
    let cache = CapabilityCache::new();
    let AltSvc::Entries(entries) = alt_svc::parse(r#"h3=":443"; ma=86400"#) else {
        panic!("expected entries");
    };
    let h3 = entries.iter().find(|e| e.is_h3()).unwrap();
    cache.note_alt_svc_h3(&origin(), Duration::from_secs(h3.max_age));
    assert_eq!(cache.snapshot(&origin()).h3, TriState::Supported);

    // Clear directive resets the origin.
    assert_eq!(alt_svc::parse("clear"), AltSvc::Clear);
    cache.clear_origin(&origin());
    assert_eq!(cache.snapshot(&origin()).h3, TriState::Unknown);
}

#[test]
fn origins_are_independent() {
    let cache = CapabilityCache::new();
    let other = Origin {
        scheme: "https".into(),
        host: "other.test".into(),
        port: 443,
    };
    cache.note_h3_unsupported(&origin());
    assert_eq!(cache.snapshot(&other).h3, TriState::Unknown);
}
