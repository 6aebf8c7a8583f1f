//! Session snapshot export/import round trips and the v4 migration.

use mirage::{Session, SessionOptions};

fn session() -> Session {
    Session::new("chrome-143", SessionOptions::default()).unwrap()
}

#[tokio::test]
async fn export_then_import_preserves_cookies() {
    let a = session();
    a.set_cookie("api.example.test", "sid=abc; Domain=example.test; Path=/")
        .unwrap();
    a.set_cookie("example.test", "host=1").unwrap();
    let snapshot = a.export_state().unwrap();

    let b = session();
    b.import_state(&snapshot).unwrap();
    assert_eq!(b.cookie_count(), 2);
    assert_eq!(
        b.cookie_header_for("https://www.example.test/").unwrap(),
        Some("sid=abc".to_string())
    );
    assert_eq!(
        b.cookie_header_for("https://example.test/").unwrap().unwrap(),
        "sid=abc; host=1"
    );
}

#[tokio::test]
async fn reimport_is_a_no_op() {
    let s = session();
    s.set_cookie("example.test", "a=1").unwrap();
    let snapshot = s.export_state().unwrap();

    s.import_state(&snapshot).unwrap();
    s.import_state(&snapshot).unwrap();
    assert_eq!(s.cookie_count(), 1);

    // Exporting again yields the same logical cookie state.
    let again = s.export_state().unwrap();
    let first: serde_json::Value = serde_json::from_slice(&snapshot).unwrap();
    let second: serde_json::Value = serde_json::from_slice(&again).unwrap();
    assert_eq!(first["cookies"], second["cookies"]);
    assert_eq!(first["version"], 5);
}

#[tokio::test]
async fn v4_flat_cookie_list_migrates_to_domain_keyed() {
    let v4 = serde_json::json!({
        "version": 4,
        "created_at": "2026-01-01T00:00:00Z",
        "updated_at": "2026-01-01T00:00:00Z",
        "config": {"profile": "chrome-143"},
        "cookies": [
            {"name": "sid", "value": "abc", "domain": ".example.test", "path": "/"},
            {"name": "host", "value": "1", "domain": "example.test", "path": "/"}
        ],
        "tls_sessions": {}
    });

    let s = session();
    s.import_state(v4.to_string().as_bytes()).unwrap();

    // The dotted domain behaves as a domain cookie, the bare one as
    // host-only: same observable behavior as the equivalent v5 snapshot.
    assert_eq!(
        s.cookie_header_for("https://sub.example.test/").unwrap(),
        Some("sid=abc".to_string())
    );
    assert_eq!(
        s.cookie_header_for("https://example.test/").unwrap().unwrap(),
        "sid=abc; host=1"
    );
}

#[tokio::test]
async fn expired_cookies_do_not_survive_the_round_trip() {
    let s = session();
    s.set_cookie("example.test", "gone=1; Max-Age=0").unwrap();
    s.set_cookie("example.test", "kept=2").unwrap();

    let snapshot = s.export_state().unwrap();
    let b = session();
    b.import_state(&snapshot).unwrap();
    assert_eq!(b.cookie_count(), 1);
    assert_eq!(
        b.cookie_header_for("https://example.test/").unwrap(),
        Some("kept=2".to_string())
    );
}

#[tokio::test]
async fn stale_tls_sessions_are_dropped_on_import() {
    let v5 = serde_json::json!({
        "version": 5,
        "created_at": "2026-01-01T00:00:00Z",
        "updated_at": "2026-01-01T00:00:00Z",
        "config": {"profile": "chrome-143"},
        "cookies": {},
        "tls_sessions": {
            "h3:old.test:443": {
                "ticket": "AQID",
                "created_at": "2020-01-01T00:00:00Z"
            }
        }
    });

    let s = session();
    s.import_state(v5.to_string().as_bytes()).unwrap();
    let exported = s.export_state().unwrap();
    let value: serde_json::Value = serde_json::from_slice(&exported).unwrap();
    assert!(value["tls_sessions"]
        .as_object()
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn unsupported_versions_are_rejected() {
    let s = session();
    let bad = serde_json::json!({"version": 2}).to_string();
    assert!(s.import_state(bad.as_bytes()).is_err());
}
