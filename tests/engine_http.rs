//! Request-engine behavior over a plaintext mock origin: header
//! derivation, cookie round trips, redirect semantics.

mod helpers;

use helpers::spawn_server;
use http::Method;
use mirage::{Request, Session, SessionOptions};

fn session() -> Session {
    Session::new("chrome-143", SessionOptions::default()).unwrap()
}

#[tokio::test]
async fn profile_headers_and_host_reach_the_wire() {
    let (addr, mut requests) = spawn_server(|_| (200, vec![], b"ok".to_vec())).await;
    let s = session();

    let response = s.get(format!("http://{}/", addr)).await.unwrap();
    assert_eq!(response.status, 200);
    assert_eq!(response.protocol.as_str(), "h1");
    assert_eq!(response.body().as_ref(), b"ok");

    let seen = requests.recv().await.unwrap();
    assert_eq!(seen.method, "GET");
    // Host is guaranteed and leads the header block.
    assert_eq!(seen.headers[0].0, "Host");
    assert!(seen.header("user-agent").unwrap().contains("Chrome/143"));
    assert_eq!(seen.header("sec-fetch-mode"), Some("navigate"));
    assert_eq!(seen.header("sec-fetch-site"), Some("none"));
    assert_eq!(seen.header("upgrade-insecure-requests"), Some("1"));
}

#[tokio::test]
async fn caller_headers_override_in_place_and_keep_custom_order() {
    let (addr, mut requests) = spawn_server(|_| (200, vec![], vec![])).await;
    let s = session();

    let request = Request::get(format!("http://{}/", addr))
        .header("User-Agent", "custom-agent")
        .header("X-First", "1")
        .header("X-Second", "2");
    s.execute(request).await.unwrap();

    let seen = requests.recv().await.unwrap();
    // Caller value replaced the template's, in the template's slot.
    assert_eq!(seen.header("user-agent"), Some("custom-agent"));
    assert_eq!(
        seen.headers
            .iter()
            .filter(|(n, _)| n.eq_ignore_ascii_case("user-agent"))
            .count(),
        1
    );
    // Unknown caller headers append after the template, preserving their
    // relative order and casing.
    let first = seen.headers.iter().position(|(n, _)| n == "X-First").unwrap();
    let second = seen.headers.iter().position(|(n, _)| n == "X-Second").unwrap();
    assert!(first < second);
}

#[tokio::test]
async fn header_order_override_reorders_the_wire() {
    let (addr, mut requests) = spawn_server(|_| (200, vec![], vec![])).await;
    let s = session();

    let request = Request::get(format!("http://{}/", addr))
        .header("X-B", "b")
        .header("X-A", "a")
        .header("Header-Order", "[x-a, x-b, host]");
    s.execute(request).await.unwrap();

    let seen = requests.recv().await.unwrap();
    // The override key itself never reaches the wire.
    assert!(seen.header("header-order").is_none());
    let a = seen.headers.iter().position(|(n, _)| n == "X-A").unwrap();
    let b = seen.headers.iter().position(|(n, _)| n == "X-B").unwrap();
    let host = seen.headers.iter().position(|(n, _)| n == "Host").unwrap();
    assert!(a < b && b < host);
}

#[tokio::test]
async fn cookies_set_by_the_origin_return_on_the_next_request() {
    let (addr, mut requests) = spawn_server(|req| {
        if req.path == "/set" {
            (
                200,
                vec![
                    ("Set-Cookie".into(), "sid=abc; Path=/".into()),
                    ("Set-Cookie".into(), "theme=dark; Path=/".into()),
                ],
                vec![],
            )
        } else {
            (200, vec![], vec![])
        }
    })
    .await;
    let s = session();

    s.get(format!("http://{}/set", addr)).await.unwrap();
    let _ = requests.recv().await.unwrap();
    assert_eq!(s.cookie_count(), 2);

    s.get(format!("http://{}/page", addr)).await.unwrap();
    let seen = requests.recv().await.unwrap();
    assert_eq!(seen.header("cookie"), Some("sid=abc; theme=dark"));
}

#[tokio::test]
async fn secure_cookie_over_plain_http_is_dropped() {
    let (addr, _requests) = spawn_server(|_| {
        (
            200,
            vec![("Set-Cookie".into(), "x=1; Secure".into())],
            vec![],
        )
    })
    .await;
    let s = session();

    s.get(format!("http://{}/", addr)).await.unwrap();
    assert_eq!(s.cookie_count(), 0);
}

#[tokio::test]
async fn redirect_303_rewrites_post_to_get_and_drops_the_body() {
    let (addr, mut requests) = spawn_server(|req| {
        if req.path == "/submit" {
            (303, vec![("Location".into(), "/done".into())], vec![])
        } else {
            (200, vec![], b"done".to_vec())
        }
    })
    .await;
    let s = session();

    let request = Request::post(format!("http://{}/submit", addr), "payload")
        .header("Content-Type", "application/x-www-form-urlencoded");
    let response = s.execute(request).await.unwrap();
    assert_eq!(response.status, 200);
    assert!(response.final_url.ends_with("/done"));

    let first = requests.recv().await.unwrap();
    assert_eq!(first.method, "POST");
    let second = requests.recv().await.unwrap();
    assert_eq!(second.method, "GET");
    assert!(second.header("content-type").is_none());
    assert!(second.header("content-length").is_none());
}

#[tokio::test]
async fn redirect_307_preserves_method_and_body() {
    let (addr, mut requests) = spawn_server(|req| {
        if req.path == "/submit" {
            (307, vec![("Location".into(), "/retry".into())], vec![])
        } else {
            (200, vec![], vec![])
        }
    })
    .await;
    let s = session();

    s.execute(Request::post(format!("http://{}/submit", addr), "payload"))
        .await
        .unwrap();

    let first = requests.recv().await.unwrap();
    let second = requests.recv().await.unwrap();
    assert_eq!(first.method, "POST");
    assert_eq!(second.method, "POST");
    assert_eq!(second.header("content-length"), Some("7"));
}

#[tokio::test]
async fn redirect_cap_is_enforced() {
    let (addr, _requests) = spawn_server(|req| {
        let next = format!("/loop{}", req.path.len());
        (302, vec![("Location".into(), next)], vec![])
    })
    .await;
    let s = Session::new(
        "chrome-143",
        SessionOptions {
            redirect_cap: 3,
            ..Default::default()
        },
    )
    .unwrap();

    let err = s.get(format!("http://{}/", addr)).await.unwrap_err();
    assert!(matches!(err, mirage::Error::RedirectLimit { count: 4 }));
}

#[tokio::test]
async fn set_cookie_on_intermediate_redirect_is_stored() {
    let (addr, mut requests) = spawn_server(|req| {
        if req.path == "/start" {
            (
                302,
                vec![
                    ("Set-Cookie".into(), "hop=1; Path=/".into()),
                    ("Location".into(), "/end".into()),
                ],
                vec![],
            )
        } else {
            (200, vec![], vec![])
        }
    })
    .await;
    let s = session();

    s.get(format!("http://{}/start", addr)).await.unwrap();
    let _ = requests.recv().await.unwrap();
    // The redirected request already carries the intermediate cookie.
    let second = requests.recv().await.unwrap();
    assert_eq!(second.header("cookie"), Some("hop=1"));
}

#[tokio::test]
async fn authorization_survives_same_origin_but_not_cross_origin_redirects() {
    let (addr_b, mut requests_b) = spawn_server(|_| (200, vec![], vec![])).await;
    let location = format!("http://{}/elsewhere", addr_b);
    let (addr_a, mut requests_a) = spawn_server(move |req| {
        if req.path == "/same" {
            (302, vec![("Location".into(), "/local".into())], vec![])
        } else if req.path == "/cross" {
            (302, vec![("Location".into(), location.clone())], vec![])
        } else {
            (200, vec![], vec![])
        }
    })
    .await;
    let s = session();

    s.execute(
        Request::get(format!("http://{}/same", addr_a)).header("Authorization", "Bearer tok"),
    )
    .await
    .unwrap();
    let _ = requests_a.recv().await.unwrap();
    let same = requests_a.recv().await.unwrap();
    assert_eq!(same.header("authorization"), Some("Bearer tok"));

    s.execute(
        Request::get(format!("http://{}/cross", addr_a)).header("Authorization", "Bearer tok"),
    )
    .await
    .unwrap();
    let _ = requests_a.recv().await.unwrap();
    let cross = requests_b.recv().await.unwrap();
    assert!(cross.header("authorization").is_none());
}

#[tokio::test]
async fn post_defaults_to_fetch_mode_headers() {
    let (addr, mut requests) = spawn_server(|_| (200, vec![], vec![])).await;
    let s = session();

    s.execute(Request::new(
        Method::POST,
        format!("http://{}/api", addr),
    ))
    .await
    .unwrap();

    let seen = requests.recv().await.unwrap();
    assert_eq!(seen.header("sec-fetch-mode"), Some("cors"));
    assert_eq!(seen.header("sec-fetch-dest"), Some("empty"));
    assert!(seen.header("upgrade-insecure-requests").is_none());
}
