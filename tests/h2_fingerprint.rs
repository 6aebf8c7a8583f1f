//! HTTP/2 fingerprint wire tests over an in-memory duplex.
//!
//! Exercises the handshake byte order (preface, SETTINGS, WINDOW_UPDATE),
//! the profile-exact SETTINGS payload, pseudo-header ordering, and
//! request header ordering as decoded by a stateful server-side HPACK
//! decoder.

use bytes::Bytes;
use http::Method;
use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};

use mirage::profile;
use mirage::transport::h2::frame::{
    DataFrame, FrameHeader, FrameType, HeadersFrame, SettingsFrame, CONNECTION_PREFACE,
    FRAME_HEADER_LEN,
};
use mirage::transport::h2::hpack;
use mirage::transport::h2::H2Connection;

async fn read_frame(stream: &mut DuplexStream) -> (FrameHeader, Bytes) {
    let mut head = [0u8; FRAME_HEADER_LEN];
    stream.read_exact(&mut head).await.expect("frame header");
    let header = FrameHeader::parse(&head).expect("valid header");
    let mut payload = vec![0u8; header.length as usize];
    stream.read_exact(&mut payload).await.expect("payload");
    (header, Bytes::from(payload))
}

async fn read_preface(stream: &mut DuplexStream) {
    let mut preface = vec![0u8; CONNECTION_PREFACE.len()];
    stream.read_exact(&mut preface).await.expect("preface");
    assert_eq!(preface, CONNECTION_PREFACE);
}

#[tokio::test]
async fn chrome_settings_payload_is_byte_exact() {
    let (client, mut server) = tokio::io::duplex(1 << 20);
    let p = profile::get("chrome-143").unwrap();
    let _conn = H2Connection::connect(client, p.http2).await.unwrap();

    read_preface(&mut server).await;

    let (header, payload) = read_frame(&mut server).await;
    assert_eq!(header.frame_type, FrameType::Settings);
    assert_eq!(header.stream_id, 0);

    // The declared list is the exact byte sequence for
    // {1:65536, 2:0, 4:6291456, 6:262144}, in that order.
    #[rustfmt::skip]
    let expected: &[u8] = &[
        0x00, 0x01, 0x00, 0x01, 0x00, 0x00,
        0x00, 0x02, 0x00, 0x00, 0x00, 0x00,
        0x00, 0x04, 0x00, 0x60, 0x00, 0x00,
        0x00, 0x06, 0x00, 0x04, 0x00, 0x00,
    ];
    assert_eq!(&payload[..24], expected);

    // MAX_CONCURRENT_STREAMS (0x3) and MAX_FRAME_SIZE (0x5) never appear.
    let settings = SettingsFrame::parse(0, payload.clone());
    assert!(settings.settings.iter().all(|(id, _)| *id != 0x3 && *id != 0x5));

    // WINDOW_UPDATE with Chrome's connection increment comes next.
    let (header, payload) = read_frame(&mut server).await;
    assert_eq!(header.frame_type, FrameType::WindowUpdate);
    assert_eq!(
        u32::from_be_bytes(payload.as_ref().try_into().unwrap()),
        15663105
    );
}

#[tokio::test]
async fn safari_omits_priority_and_grease() {
    let (client, mut server) = tokio::io::duplex(1 << 20);
    let p = profile::get("safari-17").unwrap();
    let mut conn = H2Connection::connect(client, p.http2).await.unwrap();

    read_preface(&mut server).await;
    let (header, payload) = read_frame(&mut server).await;
    let settings = SettingsFrame::parse(header.flags, payload);
    assert_eq!(
        settings.settings,
        vec![(0x2, 0), (0x3, 100), (0x4, 2097152), (0x8, 1)]
    );

    let (_, wu) = read_frame(&mut server).await;
    assert_eq!(u32::from_be_bytes(wu.as_ref().try_into().unwrap()), 10420225);

    // Drive a request; the HEADERS frame must carry no priority fields.
    let send = tokio::spawn(async move {
        conn.send_request(
            &Method::GET,
            "https",
            "example.test",
            "/",
            &[],
            None,
            None,
            None,
        )
        .await
    });

    let (header, payload) = read_frame(&mut server).await;
    assert_eq!(header.frame_type, FrameType::Headers);
    let frame = HeadersFrame::parse(header.stream_id, header.flags, payload).unwrap();
    assert!(frame.priority.is_none());
    assert!(frame.end_stream);

    // Minimal response so the client side completes.
    let mut encoder = hpack::Encoder::new();
    let block = encoder.encode(&[hpack::Field::new(
        ":status",
        "204",
        mirage::profile::Indexing::WithoutIndexing,
    )]);
    let response = HeadersFrame::new(1, block).end_stream(true).serialize();
    server.write_all(&response).await.unwrap();
    server.flush().await.unwrap();

    let resp = send.await.unwrap().unwrap();
    assert_eq!(resp.status, 204);
}

#[tokio::test]
async fn request_pseudo_and_regular_header_order_reach_the_wire() {
    let (client, mut server) = tokio::io::duplex(1 << 20);
    let p = profile::get("chrome-143").unwrap();
    let mut conn = H2Connection::connect(client, p.http2).await.unwrap();

    read_preface(&mut server).await;
    let _ = read_frame(&mut server).await; // SETTINGS
    let _ = read_frame(&mut server).await; // WINDOW_UPDATE

    let headers = vec![
        ("user-agent".to_string(), "UA".to_string()),
        ("accept".to_string(), "*/*".to_string()),
        ("cookie".to_string(), "sid=1".to_string()),
    ];
    let send = tokio::spawn(async move {
        let result = conn
            .send_request(
                &Method::GET,
                "https",
                "example.test",
                "/page?q=1",
                &headers,
                None,
                None,
                None,
            )
            .await;
        (conn, result)
    });

    let (header, payload) = read_frame(&mut server).await;
    assert_eq!(header.frame_type, FrameType::Headers);
    assert_eq!(header.stream_id, 1);
    let frame = HeadersFrame::parse(header.stream_id, header.flags, payload).unwrap();

    // Chrome carries an exclusive weight-256 dependency on stream 0.
    let priority = frame.priority.expect("chrome HEADERS priority");
    assert!(priority.exclusive);
    assert_eq!(priority.weight, 256);
    assert_eq!(priority.stream_dependency, 0);

    let mut decoder = hpack::Decoder::new();
    let decoded = decoder.decode(&frame.header_block).unwrap();
    let names: Vec<&str> = decoded.iter().map(|(n, _)| n.as_str()).collect();
    assert_eq!(
        names,
        vec![
            ":method",
            ":authority",
            ":scheme",
            ":path",
            "user-agent",
            "accept",
            "cookie"
        ]
    );
    assert_eq!(decoded[3].1, "/page?q=1");

    // Respond 200 with a body split over two DATA frames.
    let mut encoder = hpack::Encoder::new();
    let block = encoder.encode(&[
        hpack::Field::new(":status", "200", mirage::profile::Indexing::WithoutIndexing),
        hpack::Field::new(
            "content-type",
            "text/plain",
            mirage::profile::Indexing::WithoutIndexing,
        ),
    ]);
    server
        .write_all(&HeadersFrame::new(1, block).end_stream(false).serialize())
        .await
        .unwrap();
    server
        .write_all(&DataFrame::new(1, Bytes::from_static(b"hel"), false).serialize())
        .await
        .unwrap();
    server
        .write_all(&DataFrame::new(1, Bytes::from_static(b"lo"), true).serialize())
        .await
        .unwrap();
    server.flush().await.unwrap();

    let (conn, result) = send.await.unwrap();
    let response = result.unwrap();
    assert_eq!(response.status, 200);
    assert_eq!(response.body.as_ref(), b"hello");
    assert_eq!(response.headers[0], ("content-type".into(), "text/plain".into()));
    assert!(conn.is_reusable());
}

#[tokio::test]
async fn goaway_marks_the_connection_unusable() {
    let (client, mut server) = tokio::io::duplex(1 << 20);
    let p = profile::get("chrome-143").unwrap();
    let mut conn = H2Connection::connect(client, p.http2).await.unwrap();

    read_preface(&mut server).await;
    let _ = read_frame(&mut server).await;
    let _ = read_frame(&mut server).await;

    let send = tokio::spawn(async move {
        let result = conn
            .send_request(&Method::GET, "https", "example.test", "/", &[], None, None, None)
            .await;
        (conn, result)
    });
    let _ = read_frame(&mut server).await; // client HEADERS

    // GOAWAY with last_stream_id 0: the request was not processed.
    let mut goaway = Vec::new();
    goaway.extend_from_slice(&[0, 0, 8, 0x7, 0, 0, 0, 0, 0]);
    goaway.extend_from_slice(&0u32.to_be_bytes());
    goaway.extend_from_slice(&0u32.to_be_bytes());
    server.write_all(&goaway).await.unwrap();
    server.flush().await.unwrap();

    let (conn, result) = send.await.unwrap();
    match result {
        Err(mirage::Error::GoAway { last_stream_id }) => assert_eq!(last_stream_id, 0),
        other => panic!("expected GoAway, got {:?}", other.map(|r| r.status)),
    }
    assert!(!conn.is_reusable());
}
