//! Scenario 3 from spec.md §8: a unary call opens a stream, the handler
//! computes one result, and the stream is closed by exactly one terminal
//! packet.

use conduit::{Connection, Headers, IncomingStream, OpenKind, Service, SessionConfig, Value};
use std::collections::BTreeMap;

async fn connected_pair() -> (Connection, Connection) {
    let (client_io, server_io) = tokio::io::duplex(8192);
    let server = tokio::spawn(async move {
        Connection::accept(
            server_io,
            SessionConfig::default(),
            &|_: &str| true,
            |incoming: IncomingStream| async move {
                match incoming.kind {
                    OpenKind::Request { body, .. } => {
                        let _ = incoming.handle.send_end(false, body).await;
                    }
                    OpenKind::Start { .. } => {
                        let _ = incoming.handle.send_error("unsupported", Value::Null).await;
                    }
                }
            },
        )
        .await
        .unwrap()
    });
    let client = Connection::connect(
        client_io,
        SessionConfig::default(),
        Service::offer("echo"),
        Headers::new(),
    )
    .await
    .unwrap();
    let (server_conn, _service, _headers) = server.await.unwrap();
    (client, server_conn)
}

#[tokio::test]
async fn unary_echo_returns_exactly_what_was_sent() {
    let (client, server) = connected_pair().await;

    let mut body = BTreeMap::new();
    body.insert("a".to_string(), Value::Str("b".into()));
    let reply = client.call_unary("get", Value::Map(body.clone())).await.unwrap();
    assert_eq!(reply, Value::Map(body));

    client.shutdown().await;
    server.shutdown().await;
}

#[tokio::test]
async fn concurrent_unary_calls_each_get_their_own_reply() {
    let (client, server) = connected_pair().await;

    let a = client.call_unary("get", Value::Int(1));
    let b = client.call_unary("get", Value::Int(2));
    let (a, b) = tokio::join!(a, b);
    assert_eq!(a.unwrap(), Value::Int(1));
    assert_eq!(b.unwrap(), Value::Int(2));

    client.shutdown().await;
    server.shutdown().await;
}
