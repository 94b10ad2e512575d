//! Scenario 1/2 from spec.md §8: the server accepts a known service and
//! denies an unknown one, exercised end to end through the public
//! `Connection::accept`/`connect` API rather than the state machine
//! directly (that's covered by `conduit::session`'s own unit tests).

use conduit::{Connection, ConnectionError, Headers, IncomingStream, Service, SessionConfig, Value};

#[tokio::test]
async fn accepts_a_known_service_and_carries_headers_through() {
    let (client_io, server_io) = tokio::io::duplex(8192);

    let server = tokio::spawn(async move {
        Connection::accept(
            server_io,
            SessionConfig::default(),
            &|name: &str| name == "rate_limiter",
            |incoming: IncomingStream| async move {
                let _ = incoming.handle.send_error("unexpected", Value::Null).await;
            },
        )
        .await
    });

    let headers = Headers::new().with("authorization", Value::Str("Bearer 123".into()));
    let client = Connection::connect(
        client_io,
        SessionConfig::default(),
        Service::offer("rate_limiter"),
        headers,
    )
    .await
    .unwrap();

    let (server_conn, service, headers) = server.await.unwrap().unwrap();
    assert_eq!(service.name, "rate_limiter");
    assert_eq!(
        headers.authorization(),
        Some(&Value::Str("Bearer 123".into()))
    );

    client.shutdown().await;
    server_conn.shutdown().await;
}

#[tokio::test]
async fn denies_an_unknown_service_and_the_client_observes_it() {
    let (client_io, server_io) = tokio::io::duplex(8192);

    let server = tokio::spawn(async move {
        Connection::accept(
            server_io,
            SessionConfig::default(),
            &|name: &str| name == "rate_limiter",
            |_incoming: IncomingStream| async move {},
        )
        .await
    });

    let client_result = Connection::connect(
        client_io,
        SessionConfig::default(),
        Service::offer("unknown"),
        Headers::new(),
    )
    .await;

    assert!(matches!(
        client_result,
        Err(ConnectionError::Denied { reason, .. }) if reason == "service unknown"
    ));
    assert!(matches!(
        server.await.unwrap(),
        Err(ConnectionError::Denied { reason, .. }) if reason == "service unknown"
    ));
}
