//! Scenario 4 from spec.md §8: `Start{buffer=2}` lets the server emit two
//! `Step`s, then it must wait for a `StepAck` before sending more; an ack
//! that raises the buffer widens the window.

use conduit::connection::StreamingResponder;
use conduit::{Connection, Headers, IncomingStream, OpenKind, Service, SessionConfig, StepItem, Value};

#[tokio::test]
async fn server_blocks_on_an_exhausted_buffer_window_until_acked() {
    let (client_io, server_io) = tokio::io::duplex(8192);

    let server = tokio::spawn(async move {
        Connection::accept(
            server_io,
            SessionConfig::default(),
            &|_: &str| true,
            |incoming: IncomingStream| async move {
                let OpenKind::Start { buffer, .. } = incoming.kind else {
                    panic!("expected a streaming Start");
                };
                let mut responder = StreamingResponder::new(incoming.handle, buffer);
                for i in 0..5u8 {
                    responder.send_step(Value::Int(i64::from(i))).await.unwrap();
                }
                responder.end(false, Value::Null).await.unwrap();
            },
        )
        .await
        .unwrap()
    });

    let client = Connection::connect(
        client_io,
        SessionConfig::default(),
        Service::offer("counter"),
        Headers::new(),
    )
    .await
    .unwrap();

    let mut call = client.call_streaming("count", Value::Null, 2).await.unwrap();

    let first = call.next().await.unwrap().unwrap();
    assert_eq!(first, StepItem::Step { index: 0, body: Value::Int(0) });
    let second = call.next().await.unwrap().unwrap();
    assert_eq!(second, StepItem::Step { index: 1, body: Value::Int(1) });

    // The server must not have been able to send index 2 yet; acking
    // index 0 with a wider buffer lets it proceed through the rest.
    call.ack(0, Some(3)).await.unwrap();

    let mut seen = vec![0u8, 1];
    loop {
        match call.next().await.unwrap().unwrap() {
            StepItem::Step { index, body } => {
                assert_eq!(body, Value::Int(index as i64));
                seen.push(index as u8);
                call.ack(index, None).await.unwrap();
            }
            StepItem::End { cancelled, .. } => {
                assert!(!cancelled);
                break;
            }
        }
    }
    assert_eq!(seen, vec![0, 1, 2, 3, 4]);

    let (server_conn, _, _) = server.await.unwrap();
    client.shutdown().await;
    server_conn.shutdown().await;
}

#[tokio::test]
async fn cancel_stops_further_steps_and_closes_with_cancelled_end() {
    let (client_io, server_io) = tokio::io::duplex(8192);

    let server = tokio::spawn(async move {
        Connection::accept(
            server_io,
            SessionConfig::default(),
            &|_: &str| true,
            |incoming: IncomingStream| async move {
                let OpenKind::Start { buffer, .. } = incoming.kind else {
                    panic!("expected a streaming Start");
                };
                let mut responder = StreamingResponder::new(incoming.handle, buffer);
                for i in 0..1000u32 {
                    match responder.send_step(Value::Int(i64::from(i))).await {
                        Ok(Some(_)) => continue,
                        Ok(None) => break,
                        Err(_) => return,
                    }
                }
                let cancelled = responder.is_cancelled();
                responder.end(cancelled, Value::Null).await.unwrap();
            },
        )
        .await
        .unwrap()
    });

    let client = Connection::connect(
        client_io,
        SessionConfig::default(),
        Service::offer("counter"),
        Headers::new(),
    )
    .await
    .unwrap();

    let mut call = client.call_streaming("count", Value::Null, 4).await.unwrap();
    assert!(matches!(call.next().await.unwrap().unwrap(), StepItem::Step { .. }));
    call.cancel(Some("enough".into())).await.unwrap();

    loop {
        match call.next().await.unwrap().unwrap() {
            StepItem::Step { index, .. } => {
                call.ack(index, None).await.unwrap();
            }
            StepItem::End { cancelled, .. } => {
                assert!(cancelled);
                break;
            }
        }
    }

    let (server_conn, _, _) = server.await.unwrap();
    client.shutdown().await;
    server_conn.shutdown().await;
}
