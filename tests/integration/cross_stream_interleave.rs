//! Scenario 5 from spec.md §8: with two streams open on one connection,
//! whatever order their packets interleave on the wire, each stream's
//! own observed sequence is unaffected.

use conduit::connection::StreamingResponder;
use conduit::{Connection, Headers, IncomingStream, OpenKind, Service, SessionConfig, StepItem, Value};

#[tokio::test]
async fn two_concurrent_streams_each_observe_their_own_order() {
    let (client_io, server_io) = tokio::io::duplex(16384);

    let server = tokio::spawn(async move {
        Connection::accept(
            server_io,
            SessionConfig::default(),
            &|_: &str| true,
            |incoming: IncomingStream| async move {
                let OpenKind::Start { buffer, .. } = incoming.kind else {
                    panic!("expected Start");
                };
                let mut responder = StreamingResponder::new(incoming.handle, buffer);
                for i in 0..4u8 {
                    // No acking in this test (buffer large enough), so
                    // both handler tasks race freely against each other.
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

    let mut call_a = client.call_streaming("count", Value::Null, 8).await.unwrap();
    let mut call_b = client.call_streaming("count", Value::Null, 8).await.unwrap();

    async fn drain(call: &mut conduit::StreamingCall) -> Vec<i64> {
        let mut seen = Vec::new();
        loop {
            match call.next().await.unwrap().unwrap() {
                StepItem::Step { body: Value::Int(n), .. } => seen.push(n),
                StepItem::Step { .. } => unreachable!(),
                StepItem::End { .. } => break,
            }
        }
        seen
    }

    let (a, b) = tokio::join!(drain(&mut call_a), drain(&mut call_b));
    assert_eq!(a, vec![0, 1, 2, 3], "stream A must see its own Steps in order");
    assert_eq!(b, vec![0, 1, 2, 3], "stream B must see its own Steps in order");

    let (server_conn, _, _) = server.await.unwrap();
    client.shutdown().await;
    server_conn.shutdown().await;
}
