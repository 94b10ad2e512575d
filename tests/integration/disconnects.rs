//! Scenario 6 from spec.md §8: EOF mid-frame is a hard close
//! (`connection_aborted`), never a partial packet delivered to the
//! application — and per spec.md §7, every stream still open on that
//! connection terminates with a synthetic `End{cancelled: true}`.

use conduit_marsh::Value;
use conduit_wire::packet::{Accepted, Step};
use conduit_wire::{decode_packet, encode_frame, encode_packet, Body, FrameDecoder, Packet};
use tokio::io::{AsyncWriteExt, DuplexStream};

use conduit::{Connection, Headers, Service, SessionConfig, StepItem};

async fn raw_write_packet(io: &mut DuplexStream, packet: &Packet) {
    let json = encode_packet(packet).unwrap();
    let bytes = serde_json::to_vec(&json).unwrap();
    io.write_all(&encode_frame(&bytes)).await.unwrap();
    io.flush().await.unwrap();
}

#[tokio::test]
async fn eof_mid_frame_delivers_no_partial_packet_and_cancels_open_streams() {
    let (client_io, mut server_io) = tokio::io::duplex(16384);

    let server_task = tokio::spawn(async move {
        let mut decoder = FrameDecoder::new();
        // Drive the handshake by hand (the raw wire, not `conduit::session`).
        let service_frame = decoder.read_frame(&mut server_io).await.unwrap().unwrap();
        let service_json: serde_json::Value = serde_json::from_slice(&service_frame).unwrap();
        let _service_packet = decode_packet(service_json).unwrap();
        let begin_frame = decoder.read_frame(&mut server_io).await.unwrap().unwrap();
        let begin_json: serde_json::Value = serde_json::from_slice(&begin_frame).unwrap();
        let _begin_packet = decode_packet(begin_json).unwrap();
        raw_write_packet(&mut server_io, &Packet::control(Body::Accepted(Accepted))).await;

        // Client opens exactly one streaming call; capture its id.
        let start_frame = decoder.read_frame(&mut server_io).await.unwrap().unwrap();
        let start_json: serde_json::Value = serde_json::from_slice(&start_frame).unwrap();
        let start_packet = decode_packet(start_json).unwrap();
        let stream_id = start_packet.stream.unwrap();

        raw_write_packet(
            &mut server_io,
            &Packet::data(stream_id.clone(), Body::Step(Step { index: 0, body: Value::Int(0) })),
        )
        .await;
        raw_write_packet(
            &mut server_io,
            &Packet::data(stream_id.clone(), Body::Step(Step { index: 1, body: Value::Int(1) })),
        )
        .await;

        // A third Step, truncated mid-frame, then a hard close.
        let json = encode_packet(&Packet::data(
            stream_id,
            Body::Step(Step { index: 2, body: Value::Int(2) }),
        ))
        .unwrap();
        let bytes = serde_json::to_vec(&json).unwrap();
        let full_frame = encode_frame(&bytes);
        let truncated = &full_frame[..full_frame.len() - 3];
        server_io.write_all(truncated).await.unwrap();
        server_io.flush().await.unwrap();
        drop(server_io);
    });

    let client = Connection::connect(
        client_io,
        SessionConfig::default(),
        Service::offer("counter"),
        Headers::new(),
    )
    .await
    .unwrap();

    let mut call = client.call_streaming("count", Value::Null, 8).await.unwrap();
    assert_eq!(
        call.next().await.unwrap().unwrap(),
        StepItem::Step { index: 0, body: Value::Int(0) }
    );
    assert_eq!(
        call.next().await.unwrap().unwrap(),
        StepItem::Step { index: 1, body: Value::Int(1) }
    );

    // No partial third Step is ever delivered: the next (and last) item
    // is the synthetic cancelled End from connection teardown.
    match call.next().await.unwrap().unwrap() {
        StepItem::End { cancelled, .. } => assert!(cancelled),
        other => panic!("expected a cancelled End, got {other:?}"),
    }
    assert!(call.next().await.is_none());

    server_task.await.unwrap();
    let wait_result = client.wait().await;
    assert!(wait_result.is_err(), "the reader task must report the abort");
}
