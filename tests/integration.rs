//! Integration tests for streamwire.
//!
//! These tests drive complete sessions over in-memory, named pipe and
//! WebSocket connections, and check the bytes on the wire with a raw peer.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use streamwire::payloads::{ResponsePayload, StreamDescription};
use streamwire::protocol::{Frame, Header, PayloadType, HEADER_SIZE, MAX_PAYLOAD_LENGTH};
use streamwire::session::DISCONNECT_REASON;
use streamwire::transport::split_stream;
use streamwire::{
    verb, ReceiveRequest, RequestHandler, Router, StreamingError, StreamingRequest, StreamingResponse,
    StreamingSession,
};
use tokio::io::{duplex, AsyncReadExt, AsyncWriteExt, DuplexStream};
use uuid::Uuid;

#[derive(Serialize, Deserialize, Debug, PartialEq)]
struct Activity {
    kind: String,
    text: String,
}

fn echo_router() -> Arc<dyn RequestHandler> {
    let mut router = Router::new();
    router
        .route(verb::POST, "/echo", |request: ReceiveRequest| async move {
            let activity: Activity = request.read_body_as_json().await.ok()?;
            let mut response = StreamingResponse::ok();
            response.set_body(&activity).ok()?;
            Some(response)
        })
        .route(verb::GET, "/large", |_request: ReceiveRequest| async {
            let mut response = StreamingResponse::ok();
            response.set_text_body("x".repeat(10_000));
            Some(response)
        });
    Arc::new(router)
}

async fn attach(session: &Arc<StreamingSession>, stream: DuplexStream) {
    let (write, read) = split_stream(stream);
    session.attach(Box::new(write), Box::new(read)).await.unwrap();
}

async fn connected_pair(handler: Option<Arc<dyn RequestHandler>>) -> (Arc<StreamingSession>, Arc<StreamingSession>) {
    let (a, b) = duplex(256 * 1024);
    let client = StreamingSession::new(None, None);
    let server = StreamingSession::new(handler, None);
    attach(&client, a).await;
    attach(&server, b).await;
    (client, server)
}

/// Read one whole frame from a raw peer.
async fn read_frame(peer: &mut DuplexStream) -> Frame {
    let mut head = [0u8; HEADER_SIZE];
    peer.read_exact(&mut head).await.unwrap();
    let header = Header::decode(&head).unwrap();
    let mut payload = vec![0u8; header.payload_length as usize];
    peer.read_exact(&mut payload).await.unwrap();
    Frame::new(header, Bytes::from(payload))
}

async fn write_frame(peer: &mut DuplexStream, payload_type: PayloadType, id: Uuid, end: bool, payload: &[u8]) {
    let header = Header::new(payload_type, payload.len() as u32, id, end);
    let frame = Frame::new(header, Bytes::copy_from_slice(payload));
    peer.write_all(&frame.encode()).await.unwrap();
}

async fn write_response(peer: &mut DuplexStream, id: Uuid, envelope: &ResponsePayload) {
    let json = serde_json::to_vec(envelope).unwrap();
    write_frame(peer, PayloadType::Response, id, true, &json).await;
}

#[tokio::test]
async fn test_json_round_trip_over_sessions() {
    let (client, _server) = connected_pair(Some(echo_router())).await;

    let activity = Activity {
        kind: "message".to_string(),
        text: "Hello World!".to_string(),
    };
    let mut request = StreamingRequest::new(verb::POST, "/echo");
    request.set_json_body(&activity).unwrap();

    let response = client.send_request(request).await.unwrap();
    assert_eq!(response.status_code, 200);
    assert_eq!(response.read_body_as_json::<Activity>().await.unwrap(), activity);
}

#[tokio::test]
async fn test_unknown_route_is_not_found() {
    let (client, _server) = connected_pair(Some(echo_router())).await;

    let response = client
        .send_request(StreamingRequest::new(verb::GET, "/missing"))
        .await
        .unwrap();

    assert_eq!(response.status_code, 404);
    assert!(response.streams.is_empty());
    assert_eq!(response.read_body_as_string().await.unwrap(), "");
}

#[tokio::test]
async fn test_large_body_is_reassembled() {
    let (client, _server) = connected_pair(Some(echo_router())).await;

    let response = client
        .send_request(StreamingRequest::new(verb::GET, "/large"))
        .await
        .unwrap();

    let stream = &response.streams[0];
    assert_eq!(stream.length(), Some(10_000));
    assert_eq!(response.read_body_as_string().await.unwrap(), "x".repeat(10_000));
}

#[tokio::test]
async fn test_concurrent_requests_share_connection() {
    let (client, _server) = connected_pair(Some(echo_router())).await;

    let mut tasks = Vec::new();
    for i in 0..10 {
        let client = client.clone();
        tasks.push(tokio::spawn(async move {
            let activity = Activity {
                kind: "message".to_string(),
                text: format!("message {}", i),
            };
            let mut request = StreamingRequest::new(verb::POST, "/echo");
            request.set_json_body(&activity).unwrap();
            let response = client.send_request(request).await.unwrap();
            assert_eq!(response.read_body_as_json::<Activity>().await.unwrap(), activity);
        }));
    }

    for task in tasks {
        task.await.unwrap();
    }
}

#[tokio::test]
async fn test_both_sides_can_send_requests() {
    let (a, b) = duplex(64 * 1024);
    let mut client_router = Router::new();
    client_router.route(verb::GET, "/client", |_request: ReceiveRequest| async {
        Some(StreamingResponse::create(202, None))
    });
    let client = StreamingSession::new(Some(Arc::new(client_router)), None);
    let server = StreamingSession::new(Some(echo_router()), None);
    attach(&client, a).await;
    attach(&server, b).await;

    let from_server = server
        .send_request(StreamingRequest::new(verb::GET, "/client"))
        .await
        .unwrap();
    assert_eq!(from_server.status_code, 202);

    let from_client = client
        .send_request(StreamingRequest::new(verb::GET, "/large"))
        .await
        .unwrap();
    assert_eq!(from_client.status_code, 200);
}

#[tokio::test]
async fn test_request_body_is_chunked_on_the_wire() {
    let (a, mut peer) = duplex(256 * 1024);
    let client = StreamingSession::new(None, None);
    attach(&client, a).await;

    let pending = {
        let client = client.clone();
        tokio::spawn(async move {
            let mut request = StreamingRequest::new(verb::POST, "/upload");
            request.set_body("y".repeat(10_000));
            client.send_request(request).await
        })
    };

    let envelope = read_frame(&mut peer).await;
    assert_eq!(envelope.header.payload_type, PayloadType::Request);
    assert!(envelope.header.end);
    let json: serde_json::Value = serde_json::from_slice(&envelope.payload).unwrap();
    assert_eq!(json["verb"], "POST");
    assert_eq!(json["path"], "/upload");
    assert_eq!(json["streams"][0]["length"], 10_000);

    let mut lengths = Vec::new();
    loop {
        let frame = read_frame(&mut peer).await;
        assert_eq!(frame.header.payload_type, PayloadType::Stream);
        lengths.push(frame.header.payload_length as usize);
        if frame.header.end {
            break;
        }
    }
    assert_eq!(lengths, vec![MAX_PAYLOAD_LENGTH, MAX_PAYLOAD_LENGTH, 10_000 - 2 * MAX_PAYLOAD_LENGTH]);

    write_response(
        &mut peer,
        envelope.header.id,
        &ResponsePayload {
            status_code: 201,
            streams: Vec::new(),
        },
    )
    .await;

    let response = pending.await.unwrap().unwrap();
    assert_eq!(response.status_code, 201);
}

#[tokio::test]
async fn test_cancelled_inbound_stream_sends_one_cancel() {
    let (a, mut peer) = duplex(256 * 1024);
    let client = StreamingSession::new(None, None);
    attach(&client, a).await;

    let pending = {
        let client = client.clone();
        tokio::spawn(async move { client.send_request(StreamingRequest::new(verb::GET, "/download")).await })
    };
    let request = read_frame(&mut peer).await;

    // Announce a 10000 byte body but only deliver the first 100 bytes.
    let stream_id = Uuid::new_v4();
    write_response(
        &mut peer,
        request.header.id,
        &ResponsePayload {
            status_code: 200,
            streams: vec![StreamDescription {
                id: stream_id,
                content_type: Some("text/plain".to_string()),
                length: Some(10_000),
            }],
        },
    )
    .await;
    write_frame(&mut peer, PayloadType::Stream, stream_id, false, &[b'z'; 100]).await;

    let response = pending.await.unwrap().unwrap();
    let body = &response.streams[0];
    assert_eq!(body.id(), stream_id);
    assert_eq!(body.content_type(), Some("text/plain"));

    tokio::time::sleep(Duration::from_millis(20)).await;
    body.cancel();

    let cancel = read_frame(&mut peer).await;
    assert_eq!(cancel.header.payload_type, PayloadType::CancelStream);
    assert_eq!(cancel.header.id, stream_id);
    assert_eq!(cancel.header.payload_length, 0);

    // Frames already in flight are dropped and the end frame is absorbed.
    assert_eq!(body.read_as_string().await.unwrap(), "z".repeat(100));
    write_frame(&mut peer, PayloadType::Stream, stream_id, false, &[b'z'; 100]).await;
    write_frame(&mut peer, PayloadType::Stream, stream_id, true, &[]).await;

    // The next frame on the wire is a new request, not a second cancel.
    let next = {
        let client = client.clone();
        tokio::spawn(async move { client.send_request(StreamingRequest::new(verb::GET, "/next")).await })
    };
    let frame = read_frame(&mut peer).await;
    assert_eq!(frame.header.payload_type, PayloadType::Request);

    next.abort();
}

/// Upload a large body and interrupt it with a control frame from the peer.
async fn assert_peer_control_stops_upload(control: PayloadType) {
    // A small pipe keeps the sender blocked so the cancel lands mid-body.
    let (a, mut peer) = duplex(8 * 1024);
    let client = StreamingSession::new(None, None);
    attach(&client, a).await;

    let chunks = 40;
    let pending = {
        let client = client.clone();
        tokio::spawn(async move {
            let mut request = StreamingRequest::new(verb::POST, "/upload");
            request.set_body("u".repeat(chunks * MAX_PAYLOAD_LENGTH));
            client.send_request(request).await
        })
    };

    let envelope = read_frame(&mut peer).await;
    assert_eq!(envelope.header.payload_type, PayloadType::Request);
    let first = read_frame(&mut peer).await;
    assert_eq!(first.header.payload_type, PayloadType::Stream);
    assert!(!first.header.end);

    let target = match control {
        PayloadType::CancelStream => first.header.id,
        _ => Uuid::new_v4(),
    };
    write_frame(&mut peer, control, target, true, &[]).await;
    tokio::time::sleep(Duration::from_millis(50)).await;

    let mut frames = 1;
    let last = loop {
        let frame = read_frame(&mut peer).await;
        assert_eq!(frame.header.id, first.header.id);
        frames += 1;
        if frame.header.end {
            break frame;
        }
    };

    assert_eq!(last.header.payload_length, 0);
    assert!(frames < chunks, "sent {} frames", frames);
    assert!(client.is_connected());

    pending.abort();
}

#[tokio::test]
async fn test_peer_cancel_stream_stops_upload() {
    assert_peer_control_stops_upload(PayloadType::CancelStream).await;
}

#[tokio::test]
async fn test_peer_cancel_all_stops_upload() {
    assert_peer_control_stops_upload(PayloadType::CancelAll).await;
}

#[tokio::test]
async fn test_partial_body_ends_when_peer_drops() {
    let (a, mut peer) = duplex(64 * 1024);
    let client = StreamingSession::new(None, None);
    attach(&client, a).await;

    let pending = {
        let client = client.clone();
        tokio::spawn(async move { client.send_request(StreamingRequest::new(verb::GET, "/download")).await })
    };
    let request = read_frame(&mut peer).await;

    let stream_id = Uuid::new_v4();
    write_response(
        &mut peer,
        request.header.id,
        &ResponsePayload {
            status_code: 200,
            streams: vec![StreamDescription {
                id: stream_id,
                content_type: None,
                length: Some(1000),
            }],
        },
    )
    .await;
    write_frame(&mut peer, PayloadType::Stream, stream_id, false, b"0123456789").await;

    let response = pending.await.unwrap().unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;
    drop(peer);
    client.closed().await;

    let body = tokio::time::timeout(Duration::from_secs(2), response.read_body_as_string())
        .await
        .expect("body reader should see end of stream after disconnect")
        .unwrap();
    assert_eq!(body, "0123456789");
}

#[tokio::test]
async fn test_malformed_envelope_is_ignored() {
    let (a, mut peer) = duplex(64 * 1024);
    let client = StreamingSession::new(None, None);
    attach(&client, a).await;

    let pending = {
        let client = client.clone();
        tokio::spawn(async move { client.send_request(StreamingRequest::new(verb::GET, "/")).await })
    };
    let request = read_frame(&mut peer).await;

    write_frame(&mut peer, PayloadType::Response, request.header.id, true, b"{not json").await;
    write_response(
        &mut peer,
        request.header.id,
        &ResponsePayload {
            status_code: 200,
            streams: Vec::new(),
        },
    )
    .await;

    let response = pending.await.unwrap().unwrap();
    assert_eq!(response.status_code, 200);
    assert!(client.is_connected());
}

#[tokio::test]
async fn test_invalid_header_disconnects() {
    let (a, mut peer) = duplex(64 * 1024);
    let (events_tx, mut events) = tokio::sync::mpsc::unbounded_channel();
    let client = StreamingSession::new(
        None,
        Some(Arc::new(move |event: &streamwire::TransportDisconnectedEvent| {
            let _ = events_tx.send(event.to_string());
        })),
    );
    attach(&client, a).await;

    peer.write_all(&[b'?'; HEADER_SIZE]).await.unwrap();

    let reason = tokio::time::timeout(Duration::from_secs(5), events.recv())
        .await
        .unwrap()
        .unwrap();
    assert!(reason.contains("Invalid header"), "{}", reason);
    client.closed().await;
}

#[tokio::test]
async fn test_disconnect_rejects_pending_requests() {
    let silent: Arc<dyn RequestHandler> = Arc::new(streamwire::handler_fn(|_request: ReceiveRequest| async {
        None
    }));
    let (client, _server) = connected_pair(Some(silent)).await;

    let pending = {
        let client = client.clone();
        tokio::spawn(async move { client.send_request(StreamingRequest::new(verb::GET, "/never")).await })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;
    client.disconnect().await;

    match pending.await.unwrap() {
        Err(StreamingError::Disconnected(reason)) => assert_eq!(reason, DISCONNECT_REASON),
        other => panic!("unexpected result: {:?}", other.map(|r| r.status_code)),
    }
    assert!(matches!(
        client.send_request(StreamingRequest::new(verb::GET, "/")).await,
        Err(StreamingError::NotConnected)
    ));
}

#[cfg(unix)]
#[tokio::test]
async fn test_named_pipe_round_trip() {
    use streamwire::transport::{pipe_path, OUTGOING_SUFFIX};
    use streamwire::{NamedPipeClient, NamedPipeServer};

    let base_name = format!("streamwire-test-{}", Uuid::new_v4());
    let server = Arc::new(NamedPipeServer::new(&base_name, Some(echo_router())).unwrap());
    let starting = {
        let server = server.clone();
        tokio::spawn(async move { server.start().await })
    };

    // The outgoing pipe is bound last; once it exists both are listening.
    let outgoing = pipe_path(&base_name, OUTGOING_SUFFIX);
    while !std::path::Path::new(&outgoing).exists() {
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    let (events_tx, mut events) = tokio::sync::mpsc::unbounded_channel();
    let client = NamedPipeClient::builder(&base_name)
        .auto_reconnect(false)
        .disconnection_handler(move |event| {
            let _ = events_tx.send(event.to_string());
        })
        .build()
        .unwrap();
    client.connect().await.unwrap();
    starting.await.unwrap().unwrap();
    assert!(server.is_connected());

    let response = client
        .send(StreamingRequest::new(verb::GET, "/large"))
        .await
        .unwrap();
    assert_eq!(response.read_body_as_string().await.unwrap().len(), 10_000);

    server.disconnect().await;
    let reason = tokio::time::timeout(Duration::from_secs(5), events.recv())
        .await
        .unwrap()
        .unwrap();
    assert!(!reason.is_empty());
    client.session().closed().await;
    assert!(!client.is_connected());
}

#[cfg(unix)]
#[tokio::test]
async fn test_second_named_pipe_server_leaves_first_usable() {
    use streamwire::transport::{pipe_path, OUTGOING_SUFFIX};
    use streamwire::{NamedPipeClient, NamedPipeServer};

    let base_name = format!("streamwire-test-{}", Uuid::new_v4());
    let server = Arc::new(NamedPipeServer::new(&base_name, Some(echo_router())).unwrap());
    let starting = {
        let server = server.clone();
        tokio::spawn(async move { server.start().await })
    };

    let outgoing = pipe_path(&base_name, OUTGOING_SUFFIX);
    while !std::path::Path::new(&outgoing).exists() {
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    let rival = NamedPipeServer::new(&base_name, None).unwrap();
    let err = tokio::time::timeout(Duration::from_secs(2), rival.start())
        .await
        .unwrap()
        .err()
        .unwrap();
    assert!(err.to_string().contains("address already in use"), "{}", err);
    drop(rival);

    let client = NamedPipeClient::builder(&base_name)
        .auto_reconnect(false)
        .build()
        .unwrap();
    client.connect().await.unwrap();
    starting.await.unwrap().unwrap();

    let response = client
        .send(StreamingRequest::new(verb::GET, "/large"))
        .await
        .unwrap();
    assert_eq!(response.read_body_as_string().await.unwrap().len(), 10_000);

    client.disconnect().await;
}

#[tokio::test]
async fn test_websocket_round_trip() {
    use streamwire::{WebSocketClient, WebSocketServer};
    use tokio::net::TcpListener;

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let accepting = tokio::spawn(async move {
        let (tcp, _) = listener.accept().await.unwrap();
        let socket = tokio_tungstenite::accept_async(tcp).await.unwrap();
        let server = WebSocketServer::new(socket, Some(echo_router()));
        server.start().await.unwrap();
        server
    });

    let mut client_router = Router::new();
    client_router.route(verb::GET, "/ping", |_request: ReceiveRequest| async {
        let mut response = StreamingResponse::ok();
        response.set_text_body("pong");
        Some(response)
    });
    let (events_tx, mut events) = tokio::sync::mpsc::unbounded_channel();
    let client = WebSocketClient::builder(&format!("ws://{}", addr))
        .request_handler(client_router)
        .disconnection_handler(move |event| {
            let _ = events_tx.send(event.to_string());
        })
        .build()
        .unwrap();
    client.connect().await.unwrap();
    let server = accepting.await.unwrap();

    let activity = Activity {
        kind: "message".to_string(),
        text: "over websocket".to_string(),
    };
    let mut request = StreamingRequest::new(verb::POST, "/echo");
    request.set_json_body(&activity).unwrap();
    let response = client.send(request).await.unwrap();
    assert_eq!(response.read_body_as_json::<Activity>().await.unwrap(), activity);

    let response = client.send(StreamingRequest::new(verb::GET, "/large")).await.unwrap();
    assert_eq!(response.read_body_as_string().await.unwrap(), "x".repeat(10_000));

    let pong = server.send(StreamingRequest::new(verb::GET, "/ping")).await.unwrap();
    assert_eq!(pong.read_body_as_string().await.unwrap(), "pong");

    server.disconnect().await;
    tokio::time::timeout(Duration::from_secs(5), events.recv())
        .await
        .unwrap()
        .unwrap();
    client.session().closed().await;
    assert!(!client.is_connected());
}
