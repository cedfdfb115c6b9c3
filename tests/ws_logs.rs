//! WebSocket log protocol against a served router and a real client.

mod common;

use std::net::SocketAddr;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use common::{Harness, ALICE, BOB};
use sshbox::lifecycle::{ContainerDto, CreateContainerRequest};
use sshbox::server::ws::STREAM_COMPLETE;
use sshbox::server::{router, AppState, OWNER_HEADER};

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

const NORMAL: u16 = 1000;
const INVALID: u16 = 1007;
const SERVER_ERROR: u16 = 1011;

async fn spawn_server(h: &Harness) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = router(AppState::new(h.service.clone()));
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

async fn connect(addr: SocketAddr, owner: i64, raw_id: &str) -> Client {
    let mut request = format!("ws://{addr}/ws/containers/{raw_id}/logs")
        .into_client_request()
        .unwrap();
    request
        .headers_mut()
        .insert(OWNER_HEADER, owner.to_string().parse().unwrap());
    let (client, _) = connect_async(request).await.expect("upgrade accepted");
    client
}

async fn next_message(client: &mut Client) -> Option<Message> {
    loop {
        let message = tokio::time::timeout(Duration::from_secs(2), client.next())
            .await
            .expect("frame arrives in time");
        match message {
            Some(Ok(Message::Ping(_) | Message::Pong(_))) => continue,
            Some(Ok(message)) => return Some(message),
            Some(Err(_)) | None => return None,
        }
    }
}

async fn expect_text(client: &mut Client) -> String {
    match next_message(client).await {
        Some(Message::Text(text)) => text.as_str().to_string(),
        other => panic!("expected text frame, got {other:?}"),
    }
}

async fn expect_close(client: &mut Client) -> u16 {
    match next_message(client).await {
        Some(Message::Close(Some(frame))) => u16::from(frame.code),
        other => panic!("expected close frame, got {other:?}"),
    }
}

async fn running_box(h: &Harness, name: &str) -> ContainerDto {
    let dto = h
        .service
        .create(ALICE, CreateContainerRequest::new(name, "alpine:3.18"))
        .await
        .unwrap();
    h.service.start(dto.id, ALICE).await.unwrap()
}

async fn wait_for_followers(h: &Harness, engine_id: &str, expected: usize) {
    for _ in 0..200 {
        if h.engine.open_follow_streams(engine_id) == expected {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("expected {expected} open follow streams");
}

#[tokio::test]
async fn test_lines_then_stream_complete() {
    let h = Harness::new();
    let dto = running_box(&h, "box1").await;
    let addr = spawn_server(&h).await;

    let mut client = connect(addr, ALICE, &dto.id.to_string()).await;
    wait_for_followers(&h, &dto.container_id, 1).await;

    h.engine.emit(&dto.container_id, "first\nsecond\n").await;
    assert_eq!(expect_text(&mut client).await, "first");
    assert_eq!(expect_text(&mut client).await, "second");

    h.engine.end_streams(&dto.container_id);
    assert_eq!(expect_text(&mut client).await, STREAM_COMPLETE);
    assert_eq!(expect_close(&mut client).await, NORMAL);
}

#[tokio::test]
async fn test_engine_failure_reported_with_server_error() {
    let h = Harness::new();
    let dto = running_box(&h, "box1").await;
    let addr = spawn_server(&h).await;

    let mut client = connect(addr, ALICE, &dto.id.to_string()).await;
    wait_for_followers(&h, &dto.container_id, 1).await;

    h.engine.break_stream(&dto.container_id, "daemon died").await;
    assert_eq!(
        expect_text(&mut client).await,
        "ERROR: Log stream failed: daemon died"
    );
    assert_eq!(expect_close(&mut client).await, SERVER_ERROR);
}

#[tokio::test]
async fn test_invalid_container_id() {
    let h = Harness::new();
    let addr = spawn_server(&h).await;

    let mut client = connect(addr, ALICE, "abc").await;

    assert_eq!(expect_text(&mut client).await, "ERROR: Invalid container ID");
    assert_eq!(expect_close(&mut client).await, INVALID);
    assert_eq!(h.engine.calls_to("logs"), 0);
}

#[tokio::test]
async fn test_stopped_container_is_refused() {
    let h = Harness::new();
    let dto = h
        .service
        .create(ALICE, CreateContainerRequest::new("box1", "alpine:3.18"))
        .await
        .unwrap();
    let addr = spawn_server(&h).await;

    let mut client = connect(addr, ALICE, &dto.id.to_string()).await;

    assert_eq!(
        expect_text(&mut client).await,
        "ERROR: Container is not running"
    );
    assert_eq!(expect_close(&mut client).await, NORMAL);
    assert_eq!(h.engine.calls_to("logs"), 0);
}

#[tokio::test]
async fn test_unknown_and_foreign_containers_are_not_found() {
    let h = Harness::new();
    let dto = running_box(&h, "box1").await;
    let addr = spawn_server(&h).await;

    let mut client = connect(addr, ALICE, "999").await;
    assert_eq!(expect_text(&mut client).await, "ERROR: Container not found");
    assert_eq!(expect_close(&mut client).await, SERVER_ERROR);

    let mut client = connect(addr, BOB, &dto.id.to_string()).await;
    assert_eq!(expect_text(&mut client).await, "ERROR: Container not found");
    assert_eq!(expect_close(&mut client).await, SERVER_ERROR);

    assert_eq!(h.engine.calls_to("logs"), 0);
}

#[tokio::test]
async fn test_missing_owner_header_rejects_upgrade() {
    let h = Harness::new();
    let addr = spawn_server(&h).await;

    let result = connect_async(format!("ws://{addr}/ws/containers/1/logs")).await;

    assert!(result.is_err());
    assert_eq!(h.engine.calls_to("logs"), 0);
}

#[tokio::test]
async fn test_client_disconnect_releases_engine_stream() {
    let h = Harness::new();
    let dto = running_box(&h, "box1").await;
    let registry = h.service.stream_registry().clone();
    let addr = spawn_server(&h).await;

    let mut client = connect(addr, ALICE, &dto.id.to_string()).await;
    wait_for_followers(&h, &dto.container_id, 1).await;
    assert_eq!(registry.viewers_of(&dto.container_id), 1);

    client.close(None).await.unwrap();

    wait_for_followers(&h, &dto.container_id, 0).await;
    for _ in 0..200 {
        if registry.is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(registry.is_empty());
}

#[tokio::test]
async fn test_dropped_connection_releases_engine_stream() {
    let h = Harness::new();
    let dto = running_box(&h, "box1").await;
    let addr = spawn_server(&h).await;

    let client = connect(addr, ALICE, &dto.id.to_string()).await;
    wait_for_followers(&h, &dto.container_id, 1).await;

    drop(client);

    wait_for_followers(&h, &dto.container_id, 0).await;
}
