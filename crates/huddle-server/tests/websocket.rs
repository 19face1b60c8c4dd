//! End-to-end tests over real sockets, with the in-memory backend.

use axum::body::Body;
use axum::http::{Request, StatusCode};
use futures_util::{SinkExt, StreamExt};
use huddle_core::{Node, RelayConfig};
use huddle_protocol::{codec, ChatMessage, ServerEvent};
use huddle_server::{build_node, build_router, AppState, BackendKind, Config};
use huddle_store::{MemoryBackend, PresenceStore};
use std::collections::BTreeSet;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;

const WAIT: Duration = Duration::from_secs(2);

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

fn test_config() -> Config {
    let mut config = Config::default();
    config.host = "127.0.0.1".into();
    config.port = 0;
    config.static_dir = None;
    config.backend.kind = BackendKind::Memory;
    config.metrics.enabled = false;
    config
}

async fn app_state(config: Config) -> Arc<AppState> {
    let node = build_node(&config, CancellationToken::new()).await.unwrap();
    Arc::new(AppState::new(node, config))
}

async fn spawn_server() -> SocketAddr {
    let app = build_router(app_state(test_config()).await);
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

async fn connect(addr: SocketAddr, query: &str) -> Client {
    let (client, _) = connect_async(format!("ws://{addr}/websocket{query}"))
        .await
        .unwrap();
    client
}

async fn next_event(client: &mut Client) -> ServerEvent {
    loop {
        let msg = timeout(WAIT, client.next())
            .await
            .expect("timed out waiting for event")
            .expect("connection closed")
            .expect("websocket error");
        match msg {
            Message::Text(text) => return codec::decode_server(&text).unwrap(),
            Message::Ping(_) | Message::Pong(_) => continue,
            other => panic!("Unexpected frame {:?}", other),
        }
    }
}

async fn next_roster(client: &mut Client) -> BTreeSet<String> {
    match next_event(client).await {
        ServerEvent::Roster { clients } => clients.into_iter().collect(),
        other => panic!("Expected roster, got {:?}", other),
    }
}

async fn next_message(client: &mut Client) -> ChatMessage {
    match next_event(client).await {
        ServerEvent::Message { data } => data,
        other => panic!("Expected message, got {:?}", other),
    }
}

async fn welcome_text(client: &mut Client) -> String {
    match next_event(client).await {
        ServerEvent::Welcome { message } => message,
        other => panic!("Expected welcome, got {:?}", other),
    }
}

fn set(names: &[&str]) -> BTreeSet<String> {
    names.iter().map(|n| n.to_string()).collect()
}

#[tokio::test]
async fn test_chat_scenario() {
    let addr = spawn_server().await;

    // A connects without a name and is told which one it got
    let mut a = connect(addr, "").await;
    let welcome = welcome_text(&mut a).await;
    let roster = next_roster(&mut a).await;
    assert_eq!(roster.len(), 1);
    let a_name = roster.iter().next().unwrap().clone();
    assert!(a_name.starts_with("User-") && a_name.len() == 13);
    assert!(welcome.contains(&a_name));

    // B connects as bob
    let mut b = connect(addr, "?username=bob").await;
    assert!(welcome_text(&mut b).await.contains("bob"));
    assert_eq!(next_roster(&mut a).await, set(&[a_name.as_str(), "bob"]));
    assert_eq!(next_roster(&mut b).await, set(&[a_name.as_str(), "bob"]));

    // B says hi; everyone including B sees it
    b.send(Message::Text("hi".into())).await.unwrap();
    assert_eq!(next_message(&mut a).await, ChatMessage::new("bob", "hi"));
    assert_eq!(next_message(&mut b).await, ChatMessage::new("bob", "hi"));

    // B leaves
    b.close(None).await.unwrap();
    assert_eq!(next_roster(&mut a).await, set(&[a_name.as_str()]));
}

#[tokio::test]
async fn test_empty_username_is_generated() {
    let addr = spawn_server().await;

    let mut client = connect(addr, "?username=").await;
    welcome_text(&mut client).await;
    let roster = next_roster(&mut client).await;
    assert!(roster.iter().all(|name| name.starts_with("User-")));
}

#[tokio::test]
async fn test_utf8_binary_frame_is_chat_text() {
    let addr = spawn_server().await;

    let mut client = connect(addr, "?username=carol").await;
    welcome_text(&mut client).await;
    next_roster(&mut client).await;

    client
        .send(Message::Binary(vec![0xff, 0xfe]))
        .await
        .unwrap();
    client
        .send(Message::Binary("привет".as_bytes().to_vec()))
        .await
        .unwrap();

    // The invalid frame is dropped, the valid one relayed
    assert_eq!(next_message(&mut client).await, ChatMessage::new("carol", "привет"));
}

#[tokio::test]
async fn test_abrupt_disconnect_updates_roster() {
    let addr = spawn_server().await;

    let mut alice = connect(addr, "?username=alice").await;
    welcome_text(&mut alice).await;
    next_roster(&mut alice).await;

    let mut dave = connect(addr, "?username=dave").await;
    welcome_text(&mut dave).await;
    assert_eq!(next_roster(&mut alice).await, set(&["alice", "dave"]));

    // Drop the socket without a close handshake
    drop(dave);
    assert_eq!(next_roster(&mut alice).await, set(&["alice"]));
}

#[tokio::test]
async fn test_shutdown_closes_sessions_and_clears_presence() {
    let backend = MemoryBackend::new();
    let node = Node::with_backend(backend.clone(), RelayConfig::default(), CancellationToken::new())
        .await
        .unwrap();
    let state = Arc::new(AppState::new(node, test_config()));
    let app = build_router(Arc::clone(&state));
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    let mut ghost = connect(addr, "?username=ghost").await;
    welcome_text(&mut ghost).await;
    next_roster(&mut ghost).await;
    assert!(backend.all_members().await.unwrap().contains("ghost"));

    timeout(WAIT, state.shutdown())
        .await
        .expect("sessions did not close");
    assert!(backend.all_members().await.unwrap().is_empty());

    // The client is told the server is going away
    let closed = timeout(WAIT, async {
        loop {
            match ghost.next().await {
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                Some(Ok(_)) => continue,
            }
        }
    })
    .await;
    assert!(closed.is_ok());
}

#[tokio::test]
async fn test_health_endpoint() {
    let app = build_router(app_state(test_config()).await);

    let response = app
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["status"], "ok");
    assert_eq!(json["backend"], "memory");
    assert_eq!(json["connections"], 0);
}

#[tokio::test]
async fn test_static_files_served() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("index.html"), "<h1>chat</h1>").unwrap();

    let mut config = test_config();
    config.static_dir = Some(dir.path().to_path_buf());
    let app = build_router(app_state(config).await);

    let response = app
        .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    assert_eq!(&body[..], b"<h1>chat</h1>");
}
