//! End-to-end tests: real server, real WebSocket clients.

use std::net::SocketAddr;
use std::time::Duration;

use farebox_api::{AppState, FareEvent, FareReceipt, HubConfig, Server, ServerConfig};
use futures::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

struct TestServer {
    addr: SocketAddr,
    state: AppState,
    stop: oneshot::Sender<()>,
    handle: JoinHandle<anyhow::Result<()>>,
}

impl TestServer {
    async fn start(hub: HubConfig) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("local addr");
        let state = AppState::with_config(hub.clone());
        let config = ServerConfig::new("127.0.0.1", addr.port()).with_hub(hub);
        let server = Server::new(config, state.clone());

        let (stop, stopped) = oneshot::channel::<()>();
        let handle = tokio::spawn(server.serve(listener, async move {
            let _ = stopped.await;
        }));

        Self {
            addr,
            state,
            stop,
            handle,
        }
    }

    fn url(&self, query: &str) -> String {
        format!("ws://{}/v1/ws{}", self.addr, query)
    }

    async fn connect(&self, channel: &str) -> Client {
        let before = self.state.hub.registry().member_count(channel);
        let (client, _) = connect_async(self.url(&format!("?id={channel}")))
            .await
            .expect("connect");
        self.wait_for_members(channel, before + 1).await;
        client
    }

    async fn wait_for_members(&self, channel: &str, expected: usize) {
        let registry = self.state.hub.registry();
        tokio::time::timeout(Duration::from_secs(5), async {
            while registry.member_count(channel) != expected {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("membership settled");
    }
}

fn quiet() -> HubConfig {
    HubConfig::default().with_liveness(0, 0)
}

/// Next text frame, skipping control frames.
async fn next_text(client: &mut Client) -> String {
    loop {
        let frame = tokio::time::timeout(Duration::from_secs(5), client.next())
            .await
            .expect("frame in time")
            .expect("stream open")
            .expect("frame");
        match frame {
            Message::Text(text) => return text.as_str().to_string(),
            Message::Ping(_) | Message::Pong(_) => continue,
            other => unreachable!("unexpected frame {other:?}"),
        }
    }
}

async fn assert_silent(client: &mut Client) {
    let result = tokio::time::timeout(Duration::from_millis(200), client.next()).await;
    assert!(result.is_err(), "expected no frame, got {result:?}");
}

#[tokio::test]
async fn fare_event_reaches_every_display_on_the_bus() {
    let server = TestServer::start(quiet()).await;
    let mut a = server.connect("bus-1").await;
    let mut b = server.connect("bus-1").await;
    let mut other = server.connect("bus-2").await;

    let event = FareEvent::success(FareReceipt::charge("u-1", "Ana", "Silva", 4.5, 17.0));
    server.state.hub.broadcast_to_channel("bus-1", &event);

    let text_a = next_text(&mut a).await;
    let text_b = next_text(&mut b).await;
    assert_eq!(text_a, text_b);

    let value: serde_json::Value = serde_json::from_str(&text_a).expect("json");
    assert_eq!(value["type"], "success");
    assert_eq!(value["balance"], 12.5);

    assert_silent(&mut other).await;
}

#[tokio::test]
async fn error_event_has_nested_kind() {
    let server = TestServer::start(quiet()).await;
    let mut display = server.connect("bus-7").await;

    server
        .state
        .hub
        .broadcast_to_channel("bus-7", &FareEvent::insufficient_balance(2.0));

    let value: serde_json::Value =
        serde_json::from_str(&next_text(&mut display).await).expect("json");
    assert_eq!(value["type"], "error");
    assert_eq!(value["error"]["type"], "INSUFFICIENT_BALANCE");
}

#[tokio::test]
async fn broadcast_all_reaches_every_channel() {
    let server = TestServer::start(quiet()).await;
    let mut a = server.connect("bus-1").await;
    let mut b = server.connect("bus-2").await;

    server
        .state
        .hub
        .broadcast_all(&serde_json::json!({"type": "notice", "seq": 1}));
    server
        .state
        .hub
        .broadcast_all(&serde_json::json!({"type": "notice", "seq": 2}));

    for client in [&mut a, &mut b] {
        assert_eq!(next_text(client).await, r#"{"seq":1,"type":"notice"}"#);
        assert_eq!(next_text(client).await, r#"{"seq":2,"type":"notice"}"#);
    }
}

#[tokio::test]
async fn inbound_messages_are_ignored() {
    let server = TestServer::start(quiet()).await;
    let mut display = server.connect("bus-1").await;

    display
        .send(Message::Text("hello?".into()))
        .await
        .expect("send");
    server.state.hub.broadcast_to_channel("bus-1", "only this");

    assert_eq!(next_text(&mut display).await, r#""only this""#);
    assert_eq!(server.state.hub.registry().member_count("bus-1"), 1);
}

#[tokio::test]
async fn client_close_unregisters() {
    let server = TestServer::start(quiet()).await;
    let mut a = server.connect("bus-1").await;
    let _b = server.connect("bus-1").await;

    a.close(None).await.expect("close");

    server.wait_for_members("bus-1", 1).await;
    // Empty or not, the channel entry is kept.
    assert_eq!(server.state.hub.registry().channel_count(), 1);
}

#[tokio::test]
async fn dropped_client_unregisters() {
    let server = TestServer::start(quiet()).await;
    let a = server.connect("bus-1").await;

    drop(a);

    server.wait_for_members("bus-1", 0).await;
}

#[tokio::test]
async fn missing_id_is_rejected() {
    let server = TestServer::start(quiet()).await;

    for query in ["", "?id="] {
        let err = connect_async(server.url(query))
            .await
            .err()
            .expect("handshake rejected");
        match err {
            WsError::Http(response) => assert_eq!(response.status(), 400),
            other => unreachable!("expected http 400, got {other}"),
        }
    }

    assert_eq!(server.state.hub.registry().channel_count(), 0);
    assert_eq!(server.state.hub.metrics().upgrade_rejections(), 2);
}

#[tokio::test]
async fn shutdown_closes_every_connection() {
    let server = TestServer::start(quiet()).await;
    let mut a = server.connect("bus-1").await;
    let mut b = server.connect("bus-2").await;

    server.stop.send(()).expect("stop");

    for client in [&mut a, &mut b] {
        let frame = tokio::time::timeout(Duration::from_secs(5), client.next())
            .await
            .expect("close in time");
        match frame {
            Some(Ok(Message::Close(Some(close)))) => assert_eq!(close.code, CloseCode::Away),
            other => unreachable!("expected close frame, got {other:?}"),
        }
    }

    tokio::time::timeout(Duration::from_secs(10), server.handle)
        .await
        .expect("server stops")
        .expect("join")
        .expect("serve");
    assert_eq!(server.state.hub.registry().connection_count(), 0);
    assert_eq!(server.state.hub.active_workers(), 0);
}
