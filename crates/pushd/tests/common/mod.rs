use futures_util::{SinkExt, StreamExt};
use push_common::signature;
use pushd::config::ServerConfig;
use pushd::rooms::Rooms;
use pushd::stats::Stats;
use pushd::store::MemoryRekeyStore;
use pushd::ServerState;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio_tungstenite::tungstenite::Message;

pub const TEST_SECRET: &str = "test-secret";

pub fn test_config(listen: SocketAddr) -> ServerConfig {
    ServerConfig {
        listen,
        status_addr: "127.0.0.1:0".parse().unwrap(),
        secret: TEST_SECRET.to_owned(),
        tenant: "test-tenant".to_owned(),
        redis: "redis://localhost".to_owned(),
        enable_stats: true,
        rekey_interval: 60,
        auth_timeout: 5,
        ping_interval: 30,
        idle_timeout: 120,
        max_conns: 1000,
    }
}

/// Builds a signed handshake the way the backend would, stamped with the
/// current time.
pub fn signed_handshake(user_id: i64, groups: &[i64], channels: &[&str]) -> String {
    let payload = serde_json::json!({
        "userID": user_id,
        "timestamp": unix_now_secs(),
        "groups": groups,
        "channels": channels,
    });
    signature::sign(payload.to_string().as_bytes(), TEST_SECRET.as_bytes())
}

fn unix_now_secs() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_secs()
}

pub struct TestClient {
    pub ws_tx: futures_util::stream::SplitSink<
        tokio_tungstenite::WebSocketStream<
            tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
        >,
        Message,
    >,
    pub ws_rx: futures_util::stream::SplitStream<
        tokio_tungstenite::WebSocketStream<
            tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
        >,
    >,
}

impl TestClient {
    /// Opens a raw WebSocket connection without sending a handshake.
    pub async fn connect(addr: &SocketAddr) -> Self {
        let url = format!("ws://{addr}");
        let (ws, _) = tokio_tungstenite::connect_async(url).await.unwrap();
        let (ws_tx, ws_rx) = ws.split();
        Self { ws_tx, ws_rx }
    }

    /// Connects and completes the credential handshake; panics unless the
    /// server answers `authenticated`.
    pub async fn connect_authed(addr: &SocketAddr, signed: &str) -> Self {
        let mut client = Self::connect(addr).await;
        client
            .send_event("connectData", serde_json::json!(signed))
            .await;
        let (event, _) = client.recv_event().await;
        assert_eq!(event, "authenticated");
        client
    }

    /// Connects and redeems a reconnect token; panics unless the server
    /// answers `authenticated`.
    pub async fn connect_with_token(addr: &SocketAddr, token: &str) -> Self {
        let mut client = Self::connect(addr).await;
        client.send_event("token", serde_json::json!(token)).await;
        let (event, _) = client.recv_event().await;
        assert_eq!(event, "authenticated");
        client
    }

    pub async fn send_event(&mut self, event: &str, data: serde_json::Value) {
        let frame = serde_json::json!({ "event": event, "data": data }).to_string();
        self.ws_tx.send(Message::Text(frame)).await.unwrap();
    }

    /// Receives the next event frame, skipping keepalive traffic.
    pub async fn recv_event(&mut self) -> (String, serde_json::Value) {
        loop {
            let msg = tokio::time::timeout(Duration::from_secs(5), self.ws_rx.next())
                .await
                .expect("timeout waiting for frame")
                .expect("stream ended")
                .unwrap();
            match msg {
                Message::Text(raw) => {
                    let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
                    let event = value["event"].as_str().unwrap().to_owned();
                    let data = value.get("data").cloned().unwrap_or(serde_json::Value::Null);
                    return (event, data);
                }
                Message::Ping(_) | Message::Pong(_) => {}
                other => panic!("expected text frame, got {other:?}"),
            }
        }
    }

    /// Receives the next event frame that is not a `rekey`.
    pub async fn recv_push(&mut self) -> (String, serde_json::Value) {
        loop {
            let (event, data) = self.recv_event().await;
            if event != "rekey" {
                return (event, data);
            }
        }
    }

    /// Waits for the server-issued rekey token.
    pub async fn recv_rekey(&mut self) -> String {
        loop {
            let (event, data) = self.recv_event().await;
            if event == "rekey" {
                return data.as_str().unwrap().to_owned();
            }
        }
    }

    /// Asserts the connection is closed without any further event frame.
    pub async fn expect_close(&mut self) {
        let result = tokio::time::timeout(Duration::from_secs(5), async {
            while let Some(msg) = self.ws_rx.next().await {
                match msg {
                    Ok(Message::Close(_)) | Err(_) => return,
                    Ok(Message::Text(raw)) => panic!("expected close, got frame {raw}"),
                    _ => {}
                }
            }
        })
        .await;
        assert!(result.is_ok(), "timeout waiting for close");
    }

    /// Returns the next push event frame (skipping `rekey` traffic), or
    /// `None` if nothing arrives in time.
    pub async fn recv_event_timeout(
        &mut self,
        timeout: Duration,
    ) -> Option<(String, serde_json::Value)> {
        tokio::time::timeout(timeout, self.recv_push()).await.ok()
    }
}

fn make_state(config: ServerConfig) -> Arc<ServerState> {
    Arc::new(ServerState {
        rooms: Rooms::new(),
        store: Arc::new(MemoryRekeyStore::new()),
        stats: Arc::new(Stats::new(config.enable_stats)),
        config,
    })
}

pub async fn start_server() -> (SocketAddr, Arc<ServerState>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    start_with(listener, test_config(addr)).await
}

pub async fn start_server_with_config(
    configure: impl FnOnce(&mut ServerConfig),
) -> (SocketAddr, Arc<ServerState>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let mut config = test_config(addr);
    configure(&mut config);
    start_with(listener, config).await
}

async fn start_with(listener: TcpListener, config: ServerConfig) -> (SocketAddr, Arc<ServerState>) {
    let addr = listener.local_addr().unwrap();
    let state = make_state(config);

    let state_clone = state.clone();
    tokio::spawn(async move {
        if let Err(e) = pushd::run(listener, state_clone).await {
            eprintln!("server error in test: {e}");
        }
    });

    tokio::time::sleep(Duration::from_millis(50)).await;

    (addr, state)
}
