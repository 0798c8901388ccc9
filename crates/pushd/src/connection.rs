use crate::auth::authenticate;
use crate::error::PushError;
use crate::rekey::mint_token;
use crate::rooms::ConnHandle;
use crate::server::ServerState;
use crate::stats::{counters, gauges};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use push_common::handshake::RoomSet;
use push_common::protocol::{ClientEvent, ServerEvent};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::{interval, timeout, Duration};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;

type WsSink = SplitSink<WebSocketStream<TcpStream>, Message>;
type WsRecv = SplitStream<WebSocketStream<TcpStream>>;

/// Frames queued per connection before slow clients start losing messages.
const DELIVERY_QUEUE_DEPTH: usize = 256;

/// Decrements the live-connection counters when the connection task ends,
/// whatever the exit path.
struct ConnGuard {
    state: Arc<ServerState>,
}

impl Drop for ConnGuard {
    fn drop(&mut self) {
        self.state.stats.connection_closed();
        gauges::dec_connections_active();
    }
}

/// Drives one client connection from accept to teardown.
///
/// The connection starts Pending; its first frame must authenticate it
/// within the configured timeout. A rejected handshake closes the
/// transport with no diagnostic payload. Once the session function
/// returns, the connection is Closed: the rekey schedule died with the
/// session loop and room membership is released before anything else can
/// emit to it.
pub async fn handle_connection(
    stream: TcpStream,
    peer_addr: SocketAddr,
    state: Arc<ServerState>,
) -> Result<(), PushError> {
    let ws_stream = tokio_tungstenite::accept_async(stream).await?;

    let conn_id = state.stats.connection_opened();
    gauges::inc_connections_active();
    let _guard = ConnGuard {
        state: Arc::clone(&state),
    };
    tracing::debug!(conn_id, peer = %peer_addr, "client connected");

    let (mut ws_tx, mut ws_rx) = ws_stream.split();

    let auth_timeout = Duration::from_secs(state.config.auth_timeout);
    let rooms = match timeout(auth_timeout, await_auth(&mut ws_rx, &state)).await {
        Ok(Ok(rooms)) => {
            counters::auth_total("accepted");
            rooms
        }
        Ok(Err(e)) => {
            counters::auth_total("rejected");
            tracing::debug!(conn_id, "handshake rejected: {e}");
            let _ = ws_tx.close().await;
            return Err(e);
        }
        Err(_) => {
            counters::auth_total("timeout");
            tracing::debug!(conn_id, "handshake timed out");
            let _ = ws_tx.close().await;
            return Err(PushError::AuthenticationFailed);
        }
    };

    let (deliver_tx, mut deliver_rx) = mpsc::channel::<String>(DELIVERY_QUEUE_DEPTH);
    let handle = ConnHandle { tx: deliver_tx };
    for room in &rooms {
        state.rooms.join(room, conn_id, handle.clone());
    }

    ws_tx
        .send(Message::Text(ServerEvent::authenticated().encode()))
        .await?;
    tracing::debug!(conn_id, rooms = rooms.len(), "client authenticated");

    let result = run_session(&mut ws_tx, &mut ws_rx, &mut deliver_rx, &state, &rooms).await;

    state.rooms.leave(&rooms, conn_id);
    tracing::debug!(conn_id, "client disconnected");
    result
}

/// Reads the connection's first frame and runs it through the auth gate.
async fn await_auth(ws_rx: &mut WsRecv, state: &ServerState) -> Result<RoomSet, PushError> {
    loop {
        let msg = ws_rx.next().await.ok_or(PushError::ConnectionClosed)??;
        match msg {
            Message::Text(raw) => {
                let event = ClientEvent::parse(&raw).ok_or(PushError::AuthenticationFailed)?;
                return authenticate(event, state).await;
            }
            // keepalive traffic before the handshake is tolerated
            Message::Ping(_) | Message::Pong(_) => {}
            Message::Close(_) => return Err(PushError::ConnectionClosed),
            _ => return Err(PushError::AuthenticationFailed),
        }
    }
}

/// Drives an authenticated session: inbound frames, room deliveries, the
/// rekey schedule, and keepalive pings.
///
/// The rekey interval lives inside this loop so returning from it cancels
/// the schedule synchronously; a store write already in flight completes
/// inside its select arm and nothing can act on the result afterwards.
async fn run_session(
    ws_tx: &mut WsSink,
    ws_rx: &mut WsRecv,
    deliver_rx: &mut mpsc::Receiver<String>,
    state: &ServerState,
    rooms: &RoomSet,
) -> Result<(), PushError> {
    // first tick fires immediately: a fresh token right after the
    // handshake, then one per period
    let mut rekey_schedule = interval(state.config.rekey_period());
    let mut ping_schedule = interval(Duration::from_secs(state.config.ping_interval));
    let idle_timeout = Duration::from_secs(state.config.idle_timeout);
    let mut last_activity = Instant::now();

    loop {
        tokio::select! {
            msg = ws_rx.next() => {
                last_activity = Instant::now();
                match msg {
                    Some(Ok(Message::Text(_))) => {
                        // the handshake already happened; nothing else a
                        // client sends is acted upon
                        tracing::debug!("ignoring client frame after authentication");
                    }
                    Some(Ok(Message::Ping(data))) => {
                        if let Err(e) = ws_tx.send(Message::Pong(data)).await {
                            tracing::debug!("failed to send pong: {e}");
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => return Ok(()),
                    Some(Err(e)) => return Err(PushError::WebSocket(e)),
                    _ => {}
                }
            }
            Some(frame) = deliver_rx.recv() => {
                ws_tx.send(Message::Text(frame)).await?;
            }
            _ = rekey_schedule.tick() => {
                match mint_token(state.store.as_ref(), rooms, state.config.token_ttl()).await {
                    Ok(token) => {
                        counters::rekeys_total();
                        ws_tx.send(Message::Text(ServerEvent::rekey(&token).encode())).await?;
                    }
                    Err(e) => {
                        // the previous token stays valid until its TTL
                        // lapses; skip this cycle
                        tracing::warn!("rekey minting failed: {e}");
                    }
                }
            }
            _ = ping_schedule.tick() => {
                if last_activity.elapsed() >= idle_timeout {
                    tracing::debug!("idle timeout reached, closing connection");
                    return Ok(());
                }
                if let Err(e) = ws_tx.send(Message::Ping(Vec::new())).await {
                    tracing::debug!("failed to send ping: {e}");
                }
            }
        }
    }
}
