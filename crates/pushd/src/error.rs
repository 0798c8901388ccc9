use thiserror::Error;

/// Errors that can occur while serving relay connections.
#[derive(Error, Debug)]
pub enum PushError {
    /// The handshake was rejected: bad signature, stale timestamp,
    /// malformed payload, or an unknown/already-used reconnect token.
    /// Resolved as a disconnect; no detail reaches the client.
    #[error("authentication failed")]
    AuthenticationFailed,
    /// The connection was closed by the remote peer.
    #[error("connection closed")]
    ConnectionClosed,
    /// WebSocket transport error.
    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),
    /// Underlying I/O error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    /// The rekey store or the bus connection failed.
    #[error("store error: {0}")]
    Store(#[from] redis::RedisError),
    /// JSON encoding error on an outbound frame or stored value.
    #[error("encoding error: {0}")]
    Encode(#[from] serde_json::Error),
}
