use crate::error::PushError;
use crate::server::ServerState;
use push_common::handshake::{unix_now_ms, HandshakePayload, RoomSet};
use push_common::protocol::ClientEvent;
use push_common::signature;

/// Authenticates a connection's first event, returning its room set.
///
/// Either path fails into [`PushError::AuthenticationFailed`] without any
/// detail for the client; a probing client only ever observes a
/// disconnect.
pub async fn authenticate(event: ClientEvent, state: &ServerState) -> Result<RoomSet, PushError> {
    match event {
        ClientEvent::ConnectData(signed) => {
            credential_rooms(&signed, state.config.secret.as_bytes(), unix_now_ms())
                .ok_or(PushError::AuthenticationFailed)
        }
        ClientEvent::Token(token) => {
            // The lookup consumes the token no matter what happens next;
            // a token is dead after its first redemption attempt.
            let stored = state.store.take(&token).await.map_err(|e| {
                tracing::debug!("token lookup failed: {e}");
                PushError::AuthenticationFailed
            })?;
            let rooms_json = stored.ok_or(PushError::AuthenticationFailed)?;
            // The stored room set is adopted verbatim; nothing is
            // recomputed from client input on this path.
            serde_json::from_str(&rooms_json).map_err(|_| PushError::AuthenticationFailed)
        }
    }
}

/// Verifies the signed handshake string and derives the room set.
fn credential_rooms(signed: &str, secret: &[u8], now_ms: u64) -> Option<RoomSet> {
    let raw = signature::verify(signed, secret)?;
    let payload = HandshakePayload::parse(&raw)?;
    if !payload.is_fresh(now_ms) {
        return None;
    }
    Some(payload.room_set())
}
