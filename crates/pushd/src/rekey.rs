use crate::error::PushError;
use crate::store::RekeyStore;
use push_common::handshake::RoomSet;
use rand::rngs::OsRng;
use rand::Rng;
use std::time::Duration;

/// Number of random bytes in a reconnect token.
const TOKEN_LEN: usize = 32;

/// Mints a fresh single-use token, stores the room set under it, and
/// returns the hex-encoded token.
///
/// Earlier tokens are not revoked; they lapse with their own TTL, so a
/// client racing a rekey boundary can still resume with the token it
/// last saw.
pub async fn mint_token(
    store: &dyn RekeyStore,
    rooms: &RoomSet,
    ttl: Duration,
) -> Result<String, PushError> {
    let mut bytes = [0u8; TOKEN_LEN];
    OsRng.fill(&mut bytes);
    let token = hex::encode(bytes);
    let rooms_json = serde_json::to_string(rooms)?;
    store.put(&token, &rooms_json, ttl).await?;
    Ok(token)
}
