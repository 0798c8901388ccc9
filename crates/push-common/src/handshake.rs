//! Connect-handshake payloads and room membership derivation.

use serde::Deserialize;
use std::collections::BTreeSet;

/// Maximum age of a handshake timestamp, in milliseconds.
pub const HANDSHAKE_MAX_AGE_MS: u64 = 15_000;

/// Reserved user id for anonymous guests.
pub const GUEST_USER_ID: i64 = 0;

/// The set of rooms an authenticated connection belongs to.
///
/// Fixed for the life of a session; replaced wholesale only when a session
/// is resumed through a reconnect token.
pub type RoomSet = BTreeSet<String>;

/// Authentication payload carried inside the signed `connectData` string.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct HandshakePayload {
    /// Numeric user id; [`GUEST_USER_ID`] marks an anonymous session.
    #[serde(rename = "userID")]
    pub user_id: i64,
    /// Unix timestamp (seconds) at which the payload was signed.
    pub timestamp: u64,
    /// Group ids the user belongs to.
    pub groups: Vec<i64>,
    /// Named channels the user subscribed to.
    pub channels: Vec<String>,
}

impl HandshakePayload {
    /// Parses a payload from raw JSON bytes. Absent or mistyped fields
    /// fail the parse.
    #[must_use]
    pub fn parse(raw: &[u8]) -> Option<Self> {
        serde_json::from_slice(raw).ok()
    }

    /// Returns `true` if the timestamp is no older than
    /// [`HANDSHAKE_MAX_AGE_MS`] relative to `now_ms`. Only staleness is
    /// checked; timestamps from the future pass.
    #[must_use]
    pub fn is_fresh(&self, now_ms: u64) -> bool {
        now_ms.saturating_sub(self.timestamp.saturating_mul(1000)) <= HANDSHAKE_MAX_AGE_MS
    }

    /// Derives the connection's room membership.
    ///
    /// Every session joins `authenticated` and `user-{id}`. Guests join
    /// `guest`, everyone else `registered`, never both. One room per
    /// group and per channel on top.
    #[must_use]
    pub fn room_set(&self) -> RoomSet {
        let mut rooms = RoomSet::new();
        rooms.insert("authenticated".to_owned());
        rooms.insert(format!("user-{}", self.user_id));
        if self.user_id == GUEST_USER_ID {
            rooms.insert("guest".to_owned());
        } else {
            rooms.insert("registered".to_owned());
        }
        for group in &self.groups {
            rooms.insert(format!("group-{group}"));
        }
        for channel in &self.channels {
            rooms.insert(format!("channel-{channel}"));
        }
        rooms
    }
}

/// Returns the current Unix time in milliseconds.
///
/// Returns 0 if the system clock is before the Unix epoch.
#[must_use]
pub fn unix_now_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
        .unwrap_or(0)
}
