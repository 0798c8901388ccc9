//! Push messages published by the backend and their routing rules.

use serde::Deserialize;
use serde_json::Value;

/// A room-addressed message received from the backend bus.
#[derive(Debug, Clone, Deserialize)]
pub struct PushMessage {
    /// Namespaced message identifier, e.g. `com.example.notification`.
    pub message: String,
    /// Delivery target; absent or `null` broadcasts to every
    /// authenticated session.
    #[serde(default)]
    pub target: Option<Selector>,
    /// Opaque application payload, forwarded to clients untouched.
    #[serde(default)]
    pub payload: Value,
}

/// Structured description of which rooms a push message should reach.
///
/// Validated once at parse time; unknown criteria fail the whole message
/// rather than being probed ad hoc later.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct Selector {
    /// Individual user ids.
    #[serde(default)]
    pub users: Option<Vec<i64>>,
    /// Group ids.
    #[serde(default)]
    pub groups: Option<Vec<i64>>,
    /// Named channels.
    #[serde(default)]
    pub channels: Option<Vec<String>>,
    /// Every signed-in, non-guest session.
    #[serde(default)]
    pub registered: bool,
    /// Every anonymous session.
    #[serde(default)]
    pub guest: bool,
}

/// Validates a namespaced message identifier: at least two non-empty
/// dot-separated segments of ASCII alphanumerics, `-` and `_`.
#[must_use]
pub fn valid_message_name(name: &str) -> bool {
    let mut segments = 0usize;
    for segment in name.split('.') {
        if segment.is_empty()
            || !segment
                .bytes()
                .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
        {
            return false;
        }
        segments += 1;
    }
    segments >= 2
}

/// Resolves a message target to the list of rooms to emit to.
///
/// `None` broadcasts to the `authenticated` room and nothing else; a
/// present selector yields exactly the union of its criteria, one room per
/// criterion. A connection belonging to several resolved rooms receives
/// one copy per room; duplicate delivery per matching criterion is the
/// accepted contract.
#[must_use]
pub fn resolve_rooms(target: Option<&Selector>) -> Vec<String> {
    let Some(target) = target else {
        return vec!["authenticated".to_owned()];
    };
    let mut rooms = Vec::new();
    if let Some(users) = &target.users {
        rooms.extend(users.iter().map(|id| format!("user-{id}")));
    }
    if let Some(groups) = &target.groups {
        rooms.extend(groups.iter().map(|id| format!("group-{id}")));
    }
    if let Some(channels) = &target.channels {
        rooms.extend(channels.iter().map(|c| format!("channel-{c}")));
    }
    if target.registered {
        rooms.push("registered".to_owned());
    }
    if target.guest {
        rooms.push("guest".to_owned());
    }
    rooms
}
