use crate::error::PushError;
use crate::server::ServerState;
use crate::stats::counters;
use futures_util::StreamExt;
use push_common::message::{resolve_rooms, valid_message_name, PushMessage};
use push_common::protocol::ServerEvent;
use std::sync::Arc;

/// Subscribes to the tenant-scoped bus channel and fans messages out to
/// rooms until the subscription ends.
///
/// # Errors
///
/// Returns an error if the subscription cannot be established; once it
/// is, bad messages are dropped rather than propagated.
pub async fn run(client: redis::Client, state: Arc<ServerState>) -> Result<(), PushError> {
    let mut pubsub = client.get_async_pubsub().await?;
    let channel = state.config.bus_channel();
    pubsub.subscribe(&channel).await?;
    tracing::info!(channel = channel.as_str(), "bus subscription established");

    let mut messages = pubsub.on_message();
    while let Some(msg) = messages.next().await {
        state.stats.bus_message();
        counters::bus_messages_total();
        match msg.get_payload::<String>() {
            Ok(raw) => dispatch(&state, &raw),
            Err(e) => {
                counters::messages_dropped_total("malformed");
                tracing::debug!("undecodable bus payload: {e}");
            }
        }
    }

    Ok(())
}

/// Validates one raw bus message and emits it to the resolved rooms.
///
/// Malformed input is dropped and logged at debug level; the bridge never
/// fails because of a bad message. A message with no target reaches the
/// `authenticated` room, a targeted one exactly the union of its selector
/// criteria, never both.
pub fn dispatch(state: &ServerState, raw: &str) {
    let msg: PushMessage = match serde_json::from_str(raw) {
        Ok(msg) => msg,
        Err(e) => {
            counters::messages_dropped_total("malformed");
            tracing::debug!("dropping malformed bus message: {e}");
            return;
        }
    };
    if !valid_message_name(&msg.message) {
        counters::messages_dropped_total("bad_name");
        tracing::debug!(name = msg.message.as_str(), "dropping message with invalid name");
        return;
    }

    state.stats.push_message(&msg.message);

    let frame = ServerEvent::push(&msg.message, &msg.payload).encode();
    let mut delivered = 0;
    for room in resolve_rooms(msg.target.as_ref()) {
        delivered += state.rooms.emit(&room, &frame);
    }
    counters::deliveries_total(delivered as u64);
    tracing::debug!(name = msg.message.as_str(), delivered, "routed push message");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServerConfig;
    use crate::rooms::{ConnHandle, Rooms};
    use crate::stats::Stats;
    use crate::store::MemoryRekeyStore;
    use tokio::sync::mpsc;

    fn test_state() -> ServerState {
        ServerState {
            rooms: Rooms::new(),
            store: Arc::new(MemoryRekeyStore::new()),
            stats: Arc::new(Stats::new(true)),
            config: ServerConfig {
                listen: "127.0.0.1:0".parse().unwrap(),
                status_addr: "127.0.0.1:0".parse().unwrap(),
                secret: "test-secret".to_owned(),
                tenant: "tenant".to_owned(),
                redis: "redis://localhost".to_owned(),
                enable_stats: true,
                rekey_interval: 60,
                auth_timeout: 5,
                ping_interval: 30,
                idle_timeout: 120,
                max_conns: 100,
            },
        }
    }

    fn join(state: &ServerState, conn_id: u64, rooms: &[&str]) -> mpsc::Receiver<String> {
        let (tx, rx) = mpsc::channel(16);
        for room in rooms {
            state.rooms.join(room, conn_id, ConnHandle { tx: tx.clone() });
        }
        rx
    }

    #[test]
    fn broadcast_reaches_authenticated_room() {
        let state = test_state();
        let mut rx = join(&state, 1, &["authenticated", "user-42"]);

        dispatch(
            &state,
            r#"{"message":"app.notify","target":null,"payload":{"text":"hi"}}"#,
        );

        let frame = rx.try_recv().unwrap();
        assert_eq!(frame, r#"{"event":"app.notify","data":{"text":"hi"}}"#);
        // broadcast hits the authenticated room only, not user-42 as well
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn targeted_message_skips_other_users() {
        let state = test_state();
        let mut rx42 = join(&state, 1, &["authenticated", "user-42"]);
        let mut rx7 = join(&state, 2, &["authenticated", "user-7"]);

        dispatch(
            &state,
            r#"{"message":"app.notify","target":{"users":[42]},"payload":{"text":"hi"}}"#,
        );

        assert_eq!(
            rx42.try_recv().unwrap(),
            r#"{"event":"app.notify","data":{"text":"hi"}}"#
        );
        assert!(rx7.try_recv().is_err());
    }

    #[test]
    fn connection_matching_multiple_criteria_receives_per_criterion() {
        let state = test_state();
        let mut rx = join(&state, 1, &["authenticated", "user-42", "group-1"]);

        dispatch(
            &state,
            r#"{"message":"app.notify","target":{"users":[42],"groups":[1]},"payload":1}"#,
        );

        assert!(rx.try_recv().is_ok());
        assert!(rx.try_recv().is_ok());
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn malformed_json_is_dropped() {
        let state = test_state();
        let mut rx = join(&state, 1, &["authenticated"]);

        dispatch(&state, "{not json");

        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn invalid_message_name_is_dropped() {
        let state = test_state();
        let mut rx = join(&state, 1, &["authenticated"]);

        dispatch(&state, r#"{"message":"singlesegment","target":null}"#);
        dispatch(&state, r#"{"message":"a..b","target":null}"#);

        assert!(rx.try_recv().is_err());
        // dropped messages are not counted by name either
        assert!(state.stats.snapshot().messages.unwrap().is_empty());
    }

    #[test]
    fn guest_and_registered_targets_are_disjoint() {
        let state = test_state();
        let mut guest = join(&state, 1, &["authenticated", "guest", "user-0"]);
        let mut registered = join(&state, 2, &["authenticated", "registered", "user-5"]);

        dispatch(&state, r#"{"message":"app.notify","target":{"registered":true}}"#);
        assert!(registered.try_recv().is_ok());
        assert!(guest.try_recv().is_err());

        dispatch(&state, r#"{"message":"app.notify","target":{"guest":true}}"#);
        assert!(guest.try_recv().is_ok());
        assert!(registered.try_recv().is_err());
    }

    #[test]
    fn per_message_counters_track_routed_names() {
        let state = test_state();
        dispatch(&state, r#"{"message":"app.notify","target":null}"#);
        dispatch(&state, r#"{"message":"app.notify","target":null}"#);
        dispatch(&state, r#"{"message":"app.ticker","target":null}"#);

        let messages = state.stats.snapshot().messages.unwrap();
        assert_eq!(messages["app.notify"], 2);
        assert_eq!(messages["app.ticker"], 1);
    }
}
