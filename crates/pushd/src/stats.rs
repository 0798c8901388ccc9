use axum::{http::StatusCode, response::Json, routing::get, Router};
use dashmap::DashMap;
use metrics_exporter_prometheus::PrometheusBuilder;
use serde::Serialize;
use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Process-wide connection and message counters.
///
/// Purely observational: the status endpoint serves a read-only snapshot
/// and exposes no mutation capability.
#[derive(Debug)]
pub struct Stats {
    total: AtomicU64,
    current: AtomicU64,
    inbound: AtomicU64,
    boot_time: u64,
    messages: Option<DashMap<String, u64>>,
}

impl Stats {
    /// Creates zeroed counters. Per-message-name counts are kept only
    /// when `enable_messages` is set.
    #[must_use]
    pub fn new(enable_messages: bool) -> Self {
        Self {
            total: AtomicU64::new(0),
            current: AtomicU64::new(0),
            inbound: AtomicU64::new(0),
            boot_time: unix_now_secs(),
            messages: enable_messages.then(DashMap::new),
        }
    }

    /// Registers a newly accepted connection and returns its monotonic id.
    pub fn connection_opened(&self) -> u64 {
        self.current.fetch_add(1, Ordering::Relaxed);
        self.total.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Registers a closed connection.
    pub fn connection_closed(&self) {
        self.current.fetch_sub(1, Ordering::Relaxed);
    }

    /// Current number of open connections.
    #[must_use]
    pub fn current_connections(&self) -> u64 {
        self.current.load(Ordering::Relaxed)
    }

    /// Counts one raw message received from the bus.
    pub fn bus_message(&self) {
        self.inbound.fetch_add(1, Ordering::Relaxed);
    }

    /// Counts one routed push message by name, when enabled.
    pub fn push_message(&self, name: &str) {
        if let Some(messages) = &self.messages {
            *messages.entry(name.to_owned()).or_insert(0) += 1;
        }
    }

    /// Read-only snapshot served by the status endpoint.
    #[must_use]
    pub fn snapshot(&self) -> StatusDocument {
        StatusDocument {
            outbound: OutboundStats {
                total: self.total.load(Ordering::Relaxed),
                current: self.current.load(Ordering::Relaxed),
            },
            inbound: self.inbound.load(Ordering::Relaxed),
            boot_time: self.boot_time,
            messages: self.messages.as_ref().map(|messages| {
                messages
                    .iter()
                    .map(|entry| (entry.key().clone(), *entry.value()))
                    .collect()
            }),
        }
    }
}

/// Connection counters in the status document.
#[derive(Debug, Serialize)]
pub struct OutboundStats {
    /// Connections accepted since boot.
    pub total: u64,
    /// Currently open connections.
    pub current: u64,
}

/// JSON document returned by `/status`.
#[derive(Debug, Serialize)]
pub struct StatusDocument {
    /// Client-connection counters.
    pub outbound: OutboundStats,
    /// Raw messages received from the bus since boot.
    pub inbound: u64,
    /// Unix timestamp (seconds) of process start.
    #[serde(rename = "bootTime")]
    pub boot_time: u64,
    /// Per-message-name delivery counts, present only when enabled.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub messages: Option<BTreeMap<String, u64>>,
}

/// Health check response.
#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
}

/// Serves `/status`, `/health` and Prometheus `/metrics`.
///
/// # Errors
///
/// Returns an error if binding the HTTP listener or installing the
/// Prometheus recorder fails.
pub async fn start_status_server(addr: SocketAddr, stats: Arc<Stats>) -> anyhow::Result<()> {
    let handle = PrometheusBuilder::new().install_recorder()?;

    let app = Router::new()
        .route(
            "/status",
            get(move || {
                let stats = stats.clone();
                async move { Json(stats.snapshot()) }
            }),
        )
        .route("/health", get(health_handler))
        .route(
            "/metrics",
            get(move || {
                let h = handle.clone();
                async move { h.render() }
            }),
        );

    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("status server listening on {}", addr);
    axum::serve(listener, app).await?;
    Ok(())
}

async fn health_handler() -> (StatusCode, Json<HealthResponse>) {
    (StatusCode::OK, Json(HealthResponse { status: "healthy" }))
}

/// Connection count gauges.
pub mod gauges {
    /// Increment the active connections gauge.
    pub fn inc_connections_active() {
        metrics::gauge!("push_connections_active").increment(1.0);
    }

    /// Decrement the active connections gauge.
    pub fn dec_connections_active() {
        metrics::gauge!("push_connections_active").decrement(1.0);
    }
}

/// Event counters.
pub mod counters {
    /// Record an authentication attempt with the given outcome label.
    pub fn auth_total(outcome: &'static str) {
        metrics::counter!("push_auth_total", "outcome" => outcome).increment(1);
    }

    /// Increment the inbound bus-messages counter.
    pub fn bus_messages_total() {
        metrics::counter!("push_bus_messages_total").increment(1);
    }

    /// Increment the dropped-messages counter with the given reason label.
    pub fn messages_dropped_total(reason: &'static str) {
        metrics::counter!("push_messages_dropped_total", "reason" => reason).increment(1);
    }

    /// Record deliveries queued for a routed message.
    pub fn deliveries_total(count: u64) {
        metrics::counter!("push_deliveries_total").increment(count);
    }

    /// Record a minted rekey token.
    pub fn rekeys_total() {
        metrics::counter!("push_rekeys_total").increment(1);
    }
}

fn unix_now_secs() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connection_ids_are_monotonic() {
        let stats = Stats::new(false);
        assert_eq!(stats.connection_opened(), 1);
        assert_eq!(stats.connection_opened(), 2);
        stats.connection_closed();
        // ids never regress even after disconnects
        assert_eq!(stats.connection_opened(), 3);
        assert_eq!(stats.current_connections(), 2);
    }

    #[test]
    fn snapshot_reflects_counters() {
        let stats = Stats::new(true);
        let _ = stats.connection_opened();
        stats.bus_message();
        stats.bus_message();
        stats.push_message("app.notify");
        stats.push_message("app.notify");
        stats.push_message("app.ticker");

        let snap = stats.snapshot();
        assert_eq!(snap.outbound.total, 1);
        assert_eq!(snap.outbound.current, 1);
        assert_eq!(snap.inbound, 2);
        let messages = snap.messages.unwrap();
        assert_eq!(messages["app.notify"], 2);
        assert_eq!(messages["app.ticker"], 1);
    }

    #[test]
    fn message_counters_absent_when_disabled() {
        let stats = Stats::new(false);
        stats.push_message("app.notify");
        let snap = stats.snapshot();
        assert!(snap.messages.is_none());

        let json = serde_json::to_value(&snap).unwrap();
        assert!(json.get("messages").is_none());
        assert!(json.get("bootTime").is_some());
        assert_eq!(json["outbound"]["total"], 0);
    }
}
