//! Prometheus metrics recording and endpoint.

use std::sync::OnceLock;

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use tracing::warn;

static HANDLE: OnceLock<Option<PrometheusHandle>> = OnceLock::new();

/// Install the Prometheus recorder on first use and return its handle.
///
/// Returns `None` when another global recorder is already installed.
pub fn prometheus_handle() -> Option<PrometheusHandle> {
    HANDLE
        .get_or_init(|| match PrometheusBuilder::new().install_recorder() {
            Ok(handle) => Some(handle),
            Err(e) => {
                warn!(%e, "Failed to install Prometheus recorder");
                None
            }
        })
        .clone()
}

/// Record a new WebSocket connection.
pub fn record_ws_connect() {
    metrics::gauge!("ws_connections_active").increment(1.0);
}

/// Record a WebSocket disconnection.
pub fn record_ws_disconnect() {
    metrics::gauge!("ws_connections_active").decrement(1.0);
}

pub fn record_room_created() {
    metrics::gauge!("rooms_active").increment(1.0);
}

pub fn record_room_destroyed() {
    metrics::gauge!("rooms_active").decrement(1.0);
}

/// Record one fan-out with its delivered and dropped peer counts.
pub fn record_broadcast(delivered: usize, dropped: usize) {
    metrics::counter!("broadcast_messages_total").increment(delivered as u64);
    metrics::counter!("broadcast_dropped_peers_total").increment(dropped as u64);
}

pub fn record_draw_event() {
    metrics::counter!("draw_events_total").increment(1);
}

pub fn record_malformed_frame() {
    metrics::counter!("malformed_frames_total").increment(1);
}
