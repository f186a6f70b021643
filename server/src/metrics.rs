//! Prometheus metrics exporter for the server.

use metrics::describe_counter;
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};
use std::net::SocketAddr;

/// Registers metric descriptions and starts the Prometheus scrape endpoint.
///
/// # Errors
///
/// Returns a [`BuildError`] when the exporter cannot be installed (for
/// example, a recorder is already registered in the same process).
pub fn install(addr: SocketAddr) -> Result<(), BuildError> {
    describe_counter!(
        "trotro_reservations_created_total",
        "Reservations accepted into the ledger"
    );
    describe_counter!(
        "trotro_reservation_conflicts_total",
        "Reserve calls rejected with a seat/segment conflict"
    );
    describe_counter!(
        "trotro_auto_boardings_total",
        "Boardings confirmed by geofence corroboration"
    );
    describe_counter!(
        "trotro_dropoffs_completed_total",
        "Drop-offs completed by stop arrival"
    );
    describe_counter!(
        "trotro_boardings_missed_total",
        "Reservations flagged missed at their boarding stop"
    );
    describe_counter!(
        "trotro_manual_overrides_total",
        "Driver-confirmed boardings and drop-offs"
    );
    describe_counter!(
        "trotro_stale_location_dropped_total",
        "Out-of-order location fixes dropped"
    );
    describe_counter!(
        "trotro_events_published_total",
        "Engine events published to subscribers"
    );

    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(%addr, "metrics exporter listening");
    Ok(())
}
