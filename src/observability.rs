use std::net::SocketAddr;

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

use crate::tracker::CategoryOccupancy;

// ── RED metrics (request-driven) ────────────────────────────────

/// Counter: total queries executed. Labels: command, status.
pub const QUERIES_TOTAL: &str = "devpool_queries_total";

/// Histogram: query latency in seconds. Labels: command.
pub const QUERY_DURATION_SECONDS: &str = "devpool_query_duration_seconds";

// ── USE metrics (resource utilization) ──────────────────────────

/// Gauge: active TCP connections.
pub const CONNECTIONS_ACTIVE: &str = "devpool_connections_active";

/// Counter: total connections accepted.
pub const CONNECTIONS_TOTAL: &str = "devpool_connections_total";

/// Counter: connections rejected due to limit.
pub const CONNECTIONS_REJECTED_TOTAL: &str = "devpool_connections_rejected_total";

// ── Snapshot and pool state ─────────────────────────────────────

/// Counter: snapshot loads that failed (unreadable or malformed export).
pub const SNAPSHOT_LOAD_FAILURES_TOTAL: &str = "devpool_snapshot_load_failures_total";

/// Counter: participating records without a usable start.
pub const MALFORMED_RECORDS_TOTAL: &str = "devpool_malformed_records_total";

/// Counter: background recomputations completed.
pub const REFRESHES_TOTAL: &str = "devpool_refreshes_total";

/// Gauge: free units per category. Labels: category.
pub const UNITS_FREE: &str = "devpool_units_free";

/// Gauge: units worn by a patient right now. Labels: category.
pub const UNITS_ACTIVE: &str = "devpool_units_active";

/// Gauge: scheduled fittings not yet started. Labels: category.
pub const UNITS_PENDING: &str = "devpool_units_pending";

/// Gauge: next-available instant in unix seconds, or -1 when unknown. Labels: category.
pub const NEXT_AVAILABLE_SECONDS: &str = "devpool_next_available_seconds";

/// Install Prometheus metrics exporter on the given port. No-op if port is None.
pub fn init(port: Option<u16>) -> Result<(), BuildError> {
    let Some(port) = port else { return Ok(()) };
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!("metrics endpoint: http://0.0.0.0:{port}/metrics");
    Ok(())
}

/// Publish per-category pool gauges.
pub fn record_occupancy(occupancy: &[CategoryOccupancy]) {
    for entry in occupancy {
        let category = entry.category.name.clone();
        let s = &entry.summary;
        metrics::gauge!(UNITS_FREE, "category" => category.clone()).set(s.free_count as f64);
        metrics::gauge!(UNITS_ACTIVE, "category" => category.clone()).set(s.active_count as f64);
        metrics::gauge!(UNITS_PENDING, "category" => category.clone()).set(s.pending_count as f64);
        let next = s
            .next_available
            .instant()
            .map_or(-1.0, |ms| ms as f64 / 1000.0);
        metrics::gauge!(NEXT_AVAILABLE_SECONDS, "category" => category).set(next);
    }
}
