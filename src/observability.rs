use std::net::SocketAddr;

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

// ── RED metrics (request-driven) ────────────────────────────────

/// Counter: reservation attempts. Labels: mode (`resource`, `any`), outcome.
pub const ALLOCATIONS_TOTAL: &str = "allotment_allocations_total";

/// Histogram: reservation latency in seconds, lock wait included. Labels: mode.
pub const ALLOCATION_DURATION_SECONDS: &str = "allotment_allocation_duration_seconds";

/// Counter: resources tried by "any resource" reservations.
pub const CANDIDATES_SCANNED_TOTAL: &str = "allotment_candidates_scanned_total";

/// Counter: allocations removed by delete.
pub const DELETES_TOTAL: &str = "allotment_deletes_total";

// ── USE metrics (resource utilization) ──────────────────────────

/// Gauge: resources known to the durable store.
pub const RESOURCES_TOTAL: &str = "allotment_resources_total";

/// Histogram: WAL group-commit flush duration in seconds.
pub const WAL_FLUSH_DURATION_SECONDS: &str = "allotment_wal_flush_duration_seconds";

/// Histogram: WAL group-commit batch size (events per flush).
pub const WAL_FLUSH_BATCH_SIZE: &str = "allotment_wal_flush_batch_size";

/// Install the global fmt subscriber, honouring `RUST_LOG`. Later calls are no-ops.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

/// Install Prometheus metrics exporter on the given port. No-op if port is None.
pub fn init_metrics(port: Option<u16>) -> Result<(), BuildError> {
    let Some(port) = port else { return Ok(()) };
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!("metrics endpoint: http://0.0.0.0:{port}/metrics");
    Ok(())
}

/// Short label for a reservation failure.
pub fn outcome_label(err: &crate::engine::EngineError) -> &'static str {
    use crate::engine::EngineError::*;
    match err {
        NotFound(_) => "not_found",
        Conflict(_) => "conflict",
        NoResourceAvailable(_) => "no_resource",
        Validation(_) | LimitExceeded(_) => "invalid",
        Store(_) => "store_error",
        StoreTimeout(_) | LockTimeout(_) => "timeout",
    }
}
