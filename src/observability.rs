use std::net::SocketAddr;

// ── RED metrics (request-driven) ────────────────────────────────

/// Counter: soft locks granted.
pub const LOCKS_CREATED_TOTAL: &str = "seatlock_locks_created_total";

/// Counter: soft locks cancelled by their holder.
pub const LOCKS_CANCELLED_TOTAL: &str = "seatlock_locks_cancelled_total";

/// Counter: soft locks promoted into bookings.
pub const LOCKS_CONVERTED_TOTAL: &str = "seatlock_locks_converted_total";

/// Counter: bookings written.
pub const BOOKINGS_CREATED_TOTAL: &str = "seatlock_bookings_created_total";

/// Counter: admissions rejected on a full (or missing) counter.
pub const ADMISSIONS_REJECTED_TOTAL: &str = "seatlock_admissions_rejected_total";

// ── USE metrics (background work) ───────────────────────────────

/// Counter: seats reclaimed from expired locks by the sweep.
pub const LOCKS_EXPIRED_TOTAL: &str = "seatlock_locks_expired_total";

/// Counter: capacity counters lazily initialized from the ledger.
pub const COUNTERS_INITIALIZED_TOTAL: &str = "seatlock_counters_initialized_total";

/// Histogram: sweep iteration duration in seconds.
pub const SWEEP_DURATION_SECONDS: &str = "seatlock_sweep_duration_seconds";

/// Histogram: ledger group-commit flush duration in seconds.
pub const LEDGER_FLUSH_DURATION_SECONDS: &str = "seatlock_ledger_flush_duration_seconds";

/// Histogram: ledger group-commit batch size (events per flush).
pub const LEDGER_FLUSH_BATCH_SIZE: &str = "seatlock_ledger_flush_batch_size";

/// Install the Prometheus metrics exporter on the given port. No-op if port is None.
pub fn init(port: Option<u16>) {
    let Some(port) = port else { return };
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .expect("failed to install Prometheus metrics exporter");
    tracing::info!("metrics endpoint: http://0.0.0.0:{port}/metrics");
}

/// Install the default fmt tracing subscriber for the embedding service.
pub fn init_tracing() {
    tracing_subscriber::fmt::init();
}
