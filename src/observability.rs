use std::net::SocketAddr;

// ── RED metrics (request-driven) ────────────────────────────────

/// Counter: schedule mutations. Labels: operation, outcome (accepted, rejected, error).
pub const MUTATIONS_TOTAL: &str = "jadwal_mutations_total";

/// Counter: rejected mutations. Labels: kind (capacity, conflict, not_found, invalid, ...).
pub const REJECTIONS_TOTAL: &str = "jadwal_rejections_total";

/// Histogram: lock + validate + persist latency in seconds. Labels: operation.
pub const VALIDATION_DURATION_SECONDS: &str = "jadwal_validation_duration_seconds";

// ── USE metrics (resource utilization) ──────────────────────────

/// Gauge: schedule entries currently stored.
pub const ENTRIES_ACTIVE: &str = "jadwal_entries_active";

/// Histogram: WAL group-commit flush duration in seconds.
pub const WAL_FLUSH_DURATION_SECONDS: &str = "jadwal_wal_flush_duration_seconds";

/// Histogram: WAL group-commit batch size (events per flush).
pub const WAL_FLUSH_BATCH_SIZE: &str = "jadwal_wal_flush_batch_size";

/// Install Prometheus metrics exporter on the given port. No-op if port is None.
pub fn init(port: Option<u16>) -> Result<(), metrics_exporter_prometheus::BuildError> {
    let Some(port) = port else { return Ok(()) };
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;
    tracing::info!("metrics endpoint: http://0.0.0.0:{port}/metrics");
    Ok(())
}

/// Record one finished mutation.
pub fn record_mutation<T>(operation: &'static str, result: &Result<T, crate::engine::EngineError>, started: std::time::Instant) {
    let outcome = match result {
        Ok(_) => "accepted",
        Err(e) if e.is_infrastructure() => "error",
        Err(_) => "rejected",
    };
    metrics::counter!(MUTATIONS_TOTAL, "operation" => operation, "outcome" => outcome).increment(1);
    metrics::histogram!(VALIDATION_DURATION_SECONDS, "operation" => operation)
        .record(started.elapsed().as_secs_f64());
    match result {
        Err(e) if e.is_infrastructure() => {
            tracing::warn!(operation, error = %e, "mutation failed");
        }
        Err(e) => {
            metrics::counter!(REJECTIONS_TOTAL, "kind" => e.label()).increment(1);
            tracing::debug!(operation, kind = e.label(), reason = %e, "mutation rejected");
        }
        Ok(_) => {}
    }
}
