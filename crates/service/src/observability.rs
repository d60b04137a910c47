use once_cell::sync::Lazy;
use prometheus::{register_int_counter, register_int_counter_vec, Encoder, IntCounter, IntCounterVec, TextEncoder};

// Prometheus metrics (default registry)
pub static OPERATIONS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "book_catalog_operations_total",
        "Catalog operations by kind and outcome",
        &["op", "outcome"]
    )
    .expect("register operations_total")
});

pub static DEGRADED_SCANS_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "book_catalog_degraded_scans_total",
        "Scans that failed and were reported as empty"
    )
    .expect("register degraded_scans_total")
});

pub static BLOB_MIRROR_FAILURES_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "book_catalog_blob_mirror_failures_total",
        "Blob writes or deletes that failed after the index was updated"
    )
    .expect("register blob_mirror_failures_total")
});

pub static DIVERGENCE_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "book_catalog_divergence_total",
        "Records found out of sync between the index and the blob mirror"
    )
    .expect("register divergence_total")
});

pub fn record_op(op: &str, ok: bool) {
    OPERATIONS_TOTAL
        .with_label_values(&[op, if ok { "ok" } else { "error" }])
        .inc();
}

/// Render the default registry in the Prometheus text format.
pub fn encode_metrics() -> Result<String, String> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|e| format!("metrics encode error: {e}"))?;
    String::from_utf8(buffer).map_err(|e| format!("metrics encode error: {e}"))
}
