//! Prometheus metrics for the persistence engine.

use once_cell::sync::Lazy;
use prometheus::{register_counter_vec, register_histogram_vec, CounterVec, HistogramVec};

/// Commit counter by outcome (ok, isolation_violation, concurrency_conflict, ...).
pub static COMMITS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "persistence_commits_total",
        "Total number of unit-of-work commits",
        &["status"]
    )
    .expect("Failed to register persistence_commits_total")
});

/// Rejected writes by entity type (no tenant label to avoid cardinality explosion).
pub static ISOLATION_VIOLATIONS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "persistence_isolation_violations_total",
        "Writes rejected for crossing the caller's branch/tenant scope",
        &["entity_type"]
    )
    .expect("Failed to register persistence_isolation_violations_total")
});

/// Audit entries emitted by action.
pub static AUDIT_ENTRIES_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "persistence_audit_entries_total",
        "Audit entries emitted after successful commits",
        &["action"]
    )
    .expect("Failed to register persistence_audit_entries_total")
});

/// Privileged (unscoped) reads by entity type.
pub static PRIVILEGED_READS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "persistence_privileged_reads_total",
        "Reads that bypassed the scope predicate",
        &["entity_type"]
    )
    .expect("Failed to register persistence_privileged_reads_total")
});

/// Operation duration histogram.
pub static OPERATION_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "persistence_operation_duration_seconds",
        "Persistence operation duration in seconds",
        &["operation"],
        vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0]
    )
    .expect("Failed to register persistence_operation_duration_seconds")
});

/// Initialize all metrics (forces lazy initialization).
pub fn init_metrics() {
    Lazy::force(&COMMITS_TOTAL);
    Lazy::force(&ISOLATION_VIOLATIONS_TOTAL);
    Lazy::force(&AUDIT_ENTRIES_TOTAL);
    Lazy::force(&PRIVILEGED_READS_TOTAL);
    Lazy::force(&OPERATION_DURATION);
}
