//! Prometheus metrics for the rental workflow.
//!
//! Recording goes through the `metrics` facade and is a no-op until a
//! recorder is installed, so tests and library users pay nothing unless
//! the server calls [`install_prometheus`].

use metrics::{counter, describe_counter, describe_histogram, histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::time::Duration;
use thiserror::Error;
use vidly_core::error::RentalError;
use vidly_core::types::{RentalKind, TransactionState};

/// Errors from metrics setup.
#[derive(Error, Debug)]
pub enum MetricsError {
    /// Failed to build metrics exporter
    #[error("Failed to build metrics exporter: {0}")]
    Build(String),
    /// Failed to install metrics exporter
    #[error("Failed to install metrics exporter: {0}")]
    Install(String),
}

/// Install the Prometheus recorder and describe every metric.
///
/// The returned handle renders the scrape body; the server mounts it on
/// `GET /metrics`.
///
/// # Errors
///
/// Returns error if the exporter cannot be built or a recorder is already
/// installed in this process.
pub fn install_prometheus() -> Result<PrometheusHandle, MetricsError> {
    let handle = PrometheusBuilder::new()
        .set_buckets_for_metric(
            Matcher::Suffix("duration_seconds".to_string()),
            &[0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5],
        )
        .map_err(|e| MetricsError::Build(e.to_string()))?
        .install_recorder()
        .map_err(|e| MetricsError::Install(e.to_string()))?;

    register_metrics();
    tracing::info!("Prometheus recorder installed");
    Ok(handle)
}

fn register_metrics() {
    describe_counter!(
        "vidly_rental_requests_total",
        "Rental requests by intent and outcome"
    );
    describe_histogram!(
        "vidly_rental_duration_seconds",
        "Time taken to process a rental request"
    );
    describe_counter!(
        "vidly_transactions_total",
        "Transaction records reaching a terminal state"
    );
    describe_counter!(
        "vidly_rollbacks_total",
        "Compensating rollbacks by outcome"
    );
}

/// Rental workflow metrics recorder.
pub struct RentalMetrics;

impl RentalMetrics {
    /// Record the outcome of one `submit_rental_request`.
    pub fn record_request(intent: RentalKind, result: Result<(), &RentalError>, elapsed: Duration) {
        let outcome = match result {
            Ok(()) => "success",
            Err(err) if err.is_precondition() => "rejected",
            Err(_) => "failed",
        };
        counter!(
            "vidly_rental_requests_total",
            "intent" => intent.as_str(),
            "outcome" => outcome
        )
        .increment(1);
        histogram!("vidly_rental_duration_seconds", "intent" => intent.as_str())
            .record(elapsed.as_secs_f64());
    }

    /// Record a transaction reaching `done` or `canceled`.
    pub fn record_transaction(state: TransactionState) {
        if state.is_terminal() {
            counter!("vidly_transactions_total", "state" => state.as_str()).increment(1);
        }
    }

    /// Record a compensating rollback.
    pub fn record_rollback(succeeded: bool) {
        let outcome = if succeeded { "restored" } else { "failed" };
        counter!("vidly_rollbacks_total", "outcome" => outcome).increment(1);
    }
}
