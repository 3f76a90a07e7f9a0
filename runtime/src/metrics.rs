//! Prometheus metrics for the lending service.
//!
//! # Exported Metrics
//!
//! ## Counters
//! - `library_borrow_requests_total{outcome}` - Borrow attempts by outcome
//!   (`created` or a refusal code such as `out_of_stock`)
//! - `library_request_decisions_total{decision}` - Approvals and rejections
//! - `library_returns_total` - Loans returned
//! - `library_penalty_accrual_runs_total` - Accrual ticks completed
//! - `library_penalty_accrual_failures_total` - Loans whose accrual failed
//!
//! ## Gauges
//! - `library_overdue_loans` - Overdue loans seen by the last tick
//!
//! ## Histograms
//! - `library_penalty_accrual_duration_seconds` - Wall time of one tick
//!
//! # Example
//!
//! ```rust,no_run
//! use libris_runtime::metrics::MetricsServer;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let mut server = MetricsServer::new("0.0.0.0:8080".parse()?);
//! server.start()?;
//!
//! // The HTTP layer serves `server.render()` at /metrics
//! # Ok(())
//! # }
//! ```

use libris_core::AccrualReport;
use metrics::{describe_counter, describe_gauge, describe_histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::net::SocketAddr;
use std::time::Duration;
use thiserror::Error;

// Re-export metrics macros for use in other modules
pub use metrics::{counter, gauge, histogram};

/// Errors from metrics operations.
#[derive(Error, Debug)]
pub enum MetricsError {
    /// Failed to build metrics exporter
    #[error("Failed to build metrics exporter: {0}")]
    Build(String),
    /// Failed to install metrics exporter
    #[error("Failed to install metrics exporter: {0}")]
    Install(String),
}

/// Prometheus recorder whose output the HTTP layer exposes.
pub struct MetricsServer {
    addr: SocketAddr,
    handle: Option<PrometheusHandle>,
}

impl MetricsServer {
    /// Create a new metrics server for the given public address.
    #[must_use]
    pub const fn new(addr: SocketAddr) -> Self {
        Self { addr, handle: None }
    }

    /// Register descriptions and install the Prometheus recorder.
    ///
    /// # Errors
    ///
    /// Returns error if the exporter cannot be built or installed.
    ///
    /// # Note
    ///
    /// A recorder already installed by an earlier call (e.g., in tests) is not
    /// an error; `handle()` then stays `None`.
    pub fn start(&mut self) -> Result<(), MetricsError> {
        register_metrics();

        let builder = PrometheusBuilder::new()
            .set_buckets_for_metric(
                Matcher::Suffix("duration_seconds".to_string()),
                &[0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0],
            )
            .map_err(|e| MetricsError::Build(e.to_string()))?;

        match builder.install_recorder() {
            Ok(handle) => {
                self.handle = Some(handle);
                tracing::info!(
                    addr = %self.addr,
                    "Metrics recorder installed - available at http://{}/metrics",
                    self.addr
                );
                Ok(())
            }
            Err(e) => {
                let err_msg = e.to_string();
                if err_msg.contains("already initialized") {
                    tracing::warn!("Metrics recorder already initialized, skipping re-initialization");
                    Ok(())
                } else {
                    Err(MetricsError::Install(err_msg))
                }
            }
        }
    }

    /// Get the metrics handle for rendering.
    #[must_use]
    pub const fn handle(&self) -> Option<&PrometheusHandle> {
        self.handle.as_ref()
    }

    /// Render current metrics in Prometheus format.
    ///
    /// Returns `None` if the recorder was not installed by this instance.
    #[must_use]
    pub fn render(&self) -> Option<String> {
        self.handle.as_ref().map(PrometheusHandle::render)
    }
}

/// Register all metric descriptions.
fn register_metrics() {
    describe_counter!(
        "library_borrow_requests_total",
        "Borrow attempts by outcome (created or the refusal code)"
    );
    describe_counter!(
        "library_request_decisions_total",
        "Borrow request decisions by kind (approved, rejected)"
    );
    describe_counter!("library_returns_total", "Loans returned");

    describe_counter!(
        "library_penalty_accrual_runs_total",
        "Penalty accrual ticks completed"
    );
    describe_counter!(
        "library_penalty_accrual_failures_total",
        "Overdue loans whose penalty could not be recomputed"
    );
    describe_gauge!(
        "library_overdue_loans",
        "Overdue loans examined by the most recent accrual tick"
    );
    describe_histogram!(
        "library_penalty_accrual_duration_seconds",
        "Time taken by one penalty accrual tick"
    );
}

/// Lending metrics recorder.
pub struct LendingMetrics;

impl LendingMetrics {
    /// Record a borrow attempt; `outcome` is `created` or a refusal code.
    pub fn record_borrow_request(outcome: &'static str) {
        counter!("library_borrow_requests_total", "outcome" => outcome).increment(1);
    }

    /// Record an approval (`approved`) or rejection (`rejected`).
    pub fn record_decision(decision: &'static str) {
        counter!("library_request_decisions_total", "decision" => decision).increment(1);
    }

    /// Record a returned loan.
    pub fn record_return() {
        counter!("library_returns_total").increment(1);
    }
}

/// Penalty accrual metrics recorder.
pub struct AccrualMetrics;

impl AccrualMetrics {
    /// Record a completed tick.
    #[allow(clippy::cast_precision_loss)]
    pub fn record_run(report: &AccrualReport, duration: Duration) {
        counter!("library_penalty_accrual_runs_total").increment(1);
        counter!("library_penalty_accrual_failures_total").increment(report.failed as u64);
        gauge!("library_overdue_loans").set(report.examined as f64);
        histogram!("library_penalty_accrual_duration_seconds").record(duration.as_secs_f64());
    }

    /// Record a tick that could not list overdue loans at all.
    pub fn record_tick_error() {
        counter!("library_penalty_accrual_failures_total").increment(1);
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    #[test]
    fn test_metrics_server_creation() {
        let addr = "127.0.0.1:0".parse().unwrap();
        let server = MetricsServer::new(addr);
        assert!(server.handle().is_none());
    }

    #[test]
    fn test_metrics_server_render() {
        let addr = "127.0.0.1:0".parse().unwrap();
        let mut server = MetricsServer::new(addr);
        server.start().unwrap();

        LendingMetrics::record_borrow_request("created");
        LendingMetrics::record_decision("approved");
        AccrualMetrics::record_run(
            &AccrualReport {
                examined: 3,
                updated: 2,
                failed: 1,
            },
            Duration::from_millis(12),
        );

        // handle is None if another test installed the recorder first
        if let Some(rendered) = server.render() {
            assert!(rendered.contains("library_borrow_requests_total"));
            assert!(rendered.contains("outcome=\"created\""));
            assert!(rendered.contains("library_penalty_accrual_runs_total"));
            assert!(rendered.contains("library_penalty_accrual_duration_seconds"));
        }
    }
}
