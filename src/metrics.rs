//! Prometheus metrics collection for chatrelay
//!
//! This module provides metrics instrumentation for tracking:
//! - Invocations by outcome (completed, fallback, rejected, failed)
//! - Upstream call latency by provider
//! - Upstream failures by provider and failure kind
//!
//! Metrics are exposed via the `/metrics` endpoint in Prometheus text format.

use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounterVec, Opts, Registry, TextEncoder,
};
use std::sync::Arc;

/// How an invocation ended
///
/// Closed set of labels so `requests_total` has a fixed cardinality.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// CORS preflight answered
    Preflight,
    /// Method other than OPTIONS/POST
    MethodNotAllowed,
    /// Body rejected during validation
    BadRequest,
    /// No credential configured, fallback reply returned
    Fallback,
    /// Upstream completion returned
    Completed,
    /// Upstream failure reported as an in-band chat message
    UpstreamWarning,
    /// 500 reply
    ServerError,
}

impl Outcome {
    /// Convert outcome to Prometheus label string
    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Preflight => "preflight",
            Outcome::MethodNotAllowed => "method_not_allowed",
            Outcome::BadRequest => "bad_request",
            Outcome::Fallback => "fallback",
            Outcome::Completed => "completed",
            Outcome::UpstreamWarning => "upstream_warning",
            Outcome::ServerError => "server_error",
        }
    }
}

/// Metrics collector for chatrelay
#[derive(Clone)]
pub struct Metrics {
    pub registry: Arc<Registry>,
    requests_total: IntCounterVec,
    upstream_duration: HistogramVec,
    upstream_failures: IntCounterVec,
}

impl Metrics {
    /// Create a new Metrics instance
    ///
    /// Registers all metrics with a new Prometheus registry.
    ///
    /// # Errors
    ///
    /// Returns an error if metric registration fails (e.g., duplicate names).
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let requests_total = IntCounterVec::new(
            Opts::new(
                "chatrelay_requests_total",
                "Total number of chat invocations by outcome",
            ),
            &["outcome"],
        )?;

        // Upstream latency covers the whole call including body download.
        let upstream_duration = HistogramVec::new(
            HistogramOpts::new(
                "chatrelay_upstream_duration_ms",
                "Upstream completion latency in milliseconds",
            )
            .buckets(vec![
                50.0, 100.0, 250.0, 500.0, 1000.0, 2500.0, 5000.0, 10000.0, 30000.0,
            ]),
            &["provider"],
        )?;

        // kind: client, request, status, unrecognized, decode, timeout
        let upstream_failures = IntCounterVec::new(
            Opts::new(
                "chatrelay_upstream_failures_total",
                "Total number of failed upstream calls by provider and failure kind",
            ),
            &["provider", "kind"],
        )?;

        registry.register(Box::new(requests_total.clone()))?;
        registry.register(Box::new(upstream_duration.clone()))?;
        registry.register(Box::new(upstream_failures.clone()))?;

        Ok(Self {
            registry: Arc::new(registry),
            requests_total,
            upstream_duration,
            upstream_failures,
        })
    }

    /// Count one finished invocation
    pub fn record_outcome(&self, outcome: Outcome) {
        self.requests_total
            .with_label_values(&[outcome.as_str()])
            .inc();
    }

    /// Current count for one outcome
    pub fn outcome_count(&self, outcome: Outcome) -> u64 {
        self.requests_total
            .with_label_values(&[outcome.as_str()])
            .get()
    }

    /// Record upstream call duration
    ///
    /// # Errors
    ///
    /// Returns an error if `duration_ms` is NaN, infinite, or negative.
    pub fn record_upstream_duration(
        &self,
        provider: &str,
        duration_ms: f64,
    ) -> Result<(), prometheus::Error> {
        if !duration_ms.is_finite() || duration_ms < 0.0 {
            return Err(prometheus::Error::Msg(format!(
                "Invalid upstream duration: {} (must be finite and non-negative)",
                duration_ms
            )));
        }

        self.upstream_duration
            .get_metric_with_label_values(&[provider])?
            .observe(duration_ms);
        Ok(())
    }

    /// Count a failed upstream call
    pub fn upstream_failure(&self, provider: &str, kind: &str) {
        self.upstream_failures
            .with_label_values(&[provider, kind])
            .inc();
    }

    /// Current count of failed upstream calls for a provider and kind
    pub fn upstream_failure_count(&self, provider: &str, kind: &str) -> u64 {
        self.upstream_failures
            .with_label_values(&[provider, kind])
            .get()
    }

    /// Gather all metrics and encode them in Prometheus text format
    ///
    /// # Errors
    ///
    /// Returns an error if metric encoding fails.
    pub fn gather(&self) -> Result<String, prometheus::Error> {
        let metric_families = self.registry.gather();

        tracing::debug!(
            metric_family_count = metric_families.len(),
            "Encoding metrics to Prometheus text format"
        );

        let mut buffer = Vec::new();
        TextEncoder::new().encode(&metric_families, &mut buffer)?;

        String::from_utf8(buffer).map_err(|e| {
            prometheus::Error::Msg(format!(
                "Failed to convert metrics to UTF-8 at byte {}: {}",
                e.utf8_error().valid_up_to(),
                e
            ))
        })
    }
}
