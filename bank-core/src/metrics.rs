//! Metrics collection for observability
//!
//! # Metrics
//!
//! - `bank_transfers_applied_total` - Transfers that moved balances
//! - `bank_transfers_rejected_total` - Terminal rejections persisted to the log
//! - `bank_transfers_duplicate_total` - Replays answered from the log
//! - `bank_transfer_apply_duration_seconds` - Histogram of execute latencies
//! - `bank_accounts_total` - Approximate number of accounts

use prometheus::{Histogram, HistogramOpts, IntCounter, IntGauge, Opts, Registry};
use std::sync::Arc;

/// Metrics collector
#[derive(Clone)]
pub struct Metrics {
    /// Transfers applied
    pub transfers_applied: IntCounter,

    /// Terminal rejections
    pub transfers_rejected: IntCounter,

    /// Duplicate replays
    pub transfers_duplicate: IntCounter,

    /// Execute latency histogram
    pub apply_duration: Histogram,

    /// Approximate account count
    pub accounts_total: IntGauge,

    /// Prometheus registry
    pub registry: Arc<Registry>,
}

impl Metrics {
    /// Create new metrics collector with its own registry
    pub fn new() -> prometheus::Result<Self> {
        let registry = Arc::new(Registry::new());

        let transfers_applied = IntCounter::with_opts(Opts::new(
            "bank_transfers_applied_total",
            "Transfers that moved balances",
        ))?;
        registry.register(Box::new(transfers_applied.clone()))?;

        let transfers_rejected = IntCounter::with_opts(Opts::new(
            "bank_transfers_rejected_total",
            "Terminal rejections persisted to the log",
        ))?;
        registry.register(Box::new(transfers_rejected.clone()))?;

        let transfers_duplicate = IntCounter::with_opts(Opts::new(
            "bank_transfers_duplicate_total",
            "Replays answered from the log",
        ))?;
        registry.register(Box::new(transfers_duplicate.clone()))?;

        let apply_duration = Histogram::with_opts(
            HistogramOpts::new(
                "bank_transfer_apply_duration_seconds",
                "Histogram of execute latencies",
            )
            .buckets(vec![0.0005, 0.001, 0.005, 0.010, 0.025, 0.050, 0.100, 0.250]),
        )?;
        registry.register(Box::new(apply_duration.clone()))?;

        let accounts_total = IntGauge::with_opts(Opts::new(
            "bank_accounts_total",
            "Approximate number of accounts",
        ))?;
        registry.register(Box::new(accounts_total.clone()))?;

        Ok(Self {
            transfers_applied,
            transfers_rejected,
            transfers_duplicate,
            apply_duration,
            accounts_total,
            registry,
        })
    }

    /// Record an applied transfer
    pub fn record_applied(&self) {
        self.transfers_applied.inc();
    }

    /// Record a terminal rejection
    pub fn record_rejected(&self) {
        self.transfers_rejected.inc();
    }

    /// Record a duplicate replay
    pub fn record_duplicate(&self) {
        self.transfers_duplicate.inc();
    }

    /// Record execute latency
    pub fn record_apply_duration(&self, duration_seconds: f64) {
        self.apply_duration.observe(duration_seconds);
    }

    /// Update the account count estimate
    pub fn update_accounts_total(&self, count: i64) {
        self.accounts_total.set(count);
    }

    /// Get metrics registry
    pub fn registry(&self) -> &Registry {
        &self.registry
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new().expect("Failed to create metrics")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_creation() {
        let metrics = Metrics::new().unwrap();
        assert_eq!(metrics.transfers_applied.get(), 0);
        assert_eq!(metrics.transfers_rejected.get(), 0);
    }

    #[test]
    fn test_counters() {
        let metrics = Metrics::new().unwrap();
        metrics.record_applied();
        metrics.record_applied();
        metrics.record_duplicate();
        assert_eq!(metrics.transfers_applied.get(), 2);
        assert_eq!(metrics.transfers_duplicate.get(), 1);
    }

    #[test]
    fn test_accounts_gauge() {
        let metrics = Metrics::new().unwrap();
        metrics.update_accounts_total(1234);
        assert_eq!(metrics.accounts_total.get(), 1234);
    }
}
