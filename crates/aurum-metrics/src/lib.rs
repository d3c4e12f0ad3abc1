use std::sync::Arc;

use opentelemetry::{KeyValue, global, metrics::Counter};

#[derive(Debug)]
pub struct MetricsRegistry {
    pub transactions: Arc<TransactionMetrics>,
}

impl MetricsRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            transactions: TransactionMetrics::new(),
        })
    }
}

#[derive(Debug)]
pub struct TransactionMetrics {
    deposits_processed: Counter<u64>,
    withdrawals_requested: Counter<u64>,
    withdrawals_cancelled: Counter<u64>,
    resolutions: Counter<u64>,
    gate_rejections: Counter<u64>,
    failures: Counter<u64>,
}

impl TransactionMetrics {
    fn new() -> Arc<Self> {
        let meter = global::meter("aurum-api");
        let deposits_processed = meter
            .u64_counter("deposits_processed_total")
            .with_description("Number of deposits accepted, by payment method and resulting status")
            .with_unit("count")
            .init();

        let withdrawals_requested = meter
            .u64_counter("withdrawals_requested_total")
            .with_description("Number of withdrawal requests created")
            .with_unit("count")
            .init();

        let withdrawals_cancelled = meter
            .u64_counter("withdrawals_cancelled_total")
            .with_description("Number of pending withdrawals cancelled by their owner")
            .with_unit("count")
            .init();

        let resolutions = meter
            .u64_counter("transactions_resolved_total")
            .with_description("Number of pending transactions resolved by an operator")
            .with_unit("count")
            .init();

        let gate_rejections = meter
            .u64_counter("initial_deposit_gate_rejections_total")
            .with_description("Number of requests refused for lack of an initial deposit")
            .with_unit("count")
            .init();

        let failures = meter
            .u64_counter("transaction_operation_failures_total")
            .with_description("Number of transaction operations that returned an error")
            .with_unit("count")
            .init();

        Arc::new(Self {
            deposits_processed,
            withdrawals_requested,
            withdrawals_cancelled,
            resolutions,
            gate_rejections,
            failures,
        })
    }

    pub fn record_deposit(&self, method: &str, currency: &str, status: &str, is_initial: bool) {
        self.deposits_processed.add(
            1,
            &[
                KeyValue::new("method", method.to_string()),
                KeyValue::new("currency", currency.to_string()),
                KeyValue::new("status", status.to_string()),
                KeyValue::new("initial", is_initial),
            ],
        );
    }

    pub fn record_withdrawal_requested(&self, network: &str) {
        self.withdrawals_requested
            .add(1, &[KeyValue::new("network", network.to_string())]);
    }

    pub fn record_withdrawal_cancelled(&self) {
        self.withdrawals_cancelled.add(1, &[]);
    }

    pub fn record_resolution(&self, kind: &str, outcome: &str) {
        self.resolutions.add(
            1,
            &[
                KeyValue::new("kind", kind.to_string()),
                KeyValue::new("outcome", outcome.to_string()),
            ],
        );
    }

    pub fn record_gate_rejection(&self, route: &str) {
        self.gate_rejections
            .add(1, &[KeyValue::new("route", route.to_string())]);
    }

    pub fn record_failure(&self, operation: &'static str, code: &'static str) {
        self.failures.add(
            1,
            &[
                KeyValue::new("operation", operation),
                KeyValue::new("code", code),
            ],
        );
    }
}
