use axum::{http::StatusCode, response::IntoResponse};
use prometheus::{Encoder, IntCounter, IntCounterVec, Opts, Registry, TextEncoder};
use std::sync::LazyLock;

static METRICS: LazyLock<LedgerMetrics> = LazyLock::new(LedgerMetrics::new);

/// Process-wide ledger counters.
pub fn metrics() -> &'static LedgerMetrics {
    &METRICS
}

pub struct LedgerMetrics {
    registry: Registry,

    pub entries_posted_total: IntCounter,
    pub entries_voided_total: IntCounterVec,
    pub posting_rejected_total: IntCounterVec,
    pub payment_allocations_total: IntCounterVec,
}

impl LedgerMetrics {
    fn new() -> Self {
        let registry = Registry::new();

        let entries_posted_total = IntCounter::new(
            "ledger_entries_posted_total",
            "Journal entries moved to posted",
        )
        .expect("metric");

        let entries_voided_total = IntCounterVec::new(
            Opts::new("ledger_entries_voided_total", "Journal entries voided or reversed"),
            &["kind"], // void_draft|void_posted|reversal
        )
        .expect("metric");

        let posting_rejected_total = IntCounterVec::new(
            Opts::new("ledger_posting_rejected_total", "Posting attempts rejected"),
            &["reason"], // validation|period|account|state
        )
        .expect("metric");

        let payment_allocations_total = IntCounterVec::new(
            Opts::new("payment_allocations_total", "Payment allocation rows created"),
            &["method"], // manual|automatic
        )
        .expect("metric");

        registry
            .register(Box::new(entries_posted_total.clone()))
            .expect("register");
        registry
            .register(Box::new(entries_voided_total.clone()))
            .expect("register");
        registry
            .register(Box::new(posting_rejected_total.clone()))
            .expect("register");
        registry
            .register(Box::new(payment_allocations_total.clone()))
            .expect("register");

        Self {
            registry,
            entries_posted_total,
            entries_voided_total,
            posting_rejected_total,
            payment_allocations_total,
        }
    }

    /// Count entries a committed transaction posted.
    ///
    /// `reversals` is the subset of `posted` that reverse an earlier entry.
    /// Call only after `commit` so rolled-back work never shows up.
    pub fn record_committed_postings(&self, posted: usize, reversals: usize) {
        self.entries_posted_total.inc_by(posted as u64);
        if reversals > 0 {
            self.entries_voided_total
                .with_label_values(&["reversal"])
                .inc_by(reversals as u64);
        }
    }

    pub fn render(&self) -> Result<String, String> {
        let encoder = TextEncoder::new();
        let mf = self.registry.gather();
        let mut buf = Vec::new();
        encoder.encode(&mf, &mut buf).map_err(|e| e.to_string())?;
        String::from_utf8(buf).map_err(|e| e.to_string())
    }
}

/// `GET /metrics`
pub async fn metrics_handler() -> impl IntoResponse {
    match metrics().render() {
        Ok(body) => (StatusCode::OK, body),
        Err(e) => {
            tracing::error!(error = %e, "Failed to render metrics");
            (StatusCode::INTERNAL_SERVER_ERROR, String::new())
        }
    }
}
