//! Prometheus meters and tracing spans. Each half is behind its own feature.

#[cfg(feature = "metrics")]
use once_cell::sync::Lazy;
#[cfg(feature = "metrics")]
use opentelemetry::{
    metrics::{Counter, Histogram, MeterProvider},
    KeyValue,
};
#[cfg(feature = "metrics")]
use opentelemetry_sdk::metrics::SdkMeterProvider;
#[cfg(feature = "metrics")]
use prometheus::{Registry, TextEncoder};
#[cfg(feature = "metrics")]
use std::time::Duration;

#[cfg(feature = "metrics")]
pub static METRICS: Lazy<YardMetrics> = Lazy::new(YardMetrics::init);

#[cfg(feature = "metrics")]
pub struct YardMetrics {
    registry: Registry,
    // Owns the reader; dropping it would stop collection.
    _provider: SdkMeterProvider,
    pub transitions_total: Counter<u64>,
    pub rejections_total: Counter<u64>,
    pub approval_duration: Histogram<f64>,
    pub queries_total: Counter<u64>,
    pub query_errors_total: Counter<u64>,
    pub query_duration: Histogram<f64>,
    pub connection_wait_duration: Histogram<f64>,
}

#[cfg(feature = "metrics")]
impl YardMetrics {
    pub fn init() -> Self {
        let registry = Registry::new();
        let provider = match opentelemetry_prometheus::exporter()
            .with_registry(registry.clone())
            .build()
        {
            Ok(exporter) => SdkMeterProvider::builder().with_reader(exporter).build(),
            Err(e) => {
                log::error!("Failed to build prometheus exporter, metrics disabled: {e}");
                SdkMeterProvider::builder().build()
            }
        };
        let meter = provider.meter("yardgate");

        let transitions_total = meter
            .u64_counter("yardgate_transitions_total")
            .with_description("Committed gate lifecycle transitions")
            .build();

        let rejections_total = meter
            .u64_counter("yardgate_rejections_total")
            .with_description("Gate operations rejected, by error code")
            .build();

        let approval_duration = meter
            .f64_histogram("yardgate_approval_duration_seconds")
            .with_description("Duration of gate-in/gate-out approvals")
            .build();

        let queries_total = meter
            .u64_counter("yardgate_queries_total")
            .with_description("Total queries executed")
            .build();

        let query_errors_total = meter
            .u64_counter("yardgate_query_errors_total")
            .with_description("Queries that returned an error")
            .build();

        let query_duration = meter
            .f64_histogram("yardgate_query_duration_seconds")
            .with_description("Duration of queries")
            .build();

        let connection_wait_duration = meter
            .f64_histogram("yardgate_connection_wait_seconds")
            .with_description("Time spent waiting for a database connection")
            .build();

        Self {
            registry,
            _provider: provider,
            transitions_total,
            rejections_total,
            approval_duration,
            queries_total,
            query_errors_total,
            query_duration,
            connection_wait_duration,
        }
    }

    pub fn record_query_duration(&self, elapsed: Duration) {
        self.queries_total.add(1, &[]);
        self.query_duration.record(elapsed.as_secs_f64(), &[]);
    }

    pub fn record_query_error(&self) {
        self.query_errors_total.add(1, &[]);
    }

    pub fn record_connection_wait(&self, duration: Duration) {
        self.connection_wait_duration
            .record(duration.as_secs_f64(), &[]);
    }

    /// Count a committed transition (`gate_in`, `gate_out`, `staging_created`, ...).
    pub fn record_transition(&self, action: &'static str) {
        self.transitions_total
            .add(1, &[KeyValue::new("action", action)]);
    }

    pub fn record_rejection(&self, code: &'static str) {
        self.rejections_total.add(1, &[KeyValue::new("code", code)]);
    }

    pub fn record_approval(&self, direction: &'static str, duration: Duration) {
        self.approval_duration.record(
            duration.as_secs_f64(),
            &[KeyValue::new("direction", direction)],
        );
    }

    /// Prometheus text exposition of everything recorded so far.
    pub fn render(&self) -> String {
        let encoder = TextEncoder::new();
        match encoder.encode_to_string(&self.registry.gather()) {
            Ok(text) => text,
            Err(e) => {
                log::error!("Failed to encode metrics: {e}");
                String::new()
            }
        }
    }
}

#[cfg(feature = "tracing")]
pub mod tracing_helpers {
    //! Span constructors shared by the executor, transaction, and engine layers.

    use tracing::{info_span, Span};

    pub fn execute_query_span(query: &str) -> Span {
        info_span!("yardgate.execute_query", db.statement = %query)
    }

    pub fn acquire_connection_span() -> Span {
        info_span!("yardgate.acquire_connection")
    }

    pub fn begin_transaction_span() -> Span {
        info_span!("yardgate.begin_transaction")
    }

    pub fn commit_transaction_span() -> Span {
        info_span!("yardgate.commit_transaction")
    }

    pub fn rollback_transaction_span() -> Span {
        info_span!("yardgate.rollback_transaction")
    }

    pub fn approval_span(direction: &'static str, staging_id: i64, request_id: &str) -> Span {
        info_span!(
            "yardgate.approve",
            gate.direction = direction,
            staging.id = staging_id,
            request.id = %request_id
        )
    }
}
