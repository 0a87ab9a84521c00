use opentelemetry::global;
use opentelemetry::metrics::{Counter, Gauge, Histogram, Meter, UpDownCounter};
use opentelemetry::KeyValue;
use opentelemetry_sdk::metrics::SdkMeterProvider;
use prometheus::Registry;
use std::sync::Arc;

use crate::admission::GateCounts;
use crate::error::{ProxyError, Result};

pub mod labels {
    pub const ERROR_TYPE: &str = "error_type";
    pub const STATUS_CODE: &str = "status_code";
    pub const METHOD: &str = "method";
    pub const RESULT: &str = "result";
    pub const VERSION: &str = "version";
    pub const RUST_VERSION: &str = "rust_version";
}

pub mod values {
    pub const CACHE_HIT: &str = "hit";
    pub const CACHE_MISS: &str = "miss";
    pub const CACHE_STORE: &str = "store";
}

#[derive(Clone)]
pub struct Metrics {
    pub connections_total: Counter<u64>,
    pub connections_active: UpDownCounter<i64>,

    pub requests_total: Counter<u64>,
    pub requests_duration_seconds: Histogram<f64>,

    // Admission gate
    pub gate_released_total: Counter<u64>,
    pub gate_rejected_total: Counter<u64>,
    pub gate_queue_wait_seconds: Histogram<f64>,
    pub gate_queued: Gauge<u64>,
    pub gate_running: Gauge<u64>,

    // Upstream
    pub upstream_requests_total: Counter<u64>,
    pub upstream_errors_total: Counter<u64>,
    pub upstream_duration_seconds: Histogram<f64>,
    pub upstream_bytes_received_total: Counter<u64>,

    // result label: "hit" | "miss" | "store"
    pub cache_lookups_total: Counter<u64>,

    pub errors_total: Counter<u64>,

    pub build_info: Gauge<u64>,
}

impl Metrics {
    fn new(meter: Meter) -> Self {
        Self {
            connections_total: meter
                .u64_counter("sluice_connections_total")
                .with_description("Total number of inbound connections accepted")
                .build(),
            connections_active: meter
                .i64_up_down_counter("sluice_connections_active")
                .with_description("Number of open inbound connections")
                .build(),

            requests_total: meter
                .u64_counter("sluice_requests_total")
                .with_description("Total number of inbound requests answered")
                .build(),
            requests_duration_seconds: meter
                .f64_histogram("sluice_requests_duration_seconds")
                .with_description("Time from request arrival to response, including queueing")
                .build(),

            gate_released_total: meter
                .u64_counter("sluice_gate_released_total")
                .with_description("Total number of tasks released by the admission gate")
                .build(),
            gate_rejected_total: meter
                .u64_counter("sluice_gate_rejected_total")
                .with_description("Tasks refused while draining or abandoned at the drain deadline")
                .build(),
            gate_queue_wait_seconds: meter
                .f64_histogram("sluice_gate_queue_wait_seconds")
                .with_description("Time a task spent queued before release")
                .build(),
            gate_queued: meter
                .u64_gauge("sluice_gate_queued")
                .with_description("Tasks waiting in the admission queue")
                .build(),
            gate_running: meter
                .u64_gauge("sluice_gate_running")
                .with_description("Released tasks not yet completed")
                .build(),

            upstream_requests_total: meter
                .u64_counter("sluice_upstream_requests_total")
                .with_description("Total number of responses received from the upstream")
                .build(),
            upstream_errors_total: meter
                .u64_counter("sluice_upstream_errors_total")
                .with_description("Total number of failed upstream exchanges")
                .build(),
            upstream_duration_seconds: meter
                .f64_histogram("sluice_upstream_duration_seconds")
                .with_description("Upstream exchange duration in seconds")
                .build(),
            upstream_bytes_received_total: meter
                .u64_counter("sluice_upstream_bytes_received_total")
                .with_description("Total response body bytes received from the upstream")
                .build(),

            cache_lookups_total: meter
                .u64_counter("sluice_cache_lookups_total")
                .with_description("Response cache activity. result=hit|miss|store")
                .build(),

            errors_total: meter
                .u64_counter("sluice_errors_total")
                .with_description("Requests answered with a synthetic error response")
                .build(),

            build_info: meter
                .u64_gauge("sluice_build_info")
                .with_description("Build information (version, rust version)")
                .build(),
        }
    }

    /// Set build info metric with version labels
    pub fn set_build_info(&self) {
        let version = env!("CARGO_PKG_VERSION");
        let rust_version = env!("CARGO_PKG_RUST_VERSION");

        self.build_info.record(
            1,
            &[
                KeyValue::new(labels::VERSION, version),
                KeyValue::new(labels::RUST_VERSION, rust_version),
            ],
        );
    }

    pub fn record_connection_opened(&self) {
        self.connections_total.add(1, &[]);
        self.connections_active.add(1, &[]);
    }

    pub fn record_request(&self, method: &str, status_code: u16, duration: f64) {
        let attrs = [
            KeyValue::new(labels::METHOD, method.to_string()),
            KeyValue::new(labels::STATUS_CODE, status_code.to_string()),
        ];
        self.requests_total.add(1, &attrs);
        self.requests_duration_seconds.record(duration, &attrs);
    }

    pub fn record_gate_release(&self, queue_wait: f64) {
        self.gate_released_total.add(1, &[]);
        self.gate_queue_wait_seconds.record(queue_wait, &[]);
    }

    pub fn record_gate_rejection(&self, error_type: &str) {
        self.record_gate_rejections(1, error_type);
    }

    pub fn record_gate_rejections(&self, count: u64, error_type: &str) {
        if count > 0 {
            self.gate_rejected_total
                .add(count, &[KeyValue::new(labels::ERROR_TYPE, error_type.to_string())]);
        }
    }

    pub fn record_gate_counts(&self, counts: &GateCounts) {
        self.gate_queued.record(counts.queued as u64, &[]);
        self.gate_running.record(counts.running as u64, &[]);
    }

    pub fn record_upstream_response(&self, status_code: u16, duration: f64, body_bytes: u64) {
        let attrs = [KeyValue::new(labels::STATUS_CODE, status_code.to_string())];
        self.upstream_requests_total.add(1, &attrs);
        self.upstream_duration_seconds.record(duration, &attrs);
        if body_bytes > 0 {
            self.upstream_bytes_received_total.add(body_bytes, &[]);
        }
    }

    pub fn record_upstream_error(&self, error_type: &str, duration: f64) {
        let attrs = [KeyValue::new(labels::ERROR_TYPE, error_type.to_string())];
        self.upstream_errors_total.add(1, &attrs);
        self.upstream_duration_seconds.record(duration, &attrs);
    }

    pub fn record_error(&self, error_type: &str) {
        self.errors_total
            .add(1, &[KeyValue::new(labels::ERROR_TYPE, error_type.to_string())]);
    }

    pub fn record_cache(&self, result: &str) {
        self.cache_lookups_total
            .add(1, &[KeyValue::new(labels::RESULT, result.to_string())]);
    }
}

pub fn init_metrics() -> Result<(Arc<Metrics>, Registry)> {
    let registry = Registry::default();

    let exporter = opentelemetry_prometheus::exporter()
        .with_registry(registry.clone())
        .build()
        .map_err(|e| ProxyError::Telemetry(format!("Failed to build Prometheus exporter: {e}")))?;

    let meter_provider = SdkMeterProvider::builder().with_reader(exporter).build();

    global::set_meter_provider(meter_provider);

    let meter = global::meter("sluice-proxy");
    let metrics = Arc::new(Metrics::new(meter));

    metrics.set_build_info();

    Ok((metrics, registry))
}
