//! Client metrics definitions
//!
//! OpenTelemetry instruments recorded by the request and batch engines when
//! observability is enabled through `ClientBuilder::with_observability()`:
//!
//! - **jrh.client.requests.total**: exchanges by method and outcome (counter)
//! - **jrh.client.request.duration**: exchange latency in seconds (histogram)
//! - **jrh.client.errors.total**: failures by error class (counter)
//! - **jrh.client.batch.size**: requests per batch (histogram)
//! - **jrh.client.notifications.sent**: notifications by method (counter)

use opentelemetry::{
    global,
    metrics::{Counter, Histogram, Meter},
    KeyValue,
};

/// Instruments of one client
pub struct ClientMetrics {
    /// Exchanges performed
    pub requests_total: Counter<u64>,
    /// Exchange duration in seconds
    pub request_duration: Histogram<f64>,
    /// Failed exchanges
    pub errors_total: Counter<u64>,
    /// Batch size distribution
    pub batch_size: Histogram<u64>,
    /// Notifications sent
    pub notifications_sent: Counter<u64>,
}

impl ClientMetrics {
    /// Create the instruments on the global meter provider
    pub fn new(service_name: impl Into<String>) -> Self {
        let name: &'static str = Box::leak(service_name.into().into_boxed_str());
        let meter = global::meter(name);
        Self::new_with_meter(&meter)
    }

    /// Create the instruments on a specific meter
    pub fn new_with_meter(meter: &Meter) -> Self {
        Self {
            requests_total: meter
                .u64_counter("jrh.client.requests.total")
                .with_description("Total number of JSON-RPC exchanges")
                .build(),
            request_duration: meter
                .f64_histogram("jrh.client.request.duration")
                .with_description("JSON-RPC exchange duration in seconds")
                .with_unit("s")
                .build(),
            errors_total: meter
                .u64_counter("jrh.client.errors.total")
                .with_description("Total number of failed exchanges by error class")
                .build(),
            batch_size: meter
                .u64_histogram("jrh.client.batch.size")
                .with_description("Number of requests in batch exchanges")
                .build(),
            notifications_sent: meter
                .u64_counter("jrh.client.notifications.sent")
                .with_description("Total number of notifications sent")
                .build(),
        }
    }

    /// Record a finished exchange
    pub fn record_request(&self, method: &str, status: &str, duration_secs: f64) {
        let attributes = &[
            KeyValue::new("method", method.to_string()),
            KeyValue::new("status", status.to_string()),
        ];
        self.requests_total.add(1, attributes);
        self.request_duration.record(duration_secs, attributes);
    }

    /// Record a failure by error class (see `Error::label`)
    pub fn record_error(&self, error_class: &'static str) {
        self.errors_total
            .add(1, &[KeyValue::new("error_class", error_class)]);
    }

    /// Record a batch exchange
    pub fn record_batch(&self, size: u64) {
        self.batch_size.record(size, &[]);
    }

    /// Record a notification
    pub fn record_notification(&self, method: &str) {
        self.notifications_sent
            .add(1, &[KeyValue::new("method", method.to_string())]);
    }
}
