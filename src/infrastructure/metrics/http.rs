//! HTTP request metrics.

use axum::http::Method;
use prometheus::{HistogramOpts, HistogramVec, IntCounterVec, Opts, Registry};

use super::HTTP_DURATION_BUCKETS;

#[derive(Clone)]
pub struct HttpMetrics {
    requests: IntCounterVec,
    duration: HistogramVec,
}

impl HttpMetrics {
    pub fn register(subsystem: &str, registry: &Registry) -> Result<Self, prometheus::Error> {
        let requests = IntCounterVec::new(
            Opts::new("http_requests_total", "Total number of HTTP requests").subsystem(subsystem),
            &["method", "path", "status"],
        )?;
        let duration = HistogramVec::new(
            HistogramOpts::new(
                "http_request_duration_seconds",
                "Duration of HTTP handler execution in seconds",
            )
            .subsystem(subsystem)
            .buckets(HTTP_DURATION_BUCKETS.to_vec()),
            &["method", "path"],
        )?;

        registry.register(Box::new(requests.clone()))?;
        registry.register(Box::new(duration.clone()))?;

        Ok(Self { requests, duration })
    }

    pub fn record(&self, method: &Method, path: &str, status: u16, seconds: f64) {
        let method = normalize_method(method);
        self.requests
            .with_label_values(&[method, path, &status.to_string()])
            .inc();
        self.duration
            .with_label_values(&[method, path])
            .observe(seconds);
    }

    pub fn request_count(&self, method: &str, path: &str, status: u16) -> u64 {
        self.requests
            .with_label_values(&[method, path, &status.to_string()])
            .get()
    }
}

/// Standard methods keep their name; anything else becomes `other` to bound
/// label cardinality.
pub fn normalize_method(method: &Method) -> &'static str {
    match *method {
        Method::GET => "GET",
        Method::HEAD => "HEAD",
        Method::POST => "POST",
        Method::PUT => "PUT",
        Method::PATCH => "PATCH",
        Method::DELETE => "DELETE",
        Method::CONNECT => "CONNECT",
        Method::OPTIONS => "OPTIONS",
        Method::TRACE => "TRACE",
        _ => "other",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_method() {
        assert_eq!(normalize_method(&Method::GET), "GET");
        assert_eq!(normalize_method(&Method::from_bytes(b"PURGE").unwrap()), "other");
    }

    #[test]
    fn test_record_request() {
        let registry = Registry::new();
        let metrics = HttpMetrics::register("clients", &registry).unwrap();
        metrics.record(&Method::POST, "/v1/client", 201, 0.01);
        metrics.record(&Method::POST, "/v1/client", 201, 0.02);

        assert_eq!(metrics.request_count("POST", "/v1/client", 201), 2);
        let output = crate::metrics::encode_metrics(&registry).unwrap();
        assert!(output.contains("clients_http_request_duration_seconds_bucket"));
    }
}
