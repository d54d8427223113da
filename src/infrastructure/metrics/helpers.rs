//! Encoding and process-level metrics.

use std::time::{SystemTime, UNIX_EPOCH};

use prometheus::{Encoder, Gauge, Opts, Registry, TextEncoder};

/// Encode every metric of `registry` to Prometheus text format
pub fn encode_metrics(registry: &Registry) -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let metric_families = registry.gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    Ok(String::from_utf8(buffer).unwrap_or_default())
}

/// Register `{subsystem}_application_info`, set to the process start time.
pub fn register_application_info(
    subsystem: &str,
    registry: &Registry,
) -> Result<Gauge, prometheus::Error> {
    let gauge = Gauge::with_opts(
        Opts::new("application_info", "Application version and start timestamp")
            .subsystem(subsystem)
            .const_label("version", env!("CARGO_PKG_VERSION")),
    )?;
    registry.register(Box::new(gauge.clone()))?;

    let started = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or_default();
    gauge.set(started);

    Ok(gauge)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_metrics() {
        let registry = Registry::new();
        let gauge = register_application_info("clients", &registry).unwrap();
        assert!(gauge.get() > 0.0);

        let output = encode_metrics(&registry).unwrap();
        assert!(output.contains("clients_application_info"));
        assert!(output.contains(&format!("version=\"{}\"", env!("CARGO_PKG_VERSION"))));
    }

    #[test]
    fn test_double_registration_fails() {
        let registry = Registry::new();
        register_application_info("clients", &registry).unwrap();
        assert!(register_application_info("clients", &registry).is_err());
    }
}
