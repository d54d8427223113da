use std::sync::Arc;

use prometheus::Registry;

use crate::config::Settings;
use crate::domain::client::ClientRepository;
use crate::health::HealthCheck;
use crate::metrics::HttpMetrics;

#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub clients: Arc<dyn ClientRepository>,
    pub readiness: Arc<HealthCheck>,
    pub liveness: Arc<HealthCheck>,
    pub registry: Registry,
    pub http_metrics: HttpMetrics,
}

impl AppState {
    /// Build the shared handler state and register the HTTP metrics on
    /// `registry`.
    pub fn new(
        settings: Settings,
        clients: Arc<dyn ClientRepository>,
        readiness: HealthCheck,
        liveness: HealthCheck,
        registry: Registry,
    ) -> Result<Self, prometheus::Error> {
        let http_metrics = HttpMetrics::register(&settings.app.name, &registry)?;

        Ok(Self {
            settings: Arc::new(settings),
            clients,
            readiness: Arc::new(readiness),
            liveness: Arc::new(liveness),
            registry,
            http_metrics,
        })
    }
}
