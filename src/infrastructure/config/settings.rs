use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::env;
use std::time::Duration;

use crate::health::TimeoutPolicy;
use crate::postgres::PoolConfig;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub app: AppConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub logger: LoggerConfig,
    #[serde(default)]
    pub postgres: PostgresConfig,
    #[serde(default)]
    pub health: HealthConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Also used as the metrics subsystem.
    #[serde(default = "default_app_name")]
    pub name: String,
    #[serde(default = "default_app_env")]
    pub env: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// `;`-separated list of allowed CORS origins.
    #[serde(default)]
    pub allow_origins: String,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_seconds: u64,
    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout_seconds: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggerConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Human readable output instead of JSON lines.
    #[serde(default)]
    pub dev_mode: bool,
    #[serde(default)]
    pub otel: OtelConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OtelConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_otel_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_sampling_ratio")]
    pub sampling_ratio: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PostgresConfig {
    #[serde(default = "default_pg_host")]
    pub host: String,
    #[serde(default = "default_pg_port")]
    pub port: u16,
    #[serde(default = "default_pg_user")]
    pub user: String,
    #[serde(default)]
    pub password: String,
    #[serde(default = "default_pg_database")]
    pub database: String,
    #[serde(default = "default_ssl_mode")]
    pub ssl_mode: String,
    #[serde(default = "default_max_conns")]
    pub max_conns: u32,
    #[serde(default = "default_min_conns")]
    pub min_conns: u32,
    #[serde(default = "default_max_conn_lifetime")]
    pub max_conn_lifetime_seconds: u64,
    #[serde(default = "default_max_conn_idle_time")]
    pub max_conn_idle_time_seconds: u64,
    #[serde(default = "default_query_timeout")]
    pub query_timeout_ms: u64,
    #[serde(default = "default_health_check_period")]
    pub health_check_period_seconds: u64,
    #[serde(default = "default_statement_cache_capacity")]
    pub statement_cache_capacity: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HealthConfig {
    #[serde(default = "default_health_timeout")]
    pub timeout_ms: u64,
    #[serde(default)]
    pub timeout_policy: TimeoutPolicy,
    #[serde(default = "default_postgres_component")]
    pub postgres_component: String,
}

fn default_app_name() -> String {
    "clients".to_string()
}

fn default_app_env() -> String {
    "development".to_string()
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_request_timeout() -> u64 {
    30
}

fn default_shutdown_timeout() -> u64 {
    10
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_otel_endpoint() -> String {
    "http://localhost:4317".to_string()
}

fn default_sampling_ratio() -> f64 {
    1.0
}

fn default_pg_host() -> String {
    "localhost".to_string()
}

fn default_pg_port() -> u16 {
    5432
}

fn default_pg_user() -> String {
    "postgres".to_string()
}

fn default_pg_database() -> String {
    "clients".to_string()
}

fn default_ssl_mode() -> String {
    "disable".to_string()
}

fn default_max_conns() -> u32 {
    10
}

fn default_min_conns() -> u32 {
    1
}

fn default_max_conn_lifetime() -> u64 {
    3600 // 1 hour
}

fn default_max_conn_idle_time() -> u64 {
    1800 // 30 minutes
}

fn default_query_timeout() -> u64 {
    5000
}

fn default_health_check_period() -> u64 {
    60
}

fn default_statement_cache_capacity() -> usize {
    100
}

fn default_health_timeout() -> u64 {
    1000
}

fn default_postgres_component() -> String {
    crate::postgres::indicator::DEFAULT_COMPONENT_NAME.to_string()
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        // Load .env file if exists
        let _ = dotenvy::dotenv();

        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let builder = Config::builder()
            .set_default("app.name", default_app_name())?
            .set_default("server.port", i64::from(default_port()))?
            .set_default("postgres.ssl_mode", default_ssl_mode())?
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", run_mode)).required(false))
            // CLIENTS_SERVER__PORT, CLIENTS_POSTGRES__MAX_CONNS, ...
            .add_source(
                Environment::with_prefix("CLIENTS")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            );

        builder.build()?.try_deserialize()
    }

    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

impl ServerConfig {
    pub fn allowed_origins(&self) -> Vec<String> {
        self.allow_origins
            .split(';')
            .map(str::trim)
            .filter(|o| !o.is_empty())
            .map(str::to_string)
            .collect()
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_seconds)
    }
}

impl PostgresConfig {
    pub fn connection_url(&self) -> String {
        format!(
            "postgresql://{}:{}@{}:{}/{}?sslmode={}",
            self.user, self.password, self.host, self.port, self.database, self.ssl_mode
        )
    }

    pub fn pool_config(&self) -> PoolConfig {
        PoolConfig {
            connection_url: self.connection_url(),
            ssl_mode: self.ssl_mode.clone(),
            min_conns: self.min_conns,
            max_conns: self.max_conns,
            max_conn_lifetime: Duration::from_secs(self.max_conn_lifetime_seconds),
            max_conn_idle_time: Duration::from_secs(self.max_conn_idle_time_seconds),
            health_check_period: Duration::from_secs(self.health_check_period_seconds),
            query_timeout: Duration::from_millis(self.query_timeout_ms),
            statement_cache_capacity: self.statement_cache_capacity,
        }
    }
}

impl HealthConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            name: default_app_name(),
            env: default_app_env(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            allow_origins: String::new(),
            request_timeout_seconds: default_request_timeout(),
            shutdown_timeout_seconds: default_shutdown_timeout(),
        }
    }
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            dev_mode: false,
            otel: OtelConfig::default(),
        }
    }
}

impl Default for OtelConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            endpoint: default_otel_endpoint(),
            sampling_ratio: default_sampling_ratio(),
        }
    }
}

impl Default for PostgresConfig {
    fn default() -> Self {
        Self {
            host: default_pg_host(),
            port: default_pg_port(),
            user: default_pg_user(),
            password: String::new(),
            database: default_pg_database(),
            ssl_mode: default_ssl_mode(),
            max_conns: default_max_conns(),
            min_conns: default_min_conns(),
            max_conn_lifetime_seconds: default_max_conn_lifetime(),
            max_conn_idle_time_seconds: default_max_conn_idle_time(),
            query_timeout_ms: default_query_timeout(),
            health_check_period_seconds: default_health_check_period(),
            statement_cache_capacity: default_statement_cache_capacity(),
        }
    }
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_health_timeout(),
            timeout_policy: TimeoutPolicy::default(),
            postgres_component: default_postgres_component(),
        }
    }
}
