mod settings;

pub use settings::{
    AppConfig, HealthConfig, LoggerConfig, OtelConfig, PostgresConfig, ServerConfig, Settings,
};
