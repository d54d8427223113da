mod app;
mod middleware;
mod state;

pub use app::create_app;
pub use middleware::{http_metrics_middleware, request_logger};
pub use state::AppState;
