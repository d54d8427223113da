//! Health indicator backed by the connection pool.

use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::health::{Indicator, Status};

use super::named_args::NamedArgs;
use super::pool::ConnectionPool;

pub const DEFAULT_COMPONENT_NAME: &str = "pg-clients";

const HEALTH_QUERY: &str = "SELECT 1 AS ok";
const HEALTH_OPERATION: &str = "health-status";

/// Reports `up` when the pool answers a trivial query.
pub struct PostgresIndicator {
    component: String,
    pool: Arc<ConnectionPool>,
    token: CancellationToken,
}

impl PostgresIndicator {
    pub fn new(
        component: impl Into<String>,
        pool: Arc<ConnectionPool>,
        token: CancellationToken,
    ) -> Self {
        Self {
            component: component.into(),
            pool,
            token,
        }
    }
}

#[async_trait]
impl Indicator for PostgresIndicator {
    fn component_name(&self) -> &str {
        &self.component
    }

    async fn status(&self) -> Status {
        let row = self
            .pool
            .query_row(&self.token, HEALTH_OPERATION, HEALTH_QUERY, NamedArgs::new())
            .await;

        match row.scan().and_then(|record| record.get::<i64>("ok")) {
            Ok(ok) if ok != 0 => Status::Up,
            Ok(_) => {
                tracing::error!(component = %self.component, "Health query returned 0");
                Status::Down
            }
            Err(e) => {
                tracing::error!(component = %self.component, error = %e, "Health query failed");
                Status::Down
            }
        }
    }
}
