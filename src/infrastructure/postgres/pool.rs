//! Instrumented PostgreSQL connection pool.
//!
//! Every operation runs under a deadline derived from the caller's
//! cancellation token and the configured query timeout, and reports its
//! outcome to the registered metrics.

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::BoxFuture;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::backend::{Backend, PgBackend, PoolStats};
use super::config::PoolConfig;
use super::context::OperationContext;
use super::error::{DbError, TransactionError};
use super::monitoring::{ConnectionMetrics, MonitoringMetrics, RegisterMetricsOptions};
use super::named_args::{BoundQuery, NamedArgs};
use super::rows::{Rows, SingleRow};
use super::transaction::{Transaction, TxOptions};

/// PostgreSQL connection pool with per-operation timeouts and metrics.
pub struct ConnectionPool {
    backend: Arc<dyn Backend>,
    conn_metrics: Arc<dyn ConnectionMetrics>,
    metrics: MonitoringMetrics,
    query_timeout: Duration,
}

impl ConnectionPool {
    /// Validate `config` and open the pool.
    pub async fn connect(
        config: &PoolConfig,
        conn_metrics: Arc<dyn ConnectionMetrics>,
    ) -> Result<Self, DbError> {
        config.validate()?;
        let backend = PgBackend::connect(config, conn_metrics.clone()).await?;
        Ok(Self::with_backend(
            Arc::new(backend),
            conn_metrics,
            config.query_timeout,
        ))
    }

    /// Build a pool around an already opened backend.
    pub fn with_backend(
        backend: Arc<dyn Backend>,
        conn_metrics: Arc<dyn ConnectionMetrics>,
        query_timeout: Duration,
    ) -> Self {
        Self {
            backend,
            conn_metrics,
            metrics: MonitoringMetrics::default(),
            query_timeout,
        }
    }

    /// Wire query and transaction metrics. `None` keeps what is registered.
    pub fn register_metrics(&mut self, options: RegisterMetricsOptions) {
        self.metrics.register(options);
    }

    pub fn query_timeout(&self) -> Duration {
        self.query_timeout
    }

    /// Run a query returning any number of rows.
    pub async fn query(
        &self,
        ctx: &CancellationToken,
        operation: &str,
        sql: &str,
        args: NamedArgs,
    ) -> Result<Rows, DbError> {
        let (op_ctx, cancel) = OperationContext::with_timeout(ctx, self.query_timeout);
        let bound = BoundQuery::new(sql, args);
        let started = Instant::now();

        match op_ctx.run(self.backend.fetch_all(bound)).await {
            Ok(records) => {
                self.metrics
                    .query_succeeded(operation, started.elapsed().as_secs_f64());
                Ok(Rows::new(records, cancel))
            }
            Err(e) => {
                self.metrics.query_failed(operation);
                tracing::error!(func = operation, sql = %sql, error = %e, "Query failed");
                Err(e)
            }
        }
    }

    /// Run a query expected to return exactly one row.
    ///
    /// An empty result is not an error at this level; it surfaces as
    /// [`DbError::NoRows`] from [`SingleRow::scan`].
    pub async fn query_row(
        &self,
        ctx: &CancellationToken,
        operation: &str,
        sql: &str,
        args: NamedArgs,
    ) -> SingleRow {
        let (op_ctx, cancel) = OperationContext::with_timeout(ctx, self.query_timeout);
        let bound = BoundQuery::new(sql, args);
        let started = Instant::now();

        let result = op_ctx.run(self.backend.fetch_optional(bound)).await;
        match &result {
            Ok(_) => self
                .metrics
                .query_succeeded(operation, started.elapsed().as_secs_f64()),
            Err(e) => {
                self.metrics.query_failed(operation);
                tracing::error!(func = operation, sql = %sql, error = %e, "Query row failed");
            }
        }
        SingleRow::new(result, cancel)
    }

    /// Run `unit_of_work` inside a transaction.
    ///
    /// The transaction commits when the unit of work returns `Ok` and rolls
    /// back otherwise. Begin, every query of the unit of work and the commit
    /// share one deadline.
    pub async fn with_transaction<T, E, F>(
        &self,
        ctx: &CancellationToken,
        name: &str,
        options: TxOptions,
        unit_of_work: F,
    ) -> Result<T, TransactionError<E>>
    where
        F: for<'t> FnOnce(&'t mut Transaction) -> BoxFuture<'t, Result<T, E>> + Send,
        T: Send,
        E: fmt::Display + Send,
    {
        let (op_ctx, _cancel) = OperationContext::with_timeout(ctx, self.query_timeout);
        let started = Instant::now();

        let inner = match op_ctx.run(self.backend.begin(&options)).await {
            Ok(inner) => inner,
            Err(e) => {
                tracing::error!(name = %name, error = %e, "Unable to begin transaction");
                return Err(TransactionError::Begin(e));
            }
        };

        let mut tx = Transaction::new(inner, op_ctx.clone(), self.metrics.clone());
        match unit_of_work(&mut tx).await {
            Ok(value) => {
                let committed = op_ctx.run(tx.into_inner().commit()).await;
                self.metrics
                    .transaction_committed(name, started.elapsed().as_secs_f64());
                match committed {
                    Ok(()) => Ok(value),
                    Err(e) => {
                        tracing::error!(name = %name, error = %e, "Transaction commit failed");
                        Err(TransactionError::Commit(e))
                    }
                }
            }
            Err(cause) => {
                self.metrics.transaction_rolled_back(name);
                tracing::error!(name = %name, error = %cause, "Transaction failed, rolling back");

                // Fresh deadline, the unit of work may have spent the
                // transaction's. A rollback cut short drops the connection.
                let (rollback_ctx, _rollback_cancel) =
                    OperationContext::with_timeout(&CancellationToken::new(), self.query_timeout);
                match rollback_ctx.run(tx.into_inner().rollback()).await {
                    Ok(()) | Err(DbError::TransactionClosed) => {
                        Err(TransactionError::Aborted(cause))
                    }
                    Err(rollback) => {
                        tracing::error!(name = %name, error = %rollback, "Transaction rollback failed");
                        Err(TransactionError::RollbackFailed { rollback, cause })
                    }
                }
            }
        }
    }

    pub fn stats(&self) -> PoolStats {
        self.backend.stats()
    }

    /// Sample pool occupancy every `period` until `token` is cancelled.
    pub fn spawn_supervisor(
        self: &Arc<Self>,
        period: Duration,
        token: CancellationToken,
    ) -> JoinHandle<()> {
        let pool = Arc::clone(self);
        tokio::spawn(async move {
            let mut timer = tokio::time::interval(period);
            tracing::info!(period_secs = period.as_secs(), "Pool supervisor started");

            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = timer.tick() => {
                        let stats = pool.stats();
                        pool.conn_metrics.observe_pool_state(stats.size, stats.idle);
                        tracing::debug!(size = stats.size, idle = stats.idle, "Pool state");
                    }
                }
            }

            tracing::info!("Pool supervisor stopped");
        })
    }

    /// Close every connection. Outstanding operations fail afterwards.
    pub async fn close(&self) {
        self.backend.close().await;
    }
}

impl fmt::Debug for ConnectionPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionPool")
            .field("stats", &self.stats())
            .field("query_timeout", &self.query_timeout)
            .finish()
    }
}
