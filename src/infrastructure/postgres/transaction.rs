//! Transaction options and the scope handed to a unit of work.

use std::fmt;
use std::time::Instant;

use super::backend::BackendTransaction;
use super::context::OperationContext;
use super::error::DbError;
use super::monitoring::MonitoringMetrics;
use super::named_args::{BoundQuery, NamedArgs};
use super::rows::{Rows, SingleRow};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IsoLevel {
    Serializable,
    RepeatableRead,
    ReadCommitted,
    ReadUncommitted,
}

impl fmt::Display for IsoLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            IsoLevel::Serializable => "SERIALIZABLE",
            IsoLevel::RepeatableRead => "REPEATABLE READ",
            IsoLevel::ReadCommitted => "READ COMMITTED",
            IsoLevel::ReadUncommitted => "READ UNCOMMITTED",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessMode {
    ReadWrite,
    ReadOnly,
}

impl fmt::Display for AccessMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AccessMode::ReadWrite => f.write_str("READ WRITE"),
            AccessMode::ReadOnly => f.write_str("READ ONLY"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeferrableMode {
    Deferrable,
    NotDeferrable,
}

impl fmt::Display for DeferrableMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeferrableMode::Deferrable => f.write_str("DEFERRABLE"),
            DeferrableMode::NotDeferrable => f.write_str("NOT DEFERRABLE"),
        }
    }
}

/// Options rendered into the transaction's `BEGIN` statement.
///
/// Unset modes fall back to the server defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TxOptions {
    pub iso_level: Option<IsoLevel>,
    pub access_mode: Option<AccessMode>,
    pub deferrable_mode: Option<DeferrableMode>,
    /// Replaces the generated statement entirely when set.
    pub begin_query: Option<String>,
}

impl TxOptions {
    pub fn read_only() -> Self {
        Self {
            access_mode: Some(AccessMode::ReadOnly),
            ..Self::default()
        }
    }

    pub fn begin_statement(&self) -> String {
        if let Some(query) = &self.begin_query {
            return query.clone();
        }

        let mut statement = String::from("BEGIN");
        if let Some(level) = self.iso_level {
            statement.push_str(&format!(" ISOLATION LEVEL {}", level));
        }
        if let Some(mode) = self.access_mode {
            statement.push_str(&format!(" {}", mode));
        }
        if let Some(mode) = self.deferrable_mode {
            statement.push_str(&format!(" {}", mode));
        }
        statement
    }
}

/// Scope of one in-flight transaction.
///
/// Only reachable through the `&mut` borrow handed to a unit of work by
/// [`ConnectionPool::with_transaction`](super::ConnectionPool::with_transaction).
/// Queries run against the transaction's own deadline.
pub struct Transaction {
    pub(crate) inner: Box<dyn BackendTransaction>,
    ctx: OperationContext,
    metrics: MonitoringMetrics,
}

impl Transaction {
    pub(crate) fn new(
        inner: Box<dyn BackendTransaction>,
        ctx: OperationContext,
        metrics: MonitoringMetrics,
    ) -> Self {
        Self {
            inner,
            ctx,
            metrics,
        }
    }

    pub(crate) fn into_inner(self) -> Box<dyn BackendTransaction> {
        self.inner
    }

    pub async fn query(
        &mut self,
        operation: &str,
        sql: &str,
        args: NamedArgs,
    ) -> Result<Rows, DbError> {
        let (ctx, cancel) = self.ctx.child();
        let bound = BoundQuery::new(sql, args);
        let started = Instant::now();

        match ctx.run(self.inner.fetch_all(bound)).await {
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

    pub async fn query_row(&mut self, operation: &str, sql: &str, args: NamedArgs) -> SingleRow {
        let (ctx, cancel) = self.ctx.child();
        let bound = BoundQuery::new(sql, args);
        let started = Instant::now();

        let result = ctx.run(self.inner.fetch_optional(bound)).await;
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
}
