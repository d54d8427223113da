//! Metric ports consumed by the connection pool.
//!
//! The pool only knows these traits; the Prometheus implementation lives in
//! [`crate::metrics`]. Implementations must be safe to call concurrently.

use std::sync::Arc;

/// Result label of a query counter increment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryOutcome {
    Success,
    Error,
}

impl QueryOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueryOutcome::Success => "success",
            QueryOutcome::Error => "error",
        }
    }
}

/// Result label of a transaction counter increment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionOutcome {
    Commit,
    Rollback,
}

impl TransactionOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionOutcome::Commit => "commit",
            TransactionOutcome::Rollback => "rollback",
        }
    }
}

pub trait QueryMetrics: Send + Sync {
    /// Observe the elapsed seconds of a successful query.
    fn observe_query_duration(&self, seconds: f64, operation: &str);
    fn inc_query_counter(&self, outcome: QueryOutcome, operation: &str);
}

pub trait TransactionMetrics: Send + Sync {
    /// Observe the elapsed seconds of a committed transaction.
    fn observe_transaction_duration(&self, seconds: f64, name: &str);
    fn inc_transaction_counter(&self, outcome: TransactionOutcome, name: &str);
}

pub trait ConnectionMetrics: Send + Sync {
    /// A physical connection was opened.
    fn inc_connections(&self);
    /// A physical connection was closed.
    fn dec_connections(&self);
    /// Periodic occupancy sample taken by the pool supervisor. `size` is
    /// authoritative and corrects drift in the open connection count.
    fn observe_pool_state(&self, _size: u32, _idle: usize) {}
}

/// Connection metrics sink that discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopConnectionMetrics;

impl ConnectionMetrics for NoopConnectionMetrics {
    fn inc_connections(&self) {}
    fn dec_connections(&self) {}
}

/// Metrics wired into the pool after construction.
///
/// `None` leaves the currently registered instance in place.
#[derive(Clone, Default)]
pub struct RegisterMetricsOptions {
    pub query: Option<Arc<dyn QueryMetrics>>,
    pub transaction: Option<Arc<dyn TransactionMetrics>>,
}

/// Registered metric instances, cloned into every transaction scope.
#[derive(Clone, Default)]
pub(crate) struct MonitoringMetrics {
    query: Option<Arc<dyn QueryMetrics>>,
    transaction: Option<Arc<dyn TransactionMetrics>>,
}

impl MonitoringMetrics {
    pub(crate) fn register(&mut self, options: RegisterMetricsOptions) {
        if let Some(query) = options.query {
            self.query = Some(query);
        }
        if let Some(transaction) = options.transaction {
            self.transaction = Some(transaction);
        }
    }

    pub(crate) fn query_succeeded(&self, operation: &str, seconds: f64) {
        if let Some(m) = &self.query {
            m.observe_query_duration(seconds, operation);
            m.inc_query_counter(QueryOutcome::Success, operation);
        }
    }

    pub(crate) fn query_failed(&self, operation: &str) {
        if let Some(m) = &self.query {
            m.inc_query_counter(QueryOutcome::Error, operation);
        }
    }

    pub(crate) fn transaction_committed(&self, name: &str, seconds: f64) {
        if let Some(m) = &self.transaction {
            m.inc_transaction_counter(TransactionOutcome::Commit, name);
            m.observe_transaction_duration(seconds, name);
        }
    }

    pub(crate) fn transaction_rolled_back(&self, name: &str) {
        if let Some(m) = &self.transaction {
            m.inc_transaction_counter(TransactionOutcome::Rollback, name);
        }
    }
}
