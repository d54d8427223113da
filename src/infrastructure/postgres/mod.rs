//! Instrumented PostgreSQL data access.
//!
//! Pooled connections with bounded lifetime, per-operation deadlines,
//! metrics emission and transaction-scoped commit/rollback.

pub mod backend;
pub mod config;
pub mod context;
pub mod error;
pub mod indicator;
pub mod monitoring;
pub mod named_args;
pub mod pool;
pub mod rows;
pub mod transaction;
pub mod value;

pub use backend::{Backend, BackendTransaction, PgBackend, PoolStats};
pub use config::PoolConfig;
pub use context::{CancelHandle, OperationContext};
pub use error::{DbError, TransactionError, UNIQUE_VIOLATION};
pub use indicator::PostgresIndicator;
pub use monitoring::{
    ConnectionMetrics, NoopConnectionMetrics, QueryMetrics, QueryOutcome, RegisterMetricsOptions,
    TransactionMetrics, TransactionOutcome,
};
pub use named_args::{BoundQuery, NamedArgs};
pub use pool::ConnectionPool;
pub use rows::{Rows, SingleRow};
pub use transaction::{AccessMode, DeferrableMode, IsoLevel, Transaction, TxOptions};
pub use value::{FromSqlValue, Record, SqlValue};
