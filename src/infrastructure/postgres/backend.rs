//! Storage seam of the connection pool.
//!
//! [`ConnectionPool`](super::ConnectionPool) owns deadlines, metrics and
//! transaction bookkeeping; a [`Backend`] only executes already bound
//! statements. [`PgBackend`] is the sqlx implementation.

use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use sqlx::pool::PoolConnection;
use sqlx::postgres::{
    PgArguments, PgConnectOptions, PgPool, PgPoolOptions, PgRow, PgSslMode,
};
use sqlx::query::Query;
use sqlx::{Column, Executor, Postgres, Row, TypeInfo, ValueRef};

use super::config::PoolConfig;
use super::error::DbError;
use super::monitoring::ConnectionMetrics;
use super::named_args::BoundQuery;
use super::transaction::TxOptions;
use super::value::{Record, SqlValue};

/// Point-in-time pool occupancy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Open connections, idle and in use.
    pub size: u32,
    pub idle: usize,
}

#[async_trait]
pub trait Backend: Send + Sync {
    async fn fetch_all(&self, query: BoundQuery) -> Result<Vec<Record>, DbError>;

    async fn fetch_optional(&self, query: BoundQuery) -> Result<Option<Record>, DbError>;

    /// Start a transaction on a dedicated connection.
    async fn begin(&self, options: &TxOptions) -> Result<Box<dyn BackendTransaction>, DbError>;

    fn stats(&self) -> PoolStats;

    async fn close(&self);
}

/// A started transaction holding its connection until commit or rollback.
#[async_trait]
pub trait BackendTransaction: Send {
    async fn fetch_all(&mut self, query: BoundQuery) -> Result<Vec<Record>, DbError>;

    async fn fetch_optional(&mut self, query: BoundQuery) -> Result<Option<Record>, DbError>;

    async fn commit(self: Box<Self>) -> Result<(), DbError>;

    async fn rollback(self: Box<Self>) -> Result<(), DbError>;
}

/// sqlx-backed PostgreSQL backend.
///
/// Connection lifetime and idle limits are enforced through the pool hooks
/// so that closes are reported to the connection metrics. Closes sqlx does
/// on its own (reaper, failed pings) are picked up by the pool supervisor.
pub struct PgBackend {
    pool: PgPool,
    conn_metrics: Arc<dyn ConnectionMetrics>,
}

impl PgBackend {
    /// Open the pool and establish `min_conns` connections.
    pub async fn connect(
        config: &PoolConfig,
        conn_metrics: Arc<dyn ConnectionMetrics>,
    ) -> Result<Self, DbError> {
        let ssl_mode = PgSslMode::from_str(&config.ssl_mode)
            .map_err(|e| DbError::Config(format!("invalid ssl_mode: {}", e)))?;

        let connect_options = PgConnectOptions::from_str(&config.connection_url)
            .map_err(|e| DbError::Config(format!("invalid connection url: {}", e)))?
            .ssl_mode(ssl_mode)
            .statement_cache_capacity(config.statement_cache_capacity);

        let max_lifetime = config.max_conn_lifetime;
        let max_idle = config.max_conn_idle_time;

        let on_connect = conn_metrics.clone();
        let on_acquire = conn_metrics.clone();
        let on_release = conn_metrics.clone();

        let pool = PgPoolOptions::new()
            .max_connections(config.max_conns)
            .min_connections(config.min_conns)
            .acquire_timeout(config.query_timeout)
            // lifetime retirement is done by the hooks below; the reaper
            // closes idle connections nobody acquires
            .max_lifetime(None)
            .idle_timeout(max_idle)
            .test_before_acquire(true)
            .after_connect(move |_conn, _meta| {
                let metrics = on_connect.clone();
                Box::pin(async move {
                    metrics.inc_connections();
                    Ok(())
                })
            })
            .before_acquire(move |_conn, meta| {
                let metrics = on_acquire.clone();
                Box::pin(async move {
                    if meta.age >= max_lifetime || meta.idle_for >= max_idle {
                        metrics.dec_connections();
                        return Ok(false);
                    }
                    Ok(true)
                })
            })
            .after_release(move |_conn, meta| {
                let metrics = on_release.clone();
                Box::pin(async move {
                    if meta.age >= max_lifetime {
                        metrics.dec_connections();
                        return Ok(false);
                    }
                    Ok(true)
                })
            })
            .connect_with(connect_options)
            .await
            .map_err(|source| DbError::Connect {
                url: config.masked_url(),
                source,
            })?;

        tracing::info!(
            url = %config.masked_url(),
            min_conns = config.min_conns,
            max_conns = config.max_conns,
            "PostgreSQL connection pool created"
        );

        Ok(Self { pool, conn_metrics })
    }
}

#[async_trait]
impl Backend for PgBackend {
    async fn fetch_all(&self, query: BoundQuery) -> Result<Vec<Record>, DbError> {
        let BoundQuery { sql, params } = query;
        let rows = bind_all(sqlx::query(&sql), params)
            .fetch_all(&self.pool)
            .await?;
        decode_rows(&rows)
    }

    async fn fetch_optional(&self, query: BoundQuery) -> Result<Option<Record>, DbError> {
        let BoundQuery { sql, params } = query;
        let row = bind_all(sqlx::query(&sql), params)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(|r| decode_row(r, column_names(r))).transpose()
    }

    async fn begin(&self, options: &TxOptions) -> Result<Box<dyn BackendTransaction>, DbError> {
        let conn = self.pool.acquire().await?;
        // wrapped before BEGIN runs so an interrupted begin closes the connection
        let mut tx = Box::new(PgBackendTransaction {
            conn: Some(conn),
            conn_metrics: self.conn_metrics.clone(),
        });
        let statement = options.begin_statement();
        (&mut **tx.conn()?).execute(statement.as_str()).await?;

        Ok(tx as Box<dyn BackendTransaction>)
    }

    fn stats(&self) -> PoolStats {
        PoolStats {
            size: self.pool.size(),
            idle: self.pool.num_idle(),
        }
    }

    async fn close(&self) {
        for _ in 0..self.pool.size() {
            self.conn_metrics.dec_connections();
        }
        self.pool.close().await;
        tracing::info!("PostgreSQL connection pool closed");
    }
}

/// Transaction on a connection taken out of the pool.
///
/// A connection whose transaction was neither committed nor rolled back,
/// or whose commit or rollback failed, is detached and closed instead of
/// being returned to the pool in an unknown state.
struct PgBackendTransaction {
    conn: Option<PoolConnection<Postgres>>,
    conn_metrics: Arc<dyn ConnectionMetrics>,
}

impl PgBackendTransaction {
    fn conn(&mut self) -> Result<&mut PoolConnection<Postgres>, DbError> {
        self.conn.as_mut().ok_or(DbError::TransactionClosed)
    }

    async fn finish(mut self: Box<Self>, statement: &str) -> Result<(), DbError> {
        let conn = self.conn()?;
        let result = (&mut **conn).execute(statement).await;
        match result {
            Ok(_) => {
                // back to the pool
                self.conn.take();
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl BackendTransaction for PgBackendTransaction {
    async fn fetch_all(&mut self, query: BoundQuery) -> Result<Vec<Record>, DbError> {
        let BoundQuery { sql, params } = query;
        let conn = self.conn()?;
        let rows = bind_all(sqlx::query(&sql), params)
            .fetch_all(&mut **conn)
            .await?;
        decode_rows(&rows)
    }

    async fn fetch_optional(&mut self, query: BoundQuery) -> Result<Option<Record>, DbError> {
        let BoundQuery { sql, params } = query;
        let conn = self.conn()?;
        let row = bind_all(sqlx::query(&sql), params)
            .fetch_optional(&mut **conn)
            .await?;
        row.as_ref().map(|r| decode_row(r, column_names(r))).transpose()
    }

    async fn commit(self: Box<Self>) -> Result<(), DbError> {
        self.finish("COMMIT").await
    }

    async fn rollback(self: Box<Self>) -> Result<(), DbError> {
        self.finish("ROLLBACK").await
    }
}

impl Drop for PgBackendTransaction {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            tracing::warn!("Closing connection with an unfinished transaction");
            drop(conn.detach());
            self.conn_metrics.dec_connections();
        }
    }
}

fn bind_all<'q>(
    mut query: Query<'q, Postgres, PgArguments>,
    params: Vec<SqlValue>,
) -> Query<'q, Postgres, PgArguments> {
    for param in params {
        query = match param {
            SqlValue::Null => query.bind(None::<String>),
            SqlValue::Bool(v) => query.bind(v),
            SqlValue::Int(v) => query.bind(v),
            SqlValue::Float(v) => query.bind(v),
            SqlValue::Text(v) => query.bind(v),
            SqlValue::Uuid(v) => query.bind(v),
            SqlValue::Timestamp(v) => query.bind(v),
            SqlValue::Date(v) => query.bind(v),
            SqlValue::Json(v) => query.bind(v),
        };
    }
    query
}

fn column_names(row: &PgRow) -> Arc<[String]> {
    row.columns()
        .iter()
        .map(|c| c.name().to_string())
        .collect::<Vec<_>>()
        .into()
}

fn decode_rows(rows: &[PgRow]) -> Result<Vec<Record>, DbError> {
    let Some(first) = rows.first() else {
        return Ok(Vec::new());
    };
    let columns = column_names(first);
    rows.iter()
        .map(|row| decode_row(row, columns.clone()))
        .collect()
}

fn decode_row(row: &PgRow, columns: Arc<[String]>) -> Result<Record, DbError> {
    let values = (0..row.len())
        .map(|idx| decode_value(row, idx))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Record::new(columns, values))
}

fn decode_value(row: &PgRow, idx: usize) -> Result<SqlValue, DbError> {
    if row.try_get_raw(idx)?.is_null() {
        return Ok(SqlValue::Null);
    }

    let column = &row.columns()[idx];
    let value = match column.type_info().name() {
        "BOOL" => SqlValue::Bool(row.try_get(idx)?),
        "INT2" => SqlValue::Int(row.try_get::<i16, _>(idx)?.into()),
        "INT4" => SqlValue::Int(row.try_get::<i32, _>(idx)?.into()),
        "INT8" => SqlValue::Int(row.try_get(idx)?),
        "FLOAT4" => SqlValue::Float(row.try_get::<f32, _>(idx)?.into()),
        "FLOAT8" => SqlValue::Float(row.try_get(idx)?),
        "UUID" => SqlValue::Uuid(row.try_get(idx)?),
        "TIMESTAMPTZ" => SqlValue::Timestamp(row.try_get(idx)?),
        "TIMESTAMP" => {
            SqlValue::Timestamp(row.try_get::<chrono::NaiveDateTime, _>(idx)?.and_utc())
        }
        "DATE" => SqlValue::Date(row.try_get(idx)?),
        "JSON" | "JSONB" => SqlValue::Json(row.try_get(idx)?),
        "TEXT" | "VARCHAR" | "BPCHAR" | "NAME" | "CITEXT" | "UNKNOWN" => {
            SqlValue::Text(row.try_get(idx)?)
        }
        other => {
            return Err(DbError::Decode {
                column: column.name().to_string(),
                message: format!("unsupported column type {}", other),
            })
        }
    };
    Ok(value)
}
