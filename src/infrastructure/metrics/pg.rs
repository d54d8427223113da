//! PostgreSQL metrics backing the pool's metric ports.

use prometheus::{
    HistogramOpts, HistogramVec, IntCounterVec, IntGauge, IntGaugeVec, Opts, Registry,
};

use crate::postgres::{
    ConnectionMetrics, QueryMetrics, QueryOutcome, TransactionMetrics, TransactionOutcome,
};

use super::PG_DURATION_BUCKETS;

/// Prometheus implementation of the query, transaction and connection ports.
#[derive(Clone)]
pub struct PgMetrics {
    queries: IntCounterVec,
    query_duration: HistogramVec,
    transactions: IntCounterVec,
    transaction_duration: HistogramVec,
    open_connections: IntGaugeVec,
    idle_connections: IntGauge,
}

impl PgMetrics {
    /// Create and register all PostgreSQL metrics under `subsystem`.
    pub fn register(subsystem: &str, registry: &Registry) -> Result<Self, prometheus::Error> {
        let queries = IntCounterVec::new(
            Opts::new(
                "pg_queries",
                "Number of queries executed on PG partitioned by success/error result and function name",
            )
            .subsystem(subsystem),
            &["result", "pg_func_name"],
        )?;

        let query_duration = HistogramVec::new(
            HistogramOpts::new(
                "pg_query_duration",
                "Duration of queries to PG partitioned by function name",
            )
            .subsystem(subsystem)
            .buckets(PG_DURATION_BUCKETS.to_vec()),
            &["pg_func_name"],
        )?;

        let transactions = IntCounterVec::new(
            Opts::new(
                "pg_transactions",
                "Number of transactions executed on PG partitioned by commit/rollback result and transaction name",
            )
            .subsystem(subsystem),
            &["result", "pg_transaction_name"],
        )?;

        let transaction_duration = HistogramVec::new(
            HistogramOpts::new(
                "pg_transaction_duration",
                "Duration of PG transactions partitioned by transaction name",
            )
            .subsystem(subsystem)
            .buckets(PG_DURATION_BUCKETS.to_vec()),
            &["pg_transaction_name"],
        )?;

        let open_connections = IntGaugeVec::new(
            Opts::new(
                "open_connections",
                "Count of currently open connections to postgres DB",
            )
            .subsystem(subsystem),
            &["system"],
        )?;

        let idle_connections = IntGauge::with_opts(
            Opts::new(
                "pool_idle_connections",
                "Idle connections in the postgres pool at the last supervisor tick",
            )
            .subsystem(subsystem),
        )?;

        registry.register(Box::new(queries.clone()))?;
        registry.register(Box::new(query_duration.clone()))?;
        registry.register(Box::new(transactions.clone()))?;
        registry.register(Box::new(transaction_duration.clone()))?;
        registry.register(Box::new(open_connections.clone()))?;
        registry.register(Box::new(idle_connections.clone()))?;

        open_connections.with_label_values(&["postgres"]).set(0);

        Ok(Self {
            queries,
            query_duration,
            transactions,
            transaction_duration,
            open_connections,
            idle_connections,
        })
    }

    pub fn open_connections(&self) -> i64 {
        self.open_connections.with_label_values(&["postgres"]).get()
    }

    pub fn query_count(&self, outcome: QueryOutcome, operation: &str) -> u64 {
        self.queries
            .with_label_values(&[outcome.as_str(), operation])
            .get()
    }

    pub fn transaction_count(&self, outcome: TransactionOutcome, name: &str) -> u64 {
        self.transactions
            .with_label_values(&[outcome.as_str(), name])
            .get()
    }
}

impl QueryMetrics for PgMetrics {
    fn observe_query_duration(&self, seconds: f64, operation: &str) {
        self.query_duration
            .with_label_values(&[operation])
            .observe(seconds);
    }

    fn inc_query_counter(&self, outcome: QueryOutcome, operation: &str) {
        self.queries
            .with_label_values(&[outcome.as_str(), operation])
            .inc();
    }
}

impl TransactionMetrics for PgMetrics {
    fn observe_transaction_duration(&self, seconds: f64, name: &str) {
        self.transaction_duration
            .with_label_values(&[name])
            .observe(seconds);
    }

    fn inc_transaction_counter(&self, outcome: TransactionOutcome, name: &str) {
        self.transactions
            .with_label_values(&[outcome.as_str(), name])
            .inc();
    }
}

impl ConnectionMetrics for PgMetrics {
    fn inc_connections(&self) {
        self.open_connections.with_label_values(&["postgres"]).inc();
    }

    fn dec_connections(&self) {
        self.open_connections.with_label_values(&["postgres"]).dec();
    }

    fn observe_pool_state(&self, size: u32, idle: usize) {
        self.open_connections
            .with_label_values(&["postgres"])
            .set(i64::from(size));
        self.idle_connections.set(idle as i64);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::encode_metrics;

    #[test]
    fn test_register_exposes_families() {
        let registry = Registry::new();
        let metrics = PgMetrics::register("clients", &registry).unwrap();
        metrics.inc_query_counter(QueryOutcome::Success, "GetClient");
        metrics.observe_query_duration(0.02, "GetClient");
        metrics.inc_transaction_counter(TransactionOutcome::Commit, "CreateClient");
        metrics.observe_transaction_duration(0.3, "CreateClient");

        let output = encode_metrics(&registry).unwrap();
        assert!(output.contains("clients_pg_queries{pg_func_name=\"GetClient\",result=\"success\"} 1"));
        assert!(output.contains("clients_pg_query_duration_bucket"));
        assert!(output.contains("clients_pg_transactions"));
        assert!(output.contains("clients_pg_transaction_duration_bucket{pg_transaction_name=\"CreateClient\",le=\"1.5\"} 1"));
        assert!(output.contains("clients_open_connections{system=\"postgres\"} 0"));
        assert!(output.contains("clients_pool_idle_connections"));
    }

    #[test]
    fn test_connection_gauge() {
        let registry = Registry::new();
        let metrics = PgMetrics::register("clients", &registry).unwrap();
        metrics.inc_connections();
        metrics.inc_connections();
        metrics.dec_connections();
        assert_eq!(metrics.open_connections(), 1);
    }

    #[test]
    fn test_pool_state_resyncs_connection_gauge() {
        let registry = Registry::new();
        let metrics = PgMetrics::register("clients", &registry).unwrap();
        for _ in 0..5 {
            metrics.inc_connections();
        }
        // two connections closed without a hook
        metrics.observe_pool_state(3, 1);
        assert_eq!(metrics.open_connections(), 3);

        let output = encode_metrics(&registry).unwrap();
        assert!(output.contains("clients_pool_idle_connections 1"));
    }

    #[test]
    fn test_counters_by_label() {
        let registry = Registry::new();
        let metrics = PgMetrics::register("clients", &registry).unwrap();
        metrics.inc_query_counter(QueryOutcome::Error, "CreateClient");
        assert_eq!(metrics.query_count(QueryOutcome::Error, "CreateClient"), 1);
        assert_eq!(metrics.query_count(QueryOutcome::Success, "CreateClient"), 0);
    }
}
