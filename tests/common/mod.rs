//! In-memory fakes shared by the integration tests.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use clients_service::postgres::{
    Backend, BackendTransaction, BoundQuery, ConnectionMetrics, DbError, PoolStats, QueryMetrics,
    QueryOutcome, Record, TransactionMetrics, TransactionOutcome, TxOptions,
};

/// Every call that reached the backend, in order.
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Query(BoundQuery),
    Begin(String),
    Commit,
    Rollback,
}

#[derive(Default)]
struct Script {
    results: VecDeque<Result<Vec<Record>, DbError>>,
    begin_error: Option<DbError>,
    commit_error: Option<DbError>,
    rollback_error: Option<DbError>,
    rollback_delay: Option<Duration>,
    calls: Vec<Call>,
}

/// Backend answering from a script. Unscripted queries return no rows.
#[derive(Clone, Default)]
pub struct FakeBackend {
    script: Arc<Mutex<Script>>,
    delay: Option<Duration>,
    stats: PoolStats,
}

impl FakeBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every query by `delay`.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn with_stats(mut self, size: u32, idle: usize) -> Self {
        self.stats = PoolStats { size, idle };
        self
    }

    pub fn push_rows(&self, rows: Vec<Record>) {
        self.script.lock().unwrap().results.push_back(Ok(rows));
    }

    pub fn push_error(&self, error: DbError) {
        self.script.lock().unwrap().results.push_back(Err(error));
    }

    pub fn fail_begin(&self, error: DbError) {
        self.script.lock().unwrap().begin_error = Some(error);
    }

    pub fn fail_commit(&self, error: DbError) {
        self.script.lock().unwrap().commit_error = Some(error);
    }

    pub fn fail_rollback(&self, error: DbError) {
        self.script.lock().unwrap().rollback_error = Some(error);
    }

    /// Make the next rollback hang for `delay`.
    pub fn stall_rollback(&self, delay: Duration) {
        self.script.lock().unwrap().rollback_delay = Some(delay);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.script.lock().unwrap().calls.clone()
    }

    async fn next(&self, query: BoundQuery) -> Result<Vec<Record>, DbError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let mut script = self.script.lock().unwrap();
        script.calls.push(Call::Query(query));
        script.results.pop_front().unwrap_or_else(|| Ok(Vec::new()))
    }

    fn record(&self, call: Call) {
        self.script.lock().unwrap().calls.push(call);
    }
}

#[async_trait]
impl Backend for FakeBackend {
    async fn fetch_all(&self, query: BoundQuery) -> Result<Vec<Record>, DbError> {
        self.next(query).await
    }

    async fn fetch_optional(&self, query: BoundQuery) -> Result<Option<Record>, DbError> {
        Ok(self.next(query).await?.into_iter().next())
    }

    async fn begin(&self, options: &TxOptions) -> Result<Box<dyn BackendTransaction>, DbError> {
        self.record(Call::Begin(options.begin_statement()));
        if let Some(e) = self.script.lock().unwrap().begin_error.take() {
            return Err(e);
        }
        Ok(Box::new(FakeTransaction {
            backend: self.clone(),
        }))
    }

    fn stats(&self) -> PoolStats {
        self.stats
    }

    async fn close(&self) {}
}

pub struct FakeTransaction {
    backend: FakeBackend,
}

#[async_trait]
impl BackendTransaction for FakeTransaction {
    async fn fetch_all(&mut self, query: BoundQuery) -> Result<Vec<Record>, DbError> {
        self.backend.next(query).await
    }

    async fn fetch_optional(&mut self, query: BoundQuery) -> Result<Option<Record>, DbError> {
        Ok(self.backend.next(query).await?.into_iter().next())
    }

    async fn commit(self: Box<Self>) -> Result<(), DbError> {
        self.backend.record(Call::Commit);
        match self.backend.script.lock().unwrap().commit_error.take() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    async fn rollback(self: Box<Self>) -> Result<(), DbError> {
        self.backend.record(Call::Rollback);
        let delay = self.backend.script.lock().unwrap().rollback_delay.take();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        match self.backend.script.lock().unwrap().rollback_error.take() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

/// Metrics sink counting every increment by label.
#[derive(Default)]
pub struct RecordingMetrics {
    queries: Mutex<Vec<(QueryOutcome, String)>>,
    query_durations: Mutex<Vec<String>>,
    transactions: Mutex<Vec<(TransactionOutcome, String)>>,
    transaction_durations: Mutex<Vec<String>>,
    pool_states: Mutex<Vec<(u32, usize)>>,
    connections: Mutex<i64>,
}

impl RecordingMetrics {
    pub fn queries(&self, outcome: QueryOutcome, operation: &str) -> usize {
        self.queries
            .lock()
            .unwrap()
            .iter()
            .filter(|(o, op)| *o == outcome && op == operation)
            .count()
    }

    pub fn query_durations(&self, operation: &str) -> usize {
        self.query_durations
            .lock()
            .unwrap()
            .iter()
            .filter(|op| *op == operation)
            .count()
    }

    pub fn transactions(&self, outcome: TransactionOutcome, name: &str) -> usize {
        self.transactions
            .lock()
            .unwrap()
            .iter()
            .filter(|(o, n)| *o == outcome && n == name)
            .count()
    }

    pub fn transaction_durations(&self, name: &str) -> usize {
        self.transaction_durations
            .lock()
            .unwrap()
            .iter()
            .filter(|n| *n == name)
            .count()
    }

    pub fn pool_states(&self) -> Vec<(u32, usize)> {
        self.pool_states.lock().unwrap().clone()
    }

    pub fn connections(&self) -> i64 {
        *self.connections.lock().unwrap()
    }
}

impl QueryMetrics for RecordingMetrics {
    fn observe_query_duration(&self, _seconds: f64, operation: &str) {
        self.query_durations
            .lock()
            .unwrap()
            .push(operation.to_string());
    }

    fn inc_query_counter(&self, outcome: QueryOutcome, operation: &str) {
        self.queries
            .lock()
            .unwrap()
            .push((outcome, operation.to_string()));
    }
}

impl TransactionMetrics for RecordingMetrics {
    fn observe_transaction_duration(&self, _seconds: f64, name: &str) {
        self.transaction_durations
            .lock()
            .unwrap()
            .push(name.to_string());
    }

    fn inc_transaction_counter(&self, outcome: TransactionOutcome, name: &str) {
        self.transactions
            .lock()
            .unwrap()
            .push((outcome, name.to_string()));
    }
}

impl ConnectionMetrics for RecordingMetrics {
    fn inc_connections(&self) {
        *self.connections.lock().unwrap() += 1;
    }

    fn dec_connections(&self) {
        *self.connections.lock().unwrap() -= 1;
    }

    fn observe_pool_state(&self, size: u32, idle: usize) {
        self.pool_states.lock().unwrap().push((size, idle));
    }
}
