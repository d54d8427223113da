//! Query results handed back to callers.

use super::context::CancelHandle;
use super::error::DbError;
use super::value::Record;

/// Rows of a multi-row query.
///
/// Holds the operation's cancellation scope until dropped.
#[derive(Debug)]
pub struct Rows {
    records: Vec<Record>,
    cancel: CancelHandle,
}

impl Rows {
    pub(crate) fn new(records: Vec<Record>, cancel: CancelHandle) -> Self {
        Self { records, cancel }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Record> {
        self.records.iter()
    }

    /// Release the operation's scope early. Safe to call repeatedly.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn into_records(self) -> Vec<Record> {
        self.records
    }
}

impl IntoIterator for Rows {
    type Item = Record;
    type IntoIter = std::vec::IntoIter<Record>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.into_iter()
    }
}

impl<'a> IntoIterator for &'a Rows {
    type Item = &'a Record;
    type IntoIter = std::slice::Iter<'a, Record>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.iter()
    }
}

/// Result of a single-row query, resolved when scanned.
#[derive(Debug)]
pub struct SingleRow {
    result: Result<Option<Record>, DbError>,
    cancel: CancelHandle,
}

impl SingleRow {
    pub(crate) fn new(result: Result<Option<Record>, DbError>, cancel: CancelHandle) -> Self {
        Self { result, cancel }
    }

    /// The row, [`DbError::NoRows`] when the query matched nothing, or the
    /// query's own error.
    pub fn scan(self) -> Result<Record, DbError> {
        self.result.and_then(|row| row.ok_or(DbError::NoRows))
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::postgres::{OperationContext, SqlValue};
    use std::time::Duration;
    use tokio_util::sync::CancellationToken;

    fn handle() -> CancelHandle {
        OperationContext::with_timeout(&CancellationToken::new(), Duration::from_secs(1)).1
    }

    #[tokio::test]
    async fn test_scan_empty_result_is_no_rows() {
        let row = SingleRow::new(Ok(None), handle());
        assert!(row.scan().unwrap_err().is_no_rows());
    }

    #[tokio::test]
    async fn test_scan_passes_errors_through() {
        let row = SingleRow::new(Err(DbError::Cancelled), handle());
        assert!(matches!(row.scan(), Err(DbError::Cancelled)));
    }

    #[tokio::test]
    async fn test_rows_iteration_and_cancel() {
        let records = vec![
            Record::from_pairs([("n", SqlValue::Int(1))]),
            Record::from_pairs([("n", SqlValue::Int(2))]),
        ];
        let rows = Rows::new(records, handle());
        rows.cancel();
        rows.cancel();
        assert_eq!(rows.len(), 2);

        let sum: i64 = rows
            .into_iter()
            .map(|r| r.get::<i64>("n").unwrap())
            .sum();
        assert_eq!(sum, 3);
    }
}
