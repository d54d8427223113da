//! Per-operation deadline and cancellation scope.

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use super::error::DbError;

/// Deadline plus cancellation scope derived from a caller's token.
///
/// Every pool operation creates one from the configured query timeout.
/// Transaction scopes share the context of their enclosing transaction.
#[derive(Debug, Clone)]
pub struct OperationContext {
    token: CancellationToken,
    deadline: Instant,
    timeout: Duration,
}

impl OperationContext {
    /// Derive a child scope of `parent` that expires after `timeout`.
    pub fn with_timeout(parent: &CancellationToken, timeout: Duration) -> (Self, CancelHandle) {
        let token = parent.child_token();
        let ctx = Self {
            token: token.clone(),
            deadline: Instant::now() + timeout,
            timeout,
        };
        (ctx, CancelHandle { token })
    }

    /// Derive a nested scope sharing this context's deadline.
    pub fn child(&self) -> (Self, CancelHandle) {
        let token = self.token.child_token();
        let ctx = Self {
            token: token.clone(),
            deadline: self.deadline,
            timeout: self.timeout,
        };
        (ctx, CancelHandle { token })
    }

    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Drive `fut` until it completes, the deadline passes or the scope is cancelled.
    pub async fn run<T, F>(&self, fut: F) -> Result<T, DbError>
    where
        F: Future<Output = Result<T, DbError>>,
    {
        tokio::select! {
            biased;
            _ = self.token.cancelled() => Err(DbError::Cancelled),
            _ = tokio::time::sleep_until(self.deadline) => Err(DbError::Timeout(self.timeout)),
            result = fut => result,
        }
    }
}

/// Releases an operation's cancellation scope.
///
/// Released on drop; `cancel` may be called any number of times.
#[derive(Debug)]
pub struct CancelHandle {
    token: CancellationToken,
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_released(&self) -> bool {
        self.token.is_cancelled()
    }
}

impl Drop for CancelHandle {
    fn drop(&mut self) {
        self.token.cancel();
    }
}
