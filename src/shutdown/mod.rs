//! Graceful shutdown coordination.
//!
//! A [`Shutdown`] owns the process-wide cancellation token. It is created
//! once in `main` and cloned into the HTTP server, the pool supervisor and
//! every component that has to stop with the process.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::signal;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Default)]
pub struct Shutdown {
    token: CancellationToken,
    initiated: Arc<AtomicBool>,
}

impl Shutdown {
    pub fn new() -> Self {
        Self::default()
    }

    /// Token cancelled when shutdown begins.
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Begin shutdown. Returns `true` only for the call that initiated it.
    pub fn signal(&self, reason: &str) -> bool {
        if self.initiated.swap(true, Ordering::SeqCst) {
            return false;
        }
        tracing::info!(reason = %reason, "Initiating graceful shutdown");
        self.token.cancel();
        true
    }

    pub fn is_shutting_down(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Resolves once shutdown has begun.
    pub async fn wait(&self) {
        self.token.cancelled().await;
    }

    /// Wait for SIGINT or SIGTERM and begin shutdown. Returns early when
    /// shutdown was started elsewhere.
    pub async fn listen_for_signals(&self) {
        let ctrl_c = async {
            if let Err(e) = signal::ctrl_c().await {
                tracing::error!(error = %e, "Failed to install Ctrl+C handler");
                std::future::pending::<()>().await;
            }
        };

        #[cfg(unix)]
        let terminate = async {
            match signal::unix::signal(signal::unix::SignalKind::terminate()) {
                Ok(mut stream) => {
                    stream.recv().await;
                }
                Err(e) => {
                    tracing::error!(error = %e, "Failed to install SIGTERM handler");
                    std::future::pending::<()>().await;
                }
            }
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            _ = ctrl_c => {
                self.signal("received Ctrl+C");
            }
            _ = terminate => {
                self.signal("received terminate signal");
            }
            _ = self.token.cancelled() => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_only_first_signal_initiates() {
        let shutdown = Shutdown::new();
        let clone = shutdown.clone();

        assert!(!shutdown.is_shutting_down());
        assert!(clone.signal("first"));
        assert!(!shutdown.signal("second"));
        assert!(shutdown.is_shutting_down());
    }

    #[tokio::test]
    async fn test_independent_instances() {
        let a = Shutdown::new();
        let b = Shutdown::new();
        assert!(a.signal("a"));
        assert!(!b.is_shutting_down());
        assert!(b.signal("b"));
    }

    #[tokio::test]
    async fn test_listener_returns_when_signalled_elsewhere() {
        let shutdown = Shutdown::new();
        let listener = {
            let shutdown = shutdown.clone();
            tokio::spawn(async move { shutdown.listen_for_signals().await })
        };

        shutdown.signal("test");
        tokio::time::timeout(Duration::from_secs(1), listener)
            .await
            .expect("listener did not stop")
            .unwrap();
    }

    #[tokio::test]
    async fn test_child_tokens_observe_shutdown() {
        let shutdown = Shutdown::new();
        let child = shutdown.token().child_token();
        shutdown.signal("test");
        tokio::time::timeout(Duration::from_millis(100), child.cancelled())
            .await
            .unwrap();
        shutdown.wait().await;
    }
}
