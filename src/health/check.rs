use std::panic::AssertUnwindSafe;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures::future::join_all;
use futures::FutureExt;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Up,
    Down,
    Timeout,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Up => "up",
            Status::Down => "down",
            Status::Timeout => "timeout",
        }
    }

    pub fn is_up(&self) -> bool {
        matches!(self, Status::Up)
    }
}

/// A named component that can report whether it is up.
#[async_trait]
pub trait Indicator: Send + Sync {
    fn component_name(&self) -> &str;

    async fn status(&self) -> Status;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComponentStatus {
    pub component: String,
    pub status: Status,
}

/// Aggregate verdict of one health check invocation.
///
/// Component order is completion order, not registration order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthResult {
    pub status: Status,
    pub components: Vec<ComponentStatus>,
}

impl HealthResult {
    pub fn component(&self, name: &str) -> Option<&ComponentStatus> {
        self.components.iter().find(|c| c.component == name)
    }
}

/// What happens to probes still running when the deadline fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeoutPolicy {
    /// Let outstanding probes run to completion in the background.
    #[default]
    Detach,
    /// Abort outstanding probe tasks.
    Abort,
}

impl FromStr for TimeoutPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "detach" => Ok(TimeoutPolicy::Detach),
            "abort" => Ok(TimeoutPolicy::Abort),
            other => Err(format!("unknown timeout policy: {}", other)),
        }
    }
}

/// Fans probes out across registered indicators under a single deadline.
pub struct HealthCheck {
    timeout: Duration,
    policy: TimeoutPolicy,
    indicators: Vec<Arc<dyn Indicator>>,
}

impl HealthCheck {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            policy: TimeoutPolicy::default(),
            indicators: Vec::new(),
        }
    }

    pub fn with_policy(mut self, policy: TimeoutPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn register_indicator(&mut self, indicator: Arc<dyn Indicator>) {
        self.indicators.push(indicator);
    }

    pub fn indicator_count(&self) -> usize {
        self.indicators.len()
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Probe every indicator and aggregate the results.
    pub async fn handle(&self) -> HealthResult {
        let results: Arc<Mutex<Vec<ComponentStatus>>> =
            Arc::new(Mutex::new(Vec::with_capacity(self.indicators.len())));
        let downgraded = Arc::new(AtomicBool::new(false));

        let handles: Vec<_> = self
            .indicators
            .iter()
            .map(|indicator| {
                let indicator = Arc::clone(indicator);
                let results = Arc::clone(&results);
                let downgraded = Arc::clone(&downgraded);

                tokio::spawn(async move {
                    let component = indicator.component_name().to_string();
                    let status = match AssertUnwindSafe(indicator.status()).catch_unwind().await {
                        Ok(status) => status,
                        Err(_) => {
                            tracing::error!(component = %component, "Health indicator panicked");
                            Status::Down
                        }
                    };

                    if !status.is_up() && !downgraded.swap(true, Ordering::SeqCst) {
                        tracing::warn!(component = %component, status = status.as_str(), "Health check downgraded");
                    }

                    results
                        .lock()
                        .unwrap_or_else(|e| e.into_inner())
                        .push(ComponentStatus { component, status });
                })
            })
            .collect();

        let abort_handles: Vec<_> = handles.iter().map(|h| h.abort_handle()).collect();
        let finished = tokio::time::timeout(self.timeout, join_all(handles)).await;

        let status = match finished {
            Ok(_) if downgraded.load(Ordering::SeqCst) => Status::Down,
            Ok(_) => Status::Up,
            Err(_) => {
                tracing::error!(timeout = ?self.timeout, "Health check timed out");
                if self.policy == TimeoutPolicy::Abort {
                    for handle in &abort_handles {
                        handle.abort();
                    }
                }
                Status::Timeout
            }
        };

        let components = results.lock().unwrap_or_else(|e| e.into_inner()).clone();
        HealthResult { status, components }
    }
}
