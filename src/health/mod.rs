//! Concurrent health aggregation.
//!
//! A [`HealthCheck`] owns a list of [`Indicator`]s and probes all of them
//! concurrently under one deadline on every [`HealthCheck::handle`] call.

mod check;

pub use check::{ComponentStatus, HealthCheck, HealthResult, Indicator, Status, TimeoutPolicy};
