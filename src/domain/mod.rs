//! Domain layer modules
//!
//! This module contains business domain logic:
//! - `client`: Client records, validation and persistence

pub mod client;
