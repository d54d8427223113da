//! Client records.
//!
//! This module provides:
//! - Request validation turning raw JSON input into a [`NewClient`]
//! - The [`ClientRepository`] port and its PostgreSQL implementation

mod repository;
mod types;

pub use repository::{ClientRepository, PgClientRepository};
pub use types::{
    Client, ClientResponse, CreateClientRequest, NewClient, DATE_OF_BIRTH_FORMAT,
};
