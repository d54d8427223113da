//! Client persistence.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::error::AppError;
use crate::postgres::{ConnectionPool, NamedArgs};

use super::types::{Client, NewClient};

const CREATE_CLIENT_SQL: &str = r#"
INSERT INTO client (email, name, uuid, date_of_birth)
    VALUES (@email, @name, @uuid, @dateOfBirth)
RETURNING id;
"#;

const GET_CLIENT_SQL: &str = r#"
SELECT
    name,
    uuid,
    email,
    date_of_birth
FROM
    client
WHERE
    uuid = @uuid;
"#;

#[async_trait]
pub trait ClientRepository: Send + Sync {
    /// Store a new client. A client with the same id or email yields
    /// [`AppError::ClientAlreadyExists`].
    async fn create(&self, ctx: &CancellationToken, client: &NewClient) -> Result<(), AppError>;

    async fn get(&self, ctx: &CancellationToken, id: Uuid) -> Result<Client, AppError>;
}

pub struct PgClientRepository {
    pool: Arc<ConnectionPool>,
}

impl PgClientRepository {
    pub fn new(pool: Arc<ConnectionPool>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ClientRepository for PgClientRepository {
    async fn create(&self, ctx: &CancellationToken, client: &NewClient) -> Result<(), AppError> {
        let args = NamedArgs::new()
            .with("email", client.email.as_str())
            .with("name", client.name.as_str())
            .with("uuid", client.id)
            .with("dateOfBirth", client.date_of_birth.with_timezone(&Utc));

        let row = self
            .pool
            .query_row(ctx, "CreateClient", CREATE_CLIENT_SQL, args)
            .await;

        match row.scan() {
            Ok(_) => Ok(()),
            Err(e) if e.is_unique_violation() => Err(AppError::ClientAlreadyExists),
            Err(e) => Err(e.into()),
        }
    }

    async fn get(&self, ctx: &CancellationToken, id: Uuid) -> Result<Client, AppError> {
        let row = self
            .pool
            .query_row(ctx, "GetClient", GET_CLIENT_SQL, NamedArgs::new().with("uuid", id))
            .await;

        let record = match row.scan() {
            Ok(record) => record,
            Err(e) if e.is_no_rows() => return Err(AppError::ClientNotFound),
            Err(e) => return Err(e.into()),
        };

        Ok(Client {
            id: record.get("uuid")?,
            name: record.get("name")?,
            email: record.get("email")?,
            date_of_birth: record.get("date_of_birth")?,
        })
    }
}
