//! Client types and input validation

use chrono::{DateTime, FixedOffset, Utc};
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;

/// Output layout of `date_of_birth`, e.g. `1990-05-17T00:00:00+00:00`.
pub const DATE_OF_BIRTH_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%:z";

lazy_static! {
    static ref EMAIL_REGEX: Regex =
        Regex::new(r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$").unwrap();
}

/// Body of `POST /v1/client`
#[derive(Debug, Clone, Deserialize)]
pub struct CreateClientRequest {
    pub email: String,
    pub date_of_birth: String,
    pub name: String,
    pub id: String,
}

/// A validated client ready to be stored
#[derive(Debug, Clone, PartialEq)]
pub struct NewClient {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub date_of_birth: DateTime<FixedOffset>,
}

/// A stored client
#[derive(Debug, Clone, PartialEq)]
pub struct Client {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub date_of_birth: DateTime<Utc>,
}

/// Body of `GET /v1/client/{id}`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ClientResponse {
    pub name: String,
    pub email: String,
    pub date_of_birth: String,
    pub id: String,
}

impl TryFrom<CreateClientRequest> for NewClient {
    type Error = AppError;

    fn try_from(request: CreateClientRequest) -> Result<Self, Self::Error> {
        if request.name.trim().is_empty() {
            return Err(AppError::Validation("name is required".to_string()));
        }

        let email = request.email.trim();
        if !EMAIL_REGEX.is_match(email) {
            return Err(AppError::Validation("invalid email".to_string()));
        }

        let date_of_birth = DateTime::parse_from_rfc3339(request.date_of_birth.trim())
            .map_err(|_| AppError::Validation("invalid date of birth".to_string()))?;

        let id = Uuid::parse_str(request.id.trim())
            .map_err(|_| AppError::Validation("invalid client id".to_string()))?;

        Ok(Self {
            id,
            name: request.name,
            email: email.to_string(),
            date_of_birth,
        })
    }
}

impl From<Client> for ClientResponse {
    fn from(client: Client) -> Self {
        Self {
            name: client.name,
            email: client.email,
            date_of_birth: client.date_of_birth.format(DATE_OF_BIRTH_FORMAT).to_string(),
            id: client.id.to_string(),
        }
    }
}
