//! Seam to the roster/roll-call collaborator.
//!
//! `HttpApi` talks to the REST server; `Database` implements the same trait
//! for the local SQLite backend.

mod http;
mod local;

pub use http::{HttpApi, DEFAULT_API_BASE_URL};

use async_trait::async_trait;
use thiserror::Error;

use crate::models::{Class, Group, NewRollCall, PersistedRollCall, Student};

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// Non-2xx response; `detail` is the server message or `HTTP <status>`.
    #[error("{detail}")]
    Status { status: u16, detail: String },

    #[error("invalid response body: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("{0}")]
    Storage(String),
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        ApiError::Storage(format!("{err:#}"))
    }
}

#[async_trait]
pub trait RollCallApi: Send + Sync {
    async fn list_classes(&self) -> Result<Vec<Class>, ApiError>;

    async fn list_groups(&self, class_id: i64) -> Result<Vec<Group>, ApiError>;

    async fn list_students(&self, group_id: i64) -> Result<Vec<Student>, ApiError>;

    async fn create_roll_call(&self, record: NewRollCall) -> Result<PersistedRollCall, ApiError>;

    async fn roll_call_history(&self) -> Result<Vec<PersistedRollCall>, ApiError>;
}
