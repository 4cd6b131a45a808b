//! Error type for `gate-store-sqlite`.

use gate_core::{SinkError, StoreError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("database error: {0}")]
    Database(#[from] tokio_rusqlite::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("date/time parse error: {0}")]
    DateParse(String),

    #[error("invalid column value: {0}")]
    InvalidValue(String),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

impl From<Error> for StoreError {
    fn from(err: Error) -> Self {
        StoreError::backend(err)
    }
}

impl From<Error> for SinkError {
    fn from(err: Error) -> Self {
        SinkError::new(err)
    }
}
