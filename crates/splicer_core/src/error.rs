use crate::request::{Operation, RequestStatus};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Request not found: {0}")]
    RequestNotFound(uuid::Uuid),

    #[error("Request {id} can't {operation} while {status}")]
    InvalidState {
        id: uuid::Uuid,
        status: RequestStatus,
        operation: Operation,
    },

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Store error: {0}")]
    Store(String),
}

pub type Result<T> = std::result::Result<T, CoreError>;
