use splicer_core::request::{Operation, RequestStatus};
use splicer_core::CoreError;
use splicer_render::RenderError;
use std::path::PathBuf;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("request not found: {0}")]
    NotFound(Uuid),

    #[error("request {id} can't {operation} while {status}")]
    InvalidState {
        id: Uuid,
        status: RequestStatus,
        operation: Operation,
    },

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("videos are not compatible for concatenation: {0}")]
    IncompatibleMedia(String),

    #[error("media file not found: {0}")]
    MediaNotFound(PathBuf),

    #[error("probe failed: {0}")]
    ProbeFailed(String),

    #[error("execution failed: {0}")]
    ExecutionFailed(String),

    #[error("request {0} was canceled")]
    Canceled(Uuid),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("config error: {0}")]
    Config(String),
}

impl EngineError {
    /// Message stored on a request that failed with this error.
    pub fn request_message(&self) -> String {
        self.to_string()
    }
}

impl From<CoreError> for EngineError {
    fn from(e: CoreError) -> Self {
        match e {
            CoreError::RequestNotFound(id) => EngineError::NotFound(id),
            CoreError::InvalidState {
                id,
                status,
                operation,
            } => EngineError::InvalidState {
                id,
                status,
                operation,
            },
            CoreError::InvalidInput(msg) => EngineError::InvalidInput(msg),
            CoreError::Io(e) => EngineError::Storage(e.to_string()),
            CoreError::Json(e) => EngineError::Storage(e.to_string()),
            CoreError::Store(msg) => EngineError::Storage(msg),
        }
    }
}

impl From<RenderError> for EngineError {
    fn from(e: RenderError) -> Self {
        match e {
            RenderError::FileNotFound(path) => EngineError::MediaNotFound(path),
            RenderError::FfprobeExec(_)
            | RenderError::FfprobeFailed(_)
            | RenderError::InvalidMedia(_)
            | RenderError::Json(_) => EngineError::ProbeFailed(e.to_string()),
            RenderError::InvalidInput(msg) => EngineError::InvalidInput(msg),
            RenderError::NoTracks => EngineError::InvalidInput(e.to_string()),
            RenderError::FfmpegNotFound | RenderError::FfmpegFailed(_) => {
                EngineError::ExecutionFailed(e.to_string())
            }
            RenderError::Io(e) => EngineError::Storage(e.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;
