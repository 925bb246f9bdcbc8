use thiserror::Error;

use crate::ObjectId;

/// Failures that are reported to the caller of the engine.
///
/// Recoverable conditions met while stepping (degenerate contacts, numeric
/// instability) never surface here, they are handled inside the scheduler.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("object {0} is not part of this world")]
    InvalidObjectReference(ObjectId),

    #[error("invalid shape: {0}")]
    InvalidShape(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("could not parse configuration: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, EngineError>;
