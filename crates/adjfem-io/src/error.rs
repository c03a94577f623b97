//! Error types for adjfem-io

use adjfem_core::ModelError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, IoError>;

#[derive(Error, Debug)]
pub enum IoError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Model error: {0}")]
    Model(#[from] ModelError),

    #[error("Invalid case: {0}")]
    InvalidCase(String),

    #[error("Unknown material '{0}'")]
    UnknownMaterial(String),

    #[error("Unknown quantity '{0}'")]
    UnknownQuantity(String),
}
