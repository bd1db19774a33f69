use thiserror::Error;

#[derive(Error, Debug)]
pub enum SolverError {
    #[error("Preprocessing error: {0}")]
    Preprocessing(String),

    #[error("Recognition error: {0}")]
    Recognition(String),

    #[error("Recognition engine unavailable: {0}")]
    EngineUnavailable(String),

    #[error("Invalid input: {0}")]
    Input(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("Base64 decode error: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl SolverError {
    /// Whether the error came from the caller's payload rather than the pipeline.
    pub fn is_input_error(&self) -> bool {
        matches!(self, SolverError::Input(_) | SolverError::Base64(_))
    }
}

pub type Result<T> = std::result::Result<T, SolverError>;
