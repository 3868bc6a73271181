//! Error types for the trading assistant core

use thiserror::Error;

/// Result type alias for assistant operations
pub type Result<T> = std::result::Result<T, AssistantError>;

#[derive(Error, Debug)]
pub enum AssistantError {

    // =============================
    // Core Pipeline Errors
    // =============================

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Dispatch error: {0}")]
    DispatchError(String),

    #[error("Provider error: {0}")]
    ProviderError(String),

    #[error("LLM error: {0}")]
    LlmError(String),

    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("Unknown error: {0}")]
    Unknown(String),

    // =============================
    // External Library Conversions
    // =============================

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("HTTP client error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("UUID parse error: {0}")]
    UuidError(#[from] uuid::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl AssistantError {
    /// Client errors map to a 4xx at the API boundary, everything else is a 5xx.
    pub fn is_client_error(&self) -> bool {
        matches!(self, AssistantError::InvalidInput(_))
    }
}
