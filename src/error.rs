//! Error types for the voice ledger assistant

use std::time::Duration;
use thiserror::Error;

/// Shown to clients in place of infrastructure failure detail
pub const GENERIC_LEDGER_FAILURE: &str = "The transaction could not be recorded. Please try again later.";

/// Result type alias for assistant operations
pub type Result<T> = std::result::Result<T, AssistantError>;

#[derive(Error, Debug)]
pub enum AssistantError {

    // =============================
    // Turn Pipeline Errors
    // =============================

    #[error("Speech capture error: {0}")]
    CaptureError(String),

    #[error("Speech synthesis error: {0}")]
    SynthesisError(String),

    #[error("Oracle error: {0}")]
    OracleError(String),

    #[error("Oracle timed out after {0:?}")]
    OracleTimeout(Duration),

    #[error("A turn is already in progress")]
    Busy,

    // =============================
    // Ledger Application Errors
    // =============================

    #[error("User not found: {0}")]
    IdentityNotFound(String),

    #[error("No account found. Please create an account first.")]
    NoAccountAvailable,

    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("Persistence error: {0}")]
    PersistenceError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    // =============================
    // External Library Conversions
    // =============================

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("HTTP client error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl AssistantError {
    /// Errors raised by the ledger side of a turn. These never reach speech output verbatim.
    pub fn is_ledger_error(&self) -> bool {
        matches!(
            self,
            AssistantError::IdentityNotFound(_)
                | AssistantError::NoAccountAvailable
                | AssistantError::InvalidAmount(_)
                | AssistantError::PersistenceError(_)
                | AssistantError::DatabaseError(_)
        )
    }

    /// Text safe to hand to a network client. Only errors the caller can act
    /// on keep their wording; everything else is a fixed notice.
    pub fn client_message(&self) -> String {
        match self {
            AssistantError::NoAccountAvailable | AssistantError::InvalidAmount(_) => {
                self.to_string()
            }
            AssistantError::IdentityNotFound(_) => "User not found".to_string(),
            _ => GENERIC_LEDGER_FAILURE.to_string(),
        }
    }
}
