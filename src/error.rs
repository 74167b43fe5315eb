//! Error types for the financial intent router

use thiserror::Error;

/// Result type alias for router operations
pub type Result<T> = std::result::Result<T, OrchestrationError>;

#[derive(Error, Debug)]
pub enum OrchestrationError {

    // =============================
    // Core Pipeline Errors
    // =============================

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid parameters: {0}")]
    InvalidParams(String),

    #[error("Compliance violation: {0}")]
    ComplianceViolation(String),

    #[error("Payment error: {0}")]
    PaymentError(String),

    #[error("LLM error: {0}")]
    LlmError(String),

    #[error("LLM provider returned {status}: {message}")]
    LlmStatus { status: u16, message: String },

    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("Not found: {0}")]
    NotFound(String),

    // =============================
    // External Library Conversions
    // =============================

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("HTTP client error: {0}")]
    HttpError(#[from] reqwest::Error),
}

impl OrchestrationError {
    /// Whether repeating the same call could succeed: timeouts, transport
    /// failures, 429 and 5xx replies. Missing keys and other 4xx are final.
    pub fn is_transient(&self) -> bool {
        match self {
            OrchestrationError::LlmStatus { status, .. } => *status == 429 || *status >= 500,
            OrchestrationError::HttpError(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            _ => false,
        }
    }
}

impl From<sqlx::Error> for OrchestrationError {
    fn from(e: sqlx::Error) -> Self {
        OrchestrationError::DatabaseError(e.to_string())
    }
}

/// Why a classification attempt produced no usable intent.
///
/// Every variant is recovered by the classifier into the `unknown` intent;
/// it is never surfaced to the end caller.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ClassificationFailure {
    #[error("input text is empty")]
    EmptyInput,

    #[error("model call failed: {message}")]
    Upstream { message: String, retryable: bool },

    #[error("model call timed out after {0} ms")]
    Timeout(u64),

    #[error("no JSON object found in model output")]
    NoJson,

    #[error("schema violation: {0}")]
    Schema(String),
}

impl ClassificationFailure {
    /// Whether another attempt could plausibly succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ClassificationFailure::Upstream { retryable: true, .. }
                | ClassificationFailure::Timeout(_)
        )
    }
}
