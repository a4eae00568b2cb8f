//! Error types for the aggregation engine

use std::time::Duration;
use thiserror::Error;

/// Exchange response code for a successful call
pub const SUCCESS_CODE: &str = "200000";

/// Exchange codes that mean the key, signature, passphrase or timestamp was rejected
const AUTH_CODES: &[&str] = &["400001", "400002", "400003", "400004", "400005", "400006", "411100"];

/// Exchange code for "access denied, require more permission"
const PERMISSION_CODE: &str = "400007";

#[derive(Error, Debug)]
pub enum EngineError {
    /// Timeout, connection reset, non-2xx without an exchange payload, malformed JSON
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Authentication failed: {0}")]
    Auth(String),

    /// The key is valid but lacks the scope needed for this endpoint
    #[error("Permission denied: {0}")]
    Permission(String),

    #[error("Exchange error {code}: {message}")]
    Business { code: String, message: String },

    #[error("Invalid credentials: {0}")]
    InvalidCredentials(String),

    /// A narrower sub-query failed and was zero-filled
    #[error("Partial data: {0}")]
    PartialData(String),

    #[error("Timeout after {}s", .0.as_secs())]
    Timeout(Duration),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Config error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl EngineError {
    /// Map a non-success exchange response code onto the error taxonomy
    pub fn from_exchange_code(code: &str, message: impl Into<String>) -> Self {
        let message = message.into();
        if AUTH_CODES.contains(&code) {
            EngineError::Auth(format!("{} ({})", message, code))
        } else if code == PERMISSION_CODE {
            EngineError::Permission(format!("{} ({})", message, code))
        } else {
            EngineError::Business {
                code: code.to_string(),
                message,
            }
        }
    }

    /// Only dispatch failures are worth another attempt; everything else is
    /// permanent for the credential that produced it.
    pub fn is_retryable(&self) -> bool {
        matches!(self, EngineError::Transport(_))
    }
}

impl From<reqwest::Error> for EngineError {
    fn from(e: reqwest::Error) -> Self {
        // A request that could not be built will not build on a retry either.
        if e.is_builder() {
            EngineError::Internal(format!("failed to build request: {}", e))
        } else {
            EngineError::Transport(format!("failed to dispatch request: {}", e))
        }
    }
}

impl From<serde_json::Error> for EngineError {
    fn from(e: serde_json::Error) -> Self {
        EngineError::Transport(format!("malformed response: {}", e))
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;
