use serde_json::Value;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ExchangeError {
    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("JSON parsing error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Deserialization error: {0}")]
    DeserializationError(String),

    #[error("API error: status {status}, code {code:?}")]
    ApiError {
        status: u16,
        /// Provider error code from the response body, when one was present.
        code: Option<i64>,
        /// Parsed response body; raw text wrapped in a JSON string when the
        /// body was not valid JSON.
        payload: Value,
    },

    #[error("Authentication error: {0}")]
    AuthError(String),

    #[error("Invalid parameters: {0}")]
    InvalidParameters(String),

    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Connection timeout: {0}")]
    ConnectionTimeout(String),

    #[error("Reconnect attempts exhausted after {attempts} tries")]
    ReconnectExhausted { attempts: u32 },

    #[error("Configuration error: {0}")]
    ConfigError(#[from] crate::core::config::ConfigError),
}

impl ExchangeError {
    /// Provider error code carried by an `ApiError`, if any.
    pub fn api_code(&self) -> Option<i64> {
        match self {
            Self::ApiError { code, .. } => *code,
            _ => None,
        }
    }

    /// HTTP status carried by an `ApiError`, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::ApiError { status, .. } => Some(*status),
            _ => None,
        }
    }
}
