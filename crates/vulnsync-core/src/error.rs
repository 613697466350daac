//! Error types for VulnSync

use thiserror::Error;

/// Result type alias using VulnSync Error
pub type Result<T> = std::result::Result<T, Error>;

/// VulnSync error types
#[derive(Error, Debug)]
pub enum Error {
    // === Feed Errors ===
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Connection timeout to {endpoint}")]
    ConnectionTimeout { endpoint: String },

    #[error("Feed returned HTTP {status}: {message}")]
    Http { status: u16, message: String },

    #[error("Rate limited: retry after {retry_after_seconds}s")]
    RateLimited { retry_after_seconds: u32 },

    // === Database Errors ===
    #[error("Database error: {0}")]
    Database(String),

    // === Configuration Errors ===
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidConfig { key: String, message: String },

    // === IO Errors ===
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // === Serialization Errors ===
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Parse error: {0}")]
    Parse(String),
}

impl Error {
    /// Check if this error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::Transport(_)
                | Error::ConnectionTimeout { .. }
                | Error::Http { .. }
                | Error::RateLimited { .. }
        )
    }

    /// Check if this error came from the feed's rate limiting
    pub fn is_rate_limited(&self) -> bool {
        matches!(
            self,
            Error::RateLimited { .. } | Error::Http { status: 429, .. }
        )
    }

    /// Get an error code for logging
    pub fn code(&self) -> &'static str {
        match self {
            Error::Transport(_) => "TRANSPORT_ERROR",
            Error::ConnectionTimeout { .. } => "CONNECTION_TIMEOUT",
            Error::Http { .. } => "HTTP_ERROR",
            Error::RateLimited { .. } => "RATE_LIMITED",
            Error::Database(_) => "DATABASE_ERROR",
            Error::Configuration(_) => "CONFIG_ERROR",
            Error::InvalidConfig { .. } => "INVALID_CONFIG",
            Error::Io(_) => "IO_ERROR",
            Error::Json(_) => "JSON_ERROR",
            Error::Parse(_) => "PARSE_ERROR",
        }
    }
}
