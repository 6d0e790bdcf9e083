use thiserror::Error;

/// Application-wide error types for Flathunt.
#[derive(Error, Debug)]
pub enum AppError {
    /// The listing site answered the requested URL with HTTP 403.
    #[error("Permission denied (HTTP 403) for {url}")]
    PermissionDenied { url: String },

    /// Page interaction exceeded its allotted wait.
    #[error("Request timed out after {0} seconds")]
    Timeout(u64),

    /// An advert with this URL was stored concurrently.
    #[error("Advert already stored: {0}")]
    UniquenessViolation(String),

    /// Headless browser could not be launched or driven.
    #[error("Browser error: {0}")]
    BrowserError(String),

    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    HttpError(String),

    /// Network/connection error.
    #[error("Network error: {0}")]
    NetworkError(String),

    /// Telegram Bot API returned `ok: false`.
    #[error("Telegram error ({code}): {description}")]
    TelegramError { code: i64, description: String },

    /// Database operation failed.
    #[error("Database error: {0}")]
    DatabaseError(String),

    /// Missing or malformed configuration.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Input could not be parsed (export files, timestamps).
    #[error("Parse error: {0}")]
    ParseError(String),

    /// JSON serialization/deserialization failed.
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// Generic error.
    #[error("{0}")]
    Generic(String),
}

impl AppError {
    /// Returns true if this error means the advert was already processed.
    pub fn is_duplicate(&self) -> bool {
        matches!(self, AppError::UniquenessViolation(_))
    }

    /// Returns true if this error is transient and worth retrying.
    pub fn is_retryable(&self) -> bool {
        match self {
            AppError::NetworkError(_) | AppError::Timeout(_) => true,
            // Telegram signals flood control with 429 and outages with 5xx
            AppError::TelegramError { code, .. } => *code == 429 || *code >= 500,
            AppError::HttpError(msg) => {
                msg.contains("timeout") || msg.contains("connect") || msg.contains("reset")
            }
            _ => false,
        }
    }
}
