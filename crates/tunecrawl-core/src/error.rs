use thiserror::Error;
use uuid::Uuid;

/// Application-wide error types for tunecrawl.
#[derive(Error, Debug)]
pub enum AppError {
    /// Crawler configuration is missing or invalid.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// The remote server answered with a non-success status.
    #[error("HTTP {status} for {url}")]
    HttpStatus { status: u16, url: String },

    /// HTTP request failed for a reason other than status or transport.
    #[error("HTTP error: {0}")]
    HttpError(String),

    /// Request timed out.
    #[error("Request timed out after {0} ms")]
    Timeout(u64),

    /// Network/connection error.
    #[error("Network error: {0}")]
    NetworkError(String),

    /// The daily request quota is used up.
    #[error("Daily request quota of {limit} exhausted")]
    QuotaExceeded { limit: u32 },

    /// A request or record failed validation.
    #[error("Validation error: {0}")]
    ValidationError(String),

    /// The catalog already holds a song with this fingerprint.
    #[error("Duplicate song: {fingerprint}")]
    Duplicate { fingerprint: String },

    /// A crawl job is already running.
    #[error("Crawl job {0} is already in progress")]
    JobConflict(Uuid),

    /// A stopped job has not finished draining its in-flight work.
    #[error("Previous crawl job {0} is still draining; retry shortly")]
    JobDraining(Uuid),

    /// A fetched page could not be parsed into songs.
    #[error("Parse error: {0}")]
    ParseError(String),

    /// Database operation failed.
    #[error("Database error: {0}")]
    DatabaseError(String),

    /// JSON serialization/deserialization failed.
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// Generic error.
    #[error("{0}")]
    Generic(String),
}

impl AppError {
    /// Returns true if this error is transient and worth retrying.
    ///
    /// Timeouts, connection failures and 5xx answers are transient;
    /// 4xx answers and everything else are terminal.
    pub fn is_retryable(&self) -> bool {
        match self {
            AppError::NetworkError(_) | AppError::Timeout(_) => true,
            AppError::HttpStatus { status, .. } => *status >= 500,
            AppError::HttpError(msg) => {
                msg.contains("timeout") || msg.contains("connect") || msg.contains("reset")
            }
            _ => false,
        }
    }
}
