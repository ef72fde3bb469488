use thiserror::Error;

/// Main error type for the sync/alert engine
#[derive(Error, Debug)]
pub enum EngineError {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    // Database errors
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    // Network errors
    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Rate limited: {0}")]
    RateLimited(String),

    // Serialization errors
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    // Market data errors
    #[error("Provider unavailable: {provider} - {reason}")]
    ProviderUnavailable { provider: String, reason: String },

    #[error("Malformed quote for symbol: {symbol}")]
    MalformedQuote { symbol: String },

    #[error("Quote unavailable for symbol: {symbol}")]
    QuoteUnavailable { symbol: String },

    #[error("Stale data: {0}")]
    StaleData(String),

    // Notification errors
    #[error("Notification failed on channel {channel}: {reason}")]
    NotificationFailed { channel: String, reason: String },

    // Validation errors
    #[error("Validation failed: {0}")]
    Validation(String),

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // Generic errors
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

/// Result type alias for EngineError
pub type Result<T> = std::result::Result<T, EngineError>;
