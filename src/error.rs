use thiserror::Error;

#[derive(Error, Debug)]
pub enum AnalyticsError {
    #[error("Extraction failed: {0}")]
    Extraction(String),

    #[error("Store connection failed: {0}")]
    StoreConnection(String),

    #[error("Store error: {message}")]
    Store { message: String },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML deserialization failed: {0}")]
    Toml(#[from] toml::de::Error),
}

impl AnalyticsError {
    pub fn store(message: impl Into<String>) -> Self {
        AnalyticsError::Store {
            message: message.into(),
        }
    }

    /// A query that legitimately matched nothing, as opposed to a broken dependency.
    pub fn is_not_found(&self) -> bool {
        matches!(self, AnalyticsError::NotFound(_))
    }
}

pub type Result<T> = std::result::Result<T, AnalyticsError>;
