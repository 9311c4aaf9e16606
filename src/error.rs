use thiserror::Error;

/// Errors produced by the catalog store.
#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// The metadata blob of a video could not be (de)serialized.
    #[error("Metadata error: {0}")]
    Metadata(#[from] serde_json::Error),

    #[error("Record not found")]
    NotFound,

    /// A category cannot be moved under itself or one of its descendants.
    #[error("Invalid parent: {0}")]
    InvalidParent(String),
}

/// Errors raised while reading the environment configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Missing required variable {0}")]
    Missing(&'static str),

    #[error("Invalid value {value:?} for {key}")]
    Invalid { key: &'static str, value: String },
}

/// A failed call to the chat platform, reduced to its message.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Chat platform error: {0}")]
pub struct GatewayError(pub String);

impl From<teloxide::RequestError> for GatewayError {
    fn from(err: teloxide::RequestError) -> Self {
        GatewayError(err.to_string())
    }
}
