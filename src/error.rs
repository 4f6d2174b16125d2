//! Error types.

/// Error type for mailbucket setup paths.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    #[error("invalid syntax in config file: {0}")]
    Config(#[from] serde_json::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("no config file found, searched: {0}")]
    ConfigNotFound(String),
    #[error("mailbucket expects the message body as the single trailing argument or piped on stdin")]
    AmbiguousBody,
}
