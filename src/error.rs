use thiserror::Error;

/// Main error type for Scholarag
#[derive(Error, Debug)]
pub enum ScholaragError {
    /// Persistence layer unreachable or failed. Fatal to the session;
    /// reported to the client once, never crashes the server.
    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    /// File system I/O errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Embedding backend errors
    #[error("Embedding error: {0}")]
    Embedding(String),

    /// Generation backend errors
    #[error("Generation error: {0}")]
    Generation(String),

    /// Parse errors (ingest input, stored metadata)
    #[error("Parse error: {0}")]
    Parse(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

// Every rusqlite failure on the query path means the store could not serve
// the session; write-path callers log and isolate per batch.
impl From<rusqlite::Error> for ScholaragError {
    fn from(e: rusqlite::Error) -> Self {
        ScholaragError::StoreUnavailable(e.to_string())
    }
}

/// Convenient Result type using ScholaragError
pub type Result<T> = std::result::Result<T, ScholaragError>;
