use thiserror::Error;

/// Main error type for rankdist
#[derive(Error, Debug)]
pub enum RankdistError {
    /// Malformed score matrices, out-of-range indices, bad window sizes
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// A candidate list with no members
    #[error("Empty candidate set: {0}")]
    EmptyCandidates(String),

    /// Incremental recomputation used out of order or with a non-subset list
    #[error("Update mode error: {0}")]
    UpdateMode(String),

    /// A calculation mode that cannot serve the request
    #[error("Unsupported mode: {0}")]
    UnsupportedMode(String),

    /// Configuration errors (unknown strategy, device, approach, ...)
    #[error("Configuration error: {0}")]
    Config(String),

    /// File system I/O errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Scenario / report (de)serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Convenient Result type using RankdistError
pub type Result<T> = std::result::Result<T, RankdistError>;
