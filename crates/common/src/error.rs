use thiserror::Error;

/// Top-level error type for Loomwright agent operations.
#[derive(Debug, Error)]
pub enum LoomError {
    // --- Bus errors ---
    #[error("bus connection error: {0}")]
    BusConnect(String),

    #[error("bus publish error: {0}")]
    BusPublish(String),

    // --- Operational errors ---
    #[error("configuration error: {0}")]
    Config(String),
}

/// Result type alias for Loomwright operations.
pub type Result<T> = std::result::Result<T, LoomError>;
