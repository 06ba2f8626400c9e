/// Error types for the library
#[derive(thiserror::Error, Debug)]
pub enum NavError {
    #[error("invalid polygon mesh: {0}")]
    InvalidMesh(String),

    #[error("invalid triangle file: {0}")]
    TriFile(String),

    #[error("navigation graph has not been built")]
    GraphNotBuilt,

    #[error("unsupported navigation graph version {found}, expected {expected}")]
    Version { found: u32, expected: u32 },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("binary encoding error: {0}")]
    Bincode(#[from] bincode::Error),
}

/// Result type for navigation operations
pub type Result<T> = std::result::Result<T, NavError>;
