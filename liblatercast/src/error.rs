//! Error types for Latercast

use thiserror::Error;

pub type Result<T> = std::result::Result<T, LatercastError>;

#[derive(Error, Debug)]
pub enum LatercastError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Platform error: {0}")]
    Platform(#[from] PlatformError),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl LatercastError {
    /// Returns the appropriate exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            LatercastError::InvalidInput(_) => 3,
            LatercastError::Conflict(_) => 2,
            LatercastError::NotFound(_) => 1,
            LatercastError::Platform(_) => 1,
            LatercastError::Config(_) => 1,
            LatercastError::Store(_) => 1,
        }
    }

    /// True when retrying the same operation later could succeed.
    ///
    /// Store errors are transient from the scheduler's point of view: a
    /// failed reconciliation pass is simply re-run on the next trigger.
    pub fn is_retryable(&self) -> bool {
        matches!(self, LatercastError::Store(_))
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Missing required field: {0}")]
    MissingField(String),
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Store operation failed: {0}")]
    SqlxError(#[from] sqlx::Error),

    #[error("Migration failed: {0}")]
    MigrationError(#[from] sqlx::migrate::MigrateError),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Corrupt record: {0}")]
    CorruptRecord(String),
}

/// Errors produced by a single platform publish attempt.
///
/// These never escape the orchestrator as process errors; they are recorded
/// as per-platform data on the post instead.
#[derive(Error, Debug, Clone)]
pub enum PlatformError {
    #[error("Publishing failed: {0}")]
    Publishing(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Publish timed out after {0}s")]
    Timeout(u64),
}
