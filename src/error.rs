/// Centralized error types for codetrail using thiserror
///
/// Provides domain-specific error types for better error handling and
/// user-facing messages.
use thiserror::Error;

/// Main error type for the capture pipeline
#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("Discovery error: {0}")]
    Discovery(#[from] DiscoveryError),

    #[error("Extraction error: {0}")]
    Extract(#[from] ExtractError),

    #[error("Poller error: {0}")]
    Poller(#[from] PollerError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

/// Errors from repository discovery
#[derive(Error, Debug)]
pub enum DiscoveryError {
    #[error("Directory not found: {0}")]
    DirectoryNotFound(String),

    #[error("Path is not a directory: {0}")]
    NotADirectory(String),

    #[error("Invalid worktree marker at '{path}': {reason}")]
    InvalidWorktree { path: String, reason: String },
}

/// Errors from commit metadata and diff extraction
#[derive(Error, Debug)]
pub enum ExtractError {
    #[error("Invalid commit hash: {0}")]
    InvalidCommit(String),

    #[error("Git error: {0}")]
    Git(#[from] git2::Error),
}

/// Errors from the polling service
#[derive(Error, Debug)]
pub enum PollerError {
    #[error("Poller already started")]
    AlreadyStarted,

    #[error("Failed to read HEAD for '{repo}': {reason}")]
    HeadReadFailed { repo: String, reason: String },

    #[error("Failed to walk history for '{repo}': {reason}")]
    LogWalkFailed { repo: String, reason: String },

    #[error("Extraction error: {0}")]
    Extract(#[from] ExtractError),
}

/// Errors from the commit/session store
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Failed to open database at '{path}': {reason}")]
    OpenFailed { path: String, reason: String },

    #[error("Unknown session: {0}")]
    UnknownSession(String),

    #[error("Store lock was poisoned: {0}")]
    LockPoisoned(String),

    #[error("Failed to parse stored value: {0}")]
    ParseFailed(String),
}

/// Errors from configuration loading
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to load configuration file '{path}': {reason}")]
    LoadFailed { path: String, reason: String },

    #[error("Failed to parse configuration: {0}")]
    ParseFailed(String),

    #[error("Invalid configuration value for '{key}': {reason}")]
    InvalidValue { key: String, reason: String },
}

// Conversion from anyhow::Error to CaptureError
impl From<anyhow::Error> for CaptureError {
    fn from(err: anyhow::Error) -> Self {
        CaptureError::Other(format!("{err:#}"))
    }
}

impl CaptureError {
    /// Create a new error from a string message
    pub fn other(msg: impl Into<String>) -> Self {
        CaptureError::Other(msg.into())
    }
}
