use thiserror::Error;

/// Main error type for launchspec
#[derive(Debug, Error)]
pub enum LaunchError {
    // Launch specification errors, all detected before anything is started
    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    #[error("Path error: {0}")]
    PathError(String),

    #[error("Environment profile not found: {0}")]
    ProfileNotFound(String),

    // Host-related errors
    #[error("Failed to spawn process: {0}")]
    SpawnError(String),

    #[error("Failed to stop process {0}: {1}")]
    StopError(String, String),

    #[error("Host error: {0}")]
    HostError(String),

    #[error("Log error: {0}")]
    LogError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    // IO errors (automatically converted from std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl LaunchError {
    pub(crate) fn config(msg: impl Into<String>) -> Self {
        LaunchError::ConfigurationError(msg.into())
    }

    pub(crate) fn path(msg: impl Into<String>) -> Self {
        LaunchError::PathError(msg.into())
    }
}

/// Result type alias for launchspec operations
pub type Result<T> = std::result::Result<T, LaunchError>;
