//! Error types for gssh

use thiserror::Error;

/// Main error type for gssh
#[derive(Debug, Error)]
pub enum GsshError {
    /// Credential resolution produced zero authentication methods
    #[error("No usable credential: {0}")]
    NoUsableCredential(String),

    /// Identity file could not be read or parsed
    #[error("Key parse error: {0}")]
    KeyParse(String),

    /// Passphrase could not be read or did not decrypt the identity file
    #[error("Passphrase error: {0}")]
    Passphrase(String),

    /// Network or handshake failure on the programmatic path
    #[error("Dial error: {0}")]
    Dial(String),

    /// Remote host explicitly rejected the credentials
    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    /// No terminal state reached before the login ceiling
    #[error("Session timeout after {0}s waiting for a shell prompt")]
    SessionTimeout(u64),

    /// Subordinate process ended before a shell prompt was confirmed
    #[error("Session ended before login was confirmed: {0}")]
    StreamEndedBeforeLogin(String),

    /// Remote command did not finish in time
    #[error("Command timeout after {0}ms")]
    CommandTimeout(u64),

    /// Spawning the terminal client failed
    #[error("Failed to spawn terminal client: {0}")]
    Spawn(String),

    /// Invalid parameters provided
    #[error("Invalid parameters: {0}")]
    InvalidParams(String),

    /// Unknown host profile
    #[error("Server '{0}' not found")]
    ServerNotFound(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Config pull/push failure
    #[error("Sync error: {0}")]
    Sync(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML (de)serialization error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// Result type alias using GsshError
pub type Result<T> = std::result::Result<T, GsshError>;

impl GsshError {
    /// Create a dial error from a string
    pub fn dial(msg: impl Into<String>) -> Self {
        GsshError::Dial(msg.into())
    }

    /// Create an authentication error from a string
    pub fn auth(msg: impl Into<String>) -> Self {
        GsshError::AuthenticationFailed(msg.into())
    }

    /// Create an invalid params error from a string
    pub fn invalid_params(msg: impl Into<String>) -> Self {
        GsshError::InvalidParams(msg.into())
    }

    /// Create a config error from a string
    pub fn config(msg: impl Into<String>) -> Self {
        GsshError::Config(msg.into())
    }

    /// Create a sync error from a string
    pub fn sync(msg: impl Into<String>) -> Self {
        GsshError::Sync(msg.into())
    }

    /// Create a spawn error from a string
    pub fn spawn(msg: impl Into<String>) -> Self {
        GsshError::Spawn(msg.into())
    }
}
