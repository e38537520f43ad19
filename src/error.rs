//! Error types for a3s-session

use thiserror::Error;

/// Errors that can occur in the session system
#[derive(Debug, Error)]
pub enum SessionError {
    /// Requested backend or binding does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// A provider is already bound under this name
    ///
    /// Raised only while the registry is being assembled at startup.
    #[error("Provider '{0}' is already registered")]
    DuplicateRegistration(String),

    /// Provider binding is unusable (blank name, unnamed backend)
    #[error("Invalid provider '{name}': {reason}")]
    InvalidProvider {
        name: String,
        reason: String,
    },

    /// Backend read/write/persist failure
    #[error("Storage error: {0}")]
    Storage(String),

    /// Entropy source could not produce a token
    #[error("Entropy source failure: {0}")]
    Entropy(String),

    /// Serialization/deserialization failure
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Encryption or decryption of a stored record failed
    #[error("Crypto error: {0}")]
    Crypto(String),
}

impl SessionError {
    /// Whether this error indicates a broken startup rather than a runtime event
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            SessionError::DuplicateRegistration(_) | SessionError::InvalidProvider { .. }
        )
    }
}

/// Result type alias for session operations
pub type Result<T> = std::result::Result<T, SessionError>;
