use thiserror::Error;

/// Top-level error type for AuraTask.
#[derive(Debug, Error)]
pub enum AuraError {
    /// Action attempted without a valid owner identity. Short-circuited
    /// locally; never reaches the gateway.
    #[error("not authenticated")]
    Unauthenticated,

    /// Remote gateway call rejected (network, constraint, access control).
    #[error("gateway error: {0}")]
    Gateway(String),

    /// Targeted row no longer exists remotely (e.g. concurrent delete).
    /// Kept separate from `Gateway` so callers can render "already deleted".
    #[error("not found: {0}")]
    NotFound(String),

    /// Error from the AI text-generation provider.
    #[error("provider error: {0}")]
    Provider(String),

    /// Configuration error.
    #[error("config error: {0}")]
    Config(String),

    /// Durable local storage error.
    #[error("storage error: {0}")]
    Storage(String),

    /// Encryption/decryption failure. Decryption fails closed.
    #[error("crypto error: {0}")]
    Crypto(String),

    /// Guest-to-account migration failure.
    #[error("migration error: {0}")]
    Migration(String),

    /// I/O error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl AuraError {
    /// Whether this is the distinguishable row-gone condition.
    pub fn is_not_found(&self) -> bool {
        matches!(self, AuraError::NotFound(_))
    }
}
