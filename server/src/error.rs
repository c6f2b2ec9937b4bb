//! Engine error taxonomy.
//!
//! Most variants are drop-and-log at the server boundary; only the
//! presence errors surface to the `hello` handler, which must abort
//! session setup without starting a publish loop.

use shared::ProtocolError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// No secret on file for the sender. Never answered, to avoid
    /// probing for valid user ids.
    #[error("user `{0}` is not logged in")]
    NotAuthenticated(String),

    #[error("invalid hmac on message from user `{0}`")]
    AuthenticationFailed(String),

    #[error("location `{0}` does not exist")]
    LocationNotFound(String),

    #[error("location `{0}` is at max player capacity")]
    LocationFull(String),

    /// A present player is missing fields the snapshot needs. The player
    /// is skipped, never fatal for the location.
    #[error("inconsistent state for player `{user_id}`: {reason}")]
    InconsistentPlayerState { user_id: String, reason: String },

    #[error("store error: {0}")]
    Store(#[from] redis::RedisError),
}

impl EngineError {
    pub fn inconsistent(user_id: &str, reason: impl Into<String>) -> Self {
        EngineError::InconsistentPlayerState {
            user_id: user_id.to_string(),
            reason: reason.into(),
        }
    }
}
