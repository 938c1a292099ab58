//! Provider error types.

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum Error {
    #[error("Provider initialization failed: {0}")]
    Initialization(String),

    #[error("Provider not initialized")]
    NotInitialized,

    #[error("User denied the intent")]
    UserDenied,

    #[error("Token allowance denied")]
    AllowanceDenied,

    #[error("Invalid parameters: {0}")]
    InvalidParams(String),

    #[error("Insufficient balance: need {needed} {token}, have {available}")]
    InsufficientBalance {
        token: String,
        needed: String,
        available: String,
    },

    #[error("Transaction reverted: {0}")]
    Reverted(String),

    #[error("Transport error: {0}")]
    Transport(String),
}

impl Error {
    /// True when the user declined a fee confirmation.
    #[must_use]
    pub fn is_user_denial(&self) -> bool {
        matches!(self, Error::UserDenied)
    }
}
