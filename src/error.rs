//! Typed failures returned by the account, ledger and reward workflows.
//!
//! Every workflow returns `Result<_, AccountError>`; nothing in the core
//! panics on bad input or a failed store call. Store adapters report
//! [`StoreError`](crate::store::StoreError), which is folded into
//! [`AccountError::PersistenceError`] at the workflow boundary.

use crate::store::StoreError;

/// Generic message shown to end users for any authentication failure.
pub const GENERIC_AUTH_FAILURE: &str = "Invalid email or password.";

/// Errors surfaced to the presentation layer.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AccountError {
    /// The secret is empty or whitespace-only.
    #[error("Invalid password format")]
    InvalidCredentialFormat,

    /// Email or secret missing at sign-in.
    #[error("Please enter both email and password")]
    MissingCredentials,

    /// No user record matches the email (or id).
    #[error("Account not found")]
    AccountNotFound,

    /// A user record exists but the secret does not match its digest.
    #[error("Incorrect password")]
    IncorrectPassword,

    /// The birthday could not be parsed as a calendar date.
    #[error("Invalid birthday '{0}'")]
    InvalidBirthday(String),

    /// Another account already uses this email.
    #[error("An account with this email already exists")]
    EmailAlreadyRegistered,

    /// The user has no transaction records at all.
    #[error("No transactions found")]
    NoTransactionsFound,

    /// Every sampled identifier was already taken.
    #[error("No free member ID found after {attempts} attempts")]
    IdentifierSpaceExhausted { attempts: u32 },

    /// Any store-layer failure, carrying the store's message.
    #[error("{0}")]
    PersistenceError(String),

    /// A background task (credential hashing) did not complete.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AccountError {
    /// Message safe to show to the end user.
    ///
    /// `AccountNotFound` and `IncorrectPassword` collapse into one generic
    /// message so a sign-in screen does not reveal which emails are
    /// registered.
    pub fn user_message(&self) -> String {
        match self {
            Self::AccountNotFound | Self::IncorrectPassword => GENERIC_AUTH_FAILURE.to_string(),
            other => other.to_string(),
        }
    }

    /// Whether the failure is an authentication rejection.
    pub fn is_auth_failure(&self) -> bool {
        matches!(self, Self::AccountNotFound | Self::IncorrectPassword)
    }
}

impl From<StoreError> for AccountError {
    fn from(err: StoreError) -> Self {
        Self::PersistenceError(err.to_string())
    }
}
