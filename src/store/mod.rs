//! Persistence boundary for users, transactions and rewards.
//!
//! The hosted database is an external collaborator. The workflows only see
//! the three traits below; adapters translate them to a concrete backend:
//! - [`SupabaseStore`]: PostgREST over HTTPS (production)
//! - [`SqliteStore`]: local SQLite file or in-memory database (development, tests)
//!
//! Uniqueness of `userId` and `email` is enforced by the store, never by the
//! caller; adapters report a violated constraint as
//! [`StoreError::UniqueViolation`] naming the column.

pub mod records;
pub mod sqlite;
pub mod supabase;

use async_trait::async_trait;

pub use records::{NewUser, RewardRecord, TransactionRecord, UserRecord};
pub use sqlite::SqliteStore;
pub use supabase::{SupabaseConfig, SupabaseStore};

/// Column names shared by every adapter.
pub mod columns {
    pub const USER_ID: &str = "userId";
    pub const EMAIL: &str = "email";
}

/// Failure reported by a store adapter.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// An insert collided with a unique key.
    #[error("duplicate value for unique column '{column}'")]
    UniqueViolation { column: String },
    /// Transport-level failure or a non-success status.
    #[error("store request failed: {0}")]
    Request(String),
    /// The response could not be decoded into the expected rows.
    #[error("unexpected store response: {0}")]
    Decode(String),
    /// Local database failure.
    #[error("database error: {0}")]
    Database(String),
}

impl StoreError {
    /// Whether this is a uniqueness violation on the given column.
    pub fn is_unique_violation_on(&self, column: &str) -> bool {
        matches!(self, Self::UniqueViolation { column: c } if c == column)
    }
}

/// Access to the `users` table.
#[async_trait]
pub trait IdentityStore: Send + Sync {
    /// Short adapter name, used in logs.
    fn name(&self) -> &str;

    /// Whether a user with this identifier exists.
    async fn user_id_exists(&self, user_id: &str) -> Result<bool, StoreError>;

    /// Insert a new user. Atomic at the store level.
    async fn insert_user(&self, user: &NewUser) -> Result<(), StoreError>;

    /// Exact-match lookup by email.
    async fn find_user_by_email(&self, email: &str) -> Result<Option<UserRecord>, StoreError>;

    /// Lookup by identifier.
    async fn find_user_by_id(&self, user_id: &str) -> Result<Option<UserRecord>, StoreError>;
}

/// Read access to the `transactions` table.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Every transaction owned by the user, in store order.
    async fn transactions_for_user(&self, user_id: &str)
        -> Result<Vec<TransactionRecord>, StoreError>;

    /// Voucher codes the user has already redeemed.
    async fn redeemed_voucher_codes(&self, user_id: &str) -> Result<Vec<String>, StoreError>;
}

/// Read access to the `rewards` table.
#[async_trait]
pub trait RewardStore: Send + Sync {
    async fn list_rewards(&self) -> Result<Vec<RewardRecord>, StoreError>;
}
