//! Loyalty-membership core for the iHub app.
//!
//! The presentation layer calls into this crate for:
//! - member sign-up and sign-in ([`auth`])
//! - the point balance and transaction history ([`ledger`])
//! - the reward catalog and membership perks ([`rewards`])
//! - "remember me" session storage ([`session`])
//!
//! Persistence goes through the traits in [`store`], with a Supabase
//! (PostgREST) adapter for production and a SQLite adapter for local use.
//! [`LoyaltyCore`] wires everything together from a [`Config`].

pub mod auth;
pub mod config;
pub mod error;
pub mod ledger;
pub mod logging;
pub mod rewards;
pub mod service;
pub mod session;
pub mod store;

pub use crate::auth::{IdentityClaim, MemberProfile, SignUpRequest, Verification};
pub use crate::config::Config;
pub use crate::error::AccountError;
pub use crate::ledger::LedgerEntry;
pub use crate::rewards::{PerkSection, RewardView, PERK_SECTIONS};
pub use crate::service::{file_remembered_login, LoyaltyCore};
pub use crate::session::{FileSessionHolder, MemorySessionHolder, RememberedLogin, SessionHolder};
pub use crate::store::{SqliteStore, StoreError, SupabaseStore};
