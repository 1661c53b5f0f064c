//! Member identity: credential hashing, member-ID issuance, sign-up and sign-in.
//!
//! Provides:
//! - Argon2id credential digests (PHC strings), with read-only support for
//!   legacy unsalted SHA-256 digests
//! - Six-digit member identifiers, unique at issuance, drawn by a bounded loop
//! - Sign-up / sign-in workflows over an [`IdentityStore`](crate::store::IdentityStore)
//!
//! ## Design Decisions
//! - Uniqueness is decided by the store's constraints; the pre-insert
//!   existence check only avoids obvious collisions.
//! - Sign-in failures stay distinct (`AccountNotFound` / `IncorrectPassword`)
//!   for callers, while the user-facing message is the same for both.

pub mod hasher;
pub mod id_generator;
pub mod workflow;

pub use hasher::{CredentialHasher, Verification};
pub use id_generator::{IdGenerator, IdSampler, SequenceSampler, UniformSampler};
pub use workflow::{AccountService, IdentityClaim, MemberProfile, SignUpRequest};
