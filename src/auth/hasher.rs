//! Credential hashing.
//!
//! New digests are Argon2id PHC strings with a per-call random salt, so the
//! salt is stored alongside the digest. Digests written by earlier app releases
//! (unsalted lowercase hex SHA-256) are still accepted on verification and
//! reported as [`Verification::LegacyMatch`]; they are never produced here.

use crate::config::HasherConfig;
use crate::error::AccountError;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::{Algorithm, Argon2, Params, Version};
use rand::rngs::OsRng;
use sha2::{Digest, Sha256};

/// Fixed salt used only to burn the same CPU time when no account matches.
const DUMMY_SALT: &str = "aWh1Yi1sb3lhbHR5LWR1bW15";

/// Hex length of a legacy SHA-256 digest.
const LEGACY_DIGEST_LEN: usize = 64;

/// Outcome of comparing a secret against a stored digest.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verification {
    /// Argon2id digest matched.
    Match,
    /// Legacy unsalted SHA-256 digest matched.
    LegacyMatch,
    Mismatch,
}

impl Verification {
    pub fn is_match(self) -> bool {
        !matches!(self, Self::Mismatch)
    }
}

/// Reject secrets that are empty after trimming.
pub fn ensure_secret_format(secret: &str) -> Result<(), AccountError> {
    if secret.trim().is_empty() {
        return Err(AccountError::InvalidCredentialFormat);
    }
    Ok(())
}

/// Argon2id credential hasher with configurable cost.
pub struct CredentialHasher {
    argon2: Argon2<'static>,
}

impl CredentialHasher {
    pub fn new(config: &HasherConfig) -> anyhow::Result<Self> {
        let params = Params::new(
            config.memory_kib,
            config.iterations,
            config.parallelism,
            None,
        )
        .map_err(|e| anyhow::anyhow!("Invalid Argon2 parameters: {e}"))?;

        Ok(Self {
            argon2: Argon2::new(Algorithm::Argon2id, Version::V0x13, params),
        })
    }

    /// Digest a secret with a fresh random salt.
    pub fn hash(&self, secret: &str) -> Result<String, AccountError> {
        ensure_secret_format(secret)?;
        let salt = SaltString::generate(&mut OsRng);
        self.hash_with_salt_string(secret, &salt)
    }

    /// Digest a secret with a caller-chosen salt (unpadded base64, 4–64
    /// chars). Deterministic for a fixed salt.
    pub fn hash_with_salt(&self, secret: &str, salt_b64: &str) -> Result<String, AccountError> {
        ensure_secret_format(secret)?;
        let salt = SaltString::from_b64(salt_b64).map_err(|_| AccountError::InvalidCredentialFormat)?;
        self.hash_with_salt_string(secret, &salt)
    }

    fn hash_with_salt_string(&self, secret: &str, salt: &SaltString) -> Result<String, AccountError> {
        self.argon2
            .hash_password(secret.as_bytes(), salt)
            .map(|hash| hash.to_string())
            .map_err(|_| AccountError::InvalidCredentialFormat)
    }

    /// Compare a secret against a stored digest.
    pub fn verify(&self, secret: &str, digest: &str) -> Verification {
        if digest.starts_with('$') {
            let Ok(parsed) = PasswordHash::new(digest) else {
                tracing::warn!("Stored credential digest is not a valid PHC string");
                return Verification::Mismatch;
            };
            return match self.argon2.verify_password(secret.as_bytes(), &parsed) {
                Ok(()) => Verification::Match,
                Err(_) => Verification::Mismatch,
            };
        }

        if is_legacy_digest(digest) {
            let attempt = legacy_digest(secret);
            if constant_time_eq(attempt.as_bytes(), digest.to_ascii_lowercase().as_bytes()) {
                return Verification::LegacyMatch;
            }
        }

        Verification::Mismatch
    }

    /// Spend one hash worth of work on a secret without a stored digest,
    /// so an unknown email costs the same as a wrong password.
    pub fn burn(&self, secret: &str) {
        let _ = self.hash_with_salt(secret, DUMMY_SALT);
    }
}

/// Unsalted hex SHA-256, the digest format of accounts created by earlier
/// app releases.
pub fn legacy_digest(secret: &str) -> String {
    hex::encode(Sha256::digest(secret.as_bytes()))
}

fn is_legacy_digest(digest: &str) -> bool {
    digest.len() == LEGACY_DIGEST_LEN && digest.bytes().all(|b| b.is_ascii_hexdigit())
}

/// Constant-time byte comparison to prevent timing attacks.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut diff = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}
