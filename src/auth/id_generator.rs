//! Six-digit member identifiers.
//!
//! Candidates are drawn uniformly from [100000, 999999] and checked against
//! the identity store. The loop is bounded: once the attempt budget is spent
//! the caller gets [`AccountError::IdentifierSpaceExhausted`] instead of
//! spinning forever on a nearly full space.

use crate::error::AccountError;
use crate::store::IdentityStore;
use parking_lot::Mutex;
use rand::Rng;
use std::collections::VecDeque;
use std::sync::Arc;

/// Smallest issuable identifier.
pub const ID_MIN: u32 = 100_000;

/// Largest issuable identifier.
pub const ID_MAX: u32 = 999_999;

/// Source of candidate identifiers.
pub trait IdSampler: Send + Sync {
    fn sample(&self) -> u32;
}

/// Uniform draw from the thread-local CSPRNG.
#[derive(Debug, Default, Clone, Copy)]
pub struct UniformSampler;

impl IdSampler for UniformSampler {
    fn sample(&self) -> u32 {
        rand::thread_rng().gen_range(ID_MIN..=ID_MAX)
    }
}

/// Replays a fixed list of candidates, then repeats the last one.
///
/// Supported deterministic source for [`LoyaltyCore::with_id_sampler`] and
/// [`IdGenerator::with_sampler`], for seeded stores and integration
/// tests that need known member IDs. An empty list
/// yields [`ID_MIN`]. Values outside the issuable range are clamped by the
/// generator. Not for production sign-up: repeated values exhaust the
/// attempt budget instead of finding a free ID.
///
/// [`LoyaltyCore::with_id_sampler`]: crate::LoyaltyCore::with_id_sampler
pub struct SequenceSampler {
    queue: Mutex<VecDeque<u32>>,
    last: Mutex<u32>,
}

impl SequenceSampler {
    pub fn new(values: impl IntoIterator<Item = u32>) -> Self {
        Self {
            queue: Mutex::new(values.into_iter().collect()),
            last: Mutex::new(ID_MIN),
        }
    }
}

impl IdSampler for SequenceSampler {
    fn sample(&self) -> u32 {
        let mut last = self.last.lock();
        if let Some(next) = self.queue.lock().pop_front() {
            *last = next;
        }
        *last
    }
}

/// Whether `id` is a well-formed member identifier.
pub fn is_member_id(id: &str) -> bool {
    id.len() == 6
        && id.bytes().all(|b| b.is_ascii_digit())
        && id
            .parse::<u32>()
            .is_ok_and(|n| (ID_MIN..=ID_MAX).contains(&n))
}

/// Remaining candidate budget for one sign-up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Attempts {
    used: u32,
    max: u32,
}

impl Attempts {
    pub fn new(max: u32) -> Self {
        Self { used: 0, max }
    }

    pub fn used(&self) -> u32 {
        self.used
    }

    fn take(&mut self) -> Result<(), AccountError> {
        if self.used >= self.max {
            return Err(AccountError::IdentifierSpaceExhausted { attempts: self.used });
        }
        self.used += 1;
        Ok(())
    }
}

/// Bounded generator of free member identifiers.
#[derive(Clone)]
pub struct IdGenerator {
    sampler: Arc<dyn IdSampler>,
    max_attempts: u32,
}

impl IdGenerator {
    pub fn new(max_attempts: u32) -> Self {
        Self::with_sampler(Arc::new(UniformSampler), max_attempts)
    }

    pub fn with_sampler(sampler: Arc<dyn IdSampler>, max_attempts: u32) -> Self {
        Self {
            sampler,
            max_attempts: max_attempts.max(1),
        }
    }

    /// A fresh budget sized from the configured maximum.
    pub fn attempts(&self) -> Attempts {
        Attempts::new(self.max_attempts)
    }

    /// First free identifier within a fresh budget.
    pub async fn generate(&self, store: &dyn IdentityStore) -> Result<String, AccountError> {
        let mut attempts = self.attempts();
        self.next_free(store, &mut attempts).await
    }

    /// First free identifier, charging every candidate to `attempts`.
    /// The budget is shared with insert retries after a uniqueness race.
    pub async fn next_free(
        &self,
        store: &dyn IdentityStore,
        attempts: &mut Attempts,
    ) -> Result<String, AccountError> {
        loop {
            attempts.take()?;
            let candidate = format!("{:06}", self.sampler.sample().clamp(ID_MIN, ID_MAX));
            if !store.user_id_exists(&candidate).await? {
                return Ok(candidate);
            }
            tracing::debug!(
                attempt = attempts.used(),
                store = store.name(),
                "Member id candidate already taken"
            );
        }
    }
}
