//! "Remember me" session storage.
//!
//! The presentation layer injects a [`SessionHolder`]; nothing here is
//! process-global. [`RememberedLogin`] keeps the identity claim under one
//! key so the app can sign a member back in on the next launch.

mod file;

pub use file::FileSessionHolder;

use crate::auth::IdentityClaim;
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// Key/value store for JSON session values.
#[async_trait]
pub trait SessionHolder: Send + Sync {
    async fn set(&self, key: &str, value: Value) -> anyhow::Result<()>;

    async fn get(&self, key: &str) -> anyhow::Result<Option<Value>>;

    /// Remove a key. Removing an absent key is not an error.
    async fn delete(&self, key: &str) -> anyhow::Result<()>;
}

/// Process-local holder. Lost on exit.
#[derive(Debug, Default)]
pub struct MemorySessionHolder {
    values: Mutex<HashMap<String, Value>>,
}

impl MemorySessionHolder {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionHolder for MemorySessionHolder {
    async fn set(&self, key: &str, value: Value) -> anyhow::Result<()> {
        self.values.lock().insert(key.to_string(), value);
        Ok(())
    }

    async fn get(&self, key: &str) -> anyhow::Result<Option<Value>> {
        Ok(self.values.lock().get(key).cloned())
    }

    async fn delete(&self, key: &str) -> anyhow::Result<()> {
        self.values.lock().remove(key);
        Ok(())
    }
}

/// Persisted identity claim for auto-login.
pub struct RememberedLogin {
    holder: Arc<dyn SessionHolder>,
    key: String,
}

impl RememberedLogin {
    pub fn new(holder: Arc<dyn SessionHolder>, key: impl Into<String>) -> Self {
        Self {
            holder,
            key: key.into(),
        }
    }

    pub async fn remember(&self, claim: &IdentityClaim) -> anyhow::Result<()> {
        self.holder.set(&self.key, serde_json::to_value(claim)?).await?;
        tracing::debug!(user_id = %claim.user_id, "Login remembered");
        Ok(())
    }

    /// The remembered claim, if any. A stored value that is not a valid
    /// claim is deleted and reported as absent.
    pub async fn restore(&self) -> anyhow::Result<Option<IdentityClaim>> {
        let Some(value) = self.holder.get(&self.key).await? else {
            return Ok(None);
        };

        match serde_json::from_value::<IdentityClaim>(value) {
            Ok(claim) => Ok(Some(claim)),
            Err(e) => {
                tracing::warn!(key = %self.key, "Discarding malformed remembered login: {e}");
                self.holder.delete(&self.key).await?;
                Ok(None)
            }
        }
    }

    /// Logout.
    pub async fn forget(&self) -> anyhow::Result<()> {
        self.holder.delete(&self.key).await
    }
}
