//! Runtime configuration.
//!
//! Loaded from a TOML file (`config.toml` under the platform config dir by
//! default), then overridden from the environment. Every section has
//! defaults, so a missing file yields a usable config for the SQLite store.

use crate::store::supabase::{ENV_KEY, ENV_URL};
use crate::store::SupabaseConfig;
use anyhow::{bail, Context};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

const QUALIFIER: &str = "ph";
const ORGANIZATION: &str = "iHub";
const APPLICATION: &str = "ihub-loyalty";

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Hosted store connection. `None` until a URL and key are configured.
    pub store: Option<SupabaseConfig>,
    pub hasher: HasherConfig,
    pub identity: IdentityConfig,
    pub ledger: LedgerConfig,
    pub session: SessionConfig,
}

/// Argon2id cost parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HasherConfig {
    /// Memory cost in KiB.
    pub memory_kib: u32,
    /// Time cost (passes).
    pub iterations: u32,
    /// Lanes.
    pub parallelism: u32,
}

impl Default for HasherConfig {
    fn default() -> Self {
        Self {
            memory_kib: 19_456,
            iterations: 2,
            parallelism: 1,
        }
    }
}

impl HasherConfig {
    /// Minimum-cost parameters for tests and local tooling.
    pub fn low_cost() -> Self {
        Self {
            memory_kib: 8,
            iterations: 1,
            parallelism: 1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IdentityConfig {
    /// Candidate budget per sign-up, shared with insert retries.
    pub max_id_attempts: u32,
    /// Length of the membership window.
    pub membership_months: u32,
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            max_id_attempts: 32,
            membership_months: 12,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    /// Report a balance of 0 instead of `NoTransactionsFound` for a member
    /// with no transactions.
    pub empty_ledger_is_zero: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Key under which the identity claim is remembered.
    pub key: String,
    /// Session file. Defaults to `session.json` under the platform data dir.
    pub path: Option<PathBuf>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            key: "user".to_string(),
            path: None,
        }
    }
}

impl SessionConfig {
    /// Configured path, or the platform default.
    pub fn resolved_path(&self) -> anyhow::Result<PathBuf> {
        if let Some(path) = &self.path {
            return Ok(path.clone());
        }
        let dirs = project_dirs()?;
        Ok(dirs.data_dir().join("session.json"))
    }
}

fn project_dirs() -> anyhow::Result<ProjectDirs> {
    ProjectDirs::from(QUALIFIER, ORGANIZATION, APPLICATION)
        .ok_or_else(|| anyhow::anyhow!("Could not determine platform directories"))
}

/// Default location of `config.toml`.
pub fn default_config_path() -> anyhow::Result<PathBuf> {
    Ok(project_dirs()?.config_dir().join("config.toml"))
}

impl Config {
    /// Load from `path` (or the default location), apply environment
    /// overrides and validate. A missing file is not an error.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        Self::load_with_env(path, |key| std::env::var(key).ok())
    }

    /// [`load`](Self::load) with environment values taken from `lookup`.
    pub fn load_with_env<F>(path: Option<&Path>, lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => default_config_path()?,
        };

        let mut config = if path.exists() {
            let contents = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read config {}", path.display()))?;
            Self::from_toml(&contents)
                .with_context(|| format!("Failed to parse config {}", path.display()))?
        } else {
            tracing::debug!(path = %path.display(), "No config file, using defaults");
            Self::default()
        };

        config.apply_env_overrides_from(lookup);
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml(contents: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(contents)?)
    }

    /// Apply `IHUB_SUPABASE_URL`, `IHUB_SUPABASE_KEY` and
    /// `IHUB_EMPTY_LEDGER_IS_ZERO` from the process environment.
    pub fn apply_env_overrides(&mut self) {
        self.apply_env_overrides_from(|key| std::env::var(key).ok());
    }

    pub fn apply_env_overrides_from<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        match &mut self.store {
            Some(store) => {
                if let Some(url) = non_empty(ENV_URL) {
                    store.url = url;
                }
                if let Some(key) = non_empty(ENV_KEY) {
                    store.api_key = key;
                }
            }
            None => self.store = SupabaseConfig::from_lookup(&lookup),
        }

        if let Some(flag) = non_empty("IHUB_EMPTY_LEDGER_IS_ZERO") {
            self.ledger.empty_ledger_is_zero =
                matches!(flag.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on");
        }
    }

    /// Reject values the workflows cannot run with.
    pub fn validate(&self) -> anyhow::Result<()> {
        if let Some(store) = &self.store {
            if !store.url.starts_with("http://") && !store.url.starts_with("https://") {
                bail!("store.url must be an http(s) URL");
            }
            if store.api_key.trim().is_empty() {
                bail!("store.api_key must not be empty");
            }
            if store.timeout_secs == 0 {
                bail!("store.timeout_secs must be at least 1");
            }
        }
        if self.hasher.parallelism == 0 {
            bail!("hasher.parallelism must be at least 1");
        }
        if self.hasher.parallelism > argon2::Params::MAX_P_COST {
            bail!(
                "hasher.parallelism must be at most {}",
                argon2::Params::MAX_P_COST
            );
        }
        if self.hasher.memory_kib < self.hasher.parallelism.saturating_mul(8) {
            bail!("hasher.memory_kib must be at least 8 KiB per lane");
        }
        if self.hasher.iterations == 0 {
            bail!("hasher.iterations must be at least 1");
        }
        if self.identity.max_id_attempts == 0 {
            bail!("identity.max_id_attempts must be at least 1");
        }
        if !(1..=120).contains(&self.identity.membership_months) {
            bail!("identity.membership_months must be between 1 and 120");
        }
        if self.session.key.trim().is_empty() {
            bail!("session.key must not be empty");
        }
        Ok(())
    }
}
