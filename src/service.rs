//! One entry point bundling the account, ledger and reward services over a
//! single store.

use crate::auth::{
    AccountService, CredentialHasher, IdGenerator, IdSampler, IdentityClaim, MemberProfile,
    SignUpRequest, UniformSampler,
};
use crate::config::Config;
use crate::error::AccountError;
use crate::ledger::{LedgerEntry, LedgerService};
use crate::rewards::{RewardCatalog, RewardView};
use crate::session::{FileSessionHolder, RememberedLogin, SessionHolder};
use crate::store::{IdentityStore, LedgerStore, RewardStore, SqliteStore, SupabaseStore};
use std::path::Path;
use std::sync::Arc;

pub struct LoyaltyCore {
    accounts: AccountService,
    ledger: LedgerService,
    rewards: RewardCatalog,
    session_key: String,
}

impl LoyaltyCore {
    /// Build over any store implementing all three store traits.
    pub fn new<S>(store: Arc<S>, config: &Config) -> anyhow::Result<Self>
    where
        S: IdentityStore + LedgerStore + RewardStore + 'static,
    {
        Self::with_id_sampler(store, config, Arc::new(UniformSampler))
    }

    /// Like [`new`](Self::new) with a custom member-ID source.
    pub fn with_id_sampler<S>(
        store: Arc<S>,
        config: &Config,
        sampler: Arc<dyn IdSampler>,
    ) -> anyhow::Result<Self>
    where
        S: IdentityStore + LedgerStore + RewardStore + 'static,
    {
        config.validate()?;
        let hasher = Arc::new(CredentialHasher::new(&config.hasher)?);
        let ids = IdGenerator::with_sampler(sampler, config.identity.max_id_attempts);

        let accounts = AccountService::new(
            store.clone(),
            hasher,
            ids,
            config.identity.membership_months,
        );
        let ledger = LedgerService::new(store.clone(), config.ledger.empty_ledger_is_zero);
        let rewards = RewardCatalog::new(store.clone(), store);

        Ok(Self {
            accounts,
            ledger,
            rewards,
            session_key: config.session.key.clone(),
        })
    }

    /// Over the hosted Supabase project named in `config.store`.
    pub fn supabase(config: &Config) -> anyhow::Result<Self> {
        let Some(store_config) = config.store.clone() else {
            anyhow::bail!(
                "No [store] configured. Set store.url and store.api_key, \
                 or IHUB_SUPABASE_URL and IHUB_SUPABASE_KEY"
            );
        };
        let store = SupabaseStore::new(store_config)?;
        tracing::info!("Using Supabase store");
        Self::new(Arc::new(store), config)
    }

    /// Over a local SQLite database file.
    pub fn sqlite(path: &Path, config: &Config) -> anyhow::Result<Self> {
        let store = SqliteStore::open(path)?;
        tracing::info!(path = %path.display(), "Using SQLite store");
        Self::new(Arc::new(store), config)
    }

    pub async fn sign_up(&self, request: SignUpRequest) -> Result<String, AccountError> {
        self.accounts.sign_up(request).await
    }

    pub async fn sign_in(&self, email: &str, secret: &str) -> Result<IdentityClaim, AccountError> {
        self.accounts.sign_in(email, secret).await
    }

    pub async fn profile(&self, user_id: &str) -> Result<MemberProfile, AccountError> {
        self.accounts.profile(user_id).await
    }

    pub async fn compute_balance(&self, user_id: &str) -> Result<i64, AccountError> {
        self.ledger.compute_balance(user_id).await
    }

    pub async fn history(&self, user_id: &str) -> Result<Vec<LedgerEntry>, AccountError> {
        self.ledger.history(user_id).await
    }

    pub async fn rewards_for(&self, user_id: &str) -> Result<Vec<RewardView>, AccountError> {
        self.rewards.rewards_for(user_id).await
    }

    /// Remembered login over `holder`, under the configured session key.
    pub fn remembered_login(&self, holder: Arc<dyn SessionHolder>) -> RememberedLogin {
        RememberedLogin::new(holder, self.session_key.clone())
    }
}

/// Remembered login backed by the configured session file.
pub fn file_remembered_login(config: &Config) -> anyhow::Result<RememberedLogin> {
    let holder = FileSessionHolder::new(config.session.resolved_path()?);
    Ok(RememberedLogin::new(Arc::new(holder), config.session.key.clone()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HasherConfig;
    use crate::store::SupabaseConfig;

    fn test_config() -> Config {
        Config {
            hasher: HasherConfig::low_cost(),
            ..Config::default()
        }
    }

    #[test]
    fn supabase_requires_store_section() {
        let err = LoyaltyCore::supabase(&test_config()).err().unwrap();
        assert!(err.to_string().contains("No [store] configured"));
    }

    #[test]
    fn supabase_builds_with_store_section() {
        let mut config = test_config();
        config.store = Some(SupabaseConfig {
            url: "https://abc.supabase.co".into(),
            api_key: "anon".into(),
            timeout_secs: 5,
        });
        assert!(LoyaltyCore::supabase(&config).is_ok());
    }

    #[test]
    fn invalid_config_is_rejected() {
        let mut config = test_config();
        config.identity.max_id_attempts = 0;
        let store = Arc::new(SqliteStore::in_memory().unwrap());
        assert!(LoyaltyCore::new(store, &config).is_err());
    }

    #[tokio::test]
    async fn sqlite_core_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let core = LoyaltyCore::sqlite(&dir.path().join("ihub.db"), &test_config()).unwrap();

        let id = core
            .sign_up(SignUpRequest {
                firstname: "Jose".into(),
                surname: "Rizal".into(),
                birthday: "06/19/1991".into(),
                contact_number: "09170000000".into(),
                email: "jose@example.com".into(),
                secret: "noli".into(),
                referral_code: None,
            })
            .await
            .unwrap();
        assert_eq!(core.sign_in("jose@example.com", "noli").await.unwrap().user_id, id);
        assert_eq!(
            core.compute_balance(&id).await,
            Err(AccountError::NoTransactionsFound)
        );
        assert!(core.rewards_for(&id).await.unwrap().is_empty());
    }

    #[test]
    fn file_login_uses_configured_path() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = test_config();
        config.session.path = Some(dir.path().join("session.json"));
        assert!(file_remembered_login(&config).is_ok());
    }
}
