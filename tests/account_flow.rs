//! End-to-end account flows against the SQLite store.

use async_trait::async_trait;
use ihub_loyalty::auth::{IdSampler, SequenceSampler};
use ihub_loyalty::config::{Config, HasherConfig};
use ihub_loyalty::store::{
    IdentityStore, LedgerStore, NewUser, RewardRecord, RewardStore, SqliteStore, StoreError,
    TransactionRecord, UserRecord,
};
use ihub_loyalty::{AccountError, LoyaltyCore, MemorySessionHolder, SignUpRequest};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

fn config() -> Config {
    Config {
        hasher: HasherConfig::low_cost(),
        ..Config::default()
    }
}

fn request(email: &str, secret: &str) -> SignUpRequest {
    SignUpRequest {
        firstname: "Andres".into(),
        surname: "Bonifacio".into(),
        birthday: "1993-11-30".into(),
        contact_number: "09181112222".into(),
        email: email.into(),
        secret: secret.into(),
        referral_code: Some("FRIEND50".into()),
    }
}

/// Wraps a store, counting every call and optionally hiding existing ids
/// from the pre-insert check so only the UNIQUE constraint can catch them.
struct Instrumented {
    inner: SqliteStore,
    calls: AtomicUsize,
    blind_existence_check: bool,
}

impl Instrumented {
    fn new(blind_existence_check: bool) -> Self {
        Self {
            inner: SqliteStore::in_memory().unwrap(),
            calls: AtomicUsize::new(0),
            blind_existence_check,
        }
    }

    fn tick(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl IdentityStore for Instrumented {
    fn name(&self) -> &str {
        "instrumented"
    }

    async fn user_id_exists(&self, user_id: &str) -> Result<bool, StoreError> {
        self.tick();
        if self.blind_existence_check {
            return Ok(false);
        }
        self.inner.user_id_exists(user_id).await
    }

    async fn insert_user(&self, user: &NewUser) -> Result<(), StoreError> {
        self.tick();
        // Give the other sign-up a chance to reach its own insert.
        tokio::task::yield_now().await;
        self.inner.insert_user(user).await
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<UserRecord>, StoreError> {
        self.tick();
        self.inner.find_user_by_email(email).await
    }

    async fn find_user_by_id(&self, user_id: &str) -> Result<Option<UserRecord>, StoreError> {
        self.tick();
        self.inner.find_user_by_id(user_id).await
    }
}

#[async_trait]
impl LedgerStore for Instrumented {
    async fn transactions_for_user(
        &self,
        user_id: &str,
    ) -> Result<Vec<TransactionRecord>, StoreError> {
        self.tick();
        self.inner.transactions_for_user(user_id).await
    }

    async fn redeemed_voucher_codes(&self, user_id: &str) -> Result<Vec<String>, StoreError> {
        self.tick();
        self.inner.redeemed_voucher_codes(user_id).await
    }
}

#[async_trait]
impl RewardStore for Instrumented {
    async fn list_rewards(&self) -> Result<Vec<RewardRecord>, StoreError> {
        self.tick();
        self.inner.list_rewards().await
    }
}

fn fixed_ids(ids: &[u32]) -> Arc<dyn IdSampler> {
    Arc::new(SequenceSampler::new(ids.iter().copied()))
}

#[tokio::test]
async fn sign_up_issues_fresh_six_digit_id() {
    let store = Arc::new(SqliteStore::in_memory().unwrap());
    let core = LoyaltyCore::new(store.clone(), &config()).unwrap();

    let first = core.sign_up(request("one@example.com", "pw-one")).await.unwrap();
    let second = core.sign_up(request("two@example.com", "pw-two")).await.unwrap();

    for id in [&first, &second] {
        assert_eq!(id.len(), 6);
        assert!(id.chars().all(|c| c.is_ascii_digit()));
        assert!(id.as_str() >= "100000");
    }
    assert_ne!(first, second);
    assert_eq!(store.user_count().unwrap(), 2);
}

#[tokio::test]
async fn sign_up_then_sign_in_round_trip() {
    let store = Arc::new(SqliteStore::in_memory().unwrap());
    let core = LoyaltyCore::new(store, &config()).unwrap();

    let id = core.sign_up(request("andres@example.com", "katipunan")).await.unwrap();
    let claim = core.sign_in("andres@example.com", "katipunan").await.unwrap();
    assert_eq!(claim.user_id, id);

    assert_eq!(
        core.sign_in("andres@example.com", "katipunan!").await.unwrap_err(),
        AccountError::IncorrectPassword
    );
    assert_eq!(
        core.sign_in("nobody@example.com", "katipunan").await.unwrap_err(),
        AccountError::AccountNotFound
    );

    let profile = core.profile(&id).await.unwrap();
    assert_eq!(profile.referral_code.as_deref(), Some("FRIEND50"));
    assert!(profile.is_active(chrono::Utc::now()));
}

#[tokio::test]
async fn stored_secret_is_a_salted_digest() {
    let store = Arc::new(SqliteStore::in_memory().unwrap());
    let core = LoyaltyCore::new(store.clone(), &config()).unwrap();
    core.sign_up(request("a@example.com", "same-secret")).await.unwrap();
    core.sign_up(request("b@example.com", "same-secret")).await.unwrap();

    let a = store.find_user_by_email("a@example.com").await.unwrap().unwrap();
    let b = store.find_user_by_email("b@example.com").await.unwrap().unwrap();
    assert!(a.secret.starts_with("$argon2id$"));
    assert!(!a.secret.contains("same-secret"));
    assert_ne!(a.secret, b.secret);
}

#[tokio::test]
async fn blank_secret_makes_no_store_calls() {
    let store = Arc::new(Instrumented::new(false));
    let core = LoyaltyCore::new(store.clone(), &config()).unwrap();

    for secret in ["", "   ", "\t\n"] {
        assert_eq!(
            core.sign_up(request("a@example.com", secret)).await.unwrap_err(),
            AccountError::InvalidCredentialFormat
        );
    }
    assert_eq!(store.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn missing_credentials_make_no_store_calls() {
    let store = Arc::new(Instrumented::new(false));
    let core = LoyaltyCore::new(store.clone(), &config()).unwrap();

    assert_eq!(
        core.sign_in(" ", "pw").await.unwrap_err(),
        AccountError::MissingCredentials
    );
    assert_eq!(store.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn duplicate_email_is_rejected() {
    let store = Arc::new(SqliteStore::in_memory().unwrap());
    let core = LoyaltyCore::new(store.clone(), &config()).unwrap();

    core.sign_up(request("dup@example.com", "pw")).await.unwrap();
    assert_eq!(
        core.sign_up(request("dup@example.com", "pw2")).await.unwrap_err(),
        AccountError::EmailAlreadyRegistered
    );
    assert_eq!(store.user_count().unwrap(), 1);
}

#[tokio::test]
async fn exhausted_identifier_space_is_reported() {
    let store = Arc::new(SqliteStore::in_memory().unwrap());
    let mut cfg = config();
    cfg.identity.max_id_attempts = 4;

    let first = LoyaltyCore::with_id_sampler(store.clone(), &cfg, fixed_ids(&[424_242])).unwrap();
    assert_eq!(first.sign_up(request("a@example.com", "pw")).await.unwrap(), "424242");

    let second = LoyaltyCore::with_id_sampler(store.clone(), &cfg, fixed_ids(&[424_242])).unwrap();
    assert_eq!(
        second.sign_up(request("b@example.com", "pw")).await.unwrap_err(),
        AccountError::IdentifierSpaceExhausted { attempts: 4 }
    );
    assert_eq!(store.user_count().unwrap(), 1);
}

#[tokio::test]
async fn concurrent_sign_ups_never_share_an_id() {
    let store = Arc::new(Instrumented::new(true));
    let mut cfg = config();
    cfg.identity.max_id_attempts = 3;

    let a = LoyaltyCore::with_id_sampler(store.clone(), &cfg, fixed_ids(&[555_555])).unwrap();
    let b = LoyaltyCore::with_id_sampler(store.clone(), &cfg, fixed_ids(&[555_555])).unwrap();

    let (ra, rb) = tokio::join!(
        a.sign_up(request("a@example.com", "pw")),
        b.sign_up(request("b@example.com", "pw")),
    );

    let winners: Vec<_> = [&ra, &rb].into_iter().filter_map(|r| r.as_ref().ok()).collect();
    assert_eq!(winners, [&"555555".to_string()]);
    let loser = [ra, rb].into_iter().find_map(Result::err).unwrap();
    assert_eq!(loser, AccountError::IdentifierSpaceExhausted { attempts: 3 });
    assert_eq!(store.inner.user_count().unwrap(), 1);
}

#[tokio::test]
async fn race_loser_retries_with_a_new_id() {
    let store = Arc::new(Instrumented::new(true));
    let cfg = config();

    let a = LoyaltyCore::with_id_sampler(store.clone(), &cfg, fixed_ids(&[555_555])).unwrap();
    let b = LoyaltyCore::with_id_sampler(store.clone(), &cfg, fixed_ids(&[555_555, 666_666]))
        .unwrap();

    assert_eq!(a.sign_up(request("a@example.com", "pw")).await.unwrap(), "555555");
    assert_eq!(b.sign_up(request("b@example.com", "pw")).await.unwrap(), "666666");
    assert_eq!(store.inner.user_count().unwrap(), 2);
}

#[tokio::test]
async fn remembered_login_restores_claim() {
    let store = Arc::new(SqliteStore::in_memory().unwrap());
    let core = LoyaltyCore::new(store, &config()).unwrap();
    let id = core.sign_up(request("m@example.com", "pw")).await.unwrap();
    let claim = core.sign_in("m@example.com", "pw").await.unwrap();

    let login = core.remembered_login(Arc::new(MemorySessionHolder::new()));
    login.remember(&claim).await.unwrap();
    assert_eq!(login.restore().await.unwrap().unwrap().user_id, id);
    login.forget().await.unwrap();
    assert!(login.restore().await.unwrap().is_none());
}
