//! Supabase (PostgREST) adapter for the hosted `users`, `transactions`
//! and `rewards` tables.
//!
//! ## Design
//! - HTTP client (reqwest) against the PostgREST endpoint of the project
//! - API-key authentication (`apikey` + `Authorization: Bearer`)
//! - Query parameters are always URL-encoded by reqwest (emails contain `+`)
//! - A `409` carrying Postgres code `23505` is mapped to
//!   [`StoreError::UniqueViolation`] with the violated column

use super::records::{NewUser, RewardRecord, TransactionRecord, UserRecord};
use super::{columns, IdentityStore, LedgerStore, RewardStore, StoreError};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default HTTP timeout for store calls.
const DEFAULT_TIMEOUT_SECS: u64 = 30;

pub(crate) const ENV_URL: &str = "IHUB_SUPABASE_URL";
pub(crate) const ENV_KEY: &str = "IHUB_SUPABASE_KEY";

/// Postgres SQLSTATE for `unique_violation`.
const PG_UNIQUE_VIOLATION: &str = "23505";

const USERS: &str = "users";
const TRANSACTIONS: &str = "transactions";
const REWARDS: &str = "rewards";

const TRANSACTION_COLUMNS: &str =
    "id,userId,description,points,transactionType,voucherCode,created_at";
const REWARD_COLUMNS: &str =
    "voucherCode,name,description,neededPoints,image,unused,used,perCustomer";

// ── Configuration ────────────────────────────────────────────────

/// Supabase connection configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SupabaseConfig {
    /// Project URL (e.g., https://xxxx.supabase.co).
    pub url: String,
    /// API key sent as `apikey` and bearer token.
    pub api_key: String,
    /// Request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

impl SupabaseConfig {
    /// Load from `IHUB_SUPABASE_URL` / `IHUB_SUPABASE_KEY`.
    pub fn from_env() -> Option<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) over an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Option<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let url = lookup(ENV_URL)?;
        let api_key = lookup(ENV_KEY)?;

        if url.trim().is_empty() || api_key.trim().is_empty() {
            return None;
        }

        Some(Self {
            url,
            api_key,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        })
    }
}

// ── PostgREST error body ─────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
struct PostgrestError {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    details: Option<String>,
}

/// Column named in a unique-violation error, e.g.
/// `Key ("userId")=(123456) already exists.` or the constraint name.
fn unique_violation_column(err: &PostgrestError) -> String {
    if let Some(details) = err.details.as_deref() {
        if let Some(rest) = details.split("Key (").nth(1) {
            if let Some(col) = rest.split(")=").next() {
                return col.trim_matches('"').to_string();
            }
        }
    }
    let message = err.message.as_deref().unwrap_or_default().to_ascii_lowercase();
    if message.contains("userid") || message.contains("user_id") || message.contains("pkey") {
        columns::USER_ID.to_string()
    } else if message.contains("email") {
        columns::EMAIL.to_string()
    } else {
        "unknown".to_string()
    }
}

impl From<reqwest::Error> for StoreError {
    fn from(err: reqwest::Error) -> Self {
        Self::Request(err.to_string())
    }
}

// ── Store ────────────────────────────────────────────────────────

/// PostgREST-backed store.
pub struct SupabaseStore {
    config: SupabaseConfig,
    http: reqwest::Client,
}

impl SupabaseStore {
    /// Create a new store client.
    pub fn new(config: SupabaseConfig) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs.max(1)))
            .build()?;

        Ok(Self { config, http })
    }

    /// Build the PostgREST URL for a table.
    fn table_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{}", self.config.url.trim_end_matches('/'), table)
    }

    /// Get the base headers for authenticated requests.
    fn auth_headers(&self) -> Vec<(&str, String)> {
        vec![
            ("apikey", self.config.api_key.clone()),
            ("Authorization", format!("Bearer {}", self.config.api_key)),
        ]
    }

    async fn select<T: DeserializeOwned>(
        &self,
        table: &str,
        query: &[(&str, String)],
    ) -> Result<Vec<T>, StoreError> {
        let mut request = self.http.get(self.table_url(table)).query(query);
        for (key, value) in self.auth_headers() {
            request = request.header(key, value);
        }

        tracing::debug!(table, "store select");
        let resp = request.send().await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(StoreError::Request(format!("select on {table} failed ({status}): {body}")));
        }

        let body = resp.text().await?;
        serde_json::from_str(&body).map_err(|e| StoreError::Decode(format!("{table}: {e}")))
    }

    async fn select_user(&self, column: &str, value: &str) -> Result<Option<UserRecord>, StoreError> {
        let mut rows: Vec<UserRecord> = self
            .select(USERS, &[(column, format!("eq.{value}")), ("select", "*".into())])
            .await?;
        if rows.len() > 1 {
            return Err(StoreError::Decode(format!(
                "expected at most one user for {column}, got {}",
                rows.len()
            )));
        }
        Ok(rows.pop())
    }
}

#[async_trait]
impl IdentityStore for SupabaseStore {
    fn name(&self) -> &str {
        "supabase"
    }

    async fn user_id_exists(&self, user_id: &str) -> Result<bool, StoreError> {
        let rows: Vec<serde_json::Value> = self
            .select(
                USERS,
                &[
                    (columns::USER_ID, format!("eq.{user_id}")),
                    ("select", columns::USER_ID.into()),
                    ("limit", "1".into()),
                ],
            )
            .await?;
        Ok(!rows.is_empty())
    }

    async fn insert_user(&self, user: &NewUser) -> Result<(), StoreError> {
        let mut request = self
            .http
            .post(self.table_url(USERS))
            .json(&[user])
            .header("Prefer", "return=minimal");

        for (key, value) in self.auth_headers() {
            request = request.header(key, value);
        }

        let resp = request.send().await?;

        if resp.status().is_success() {
            return Ok(());
        }

        let status = resp.status();
        let body = resp.text().await.unwrap_or_default();
        let parsed: PostgrestError = serde_json::from_str(&body).unwrap_or_default();

        if parsed.code.as_deref() == Some(PG_UNIQUE_VIOLATION) {
            return Err(StoreError::UniqueViolation {
                column: unique_violation_column(&parsed),
            });
        }

        let message = parsed.message.unwrap_or(body);
        Err(StoreError::Request(format!("insert into {USERS} failed ({status}): {message}")))
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<UserRecord>, StoreError> {
        self.select_user(columns::EMAIL, email).await
    }

    async fn find_user_by_id(&self, user_id: &str) -> Result<Option<UserRecord>, StoreError> {
        self.select_user(columns::USER_ID, user_id).await
    }
}

#[async_trait]
impl LedgerStore for SupabaseStore {
    async fn transactions_for_user(
        &self,
        user_id: &str,
    ) -> Result<Vec<TransactionRecord>, StoreError> {
        self.select(
            TRANSACTIONS,
            &[
                (columns::USER_ID, format!("eq.{user_id}")),
                ("select", TRANSACTION_COLUMNS.into()),
            ],
        )
        .await
    }

    async fn redeemed_voucher_codes(&self, user_id: &str) -> Result<Vec<String>, StoreError> {
        #[derive(Deserialize)]
        #[serde(rename_all = "camelCase")]
        struct VoucherRow {
            voucher_code: Option<String>,
        }

        let rows: Vec<VoucherRow> = self
            .select(
                TRANSACTIONS,
                &[
                    (columns::USER_ID, format!("eq.{user_id}")),
                    ("voucherCode", "not.is.null".into()),
                    ("select", "voucherCode".into()),
                ],
            )
            .await?;
        Ok(rows.into_iter().filter_map(|r| r.voucher_code).collect())
    }
}

#[async_trait]
impl RewardStore for SupabaseStore {
    async fn list_rewards(&self) -> Result<Vec<RewardRecord>, StoreError> {
        self.select(REWARDS, &[("select", REWARD_COLUMNS.into())]).await
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, TimeZone, Utc};
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_config(url: &str) -> SupabaseConfig {
        SupabaseConfig {
            url: url.into(),
            api_key: "test-key".into(),
            timeout_secs: 5,
        }
    }

    fn sample_user() -> NewUser {
        let now = Utc.with_ymd_and_hms(2025, 11, 3, 9, 0, 0).unwrap();
        NewUser {
            user_id: "784256".into(),
            firstname: "Ana".into(),
            surname: "Cruz".into(),
            birthday: NaiveDate::from_ymd_opt(1999, 4, 12).unwrap(),
            contact_number: "09171234567".into(),
            email: "ana+promo@example.com".into(),
            secret: "digest".into(),
            referral_code: Some("FRIEND1".into()),
            member_since: now,
            member_until: now,
        }
    }

    #[test]
    fn table_url_construction() {
        let store = SupabaseStore::new(test_config("https://test-project.supabase.co/")).unwrap();
        assert_eq!(
            store.table_url("users"),
            "https://test-project.supabase.co/rest/v1/users"
        );
    }

    #[test]
    fn config_from_lookup_needs_both_vars() {
        let only_url = |key: &str| (key == ENV_URL).then(|| "https://x.supabase.co".to_string());
        assert!(SupabaseConfig::from_lookup(only_url).is_none());

        let both = |key: &str| match key {
            ENV_URL => Some("https://x.supabase.co".to_string()),
            ENV_KEY => Some("anon".to_string()),
            _ => None,
        };
        let config = SupabaseConfig::from_lookup(both).unwrap();
        assert_eq!(config.api_key, "anon");
        assert_eq!(config.timeout_secs, 30);
    }

    #[test]
    fn auth_headers_contain_key() {
        let store = SupabaseStore::new(test_config("https://x.supabase.co")).unwrap();
        let headers = store.auth_headers();
        assert_eq!(headers.len(), 2);
        assert_eq!(headers[0], ("apikey", "test-key".to_string()));
        assert_eq!(headers[1].1, "Bearer test-key");
    }

    #[test]
    fn unique_column_from_details() {
        let err = PostgrestError {
            code: Some("23505".into()),
            message: Some("duplicate key value violates unique constraint".into()),
            details: Some(r#"Key ("userId")=(784256) already exists."#.into()),
        };
        assert_eq!(unique_violation_column(&err), "userId");

        let err = PostgrestError {
            code: Some("23505".into()),
            message: None,
            details: Some("Key (email)=(a@b.c) already exists.".into()),
        };
        assert_eq!(unique_violation_column(&err), "email");
    }

    #[test]
    fn unique_column_from_constraint_name() {
        let err = PostgrestError {
            code: Some("23505".into()),
            message: Some(r#"duplicate key value violates unique constraint "users_email_key""#.into()),
            details: None,
        };
        assert_eq!(unique_violation_column(&err), "email");
    }

    #[tokio::test]
    async fn user_id_exists_queries_by_user_id() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/rest/v1/users"))
            .and(query_param("userId", "eq.784256"))
            .and(header("apikey", "test-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
                {"userId": "784256"}
            ])))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/rest/v1/users"))
            .and(query_param("userId", "eq.100000"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([])))
            .mount(&server)
            .await;

        let store = SupabaseStore::new(test_config(&server.uri())).unwrap();
        assert!(store.user_id_exists("784256").await.unwrap());
        assert!(!store.user_id_exists("100000").await.unwrap());
    }

    #[tokio::test]
    async fn find_user_by_email_encodes_plus_sign() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/rest/v1/users"))
            .and(query_param("email", "eq.ana+promo@example.com"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([{
                "userId": "784256",
                "firstname": "Ana",
                "surname": "Cruz",
                "birthday": "1999-04-12",
                "contactNumber": "09171234567",
                "email": "ana+promo@example.com",
                "secret": "digest",
                "referralCode": null,
                "memberSince": "2025-11-03T09:00:00+00:00",
                "memberUntil": null
            }])))
            .mount(&server)
            .await;

        let store = SupabaseStore::new(test_config(&server.uri())).unwrap();
        let user = store
            .find_user_by_email("ana+promo@example.com")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(user.user_id, "784256");
        assert!(user.member_since.is_some());
        assert!(user.member_until.is_none());
    }

    #[tokio::test]
    async fn insert_user_posts_schema_payload() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/rest/v1/users"))
            .and(header("Prefer", "return=minimal"))
            .respond_with(ResponseTemplate::new(201))
            .mount(&server)
            .await;

        let store = SupabaseStore::new(test_config(&server.uri())).unwrap();
        store.insert_user(&sample_user()).await.unwrap();

        let requests = server.received_requests().await.unwrap();
        assert_eq!(requests.len(), 1);
        let body: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();
        assert_eq!(body[0]["userId"], "784256");
        assert_eq!(body[0]["referralCode"], "FRIEND1");
        assert_eq!(body[0]["birthday"], "1999-04-12");
    }

    #[tokio::test]
    async fn insert_conflict_maps_to_unique_violation() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/rest/v1/users"))
            .respond_with(ResponseTemplate::new(409).set_body_json(serde_json::json!({
                "code": "23505",
                "details": "Key (\"userId\")=(784256) already exists.",
                "hint": null,
                "message": "duplicate key value violates unique constraint \"users_pkey\""
            })))
            .mount(&server)
            .await;

        let store = SupabaseStore::new(test_config(&server.uri())).unwrap();
        let err = store.insert_user(&sample_user()).await.unwrap_err();
        assert!(err.is_unique_violation_on("userId"));
    }

    #[tokio::test]
    async fn insert_failure_carries_store_message() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/rest/v1/users"))
            .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
                "code": "PGRST204",
                "message": "Could not find the 'referralCode' column"
            })))
            .mount(&server)
            .await;

        let store = SupabaseStore::new(test_config(&server.uri())).unwrap();
        match store.insert_user(&sample_user()).await {
            Err(StoreError::Request(msg)) => assert!(msg.contains("referralCode")),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[tokio::test]
    async fn redeemed_voucher_codes_filters_nulls() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/rest/v1/transactions"))
            .and(query_param("voucherCode", "not.is.null"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
                {"voucherCode": "FREECOFFEE"},
                {"voucherCode": null}
            ])))
            .mount(&server)
            .await;

        let store = SupabaseStore::new(test_config(&server.uri())).unwrap();
        let codes = store.redeemed_voucher_codes("784256").await.unwrap();
        assert_eq!(codes, vec!["FREECOFFEE".to_string()]);
    }

    #[tokio::test]
    async fn server_error_surfaces_as_request_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/rest/v1/transactions"))
            .respond_with(ResponseTemplate::new(503).set_body_string("upstream down"))
            .mount(&server)
            .await;

        let store = SupabaseStore::new(test_config(&server.uri())).unwrap();
        match store.transactions_for_user("784256").await {
            Err(StoreError::Request(msg)) => {
                assert!(msg.contains("503"));
                assert!(msg.contains("upstream down"));
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[tokio::test]
    async fn malformed_body_is_decode_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/rest/v1/rewards"))
            .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
            .mount(&server)
            .await;

        let store = SupabaseStore::new(test_config(&server.uri())).unwrap();
        assert!(matches!(
            store.list_rewards().await,
            Err(StoreError::Decode(_))
        ));
    }
}
