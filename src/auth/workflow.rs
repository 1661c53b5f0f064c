//! Sign-up, sign-in and the member profile read model.

use super::hasher::{ensure_secret_format, CredentialHasher, Verification};
use super::id_generator::IdGenerator;
use crate::error::AccountError;
use crate::store::{columns, IdentityStore, NewUser, UserRecord};
use chrono::{DateTime, Months, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Registration form as entered by the member.
#[derive(Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignUpRequest {
    pub firstname: String,
    pub surname: String,
    /// `YYYY-MM-DD`, `MM/DD/YYYY` or an RFC 3339 timestamp.
    pub birthday: String,
    pub contact_number: String,
    pub email: String,
    /// Plaintext secret. Never stored or logged.
    pub secret: String,
    #[serde(default)]
    pub referral_code: Option<String>,
}

impl fmt::Debug for SignUpRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SignUpRequest")
            .field("firstname", &self.firstname)
            .field("surname", &self.surname)
            .field("birthday", &self.birthday)
            .field("contact_number", &self.contact_number)
            .field("email", &"<redacted>")
            .field("secret", &"<redacted>")
            .field("referral_code", &self.referral_code)
            .finish()
    }
}

/// Minimal authenticated-session payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityClaim {
    #[serde(rename = "userId")]
    pub user_id: String,
}

/// Member details for the membership card. Carries no digest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MemberProfile {
    pub user_id: String,
    pub firstname: String,
    pub surname: String,
    pub birthday: Option<NaiveDate>,
    pub contact_number: String,
    pub email: String,
    pub referral_code: Option<String>,
    pub member_since: Option<DateTime<Utc>>,
    pub member_until: Option<DateTime<Utc>>,
}

impl MemberProfile {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.firstname, self.surname).trim().to_string()
    }

    /// Whether `now` falls inside `[member_since, member_until)`.
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        match (self.member_since, self.member_until) {
            (Some(since), Some(until)) => since <= now && now < until,
            _ => false,
        }
    }
}

impl From<UserRecord> for MemberProfile {
    fn from(user: UserRecord) -> Self {
        Self {
            user_id: user.user_id,
            firstname: user.firstname,
            surname: user.surname,
            birthday: user.birthday,
            contact_number: user.contact_number,
            email: user.email,
            referral_code: user.referral_code,
            member_since: user.member_since,
            member_until: user.member_until,
        }
    }
}

/// `[start, start + months)`, keeping the day of month and clamping to the
/// last day of a shorter month (Feb 29 + 12 months is Feb 28).
pub fn membership_window(start: DateTime<Utc>, months: u32) -> (DateTime<Utc>, DateTime<Utc>) {
    let until = start
        .checked_add_months(Months::new(months))
        .unwrap_or(DateTime::<Utc>::MAX_UTC);
    (start, until)
}

/// Parse a birthday in any of the accepted input formats.
pub fn parse_birthday(raw: &str) -> Result<NaiveDate, AccountError> {
    let trimmed = raw.trim();
    ["%Y-%m-%d", "%m/%d/%Y"]
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(trimmed, fmt).ok())
        .or_else(|| {
            DateTime::parse_from_rfc3339(trimmed)
                .ok()
                .map(|ts| ts.with_timezone(&Utc).date_naive())
        })
        .ok_or_else(|| AccountError::InvalidBirthday(raw.to_string()))
}

fn normalize_referral(code: Option<String>) -> Option<String> {
    code.map(|c| c.trim().to_string()).filter(|c| !c.is_empty())
}

/// Account creation and authentication against an [`IdentityStore`].
pub struct AccountService {
    store: Arc<dyn IdentityStore>,
    hasher: Arc<CredentialHasher>,
    ids: IdGenerator,
    membership_months: u32,
}

impl AccountService {
    pub fn new(
        store: Arc<dyn IdentityStore>,
        hasher: Arc<CredentialHasher>,
        ids: IdGenerator,
        membership_months: u32,
    ) -> Self {
        Self {
            store,
            hasher,
            ids,
            membership_months,
        }
    }

    /// Run a hasher call on the blocking pool; Argon2id is CPU and memory
    /// bound and must not hold a runtime worker.
    async fn with_hasher<T, F>(&self, f: F) -> Result<T, AccountError>
    where
        F: FnOnce(&CredentialHasher) -> T + Send + 'static,
        T: Send + 'static,
    {
        let hasher = Arc::clone(&self.hasher);
        tokio::task::spawn_blocking(move || f(&hasher))
            .await
            .map_err(|e| AccountError::Internal(format!("credential hashing task failed: {e}")))
    }

    /// Register a member and return the issued identifier.
    pub async fn sign_up(&self, request: SignUpRequest) -> Result<String, AccountError> {
        self.sign_up_at(request, Utc::now()).await
    }

    /// [`sign_up`](Self::sign_up) with an explicit clock reading for the
    /// membership window.
    pub async fn sign_up_at(
        &self,
        request: SignUpRequest,
        now: DateTime<Utc>,
    ) -> Result<String, AccountError> {
        ensure_secret_format(&request.secret)?;
        let birthday = parse_birthday(&request.birthday)?;
        let secret = request.secret.clone();
        let digest = self.with_hasher(move |h| h.hash(&secret)).await??;
        let (member_since, member_until) = membership_window(now, self.membership_months);

        let SignUpRequest {
            firstname,
            surname,
            contact_number,
            email,
            referral_code,
            ..
        } = request;

        let mut user = NewUser {
            user_id: String::new(),
            firstname,
            surname,
            birthday,
            contact_number,
            email,
            secret: digest,
            referral_code: normalize_referral(referral_code),
            member_since,
            member_until,
        };

        let mut attempts = self.ids.attempts();
        loop {
            user.user_id = self.ids.next_free(self.store.as_ref(), &mut attempts).await?;

            match self.store.insert_user(&user).await {
                Ok(()) => {
                    tracing::info!(user_id = %user.user_id, "Member registered");
                    return Ok(user.user_id);
                }
                Err(e) if e.is_unique_violation_on(columns::USER_ID) => {
                    tracing::debug!(
                        user_id = %user.user_id,
                        attempt = attempts.used(),
                        "Member id taken between check and insert, regenerating"
                    );
                }
                Err(e) if e.is_unique_violation_on(columns::EMAIL) => {
                    tracing::warn!("Sign-up rejected: email already registered");
                    return Err(AccountError::EmailAlreadyRegistered);
                }
                Err(e) => {
                    tracing::warn!(store = self.store.name(), "Sign-up insert failed: {e}");
                    return Err(e.into());
                }
            }
        }
    }

    /// Authenticate by email and secret.
    pub async fn sign_in(&self, email: &str, secret: &str) -> Result<IdentityClaim, AccountError> {
        if email.trim().is_empty() || secret.trim().is_empty() {
            return Err(AccountError::MissingCredentials);
        }

        let Some(user) = self.store.find_user_by_email(email).await? else {
            let secret = secret.to_string();
            self.with_hasher(move |h| h.burn(&secret)).await?;
            tracing::warn!("Sign-in failed: unknown account");
            return Err(AccountError::AccountNotFound);
        };

        let attempt = secret.to_string();
        let digest = user.secret.clone();
        match self.with_hasher(move |h| h.verify(&attempt, &digest)).await? {
            Verification::Match => {}
            Verification::LegacyMatch => {
                tracing::warn!(user_id = %user.user_id, "Member still has a legacy SHA-256 digest");
            }
            Verification::Mismatch => {
                tracing::warn!(user_id = %user.user_id, "Sign-in failed: incorrect password");
                return Err(AccountError::IncorrectPassword);
            }
        }

        tracing::info!(user_id = %user.user_id, "Member signed in");
        Ok(IdentityClaim {
            user_id: user.user_id,
        })
    }

    /// Read-only member details for the membership card.
    pub async fn profile(&self, user_id: &str) -> Result<MemberProfile, AccountError> {
        self.store
            .find_user_by_id(user_id)
            .await?
            .map(MemberProfile::from)
            .ok_or(AccountError::AccountNotFound)
    }
}
