//! Row types for the `users`, `transactions` and `rewards` tables.
//!
//! Field names follow the hosted schema (camelCase, except the
//! `created_at` timestamp column). Read paths are lenient: numeric columns
//! may arrive as JSON numbers or as text, and missing optional columns fall
//! back to their defaults.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

// ── Users ───────────────────────────────────────────────────────

/// Insert payload for a new member.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewUser {
    pub user_id: String,
    pub firstname: String,
    pub surname: String,
    pub birthday: NaiveDate,
    pub contact_number: String,
    pub email: String,
    /// Credential digest (never the plaintext).
    pub secret: String,
    pub referral_code: Option<String>,
    pub member_since: DateTime<Utc>,
    pub member_until: DateTime<Utc>,
}

/// A user row as read back from the store.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserRecord {
    pub user_id: String,
    #[serde(default)]
    pub firstname: String,
    #[serde(default)]
    pub surname: String,
    #[serde(default)]
    pub birthday: Option<NaiveDate>,
    #[serde(default)]
    pub contact_number: String,
    pub email: String,
    pub secret: String,
    #[serde(default)]
    pub referral_code: Option<String>,
    /// Rows written before the membership window existed have no value here.
    #[serde(default, deserialize_with = "de_opt_timestamp")]
    pub member_since: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "de_opt_timestamp")]
    pub member_until: Option<DateTime<Utc>>,
}

impl From<NewUser> for UserRecord {
    fn from(user: NewUser) -> Self {
        Self {
            user_id: user.user_id,
            firstname: user.firstname,
            surname: user.surname,
            birthday: Some(user.birthday),
            contact_number: user.contact_number,
            email: user.email,
            secret: user.secret,
            referral_code: user.referral_code,
            member_since: Some(user.member_since),
            member_until: Some(user.member_until),
        }
    }
}

// ── Transactions ────────────────────────────────────────────────

/// Kind tag of a ledger transaction.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TransactionKind {
    Earn,
    Redeem,
    /// Any other tag; tolerated on read, ignored by the balance.
    Other(String),
}

impl TransactionKind {
    /// Exact, case-sensitive match on the stored tag.
    pub fn parse(tag: &str) -> Self {
        match tag {
            "earn" => Self::Earn,
            "redeem" => Self::Redeem,
            other => Self::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Earn => "earn",
            Self::Redeem => "redeem",
            Self::Other(tag) => tag,
        }
    }
}

impl std::fmt::Display for TransactionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A transaction row. Created by point-of-sale and redemption flows,
/// read-only here.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionRecord {
    #[serde(default, deserialize_with = "de_opt_text")]
    pub id: Option<String>,
    pub user_id: String,
    #[serde(default, deserialize_with = "de_text")]
    pub description: String,
    /// Magnitude as stored; may be malformed.
    #[serde(default, deserialize_with = "de_text")]
    pub points: String,
    #[serde(default, deserialize_with = "de_text")]
    pub transaction_type: String,
    #[serde(default, deserialize_with = "de_opt_text")]
    pub voucher_code: Option<String>,
    #[serde(rename = "created_at", default, deserialize_with = "de_opt_timestamp")]
    pub created_at: Option<DateTime<Utc>>,
}

impl TransactionRecord {
    /// Minimal record with only owner, kind and magnitude set.
    pub fn new(user_id: &str, transaction_type: &str, points: &str) -> Self {
        Self {
            id: None,
            user_id: user_id.to_string(),
            description: String::new(),
            points: points.to_string(),
            transaction_type: transaction_type.to_string(),
            voucher_code: None,
            created_at: None,
        }
    }

    pub fn kind(&self) -> TransactionKind {
        TransactionKind::parse(&self.transaction_type)
    }
}

// ── Rewards ─────────────────────────────────────────────────────

/// A reward in the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RewardRecord {
    pub voucher_code: String,
    pub name: String,
    #[serde(default, deserialize_with = "de_text")]
    pub description: String,
    #[serde(default, deserialize_with = "de_lenient_i64")]
    pub needed_points: i64,
    #[serde(default, deserialize_with = "de_opt_text")]
    pub image: Option<String>,
    #[serde(default, deserialize_with = "de_lenient_i64")]
    pub unused: i64,
    #[serde(default, deserialize_with = "de_lenient_i64")]
    pub used: i64,
    /// At most one redemption per member.
    #[serde(default)]
    pub per_customer: bool,
}

// ── Lenient decoders ────────────────────────────────────────────

fn value_to_text(value: Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s),
        other => Some(other.to_string()),
    }
}

fn de_text<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.and_then(value_to_text).unwrap_or_default())
}

fn de_opt_text<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.and_then(value_to_text))
}

fn de_lenient_i64<'de, D: Deserializer<'de>>(deserializer: D) -> Result<i64, D::Error> {
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::Number(n)) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.is_finite()).map(|f| f.trunc() as i64))
            .unwrap_or(0),
        Some(Value::String(s)) => s.trim().parse().unwrap_or(0),
        Some(Value::Bool(b)) => i64::from(b),
        _ => 0,
    })
}

/// Accepts RFC 3339 (`timestamptz`) or a naive timestamp taken as UTC.
pub(crate) fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .map(|naive| naive.and_utc())
}

fn de_opt_timestamp<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<DateTime<Utc>>, D::Error> {
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::String(s)) => parse_timestamp(&s),
        _ => None,
    })
}
