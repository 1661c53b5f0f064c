//! Point-balance ledger.
//!
//! The balance is never stored; it is recomputed from the member's
//! transactions on every read. `earn` rows add their magnitude, `redeem`
//! rows subtract it, any other kind is ignored. Malformed magnitudes count
//! as zero rather than failing the whole balance.

use crate::error::AccountError;
use crate::store::records::{TransactionKind, TransactionRecord};
use crate::store::LedgerStore;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;

/// Parse a stored magnitude: an integer, or a finite decimal with no
/// fractional part (`"100.0"`, `"1e3"`). Anything else, fractional
/// amounts included, is 0.
pub fn parse_points(raw: &str) -> i64 {
    let trimmed = raw.trim();
    if let Ok(n) = trimmed.parse::<i64>() {
        return n;
    }
    match trimmed.parse::<f64>() {
        // `as` saturates at the i64 bounds.
        Ok(f) if f.is_finite() && f.fract() == 0.0 => f as i64,
        _ => 0,
    }
}

/// Signed amount a record contributes to the balance.
pub fn contribution(record: &TransactionRecord) -> i64 {
    let points = parse_points(&record.points);
    match record.kind() {
        TransactionKind::Earn => points,
        TransactionKind::Redeem => points.saturating_neg(),
        TransactionKind::Other(_) => 0,
    }
}

/// Net balance of a set of records. Order-independent; no floor.
pub fn reduce_balance<'a, I>(records: I) -> i64
where
    I: IntoIterator<Item = &'a TransactionRecord>,
{
    records
        .into_iter()
        .fold(0i64, |total, record| total.saturating_add(contribution(record)))
}

/// One row of the transaction history screen.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerEntry {
    pub id: Option<String>,
    pub description: String,
    pub kind: String,
    /// Signed contribution to the balance.
    pub delta: i64,
    pub voucher_code: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
}

impl From<&TransactionRecord> for LedgerEntry {
    fn from(record: &TransactionRecord) -> Self {
        Self {
            id: record.id.clone(),
            description: record.description.clone(),
            kind: record.transaction_type.clone(),
            delta: contribution(record),
            voucher_code: record.voucher_code.clone(),
            created_at: record.created_at,
        }
    }
}

/// Balance and history reads over a [`LedgerStore`].
pub struct LedgerService {
    store: Arc<dyn LedgerStore>,
    empty_ledger_is_zero: bool,
}

impl LedgerService {
    pub fn new(store: Arc<dyn LedgerStore>, empty_ledger_is_zero: bool) -> Self {
        Self {
            store,
            empty_ledger_is_zero,
        }
    }

    /// Net point balance of a member.
    ///
    /// A member with no transactions at all fails with
    /// [`AccountError::NoTransactionsFound`] unless the ledger is configured
    /// to report 0.
    pub async fn compute_balance(&self, user_id: &str) -> Result<i64, AccountError> {
        let records = self.store.transactions_for_user(user_id).await?;
        if records.is_empty() {
            if self.empty_ledger_is_zero {
                return Ok(0);
            }
            return Err(AccountError::NoTransactionsFound);
        }

        let balance = reduce_balance(&records);
        tracing::debug!(user_id, records = records.len(), balance, "Balance computed");
        Ok(balance)
    }

    /// Transactions newest first. Records without a timestamp sort last;
    /// ties keep store order.
    pub async fn history(&self, user_id: &str) -> Result<Vec<LedgerEntry>, AccountError> {
        let records = self.store.transactions_for_user(user_id).await?;
        let mut entries: Vec<LedgerEntry> = records.iter().map(LedgerEntry::from).collect();
        entries.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(entries)
    }
}
