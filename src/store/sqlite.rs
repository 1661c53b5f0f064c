//! SQLite-backed store mirroring the hosted schema.
//!
//! Tables:
//! - `users`: "userId" (primary key), email (unique), digest, membership window
//! - `transactions`: ledger rows, foreign key to users
//! - `rewards`: reward catalog keyed by "voucherCode"
//!
//! Used for local development and as the constraint-enforcing store in
//! tests. The `UNIQUE` constraints here are the authority on identifier
//! races, the same role the hosted database plays in production.

use super::records::{parse_timestamp, NewUser, RewardRecord, TransactionRecord, UserRecord};
use super::{columns, IdentityStore, LedgerStore, RewardStore, StoreError};
use anyhow::Result;
use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS users (
    "userId" TEXT PRIMARY KEY,
    firstname TEXT NOT NULL,
    surname TEXT NOT NULL,
    birthday TEXT,
    "contactNumber" TEXT NOT NULL,
    email TEXT NOT NULL UNIQUE,
    secret TEXT NOT NULL,
    "referralCode" TEXT,
    "memberSince" TEXT,
    "memberUntil" TEXT
);

CREATE TABLE IF NOT EXISTS transactions (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    "userId" TEXT NOT NULL REFERENCES users("userId") ON DELETE CASCADE,
    description TEXT NOT NULL DEFAULT '',
    points TEXT NOT NULL,
    "transactionType" TEXT NOT NULL,
    "voucherCode" TEXT,
    created_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_transactions_user ON transactions("userId");

CREATE TABLE IF NOT EXISTS rewards (
    "voucherCode" TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    description TEXT NOT NULL DEFAULT '',
    "neededPoints" INTEGER NOT NULL DEFAULT 0,
    image TEXT,
    unused INTEGER NOT NULL DEFAULT 0,
    used INTEGER NOT NULL DEFAULT 0,
    "perCustomer" INTEGER NOT NULL DEFAULT 0
);
"#;

const USER_COLUMNS: &str = r#""userId", firstname, surname, birthday, "contactNumber", email,
    secret, "referralCode", "memberSince", "memberUntil""#;

/// SQLite-backed store.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open (or create) the database at the given path.
    pub fn open(db_path: &Path) -> Result<Self> {
        let conn = Connection::open(db_path)?;

        // WAL mode for concurrent reads + crash safety
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             PRAGMA foreign_keys = ON;",
        )?;
        Self::init(conn)
    }

    /// Fresh private in-memory database.
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        Self::init(conn)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    // ── Seeding (external processes own these writes in production) ──

    /// Append a ledger row. Returns the new row id.
    pub fn record_transaction(&self, tx: &TransactionRecord) -> Result<i64, StoreError> {
        let created_at = tx.created_at.unwrap_or_else(Utc::now).to_rfc3339();
        let conn = self.conn.lock();
        conn.execute(
            r#"INSERT INTO transactions ("userId", description, points, "transactionType",
                                         "voucherCode", created_at)
               VALUES (?1, ?2, ?3, ?4, ?5, ?6)"#,
            params![
                tx.user_id,
                tx.description,
                tx.points,
                tx.transaction_type,
                tx.voucher_code,
                created_at,
            ],
        )
        .map_err(map_sqlite_error)?;
        Ok(conn.last_insert_rowid())
    }

    /// Insert or replace a reward.
    pub fn put_reward(&self, reward: &RewardRecord) -> Result<(), StoreError> {
        let conn = self.conn.lock();
        conn.execute(
            r#"INSERT INTO rewards ("voucherCode", name, description, "neededPoints", image,
                                    unused, used, "perCustomer")
               VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
               ON CONFLICT("voucherCode") DO UPDATE SET
                   name = excluded.name,
                   description = excluded.description,
                   "neededPoints" = excluded."neededPoints",
                   image = excluded.image,
                   unused = excluded.unused,
                   used = excluded.used,
                   "perCustomer" = excluded."perCustomer""#,
            params![
                reward.voucher_code,
                reward.name,
                reward.description,
                reward.needed_points,
                reward.image,
                reward.unused,
                reward.used,
                reward.per_customer,
            ],
        )
        .map_err(map_sqlite_error)?;
        Ok(())
    }

    /// Count registered users.
    pub fn user_count(&self) -> Result<u64, StoreError> {
        let conn = self.conn.lock();
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM users", [], |row| row.get(0))
            .map_err(map_sqlite_error)?;
        Ok(count as u64)
    }

    fn select_user(&self, column: &str, value: &str) -> Result<Option<UserRecord>, StoreError> {
        let sql = format!(r#"SELECT {USER_COLUMNS} FROM users WHERE "{column}" = ?1"#);
        let conn = self.conn.lock();
        conn.query_row(&sql, params![value], |row| {
            let birthday: Option<String> = row.get(3)?;
            let member_since: Option<String> = row.get(8)?;
            let member_until: Option<String> = row.get(9)?;
            Ok(UserRecord {
                user_id: row.get(0)?,
                firstname: row.get(1)?,
                surname: row.get(2)?,
                birthday: birthday.and_then(|b| NaiveDate::parse_from_str(&b, "%Y-%m-%d").ok()),
                contact_number: row.get(4)?,
                email: row.get(5)?,
                secret: row.get(6)?,
                referral_code: row.get(7)?,
                member_since: member_since.as_deref().and_then(parse_timestamp),
                member_until: member_until.as_deref().and_then(parse_timestamp),
            })
        })
        .optional()
        .map_err(map_sqlite_error)
    }
}

/// Map rusqlite failures, naming the column of a violated `UNIQUE` /
/// primary-key constraint ("UNIQUE constraint failed: users.email").
fn map_sqlite_error(err: rusqlite::Error) -> StoreError {
    if let rusqlite::Error::SqliteFailure(code, Some(message)) = &err {
        if code.code == rusqlite::ErrorCode::ConstraintViolation && message.contains("UNIQUE") {
            let column = message
                .rsplit('.')
                .next()
                .unwrap_or("unknown")
                .trim()
                .trim_matches('"')
                .to_string();
            return StoreError::UniqueViolation { column };
        }
    }
    StoreError::Database(err.to_string())
}

#[async_trait]
impl IdentityStore for SqliteStore {
    fn name(&self) -> &str {
        "sqlite"
    }

    async fn user_id_exists(&self, user_id: &str) -> Result<bool, StoreError> {
        let conn = self.conn.lock();
        let found: Option<i64> = conn
            .query_row(
                r#"SELECT 1 FROM users WHERE "userId" = ?1"#,
                params![user_id],
                |row| row.get(0),
            )
            .optional()
            .map_err(map_sqlite_error)?;
        Ok(found.is_some())
    }

    async fn insert_user(&self, user: &NewUser) -> Result<(), StoreError> {
        let conn = self.conn.lock();
        conn.execute(
            &format!(
                "INSERT INTO users ({USER_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)"
            ),
            params![
                user.user_id,
                user.firstname,
                user.surname,
                user.birthday.format("%Y-%m-%d").to_string(),
                user.contact_number,
                user.email,
                user.secret,
                user.referral_code,
                user.member_since.to_rfc3339(),
                user.member_until.to_rfc3339(),
            ],
        )
        .map_err(map_sqlite_error)?;
        Ok(())
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<UserRecord>, StoreError> {
        self.select_user(columns::EMAIL, email)
    }

    async fn find_user_by_id(&self, user_id: &str) -> Result<Option<UserRecord>, StoreError> {
        self.select_user(columns::USER_ID, user_id)
    }
}

#[async_trait]
impl LedgerStore for SqliteStore {
    async fn transactions_for_user(
        &self,
        user_id: &str,
    ) -> Result<Vec<TransactionRecord>, StoreError> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare(
                r#"SELECT id, "userId", description, points, "transactionType", "voucherCode",
                          created_at
                   FROM transactions WHERE "userId" = ?1 ORDER BY id"#,
            )
            .map_err(map_sqlite_error)?;
        let rows = stmt
            .query_map(params![user_id], |row| {
                let id: i64 = row.get(0)?;
                let created_at: String = row.get(6)?;
                Ok(TransactionRecord {
                    id: Some(id.to_string()),
                    user_id: row.get(1)?,
                    description: row.get(2)?,
                    points: row.get(3)?,
                    transaction_type: row.get(4)?,
                    voucher_code: row.get(5)?,
                    created_at: parse_timestamp(&created_at),
                })
            })
            .map_err(map_sqlite_error)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(map_sqlite_error)?;
        Ok(rows)
    }

    async fn redeemed_voucher_codes(&self, user_id: &str) -> Result<Vec<String>, StoreError> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare(
                r#"SELECT "voucherCode" FROM transactions
                   WHERE "userId" = ?1 AND "voucherCode" IS NOT NULL"#,
            )
            .map_err(map_sqlite_error)?;
        let codes = stmt
            .query_map(params![user_id], |row| row.get(0))
            .map_err(map_sqlite_error)?
            .collect::<Result<Vec<String>, _>>()
            .map_err(map_sqlite_error)?;
        Ok(codes)
    }
}

#[async_trait]
impl RewardStore for SqliteStore {
    async fn list_rewards(&self) -> Result<Vec<RewardRecord>, StoreError> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare(
                r#"SELECT "voucherCode", name, description, "neededPoints", image, unused, used,
                          "perCustomer"
                   FROM rewards ORDER BY "neededPoints", name"#,
            )
            .map_err(map_sqlite_error)?;
        let rewards = stmt
            .query_map([], |row| {
                Ok(RewardRecord {
                    voucher_code: row.get(0)?,
                    name: row.get(1)?,
                    description: row.get(2)?,
                    needed_points: row.get(3)?,
                    image: row.get(4)?,
                    unused: row.get(5)?,
                    used: row.get(6)?,
                    per_customer: row.get(7)?,
                })
            })
            .map_err(map_sqlite_error)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(map_sqlite_error)?;
        Ok(rewards)
    }
}

// ── Tests ───────────────────────────────────────────────────────────
