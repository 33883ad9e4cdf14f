//! SQLite persistence for users, the address pool, transactions and subscriptions.
//!
//! All timestamps are UTC, stored as `YYYY-MM-DD HH:MM:SS` text so that string
//! comparison in SQL orders them correctly. Time-dependent queries take `now`
//! from the caller instead of reading the database clock.

mod stats;

pub use stats::{
    DailySignups, ExpiredTransaction, HourlyActivity, PlanBreakdown, PlanSales, Profits,
    UnpaidUser, UserOverview,
};

use chrono::{DateTime, NaiveDateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use crate::application::errors::StorageError;
use crate::domain::entities::{
    BotUser, PlanType, Subscription, SubscriptionStatus, Transaction, TransactionStatus,
};

const TS_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Addresses inserted per SQL transaction when seeding the pool
const ADDRESS_BATCH_SIZE: usize = 1000;

const TX_COLUMNS: &str = "id, user_id, plan_type, btc_address, btc_amount, usd_amount, \
     btc_rate, status, created_at, expires_at, confirmed_at";

const SUB_COLUMNS: &str =
    "id, user_id, plan_type, transaction_id, status, created_at, starts_at, expires_at";

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS users (
        user_id INTEGER PRIMARY KEY,
        username TEXT,
        first_name TEXT NOT NULL,
        created_at TEXT NOT NULL,
        last_activity TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS btc_addresses (
        address TEXT PRIMARY KEY,
        is_used INTEGER NOT NULL DEFAULT 0,
        assigned_to INTEGER,
        assigned_at TEXT,
        created_at TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS transactions (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        user_id INTEGER NOT NULL REFERENCES users(user_id),
        plan_type TEXT NOT NULL,
        btc_address TEXT NOT NULL,
        btc_amount REAL NOT NULL,
        usd_amount REAL NOT NULL,
        btc_rate REAL NOT NULL,
        status TEXT NOT NULL DEFAULT 'pending',
        created_at TEXT NOT NULL,
        expires_at TEXT NOT NULL,
        confirmed_at TEXT,
        updated_at TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS subscriptions (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        user_id INTEGER NOT NULL REFERENCES users(user_id),
        plan_type TEXT NOT NULL,
        transaction_id INTEGER NOT NULL REFERENCES transactions(id),
        status TEXT NOT NULL DEFAULT 'active',
        created_at TEXT NOT NULL,
        starts_at TEXT NOT NULL,
        expires_at TEXT,
        updated_at TEXT NOT NULL
    );

    CREATE INDEX IF NOT EXISTS idx_transactions_user_id ON transactions(user_id);
    CREATE INDEX IF NOT EXISTS idx_transactions_status ON transactions(status);
    CREATE INDEX IF NOT EXISTS idx_transactions_address ON transactions(btc_address);
    CREATE INDEX IF NOT EXISTS idx_subscriptions_user_id ON subscriptions(user_id);
    CREATE INDEX IF NOT EXISTS idx_subscriptions_status ON subscriptions(status);
    CREATE INDEX IF NOT EXISTS idx_btc_addresses_used ON btc_addresses(is_used);
";

/// Values for a payment about to be quoted
#[derive(Debug, Clone)]
pub struct NewPayment {
    pub user_id: i64,
    pub plan_type: PlanType,
    pub btc_amount: f64,
    pub usd_amount: f64,
    pub btc_rate: f64,
    pub expires_at: DateTime<Utc>,
}

/// Result of trying to reserve an address for a new payment
#[derive(Debug, Clone, PartialEq)]
pub enum Reservation {
    Created(Transaction),
    /// The user still has a pending transaction
    HasPending,
    /// The address pool is exhausted
    NoAddress,
}

pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let conn = Connection::open(path)?;
        Self::with_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self, StorageError> {
        let conn = Connection::open_in_memory()?;
        Self::with_connection(conn)
    }

    fn with_connection(conn: Connection) -> Result<Self, StorageError> {
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        let db = Self {
            conn: Mutex::new(conn),
        };
        db.create_tables()?;
        Ok(db)
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, StorageError> {
        self.conn.lock().map_err(|_| StorageError::Poisoned)
    }

    pub fn create_tables(&self) -> Result<(), StorageError> {
        self.conn()?.execute_batch(SCHEMA)?;
        Ok(())
    }

    pub fn health_check(&self) -> bool {
        let result = self
            .conn()
            .and_then(|c| Ok(c.query_row("SELECT 1", [], |row| row.get::<_, i64>(0))?));
        match result {
            Ok(1) => true,
            Ok(_) => false,
            Err(e) => {
                tracing::error!("Database health check failed: {}", e);
                false
            }
        }
    }

    // Address pool

    /// Insert addresses that are not yet known. Returns how many were new.
    pub fn load_addresses(&self, addresses: &[String], now: DateTime<Utc>) -> Result<usize, StorageError> {
        if addresses.is_empty() {
            return Ok(0);
        }

        let mut conn = self.conn()?;
        let created_at = to_db_time(now);
        let batches = (addresses.len() + ADDRESS_BATCH_SIZE - 1) / ADDRESS_BATCH_SIZE;
        let mut inserted = 0;

        for (i, batch) in addresses.chunks(ADDRESS_BATCH_SIZE).enumerate() {
            let tx = conn.transaction()?;
            {
                let mut stmt = tx.prepare(
                    "INSERT OR IGNORE INTO btc_addresses (address, created_at) VALUES (?1, ?2)",
                )?;
                for address in batch {
                    inserted += stmt.execute(params![address, created_at])?;
                }
            }
            tx.commit()?;
            tracing::info!("Processed address batch {}/{}", i + 1, batches);
        }

        Ok(inserted)
    }

    pub fn release_address(&self, address: &str) -> Result<(), StorageError> {
        self.conn()?.execute(
            "UPDATE btc_addresses SET is_used = 0, assigned_to = NULL, assigned_at = NULL
             WHERE address = ?1",
            [address],
        )?;
        Ok(())
    }

    pub fn available_address_count(&self) -> Result<i64, StorageError> {
        let count = self.conn()?.query_row(
            "SELECT COUNT(*) FROM btc_addresses WHERE is_used = 0",
            [],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    /// Atomically check the user has nothing pending, take a random free
    /// address and record the pending transaction against it.
    pub fn reserve_payment(&self, payment: &NewPayment, now: DateTime<Utc>) -> Result<Reservation, StorageError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;

        let pending: Option<i64> = tx
            .query_row(
                "SELECT id FROM transactions WHERE user_id = ?1 AND status = 'pending' LIMIT 1",
                [payment.user_id],
                |row| row.get(0),
            )
            .optional()?;
        if pending.is_some() {
            return Ok(Reservation::HasPending);
        }

        let address: Option<String> = tx
            .query_row(
                "SELECT address FROM btc_addresses WHERE is_used = 0 ORDER BY RANDOM() LIMIT 1",
                [],
                |row| row.get(0),
            )
            .optional()?;
        let Some(address) = address else {
            return Ok(Reservation::NoAddress);
        };

        let now_s = to_db_time(now);
        tx.execute(
            "UPDATE btc_addresses SET is_used = 1, assigned_to = ?1, assigned_at = ?2
             WHERE address = ?3 AND is_used = 0",
            params![payment.user_id, now_s, address],
        )?;
        tx.execute(
            "INSERT INTO transactions (user_id, plan_type, btc_address, btc_amount, usd_amount,
                                       btc_rate, created_at, expires_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?7)",
            params![
                payment.user_id,
                payment.plan_type.as_str(),
                address,
                payment.btc_amount,
                payment.usd_amount,
                payment.btc_rate,
                now_s,
                to_db_time(payment.expires_at),
            ],
        )?;
        let id = tx.last_insert_rowid();
        let created = tx.query_row(
            &format!("SELECT {} FROM transactions WHERE id = ?1", TX_COLUMNS),
            [id],
            transaction_from_row,
        )?;
        tx.commit()?;

        Ok(Reservation::Created(created))
    }

    // Users

    pub fn upsert_user(
        &self,
        user_id: i64,
        username: Option<&str>,
        first_name: &str,
        now: DateTime<Utc>,
    ) -> Result<(), StorageError> {
        self.conn()?.execute(
            "INSERT INTO users (user_id, username, first_name, created_at, last_activity)
             VALUES (?1, ?2, ?3, ?4, ?4)
             ON CONFLICT(user_id) DO UPDATE SET
                 username = excluded.username,
                 first_name = excluded.first_name,
                 last_activity = excluded.last_activity",
            params![user_id, username, first_name, to_db_time(now)],
        )?;
        Ok(())
    }

    pub fn get_user(&self, user_id: i64) -> Result<Option<BotUser>, StorageError> {
        let user = self
            .conn()?
            .query_row(
                "SELECT user_id, username, first_name, created_at, last_activity
                 FROM users WHERE user_id = ?1",
                [user_id],
                |row| {
                    Ok(BotUser {
                        user_id: row.get(0)?,
                        username: row.get(1)?,
                        first_name: row.get(2)?,
                        created_at: time_col(row, 3)?,
                        last_activity: time_col(row, 4)?,
                    })
                },
            )
            .optional()?;
        Ok(user)
    }

    // Transactions

    pub fn get_transaction(&self, id: i64) -> Result<Option<Transaction>, StorageError> {
        let tx = self
            .conn()?
            .query_row(
                &format!("SELECT {} FROM transactions WHERE id = ?1", TX_COLUMNS),
                [id],
                transaction_from_row,
            )
            .optional()?;
        Ok(tx)
    }

    /// All transactions of a user, newest first
    pub fn user_transactions(&self, user_id: i64) -> Result<Vec<Transaction>, StorageError> {
        self.query_transactions(
            &format!(
                "SELECT {} FROM transactions WHERE user_id = ?1 ORDER BY created_at DESC, id DESC",
                TX_COLUMNS
            ),
            params![user_id],
        )
    }

    /// Every pending transaction, oldest first
    pub fn pending_transactions(&self) -> Result<Vec<Transaction>, StorageError> {
        self.query_transactions(
            &format!(
                "SELECT {} FROM transactions WHERE status = 'pending' ORDER BY created_at ASC, id ASC",
                TX_COLUMNS
            ),
            [],
        )
    }

    pub fn pending_transaction_for(&self, user_id: i64) -> Result<Option<Transaction>, StorageError> {
        let tx = self
            .conn()?
            .query_row(
                &format!(
                    "SELECT {} FROM transactions WHERE user_id = ?1 AND status = 'pending'
                     ORDER BY created_at DESC, id DESC LIMIT 1",
                    TX_COLUMNS
                ),
                [user_id],
                transaction_from_row,
            )
            .optional()?;
        Ok(tx)
    }

    /// Pending transactions whose payment window has closed
    pub fn expired_pending(&self, now: DateTime<Utc>) -> Result<Vec<Transaction>, StorageError> {
        self.query_transactions(
            &format!(
                "SELECT {} FROM transactions WHERE status = 'pending' AND expires_at <= ?1
                 ORDER BY expires_at ASC",
                TX_COLUMNS
            ),
            params![to_db_time(now)],
        )
    }

    /// Move a pending transaction to `status`. Returns false when it was not pending.
    pub fn finish_pending(
        &self,
        id: i64,
        status: TransactionStatus,
        now: DateTime<Utc>,
    ) -> Result<bool, StorageError> {
        let changed = self.conn()?.execute(
            "UPDATE transactions SET status = ?1, updated_at = ?2
             WHERE id = ?3 AND status = 'pending'",
            params![status.as_str(), to_db_time(now), id],
        )?;
        Ok(changed > 0)
    }

    /// Confirm a pending transaction and open its subscription in one step.
    /// Returns `None` when the transaction was no longer pending.
    pub fn confirm_transaction(
        &self,
        id: i64,
        subscription_expires_at: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Result<Option<Subscription>, StorageError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let now_s = to_db_time(now);

        let changed = tx.execute(
            "UPDATE transactions SET status = 'confirmed', confirmed_at = ?1, updated_at = ?1
             WHERE id = ?2 AND status = 'pending'",
            params![now_s, id],
        )?;
        if changed == 0 {
            return Ok(None);
        }

        tx.execute(
            "INSERT INTO subscriptions (user_id, plan_type, transaction_id, created_at, starts_at,
                                        expires_at, updated_at)
             SELECT user_id, plan_type, id, ?1, ?1, ?2, ?1 FROM transactions WHERE id = ?3",
            params![now_s, subscription_expires_at.map(to_db_time), id],
        )?;
        let sub_id = tx.last_insert_rowid();
        let subscription = tx.query_row(
            &format!("SELECT {} FROM subscriptions WHERE id = ?1", SUB_COLUMNS),
            [sub_id],
            subscription_from_row,
        )?;
        tx.commit()?;

        Ok(Some(subscription))
    }

    // Subscriptions

    /// Latest active subscription that has not run out at `now`
    pub fn active_subscription(&self, user_id: i64, now: DateTime<Utc>) -> Result<Option<Subscription>, StorageError> {
        let sub = self
            .conn()?
            .query_row(
                &format!(
                    "SELECT {} FROM subscriptions
                     WHERE user_id = ?1 AND status = 'active'
                       AND (expires_at IS NULL OR expires_at > ?2)
                     ORDER BY created_at DESC, id DESC LIMIT 1",
                    SUB_COLUMNS
                ),
                params![user_id, to_db_time(now)],
                subscription_from_row,
            )
            .optional()?;
        Ok(sub)
    }

    pub fn expire_subscriptions(&self, now: DateTime<Utc>) -> Result<usize, StorageError> {
        let now_s = to_db_time(now);
        let changed = self.conn()?.execute(
            "UPDATE subscriptions SET status = 'expired', updated_at = ?1
             WHERE status = 'active' AND expires_at IS NOT NULL AND expires_at < ?1",
            params![now_s],
        )?;
        Ok(changed)
    }

    fn query_transactions<P: rusqlite::Params>(&self, sql: &str, params: P) -> Result<Vec<Transaction>, StorageError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(sql)?;
        let rows = stmt.query_map(params, transaction_from_row)?;

        let mut transactions = Vec::new();
        for tx in rows {
            transactions.push(tx?);
        }
        Ok(transactions)
    }
}

pub fn to_db_time(t: DateTime<Utc>) -> String {
    t.format(TS_FORMAT).to_string()
}

pub fn parse_db_time(s: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    NaiveDateTime::parse_from_str(s, TS_FORMAT).map(|n| n.and_utc())
}

fn time_col(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    parse_db_time(&raw).map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn opt_time_col(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<DateTime<Utc>>> {
    let raw: Option<String> = row.get(idx)?;
    raw.map(|s| {
        parse_db_time(&s).map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
    })
    .transpose()
}

fn plan_col(row: &Row<'_>, idx: usize) -> rusqlite::Result<PlanType> {
    let raw: String = row.get(idx)?;
    PlanType::parse(&raw).ok_or_else(|| invalid(idx, format!("unknown plan type {}", raw)))
}

fn invalid(idx: usize, msg: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(StorageError::InvalidData(msg)))
}

fn transaction_from_row(row: &Row<'_>) -> rusqlite::Result<Transaction> {
    let status: String = row.get(7)?;
    Ok(Transaction {
        id: row.get(0)?,
        user_id: row.get(1)?,
        plan_type: plan_col(row, 2)?,
        btc_address: row.get(3)?,
        btc_amount: row.get(4)?,
        usd_amount: row.get(5)?,
        btc_rate: row.get(6)?,
        status: TransactionStatus::parse(&status)
            .ok_or_else(|| invalid(7, format!("unknown transaction status {}", status)))?,
        created_at: time_col(row, 8)?,
        expires_at: time_col(row, 9)?,
        confirmed_at: opt_time_col(row, 10)?,
    })
}

fn subscription_from_row(row: &Row<'_>) -> rusqlite::Result<Subscription> {
    let status: String = row.get(4)?;
    Ok(Subscription {
        id: row.get(0)?,
        user_id: row.get(1)?,
        plan_type: plan_col(row, 2)?,
        transaction_id: row.get(3)?,
        status: SubscriptionStatus::parse(&status)
            .ok_or_else(|| invalid(4, format!("unknown subscription status {}", status)))?,
        created_at: time_col(row, 5)?,
        starts_at: time_col(row, 6)?,
        expires_at: opt_time_col(row, 7)?,
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    pub(crate) fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap()
    }

    pub(crate) fn seeded(addresses: &[&str]) -> Database {
        let db = Database::open_in_memory().unwrap();
        let addrs: Vec<String> = addresses.iter().map(|a| a.to_string()).collect();
        db.load_addresses(&addrs, t0()).unwrap();
        db
    }

    pub(crate) fn new_payment(user_id: i64, plan: PlanType, now: DateTime<Utc>) -> NewPayment {
        NewPayment {
            user_id,
            plan_type: plan,
            btc_amount: 0.00054348,
            usd_amount: 50.0,
            btc_rate: 92_000.0,
            expires_at: now + Duration::minutes(30),
        }
    }

    fn reserve(db: &Database, user_id: i64, now: DateTime<Utc>) -> Reservation {
        db.upsert_user(user_id, Some("alice"), "Alice", now).unwrap();
        db.reserve_payment(&new_payment(user_id, PlanType::Vip1, now), now).unwrap()
    }

    #[test]
    fn test_load_addresses_ignores_duplicates() {
        let db = seeded(&["a1", "a2"]);
        let more = vec!["a2".to_string(), "a3".to_string()];
        assert_eq!(db.load_addresses(&more, t0()).unwrap(), 1);
        assert_eq!(db.available_address_count().unwrap(), 3);
        assert!(db.health_check());
    }

    #[test]
    fn test_upsert_user_keeps_created_at() {
        let db = Database::open_in_memory().unwrap();
        db.upsert_user(5, None, "Bob", t0()).unwrap();
        let later = t0() + Duration::hours(2);
        db.upsert_user(5, Some("bobby"), "Bob", later).unwrap();

        let user = db.get_user(5).unwrap().unwrap();
        assert_eq!(user.username.as_deref(), Some("bobby"));
        assert_eq!(user.created_at, t0());
        assert_eq!(user.last_activity, later);
        assert!(db.get_user(6).unwrap().is_none());
    }

    #[test]
    fn test_reserve_payment_assigns_unique_addresses() {
        let db = seeded(&["only-one"]);

        let Reservation::Created(tx) = reserve(&db, 1, t0()) else {
            panic!("expected a reservation");
        };
        assert_eq!(tx.btc_address, "only-one");
        assert_eq!(tx.status, TransactionStatus::Pending);
        assert_eq!(tx.expires_at, t0() + Duration::minutes(30));
        assert_eq!(db.available_address_count().unwrap(), 0);

        // same user again: still pending
        assert_eq!(reserve(&db, 1, t0()), Reservation::HasPending);
        // someone else: pool exhausted
        assert_eq!(reserve(&db, 2, t0()), Reservation::NoAddress);

        db.release_address("only-one").unwrap();
        assert_eq!(db.available_address_count().unwrap(), 1);
    }

    #[test]
    fn test_confirm_opens_subscription_once() {
        let db = seeded(&["addr"]);
        let Reservation::Created(tx) = reserve(&db, 1, t0()) else {
            panic!("expected a reservation");
        };

        let expires = t0() + Duration::days(30);
        let sub = db.confirm_transaction(tx.id, Some(expires), t0()).unwrap().unwrap();
        assert_eq!(sub.plan_type, PlanType::Vip1);
        assert_eq!(sub.transaction_id, tx.id);
        assert_eq!(sub.expires_at, Some(expires));

        // already confirmed: no second subscription
        assert!(db.confirm_transaction(tx.id, Some(expires), t0()).unwrap().is_none());

        let stored = db.get_transaction(tx.id).unwrap().unwrap();
        assert_eq!(stored.status, TransactionStatus::Confirmed);
        assert_eq!(stored.confirmed_at, Some(t0()));

        assert!(db.active_subscription(1, t0()).unwrap().is_some());
        assert!(db.active_subscription(1, expires).unwrap().is_none());
        assert_eq!(db.expire_subscriptions(expires + Duration::seconds(1)).unwrap(), 1);
        assert!(db.active_subscription(1, t0()).unwrap().is_none());
    }

    #[test]
    fn test_lifetime_subscription_never_expires() {
        let db = seeded(&["addr"]);
        let Reservation::Created(tx) = reserve(&db, 1, t0()) else {
            panic!("expected a reservation");
        };
        db.confirm_transaction(tx.id, None, t0()).unwrap();

        let far = t0() + Duration::days(3650);
        assert_eq!(db.expire_subscriptions(far).unwrap(), 0);
        assert!(db.active_subscription(1, far).unwrap().unwrap().is_lifetime());
    }

    #[test]
    fn test_expired_pending_and_finish() {
        let db = seeded(&["a1", "a2"]);
        let Reservation::Created(tx) = reserve(&db, 1, t0()) else {
            panic!("expected a reservation");
        };

        assert!(db.expired_pending(t0() + Duration::minutes(29)).unwrap().is_empty());
        let overdue = db.expired_pending(t0() + Duration::minutes(30)).unwrap();
        assert_eq!(overdue.len(), 1);

        assert!(db.finish_pending(tx.id, TransactionStatus::Expired, t0()).unwrap());
        assert!(!db.finish_pending(tx.id, TransactionStatus::Cancelled, t0()).unwrap());
        assert!(db.pending_transactions().unwrap().is_empty());
        assert!(db.pending_transaction_for(1).unwrap().is_none());
    }

    #[test]
    fn test_user_transactions_newest_first() {
        let db = seeded(&["a1", "a2"]);
        let Reservation::Created(first) = reserve(&db, 1, t0()) else {
            panic!("expected a reservation");
        };
        db.finish_pending(first.id, TransactionStatus::Cancelled, t0()).unwrap();
        let later = t0() + Duration::minutes(1);
        let Reservation::Created(second) = reserve(&db, 1, later) else {
            panic!("expected a reservation");
        };

        let ids: Vec<i64> = db.user_transactions(1).unwrap().iter().map(|t| t.id).collect();
        assert_eq!(ids, vec![second.id, first.id]);
    }

    #[test]
    fn test_time_format_roundtrip() {
        let t = t0();
        assert_eq!(to_db_time(t), "2025-06-01 12:00:00");
        assert_eq!(parse_db_time("2025-06-01 12:00:00").unwrap(), t);
        assert!(parse_db_time("yesterday").is_err());
    }
}
