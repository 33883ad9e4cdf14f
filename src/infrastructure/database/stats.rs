//! Read-only reporting queries used by the admin panel and the alert job

use chrono::{DateTime, Utc};
use rusqlite::params;

use super::{plan_col, time_col, to_db_time, Database, TX_COLUMNS};
use crate::application::errors::StorageError;
use crate::domain::entities::{PlanType, Transaction};

/// A user together with their latest transaction, if any
#[derive(Debug, Clone, PartialEq)]
pub struct UserOverview {
    pub user_id: i64,
    pub username: Option<String>,
    pub first_name: String,
    pub created_at: DateTime<Utc>,
    pub plan_type: Option<PlanType>,
    pub status: Option<String>,
    pub btc_amount: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Profits {
    pub count: i64,
    pub total_btc: f64,
    pub total_usd: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlanSales {
    pub plan_type: PlanType,
    pub count: i64,
    pub total_usd: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DailySignups {
    pub date: String,
    pub signups: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlanBreakdown {
    pub plan_type: PlanType,
    pub total: i64,
    pub confirmed: i64,
    pub pending: i64,
    pub expired: i64,
    pub revenue: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HourlyActivity {
    pub hour: u32,
    pub count: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct UnpaidUser {
    pub user_id: i64,
    pub username: Option<String>,
    pub first_name: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExpiredTransaction {
    pub user_id: i64,
    pub plan_type: PlanType,
    pub btc_amount: f64,
    pub expires_at: DateTime<Utc>,
}

impl Database {
    pub fn total_users(&self) -> Result<i64, StorageError> {
        let count = self
            .conn()?
            .query_row("SELECT COUNT(*) FROM users", [], |row| row.get(0))?;
        Ok(count)
    }

    pub fn confirmed_count(&self) -> Result<i64, StorageError> {
        let count = self.conn()?.query_row(
            "SELECT COUNT(*) FROM transactions WHERE status = 'confirmed'",
            [],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    /// Most recently joined users with their latest transaction
    pub fn recent_users(&self, limit: i64) -> Result<Vec<UserOverview>, StorageError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT u.user_id, u.username, u.first_name, u.created_at,
                    t.plan_type, t.status, t.btc_amount
             FROM users u
             LEFT JOIN transactions t ON t.id = (
                 SELECT id FROM transactions
                 WHERE user_id = u.user_id
                 ORDER BY created_at DESC, id DESC LIMIT 1
             )
             ORDER BY u.created_at DESC, u.user_id DESC
             LIMIT ?1",
        )?;
        let rows = stmt.query_map([limit], |row| {
            let plan: Option<String> = row.get(4)?;
            Ok(UserOverview {
                user_id: row.get(0)?,
                username: row.get(1)?,
                first_name: row.get(2)?,
                created_at: time_col(row, 3)?,
                plan_type: plan.as_deref().and_then(PlanType::parse),
                status: row.get(5)?,
                btc_amount: row.get(6)?,
            })
        })?;
        collect(rows)
    }

    pub fn profits(&self) -> Result<Profits, StorageError> {
        let profits = self.conn()?.query_row(
            "SELECT COUNT(*), COALESCE(SUM(btc_amount), 0), COALESCE(SUM(usd_amount), 0)
             FROM transactions WHERE status = 'confirmed'",
            [],
            |row| {
                Ok(Profits {
                    count: row.get(0)?,
                    total_btc: row.get(1)?,
                    total_usd: row.get(2)?,
                })
            },
        )?;
        Ok(profits)
    }

    /// Confirmed sales per plan, best earners first
    pub fn sales_by_plan(&self) -> Result<Vec<PlanSales>, StorageError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT plan_type, COUNT(*), COALESCE(SUM(usd_amount), 0)
             FROM transactions WHERE status = 'confirmed'
             GROUP BY plan_type
             ORDER BY 3 DESC",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(PlanSales {
                plan_type: plan_col(row, 0)?,
                count: row.get(1)?,
                total_usd: row.get(2)?,
            })
        })?;
        collect(rows)
    }

    /// New users per calendar day since `since`, newest day first
    pub fn signups_by_day(&self, since: DateTime<Utc>) -> Result<Vec<DailySignups>, StorageError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT substr(created_at, 1, 10) AS day, COUNT(*)
             FROM users WHERE created_at >= ?1
             GROUP BY day ORDER BY day DESC",
        )?;
        let rows = stmt.query_map(params![to_db_time(since)], |row| {
            Ok(DailySignups {
                date: row.get(0)?,
                signups: row.get(1)?,
            })
        })?;
        collect(rows)
    }

    /// Per-plan counts by status, highest revenue first
    pub fn plan_breakdown(&self) -> Result<Vec<PlanBreakdown>, StorageError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT plan_type,
                    COUNT(*),
                    SUM(CASE WHEN status = 'confirmed' THEN 1 ELSE 0 END),
                    SUM(CASE WHEN status = 'pending' THEN 1 ELSE 0 END),
                    SUM(CASE WHEN status = 'expired' THEN 1 ELSE 0 END),
                    COALESCE(SUM(CASE WHEN status = 'confirmed' THEN usd_amount ELSE 0 END), 0)
             FROM transactions
             GROUP BY plan_type
             ORDER BY 6 DESC, plan_type",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(PlanBreakdown {
                plan_type: plan_col(row, 0)?,
                total: row.get(1)?,
                confirmed: row.get(2)?,
                pending: row.get(3)?,
                expired: row.get(4)?,
                revenue: row.get(5)?,
            })
        })?;
        collect(rows)
    }

    /// Users active since `since`, bucketed by UTC hour of their last activity
    pub fn activity_by_hour(&self, since: DateTime<Utc>) -> Result<Vec<HourlyActivity>, StorageError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT CAST(substr(last_activity, 12, 2) AS INTEGER) AS hour, COUNT(*)
             FROM users WHERE last_activity >= ?1
             GROUP BY hour ORDER BY hour",
        )?;
        let rows = stmt.query_map(params![to_db_time(since)], |row| {
            Ok(HourlyActivity {
                hour: row.get(0)?,
                count: row.get(1)?,
            })
        })?;
        collect(rows)
    }

    /// Users who joined in `(from, to]` and have no confirmed transaction
    pub fn unpaid_users(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<UnpaidUser>, StorageError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT u.user_id, u.username, u.first_name, u.created_at
             FROM users u
             WHERE u.created_at > ?1 AND u.created_at <= ?2
               AND NOT EXISTS (
                   SELECT 1 FROM transactions t
                   WHERE t.user_id = u.user_id AND t.status = 'confirmed'
               )
             ORDER BY u.created_at DESC
             LIMIT ?3",
        )?;
        let rows = stmt.query_map(params![to_db_time(from), to_db_time(to), limit], |row| {
            Ok(UnpaidUser {
                user_id: row.get(0)?,
                username: row.get(1)?,
                first_name: row.get(2)?,
                created_at: time_col(row, 3)?,
            })
        })?;
        collect(rows)
    }

    /// Transactions that expired at or after `since`, latest first
    pub fn recently_expired(&self, since: DateTime<Utc>, limit: i64) -> Result<Vec<ExpiredTransaction>, StorageError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT user_id, plan_type, btc_amount, expires_at
             FROM transactions
             WHERE status = 'expired' AND expires_at >= ?1
             ORDER BY expires_at DESC
             LIMIT ?2",
        )?;
        let rows = stmt.query_map(params![to_db_time(since), limit], |row| {
            Ok(ExpiredTransaction {
                user_id: row.get(0)?,
                plan_type: plan_col(row, 1)?,
                btc_amount: row.get(2)?,
                expires_at: time_col(row, 3)?,
            })
        })?;
        collect(rows)
    }

    /// Transactions confirmed within `[from, to)`
    pub fn confirmed_between(&self, from: DateTime<Utc>, to: DateTime<Utc>) -> Result<Vec<Transaction>, StorageError> {
        self.query_transactions(
            &format!(
                "SELECT {} FROM transactions
                 WHERE status = 'confirmed' AND confirmed_at >= ?1 AND confirmed_at < ?2
                 ORDER BY confirmed_at ASC",
                TX_COLUMNS
            ),
            params![to_db_time(from), to_db_time(to)],
        )
    }
}

fn collect<T>(rows: impl Iterator<Item = rusqlite::Result<T>>) -> Result<Vec<T>, StorageError> {
    let mut out = Vec::new();
    for row in rows {
        out.push(row?);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::super::tests::{new_payment, seeded, t0};
    use super::super::Reservation;
    use super::*;
    use crate::domain::entities::TransactionStatus;
    use chrono::Duration;

    fn buy(db: &Database, user_id: i64, plan: PlanType, now: DateTime<Utc>) -> Transaction {
        db.upsert_user(user_id, None, &format!("user{}", user_id), now).unwrap();
        let mut payment = new_payment(user_id, plan, now);
        payment.usd_amount = match plan {
            PlanType::Vip1 => 50.0,
            PlanType::Vip2 => 100.0,
            PlanType::Vip3 => 200.0,
        };
        match db.reserve_payment(&payment, now).unwrap() {
            Reservation::Created(tx) => tx,
            other => panic!("unexpected reservation {:?}", other),
        }
    }

    #[test]
    fn test_profits_and_sales() {
        let db = seeded(&["a1", "a2", "a3"]);
        let a = buy(&db, 1, PlanType::Vip1, t0());
        let b = buy(&db, 2, PlanType::Vip3, t0());
        buy(&db, 3, PlanType::Vip3, t0());
        db.confirm_transaction(a.id, None, t0()).unwrap();
        db.confirm_transaction(b.id, None, t0()).unwrap();

        let profits = db.profits().unwrap();
        assert_eq!(profits.count, 2);
        assert!((profits.total_usd - 250.0).abs() < 1e-9);
        assert_eq!(db.confirmed_count().unwrap(), 2);

        let sales = db.sales_by_plan().unwrap();
        assert_eq!(sales[0].plan_type, PlanType::Vip3);
        assert_eq!(sales[0].count, 1);
        assert_eq!(sales[1].plan_type, PlanType::Vip1);

        let breakdown = db.plan_breakdown().unwrap();
        let vip3 = breakdown.iter().find(|b| b.plan_type == PlanType::Vip3).unwrap();
        assert_eq!((vip3.total, vip3.confirmed, vip3.pending), (2, 1, 1));
        assert!((vip3.revenue - 200.0).abs() < 1e-9);
    }

    #[test]
    fn test_empty_profits() {
        let db = seeded(&[]);
        assert_eq!(db.profits().unwrap(), Profits::default());
        assert!(db.sales_by_plan().unwrap().is_empty());
        assert_eq!(db.total_users().unwrap(), 0);
    }

    #[test]
    fn test_recent_users_show_latest_transaction() {
        let db = seeded(&["a1", "a2"]);
        let first = buy(&db, 1, PlanType::Vip1, t0());
        db.finish_pending(first.id, TransactionStatus::Cancelled, t0()).unwrap();
        buy(&db, 1, PlanType::Vip2, t0() + Duration::minutes(1));
        db.upsert_user(2, Some("bob"), "Bob", t0() + Duration::minutes(2)).unwrap();

        let users = db.recent_users(10).unwrap();
        assert_eq!(users.len(), 2);
        assert_eq!(users[0].user_id, 2);
        assert_eq!(users[0].plan_type, None);
        assert_eq!(users[1].plan_type, Some(PlanType::Vip2));
        assert_eq!(users[1].status.as_deref(), Some("pending"));
    }

    #[test]
    fn test_unpaid_users_window() {
        let db = seeded(&["a1"]);
        let now = t0();
        db.upsert_user(1, None, "Early", now - Duration::minutes(20)).unwrap();
        db.upsert_user(2, None, "InWindow", now - Duration::minutes(12)).unwrap();
        db.upsert_user(3, None, "Fresh", now - Duration::minutes(2)).unwrap();
        let paid = buy(&db, 4, PlanType::Vip1, now - Duration::minutes(11));
        db.confirm_transaction(paid.id, None, now).unwrap();

        let unpaid = db
            .unpaid_users(now - Duration::minutes(15), now - Duration::minutes(10), 50)
            .unwrap();
        let ids: Vec<i64> = unpaid.iter().map(|u| u.user_id).collect();
        assert_eq!(ids, vec![2]);
    }

    #[test]
    fn test_signups_and_activity() {
        let db = seeded(&[]);
        db.upsert_user(1, None, "A", t0()).unwrap();
        db.upsert_user(2, None, "B", t0() + Duration::hours(1)).unwrap();
        db.upsert_user(3, None, "C", t0() - Duration::days(1)).unwrap();

        let days = db.signups_by_day(t0() - Duration::days(7)).unwrap();
        assert_eq!(days[0].date, "2025-06-01");
        assert_eq!(days[0].signups, 2);
        assert_eq!(days[1].signups, 1);

        let hours = db.activity_by_hour(t0()).unwrap();
        assert_eq!(
            hours,
            vec![HourlyActivity { hour: 12, count: 1 }, HourlyActivity { hour: 13, count: 1 }]
        );
    }

    #[test]
    fn test_recently_expired_and_confirmed_between() {
        let db = seeded(&["a1", "a2"]);
        let a = buy(&db, 1, PlanType::Vip1, t0());
        let b = buy(&db, 2, PlanType::Vip2, t0());
        db.finish_pending(a.id, TransactionStatus::Expired, t0()).unwrap();
        db.confirm_transaction(b.id, None, t0() + Duration::minutes(5)).unwrap();

        let expired = db.recently_expired(t0(), 10).unwrap();
        assert_eq!(expired.len(), 1);
        assert_eq!(expired[0].user_id, 1);

        let confirmed = db
            .confirmed_between(t0(), t0() + Duration::minutes(10))
            .unwrap();
        assert_eq!(confirmed.len(), 1);
        assert_eq!(confirmed[0].id, b.id);
        assert!(db.confirmed_between(t0(), t0() + Duration::minutes(1)).unwrap().is_empty());
    }

    #[test]
    fn test_confirmed_between_excludes_upper_bound() {
        let db = seeded(&["a1"]);
        let tx = buy(&db, 1, PlanType::Vip1, t0());
        let at = t0() + Duration::minutes(5);
        db.confirm_transaction(tx.id, None, at).unwrap();

        // consecutive windows share a boundary second, only one of them may match
        let earlier = db.confirmed_between(at - Duration::minutes(5), at).unwrap();
        let later = db.confirmed_between(at, at + Duration::minutes(5)).unwrap();
        assert!(earlier.is_empty());
        assert_eq!(later.len(), 1);
    }
}
