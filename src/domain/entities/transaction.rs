use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::PlanType;

/// Lifecycle of a quoted payment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionStatus {
    Pending,
    Confirmed,
    Expired,
    Cancelled,
}

impl TransactionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionStatus::Pending => "pending",
            TransactionStatus::Confirmed => "confirmed",
            TransactionStatus::Expired => "expired",
            TransactionStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(TransactionStatus::Pending),
            "confirmed" => Some(TransactionStatus::Confirmed),
            "expired" => Some(TransactionStatus::Expired),
            "cancelled" => Some(TransactionStatus::Cancelled),
            _ => None,
        }
    }

    pub fn emoji(&self) -> &'static str {
        match self {
            TransactionStatus::Pending => "⏳",
            TransactionStatus::Confirmed => "✅",
            TransactionStatus::Expired => "❌",
            TransactionStatus::Cancelled => "🚫",
        }
    }

    pub fn title(&self) -> &'static str {
        match self {
            TransactionStatus::Pending => "Pending",
            TransactionStatus::Confirmed => "Confirmed",
            TransactionStatus::Expired => "Expired",
            TransactionStatus::Cancelled => "Cancelled",
        }
    }
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A payment request stored in the database
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: i64,
    pub user_id: i64,
    pub plan_type: PlanType,
    pub btc_address: String,
    pub btc_amount: f64,
    pub usd_amount: f64,
    pub btc_rate: f64,
    pub status: TransactionStatus,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub confirmed_at: Option<DateTime<Utc>>,
}

impl Transaction {
    pub fn time_left(&self, now: DateTime<Utc>) -> Duration {
        self.expires_at - now
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.time_left(now) <= Duration::zero()
    }

    pub fn is_pending(&self) -> bool {
        self.status == TransactionStatus::Pending
    }
}

/// Newly created payment, as shown to the buyer
#[derive(Debug, Clone, PartialEq)]
pub struct Payment {
    pub id: i64,
    pub plan_type: PlanType,
    pub btc_address: String,
    pub btc_amount: f64,
    pub usd_amount: f64,
    pub btc_price: f64,
    pub expires_at: DateTime<Utc>,
}

impl From<&Transaction> for Payment {
    fn from(tx: &Transaction) -> Self {
        Self {
            id: tx.id,
            plan_type: tx.plan_type,
            btc_address: tx.btc_address.clone(),
            btc_amount: tx.btc_amount,
            usd_amount: tx.usd_amount,
            btc_price: tx.btc_rate,
            expires_at: tx.expires_at,
        }
    }
}
