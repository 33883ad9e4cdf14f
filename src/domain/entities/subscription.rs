use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::PlanType;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubscriptionStatus {
    Active,
    Expired,
    Cancelled,
}

impl SubscriptionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriptionStatus::Active => "active",
            SubscriptionStatus::Expired => "expired",
            SubscriptionStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "active" => Some(SubscriptionStatus::Active),
            "expired" => Some(SubscriptionStatus::Expired),
            "cancelled" => Some(SubscriptionStatus::Cancelled),
            _ => None,
        }
    }
}

/// VIP access granted by a confirmed transaction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subscription {
    pub id: i64,
    pub user_id: i64,
    pub plan_type: PlanType,
    pub transaction_id: i64,
    pub status: SubscriptionStatus,
    pub created_at: DateTime<Utc>,
    pub starts_at: DateTime<Utc>,
    /// `None` for lifetime plans
    pub expires_at: Option<DateTime<Utc>>,
}

impl Subscription {
    pub fn is_lifetime(&self) -> bool {
        self.expires_at.is_none()
    }
}
