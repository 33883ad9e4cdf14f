use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// VIP plan tiers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PlanType {
    #[serde(rename = "VIP1")]
    Vip1,
    #[serde(rename = "VIP2")]
    Vip2,
    #[serde(rename = "VIP3")]
    Vip3,
}

impl PlanType {
    pub fn all() -> [PlanType; 3] {
        [PlanType::Vip1, PlanType::Vip2, PlanType::Vip3]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PlanType::Vip1 => "VIP1",
            PlanType::Vip2 => "VIP2",
            PlanType::Vip3 => "VIP3",
        }
    }

    /// Lowercase form used in `buy_*` callback data
    pub fn slug(&self) -> &'static str {
        match self {
            PlanType::Vip1 => "vip1",
            PlanType::Vip2 => "vip2",
            PlanType::Vip3 => "vip3",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_uppercase().as_str() {
            "VIP1" => Some(PlanType::Vip1),
            "VIP2" => Some(PlanType::Vip2),
            "VIP3" => Some(PlanType::Vip3),
            _ => None,
        }
    }
}

impl fmt::Display for PlanType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PlanType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PlanType::parse(s).ok_or_else(|| format!("unknown plan type: {}", s))
    }
}

/// Static description of a plan plus its invite link
#[derive(Debug, Clone, PartialEq)]
pub struct PlanConfig {
    pub plan: PlanType,
    pub name: &'static str,
    pub emoji: &'static str,
    pub price_usd: f64,
    /// `None` means lifetime access
    pub duration_days: Option<u32>,
    pub description: &'static str,
    pub features: Vec<&'static str>,
    pub link: String,
}

impl PlanConfig {
    pub fn duration_label(&self) -> String {
        match self.duration_days {
            Some(days) => format!("{} days", days),
            None => "Lifetime".to_string(),
        }
    }

    /// When a subscription bought at `from` runs out
    pub fn subscription_expiry(&self, from: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.duration_days
            .map(|days| from + Duration::days(i64::from(days)))
    }

    pub fn title(&self) -> String {
        format!("{} {}", self.emoji, self.name)
    }
}

/// Build the catalogue entry for a plan. `link` is the VIP invite for that plan.
pub fn plan_config(plan: PlanType, link: impl Into<String>) -> PlanConfig {
    let link = link.into();
    match plan {
        PlanType::Vip1 => PlanConfig {
            plan,
            name: "VIP1 Plan",
            emoji: "🥉",
            price_usd: 50.0,
            duration_days: Some(30),
            description: "Basic VIP access with standard features",
            features: vec!["✅ Basic signals", "✅ Community access", "✅ Email support"],
            link,
        },
        PlanType::Vip2 => PlanConfig {
            plan,
            name: "VIP2 Plan",
            emoji: "🥈",
            price_usd: 100.0,
            duration_days: Some(30),
            description: "Premium VIP access with advanced features",
            features: vec![
                "✅ Premium signals",
                "✅ Priority community access",
                "✅ Live chat support",
                "✅ Weekly analysis",
            ],
            link,
        },
        PlanType::Vip3 => PlanConfig {
            plan,
            name: "VIP3 Plan",
            emoji: "🥇",
            price_usd: 200.0,
            duration_days: None,
            description: "Ultimate VIP access with all features",
            features: vec![
                "✅ Ultimate signals",
                "✅ VIP community access",
                "✅ 24/7 priority support",
                "✅ Daily analysis",
                "✅ 1-on-1 consultation",
                "✅ Risk management tools",
            ],
            link,
        },
    }
}
