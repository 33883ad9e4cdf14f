//! Message parser - Turns raw text and button payloads into structured input

use crate::domain::entities::{Content, PlanType};

/// Parses incoming text into `/commands` or plain text
#[derive(Debug, Clone, Default)]
pub struct MessageParser;

impl MessageParser {
    /// Parse a text message
    pub fn parse(&self, text: &str) -> Content {
        let Some(cmd_text) = text.trim().strip_prefix('/') else {
            return Content::Text(text.to_string());
        };

        let mut parts = cmd_text.split_whitespace();
        // `/start@my_bot` in groups
        let name = parts
            .next()
            .and_then(|first| first.split('@').next())
            .unwrap_or_default()
            .to_lowercase();
        if name.is_empty() {
            return Content::Text(text.to_string());
        }

        Content::Command {
            name,
            args: parts.map(|s| s.to_string()).collect(),
        }
    }

    /// Parse a callback query (inline button press)
    pub fn parse_callback(&self, data: &str) -> Option<Action> {
        Action::parse(data)
    }
}

/// Everything an inline button can ask for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    ComparePlans,
    Dashboard,
    CancelPlan,
    Support,
    Buy(PlanType),
    ViewPending,
    BackToMain,
    RequestAdminAccess,
    Refresh,
    CopyAddress(i64),
    AdminUsers,
    AdminProfits,
    AdminPending,
    AdminStats,
    AdminForce,
    AdminAlerts,
    AdminPlanBreakdown,
    AdminBack,
    ForceApprove(i64),
    ForceReject(i64),
}

impl Action {
    pub fn parse(data: &str) -> Option<Self> {
        let action = match data {
            "compare_plans" => Action::ComparePlans,
            "dashboard" => Action::Dashboard,
            "cancel_plan" => Action::CancelPlan,
            "support" => Action::Support,
            "view_pending" => Action::ViewPending,
            "back_to_main" => Action::BackToMain,
            "request_admin_access" => Action::RequestAdminAccess,
            "refresh" => Action::Refresh,
            "admin_users" => Action::AdminUsers,
            "admin_profits" => Action::AdminProfits,
            "admin_pending" => Action::AdminPending,
            "admin_stats" => Action::AdminStats,
            "admin_force" => Action::AdminForce,
            "admin_alerts" => Action::AdminAlerts,
            "admin_plan_breakdown" => Action::AdminPlanBreakdown,
            "admin_back" => Action::AdminBack,
            _ => return Self::parse_with_arg(data),
        };
        Some(action)
    }

    fn parse_with_arg(data: &str) -> Option<Self> {
        if let Some(plan) = data.strip_prefix("buy_") {
            return PlanType::parse(plan).map(Action::Buy);
        }
        if let Some(id) = data.strip_prefix("copy_address_") {
            return id.parse().ok().map(Action::CopyAddress);
        }
        if let Some(id) = data.strip_prefix("force_approve_") {
            return id.parse().ok().map(Action::ForceApprove);
        }
        if let Some(id) = data.strip_prefix("force_reject_") {
            return id.parse().ok().map(Action::ForceReject);
        }
        None
    }

    /// Payload to put on a button
    pub fn callback_data(&self) -> String {
        match self {
            Action::ComparePlans => "compare_plans".to_string(),
            Action::Dashboard => "dashboard".to_string(),
            Action::CancelPlan => "cancel_plan".to_string(),
            Action::Support => "support".to_string(),
            Action::Buy(plan) => format!("buy_{}", plan.slug()),
            Action::ViewPending => "view_pending".to_string(),
            Action::BackToMain => "back_to_main".to_string(),
            Action::RequestAdminAccess => "request_admin_access".to_string(),
            Action::Refresh => "refresh".to_string(),
            Action::CopyAddress(id) => format!("copy_address_{}", id),
            Action::AdminUsers => "admin_users".to_string(),
            Action::AdminProfits => "admin_profits".to_string(),
            Action::AdminPending => "admin_pending".to_string(),
            Action::AdminStats => "admin_stats".to_string(),
            Action::AdminForce => "admin_force".to_string(),
            Action::AdminAlerts => "admin_alerts".to_string(),
            Action::AdminPlanBreakdown => "admin_plan_breakdown".to_string(),
            Action::AdminBack => "admin_back".to_string(),
            Action::ForceApprove(id) => format!("force_approve_{}", id),
            Action::ForceReject(id) => format!("force_reject_{}", id),
        }
    }

    /// Actions only the configured admin may trigger
    pub fn requires_admin(&self) -> bool {
        matches!(
            self,
            Action::AdminUsers
                | Action::AdminProfits
                | Action::AdminPending
                | Action::AdminStats
                | Action::AdminForce
                | Action::AdminAlerts
                | Action::AdminPlanBreakdown
                | Action::AdminBack
                | Action::ForceApprove(_)
                | Action::ForceReject(_)
        )
    }
}
