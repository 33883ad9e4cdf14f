//! Push notifications sent outside of a user interaction

use chrono::{DateTime, Utc};

use crate::application::format::{escape_markdown, format_btc_amount, format_username};
use crate::application::messaging::Action;
use crate::domain::entities::{PlanType, Transaction};
use crate::domain::traits::{KeyboardButton, Reply};
use crate::infrastructure::config::Config;
use crate::infrastructure::database::UnpaidUser;

/// Who moved the transaction to confirmed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfirmedBy {
    Chain,
    Admin,
}

/// Sent as plain text: invite links often contain underscores
pub fn payment_confirmed(
    config: &Config,
    tx: &Transaction,
    subscription_expires: Option<DateTime<Utc>>,
    by: ConfirmedBy,
) -> Reply {
    let plan = config.plan(tx.plan_type);
    let headline = match by {
        ConfirmedBy::Chain => "✅ Payment Confirmed!",
        ConfirmedBy::Admin => "✅ Payment Approved by Admin!",
    };

    let mut text = format!("{}\n\n", headline);
    text.push_str(&format!("Welcome to {}!\n\n", plan.title()));
    text.push_str(&format!("💰 Amount: {} BTC\n", format_btc_amount(tx.btc_amount)));
    match subscription_expires {
        Some(expires) => text.push_str(&format!("⏰ Expires: {}\n", expires.format("%Y-%m-%d"))),
        None => text.push_str("⏰ Duration: Lifetime\n"),
    }
    if !plan.link.is_empty() {
        text.push_str(&format!("\n🔗 Your VIP Access:\n{}\n", plan.link));
    }
    text.push_str("\n🎉 Welcome to the community!");

    let dashboard = KeyboardButton::callback("💼 Dashboard", Action::Dashboard.callback_data());
    match by {
        ConfirmedBy::Chain => Reply::text(text)
            .button(KeyboardButton::callback(
                "🔐 Request Admin Access",
                Action::RequestAdminAccess.callback_data(),
            ))
            .button(dashboard),
        ConfirmedBy::Admin => Reply::text(text).button(dashboard),
    }
}

pub fn payment_rejected(config: &Config, plan: PlanType) -> Reply {
    Reply::text(format!(
        "❌ Payment Rejected\n\nYour payment for {} has been rejected by admin.\n\
         Please contact support if you believe this is an error.",
        config.plan(plan).name
    ))
}

pub fn payment_expired(config: &Config, plan: PlanType) -> Reply {
    Reply::markdown(format!(
        "⏰ *Payment Expired*\n\nYour payment for {} has expired.\nPlease start again with /start",
        config.plan(plan).name
    ))
}

pub fn partial_payment(tx: &Transaction, received: f64) -> Reply {
    let mut text = "⚠️ *Partial Payment Detected*\n\n".to_string();
    text.push_str(&format!("We received: {} BTC\n", format_btc_amount(received)));
    text.push_str(&format!("Expected: {} BTC\n", format_btc_amount(tx.btc_amount)));
    text.push_str(&format!(
        "Missing: {} BTC\n\n",
        format_btc_amount(tx.btc_amount - received)
    ));
    text.push_str("Please send the remaining amount to complete your payment.\n");
    text.push_str(&format!("Address: `{}`", tx.btc_address));
    Reply::markdown(text)
}

/// To the admin, when more than one matching payment hit the address
pub fn double_spend_alert(tx: &Transaction) -> Reply {
    let mut text = "🚨 *DOUBLE SPEND ALERT*\n\n".to_string();
    text.push_str(&format!("Transaction ID: {}\n", tx.id));
    text.push_str(&format!("User ID: {}\n", tx.user_id));
    text.push_str(&format!("Address: `{}`\n", tx.btc_address));
    text.push_str(&format!("Amount: {} BTC\n", format_btc_amount(tx.btc_amount)));
    text.push_str(&format!("Plan: {}\n\n", tx.plan_type));
    text.push_str("⚠️ Potential double spending detected. Manual review required.");
    Reply::markdown(text)
}

pub fn unpaid_users_alert(users: &[UnpaidUser]) -> Reply {
    let mut text = "⏰ *Unpaid Users Alert*\n\n".to_string();
    text.push_str("Users who started 10 minutes ago but haven't paid:\n\n");
    for user in users {
        text.push_str(&format!(
            "• {} ({})\n",
            escape_markdown(&user.first_name),
            escape_markdown(&format_username(user.username.as_deref()))
        ));
        text.push_str(&format!("  ID: {}\n", user.user_id));
        text.push_str(&format!("  Started: {}\n\n", user.created_at.format("%H:%M")));
    }
    Reply::markdown(text)
}

/// Sent roughly 40 minutes after a confirmation
pub fn double_spend_reminder(config: &Config, plan: PlanType) -> Reply {
    let mut text = "🔔 *Important Reminder*\n\n".to_string();
    text.push_str(&format!(
        "Your {} payment was confirmed 40 minutes ago.\n\n",
        config.plan(plan).name
    ));
    text.push_str(
        "⚠️ *Please do not send any additional payments* for this plan to avoid double spending.\n\n",
    );
    text.push_str("Your subscription is already active!");
    Reply::markdown(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::TransactionStatus;
    use chrono::{Duration, TimeZone};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap()
    }

    fn tx() -> Transaction {
        Transaction {
            id: 9,
            user_id: 77,
            plan_type: PlanType::Vip1,
            btc_address: "bc1qexampleaddress".to_string(),
            btc_amount: 0.00054348,
            usd_amount: 50.0,
            btc_rate: 92_000.0,
            status: TransactionStatus::Pending,
            created_at: now(),
            expires_at: now() + Duration::minutes(30),
            confirmed_at: None,
        }
    }

    fn config() -> Config {
        let mut config = Config::default();
        config.vip_links.vip1 = "https://t.me/+vip_one_link".to_string();
        config
    }

    #[test]
    fn test_confirmed_by_chain() {
        let reply = payment_confirmed(
            &config(),
            &tx(),
            Some(now() + Duration::days(30)),
            ConfirmedBy::Chain,
        );
        assert_eq!(reply.parse_mode, None);
        assert!(reply.text.starts_with("✅ Payment Confirmed!"));
        assert!(reply.text.contains("⏰ Expires: 2025-07-01"));
        assert!(reply.text.contains("https://t.me/+vip_one_link"));
        assert_eq!(reply.callbacks(), vec!["request_admin_access", "dashboard"]);
    }

    #[test]
    fn test_confirmed_by_admin_lifetime() {
        let mut vip3 = tx();
        vip3.plan_type = PlanType::Vip3;
        let reply = payment_confirmed(&config(), &vip3, None, ConfirmedBy::Admin);
        assert!(reply.text.starts_with("✅ Payment Approved by Admin!"));
        assert!(reply.text.contains("⏰ Duration: Lifetime"));
        assert!(!reply.text.contains("VIP Access"));
        assert_eq!(reply.callbacks(), vec!["dashboard"]);
    }

    #[test]
    fn test_partial_payment_missing_amount() {
        let reply = partial_payment(&tx(), 0.0002);
        assert!(reply.text.contains("We received: 0.00020000 BTC"));
        assert!(reply.text.contains("Missing: 0.00034348 BTC"));
    }

    #[test]
    fn test_unpaid_alert_lists_users() {
        let users = vec![UnpaidUser {
            user_id: 5,
            username: Some("first_buyer".to_string()),
            first_name: "Kim".to_string(),
            created_at: now(),
        }];
        let reply = unpaid_users_alert(&users);
        assert!(reply.text.contains("• Kim (@first\\_buyer)"));
        assert!(reply.text.contains("  Started: 12:00"));
    }

    #[test]
    fn test_expired_and_rejected_name_the_plan() {
        assert!(payment_expired(&config(), PlanType::Vip2)
            .text
            .contains("Your payment for VIP2 Plan has expired."));
        assert!(payment_rejected(&config(), PlanType::Vip3)
            .text
            .contains("Your payment for VIP3 Plan has been rejected by admin."));
    }
}
