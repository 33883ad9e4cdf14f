//! Admin panel screens

use chrono::{DateTime, Utc};

use super::{back, refresh, stamp};
use crate::application::format::{
    calculate_percentage, escape_markdown, format_btc_amount, format_currency, format_username,
};
use crate::application::messaging::Action;
use crate::domain::entities::{plan_config, Transaction};
use crate::domain::traits::{KeyboardButton, Reply};
use crate::infrastructure::database::{
    DailySignups, ExpiredTransaction, HourlyActivity, PlanBreakdown, PlanSales, Profits,
    UnpaidUser, UserOverview,
};

pub const USERS_SHOWN: usize = 20;
const PENDING_SHOWN: usize = 10;
const FORCE_SHOWN: usize = 5;
const ALERTS_SHOWN: usize = 5;
const HEATMAP_WIDTH: i64 = 20;

fn button(text: &str, action: Action) -> KeyboardButton {
    KeyboardButton::callback(text, action.callback_data())
}

fn back_to_panel() -> KeyboardButton {
    back(&Action::AdminBack.callback_data())
}

/// First `n` characters
fn clip(s: &str, n: usize) -> String {
    s.chars().take(n).collect()
}

pub fn panel(first_name: &str) -> Reply {
    Reply::markdown(format!(
        "👑 *Admin Panel*\n\nWelcome {}!",
        escape_markdown(first_name)
    ))
    .button(button("👥 All Users", Action::AdminUsers))
    .button(button("💰 Total Profits", Action::AdminProfits))
    .button(button("⏳ Pending Transactions", Action::AdminPending))
    .button(button("📊 Statistics", Action::AdminStats))
    .button(button("🔧 Force Actions", Action::AdminForce))
    .button(button("🔔 Alerts", Action::AdminAlerts))
    .button(button("⬅ Back to Bot", Action::BackToMain))
}

/// Fixed-width table of the newest users; `total` is the overall user count
pub fn users(users: &[UserOverview], total: i64, now: DateTime<Utc>) -> Reply {
    let mut text = format!("👥 *All Users* (Updated: {})\n\n", stamp(now));
    text.push_str("```\n");
    text.push_str(&format!(
        "{:<8} {:<12} {:<6} {:<10} {:<12}\n",
        "ID", "Username", "Plan", "Status", "BTC"
    ));
    text.push_str(&"-".repeat(55));
    text.push('\n');

    for user in users.iter().take(USERS_SHOWN) {
        let plan = user.plan_type.map(|p| p.as_str()).unwrap_or("None");
        let status = user.status.as_deref().unwrap_or("N/A");
        text.push_str(&format!(
            "{:<8} {:<12} {:<6} {:<10} {:<12}\n",
            clip(&user.user_id.to_string(), 8),
            clip(&format_username(user.username.as_deref()), 12),
            clip(plan, 6),
            clip(status, 10),
            clip(&format_btc_amount(user.btc_amount.unwrap_or(0.0)), 12),
        ));
    }
    text.push_str("```");

    let shown = users.len().min(USERS_SHOWN) as i64;
    if total > shown {
        text.push_str(&format!("\n... and {} more users", total - shown));
    }

    Reply::markdown(text)
        .button(refresh(&Action::AdminUsers.callback_data()))
        .button(back_to_panel())
}

/// Revenue summary valued at both the payment-time and the live BTC price
pub fn profits(profits: &Profits, btc_price: f64, now: DateTime<Utc>) -> Reply {
    let mut text = format!("💰 *Total Profits* (Updated: {})\n\n", stamp(now));
    text.push_str("📊 *Summary:*\n");
    text.push_str(&format!("Total Transactions: {}\n", profits.count));
    text.push_str(&format!("Total BTC Received: {}\n", format_btc_amount(profits.total_btc)));
    text.push_str(&format!("Total USD (at payment): {}\n\n", format_currency(profits.total_usd)));

    if btc_price > 0.0 {
        let current_value = profits.total_btc * btc_price;
        let pnl = current_value - profits.total_usd;
        let trend = if pnl >= 0.0 { "📈" } else { "📉" };

        text.push_str("💹 *Current Values:*\n");
        text.push_str(&format!("BTC Price: {}\n", format_currency(btc_price)));
        text.push_str(&format!("Current BTC Value: {}\n", format_currency(current_value)));
        text.push_str(&format!("{} P&L: {}\n", trend, format_currency(pnl)));
    }

    Reply::markdown(text)
        .button(refresh(&Action::AdminProfits.callback_data()))
        .button(button("📊 Plan Breakdown", Action::AdminPlanBreakdown))
        .button(back_to_panel())
}

pub fn pending(txs: &[Transaction], now: DateTime<Utc>) -> Reply {
    let mut text = format!("⏳ *Pending Transactions* (Updated: {})\n\n", stamp(now));

    if txs.is_empty() {
        text.push_str("No pending transactions.");
    }
    for (i, tx) in txs.iter().take(PENDING_SHOWN).enumerate() {
        let plan = plan_config(tx.plan_type, "");
        text.push_str(&format!("*{}. Transaction #{}*\n", i + 1, tx.id));
        text.push_str(&format!("User: {}\n", tx.user_id));
        text.push_str(&format!("Plan: {}\n", plan.title()));
        text.push_str(&format!("Amount: {} BTC\n", format_btc_amount(tx.btc_amount)));
        text.push_str(&format!("Address: `{}`\n", tx.btc_address));
        if tx.is_expired(now) {
            text.push_str("Status: ❌ Expired\n");
        } else {
            text.push_str(&format!("Expires in: {}m\n", tx.time_left(now).num_minutes()));
        }
        text.push('\n');
    }

    Reply::markdown(text)
        .button(refresh(&Action::AdminPending.callback_data()))
        .button(button("🔧 Force Actions", Action::AdminForce))
        .button(back_to_panel())
}

/// Everything the statistics screen shows
#[derive(Debug, Clone, Default)]
pub struct Statistics {
    pub sales: Vec<PlanSales>,
    pub total_signups: i64,
    pub total_payments: i64,
    pub signups: Vec<DailySignups>,
    pub activity: Vec<HourlyActivity>,
}

pub fn statistics(stats: &Statistics, now: DateTime<Utc>) -> Reply {
    let mut text = format!("📊 *Statistics* (Updated: {})\n\n", stamp(now));

    text.push_str("📈 *Plan Popularity:*\n");
    let total_sales: i64 = stats.sales.iter().map(|s| s.count).sum();
    for row in &stats.sales {
        let plan = plan_config(row.plan_type, "");
        text.push_str(&format!(
            "{} {}: {} ({:.1}%)\n",
            plan.emoji,
            row.plan_type,
            row.count,
            calculate_percentage(row.count as f64, total_sales as f64)
        ));
    }
    if stats.sales.is_empty() {
        text.push_str("No confirmed transactions yet.\n");
    }

    let conversion = calculate_percentage(stats.total_payments as f64, stats.total_signups as f64);
    text.push_str(&format!("\n💹 *Conversion Rate:* {:.1}%\n", conversion));
    text.push_str(&format!("Total Signups: {}\n", stats.total_signups));
    text.push_str(&format!("Total Payments: {}\n", stats.total_payments));

    text.push_str("\n📅 *Recent Activity (7 days):*\n");
    for row in &stats.signups {
        text.push_str(&format!("{}: {} signups\n", row.date, row.signups));
    }

    if !stats.activity.is_empty() {
        text.push_str("\n🕐 *Activity by Hour (UTC, 7 days):*\n");
        for row in &stats.activity {
            let bar = "█".repeat(row.count.clamp(0, HEATMAP_WIDTH) as usize);
            text.push_str(&format!("{:02}:00 {} {}\n", row.hour, bar, row.count));
        }
    }

    Reply::markdown(text)
        .button(refresh(&Action::AdminStats.callback_data()))
        .button(back_to_panel())
}

pub fn force_actions(txs: &[Transaction]) -> Reply {
    let mut text = "🔧 *Force Actions*\n\n".to_string();
    text.push_str("Select a transaction to approve or reject:\n\n");
    if txs.is_empty() {
        text.push_str("No pending transactions to manage.");
    }

    let mut reply = Reply::markdown(text);
    for tx in txs.iter().take(FORCE_SHOWN) {
        let plan = plan_config(tx.plan_type, "");
        let info = format!(
            "#{} - {} {} - {} BTC",
            tx.id,
            plan.emoji,
            tx.plan_type,
            format_btc_amount(tx.btc_amount)
        );
        reply = reply
            .button(button(&format!("✅ Approve {}", info), Action::ForceApprove(tx.id)))
            .button(button(&format!("❌ Reject {}", info), Action::ForceReject(tx.id)));
    }
    reply.button(back_to_panel())
}

pub fn plan_breakdown(rows: &[PlanBreakdown], now: DateTime<Utc>) -> Reply {
    let mut text = format!("📊 *Plan Breakdown* (Updated: {})\n\n", stamp(now));

    for row in rows {
        let plan = plan_config(row.plan_type, "");
        text.push_str(&format!("{} *{}*\n", plan.emoji, plan.name));
        text.push_str(&format!("Total Transactions: {}\n", row.total));
        text.push_str(&format!("✅ Confirmed: {}\n", row.confirmed));
        text.push_str(&format!("⏳ Pending: {}\n", row.pending));
        text.push_str(&format!("❌ Expired: {}\n", row.expired));
        text.push_str(&format!("💰 Revenue: {}\n\n", format_currency(row.revenue)));
    }
    if rows.is_empty() {
        text.push_str("No transaction data available.");
    }

    Reply::markdown(text)
        .button(refresh(&Action::AdminPlanBreakdown.callback_data()))
        .button(back(&Action::AdminProfits.callback_data()))
}

pub fn alerts(unpaid: &[UnpaidUser], expired: &[ExpiredTransaction], now: DateTime<Utc>) -> Reply {
    let mut text = format!("🔔 *Admin Alerts* (Updated: {})\n\n", stamp(now));

    if !unpaid.is_empty() {
        text.push_str("⚠️ *Users Started but Not Paid (10min):*\n");
        for user in unpaid.iter().take(ALERTS_SHOWN) {
            text.push_str(&format!(
                "• {} ({}) - {}\n",
                escape_markdown(&user.first_name),
                escape_markdown(&format_username(user.username.as_deref())),
                user.user_id
            ));
        }
        text.push('\n');
    }

    if !expired.is_empty() {
        text.push_str("⏰ *Recently Expired (1hr):*\n");
        for tx in expired.iter().take(ALERTS_SHOWN) {
            let plan = plan_config(tx.plan_type, "");
            text.push_str(&format!(
                "• {} {} - {} BTC\n",
                plan.emoji,
                tx.plan_type,
                format_btc_amount(tx.btc_amount)
            ));
        }
        text.push('\n');
    }

    if unpaid.is_empty() && expired.is_empty() {
        text.push_str("✅ No recent alerts.");
    }

    Reply::markdown(text)
        .button(refresh(&Action::AdminAlerts.callback_data()))
        .button(back_to_panel())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::{PlanType, TransactionStatus};
    use chrono::{Duration, TimeZone};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 9, 5, 0).unwrap()
    }

    fn tx(id: i64) -> Transaction {
        Transaction {
            id,
            user_id: 100 + id,
            plan_type: PlanType::Vip2,
            btc_address: format!("bc1qaddress{}", id),
            btc_amount: 0.00108696,
            usd_amount: 100.0,
            btc_rate: 92_000.0,
            status: TransactionStatus::Pending,
            created_at: now(),
            expires_at: now() + Duration::minutes(30),
            confirmed_at: None,
        }
    }

    #[test]
    fn test_panel_keyboard() {
        let reply = panel("Root");
        assert_eq!(
            reply.callbacks(),
            vec![
                "admin_users",
                "admin_profits",
                "admin_pending",
                "admin_stats",
                "admin_force",
                "admin_alerts",
                "back_to_main"
            ]
        );
    }

    #[test]
    fn test_users_table_truncates() {
        let rows: Vec<UserOverview> = (0..25)
            .map(|i| UserOverview {
                user_id: 1_000_000_000 + i,
                username: Some("a_very_long_username".to_string()),
                first_name: "U".to_string(),
                created_at: now(),
                plan_type: None,
                status: None,
                btc_amount: None,
            })
            .collect();
        let reply = users(&rows, 25, now());
        assert!(reply.text.contains("10000000 @a_very_long None   N/A        0.00000000"));
        assert!(reply.text.ends_with("... and 5 more users"));
    }

    #[test]
    fn test_profits_pnl() {
        let profits_row = Profits {
            count: 2,
            total_btc: 0.01,
            total_usd: 900.0,
        };
        let reply = profits(&profits_row, 100_000.0, now());
        assert!(reply.text.contains("Current BTC Value: $1,000.00"));
        assert!(reply.text.contains("📈 P&L: $100.00"));

        let loss = profits(&profits_row, 50_000.0, now());
        assert!(loss.text.contains("📉 P&L: -$400.00"));
    }

    #[test]
    fn test_force_actions_buttons() {
        let txs: Vec<Transaction> = (1..=7).map(tx).collect();
        let reply = force_actions(&txs);
        let callbacks = reply.callbacks();
        assert_eq!(callbacks.len(), 11);
        assert_eq!(callbacks[0], "force_approve_1");
        assert_eq!(callbacks[1], "force_reject_1");
        assert_eq!(callbacks[10], "admin_back");
        assert!(reply.keyboard[0][0].text.starts_with("✅ Approve #1 - 🥈 VIP2 - 0.001087 BTC"));

        let empty = force_actions(&[]);
        assert!(empty.text.contains("No pending transactions to manage."));
    }

    #[test]
    fn test_pending_minutes_left() {
        let reply = pending(&[tx(3)], now() + Duration::seconds(90));
        assert!(reply.text.contains("*1. Transaction #3*"));
        assert!(reply.text.contains("Expires in: 28m"));
    }

    #[test]
    fn test_statistics_conversion() {
        let stats = Statistics {
            sales: vec![PlanSales {
                plan_type: PlanType::Vip1,
                count: 3,
                total_usd: 150.0,
            }],
            total_signups: 12,
            total_payments: 3,
            signups: vec![DailySignups {
                date: "2025-06-01".to_string(),
                signups: 4,
            }],
            activity: vec![HourlyActivity { hour: 7, count: 30 }],
        };
        let reply = statistics(&stats, now());
        assert!(reply.text.contains("🥉 VIP1: 3 (100.0%)"));
        assert!(reply.text.contains("*Conversion Rate:* 25.0%"));
        assert!(reply.text.contains("2025-06-01: 4 signups"));
        assert!(reply.text.contains(&format!("07:00 {} 30", "█".repeat(20))));
    }

    #[test]
    fn test_alerts_empty_and_escaped() {
        assert!(alerts(&[], &[], now()).text.contains("✅ No recent alerts."));

        let unpaid = vec![UnpaidUser {
            user_id: 5,
            username: None,
            first_name: "Ann".to_string(),
            created_at: now(),
        }];
        let reply = alerts(&unpaid, &[], now());
        assert!(reply.text.contains("• Ann (no\\_username) - 5"));
    }

    #[test]
    fn test_breakdown_back_goes_to_profits() {
        let reply = plan_breakdown(&[], now());
        assert!(reply.text.contains("No transaction data available."));
        assert_eq!(reply.callbacks(), vec!["admin_plan_breakdown", "admin_profits"]);
    }
}
