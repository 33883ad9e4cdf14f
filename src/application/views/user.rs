//! Customer-facing screens

use chrono::{DateTime, Utc};

use super::{back, refresh, stamp};
use crate::application::format::{
    escape_markdown, format_btc_amount, format_btc_exact, format_currency, format_time_remaining,
    format_username,
};
use crate::application::messaging::Action;
use crate::domain::entities::{Payment, PlanType, Sender, Subscription, Transaction};
use crate::domain::traits::{KeyboardButton, Reply};
use crate::infrastructure::config::Config;

const RECENT_TRANSACTIONS: usize = 3;

fn button(text: &str, action: Action) -> KeyboardButton {
    KeyboardButton::callback(text, action.callback_data())
}

pub fn main_menu(first_name: &str) -> Reply {
    Reply::text(format!("Hello {} 👋\nWelcome to our VIP service.", first_name))
        .button(button("📊 Compare Plans", Action::ComparePlans))
        .button(button("💼 Dashboard", Action::Dashboard))
        .button(button("❌ Cancel Plan", Action::CancelPlan))
        .button(button("🆘 Support", Action::Support))
}

pub fn compare_plans(config: &Config) -> Reply {
    let plans: Vec<_> = PlanType::all().into_iter().map(|p| config.plan(p)).collect();

    let mut text = "🎯 *Choose Your VIP Plan:*\n\n".to_string();
    for plan in &plans {
        text.push_str(&format!(
            "{} *{}*: {} / {}\n",
            plan.emoji,
            plan.name,
            format_currency(plan.price_usd),
            plan.duration_label()
        ));
    }

    let mut reply = Reply::markdown(text);
    for plan in &plans {
        reply = reply.button(button(
            &format!("💳 Buy {} {}", plan.name, plan.emoji),
            Action::Buy(plan.plan),
        ));
    }
    reply.button(back(&Action::BackToMain.callback_data()))
}

pub fn dashboard(
    config: &Config,
    active: Option<&Subscription>,
    transactions: &[Transaction],
    now: DateTime<Utc>,
) -> Reply {
    let mut text = format!("💼 Your Dashboard (Updated: {})\n\n", stamp(now));

    match active {
        Some(sub) => {
            let plan = config.plan(sub.plan_type);
            text.push_str("✅ Active Subscription:\n");
            text.push_str(&format!("Plan: {}\n", plan.title()));
            text.push_str("Status: Active\n");
            match sub.expires_at {
                Some(expires) => {
                    text.push_str(&format!("Expires: {}\n", expires.format("%Y-%m-%d %H:%M")))
                }
                None => text.push_str("Expires: Never (Lifetime)\n"),
            }
            if !plan.link.is_empty() {
                text.push_str(&format!("\n🔗 Your VIP Access: {}\n", plan.link));
            }
        }
        None => text.push_str("❌ No Active Subscription\n"),
    }

    text.push_str("\n📊 Recent Transactions:\n");
    if transactions.is_empty() {
        text.push_str("No transactions found.\n");
    }
    for (i, tx) in transactions.iter().take(RECENT_TRANSACTIONS).enumerate() {
        let plan = config.plan(tx.plan_type);
        text.push_str(&format!("\n{}. {} {}\n", i + 1, plan.emoji, tx.plan_type));
        text.push_str(&format!(
            "   Amount: {} BTC ({})\n",
            format_btc_amount(tx.btc_amount),
            format_currency(tx.usd_amount)
        ));
        text.push_str(&format!("   Status: {} {}\n", tx.status.emoji(), tx.status.title()));
        text.push_str(&format!("   Date: {}\n", tx.created_at.format("%Y-%m-%d %H:%M")));
    }

    Reply::text(text)
        .button(refresh(&Action::Refresh.callback_data()))
        .button(button("📌 View Pending", Action::ViewPending))
        .button(back(&Action::BackToMain.callback_data()))
}

pub fn pending_transaction(config: &Config, pending: Option<&Transaction>, now: DateTime<Utc>) -> Reply {
    let Some(tx) = pending else {
        return Reply::text(format!(
            "❌ No pending transactions found. (Updated: {})",
            stamp(now)
        ))
        .button(back(&Action::BackToMain.callback_data()));
    };

    let plan = config.plan(tx.plan_type);
    let time_left = tx.time_left(now);
    let (status, time_text) = if tx.is_expired(now) {
        ("❌ Expired", "This payment has expired.".to_string())
    } else {
        (
            "⏳ Pending Confirmation",
            format!("Time Left: {}", format_time_remaining(time_left)),
        )
    };

    let mut text = format!("📌 *Pending Transaction* (Updated: {})\n\n", stamp(now));
    text.push_str(&format!("Plan: {}\n", plan.title()));
    text.push_str(&format!("Amount: *{} BTC*\n", format_btc_exact(tx.btc_amount)));
    text.push_str(&format!("Address:\n`{}`\n\n", tx.btc_address));
    text.push_str(&format!("Status: {}\n", status));
    text.push_str(&format!("{}\n\n", time_text));
    text.push_str("💡 _Tap and hold the address above to copy, or use the Copy button below_\n");
    text.push_str(&format!("Created: {}", tx.created_at.format("%Y-%m-%d %H:%M")));

    Reply::markdown(text)
        .button(button("📋 Copy Address", Action::CopyAddress(tx.id)))
        .button(refresh(&Action::ViewPending.callback_data()))
        .button(button("❌ Cancel Transaction", Action::CancelPlan))
        .button(back(&Action::BackToMain.callback_data()))
}

pub fn payment_details(config: &Config, payment: &Payment) -> Reply {
    let plan = config.plan(payment.plan_type);
    let amount = format_btc_exact(payment.btc_amount);

    let mut text = "💳 *Payment Required*\n\n".to_string();
    text.push_str(&format!("Plan: {}\n", plan.title()));
    text.push_str(&format!(
        "Amount: {} BTC ({})\n",
        amount,
        format_currency(payment.usd_amount)
    ));
    text.push_str(&format!("BTC Rate: {}\n\n", format_currency(payment.btc_price)));
    text.push_str(&format!("Send exactly *{} BTC* to:\n\n", amount));
    text.push_str(&format!("`{}`\n\n", payment.btc_address));
    text.push_str(&format!(
        "⏰ Expires in {} minutes\n",
        config.payments.timeout_minutes
    ));
    text.push_str("💡 _Tap and hold the address above to copy, or use the Copy button below_\n");
    text.push_str("Payment will be automatically detected.");

    Reply::markdown(text)
        .button(button("📋 Copy Address", Action::CopyAddress(payment.id)))
        .button(button("📌 View Pending Transaction", Action::ViewPending))
        .button(back(&Action::ComparePlans.callback_data()))
}

pub fn support(config: &Config) -> Reply {
    let mut text = "🆘 *Support*\n\n".to_string();
    text.push_str("For assistance, please contact our support team:\n");
    text.push_str(&format!(
        "{}\n\n",
        escape_markdown(&format_username(Some(&config.bot.support_username)))
    ));
    text.push_str("Click the button below to start a chat.");

    Reply::markdown(text)
        .button(KeyboardButton::link("💬 Chat with Support", config.support_url()))
        .button(back(&Action::BackToMain.callback_data()))
}

pub fn admin_access_request(config: &Config) -> Reply {
    let mut text = "🔐 *Admin Access Request*\n\n".to_string();
    text.push_str(
        "To become an admin and control signals in groups, you must meet these requirements:\n\n",
    );
    text.push_str("✅ Have more than $5,000 USD in your trading account\n");
    text.push_str("✅ Have 3+ years of trading experience\n\n");
    text.push_str(
        "Please contact our admin with your achievements, trading experience, \
         and what you can offer to the community.",
    );

    Reply::markdown(text)
        .button(KeyboardButton::link("💬 Contact Admin", config.support_url()))
        .button(back(&Action::Dashboard.callback_data()))
}

/// Sent to the admin when someone asks for admin access
pub fn admin_access_notification(sender: &Sender, now: DateTime<Utc>) -> Reply {
    let mut text = "🔔 *New Admin Access Request*\n\n".to_string();
    text.push_str(&format!("User: {}\n", escape_markdown(&sender.full_name())));
    text.push_str(&format!(
        "Username: {}\n",
        escape_markdown(&format_username(sender.username.as_deref()))
    ));
    text.push_str(&format!("User ID: {}\n", sender.id));
    text.push_str(&format!("Requested at: {}", now.format("%Y-%m-%d %H:%M:%S")));
    Reply::markdown(text)
}

pub fn copy_address(address: &str) -> Reply {
    Reply::markdown(format!(
        "📋 *Copy this address:*\n\n`{}`\n\n💡 _Tap and hold the address above to copy it_",
        address
    ))
}

pub fn nothing_to_cancel() -> Reply {
    Reply::text("❌ No pending transactions to cancel.")
        .button(back(&Action::BackToMain.callback_data()))
}

pub fn cancelled() -> Reply {
    Reply::text("✅ All pending transactions have been cancelled.")
        .button(back(&Action::BackToMain.callback_data()))
}

pub fn already_subscribed(plan: PlanType) -> Reply {
    Reply::text(format!("❌ You already have an active {} subscription!", plan))
        .button(button("💼 Dashboard", Action::Dashboard))
}

pub fn payment_unavailable() -> Reply {
    Reply::text(
        "❌ Unable to create payment. You may already have an active subscription \
         or no addresses available.",
    )
    .button(back(&Action::ComparePlans.callback_data()))
}
