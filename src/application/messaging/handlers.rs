//! Customer button handlers

use chrono::{DateTime, Utc};

use super::dispatcher::{Answer, MessageDispatcher, Outcome};
use super::parser::Action;
use crate::application::errors::BotError;
use crate::application::services::PurchaseOutcome;
use crate::application::views::user;
use crate::domain::entities::{IncomingMessage, PlanType};

impl MessageDispatcher {
    pub(super) async fn handle_user(
        &self,
        msg: &IncomingMessage,
        action: Action,
        now: DateTime<Utc>,
    ) -> Result<Outcome, BotError> {
        let user_id = msg.sender.id;
        let db = self.payments.db();

        match action {
            Action::BackToMain => Ok(Outcome::screen(user::main_menu(&msg.sender.first_name))),
            Action::ComparePlans => Ok(Outcome::screen(user::compare_plans(&self.config))),
            Action::Dashboard | Action::Refresh => {
                let active = db.active_subscription(user_id, now)?;
                let transactions = db.user_transactions(user_id)?;
                Ok(Outcome::screen(user::dashboard(
                    &self.config,
                    active.as_ref(),
                    &transactions,
                    now,
                )))
            }
            Action::ViewPending => {
                let pending = db.pending_transaction_for(user_id)?;
                Ok(Outcome::screen(user::pending_transaction(
                    &self.config,
                    pending.as_ref(),
                    now,
                )))
            }
            Action::CancelPlan => {
                let cancelled = self.payments.cancel_pending(user_id, now).await?;
                if cancelled == 0 {
                    Ok(Outcome::screen(user::nothing_to_cancel()))
                } else {
                    Ok(Outcome::screen(user::cancelled()))
                }
            }
            Action::Support => Ok(Outcome::screen(user::support(&self.config))),
            Action::Buy(plan) => self.buy(msg, plan, now).await,
            Action::CopyAddress(tx_id) => {
                let tx = db.get_transaction(tx_id)?.filter(|tx| tx.user_id == user_id);
                match tx {
                    Some(tx) => Ok(Outcome::follow_up(user::copy_address(&tx.btc_address))
                        .with_answer(Answer::toast("📋 Address sent! Tap and hold to copy."))),
                    None => Ok(Outcome::answer(Answer::alert("Transaction not found"))),
                }
            }
            Action::RequestAdminAccess => {
                let admin = self.config.bot.admin_user_id;
                let notice = user::admin_access_notification(&msg.sender, now);
                if let Err(e) = self.bot.send(admin, &notice).await {
                    tracing::error!("Failed to forward admin access request from {}: {}", user_id, e);
                }
                Ok(Outcome::screen(user::admin_access_request(&self.config)))
            }
            admin_only => Err(BotError::PermissionDenied(format!("{:?}", admin_only))),
        }
    }

    async fn buy(&self, msg: &IncomingMessage, plan: PlanType, now: DateTime<Utc>) -> Result<Outcome, BotError> {
        let screen = match self.payments.begin_purchase(&msg.sender, plan, now).await? {
            PurchaseOutcome::AlreadySubscribed(active) => user::already_subscribed(active),
            PurchaseOutcome::Existing(payment) | PurchaseOutcome::Created(payment) => {
                user::payment_details(&self.config, &payment)
            }
            PurchaseOutcome::Unavailable(_) => user::payment_unavailable(),
        };
        Ok(Outcome::screen(screen))
    }
}
