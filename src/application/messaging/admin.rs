//! Admin panel handlers. Callers have already checked the admin id.

use chrono::{DateTime, Duration, Utc};

use super::dispatcher::{Answer, MessageDispatcher, Outcome};
use super::parser::Action;
use crate::application::errors::{BotError, PaymentError};
use crate::application::views::admin::{self, Statistics, USERS_SHOWN};
use crate::application::views::notify::{self, ConfirmedBy};
use crate::domain::entities::IncomingMessage;
use crate::domain::traits::Reply;

const ALERT_LIMIT: i64 = 5;

impl MessageDispatcher {
    pub(super) async fn handle_admin(
        &self,
        msg: &IncomingMessage,
        action: Action,
        now: DateTime<Utc>,
    ) -> Result<Outcome, BotError> {
        let db = self.payments.db();

        let screen = match action {
            Action::AdminBack => admin::panel(&msg.sender.first_name),
            Action::AdminUsers => {
                let users = db.recent_users(USERS_SHOWN as i64)?;
                admin::users(&users, db.total_users()?, now)
            }
            Action::AdminProfits => {
                let price = self.payments.chain().btc_price().await;
                admin::profits(&db.profits()?, price, now)
            }
            Action::AdminPending => admin::pending(&db.pending_transactions()?, now),
            Action::AdminStats => {
                let week_ago = now - Duration::days(7);
                let stats = Statistics {
                    sales: db.sales_by_plan()?,
                    total_signups: db.total_users()?,
                    total_payments: db.confirmed_count()?,
                    signups: db.signups_by_day(week_ago)?,
                    activity: db.activity_by_hour(week_ago)?,
                };
                admin::statistics(&stats, now)
            }
            Action::AdminForce => admin::force_actions(&db.pending_transactions()?),
            Action::AdminPlanBreakdown => admin::plan_breakdown(&db.plan_breakdown()?, now),
            Action::AdminAlerts => {
                let unpaid = db.unpaid_users(now - Duration::minutes(10), now, ALERT_LIMIT)?;
                let expired = db.recently_expired(now - Duration::hours(1), ALERT_LIMIT)?;
                admin::alerts(&unpaid, &expired, now)
            }
            Action::ForceApprove(tx_id) => return self.force_approve(tx_id, now).await,
            Action::ForceReject(tx_id) => return self.force_reject(tx_id, now).await,
            other => return Err(BotError::Internal(format!("{:?} is not an admin action", other))),
        };
        Ok(Outcome::screen(screen))
    }

    async fn force_approve(&self, tx_id: i64, now: DateTime<Utc>) -> Result<Outcome, BotError> {
        let (tx, sub) = match self.payments.force_approve(tx_id, now) {
            Ok(done) => done,
            Err(e) => return self.force_failed(e),
        };

        let reply = notify::payment_confirmed(&self.config, &tx, sub.expires_at, ConfirmedBy::Admin);
        self.notify_user(tx.user_id, &reply).await;

        self.refreshed_force_list(Answer::alert("✅ Transaction approved successfully!"))
    }

    async fn force_reject(&self, tx_id: i64, now: DateTime<Utc>) -> Result<Outcome, BotError> {
        let tx = match self.payments.force_reject(tx_id, now).await {
            Ok(tx) => tx,
            Err(e) => return self.force_failed(e),
        };

        let reply = notify::payment_rejected(&self.config, tx.plan_type);
        self.notify_user(tx.user_id, &reply).await;

        self.refreshed_force_list(Answer::alert("❌ Transaction rejected successfully!"))
    }

    /// Lookup failures become popups; anything else is a real error
    fn force_failed(&self, err: BotError) -> Result<Outcome, BotError> {
        match err {
            BotError::Payment(PaymentError::TransactionNotFound(_)) => {
                Ok(Outcome::answer(Answer::alert("Transaction not found")))
            }
            BotError::Payment(PaymentError::NotPending(_)) => {
                Ok(Outcome::answer(Answer::alert("Transaction is not pending")))
            }
            other => Err(other),
        }
    }

    fn refreshed_force_list(&self, answer: Answer) -> Result<Outcome, BotError> {
        let pending = self.payments.db().pending_transactions()?;
        Ok(Outcome::screen(admin::force_actions(&pending)).with_answer(answer))
    }

    async fn notify_user(&self, user_id: i64, reply: &Reply) {
        if let Err(e) = self.bot.send(user_id, reply).await {
            tracing::error!("Failed to notify user {}: {}", user_id, e);
        }
    }
}
