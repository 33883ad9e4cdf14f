//! Background payment checks and admin alerts

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};

use super::payment_service::PaymentService;
use crate::application::errors::BotError;
use crate::application::views::notify::{self, ConfirmedBy};
use crate::domain::entities::{Transaction, TransactionStatus};
use crate::domain::traits::{Bot, Reply};
use crate::infrastructure::config::Config;
use crate::infrastructure::logging::mask_address;

const UNPAID_ALERT_LIMIT: i64 = 5;

/// What a single balance check decided
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CheckOutcome {
    Confirmed,
    DoubleSpend,
    Partial(f64),
    Waiting,
    /// Confirmed elsewhere between listing and checking
    AlreadySettled,
}

pub struct PaymentChecker {
    payments: Arc<PaymentService>,
    bot: Arc<dyn Bot>,
    config: Arc<Config>,
}

impl PaymentChecker {
    pub fn new(payments: Arc<PaymentService>, bot: Arc<dyn Bot>, config: Arc<Config>) -> Self {
        Self {
            payments,
            bot,
            config,
        }
    }

    /// One pass of the payment job
    pub async fn check_payments(&self, now: DateTime<Utc>) -> Result<(), BotError> {
        let pending = self.payments.db().pending_transactions()?;
        tracing::info!("Checking {} pending payment(s)", pending.len());

        for tx in &pending {
            if let Err(e) = self.check_single(tx, now).await {
                tracing::error!("Error checking payment {}: {}", tx.id, e);
            }
        }

        self.handle_expired(now).await?;

        let expired = self.payments.db().expire_subscriptions(now)?;
        if expired > 0 {
            tracing::info!("Expired {} subscription(s)", expired);
        }
        Ok(())
    }

    pub async fn check_single(&self, tx: &Transaction, now: DateTime<Utc>) -> Result<CheckOutcome, BotError> {
        let chain = self.payments.chain();
        let balance = chain.address_balance(&tx.btc_address).await;
        tracing::debug!(
            "Transaction {}: {} holds {:.8} of {:.8} BTC",
            tx.id,
            mask_address(&tx.btc_address),
            balance,
            tx.btc_amount
        );

        if balance >= tx.btc_amount {
            if chain.double_spend_suspected(&tx.btc_address, tx.btc_amount).await {
                tracing::warn!("Double spend detected for transaction {}", tx.id);
                self.notify(self.config.bot.admin_user_id, &notify::double_spend_alert(tx))
                    .await;
                return Ok(CheckOutcome::DoubleSpend);
            }

            let Some(sub) = self.payments.confirm(tx, now)? else {
                return Ok(CheckOutcome::AlreadySettled);
            };
            let reply = notify::payment_confirmed(&self.config, tx, sub.expires_at, ConfirmedBy::Chain);
            self.notify(tx.user_id, &reply).await;
            return Ok(CheckOutcome::Confirmed);
        }

        if balance > 0.0 {
            self.notify(tx.user_id, &notify::partial_payment(tx, balance))
                .await;
            return Ok(CheckOutcome::Partial(balance));
        }

        Ok(CheckOutcome::Waiting)
    }

    /// Close every overdue pending transaction and tell its owner
    pub async fn handle_expired(&self, now: DateTime<Utc>) -> Result<usize, BotError> {
        let db = self.payments.db();
        let mut handled = 0;

        for tx in db.expired_pending(now)? {
            let balance = self.payments.chain().address_balance(&tx.btc_address).await;

            if !db.finish_pending(tx.id, TransactionStatus::Expired, now)? {
                continue;
            }
            if balance == 0.0 {
                db.release_address(&tx.btc_address)?;
            }
            handled += 1;

            tracing::info!("Transaction {} expired", tx.id);
            self.notify(tx.user_id, &notify::payment_expired(&self.config, tx.plan_type))
                .await;
        }
        Ok(handled)
    }

    /// One pass of the alert job
    pub async fn run_alerts(&self, now: DateTime<Utc>) -> Result<(), BotError> {
        let db = self.payments.db();

        let unpaid = db.unpaid_users(
            now - Duration::minutes(15),
            now - Duration::minutes(10),
            UNPAID_ALERT_LIMIT,
        )?;
        if !unpaid.is_empty() {
            tracing::info!("Alerting admin about {} unpaid user(s)", unpaid.len());
            self.notify(self.config.bot.admin_user_id, &notify::unpaid_users_alert(&unpaid))
                .await;
        }

        let confirmed = db.confirmed_between(now - Duration::minutes(40), now - Duration::minutes(35))?;
        for tx in confirmed {
            self.notify(
                tx.user_id,
                &notify::double_spend_reminder(&self.config, tx.plan_type),
            )
            .await;
        }
        Ok(())
    }

    /// Failures are logged, a blocked user must not stall the job
    async fn notify(&self, chat_id: i64, reply: &Reply) {
        if let Err(e) = self.bot.send(chat_id, reply).await {
            tracing::error!("Failed to notify {}: {}", chat_id, e);
        }
    }
}
