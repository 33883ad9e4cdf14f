//! Payment service - Quoting, confirming and cancelling VIP payments

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};

use crate::application::errors::{BotError, PaymentError};
use crate::domain::entities::{
    Payment, PlanType, Sender, Subscription, Transaction, TransactionStatus,
};
use crate::domain::traits::ChainClient;
use crate::infrastructure::config::Config;
use crate::infrastructure::database::{Database, NewPayment, Reservation};

const SATS_PER_BTC: f64 = 100_000_000.0;

/// What happened when a user pressed a buy button
#[derive(Debug, Clone, PartialEq)]
pub enum PurchaseOutcome {
    /// The user already has an active subscription to this plan
    AlreadySubscribed(PlanType),
    /// A pending payment for the same plan is reused
    Existing(Payment),
    Created(Payment),
    Unavailable(PaymentError),
}

/// BTC to ask for, rounded up to a whole satoshi so the payment never falls short
pub fn quote_btc(usd: f64, btc_price: f64) -> f64 {
    (usd / btc_price * SATS_PER_BTC).ceil() / SATS_PER_BTC
}

pub struct PaymentService {
    db: Arc<Database>,
    chain: Arc<dyn ChainClient>,
    config: Arc<Config>,
}

impl PaymentService {
    pub fn new(db: Arc<Database>, chain: Arc<dyn ChainClient>, config: Arc<Config>) -> Self {
        Self { db, chain, config }
    }

    pub fn db(&self) -> &Database {
        &self.db
    }

    pub fn chain(&self) -> &dyn ChainClient {
        self.chain.as_ref()
    }

    /// Quote a new payment and reserve an address for it
    pub fn create_payment(
        &self,
        user_id: i64,
        plan: PlanType,
        btc_price: f64,
        now: DateTime<Utc>,
    ) -> Result<Payment, BotError> {
        if self.db.active_subscription(user_id, now)?.is_some() {
            return Err(PaymentError::ActiveSubscription.into());
        }

        let usd = self.config.plan(plan).price_usd;
        let new = NewPayment {
            user_id,
            plan_type: plan,
            btc_amount: quote_btc(usd, btc_price),
            usd_amount: usd,
            btc_rate: btc_price,
            expires_at: now + Duration::minutes(self.config.payments.timeout_minutes),
        };

        match self.db.reserve_payment(&new, now)? {
            Reservation::Created(tx) => {
                tracing::info!(
                    "Created transaction {} for user {} ({}, {:.8} BTC)",
                    tx.id,
                    user_id,
                    plan,
                    tx.btc_amount
                );
                Ok(Payment::from(&tx))
            }
            Reservation::HasPending => Err(PaymentError::PendingTransaction.into()),
            Reservation::NoAddress => {
                tracing::error!("No BTC addresses available for user {}", user_id);
                Err(PaymentError::NoAddressAvailable.into())
            }
        }
    }

    /// Confirm a pending transaction and open the subscription it pays for.
    /// Returns `None` when someone else already settled it.
    pub fn confirm(&self, tx: &Transaction, now: DateTime<Utc>) -> Result<Option<Subscription>, BotError> {
        let expires = self.config.plan(tx.plan_type).subscription_expiry(now);
        let sub = self.db.confirm_transaction(tx.id, expires, now)?;
        if sub.is_some() {
            tracing::info!("Transaction {} confirmed for user {}", tx.id, tx.user_id);
        }
        Ok(sub)
    }

    /// Admin override: confirm without looking at the chain
    pub fn force_approve(&self, tx_id: i64, now: DateTime<Utc>) -> Result<(Transaction, Subscription), BotError> {
        let tx = self.pending(tx_id)?;
        let sub = self
            .confirm(&tx, now)?
            .ok_or(PaymentError::NotPending(tx_id))?;
        tracing::info!("Transaction {} force-approved", tx_id);
        Ok((tx, sub))
    }

    /// Admin override: cancel and hand an unfunded address back to the pool
    pub async fn force_reject(&self, tx_id: i64, now: DateTime<Utc>) -> Result<Transaction, BotError> {
        let tx = self.pending(tx_id)?;
        if !self.db.finish_pending(tx_id, TransactionStatus::Cancelled, now)? {
            return Err(PaymentError::NotPending(tx_id).into());
        }
        self.release_if_empty(&tx).await?;
        tracing::info!("Transaction {} force-rejected", tx_id);
        Ok(tx)
    }

    /// Return the address of a finished transaction to the pool unless it holds
    /// funds. A funded address would confirm the next payment assigned to it.
    async fn release_if_empty(&self, tx: &Transaction) -> Result<bool, BotError> {
        if self.chain.address_balance(&tx.btc_address).await == 0.0 {
            self.db.release_address(&tx.btc_address)?;
            return Ok(true);
        }
        tracing::warn!(
            "Address of transaction {} holds funds, keeping it out of the pool",
            tx.id
        );
        Ok(false)
    }

    fn pending(&self, tx_id: i64) -> Result<Transaction, BotError> {
        let tx = self
            .db
            .get_transaction(tx_id)?
            .ok_or(PaymentError::TransactionNotFound(tx_id))?;
        if !tx.is_pending() {
            return Err(PaymentError::NotPending(tx_id).into());
        }
        Ok(tx)
    }

    /// Buy-button flow: reuse, replace or create the user's pending payment
    pub async fn begin_purchase(
        &self,
        sender: &Sender,
        plan: PlanType,
        now: DateTime<Utc>,
    ) -> Result<PurchaseOutcome, BotError> {
        self.db
            .upsert_user(sender.id, sender.username.as_deref(), &sender.first_name, now)?;

        if let Some(sub) = self.db.active_subscription(sender.id, now)? {
            return Ok(PurchaseOutcome::AlreadySubscribed(sub.plan_type));
        }

        if let Some(pending) = self.db.pending_transaction_for(sender.id)? {
            if pending.plan_type == plan && !pending.is_expired(now) {
                return Ok(PurchaseOutcome::Existing(Payment::from(&pending)));
            }
            tracing::info!(
                "User {} switched from {} to {}, cancelling transaction {}",
                sender.id,
                pending.plan_type,
                plan,
                pending.id
            );
            if self.db.finish_pending(pending.id, TransactionStatus::Cancelled, now)? {
                self.release_if_empty(&pending).await?;
            }
        }

        let price = self.chain.btc_price().await;
        match self.create_payment(sender.id, plan, price, now) {
            Ok(payment) => Ok(PurchaseOutcome::Created(payment)),
            Err(BotError::Payment(reason)) => {
                tracing::warn!("Payment for user {} unavailable: {}", sender.id, reason);
                Ok(PurchaseOutcome::Unavailable(reason))
            }
            Err(e) => Err(e),
        }
    }

    /// Cancel everything the user has pending. An address goes back to the
    /// pool only when nothing was sent to it.
    pub async fn cancel_pending(&self, user_id: i64, now: DateTime<Utc>) -> Result<usize, BotError> {
        let pending: Vec<Transaction> = self
            .db
            .user_transactions(user_id)?
            .into_iter()
            .filter(Transaction::is_pending)
            .collect();

        let mut cancelled = 0;
        for tx in pending {
            if !self.db.finish_pending(tx.id, TransactionStatus::Cancelled, now)? {
                continue;
            }
            cancelled += 1;
            self.release_if_empty(&tx).await?;
        }

        if cancelled > 0 {
            tracing::info!("User {} cancelled {} pending transaction(s)", user_id, cancelled);
        }
        Ok(cancelled)
    }
}
