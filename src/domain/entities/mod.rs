//! Domain entities - Core business objects with no external dependencies

pub mod message;
pub mod plan;
pub mod subscription;
pub mod transaction;
pub mod user;

pub use message::{Content, IncomingMessage};
pub use plan::{plan_config, PlanConfig, PlanType};
pub use subscription::{Subscription, SubscriptionStatus};
pub use transaction::{Payment, Transaction, TransactionStatus};
pub use user::{BotUser, Sender};
