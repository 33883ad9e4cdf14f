//! Application services - Business logic orchestration

pub mod payment_checker;
pub mod payment_service;

pub use payment_checker::{CheckOutcome, PaymentChecker};
pub use payment_service::{quote_btc, PaymentService, PurchaseOutcome};
