//! VIP subscription bot paid in Bitcoin
//!
//! Users pick a plan, get a quoted BTC amount and a deposit address from a
//! pre-loaded pool, and receive their VIP invite once the payment shows up
//! on chain. Admins watch sales and override payments from an inline panel.

pub mod application;
pub mod domain;
pub mod infrastructure;
