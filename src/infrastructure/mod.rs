//! Infrastructure layer - External concerns
//!
//! This layer contains:
//! - Config: Configuration loading
//! - Logging: Tracing setup
//! - Database: SQLite persistence
//! - Blockchain: BTC price and explorer clients
//! - Adapters: Platform integrations (Telegram)
//! - Scheduler: Periodic background jobs

pub mod adapters;
pub mod blockchain;
pub mod config;
pub mod database;
pub mod logging;
pub mod scheduler;
