//! Domain layer - Core business logic with no external dependencies
//!
//! This layer contains:
//! - Entities: plans, transactions, subscriptions, users and incoming messages
//! - Traits: Abstractions for infrastructure (Bot, ChainClient)

pub mod entities;
pub mod traits;
