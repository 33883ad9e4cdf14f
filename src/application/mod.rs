//! Application layer - Use cases and business logic
//!
//! This layer contains:
//! - Services: Payment workflow and background checks
//! - Views: Screens and notifications
//! - Errors: Domain-specific errors
//! - Messaging: Message parsing and dispatching

pub mod errors;
pub mod format;
pub mod messaging;
pub mod services;
pub mod views;
