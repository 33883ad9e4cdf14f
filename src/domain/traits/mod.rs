//! Domain traits - Abstractions for infrastructure implementations

pub mod bot;
pub mod chain;

pub use bot::{Bot, BotInfo, KeyboardButton, ParseMode, Reply};
pub use chain::ChainClient;
