//! Application layer errors

use thiserror::Error;

/// General bot errors
#[derive(Error, Debug)]
pub enum BotError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Telegram API error: {description}")]
    Telegram { description: String },

    /// Telegram refused an edit because nothing changed
    #[error("Message is not modified")]
    NotModified,

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Payment error: {0}")]
    Payment(#[from] PaymentError),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl BotError {
    /// Errors that mean "the screen already shows this", not a failure
    pub fn is_not_modified(&self) -> bool {
        matches!(self, BotError::NotModified)
    }
}

/// Payment workflow errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PaymentError {
    #[error("user already has an active subscription")]
    ActiveSubscription,

    #[error("user already has a pending transaction")]
    PendingTransaction,

    #[error("no BTC address available")]
    NoAddressAvailable,

    #[error("transaction {0} not found")]
    TransactionNotFound(i64),

    #[error("transaction {0} is not pending")]
    NotPending(i64),
}

/// Storage errors
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Invalid data: {0}")]
    InvalidData(String),

    #[error("Database lock poisoned")]
    Poisoned,
}

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid value: {0}")]
    InvalidValue(String),

    #[error("Parse error: {0}")]
    Parse(String),
}
