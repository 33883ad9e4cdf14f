use async_trait::async_trait;

/// Read-only view of the Bitcoin network used by the payment flow.
///
/// Implementations never fail outright: price lookups fall back to a configured
/// price, balance lookups fall back to zero, and the double-spend check reports
/// `true` whenever it cannot decide.
#[async_trait]
pub trait ChainClient: Send + Sync {
    /// Current BTC price in USD
    async fn btc_price(&self) -> f64;

    /// Confirmed + unconfirmed balance of `address` in BTC
    async fn address_balance(&self, address: &str) -> f64;

    /// Whether more than one incoming payment of `expected` BTC hit `address`
    async fn double_spend_suspected(&self, address: &str, expected: f64) -> bool;
}
