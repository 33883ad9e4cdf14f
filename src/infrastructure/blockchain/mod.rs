//! Bitcoin price and explorer lookups
//!
//! Every lookup walks a list of configured sources in order and takes the first
//! usable answer. Failures are logged with masked addresses and never surface to
//! callers; see [`ChainClient`] for the fallback rules.

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex_lite::Regex;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;

use crate::domain::traits::ChainClient;
use crate::infrastructure::config::Config;
use crate::infrastructure::logging::mask_address;

const SATOSHIS_PER_BTC: f64 = 100_000_000.0;

/// Incoming payments closer than this to the expected amount count as a match
const DOUBLE_SPEND_TOLERANCE: f64 = 0.00001;

/// Shortest string worth sending to an explorer
const MIN_ADDRESS_LEN: usize = 26;

const PRICE_TIMEOUT: Duration = Duration::from_secs(10);
const BALANCE_TIMEOUT: Duration = Duration::from_secs(15);
const HISTORY_TIMEOUT: Duration = Duration::from_secs(10);

static BTC_ADDRESS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[13][a-km-zA-HJ-NP-Z1-9]{25,34}$|^bc1[a-z0-9]{39,59}$")
        .unwrap_or_else(|e| panic!("invalid address pattern: {}", e))
});

/// Legacy (`1…`, `3…`) or bech32 (`bc1…`) mainnet address
pub fn validate_btc_address(address: &str) -> bool {
    BTC_ADDRESS.is_match(address)
}

/// Read a JSON number, or a string holding one
fn number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Response shape of a price endpoint, chosen from its URL
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PriceFormat {
    CoinGecko,
    Binance,
    CoinCap,
    CryptoCompare,
    CoinDesk,
    Bitfinex,
    Kraken,
    Last,
    Bittrex,
    Huobi,
    KuCoin,
    Okx,
    Bybit,
    CryptoCom,
    Bitget,
    Phemex,
    Generic,
}

impl PriceFormat {
    pub fn from_url(url: &str) -> Self {
        const RULES: &[(&str, PriceFormat)] = &[
            ("coingecko", PriceFormat::CoinGecko),
            ("binance", PriceFormat::Binance),
            ("coincap", PriceFormat::CoinCap),
            ("cryptocompare", PriceFormat::CryptoCompare),
            ("coindesk", PriceFormat::CoinDesk),
            ("bitfinex", PriceFormat::Bitfinex),
            ("kraken", PriceFormat::Kraken),
            ("bitstamp", PriceFormat::Last),
            ("gemini", PriceFormat::Last),
            ("bittrex", PriceFormat::Bittrex),
            ("huobi", PriceFormat::Huobi),
            ("kucoin", PriceFormat::KuCoin),
            ("gate.io", PriceFormat::Last),
            ("okx", PriceFormat::Okx),
            ("mexc", PriceFormat::Binance),
            ("bybit", PriceFormat::Bybit),
            ("crypto.com", PriceFormat::CryptoCom),
            ("bitget", PriceFormat::Bitget),
            ("phemex", PriceFormat::Phemex),
        ];

        RULES
            .iter()
            .find(|(needle, _)| url.contains(needle))
            .map(|(_, format)| *format)
            .unwrap_or(PriceFormat::Generic)
    }

    /// Pull the USD price out of a response body
    pub fn extract(&self, data: &Value) -> Option<f64> {
        match self {
            PriceFormat::CoinGecko => number(data.pointer("/bitcoin/usd")?),
            PriceFormat::Binance => number(data.get("price")?),
            PriceFormat::CoinCap => number(data.pointer("/data/priceUsd")?),
            PriceFormat::CryptoCompare => number(data.get("USD")?),
            PriceFormat::CoinDesk => number(data.pointer("/bpi/USD/rate_float")?),
            PriceFormat::Bitfinex => number(data.get("last_price")?),
            PriceFormat::Kraken => {
                let pair = data.get("result")?.as_object()?.values().next()?;
                number(pair.pointer("/c/0")?)
            }
            PriceFormat::Last => number(data.get("last")?),
            PriceFormat::Bittrex => number(data.get("lastTradeRate")?),
            PriceFormat::Huobi => number(data.pointer("/tick/close")?),
            PriceFormat::KuCoin => number(data.pointer("/data/price")?),
            PriceFormat::Okx => number(data.pointer("/data/0/last")?),
            PriceFormat::Bybit => number(data.pointer("/result/0/last_price")?),
            PriceFormat::CryptoCom => number(data.pointer("/result/data/0/a")?),
            PriceFormat::Bitget => number(data.pointer("/data/close")?),
            // scaled by 10^4
            PriceFormat::Phemex => number(data.pointer("/result/close")?).map(|p| p / 10_000.0),
            PriceFormat::Generic => ["price", "last", "rate"]
                .iter()
                .find_map(|key| data.get(*key).and_then(number)),
        }
    }
}

/// Explorer flavour, chosen from its base URL
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BalanceFormat {
    /// Blockstream and mempool.space: list of UTXOs
    Esplora,
    BlockCypher,
    BlockchainInfo,
    Blockchair,
}

impl BalanceFormat {
    /// `None` for explorers we do not know how to query
    pub fn from_url(url: &str) -> Option<Self> {
        if url.contains("blockstream") || url.contains("mempool.space") {
            Some(BalanceFormat::Esplora)
        } else if url.contains("blockcypher") {
            Some(BalanceFormat::BlockCypher)
        } else if url.contains("blockchain.info") {
            Some(BalanceFormat::BlockchainInfo)
        } else if url.contains("blockchair") {
            Some(BalanceFormat::Blockchair)
        } else {
            None
        }
    }

    pub fn url(&self, base: &str, address: &str) -> String {
        let base = base.trim_end_matches('/');
        match self {
            BalanceFormat::Esplora => format!("{}/address/{}/utxo", base, address),
            BalanceFormat::BlockCypher => format!("{}/addrs/{}/balance", base, address),
            BalanceFormat::BlockchainInfo => format!("{}/rawaddr/{}", base, address),
            BalanceFormat::Blockchair => format!("{}/dashboards/address/{}", base, address),
        }
    }

    /// Balance in BTC
    pub fn extract(&self, data: &Value, address: &str) -> Option<f64> {
        let satoshis = match self {
            BalanceFormat::Esplora => data
                .as_array()?
                .iter()
                .map(|utxo| utxo.get("value").and_then(number).unwrap_or(0.0))
                .sum(),
            BalanceFormat::BlockCypher => data.get("balance").and_then(number).unwrap_or(0.0),
            BalanceFormat::BlockchainInfo => {
                data.get("final_balance").and_then(number).unwrap_or(0.0)
            }
            BalanceFormat::Blockchair => data
                .get("data")
                .and_then(|d| d.get(address))
                .and_then(|a| a.pointer("/address/balance"))
                .and_then(number)
                .unwrap_or(0.0),
        };
        Some(satoshis / SATOSHIS_PER_BTC)
    }
}

#[derive(Debug, Deserialize)]
struct EsploraTx {
    #[serde(default)]
    vout: Vec<EsploraOutput>,
}

#[derive(Debug, Deserialize)]
struct EsploraOutput {
    scriptpubkey_address: Option<String>,
    #[serde(default)]
    value: u64,
}

/// Count outputs paying `address` roughly `expected` BTC
fn matching_outputs(txs: &[EsploraTx], address: &str, expected: f64) -> usize {
    txs.iter()
        .flat_map(|tx| tx.vout.iter())
        .filter(|out| out.scriptpubkey_address.as_deref() == Some(address))
        .filter(|out| (out.value as f64 / SATOSHIS_PER_BTC - expected).abs() < DOUBLE_SPEND_TOLERANCE)
        .count()
}

/// [`ChainClient`] backed by public price APIs and block explorers
pub struct BtcApi {
    client: Client,
    price_apis: Vec<(String, PriceFormat)>,
    blockchain_apis: Vec<(String, BalanceFormat)>,
    tx_history_api: String,
    fallback_price: f64,
}

impl BtcApi {
    pub fn new(config: &Config) -> Self {
        let price_apis = config
            .btc
            .price_apis
            .iter()
            .map(|url| (url.clone(), PriceFormat::from_url(url)))
            .collect();

        let blockchain_apis = config
            .btc
            .blockchain_apis
            .iter()
            .filter_map(|url| match BalanceFormat::from_url(url) {
                Some(format) => Some((url.clone(), format)),
                None => {
                    tracing::warn!("Skipping unsupported blockchain API: {}", url);
                    None
                }
            })
            .collect();

        Self {
            client: Client::new(),
            price_apis,
            blockchain_apis,
            tx_history_api: config.btc.tx_history_api.trim_end_matches('/').to_string(),
            fallback_price: config.payments.fallback_btc_price,
        }
    }

    async fn fetch_json(&self, url: &str, timeout: Duration) -> Result<Value, String> {
        let response = self
            .client
            .get(url)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| e.without_url().to_string())?;

        if response.status() != StatusCode::OK {
            return Err(format!("HTTP {}", response.status()));
        }

        response
            .json()
            .await
            .map_err(|e| format!("invalid JSON: {}", e.without_url()))
    }

    async fn try_price(&self, url: &str, format: PriceFormat) -> Result<f64, String> {
        let data = self.fetch_json(url, PRICE_TIMEOUT).await?;
        let price = format
            .extract(&data)
            .ok_or_else(|| "unexpected response shape".to_string())?;
        if price > 0.0 {
            Ok(price)
        } else {
            Err(format!("non-positive price {}", price))
        }
    }
}

#[async_trait]
impl ChainClient for BtcApi {
    async fn btc_price(&self) -> f64 {
        for (i, (url, format)) in self.price_apis.iter().enumerate() {
            tracing::debug!("BTC price API call to {}", url);
            match self.try_price(url, *format).await {
                Ok(price) => {
                    tracing::info!("BTC price from API_{}: ${:.2}", i + 1, price);
                    return price;
                }
                Err(e) => tracing::warn!("BTC API error: API_{} failed: {}", i + 1, e),
            }
        }

        tracing::warn!(
            "All price APIs failed! Using fallback price: ${:.2}",
            self.fallback_price
        );
        self.fallback_price
    }

    async fn address_balance(&self, address: &str) -> f64 {
        let masked = mask_address(address);
        if address.len() < MIN_ADDRESS_LEN {
            tracing::warn!("Invalid address provided for balance check: {}", masked);
            return 0.0;
        }

        for (i, (base, format)) in self.blockchain_apis.iter().enumerate() {
            let url = format.url(base, address);
            tracing::debug!("BTC API call to {} for address {}", base, masked);

            let result = self
                .fetch_json(&url, BALANCE_TIMEOUT)
                .await
                .and_then(|data| {
                    format
                        .extract(&data, address)
                        .ok_or_else(|| "unexpected response shape".to_string())
                });
            match result {
                Ok(balance) => {
                    tracing::debug!("Balance from BLOCKCHAIN_API_{} for {}: {:.8} BTC", i + 1, masked, balance);
                    return balance;
                }
                Err(e) => tracing::warn!(
                    "BTC API error for address {}: BLOCKCHAIN_API_{} failed: {}",
                    masked,
                    i + 1,
                    e
                ),
            }
        }

        tracing::error!("All blockchain APIs failed to check balance for address {}", masked);
        0.0
    }

    async fn double_spend_suspected(&self, address: &str, expected: f64) -> bool {
        let masked = mask_address(address);
        if address.is_empty() {
            tracing::warn!("No address provided for double spend check");
            return false;
        }

        let url = format!("{}/address/{}/txs", self.tx_history_api, address);
        tracing::debug!("BTC API call to {} for address {}", self.tx_history_api, masked);

        let response = match self.client.get(&url).timeout(HISTORY_TIMEOUT).send().await {
            Ok(response) => response,
            Err(e) => {
                tracing::error!("Double spend check failed for {}: {}", masked, e.without_url());
                return true;
            }
        };

        match response.status() {
            StatusCode::OK => {}
            StatusCode::NOT_FOUND => {
                tracing::debug!("No transactions found for address {}", masked);
                return false;
            }
            status => {
                tracing::warn!("HTTP {} from transaction history for {}", status, masked);
                return true;
            }
        }

        let txs: Vec<EsploraTx> = match response.json().await {
            Ok(txs) => txs,
            Err(e) => {
                tracing::error!(
                    "Double spend check received invalid JSON for {}: {}",
                    masked,
                    e.without_url()
                );
                return true;
            }
        };

        let matches = matching_outputs(&txs, address, expected);
        if matches > 1 {
            tracing::warn!(
                "Potential double spend detected for {}: {} payments close to {:.8} BTC",
                masked,
                matches,
                expected
            );
            return true;
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_validate_btc_address() {
        assert!(validate_btc_address("1A1zP1eP5QGefi2DMPTfTL5SLmv7DivfNa"));
        assert!(validate_btc_address("3J98t1WpEZ73CNmQviecrnyiWrnqRhWNLy"));
        assert!(validate_btc_address("bc1qar0srrr7xfkvy5l643lydnw9re59gtzzwf5mdq"));
        assert!(!validate_btc_address("0A1zP1eP5QGefi2DMPTfTL5SLmv7DivfNa"));
        assert!(!validate_btc_address("1short"));
        // base58 excludes 0, O, I and l
        assert!(!validate_btc_address("1A1zP1eP5QGefi2DMPTfTL5SLmv7DivfN0"));
        assert!(!validate_btc_address("BC1QAR0SRRR7XFKVY5L643LYDNW9RE59GTZZWF5MDQ"));
    }

    #[test]
    fn test_price_format_by_url() {
        assert_eq!(
            PriceFormat::from_url("https://api.coingecko.com/api/v3/simple/price?ids=bitcoin"),
            PriceFormat::CoinGecko
        );
        assert_eq!(PriceFormat::from_url("https://www.bitstamp.net/api/v2/ticker/btcusd"), PriceFormat::Last);
        assert_eq!(PriceFormat::from_url("https://example.com/ticker"), PriceFormat::Generic);
    }

    #[test]
    fn test_price_extraction() {
        assert_eq!(
            PriceFormat::CoinGecko.extract(&json!({"bitcoin": {"usd": 64000.5}})),
            Some(64000.5)
        );
        assert_eq!(PriceFormat::Binance.extract(&json!({"price": "65000.10"})), Some(65000.10));
        assert_eq!(
            PriceFormat::Kraken.extract(&json!({"result": {"XXBTZUSD": {"c": ["61000.1", "0.1"]}}})),
            Some(61000.1)
        );
        assert_eq!(
            PriceFormat::Phemex.extract(&json!({"result": {"close": 600_000_000}})),
            Some(60000.0)
        );
        assert_eq!(PriceFormat::Generic.extract(&json!({"rate": 1.5})), Some(1.5));
        assert_eq!(PriceFormat::CoinGecko.extract(&json!({"error": "rate limited"})), None);
    }

    #[test]
    fn test_balance_extraction() {
        let addr = "bc1qar0srrr7xfkvy5l643lydnw9re59gtzzwf5mdq";
        let utxos = json!([{"value": 50_000}, {"value": 4_348}]);
        assert_eq!(BalanceFormat::Esplora.extract(&utxos, addr), Some(0.00054348));

        let chair = json!({"data": {addr: {"address": {"balance": 100_000_000}}}});
        assert_eq!(BalanceFormat::Blockchair.extract(&chair, addr), Some(1.0));
        assert_eq!(BalanceFormat::BlockCypher.extract(&json!({}), addr), Some(0.0));
        assert_eq!(BalanceFormat::Esplora.extract(&json!({"oops": 1}), addr), None);

        assert_eq!(
            BalanceFormat::from_url("https://mempool.space/api"),
            Some(BalanceFormat::Esplora)
        );
        assert_eq!(BalanceFormat::from_url("https://unknown.example"), None);
        assert_eq!(
            BalanceFormat::BlockCypher.url("https://api.blockcypher.com/v1/btc/main/", addr),
            format!("https://api.blockcypher.com/v1/btc/main/addrs/{}/balance", addr)
        );
    }

    #[test]
    fn test_matching_outputs() {
        let addr = "bc1qtarget";
        let txs: Vec<EsploraTx> = serde_json::from_value(json!([
            {"vout": [{"scriptpubkey_address": addr, "value": 54_348}]},
            {"vout": [{"scriptpubkey_address": "bc1qother", "value": 54_348}]},
            {"vout": [{"scriptpubkey_address": addr, "value": 54_000}]},
            {"vout": [{"value": 1}]}
        ]))
        .unwrap();

        assert_eq!(matching_outputs(&txs, addr, 0.00054348), 2);
        assert_eq!(matching_outputs(&txs, addr, 0.01), 0);
    }
}
