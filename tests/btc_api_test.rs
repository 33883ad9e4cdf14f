//! Price and explorer lookups against mock HTTP servers

use serde_json::json;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use vip_pay_bot::domain::traits::ChainClient;
use vip_pay_bot::infrastructure::blockchain::BtcApi;
use vip_pay_bot::infrastructure::config::Config;

const ADDRESS: &str = "bc1qar0srrr7xfkvy5l643lydnw9re59gtzzwf5mdq";

fn config(server: &MockServer) -> Config {
    let mut config = Config::default();
    config.payments.fallback_btc_price = 12_345.0;
    // the format is picked from the URL, so the mock paths carry the provider name
    config.btc.price_apis = vec![
        format!("{}/coingecko/simple/price", server.uri()),
        format!("{}/binance/ticker/price", server.uri()),
    ];
    config.btc.blockchain_apis = vec![
        format!("{}/blockcypher", server.uri()),
        format!("{}/blockstream", server.uri()),
        "https://unknown-explorer.example/api".to_string(),
    ];
    config.btc.tx_history_api = format!("{}/esplora", server.uri());
    config
}

#[tokio::test]
async fn price_falls_through_to_next_source() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/coingecko/simple/price"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/binance/ticker/price"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "symbol": "BTCUSDT",
            "price": "67012.50"
        })))
        .mount(&server)
        .await;

    let api = BtcApi::new(&config(&server));
    assert_eq!(api.btc_price().await, 67_012.5);
}

#[tokio::test]
async fn price_uses_fallback_when_every_source_fails() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/coingecko/simple/price"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "bitcoin": { "usd": 0 } })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/binance/ticker/price"))
        .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
        .mount(&server)
        .await;

    let api = BtcApi::new(&config(&server));
    assert_eq!(api.btc_price().await, 12_345.0);
}

#[tokio::test]
async fn balance_sums_utxos_after_first_explorer_fails() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(format!("/blockcypher/addrs/{}/balance", ADDRESS)))
        .respond_with(ResponseTemplate::new(429))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(format!("/blockstream/address/{}/utxo", ADDRESS)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            { "txid": "a", "vout": 0, "value": 30_000 },
            { "txid": "b", "vout": 1, "value": 24_348 }
        ])))
        .mount(&server)
        .await;

    let api = BtcApi::new(&config(&server));
    assert_eq!(api.address_balance(ADDRESS).await, 0.00054348);
}

#[tokio::test]
async fn short_address_skips_http() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "balance": 1_000 })))
        .expect(0)
        .mount(&server)
        .await;

    let api = BtcApi::new(&config(&server));
    assert_eq!(api.address_balance("1short").await, 0.0);
}

fn history(values: &[u64]) -> serde_json::Value {
    let txs: Vec<_> = values
        .iter()
        .map(|v| {
            json!({
                "txid": format!("tx{}", v),
                "vout": [
                    { "scriptpubkey_address": ADDRESS, "value": v },
                    { "scriptpubkey_address": "1BoatSLRHtKNngkdXEeobR76b53LETtpyT", "value": 5_000 }
                ]
            })
        })
        .collect();
    json!(txs)
}

#[tokio::test]
async fn double_spend_needs_two_matching_payments() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(format!("/esplora/address/{}/txs", ADDRESS)))
        .respond_with(ResponseTemplate::new(200).set_body_json(history(&[54_348, 54_349])))
        .mount(&server)
        .await;

    let api = BtcApi::new(&config(&server));
    assert!(api.double_spend_suspected(ADDRESS, 0.00054348).await);
    assert!(!api.double_spend_suspected(ADDRESS, 0.001).await);
}

#[tokio::test]
async fn double_spend_single_payment_is_clean() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(format!("/esplora/address/{}/txs", ADDRESS)))
        .respond_with(ResponseTemplate::new(200).set_body_json(history(&[54_348])))
        .mount(&server)
        .await;

    let api = BtcApi::new(&config(&server));
    assert!(!api.double_spend_suspected(ADDRESS, 0.00054348).await);
}

#[tokio::test]
async fn double_spend_fails_closed() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(format!("/esplora/address/{}/txs", ADDRESS)))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let api = BtcApi::new(&config(&server));
    assert!(api.double_spend_suspected(ADDRESS, 0.00054348).await);
}

#[tokio::test]
async fn unknown_address_history_is_clean() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(format!("/esplora/address/{}/txs", ADDRESS)))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let api = BtcApi::new(&config(&server));
    assert!(!api.double_spend_suspected(ADDRESS, 0.00054348).await);
}

#[tokio::test]
async fn unreachable_history_fails_closed() {
    let server = MockServer::start().await;
    let mut config = config(&server);
    config.btc.tx_history_api = "http://127.0.0.1:1".to_string();

    let api = BtcApi::new(&config);
    assert!(api.double_spend_suspected(ADDRESS, 0.00054348).await);
}
