//! Configuration management

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::application::errors::ConfigError;
use crate::domain::entities::{plan_config, PlanConfig, PlanType};

/// Number of numbered `BTC_PRICE_API_n` / `BTC_API_n` variables scanned
const MAX_NUMBERED_APIS: usize = 20;

/// Upper bound for every minutes setting (one week)
const MAX_MINUTES: i64 = 7 * 24 * 60;

/// Bot configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct Config {
    pub bot: BotConfig,
    pub database: DatabaseConfig,
    pub payments: PaymentConfig,
    pub btc: BtcConfig,
    pub vip_links: VipLinks,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct BotConfig {
    pub token: Option<String>,
    pub admin_user_id: i64,
    pub support_username: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct DatabaseConfig {
    pub path: PathBuf,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct PaymentConfig {
    pub timeout_minutes: i64,
    pub check_interval_minutes: u64,
    pub alert_interval_minutes: u64,
    pub fallback_btc_price: f64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct BtcConfig {
    pub addresses: Vec<String>,
    pub addresses_file: PathBuf,
    pub price_apis: Vec<String>,
    pub blockchain_apis: Vec<String>,
    /// Base URL of the explorer used for transaction history
    pub tx_history_api: String,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct VipLinks {
    pub vip1: String,
    pub vip2: String,
    pub vip3: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct LoggingConfig {
    pub file: Option<PathBuf>,
    pub level: String,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            token: None,
            admin_user_id: 0,
            support_username: "tradecj".to_string(),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("vip-bot.db"),
        }
    }
}

impl Default for PaymentConfig {
    fn default() -> Self {
        Self {
            timeout_minutes: 30,
            check_interval_minutes: 20,
            alert_interval_minutes: 5,
            fallback_btc_price: 92_000.0,
        }
    }
}

impl Default for BtcConfig {
    fn default() -> Self {
        Self {
            addresses: Vec::new(),
            addresses_file: PathBuf::from("btc_addresses.txt"),
            price_apis: vec![
                "https://api.coingecko.com/api/v3/simple/price?ids=bitcoin&vs_currencies=usd".to_string(),
                "https://api.binance.com/api/v3/ticker/price?symbol=BTCUSDT".to_string(),
            ],
            blockchain_apis: vec![
                "https://blockstream.info/api".to_string(),
                "https://mempool.space/api".to_string(),
            ],
            tx_history_api: "https://blockstream.info/api".to_string(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            file: Some(PathBuf::from("bot.log")),
            level: "info".to_string(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bot: BotConfig::default(),
            database: DatabaseConfig::default(),
            payments: PaymentConfig::default(),
            btc: BtcConfig::default(),
            vip_links: VipLinks::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Config {
    pub fn load(path: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let path = path.into();
        let content = std::fs::read_to_string(&path)
            .map_err(|e| ConfigError::Parse(format!("Failed to read config: {}", e)))?;

        serde_yaml::from_str(&content)
            .map_err(|e| ConfigError::Parse(format!("Failed to parse config: {}", e)))
    }

    /// Load the YAML file when present, then apply environment overrides
    pub fn load_layered(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let mut config = if path.exists() {
            Config::load(path)?
        } else {
            Config::default()
        };
        config.apply_env_with(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Apply overrides from a variable lookup (normally the process environment)
    pub fn apply_env_with<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(token) = get("BOT_TOKEN") {
            self.bot.token = Some(token);
        }
        if let Some(admin) = get("ADMIN_USER_ID") {
            self.bot.admin_user_id = admin
                .trim()
                .parse()
                .map_err(|_| ConfigError::InvalidValue(format!("ADMIN_USER_ID={}", admin)))?;
        }
        if let Some(support) = get("SUPPORT_USERNAME") {
            self.bot.support_username = support.trim_start_matches('@').to_string();
        }
        if let Some(path) = get("DATABASE_PATH") {
            self.database.path = PathBuf::from(path);
        }
        if let Some(addresses) = get("BTC_ADDRESSES") {
            self.btc.addresses = split_list(&addresses);
        }
        if let Some(file) = get("BTC_ADDRESSES_FILE") {
            self.btc.addresses_file = PathBuf::from(file);
        }
        if let Some(price) = get("FALLBACK_BTC_PRICE") {
            self.payments.fallback_btc_price = price
                .trim()
                .parse()
                .map_err(|_| ConfigError::InvalidValue(format!("FALLBACK_BTC_PRICE={}", price)))?;
        }
        if let Some(link) = get("VIP1_LINK") {
            self.vip_links.vip1 = link;
        }
        if let Some(link) = get("VIP2_LINK") {
            self.vip_links.vip2 = link;
        }
        if let Some(link) = get("VIP3_LINK") {
            self.vip_links.vip3 = link;
        }

        let price_apis = numbered(&get, "BTC_PRICE_API_");
        if !price_apis.is_empty() {
            self.btc.price_apis = price_apis;
        }
        let blockchain_apis = numbered(&get, "BTC_API_");
        if !blockchain_apis.is_empty() {
            self.btc.blockchain_apis = blockchain_apis;
        }

        Ok(())
    }

    /// Validate configuration and return every problem found
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.bot.token.as_deref().map_or(true, |t| t.trim().is_empty()) {
            errors.push("BOT_TOKEN is required".to_string());
        }
        if self.bot.admin_user_id == 0 {
            errors.push("ADMIN_USER_ID is required".to_string());
        }
        if self.btc.addresses.is_empty() && !self.btc.addresses_file.exists() {
            errors.push("BTC_ADDRESSES is required".to_string());
        }
        if !(1..=MAX_MINUTES).contains(&self.payments.timeout_minutes) {
            errors.push(format!(
                "payments.timeout-minutes must be between 1 and {}",
                MAX_MINUTES
            ));
        }
        for (name, minutes) in [
            ("check-interval-minutes", self.payments.check_interval_minutes),
            ("alert-interval-minutes", self.payments.alert_interval_minutes),
        ] {
            if !(1..=MAX_MINUTES as u64).contains(&minutes) {
                errors.push(format!("payments.{} must be between 1 and {}", name, MAX_MINUTES));
            }
        }

        errors
    }

    pub fn vip_link(&self, plan: PlanType) -> &str {
        match plan {
            PlanType::Vip1 => &self.vip_links.vip1,
            PlanType::Vip2 => &self.vip_links.vip2,
            PlanType::Vip3 => &self.vip_links.vip3,
        }
    }

    /// Catalogue entry with this deployment's invite link filled in
    pub fn plan(&self, plan: PlanType) -> PlanConfig {
        plan_config(plan, self.vip_link(plan))
    }

    pub fn is_admin(&self, user_id: i64) -> bool {
        self.bot.admin_user_id != 0 && self.bot.admin_user_id == user_id
    }

    pub fn support_url(&self) -> String {
        format!("https://t.me/{}", self.bot.support_username)
    }

    pub fn to_yaml(&self) -> Result<String, ConfigError> {
        serde_yaml::to_string(self).map_err(|e| ConfigError::Parse(e.to_string()))
    }
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
        .collect()
}

fn numbered<F>(get: &F, prefix: &str) -> Vec<String>
where
    F: Fn(&str) -> Option<String>,
{
    (1..=MAX_NUMBERED_APIS)
        .filter_map(|i| get(&format!("{}{}", prefix, i)))
        .map(|v| v.trim().to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn test_env_overrides() {
        let vars = env(&[
            ("BOT_TOKEN", "123456789:ABCDEF"),
            ("ADMIN_USER_ID", "42"),
            ("BTC_ADDRESSES", " addr1 , ,addr2"),
            ("VIP2_LINK", "https://t.me/+vip2"),
            ("BTC_PRICE_API_1", "https://price.one"),
            ("BTC_PRICE_API_3", "https://price.three"),
            ("FALLBACK_BTC_PRICE", "65000.5"),
        ]);
        let mut config = Config::default();
        config.apply_env_with(|k| vars.get(k).cloned()).unwrap();

        assert_eq!(config.bot.token.as_deref(), Some("123456789:ABCDEF"));
        assert_eq!(config.bot.admin_user_id, 42);
        assert_eq!(config.btc.addresses, vec!["addr1", "addr2"]);
        assert_eq!(config.vip_link(PlanType::Vip2), "https://t.me/+vip2");
        assert_eq!(config.btc.price_apis, vec!["https://price.one", "https://price.three"]);
        assert_eq!(config.payments.fallback_btc_price, 65000.5);
        // untouched defaults survive
        assert_eq!(config.btc.blockchain_apis.len(), 2);
    }

    #[test]
    fn test_invalid_admin_id_is_rejected() {
        let vars = env(&[("ADMIN_USER_ID", "boss")]);
        let mut config = Config::default();
        let err = config.apply_env_with(|k| vars.get(k).cloned()).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue(_)));
    }

    #[test]
    fn test_validate_reports_all_missing_fields() {
        let mut config = Config::default();
        config.btc.addresses_file = PathBuf::from("/nonexistent/addresses.txt");
        let errors = config.validate();
        assert_eq!(
            errors,
            vec![
                "BOT_TOKEN is required",
                "ADMIN_USER_ID is required",
                "BTC_ADDRESSES is required",
            ]
        );

        config.bot.token = Some("t".to_string());
        config.bot.admin_user_id = 1;
        config.btc.addresses = vec!["a".to_string()];
        assert!(config.validate().is_empty());
    }

    #[test]
    fn test_validate_bounds_job_minutes() {
        let mut config = Config::default();
        config.bot.token = Some("t".to_string());
        config.bot.admin_user_id = 1;
        config.btc.addresses = vec!["a".to_string()];

        config.payments.timeout_minutes = i64::MAX;
        config.payments.check_interval_minutes = u64::MAX;
        config.payments.alert_interval_minutes = 0;
        assert_eq!(
            config.validate(),
            vec![
                "payments.timeout-minutes must be between 1 and 10080",
                "payments.check-interval-minutes must be between 1 and 10080",
                "payments.alert-interval-minutes must be between 1 and 10080",
            ]
        );

        config.payments.timeout_minutes = MAX_MINUTES;
        config.payments.check_interval_minutes = 1;
        config.payments.alert_interval_minutes = 5;
        assert!(config.validate().is_empty());
    }

    #[test]
    fn test_yaml_partial_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(
            &path,
            "bot:\n  admin-user-id: 99\npayments:\n  timeout-minutes: 45\n",
        )
        .unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.bot.admin_user_id, 99);
        assert_eq!(config.bot.support_username, "tradecj");
        assert_eq!(config.payments.timeout_minutes, 45);
        assert_eq!(config.payments.check_interval_minutes, 20);
        assert!(config.is_admin(99));
        assert!(!config.is_admin(1));
    }

    #[test]
    fn test_default_config_serializes() {
        let yaml = Config::default().to_yaml().unwrap();
        assert!(yaml.contains("support-username: tradecj"));
        let back: Config = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(back.payments.alert_interval_minutes, 5);
    }
}
