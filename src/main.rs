use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;

use vip_pay_bot::application::messaging::MessageDispatcher;
use vip_pay_bot::application::services::{PaymentChecker, PaymentService};
use vip_pay_bot::domain::traits::{Bot, ChainClient};
use vip_pay_bot::infrastructure::adapters::TelegramAdapter;
use vip_pay_bot::infrastructure::blockchain::{validate_btc_address, BtcApi};
use vip_pay_bot::infrastructure::config::Config;
use vip_pay_bot::infrastructure::database::Database;
use vip_pay_bot::infrastructure::logging;
use vip_pay_bot::infrastructure::scheduler::Scheduler;

const POLL_TIMEOUT_SECS: i64 = 30;
const POLL_BACKOFF: Duration = Duration::from_secs(5);

#[derive(Parser)]
#[command(name = "vip-pay-bot")]
#[command(about = "Telegram VIP subscriptions paid in Bitcoin", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file path
    #[arg(short, long, default_value = "config.yaml")]
    config: String,

    /// Bot token (overrides config)
    #[arg(short, long)]
    token: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the bot
    Run,
    /// Show version
    Version,
    /// Generate default config
    InitConfig,
    /// Check the database and the address pool
    Health,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    match cli.command {
        Commands::Version => {
            println!("vip-pay-bot v{}", env!("CARGO_PKG_VERSION"));
            ExitCode::SUCCESS
        }
        Commands::InitConfig => init_config(),
        Commands::Health => match load_config(&cli.config, cli.token) {
            Some(config) => health(&config),
            None => ExitCode::FAILURE,
        },
        Commands::Run => {
            let Some(config) = load_config(&cli.config, cli.token) else {
                return ExitCode::FAILURE;
            };
            let _guard = logging::init(&config.logging);

            let rt = match tokio::runtime::Runtime::new() {
                Ok(rt) => rt,
                Err(e) => {
                    tracing::error!("Failed to start runtime: {}", e);
                    return ExitCode::FAILURE;
                }
            };
            match rt.block_on(run_bot(config)) {
                Ok(()) => ExitCode::SUCCESS,
                Err(e) => {
                    tracing::error!("{}", e);
                    ExitCode::FAILURE
                }
            }
        }
    }
}

/// `.env`, then the YAML file, then the environment, then `--token`
fn load_config(path: &str, token_override: Option<String>) -> Option<Config> {
    if let Err(e) = dotenvy::dotenv() {
        if !e.not_found() {
            eprintln!("Failed to read .env: {}", e);
        }
    }

    let mut config = match Config::load_layered(path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load config: {}", e);
            return None;
        }
    };
    if let Some(token) = token_override {
        config.bot.token = Some(token);
    }
    Some(config)
}

fn init_config() -> ExitCode {
    match Config::default().to_yaml() {
        Ok(yaml) => {
            println!("{}", yaml);
            println!("\nSave this to config.yaml and adjust as needed.");
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("{}", e);
            ExitCode::FAILURE
        }
    }
}

fn health(config: &Config) -> ExitCode {
    let db = match Database::open(&config.database.path) {
        Ok(db) => db,
        Err(e) => {
            eprintln!("Database: unavailable ({})", e);
            return ExitCode::FAILURE;
        }
    };
    let healthy = db.health_check();
    println!("Database: {}", if healthy { "ok" } else { "failing" });
    match db.available_address_count() {
        Ok(count) => println!("Free BTC addresses: {}", count),
        Err(e) => println!("Free BTC addresses: unknown ({})", e),
    }
    if healthy {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

/// Pool addresses from the addresses file plus the config list; invalid ones are skipped
fn collect_addresses(config: &Config) -> Vec<String> {
    let mut raw: Vec<String> = Vec::new();

    let file = &config.btc.addresses_file;
    if file.exists() {
        match std::fs::read_to_string(file) {
            Ok(content) => raw.extend(
                content
                    .lines()
                    .map(str::trim)
                    .filter(|l| !l.is_empty() && !l.starts_with('#'))
                    .map(String::from),
            ),
            Err(e) => tracing::warn!("Failed to read {}: {}", file.display(), e),
        }
    }
    raw.extend(config.btc.addresses.iter().cloned());

    let mut valid = Vec::with_capacity(raw.len());
    for address in raw {
        if validate_btc_address(&address) {
            valid.push(address);
        } else {
            tracing::warn!("Skipping invalid BTC address: {}", logging::mask_address(&address));
        }
    }
    valid
}

async fn run_bot(config: Config) -> Result<(), String> {
    let problems = config.validate();
    if !problems.is_empty() {
        for problem in &problems {
            tracing::error!("Config: {}", problem);
        }
        return Err("Invalid configuration".to_string());
    }
    let token = config.bot.token.clone().unwrap_or_default();
    let config = Arc::new(config);

    // Database
    let db = open_database(&config.database.path)?;
    let addresses = collect_addresses(&config);
    let added = db
        .load_addresses(&addresses, Utc::now())
        .map_err(|e| format!("Failed to load BTC addresses: {}", e))?;
    let free = db.available_address_count().unwrap_or_default();
    tracing::info!("Loaded {} new BTC address(es), {} free", added, free);
    if free == 0 {
        tracing::warn!("Address pool is empty, purchases will fail");
    }

    // Telegram
    tracing::info!("Using bot token {}", logging::mask_token(&token));
    let mut adapter = TelegramAdapter::new(token);
    adapter
        .fetch_bot_info()
        .await
        .map_err(|e| format!("Failed to fetch bot info: {}", e))?;
    tracing::info!("Bot started: @{}", adapter.bot_info().username);
    if let Err(e) = adapter.drop_pending_updates().await {
        tracing::warn!("Failed to drop pending updates: {}", e);
    }
    if let Err(e) = adapter.register_commands().await {
        tracing::warn!("Failed to register commands: {}", e);
    }
    let adapter = Arc::new(adapter);
    let bot: Arc<dyn Bot> = adapter.clone();

    // Services
    let chain: Arc<dyn ChainClient> = Arc::new(BtcApi::new(&config));
    let payments = Arc::new(PaymentService::new(Arc::new(db), chain, config.clone()));
    let checker = Arc::new(PaymentChecker::new(payments.clone(), bot.clone(), config.clone()));
    let dispatcher = MessageDispatcher::new(bot, payments, config.clone());

    // Background jobs
    let shutdown = CancellationToken::new();
    let mut scheduler = Scheduler::with_token(shutdown.clone());
    let payment_job = checker.clone();
    scheduler.every(
        "payment-check",
        Duration::from_secs(config.payments.check_interval_minutes * 60),
        move || {
            let checker = payment_job.clone();
            async move {
                if let Err(e) = checker.check_payments(Utc::now()).await {
                    tracing::error!("Error in payment check: {}", e);
                }
            }
        },
    );
    let alert_job = checker;
    scheduler.every(
        "alerts",
        Duration::from_secs(config.payments.alert_interval_minutes * 60),
        move || {
            let checker = alert_job.clone();
            async move {
                if let Err(e) = checker.run_alerts(Utc::now()).await {
                    tracing::error!("Error in alert check: {}", e);
                }
            }
        },
    );

    tokio::spawn(watch_signals(shutdown.clone()));

    poll_updates(&adapter, &dispatcher, &shutdown).await;

    tracing::info!("Shutting down");
    scheduler.shutdown().await;
    Ok(())
}

fn open_database(path: &Path) -> Result<Database, String> {
    let db = Database::open(path).map_err(|e| format!("Failed to open database: {}", e))?;
    if !db.health_check() {
        return Err("Database health check failed".to_string());
    }
    tracing::info!("Database initialized at {}", path.display());
    Ok(db)
}

async fn poll_updates(adapter: &TelegramAdapter, dispatcher: &MessageDispatcher, shutdown: &CancellationToken) {
    let mut offset: i64 = 0;
    tracing::info!("Starting message loop...");

    loop {
        let updates = tokio::select! {
            _ = shutdown.cancelled() => break,
            result = adapter.get_updates(offset, POLL_TIMEOUT_SECS) => result,
        };

        match updates {
            Ok(updates) => {
                if !updates.is_empty() {
                    tracing::debug!("Received {} updates", updates.len());
                }
                for update in &updates {
                    if let Some(msg) = adapter.to_incoming(update) {
                        dispatcher.dispatch(msg).await;
                    }
                }
                if let Some(next) = TelegramAdapter::get_next_offset(&updates) {
                    offset = next;
                }
            }
            Err(e) => {
                tracing::error!("Failed to get updates: {}", e);
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = tokio::time::sleep(POLL_BACKOFF) => {}
                }
            }
        }
    }
}

/// Cancel `shutdown` on Ctrl-C or SIGTERM
async fn watch_signals(shutdown: CancellationToken) {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = term.recv() => {}
                }
            }
            Err(e) => {
                tracing::warn!("SIGTERM handler unavailable: {}", e);
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }

    tracing::info!("Shutdown signal received");
    shutdown.cancel();
}
