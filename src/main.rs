//! Bot P&L engine
//!
//! Aggregates exchange sub-account balances and tracks per-bot profit
//! against persisted baselines.

use clap::{Parser, Subcommand};
use bot_pnl::{
    aggregator::AccountAggregator,
    client::ExchangeClient,
    config::Config,
    orchestrator::RetryOrchestrator,
    server::{start_server, AppState},
    storage::BaselineStore,
    types::Credential,
};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "bot-pnl")]
#[command(about = "Sub-account balance aggregation and bot profit tracking")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file path
    #[arg(short, long, default_value = "config.toml")]
    config: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP API
    Serve,
    /// Refresh one account and print the report as JSON
    Fetch {
        /// Account label used to scope baselines
        #[arg(short, long, default_value = "Account 1")]
        label: String,

        #[arg(long, env = "BOTPNL_API_KEY", hide_env_values = true)]
        api_key: String,

        #[arg(long, env = "BOTPNL_API_SECRET", hide_env_values = true)]
        api_secret: String,

        #[arg(long, env = "BOTPNL_API_PASSPHRASE", hide_env_values = true)]
        api_passphrase: String,
    },
    /// Forget a bot's baseline so profit restarts from the next refresh
    ResetBaseline {
        /// Account label
        #[arg(short, long)]
        label: String,

        /// Bot (sub-account) name
        bot: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    let config = Config::load(&cli.config)?;

    match cli.command {
        Commands::Serve => serve(config).await,
        Commands::Fetch {
            label,
            api_key,
            api_secret,
            api_passphrase,
        } => fetch(config, &label, Credential::new(api_key, api_secret, api_passphrase)).await,
        Commands::ResetBaseline { label, bot } => reset_baseline(config, &label, &bot).await,
    }
}

async fn build_orchestrator(config: &Config) -> anyhow::Result<RetryOrchestrator> {
    let client = Arc::new(ExchangeClient::new(&config.exchange)?);
    let aggregator = Arc::new(AccountAggregator::new(client, config.exchange.clone()));
    let store = BaselineStore::connect(config.database.resolved_path()).await?;

    Ok(RetryOrchestrator::new(aggregator, store, config.retry.clone()))
}

async fn serve(config: Config) -> anyhow::Result<()> {
    tracing::info!("Starting bot P&L API");

    let orchestrator = build_orchestrator(&config).await?;
    start_server(AppState::new(orchestrator), &config.server.host, config.server.port).await?;

    Ok(())
}

async fn fetch(config: Config, label: &str, credential: Credential) -> anyhow::Result<()> {
    let orchestrator = build_orchestrator(&config).await?;
    let report = orchestrator.run(label, &credential).await;

    println!("{}", serde_json::to_string_pretty(&report)?);

    if let Some(err) = &report.error {
        anyhow::bail!("refresh failed: {}", err);
    }
    Ok(())
}

async fn reset_baseline(config: Config, label: &str, bot: &str) -> anyhow::Result<()> {
    let store = BaselineStore::connect(config.database.resolved_path()).await?;

    if store.reset(label, bot).await? {
        println!("Baseline for {} / {} removed", label, bot);
    } else {
        println!("No baseline stored for {} / {}", label, bot);
    }
    Ok(())
}
