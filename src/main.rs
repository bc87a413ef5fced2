use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{error, info};

use orderflow_trader::analysis::{HeuristicRegimeDetector, OrderFlowAnalyzer, RegimeDetector};
use orderflow_trader::bot::{BotConfig, TradingBot};
use orderflow_trader::llm::client::{DEFAULT_BASE_URL, DEFAULT_MODEL};
use orderflow_trader::llm::{DeepSeekConfig, DeepSeekProvider};
use orderflow_trader::market_data::{
    CsvMarketData, MarketDataProvider, SyntheticConfig, SyntheticMarketData,
};

#[derive(Parser, Debug)]
#[command(name = "orderflow-trader")]
#[command(about = "Order flow + market regime + LLM trade decisions")]
struct Args {
    #[command(subcommand)]
    command: Commands,

    /// Directory of <SYMBOL>_<tf>.csv candle files (synthetic feed when omitted)
    #[arg(long, env = "MARKET_DATA_DIR", global = true)]
    data_dir: Option<PathBuf>,

    /// Seed for the synthetic feed
    #[arg(long, default_value = "42", global = true)]
    seed: u64,

    /// Print verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(clap::Args, Debug, Clone)]
struct LlmArgs {
    /// DeepSeek API key
    #[arg(long, env = "DEEPSEEK_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// DeepSeek API base URL
    #[arg(long, env = "DEEPSEEK_BASE_URL", default_value = DEFAULT_BASE_URL)]
    base_url: String,

    /// Model name
    #[arg(long, default_value = DEFAULT_MODEL)]
    model: String,

    /// Request timeout in seconds
    #[arg(long, default_value = "120")]
    timeout_secs: u64,

    /// Build prompts but never call the API
    #[arg(long)]
    dry_run: bool,
}

#[derive(clap::Args, Debug, Clone)]
struct SizingArgs {
    /// Maximum position size (1.0 = 100%)
    #[arg(long, default_value = "1.0")]
    max_position_size: f64,

    /// Minimum confidence required to take a trade
    #[arg(long, default_value = "0.6")]
    min_confidence: f64,

    /// Minimum risk/reward ratio required
    #[arg(long, default_value = "1.5")]
    min_risk_reward: f64,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run decision cycles in a loop until Ctrl-C
    Run {
        /// Symbols to trade (comma-separated)
        #[arg(short, long, default_value = "SPY")]
        symbols: String,

        /// Seconds between decision cycles
        #[arg(short, long, default_value = "60")]
        interval: u64,

        #[command(flatten)]
        llm: LlmArgs,

        #[command(flatten)]
        sizing: SizingArgs,
    },

    /// Run a single decision cycle and print the decision as JSON
    Once {
        /// Symbol to trade
        #[arg(short, long, default_value = "SPY")]
        symbol: String,

        /// Evaluate as of this RFC 3339 time instead of the latest bar
        #[arg(long)]
        end: Option<DateTime<Utc>>,

        #[command(flatten)]
        llm: LlmArgs,

        #[command(flatten)]
        sizing: SizingArgs,
    },

    /// Print the order flow and regime analysis without calling the LLM
    Analyze {
        /// Symbol to analyze
        #[arg(short, long, default_value = "SPY")]
        symbol: String,

        /// Evaluate as of this RFC 3339 time instead of the latest bar
        #[arg(long)]
        end: Option<DateTime<Utc>>,
    },

    /// Check DeepSeek API connectivity
    Ping {
        #[command(flatten)]
        llm: LlmArgs,
    },
}

fn build_market_data(args: &Args) -> Arc<dyn MarketDataProvider> {
    match &args.data_dir {
        Some(dir) => {
            info!("Market data: CSV files in {:?}", dir);
            Arc::new(CsvMarketData::new(dir.clone()))
        }
        None => {
            info!("Market data: synthetic feed (seed {})", args.seed);
            Arc::new(SyntheticMarketData::new(SyntheticConfig {
                seed: args.seed,
                ..Default::default()
            }))
        }
    }
}

fn build_provider(llm: &LlmArgs) -> Result<DeepSeekProvider> {
    let api_key = match (&llm.api_key, llm.dry_run) {
        (Some(key), _) => key.clone(),
        (None, true) => String::new(),
        (None, false) => {
            anyhow::bail!("DEEPSEEK_API_KEY not set (use --dry-run to skip the API)")
        }
    };

    DeepSeekProvider::new(DeepSeekConfig {
        api_key,
        base_url: llm.base_url.clone(),
        model: llm.model.clone(),
        timeout: Duration::from_secs(llm.timeout_secs),
        dry_run: llm.dry_run,
    })
}

fn build_bot_config(symbol: &str, interval: Duration, sizing: &SizingArgs) -> BotConfig {
    BotConfig {
        symbol: symbol.to_uppercase(),
        update_interval: interval,
        max_position_size: sizing.max_position_size,
        min_confidence: sizing.min_confidence,
        min_risk_reward: sizing.min_risk_reward,
        ..Default::default()
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    let args = Args::parse();

    // Initialize tracing
    let directive = if args.verbose {
        "orderflow_trader=debug"
    } else {
        "orderflow_trader=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(directive.parse().context("Invalid log directive")?),
        )
        .init();

    let market_data = build_market_data(&args);

    match &args.command {
        Commands::Run {
            symbols,
            interval,
            llm,
            sizing,
        } => {
            let provider = Arc::new(build_provider(llm)?);
            let symbols: Vec<String> = symbols
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();

            info!("Starting orderflow trader");
            info!("Symbols: {}", symbols.join(", "));
            info!("Interval: {}s", interval);
            if provider.is_dry_run() {
                info!("Dry run: prompts are logged, no API calls are made");
            }

            let (shutdown_tx, shutdown_rx) = watch::channel(false);

            // One independent bot per symbol
            let mut handles = Vec::new();
            for symbol in &symbols {
                let config = build_bot_config(symbol, Duration::from_secs(*interval), sizing);
                let bot = TradingBot::new(config, market_data.clone(), provider.clone());
                let rx = shutdown_rx.clone();
                handles.push(tokio::spawn(async move { bot.run_live(rx).await }));
            }

            tokio::signal::ctrl_c()
                .await
                .context("Failed to listen for Ctrl-C")?;
            info!("Shutdown requested");
            if shutdown_tx.send(true).is_err() {
                info!("All bot tasks already stopped");
            }

            for handle in handles {
                if let Err(e) = handle.await {
                    error!("Bot task failed: {}", e);
                }
            }
        }

        Commands::Once {
            symbol,
            end,
            llm,
            sizing,
        } => {
            let provider = Arc::new(build_provider(llm)?);
            let config = build_bot_config(symbol, Duration::from_secs(60), sizing);
            let bot = TradingBot::new(config, market_data.clone(), provider);

            let decision = bot.get_trading_decision(*end).await;
            println!("{}", serde_json::to_string_pretty(&decision)?);
        }

        Commands::Analyze { symbol, end } => {
            let symbol = symbol.to_uppercase();
            let frames = market_data
                .fetch_multi_timeframe(&symbol, *end)
                .await
                .with_context(|| format!("Failed to fetch market data for {}", symbol))?;

            let report = OrderFlowAnalyzer::default().analyze(&frames.min1);
            let regime = HeuristicRegimeDetector::default().detect(&frames.hourly, &frames.min15);

            let output = serde_json::json!({
                "symbol": symbol,
                "current_price": frames.current_price(),
                "bars": {
                    "1h": frames.hourly.len(),
                    "15m": frames.min15.len(),
                    "5m": frames.min5.len(),
                    "1m": frames.min1.len(),
                },
                "market_regime": regime,
                "order_flow": report,
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }

        Commands::Ping { llm } => {
            let provider = build_provider(llm)?;
            match provider.ping().await {
                Ok(()) => info!("DeepSeek API reachable at {}", llm.base_url),
                Err(e) => {
                    error!("API test failed ({}): {}", e.kind(), e);
                    return Err(e.into());
                }
            }
        }
    }

    Ok(())
}
