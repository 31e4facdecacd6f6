use alerter::{notifier_from_config, run_alerter_service};
use anyhow::Context;
use api_client::{BINANCE_FUTURES_URL, BinanceFeed};
use clap::{Parser, Subcommand};
use comfy_table::{Table, presets::UTF8_FULL};
use configuration::{Config, ConfigOverrides, StoreBackend, init_tracing, load_config};
use core_types::TradingMode;
use database::connection::{connect, run_migrations};
use database::{InMemoryStore, PgStore, PopulationStore};
use engine::{
    CycleSummary, EvolutionDriver, EvolutionEngine, RegimeSampler, ShadowTrader, Simulation,
    SimulationOptions,
};
use executor::PaperConnector;
use futures::future::join_all;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, watch};

/// Request timeout for the exchange market-data feed.
const FEED_TIMEOUT: Duration = Duration::from_secs(10);

/// Shadow trades buffered between the trader and the collector.
const TRADE_CHANNEL_CAPACITY: usize = 1024;

/// The main entry point for the Evolver strategy engine.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Secrets such as DATABASE_URL may live in a .env file; it is optional.
    dotenvy::dotenv().ok();

    // Parse command-line arguments
    let cli = Cli::parse();
    let overrides = ConfigOverrides {
        store_backend: cli.store,
        seed: cli.seed,
    };
    let config = load_config(cli.config.as_deref(), overrides).context("Failed to load configuration")?;
    let _guard = init_tracing(&config).context("Failed to initialize tracing")?;

    // Execute the appropriate command
    match cli.command {
        Commands::Run => handle_run(config).await,
        Commands::Simulate(args) => handle_simulate(config, args).await,
        Commands::ShowConfig => {
            println!("{}", config.to_pretty_json()?);
            Ok(())
        }
    }
}

// ==============================================================================
// CLI Structure
// ==============================================================================

/// Evolves a population of trading strategies and keeps the fittest trading.
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to a TOML configuration file. Defaults to ./config.toml if present.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Overrides the configured store backend.
    #[arg(long, global = true, value_enum)]
    store: Option<StoreBackend>,

    /// Seed for reproducible evolution.
    #[arg(long, global = true)]
    seed: Option<u64>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the engine: regime sampler, shadow trader, alerter and evolution driver.
    Run,
    /// Run a deterministic offline evolution loop over synthetic candles.
    Simulate(SimulateArgs),
    /// Print the validated effective configuration as JSON.
    ShowConfig,
}

#[derive(Parser)]
struct SimulateArgs {
    /// Number of evolution cycles to run.
    #[arg(long, default_value_t = 10)]
    cycles: usize,

    /// Candles replayed between two cycles.
    #[arg(long, default_value_t = 24)]
    candles: usize,
}

// ==============================================================================
// Run Command Logic
// ==============================================================================

/// Wires every service together and runs until Ctrl-C.
async fn handle_run(config: Config) -> anyhow::Result<()> {
    let config = Arc::new(config);
    tracing::info!(
        module = %config.module_name,
        mode = ?config.trading_mode,
        symbol = %config.market.symbol,
        "Starting evolver"
    );
    if config.trading_mode == TradingMode::Live {
        tracing::warn!("No live execution connector is configured; activations go to the paper connector");
    }

    // 1. Store
    let store = build_store(&config).await?;

    // 2. Events and alerting
    let (events_tx, _) = broadcast::channel(256);
    let mut services = Vec::new();
    if config.features.enable_alerts {
        let notifier = notifier_from_config(&config.alerts);
        services.push(tokio::spawn(run_alerter_service(notifier, events_tx.subscribe())));
    }

    // 3. Shutdown signal
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // 4. Market data and regime sampler
    let feed = Arc::new(BinanceFeed::new(
        BINANCE_FUTURES_URL,
        config.market.timeframe.clone(),
        config.regime.clone(),
        FEED_TIMEOUT,
    )?);
    if config.features.enable_market_regime_detection {
        let mut sampler = RegimeSampler::new(&config, feed.clone(), store.clone(), events_tx.clone())?;
        sampler.restore(chrono::Utc::now()).await?;
        services.push(tokio::spawn(sampler.run(shutdown_rx.clone())));
    } else {
        tracing::info!("Market regime detection disabled; ranking on aggregate fitness");
    }

    // 5. Evolution driver
    let connector = Arc::new(PaperConnector::new());
    let engine = EvolutionEngine::new(Arc::clone(&config), store, connector, events_tx.clone())?;
    let driver = EvolutionDriver::new(engine);
    drop(events_tx);

    // 6. Trade source: shadow trades of the live generation feed the collector
    let handle = driver.handle();
    let (trades_tx, trades_rx) = mpsc::channel(TRADE_CHANNEL_CAPACITY);
    services.push(tokio::spawn(handle.collector().run(trades_rx)));
    let trader = ShadowTrader::new(Arc::clone(&config), feed, handle.generations(), trades_tx)?;
    services.push(tokio::spawn(trader.run(shutdown_rx.clone())));

    let run = driver.run(shutdown_rx);
    tokio::pin!(run);
    let outcome = tokio::select! {
        outcome = &mut run => outcome,
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Ctrl-C received, shutting down");
            let _ = shutdown_tx.send(true);
            run.await
        }
    };
    // Also stops the sampler and the trader when the driver ended on its own.
    // The collector stops once the trader has dropped its sender.
    let _ = shutdown_tx.send(true);

    // The alerter stops once every event sender is gone.
    for result in join_all(services).await {
        if let Err(e) = result {
            tracing::error!(error = %e, "A background service failed");
        }
    }
    outcome?;
    tracing::info!("Evolver stopped");
    Ok(())
}

async fn build_store(config: &Config) -> anyhow::Result<Arc<dyn PopulationStore>> {
    let store: Arc<dyn PopulationStore> = match config.store.backend {
        StoreBackend::Memory => {
            tracing::warn!("Using the in-memory store; nothing survives a restart");
            Arc::new(InMemoryStore::new())
        }
        StoreBackend::Postgres => {
            let url = config
                .store
                .database_url
                .as_deref()
                .context("DATABASE_URL must be set for the postgres store")?;
            let pool = connect(url, config.store.connect_timeout).await?;
            run_migrations(&pool).await?;
            Arc::new(PgStore::new(
                pool,
                config.store.collections.clone(),
                config.store.connect_timeout,
            ))
        }
    };
    store.health_check().await.context("Store health check failed")?;
    Ok(store)
}

// ==============================================================================
// Simulate Command Logic
// ==============================================================================

async fn handle_simulate(config: Config, args: SimulateArgs) -> anyhow::Result<()> {
    let options = SimulationOptions {
        cycles: args.cycles,
        candles_per_cycle: args.candles,
        seed: config.evolution.seed.unwrap_or(SimulationOptions::default().seed),
    };
    println!(
        "Simulating {} cycles of {} candles on {} {} (seed {})",
        options.cycles, options.candles_per_cycle, config.market.symbol, config.market.timeframe, options.seed
    );

    let mut simulation = Simulation::new(config, options)?;
    let summaries = simulation.run().await?;
    println!("{}", summary_table(&summaries));

    let live = simulation.connector().active().await;
    println!("{} strategies active at the end of the run", live.len());
    Ok(())
}

fn summary_table(summaries: &[CycleSummary]) -> Table {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL).set_header(vec![
        "Gen", "Time", "Regime", "Ranked by", "Trades", "Elites", "Bred", "Active", "Candidates",
        "Retired", "Best fitness", "Notes",
    ]);

    for row in summaries {
        let report = &row.report;
        let mut notes = Vec::new();
        if report.degraded {
            notes.push("degraded".to_string());
        }
        if report.circuit_breaker_tripped {
            notes.push("breaker tripped".to_string());
        }
        if report.insufficient_data > 0 {
            notes.push(format!("{} thin", report.insufficient_data));
        }
        table.add_row(vec![
            report.generation.to_string(),
            row.at.format("%Y-%m-%d %H:%M").to_string(),
            row.regime.map_or_else(|| "-".to_string(), |r| r.to_string()),
            report.ranked_by.clone(),
            row.trades.to_string(),
            report.elites.to_string(),
            report.bred.to_string(),
            report.active.to_string(),
            report.candidates.to_string(),
            report.retired.to_string(),
            format!("{:.4}", report.best_fitness),
            notes.join(", "),
        ]);
    }
    table
}
