use core_types::{AssetClass, TradingMode};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// The root configuration structure for the entire application.
///
/// Built once at startup and handed to every component by value or behind an
/// `Arc`; nothing mutates it afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub trading_mode: TradingMode,
    pub module_name: String,
    pub log_level: String,
    /// When set, logs are also written to a daily rolling file in this directory.
    pub log_dir: Option<PathBuf>,
    pub market: MarketConfig,
    pub evolution: EvolutionConfig,
    pub fitness: FitnessConfig,
    pub regime: RegimeConfig,
    pub risk: RiskConfig,
    pub store: StoreConfig,
    pub alerts: TelegramConfig,
    pub features: FeatureFlags,
}

/// The instrument the population trades and how its data is sampled.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MarketConfig {
    pub exchange: String,
    pub symbol: String,
    /// The candle interval (e.g., "1h").
    pub timeframe: String,
    pub asset_class: AssetClass,
    pub max_historical_candles: usize,
    #[serde(with = "humantime_serde")]
    pub realtime_update_interval: Duration,
}

/// Parameters of the genetic search.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EvolutionConfig {
    pub population_size: usize,
    pub evolution_interval_hours: u64,
    pub performance_window_days: i64,
    pub mutation_rate: f64,
    pub crossover_rate: f64,
    pub elitism_count: usize,
    /// Upper bound on the number of nodes in a rule graph.
    pub max_strategy_complexity: usize,
    /// Floor applied to fitness when computing selection probabilities.
    pub selection_epsilon: f64,
    /// Standard deviation of Gaussian gene jitter, as a fraction of the gene's range.
    pub mutation_jitter: f64,
    /// How many times breeding resamples a child that duplicates a live genome.
    pub max_resample_attempts: usize,
    /// Fixes the random source so runs are reproducible.
    pub seed: Option<u64>,
}

/// Weights and normalisation caps for the composite fitness score.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FitnessConfig {
    /// Strategies with fewer trades score exactly zero.
    pub min_trade_count: u32,
    /// Below this many ranked strategies, a regime bucket falls back to the aggregate score.
    pub min_regime_population: usize,
    pub weight_profit_factor: f64,
    pub weight_sharpe: f64,
    pub weight_drawdown: f64,
    pub profit_factor_cap: f64,
    pub sharpe_cap: f64,
    pub drawdown_scale_pct: f64,
}

/// Threshold rules and hysteresis for the regime classifier.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RegimeConfig {
    /// ATR as a percentage of price at or above which the market is volatile.
    pub volatility_threshold: f64,
    /// Fast/slow EMA spread in ATRs at or above which the market is trending.
    pub trend_threshold: f64,
    /// Consecutive samples a new label must persist before it is committed.
    pub hysteresis_samples: usize,
    #[serde(with = "humantime_serde")]
    pub sample_interval: Duration,
    pub atr_period: usize,
    pub fast_period: usize,
    pub slow_period: usize,
}

/// Contains parameters for strategy-level and portfolio-level risk management.
/// All percentages are of account equity.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskConfig {
    pub max_position_size_pct: Decimal,
    /// The smallest position a strategy can usefully trade with.
    pub min_position_size_pct: Decimal,
    pub max_portfolio_risk_pct: Decimal,
    pub stop_loss_pct: Decimal,
    pub take_profit_pct: Decimal,
    pub max_daily_loss_pct: Decimal,
    pub max_concurrent_trades: u32,
    pub account_equity: Decimal,
    /// How strongly historical drawdown shrinks a strategy's position size.
    pub drawdown_sensitivity: Decimal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "clap", derive(clap::ValueEnum))]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    Memory,
    Postgres,
}

/// Persistence settings for the population store.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub backend: StoreBackend,
    /// Falls back to the `DATABASE_URL` environment variable when absent.
    pub database_url: Option<String>,
    pub max_retries: u32,
    #[serde(with = "humantime_serde")]
    pub retry_base_delay: Duration,
    #[serde(with = "humantime_serde")]
    pub connect_timeout: Duration,
    pub collections: Collections,
}

/// Names of the logical collections (tables) the store writes to.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Collections {
    pub strategies: String,
    pub performance: String,
    pub market_state: String,
    pub trade_logs: String,
    pub generations: String,
}

/// Telegram credentials. Empty values disable Telegram delivery.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TelegramConfig {
    pub telegram_token: String,
    pub telegram_chat_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureFlags {
    pub enable_auto_evolution: bool,
    pub enable_alerts: bool,
    pub enable_performance_tracking: bool,
    pub enable_market_regime_detection: bool,
}

// --- Default Implementations ---
// These allow any section to be omitted from the toml file.

impl Default for Config {
    fn default() -> Self {
        Self {
            trading_mode: TradingMode::Paper,
            module_name: "evolver_v1".to_string(),
            log_level: "info".to_string(),
            log_dir: None,
            market: MarketConfig::default(),
            evolution: EvolutionConfig::default(),
            fitness: FitnessConfig::default(),
            regime: RegimeConfig::default(),
            risk: RiskConfig::default(),
            store: StoreConfig::default(),
            alerts: TelegramConfig::default(),
            features: FeatureFlags::default(),
        }
    }
}

impl Default for MarketConfig {
    fn default() -> Self {
        Self {
            exchange: "binance".to_string(),
            symbol: "BTCUSDT".to_string(),
            timeframe: "1h".to_string(),
            asset_class: AssetClass::Crypto,
            max_historical_candles: 1000,
            realtime_update_interval: Duration::from_secs(60),
        }
    }
}

impl Default for EvolutionConfig {
    fn default() -> Self {
        Self {
            population_size: 10,
            evolution_interval_hours: 24,
            performance_window_days: 30,
            mutation_rate: 0.1,
            crossover_rate: 0.7,
            elitism_count: 2,
            max_strategy_complexity: 50,
            selection_epsilon: 1e-6,
            mutation_jitter: 0.1,
            max_resample_attempts: 8,
            seed: None,
        }
    }
}

impl Default for FitnessConfig {
    fn default() -> Self {
        Self {
            min_trade_count: 5,
            min_regime_population: 2,
            weight_profit_factor: 0.4,
            weight_sharpe: 0.4,
            weight_drawdown: 0.2,
            profit_factor_cap: 5.0,
            sharpe_cap: 3.0,
            drawdown_scale_pct: 10.0,
        }
    }
}

impl Default for RegimeConfig {
    fn default() -> Self {
        Self {
            volatility_threshold: 3.0,
            trend_threshold: 1.0,
            hysteresis_samples: 3,
            sample_interval: Duration::from_secs(15 * 60),
            atr_period: 14,
            fast_period: 12,
            slow_period: 26,
        }
    }
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            max_position_size_pct: dec!(2.0),
            min_position_size_pct: dec!(0.25),
            max_portfolio_risk_pct: dec!(5.0),
            stop_loss_pct: dec!(2.0),
            take_profit_pct: dec!(4.0),
            max_daily_loss_pct: dec!(3.0),
            max_concurrent_trades: 5,
            account_equity: dec!(10000),
            drawdown_sensitivity: dec!(1.0),
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::Memory,
            database_url: None,
            max_retries: 5,
            retry_base_delay: Duration::from_millis(200),
            connect_timeout: Duration::from_secs(5),
            collections: Collections::default(),
        }
    }
}

impl Default for Collections {
    fn default() -> Self {
        Self {
            strategies: "strategies".to_string(),
            performance: "performance_records".to_string(),
            market_state: "market_state".to_string(),
            trade_logs: "trade_logs".to_string(),
            generations: "generations".to_string(),
        }
    }
}

impl Default for FeatureFlags {
    fn default() -> Self {
        Self {
            enable_auto_evolution: true,
            enable_alerts: true,
            enable_performance_tracking: true,
            enable_market_regime_detection: true,
        }
    }
}

impl EvolutionConfig {
    pub fn evolution_interval(&self) -> Duration {
        Duration::from_secs(self.evolution_interval_hours * 3600)
    }
}

impl RegimeConfig {
    /// Candles fetched per sample so the slowest indicator has settled.
    pub fn warmup_candles(&self) -> usize {
        self.slow_period.max(self.atr_period) * 3
    }
}
