use crate::error::ApiError;
use crate::feed::{MarketDataFeed, features_from};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use configuration::RegimeConfig;
use core_types::{Candle, MarketFeatures};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::StandardNormal;
use rust_decimal::Decimal;
use rust_decimal::prelude::FromPrimitive;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Shape of a generated market.
#[derive(Debug, Clone)]
pub struct SyntheticMarket {
    pub start: DateTime<Utc>,
    pub interval: Duration,
    pub count: usize,
    pub start_price: f64,
    /// Candles per phase; each phase is calm, trending or turbulent.
    pub phase_length: usize,
}

#[derive(Debug, Clone, Copy)]
enum Phase {
    Calm,
    Trend(f64),
    Turbulent,
}

impl Phase {
    /// Per-candle drift and volatility of returns.
    fn drift_and_sigma(self) -> (f64, f64) {
        match self {
            Phase::Calm => (0.0, 0.004),
            Phase::Trend(direction) => (0.003 * direction, 0.004),
            Phase::Turbulent => (0.0, 0.03),
        }
    }
}

fn to_price(value: f64) -> Decimal {
    Decimal::from_f64(value).unwrap_or_default().round_dp(2)
}

/// Generates a reproducible random walk that alternates between market phases.
pub fn synthetic_candles(market: &SyntheticMarket, seed: u64) -> Vec<Candle> {
    let mut rng = StdRng::seed_from_u64(seed);
    let phase_length = market.phase_length.max(1);
    let mut price = market.start_price.max(1.0);
    let mut phase = Phase::Calm;
    let mut candles = Vec::with_capacity(market.count);

    for i in 0..market.count {
        if i % phase_length == 0 {
            phase = match rng.gen_range(0..3) {
                0 => Phase::Calm,
                1 => Phase::Trend(if rng.r#gen::<bool>() { 1.0 } else { -1.0 }),
                _ => Phase::Turbulent,
            };
        }
        let (drift, sigma) = phase.drift_and_sigma();
        let shock: f64 = rng.sample(StandardNormal);
        let wick: f64 = rng.sample::<f64, _>(StandardNormal).abs() * sigma * 0.5;

        let open = price;
        let close = (open * (1.0 + drift + sigma * shock)).max(0.01);
        let high = open.max(close) * (1.0 + wick);
        let low = open.min(close) * (1.0 - wick).max(0.5);
        let open_time = market.start + market.interval * i as i32;

        candles.push(Candle {
            open_time,
            close_time: open_time + market.interval - Duration::milliseconds(1),
            open: to_price(open),
            high: to_price(high),
            low: to_price(low),
            close: to_price(close),
            volume: to_price(100.0 + rng.gen_range(0.0..50.0)),
        });
        price = close;
    }
    candles
}

/// Serves a fixed candle history as if it were arriving live.
///
/// Only candles before the cursor are visible; [`ReplayFeed::advance`] moves
/// the cursor forward, which is how offline runs step through time.
pub struct ReplayFeed {
    candles: Vec<Candle>,
    cursor: AtomicUsize,
    regime: RegimeConfig,
}

impl ReplayFeed {
    pub fn new(candles: Vec<Candle>, regime: RegimeConfig) -> Self {
        Self {
            candles,
            cursor: AtomicUsize::new(0),
            regime,
        }
    }

    pub fn synthetic(market: &SyntheticMarket, seed: u64, regime: RegimeConfig) -> Self {
        Self::new(synthetic_candles(market, seed), regime)
    }

    /// Moves the cursor forward by `steps` candles and returns the new cursor.
    pub fn advance(&self, steps: usize) -> usize {
        let total = self.candles.len();
        let previous = self
            .cursor
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |c| Some((c + steps).min(total)))
            .unwrap_or(total);
        (previous + steps).min(total)
    }

    pub fn cursor(&self) -> usize {
        self.cursor.load(Ordering::SeqCst)
    }

    pub fn is_exhausted(&self) -> bool {
        self.cursor() >= self.candles.len()
    }

    /// Candles released so far.
    pub fn visible(&self) -> &[Candle] {
        &self.candles[..self.cursor().min(self.candles.len())]
    }

    /// Close time of the latest visible candle.
    pub fn now(&self) -> Option<DateTime<Utc>> {
        self.visible().last().map(|c| c.close_time)
    }
}

#[async_trait]
impl MarketDataFeed for ReplayFeed {
    async fn get_candles(&self, _symbol: &str, _timeframe: &str, count: usize) -> Result<Vec<Candle>, ApiError> {
        let visible = self.visible();
        Ok(visible[visible.len().saturating_sub(count)..].to_vec())
    }

    async fn get_live_snapshot(&self, symbol: &str) -> Result<MarketFeatures, ApiError> {
        let candles = self
            .get_candles(symbol, "", self.regime.warmup_candles())
            .await?;
        features_from(&candles, &self.regime)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn market(count: usize) -> SyntheticMarket {
        SyntheticMarket {
            start: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            interval: Duration::hours(1),
            count,
            start_price: 30_000.0,
            phase_length: 96,
        }
    }

    #[test]
    fn same_seed_same_market() {
        assert_eq!(synthetic_candles(&market(300), 11), synthetic_candles(&market(300), 11));
        assert_ne!(synthetic_candles(&market(300), 11), synthetic_candles(&market(300), 12));
    }

    #[test]
    fn candles_are_well_formed() {
        let candles = synthetic_candles(&market(500), 5);
        for pair in candles.windows(2) {
            assert!(pair[0].close_time < pair[1].open_time);
        }
        for c in &candles {
            assert!(c.low <= c.open.min(c.close) && c.high >= c.open.max(c.close));
            assert!(c.low > Decimal::ZERO);
        }
    }

    #[tokio::test]
    async fn only_released_candles_are_served() {
        let feed = ReplayFeed::synthetic(&market(200), 1, RegimeConfig::default());
        assert!(feed.get_candles("BTCUSDT", "1h", 10).await.unwrap().is_empty());
        assert!(feed.get_live_snapshot("BTCUSDT").await.is_err());

        assert_eq!(feed.advance(120), 120);
        let recent = feed.get_candles("BTCUSDT", "1h", 10).await.unwrap();
        assert_eq!(recent.len(), 10);
        assert_eq!(recent.last().map(|c| c.close_time), feed.now());

        let snapshot = feed.get_live_snapshot("BTCUSDT").await.unwrap();
        assert!(snapshot.volatility_index > 0.0);

        assert_eq!(feed.advance(500), 200);
        assert!(feed.is_exhausted());
    }
}
