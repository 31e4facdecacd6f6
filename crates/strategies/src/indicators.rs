use crate::error::StrategyError;
use crate::rule_graph::{FeatureVector, IndicatorKey, IndicatorKind};
use core_types::Candle;
use rust_decimal::prelude::*;
use ta::indicators::{
    AverageTrueRange, ExponentialMovingAverage, RateOfChange, RelativeStrengthIndex,
    SimpleMovingAverage, StandardDeviation,
};
use ta::{Close, High, Low, Next};

/// A candle converted to the `f64` representation the `ta` crate works with.
struct Bar {
    high: f64,
    low: f64,
    close: f64,
}

impl From<&Candle> for Bar {
    fn from(candle: &Candle) -> Self {
        Self {
            high: candle.high.to_f64().unwrap_or_default(),
            low: candle.low.to_f64().unwrap_or_default(),
            close: candle.close.to_f64().unwrap_or_default(),
        }
    }
}

impl High for Bar {
    fn high(&self) -> f64 {
        self.high
    }
}

impl Low for Bar {
    fn low(&self) -> f64 {
        self.low
    }
}

impl Close for Bar {
    fn close(&self) -> f64 {
        self.close
    }
}

enum Calculator {
    Close,
    Sma(SimpleMovingAverage),
    Ema(ExponentialMovingAverage),
    Rsi(RelativeStrengthIndex),
    Atr(AverageTrueRange),
    StdDev(StandardDeviation),
    Roc(RateOfChange),
}

impl Calculator {
    fn new(key: IndicatorKey) -> Result<Self, StrategyError> {
        let err = |e| StrategyError::IndicatorError(format!("{:?} period {}: {:?}", key.kind, key.period, e));
        Ok(match key.kind {
            IndicatorKind::Close => Calculator::Close,
            IndicatorKind::Sma => Calculator::Sma(SimpleMovingAverage::new(key.period).map_err(err)?),
            IndicatorKind::Ema => {
                Calculator::Ema(ExponentialMovingAverage::new(key.period).map_err(err)?)
            }
            IndicatorKind::Rsi => Calculator::Rsi(RelativeStrengthIndex::new(key.period).map_err(err)?),
            IndicatorKind::Atr => Calculator::Atr(AverageTrueRange::new(key.period).map_err(err)?),
            IndicatorKind::StdDev => {
                Calculator::StdDev(StandardDeviation::new(key.period).map_err(err)?)
            }
            IndicatorKind::Roc => Calculator::Roc(RateOfChange::new(key.period).map_err(err)?),
        })
    }

    fn next(&mut self, bar: &Bar) -> f64 {
        match self {
            Calculator::Close => bar.close,
            Calculator::Sma(i) => i.next(bar.close),
            Calculator::Ema(i) => i.next(bar.close),
            Calculator::Rsi(i) => i.next(bar.close),
            Calculator::Atr(i) => i.next(bar),
            Calculator::StdDev(i) => i.next(bar.close),
            Calculator::Roc(i) => i.next(bar.close),
        }
    }
}

/// Incrementally updated indicators for one rule graph.
pub struct IndicatorSet {
    calculators: Vec<(IndicatorKey, Calculator)>,
    warmup: usize,
    seen: usize,
}

impl IndicatorSet {
    pub fn new(keys: impl IntoIterator<Item = IndicatorKey>) -> Result<Self, StrategyError> {
        let calculators = keys
            .into_iter()
            .map(|key| Ok((key, Calculator::new(key)?)))
            .collect::<Result<Vec<_>, StrategyError>>()?;
        let warmup = calculators.iter().map(|(k, _)| k.period).max().unwrap_or(0);
        Ok(Self {
            calculators,
            warmup,
            seen: 0,
        })
    }

    /// Feeds one candle and returns the latest value of every indicator.
    pub fn next(&mut self, candle: &Candle) -> FeatureVector {
        let bar = Bar::from(candle);
        self.seen += 1;
        let mut features = FeatureVector::default();
        for (key, calculator) in &mut self.calculators {
            features.insert(*key, calculator.next(&bar));
        }
        features
    }

    /// True once every indicator has seen a full lookback of candles.
    pub fn is_warm(&self) -> bool {
        self.seen >= self.warmup
    }
}
