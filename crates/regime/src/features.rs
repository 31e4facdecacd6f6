use crate::error::RegimeError;
use configuration::RegimeConfig;
use core_types::{Candle, MarketFeatures};
use rust_decimal::prelude::*;
use ta::indicators::{AverageTrueRange, ExponentialMovingAverage};
use ta::{Close, High, Low, Next};

struct Bar {
    high: f64,
    low: f64,
    close: f64,
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

/// Derives regime features from an ordered window of candles.
///
/// `volatility_index` is the ATR as a percentage of the last close.
/// `trend_strength` is the distance between the fast and slow EMAs measured in
/// ATRs, so it is comparable across price levels.
pub fn compute_features(candles: &[Candle], config: &RegimeConfig) -> Result<MarketFeatures, RegimeError> {
    let needed = config.slow_period.max(config.atr_period);
    let Some(last) = candles.last() else {
        return Err(RegimeError::InsufficientCandles { needed, got: 0 });
    };
    if candles.len() < needed {
        return Err(RegimeError::InsufficientCandles {
            needed,
            got: candles.len(),
        });
    }

    let indicator_err = |e| RegimeError::Indicator(format!("{e:?}"));
    let mut atr = AverageTrueRange::new(config.atr_period).map_err(indicator_err)?;
    let mut fast = ExponentialMovingAverage::new(config.fast_period).map_err(indicator_err)?;
    let mut slow = ExponentialMovingAverage::new(config.slow_period).map_err(indicator_err)?;

    let (mut atr_value, mut fast_value, mut slow_value) = (0.0, 0.0, 0.0);
    for candle in candles {
        let bar = Bar {
            high: candle.high.to_f64().unwrap_or_default(),
            low: candle.low.to_f64().unwrap_or_default(),
            close: candle.close.to_f64().unwrap_or_default(),
        };
        atr_value = atr.next(&bar);
        fast_value = fast.next(bar.close);
        slow_value = slow.next(bar.close);
    }

    let price = last.close.to_f64().unwrap_or_default();
    let volatility_index = if price > 0.0 { atr_value / price * 100.0 } else { 0.0 };
    let trend_strength = if atr_value > 0.0 {
        (fast_value - slow_value).abs() / atr_value
    } else {
        0.0
    };

    Ok(MarketFeatures {
        timestamp: last.close_time,
        price,
        volatility_index,
        trend_strength,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};
    use rust_decimal_macros::dec;

    fn series(closes: impl Iterator<Item = Decimal>, spread: Decimal) -> Vec<Candle> {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        closes
            .enumerate()
            .map(|(i, close)| {
                let open_time = start + Duration::hours(i as i64);
                Candle {
                    open_time,
                    close_time: open_time + Duration::hours(1),
                    open: close,
                    high: close + spread,
                    low: close - spread,
                    close,
                    volume: dec!(1),
                }
            })
            .collect()
    }

    #[test]
    fn steady_climb_is_a_strong_trend() {
        let candles = series((0..60).map(|i| dec!(100) + Decimal::from(i)), dec!(0.5));
        let features = compute_features(&candles, &RegimeConfig::default()).unwrap();
        assert!(features.trend_strength > 1.0);
        assert!(features.volatility_index < 3.0);
        assert_eq!(features.timestamp, candles[59].close_time);
    }

    #[test]
    fn wide_ranges_are_volatile() {
        let candles = series((0..60).map(|_| dec!(100)), dec!(5));
        let features = compute_features(&candles, &RegimeConfig::default()).unwrap();
        assert!(features.volatility_index >= 3.0);
        assert!(features.trend_strength < 0.1);
    }

    #[test]
    fn short_windows_are_rejected() {
        let candles = series((0..10).map(|_| dec!(100)), dec!(1));
        assert_eq!(
            compute_features(&candles, &RegimeConfig::default()),
            Err(RegimeError::InsufficientCandles { needed: 26, got: 10 })
        );
    }
}
