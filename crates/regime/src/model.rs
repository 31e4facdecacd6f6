use crate::error::RegimeError;
use configuration::RegimeConfig;
use core_types::{MarketFeatures, RegimeLabel};

/// Assigns a regime label to a single sample of market features.
pub trait RegimeModel: Send + Sync {
    fn classify(&self, features: &MarketFeatures) -> RegimeLabel;

    fn name(&self) -> &str;
}

/// Fixed threshold rules.
///
/// Volatility takes precedence: a sample at or above the volatility threshold
/// is `Volatile` whatever its trend. Otherwise a trend strength at or above the
/// trend threshold is `Trending`, and anything else is `Ranging`.
#[derive(Debug, Clone)]
pub struct ThresholdModel {
    volatility_threshold: f64,
    trend_threshold: f64,
}

impl ThresholdModel {
    pub fn new(volatility_threshold: f64, trend_threshold: f64) -> Result<Self, RegimeError> {
        if !(volatility_threshold > 0.0 && trend_threshold > 0.0) {
            return Err(RegimeError::InvalidConfig(format!(
                "thresholds must be positive, got volatility={volatility_threshold} trend={trend_threshold}"
            )));
        }
        Ok(Self {
            volatility_threshold,
            trend_threshold,
        })
    }

    pub fn from_config(config: &RegimeConfig) -> Result<Self, RegimeError> {
        Self::new(config.volatility_threshold, config.trend_threshold)
    }
}

impl RegimeModel for ThresholdModel {
    fn classify(&self, features: &MarketFeatures) -> RegimeLabel {
        if features.volatility_index >= self.volatility_threshold {
            RegimeLabel::Volatile
        } else if features.trend_strength >= self.trend_threshold {
            RegimeLabel::Trending
        } else {
            RegimeLabel::Ranging
        }
    }

    fn name(&self) -> &str {
        "threshold"
    }
}
