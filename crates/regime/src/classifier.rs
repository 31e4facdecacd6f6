use crate::error::RegimeError;
use crate::model::RegimeModel;
use chrono::{DateTime, Utc};
use core_types::{MarketFeatures, MarketRegimeSnapshot, RegimeLabel};

/// A committed change of regime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegimeChange {
    /// `None` for the first label the classifier ever commits.
    pub from: Option<RegimeLabel>,
    pub to: RegimeLabel,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RegimeObservation {
    /// The snapshot to publish, carrying the committed (not the raw) label.
    pub snapshot: MarketRegimeSnapshot,
    /// What the model said about this sample alone.
    pub raw_label: RegimeLabel,
    pub change: Option<RegimeChange>,
}

/// Applies hysteresis on top of a [`RegimeModel`].
///
/// The first sample commits immediately. After that a different label has to
/// be reported for `hysteresis_samples` consecutive samples before the
/// classifier switches to it; any sample agreeing with the committed label
/// resets the count.
pub struct RegimeClassifier {
    model: Box<dyn RegimeModel>,
    hysteresis_samples: usize,
    committed: Option<RegimeLabel>,
    pending: Option<(RegimeLabel, usize)>,
    last_features: Option<MarketFeatures>,
}

impl RegimeClassifier {
    pub fn new(model: Box<dyn RegimeModel>, hysteresis_samples: usize) -> Result<Self, RegimeError> {
        if hysteresis_samples == 0 {
            return Err(RegimeError::InvalidConfig(
                "hysteresis_samples must be at least 1".to_string(),
            ));
        }
        Ok(Self {
            model,
            hysteresis_samples,
            committed: None,
            pending: None,
            last_features: None,
        })
    }

    /// Resumes from a previously committed label, e.g. the last persisted
    /// snapshot. Any pending change is discarded.
    pub fn resume(&mut self, label: RegimeLabel) {
        self.committed = Some(label);
        self.pending = None;
    }

    pub fn current(&self) -> Option<RegimeLabel> {
        self.committed
    }

    pub fn model_name(&self) -> &str {
        self.model.name()
    }

    pub fn observe(&mut self, features: MarketFeatures) -> RegimeObservation {
        let raw_label = self.model.classify(&features);
        self.last_features = Some(features);

        let change = match self.committed {
            None => {
                self.committed = Some(raw_label);
                Some(RegimeChange {
                    from: None,
                    to: raw_label,
                })
            }
            Some(current) if current == raw_label => {
                self.pending = None;
                None
            }
            Some(current) => {
                let streak = match self.pending {
                    Some((label, count)) if label == raw_label => count + 1,
                    _ => 1,
                };
                if streak >= self.hysteresis_samples {
                    self.committed = Some(raw_label);
                    self.pending = None;
                    Some(RegimeChange {
                        from: Some(current),
                        to: raw_label,
                    })
                } else {
                    tracing::debug!(
                        current = %current,
                        candidate = %raw_label,
                        streak,
                        required = self.hysteresis_samples,
                        "Regime change pending"
                    );
                    self.pending = Some((raw_label, streak));
                    None
                }
            }
        };

        RegimeObservation {
            snapshot: MarketRegimeSnapshot {
                timestamp: features.timestamp,
                regime_label: self.committed.unwrap_or(raw_label),
                volatility_index: features.volatility_index,
                trend_strength: features.trend_strength,
            },
            raw_label,
            change,
        }
    }

    /// A snapshot for a sampling tick without fresh data: the committed label
    /// and the last known features, re-stamped at `timestamp`. `None` before
    /// anything has been observed.
    pub fn carry_forward(&self, timestamp: DateTime<Utc>) -> Option<MarketRegimeSnapshot> {
        let label = self.committed?;
        let (volatility_index, trend_strength) = self
            .last_features
            .map(|f| (f.volatility_index, f.trend_strength))
            .unwrap_or((0.0, 0.0));
        Some(MarketRegimeSnapshot {
            timestamp,
            regime_label: label,
            volatility_index,
            trend_strength,
        })
    }
}
