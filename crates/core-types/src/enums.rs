use crate::error::CoreError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    /// Returns the opposite side of the order
    pub fn opposite(&self) -> Self {
        match self {
            OrderSide::Buy => OrderSide::Sell,
            OrderSide::Sell => OrderSide::Buy,
        }
    }
}

/// The classified condition of the market during a sample or evaluation window.
///
/// The set is deliberately small and closed: fitness is bucketed by label, so
/// every label needs enough strategies behind it to be ranked meaningfully.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RegimeLabel {
    Trending,
    Ranging,
    Volatile,
}

impl RegimeLabel {
    pub const ALL: [RegimeLabel; 3] = [
        RegimeLabel::Trending,
        RegimeLabel::Ranging,
        RegimeLabel::Volatile,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RegimeLabel::Trending => "trending",
            RegimeLabel::Ranging => "ranging",
            RegimeLabel::Volatile => "volatile",
        }
    }
}

impl fmt::Display for RegimeLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RegimeLabel {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "trending" => Ok(RegimeLabel::Trending),
            "ranging" => Ok(RegimeLabel::Ranging),
            "volatile" => Ok(RegimeLabel::Volatile),
            other => Err(CoreError::UnknownRegime(other.to_string())),
        }
    }
}

/// Lifecycle state of a genome inside the population.
///
/// `Candidate` genomes are members of the generation that the risk governor
/// held back; `Active` genomes may influence real decisions; `Retired` genomes
/// are archived or halted for the day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GenomeStatus {
    Candidate,
    Active,
    Retired,
}

impl GenomeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            GenomeStatus::Candidate => "candidate",
            GenomeStatus::Active => "active",
            GenomeStatus::Retired => "retired",
        }
    }
}

impl fmt::Display for GenomeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GenomeStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "candidate" => Ok(GenomeStatus::Candidate),
            "active" => Ok(GenomeStatus::Active),
            "retired" => Ok(GenomeStatus::Retired),
            other => Err(CoreError::UnknownStatus(other.to_string())),
        }
    }
}

/// How the process is wired to the outside world.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradingMode {
    Backtest,
    Paper,
    Live,
    Simulation,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssetClass {
    Crypto,
    Stocks,
    Forex,
    Futures,
}
