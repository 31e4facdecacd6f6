use crate::error::EventsError;
use chrono::{DateTime, Utc};
use core_types::RegimeLabel;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Enum representing the severity of a log message for structured logging.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogLevel {
    Info,
    Warn,
    Error,
}

/// A structured log message for observers of the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogMessage {
    pub timestamp: DateTime<Utc>,
    pub level: LogLevel,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegimeChanged {
    pub timestamp: DateTime<Utc>,
    /// `None` when this is the first label committed since startup.
    pub from: Option<RegimeLabel>,
    pub to: RegimeLabel,
    pub volatility_index: f64,
    pub trend_strength: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CircuitBreakerTripped {
    pub timestamp: DateTime<Utc>,
    pub loss_pct: Decimal,
    pub limit_pct: Decimal,
    /// Number of genomes retired for the rest of the day.
    pub retired: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationPublished {
    pub timestamp: DateTime<Utc>,
    pub generation: u32,
    pub active: usize,
    pub candidates: usize,
    pub retired: usize,
    /// How the population was ranked, e.g. "trending" or "aggregate".
    pub ranked_by: String,
    pub best_fitness: f64,
    /// Set when no genome had enough data and breeding fell back to mutation only.
    pub degraded: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CycleFailed {
    pub timestamp: DateTime<Utc>,
    pub generation: u32,
    pub reason: String,
}

/// Everything the engine announces to the outside world.
///
/// Serialized with `#[serde(tag = "type", content = "payload")]`, e.g.
/// `{ "type": "RegimeChanged", "payload": { "to": "volatile", ... } }`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum EngineEvent {
    Log(LogMessage),
    RegimeChanged(RegimeChanged),
    CircuitBreakerTripped(CircuitBreakerTripped),
    GenerationPublished(GenerationPublished),
    CycleFailed(CycleFailed),
}

impl EngineEvent {
    pub fn log(level: LogLevel, message: impl Into<String>) -> Self {
        EngineEvent::Log(LogMessage {
            timestamp: Utc::now(),
            level,
            message: message.into(),
        })
    }

    /// Whether the event warrants an operator notification.
    pub fn is_alertable(&self) -> bool {
        match self {
            EngineEvent::Log(log) => log.level == LogLevel::Error,
            _ => true,
        }
    }

    /// A one-line human readable description.
    pub fn summary(&self) -> String {
        match self {
            EngineEvent::Log(log) => format!("[{:?}] {}", log.level, log.message),
            EngineEvent::RegimeChanged(e) => match e.from {
                Some(from) => format!(
                    "Regime changed: {from} -> {} (volatility {:.2}, trend {:.2})",
                    e.to, e.volatility_index, e.trend_strength
                ),
                None => format!("Regime detected: {}", e.to),
            },
            EngineEvent::CircuitBreakerTripped(e) => format!(
                "Circuit breaker tripped: daily loss {}% exceeds {}%. {} strategies retired for the day",
                e.loss_pct.round_dp(2),
                e.limit_pct,
                e.retired
            ),
            EngineEvent::GenerationPublished(e) => format!(
                "Generation {} published: {} active, {} held back, {} retired. Best fitness {:.3} ({}){}",
                e.generation,
                e.active,
                e.candidates,
                e.retired,
                e.best_fitness,
                e.ranked_by,
                if e.degraded { ", degraded" } else { "" }
            ),
            EngineEvent::CycleFailed(e) => {
                format!("Evolution cycle for generation {} failed: {}", e.generation, e.reason)
            }
        }
    }

    pub fn to_json(&self) -> Result<String, EventsError> {
        serde_json::to_string(self).map_err(|e| EventsError::Serialization(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_with_type_and_payload() {
        let event = EngineEvent::RegimeChanged(RegimeChanged {
            timestamp: Utc::now(),
            from: Some(RegimeLabel::Ranging),
            to: RegimeLabel::Volatile,
            volatility_index: 4.2,
            trend_strength: 0.3,
        });
        let json: serde_json::Value = serde_json::from_str(&event.to_json().unwrap()).unwrap();
        assert_eq!(json["type"], "RegimeChanged");
        assert_eq!(json["payload"]["to"], "volatile");
    }

    #[test]
    fn breaker_summary_mentions_loss() {
        let event = EngineEvent::CircuitBreakerTripped(CircuitBreakerTripped {
            timestamp: Utc::now(),
            loss_pct: Decimal::new(35, 1),
            limit_pct: Decimal::new(30, 1),
            retired: 4,
        });
        assert!(event.summary().contains("3.5%"));
        assert!(event.is_alertable());
        assert!(!EngineEvent::log(LogLevel::Info, "hello").is_alertable());
    }
}
