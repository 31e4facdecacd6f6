use crate::error::RiskError;
use chrono::{DateTime, Utc};
use configuration::RiskConfig;
use core_types::{GenomeStatus, RiskEnvelope};
use rust_decimal::prelude::*;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use strategies::{STOP_LOSS_GENE, StrategyGenome, TAKE_PROFIT_GENE};
use uuid::Uuid;

/// What is already committed when a genome asks for room.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PortfolioState {
    pub active_count: u32,
    /// Sum of the position sizes of active genomes, in percent of equity.
    pub committed_pct: Decimal,
}

/// A genome offered to the governor together with its historical drawdown.
#[derive(Debug, Clone, Copy)]
pub struct RiskCandidate<'a> {
    pub genome: &'a StrategyGenome,
    pub drawdown_pct: f64,
}

/// The governor's verdict on one genome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Allocation {
    pub strategy_id: Uuid,
    pub status: GenomeStatus,
    /// Present exactly when `status` is `Active`.
    pub envelope: Option<RiskEnvelope>,
}

#[derive(Debug, Clone)]
pub struct RiskGovernor {
    config: RiskConfig,
}

impl RiskGovernor {
    /// Creates a new `RiskGovernor`, validating that the limits are coherent.
    pub fn new(config: RiskConfig) -> Result<Self, RiskError> {
        if config.max_position_size_pct <= Decimal::ZERO
            || config.min_position_size_pct <= Decimal::ZERO
            || config.max_portfolio_risk_pct <= Decimal::ZERO
        {
            return Err(RiskError::InvalidParameters(
                "position and portfolio limits must be greater than 0".to_string(),
            ));
        }
        if config.min_position_size_pct > config.max_position_size_pct {
            return Err(RiskError::InvalidParameters(
                "min_position_size_pct cannot exceed max_position_size_pct".to_string(),
            ));
        }
        if config.stop_loss_pct <= Decimal::ZERO || config.take_profit_pct <= Decimal::ZERO {
            return Err(RiskError::InvalidParameters(
                "stop_loss_pct and take_profit_pct must be greater than 0".to_string(),
            ));
        }
        Ok(Self { config })
    }

    pub fn config(&self) -> &RiskConfig {
        &self.config
    }

    /// Computes the risk envelope for one genome.
    ///
    /// Position size starts at `max_position_size_pct`, shrinks linearly with
    /// the genome's historical drawdown (scaled by `drawdown_sensitivity`), never
    /// goes below `min_position_size_pct`, and is capped by the room left under
    /// `max_portfolio_risk_pct`. Stop-loss and take-profit come from the
    /// genome's genes, bounded by the configured limits.
    ///
    /// Fails with `RiskLimitExceeded` when all concurrent slots are taken or the
    /// minimum position no longer fits.
    pub fn clamp(
        &self,
        genome: &StrategyGenome,
        drawdown_pct: f64,
        portfolio: &PortfolioState,
        now: DateTime<Utc>,
    ) -> Result<RiskEnvelope, RiskError> {
        let c = &self.config;
        let room = (c.max_portfolio_risk_pct - portfolio.committed_pct).max(Decimal::ZERO);

        if portfolio.active_count >= c.max_concurrent_trades {
            return Err(RiskError::RiskLimitExceeded {
                reason: format!(
                    "{} of {} concurrent slots in use",
                    portfolio.active_count, c.max_concurrent_trades
                ),
                available_pct: room,
            });
        }
        if c.min_position_size_pct > room {
            return Err(RiskError::RiskLimitExceeded {
                reason: format!(
                    "minimum position {}% does not fit in remaining {}%",
                    c.min_position_size_pct, room
                ),
                available_pct: room,
            });
        }

        let drawdown = Decimal::from_f64(drawdown_pct.max(0.0)).unwrap_or(dec!(100));
        let scale = (Decimal::ONE - drawdown / dec!(100) * c.drawdown_sensitivity)
            .clamp(Decimal::ZERO, Decimal::ONE);
        let desired = (c.max_position_size_pct * scale).max(c.min_position_size_pct);
        let position = desired.min(room).round_dp(4);

        let stop_loss = gene_pct(genome, STOP_LOSS_GENE)
            .filter(|sl| *sl > Decimal::ZERO)
            .map_or(c.stop_loss_pct, |sl| sl.min(c.stop_loss_pct));
        let take_profit = gene_pct(genome, TAKE_PROFIT_GENE)
            .map_or(c.take_profit_pct, |tp| tp.min(c.take_profit_pct))
            .max(stop_loss);

        Ok(RiskEnvelope {
            strategy_id: genome.id(),
            max_position_size_pct: position,
            stop_loss_pct: stop_loss,
            take_profit_pct: take_profit,
            max_concurrent_trades: c.max_concurrent_trades - portfolio.active_count,
            computed_at: now,
        })
    }

    /// Walks a generation in rank order and decides each genome's status.
    ///
    /// Genomes that fit are `Active` with an envelope; genomes that do not are
    /// held back as `Candidate`. When `halted` is set (the daily-loss breaker
    /// has tripped) every genome is `Retired` regardless of fitness.
    pub fn allocate(
        &self,
        ranked: &[RiskCandidate<'_>],
        halted: bool,
        now: DateTime<Utc>,
    ) -> Vec<Allocation> {
        let mut portfolio = PortfolioState::default();
        ranked
            .iter()
            .map(|candidate| {
                let strategy_id = candidate.genome.id();
                if halted {
                    return Allocation {
                        strategy_id,
                        status: GenomeStatus::Retired,
                        envelope: None,
                    };
                }
                match self.clamp(candidate.genome, candidate.drawdown_pct, &portfolio, now) {
                    Ok(envelope) => {
                        portfolio.active_count += 1;
                        portfolio.committed_pct += envelope.max_position_size_pct;
                        Allocation {
                            strategy_id,
                            status: GenomeStatus::Active,
                            envelope: Some(envelope),
                        }
                    }
                    Err(e) => {
                        tracing::info!(strategy_id = %strategy_id, reason = %e, "Genome held back as candidate");
                        Allocation {
                            strategy_id,
                            status: GenomeStatus::Candidate,
                            envelope: None,
                        }
                    }
                }
            })
            .collect()
    }
}

fn gene_pct(genome: &StrategyGenome, name: &str) -> Option<Decimal> {
    genome
        .numeric_gene(name)
        .and_then(Decimal::from_f64)
        .map(|d| d.round_dp(4))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use strategies::templates;

    fn genomes(n: usize) -> Vec<StrategyGenome> {
        let mut rng = StdRng::seed_from_u64(17);
        templates::seed_population(n, &mut rng, Utc::now()).unwrap()
    }

    fn governor() -> RiskGovernor {
        RiskGovernor::new(RiskConfig::default()).unwrap()
    }

    #[test]
    fn drawdown_shrinks_position_size() {
        let g = &genomes(1)[0];
        let gov = governor();
        let fresh = gov.clamp(g, 0.0, &PortfolioState::default(), Utc::now()).unwrap();
        let bruised = gov.clamp(g, 50.0, &PortfolioState::default(), Utc::now()).unwrap();
        assert_eq!(fresh.max_position_size_pct, dec!(2.0));
        assert_eq!(bruised.max_position_size_pct, dec!(1.0));
    }

    #[test]
    fn position_never_drops_below_minimum() {
        let g = &genomes(1)[0];
        let env = governor().clamp(g, 99.0, &PortfolioState::default(), Utc::now()).unwrap();
        assert_eq!(env.max_position_size_pct, dec!(0.25));
    }

    #[test]
    fn stops_are_bounded_by_config() {
        let g = &genomes(1)[0];
        let env = governor().clamp(g, 0.0, &PortfolioState::default(), Utc::now()).unwrap();
        assert!(env.stop_loss_pct > Decimal::ZERO && env.stop_loss_pct <= dec!(2.0));
        assert!(env.take_profit_pct >= env.stop_loss_pct && env.take_profit_pct <= dec!(4.0));
    }

    #[test]
    fn full_portfolio_holds_genome_back() {
        let g = &genomes(1)[0];
        let full = PortfolioState {
            active_count: 2,
            committed_pct: dec!(4.9),
        };
        assert!(matches!(
            governor().clamp(g, 0.0, &full, Utc::now()),
            Err(RiskError::RiskLimitExceeded { .. })
        ));
    }

    #[test]
    fn concurrency_cap_holds_genome_back() {
        let g = &genomes(1)[0];
        let busy = PortfolioState {
            active_count: 5,
            committed_pct: Decimal::ZERO,
        };
        assert!(governor().clamp(g, 0.0, &busy, Utc::now()).is_err());
    }

    #[test]
    fn allocation_never_exceeds_portfolio_risk() {
        let population = genomes(10);
        let candidates: Vec<RiskCandidate> = population
            .iter()
            .enumerate()
            .map(|(i, genome)| RiskCandidate {
                genome,
                drawdown_pct: (i * 7) as f64,
            })
            .collect();
        let allocations = governor().allocate(&candidates, false, Utc::now());

        let committed: Decimal = allocations
            .iter()
            .filter_map(|a| a.envelope.as_ref())
            .map(|e| e.max_position_size_pct)
            .sum();
        assert!(committed <= dec!(5.0));
        let active = allocations.iter().filter(|a| a.status == GenomeStatus::Active).count();
        assert!(active >= 2 && active <= 5);
        assert!(allocations.iter().any(|a| a.status == GenomeStatus::Candidate));
        assert!(allocations.iter().all(|a| a.envelope.is_some() == (a.status == GenomeStatus::Active)));
    }

    #[test]
    fn halted_allocation_retires_everything() {
        let population = genomes(4);
        let candidates: Vec<RiskCandidate> = population
            .iter()
            .map(|genome| RiskCandidate {
                genome,
                drawdown_pct: 0.0,
            })
            .collect();
        let allocations = governor().allocate(&candidates, true, Utc::now());
        assert!(allocations.iter().all(|a| a.status == GenomeStatus::Retired));
    }
}
