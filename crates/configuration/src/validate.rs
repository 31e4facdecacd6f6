use crate::error::ConfigError;
use crate::settings::{Config, StoreBackend};
use rust_decimal::Decimal;

/// The largest per-strategy position size that is still considered sane.
const RECOMMENDED_MAX_POSITION_PCT: Decimal = Decimal::TEN;

impl Config {
    /// Checks the cross-field invariants that serde cannot express.
    ///
    /// Hard violations are errors; questionable-but-legal values are logged.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let evo = &self.evolution;
        if evo.population_size == 0 {
            return invalid("evolution.population_size must be at least 1");
        }
        if evo.elitism_count > evo.population_size {
            return invalid("evolution.elitism_count cannot exceed population_size");
        }
        for (name, rate) in [
            ("mutation_rate", evo.mutation_rate),
            ("crossover_rate", evo.crossover_rate),
        ] {
            if !(0.0..=1.0).contains(&rate) {
                return invalid(&format!("evolution.{name} must be within [0, 1], got {rate}"));
            }
        }
        if evo.selection_epsilon <= 0.0 {
            return invalid("evolution.selection_epsilon must be positive");
        }
        if evo.mutation_jitter <= 0.0 {
            return invalid("evolution.mutation_jitter must be positive");
        }
        if evo.evolution_interval_hours == 0 || evo.performance_window_days <= 0 {
            return invalid("evolution interval and performance window must be positive");
        }

        let fit = &self.fitness;
        let weights = [fit.weight_profit_factor, fit.weight_sharpe, fit.weight_drawdown];
        if weights.iter().any(|w| *w < 0.0 || !w.is_finite()) {
            return invalid("fitness weights must be finite and non-negative");
        }
        if weights.iter().sum::<f64>() <= 0.0 {
            return invalid("at least one fitness weight must be positive");
        }
        if fit.profit_factor_cap <= 0.0 || fit.sharpe_cap <= 0.0 || fit.drawdown_scale_pct <= 0.0 {
            return invalid("fitness normalisation caps must be positive");
        }

        let regime = &self.regime;
        if regime.hysteresis_samples == 0 {
            return invalid("regime.hysteresis_samples must be at least 1");
        }
        if regime.fast_period == 0 || regime.fast_period >= regime.slow_period {
            return invalid("regime.fast_period must be positive and below slow_period");
        }

        let risk = &self.risk;
        for (name, value) in [
            ("max_position_size_pct", risk.max_position_size_pct),
            ("min_position_size_pct", risk.min_position_size_pct),
            ("max_portfolio_risk_pct", risk.max_portfolio_risk_pct),
            ("stop_loss_pct", risk.stop_loss_pct),
            ("take_profit_pct", risk.take_profit_pct),
            ("max_daily_loss_pct", risk.max_daily_loss_pct),
            ("account_equity", risk.account_equity),
        ] {
            if value <= Decimal::ZERO {
                return invalid(&format!("risk.{name} must be positive"));
            }
        }
        if risk.min_position_size_pct > risk.max_position_size_pct {
            return invalid("risk.min_position_size_pct cannot exceed max_position_size_pct");
        }
        if risk.drawdown_sensitivity.is_sign_negative() {
            return invalid("risk.drawdown_sensitivity cannot be negative");
        }
        if risk.max_position_size_pct > RECOMMENDED_MAX_POSITION_PCT {
            tracing::warn!(
                max_position_size_pct = %risk.max_position_size_pct,
                "Position size exceeds recommended maximum"
            );
        }

        if self.store.backend == StoreBackend::Postgres
            && self.store.database_url.as_deref().is_none_or(str::is_empty)
        {
            return invalid("store.database_url (or DATABASE_URL) is required for the postgres backend");
        }

        Ok(())
    }
}

fn invalid(message: &str) -> Result<(), ConfigError> {
    Err(ConfigError::ValidationError(message.to_string()))
}
