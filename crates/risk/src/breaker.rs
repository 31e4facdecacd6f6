use chrono::{DateTime, NaiveDate, Utc};
use core_types::TradeOutcome;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

/// Result of checking the breaker against today's realized trades.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerCheck {
    /// Trading may continue.
    Armed { loss_pct: Decimal },
    /// The loss limit was crossed by this check.
    Tripped { loss_pct: Decimal },
    /// Already tripped earlier today.
    Halted,
}

impl BreakerCheck {
    pub fn is_halted(&self) -> bool {
        !matches!(self, BreakerCheck::Armed { .. })
    }
}

/// Daily realized-loss circuit breaker.
///
/// Once the realized loss of the current UTC day exceeds `max_daily_loss_pct`
/// of account equity, the breaker stays tripped until the date changes.
#[derive(Debug, Clone)]
pub struct DailyLossBreaker {
    max_daily_loss_pct: Decimal,
    account_equity: Decimal,
    halted_on: Option<NaiveDate>,
}

impl DailyLossBreaker {
    pub fn new(max_daily_loss_pct: Decimal, account_equity: Decimal) -> Self {
        Self {
            max_daily_loss_pct,
            account_equity,
            halted_on: None,
        }
    }

    /// Restores a trip recorded before a restart.
    pub fn restore(mut self, halted_on: Option<NaiveDate>) -> Self {
        self.halted_on = halted_on;
        self
    }

    pub fn halted_on(&self) -> Option<NaiveDate> {
        self.halted_on
    }

    pub fn is_halted(&self, now: DateTime<Utc>) -> bool {
        self.halted_on == Some(now.date_naive())
    }

    /// Realized loss of trades that closed on `day`, as a percentage of
    /// equity. Net profits count as zero loss.
    pub fn daily_loss_pct(&self, trades: &[TradeOutcome], day: NaiveDate) -> Decimal {
        if self.account_equity <= Decimal::ZERO {
            return Decimal::ZERO;
        }
        let net: Decimal = trades
            .iter()
            .filter(|t| t.exit_time.date_naive() == day)
            .map(|t| t.realized_pnl)
            .sum();
        (-net / self.account_equity * dec!(100)).max(Decimal::ZERO)
    }

    /// Checks today's realized trades against the limit.
    pub fn check(&mut self, trades: &[TradeOutcome], now: DateTime<Utc>) -> BreakerCheck {
        let today = now.date_naive();
        if self.halted_on.is_some_and(|day| day < today) {
            tracing::info!(%today, "Daily loss breaker re-armed for a new trading day");
            self.halted_on = None;
        }
        if self.is_halted(now) {
            return BreakerCheck::Halted;
        }

        let loss_pct = self.daily_loss_pct(trades, today);
        if loss_pct > self.max_daily_loss_pct {
            self.halted_on = Some(today);
            tracing::error!(
                loss_pct = %loss_pct,
                limit_pct = %self.max_daily_loss_pct,
                "Daily loss circuit breaker tripped; all strategies retired for the day"
            );
            return BreakerCheck::Tripped { loss_pct };
        }
        BreakerCheck::Armed { loss_pct }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use core_types::OrderSide;
    use uuid::Uuid;

    fn noon() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 3, 12, 0, 0).unwrap()
    }

    fn loss(pnl: Decimal, exit_time: DateTime<Utc>) -> TradeOutcome {
        TradeOutcome {
            trade_id: Uuid::new_v4(),
            strategy_id: Uuid::new_v4(),
            symbol: "BTCUSDT".to_string(),
            side: OrderSide::Buy,
            entry_time: exit_time - Duration::hours(1),
            exit_time,
            realized_pnl: pnl,
            return_pct: -1.0,
        }
    }

    #[test]
    fn trips_when_daily_loss_exceeds_limit() {
        let mut breaker = DailyLossBreaker::new(dec!(3.0), dec!(10000));
        let trades = vec![loss(dec!(-200), noon()), loss(dec!(-150), noon())];
        assert_eq!(
            breaker.check(&trades, noon()),
            BreakerCheck::Tripped { loss_pct: dec!(3.5) }
        );
        assert_eq!(breaker.check(&[], noon() + Duration::hours(1)), BreakerCheck::Halted);
    }

    #[test]
    fn loss_at_the_limit_does_not_trip() {
        let mut breaker = DailyLossBreaker::new(dec!(3.0), dec!(10000));
        let check = breaker.check(&[loss(dec!(-300), noon())], noon());
        assert!(!check.is_halted());
    }

    #[test]
    fn only_todays_trades_count() {
        let mut breaker = DailyLossBreaker::new(dec!(3.0), dec!(10000));
        let yesterday = noon() - Duration::days(1);
        let check = breaker.check(&[loss(dec!(-900), yesterday)], noon());
        assert_eq!(check, BreakerCheck::Armed { loss_pct: Decimal::ZERO });
    }

    #[test]
    fn re_arms_on_the_next_day() {
        let mut breaker = DailyLossBreaker::new(dec!(3.0), dec!(10000));
        breaker.check(&[loss(dec!(-500), noon())], noon());
        assert!(breaker.is_halted(noon()));
        let tomorrow = noon() + Duration::days(1);
        assert!(!breaker.check(&[], tomorrow).is_halted());
        assert_eq!(breaker.halted_on(), None);
    }
}
