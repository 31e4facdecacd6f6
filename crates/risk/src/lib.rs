//! # Evolver Risk Governor
//!
//! Decides how much capital each genome may control before it is allowed to
//! influence real decisions, and halts everything after an excessive daily loss.
//!
//! ## Architectural Principles
//!
//! - **Fail Closed:** A genome that does not fit the portfolio budget is held
//!   back as a candidate, never activated with a reduced floor.
//! - **Hard Portfolio Bound:** `allocate` never lets the sum of active position
//!   sizes exceed `max_portfolio_risk_pct`.
//! - **Day-Scoped Breaker:** The daily-loss breaker retires every genome for
//!   the rest of the UTC trading day and re-arms on the next.
//!
//! ## Public API
//!
//! - `RiskGovernor`: `clamp` for one genome, `allocate` for a ranked generation.
//! - `DailyLossBreaker`: the daily realized-loss circuit breaker.
//! - `PortfolioState`, `Allocation`: inputs and outputs of the governor.

pub mod breaker;
pub mod error;
pub mod governor;

pub use breaker::{BreakerCheck, DailyLossBreaker};
pub use error::RiskError;
pub use governor::{Allocation, PortfolioState, RiskCandidate, RiskGovernor};
