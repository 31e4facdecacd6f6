use crate::collector::TradeCollector;
use crate::error::EngineError;
use crate::evolution::EvolutionEngine;
use crate::generation::{Generation, GenerationHandle};
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Notify, watch};
use tokio::time::{Instant, MissedTickBehavior};

/// Cloneable access to a running driver.
#[derive(Clone)]
pub struct DriverHandle {
    new_data: Arc<Notify>,
    generation: GenerationHandle,
    collector: Arc<TradeCollector>,
}

impl DriverHandle {
    /// Wakes the driver to collect new trade outcomes.
    pub fn notify_new_data(&self) {
        self.new_data.notify_one();
    }

    /// The generation live right now.
    pub fn current(&self) -> Arc<Generation> {
        self.generation.current()
    }

    pub fn generations(&self) -> GenerationHandle {
        self.generation.clone()
    }

    pub fn collector(&self) -> Arc<TradeCollector> {
        Arc::clone(&self.collector)
    }
}

/// The single thread of control around an [`EvolutionEngine`].
///
/// Idle between wake-ups. The evolution timer runs a full cycle; new-data
/// notifications only collect trades and check the daily-loss breaker, so
/// data that arrives mid-cycle waits for the next one.
pub struct EvolutionDriver {
    engine: EvolutionEngine,
    period: Duration,
    auto_evolution: bool,
    new_data: Arc<Notify>,
}

impl EvolutionDriver {
    pub fn new(engine: EvolutionEngine) -> Self {
        let period = engine.config().evolution.evolution_interval();
        let auto_evolution = engine.config().features.enable_auto_evolution;
        let new_data = engine.collector().new_data_signal();
        Self {
            engine,
            period,
            auto_evolution,
            new_data,
        }
    }

    pub fn handle(&self) -> DriverHandle {
        DriverHandle {
            new_data: Arc::clone(&self.new_data),
            generation: self.engine.subscribe(),
            collector: self.engine.collector(),
        }
    }

    pub fn engine(&self) -> &EvolutionEngine {
        &self.engine
    }

    /// Bootstraps the engine if needed, then serves wake-ups until `shutdown`
    /// flips to `true` or its sender is dropped.
    ///
    /// Only a failed bootstrap is returned as an error; a failed cycle is
    /// logged and the previous generation stays live.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) -> Result<(), EngineError> {
        if self.engine.current().is_empty() {
            self.engine.bootstrap(Utc::now()).await?;
        }
        tracing::info!(
            interval_hours = self.period.as_secs() / 3600,
            auto_evolution = self.auto_evolution,
            "Evolution driver started."
        );

        let mut timer = tokio::time::interval_at(Instant::now() + self.period, self.period);
        timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = timer.tick() => {
                    if self.auto_evolution {
                        // Errors are logged and announced by the engine itself.
                        let _ = self.engine.run_cycle(Utc::now()).await;
                    } else {
                        tracing::info!("Auto evolution disabled, collecting only");
                        self.collect().await;
                    }
                }
                _ = self.new_data.notified() => {
                    self.collect().await;
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        tracing::info!(
            generation = self.engine.current().number,
            pending_activations = self.engine.pending_activations(),
            "Evolution driver shutting down."
        );
        Ok(())
    }

    async fn collect(&mut self) {
        match self.engine.collect(Utc::now()).await {
            Ok(report) if report.trades > 0 => {
                tracing::debug!(trades = report.trades, breaker = ?report.breaker, "Collected trade outcomes");
            }
            Ok(_) => {}
            Err(e) => tracing::error!(error = %e, "Trade collection failed"),
        }
    }
}
