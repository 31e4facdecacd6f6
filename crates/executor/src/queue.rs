use crate::connector::ExecutionConnector;
use crate::error::ExecutorError;
use core_types::RiskEnvelope;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum ActivationCommand {
    Activate { envelope: RiskEnvelope },
    Deactivate { strategy_id: Uuid },
}

impl ActivationCommand {
    pub fn strategy_id(&self) -> Uuid {
        match self {
            ActivationCommand::Activate { envelope } => envelope.strategy_id,
            ActivationCommand::Deactivate { strategy_id } => *strategy_id,
        }
    }

    async fn send(&self, connector: &dyn ExecutionConnector) -> Result<(), ExecutorError> {
        match self {
            ActivationCommand::Activate { envelope } => {
                connector.activate(envelope.strategy_id, envelope).await
            }
            ActivationCommand::Deactivate { strategy_id } => connector.deactivate(*strategy_id).await,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlushReport {
    pub delivered: usize,
    pub rejected: usize,
    /// Commands still queued because the connector went away.
    pub pending: usize,
}

/// Commands waiting for the execution connector.
///
/// A strategy has at most one pending command: a newer command replaces the
/// older one and moves to the back of the queue. Commands are delivered in
/// queue order; delivery stops at the first `Unavailable` error and resumes
/// on the next flush.
#[derive(Debug, Default)]
pub struct ActivationQueue {
    pending: Vec<ActivationCommand>,
}

impl ActivationQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn pending(&self) -> &[ActivationCommand] {
        &self.pending
    }

    pub fn push(&mut self, command: ActivationCommand) {
        let id = command.strategy_id();
        self.pending.retain(|c| c.strategy_id() != id);
        self.pending.push(command);
    }

    /// Queues the commands that move the connector from `previously_active`
    /// to `envelopes`: deactivations first, then one activation per envelope
    /// in the given order (envelopes are recomputed every cycle, so
    /// strategies that stay active are re-sent).
    pub fn stage_generation(&mut self, previously_active: &BTreeSet<Uuid>, envelopes: &[RiskEnvelope]) {
        let next: BTreeSet<Uuid> = envelopes.iter().map(|e| e.strategy_id).collect();
        for strategy_id in previously_active.difference(&next) {
            self.push(ActivationCommand::Deactivate {
                strategy_id: *strategy_id,
            });
        }
        for envelope in envelopes {
            self.push(ActivationCommand::Activate {
                envelope: envelope.clone(),
            });
        }
    }

    pub async fn flush(&mut self, connector: &dyn ExecutionConnector) -> FlushReport {
        let mut report = FlushReport::default();
        let mut delivered_until = 0;
        for command in &self.pending {
            match command.send(connector).await {
                Ok(()) => report.delivered += 1,
                Err(ExecutorError::Unavailable(reason)) => {
                    tracing::warn!(
                        connector = connector.name(),
                        queued = self.pending.len() - delivered_until,
                        %reason,
                        "Execution connector unavailable, activation commands stay queued"
                    );
                    break;
                }
                Err(e @ ExecutorError::Rejected { .. }) => {
                    tracing::error!(strategy_id = %command.strategy_id(), error = %e, "Activation command dropped");
                    report.rejected += 1;
                }
            }
            delivered_until += 1;
        }
        self.pending.drain(..delivered_until);
        report.pending = self.pending.len();
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connector::PaperConnector;
    use chrono::Utc;
    use rust_decimal_macros::dec;

    fn envelope(id: u128, position: rust_decimal::Decimal) -> RiskEnvelope {
        RiskEnvelope {
            strategy_id: Uuid::from_u128(id),
            max_position_size_pct: position,
            stop_loss_pct: dec!(1.5),
            take_profit_pct: dec!(3.0),
            max_concurrent_trades: 3,
            computed_at: Utc::now(),
        }
    }

    #[test]
    fn latest_command_per_strategy_wins() {
        let mut queue = ActivationQueue::new();
        queue.push(ActivationCommand::Activate { envelope: envelope(1, dec!(2.0)) });
        queue.push(ActivationCommand::Activate { envelope: envelope(2, dec!(1.0)) });
        queue.push(ActivationCommand::Deactivate { strategy_id: Uuid::from_u128(1) });

        let ids: Vec<u128> = queue.pending().iter().map(|c| c.strategy_id().as_u128()).collect();
        assert_eq!(ids, vec![2, 1]);
        assert!(matches!(queue.pending()[1], ActivationCommand::Deactivate { .. }));
    }

    #[test]
    fn staging_deactivates_dropped_strategies() {
        let mut queue = ActivationQueue::new();
        let previous: BTreeSet<Uuid> = [Uuid::from_u128(1), Uuid::from_u128(2)].into();
        queue.stage_generation(&previous, &[envelope(2, dec!(1.0)), envelope(3, dec!(1.0))]);

        let commands = queue.pending();
        assert_eq!(commands.len(), 3);
        assert_eq!(commands[0], ActivationCommand::Deactivate { strategy_id: Uuid::from_u128(1) });
        assert_eq!(commands[1].strategy_id(), Uuid::from_u128(2));
        assert_eq!(commands[2].strategy_id(), Uuid::from_u128(3));
    }

    #[tokio::test]
    async fn commands_wait_for_the_connector() {
        let connector = PaperConnector::new();
        let mut queue = ActivationQueue::new();
        queue.stage_generation(&BTreeSet::new(), &[envelope(1, dec!(2.0)), envelope(2, dec!(1.0))]);

        connector.set_online(false);
        let report = queue.flush(&connector).await;
        assert_eq!(report, FlushReport { delivered: 0, rejected: 0, pending: 2 });

        queue.push(ActivationCommand::Activate { envelope: envelope(1, dec!(0.5)) });
        connector.set_online(true);
        let report = queue.flush(&connector).await;
        assert_eq!(report.delivered, 2);
        assert!(queue.is_empty());

        let active = connector.active().await;
        assert_eq!(active[&Uuid::from_u128(1)].max_position_size_pct, dec!(0.5));
        assert_eq!(active.len(), 2);
    }

    struct Refusing;

    #[async_trait::async_trait]
    impl ExecutionConnector for Refusing {
        async fn activate(&self, strategy_id: Uuid, _: &RiskEnvelope) -> Result<(), ExecutorError> {
            Err(ExecutorError::Rejected {
                strategy_id,
                reason: "symbol halted".to_string(),
            })
        }

        async fn deactivate(&self, _: Uuid) -> Result<(), ExecutorError> {
            Ok(())
        }

        fn name(&self) -> &str {
            "refusing"
        }
    }

    #[tokio::test]
    async fn rejected_commands_are_dropped_and_delivery_continues() {
        let mut queue = ActivationQueue::new();
        queue.push(ActivationCommand::Activate { envelope: envelope(7, dec!(1.0)) });
        queue.push(ActivationCommand::Deactivate { strategy_id: Uuid::from_u128(8) });

        let report = queue.flush(&Refusing).await;
        assert_eq!(report, FlushReport { delivered: 1, rejected: 1, pending: 0 });
        assert!(queue.is_empty());
    }
}
