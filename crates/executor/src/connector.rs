use crate::error::ExecutorError;
use async_trait::async_trait;
use core_types::RiskEnvelope;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::RwLock;
use uuid::Uuid;

/// The boundary to whatever actually trades.
///
/// The evolution loop never places orders itself: it only tells the connector
/// which strategies may trade and within which envelope.
#[async_trait]
pub trait ExecutionConnector: Send + Sync {
    async fn activate(&self, strategy_id: Uuid, envelope: &RiskEnvelope) -> Result<(), ExecutorError>;

    async fn deactivate(&self, strategy_id: Uuid) -> Result<(), ExecutorError>;

    fn name(&self) -> &str;
}

/// Keeps the set of active strategies in memory and logs every change.
///
/// Used in paper and simulation modes. It can be taken offline to exercise
/// the queueing path.
#[derive(Debug)]
pub struct PaperConnector {
    active: RwLock<BTreeMap<Uuid, RiskEnvelope>>,
    online: AtomicBool,
}

impl Default for PaperConnector {
    fn default() -> Self {
        Self {
            active: RwLock::new(BTreeMap::new()),
            online: AtomicBool::new(true),
        }
    }
}

impl PaperConnector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
    }

    /// The currently active strategies and their envelopes.
    pub async fn active(&self) -> BTreeMap<Uuid, RiskEnvelope> {
        self.active.read().await.clone()
    }

    fn ensure_online(&self) -> Result<(), ExecutorError> {
        if self.online.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(ExecutorError::Unavailable("paper connector offline".to_string()))
        }
    }
}

#[async_trait]
impl ExecutionConnector for PaperConnector {
    async fn activate(&self, strategy_id: Uuid, envelope: &RiskEnvelope) -> Result<(), ExecutorError> {
        self.ensure_online()?;
        if envelope.strategy_id != strategy_id {
            return Err(ExecutorError::Rejected {
                strategy_id,
                reason: format!("envelope belongs to {}", envelope.strategy_id),
            });
        }
        tracing::info!(
            strategy_id = %strategy_id,
            position_pct = %envelope.max_position_size_pct,
            stop_loss_pct = %envelope.stop_loss_pct,
            take_profit_pct = %envelope.take_profit_pct,
            "Paper connector: strategy activated"
        );
        self.active.write().await.insert(strategy_id, envelope.clone());
        Ok(())
    }

    async fn deactivate(&self, strategy_id: Uuid) -> Result<(), ExecutorError> {
        self.ensure_online()?;
        if self.active.write().await.remove(&strategy_id).is_some() {
            tracing::info!(strategy_id = %strategy_id, "Paper connector: strategy deactivated");
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "paper"
    }
}
