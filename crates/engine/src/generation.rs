use chrono::{DateTime, NaiveDate, Utc};
use core_types::{GenomeStatus, RiskEnvelope};
use database::{GenerationMember, GenerationRecord};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use strategies::StrategyGenome;
use tokio::sync::watch;
use uuid::Uuid;

/// An immutable, published population.
///
/// Members are stored in rank order with the status the risk governor gave
/// them. Readers hold an `Arc<Generation>` obtained from a
/// [`GenerationHandle`] and never observe a half-built generation.
#[derive(Debug, Clone, PartialEq)]
pub struct Generation {
    pub number: u32,
    pub published_at: DateTime<Utc>,
    pub members: Vec<StrategyGenome>,
    pub envelopes: BTreeMap<Uuid, RiskEnvelope>,
    pub ranked_by: String,
    pub degraded: bool,
    pub halted_on: Option<NaiveDate>,
}

impl Generation {
    /// The placeholder published before bootstrap completes.
    pub fn empty() -> Self {
        Self {
            number: 0,
            published_at: DateTime::<Utc>::default(),
            members: Vec::new(),
            envelopes: BTreeMap::new(),
            ranked_by: "none".to_string(),
            degraded: false,
            halted_on: None,
        }
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn count(&self, status: GenomeStatus) -> usize {
        self.members.iter().filter(|g| g.status() == status).count()
    }

    pub fn active_ids(&self) -> BTreeSet<Uuid> {
        self.members
            .iter()
            .filter(|g| g.status() == GenomeStatus::Active)
            .map(StrategyGenome::id)
            .collect()
    }

    pub fn get(&self, id: Uuid) -> Option<&StrategyGenome> {
        self.members.iter().find(|g| g.id() == id)
    }

    pub fn envelope(&self, id: Uuid) -> Option<&RiskEnvelope> {
        self.envelopes.get(&id)
    }

    /// Builds the persisted manifest, attaching each member's fitness when known.
    pub fn to_record(&self, fitness: &HashMap<Uuid, f64>) -> GenerationRecord {
        GenerationRecord {
            generation: self.number,
            published_at: self.published_at,
            ranked_by: self.ranked_by.clone(),
            degraded: self.degraded,
            halted_on: self.halted_on,
            members: self
                .members
                .iter()
                .map(|g| GenerationMember {
                    strategy_id: g.id(),
                    status: g.status(),
                    envelope: self.envelopes.get(&g.id()).cloned(),
                    fitness: fitness.get(&g.id()).copied(),
                })
                .collect(),
        }
    }

    /// Rebuilds a generation from its manifest and the stored genomes.
    ///
    /// Members missing from `genomes` are skipped with a warning. Statuses
    /// come from the manifest, not from the stored genome rows.
    pub fn from_record(record: &GenerationRecord, genomes: &HashMap<Uuid, StrategyGenome>) -> Self {
        let mut members = Vec::with_capacity(record.members.len());
        let mut envelopes = BTreeMap::new();
        for member in &record.members {
            let Some(genome) = genomes.get(&member.strategy_id) else {
                tracing::warn!(
                    strategy_id = %member.strategy_id,
                    generation = record.generation,
                    "Generation member missing from the store, skipping"
                );
                continue;
            };
            members.push(genome.with_status(member.status));
            if let Some(envelope) = &member.envelope {
                envelopes.insert(member.strategy_id, envelope.clone());
            }
        }
        Self {
            number: record.generation,
            published_at: record.published_at,
            members,
            envelopes,
            ranked_by: record.ranked_by.clone(),
            degraded: record.degraded,
            halted_on: record.halted_on,
        }
    }
}

/// Read side of the published generation.
#[derive(Debug, Clone)]
pub struct GenerationHandle {
    rx: watch::Receiver<Arc<Generation>>,
}

impl GenerationHandle {
    pub fn new(rx: watch::Receiver<Arc<Generation>>) -> Self {
        Self { rx }
    }

    /// The generation live right now.
    pub fn current(&self) -> Arc<Generation> {
        Arc::clone(&self.rx.borrow())
    }

    /// Waits for the next publication.
    pub async fn changed(&mut self) -> Option<Arc<Generation>> {
        self.rx.changed().await.ok()?;
        Some(Arc::clone(&self.rx.borrow_and_update()))
    }
}
