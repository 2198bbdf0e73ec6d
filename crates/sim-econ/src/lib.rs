#![deny(warnings)]

//! Production accrual for Frontier Idle.
//!
//! This crate owns buildings and workers and provides:
//! - Continuous accrual computed purely from elapsed wall-clock time
//! - Storage-capped collection with experience proportional to the amount
//! - Upgrades that enforce the worker cap of the new level

use rand::Rng;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sim_core::reference::{BuildingDef, ProductionDef};
use sim_core::{ReferenceData, Skill, Timestamp};
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;
use tracing::{debug, warn};

const MS_PER_HOUR: i64 = 3_600_000;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BuildingId(pub u32);

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorkerId(pub u32);

impl fmt::Display for BuildingId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "b{}", self.0)
    }
}

impl fmt::Display for WorkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "w{}", self.0)
    }
}

/// Errors produced by building and worker operations.
#[derive(Debug, Error, PartialEq)]
pub enum EconError {
    #[error("unknown building {0}")]
    UnknownBuilding(BuildingId),
    #[error("unknown worker {0}")]
    UnknownWorker(WorkerId),
    #[error("no building definition '{0}'")]
    UnknownDefinition(String),
    #[error("building {0} is still under construction")]
    NotCompleted(BuildingId),
    #[error("building {building} already has {cap} workers")]
    WorkerCapReached { building: BuildingId, cap: usize },
    #[error("building {building} is already at max level {level}")]
    MaxLevel { building: BuildingId, level: u32 },
    #[error("building limit of {0} reached")]
    BuildingLimit(usize),
}

/// A hired villager.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Worker {
    /// Settlement-unique id, starting at 1.
    pub id: WorkerId,
    /// Display name chosen at hire time.
    pub name: String,
    /// Output multiplier of this worker, around 1.0.
    pub efficiency: Decimal,
    /// Building the worker staffs, if any.
    pub assigned_to: Option<BuildingId>,
}

/// A founded building, finished or still under construction.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Building {
    /// Settlement-unique id, starting at 1.
    pub id: BuildingId,
    /// Key into the building definitions.
    pub def_id: String,
    /// Current level, from 1 to the definition's `max_level`.
    pub level: u32,
    /// False until the construction task finishes.
    pub completed: bool,
    /// Assignment order; the last entry is the most recently assigned.
    pub assigned: Vec<WorkerId>,
    /// Time production was last settled.
    pub last_accrual: Timestamp,
    /// Always within `[0, storage_capacity]`.
    pub accumulated: Decimal,
}

/// `1 + 0.15 * (level - 1)`.
pub fn level_multiplier(level: u32) -> Decimal {
    Decimal::ONE + Decimal::new(15, 2) * Decimal::from(level.saturating_sub(1))
}

/// `1` for a single worker, else `1 + 0.25 * (n - 1)`.
pub fn worker_scaling(workers: usize) -> Decimal {
    if workers <= 1 {
        return Decimal::ONE;
    }
    Decimal::ONE + Decimal::new(25, 2) * Decimal::from(workers as u64 - 1)
}

pub fn storage_capacity(def: &ProductionDef, level: u32) -> Decimal {
    def.base_storage + def.storage_per_level * Decimal::from(level.saturating_sub(1))
}

/// Units per hour for a building at `level` staffed by `efficiencies`.
pub fn effective_rate(def: &ProductionDef, level: u32, efficiencies: &[Decimal]) -> Decimal {
    let total: Decimal = efficiencies.iter().copied().sum();
    def.base_rate_per_hour * level_multiplier(level) * worker_scaling(efficiencies.len()) * total
}

/// Adds `rate * elapsed` to `accumulated`, capped at `capacity`.
pub fn accrue(accumulated: Decimal, rate: Decimal, capacity: Decimal, elapsed_ms: u64) -> Decimal {
    let produced = rate * Decimal::from(elapsed_ms) / Decimal::from(MS_PER_HOUR);
    (accumulated + produced).min(capacity).max(Decimal::ZERO)
}

/// Seeded worker efficiency in `[0.80, 1.20]`.
pub fn roll_efficiency<R: Rng + ?Sized>(rng: &mut R) -> Decimal {
    Decimal::new(rng.gen_range(80..=120), 2)
}

#[derive(Clone, Debug, PartialEq)]
pub struct Collected {
    pub building: BuildingId,
    pub resource: String,
    pub amount: u64,
    pub skill: Skill,
    pub xp: u64,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Upgrade {
    pub building: BuildingId,
    pub level: u32,
    /// Workers removed to fit the new cap, most recently assigned first.
    pub unassigned: Vec<WorkerId>,
}

/// Every building and worker the player owns.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Settlement {
    buildings: BTreeMap<BuildingId, Building>,
    workers: BTreeMap<WorkerId, Worker>,
    next_building: u32,
    next_worker: u32,
}

fn settle(
    building: &mut Building,
    workers: &BTreeMap<WorkerId, Worker>,
    def: &BuildingDef,
    now: Timestamp,
) {
    let elapsed = now.since(building.last_accrual);
    building.last_accrual = now;
    let Some(production) = &def.production else {
        return;
    };
    if !building.completed || building.assigned.is_empty() {
        return;
    }
    let efficiencies: Vec<Decimal> = building
        .assigned
        .iter()
        .filter_map(|w| workers.get(w).map(|w| w.efficiency))
        .collect();
    let rate = effective_rate(production, building.level, &efficiencies);
    let capacity = storage_capacity(production, building.level);
    building.accumulated = accrue(building.accumulated, rate, capacity, elapsed);
}

impl Settlement {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn building(&self, id: BuildingId) -> Option<&Building> {
        self.buildings.get(&id)
    }

    pub fn buildings(&self) -> impl Iterator<Item = &Building> {
        self.buildings.values()
    }

    pub fn worker(&self, id: WorkerId) -> Option<&Worker> {
        self.workers.get(&id)
    }

    pub fn workers(&self) -> impl Iterator<Item = &Worker> {
        self.workers.values()
    }

    pub fn idle_workers(&self) -> impl Iterator<Item = &Worker> {
        self.workers.values().filter(|w| w.assigned_to.is_none())
    }

    /// Creates an incomplete building; construction is timed by the caller.
    pub fn found(&mut self, def: &BuildingDef, limit: usize, now: Timestamp) -> Result<BuildingId, EconError> {
        if self.buildings.len() >= limit {
            return Err(EconError::BuildingLimit(limit));
        }
        self.next_building += 1;
        let id = BuildingId(self.next_building);
        self.buildings.insert(
            id,
            Building {
                id,
                def_id: def.id.clone(),
                level: 1,
                completed: false,
                assigned: Vec::new(),
                last_accrual: now,
                accumulated: Decimal::ZERO,
            },
        );
        debug!(building = %id, def = %def.id, "building founded");
        Ok(id)
    }

    pub fn complete(&mut self, id: BuildingId, now: Timestamp) -> Result<&Building, EconError> {
        let building = self
            .buildings
            .get_mut(&id)
            .ok_or(EconError::UnknownBuilding(id))?;
        building.completed = true;
        building.last_accrual = now;
        Ok(building)
    }

    pub fn hire(&mut self, name: impl Into<String>, efficiency: Decimal) -> WorkerId {
        self.next_worker += 1;
        let id = WorkerId(self.next_worker);
        self.workers.insert(
            id,
            Worker {
                id,
                name: name.into(),
                efficiency,
                assigned_to: None,
            },
        );
        id
    }

    /// Moves a worker to `target` (or unassigns it with `None`).
    ///
    /// Accrual of every affected building is settled up to `now` first so
    /// the old staffing is paid for the time it actually worked.
    pub fn assign(
        &mut self,
        worker_id: WorkerId,
        target: Option<BuildingId>,
        reference: &ReferenceData,
        now: Timestamp,
    ) -> Result<(), EconError> {
        let current = self
            .workers
            .get(&worker_id)
            .ok_or(EconError::UnknownWorker(worker_id))?
            .assigned_to;
        if current == target {
            return Ok(());
        }
        if let Some(bid) = target {
            let building = self
                .buildings
                .get(&bid)
                .ok_or(EconError::UnknownBuilding(bid))?;
            if !building.completed {
                return Err(EconError::NotCompleted(bid));
            }
            let def = reference
                .building(&building.def_id)
                .ok_or_else(|| EconError::UnknownDefinition(building.def_id.clone()))?;
            let cap = def.worker_cap(building.level);
            if building.assigned.len() >= cap {
                return Err(EconError::WorkerCapReached { building: bid, cap });
            }
        }

        for bid in [current, target].into_iter().flatten() {
            self.settle_one(bid, reference, now);
        }
        if let Some(bid) = current {
            if let Some(b) = self.buildings.get_mut(&bid) {
                b.assigned.retain(|w| *w != worker_id);
            }
        }
        if let Some(bid) = target {
            if let Some(b) = self.buildings.get_mut(&bid) {
                b.assigned.push(worker_id);
            }
        }
        if let Some(w) = self.workers.get_mut(&worker_id) {
            w.assigned_to = target;
        }
        debug!(worker = %worker_id, ?current, ?target, "worker reassigned");
        Ok(())
    }

    fn settle_one(&mut self, id: BuildingId, reference: &ReferenceData, now: Timestamp) {
        let Some(building) = self.buildings.get_mut(&id) else {
            return;
        };
        match reference.building(&building.def_id) {
            Some(def) => settle(building, &self.workers, def, now),
            None => warn!(building = %id, def = %building.def_id, "missing building definition"),
        }
    }

    /// Accrues every completed building up to `now`. Returns how many produced.
    pub fn reconcile(&mut self, reference: &ReferenceData, now: Timestamp) -> usize {
        let mut producing = 0;
        for building in self.buildings.values_mut() {
            let Some(def) = reference.building(&building.def_id) else {
                warn!(building = %building.id, def = %building.def_id, "missing building definition, skipped");
                continue;
            };
            if building.completed && !building.assigned.is_empty() && def.production.is_some() {
                producing += 1;
            }
            settle(building, &self.workers, def, now);
        }
        producing
    }

    /// Empties storage, returning the whole units produced so far.
    pub fn collect(
        &mut self,
        id: BuildingId,
        reference: &ReferenceData,
        now: Timestamp,
    ) -> Result<Collected, EconError> {
        let building = self
            .buildings
            .get_mut(&id)
            .ok_or(EconError::UnknownBuilding(id))?;
        if !building.completed {
            return Err(EconError::NotCompleted(id));
        }
        let def = reference
            .building(&building.def_id)
            .ok_or_else(|| EconError::UnknownDefinition(building.def_id.clone()))?;
        let production = def
            .production
            .as_ref()
            .ok_or_else(|| EconError::UnknownDefinition(format!("{} production", def.id)))?;
        settle(building, &self.workers, def, now);
        let amount = building.accumulated.floor().to_u64().unwrap_or(0);
        building.accumulated = Decimal::ZERO;
        building.last_accrual = now;
        let xp = if amount == 0 {
            0
        } else {
            (production.xp_per_unit * Decimal::from(amount))
                .floor()
                .to_u64()
                .unwrap_or(0)
                .max(1)
        };
        Ok(Collected {
            building: id,
            resource: production.resource.clone(),
            amount,
            skill: production.skill,
            xp,
        })
    }

    /// Raises the level by one and unassigns workers beyond the new cap.
    pub fn upgrade(
        &mut self,
        id: BuildingId,
        reference: &ReferenceData,
        now: Timestamp,
    ) -> Result<Upgrade, EconError> {
        let building = self
            .buildings
            .get_mut(&id)
            .ok_or(EconError::UnknownBuilding(id))?;
        if !building.completed {
            return Err(EconError::NotCompleted(id));
        }
        let def = reference
            .building(&building.def_id)
            .ok_or_else(|| EconError::UnknownDefinition(building.def_id.clone()))?;
        if building.level >= def.max_level {
            return Err(EconError::MaxLevel {
                building: id,
                level: building.level,
            });
        }
        settle(building, &self.workers, def, now);
        building.level += 1;
        let cap = def.worker_cap(building.level);
        let mut unassigned = Vec::new();
        while building.assigned.len() > cap {
            if let Some(w) = building.assigned.pop() {
                unassigned.push(w);
            }
        }
        for w in &unassigned {
            if let Some(worker) = self.workers.get_mut(w) {
                worker.assigned_to = None;
            }
        }
        if let Some(production) = &def.production {
            let capacity = storage_capacity(production, building.level);
            building.accumulated = building.accumulated.min(capacity);
        }
        Ok(Upgrade {
            building: id,
            level: building.level,
            unassigned,
        })
    }

    /// Gold cost of the next upgrade, if any.
    pub fn upgrade_cost(&self, id: BuildingId, reference: &ReferenceData) -> Option<u64> {
        let building = self.buildings.get(&id)?;
        let def = reference.building(&building.def_id)?;
        (building.level < def.max_level)
            .then(|| def.upgrade_cost.saturating_mul(u64::from(building.level + 1)))
    }
}
