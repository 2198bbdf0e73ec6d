#![deny(warnings)]

//! Core domain models and invariants for Frontier Idle.
//!
//! This crate holds the leaf-level ledgers used by every other part of the
//! simulation: the leveling curve, skill experience, dual-track veterancy,
//! inventory, read-only reference data and the deferred-effect queue.

pub mod curve;
pub mod effects;
pub mod inventory;
pub mod reference;
pub mod skills;
pub mod time;
pub mod veterancy;

pub use curve::SkillProgress;
pub use effects::{Effect, EffectQueue, Notification, NotificationKind, Notifications};
pub use inventory::{Inventory, Namespace};
pub use reference::ReferenceData;
pub use skills::{LevelChange, Skill, SkillLedger};
pub use time::Timestamp;
pub use veterancy::VeterancyLedger;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Validation errors for reference data and configuration.
#[derive(Debug, Error, PartialEq)]
pub enum ValidationError {
    /// Two rows in one table share an id.
    #[error("duplicate id '{id}' in {table}")]
    DuplicateId { table: &'static str, id: String },
    /// A row points at a resource id that does not exist.
    #[error("{table} '{id}' references unknown resource '{missing}'")]
    UnknownReference {
        table: &'static str,
        id: String,
        missing: String,
    },
    /// A duration, level or count that must be > 0 is zero.
    #[error("{table} '{id}': {field} must be > 0")]
    NonPositive {
        table: &'static str,
        id: String,
        field: &'static str,
    },
    /// A configuration field is out of range.
    #[error("invalid config: {0}")]
    InvalidConfig(&'static str),
}

/// Errors produced while loading reference data or configuration.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("yaml: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid reference data: {0}")]
    Invalid(#[from] ValidationError),
}

/// Simulation configuration parameters.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    /// Seed for deterministic RNG.
    pub rng_seed: u64,
    /// Reconciliation cadence for timed tasks.
    pub task_cadence_ms: u64,
    /// Reconciliation cadence for production accrual.
    pub production_cadence_ms: u64,
    /// Reconciliation cadence for combat turns.
    pub combat_cadence_ms: u64,
    /// Pause between a kill and the next encounter.
    pub search_delay_ms: u64,
    /// Share of cumulative experience lost on death.
    pub death_penalty_percent: u32,
    /// Completions one auto-resuming task may catch up in a single pass.
    pub max_catch_up_cycles: u32,
    pub building_limit: usize,
    pub farm_plots: usize,
    pub worker_hire_cost: u64,
    pub base_player_health: u32,
    pub unarmed_attack_speed_ms: u64,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            rng_seed: 42,
            task_cadence_ms: 100,
            production_cadence_ms: 1_000,
            combat_cadence_ms: 100,
            search_delay_ms: 3_000,
            death_penalty_percent: 5,
            max_catch_up_cycles: 10_000,
            building_limit: 12,
            farm_plots: 4,
            worker_hire_cost: 250,
            base_player_health: 50,
            unarmed_attack_speed_ms: 2_400,
        }
    }
}

impl SimConfig {
    pub fn from_yaml_str(text: &str) -> Result<Self, LoadError> {
        let cfg: SimConfig = serde_yaml::from_str(text)?;
        validate_config(&cfg)?;
        Ok(cfg)
    }
}

/// Validate configuration ranges.
pub fn validate_config(cfg: &SimConfig) -> Result<(), ValidationError> {
    if cfg.task_cadence_ms == 0 || cfg.production_cadence_ms == 0 || cfg.combat_cadence_ms == 0 {
        return Err(ValidationError::InvalidConfig("cadences must be > 0"));
    }
    if cfg.death_penalty_percent > 100 {
        return Err(ValidationError::InvalidConfig(
            "death_penalty_percent must be <= 100",
        ));
    }
    if cfg.max_catch_up_cycles == 0 {
        return Err(ValidationError::InvalidConfig("max_catch_up_cycles must be > 0"));
    }
    if cfg.base_player_health == 0 || cfg.unarmed_attack_speed_ms == 0 {
        return Err(ValidationError::InvalidConfig(
            "player health and attack speed must be > 0",
        ));
    }
    Ok(())
}
