//! Persistent player state owned by the simulation.

use crate::gather::GatherCycles;
use crate::tasks::TaskLedger;
use serde::{Deserialize, Serialize};
use sim_core::reference::{Slot, Stance};
use sim_core::{Inventory, SkillLedger, VeterancyLedger};
use sim_econ::Settlement;
use std::collections::BTreeMap;

/// A farm plot with a seed in it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Plot {
    pub seed: String,
    pub ripe: bool,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanetStatus {
    pub contacted: bool,
    pub colonized: bool,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GameState {
    pub skills: SkillLedger,
    pub veterancy: VeterancyLedger,
    pub inventory: Inventory,
    pub settlement: Settlement,
    pub tasks: TaskLedger,
    pub gather: GatherCycles,
    pub plots: BTreeMap<usize, Plot>,
    pub planets: BTreeMap<String, PlanetStatus>,
    pub equipment: BTreeMap<Slot, String>,
    pub stance: Stance,
}
