//! Inbound player intents and the precondition failures they can hit.

use crate::tasks::ActivityClass;
use serde::{Deserialize, Serialize};
use sim_core::reference::{Slot, Stance};
use sim_core::veterancy::VeterancyError;
use sim_core::Skill;
use sim_econ::{BuildingId, EconError, WorkerId};
use thiserror::Error;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "intent", rename_all = "snake_case")]
pub enum Intent {
    Gather {
        resource: String,
        #[serde(default)]
        auto_resume: bool,
    },
    Craft {
        recipe: String,
        #[serde(default)]
        auto_resume: bool,
    },
    Stop {
        class: ActivityClass,
        subject: String,
    },
    Construct {
        building: String,
    },
    Upgrade {
        building: BuildingId,
    },
    Hire {
        name: String,
    },
    Assign {
        worker: WorkerId,
        building: Option<BuildingId>,
    },
    Collect {
        building: BuildingId,
    },
    Stance {
        stance: Stance,
    },
    StartCombat {
        enemy: String,
    },
    StopCombat,
    Resume,
    ConvertVeterancy {
        skill: Skill,
        resource: String,
        amount: u64,
    },
    Plant {
        plot: usize,
        seed: String,
    },
    Harvest {
        plot: usize,
    },
    Contact {
        planet: String,
    },
    Colonize {
        planet: String,
    },
    Equip {
        item: String,
    },
    Unequip {
        slot: Slot,
    },
}

/// Why an intent was rejected. Rejected intents change nothing.
#[derive(Debug, Error, PartialEq)]
pub enum IntentError {
    #[error("unknown {kind} '{id}'")]
    Unknown { kind: &'static str, id: String },
    #[error("{what} cannot be gathered")]
    NotGatherable { what: String },
    #[error("requires {skill} level {required} (you are {current})")]
    LevelTooLow {
        skill: Skill,
        required: u32,
        current: u32,
    },
    #[error("{what} is respawning")]
    Respawning { what: String },
    #[error("missing ingredients for {what}")]
    MissingIngredients { what: String },
    #[error("not enough gold: need {need}, have {have}")]
    NotEnoughGold { need: u64, have: u64 },
    #[error("you do not have {item}")]
    MissingItem { item: String },
    #[error("{class} tasks cannot be stopped")]
    NotStoppable { class: ActivityClass },
    #[error("no {class} task for '{subject}'")]
    NotRunning { class: ActivityClass, subject: String },
    #[error("plot {0} does not exist")]
    NoSuchPlot(usize),
    #[error("plot {0} is already planted")]
    PlotOccupied(usize),
    #[error("plot {0} has nothing ready to harvest")]
    NothingToHarvest(usize),
    #[error("{planet} has not been contacted")]
    NotContacted { planet: String },
    #[error("{planet} is already colonized")]
    AlreadyColonized { planet: String },
    #[error("{planet} is already contacted")]
    AlreadyContacted { planet: String },
    #[error("already working on {what}")]
    AlreadyRunning { what: String },
    #[error("nothing equipped in {0:?} slot")]
    EmptySlot(Slot),
    #[error("not in combat")]
    NotInCombat,
    #[error(transparent)]
    Econ(#[from] EconError),
    #[error(transparent)]
    Veterancy(#[from] VeterancyError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn intents_read_from_yaml() {
        let text = r#"
- { intent: gather, resource: copper_ore, auto_resume: true }
- { intent: assign, worker: 1, building: null }
- { intent: stance, stance: cut }
- { intent: stop_combat }
"#;
        let intents: Vec<Intent> = serde_yaml::from_str(text).unwrap();
        assert_eq!(
            intents[0],
            Intent::Gather {
                resource: "copper_ore".into(),
                auto_resume: true
            }
        );
        assert_eq!(
            intents[1],
            Intent::Assign {
                worker: WorkerId(1),
                building: None
            }
        );
        assert_eq!(intents[2], Intent::Stance { stance: Stance::Cut });
        assert_eq!(intents[3], Intent::StopCombat);
    }

    #[test]
    fn errors_read_as_sentences() {
        let e = IntentError::LevelTooLow {
            skill: Skill::Smelting,
            required: 5,
            current: 2,
        };
        assert_eq!(e.to_string(), "requires smelting level 5 (you are 2)");
    }
}
