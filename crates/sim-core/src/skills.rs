//! Primary skills and their cumulative experience ledger.

use crate::curve::{self, SkillProgress};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use tracing::debug;

/// Every skill the player can train.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Skill {
    Gathering,
    Smelting,
    Engineering,
    Farming,
    Construction,
    Diplomacy,
    Colonization,
    /// Primary combat skill; the sub-stats below are trained by stances.
    Combat,
    Attack,
    Strength,
    Defence,
    Agility,
}

impl Skill {
    pub const ALL: [Skill; 12] = [
        Skill::Gathering,
        Skill::Smelting,
        Skill::Engineering,
        Skill::Farming,
        Skill::Construction,
        Skill::Diplomacy,
        Skill::Colonization,
        Skill::Combat,
        Skill::Attack,
        Skill::Strength,
        Skill::Defence,
        Skill::Agility,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Skill::Gathering => "gathering",
            Skill::Smelting => "smelting",
            Skill::Engineering => "engineering",
            Skill::Farming => "farming",
            Skill::Construction => "construction",
            Skill::Diplomacy => "diplomacy",
            Skill::Colonization => "colonization",
            Skill::Combat => "combat",
            Skill::Attack => "attack",
            Skill::Strength => "strength",
            Skill::Defence => "defence",
            Skill::Agility => "agility",
        }
    }
}

impl fmt::Display for Skill {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Level before and after a signed experience change.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LevelChange {
    pub skill: Skill,
    pub before: u32,
    pub after: u32,
}

impl LevelChange {
    pub fn leveled_up(&self) -> bool {
        self.after > self.before
    }

    pub fn leveled_down(&self) -> bool {
        self.after < self.before
    }
}

/// Cumulative experience per skill. Skills never trained read as level 1.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkillLedger {
    experience: BTreeMap<Skill, u64>,
}

impl SkillLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn experience(&self, skill: Skill) -> u64 {
        self.experience.get(&skill).copied().unwrap_or(0)
    }

    pub fn level(&self, skill: Skill) -> u32 {
        curve::level_from_experience(self.experience(skill))
    }

    pub fn progress(&self, skill: Skill) -> SkillProgress {
        curve::progress(self.experience(skill))
    }

    /// Applies a signed delta and re-derives the level from the new total.
    pub fn apply(&mut self, skill: Skill, delta: i64) -> LevelChange {
        let before = self.level(skill);
        let total = curve::apply_delta(self.experience(skill), delta);
        self.experience.insert(skill, total);
        let after = curve::level_from_experience(total);
        debug!(%skill, delta, total, level = after, "skill experience changed");
        LevelChange {
            skill,
            before,
            after,
        }
    }

    pub fn grant(&mut self, skill: Skill, amount: u64) -> LevelChange {
        self.apply(skill, i64::try_from(amount).unwrap_or(i64::MAX))
    }

    /// Removes `percent` of the current cumulative total (floored).
    pub fn penalise_percent(&mut self, skill: Skill, percent: u32) -> (u64, LevelChange) {
        let loss = self.experience(skill).saturating_mul(u64::from(percent.min(100))) / 100;
        let change = self.apply(skill, -i64::try_from(loss).unwrap_or(i64::MAX));
        (loss, change)
    }

    pub fn iter(&self) -> impl Iterator<Item = (Skill, SkillProgress)> + '_ {
        Skill::ALL.iter().map(|&s| (s, self.progress(s)))
    }

    /// Sum of all skill levels, shown as the player's total level.
    pub fn total_level(&self) -> u32 {
        Skill::ALL.iter().map(|&s| self.level(s)).sum()
    }
}
