//! Dual-track veterancy: secondary progression per resource and per skill.
//!
//! Resource veterancy follows the main leveling curve (capped at 200) and
//! drives extra-yield rolls and gather-limit bonuses. Skill veterancy keeps
//! an unbounded pool whose level follows a triangular cost curve (capped at
//! 100) and drives task speed plus a per-skill table of named bonuses.
//! Pool experience can be converted into resource experience at 10:1.

use crate::curve::{self, SkillProgress};
use crate::skills::Skill;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;
use tracing::debug;

pub const RESOURCE_VETERANCY_CAP: u32 = 200;
pub const SKILL_VETERANCY_CAP: u32 = 100;
/// Pool cost of level `L` is `STEP * L * (L + 1) / 2`.
pub const SKILL_VETERANCY_STEP: u64 = 50;
/// Pool experience spent per point of resource experience.
pub const CONVERSION_RATIO: u64 = 10;

/// Named bonus read by crafting to skip ingredient consumption.
pub const BONUS_INGREDIENT_SAVE: &str = "ingredient_save";
/// Named bonus read by every completion to scale primary experience.
pub const BONUS_XP: &str = "bonus_xp";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum VeterancyError {
    #[error("cannot convert {requested} {skill} veterancy, only {available} in pool")]
    InsufficientPool {
        skill: Skill,
        requested: u64,
        available: u64,
    },
    #[error("conversion amount must be positive")]
    NothingToConvert,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceVeterancy {
    pub resource_id: String,
    pub experience: u64,
}

impl ResourceVeterancy {
    pub fn level(&self) -> u32 {
        curve::level_from_experience(self.experience).min(RESOURCE_VETERANCY_CAP)
    }

    pub fn progress(&self) -> SkillProgress {
        let p = curve::progress(self.experience);
        if p.level < RESOURCE_VETERANCY_CAP {
            return p;
        }
        SkillProgress {
            level: RESOURCE_VETERANCY_CAP,
            experience: self.experience - curve::cumulative_experience(RESOURCE_VETERANCY_CAP),
            experience_to_next: 0,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkillVeterancy {
    pub skill: Skill,
    /// Never decreases except through conversion.
    pub pool: u64,
}

/// Pool needed to stand at skill veterancy `level`.
pub fn skill_pool_for_level(level: u32) -> u64 {
    let l = u64::from(level);
    SKILL_VETERANCY_STEP * l * (l + 1) / 2
}

impl SkillVeterancy {
    pub fn new(skill: Skill) -> Self {
        Self { skill, pool: 0 }
    }

    pub fn level(&self) -> u32 {
        let mut level = 0;
        while level < SKILL_VETERANCY_CAP && skill_pool_for_level(level + 1) <= self.pool {
            level += 1;
        }
        level
    }

    pub fn progress(&self) -> SkillProgress {
        let level = self.level();
        let experience_to_next = if level >= SKILL_VETERANCY_CAP {
            0
        } else {
            skill_pool_for_level(level + 1) - skill_pool_for_level(level)
        };
        SkillProgress {
            level,
            experience: self.pool - skill_pool_for_level(level),
            experience_to_next,
        }
    }
}

/// Duration multiplier from skill veterancy: 0.5% faster per level, at most 50%.
pub fn speed_multiplier(skill_level: u32) -> f64 {
    1.0 - (f64::from(skill_level) * 0.005).min(0.5)
}

/// Applies [`speed_multiplier`] to a base duration, never below 1 ms.
pub fn scaled_duration(base_ms: u64, skill_level: u32) -> u64 {
    ((base_ms as f64) * speed_multiplier(skill_level)).round().max(1.0) as u64
}

/// Extra gather attempts before a resource needs to respawn.
pub fn gather_limit_bonus(resource_level: u32) -> u32 {
    (resource_level / 5).min(50)
}

/// Bonus units for a completion given one uniform draw in `[0, 1)`.
///
/// The chance is `min(level, 200)` percent: every full 100% is a guaranteed
/// unit and the remainder is rolled against the draw.
pub fn extra_yield(resource_level: u32, draw: f64) -> u64 {
    let chance = resource_level.min(RESOURCE_VETERANCY_CAP);
    let guaranteed = u64::from(chance / 100);
    let remainder = f64::from(chance % 100);
    if draw * 100.0 < remainder {
        guaranteed + 1
    } else {
        guaranteed
    }
}

pub fn roll_extra_yield<R: Rng + ?Sized>(resource_level: u32, rng: &mut R) -> u64 {
    extra_yield(resource_level, rng.gen::<f64>())
}

/// Growth of one named bonus per veterancy bucket.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BonusRate {
    pub per_bucket: f64,
    pub cap: f64,
}

/// Per-skill table of named percentage bonuses, floor-divided by `bucket`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SkillBonusTable {
    pub bucket: u32,
    #[serde(default)]
    pub bonuses: BTreeMap<String, BonusRate>,
}

impl SkillBonusTable {
    /// Percentage for `name` at `level`; zero when the table has no such bonus.
    pub fn percent(&self, name: &str, level: u32) -> f64 {
        let Some(rate) = self.bonuses.get(name) else {
            return 0.0;
        };
        let buckets = f64::from(level / self.bucket.max(1));
        (buckets * rate.per_bucket).min(rate.cap)
    }

    pub fn all(&self, level: u32) -> BTreeMap<String, f64> {
        self.bonuses
            .keys()
            .map(|name| (name.clone(), self.percent(name, level)))
            .collect()
    }
}

/// Experience credited to both tracks by one completed action.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct VeterancyAward {
    pub resource_xp: u64,
    pub skill_xp: u64,
}

/// Result of a pool-to-resource conversion.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Conversion {
    pub pool_spent: u64,
    pub resource_xp: u64,
    pub skill_level: u32,
    pub resource_level: u32,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VeterancyLedger {
    resources: BTreeMap<String, ResourceVeterancy>,
    skills: BTreeMap<Skill, SkillVeterancy>,
}

impl VeterancyLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Zero for resources never gathered or crafted.
    pub fn resource_level(&self, resource_id: &str) -> u32 {
        self.resources
            .get(resource_id)
            .map(ResourceVeterancy::level)
            .unwrap_or(0)
    }

    pub fn resource(&self, resource_id: &str) -> Option<&ResourceVeterancy> {
        self.resources.get(resource_id)
    }

    pub fn skill_level(&self, skill: Skill) -> u32 {
        self.skills
            .get(&skill)
            .map(SkillVeterancy::level)
            .unwrap_or(0)
    }

    pub fn skill(&self, skill: Skill) -> Option<&SkillVeterancy> {
        self.skills.get(&skill)
    }

    pub fn resources(&self) -> impl Iterator<Item = &ResourceVeterancy> {
        self.resources.values()
    }

    pub fn skills(&self) -> impl Iterator<Item = &SkillVeterancy> {
        self.skills.values()
    }

    /// Credits resource experience 1:1 and skill pool 0.5:1 with `primary_xp`.
    pub fn award(&mut self, resource_id: Option<&str>, skill: Skill, primary_xp: u64) -> VeterancyAward {
        let resource_xp = match resource_id {
            Some(id) => {
                self.credit_resource(id, primary_xp);
                primary_xp
            }
            None => 0,
        };
        let skill_xp = primary_xp / 2;
        let entry = self
            .skills
            .entry(skill)
            .or_insert_with(|| SkillVeterancy::new(skill));
        entry.pool = entry.pool.saturating_add(skill_xp);
        VeterancyAward {
            resource_xp,
            skill_xp,
        }
    }

    fn credit_resource(&mut self, resource_id: &str, amount: u64) {
        let entry = self
            .resources
            .entry(resource_id.to_string())
            .or_insert_with(|| ResourceVeterancy {
                resource_id: resource_id.to_string(),
                experience: 0,
            });
        entry.experience = curve::apply_delta(
            entry.experience,
            i64::try_from(amount).unwrap_or(i64::MAX),
        );
    }

    /// Debits `amount` from the skill pool and credits `amount / 10` resource experience.
    ///
    /// Leaves the ledger untouched when the pool cannot cover `amount`.
    pub fn convert(
        &mut self,
        skill: Skill,
        resource_id: &str,
        amount: u64,
    ) -> Result<Conversion, VeterancyError> {
        if amount == 0 {
            return Err(VeterancyError::NothingToConvert);
        }
        let available = self.skills.get(&skill).map(|s| s.pool).unwrap_or(0);
        if amount > available {
            return Err(VeterancyError::InsufficientPool {
                skill,
                requested: amount,
                available,
            });
        }
        let skill_level = match self.skills.get_mut(&skill) {
            Some(entry) => {
                entry.pool -= amount;
                entry.level()
            }
            None => 0,
        };
        let resource_xp = amount / CONVERSION_RATIO;
        self.credit_resource(resource_id, resource_xp);
        let resource_level = self.resource_level(resource_id);
        debug!(%skill, resource_id, amount, resource_xp, "converted veterancy");
        Ok(Conversion {
            pool_spent: amount,
            resource_xp,
            skill_level,
            resource_level,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    #[test]
    fn award_ratios() {
        let mut v = VeterancyLedger::new();
        let a = v.award(Some("copper_ore"), Skill::Gathering, 25);
        assert_eq!(a.resource_xp, 25);
        assert_eq!(a.skill_xp, 12);
        assert_eq!(v.resource("copper_ore").unwrap().experience, 25);
        assert_eq!(v.skill(Skill::Gathering).unwrap().pool, 12);
    }

    #[test]
    fn resource_veterancy_created_lazily() {
        let v = VeterancyLedger::new();
        assert_eq!(v.resource_level("iron_ore"), 0);
        assert!(v.resource("iron_ore").is_none());
    }

    #[test]
    fn triangular_skill_levels_cap_at_hundred() {
        let mut s = SkillVeterancy::new(Skill::Smelting);
        s.pool = skill_pool_for_level(3);
        assert_eq!(s.level(), 3);
        s.pool -= 1;
        assert_eq!(s.level(), 2);
        s.pool = u64::MAX / 2;
        assert_eq!(s.level(), SKILL_VETERANCY_CAP);
        assert_eq!(s.progress().experience_to_next, 0);
    }

    #[test]
    fn speed_multiplier_is_capped() {
        assert_eq!(speed_multiplier(0), 1.0);
        assert!((speed_multiplier(10) - 0.95).abs() < 1e-9);
        assert_eq!(speed_multiplier(100), 0.5);
        assert_eq!(speed_multiplier(400), 0.5);
        assert_eq!(scaled_duration(3_000, 100), 1_500);
    }

    #[test]
    fn extra_yield_interpolates() {
        assert_eq!(extra_yield(0, 0.0), 0);
        assert_eq!(extra_yield(40, 0.39), 1);
        assert_eq!(extra_yield(40, 0.40), 0);
        assert_eq!(extra_yield(100, 0.99), 1);
        assert_eq!(extra_yield(150, 0.2), 2);
        assert_eq!(extra_yield(150, 0.7), 1);
        assert_eq!(extra_yield(200, 0.999), 2);
        assert_eq!(extra_yield(500, 0.999), 2);
    }

    #[test]
    fn seeded_extra_yield_is_reproducible() {
        let mut a = ChaCha8Rng::seed_from_u64(7);
        let mut b = ChaCha8Rng::seed_from_u64(7);
        let xs: Vec<u64> = (0..32).map(|_| roll_extra_yield(55, &mut a)).collect();
        let ys: Vec<u64> = (0..32).map(|_| roll_extra_yield(55, &mut b)).collect();
        assert_eq!(xs, ys);
        assert!(xs.iter().all(|&x| x <= 1));
    }

    #[test]
    fn gather_bonus_caps_at_fifty() {
        assert_eq!(gather_limit_bonus(4), 0);
        assert_eq!(gather_limit_bonus(27), 5);
        assert_eq!(gather_limit_bonus(1_000), 50);
    }

    #[test]
    fn bonus_table_buckets() {
        let mut bonuses = BTreeMap::new();
        bonuses.insert(
            BONUS_INGREDIENT_SAVE.to_string(),
            BonusRate {
                per_bucket: 2.0,
                cap: 20.0,
            },
        );
        let table = SkillBonusTable { bucket: 5, bonuses };
        assert_eq!(table.percent(BONUS_INGREDIENT_SAVE, 4), 0.0);
        assert_eq!(table.percent(BONUS_INGREDIENT_SAVE, 12), 4.0);
        assert_eq!(table.percent(BONUS_INGREDIENT_SAVE, 100), 20.0);
        assert_eq!(table.percent(BONUS_XP, 100), 0.0);
        assert_eq!(table.all(12).len(), 1);
    }

    #[test]
    fn conversion_debits_pool_and_credits_resource() {
        let mut v = VeterancyLedger::new();
        v.award(None, Skill::Smelting, 2_000);
        let c = v.convert(Skill::Smelting, "bronze_bar", 105).unwrap();
        assert_eq!(c.resource_xp, 10);
        assert_eq!(v.skill(Skill::Smelting).unwrap().pool, 895);
        assert_eq!(v.resource("bronze_bar").unwrap().experience, 10);
    }

    #[test]
    fn conversion_over_pool_is_noop() {
        let mut v = VeterancyLedger::new();
        v.award(None, Skill::Smelting, 20);
        let before = v.clone();
        let err = v.convert(Skill::Smelting, "bronze_bar", 11).unwrap_err();
        assert!(matches!(err, VeterancyError::InsufficientPool { available: 10, .. }));
        assert_eq!(v, before);
    }

    #[test]
    fn resource_progress_caps() {
        let r = ResourceVeterancy {
            resource_id: "x".into(),
            experience: u64::MAX / 4,
        };
        assert_eq!(r.level(), RESOURCE_VETERANCY_CAP);
        assert_eq!(r.progress().experience_to_next, 0);
    }
}
