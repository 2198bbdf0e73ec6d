//! Static content tables: resources, recipes, crops, planets, buildings,
//! equipment and enemies, keyed by string id.
//!
//! Loaded once (YAML or JSON), validated, then shared read-only. Lookups
//! return `Option` so callers can treat a missing id as a skip.

use crate::inventory::Namespace;
use crate::skills::Skill;
use crate::veterancy::SkillBonusTable;
use crate::{LoadError, ValidationError};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::info;

/// Combat stance chosen by the player.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stance {
    #[default]
    Bash,
    Cut,
    Stab,
    Block,
}

impl Stance {
    /// Sub-stat trained while fighting in this stance.
    pub fn trained_skill(self) -> Skill {
        match self {
            Stance::Bash => Skill::Strength,
            Stance::Cut => Skill::Attack,
            Stance::Stab => Skill::Agility,
            Stance::Block => Skill::Defence,
        }
    }

    pub fn damage_type(self) -> Option<DamageType> {
        match self {
            Stance::Bash => Some(DamageType::Crush),
            Stance::Cut => Some(DamageType::Slash),
            Stance::Stab => Some(DamageType::Pierce),
            Stance::Block => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DamageType {
    Crush,
    Slash,
    Pierce,
}

impl DamageType {
    pub fn stance(self) -> Stance {
        match self {
            DamageType::Crush => Stance::Bash,
            DamageType::Slash => Stance::Cut,
            DamageType::Pierce => Stance::Stab,
        }
    }
}

/// Hit-chance multipliers per damage style, 0–100.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Affinities {
    pub crush: u32,
    pub slash: u32,
    pub pierce: u32,
}

impl Default for Affinities {
    fn default() -> Self {
        Self {
            crush: 100,
            slash: 100,
            pierce: 100,
        }
    }
}

impl Affinities {
    pub fn get(&self, damage_type: DamageType) -> u32 {
        let v = match damage_type {
            DamageType::Crush => self.crush,
            DamageType::Slash => self.slash,
            DamageType::Pierce => self.pierce,
        };
        v.min(100)
    }
}

/// Damage taken per style, in percent (100 = unmodified).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DamageMultipliers {
    pub crush: u32,
    pub slash: u32,
    pub pierce: u32,
}

impl Default for DamageMultipliers {
    fn default() -> Self {
        Self {
            crush: 100,
            slash: 100,
            pierce: 100,
        }
    }
}

impl DamageMultipliers {
    pub fn get(&self, damage_type: DamageType) -> u32 {
        match damage_type {
            DamageType::Crush => self.crush,
            DamageType::Slash => self.slash,
            DamageType::Pierce => self.pierce,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Slot {
    Weapon,
    Head,
    Body,
    Legs,
    Shield,
}

fn default_gathering() -> Skill {
    Skill::Gathering
}

fn one() -> u64 {
    1
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GatherDef {
    /// Skill trained and checked; gathering unless stated.
    #[serde(default = "default_gathering")]
    pub skill: Skill,
    /// Minimum skill level to start.
    pub level_required: u32,
    /// Base cycle length before veterancy speed-ups.
    pub time_ms: u64,
    /// Skill experience per completion.
    pub xp: u64,
    /// Completions allowed before the node needs to respawn.
    pub base_limit: u32,
    /// Cooldown once the limit is used up.
    pub respawn_ms: u64,
}

/// Any item that can sit in a stockpile.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ResourceDef {
    /// Unique key, e.g. "copper_ore".
    pub id: String,
    /// Display name.
    pub name: String,
    /// Stockpile the item is stored in.
    #[serde(default)]
    pub namespace: Namespace,
    /// Present only for resources that can be gathered directly.
    #[serde(default)]
    pub gather: Option<GatherDef>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CraftKind {
    Smelt,
    Engineer,
}

impl CraftKind {
    pub fn skill(self) -> Skill {
        match self {
            CraftKind::Smelt => Skill::Smelting,
            CraftKind::Engineer => Skill::Engineering,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RecipeDef {
    pub id: String,
    pub name: String,
    /// Smelt or engineer; picks the trained skill.
    pub kind: CraftKind,
    pub level_required: u32,
    /// Base cycle length before veterancy speed-ups.
    pub time_ms: u64,
    pub xp: u64,
    /// Resource id to quantity, consumed when a cycle completes.
    pub ingredients: BTreeMap<String, u64>,
    /// Resource id produced.
    pub output: String,
    #[serde(default = "one")]
    pub output_qty: u64,
}

/// A plantable seed. `id` is the seed item consumed on planting.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CropDef {
    pub id: String,
    pub name: String,
    /// Resource id granted on harvest.
    pub crop: String,
    /// Units per harvest before extra yield.
    pub yield_qty: u64,
    pub grow_time_ms: u64,
    pub xp: u64,
    pub level_required: u32,
}

/// A planet reached by contact and then colonization.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PlanetDef {
    pub id: String,
    pub name: String,
    pub contact_level: u32,
    pub contact_time_ms: u64,
    pub contact_xp: u64,
    pub colonize_level: u32,
    pub colonize_time_ms: u64,
    pub colonize_xp: u64,
    /// Gold paid when colonization starts.
    pub colonize_cost: u64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ProductionDef {
    /// Resource id accrued.
    pub resource: String,
    /// Units per hour at level 1 with one worker of efficiency 1.0.
    pub base_rate_per_hour: Decimal,
    /// Storage cap at level 1.
    pub base_storage: Decimal,
    /// Extra storage per level above 1.
    #[serde(default)]
    pub storage_per_level: Decimal,
    /// Skill credited on collection.
    pub skill: Skill,
    /// Experience per collected unit, floored, at least 1.
    pub xp_per_unit: Decimal,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BuildingDef {
    pub id: String,
    pub name: String,
    /// Gold paid when construction starts.
    pub cost: u64,
    pub build_time_ms: u64,
    /// Construction experience on completion.
    pub build_xp: u64,
    /// Minimum construction level.
    pub level_required: u32,
    pub max_level: u32,
    /// Gold per target level when upgrading.
    pub upgrade_cost: u64,
    /// Worker slots at level 1.
    pub base_worker_cap: u32,
    /// Extra worker slots per level above 1.
    #[serde(default)]
    pub workers_per_level: u32,
    /// Absent for buildings that produce nothing.
    #[serde(default)]
    pub production: Option<ProductionDef>,
}

impl BuildingDef {
    pub fn worker_cap(&self, level: u32) -> usize {
        let extra = self.workers_per_level.saturating_mul(level.saturating_sub(1));
        self.base_worker_cap.saturating_add(extra) as usize
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EquipmentDef {
    pub id: String,
    pub name: String,
    /// Slot the item occupies; one item per slot.
    pub slot: Slot,
    #[serde(default)]
    pub accuracy: u32,
    #[serde(default)]
    pub armor: u32,
    #[serde(default)]
    pub damage: u32,
    /// Replaces the unarmed attack speed; weapons only.
    #[serde(default)]
    pub attack_speed_ms: Option<u64>,
    /// Percent chance, added across gear.
    #[serde(default)]
    pub crit_chance: u32,
    /// Crit damage in percent of the rolled hit, e.g. 150.
    #[serde(default)]
    pub crit_damage: u32,
    /// Stance that gets the +3 max-hit bonus; others get -1.
    #[serde(default)]
    pub preferred_stance: Option<Stance>,
    /// Replaces the default affinities; weapons only.
    #[serde(default)]
    pub affinities: Option<Affinities>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EnemyAttack {
    pub name: String,
    pub damage: u32,
    pub damage_type: DamageType,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LootDrop {
    pub item: String,
    pub qty: u64,
    /// Percent chance, 0–100.
    pub chance: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EnemyDef {
    pub id: String,
    pub name: String,
    /// Minimum combat level to engage.
    #[serde(default)]
    pub level_required: u32,
    pub max_health: u32,
    pub accuracy: u32,
    pub armor: u32,
    /// Fixed time between enemy attacks.
    pub attack_speed_ms: u64,
    #[serde(default)]
    pub affinities: Affinities,
    /// Damage taken per style, in percent.
    #[serde(default)]
    pub damage_multipliers: DamageMultipliers,
    /// One is picked at random each enemy turn.
    pub attacks: Vec<EnemyAttack>,
    /// Combat experience per kill.
    pub xp_reward: u64,
    pub gold_reward: u64,
    /// Rolled independently on each kill.
    #[serde(default)]
    pub drops: Vec<LootDrop>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
struct RawReferenceData {
    resources: Vec<ResourceDef>,
    recipes: Vec<RecipeDef>,
    crops: Vec<CropDef>,
    planets: Vec<PlanetDef>,
    buildings: Vec<BuildingDef>,
    equipment: Vec<EquipmentDef>,
    enemies: Vec<EnemyDef>,
    skill_bonuses: BTreeMap<Skill, SkillBonusTable>,
}

/// Immutable content tables, indexed by id. Built once by
/// [`ReferenceData::from_yaml_str`] or [`ReferenceData::from_json_str`].
#[derive(Clone, Debug, Default)]
pub struct ReferenceData {
    resources: BTreeMap<String, ResourceDef>,
    recipes: BTreeMap<String, RecipeDef>,
    crops: BTreeMap<String, CropDef>,
    planets: BTreeMap<String, PlanetDef>,
    buildings: BTreeMap<String, BuildingDef>,
    equipment: BTreeMap<String, EquipmentDef>,
    enemies: BTreeMap<String, EnemyDef>,
    skill_bonuses: BTreeMap<Skill, SkillBonusTable>,
}

fn index<T>(
    table: &'static str,
    rows: Vec<T>,
    id: impl Fn(&T) -> &str,
) -> Result<BTreeMap<String, T>, ValidationError> {
    let mut out = BTreeMap::new();
    for row in rows {
        let key = id(&row).to_string();
        if out.contains_key(&key) {
            return Err(ValidationError::DuplicateId { table, id: key });
        }
        out.insert(key, row);
    }
    Ok(out)
}

impl ReferenceData {
    pub fn from_yaml_str(text: &str) -> Result<Self, LoadError> {
        let raw: RawReferenceData = serde_yaml::from_str(text)?;
        Self::from_raw(raw)
    }

    pub fn from_json_str(text: &str) -> Result<Self, LoadError> {
        let raw: RawReferenceData = serde_json::from_str(text)?;
        Self::from_raw(raw)
    }

    fn from_raw(raw: RawReferenceData) -> Result<Self, LoadError> {
        let data = Self {
            resources: index("resources", raw.resources, |r| &r.id)?,
            recipes: index("recipes", raw.recipes, |r| &r.id)?,
            crops: index("crops", raw.crops, |r| &r.id)?,
            planets: index("planets", raw.planets, |r| &r.id)?,
            buildings: index("buildings", raw.buildings, |r| &r.id)?,
            equipment: index("equipment", raw.equipment, |r| &r.id)?,
            enemies: index("enemies", raw.enemies, |r| &r.id)?,
            skill_bonuses: raw.skill_bonuses,
        };
        data.validate()?;
        info!(
            resources = data.resources.len(),
            recipes = data.recipes.len(),
            buildings = data.buildings.len(),
            enemies = data.enemies.len(),
            "reference data loaded"
        );
        Ok(data)
    }

    /// Checks cross-references and basic numeric sanity.
    pub fn validate(&self) -> Result<(), ValidationError> {
        let known = |table: &'static str, id: &str, missing: &str| {
            if self.resources.contains_key(missing) {
                Ok(())
            } else {
                Err(ValidationError::UnknownReference {
                    table,
                    id: id.to_string(),
                    missing: missing.to_string(),
                })
            }
        };
        let positive = |table: &'static str, id: &str, field: &'static str, v: u64| {
            if v > 0 {
                Ok(())
            } else {
                Err(ValidationError::NonPositive {
                    table,
                    id: id.to_string(),
                    field,
                })
            }
        };

        for r in self.resources.values() {
            if let Some(g) = &r.gather {
                positive("resources", &r.id, "gather.time_ms", g.time_ms)?;
                positive("resources", &r.id, "gather.level_required", u64::from(g.level_required))?;
            }
        }
        for r in self.recipes.values() {
            positive("recipes", &r.id, "time_ms", r.time_ms)?;
            positive("recipes", &r.id, "level_required", u64::from(r.level_required))?;
            positive("recipes", &r.id, "output_qty", r.output_qty)?;
            known("recipes", &r.id, &r.output)?;
            for ingredient in r.ingredients.keys() {
                known("recipes", &r.id, ingredient)?;
            }
        }
        for c in self.crops.values() {
            positive("crops", &c.id, "grow_time_ms", c.grow_time_ms)?;
            positive("crops", &c.id, "level_required", u64::from(c.level_required))?;
            known("crops", &c.id, &c.crop)?;
        }
        for p in self.planets.values() {
            positive("planets", &p.id, "contact_time_ms", p.contact_time_ms)?;
            positive("planets", &p.id, "colonize_time_ms", p.colonize_time_ms)?;
        }
        for b in self.buildings.values() {
            positive("buildings", &b.id, "build_time_ms", b.build_time_ms)?;
            positive("buildings", &b.id, "max_level", u64::from(b.max_level))?;
            if let Some(p) = &b.production {
                known("buildings", &b.id, &p.resource)?;
                if p.base_rate_per_hour <= Decimal::ZERO || p.base_storage <= Decimal::ZERO {
                    return Err(ValidationError::NonPositive {
                        table: "buildings",
                        id: b.id.clone(),
                        field: "production",
                    });
                }
            }
        }
        for e in self.equipment.values() {
            if let Some(speed) = e.attack_speed_ms {
                positive("equipment", &e.id, "attack_speed_ms", speed)?;
            }
        }
        for e in self.enemies.values() {
            positive("enemies", &e.id, "max_health", u64::from(e.max_health))?;
            positive("enemies", &e.id, "attack_speed_ms", e.attack_speed_ms)?;
            positive("enemies", &e.id, "attacks", e.attacks.len() as u64)?;
            for d in &e.drops {
                known("enemies", &e.id, &d.item)?;
            }
        }
        for (skill, table) in &self.skill_bonuses {
            positive("skill_bonuses", skill.name(), "bucket", u64::from(table.bucket))?;
        }
        Ok(())
    }

    pub fn resource(&self, id: &str) -> Option<&ResourceDef> {
        self.resources.get(id)
    }

    pub fn recipe(&self, id: &str) -> Option<&RecipeDef> {
        self.recipes.get(id)
    }

    pub fn crop(&self, id: &str) -> Option<&CropDef> {
        self.crops.get(id)
    }

    pub fn planet(&self, id: &str) -> Option<&PlanetDef> {
        self.planets.get(id)
    }

    pub fn building(&self, id: &str) -> Option<&BuildingDef> {
        self.buildings.get(id)
    }

    pub fn equipment(&self, id: &str) -> Option<&EquipmentDef> {
        self.equipment.get(id)
    }

    pub fn enemy(&self, id: &str) -> Option<&EnemyDef> {
        self.enemies.get(id)
    }

    pub fn resources(&self) -> impl Iterator<Item = &ResourceDef> {
        self.resources.values()
    }

    pub fn recipes(&self) -> impl Iterator<Item = &RecipeDef> {
        self.recipes.values()
    }

    pub fn enemies(&self) -> impl Iterator<Item = &EnemyDef> {
        self.enemies.values()
    }

    /// Stockpile a resource belongs to; unknown ids go to the player.
    pub fn namespace_of(&self, resource_id: &str) -> Namespace {
        self.resources
            .get(resource_id)
            .map(|r| r.namespace)
            .unwrap_or_default()
    }

    /// Named veterancy bonus for `skill` at `level`, in percent.
    pub fn bonus_percent(&self, skill: Skill, name: &str, level: u32) -> f64 {
        self.skill_bonuses
            .get(&skill)
            .map(|t| t.percent(name, level))
            .unwrap_or(0.0)
    }
}
