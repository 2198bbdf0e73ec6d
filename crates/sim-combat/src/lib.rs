#![deny(warnings)]

//! Turn-based combat resolver for Frontier Idle.
//!
//! Two actors alternate: the player attacks with the selected stance, the
//! enemy answers with a random attack from its list. Each actor is gated by
//! its own attack-speed timer and by whose turn it is. A turn lock guards
//! the whole resolve-one-action body; rewards and penalties are queued as
//! [`Effect`]s and applied by the owner of the ledgers after the tick.

pub mod formulas;

use formulas::*;
use rand::Rng;
use serde::{Deserialize, Serialize};
use sim_core::reference::{Affinities, EnemyDef, Stance};
use sim_core::{Effect, EffectQueue, Namespace, NotificationKind, Skill, Timestamp};
use std::sync::Arc;
use tracing::{debug, info};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Actor {
    Player,
    Enemy,
}

impl Actor {
    pub fn other(self) -> Actor {
        match self {
            Actor::Player => Actor::Enemy,
            Actor::Enemy => Actor::Player,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CombatPhase {
    Idle,
    Active { turn: Actor },
    /// Post-kill pause before the next encounter.
    Searching { until: Timestamp },
    /// Player died; waits for [`CombatResolver::resume`].
    ResolvedDeath,
}

/// What a single tick did.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TickOutcome {
    Idle,
    /// Called while a resolution was still in progress.
    Locked,
    Waiting,
    Acted(Actor),
    EncounterStarted,
}

/// Player stats recomputed every tick from equipment, levels and veterancy.
#[derive(Clone, Debug, PartialEq)]
pub struct PlayerCombatStats {
    /// Health pool at the start of an encounter.
    pub max_health: u32,
    /// Attack level plus gear accuracy.
    pub accuracy: u32,
    /// Defence level plus gear armor.
    pub armor: u32,
    /// Weapon affinities, or the unarmed defaults.
    pub affinities: Affinities,
    /// Time between player attacks, after agility veterancy.
    pub attack_speed_ms: u64,
    /// Summed gear damage.
    pub weapon_damage: u32,
    /// Stance the equipped weapon favours.
    pub weapon_stance: Option<Stance>,
    /// Percent chance, 0–100.
    pub crit_chance: u32,
    /// Percent of the rolled hit, e.g. 150.
    pub crit_damage: u32,
    pub attack_level: u32,
    pub strength_level: u32,
    pub defence_level: u32,
    pub agility_level: u32,
    /// Mitigation fraction from defence veterancy.
    pub defence_bonus: f64,
}

impl PlayerCombatStats {
    /// Level of the sub-stat a stance trains and rolls damage from.
    pub fn sub_level(&self, stance: Stance) -> u32 {
        match stance.trained_skill() {
            Skill::Attack => self.attack_level,
            Skill::Strength => self.strength_level,
            Skill::Agility => self.agility_level,
            _ => self.defence_level,
        }
    }
}

/// Single-holder flag around one action's resolution.
///
/// `tick` takes `&mut self`, so two callers can never interleave; the flag
/// is a structural guard that turns any re-entry from inside a resolution
/// into a no-op. It is held only while `step` runs and is always released
/// before `tick` returns.
#[derive(Clone, Debug, Default)]
struct TurnLock {
    held: bool,
}

impl TurnLock {
    fn try_acquire(&mut self) -> bool {
        if self.held {
            return false;
        }
        self.held = true;
        true
    }

    fn release(&mut self) {
        self.held = false;
    }

    fn is_held(&self) -> bool {
        self.held
    }
}

#[derive(Clone, Debug)]
pub struct CombatResolver {
    phase: CombatPhase,
    stance: Stance,
    enemy: Option<Arc<EnemyDef>>,
    player_health: u32,
    player_max_health: u32,
    enemy_health: u32,
    player_last_attack: Timestamp,
    enemy_last_attack: Timestamp,
    lock: TurnLock,
    death_flag: bool,
    effects: EffectQueue,
    kills: u64,
    search_delay_ms: u64,
    death_penalty_percent: u32,
}

impl CombatResolver {
    pub fn new(search_delay_ms: u64, death_penalty_percent: u32) -> Self {
        Self {
            phase: CombatPhase::Idle,
            stance: Stance::default(),
            enemy: None,
            player_health: 0,
            player_max_health: 0,
            enemy_health: 0,
            player_last_attack: Timestamp::default(),
            enemy_last_attack: Timestamp::default(),
            lock: TurnLock::default(),
            death_flag: false,
            effects: EffectQueue::new(),
            kills: 0,
            search_delay_ms,
            death_penalty_percent,
        }
    }

    pub fn phase(&self) -> CombatPhase {
        self.phase
    }

    pub fn is_engaged(&self) -> bool {
        !matches!(self.phase, CombatPhase::Idle)
    }

    pub fn stance(&self) -> Stance {
        self.stance
    }

    pub fn set_stance(&mut self, stance: Stance) {
        self.stance = stance;
    }

    pub fn enemy(&self) -> Option<&EnemyDef> {
        self.enemy.as_deref()
    }

    pub fn player_health(&self) -> u32 {
        self.player_health
    }

    pub fn enemy_health(&self) -> u32 {
        self.enemy_health
    }

    pub fn kills(&self) -> u64 {
        self.kills
    }

    /// True only while an action is being resolved.
    pub fn is_locked(&self) -> bool {
        self.lock.is_held()
    }

    /// Effects queued by resolved actions, in resolution order.
    pub fn take_effects(&mut self) -> Vec<Effect> {
        self.effects.take()
    }

    pub fn start(&mut self, enemy: &EnemyDef, stats: &PlayerCombatStats, now: Timestamp) {
        self.enemy = Some(Arc::new(enemy.clone()));
        self.begin_encounter(stats.max_health, now);
        info!(enemy = %enemy.id, "combat started");
    }

    pub fn stop(&mut self) {
        self.phase = CombatPhase::Idle;
        self.enemy = None;
        self.death_flag = false;
    }

    /// Acknowledges a death. Fights the same enemy again if one is selected.
    pub fn resume(&mut self, stats: &PlayerCombatStats, now: Timestamp) -> CombatPhase {
        if self.phase != CombatPhase::ResolvedDeath {
            return self.phase;
        }
        self.death_flag = false;
        if self.enemy.is_some() {
            self.begin_encounter(stats.max_health, now);
        } else {
            self.phase = CombatPhase::Idle;
        }
        self.phase
    }

    fn begin_encounter(&mut self, player_max_health: u32, now: Timestamp) {
        self.player_max_health = player_max_health;
        self.player_health = player_max_health;
        self.enemy_health = self.enemy.as_ref().map(|e| e.max_health).unwrap_or(0);
        self.player_last_attack = now;
        self.enemy_last_attack = now;
        self.phase = CombatPhase::Active { turn: Actor::Player };
    }

    /// Resolves at most one action. `now` must be the tick's single sample.
    pub fn tick<R: Rng>(
        &mut self,
        now: Timestamp,
        stats: &PlayerCombatStats,
        rng: &mut R,
    ) -> TickOutcome {
        if !self.lock.try_acquire() {
            return TickOutcome::Locked;
        }
        let outcome = self.step(now, stats, rng);
        // Every effect of this action is queued by now.
        self.lock.release();
        outcome
    }

    fn step<R: Rng>(
        &mut self,
        now: Timestamp,
        stats: &PlayerCombatStats,
        rng: &mut R,
    ) -> TickOutcome {
        match self.phase {
            CombatPhase::Idle | CombatPhase::ResolvedDeath => TickOutcome::Idle,
            CombatPhase::Searching { until } => {
                if now < until {
                    return TickOutcome::Waiting;
                }
                self.enemy_health = self.enemy.as_ref().map(|e| e.max_health).unwrap_or(0);
                self.player_last_attack = now;
                self.enemy_last_attack = now;
                self.phase = CombatPhase::Active { turn: Actor::Player };
                TickOutcome::EncounterStarted
            }
            CombatPhase::Active { turn } => {
                let Some(enemy) = self.enemy.clone() else {
                    self.phase = CombatPhase::Idle;
                    return TickOutcome::Idle;
                };
                self.player_max_health = stats.max_health;
                self.player_health = self.player_health.min(stats.max_health);

                let (last, speed) = match turn {
                    Actor::Player => (self.player_last_attack, stats.attack_speed_ms),
                    Actor::Enemy => (self.enemy_last_attack, enemy.attack_speed_ms),
                };
                if now.since(last) < speed {
                    return TickOutcome::Waiting;
                }
                // Hand the turn over before resolving anything.
                self.phase = CombatPhase::Active { turn: turn.other() };
                match turn {
                    Actor::Player => {
                        self.player_last_attack = now;
                        self.player_turn(&enemy, stats, rng, now);
                    }
                    Actor::Enemy => {
                        self.enemy_last_attack = now;
                        self.enemy_turn(&enemy, stats, rng);
                    }
                }
                TickOutcome::Acted(turn)
            }
        }
    }

    fn notify(&mut self, kind: NotificationKind, message: String) {
        self.effects.push(Effect::Notify { kind, message });
    }

    /// Primary XP plus the matching skill-veterancy award.
    fn grant_xp(&mut self, skill: Skill, amount: u64) {
        self.effects.push(Effect::GrantXp { skill, amount });
        self.effects.push(Effect::AwardVeterancy {
            resource: None,
            skill,
            primary_xp: amount,
        });
    }

    fn player_turn<R: Rng>(
        &mut self,
        enemy: &EnemyDef,
        stats: &PlayerCombatStats,
        rng: &mut R,
        now: Timestamp,
    ) {
        let stance = self.stance;
        let Some(damage_type) = stance.damage_type() else {
            self.notify(NotificationKind::Combat, "You raise your guard.".to_string());
            return;
        };
        let h = hit_chance(stats.affinities.get(damage_type), stats.accuracy, enemy.armor);
        if h < 1.0 {
            self.notify(
                NotificationKind::Combat,
                format!("You miss the {}.", enemy.name),
            );
            return;
        }
        let top = max_hit(
            stats.sub_level(stance),
            stats.weapon_damage,
            stance_bonus(stats.weapon_stance, stance),
        );
        let mut rolled = rng.gen_range(MIN_HIT..=top);
        let crit = rng.gen::<f64>() * 100.0 < f64::from(stats.crit_chance);
        if crit {
            rolled = apply_crit(rolled, stats.crit_damage);
        }
        let dealt = scale_by_hit_chance(rolled, h, enemy.damage_multipliers.get(damage_type));
        let applied = dealt.min(self.enemy_health);
        self.enemy_health -= applied;
        debug!(?stance, h, rolled, dealt, applied, "player attack resolved");

        let xp = damage_xp(applied);
        if xp > 0 {
            self.grant_xp(stance.trained_skill(), xp);
        }
        let suffix = if crit { " Critical hit!" } else { "" };
        self.notify(
            NotificationKind::Combat,
            format!("You hit the {} for {applied}.{suffix}", enemy.name),
        );
        if self.enemy_health == 0 {
            self.enemy_defeated(enemy, rng, now);
        }
    }

    fn enemy_defeated<R: Rng>(&mut self, enemy: &EnemyDef, rng: &mut R, now: Timestamp) {
        self.kills += 1;
        if enemy.xp_reward > 0 {
            self.grant_xp(Skill::Combat, enemy.xp_reward);
        }
        self.effects.push(Effect::GrantGold(enemy.gold_reward));
        for drop in &enemy.drops {
            if rng.gen::<f64>() * 100.0 < drop.chance {
                self.effects.push(Effect::GrantItem {
                    namespace: Namespace::Player,
                    item: drop.item.clone(),
                    qty: drop.qty,
                });
            }
        }
        self.notify(
            NotificationKind::EnemyDefeated,
            format!(
                "Defeated the {}: +{} combat xp, +{} gold.",
                enemy.name, enemy.xp_reward, enemy.gold_reward
            ),
        );
        self.phase = CombatPhase::Searching {
            until: now.plus(self.search_delay_ms),
        };
        info!(enemy = %enemy.id, kills = self.kills, "enemy defeated");
    }

    fn enemy_turn<R: Rng>(&mut self, enemy: &EnemyDef, stats: &PlayerCombatStats, rng: &mut R) {
        if enemy.attacks.is_empty() {
            return;
        }
        let attack = &enemy.attacks[rng.gen_range(0..enemy.attacks.len())];
        let h = hit_chance(
            stats.affinities.get(attack.damage_type),
            enemy.accuracy,
            stats.armor,
        );
        if h < 1.0 {
            self.notify(
                NotificationKind::Combat,
                format!("The {}'s {} misses.", enemy.name, attack.name),
            );
            return;
        }
        let scaled = scale_by_hit_chance(attack.damage, h, 100);
        let after_armor = mitigate(scaled, total_mitigation(stats.defence_bonus, stats.armor));
        let (taken, prevented) = if self.stance == Stance::Block {
            block(after_armor)
        } else {
            (after_armor, 0)
        };
        debug!(attack = %attack.name, h, scaled, after_armor, taken, "enemy attack resolved");

        if taken >= self.player_health {
            self.player_died(enemy);
            return;
        }
        self.player_health -= taken;
        if prevented > 0 {
            self.grant_xp(Skill::Defence, damage_xp(prevented).max(1));
        }
        self.notify(
            NotificationKind::Combat,
            format!(
                "The {} uses {} and hits you for {taken}.",
                enemy.name, attack.name
            ),
        );
    }

    fn player_died(&mut self, enemy: &EnemyDef) {
        if self.death_flag {
            return;
        }
        self.death_flag = true;
        let percent = self.death_penalty_percent;
        self.effects.push(Effect::PenaliseXp {
            skill: Skill::Combat,
            percent,
        });
        self.effects.push(Effect::PenaliseXp {
            skill: self.stance.trained_skill(),
            percent,
        });
        self.notify(
            NotificationKind::PlayerDied,
            format!(
                "You were killed by the {} and lost {percent}% of your combat experience.",
                enemy.name
            ),
        );
        self.player_health = self.player_max_health;
        self.enemy_health = enemy.max_health;
        self.phase = CombatPhase::ResolvedDeath;
        info!(enemy = %enemy.id, "player died");
    }
}
