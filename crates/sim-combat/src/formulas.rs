//! Pure combat math: hit chance, max hit, crits, mitigation and XP.

use sim_core::reference::Stance;

/// Lowest roll of any damage stance.
pub const MIN_HIT: u32 = 1;
pub const XP_PER_DAMAGE: f64 = 0.4;
pub const ARMOR_MITIGATION_PER_POINT: f64 = 0.02;
pub const MAX_ARMOR_MITIGATION: f64 = 0.5;
pub const MAX_TOTAL_MITIGATION: f64 = 0.75;
/// Extra reduction applied on top of armor while blocking.
pub const BLOCK_REDUCTION: f64 = 0.5;

/// `H = affinity/100 * accuracy/armor * 100`; armor below 1 counts as 1.
pub fn hit_chance(affinity: u32, accuracy: u32, armor: u32) -> f64 {
    let affinity = f64::from(affinity.min(100)) / 100.0;
    affinity * f64::from(accuracy) / f64::from(armor.max(1)) * 100.0
}

/// +3 when the weapon prefers the selected stance, -1 when it prefers another.
pub fn stance_bonus(weapon_stance: Option<Stance>, selected: Stance) -> i32 {
    match weapon_stance {
        None => 0,
        Some(s) if s == selected => 3,
        Some(_) => -1,
    }
}

/// Divisor of the max-hit product; an unarmed level-1 fighter tops out at 4.
pub const MAX_HIT_SCALE: f64 = 160.0;

/// Max hit from the trained sub-stat, weapon damage and stance match.
pub fn max_hit(sub_level: u32, weapon_damage: u32, stance_bonus: i32) -> u32 {
    let effective = (i64::from(sub_level) + i64::from(stance_bonus) + 8).max(1) as f64;
    let weapon = f64::from(weapon_damage.saturating_add(64));
    let hit = (0.5 + effective * weapon / MAX_HIT_SCALE).floor();
    (hit.min(f64::from(u32::MAX)) as u32).max(MIN_HIT)
}

/// Crit damage is a percentage of the rolled hit; below 100% is treated as 100%.
pub fn apply_crit(rolled: u32, crit_damage_pct: u32) -> u32 {
    let pct = u64::from(crit_damage_pct.max(100));
    (u64::from(rolled) * pct / 100).min(u64::from(u32::MAX)) as u32
}

/// Scales a rolled hit by hit chance (capped at 100%) and the target's
/// damage-type multiplier. `H < 1` always yields zero; otherwise a hit
/// against a non-immune target deals at least 1.
pub fn scale_by_hit_chance(rolled: u32, hit_chance: f64, multiplier_pct: u32) -> u32 {
    if hit_chance < 1.0 || multiplier_pct == 0 {
        return 0;
    }
    let scaled =
        f64::from(rolled) * hit_chance.min(100.0) / 100.0 * f64::from(multiplier_pct) / 100.0;
    (scaled.floor() as u32).max(1)
}

pub fn damage_xp(damage: u32) -> u64 {
    (f64::from(damage) * XP_PER_DAMAGE).floor() as u64
}

/// Defence skill-veterancy contribution to mitigation: 0.25% per level, at most 25%.
pub fn defence_veterancy_bonus(level: u32) -> f64 {
    (f64::from(level) * 0.0025).min(0.25)
}

/// `min(75%, veterancy + min(50%, armor * 2%))`.
pub fn total_mitigation(veterancy_bonus: f64, armor: u32) -> f64 {
    let armor_part = (f64::from(armor) * ARMOR_MITIGATION_PER_POINT).min(MAX_ARMOR_MITIGATION);
    (veterancy_bonus.max(0.0) + armor_part).min(MAX_TOTAL_MITIGATION)
}

pub fn mitigate(damage: u32, mitigation: f64) -> u32 {
    (f64::from(damage) * (1.0 - mitigation.clamp(0.0, 1.0))).floor() as u32
}

/// Splits an armor-mitigated hit into (taken, prevented) while blocking.
pub fn block(after_armor: u32) -> (u32, u32) {
    let taken = (f64::from(after_armor) * (1.0 - BLOCK_REDUCTION)).floor() as u32;
    (taken, after_armor - taken)
}
