//! Leveling curve shared by primary skills and resource veterancy.
//!
//! The step into level `L` costs `floor(((L-1) + 300 * 2^((L-1)/7)) / 4)`
//! experience, so the requirement roughly doubles every seven levels.
//! Only cumulative experience is ever stored; level and in-level progress
//! are always re-derived from it.

use serde::{Deserialize, Serialize};

/// Divisor applied to the closed-form step term.
pub const XP_DIVISOR: f64 = 4.0;
/// Hard stop for the level search so malformed totals still terminate.
pub const LEVEL_CEILING: u32 = 300;

/// Level, experience inside that level and experience left to the next one.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkillProgress {
    pub level: u32,
    pub experience: u64,
    pub experience_to_next: u64,
}

/// Experience needed to advance from `level - 1` into `level`.
pub fn experience_required_for_level(level: u32) -> u64 {
    if level <= 1 {
        return 0;
    }
    let n = f64::from(level - 1);
    ((n + 300.0 * 2f64.powf(n / 7.0)) / XP_DIVISOR).floor() as u64
}

/// Total experience needed to stand at `level`; zero for level 1.
pub fn cumulative_experience(level: u32) -> u64 {
    (2..=level.min(LEVEL_CEILING + 1))
        .map(experience_required_for_level)
        .fold(0u64, u64::saturating_add)
}

/// Largest level whose cumulative requirement is `<= xp`.
pub fn level_from_experience(xp: u64) -> u32 {
    let mut level = 1;
    let mut cumulative = 0u64;
    while level < LEVEL_CEILING {
        let next = cumulative.saturating_add(experience_required_for_level(level + 1));
        if next > xp {
            break;
        }
        cumulative = next;
        level += 1;
    }
    level
}

pub fn progress(xp: u64) -> SkillProgress {
    let level = level_from_experience(xp);
    SkillProgress {
        level,
        experience: xp - cumulative_experience(level),
        experience_to_next: experience_required_for_level(level + 1),
    }
}

/// Applies a signed delta to a cumulative total, clamping at zero.
pub fn apply_delta(total: u64, delta: i64) -> u64 {
    if delta >= 0 {
        total.saturating_add(delta.unsigned_abs())
    } else {
        total.saturating_sub(delta.unsigned_abs())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn level_one_starts_at_zero() {
        assert_eq!(cumulative_experience(1), 0);
        assert_eq!(level_from_experience(0), 1);
        assert_eq!(progress(0).experience, 0);
    }

    #[test]
    fn known_early_steps() {
        assert_eq!(experience_required_for_level(2), 83);
        assert_eq!(cumulative_experience(2), 83);
        assert_eq!(cumulative_experience(3), 83 + experience_required_for_level(3));
    }

    #[test]
    fn exact_requirement_lands_on_next_level() {
        let p = progress(experience_required_for_level(2));
        assert_eq!(p.level, 2);
        assert_eq!(p.experience, 0);
        assert_eq!(p.experience_to_next, experience_required_for_level(3));
    }

    #[test]
    fn requirement_roughly_doubles_every_seven_levels() {
        let a = experience_required_for_level(20) as f64;
        let b = experience_required_for_level(27) as f64;
        assert!((b / a - 2.0).abs() < 0.05);
    }

    #[test]
    fn search_stops_at_ceiling() {
        assert_eq!(level_from_experience(u64::MAX), LEVEL_CEILING);
    }

    #[test]
    fn delta_clamps_at_zero() {
        assert_eq!(apply_delta(50, -80), 0);
        assert_eq!(apply_delta(50, 30), 80);
    }

    proptest! {
        #[test]
        fn boundary_exactness(level in 2u32..LEVEL_CEILING) {
            let c = cumulative_experience(level);
            prop_assert_eq!(level_from_experience(c), level);
            prop_assert_eq!(level_from_experience(c - 1), level - 1);
        }

        #[test]
        fn delta_roundtrip(start in 0u64..5_000_000, d in 0i64..5_000_000) {
            let up = apply_delta(start, d);
            let back = apply_delta(up, -d);
            prop_assert_eq!(back, start);
            prop_assert_eq!(progress(back), progress(start));
        }
    }
}
