//! Per-resource gather cycles: a bounded completion counter and a respawn
//! cooldown once the counter runs past the node's limit.

use serde::{Deserialize, Serialize};
use sim_core::reference::GatherDef;
use sim_core::veterancy::gather_limit_bonus;
use sim_core::Timestamp;
use std::collections::BTreeMap;

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatherCycleState {
    pub count: u32,
    /// Restart gathering automatically when the node respawns.
    pub auto_resume: bool,
    pub respawn_deadline: Option<Timestamp>,
}

impl GatherCycleState {
    pub fn is_respawning(&self, now: Timestamp) -> bool {
        self.respawn_deadline.is_some_and(|d| now < d)
    }
}

/// What a completed gather did to the cycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CycleOutcome {
    Counted(u32),
    /// The node ran dry; it can be gathered again at the deadline.
    Depleted(Timestamp),
}

/// Completions allowed before a node needs to respawn.
pub fn gather_limit(def: &GatherDef, resource_level: u32) -> u32 {
    def.base_limit.saturating_add(gather_limit_bonus(resource_level))
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatherCycles {
    cycles: BTreeMap<String, GatherCycleState>,
}

impl GatherCycles {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, resource_id: &str) -> Option<&GatherCycleState> {
        self.cycles.get(resource_id)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &GatherCycleState)> {
        self.cycles.iter()
    }

    pub fn is_respawning(&self, resource_id: &str, now: Timestamp) -> bool {
        self.cycles
            .get(resource_id)
            .is_some_and(|c| c.is_respawning(now))
    }

    pub fn set_auto_resume(&mut self, resource_id: &str, auto_resume: bool) {
        self.cycles
            .entry(resource_id.to_string())
            .or_default()
            .auto_resume = auto_resume;
    }

    /// Clears every auto-resume flag, e.g. when another activity takes over.
    pub fn clear_auto_resume(&mut self) {
        for c in self.cycles.values_mut() {
            c.auto_resume = false;
        }
    }

    /// Counts one completion at `at`. The completion past the limit resets
    /// the counter and starts the respawn cooldown.
    pub fn record_completion(
        &mut self,
        resource_id: &str,
        limit: u32,
        respawn_ms: u64,
        at: Timestamp,
    ) -> CycleOutcome {
        let cycle = self.cycles.entry(resource_id.to_string()).or_default();
        if cycle.count >= limit {
            cycle.count = 0;
            let deadline = at.plus(respawn_ms);
            cycle.respawn_deadline = Some(deadline);
            CycleOutcome::Depleted(deadline)
        } else {
            cycle.count += 1;
            CycleOutcome::Counted(cycle.count)
        }
    }

    /// Clears expired cooldowns and returns `(resource, deadline, auto_resume)`
    /// for each, earliest first.
    pub fn take_respawned(&mut self, now: Timestamp) -> Vec<(String, Timestamp, bool)> {
        let mut out: Vec<_> = self
            .cycles
            .iter_mut()
            .filter_map(|(id, c)| match c.respawn_deadline {
                Some(d) if d <= now => {
                    c.respawn_deadline = None;
                    Some((id.clone(), d, c.auto_resume))
                }
                _ => None,
            })
            .collect();
        out.sort_by(|a, b| a.1.cmp(&b.1).then_with(|| a.0.cmp(&b.0)));
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn def(base_limit: u32) -> GatherDef {
        GatherDef {
            skill: sim_core::Skill::Gathering,
            level_required: 1,
            time_ms: 1_000,
            xp: 5,
            base_limit,
            respawn_ms: 10_000,
        }
    }

    #[test]
    fn limit_includes_veterancy_bonus() {
        assert_eq!(gather_limit(&def(3), 0), 3);
        assert_eq!(gather_limit(&def(3), 12), 5);
        assert_eq!(gather_limit(&def(3), 1_000), 53);
    }

    #[test]
    fn completion_past_limit_starts_respawn() {
        let mut g = GatherCycles::new();
        let limit = gather_limit(&def(2), 0);
        assert_eq!(g.record_completion("ore", limit, 10_000, Timestamp(1)), CycleOutcome::Counted(1));
        assert_eq!(g.record_completion("ore", limit, 10_000, Timestamp(2)), CycleOutcome::Counted(2));
        assert_eq!(
            g.record_completion("ore", limit, 10_000, Timestamp(3)),
            CycleOutcome::Depleted(Timestamp(10_003))
        );
        let c = g.get("ore").unwrap();
        assert_eq!(c.count, 0);
        assert!(g.is_respawning("ore", Timestamp(10_002)));
        assert!(!g.is_respawning("ore", Timestamp(10_003)));
    }

    #[test]
    fn respawn_is_reported_once() {
        let mut g = GatherCycles::new();
        g.set_auto_resume("ore", true);
        g.record_completion("ore", 0, 500, Timestamp(0));
        assert!(g.take_respawned(Timestamp(499)).is_empty());
        assert_eq!(
            g.take_respawned(Timestamp(600)),
            vec![("ore".to_string(), Timestamp(500), true)]
        );
        assert!(g.take_respawned(Timestamp(700)).is_empty());
        g.clear_auto_resume();
        assert!(!g.get("ore").unwrap().auto_resume);
    }
}
