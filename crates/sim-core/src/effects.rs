//! Deferred side effects and the outbound notification queue.
//!
//! Resolvers never touch ledgers other than their own while a transition
//! is in flight. They push [`Effect`]s instead; the owner of the ledgers
//! flushes the queue once the transition has committed, in push order.

use crate::inventory::Namespace;
use crate::skills::Skill;
use crate::time::Timestamp;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    Reward,
    LevelUp,
    LevelDown,
    TaskStopped,
    TaskCancelled,
    Respawned,
    BuildingCompleted,
    Collected,
    Combat,
    EnemyDefeated,
    PlayerDied,
    Veterancy,
    Precondition,
}

/// Human-readable event for presentation layers.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub at: Timestamp,
    pub kind: NotificationKind,
    pub message: String,
}

/// FIFO of notifications; order within a tick is preserved.
#[derive(Clone, Debug, Default)]
pub struct Notifications {
    queue: VecDeque<Notification>,
}

impl Notifications {
    pub fn push(&mut self, at: Timestamp, kind: NotificationKind, message: impl Into<String>) {
        self.queue.push_back(Notification {
            at,
            kind,
            message: message.into(),
        });
    }

    pub fn drain(&mut self) -> Vec<Notification> {
        self.queue.drain(..).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Notification> {
        self.queue.iter()
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}

/// A mutation of a ledger other than the one being resolved.
#[derive(Clone, Debug, PartialEq)]
pub enum Effect {
    GrantXp {
        skill: Skill,
        amount: u64,
    },
    /// Removes `percent` of the skill's cumulative experience at flush time.
    PenaliseXp {
        skill: Skill,
        percent: u32,
    },
    GrantItem {
        namespace: Namespace,
        item: String,
        qty: u64,
    },
    GrantGold(u64),
    /// Feeds both veterancy tracks from one completion's primary experience.
    AwardVeterancy {
        resource: Option<String>,
        skill: Skill,
        primary_xp: u64,
    },
    Notify {
        kind: NotificationKind,
        message: String,
    },
}

impl Effect {
    pub fn notify(kind: NotificationKind, message: impl Into<String>) -> Self {
        Effect::Notify {
            kind,
            message: message.into(),
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct EffectQueue {
    pending: VecDeque<Effect>,
}

impl EffectQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, effect: Effect) {
        self.pending.push_back(effect);
    }

    pub fn take(&mut self) -> Vec<Effect> {
        self.pending.drain(..).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Effect> {
        self.pending.iter()
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

impl Extend<Effect> for EffectQueue {
    fn extend<T: IntoIterator<Item = Effect>>(&mut self, iter: T) {
        self.pending.extend(iter);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn queue_preserves_order() {
        let mut q = EffectQueue::new();
        q.push(Effect::GrantGold(5));
        q.push(Effect::notify(NotificationKind::Reward, "first"));
        q.extend([Effect::GrantXp {
            skill: Skill::Combat,
            amount: 3,
        }]);
        let taken = q.take();
        assert_eq!(taken.len(), 3);
        assert_eq!(taken[0], Effect::GrantGold(5));
        assert!(matches!(taken[2], Effect::GrantXp { amount: 3, .. }));
        assert!(q.is_empty());
    }

    #[test]
    fn notifications_drain_in_order() {
        let mut n = Notifications::default();
        n.push(Timestamp(1), NotificationKind::Reward, "a");
        n.push(Timestamp(1), NotificationKind::TaskStopped, "b");
        let drained = n.drain();
        assert_eq!(drained[0].message, "a");
        assert_eq!(drained[1].kind, NotificationKind::TaskStopped);
        assert!(n.is_empty());
    }
}
