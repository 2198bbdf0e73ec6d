//! Idle Task Ledger: timed actions keyed by activity class and subject.
//!
//! The ledger only tracks timing. Domain preconditions (levels, stock,
//! gold) are checked by the caller before `start` and again at completion.

use serde::{Deserialize, Serialize};
use sim_core::Timestamp;
use std::fmt;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityClass {
    Gather,
    Smelt,
    Engineer,
    Construct,
    Contact,
    Colonize,
    Grow,
}

impl ActivityClass {
    /// Productive activities that may not run alongside one another or combat.
    pub fn is_exclusive(self) -> bool {
        matches!(
            self,
            ActivityClass::Gather | ActivityClass::Smelt | ActivityClass::Engineer
        )
    }

    pub fn name(self) -> &'static str {
        match self {
            ActivityClass::Gather => "gather",
            ActivityClass::Smelt => "smelt",
            ActivityClass::Engineer => "engineer",
            ActivityClass::Construct => "construct",
            ActivityClass::Contact => "contact",
            ActivityClass::Colonize => "colonize",
            ActivityClass::Grow => "grow",
        }
    }
}

impl fmt::Display for ActivityClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TaskKey {
    pub class: ActivityClass,
    pub subject: String,
}

impl TaskKey {
    pub fn new(class: ActivityClass, subject: impl Into<String>) -> Self {
        Self {
            class,
            subject: subject.into(),
        }
    }
}

impl fmt::Display for TaskKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.class, self.subject)
    }
}

/// One running activity: a deadline compared against wall-clock time.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimedTask {
    /// Activity class; decides exclusivity and the completion handler.
    pub class: ActivityClass,
    /// Resource, recipe, planet, building or plot id the task works on.
    pub subject_id: String,
    /// When the current cycle began.
    pub start: Timestamp,
    /// Length of the current cycle, already scaled by veterancy.
    pub duration_ms: u64,
    /// Set once the cycle's rewards were applied.
    pub completed: bool,
    /// Restart with a fresh cycle after each completion.
    #[serde(default)]
    pub auto_resume: bool,
}

impl TimedTask {
    pub fn key(&self) -> TaskKey {
        TaskKey::new(self.class, self.subject_id.clone())
    }

    pub fn deadline(&self) -> Timestamp {
        self.start.plus(self.duration_ms)
    }

    /// True iff `now >= start + duration` and the task has not completed yet.
    pub fn is_due(&self, now: Timestamp) -> bool {
        !self.completed && now >= self.deadline()
    }

    pub fn remaining_ms(&self, now: Timestamp) -> u64 {
        self.deadline().since(now)
    }
}

/// Every running timed action. Kept as a list so snapshots serialize cleanly.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskLedger {
    tasks: Vec<TimedTask>,
}

impl TaskLedger {
    pub fn new() -> Self {
        Self::default()
    }

    fn position(&self, key: &TaskKey) -> Option<usize> {
        self.tasks
            .iter()
            .position(|t| t.class == key.class && t.subject_id == key.subject)
    }

    pub fn get(&self, key: &TaskKey) -> Option<&TimedTask> {
        self.position(key).map(|i| &self.tasks[i])
    }

    pub fn iter(&self) -> impl Iterator<Item = &TimedTask> {
        self.tasks.iter()
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn in_class(&self, class: ActivityClass) -> impl Iterator<Item = &TimedTask> {
        self.tasks.iter().filter(move |t| t.class == class)
    }

    /// The running gather/smelt/engineer task, if any.
    pub fn active_exclusive(&self) -> Option<&TimedTask> {
        self.tasks.iter().find(|t| t.class.is_exclusive())
    }

    /// Creates or replaces the task for `key`.
    ///
    /// For exclusive classes every other exclusive task is stopped first and
    /// returned, without reward.
    pub fn start(
        &mut self,
        key: TaskKey,
        now: Timestamp,
        duration_ms: u64,
        auto_resume: bool,
    ) -> Vec<TimedTask> {
        let stopped = if key.class.is_exclusive() {
            let (stopped, kept): (Vec<_>, Vec<_>) = self
                .tasks
                .drain(..)
                .partition(|t| t.class.is_exclusive() && t.key() != key);
            self.tasks = kept;
            stopped
        } else {
            Vec::new()
        };
        let task = TimedTask {
            class: key.class,
            subject_id: key.subject.clone(),
            start: now,
            duration_ms,
            completed: false,
            auto_resume,
        };
        match self.position(&key) {
            Some(i) => self.tasks[i] = task,
            None => self.tasks.push(task),
        }
        stopped
    }

    pub fn stop(&mut self, key: &TaskKey) -> Option<TimedTask> {
        self.position(key).map(|i| self.tasks.remove(i))
    }

    pub fn stop_exclusive(&mut self) -> Vec<TimedTask> {
        let (stopped, kept): (Vec<_>, Vec<_>) =
            self.tasks.drain(..).partition(|t| t.class.is_exclusive());
        self.tasks = kept;
        stopped
    }

    /// Keys of tasks whose deadline has passed, earliest deadline first.
    pub fn due(&self, now: Timestamp) -> Vec<TaskKey> {
        let mut due: Vec<&TimedTask> = self.tasks.iter().filter(|t| t.is_due(now)).collect();
        due.sort_by(|a, b| {
            a.deadline()
                .cmp(&b.deadline())
                .then_with(|| a.key().cmp(&b.key()))
        });
        due.into_iter().map(TimedTask::key).collect()
    }

    /// Marks the task completed and returns a copy of it.
    pub fn complete(&mut self, key: &TaskKey) -> Option<TimedTask> {
        let i = self.position(key)?;
        self.tasks[i].completed = true;
        Some(self.tasks[i].clone())
    }

    /// Re-arms a completed task for another cycle.
    pub fn restart(&mut self, key: &TaskKey, start: Timestamp, duration_ms: u64) -> bool {
        let Some(i) = self.position(key) else {
            return false;
        };
        let task = &mut self.tasks[i];
        task.start = start;
        task.duration_ms = duration_ms;
        task.completed = false;
        true
    }
}
