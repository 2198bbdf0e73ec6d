//! Cadence scheduler: decides which ledgers a reconciliation tick runs.
//!
//! Cadence only trades precision for work. Every ledger is defined in terms
//! of elapsed wall-clock time, so skipping a tick never loses progress.

use sim_core::{SimConfig, Timestamp};

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Ledger {
    Tasks,
    Production,
    Combat,
}

impl Ledger {
    /// Run order within one tick.
    pub const ALL: [Ledger; 3] = [Ledger::Tasks, Ledger::Production, Ledger::Combat];
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Cadence {
    pub every_ms: u64,
    pub last_run: Option<Timestamp>,
}

impl Cadence {
    pub fn new(every_ms: u64) -> Self {
        Self {
            every_ms,
            last_run: None,
        }
    }

    pub fn is_due(&self, now: Timestamp) -> bool {
        match self.last_run {
            None => true,
            Some(last) => now.since(last) >= self.every_ms,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Scheduler {
    tasks: Cadence,
    production: Cadence,
    combat: Cadence,
}

impl Scheduler {
    pub fn new(config: &SimConfig) -> Self {
        Self {
            tasks: Cadence::new(config.task_cadence_ms),
            production: Cadence::new(config.production_cadence_ms),
            combat: Cadence::new(config.combat_cadence_ms),
        }
    }

    pub fn cadence(&self, ledger: Ledger) -> &Cadence {
        match ledger {
            Ledger::Tasks => &self.tasks,
            Ledger::Production => &self.production,
            Ledger::Combat => &self.combat,
        }
    }

    fn cadence_mut(&mut self, ledger: Ledger) -> &mut Cadence {
        match ledger {
            Ledger::Tasks => &mut self.tasks,
            Ledger::Production => &mut self.production,
            Ledger::Combat => &mut self.combat,
        }
    }

    /// Ledgers whose cadence has elapsed at `now`, in run order.
    pub fn due(&self, now: Timestamp) -> Vec<Ledger> {
        Ledger::ALL
            .into_iter()
            .filter(|l| self.cadence(*l).is_due(now))
            .collect()
    }

    pub fn mark_run(&mut self, ledger: Ledger, now: Timestamp) {
        self.cadence_mut(ledger).last_run = Some(now);
    }
}
