#![deny(warnings)]

//! Reconciliation runtime for Frontier Idle.
//!
//! [`Simulation`] owns every ledger and drives them from wall-clock time:
//! timed tasks and gather cycles, production accrual and combat turns.
//! Player intents are validated against current state before anything
//! changes, and a whole session can be saved and restored as a
//! [`Snapshot`].

pub mod gather;
pub mod intents;
pub mod scheduler;
pub mod simulation;
pub mod snapshot;
pub mod state;
pub mod tasks;

pub use intents::{Intent, IntentError};
pub use scheduler::{Ledger, Scheduler};
pub use simulation::Simulation;
pub use snapshot::{Snapshot, SnapshotError, SNAPSHOT_VERSION};
pub use state::GameState;
pub use tasks::{ActivityClass, TaskKey, TaskLedger, TimedTask};
