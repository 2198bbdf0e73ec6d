//! Serializable save format handed to the persistence layer.

use crate::state::GameState;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use sim_core::Timestamp;
use thiserror::Error;

pub const SNAPSHOT_VERSION: u32 = 1;

/// Full ledger state at `taken_at`. Combat is ephemeral and not included.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub version: u32,
    /// Simulated time the state was captured at.
    pub taken_at: Timestamp,
    pub state: GameState,
    /// Position of the random stream, so a restored session continues it
    /// instead of replaying earlier draws. Absent in hand-built snapshots.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rng: Option<ChaCha8Rng>,
}

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("unsupported snapshot version {0} (expected {expected})", expected = SNAPSHOT_VERSION)]
    UnsupportedVersion(u32),
    #[error("snapshot json: {0}")]
    Json(#[from] serde_json::Error),
}

impl Snapshot {
    pub fn to_json(&self) -> Result<String, SnapshotError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(text: &str) -> Result<Self, SnapshotError> {
        let snap: Snapshot = serde_json::from_str(text)?;
        if snap.version != SNAPSHOT_VERSION {
            return Err(SnapshotError::UnsupportedVersion(snap.version));
        }
        Ok(snap)
    }
}
