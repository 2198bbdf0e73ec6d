//! Wall-clock timestamps. Each reconciliation tick samples "now" once and
//! threads the same value through every ledger it touches.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Milliseconds since the Unix epoch.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Timestamp(pub i64);

impl Timestamp {
    pub const fn from_millis(ms: i64) -> Self {
        Self(ms)
    }

    pub fn from_datetime(dt: DateTime<Utc>) -> Self {
        Self(dt.timestamp_millis())
    }

    pub fn to_datetime(self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp_millis(self.0)
    }

    pub const fn millis(self) -> i64 {
        self.0
    }

    /// Milliseconds elapsed since `earlier`; zero if the clock went backwards.
    pub fn since(self, earlier: Timestamp) -> u64 {
        u64::try_from(self.0.saturating_sub(earlier.0)).unwrap_or(0)
    }

    pub fn plus(self, ms: u64) -> Timestamp {
        let ms = i64::try_from(ms).unwrap_or(i64::MAX);
        Timestamp(self.0.saturating_add(ms))
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}ms", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn since_never_negative() {
        let a = Timestamp::from_millis(1_000);
        let b = Timestamp::from_millis(4_500);
        assert_eq!(b.since(a), 3_500);
        assert_eq!(a.since(b), 0);
    }

    #[test]
    fn plus_saturates() {
        assert_eq!(Timestamp(i64::MAX - 1).plus(10), Timestamp(i64::MAX));
        assert_eq!(Timestamp(10).plus(u64::MAX), Timestamp(i64::MAX));
    }

    #[test]
    fn datetime_roundtrip() {
        let t = Timestamp::from_millis(1_700_000_000_123);
        let dt = t.to_datetime().unwrap();
        assert_eq!(Timestamp::from_datetime(dt), t);
    }
}
