//! Snapshot policy for skipping full-stream replays.
//!
//! Snapshots are a read-side optimization only: the append contract is
//! unchanged, and a lost or stale snapshot merely means a longer fold.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize, de::DeserializeOwned};

use crate::metadata::Version;

/// A point-in-time snapshot of an aggregate's state and stream version.
///
/// `version` records how many events have been folded into `state`, so
/// catch-up can resume from `version + 1`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(bound(serialize = "A: Serialize", deserialize = "A: DeserializeOwned"))]
pub struct Snapshot<A> {
    /// The aggregate state at the time of the snapshot.
    pub state: A,
    /// The stream version (number of events applied) at snapshot time.
    pub version: Version,
}

/// When to take a new snapshot: after a number of new events, or after
/// enough wall-clock time since the last one.
#[derive(Debug, Clone)]
pub struct SnapshotPolicy {
    /// Take a snapshot once this many events accumulate past the last
    /// snapshot (or past version 0 when none exists).
    pub every_events: u64,
    /// Also take one when the last snapshot is older than this.
    pub max_interval: Duration,
}

impl Default for SnapshotPolicy {
    fn default() -> Self {
        Self {
            every_events: 100,
            max_interval: Duration::from_secs(600),
        }
    }
}

impl SnapshotPolicy {
    /// Decide whether a snapshot should be taken.
    ///
    /// Pure: depends only on the arguments. `last` is the previous
    /// snapshot's `(version, taken_at)`, or `None` when the stream has
    /// never been snapshotted.
    pub fn should_snapshot(
        &self,
        version: Version,
        last: Option<(Version, DateTime<Utc>)>,
        now: DateTime<Utc>,
    ) -> bool {
        match last {
            None => version >= self.every_events,
            Some((last_version, _)) if version <= last_version => false,
            Some((last_version, last_at)) => {
                version - last_version >= self.every_events
                    || now
                        .signed_duration_since(last_at)
                        .to_std()
                        .map(|elapsed| elapsed >= self.max_interval)
                        .unwrap_or(false)
            }
        }
    }
}
