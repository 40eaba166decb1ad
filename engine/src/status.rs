//! Coarse sync status shown to the user.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Outcome of the most recent remote activity.
///
/// Ordering is by severity: `Offline` is the worst state, `Synced` the best.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncStatus {
    /// No session, or the last remote attempt failed
    #[default]
    Offline,
    /// A reconciliation or mirror write is in flight
    Syncing,
    /// The last remote attempt succeeded
    Synced,
}

impl SyncStatus {
    fn severity(self) -> u8 {
        match self {
            SyncStatus::Offline => 2,
            SyncStatus::Syncing => 1,
            SyncStatus::Synced => 0,
        }
    }

    /// The more severe of two statuses.
    pub fn worst(self, other: SyncStatus) -> SyncStatus {
        if other.severity() > self.severity() {
            other
        } else {
            self
        }
    }

    /// Worst status across several kinds; `Synced` when there are none.
    pub fn combine_all(statuses: impl IntoIterator<Item = SyncStatus>) -> SyncStatus {
        statuses
            .into_iter()
            .fold(SyncStatus::Synced, SyncStatus::worst)
    }

    pub fn is_offline(self) -> bool {
        self == SyncStatus::Offline
    }
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SyncStatus::Offline => "offline",
            SyncStatus::Syncing => "syncing",
            SyncStatus::Synced => "synced",
        })
    }
}
