//! Data kinds and their merge strategies.
//!
//! Every user owns four independently synchronized collections. Each kind
//! has a local storage key suffix, a remote sub-collection name and a
//! merge strategy.

use crate::Error;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// How the local and remote copies of a kind are combined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MergeStrategy {
    /// Local records plus remote records with no equivalent local record.
    /// Remote documents carry generated ids.
    Union,
    /// Keyed dictionary union where local entries replace remote entries
    /// with the same key. Remote documents are keyed by the identity key.
    Overwrite,
}

/// One of the four user-owned collections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DataKind {
    Routines,
    WorkoutLogs,
    ChatLogs,
    MealPlans,
}

impl DataKind {
    /// All kinds, in reconciliation order.
    pub const ALL: [DataKind; 4] = [
        DataKind::Routines,
        DataKind::WorkoutLogs,
        DataKind::ChatLogs,
        DataKind::MealPlans,
    ];

    /// Suffix of the per-user local storage key.
    pub fn storage_suffix(self) -> &'static str {
        match self {
            DataKind::Routines => "routines",
            DataKind::WorkoutLogs => "workout_logs",
            DataKind::ChatLogs => "chat_messages",
            DataKind::MealPlans => "meal_plan",
        }
    }

    /// Name of the per-user remote sub-collection.
    pub fn collection_name(self) -> &'static str {
        match self {
            DataKind::Routines => "routines",
            DataKind::WorkoutLogs => "workoutLogs",
            DataKind::ChatLogs => "chatLogs",
            DataKind::MealPlans => "mealPlans",
        }
    }

    pub fn strategy(self) -> MergeStrategy {
        match self {
            DataKind::MealPlans => MergeStrategy::Overwrite,
            _ => MergeStrategy::Union,
        }
    }
}

impl fmt::Display for DataKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.collection_name())
    }
}

impl FromStr for DataKind {
    type Err = Error;

    /// Accepts either the remote collection name or the storage suffix.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        DataKind::ALL
            .into_iter()
            .find(|kind| kind.collection_name() == s || kind.storage_suffix() == s)
            .ok_or_else(|| Error::UnknownKind(s.to_string()))
    }
}
