//! Workout log entries.

use crate::{error::Result, DataKind, Error, SyncRecord, Timestamp};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One logged set: an exercise, a rep count and the day it was done.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkoutLogEntry {
    pub exercise: String,
    pub reps: u32,
    pub date: NaiveDate,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<Timestamp>,
}

impl WorkoutLogEntry {
    pub fn new(exercise: impl Into<String>, reps: u32, date: NaiveDate) -> Self {
        Self {
            exercise: exercise.into(),
            reps,
            date,
            created_at: None,
        }
    }

    pub fn stamped(mut self, now: Timestamp) -> Self {
        self.created_at.get_or_insert(now);
        self
    }
}

impl SyncRecord for WorkoutLogEntry {
    const KIND: DataKind = DataKind::WorkoutLogs;
    type Key = (String, NaiveDate, u32);

    fn identity_key(&self) -> Self::Key {
        (self.exercise.clone(), self.date, self.reps)
    }

    fn validate(&self) -> Result<()> {
        if self.exercise.trim().is_empty() {
            return Err(Error::invalid(Self::KIND, "exercise must not be blank"));
        }
        if self.reps == 0 {
            return Err(Error::invalid(
                Self::KIND,
                format!("'{}' logged with zero reps", self.exercise),
            ));
        }
        Ok(())
    }
}

/// Total reps per day, newest day first.
pub fn daily_rep_totals(entries: &[WorkoutLogEntry]) -> Vec<(NaiveDate, u64)> {
    let mut totals: BTreeMap<NaiveDate, u64> = BTreeMap::new();
    for entry in entries {
        *totals.entry(entry.date).or_default() += u64::from(entry.reps);
    }
    totals.into_iter().rev().collect()
}
