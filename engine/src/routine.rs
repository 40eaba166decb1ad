//! Workout routines.

use crate::{error::Result, DataKind, Error, SyncRecord, Timestamp};
use chrono::NaiveTime;
use serde::{Deserialize, Serialize};

/// A named, scheduled list of exercises.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Routine {
    /// Unique (case-sensitive) routine name
    pub name: String,
    /// Exercise names, in order
    pub exercises: Vec<String>,
    /// Active flags, Monday first
    pub days: [bool; 7],
    /// Reminder time of day
    pub time: NaiveTime,
    /// Handles of the scheduled reminder notifications
    #[serde(default)]
    pub notif_ids: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<Timestamp>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<Timestamp>,
}

impl Routine {
    pub fn new(
        name: impl Into<String>,
        exercises: Vec<String>,
        days: [bool; 7],
        time: NaiveTime,
    ) -> Self {
        Self {
            name: name.into(),
            exercises,
            days,
            time,
            notif_ids: Vec::new(),
            created_at: None,
            updated_at: None,
        }
    }

    /// Attach reminder notification handles.
    pub fn with_notifications(mut self, notif_ids: Vec<String>) -> Self {
        self.notif_ids = notif_ids;
        self
    }

    /// Stamp creation and update time.
    pub fn stamped(mut self, now: Timestamp) -> Self {
        self.created_at.get_or_insert(now);
        self.updated_at = Some(now);
        self
    }

    /// Number of active weekdays.
    pub fn active_day_count(&self) -> usize {
        self.days.iter().filter(|d| **d).count()
    }
}

impl SyncRecord for Routine {
    const KIND: DataKind = DataKind::Routines;
    type Key = String;

    fn identity_key(&self) -> String {
        self.name.clone()
    }

    fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(Error::invalid(Self::KIND, "name must not be blank"));
        }
        if self.exercises.is_empty() {
            return Err(Error::invalid(
                Self::KIND,
                format!("routine '{}' has no exercises", self.name),
            ));
        }
        Ok(())
    }
}
