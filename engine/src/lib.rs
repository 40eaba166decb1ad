//! # FitSync Engine
//!
//! Merge rules for an offline-first fitness app.
//!
//! Every user owns four collections (routines, workout logs, chat
//! transcript and weekly meal plan). Each collection exists as a local copy
//! on the device and as a remote copy in a document store. This crate
//! decides how those two copies are combined. It performs no I/O: storage,
//! networking and scheduling live in the client crate.
//!
//! ## Design Principles
//!
//! - **No IO**: the engine knows nothing about files, network or tasks
//! - **Deterministic**: the same inputs always produce the same outputs
//! - **Local wins**: a local record is never replaced by a remote one
//!
//! ## Core Concepts
//!
//! ### Records
//!
//! A [`SyncRecord`] names its [`DataKind`], its identity key and how it maps
//! onto a remote [`Document`] and onto local storage text. Two records are
//! *equivalent* when they describe the same logical entity.
//!
//! ### Merge
//!
//! [`reconcile::merge`] keeps every local record, adopts remote records with
//! no local equivalent and reports which local records still have to be
//! pushed. Meal plans use a keyed overwrite instead of a plain union.
//!
//! ### Live updates
//!
//! [`reconcile::fold_remote`] decides whether a remote snapshot replaces the
//! local copy. It never produces writes for the remote side.
//!
//! ## Quick Start
//!
//! ```rust
//! use fitsync_engine::{reconcile::merge, WorkoutLogEntry};
//! use chrono::NaiveDate;
//!
//! let day = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
//! let local = vec![WorkoutLogEntry::new("Push-ups", 20, day)];
//! let remote = vec![WorkoutLogEntry::new("Squats", 15, day)];
//!
//! let outcome = merge(&local, &remote);
//! assert_eq!(outcome.merged.len(), 2);
//! assert_eq!(outcome.to_push, local);
//! ```
//!
//! ## FFI
//!
//! The [`ffi`] module exposes the merge and fold rules as C functions that
//! exchange JSON strings.

pub mod chat;
pub mod error;
pub mod ffi;
pub mod kind;
pub mod meal_plan;
pub mod reconcile;
pub mod record;
pub mod routine;
pub mod status;
pub mod workout;

// Re-export main types at crate root
pub use chat::{ChatMessage, Sender, WELCOME_GREETING, WELCOME_GREETING_ID};
pub use error::Error;
pub use kind::{DataKind, MergeStrategy};
pub use meal_plan::{default_week_plan, DayMeals, MacroTargets, Meal, MealPlanEntry, DAYS_PER_WEEK};
pub use reconcile::{Conflict, FoldAction, MergeOutcome, MergeReport};
pub use record::{decode_documents, Document, Origin, SyncRecord};
pub use routine::Routine;
pub use status::SyncStatus;
pub use workout::{daily_rep_totals, WorkoutLogEntry};

/// Wall-clock instant used for record stamps.
pub type Timestamp = chrono::DateTime<chrono::Utc>;
