//! # FitSync Client
//!
//! Offline-first sync runtime built on [`fitsync_engine`].
//!
//! A [`Session`] belongs to one signed-in user. It loads that user's four
//! collections from the [`LocalStore`], reconciles them with the
//! [`RemoteStore`] after a short settle delay and then follows remote
//! changes through the Live-Update Listener. The UI writes through the
//! [`MutationGateway`], which always commits locally first and mirrors to
//! the remote store in the background.
//!
//! ```no_run
//! use std::sync::Arc;
//! use fitsync_client::{
//!     InMemoryRemote, MemoryLocalStore, SessionSettings, SyncClient, UserIdentity,
//! };
//! use fitsync_engine::WorkoutLogEntry;
//!
//! # async fn run() -> fitsync_client::Result<()> {
//! let client = SyncClient::new(
//!     Arc::new(MemoryLocalStore::new()),
//!     Arc::new(InMemoryRemote::new()),
//!     SessionSettings::default(),
//! );
//! let session = client.sign_in(UserIdentity::new("uid-1", "sam@example.com")).await;
//!
//! let day = chrono::NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
//! session
//!     .gateway()
//!     .log_workout(vec![WorkoutLogEntry::new("Push-ups", 20, day)])
//!     .await?;
//!
//! client.sign_out().await;
//! # Ok(())
//! # }
//! ```

pub mod chat;
pub mod config;
pub mod error;
pub mod gateway;
pub mod listener;
pub mod local;
pub mod reconciler;
pub mod remote;
pub mod session;
pub mod state;
pub mod telemetry;

pub use chat::{ChatCompletion, ChatExchange};
pub use config::{Config, ConfigError, SessionSettings};
pub use error::{ChatError, Result, SyncError};
pub use gateway::{MirrorOutcome, MutationGateway, PendingMirror};
pub use listener::LiveUpdateListener;
pub use local::{LocalStore, LocalStoreError, MemoryLocalStore, SqliteLocalStore, StorageKey};
pub use remote::{
    CollectionRef, InMemoryRemote, RemoteError, RemoteStore, Subscription, WriteBatch, WriteOp,
};
pub use session::{Session, SyncClient, UserIdentity};
pub use state::{CollectionState, KindGuard, Slot, Tracked};
