//! Mutation Gateway: the write path used by the UI.
//!
//! Every mutation is applied to the Local Store and to memory before the
//! call returns. The matching remote write then runs in the background,
//! and only when the session is alive and not offline. Remote failures
//! downgrade the sync status; they never fail the mutation.
//!
//! A mutation holds its kind's guard only around the local write. The remote
//! half joins the kind's mirror queue while the guard is held, so remote
//! writes land in mutation order. Reconciliation passes and live updates
//! wait for the queue to empty before taking the guard, so neither observes
//! a half-mirrored change. Ending the session abandons queued and in-flight
//! remote writes.

use std::future::Future;
use std::sync::Arc;

use fitsync_engine::{
    ChatMessage, MealPlanEntry, Routine, SyncRecord, SyncStatus, WorkoutLogEntry,
};
use serde_json::Value;
use tokio::task::JoinHandle;

use crate::error::Result;
use crate::remote::{CollectionRef, RemoteError, RemoteStore, WriteBatch};
use crate::session::Session;
use crate::state::{KindGuard, Tracked};

/// How the remote half of a mutation ended.
#[derive(Debug, Clone, PartialEq)]
pub enum MirrorOutcome {
    /// No remote write was attempted (offline, or session ended)
    Skipped,
    Mirrored,
    /// The remote write failed; the local change stands
    Failed(RemoteError),
    /// The remote half panicked or was aborted
    Aborted,
}

/// Handle on the background remote half of a mutation.
#[derive(Debug)]
pub struct PendingMirror {
    handle: Option<JoinHandle<MirrorOutcome>>,
}

impl PendingMirror {
    fn skipped() -> Self {
        Self { handle: None }
    }

    /// Wait for the remote half to finish.
    pub async fn wait(self) -> MirrorOutcome {
        match self.handle {
            Some(handle) => match handle.await {
                Ok(outcome) => outcome,
                Err(e) => {
                    tracing::error!(error = %e, "Remote mirror task did not complete");
                    MirrorOutcome::Aborted
                }
            },
            None => MirrorOutcome::Skipped,
        }
    }

    pub fn is_skipped(&self) -> bool {
        self.handle.is_none()
    }
}

#[derive(Debug, Clone)]
pub struct MutationGateway {
    session: Arc<Session>,
}

impl MutationGateway {
    pub fn new(session: Arc<Session>) -> Self {
        Self { session }
    }

    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }

    pub fn status(&self) -> SyncStatus {
        self.session.status()
    }

    pub fn routines(&self) -> Vec<Routine> {
        self.snapshot()
    }

    pub fn workout_logs(&self) -> Vec<WorkoutLogEntry> {
        self.snapshot()
    }

    pub fn chat_log(&self) -> Vec<ChatMessage> {
        self.snapshot()
    }

    pub fn meal_plan(&self) -> Vec<MealPlanEntry> {
        self.snapshot()
    }

    fn snapshot<R: Tracked>(&self) -> Vec<R> {
        self.session.state().slot::<R>().snapshot()
    }

    async fn acquire<R: Tracked>(&self) -> KindGuard {
        self.session.state().slot::<R>().acquire().await
    }

    /// Add a routine, replacing any routine with the same name.
    pub async fn add_routine(&self, routine: Routine) -> Result<PendingMirror> {
        routine.validate()?;
        let routine = routine.stamped(self.session.now());
        let data = routine.to_document_data()?;

        let guard = self.acquire::<Routine>().await;
        let mut next: Vec<Routine> = self
            .snapshot::<Routine>()
            .into_iter()
            .filter(|r| !r.is_equivalent(&routine))
            .collect();
        next.push(routine.clone());
        self.session.persist(&guard, next).await?;

        let name = routine.name;
        Ok(self.mirror::<Routine, _, _>(&guard, move |remote, coll| async move {
            let mut batch = matching_deletes(remote.as_ref(), &coll, "name", &name).await?;
            batch.insert(data);
            remote.commit(&coll, batch).await
        }))
    }

    pub async fn delete_routine(&self, name: &str) -> Result<PendingMirror> {
        let guard = self.acquire::<Routine>().await;
        let next: Vec<Routine> = self
            .snapshot::<Routine>()
            .into_iter()
            .filter(|r| r.name != name)
            .collect();
        self.session.persist(&guard, next).await?;

        let name = name.to_string();
        Ok(self.mirror::<Routine, _, _>(&guard, move |remote, coll| async move {
            let batch = matching_deletes(remote.as_ref(), &coll, "name", &name).await?;
            remote.commit(&coll, batch).await
        }))
    }

    /// Append workout entries. Entries already logged are skipped.
    pub async fn log_workout(&self, entries: Vec<WorkoutLogEntry>) -> Result<PendingMirror> {
        for entry in &entries {
            entry.validate()?;
        }
        let now = self.session.now();

        let guard = self.acquire::<WorkoutLogEntry>().await;
        let current = self.snapshot::<WorkoutLogEntry>();
        let mut fresh: Vec<WorkoutLogEntry> = Vec::new();
        for entry in entries {
            let duplicate = current
                .iter()
                .chain(fresh.iter())
                .any(|existing| existing.is_equivalent(&entry));
            if duplicate {
                tracing::debug!(exercise = %entry.exercise, "Skipping already logged entry");
                continue;
            }
            fresh.push(entry.stamped(now));
        }
        if fresh.is_empty() {
            return Ok(PendingMirror::skipped());
        }

        let docs = fresh
            .iter()
            .map(|e| e.to_document_data())
            .collect::<std::result::Result<Vec<_>, _>>()?;
        let mut next = current;
        next.extend(fresh);
        self.session.persist(&guard, next).await?;

        Ok(self.mirror::<WorkoutLogEntry, _, _>(&guard, move |remote, coll| async move {
            let mut batch = WriteBatch::new();
            for data in docs {
                batch.insert(data);
            }
            remote.commit(&coll, batch).await
        }))
    }

    pub async fn clear_workout_logs(&self) -> Result<PendingMirror> {
        let guard = self.acquire::<WorkoutLogEntry>().await;
        self.session
            .persist_removal::<WorkoutLogEntry>(&guard)
            .await?;
        Ok(self.mirror::<WorkoutLogEntry, _, _>(&guard, |remote, coll| async move {
            delete_all(remote.as_ref(), &coll).await
        }))
    }

    /// Replace the whole chat transcript.
    pub async fn save_chat_log(&self, messages: Vec<ChatMessage>) -> Result<PendingMirror> {
        for message in &messages {
            message.validate()?;
        }
        let now = self.session.now();
        let messages: Vec<ChatMessage> = messages.into_iter().map(|m| m.stamped(now)).collect();
        let docs = messages
            .iter()
            .map(|m| m.to_document_data())
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let guard = self.acquire::<ChatMessage>().await;
        self.session.persist(&guard, messages).await?;

        Ok(self.mirror::<ChatMessage, _, _>(&guard, move |remote, coll| async move {
            let mut batch = WriteBatch::new();
            for doc in remote.list(&coll).await? {
                batch.delete(doc.id);
            }
            for data in docs {
                batch.insert(data);
            }
            remote.commit(&coll, batch).await
        }))
    }

    pub async fn clear_chat_log(&self) -> Result<PendingMirror> {
        let guard = self.acquire::<ChatMessage>().await;
        self.session
            .persist::<ChatMessage>(&guard, Vec::new())
            .await?;
        Ok(self.mirror::<ChatMessage, _, _>(&guard, |remote, coll| async move {
            delete_all(remote.as_ref(), &coll).await
        }))
    }

    /// Replace the meal plan. Each day is written remotely under its key.
    pub async fn save_meal_plan(&self, days: Vec<MealPlanEntry>) -> Result<PendingMirror> {
        for day in &days {
            day.validate()?;
        }
        let now = self.session.now();
        let days: Vec<MealPlanEntry> = days.into_iter().map(|d| d.stamped(now)).collect();
        let docs = days
            .iter()
            .map(|d| Ok((d.day.clone(), d.to_document_data()?)))
            .collect::<Result<Vec<(String, Value)>>>()?;

        let guard = self.acquire::<MealPlanEntry>().await;
        self.session.persist(&guard, days).await?;

        Ok(self.mirror::<MealPlanEntry, _, _>(&guard, move |remote, coll| async move {
            for (day, data) in docs {
                remote.set(&coll, &day, data).await?;
            }
            Ok(())
        }))
    }

    /// Spawn the remote half behind the kind's earlier remote writes.
    ///
    /// `guard` is only needed to take a place in the queue; the caller
    /// releases it as soon as this returns.
    fn mirror<R, F, Fut>(&self, guard: &KindGuard, write: F) -> PendingMirror
    where
        R: Tracked,
        F: FnOnce(Arc<dyn RemoteStore>, CollectionRef) -> Fut + Send + 'static,
        Fut: Future<Output = std::result::Result<(), RemoteError>> + Send + 'static,
    {
        let kind = R::KIND;
        if !self.session.is_alive() || self.session.status().is_offline() {
            tracing::debug!(kind = %kind, "Offline, change kept locally only");
            return PendingMirror::skipped();
        }

        let mut ticket = self.session.state().slot::<R>().enqueue_mirror(guard);
        let session = Arc::clone(&self.session);
        let remote = session.remote_handle();
        let collection = session.collection(kind);
        session.set_status(SyncStatus::Syncing);

        let handle = self.session.tasks().spawn(async move {
            let written = session
                .until_ended(async {
                    ticket.wait_turn().await;
                    write(remote, collection).await
                })
                .await;
            match written {
                Ok(Ok(())) => {
                    session.set_status(SyncStatus::Synced);
                    tracing::debug!(kind = %kind, "Change mirrored");
                    MirrorOutcome::Mirrored
                }
                Ok(Err(e)) => {
                    tracing::warn!(
                        user = %session.identity().uid,
                        kind = %kind,
                        error = %e,
                        "Remote mirror failed, change kept locally"
                    );
                    session.set_status(SyncStatus::Offline);
                    MirrorOutcome::Failed(e)
                }
                Err(_) => {
                    tracing::debug!(kind = %kind, "Session ended before the change was mirrored");
                    MirrorOutcome::Skipped
                }
            }
        });

        PendingMirror {
            handle: Some(handle),
        }
    }
}

/// A batch deleting every document whose `field` equals `value`.
async fn matching_deletes(
    remote: &dyn RemoteStore,
    coll: &CollectionRef,
    field: &str,
    value: &str,
) -> std::result::Result<WriteBatch, RemoteError> {
    let mut batch = WriteBatch::new();
    for doc in remote.list(coll).await? {
        if doc.data.get(field).and_then(Value::as_str) == Some(value) {
            batch.delete(doc.id);
        }
    }
    Ok(batch)
}

async fn delete_all(
    remote: &dyn RemoteStore,
    coll: &CollectionRef,
) -> std::result::Result<(), RemoteError> {
    let mut batch = WriteBatch::new();
    for doc in remote.list(coll).await? {
        batch.delete(doc.id);
    }
    remote.commit(coll, batch).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SessionSettings;
    use crate::local::{LocalStore, MemoryLocalStore};
    use crate::remote::InMemoryRemote;
    use crate::session::UserIdentity;
    use chrono::{NaiveDate, NaiveTime};
    use fitsync_engine::{DataKind, DayMeals, Meal};
    use std::time::Duration;

    async fn online_session(
        local: Arc<MemoryLocalStore>,
        remote: Arc<InMemoryRemote>,
    ) -> Arc<Session> {
        let session = Session::start(
            UserIdentity::new("u1", "u1@example.com"),
            local,
            remote,
            SessionSettings::immediate(),
        )
        .await;
        session
            .watch_status()
            .wait_for(|s| *s == SyncStatus::Synced)
            .await
            .unwrap();
        session
    }

    fn routine(name: &str, exercise: &str) -> Routine {
        Routine::new(
            name,
            vec![exercise.to_string()],
            [true, false, true, false, true, false, false],
            NaiveTime::from_hms_opt(18, 0, 0).unwrap(),
        )
    }

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, d).unwrap()
    }

    #[tokio::test]
    async fn add_routine_mirrors_and_replaces_same_name() {
        let local = Arc::new(MemoryLocalStore::new());
        let remote = Arc::new(InMemoryRemote::new());
        let session = online_session(local, remote.clone()).await;
        let gateway = session.gateway();

        gateway
            .add_routine(routine("Leg Day", "Squats"))
            .await
            .unwrap()
            .wait()
            .await;
        let outcome = gateway
            .add_routine(routine("Leg Day", "Lunges"))
            .await
            .unwrap()
            .wait()
            .await;

        assert_eq!(outcome, MirrorOutcome::Mirrored);
        let routines = gateway.routines();
        assert_eq!(routines.len(), 1);
        assert_eq!(routines[0].exercises, vec!["Lunges"]);
        assert!(routines[0].created_at.is_some());

        let docs = remote.documents(&session.collection(DataKind::Routines));
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].data["exercises"][0], "Lunges");
        assert_eq!(gateway.status(), SyncStatus::Synced);
        session.end().await;
    }

    #[tokio::test]
    async fn invalid_routine_is_rejected_before_any_write() {
        let local = Arc::new(MemoryLocalStore::new());
        let session = online_session(local.clone(), Arc::new(InMemoryRemote::new())).await;

        let err = session
            .gateway()
            .add_routine(Routine::new("", vec![], [false; 7], NaiveTime::MIN))
            .await
            .unwrap_err();
        assert!(matches!(err, crate::SyncError::Engine(_)));
        assert!(session.gateway().routines().is_empty());
        session.end().await;
    }

    #[tokio::test]
    async fn log_workout_skips_duplicates() {
        let local = Arc::new(MemoryLocalStore::new());
        let remote = Arc::new(InMemoryRemote::new());
        let session = online_session(local, remote.clone()).await;
        let gateway = session.gateway();

        let entry = WorkoutLogEntry::new("Push-ups", 20, day(1));
        gateway
            .log_workout(vec![entry.clone(), entry.clone()])
            .await
            .unwrap()
            .wait()
            .await;
        let again = gateway.log_workout(vec![entry]).await.unwrap();

        assert!(again.is_skipped());
        assert_eq!(gateway.workout_logs().len(), 1);
        assert_eq!(
            remote
                .documents(&session.collection(DataKind::WorkoutLogs))
                .len(),
            1
        );
        session.end().await;
    }

    #[tokio::test]
    async fn remote_failure_keeps_local_change_and_goes_offline() {
        let local = Arc::new(MemoryLocalStore::new());
        let remote = Arc::new(InMemoryRemote::new());
        let session = online_session(local.clone(), remote.clone()).await;
        let gateway = session.gateway();

        remote.fail_next(1, RemoteError::PermissionDenied("rules".into()));
        let outcome = gateway
            .log_workout(vec![WorkoutLogEntry::new("Squats", 10, day(2))])
            .await
            .unwrap()
            .wait()
            .await;

        assert!(matches!(outcome, MirrorOutcome::Failed(_)));
        assert_eq!(gateway.status(), SyncStatus::Offline);
        assert_eq!(gateway.workout_logs().len(), 1);
        let stored = local
            .get(&session.storage_key(DataKind::WorkoutLogs))
            .await
            .unwrap()
            .unwrap();
        assert!(stored.contains("Squats"));

        // Offline: the next mutation is not mirrored at all
        let next = gateway
            .log_workout(vec![WorkoutLogEntry::new("Squats", 12, day(2))])
            .await
            .unwrap();
        assert!(next.is_skipped());
        session.end().await;
    }

    #[tokio::test]
    async fn local_failure_propagates_and_leaves_memory_untouched() {
        let local = Arc::new(MemoryLocalStore::with_quota(64));
        let session = online_session(local, Arc::new(InMemoryRemote::new())).await;
        let gateway = session.gateway();

        let long = "x".repeat(200);
        let err = gateway
            .save_chat_log(vec![ChatMessage::new("1", long, fitsync_engine::Sender::User)])
            .await
            .unwrap_err();

        assert!(matches!(err, crate::SyncError::Local(_)));
        assert!(gateway.chat_log().is_empty());
        session.end().await;
    }

    #[tokio::test]
    async fn clear_workout_logs_removes_key_and_remote_docs() {
        let local = Arc::new(MemoryLocalStore::new());
        let remote = Arc::new(InMemoryRemote::new());
        let session = online_session(local.clone(), remote.clone()).await;
        let gateway = session.gateway();

        gateway
            .log_workout(vec![WorkoutLogEntry::new("Plank", 1, day(3))])
            .await
            .unwrap()
            .wait()
            .await;
        gateway.clear_workout_logs().await.unwrap().wait().await;

        assert!(gateway.workout_logs().is_empty());
        assert_eq!(
            local
                .get(&session.storage_key(DataKind::WorkoutLogs))
                .await
                .unwrap(),
            None
        );
        assert!(remote
            .documents(&session.collection(DataKind::WorkoutLogs))
            .is_empty());
        session.end().await;
    }

    #[tokio::test]
    async fn chat_log_is_replaced_wholesale() {
        let local = Arc::new(MemoryLocalStore::new());
        let remote = Arc::new(InMemoryRemote::new());
        let session = online_session(local.clone(), remote.clone()).await;
        let gateway = session.gateway();
        let chat = session.collection(DataKind::ChatLogs);

        let first = vec![
            ChatMessage::welcome(),
            ChatMessage::new("1", "hi", fitsync_engine::Sender::User),
        ];
        gateway.save_chat_log(first).await.unwrap().wait().await;
        assert_eq!(remote.documents(&chat).len(), 2);

        gateway
            .save_chat_log(vec![ChatMessage::welcome()])
            .await
            .unwrap()
            .wait()
            .await;
        assert_eq!(remote.documents(&chat).len(), 1);

        gateway.clear_chat_log().await.unwrap().wait().await;
        assert!(remote.documents(&chat).is_empty());
        assert_eq!(
            local
                .get(&session.storage_key(DataKind::ChatLogs))
                .await
                .unwrap()
                .as_deref(),
            Some("[]")
        );
        session.end().await;
    }

    #[tokio::test]
    async fn meal_plan_days_are_keyed_remotely() {
        let local = Arc::new(MemoryLocalStore::new());
        let remote = Arc::new(InMemoryRemote::new());
        let session = online_session(local, remote.clone()).await;
        let gateway = session.gateway();

        let meal = |name: &str| Meal::new(name, 600.0, 40.0, 60.0, 20.0);
        let plan = vec![
            MealPlanEntry::new(
                "0",
                DayMeals {
                    breakfast: meal("Oats"),
                    lunch: meal("Salad"),
                    dinner: meal("Salmon"),
                    updated_at: None,
                },
            ),
            MealPlanEntry::new(
                "1",
                DayMeals {
                    breakfast: meal("Eggs"),
                    lunch: meal("Wrap"),
                    dinner: meal("Stew"),
                    updated_at: None,
                },
            ),
        ];
        gateway.save_meal_plan(plan).await.unwrap().wait().await;

        let docs = remote.documents(&session.collection(DataKind::MealPlans));
        let ids: Vec<&str> = docs.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, vec!["0", "1"]);
        assert!(docs[0].data.get("updatedAt").is_some());
        assert!(gateway.meal_plan()[1].meals.updated_at.is_some());
        session.end().await;
    }

    #[tokio::test]
    async fn mutations_after_end_stay_local() {
        let local = Arc::new(MemoryLocalStore::new());
        let remote = Arc::new(InMemoryRemote::new());
        let session = online_session(local, remote.clone()).await;
        let gateway = session.gateway();
        session.end().await;

        let pending = gateway.delete_routine("Leg Day").await.unwrap();
        assert!(pending.is_skipped());
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(gateway.status(), SyncStatus::Offline);
    }

    #[tokio::test]
    async fn panicked_mirror_is_reported_as_aborted() {
        let pending = PendingMirror {
            handle: Some(tokio::spawn(async { panic!("remote write blew up") })),
        };
        assert!(!pending.is_skipped());
        assert_eq!(pending.wait().await, MirrorOutcome::Aborted);
    }

    #[tokio::test]
    async fn same_kind_mirrors_land_in_mutation_order() {
        let local = Arc::new(MemoryLocalStore::new());
        let remote = Arc::new(InMemoryRemote::new());
        let session = online_session(local, remote.clone()).await;
        let gateway = session.gateway();

        let first = gateway
            .save_chat_log(vec![ChatMessage::welcome()])
            .await
            .unwrap();
        let second = gateway
            .save_chat_log(vec![
                ChatMessage::welcome(),
                ChatMessage::new("1", "hi", fitsync_engine::Sender::User),
            ])
            .await
            .unwrap();
        let third = gateway.clear_chat_log().await.unwrap();

        assert_eq!(first.wait().await, MirrorOutcome::Mirrored);
        assert_eq!(second.wait().await, MirrorOutcome::Mirrored);
        assert_eq!(third.wait().await, MirrorOutcome::Mirrored);
        assert!(remote
            .documents(&session.collection(DataKind::ChatLogs))
            .is_empty());
        session.end().await;
    }
}
