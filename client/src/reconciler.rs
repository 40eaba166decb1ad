//! Reconciler: one full two-way merge pass per data kind.
//!
//! Each pass holds its kind's guard from the remote fetch until the merged
//! collection is written back, so no mutation of the same kind interleaves.
//! Remote writes queued by earlier mutations land before the guard is
//! taken. Kinds
//! are reconciled concurrently and fail independently, and every remote
//! await gives way when the session ends.

use fitsync_engine::reconcile::merge;
use fitsync_engine::{
    decode_documents, ChatMessage, MealPlanEntry, MergeReport, Routine, SyncRecord, SyncStatus,
    WorkoutLogEntry,
};

use crate::error::{Result, SyncError};
use crate::session::Session;
use crate::state::Tracked;

/// Reconcile one kind.
///
/// Local-only records are pushed before anything is written locally; a
/// failed push aborts the pass and leaves the Local Store untouched.
pub async fn reconcile_kind<R: Tracked>(session: &Session) -> Result<MergeReport> {
    if !session.is_alive() {
        return Err(SyncError::SessionEnded);
    }

    let slot = session.state().slot::<R>();
    let guard = session.until_ended(slot.acquire_settled()).await?;
    let local = slot.snapshot();
    let collection = session.collection(R::KIND);

    let docs = session.until_ended(session.remote().list(&collection)).await??;
    let (remote, skipped) = decode_documents::<R>(&docs);
    for e in &skipped {
        tracing::warn!(collection = %collection, error = %e, "Skipping undecodable document");
    }

    let outcome = merge(&local, &remote);
    let report = outcome.report(local.len(), remote.len());

    for record in &outcome.to_push {
        let data = record.to_document_data()?;
        match record.document_id() {
            Some(id) => {
                session
                    .until_ended(session.remote().set(&collection, &id, data))
                    .await??
            }
            None => {
                session
                    .until_ended(session.remote().add(&collection, data))
                    .await??;
            }
        }
    }

    if !session.is_alive() {
        return Err(SyncError::SessionEnded);
    }
    session.persist(&guard, outcome.merged).await?;
    slot.mark_reconciled(&guard, remote_after_push(remote, outcome.to_push));

    tracing::info!(
        user = %session.identity().uid,
        kind = %R::KIND,
        local = report.local_count,
        remote = report.remote_count,
        merged = report.merged_count,
        pushed = report.pushed,
        adopted = report.adopted,
        conflicts = report.conflicts,
        "Reconciled"
    );
    Ok(report)
}

/// The remote collection once `pushed` has been written over `remote`.
fn remote_after_push<R: SyncRecord>(mut remote: Vec<R>, pushed: Vec<R>) -> Vec<R> {
    let overwritten: Vec<String> = pushed.iter().filter_map(R::document_id).collect();
    remote.retain(|r| r.document_id().map_or(true, |id| !overwritten.contains(&id)));
    remote.extend(pushed);
    remote
}

async fn reconcile_status<R: Tracked>(session: &Session) -> SyncStatus {
    match reconcile_kind::<R>(session).await {
        Ok(_) => SyncStatus::Synced,
        Err(SyncError::SessionEnded) => SyncStatus::Offline,
        Err(e) => {
            tracing::warn!(
                user = %session.identity().uid,
                kind = %R::KIND,
                error = %e,
                "Reconciliation failed"
            );
            SyncStatus::Offline
        }
    }
}

/// Reconcile every kind and publish the combined status.
pub async fn reconcile_all(session: &Session) -> SyncStatus {
    if !session.is_alive() {
        return SyncStatus::Offline;
    }
    session.set_status(SyncStatus::Syncing);

    if let Err(e) = session.remote().enable_network().await {
        tracing::warn!(user = %session.identity().uid, error = %e, "Could not enable network");
        disable_network(session).await;
        session.set_status(SyncStatus::Offline);
        return SyncStatus::Offline;
    }

    let (routines, logs, chat, meals) = tokio::join!(
        reconcile_status::<Routine>(session),
        reconcile_status::<WorkoutLogEntry>(session),
        reconcile_status::<ChatMessage>(session),
        reconcile_status::<MealPlanEntry>(session),
    );
    let status = SyncStatus::combine_all([routines, logs, chat, meals]);

    if status.is_offline() {
        disable_network(session).await;
    }
    session.set_status(status);
    tracing::info!(user = %session.identity().uid, status = %status, "Reconciliation finished");
    status
}

async fn disable_network(session: &Session) {
    if let Err(e) = session.remote().disable_network().await {
        tracing::warn!(user = %session.identity().uid, error = %e, "Could not disable network");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SessionSettings;
    use crate::local::{save_collection, LocalStore, MemoryLocalStore, StorageKey};
    use crate::remote::{CollectionRef, InMemoryRemote, RemoteError, RemoteStore};
    use crate::session::UserIdentity;
    use chrono::NaiveDate;
    use fitsync_engine::{DataKind, Sender};
    use std::sync::Arc;
    use std::time::Duration;

    const EMAIL: &str = "r@example.com";

    /// A session whose startup pass will not run during the test.
    async fn idle_session(
        local: Arc<MemoryLocalStore>,
        remote: Arc<InMemoryRemote>,
    ) -> Arc<Session> {
        Session::start(
            UserIdentity::new("r1", EMAIL),
            local,
            remote,
            SessionSettings {
                settle_delay: Duration::from_secs(3600),
            },
        )
        .await
    }

    fn logs() -> CollectionRef {
        CollectionRef::new("r1", DataKind::WorkoutLogs)
    }

    fn entry(ex: &str, reps: u32, d: u32) -> WorkoutLogEntry {
        WorkoutLogEntry::new(ex, reps, NaiveDate::from_ymd_opt(2024, 3, d).unwrap())
    }

    #[tokio::test]
    async fn pushes_local_only_and_adopts_remote_only() {
        let local = Arc::new(MemoryLocalStore::new());
        save_collection(
            local.as_ref(),
            &StorageKey::new(EMAIL, DataKind::WorkoutLogs),
            &[entry("Squats", 10, 1)],
        )
        .await
        .unwrap();
        let remote = Arc::new(InMemoryRemote::new());
        remote
            .add(&logs(), entry("Rows", 8, 2).to_document_data().unwrap())
            .await
            .unwrap();

        let session = idle_session(local, remote.clone()).await;
        let report = reconcile_kind::<WorkoutLogEntry>(&session).await.unwrap();

        assert_eq!(report.pushed, 1);
        assert_eq!(report.adopted, 1);
        assert_eq!(report.merged_count, 2);
        assert_eq!(remote.documents(&logs()).len(), 2);

        // A second pass has nothing left to do
        let again = reconcile_kind::<WorkoutLogEntry>(&session).await.unwrap();
        assert_eq!((again.pushed, again.adopted), (0, 0));
        assert_eq!(remote.documents(&logs()).len(), 2);
        session.end().await;
    }

    #[tokio::test]
    async fn pass_marks_the_remote_collection_it_leaves() {
        let local = Arc::new(MemoryLocalStore::new());
        save_collection(
            local.as_ref(),
            &StorageKey::new(EMAIL, DataKind::WorkoutLogs),
            &[entry("Squats", 10, 1)],
        )
        .await
        .unwrap();
        let remote = Arc::new(InMemoryRemote::new());
        remote
            .add(&logs(), entry("Rows", 8, 2).to_document_data().unwrap())
            .await
            .unwrap();

        let session = idle_session(local, remote.clone()).await;
        reconcile_kind::<WorkoutLogEntry>(&session).await.unwrap();

        let (after, _) = decode_documents::<WorkoutLogEntry>(&remote.documents(&logs()));
        let slot = session.state().slot::<WorkoutLogEntry>();
        let guard = slot.acquire().await;
        assert!(slot.is_reconciled(&guard, &after));
        session.end().await;
    }

    #[test]
    fn pushed_days_replace_remote_days() {
        let meal = fitsync_engine::Meal::new("Oats", 400.0, 20.0, 60.0, 10.0);
        let day = |key: &str, breakfast: &str| {
            let mut meals = fitsync_engine::DayMeals {
                breakfast: meal.clone(),
                lunch: meal.clone(),
                dinner: meal.clone(),
                updated_at: None,
            };
            meals.breakfast.name = breakfast.to_string();
            MealPlanEntry::new(key, meals)
        };

        let after = remote_after_push(
            vec![day("0", "Oats"), day("1", "Eggs")],
            vec![day("1", "Toast"), day("2", "Fruit")],
        );
        let breakfasts: Vec<(&str, &str)> = after
            .iter()
            .map(|d| (d.day.as_str(), d.meals.breakfast.name.as_str()))
            .collect();
        assert_eq!(breakfasts, vec![("0", "Oats"), ("1", "Toast"), ("2", "Fruit")]);
    }

    #[tokio::test]
    async fn failed_push_leaves_local_store_untouched() {
        let local = Arc::new(MemoryLocalStore::new());
        let key = StorageKey::new(EMAIL, DataKind::WorkoutLogs);
        save_collection(local.as_ref(), &key, &[entry("Squats", 10, 1)])
            .await
            .unwrap();
        let before = local.get(&key).await.unwrap();

        let remote = Arc::new(InMemoryRemote::new());
        let session = idle_session(local.clone(), remote.clone()).await;

        // The list succeeds, the push fails
        remote.fail_next_writes(1, RemoteError::QuotaExceeded);
        let err = reconcile_kind::<WorkoutLogEntry>(&session).await.unwrap_err();
        assert!(matches!(err, SyncError::Remote(RemoteError::QuotaExceeded)));
        assert!(remote.documents(&logs()).is_empty());
        assert_eq!(local.get(&key).await.unwrap(), before);
        session.end().await;
    }

    #[tokio::test]
    async fn undecodable_documents_are_skipped() {
        let local = Arc::new(MemoryLocalStore::new());
        let remote = Arc::new(InMemoryRemote::new());
        remote
            .add(&logs(), serde_json::json!({"exercise": "Rows", "reps": "many"}))
            .await
            .unwrap();
        remote
            .add(&logs(), entry("Rows", 8, 2).to_document_data().unwrap())
            .await
            .unwrap();

        let session = idle_session(local, remote).await;
        let report = reconcile_kind::<WorkoutLogEntry>(&session).await.unwrap();
        assert_eq!(report.remote_count, 1);
        assert_eq!(session.gateway().workout_logs().len(), 1);
        session.end().await;
    }

    #[tokio::test]
    async fn unreachable_remote_sets_offline_and_disables_network() {
        let local = Arc::new(MemoryLocalStore::new());
        let remote = Arc::new(InMemoryRemote::new());
        let session = idle_session(local, remote.clone()).await;

        remote.set_reachable(false);
        let status = reconcile_all(&session).await;

        assert_eq!(status, SyncStatus::Offline);
        assert_eq!(session.status(), SyncStatus::Offline);
        assert!(!remote.is_network_enabled());
        session.end().await;
    }

    #[tokio::test]
    async fn one_failing_kind_does_not_block_the_others() {
        let local = Arc::new(MemoryLocalStore::new());
        let remote = Arc::new(InMemoryRemote::new());
        remote
            .add(
                &CollectionRef::new("r1", DataKind::ChatLogs),
                ChatMessage::new("9", "from elsewhere", Sender::User)
                    .to_document_data()
                    .unwrap(),
            )
            .await
            .unwrap();
        let session = idle_session(local, remote.clone()).await;

        // Exactly one of the four concurrent lists fails
        remote.fail_next(1, RemoteError::PermissionDenied("rules".into()));
        let status = reconcile_all(&session).await;

        assert_eq!(status, SyncStatus::Offline);
        let adopted_chat = session.gateway().chat_log().len();
        let routines_key = session
            .local()
            .get(&session.storage_key(DataKind::Routines))
            .await
            .unwrap();
        // Three of the four kinds completed
        let completed = [
            routines_key.is_some(),
            session
                .local()
                .get(&session.storage_key(DataKind::WorkoutLogs))
                .await
                .unwrap()
                .is_some(),
            adopted_chat == 1,
            session
                .local()
                .get(&session.storage_key(DataKind::MealPlans))
                .await
                .unwrap()
                .is_some(),
        ];
        assert_eq!(completed.iter().filter(|c| **c).count(), 3);
        session.end().await;
    }

    #[tokio::test]
    async fn ended_session_does_not_reconcile() {
        let local = Arc::new(MemoryLocalStore::new());
        let session = idle_session(local.clone(), Arc::new(InMemoryRemote::new())).await;
        session.end().await;

        let err = reconcile_kind::<Routine>(&session).await.unwrap_err();
        assert!(matches!(err, SyncError::SessionEnded));
        assert_eq!(reconcile_all(&session).await, SyncStatus::Offline);
        assert!(local.is_empty());
    }
}
