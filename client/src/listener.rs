//! Live-Update Listener.
//!
//! One subscription per data kind. Every delivered snapshot is the full
//! remote collection; when it differs from memory it replaces both memory
//! and the Local Store. Snapshots queued behind a busy writer are coalesced
//! so only the newest one is applied.
//!
//! A snapshot waits for the kind's queued remote writes to land, so a
//! local change is never folded away before it is mirrored. A snapshot
//! equal to the remote collection the last reconciliation pass merged is
//! ignored, so conflicts that pass resolved for local records stand.

use std::sync::Arc;

use fitsync_engine::reconcile::{fold_remote, FoldAction};
use fitsync_engine::{
    decode_documents, ChatMessage, Document, MealPlanEntry, Routine, WorkoutLogEntry,
};
use futures::{FutureExt, StreamExt};

use crate::error::Result;
use crate::remote::Subscription;
use crate::session::Session;
use crate::state::{KindGuard, Tracked};

pub struct LiveUpdateListener;

impl LiveUpdateListener {
    /// Subscribe to every kind of the session's user.
    ///
    /// Subscriptions already opened are released if a later one fails.
    pub async fn attach(session: &Arc<Session>) -> Result<()> {
        let mut subscriptions = Vec::with_capacity(4);
        for kind in fitsync_engine::DataKind::ALL {
            match session.remote().subscribe(&session.collection(kind)).await {
                Ok(subscription) => subscriptions.push(subscription),
                Err(e) => {
                    for subscription in &subscriptions {
                        session.remote().unsubscribe(subscription.id());
                    }
                    return Err(e.into());
                }
            }
        }

        let mut subscriptions = subscriptions.into_iter();
        // Same order as DataKind::ALL
        spawn_listener::<Routine>(session, subscriptions.next());
        spawn_listener::<WorkoutLogEntry>(session, subscriptions.next());
        spawn_listener::<ChatMessage>(session, subscriptions.next());
        spawn_listener::<MealPlanEntry>(session, subscriptions.next());

        tracing::debug!(user = %session.identity().uid, "Live updates attached");
        Ok(())
    }
}

fn spawn_listener<R: Tracked>(session: &Arc<Session>, subscription: Option<Subscription>) {
    let Some(subscription) = subscription else {
        return;
    };
    debug_assert_eq!(subscription.collection().kind, R::KIND);

    let tasks = session.tasks().clone();
    let session = Arc::clone(session);
    tasks.spawn(async move { listen::<R>(session, subscription).await });
}

async fn listen<R: Tracked>(session: Arc<Session>, mut subscription: Subscription) {
    loop {
        let event = tokio::select! {
            _ = session.cancelled() => break,
            event = subscription.next() => event,
        };

        match event {
            Some(Ok(docs)) => {
                let slot = session.state().slot::<R>();
                let Ok(guard) = session.until_ended(slot.acquire_settled()).await else {
                    break;
                };
                let docs = latest_snapshot(&mut subscription, docs);
                if !session.is_alive() {
                    break;
                }
                apply_snapshot::<R>(&session, &guard, &docs).await;
            }
            Some(Err(e)) => {
                tracing::error!(
                    collection = %subscription.collection(),
                    error = %e,
                    "Live update error"
                );
            }
            None => break,
        }
    }

    session.remote().unsubscribe(subscription.id());
    tracing::debug!(collection = %subscription.collection(), "Live updates detached");
}

/// Drain snapshots that queued up while waiting, keeping the newest.
fn latest_snapshot(subscription: &mut Subscription, mut docs: Vec<Document>) -> Vec<Document> {
    while let Some(Some(event)) = subscription.next().now_or_never() {
        match event {
            Ok(newer) => docs = newer,
            Err(e) => tracing::error!(
                collection = %subscription.collection(),
                error = %e,
                "Live update error"
            ),
        }
    }
    docs
}

async fn apply_snapshot<R: Tracked>(session: &Session, guard: &KindGuard, docs: &[Document]) {
    let (remote, skipped) = decode_documents::<R>(docs);
    for e in &skipped {
        tracing::warn!(kind = %R::KIND, error = %e, "Skipping undecodable document");
    }

    let slot = session.state().slot::<R>();
    if slot.is_reconciled(guard, &remote) {
        tracing::debug!(kind = %R::KIND, "Snapshot already reconciled");
        return;
    }

    let current = slot.snapshot();
    match fold_remote(&current, remote) {
        FoldAction::Unchanged => {}
        FoldAction::Replace(records) => {
            let count = records.len();
            match session.persist(guard, records).await {
                Ok(()) => tracing::debug!(kind = %R::KIND, count, "Applied remote snapshot"),
                Err(e) => tracing::error!(kind = %R::KIND, error = %e, "Failed to apply remote snapshot"),
            }
        }
    }
}
