//! In-memory collections of a session.
//!
//! Each kind lives in a [`Slot`]: the current records, observable through a
//! `watch` channel, plus an async mutex that serializes every local writer
//! of that kind. Reads never wait on the mutex.
//!
//! Remote writes of a kind are ordered separately, through a chain of
//! `MirrorTicket`s, so a local write never waits on the network.

use std::sync::{Arc, Mutex as StdMutex, PoisonError};

use fitsync_engine::reconcile::same_record_set;
use fitsync_engine::{ChatMessage, DataKind, MealPlanEntry, Routine, SyncRecord, WorkoutLogEntry};
use tokio::sync::{oneshot, watch, Mutex, OwnedMutexGuard};

use crate::local::{load_collection, LocalStore, StorageKey};

/// Exclusive write access to one kind.
///
/// Held by a reconciliation pass from fetch through write-back, by the
/// gateway around its local write, and by the listener while it applies a
/// snapshot.
#[derive(Debug)]
pub struct KindGuard {
    kind: DataKind,
    _guard: OwnedMutexGuard<()>,
}

impl KindGuard {
    pub fn kind(&self) -> DataKind {
        self.kind
    }
}

/// A place in a kind's remote write queue.
///
/// Dropping the ticket lets the next queued write proceed.
#[derive(Debug)]
pub(crate) struct MirrorTicket {
    previous: Option<oneshot::Receiver<()>>,
    _done: oneshot::Sender<()>,
    in_flight: Arc<watch::Sender<usize>>,
}

impl Drop for MirrorTicket {
    fn drop(&mut self) {
        self.in_flight.send_modify(|n| *n = n.saturating_sub(1));
    }
}

impl MirrorTicket {
    /// Wait until every remote write queued ahead of this one has finished.
    pub(crate) async fn wait_turn(&mut self) {
        if let Some(previous) = self.previous.take() {
            // A dropped sender is the completion signal
            let _ = previous.await;
        }
    }
}

#[derive(Debug)]
pub struct Slot<R> {
    lock: Arc<Mutex<()>>,
    records: watch::Sender<Vec<R>>,
    mirror_tail: StdMutex<Option<oneshot::Receiver<()>>>,
    in_flight: Arc<watch::Sender<usize>>,
    reconciled: StdMutex<Option<Vec<R>>>,
}

impl<R: SyncRecord> Slot<R> {
    fn new(initial: Vec<R>) -> Self {
        let (records, _) = watch::channel(initial);
        Self {
            lock: Arc::new(Mutex::new(())),
            records,
            mirror_tail: StdMutex::new(None),
            in_flight: Arc::new(watch::channel(0).0),
            reconciled: StdMutex::new(None),
        }
    }

    /// Current records.
    pub fn snapshot(&self) -> Vec<R> {
        self.records.borrow().clone()
    }

    /// Receiver notified whenever the collection is replaced.
    pub fn watch(&self) -> watch::Receiver<Vec<R>> {
        self.records.subscribe()
    }

    /// Wait for exclusive write access.
    pub async fn acquire(&self) -> KindGuard {
        KindGuard {
            kind: R::KIND,
            _guard: Arc::clone(&self.lock).lock_owned().await,
        }
    }

    /// Wait until no remote write of this kind is queued, then take the
    /// guard. The queue is not held up while waiting.
    pub async fn acquire_settled(&self) -> KindGuard {
        let mut in_flight = self.in_flight.subscribe();
        loop {
            let _ = in_flight.wait_for(|n| *n == 0).await;
            let guard = self.acquire().await;
            // Mirrors are only queued under the guard
            if *self.in_flight.borrow() == 0 {
                return guard;
            }
        }
    }

    /// Replace the collection. Callers write the Local Store first.
    pub(crate) fn replace(&self, guard: &KindGuard, records: Vec<R>) {
        debug_assert_eq!(guard.kind(), R::KIND);
        self.records.send_replace(records);
    }

    /// Queue a remote write behind the ones already queued.
    pub(crate) fn enqueue_mirror(&self, guard: &KindGuard) -> MirrorTicket {
        debug_assert_eq!(guard.kind(), R::KIND);
        let (done, next) = oneshot::channel();
        let previous = self
            .mirror_tail
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(next);
        self.in_flight.send_modify(|n| *n += 1);
        MirrorTicket {
            previous,
            _done: done,
            in_flight: Arc::clone(&self.in_flight),
        }
    }

    /// Record the remote collection a reconciliation pass left behind.
    pub(crate) fn mark_reconciled(&self, guard: &KindGuard, remote: Vec<R>) {
        debug_assert_eq!(guard.kind(), R::KIND);
        *self.reconciled.lock().unwrap_or_else(PoisonError::into_inner) = Some(remote);
    }

    /// Whether `remote` is the collection the last pass already merged.
    ///
    /// Any other snapshot supersedes the mark.
    pub(crate) fn is_reconciled(&self, guard: &KindGuard, remote: &[R]) -> bool {
        debug_assert_eq!(guard.kind(), R::KIND);
        let mut reconciled = self.reconciled.lock().unwrap_or_else(PoisonError::into_inner);
        let matches = reconciled
            .as_deref()
            .is_some_and(|seen| same_record_set(seen, remote));
        if !matches {
            *reconciled = None;
        }
        matches
    }
}

/// The four collections of one user.
#[derive(Debug)]
pub struct CollectionState {
    routines: Slot<Routine>,
    workout_logs: Slot<WorkoutLogEntry>,
    chat_log: Slot<ChatMessage>,
    meal_plan: Slot<MealPlanEntry>,
}

impl CollectionState {
    /// Load every kind from the Local Store.
    pub async fn load(local: &dyn LocalStore, email: &str) -> Self {
        let key = |kind| StorageKey::new(email, kind);
        Self {
            routines: Slot::new(load_collection(local, &key(DataKind::Routines)).await),
            workout_logs: Slot::new(load_collection(local, &key(DataKind::WorkoutLogs)).await),
            chat_log: Slot::new(load_collection(local, &key(DataKind::ChatLogs)).await),
            meal_plan: Slot::new(load_collection(local, &key(DataKind::MealPlans)).await),
        }
    }

    pub fn slot<R: Tracked>(&self) -> &Slot<R> {
        R::slot(self)
    }
}

/// Record types with a slot in [`CollectionState`].
pub trait Tracked: SyncRecord {
    fn slot(state: &CollectionState) -> &Slot<Self>;
}

impl Tracked for Routine {
    fn slot(state: &CollectionState) -> &Slot<Self> {
        &state.routines
    }
}

impl Tracked for WorkoutLogEntry {
    fn slot(state: &CollectionState) -> &Slot<Self> {
        &state.workout_logs
    }
}

impl Tracked for ChatMessage {
    fn slot(state: &CollectionState) -> &Slot<Self> {
        &state.chat_log
    }
}

impl Tracked for MealPlanEntry {
    fn slot(state: &CollectionState) -> &Slot<Self> {
        &state.meal_plan
    }
}
