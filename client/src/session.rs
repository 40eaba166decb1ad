//! User sessions.
//!
//! A [`Session`] owns everything that is scoped to one signed-in user: the
//! in-memory collections, the sync status and every background task. Ending
//! the session cancels those tasks; no task may write after that.

use std::future::Future;
use std::sync::Arc;

use chrono::Utc;
use fitsync_engine::{DataKind, SyncStatus};
use tokio::sync::{watch, Mutex};
use tokio_util::sync::{CancellationToken, WaitForCancellationFuture};
use tokio_util::task::TaskTracker;
use uuid::Uuid;

use crate::config::SessionSettings;
use crate::error::{Result, SyncError};
use crate::gateway::MutationGateway;
use crate::listener::LiveUpdateListener;
use crate::local::{save_collection, LocalStore, StorageKey};
use crate::reconciler;
use crate::remote::{CollectionRef, RemoteStore};
use crate::state::{CollectionState, KindGuard, Tracked};

/// The signed-in user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserIdentity {
    /// Stable unique id; partitions the Remote Store
    pub uid: String,
    /// Email-like label; namespaces Local Store keys
    pub email: String,
}

impl UserIdentity {
    pub fn new(uid: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            uid: uid.into(),
            email: email.into(),
        }
    }
}

pub struct Session {
    identity: UserIdentity,
    generation: Uuid,
    cancel: CancellationToken,
    tasks: TaskTracker,
    status: watch::Sender<SyncStatus>,
    state: CollectionState,
    local: Arc<dyn LocalStore>,
    remote: Arc<dyn RemoteStore>,
    settings: SessionSettings,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("identity", &self.identity)
            .field("generation", &self.generation)
            .field("alive", &self.is_alive())
            .field("status", &self.status())
            .finish()
    }
}

impl Session {
    /// Load the user's collections and start background sync.
    ///
    /// After the settle delay a full reconciliation runs, then the
    /// Live-Update Listener is attached. Attaching only after the first
    /// pass keeps the initial remote snapshot from replacing local-only
    /// records before they are pushed; the listener then skips that
    /// snapshot when the pass already merged it, so local-wins conflicts
    /// survive.
    pub async fn start(
        identity: UserIdentity,
        local: Arc<dyn LocalStore>,
        remote: Arc<dyn RemoteStore>,
        settings: SessionSettings,
    ) -> Arc<Self> {
        let state = CollectionState::load(local.as_ref(), &identity.email).await;
        let (status, _) = watch::channel(SyncStatus::Offline);

        let session = Arc::new(Self {
            identity,
            generation: Uuid::new_v4(),
            cancel: CancellationToken::new(),
            tasks: TaskTracker::new(),
            status,
            state,
            local,
            remote,
            settings,
        });

        tracing::info!(
            user = %session.identity.uid,
            generation = %session.generation,
            "Session started"
        );

        let startup = Arc::clone(&session);
        session.tasks.spawn(async move { startup.run_startup().await });

        session
    }

    async fn run_startup(self: Arc<Self>) {
        tokio::select! {
            _ = self.cancel.cancelled() => return,
            _ = tokio::time::sleep(self.settings.settle_delay) => {}
        }

        reconciler::reconcile_all(&self).await;

        if !self.is_alive() {
            return;
        }
        match self.until_ended(LiveUpdateListener::attach(&self)).await {
            Ok(Err(e)) => {
                tracing::error!(user = %self.identity.uid, error = %e, "Failed to attach live updates")
            }
            Ok(Ok(())) | Err(_) => {}
        }
    }

    /// Cancel background work, wait for it to stop and reset status.
    pub async fn end(&self) {
        if self.cancel.is_cancelled() {
            return;
        }
        self.cancel.cancel();
        self.status.send_replace(SyncStatus::Offline);

        self.tasks.close();
        self.tasks.wait().await;
        self.status.send_replace(SyncStatus::Offline);

        tracing::info!(
            user = %self.identity.uid,
            generation = %self.generation,
            "Session ended"
        );
    }

    /// Liveness guard for every background write.
    pub fn is_alive(&self) -> bool {
        !self.cancel.is_cancelled()
    }

    pub fn identity(&self) -> &UserIdentity {
        &self.identity
    }

    /// Unique id of this session instance.
    pub fn generation(&self) -> Uuid {
        self.generation
    }

    pub fn status(&self) -> SyncStatus {
        *self.status.borrow()
    }

    pub fn watch_status(&self) -> watch::Receiver<SyncStatus> {
        self.status.subscribe()
    }

    /// Publish a status unless the session has ended.
    pub(crate) fn set_status(&self, status: SyncStatus) {
        if self.is_alive() {
            self.status.send_replace(status);
        }
    }

    pub fn state(&self) -> &CollectionState {
        &self.state
    }

    pub fn gateway(self: &Arc<Self>) -> MutationGateway {
        MutationGateway::new(Arc::clone(self))
    }

    /// Run a full reconciliation now.
    pub async fn reconcile_now(&self) -> SyncStatus {
        reconciler::reconcile_all(self).await
    }

    pub fn local(&self) -> &dyn LocalStore {
        self.local.as_ref()
    }

    pub fn remote(&self) -> &dyn RemoteStore {
        self.remote.as_ref()
    }

    pub(crate) fn remote_handle(&self) -> Arc<dyn RemoteStore> {
        Arc::clone(&self.remote)
    }

    pub fn collection(&self, kind: DataKind) -> CollectionRef {
        CollectionRef::new(self.identity.uid.clone(), kind)
    }

    pub fn storage_key(&self, kind: DataKind) -> StorageKey {
        StorageKey::new(&self.identity.email, kind)
    }

    pub(crate) fn cancelled(&self) -> WaitForCancellationFuture<'_> {
        self.cancel.cancelled()
    }

    pub(crate) fn tasks(&self) -> &TaskTracker {
        &self.tasks
    }

    /// Run `work` unless the session ends first.
    pub(crate) async fn until_ended<F: Future>(&self, work: F) -> Result<F::Output> {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(SyncError::SessionEnded),
            output = work => Ok(output),
        }
    }

    /// Write a collection to the Local Store, then to memory.
    ///
    /// On a Local Store failure memory is left unchanged.
    pub(crate) async fn persist<R: Tracked>(&self, guard: &KindGuard, records: Vec<R>) -> Result<()> {
        save_collection(self.local(), &self.storage_key(R::KIND), &records).await?;
        self.state.slot::<R>().replace(guard, records);
        Ok(())
    }

    /// Remove a collection's key from the Local Store and empty it in memory.
    pub(crate) async fn persist_removal<R: Tracked>(&self, guard: &KindGuard) -> Result<()> {
        self.local.remove(&self.storage_key(R::KIND)).await?;
        self.state.slot::<R>().replace(guard, Vec::new());
        Ok(())
    }

    pub(crate) fn now(&self) -> fitsync_engine::Timestamp {
        Utc::now()
    }
}

/// Owner of at most one active session.
pub struct SyncClient {
    local: Arc<dyn LocalStore>,
    remote: Arc<dyn RemoteStore>,
    settings: SessionSettings,
    active: Mutex<Option<Arc<Session>>>,
}

impl SyncClient {
    pub fn new(
        local: Arc<dyn LocalStore>,
        remote: Arc<dyn RemoteStore>,
        settings: SessionSettings,
    ) -> Self {
        Self {
            local,
            remote,
            settings,
            active: Mutex::new(None),
        }
    }

    /// Start a session, ending any previous one first.
    pub async fn sign_in(&self, identity: UserIdentity) -> Arc<Session> {
        let mut active = self.active.lock().await;
        if let Some(previous) = active.take() {
            previous.end().await;
        }

        let session = Session::start(
            identity,
            Arc::clone(&self.local),
            Arc::clone(&self.remote),
            self.settings.clone(),
        )
        .await;
        *active = Some(Arc::clone(&session));
        session
    }

    pub async fn sign_out(&self) {
        let previous = self.active.lock().await.take();
        if let Some(session) = previous {
            session.end().await;
        }
    }

    pub async fn session(&self) -> Option<Arc<Session>> {
        self.active.lock().await.clone()
    }
}
