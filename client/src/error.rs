//! Unified error handling for the sync client.

use crate::local::LocalStoreError;
use crate::remote::RemoteError;

/// Errors surfaced by sessions, the gateway and reconciliation passes.
///
/// Remote failures never reach gateway callers; they only appear here when
/// a reconciliation pass or listener reports them.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("Local store error: {0}")]
    Local(#[from] LocalStoreError),

    #[error("Remote store error: {0}")]
    Remote(#[from] RemoteError),

    #[error("Engine error: {0}")]
    Engine(#[from] fitsync_engine::Error),

    #[error("Session has ended")]
    SessionEnded,
}

/// Failures of the chat-completion collaborator.
#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    #[error("Chat transport error: {0}")]
    Transport(String),

    #[error("Chat quota exceeded")]
    QuotaExceeded,

    #[error("Empty message")]
    EmptyMessage,

    #[error(transparent)]
    Sync(#[from] SyncError),
}

/// Result type alias for client operations.
pub type Result<T> = std::result::Result<T, SyncError>;
