//! The session store.
//!
//! Each session lives behind its own `tokio::sync::Mutex`, which doubles as
//! the session's execution slot: whoever holds the lock is the only code
//! reading or writing that session. The lock is FIFO-fair, so waiters are
//! served in arrival order. The map from id to slot is guarded by a plain
//! `RwLock` that is only held for lookups and never across an await.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use parley_types::SessionId;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::error::DialogueError;
use crate::session::{Domain, Session};

pub(crate) type SessionSlot<D> = Arc<Mutex<Session<D>>>;

/// Owns every live session of one domain and the reference data they share.
pub struct SessionStore<D: Domain> {
    refs: Arc<D::Refs>,
    sessions: RwLock<HashMap<SessionId, SessionSlot<D>>>,
}

impl<D: Domain> SessionStore<D> {
    /// Creates an empty store around injected reference data.
    pub fn new(refs: D::Refs) -> Self {
        Self::with_shared_refs(Arc::new(refs))
    }

    /// Creates an empty store around reference data shared with other stores.
    pub fn with_shared_refs(refs: Arc<D::Refs>) -> Self {
        Self {
            refs,
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// Read-only reference data.
    pub fn refs(&self) -> &Arc<D::Refs> {
        &self.refs
    }

    /// Opens a new session in the initial phase with a fully built payload.
    pub fn create(&self) -> SessionId {
        let id = SessionId::new();
        let session = Session::<D>::new(id, self.refs.as_ref());
        self.sessions
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(id, Arc::new(Mutex::new(session)));
        tracing::info!(domain = D::NAME, session_id = %id, "session created");
        id
    }

    /// Returns a snapshot copy of the session.
    ///
    /// Waits for any in-flight invocation on the session to finish first.
    ///
    /// # Errors
    ///
    /// Returns `DialogueError::SessionNotFound` for unknown or closed ids.
    pub async fn get(&self, id: SessionId) -> Result<Session<D>, DialogueError> {
        let session = self.lock(id).await?;
        Ok(session.clone())
    }

    /// Re-initializes the session's phase and payload.
    ///
    /// Ordered with tool invocations through the session's slot: anything
    /// queued after the reset observes the post-reset state.
    ///
    /// # Errors
    ///
    /// Returns `DialogueError::SessionNotFound` for unknown or closed ids.
    pub async fn reset(&self, id: SessionId) -> Result<(), DialogueError> {
        let mut session = self.lock(id).await?;
        session.reset(self.refs.as_ref());
        tracing::info!(
            domain = D::NAME,
            session_id = %id,
            generation = session.generation(),
            "session reset"
        );
        Ok(())
    }

    /// Moves the session's phase cursor.
    ///
    /// # Errors
    ///
    /// Returns `DialogueError::InvalidTransition` when `next` is not a legal
    /// successor, or `DialogueError::SessionNotFound`.
    pub async fn advance(&self, id: SessionId, next: D::Phase) -> Result<(), DialogueError> {
        let mut session = self.lock(id).await?;
        session.advance(next)
    }

    /// Drops a session. Returns whether it existed.
    pub fn close(&self, id: SessionId) -> bool {
        let removed = self
            .sessions
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .remove(&id)
            .is_some();
        if removed {
            tracing::info!(domain = D::NAME, session_id = %id, "session closed");
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.sessions
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Takes the session's execution slot.
    ///
    /// A session closed while the caller waited stays closed: the caller
    /// gets `SessionClosed` instead of the orphaned session.
    pub(crate) async fn lock(
        &self,
        id: SessionId,
    ) -> Result<OwnedMutexGuard<Session<D>>, DialogueError> {
        let slot = self.slot(id)?;
        let guard = Arc::clone(&slot).lock_owned().await;
        match self.slot(id) {
            Ok(current) if Arc::ptr_eq(&current, &slot) => Ok(guard),
            _ => Err(DialogueError::SessionClosed(id)),
        }
    }

    pub(crate) fn slot(&self, id: SessionId) -> Result<SessionSlot<D>, DialogueError> {
        self.sessions
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(&id)
            .cloned()
            .ok_or(DialogueError::SessionNotFound(id))
    }
}
