//! Error types for the dialogue orchestrator.

use parley_types::SessionId;
use thiserror::Error;

/// Errors raised while processing a turn or a tool invocation.
///
/// Everything except [`DialogueError::SessionNotFound`],
/// [`DialogueError::ToolNotFound`] and [`DialogueError::SessionClosed`] is
/// recoverable at the turn boundary and is rendered to the user through
/// [`DialogueError::spoken`].
#[derive(Debug, Error)]
pub enum DialogueError {
    /// No live session has this id.
    #[error("session not found: {0}")]
    SessionNotFound(SessionId),

    /// No registered tool has this name.
    #[error("tool not found: {0}")]
    ToolNotFound(String),

    /// Tool parameters were missing, malformed, or not coercible.
    #[error("invalid parameters: {0}")]
    Validation(String),

    /// The call is well formed but not allowed in the session's current state.
    /// The message is user-facing.
    #[error("precondition failed: {0}")]
    PreconditionFailed(String),

    /// The requested phase is not a successor of the current phase.
    #[error("invalid transition from {from} to {to}")]
    InvalidTransition {
        /// The phase the session was in.
        from: &'static str,
        /// The phase that was requested.
        to: &'static str,
    },

    /// A durable write did not complete.
    #[error("persistence failure: {0}")]
    Persistence(#[from] PersistenceError),

    /// Reference data or an external store could not be read.
    #[error("storage error: {0}")]
    Storage(String),

    /// The session was dropped after an unrecoverable failure.
    #[error("session {0} was closed after an unrecoverable failure")]
    SessionClosed(SessionId),
}

impl DialogueError {
    /// Shorthand for a user-facing precondition failure.
    pub fn precondition(message: impl Into<String>) -> Self {
        Self::PreconditionFailed(message.into())
    }

    /// Shorthand for a validation failure raised inside a handler.
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Whether the error indicates a wiring bug or a dead session rather
    /// than something the speaker can fix by rephrasing.
    pub fn is_caller_fault(&self) -> bool {
        matches!(
            self,
            Self::SessionNotFound(_) | Self::ToolNotFound(_) | Self::SessionClosed(_)
        )
    }

    /// Renders the error as a polite sentence safe to hand to a speech
    /// synthesizer.
    pub fn spoken(&self) -> String {
        match self {
            Self::PreconditionFailed(message) => message.clone(),
            Self::Validation(_) => {
                "Sorry, I didn't quite catch that. Could you say it another way?".to_string()
            }
            Self::InvalidTransition { .. } => {
                "Let's finish the current step before we move on.".to_string()
            }
            Self::Persistence(_) => {
                "Sorry, I couldn't save that just now. Let's keep going and I'll try again later."
                    .to_string()
            }
            Self::Storage(_) => {
                "Sorry, I'm having trouble looking that up right now.".to_string()
            }
            Self::SessionNotFound(_) | Self::ToolNotFound(_) | Self::SessionClosed(_) => {
                "Sorry, something went wrong on my end. Let's start again.".to_string()
            }
        }
    }
}

/// Errors from a persistence gateway.
#[derive(Debug, Error)]
pub enum PersistenceError {
    /// Filesystem write or publish failed.
    #[error("artifact io error: {0}")]
    Io(#[from] std::io::Error),

    /// The snapshot could not be serialized.
    #[error("snapshot serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A database statement failed.
    #[error("commit database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// No pooled connection was available.
    #[error("commit connection pool error: {0}")]
    Pool(#[from] r2d2::Error),

    /// The sink refused the snapshot.
    #[error("commit rejected: {0}")]
    Rejected(String),
}

/// Errors from building a tool registry.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// A tool with this name is already registered.
    #[error("duplicate tool name: {0}")]
    DuplicateName(String),
}
