//! Turning utterances into tool calls and spoken replies.

use parley_types::SessionId;

use crate::dispatcher::{Dispatcher, Route, ToolResult};
use crate::error::DialogueError;
use crate::normalize::{ControlVocabulary, RESTART_VOCABULARY};
use crate::session::{Domain, Session};

/// A domain that can be driven directly by free-text utterances.
///
/// The router maps the session's current phase to the single tool that
/// accepts the utterance. Everything else (restart handling, post-completion
/// replies, error rendering) is shared.
pub trait Conversational: Domain {
    /// Utterances that reset the session from any phase.
    fn vocabulary() -> ControlVocabulary {
        RESTART_VOCABULARY
    }

    /// First line spoken when a session opens.
    fn greeting() -> &'static str;

    /// Reply after a control utterance reset the session.
    fn restart_reply() -> &'static str {
        Self::greeting()
    }

    /// Reply to any utterance once the session is complete.
    fn completed_reply() -> &'static str;

    /// Picks the tool for `utterance` given the session's phase.
    fn route(session: &Session<Self>, utterance: &str) -> Route;

    /// Renders a recoverable error in character.
    fn apologize(err: &DialogueError) -> String {
        err.spoken()
    }
}

/// Drives conversational sessions one utterance at a time.
pub struct TurnProcessor<D: Conversational> {
    dispatcher: Dispatcher<D>,
}

impl<D: Conversational> TurnProcessor<D> {
    pub fn new(dispatcher: Dispatcher<D>) -> Self {
        Self { dispatcher }
    }

    pub fn dispatcher(&self) -> &Dispatcher<D> {
        &self.dispatcher
    }

    /// Opens a session and returns its greeting.
    pub fn open_session(&self) -> (SessionId, &'static str) {
        (self.dispatcher.store().create(), D::greeting())
    }

    /// Processes one final utterance.
    ///
    /// Returns `Ok(None)` for blank utterances. Recoverable errors come back
    /// as an apologetic reply rather than an error.
    ///
    /// # Errors
    ///
    /// `SessionNotFound`, `ToolNotFound` and `SessionClosed` are returned as
    /// errors; they indicate wiring faults or a dead session.
    pub async fn process_turn(
        &self,
        id: SessionId,
        utterance: &str,
    ) -> Result<Option<String>, DialogueError> {
        let utterance = utterance.trim();
        if utterance.is_empty() {
            return Ok(None);
        }

        if D::vocabulary().matches(utterance) {
            self.dispatcher.reset(id).await?;
            tracing::debug!(domain = D::NAME, session_id = %id, "control utterance reset session");
            return Ok(Some(D::restart_reply().to_string()));
        }

        let owned = utterance.to_string();
        let outcome = self
            .dispatcher
            .invoke_routed(id, move |session| {
                if session.is_complete() {
                    Route::Reply(D::completed_reply().to_string())
                } else {
                    D::route(session, &owned)
                }
            })
            .await;

        match outcome {
            Ok(ToolResult { text, .. }) => Ok(Some(text)),
            Err(err) if err.is_caller_fault() => Err(err),
            Err(err) => {
                tracing::info!(
                    domain = D::NAME,
                    session_id = %id,
                    error = %err,
                    "turn rejected"
                );
                Ok(Some(D::apologize(&err)))
            }
        }
    }
}
