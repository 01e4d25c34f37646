//! Per-session ordered transcript queue and the task that drains it.

use std::sync::Arc;

use parley_types::{SessionId, Transcript};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::error::DialogueError;
use crate::turn::{Conversational, TurnProcessor};

const QUEUE_CAPACITY: usize = 64;

/// A reply ready for speech synthesis.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub session_id: SessionId,
    pub text: String,
}

/// Owns the inbound queue of one session.
///
/// Transcripts submitted here are processed strictly in submission order by
/// a single task; replies go out on the channel given at spawn.
#[derive(Debug)]
pub struct SessionWorker {
    session_id: SessionId,
    tx: mpsc::Sender<Transcript>,
    handle: JoinHandle<()>,
}

impl SessionWorker {
    /// Starts the drain task for `session_id`.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn<D: Conversational>(
        processor: Arc<TurnProcessor<D>>,
        session_id: SessionId,
        replies: mpsc::Sender<Reply>,
    ) -> Self {
        let (tx, mut rx) = mpsc::channel::<Transcript>(QUEUE_CAPACITY);

        let handle = tokio::spawn(async move {
            tracing::debug!(domain = D::NAME, %session_id, "session worker started");
            while let Some(transcript) = rx.recv().await {
                let Some(utterance) = transcript.actionable() else {
                    continue;
                };

                match processor.process_turn(session_id, utterance).await {
                    Ok(Some(text)) => {
                        if replies.send(Reply { session_id, text }).await.is_err() {
                            tracing::debug!(%session_id, "reply channel closed, stopping worker");
                            break;
                        }
                    }
                    Ok(None) => {}
                    Err(err) => {
                        tracing::warn!(
                            domain = D::NAME,
                            %session_id,
                            error = %err,
                            "session worker stopping"
                        );
                        break;
                    }
                }
            }
            tracing::debug!(domain = D::NAME, %session_id, "session worker finished");
        });

        Self {
            session_id,
            tx,
            handle,
        }
    }

    pub fn session_id(&self) -> SessionId {
        self.session_id
    }

    /// Enqueues a transcript. Interim transcripts are dropped here.
    ///
    /// # Errors
    ///
    /// Returns `DialogueError::SessionClosed` once the drain task has stopped.
    pub async fn submit(&self, transcript: Transcript) -> Result<(), DialogueError> {
        if !transcript.is_final {
            return Ok(());
        }
        self.tx
            .send(transcript)
            .await
            .map_err(|_| DialogueError::SessionClosed(self.session_id))
    }

    /// Closes the queue and waits for queued transcripts to drain.
    pub async fn shutdown(self) {
        let Self {
            session_id,
            tx,
            handle,
        } = self;
        drop(tx);
        if let Err(err) = handle.await {
            tracing::error!(%session_id, error = %err, "session worker task failed");
        }
    }
}
