//! Session records and the domain contract they are parameterised by.

use chrono::{DateTime, Utc};
use parley_types::SessionId;
use serde::Serialize;

use crate::error::DialogueError;
use crate::persist::CommitOutcome;
use crate::phase::Phase;

/// A dialogue domain: its phase graph, typed payload, and the reference
/// data injected into its sessions.
pub trait Domain: Sized + Send + Sync + 'static {
    /// Short domain label used in logs and artifact names.
    const NAME: &'static str;

    /// Workflow cursor.
    type Phase: Phase;

    /// Strongly typed task state, built eagerly for every session.
    type Payload: Clone + std::fmt::Debug + Serialize + Send + Sync + 'static;

    /// Read-only reference data (catalogs, scenario lists, stores).
    type Refs: Send + Sync + 'static;

    /// Builds the payload for a fresh or reset session.
    fn initial_payload(refs: &Self::Refs) -> Self::Payload;

    /// Human-meaningful label for artifact names, such as a customer name.
    fn commit_label(_payload: &Self::Payload) -> Option<String> {
        None
    }
}

/// A nullable payload field that cannot be unset once filled.
///
/// A `Slot` can be overwritten with a new value but offers no way back to
/// empty. Only a session reset, which rebuilds the whole payload, clears it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Slot<T>(Option<T>);

impl<T> Default for Slot<T> {
    fn default() -> Self {
        Self(None)
    }
}

impl<T> Slot<T> {
    /// An unfilled slot.
    pub fn empty() -> Self {
        Self(None)
    }

    /// Stores `value`, returning the previous value if there was one.
    pub fn fill(&mut self, value: T) -> Option<T> {
        self.0.replace(value)
    }

    /// The current value.
    pub fn get(&self) -> Option<&T> {
        self.0.as_ref()
    }

    /// Whether a value has been stored.
    pub fn is_set(&self) -> bool {
        self.0.is_some()
    }
}

/// Kind of a history entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HistoryKind {
    /// The session was created.
    Created,
    /// The session was reset to its initial phase.
    Reset,
    /// The phase cursor moved.
    PhaseChanged,
    /// A mutating tool completed.
    Tool,
    /// A domain-specific note.
    Note,
    /// The terminal commit succeeded.
    Committed,
    /// The terminal commit failed.
    CommitFailed,
}

/// One append-only history record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HistoryEntry {
    /// When the entry was appended.
    pub at: DateTime<Utc>,
    /// What happened.
    pub kind: HistoryKind,
    /// Free-form detail.
    pub note: String,
}

/// One live conversation's state.
pub struct Session<D: Domain> {
    id: SessionId,
    phase: D::Phase,
    payload: D::Payload,
    history: Vec<HistoryEntry>,
    created_at: DateTime<Utc>,
    completed_at: Option<DateTime<Utc>>,
    generation: u32,
    commit: Option<CommitOutcome>,
}

impl<D: Domain> Clone for Session<D> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            phase: self.phase,
            payload: self.payload.clone(),
            history: self.history.clone(),
            created_at: self.created_at,
            completed_at: self.completed_at,
            generation: self.generation,
            commit: self.commit.clone(),
        }
    }
}

impl<D: Domain> std::fmt::Debug for Session<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("domain", &D::NAME)
            .field("id", &self.id)
            .field("phase", &self.phase)
            .field("payload", &self.payload)
            .field("generation", &self.generation)
            .field("history_len", &self.history.len())
            .finish()
    }
}

impl<D: Domain> Session<D> {
    pub(crate) fn new(id: SessionId, refs: &D::Refs) -> Self {
        let now = Utc::now();
        Self {
            id,
            phase: D::Phase::INITIAL,
            payload: D::initial_payload(refs),
            history: vec![HistoryEntry {
                at: now,
                kind: HistoryKind::Created,
                note: format!("{} session opened", D::NAME),
            }],
            created_at: now,
            completed_at: None,
            generation: 0,
            commit: None,
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn phase(&self) -> D::Phase {
        self.phase
    }

    pub fn payload(&self) -> &D::Payload {
        &self.payload
    }

    pub fn payload_mut(&mut self) -> &mut D::Payload {
        &mut self.payload
    }

    pub fn history(&self) -> &[HistoryEntry] {
        &self.history
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn completed_at(&self) -> Option<DateTime<Utc>> {
        self.completed_at
    }

    /// Number of resets this session has seen.
    pub fn generation(&self) -> u32 {
        self.generation
    }

    /// Outcome of this generation's terminal commit, if one was attempted.
    pub fn commit_outcome(&self) -> Option<&CommitOutcome> {
        self.commit.as_ref()
    }

    pub fn is_complete(&self) -> bool {
        self.phase.is_terminal()
    }

    /// Moves the phase cursor to `next`.
    ///
    /// Entering a terminal phase stamps `completed_at` the first time only.
    ///
    /// # Errors
    ///
    /// Returns `DialogueError::InvalidTransition` if `next` is not a legal
    /// successor; the session is left unchanged.
    pub fn advance(&mut self, next: D::Phase) -> Result<(), DialogueError> {
        let from = self.phase;
        if !from.can_advance_to(next) {
            return Err(DialogueError::InvalidTransition {
                from: from.as_str(),
                to: next.as_str(),
            });
        }

        self.phase = next;
        if next.is_terminal() && self.completed_at.is_none() {
            self.completed_at = Some(Utc::now());
        }
        self.record(
            HistoryKind::PhaseChanged,
            format!("{} -> {}", from.as_str(), next.as_str()),
        );
        Ok(())
    }

    /// Appends a domain note to the history.
    pub fn note(&mut self, note: impl Into<String>) {
        self.record(HistoryKind::Note, note);
    }

    pub(crate) fn record(&mut self, kind: HistoryKind, note: impl Into<String>) {
        self.history.push(HistoryEntry {
            at: Utc::now(),
            kind,
            note: note.into(),
        });
    }

    /// Re-initializes phase and payload and starts a new generation.
    ///
    /// The id, `created_at` and history survive; a reset entry is appended.
    pub(crate) fn reset(&mut self, refs: &D::Refs) {
        self.phase = D::Phase::INITIAL;
        self.payload = D::initial_payload(refs);
        self.completed_at = None;
        self.commit = None;
        self.generation += 1;
        self.record(
            HistoryKind::Reset,
            format!("restarted as generation {}", self.generation),
        );
    }

    pub(crate) fn set_commit(&mut self, outcome: CommitOutcome) {
        match &outcome {
            CommitOutcome::Saved(location) => {
                self.record(HistoryKind::Committed, location.to_string())
            }
            CommitOutcome::Failed(reason) => self.record(HistoryKind::CommitFailed, reason.clone()),
        }
        self.commit = Some(outcome);
    }

    /// Borrowed, serializable view of the session for persistence.
    pub fn snapshot(&self) -> SessionSnapshot<'_, D::Payload> {
        SessionSnapshot {
            domain: D::NAME,
            session_id: self.id,
            generation: self.generation,
            phase: self.phase.as_str(),
            created_at: self.created_at,
            completed_at: self.completed_at,
            payload: &self.payload,
            history: &self.history,
        }
    }
}

/// Self-describing persisted form of a session.
#[derive(Debug, Serialize)]
pub struct SessionSnapshot<'a, P: Serialize> {
    pub domain: &'static str,
    pub session_id: SessionId,
    pub generation: u32,
    pub phase: &'static str,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub payload: &'a P,
    pub history: &'a [HistoryEntry],
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{Ticket, TicketPhase};

    #[test]
    fn slot_fills_and_overwrites_but_never_clears() {
        let mut slot: Slot<String> = Slot::empty();
        assert!(!slot.is_set());
        assert_eq!(slot.fill("a".into()), None);
        assert_eq!(slot.fill("b".into()), Some("a".into()));
        assert_eq!(slot.get().map(String::as_str), Some("b"));
    }

    #[test]
    fn slot_serializes_as_nullable_value() {
        let empty: Slot<u32> = Slot::empty();
        let mut full: Slot<u32> = Slot::empty();
        full.fill(7);
        assert_eq!(serde_json::to_string(&empty).unwrap(), "null");
        assert_eq!(serde_json::to_string(&full).unwrap(), "7");
    }

    #[test]
    fn advance_rejects_jumps_and_leaves_state() {
        let mut session = Session::<Ticket>::new(SessionId::new(), &());
        let err = session
            .advance(TicketPhase::Closed)
            .expect_err("open -> closed skips drafting");
        assert!(matches!(
            err,
            DialogueError::InvalidTransition {
                from: "open",
                to: "closed"
            }
        ));
        assert_eq!(session.phase(), TicketPhase::Open);
        assert_eq!(session.history().len(), 1);
    }

    #[test]
    fn terminal_entry_stamps_completion_once() {
        let mut session = Session::<Ticket>::new(SessionId::new(), &());
        session.advance(TicketPhase::Drafting).unwrap();
        session.advance(TicketPhase::Closed).unwrap();
        let first = session.completed_at().expect("completion stamped");

        session.advance(TicketPhase::Open).expect("restart is always legal");
        session.advance(TicketPhase::Drafting).unwrap();
        session.advance(TicketPhase::Closed).unwrap();
        assert_eq!(session.completed_at(), Some(first));
    }

    #[test]
    fn reset_keeps_identity_and_appends_history() {
        let mut session = Session::<Ticket>::new(SessionId::new(), &());
        let id = session.id();
        let created = session.created_at();
        session.payload_mut().title.fill("printer".into());
        session.advance(TicketPhase::Drafting).unwrap();

        session.reset(&());

        assert_eq!(session.id(), id);
        assert_eq!(session.created_at(), created);
        assert_eq!(session.phase(), TicketPhase::Open);
        assert!(!session.payload().title.is_set());
        assert_eq!(session.generation(), 1);
        let kinds: Vec<HistoryKind> = session.history().iter().map(|h| h.kind).collect();
        assert_eq!(
            kinds,
            vec![
                HistoryKind::Created,
                HistoryKind::PhaseChanged,
                HistoryKind::Reset
            ]
        );
    }

    #[test]
    fn snapshot_is_field_named() {
        let mut session = Session::<Ticket>::new(SessionId::new(), &());
        session.payload_mut().title.fill("printer".into());
        let value = serde_json::to_value(session.snapshot()).unwrap();
        assert_eq!(value["domain"], "ticket");
        assert_eq!(value["phase"], "open");
        assert_eq!(value["payload"]["title"], "printer");
        assert_eq!(value["history"][0]["kind"], "created");
        assert!(value["completed_at"].is_null());
    }
}
