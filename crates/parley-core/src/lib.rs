//! Per-session dialogue orchestration for the Parley voice agents.
//!
//! Every Parley agent is a thin shell around a speech pipeline. What they
//! share is the orchestrator implemented here: session-scoped state, a
//! registry of schema-validated tools a decision source may call, strictly
//! serialized execution per session, and a one-time durable commit when a
//! session reaches its terminal phase.
//!
//! # Components
//!
//! | Component | Type |
//! |-----------|------|
//! | Session Store | [`SessionStore`] owns every [`Session`] and its phase cursor |
//! | Tool Registry | [`ToolRegistry`] maps names to [`ToolDescriptor`]s and validates parameters |
//! | Dispatcher | [`Dispatcher`] runs one tool at a time per session |
//! | Turn Processor | [`TurnProcessor`] turns an utterance into at most one transition and one reply |
//! | Persistence Gateway | [`PersistenceGateway`] with [`JsonFileGateway`] and [`SqliteGateway`] sinks |
//! | Session Worker | [`SessionWorker`] drains a per-session transcript queue |
//!
//! # Usage
//!
//! ```rust,ignore
//! let store = Arc::new(SessionStore::<Coffee>::new(()));
//! let dispatcher = Dispatcher::new(store, Arc::new(coffee::registry()?), gateway);
//! let processor = TurnProcessor::new(dispatcher);
//!
//! let (session_id, greeting) = processor.open_session();
//! let reply = processor.process_turn(session_id, "latte").await?;
//! ```

mod dispatcher;
mod error;
pub mod normalize;
mod persist;
mod phase;
mod registry;
mod session;
mod store;
mod turn;
mod worker;

pub use dispatcher::{Dispatcher, Route, ToolResult};
pub use error::{DialogueError, PersistenceError, RegistryError};
pub use persist::{
    artifact_stem, sanitize_label, CommitOutcome, JsonFileGateway, Location, PersistenceGateway,
    SqliteGateway,
};
pub use phase::Phase;
pub use registry::{ParamKind, ParamSpec, Params, ToolDescriptor, ToolRegistry};
pub use session::{Domain, HistoryEntry, HistoryKind, Session, SessionSnapshot, Slot};
pub use store::SessionStore;
pub use turn::{Conversational, TurnProcessor};
pub use worker::{Reply, SessionWorker};

pub use parley_types::{SessionId, ToolEffects, Transcript};

#[cfg(test)]
mod testing;
