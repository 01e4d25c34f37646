//! A small help-desk ticket domain used by the unit tests in this crate.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use serde::Serialize;

use crate::error::{DialogueError, PersistenceError};
use crate::persist::{Location, PersistenceGateway};
use crate::phase::Phase;
use crate::registry::{ParamSpec, ToolDescriptor, ToolRegistry};
use crate::session::{Domain, Session, Slot};
use crate::ToolEffects;

#[derive(Debug)]
pub struct Ticket;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TicketPhase {
    Open,
    Drafting,
    Closed,
}

impl Phase for TicketPhase {
    const INITIAL: Self = Self::Open;

    fn successors(self) -> &'static [Self] {
        match self {
            Self::Open => &[Self::Drafting],
            Self::Drafting => &[Self::Closed],
            Self::Closed => &[],
        }
    }

    fn is_terminal(self) -> bool {
        matches!(self, Self::Closed)
    }

    fn as_str(self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Drafting => "drafting",
            Self::Closed => "closed",
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct TicketPayload {
    pub title: Slot<String>,
    pub count: i64,
}

impl Domain for Ticket {
    const NAME: &'static str = "ticket";
    type Phase = TicketPhase;
    type Payload = TicketPayload;
    type Refs = ();

    fn initial_payload(_refs: &()) -> TicketPayload {
        TicketPayload::default()
    }

    fn commit_label(payload: &TicketPayload) -> Option<String> {
        payload.title.get().cloned()
    }
}

pub fn ticket_registry() -> ToolRegistry<Ticket> {
    let mut registry = ToolRegistry::new();
    let tools = [
        ToolDescriptor::new(
            "set_title",
            "Record the ticket title and start drafting.",
            ToolEffects::MUTATES,
            |session: &mut Session<Ticket>, params, _| {
                let title = params.text("title")?.to_string();
                session.payload_mut().title.fill(title.clone());
                if session.phase() == TicketPhase::Open {
                    session.advance(TicketPhase::Drafting)?;
                }
                Ok(format!("Title set to {title}."))
            },
        )
        .param(ParamSpec::string("title", "Ticket title")),
        ToolDescriptor::new(
            "increment",
            "Add to the counter.",
            ToolEffects::MUTATES,
            |session: &mut Session<Ticket>, params, _| {
                let by = params.integer("by")?;
                session.payload_mut().count += by;
                Ok(format!("Count is {}.", session.payload().count))
            },
        )
        .param(
            ParamSpec::integer("by", "Amount to add")
                .bounded(1, 10)
                .with_default(1),
        ),
        ToolDescriptor::new(
            "close",
            "Close the ticket.",
            ToolEffects::MUTATES.writing_storage(),
            |session: &mut Session<Ticket>, _, _| {
                if !session.payload().title.is_set() {
                    return Err(DialogueError::precondition("The ticket needs a title first."));
                }
                session.advance(TicketPhase::Closed)?;
                Ok("Ticket closed.".to_string())
            },
        ),
        ToolDescriptor::new(
            "scribble_then_refuse",
            "Mutates the working copy, then fails.",
            ToolEffects::MUTATES,
            |session: &mut Session<Ticket>, _, _| {
                session.payload_mut().count += 100;
                session.note("scribbled");
                Err(DialogueError::precondition("Not today."))
            },
        ),
        ToolDescriptor::new(
            "explode",
            "Panics inside the handler.",
            ToolEffects::MUTATES,
            |_: &mut Session<Ticket>, _, _| panic!("handler blew up"),
        ),
    ];

    for tool in tools {
        registry.register(tool).expect("ticket tools have unique names");
    }
    registry
}

/// Gateway that counts commits and can be told to fail.
#[derive(Debug, Default)]
pub struct CountingGateway {
    pub commits: AtomicUsize,
    pub fail: bool,
}

impl CountingGateway {
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            commits: AtomicUsize::new(0),
            fail: true,
        })
    }

    pub fn count(&self) -> usize {
        self.commits.load(Ordering::SeqCst)
    }
}

impl<D: Domain> PersistenceGateway<D> for CountingGateway {
    fn commit(&self, session: &Session<D>) -> Result<Location, PersistenceError> {
        let n = self.commits.fetch_add(1, Ordering::SeqCst) + 1;
        if self.fail {
            return Err(PersistenceError::Rejected("sink offline".into()));
        }
        Ok(Location::Row {
            table: "memory".into(),
            key: format!("{}-{}", session.id().short(), n),
        })
    }
}
