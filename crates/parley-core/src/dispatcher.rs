//! Tool dispatch with strictly serialized execution per session.
//!
//! An invocation takes the session's execution slot (its async mutex), then
//! runs the handler on the blocking pool against a working copy of the
//! session while the slot stays held. Only a successful handler's working copy replaces the stored
//! session, so a failed call leaves no trace. If the call moves the session
//! into a terminal phase for the first time in its generation, the commit
//! through the persistence gateway happens before the slot is released.

use std::sync::Arc;

use parley_types::SessionId;
use serde_json::Value;

use crate::error::DialogueError;
use crate::persist::{CommitOutcome, PersistenceGateway};
use crate::phase::Phase;
use crate::registry::{Params, ToolDescriptor, ToolRegistry};
use crate::session::{Domain, HistoryKind, Session};
use crate::store::SessionStore;

/// Outcome of one dispatched call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolResult {
    /// Tool that ran, or `None` when the route answered directly.
    pub tool: Option<&'static str>,
    /// Text for the decision source, annotated with the commit outcome.
    pub text: String,
    /// Phase after the call.
    pub phase: &'static str,
    /// Whether the session is in a terminal phase after the call.
    pub completed: bool,
    /// Commit attempted by this call, if any.
    pub commit: Option<CommitOutcome>,
}

/// What to do with a session, decided while holding its slot.
#[derive(Debug, Clone, PartialEq)]
pub enum Route {
    /// Invoke a registered tool with raw parameters.
    Invoke { tool: &'static str, params: Value },
    /// Answer without touching the session.
    Reply(String),
}

/// Runs tools against sessions of one domain.
pub struct Dispatcher<D: Domain> {
    store: Arc<SessionStore<D>>,
    registry: Arc<ToolRegistry<D>>,
    gateway: Arc<dyn PersistenceGateway<D>>,
}

impl<D: Domain> Clone for Dispatcher<D> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            registry: Arc::clone(&self.registry),
            gateway: Arc::clone(&self.gateway),
        }
    }
}

impl<D: Domain> Dispatcher<D> {
    pub fn new(
        store: Arc<SessionStore<D>>,
        registry: Arc<ToolRegistry<D>>,
        gateway: Arc<dyn PersistenceGateway<D>>,
    ) -> Self {
        Self {
            store,
            registry,
            gateway,
        }
    }

    pub fn store(&self) -> &Arc<SessionStore<D>> {
        &self.store
    }

    pub fn registry(&self) -> &Arc<ToolRegistry<D>> {
        &self.registry
    }

    /// Validates `params` and runs the named tool against the session.
    ///
    /// Calls on the same session run one at a time in arrival order; calls
    /// on different sessions run in parallel.
    ///
    /// # Errors
    ///
    /// - `SessionNotFound` / `ToolNotFound` for unknown targets.
    /// - `Validation` when the parameters do not match the schema; the
    ///   session is not touched.
    /// - Whatever the handler returns; the session is not touched.
    /// - `SessionClosed` if the handler panicked; the session is dropped.
    pub async fn invoke(
        &self,
        id: SessionId,
        tool: &str,
        params: &Value,
    ) -> Result<ToolResult, DialogueError> {
        self.store.slot(id)?;
        let descriptor = self.registry.resolve(tool)?;
        let params = self.registry.validate(tool, params)?;

        self.execute(id, move |session, refs, gateway| {
            run_tool(session, &descriptor, &params, refs, gateway)
        })
        .await
    }

    /// Lets `route` inspect the session under its slot and choose what to
    /// run, then runs it within the same slot acquisition.
    pub async fn invoke_routed<F>(&self, id: SessionId, route: F) -> Result<ToolResult, DialogueError>
    where
        F: FnOnce(&Session<D>) -> Route + Send + 'static,
    {
        let registry = Arc::clone(&self.registry);
        self.execute(id, move |session, refs, gateway| match route(session) {
            Route::Reply(text) => Ok(ToolResult {
                tool: None,
                text,
                phase: session.phase().as_str(),
                completed: session.is_complete(),
                commit: None,
            }),
            Route::Invoke { tool, params } => {
                let descriptor = registry.resolve(tool)?;
                let params = registry.validate(tool, &params)?;
                run_tool(session, &descriptor, &params, refs, gateway)
            }
        })
        .await
    }

    /// Resets the session through its slot, after any queued calls.
    pub async fn reset(&self, id: SessionId) -> Result<(), DialogueError> {
        self.store.reset(id).await
    }

    async fn execute<F>(&self, id: SessionId, work: F) -> Result<ToolResult, DialogueError>
    where
        F: FnOnce(&mut Session<D>, &D::Refs, &dyn PersistenceGateway<D>) -> Result<ToolResult, DialogueError>
            + Send
            + 'static,
    {
        let mut session = self.store.lock(id).await?;
        let mut working = session.clone();
        let refs = Arc::clone(self.store.refs());
        let gateway = Arc::clone(&self.gateway);

        // The slot stays held here, so a panic closes the session before
        // any queued caller can take it.
        let joined = tokio::task::spawn_blocking(move || {
            let result = work(&mut working, refs.as_ref(), gateway.as_ref());
            (working, result)
        })
        .await;

        match joined {
            Ok((working, Ok(result))) => {
                *session = working;
                Ok(result)
            }
            Ok((_, Err(err))) => {
                tracing::debug!(
                    domain = D::NAME,
                    session_id = %id,
                    error = %err,
                    "tool call failed"
                );
                Err(err)
            }
            Err(join_err) => {
                tracing::error!(
                    domain = D::NAME,
                    session_id = %id,
                    error = %join_err,
                    "tool handler aborted, closing session"
                );
                self.store.close(id);
                drop(session);
                Err(DialogueError::SessionClosed(id))
            }
        }
    }
}

fn run_tool<D: Domain>(
    session: &mut Session<D>,
    tool: &ToolDescriptor<D>,
    params: &Params,
    refs: &D::Refs,
    gateway: &dyn PersistenceGateway<D>,
) -> Result<ToolResult, DialogueError> {
    let mut text = tool.call(session, params, refs)?;

    if tool.effects().mutates_session {
        session.record(HistoryKind::Tool, tool.name());
    }

    let mut commit = None;
    if session.is_complete() && session.commit_outcome().is_none() {
        let outcome = match gateway.commit(session) {
            Ok(location) => CommitOutcome::Saved(location),
            Err(err) => {
                tracing::warn!(
                    domain = D::NAME,
                    session_id = %session.id(),
                    generation = session.generation(),
                    error = %err,
                    "terminal commit failed"
                );
                CommitOutcome::Failed(err.to_string())
            }
        };
        text = annotate(text, &outcome);
        session.set_commit(outcome.clone());
        commit = Some(outcome);
    }

    tracing::debug!(
        domain = D::NAME,
        session_id = %session.id(),
        tool = tool.name(),
        phase = session.phase().as_str(),
        "tool call completed"
    );

    Ok(ToolResult {
        tool: Some(tool.name()),
        text,
        phase: session.phase().as_str(),
        completed: session.is_complete(),
        commit,
    })
}

fn annotate(text: String, outcome: &CommitOutcome) -> String {
    match outcome {
        CommitOutcome::Saved(location) => format!("{text} (saved to {location})"),
        CommitOutcome::Failed(_) => {
            format!("{text} I couldn't save a record of this just now, so please keep a note of it.")
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, Instant};

    use serde_json::json;

    use super::*;
    use crate::testing::{ticket_registry, CountingGateway, Ticket, TicketPhase};
    use crate::ToolEffects;

    fn dispatcher_with(gateway: Arc<CountingGateway>) -> Dispatcher<Ticket> {
        Dispatcher::new(
            Arc::new(SessionStore::new(())),
            Arc::new(ticket_registry()),
            gateway,
        )
    }

    async fn close_ticket(dispatcher: &Dispatcher<Ticket>, id: SessionId) -> ToolResult {
        dispatcher
            .invoke(id, "set_title", &json!({ "title": "printer" }))
            .await
            .expect("title should be accepted");
        dispatcher
            .invoke(id, "close", &json!({}))
            .await
            .expect("close should succeed")
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_calls_on_one_session_lose_no_updates() {
        let dispatcher = dispatcher_with(CountingGateway::shared());
        let id = dispatcher.store().create();

        let mut handles = Vec::new();
        for _ in 0..50 {
            let dispatcher = dispatcher.clone();
            handles.push(tokio::spawn(async move {
                dispatcher
                    .invoke(id, "increment", &json!({ "by": 1 }))
                    .await
            }));
        }
        for handle in handles {
            handle.await.unwrap().expect("increment should succeed");
        }

        let session = dispatcher.store().get(id).await.unwrap();
        assert_eq!(session.payload().count, 50);
    }

    #[tokio::test]
    async fn failed_handler_leaves_session_untouched() {
        let dispatcher = dispatcher_with(CountingGateway::shared());
        let id = dispatcher.store().create();
        let before = dispatcher.store().get(id).await.unwrap();

        let err = dispatcher
            .invoke(id, "scribble_then_refuse", &json!({}))
            .await
            .expect_err("handler refuses");
        assert!(matches!(err, DialogueError::PreconditionFailed(msg) if msg == "Not today."));

        let after = dispatcher.store().get(id).await.unwrap();
        assert_eq!(after.payload().count, before.payload().count);
        assert_eq!(after.history().len(), before.history().len());
    }

    #[tokio::test]
    async fn invalid_parameters_never_reach_the_handler() {
        let dispatcher = dispatcher_with(CountingGateway::shared());
        let id = dispatcher.store().create();

        let err = dispatcher
            .invoke(id, "set_title", &json!({ "title": "" }))
            .await
            .expect_err("blank title");
        assert!(matches!(err, DialogueError::Validation(_)));

        let session = dispatcher.store().get(id).await.unwrap();
        assert_eq!(session.phase(), TicketPhase::Open);
        assert_eq!(session.history().len(), 1);
    }

    #[tokio::test]
    async fn unknown_targets_are_reported() {
        let dispatcher = dispatcher_with(CountingGateway::shared());
        let id = dispatcher.store().create();

        assert!(matches!(
            dispatcher.invoke(id, "reopen", &json!({})).await,
            Err(DialogueError::ToolNotFound(_))
        ));
        assert!(matches!(
            dispatcher.invoke(SessionId::new(), "close", &json!({})).await,
            Err(DialogueError::SessionNotFound(_))
        ));
    }

    #[tokio::test]
    async fn terminal_entry_commits_exactly_once() {
        let gateway = CountingGateway::shared();
        let dispatcher = dispatcher_with(gateway.clone());
        let id = dispatcher.store().create();

        let result = close_ticket(&dispatcher, id).await;
        assert!(result.completed);
        assert!(matches!(result.commit, Some(CommitOutcome::Saved(_))));
        assert!(result.text.contains("(saved to memory#"));

        // Calls after completion do not commit again.
        dispatcher
            .invoke(id, "increment", &json!({}))
            .await
            .unwrap();
        assert_eq!(gateway.count(), 1);

        let session = dispatcher.store().get(id).await.unwrap();
        assert!(session.commit_outcome().is_some_and(CommitOutcome::is_saved));
        assert!(session
            .history()
            .iter()
            .any(|h| h.kind == HistoryKind::Committed));
    }

    #[tokio::test]
    async fn reset_opens_a_new_commit_generation() {
        let gateway = CountingGateway::shared();
        let dispatcher = dispatcher_with(gateway.clone());
        let id = dispatcher.store().create();

        close_ticket(&dispatcher, id).await;
        dispatcher.reset(id).await.unwrap();
        close_ticket(&dispatcher, id).await;

        assert_eq!(gateway.count(), 2);
        let session = dispatcher.store().get(id).await.unwrap();
        assert_eq!(session.generation(), 1);
    }

    #[tokio::test]
    async fn failed_commit_is_reported_not_retried() {
        let gateway = CountingGateway::failing();
        let dispatcher = dispatcher_with(gateway.clone());
        let id = dispatcher.store().create();

        let result = close_ticket(&dispatcher, id).await;
        assert!(result.completed);
        assert!(matches!(result.commit, Some(CommitOutcome::Failed(_))));
        assert!(result.text.starts_with("Ticket closed."));
        assert!(result.text.contains("couldn't save a record"));

        dispatcher.invoke(id, "increment", &json!({})).await.unwrap();
        assert_eq!(gateway.count(), 1);

        let session = dispatcher.store().get(id).await.unwrap();
        assert_eq!(session.phase(), TicketPhase::Closed);
        assert!(session
            .history()
            .iter()
            .any(|h| h.kind == HistoryKind::CommitFailed));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn panicking_handler_closes_only_its_session() {
        let dispatcher = dispatcher_with(CountingGateway::shared());
        let doomed = dispatcher.store().create();
        let healthy = dispatcher.store().create();

        let err = dispatcher
            .invoke(doomed, "explode", &json!({}))
            .await
            .expect_err("handler panics");
        assert!(matches!(err, DialogueError::SessionClosed(id) if id == doomed));
        assert!(matches!(
            dispatcher.store().get(doomed).await,
            Err(DialogueError::SessionNotFound(_))
        ));

        dispatcher
            .invoke(healthy, "increment", &json!({}))
            .await
            .expect("other sessions keep working");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn calls_queued_behind_a_panic_are_rejected() {
        let dispatcher = dispatcher_with(CountingGateway::shared());
        let id = dispatcher.store().create();

        let slot = dispatcher.store().slot(id).unwrap();
        let held = slot.lock().await;

        let exploder = {
            let dispatcher = dispatcher.clone();
            tokio::spawn(async move { dispatcher.invoke(id, "explode", &json!({})).await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;
        let incrementer = {
            let dispatcher = dispatcher.clone();
            tokio::spawn(async move {
                dispatcher
                    .invoke(id, "increment", &json!({ "by": 3 }))
                    .await
            })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;
        drop(held);

        assert!(matches!(
            exploder.await.unwrap(),
            Err(DialogueError::SessionClosed(closed)) if closed == id
        ));
        assert!(matches!(
            incrementer.await.unwrap(),
            Err(DialogueError::SessionClosed(closed)) if closed == id
        ));
        assert_eq!(dispatcher.store().len(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn distinct_sessions_run_in_parallel() {
        let mut registry = ticket_registry();
        registry
            .register(ToolDescriptor::new(
                "nap",
                "Sleeps briefly.",
                ToolEffects::READ_ONLY,
                |_: &mut Session<Ticket>, _, _| {
                    std::thread::sleep(Duration::from_millis(200));
                    Ok("Rested.".to_string())
                },
            ))
            .unwrap();
        let dispatcher = Dispatcher::new(
            Arc::new(SessionStore::<Ticket>::new(())),
            Arc::new(registry),
            CountingGateway::shared(),
        );

        let ids: Vec<SessionId> = (0..4).map(|_| dispatcher.store().create()).collect();
        let started = Instant::now();
        let mut handles = Vec::new();
        for id in ids {
            let dispatcher = dispatcher.clone();
            handles.push(tokio::spawn(async move {
                dispatcher.invoke(id, "nap", &json!({})).await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }
        assert!(started.elapsed() < Duration::from_millis(700));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn reset_is_ordered_with_queued_calls() {
        let dispatcher = dispatcher_with(CountingGateway::shared());
        let id = dispatcher.store().create();
        dispatcher
            .invoke(id, "increment", &json!({ "by": 5 }))
            .await
            .unwrap();

        // Hold the slot so the reset and the increment queue up behind it.
        let slot = dispatcher.store().slot(id).unwrap();
        let held = slot.lock().await;

        let resetter = {
            let dispatcher = dispatcher.clone();
            tokio::spawn(async move { dispatcher.reset(id).await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;
        let incrementer = {
            let dispatcher = dispatcher.clone();
            tokio::spawn(async move { dispatcher.invoke(id, "increment", &json!({})).await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;
        drop(held);

        resetter.await.unwrap().unwrap();
        incrementer.await.unwrap().unwrap();

        let session = dispatcher.store().get(id).await.unwrap();
        assert_eq!(session.generation(), 1);
        assert_eq!(session.payload().count, 1);
    }

    #[tokio::test]
    async fn routed_reply_does_not_touch_the_session() {
        let dispatcher = dispatcher_with(CountingGateway::shared());
        let id = dispatcher.store().create();

        let result = dispatcher
            .invoke_routed(id, |session| {
                Route::Reply(format!("phase is {}", session.phase().as_str()))
            })
            .await
            .unwrap();
        assert_eq!(result.tool, None);
        assert_eq!(result.text, "phase is open");

        let result = dispatcher
            .invoke_routed(id, |_| Route::Invoke {
                tool: "set_title",
                params: json!({ "title": "router" }),
            })
            .await
            .unwrap();
        assert_eq!(result.tool, Some("set_title"));
        assert_eq!(result.phase, "drafting");
    }
}
