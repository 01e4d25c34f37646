//! Test harness shared by the agent modules.

use std::sync::{Arc, Mutex};

use parley_core::{
    Dispatcher, Domain, Location, PersistenceError, PersistenceGateway, Session, SessionId,
    SessionStore, ToolRegistry, ToolResult,
};
use serde_json::Value;

/// Gateway that keeps every committed snapshot in memory.
#[derive(Debug, Default)]
pub struct RecordingGateway {
    snapshots: Mutex<Vec<Value>>,
}

impl RecordingGateway {
    pub fn snapshots(&self) -> Vec<Value> {
        self.snapshots.lock().unwrap().clone()
    }
}

impl<D: Domain> PersistenceGateway<D> for RecordingGateway {
    fn commit(&self, session: &Session<D>) -> Result<Location, PersistenceError> {
        let value = serde_json::to_value(session.snapshot())?;
        let mut snapshots = self.snapshots.lock().unwrap();
        snapshots.push(value);
        Ok(Location::Row {
            table: "memory".into(),
            key: snapshots.len().to_string(),
        })
    }
}

pub struct Harness<D: Domain> {
    pub dispatcher: Dispatcher<D>,
    pub gateway: Arc<RecordingGateway>,
    pub id: SessionId,
}

impl<D: Domain> Harness<D> {
    pub fn new(refs: D::Refs, registry: ToolRegistry<D>) -> Self {
        let gateway = Arc::new(RecordingGateway::default());
        let dispatcher = Dispatcher::new(
            Arc::new(SessionStore::new(refs)),
            Arc::new(registry),
            gateway.clone(),
        );
        let id = dispatcher.store().create();
        Self {
            dispatcher,
            gateway,
            id,
        }
    }

    pub async fn call(&self, tool: &str, params: Value) -> ToolResult {
        self.dispatcher
            .invoke(self.id, tool, &params)
            .await
            .unwrap_or_else(|err| panic!("{tool} should succeed: {err}"))
    }

    pub async fn fail(&self, tool: &str, params: Value) -> parley_core::DialogueError {
        match self.dispatcher.invoke(self.id, tool, &params).await {
            Ok(result) => panic!("{tool} should fail, got: {}", result.text),
            Err(err) => err,
        }
    }

    pub async fn session(&self) -> Session<D> {
        self.dispatcher.store().get(self.id).await.unwrap()
    }
}
