//! Startup and run errors for the worker binary.

use parley_agents::{FraudStoreError, ReferenceDataError};
use parley_core::{DialogueError, RegistryError};
use parley_db::{MigrationError, PoolError};
use thiserror::Error;

use crate::config::ConfigError;

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("database pool: {0}")]
    Pool(#[from] PoolError),

    #[error("database connection: {0}")]
    Connection(#[from] r2d2::Error),

    #[error("database migrations: {0}")]
    Migration(#[from] MigrationError),

    #[error(transparent)]
    Reference(#[from] ReferenceDataError),

    #[error("tool registry: {0}")]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    FraudStore(#[from] FraudStoreError),

    #[error("session: {0}")]
    Dialogue(#[from] DialogueError),
}
