//! Database layer for the Parley agents.
//!
//! Provides SQLite connection pooling (via `r2d2`), WAL-mode initialization,
//! and embedded SQL migrations. The tabular sinks (session commit rows and
//! the fraud case store) are created through versioned migrations managed
//! by this crate.
//!
//! # Design decisions
//!
//! - **SQLite with WAL mode**: one database file shared by every session of
//!   a worker process. WAL allows concurrent readers with a single writer,
//!   and the busy timeout absorbs commits from unrelated sessions landing at
//!   the same moment.
//! - **`r2d2` connection pool**: bounded connection reuse for blocking
//!   handlers running on the tokio blocking pool.
//! - **Embedded migrations**: SQL files are compiled into the binary via
//!   `include_str!`, so the schema ships with the code that depends on it.

mod migrations;
mod pool;

pub use migrations::{run_migrations, MigrationError};
pub use pool::{create_pool, DbPool, DbRuntimeSettings, PoolError};
