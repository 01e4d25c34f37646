//! Durable sinks for completed sessions.
//!
//! A gateway receives a session the first time it enters a terminal phase
//! and writes a self-describing snapshot somewhere durable. Two sinks ship
//! with the crate: [`JsonFileGateway`] publishes one pretty-printed JSON file
//! per completion and [`SqliteGateway`] appends one row per completion.

use std::fmt;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use parley_db::DbPool;
use parley_types::SessionId;
use rusqlite::params;
use serde::Serialize;

use crate::error::PersistenceError;
use crate::session::{Domain, Session};

/// Where a committed artifact ended up.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Location {
    /// A file on disk.
    File { path: PathBuf },
    /// A row in a table.
    Row { table: String, key: String },
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::File { path } => write!(f, "{}", path.display()),
            Self::Row { table, key } => write!(f, "{table}#{key}"),
        }
    }
}

/// Result of the one terminal commit attempted per session generation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "detail", rename_all = "snake_case")]
pub enum CommitOutcome {
    Saved(Location),
    Failed(String),
}

impl CommitOutcome {
    pub fn is_saved(&self) -> bool {
        matches!(self, Self::Saved(_))
    }
}

/// A durable sink for terminal session snapshots.
///
/// Implementations run on the blocking thread pool while the session's
/// execution slot is held, so they may block on I/O.
pub trait PersistenceGateway<D: Domain>: Send + Sync {
    /// Writes the session's snapshot and reports where it landed.
    ///
    /// # Errors
    ///
    /// Returns a `PersistenceError` when nothing durable was written.
    fn commit(&self, session: &Session<D>) -> Result<Location, PersistenceError>;
}

const MAX_LABEL_LEN: usize = 32;

/// Reduces a free-text label to a filesystem-safe token.
///
/// Keeps ASCII alphanumerics, `-` and `_`, turns whitespace into `_`, and
/// truncates. An empty result becomes `anonymous`.
pub fn sanitize_label(label: &str) -> String {
    let mut out = String::with_capacity(label.len().min(MAX_LABEL_LEN));
    for c in label.trim().chars() {
        if out.len() >= MAX_LABEL_LEN {
            break;
        }
        if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
            out.push(c);
        } else if c.is_whitespace() && !out.ends_with('_') {
            out.push('_');
        }
    }
    let trimmed = out.trim_matches('_');
    if trimmed.is_empty() {
        "anonymous".to_string()
    } else {
        trimmed.to_string()
    }
}

/// Artifact base name: `{domain}_{YYYYmmdd_HHMMSS}_{label}_{short id}-{generation}`.
///
/// The session id and generation keep two completions landing in the same
/// second apart.
pub fn artifact_stem(
    domain: &str,
    label: &str,
    completed_at: DateTime<Utc>,
    id: SessionId,
    generation: u32,
) -> String {
    format!(
        "{domain}_{}_{}_{}-{generation}",
        completed_at.format("%Y%m%d_%H%M%S"),
        sanitize_label(label),
        id.short(),
    )
}

fn stem_for<D: Domain>(session: &Session<D>) -> String {
    let label = D::commit_label(session.payload()).unwrap_or_default();
    artifact_stem(
        D::NAME,
        &label,
        session.completed_at().unwrap_or_else(Utc::now),
        session.id(),
        session.generation(),
    )
}

/// Publishes each completion as a JSON file in one directory.
///
/// The snapshot is written to a temporary file in the target directory,
/// synced, then linked into place without replacing an existing file, so a
/// reader never sees a partial artifact and no artifact is overwritten.
#[derive(Debug, Clone)]
pub struct JsonFileGateway {
    dir: PathBuf,
}

impl JsonFileGateway {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn publish(&self, stem: &str, bytes: &[u8]) -> Result<PathBuf, PersistenceError> {
        std::fs::create_dir_all(&self.dir)?;

        let mut tmp = tempfile::Builder::new()
            .prefix(".parley-")
            .suffix(".tmp")
            .tempfile_in(&self.dir)?;
        tmp.write_all(bytes)?;
        tmp.as_file().sync_all()?;

        let mut attempt = 0u32;
        loop {
            let name = if attempt == 0 {
                format!("{stem}.json")
            } else {
                format!("{stem}_{attempt}.json")
            };
            let target = self.dir.join(name);
            match tmp.persist_noclobber(&target) {
                Ok(_) => return Ok(target),
                Err(err) if err.error.kind() == ErrorKind::AlreadyExists => {
                    tmp = err.file;
                    attempt += 1;
                }
                Err(err) => return Err(PersistenceError::Io(err.error)),
            }
        }
    }
}

impl<D: Domain> PersistenceGateway<D> for JsonFileGateway {
    fn commit(&self, session: &Session<D>) -> Result<Location, PersistenceError> {
        let bytes = serde_json::to_vec_pretty(&session.snapshot())?;
        let path = self.publish(&stem_for(session), &bytes)?;
        tracing::info!(
            domain = D::NAME,
            session_id = %session.id(),
            path = %path.display(),
            "session artifact written"
        );
        Ok(Location::File { path })
    }
}

/// Appends each completion as a row in `session_commits`.
#[derive(Clone)]
pub struct SqliteGateway {
    pool: DbPool,
}

impl SqliteGateway {
    /// Wraps a pool whose database has had migrations applied.
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

impl<D: Domain> PersistenceGateway<D> for SqliteGateway {
    fn commit(&self, session: &Session<D>) -> Result<Location, PersistenceError> {
        let snapshot = serde_json::to_string(&session.snapshot())?;
        let label = sanitize_label(&D::commit_label(session.payload()).unwrap_or_default());
        let committed_at = session.completed_at().unwrap_or_else(Utc::now).to_rfc3339();

        let mut conn = self.pool.get()?;
        let tx = conn.transaction()?;
        tx.execute(
            "INSERT INTO session_commits (domain, session_id, generation, label, phase, snapshot_json, committed_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                D::NAME,
                session.id().to_string(),
                session.generation(),
                label,
                session.snapshot().phase,
                snapshot,
                committed_at,
            ],
        )?;
        let key = tx.last_insert_rowid();
        tx.commit()?;

        tracing::info!(
            domain = D::NAME,
            session_id = %session.id(),
            row = key,
            "session commit row written"
        );
        Ok(Location::Row {
            table: "session_commits".to_string(),
            key: key.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{Ticket, TicketPhase};
    use chrono::TimeZone;
    use parley_db::{create_pool, run_migrations, DbRuntimeSettings};

    fn closed_ticket(title: &str) -> Session<Ticket> {
        let mut session = Session::<Ticket>::new(SessionId::new(), &());
        session.payload_mut().title.fill(title.to_string());
        session.advance(TicketPhase::Drafting).unwrap();
        session.advance(TicketPhase::Closed).unwrap();
        session
    }

    #[test]
    fn labels_are_sanitized() {
        assert_eq!(sanitize_label("Sam"), "Sam");
        assert_eq!(sanitize_label("  Mary  Jane "), "Mary_Jane");
        assert_eq!(sanitize_label("../../etc/passwd"), "etcpasswd");
        assert_eq!(sanitize_label("!!!"), "anonymous");
        assert_eq!(sanitize_label(""), "anonymous");
        assert_eq!(sanitize_label(&"x".repeat(100)).len(), 32);
    }

    #[test]
    fn stem_includes_timestamp_label_and_identity() {
        let id = SessionId::new();
        let at = Utc.with_ymd_and_hms(2025, 3, 4, 5, 6, 7).unwrap();
        let stem = artifact_stem("coffee", "Sam", at, id, 2);
        assert_eq!(stem, format!("coffee_20250304_050607_Sam_{}-2", id.short()));
    }

    #[test]
    fn json_gateway_writes_self_describing_file() {
        let dir = tempfile::tempdir().unwrap();
        let gateway = JsonFileGateway::new(dir.path().join("orders"));
        let session = closed_ticket("printer jam");

        let location = PersistenceGateway::<Ticket>::commit(&gateway, &session)
            .expect("commit should succeed");
        let Location::File { path } = location else {
            panic!("expected a file location");
        };
        assert!(path.starts_with(dir.path().join("orders")));
        assert!(path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.starts_with("ticket_") && n.contains("_printer_jam_")));

        let written: serde_json::Value =
            serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        assert_eq!(written["domain"], "ticket");
        assert_eq!(written["phase"], "closed");
        assert_eq!(written["payload"]["title"], "printer jam");
        assert!(written["completed_at"].is_string());

        let leftovers: Vec<_> = std::fs::read_dir(path.parent().unwrap())
            .unwrap()
            .filter_map(Result::ok)
            .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn json_gateway_never_overwrites() {
        let dir = tempfile::tempdir().unwrap();
        let gateway = JsonFileGateway::new(dir.path());
        let session = closed_ticket("dup");

        let first = PersistenceGateway::<Ticket>::commit(&gateway, &session).unwrap();
        let second = PersistenceGateway::<Ticket>::commit(&gateway, &session).unwrap();
        assert_ne!(first, second);
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 2);
    }

    #[test]
    fn sqlite_gateway_appends_row() {
        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join("parley.db");
        let pool = create_pool(db.to_str().unwrap(), DbRuntimeSettings::default()).unwrap();
        run_migrations(&pool.get().unwrap()).unwrap();
        let gateway = SqliteGateway::new(pool.clone());
        let session = closed_ticket("Sam");

        let location = PersistenceGateway::<Ticket>::commit(&gateway, &session).unwrap();
        assert!(matches!(&location, Location::Row { table, .. } if table == "session_commits"));

        let conn = pool.get().unwrap();
        let (label, phase): (String, String) = conn
            .query_row(
                "SELECT label, phase FROM session_commits WHERE session_id = ?1",
                [session.id().to_string()],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .unwrap();
        assert_eq!(label, "Sam");
        assert_eq!(phase, "closed");

        let again = PersistenceGateway::<Ticket>::commit(&gateway, &session);
        assert!(matches!(again, Err(PersistenceError::Database(_))));
    }
}
