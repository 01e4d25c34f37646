//! Persistence operations for fraud review cases.
//!
//! Cases live in the `fraud_cases` table. A case starts as
//! `pending_review` and is moved to a resolution by
//! [`update_case_status`] when a verified customer confirms or denies the
//! flagged transaction.

use parley_types::CaseStatus;
use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;

use crate::error::FraudStoreError;
use crate::format_cents;

/// A flagged transaction under review.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FraudCase {
    pub case_id: String,
    pub customer_name: String,
    pub security_question: String,
    /// Never leaves the process in a snapshot or log line.
    #[serde(skip_serializing)]
    pub security_answer: String,
    pub card_ending: String,
    pub merchant: String,
    pub amount_cents: i64,
    pub transaction_time: String,
    pub location: String,
    pub status: CaseStatus,
    pub outcome_note: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl FraudCase {
    /// Spoken summary of the flagged transaction.
    pub fn describe(&self) -> String {
        format!(
            "We saw a charge of {} at {} on your card ending in {}, on {} in {}. Did you make this purchase?",
            format_cents(self.amount_cents),
            self.merchant,
            self.card_ending,
            self.transaction_time,
            self.location
        )
    }
}

/// Fields needed to open a case.
#[derive(Debug, Clone)]
pub struct NewCase {
    pub case_id: String,
    pub customer_name: String,
    pub security_question: String,
    pub security_answer: String,
    pub card_ending: String,
    pub merchant: String,
    pub amount_cents: i64,
    pub transaction_time: String,
    pub location: String,
}

const CASE_COLUMNS: &str = "case_id, customer_name, security_question, security_answer, \
     card_ending, merchant, amount_cents, transaction_time, location, status, outcome_note, \
     created_at, updated_at";

/// Raw row as stored; the status column is still text.
struct CaseRow {
    case: FraudCase,
    status: String,
}

impl CaseRow {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            case: FraudCase {
                case_id: row.get(0)?,
                customer_name: row.get(1)?,
                security_question: row.get(2)?,
                security_answer: row.get(3)?,
                card_ending: row.get(4)?,
                merchant: row.get(5)?,
                amount_cents: row.get(6)?,
                transaction_time: row.get(7)?,
                location: row.get(8)?,
                status: CaseStatus::PendingReview,
                outcome_note: row.get(10)?,
                created_at: row.get(11)?,
                updated_at: row.get(12)?,
            },
            status: row.get(9)?,
        })
    }

    fn into_case(self) -> Result<FraudCase, FraudStoreError> {
        let status = self
            .status
            .parse()
            .map_err(|_| FraudStoreError::InvalidStatus {
                case_id: self.case.case_id.clone(),
                status: self.status.clone(),
            })?;
        Ok(FraudCase { status, ..self.case })
    }
}

/// Opens a new case in `pending_review`.
///
/// # Errors
///
/// Returns `FraudStoreError::Database` on SQL failure, including a
/// duplicate `case_id`.
pub fn create_case(conn: &Connection, case: &NewCase) -> Result<FraudCase, FraudStoreError> {
    conn.execute(
        "INSERT INTO fraud_cases
            (case_id, customer_name, security_question, security_answer, card_ending,
             merchant, amount_cents, transaction_time, location)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            case.case_id,
            case.customer_name,
            case.security_question,
            case.security_answer,
            case.card_ending,
            case.merchant,
            case.amount_cents,
            case.transaction_time,
            case.location,
        ],
    )?;
    tracing::debug!(case_id = %case.case_id, "fraud case opened");
    get_case(conn, &case.case_id)
}

/// Loads one case by id.
///
/// # Errors
///
/// Returns `FraudStoreError::NotFound` if no case has this id, or
/// `FraudStoreError::Database` on SQL failure.
pub fn get_case(conn: &Connection, case_id: &str) -> Result<FraudCase, FraudStoreError> {
    let row = conn
        .query_row(
            &format!("SELECT {CASE_COLUMNS} FROM fraud_cases WHERE case_id = ?1"),
            params![case_id],
            CaseRow::from_row,
        )
        .optional()?
        .ok_or_else(|| FraudStoreError::NotFound(case_id.to_string()))?;
    row.into_case()
}

/// Finds the oldest `pending_review` case for a customer, matching the name
/// case-insensitively.
///
/// # Errors
///
/// Returns `FraudStoreError::Database` on SQL failure.
pub fn find_pending_case(
    conn: &Connection,
    customer_name: &str,
) -> Result<Option<FraudCase>, FraudStoreError> {
    let row = conn
        .query_row(
            &format!(
                "SELECT {CASE_COLUMNS} FROM fraud_cases
                 WHERE customer_name = ?1 COLLATE NOCASE AND status = 'pending_review'
                 ORDER BY id ASC
                 LIMIT 1"
            ),
            params![customer_name.trim()],
            CaseRow::from_row,
        )
        .optional()?;
    row.map(CaseRow::into_case).transpose()
}

/// Resolves a pending case with a new status and optional outcome note.
///
/// Only a `pending_review` row is updated, so the first resolution wins.
///
/// # Errors
///
/// Returns `FraudStoreError::NotFound` if no case has this id,
/// `FraudStoreError::AlreadyResolved` if it is no longer pending, or
/// `FraudStoreError::Database` on SQL failure.
pub fn update_case_status(
    conn: &Connection,
    case_id: &str,
    status: CaseStatus,
    note: Option<&str>,
) -> Result<(), FraudStoreError> {
    let changed = conn.execute(
        "UPDATE fraud_cases
         SET status = ?2, outcome_note = ?3, updated_at = datetime('now')
         WHERE case_id = ?1 AND status = 'pending_review'",
        params![case_id, status.as_str(), note],
    )?;
    if changed == 0 {
        let existing = get_case(conn, case_id)?;
        return Err(FraudStoreError::AlreadyResolved {
            case_id: existing.case_id,
            status: existing.status,
        });
    }
    tracing::info!(case_id, status = %status, "fraud case updated");
    Ok(())
}

/// Lists cases, optionally filtered by status, oldest first.
///
/// # Errors
///
/// Returns `FraudStoreError::Database` on SQL failure or
/// `FraudStoreError::InvalidStatus` if a stored status is unrecognised.
pub fn list_cases(
    conn: &Connection,
    status: Option<CaseStatus>,
) -> Result<Vec<FraudCase>, FraudStoreError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {CASE_COLUMNS} FROM fraud_cases
         WHERE ?1 IS NULL OR status = ?1
         ORDER BY id ASC"
    ))?;
    let rows = stmt.query_map(params![status.map(CaseStatus::as_str)], CaseRow::from_row)?;

    let mut cases = Vec::new();
    for row in rows {
        cases.push(row?.into_case()?);
    }
    Ok(cases)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn open_db() -> Connection {
        let conn = Connection::open_in_memory().expect("should open in-memory db");
        parley_db::run_migrations(&conn).expect("migrations should succeed");
        conn
    }

    pub(crate) fn sample_case(case_id: &str, customer_name: &str) -> NewCase {
        NewCase {
            case_id: case_id.to_string(),
            customer_name: customer_name.to_string(),
            security_question: "What is the name of your first pet?".to_string(),
            security_answer: "Biscuit".to_string(),
            card_ending: "4242".to_string(),
            merchant: "Skyline Electronics".to_string(),
            amount_cents: 129_999,
            transaction_time: "2024-03-02 14:11".to_string(),
            location: "Denver, CO".to_string(),
        }
    }

    #[test]
    fn create_then_get() {
        let conn = open_db();
        let created = create_case(&conn, &sample_case("FC-1", "Dana Reyes")).expect("should create");
        assert_eq!(created.status, CaseStatus::PendingReview);
        assert_eq!(created.outcome_note, None);

        let loaded = get_case(&conn, "FC-1").expect("should load");
        assert_eq!(loaded, created);
    }

    #[test]
    fn duplicate_case_id_is_a_database_error() {
        let conn = open_db();
        create_case(&conn, &sample_case("FC-1", "Dana Reyes")).expect("should create");
        let err = create_case(&conn, &sample_case("FC-1", "Dana Reyes")).expect_err("duplicate");
        assert!(matches!(err, FraudStoreError::Database(_)));
    }

    #[test]
    fn missing_case_is_not_found() {
        let conn = open_db();
        assert!(matches!(
            get_case(&conn, "nope"),
            Err(FraudStoreError::NotFound(_))
        ));
        assert!(matches!(
            update_case_status(&conn, "nope", CaseStatus::ConfirmedSafe, None),
            Err(FraudStoreError::NotFound(_))
        ));
    }

    #[test]
    fn pending_lookup_ignores_case_and_resolved_cases() {
        let conn = open_db();
        create_case(&conn, &sample_case("FC-1", "Dana Reyes")).expect("should create");
        create_case(&conn, &sample_case("FC-2", "Dana Reyes")).expect("should create");

        let found = find_pending_case(&conn, "  dana reyes ").expect("should query");
        assert_eq!(found.expect("should find a case").case_id, "FC-1");

        update_case_status(&conn, "FC-1", CaseStatus::ConfirmedSafe, Some("customer recognised it"))
            .expect("should update");
        let found = find_pending_case(&conn, "DANA REYES").expect("should query");
        assert_eq!(found.expect("should find a case").case_id, "FC-2");

        assert!(find_pending_case(&conn, "Someone Else")
            .expect("should query")
            .is_none());
    }

    #[test]
    fn first_resolution_wins() {
        let conn = open_db();
        create_case(&conn, &sample_case("FC-1", "Dana Reyes")).expect("should create");
        update_case_status(&conn, "FC-1", CaseStatus::ConfirmedFraud, Some("first"))
            .expect("should update");

        let err = update_case_status(&conn, "FC-1", CaseStatus::ConfirmedSafe, Some("second"))
            .expect_err("case is no longer pending");
        assert!(matches!(
            err,
            FraudStoreError::AlreadyResolved { status: CaseStatus::ConfirmedFraud, .. }
        ));

        let case = get_case(&conn, "FC-1").expect("should load");
        assert_eq!(case.status, CaseStatus::ConfirmedFraud);
        assert_eq!(case.outcome_note.as_deref(), Some("first"));
    }

    #[test]
    fn list_filters_by_status() {
        let conn = open_db();
        create_case(&conn, &sample_case("FC-1", "Dana Reyes")).expect("should create");
        create_case(&conn, &sample_case("FC-2", "Sam Ortiz")).expect("should create");
        update_case_status(&conn, "FC-2", CaseStatus::ConfirmedFraud, None).expect("should update");

        assert_eq!(list_cases(&conn, None).expect("should list").len(), 2);
        let fraud = list_cases(&conn, Some(CaseStatus::ConfirmedFraud)).expect("should list");
        assert_eq!(fraud.len(), 1);
        assert_eq!(fraud[0].case_id, "FC-2");
        assert_eq!(fraud[0].status, CaseStatus::ConfirmedFraud);
    }

    #[test]
    fn security_answer_is_not_serialized() {
        let conn = open_db();
        let case = create_case(&conn, &sample_case("FC-1", "Dana Reyes")).expect("should create");
        let json = serde_json::to_string(&case).expect("should serialize");
        assert!(!json.contains("Biscuit"));
        assert!(json.contains("pending_review"));
    }
}
