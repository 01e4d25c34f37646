//! Shared types for the Parley dialogue agents.
//!
//! This crate provides the small vocabulary every other Parley crate agrees
//! on: session identifiers, declared tool effects, the fraud case status
//! enumeration, and the transcript record that crosses the utterance
//! boundary from the speech pipeline.
//!
//! No crate in the workspace depends on anything *except* `parley-types` for
//! cross-cutting type definitions. This keeps the dependency graph clean and
//! prevents circular dependencies.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

mod transcript;
pub use transcript::Transcript;

/// Opaque identifier for one live conversation.
///
/// Assigned once at session creation and never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(Uuid);

impl SessionId {
    /// Generates a fresh random identifier.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Returns the first eight hex characters, used as a short discriminator
    /// in artifact names.
    pub fn short(&self) -> String {
        self.0.simple().to_string()[..8].to_string()
    }

    /// Returns the underlying UUID.
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for SessionId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// Side effects a tool declares at registration.
///
/// Used for auditing and ordering only. The dispatcher does not enforce
/// these flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ToolEffects {
    /// The tool changes session state.
    pub mutates_session: bool,
    /// The tool reads from external storage.
    pub reads_storage: bool,
    /// The tool writes to external storage.
    pub writes_storage: bool,
}

impl ToolEffects {
    /// A tool that only reads session state.
    pub const READ_ONLY: Self = Self {
        mutates_session: false,
        reads_storage: false,
        writes_storage: false,
    };

    /// A tool that mutates session state and touches nothing else.
    pub const MUTATES: Self = Self {
        mutates_session: true,
        reads_storage: false,
        writes_storage: false,
    };

    /// Returns a copy with `reads_storage` set.
    pub const fn reading_storage(mut self) -> Self {
        self.reads_storage = true;
        self
    }

    /// Returns a copy with `writes_storage` set.
    pub const fn writing_storage(mut self) -> Self {
        self.writes_storage = true;
        self
    }
}

/// Review status of a fraud case.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaseStatus {
    /// The flagged transaction has not been reviewed with the customer.
    PendingReview,
    /// The customer confirmed the transaction as their own.
    ConfirmedSafe,
    /// The customer denied making the transaction.
    ConfirmedFraud,
}

impl CaseStatus {
    /// Returns the canonical string label stored in the database.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::PendingReview => "pending_review",
            Self::ConfirmedSafe => "confirmed_safe",
            Self::ConfirmedFraud => "confirmed_fraud",
        }
    }

    /// Whether this status closes the case.
    pub fn is_resolution(self) -> bool {
        !matches!(self, Self::PendingReview)
    }
}

impl std::fmt::Display for CaseStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for CaseStatus {
    type Err = ParseCaseStatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending_review" => Ok(Self::PendingReview),
            "confirmed_safe" => Ok(Self::ConfirmedSafe),
            "confirmed_fraud" => Ok(Self::ConfirmedFraud),
            _ => Err(ParseCaseStatusError(s.to_string())),
        }
    }
}

/// Error returned when parsing an unknown case status string.
#[derive(Debug, Clone)]
pub struct ParseCaseStatusError(pub String);

impl std::fmt::Display for ParseCaseStatusError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "unknown case status: {}", self.0)
    }
}

impl std::error::Error for ParseCaseStatusError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn case_status_round_trip() {
        for status in [
            CaseStatus::PendingReview,
            CaseStatus::ConfirmedSafe,
            CaseStatus::ConfirmedFraud,
        ] {
            let parsed: CaseStatus = status.as_str().parse().expect("label should parse");
            assert_eq!(parsed, status);
        }
    }

    #[test]
    fn case_status_invalid() {
        assert!("resolved".parse::<CaseStatus>().is_err());
        assert!("".parse::<CaseStatus>().is_err());
    }

    #[test]
    fn case_status_serde_matches_label() {
        let json = serde_json::to_string(&CaseStatus::ConfirmedFraud).unwrap();
        assert_eq!(json, "\"confirmed_fraud\"");
    }

    #[test]
    fn only_pending_is_unresolved() {
        assert!(!CaseStatus::PendingReview.is_resolution());
        assert!(CaseStatus::ConfirmedSafe.is_resolution());
        assert!(CaseStatus::ConfirmedFraud.is_resolution());
    }

    #[test]
    fn session_ids_are_unique_and_parse_back() {
        let a = SessionId::new();
        let b = SessionId::new();
        assert_ne!(a, b);

        let parsed: SessionId = a.to_string().parse().expect("should parse");
        assert_eq!(parsed, a);
        assert_eq!(a.short().len(), 8);
    }

    #[test]
    fn effect_builders_set_flags() {
        let effects = ToolEffects::MUTATES.reading_storage();
        assert!(effects.mutates_session);
        assert!(effects.reads_storage);
        assert!(!effects.writes_storage);
        assert_eq!(ToolEffects::READ_ONLY, ToolEffects::default());
    }
}
