//! Fraud alert desk: verify the customer, walk through the flagged
//! transaction, record the outcome against the case row.

use parley_core::normalize::canonical;
use parley_core::{
    DialogueError, Domain, Location, ParamSpec, PersistenceError, PersistenceGateway, Phase,
    RegistryError, Session, Slot, ToolDescriptor, ToolEffects, ToolRegistry,
};
use parley_db::DbPool;
use parley_types::CaseStatus;
use serde::Serialize;

use crate::fraud_store::{self, FraudCase};

/// Failed verification attempts allowed per case load.
pub const MAX_VERIFICATION_ATTEMPTS: u32 = 3;

/// Shared handle to the fraud case store.
#[derive(Debug, Clone)]
pub struct FraudDesk {
    pool: DbPool,
}

impl FraudDesk {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }
}

/// The fraud alert domain.
#[derive(Debug)]
pub struct Fraud;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FraudPhase {
    Idle,
    AwaitingVerification,
    Verified,
    Resolved,
}

impl Phase for FraudPhase {
    const INITIAL: Self = Self::Idle;

    fn successors(self) -> &'static [Self] {
        match self {
            Self::Idle => &[Self::AwaitingVerification],
            Self::AwaitingVerification => &[Self::Verified],
            Self::Verified => &[Self::Resolved],
            Self::Resolved => &[],
        }
    }

    fn is_terminal(self) -> bool {
        matches!(self, Self::Resolved)
    }

    fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::AwaitingVerification => "awaiting_verification",
            Self::Verified => "verified",
            Self::Resolved => "resolved",
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct FraudReview {
    pub case: Slot<FraudCase>,
    pub verification_passed: bool,
    pub attempts: u32,
    pub outcome: Slot<CaseStatus>,
    pub outcome_note: Slot<String>,
}

impl Domain for Fraud {
    const NAME: &'static str = "fraud";
    type Phase = FraudPhase;
    type Payload = FraudReview;
    type Refs = FraudDesk;

    fn initial_payload(_desk: &FraudDesk) -> FraudReview {
        FraudReview::default()
    }

    fn commit_label(review: &FraudReview) -> Option<String> {
        review.case.get().map(|c| c.case_id.clone())
    }
}

fn loaded_case(review: &FraudReview) -> Result<&FraudCase, DialogueError> {
    review
        .case
        .get()
        .ok_or_else(|| DialogueError::precondition("Could I have your name so I can find your case?"))
}

fn ensure_verified(session: &Session<Fraud>) -> Result<(), DialogueError> {
    match session.phase() {
        FraudPhase::Verified => Ok(()),
        FraudPhase::Resolved => Err(DialogueError::precondition(
            "This case has already been resolved. Thank you for your time.",
        )),
        FraudPhase::Idle | FraudPhase::AwaitingVerification => Err(DialogueError::precondition(
            "I need to verify your identity before we discuss the transaction.",
        )),
    }
}

/// Builds the fraud tool registry.
///
/// # Errors
///
/// Returns `RegistryError` if two tools share a name.
pub fn registry() -> Result<ToolRegistry<Fraud>, RegistryError> {
    let mut registry = ToolRegistry::new();

    registry.register(
        ToolDescriptor::new(
            "load_fraud_case",
            "Look up the pending fraud case for a customer.",
            ToolEffects::MUTATES.reading_storage(),
            |session: &mut Session<Fraud>, params, desk: &FraudDesk| {
                if session.phase() != FraudPhase::Idle {
                    return Err(DialogueError::precondition(
                        "I already have your case open.",
                    ));
                }
                let name = params.text("customer_name")?;
                let conn = desk.pool.get().map_err(|e| DialogueError::Storage(e.to_string()))?;
                let case = fraud_store::find_pending_case(&conn, name)?.ok_or_else(|| {
                    DialogueError::precondition(format!(
                        "I couldn't find an open fraud alert for {name}. Could you spell your name for me?"
                    ))
                })?;
                tracing::info!(case_id = %case.case_id, "fraud case loaded");

                let question = case.security_question.clone();
                session.payload_mut().case.fill(case);
                session.advance(FraudPhase::AwaitingVerification)?;
                Ok(format!(
                    "Thanks. Before we continue, I need to verify your identity. {question}"
                ))
            },
        )
        .param(ParamSpec::string("customer_name", "Customer's full name")),
    )?;

    registry.register(
        ToolDescriptor::new(
            "verify_customer_identity",
            "Check the customer's answer to the security question.",
            ToolEffects::MUTATES,
            |session: &mut Session<Fraud>, params, _| {
                match session.phase() {
                    FraudPhase::AwaitingVerification => {}
                    FraudPhase::Idle => {
                        return Err(DialogueError::precondition(
                            "Could I have your name so I can find your case?",
                        ))
                    }
                    FraudPhase::Verified | FraudPhase::Resolved => {
                        return Err(DialogueError::precondition("You're already verified."))
                    }
                }
                let review = session.payload();
                if review.attempts >= MAX_VERIFICATION_ATTEMPTS {
                    return Err(DialogueError::precondition(
                        "I'm sorry, I can't verify your identity on this call. Please call the number on the back of your card.",
                    ));
                }
                let expected = canonical(&loaded_case(review)?.security_answer);
                let answer = canonical(params.text("answer")?);

                if answer != expected {
                    let review = session.payload_mut();
                    review.attempts += 1;
                    let left = MAX_VERIFICATION_ATTEMPTS - review.attempts;
                    tracing::info!(attempts = review.attempts, "identity verification failed");
                    session.note("verification attempt failed");
                    return Ok(if left == 0 {
                        "That doesn't match our records, and I'm unable to verify you on this call. Please call the number on the back of your card.".to_string()
                    } else {
                        format!("That doesn't match our records. You have {left} more attempt{}.", if left == 1 { "" } else { "s" })
                    });
                }

                let review = session.payload_mut();
                review.verification_passed = true;
                let description = loaded_case(review)?.describe();
                session.advance(FraudPhase::Verified)?;
                Ok(format!("Thank you, you're verified. {description}"))
            },
        )
        .param(ParamSpec::string("answer", "Answer to the security question")),
    )?;

    registry.register(ToolDescriptor::new(
        "describe_transaction",
        "Read back the flagged transaction.",
        ToolEffects::READ_ONLY,
        |session: &mut Session<Fraud>, _, _| {
            ensure_verified(session)?;
            Ok(loaded_case(session.payload())?.describe())
        },
    ))?;

    registry.register(
        ToolDescriptor::new(
            "mark_transaction_status",
            "Record whether the customer made the transaction.",
            ToolEffects::MUTATES.writing_storage(),
            |session: &mut Session<Fraud>, params, _| {
                let status: CaseStatus = params
                    .text("status")?
                    .trim()
                    .to_ascii_lowercase()
                    .parse()
                    .map_err(|e| DialogueError::invalid(format!("{e}")))?;
                if !status.is_resolution() {
                    return Err(DialogueError::invalid(
                        "status must be confirmed_safe or confirmed_fraud",
                    ));
                }
                ensure_verified(session)?;

                let note = params.opt_text("note").map(str::to_string);
                let review = session.payload_mut();
                review.outcome.fill(status);
                if let Some(note) = note {
                    review.outcome_note.fill(note);
                }
                let card = loaded_case(review)?.card_ending.clone();
                session.advance(FraudPhase::Resolved)?;

                Ok(match status {
                    CaseStatus::ConfirmedFraud => format!(
                        "I've marked this charge as fraudulent. Your card ending in {card} is now blocked and a replacement is on its way."
                    ),
                    _ => "Thank you for confirming. I've marked the transaction as legitimate and your card remains active.".to_string(),
                })
            },
        )
        .param(ParamSpec::string("status", "confirmed_safe or confirmed_fraud"))
        .param(ParamSpec::string("note", "Short outcome note").optional()),
    )?;

    Ok(registry)
}

/// Terminal sink that writes the outcome onto the case row itself.
#[derive(Debug, Clone)]
pub struct FraudCaseGateway {
    pool: DbPool,
}

impl FraudCaseGateway {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

impl PersistenceGateway<Fraud> for FraudCaseGateway {
    fn commit(&self, session: &Session<Fraud>) -> Result<Location, PersistenceError> {
        let review = session.payload();
        let case = review
            .case
            .get()
            .ok_or_else(|| PersistenceError::Rejected("no case loaded".into()))?;
        let status = *review
            .outcome
            .get()
            .ok_or_else(|| PersistenceError::Rejected("no outcome recorded".into()))?;

        let mut conn = self.pool.get()?;
        let tx = conn.transaction()?;
        fraud_store::update_case_status(
            &tx,
            &case.case_id,
            status,
            review.outcome_note.get().map(String::as_str),
        )?;
        tx.commit()?;

        Ok(Location::Row {
            table: "fraud_cases".into(),
            key: case.case_id.clone(),
        })
    }
}
