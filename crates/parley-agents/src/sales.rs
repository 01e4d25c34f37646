//! Sales development rep: answers product questions from a FAQ and
//! qualifies the caller as a lead.

use std::path::Path;
use std::str::FromStr;

use parley_core::normalize::contains_keyword;
use parley_core::{
    DialogueError, Domain, ParamSpec, Phase, RegistryError, Session, Slot, ToolDescriptor,
    ToolEffects, ToolRegistry,
};
use serde::{Deserialize, Serialize};

use crate::error::ReferenceDataError;
use crate::reference;

const BUILTIN_FAQ: &str = include_str!("../data/sales_faq.json");

#[derive(Debug, Clone, Deserialize)]
pub struct FaqEntry {
    pub question: String,
    pub answer: String,
    #[serde(default)]
    pub keywords: Vec<String>,
}

/// Company pitch and FAQ shared by every sales session.
#[derive(Debug, Clone, Deserialize)]
pub struct SalesKnowledge {
    pub company: String,
    pub pitch: String,
    pub entries: Vec<FaqEntry>,
}

impl SalesKnowledge {
    /// Loads the FAQ from `path`, or the built-in FAQ.
    ///
    /// # Errors
    ///
    /// Returns `ReferenceDataError` if the data cannot be read or parsed, or
    /// if an entry has no keywords to match on.
    pub fn load(path: Option<&Path>) -> Result<Self, ReferenceDataError> {
        let knowledge: Self = reference::load_or_builtin(path, "sales_faq", BUILTIN_FAQ)?;
        if let Some(entry) = knowledge.entries.iter().find(|e| e.keywords.is_empty()) {
            return Err(reference::invalid(
                "sales_faq",
                format!("entry '{}' has no keywords", entry.question),
            ));
        }
        Ok(knowledge)
    }

    /// The entry sharing the most keywords with `question`. Ties go to the
    /// earlier entry.
    pub fn best_match(&self, question: &str) -> Option<&FaqEntry> {
        let mut best: Option<(&FaqEntry, usize)> = None;
        for entry in &self.entries {
            let score = entry
                .keywords
                .iter()
                .filter(|k| contains_keyword(question, k))
                .count();
            if score > 0 && best.map_or(true, |(_, top)| score > top) {
                best = Some((entry, score));
            }
        }
        best.map(|(entry, _)| entry)
    }
}

/// The sales domain.
#[derive(Debug)]
pub struct Sales;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SalesPhase {
    Greeting,
    Discovery,
    Qualification,
    Closing,
}

impl Phase for SalesPhase {
    const INITIAL: Self = Self::Greeting;

    fn successors(self) -> &'static [Self] {
        match self {
            Self::Greeting => &[Self::Discovery],
            Self::Discovery => &[Self::Qualification],
            Self::Qualification => &[Self::Closing],
            Self::Closing => &[],
        }
    }

    fn is_terminal(self) -> bool {
        matches!(self, Self::Closing)
    }

    fn as_str(self) -> &'static str {
        match self {
            Self::Greeting => "greeting",
            Self::Discovery => "discovery",
            Self::Qualification => "qualification",
            Self::Closing => "closing",
        }
    }
}

impl FromStr for SalesPhase {
    type Err = DialogueError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "greeting" => Ok(Self::Greeting),
            "discovery" => Ok(Self::Discovery),
            "qualification" => Ok(Self::Qualification),
            "closing" => Ok(Self::Closing),
            other => Err(DialogueError::invalid(format!("unknown sales stage: {other}"))),
        }
    }
}

/// A lead attribute the rep can record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeadField {
    Name,
    Company,
    Role,
    Email,
    UseCase,
    TeamSize,
    Timeline,
}

impl LeadField {
    const REQUIRED: [Self; 3] = [Self::Name, Self::Company, Self::Email];

    fn label(self) -> &'static str {
        match self {
            Self::Name => "your name",
            Self::Company => "your company",
            Self::Role => "your role",
            Self::Email => "your email",
            Self::UseCase => "your use case",
            Self::TeamSize => "your team size",
            Self::Timeline => "your timeline",
        }
    }
}

impl FromStr for LeadField {
    type Err = DialogueError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace([' ', '-'], "_").as_str() {
            "name" => Ok(Self::Name),
            "company" => Ok(Self::Company),
            "role" => Ok(Self::Role),
            "email" => Ok(Self::Email),
            "use_case" => Ok(Self::UseCase),
            "team_size" => Ok(Self::TeamSize),
            "timeline" => Ok(Self::Timeline),
            other => Err(DialogueError::invalid(format!("unknown lead field: {other}"))),
        }
    }
}

/// Everything learned about the caller.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Lead {
    pub name: Slot<String>,
    pub company: Slot<String>,
    pub role: Slot<String>,
    pub email: Slot<String>,
    pub use_case: Slot<String>,
    pub team_size: Slot<String>,
    pub timeline: Slot<String>,
    pub questions_asked: Vec<String>,
}

impl Lead {
    fn slot(&self, field: LeadField) -> &Slot<String> {
        match field {
            LeadField::Name => &self.name,
            LeadField::Company => &self.company,
            LeadField::Role => &self.role,
            LeadField::Email => &self.email,
            LeadField::UseCase => &self.use_case,
            LeadField::TeamSize => &self.team_size,
            LeadField::Timeline => &self.timeline,
        }
    }

    fn slot_mut(&mut self, field: LeadField) -> &mut Slot<String> {
        match field {
            LeadField::Name => &mut self.name,
            LeadField::Company => &mut self.company,
            LeadField::Role => &mut self.role,
            LeadField::Email => &mut self.email,
            LeadField::UseCase => &mut self.use_case,
            LeadField::TeamSize => &mut self.team_size,
            LeadField::Timeline => &mut self.timeline,
        }
    }

    /// Required fields that are still empty.
    pub fn missing(&self) -> Vec<LeadField> {
        LeadField::REQUIRED
            .into_iter()
            .filter(|f| !self.slot(*f).is_set())
            .collect()
    }
}

impl Domain for Sales {
    const NAME: &'static str = "sales";
    type Phase = SalesPhase;
    type Payload = Lead;
    type Refs = SalesKnowledge;

    fn initial_payload(_refs: &SalesKnowledge) -> Lead {
        Lead::default()
    }

    fn commit_label(lead: &Lead) -> Option<String> {
        lead.name.get().cloned()
    }
}

fn ensure_open(session: &Session<Sales>) -> Result<(), DialogueError> {
    if session.is_complete() {
        return Err(DialogueError::precondition(
            "We've already wrapped up. Someone from our team will be in touch.",
        ));
    }
    Ok(())
}

fn finalize(session: &mut Session<Sales>, knowledge: &SalesKnowledge) -> Result<String, DialogueError> {
    ensure_open(session)?;
    if session.phase() != SalesPhase::Qualification {
        return Err(DialogueError::precondition(
            "Before we wrap up, I'd love to hear a bit more about what you need.",
        ));
    }

    let lead = session.payload();
    let missing: Vec<&str> = lead.missing().into_iter().map(LeadField::label).collect();
    if !missing.is_empty() {
        return Err(DialogueError::precondition(format!(
            "Before I pass this along, could I get {}?",
            missing.join(" and ")
        )));
    }

    let name = lead.name.get().cloned().unwrap_or_default();
    let company = lead.company.get().cloned().unwrap_or_default();
    let email = lead.email.get().cloned().unwrap_or_default();
    let use_case = lead
        .use_case
        .get()
        .map(|u| format!(" for {u}"))
        .unwrap_or_default();
    session.advance(SalesPhase::Closing)?;
    Ok(format!(
        "Thanks {name}. I've noted {company}'s interest in {}{use_case}. Our team will follow up at {email}.",
        knowledge.company
    ))
}

/// Builds the sales tool registry.
///
/// # Errors
///
/// Returns `RegistryError` if two tools share a name.
pub fn registry() -> Result<ToolRegistry<Sales>, RegistryError> {
    let mut registry = ToolRegistry::new();

    registry.register(
        ToolDescriptor::new(
            "answer_faq",
            "Answer a product question from the FAQ.",
            ToolEffects::MUTATES,
            |session: &mut Session<Sales>, params, knowledge: &SalesKnowledge| {
                ensure_open(session)?;
                let question = params.text("question")?;
                session.payload_mut().questions_asked.push(question.to_string());
                match knowledge.best_match(question) {
                    Some(entry) => {
                        session.note(format!("answered: {}", entry.question));
                        Ok(entry.answer.clone())
                    }
                    None => Ok(format!(
                        "I don't have that detail handy, but I'll note it so our team can follow up. {}",
                        knowledge.pitch
                    )),
                }
            },
        )
        .param(ParamSpec::string("question", "The caller's question")),
    )?;

    registry.register(
        ToolDescriptor::new(
            "update_lead",
            "Record one lead field: name, company, role, email, use_case, team_size or timeline.",
            ToolEffects::MUTATES,
            |session: &mut Session<Sales>, params, _| {
                let field: LeadField = params.text("field")?.parse()?;
                let value = params.text("value")?.to_string();
                ensure_open(session)?;
                session.payload_mut().slot_mut(field).fill(value.clone());
                Ok(format!("Got it, {} is {value}.", field.label()))
            },
        )
        .param(ParamSpec::string("field", "Lead field name"))
        .param(ParamSpec::string("value", "Value as spoken")),
    )?;

    registry.register(
        ToolDescriptor::new(
            "advance_stage",
            "Move the conversation to the next stage.",
            ToolEffects::MUTATES,
            |session: &mut Session<Sales>, params, knowledge: &SalesKnowledge| {
                let stage: SalesPhase = params.text("stage")?.parse()?;
                if stage == SalesPhase::Closing {
                    return finalize(session, knowledge);
                }
                ensure_open(session)?;
                session.advance(stage)?;
                Ok(match stage {
                    SalesPhase::Greeting => format!("Let's start over. {}", knowledge.pitch),
                    SalesPhase::Discovery => {
                        "Tell me a bit about your team and what you're hoping to solve.".to_string()
                    }
                    _ => "Great. Could I get your name, company and email so we can follow up?"
                        .to_string(),
                })
            },
        )
        .param(ParamSpec::string(
            "stage",
            "greeting, discovery, qualification or closing",
        )),
    )?;

    registry.register(ToolDescriptor::new(
        "finalize_lead",
        "Close the call once name, company and email are known.",
        ToolEffects::MUTATES.writing_storage(),
        |session: &mut Session<Sales>, _, knowledge: &SalesKnowledge| finalize(session, knowledge),
    ))?;

    Ok(registry)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::testing::Harness;

    fn harness() -> Harness<Sales> {
        Harness::new(SalesKnowledge::load(None).unwrap(), registry().unwrap())
    }

    #[test]
    fn faq_matching_prefers_the_most_keywords() {
        let knowledge = SalesKnowledge::load(None).unwrap();
        let entry = knowledge.best_match("How much is the Team plan?").unwrap();
        assert!(entry.answer.contains("29 dollars"));
        let entry = knowledge.best_match("Do you integrate with Snowflake?").unwrap();
        assert!(entry.answer.contains("Snowflake"));
        assert!(knowledge.best_match("Tell me a joke").is_none());
    }

    #[test]
    fn lead_fields_parse_loosely_but_reject_unknowns() {
        assert_eq!("Use Case".parse::<LeadField>().unwrap(), LeadField::UseCase);
        assert_eq!("team-size".parse::<LeadField>().unwrap(), LeadField::TeamSize);
        assert!(matches!(
            "budget".parse::<LeadField>(),
            Err(DialogueError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn questions_are_noted_even_without_an_answer() {
        let h = harness();
        let hit = h.call("answer_faq", json!({ "question": "Is there a free trial?" })).await;
        assert!(hit.text.contains("14 day"));
        let miss = h.call("answer_faq", json!({ "question": "Who won the game?" })).await;
        assert!(miss.text.contains("follow up"));

        let session = h.session().await;
        assert_eq!(session.payload().questions_asked.len(), 2);
    }

    #[tokio::test]
    async fn unknown_field_and_stage_are_validation_errors() {
        let h = harness();
        let err = h.fail("update_lead", json!({ "field": "budget", "value": "10k" })).await;
        assert!(matches!(err, DialogueError::Validation(_)));
        let err = h.fail("advance_stage", json!({ "stage": "negotiation" })).await;
        assert!(matches!(err, DialogueError::Validation(_)));
    }

    #[tokio::test]
    async fn stages_cannot_be_skipped() {
        let h = harness();
        let err = h.fail("advance_stage", json!({ "stage": "qualification" })).await;
        assert!(matches!(err, DialogueError::InvalidTransition { .. }));
        assert_eq!(h.session().await.phase(), SalesPhase::Greeting);
    }

    #[tokio::test]
    async fn finalize_lists_missing_fields_then_commits() {
        let h = harness();
        h.call("advance_stage", json!({ "stage": "discovery" })).await;
        h.call("advance_stage", json!({ "stage": "qualification" })).await;
        h.call("update_lead", json!({ "field": "name", "value": "Priya" })).await;

        let err = h.fail("finalize_lead", json!({})).await;
        let spoken = err.spoken();
        assert!(spoken.contains("your company"));
        assert!(spoken.contains("your email"));

        h.call("update_lead", json!({ "field": "company", "value": "Acme" })).await;
        h.call("update_lead", json!({ "field": "email", "value": "priya@acme.io" }))
            .await;
        let done = h.call("finalize_lead", json!({})).await;
        assert!(done.completed);
        assert!(done.text.contains("priya@acme.io"));
        assert_eq!(h.gateway.snapshots().len(), 1);

        let err = h.fail("update_lead", json!({ "field": "role", "value": "CTO" })).await;
        assert!(matches!(err, DialogueError::PreconditionFailed(_)));
    }

    #[tokio::test]
    async fn finalize_outside_qualification_is_refused() {
        let h = harness();
        h.call("update_lead", json!({ "field": "name", "value": "Priya" })).await;
        let err = h.fail("finalize_lead", json!({})).await;
        assert!(matches!(err, DialogueError::PreconditionFailed(_)));
    }
}
