//! Improv Battle: a game-show host running a fixed number of improv rounds.

use std::path::Path;

use parley_core::normalize::{contains_keyword, ControlVocabulary};
use parley_core::{
    Conversational, DialogueError, Domain, ParamSpec, Phase, RegistryError,
    Route, Session, Slot, ToolDescriptor, ToolEffects, ToolRegistry,
};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::error::ReferenceDataError;
use crate::reference;

const BUILTIN_SCENARIOS: &str = include_str!("../data/improv_scenarios.json");

/// Bounds on the number of rounds a player may ask for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ImprovSettings {
    pub min_rounds: i64,
    pub max_rounds: i64,
    pub default_rounds: i64,
}

impl Default for ImprovSettings {
    fn default() -> Self {
        Self {
            min_rounds: 3,
            max_rounds: 6,
            default_rounds: 3,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ScenarioFile {
    scenarios: Vec<String>,
}

/// Read-only data shared by every improv session.
///
/// Only built through [`ImprovRefs::new`], so the scenario list is never
/// empty.
#[derive(Debug, Clone)]
pub struct ImprovRefs {
    scenarios: Vec<String>,
    settings: ImprovSettings,
}

impl ImprovRefs {
    /// Loads scenarios from `path`, or the built-in list.
    ///
    /// # Errors
    ///
    /// Returns `ReferenceDataError` if the file cannot be read or parsed, the
    /// scenario list is empty, or the round bounds are inconsistent.
    pub fn load(path: Option<&Path>, settings: ImprovSettings) -> Result<Self, ReferenceDataError> {
        let file: ScenarioFile =
            reference::load_or_builtin(path, "improv_scenarios", BUILTIN_SCENARIOS)?;
        Self::new(file.scenarios, settings)
    }

    /// Validates and wraps a scenario list.
    pub fn new(scenarios: Vec<String>, settings: ImprovSettings) -> Result<Self, ReferenceDataError> {
        if scenarios.iter().all(|s| s.trim().is_empty()) {
            return Err(reference::invalid("improv_scenarios", "no scenarios"));
        }
        let ImprovSettings {
            min_rounds,
            max_rounds,
            default_rounds,
        } = settings;
        if min_rounds < 1 || min_rounds > max_rounds || !(min_rounds..=max_rounds).contains(&default_rounds) {
            return Err(reference::invalid(
                "improv_settings",
                format!("need 1 <= min ({min_rounds}) <= default ({default_rounds}) <= max ({max_rounds})"),
            ));
        }
        Ok(Self {
            scenarios: scenarios
                .into_iter()
                .filter(|s| !s.trim().is_empty())
                .collect(),
            settings,
        })
    }

    pub fn scenarios(&self) -> &[String] {
        &self.scenarios
    }

    pub fn settings(&self) -> ImprovSettings {
        self.settings
    }

    fn scenario(&self, index: usize) -> &str {
        &self.scenarios[index % self.scenarios.len()]
    }
}

/// The improv domain.
#[derive(Debug)]
pub struct Improv;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ImprovPhase {
    Intro,
    AwaitingPerformance,
    Reviewing,
    Done,
}

impl Phase for ImprovPhase {
    const INITIAL: Self = Self::Intro;

    fn successors(self) -> &'static [Self] {
        match self {
            Self::Intro => &[Self::AwaitingPerformance],
            Self::AwaitingPerformance => &[Self::Reviewing, Self::Done],
            Self::Reviewing => &[Self::AwaitingPerformance, Self::Done],
            Self::Done => &[],
        }
    }

    fn is_terminal(self) -> bool {
        matches!(self, Self::Done)
    }

    fn as_str(self) -> &'static str {
        match self {
            Self::Intro => "intro",
            Self::AwaitingPerformance => "awaiting_performance",
            Self::Reviewing => "reviewing",
            Self::Done => "done",
        }
    }
}

/// One scenario and what happened in it.
#[derive(Debug, Clone, Serialize)]
pub struct Round {
    pub scenario: String,
    pub performance: Slot<String>,
    pub reaction: Slot<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ImprovGame {
    pub player_name: Slot<String>,
    pub max_rounds: u32,
    pub rounds: Vec<Round>,
}

impl ImprovGame {
    fn current_round(&self) -> usize {
        self.rounds.len()
    }

    fn is_final_round(&self) -> bool {
        self.rounds.len() as u32 >= self.max_rounds
    }

    fn player(&self) -> &str {
        self.player_name.get().map(String::as_str).unwrap_or("friend")
    }
}

const STOP_PHRASES: &[&str] = &["stop", "end game", "i'm done", "im done", "that's enough", "quit"];

impl Domain for Improv {
    const NAME: &'static str = "improv";
    type Phase = ImprovPhase;
    type Payload = ImprovGame;
    type Refs = ImprovRefs;

    fn initial_payload(_refs: &ImprovRefs) -> ImprovGame {
        ImprovGame::default()
    }

    fn commit_label(game: &ImprovGame) -> Option<String> {
        game.player_name.get().cloned()
    }
}

impl Conversational for Improv {
    fn vocabulary() -> ControlVocabulary {
        ControlVocabulary::new(&["restart", "start over", "new game"])
    }

    fn greeting() -> &'static str {
        "Welcome to Improv Battle! What's your name, contestant?"
    }

    fn restart_reply() -> &'static str {
        "Let's run it back from the top. What's your name, contestant?"
    }

    fn completed_reply() -> &'static str {
        "That's the end of the show. Say 'new game' to play again."
    }

    fn route(session: &Session<Self>, utterance: &str) -> Route {
        let wants_out = STOP_PHRASES
            .iter()
            .any(|phrase| contains_keyword(utterance, phrase));
        match session.phase() {
            ImprovPhase::Intro => Route::Invoke {
                tool: "start_game",
                params: json!({ "player_name": utterance }),
            },
            ImprovPhase::AwaitingPerformance if wants_out => Route::Invoke {
                tool: "end_game",
                params: json!({}),
            },
            ImprovPhase::AwaitingPerformance => Route::Invoke {
                tool: "record_performance",
                params: json!({ "performance": utterance }),
            },
            ImprovPhase::Reviewing if wants_out || session.payload().is_final_round() => {
                Route::Invoke {
                    tool: "end_game",
                    params: json!({}),
                }
            }
            ImprovPhase::Reviewing => Route::Invoke {
                tool: "next_scenario",
                params: json!({}),
            },
            ImprovPhase::Done => Route::Reply(Self::completed_reply().to_string()),
        }
    }
}

fn start_round(session: &mut Session<Improv>, refs: &ImprovRefs) -> Result<String, DialogueError> {
    let index = session.payload().current_round();
    let scenario = refs.scenario(index).to_string();
    session.payload_mut().rounds.push(Round {
        scenario: scenario.clone(),
        performance: Slot::empty(),
        reaction: Slot::empty(),
    });
    session.advance(ImprovPhase::AwaitingPerformance)?;
    Ok(format!("Round {}: {scenario} Take it away!", index + 1))
}

/// Builds the improv tool registry with round bounds from `settings`.
///
/// # Errors
///
/// Returns `RegistryError` if two tools share a name.
pub fn registry(settings: &ImprovSettings) -> Result<ToolRegistry<Improv>, RegistryError> {
    let mut registry = ToolRegistry::new();

    registry.register(
        ToolDescriptor::new(
            "start_game",
            "Start a game for the named player and present the first scenario.",
            ToolEffects::MUTATES,
            |session: &mut Session<Improv>, params, refs: &ImprovRefs| {
                if session.phase() != ImprovPhase::Intro {
                    return Err(DialogueError::precondition(
                        "We're already mid-show! Let's keep going.",
                    ));
                }
                let name = params.text("player_name")?.to_string();
                let rounds = params.integer("rounds")?;
                let game = session.payload_mut();
                game.player_name.fill(name.clone());
                game.max_rounds = u32::try_from(rounds).unwrap_or(refs.settings.min_rounds as u32);
                let opener = start_round(session, refs)?;
                Ok(format!(
                    "Welcome to Improv Battle, {name}! We'll play {rounds} rounds. {opener}"
                ))
            },
        )
        .param(ParamSpec::string("player_name", "The contestant's name"))
        .param(
            ParamSpec::integer("rounds", "How many rounds to play")
                .bounded(settings.min_rounds, settings.max_rounds)
                .with_default(settings.default_rounds),
        ),
    )?;

    registry.register(
        ToolDescriptor::new(
            "record_performance",
            "Record the player's performance for the active round.",
            ToolEffects::MUTATES,
            |session: &mut Session<Improv>, params, _| {
                if session.phase() != ImprovPhase::AwaitingPerformance {
                    return Err(DialogueError::precondition("There's no active round yet."));
                }
                let performance = params.text("performance")?.to_string();
                let game = session.payload_mut();
                let round_number = game.current_round();
                if let Some(round) = game.rounds.last_mut() {
                    round.performance.fill(performance);
                }
                let last = game.is_final_round();
                session.advance(ImprovPhase::Reviewing)?;
                if last {
                    Ok(format!(
                        "That's round {round_number} in the books, and that was the final round! Ready for the wrap-up?"
                    ))
                } else {
                    Ok(format!(
                        "That's round {round_number} in the books! Ready for the next scene?"
                    ))
                }
            },
        )
        .param(ParamSpec::string("performance", "What the player did")),
    )?;

    registry.register(
        ToolDescriptor::new(
            "react",
            "Attach the host's reaction to the latest performance.",
            ToolEffects::MUTATES,
            |session: &mut Session<Improv>, params, _| {
                if session.phase() != ImprovPhase::Reviewing {
                    return Err(DialogueError::precondition(
                        "Let's see the performance before I react to it.",
                    ));
                }
                let reaction = params.text("reaction")?.to_string();
                if let Some(round) = session.payload_mut().rounds.last_mut() {
                    round.reaction.fill(reaction.clone());
                }
                Ok(reaction)
            },
        )
        .param(ParamSpec::string("reaction", "The host's reaction")),
    )?;

    registry.register(ToolDescriptor::new(
        "next_scenario",
        "Move on to the next round's scenario.",
        ToolEffects::MUTATES,
        |session: &mut Session<Improv>, _, refs: &ImprovRefs| {
            match session.phase() {
                ImprovPhase::Reviewing => {}
                ImprovPhase::AwaitingPerformance => {
                    return Err(DialogueError::precondition(
                        "Finish this scene first, then we'll move on.",
                    ))
                }
                _ => return Err(DialogueError::precondition("There's no game in progress.")),
            }
            if session.payload().is_final_round() {
                return Err(DialogueError::precondition(
                    "That was the final round. Let's wrap up the show.",
                ));
            }
            start_round(session, refs)
        },
    ))?;

    registry.register(ToolDescriptor::new(
        "end_game",
        "End the show and summarise the rounds played.",
        ToolEffects::MUTATES.writing_storage(),
        |session: &mut Session<Improv>, _, _| {
            if !matches!(
                session.phase(),
                ImprovPhase::AwaitingPerformance | ImprovPhase::Reviewing
            ) {
                return Err(DialogueError::precondition("There's no game in progress."));
            }
            session.advance(ImprovPhase::Done)?;
            let game = session.payload();
            let played = game
                .rounds
                .iter()
                .filter(|round| round.performance.is_set())
                .count();
            Ok(format!(
                "That's a wrap, {}! You played {played} of {} rounds. Thanks for being on Improv Battle.",
                game.player(),
                game.max_rounds
            ))
        },
    ))?;

    Ok(registry)
}
