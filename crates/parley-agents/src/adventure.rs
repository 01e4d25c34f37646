//! Voice game master for a short text adventure.
//!
//! Every session explores its own copy of the world, so `update_world` and
//! item pickups never leak between players.

use std::collections::BTreeMap;
use std::path::Path;
use std::str::FromStr;

use parley_core::normalize::canonical;
use parley_core::{
    DialogueError, Domain, ParamSpec, Phase, RegistryError, Session, Slot, ToolDescriptor,
    ToolEffects, ToolRegistry,
};
use serde::{Deserialize, Serialize};

use crate::error::ReferenceDataError;
use crate::reference;

const BUILTIN_WORLD: &str = include_str!("../data/adventure_world.json");

/// One room of the world.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Place {
    pub name: String,
    pub description: String,
    #[serde(default)]
    pub exits: BTreeMap<String, String>,
    #[serde(default)]
    pub items: Vec<String>,
}

/// The world template loaded at startup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct World {
    pub title: String,
    pub start: String,
    pub locations: BTreeMap<String, Place>,
    #[serde(default)]
    pub quests: BTreeMap<String, String>,
}

impl World {
    /// Loads the world from `path`, or the built-in world.
    ///
    /// # Errors
    ///
    /// Returns `ReferenceDataError` if the data cannot be read or parsed, or
    /// if the start location or an exit points nowhere.
    pub fn load(path: Option<&Path>) -> Result<Self, ReferenceDataError> {
        let world: Self = reference::load_or_builtin(path, "adventure_world", BUILTIN_WORLD)?;
        world.validate()?;
        Ok(world)
    }

    fn validate(&self) -> Result<(), ReferenceDataError> {
        if !self.locations.contains_key(&self.start) {
            return Err(reference::invalid(
                "adventure_world",
                format!("start location {} does not exist", self.start),
            ));
        }
        for (id, place) in &self.locations {
            if let Some((dir, target)) = place
                .exits
                .iter()
                .find(|(_, target)| !self.locations.contains_key(*target))
            {
                return Err(reference::invalid(
                    "adventure_world",
                    format!("exit {dir} from {id} leads to unknown location {target}"),
                ));
            }
        }
        Ok(())
    }

    /// Resolves a location by id or case-insensitive name.
    fn resolve(&self, query: &str) -> Option<String> {
        let query = canonical(query);
        self.locations
            .iter()
            .find(|(id, place)| canonical(id) == query || canonical(&place.name) == query)
            .map(|(id, _)| id.clone())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestStatus {
    Active,
    Completed,
    Failed,
}

impl FromStr for QuestStatus {
    type Err = DialogueError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "active" => Ok(Self::Active),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            other => Err(DialogueError::invalid(format!("unknown quest status: {other}"))),
        }
    }
}

/// The adventure domain.
#[derive(Debug)]
pub struct Adventure;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AdventurePhase {
    Intro,
    Exploring,
    Ended,
}

impl Phase for AdventurePhase {
    const INITIAL: Self = Self::Intro;

    fn successors(self) -> &'static [Self] {
        match self {
            Self::Intro => &[Self::Exploring],
            Self::Exploring => &[Self::Ended],
            Self::Ended => &[],
        }
    }

    fn is_terminal(self) -> bool {
        matches!(self, Self::Ended)
    }

    fn as_str(self) -> &'static str {
        match self {
            Self::Intro => "intro",
            Self::Exploring => "exploring",
            Self::Ended => "ended",
        }
    }
}

/// A player's run through the world.
#[derive(Debug, Clone, Serialize)]
pub struct Expedition {
    pub player_name: Slot<String>,
    pub world: World,
    pub current: String,
    pub inventory: Vec<String>,
    pub quests: BTreeMap<String, QuestStatus>,
    pub turns: u32,
    pub epilogue: Slot<String>,
}

impl Expedition {
    fn here(&self) -> Result<&Place, DialogueError> {
        self.world
            .locations
            .get(&self.current)
            .ok_or_else(|| DialogueError::Storage(format!("lost at {}", self.current)))
    }

    fn here_mut(&mut self) -> Result<&mut Place, DialogueError> {
        let current = &self.current;
        self.world
            .locations
            .get_mut(current)
            .ok_or_else(|| DialogueError::Storage(format!("lost at {current}")))
    }

    /// Spoken description of the current location.
    pub fn describe(&self) -> Result<String, DialogueError> {
        let place = self.here()?;
        let mut text = format!("{}. {}", place.name, place.description);
        if !place.items.is_empty() {
            text.push_str(&format!(" You see: {}.", place.items.join(", ")));
        }
        if place.exits.is_empty() {
            text.push_str(" There is no way out.");
        } else {
            let exits: Vec<&str> = place.exits.keys().map(String::as_str).collect();
            text.push_str(&format!(" Exits: {}.", exits.join(", ")));
        }
        Ok(text)
    }
}

impl Domain for Adventure {
    const NAME: &'static str = "adventure";
    type Phase = AdventurePhase;
    type Payload = Expedition;
    type Refs = World;

    fn initial_payload(world: &World) -> Expedition {
        Expedition {
            player_name: Slot::empty(),
            world: world.clone(),
            current: world.start.clone(),
            inventory: Vec::new(),
            quests: world
                .quests
                .keys()
                .map(|id| (id.clone(), QuestStatus::Active))
                .collect(),
            turns: 0,
            epilogue: Slot::empty(),
        }
    }

    fn commit_label(expedition: &Expedition) -> Option<String> {
        expedition.player_name.get().cloned()
    }
}

fn ensure_exploring(session: &Session<Adventure>) -> Result<(), DialogueError> {
    match session.phase() {
        AdventurePhase::Exploring => Ok(()),
        AdventurePhase::Intro => Err(DialogueError::precondition(
            "Tell me your name first and we'll begin.",
        )),
        AdventurePhase::Ended => Err(DialogueError::precondition(
            "This tale has ended. Say restart to begin a new one.",
        )),
    }
}

/// Removes the first entry equal to `item` ignoring case.
fn take_from(items: &mut Vec<String>, item: &str) -> Option<String> {
    let wanted = canonical(item);
    let index = items.iter().position(|i| canonical(i) == wanted)?;
    Some(items.remove(index))
}

/// Builds the adventure tool registry.
///
/// # Errors
///
/// Returns `RegistryError` if two tools share a name.
pub fn registry() -> Result<ToolRegistry<Adventure>, RegistryError> {
    let mut registry = ToolRegistry::new();

    registry.register(
        ToolDescriptor::new(
            "begin_adventure",
            "Start the adventure for the named player.",
            ToolEffects::MUTATES,
            |session: &mut Session<Adventure>, params, world: &World| {
                if session.phase() != AdventurePhase::Intro {
                    return Err(DialogueError::precondition(
                        "We're already on our way. Where would you like to go?",
                    ));
                }
                let name = params.text("player_name")?.to_string();
                session.payload_mut().player_name.fill(name.clone());
                session.advance(AdventurePhase::Exploring)?;
                Ok(format!(
                    "Welcome, {name}, to {}. {}",
                    world.title,
                    session.payload().describe()?
                ))
            },
        )
        .param(ParamSpec::string("player_name", "The player's name")),
    )?;

    registry.register(ToolDescriptor::new(
        "look",
        "Describe the player's surroundings.",
        ToolEffects::READ_ONLY,
        |session: &mut Session<Adventure>, _, _| session.payload().describe(),
    ))?;

    registry.register(
        ToolDescriptor::new(
            "move_to",
            "Walk through an exit by direction or destination name.",
            ToolEffects::MUTATES,
            |session: &mut Session<Adventure>, params, _| {
                ensure_exploring(session)?;
                let wanted = canonical(params.text("direction")?);
                let expedition = session.payload();
                let here = expedition.here()?;
                let target = here
                    .exits
                    .iter()
                    .find(|(dir, target)| {
                        canonical(dir) == wanted
                            || expedition
                                .world
                                .locations
                                .get(*target)
                                .is_some_and(|p| canonical(&p.name) == wanted)
                    })
                    .map(|(_, target)| target.clone());
                let Some(target) = target else {
                    let exits: Vec<&str> = here.exits.keys().map(String::as_str).collect();
                    return Err(DialogueError::precondition(format!(
                        "You can't go {wanted} from here. Exits: {}.",
                        exits.join(", ")
                    )));
                };

                let expedition = session.payload_mut();
                expedition.current = target;
                expedition.turns += 1;
                let text = expedition.describe()?;
                session.note(format!("moved {wanted}"));
                Ok(text)
            },
        )
        .param(ParamSpec::string("direction", "Exit direction or destination")),
    )?;

    registry.register(
        ToolDescriptor::new(
            "take_item",
            "Pick up an item at the current location.",
            ToolEffects::MUTATES,
            |session: &mut Session<Adventure>, params, _| {
                ensure_exploring(session)?;
                let wanted = params.text("item")?;
                let expedition = session.payload_mut();
                let item = take_from(&mut expedition.here_mut()?.items, wanted).ok_or_else(|| {
                    DialogueError::precondition(format!("There's no {wanted} here."))
                })?;
                expedition.inventory.push(item.clone());
                expedition.turns += 1;
                Ok(format!("You pick up the {item}."))
            },
        )
        .param(ParamSpec::string("item", "Item to pick up")),
    )?;

    registry.register(
        ToolDescriptor::new(
            "drop_item",
            "Drop an inventory item at the current location.",
            ToolEffects::MUTATES,
            |session: &mut Session<Adventure>, params, _| {
                ensure_exploring(session)?;
                let wanted = params.text("item")?;
                let expedition = session.payload_mut();
                let item = take_from(&mut expedition.inventory, wanted).ok_or_else(|| {
                    DialogueError::precondition(format!("You aren't carrying a {wanted}."))
                })?;
                expedition.here_mut()?.items.push(item.clone());
                expedition.turns += 1;
                Ok(format!("You set down the {item}."))
            },
        )
        .param(ParamSpec::string("item", "Item to drop")),
    )?;

    registry.register(
        ToolDescriptor::new(
            "update_quest",
            "Set a quest to active, completed or failed. Unknown quest ids start new quests.",
            ToolEffects::MUTATES,
            |session: &mut Session<Adventure>, params, _| {
                let status: QuestStatus = params.text("status")?.parse()?;
                let quest = params.text("quest")?.to_string();
                ensure_exploring(session)?;
                let expedition = session.payload_mut();
                let previous = expedition.quests.insert(quest.clone(), status);
                expedition.turns += 1;
                let label = expedition
                    .world
                    .quests
                    .get(&quest)
                    .cloned()
                    .unwrap_or_else(|| quest.replace('_', " "));
                Ok(match (previous, status) {
                    (None, _) => format!("New quest: {label}"),
                    (_, QuestStatus::Completed) => format!("Quest complete: {label}"),
                    (_, QuestStatus::Failed) => format!("Quest failed: {label}"),
                    (_, QuestStatus::Active) => format!("Quest active: {label}"),
                })
            },
        )
        .param(ParamSpec::string("quest", "Quest id"))
        .param(ParamSpec::string("status", "active, completed or failed")),
    )?;

    registry.register(
        ToolDescriptor::new(
            "update_world",
            "Rewrite a location's description in this player's world.",
            ToolEffects::MUTATES,
            |session: &mut Session<Adventure>, params, _| {
                ensure_exploring(session)?;
                let query = params.text("location")?;
                let description = params.text("description")?.to_string();
                let expedition = session.payload_mut();
                let id = expedition.world.resolve(query).ok_or_else(|| {
                    DialogueError::precondition(format!("There's no place called {query}."))
                })?;
                let place = expedition
                    .world
                    .locations
                    .get_mut(&id)
                    .ok_or_else(|| DialogueError::Storage(format!("lost location {id}")))?;
                place.description = description;
                let name = place.name.clone();
                expedition.turns += 1;
                Ok(format!("{name} has changed."))
            },
        )
        .param(ParamSpec::string("location", "Location id or name"))
        .param(ParamSpec::string("description", "The new description")),
    )?;

    registry.register(
        ToolDescriptor::new(
            "end_adventure",
            "End the adventure, optionally with an epilogue.",
            ToolEffects::MUTATES.writing_storage(),
            |session: &mut Session<Adventure>, params, _| {
                ensure_exploring(session)?;
                let expedition = session.payload_mut();
                if let Some(epilogue) = params.opt_text("epilogue") {
                    expedition.epilogue.fill(epilogue.to_string());
                }
                let completed = expedition
                    .quests
                    .values()
                    .filter(|s| **s == QuestStatus::Completed)
                    .count();
                let total = expedition.quests.len();
                let turns = expedition.turns;
                let closing = expedition.epilogue.get().cloned().unwrap_or_else(|| {
                    "And so the story rests, for now.".to_string()
                });
                session.advance(AdventurePhase::Ended)?;
                Ok(format!(
                    "{closing} You completed {completed} of {total} quests in {turns} turns."
                ))
            },
        )
        .param(ParamSpec::string("epilogue", "Closing narration").optional()),
    )?;

    Ok(registry)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::testing::Harness;

    fn harness() -> Harness<Adventure> {
        Harness::new(World::load(None).expect("built-in world"), registry().unwrap())
    }

    async fn started() -> Harness<Adventure> {
        let h = harness();
        h.call("begin_adventure", json!({ "player_name": "Rowan" })).await;
        h
    }

    #[test]
    fn dangling_exit_is_rejected() {
        let mut world = World::load(None).unwrap();
        world
            .locations
            .get_mut("village_square")
            .unwrap()
            .exits
            .insert("up".into(), "sky".into());
        assert!(world.validate().is_err());
    }

    #[tokio::test]
    async fn exploring_requires_a_start() {
        let h = harness();
        let err = h.fail("move_to", json!({ "direction": "north" })).await;
        assert!(matches!(err, DialogueError::PreconditionFailed(_)));
    }

    #[tokio::test]
    async fn moving_follows_exits() {
        let h = started().await;
        let result = h.call("move_to", json!({ "direction": "North" })).await;
        assert!(result.text.starts_with("Old Library."));

        let err = h.fail("move_to", json!({ "direction": "west" })).await;
        assert!(matches!(err, DialogueError::PreconditionFailed(_)));
        let session = h.session().await;
        assert_eq!(session.payload().current, "old_library");
        assert_eq!(session.payload().turns, 1);

        h.call("move_to", json!({ "direction": "village square" })).await;
        assert_eq!(h.session().await.payload().current, "village_square");
    }

    #[tokio::test]
    async fn items_move_between_world_and_inventory() {
        let h = started().await;
        h.call("take_item", json!({ "item": "Lantern" })).await;
        let session = h.session().await;
        assert_eq!(session.payload().inventory, vec!["lantern".to_string()]);
        assert!(session.payload().world.locations["village_square"].items.is_empty());

        let err = h.fail("take_item", json!({ "item": "lantern" })).await;
        assert!(matches!(err, DialogueError::PreconditionFailed(_)));

        h.call("move_to", json!({ "direction": "east" })).await;
        h.call("drop_item", json!({ "item": "lantern" })).await;
        let session = h.session().await;
        assert!(session.payload().inventory.is_empty());
        assert!(session.payload().world.locations["market_lane"]
            .items
            .contains(&"lantern".to_string()));
    }

    #[tokio::test]
    async fn world_edits_stay_in_the_session() {
        let h = started().await;
        h.call(
            "update_world",
            json!({ "location": "Forest Edge", "description": "The gate stands open." }),
        )
        .await;

        let other = h.dispatcher.store().create();
        let fresh = h.dispatcher.store().get(other).await.unwrap();
        assert_ne!(
            fresh.payload().world.locations["forest_edge"].description,
            "The gate stands open."
        );
        assert_eq!(
            h.session().await.payload().world.locations["forest_edge"].description,
            "The gate stands open."
        );
        assert_eq!(
            h.dispatcher.store().refs().locations["forest_edge"].description,
            fresh.payload().world.locations["forest_edge"].description
        );
    }

    #[tokio::test]
    async fn quest_status_is_an_enumeration() {
        let h = started().await;
        let err = h
            .fail("update_quest", json!({ "quest": "relight_lanterns", "status": "done" }))
            .await;
        assert!(matches!(err, DialogueError::Validation(_)));

        let result = h
            .call(
                "update_quest",
                json!({ "quest": "relight_lanterns", "status": "completed" }),
            )
            .await;
        assert!(result.text.starts_with("Quest complete"));
    }

    #[tokio::test]
    async fn ending_commits_a_summary() {
        let h = started().await;
        h.call(
            "update_quest",
            json!({ "quest": "relight_lanterns", "status": "completed" }),
        )
        .await;
        let result = h
            .call("end_adventure", json!({ "epilogue": "The lanterns burn again." }))
            .await;
        assert!(result.completed);
        assert!(result.text.contains("1 of 2 quests"));

        let snapshot = &h.gateway.snapshots()[0];
        assert_eq!(snapshot["phase"], "ended");
        assert_eq!(snapshot["payload"]["player_name"], "Rowan");
        assert_eq!(snapshot["payload"]["quests"]["relight_lanterns"], "completed");
    }
}
