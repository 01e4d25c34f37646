//! BrewVerse coffee ordering.
//!
//! A five-step slot-filling machine: drink, size, milk, extras, name. Each
//! step has its own tool that is only accepted while the cursor is on that
//! step, so a turn can never fill more than one field.

use parley_core::normalize::{is_negative_answer, split_list, SIZE_TABLE};
use parley_core::{
    Conversational, DialogueError, Domain, ParamSpec, Phase, RegistryError, Route, Session, Slot,
    ToolDescriptor, ToolEffects, ToolRegistry,
};
use serde::Serialize;
use serde_json::json;

/// The coffee ordering domain.
#[derive(Debug)]
pub struct Coffee;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CoffeePhase {
    CollectingDrink,
    CollectingSize,
    CollectingMilk,
    CollectingExtras,
    CollectingName,
    Complete,
}

impl Phase for CoffeePhase {
    const INITIAL: Self = Self::CollectingDrink;

    fn successors(self) -> &'static [Self] {
        match self {
            Self::CollectingDrink => &[Self::CollectingSize],
            Self::CollectingSize => &[Self::CollectingMilk],
            Self::CollectingMilk => &[Self::CollectingExtras],
            Self::CollectingExtras => &[Self::CollectingName],
            Self::CollectingName => &[Self::Complete],
            Self::Complete => &[],
        }
    }

    fn is_terminal(self) -> bool {
        matches!(self, Self::Complete)
    }

    fn as_str(self) -> &'static str {
        match self {
            Self::CollectingDrink => "collecting_drink",
            Self::CollectingSize => "collecting_size",
            Self::CollectingMilk => "collecting_milk",
            Self::CollectingExtras => "collecting_extras",
            Self::CollectingName => "collecting_name",
            Self::Complete => "complete",
        }
    }
}

impl CoffeePhase {
    /// The question asked while waiting in this phase.
    fn prompt(self) -> &'static str {
        match self {
            Self::CollectingDrink => "What would you like to order today?",
            Self::CollectingSize => "What size would you like? small, medium, or large",
            Self::CollectingMilk => "Which milk would you prefer? (dairy, oat, almond, soy, skim)",
            Self::CollectingExtras => {
                "Any extras? For example, whipped cream, caramel, extra shot. Say 'no' if none."
            }
            Self::CollectingName => "Can I get the name for the order please?",
            Self::Complete => ALREADY_COMPLETE,
        }
    }
}

/// One drink order.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CoffeeOrder {
    pub drink_type: Slot<String>,
    pub size: Slot<String>,
    pub milk: Slot<String>,
    pub extras: Slot<Vec<String>>,
    pub name: Slot<String>,
}

impl CoffeeOrder {
    /// Spoken restatement of every collected field.
    pub fn confirmation(&self) -> String {
        let field = |slot: &Slot<String>| slot.get().cloned().unwrap_or_default();
        let extras = match self.extras.get() {
            Some(extras) if !extras.is_empty() => extras.join(", "),
            _ => "no extras".to_string(),
        };
        format!(
            "Thanks {}. I have a {} {} with {} milk and {}. Your order will be ready shortly.",
            field(&self.name),
            field(&self.size),
            field(&self.drink_type),
            field(&self.milk),
            extras,
        )
    }
}

const ALREADY_COMPLETE: &str =
    "Your order is already complete. If you want to place another order, say 'new order'.";

impl Domain for Coffee {
    const NAME: &'static str = "coffee";
    type Phase = CoffeePhase;
    type Payload = CoffeeOrder;
    type Refs = ();

    fn initial_payload(_refs: &()) -> CoffeeOrder {
        CoffeeOrder::default()
    }

    fn commit_label(order: &CoffeeOrder) -> Option<String> {
        order.name.get().cloned()
    }
}

impl Conversational for Coffee {
    fn greeting() -> &'static str {
        "Welcome to BrewVerse. What would you like to order today?"
    }

    fn restart_reply() -> &'static str {
        "Sure. What would you like to order today?"
    }

    fn completed_reply() -> &'static str {
        ALREADY_COMPLETE
    }

    fn route(session: &Session<Self>, utterance: &str) -> Route {
        let (tool, param) = match session.phase() {
            CoffeePhase::CollectingDrink => ("set_drink", "drink"),
            CoffeePhase::CollectingSize => ("set_size", "size"),
            CoffeePhase::CollectingMilk => ("set_milk", "milk"),
            CoffeePhase::CollectingExtras => ("set_extras", "extras"),
            CoffeePhase::CollectingName => ("set_name", "name"),
            CoffeePhase::Complete => return Route::Reply(ALREADY_COMPLETE.to_string()),
        };
        Route::Invoke {
            tool,
            params: json!({ param: utterance }),
        }
    }
}

fn expect_phase(session: &Session<Coffee>, expected: CoffeePhase) -> Result<(), DialogueError> {
    match session.phase() {
        current if current == expected => Ok(()),
        CoffeePhase::Complete => Err(DialogueError::precondition(ALREADY_COMPLETE)),
        current => Err(DialogueError::precondition(format!(
            "Let's take it one step at a time. {}",
            current.prompt()
        ))),
    }
}

/// Builds the coffee tool registry.
///
/// # Errors
///
/// Returns `RegistryError` if two tools share a name.
pub fn registry() -> Result<ToolRegistry<Coffee>, RegistryError> {
    let mut registry = ToolRegistry::new();

    registry.register(
        ToolDescriptor::new(
            "set_drink",
            "Record the drink the customer wants, e.g. latte or cold brew.",
            ToolEffects::MUTATES,
            |session: &mut Session<Coffee>, params, _| {
                expect_phase(session, CoffeePhase::CollectingDrink)?;
                let drink = params.text("drink")?.to_string();
                session.payload_mut().drink_type.fill(drink);
                session.advance(CoffeePhase::CollectingSize)?;
                Ok(format!("Great. {}", CoffeePhase::CollectingSize.prompt()))
            },
        )
        .param(ParamSpec::string("drink", "Drink name as spoken")),
    )?;

    registry.register(
        ToolDescriptor::new(
            "set_size",
            "Record the drink size. Unrecognised sizes are kept as spoken.",
            ToolEffects::MUTATES,
            |session: &mut Session<Coffee>, params, _| {
                expect_phase(session, CoffeePhase::CollectingSize)?;
                let size = SIZE_TABLE.normalize(params.text("size")?);
                session.payload_mut().size.fill(size);
                session.advance(CoffeePhase::CollectingMilk)?;
                Ok(format!("Okay. {}", CoffeePhase::CollectingMilk.prompt()))
            },
        )
        .param(ParamSpec::string("size", "small, medium, large, or as spoken")),
    )?;

    registry.register(
        ToolDescriptor::new(
            "set_milk",
            "Record the milk choice.",
            ToolEffects::MUTATES,
            |session: &mut Session<Coffee>, params, _| {
                expect_phase(session, CoffeePhase::CollectingMilk)?;
                let milk = params.text("milk")?.to_string();
                session.payload_mut().milk.fill(milk);
                session.advance(CoffeePhase::CollectingExtras)?;
                Ok(CoffeePhase::CollectingExtras.prompt().to_string())
            },
        )
        .param(ParamSpec::string("milk", "Milk as spoken")),
    )?;

    registry.register(
        ToolDescriptor::new(
            "set_extras",
            "Record extras as spoken; 'no' or 'none' records no extras.",
            ToolEffects::MUTATES,
            |session: &mut Session<Coffee>, params, _| {
                expect_phase(session, CoffeePhase::CollectingExtras)?;
                let spoken = params.text("extras")?;
                let extras = if is_negative_answer(spoken) {
                    Vec::new()
                } else {
                    split_list(spoken)
                };
                session.payload_mut().extras.fill(extras);
                session.advance(CoffeePhase::CollectingName)?;
                Ok(format!("Perfect. {}", CoffeePhase::CollectingName.prompt()))
            },
        )
        .param(ParamSpec::string("extras", "Extras as spoken, or 'no'")),
    )?;

    registry.register(
        ToolDescriptor::new(
            "set_name",
            "Record the name for the order and complete it.",
            ToolEffects::MUTATES.writing_storage(),
            |session: &mut Session<Coffee>, params, _| {
                expect_phase(session, CoffeePhase::CollectingName)?;
                let name = params.text("name")?.to_string();
                session.payload_mut().name.fill(name);
                session.advance(CoffeePhase::Complete)?;
                Ok(session.payload().confirmation())
            },
        )
        .param(ParamSpec::string("name", "Customer name")),
    )?;

    registry.register(ToolDescriptor::new(
        "get_order",
        "Read back the order so far.",
        ToolEffects::READ_ONLY,
        |session: &mut Session<Coffee>, _, _| {
            let order = session.payload();
            if session.is_complete() {
                return Ok(order.confirmation());
            }
            let mut parts = Vec::new();
            if let Some(size) = order.size.get() {
                parts.push(size.clone());
            }
            if let Some(drink) = order.drink_type.get() {
                parts.push(drink.clone());
            }
            if let Some(milk) = order.milk.get() {
                parts.push(format!("with {milk} milk"));
            }
            if parts.is_empty() {
                return Ok(format!("Nothing yet. {}", session.phase().prompt()));
            }
            Ok(format!(
                "So far I have {}. {}",
                parts.join(" "),
                session.phase().prompt()
            ))
        },
    ))?;

    Ok(registry)
}
