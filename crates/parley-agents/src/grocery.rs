//! Grocery ordering against a fixed catalog, with recipe shortcuts.

use std::path::Path;

use parley_core::normalize::{canonical, contains_keyword};
use parley_core::{
    DialogueError, Domain, ParamSpec, Params, Phase, RegistryError, Session, Slot, ToolDescriptor,
    ToolEffects, ToolRegistry,
};
use serde::ser::SerializeStruct;
use serde::{Deserialize, Serialize, Serializer};

use crate::error::ReferenceDataError;
use crate::{format_cents, reference};

const BUILTIN_CATALOG: &str = include_str!("../data/grocery_catalog.json");

/// A product that can be put in the cart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogItem {
    pub id: String,
    pub name: String,
    pub category: String,
    pub price_cents: i64,
    #[serde(default)]
    pub tags: Vec<String>,
}

/// A named bundle of catalog item ids.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Recipe {
    pub name: String,
    pub items: Vec<String>,
}

/// The catalog and recipe book shared by every grocery session.
#[derive(Debug, Clone, Deserialize)]
pub struct GroceryCatalog {
    pub items: Vec<CatalogItem>,
    #[serde(default)]
    pub recipes: Vec<Recipe>,
}

impl GroceryCatalog {
    /// Loads the catalog from `path`, or the built-in catalog.
    ///
    /// # Errors
    ///
    /// Returns `ReferenceDataError` if the data cannot be read or parsed, or
    /// if a recipe names an item id missing from the catalog.
    pub fn load(path: Option<&Path>) -> Result<Self, ReferenceDataError> {
        let catalog: Self = reference::load_or_builtin(path, "grocery_catalog", BUILTIN_CATALOG)?;
        catalog.validate()?;
        Ok(catalog)
    }

    fn validate(&self) -> Result<(), ReferenceDataError> {
        for item in &self.items {
            if item.price_cents < 0 {
                return Err(reference::invalid(
                    "grocery_catalog",
                    format!("item {} has a negative price", item.id),
                ));
            }
        }
        for recipe in &self.recipes {
            if let Some(missing) = recipe.items.iter().find(|id| self.by_id(id).is_none()) {
                return Err(reference::invalid(
                    "grocery_catalog",
                    format!("recipe {} references unknown item {missing}", recipe.name),
                ));
            }
        }
        Ok(())
    }

    pub fn by_id(&self, id: &str) -> Option<&CatalogItem> {
        self.items.iter().find(|item| item.id == id)
    }

    /// Resolves spoken item text by id, then exact name, then unique partial
    /// name.
    pub fn find_item(&self, query: &str) -> Result<&CatalogItem, DialogueError> {
        let query = query.trim().to_lowercase();
        if let Some(item) = self
            .items
            .iter()
            .find(|item| item.id.to_lowercase() == query || item.name.to_lowercase() == query)
        {
            return Ok(item);
        }

        let partial: Vec<&CatalogItem> = self
            .items
            .iter()
            .filter(|item| item.name.to_lowercase().contains(&query))
            .collect();
        match partial.as_slice() {
            [item] => Ok(item),
            [] => Err(DialogueError::precondition(format!(
                "Sorry, I couldn't find {query} in our catalog."
            ))),
            several => Err(DialogueError::precondition(format!(
                "I found a few matches for {query}: {}. Which one did you mean?",
                several
                    .iter()
                    .map(|item| item.name.as_str())
                    .collect::<Vec<_>>()
                    .join(", ")
            ))),
        }
    }

    /// Resolves a recipe whose name and the query share a whole-word run:
    /// "stuff for pasta" finds "pasta", "peanut butter" finds "peanut
    /// butter sandwich".
    pub fn find_recipe(&self, query: &str) -> Option<&Recipe> {
        if canonical(query).is_empty() {
            return None;
        }
        self.recipes.iter().find(|recipe| {
            contains_keyword(query, &recipe.name) || contains_keyword(&recipe.name, query)
        })
    }
}

/// One cart line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CartLine {
    pub item_id: String,
    pub name: String,
    pub unit_price_cents: i64,
    pub quantity: u32,
}

impl CartLine {
    pub fn subtotal_cents(&self) -> i64 {
        self.unit_price_cents * i64::from(self.quantity)
    }
}

/// Cart lines in insertion order. The total is always computed from the
/// lines.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Cart {
    lines: Vec<CartLine>,
}

impl Cart {
    pub fn lines(&self) -> &[CartLine] {
        &self.lines
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn total_cents(&self) -> i64 {
        self.lines.iter().map(CartLine::subtotal_cents).sum()
    }

    pub fn item_count(&self) -> u32 {
        self.lines.iter().map(|line| line.quantity).sum()
    }

    /// Adds `quantity` of `item`, merging with an existing line. Returns the
    /// line's new quantity.
    pub fn add(&mut self, item: &CatalogItem, quantity: u32) -> u32 {
        if let Some(line) = self.lines.iter_mut().find(|l| l.item_id == item.id) {
            line.quantity = line.quantity.saturating_add(quantity);
            return line.quantity;
        }
        self.lines.push(CartLine {
            item_id: item.id.clone(),
            name: item.name.clone(),
            unit_price_cents: item.price_cents,
            quantity,
        });
        quantity
    }

    pub fn remove(&mut self, item_id: &str) -> Option<CartLine> {
        let index = self.lines.iter().position(|l| l.item_id == item_id)?;
        Some(self.lines.remove(index))
    }

    /// Sets a line's quantity; zero removes the line. Returns whether the
    /// item was in the cart.
    pub fn set_quantity(&mut self, item_id: &str, quantity: u32) -> bool {
        if quantity == 0 {
            return self.remove(item_id).is_some();
        }
        match self.lines.iter_mut().find(|l| l.item_id == item_id) {
            Some(line) => {
                line.quantity = quantity;
                true
            }
            None => false,
        }
    }

    /// Spoken summary of the cart.
    pub fn summary(&self) -> String {
        if self.lines.is_empty() {
            return "Your cart is empty.".to_string();
        }
        let lines: Vec<String> = self
            .lines
            .iter()
            .map(|l| format!("{} x {}", l.quantity, l.name))
            .collect();
        format!(
            "You have {}. Your total is {}.",
            lines.join(", "),
            format_cents(self.total_cents())
        )
    }
}

impl Serialize for Cart {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("Cart", 2)?;
        state.serialize_field("lines", &self.lines)?;
        state.serialize_field("total_cents", &self.total_cents())?;
        state.end()
    }
}

/// The grocery domain.
#[derive(Debug)]
pub struct Grocery;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GroceryPhase {
    Shopping,
    Checkout,
    Placed,
}

impl Phase for GroceryPhase {
    const INITIAL: Self = Self::Shopping;

    fn successors(self) -> &'static [Self] {
        match self {
            Self::Shopping => &[Self::Checkout],
            Self::Checkout => &[Self::Shopping, Self::Placed],
            Self::Placed => &[],
        }
    }

    fn is_terminal(self) -> bool {
        matches!(self, Self::Placed)
    }

    fn as_str(self) -> &'static str {
        match self {
            Self::Shopping => "shopping",
            Self::Checkout => "checkout",
            Self::Placed => "placed",
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct GroceryOrder {
    pub cart: Cart,
    pub customer_name: Slot<String>,
    pub address: Slot<String>,
}

impl Domain for Grocery {
    const NAME: &'static str = "grocery";
    type Phase = GroceryPhase;
    type Payload = GroceryOrder;
    type Refs = GroceryCatalog;

    fn initial_payload(_refs: &GroceryCatalog) -> GroceryOrder {
        GroceryOrder::default()
    }

    fn commit_label(order: &GroceryOrder) -> Option<String> {
        order.customer_name.get().cloned()
    }
}

/// Cart edits are allowed while shopping; at checkout they reopen shopping.
fn ensure_shopping(session: &mut Session<Grocery>) -> Result<(), DialogueError> {
    match session.phase() {
        GroceryPhase::Shopping => Ok(()),
        GroceryPhase::Checkout => session.advance(GroceryPhase::Shopping),
        GroceryPhase::Placed => Err(DialogueError::precondition(
            "That order has already been placed.",
        )),
    }
}

fn quantity(params: &Params, name: &str) -> Result<u32, DialogueError> {
    let raw = params.integer(name)?;
    u32::try_from(raw).map_err(|_| DialogueError::invalid(format!("{name} out of range")))
}

/// Builds the grocery tool registry.
///
/// # Errors
///
/// Returns `RegistryError` if two tools share a name.
pub fn registry() -> Result<ToolRegistry<Grocery>, RegistryError> {
    let mut registry = ToolRegistry::new();

    registry.register(
        ToolDescriptor::new(
            "add_item",
            "Add a catalog item to the cart.",
            ToolEffects::MUTATES,
            |session: &mut Session<Grocery>, params, catalog: &GroceryCatalog| {
                let item = catalog.find_item(params.text("item")?)?;
                let qty = quantity(params, "quantity")?;
                ensure_shopping(session)?;
                let cart = &mut session.payload_mut().cart;
                let now = cart.add(item, qty);
                Ok(format!(
                    "Added {qty} {}. You now have {now} in your cart. Cart total: {}.",
                    item.name,
                    format_cents(cart.total_cents())
                ))
            },
        )
        .param(ParamSpec::string("item", "Item id or name"))
        .param(
            ParamSpec::integer("quantity", "How many to add")
                .bounded(1, 99)
                .with_default(1),
        ),
    )?;

    registry.register(
        ToolDescriptor::new(
            "remove_item",
            "Remove an item from the cart entirely.",
            ToolEffects::MUTATES,
            |session: &mut Session<Grocery>, params, catalog: &GroceryCatalog| {
                let item = catalog.find_item(params.text("item")?)?;
                ensure_shopping(session)?;
                let cart = &mut session.payload_mut().cart;
                if cart.remove(&item.id).is_none() {
                    return Err(DialogueError::precondition(format!(
                        "There's no {} in your cart.",
                        item.name
                    )));
                }
                Ok(format!(
                    "Removed {}. Cart total: {}.",
                    item.name,
                    format_cents(cart.total_cents())
                ))
            },
        )
        .param(ParamSpec::string("item", "Item id or name")),
    )?;

    registry.register(
        ToolDescriptor::new(
            "update_quantity",
            "Set the quantity of an item already in the cart; zero removes it.",
            ToolEffects::MUTATES,
            |session: &mut Session<Grocery>, params, catalog: &GroceryCatalog| {
                let item = catalog.find_item(params.text("item")?)?;
                let qty = quantity(params, "quantity")?;
                ensure_shopping(session)?;
                let cart = &mut session.payload_mut().cart;
                if !cart.set_quantity(&item.id, qty) {
                    return Err(DialogueError::precondition(format!(
                        "There's no {} in your cart yet.",
                        item.name
                    )));
                }
                let done = if qty == 0 {
                    format!("Removed {}.", item.name)
                } else {
                    format!("Updated {} to {qty}.", item.name)
                };
                Ok(format!("{done} Cart total: {}.", format_cents(cart.total_cents())))
            },
        )
        .param(ParamSpec::string("item", "Item id or name"))
        .param(ParamSpec::integer("quantity", "New quantity").bounded(0, 99)),
    )?;

    registry.register(
        ToolDescriptor::new(
            "add_recipe_ingredients",
            "Add one of each ingredient for a known recipe.",
            ToolEffects::MUTATES,
            |session: &mut Session<Grocery>, params, catalog: &GroceryCatalog| {
                let query = params.text("recipe")?;
                let recipe = catalog.find_recipe(query).ok_or_else(|| {
                    DialogueError::precondition(format!(
                        "I don't have a recipe for {query}. Try asking for the items one by one."
                    ))
                })?;
                ensure_shopping(session)?;
                let mut added = Vec::with_capacity(recipe.items.len());
                for id in &recipe.items {
                    let item = catalog.by_id(id).ok_or_else(|| {
                        DialogueError::Storage(format!("recipe {} names unknown item {id}", recipe.name))
                    })?;
                    session.payload_mut().cart.add(item, 1);
                    added.push(item.name.as_str());
                }
                Ok(format!(
                    "For {} I've added {}. Cart total: {}.",
                    recipe.name,
                    added.join(", "),
                    format_cents(session.payload().cart.total_cents())
                ))
            },
        )
        .param(ParamSpec::string("recipe", "Recipe or dish name")),
    )?;

    registry.register(ToolDescriptor::new(
        "view_cart",
        "Read back the cart and its total.",
        ToolEffects::READ_ONLY,
        |session: &mut Session<Grocery>, _, _| Ok(session.payload().cart.summary()),
    ))?;

    registry.register(ToolDescriptor::new(
        "begin_checkout",
        "Move to checkout with the current cart.",
        ToolEffects::MUTATES,
        |session: &mut Session<Grocery>, _, _| {
            match session.phase() {
                GroceryPhase::Shopping => {}
                GroceryPhase::Checkout => {
                    return Err(DialogueError::precondition(
                        "We're already at checkout. Who is the order for, and where should we deliver it?",
                    ))
                }
                GroceryPhase::Placed => {
                    return Err(DialogueError::precondition(
                        "That order has already been placed.",
                    ))
                }
            }
            if session.payload().cart.is_empty() {
                return Err(DialogueError::precondition(
                    "Your cart is empty. What would you like to add?",
                ));
            }
            session.advance(GroceryPhase::Checkout)?;
            Ok(format!(
                "{} Who is the order for, and where should we deliver it?",
                session.payload().cart.summary()
            ))
        },
    ))?;

    registry.register(
        ToolDescriptor::new(
            "place_order",
            "Place the order for delivery.",
            ToolEffects::MUTATES.writing_storage(),
            |session: &mut Session<Grocery>, params, _| {
                match session.phase() {
                    GroceryPhase::Checkout => {}
                    GroceryPhase::Shopping => {
                        return Err(DialogueError::precondition(
                            "Let's head to checkout first so I can read back your cart.",
                        ))
                    }
                    GroceryPhase::Placed => {
                        return Err(DialogueError::precondition(
                            "That order has already been placed.",
                        ))
                    }
                }
                let name = params.text("customer_name")?.to_string();
                let address = params.text("address")?.to_string();
                let order = session.payload_mut();
                order.customer_name.fill(name.clone());
                order.address.fill(address.clone());
                let count = order.cart.item_count();
                let total = format_cents(order.cart.total_cents());
                session.advance(GroceryPhase::Placed)?;
                Ok(format!(
                    "Thanks {name}! Your order of {count} items totaling {total} will be delivered to {address}."
                ))
            },
        )
        .param(ParamSpec::string("customer_name", "Name for the order"))
        .param(ParamSpec::string("address", "Delivery address")),
    )?;

    Ok(registry)
}
