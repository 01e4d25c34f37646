//! Tool descriptors, parameter schemas, and the registry that validates
//! raw parameter objects against them.
//!
//! Validation policy:
//!
//! - parameters must arrive as a JSON object (`null` is treated as `{}`);
//! - unknown parameter names are rejected;
//! - required parameters must be present and non-blank;
//! - values are coerced where the intent is unambiguous (`"3"` to `3`,
//!   `"yes"` to `true`, a comma separated string to a list);
//! - integers outside declared bounds are clamped, never rejected.

use std::collections::BTreeMap;
use std::sync::Arc;

use parley_types::ToolEffects;
use serde_json::{json, Map, Value};

use crate::error::{DialogueError, RegistryError};
use crate::normalize::split_list;
use crate::session::{Domain, Session};

/// Type of a tool parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamKind {
    /// Free text, trimmed.
    String,
    /// A whole number, optionally clamped to `[min, max]`.
    Integer {
        /// Inclusive lower bound.
        min: Option<i64>,
        /// Inclusive upper bound.
        max: Option<i64>,
    },
    /// A floating-point number.
    Number,
    /// A boolean flag.
    Boolean,
    /// A list of free-text items.
    StringList,
}

impl ParamKind {
    fn json_type(self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Integer { .. } => "integer",
            Self::Number => "number",
            Self::Boolean => "boolean",
            Self::StringList => "array",
        }
    }
}

/// Declaration of one named parameter.
#[derive(Debug, Clone, PartialEq)]
pub struct ParamSpec {
    pub name: &'static str,
    pub description: &'static str,
    pub kind: ParamKind,
    pub required: bool,
    pub default: Option<Value>,
}

impl ParamSpec {
    fn new(name: &'static str, description: &'static str, kind: ParamKind) -> Self {
        Self {
            name,
            description,
            kind,
            required: true,
            default: None,
        }
    }

    /// A required free-text parameter.
    pub fn string(name: &'static str, description: &'static str) -> Self {
        Self::new(name, description, ParamKind::String)
    }

    /// A required unbounded integer parameter.
    pub fn integer(name: &'static str, description: &'static str) -> Self {
        Self::new(
            name,
            description,
            ParamKind::Integer {
                min: None,
                max: None,
            },
        )
    }

    /// A required number parameter.
    pub fn number(name: &'static str, description: &'static str) -> Self {
        Self::new(name, description, ParamKind::Number)
    }

    /// A required boolean parameter.
    pub fn boolean(name: &'static str, description: &'static str) -> Self {
        Self::new(name, description, ParamKind::Boolean)
    }

    /// A required list-of-strings parameter.
    pub fn list(name: &'static str, description: &'static str) -> Self {
        Self::new(name, description, ParamKind::StringList)
    }

    /// Marks the parameter optional with no default.
    pub fn optional(mut self) -> Self {
        self.required = false;
        self
    }

    /// Marks the parameter optional, filled with `value` when absent.
    pub fn with_default(mut self, value: impl Into<Value>) -> Self {
        self.required = false;
        self.default = Some(value.into());
        self
    }

    /// Declares clamp bounds for an integer parameter. No effect on other kinds.
    pub fn bounded(mut self, min: i64, max: i64) -> Self {
        if let ParamKind::Integer { .. } = self.kind {
            self.kind = ParamKind::Integer {
                min: Some(min),
                max: Some(max),
            };
        }
        self
    }

    fn schema(&self) -> Value {
        let mut schema = json!({
            "type": self.kind.json_type(),
            "description": self.description,
        });
        if let ParamKind::StringList = self.kind {
            schema["items"] = json!({ "type": "string" });
        }
        if let ParamKind::Integer { min, max } = self.kind {
            if let Some(min) = min {
                schema["minimum"] = json!(min);
            }
            if let Some(max) = max {
                schema["maximum"] = json!(max);
            }
        }
        if let Some(default) = &self.default {
            schema["default"] = default.clone();
        }
        schema
    }

    /// Coerces a raw value to this parameter's kind.
    ///
    /// Returns `Ok(None)` when the value is blank and should be treated as
    /// absent.
    fn coerce(&self, raw: &Value) -> Result<Option<Value>, String> {
        match (self.kind, raw) {
            (_, Value::Null) => Ok(None),

            (ParamKind::String, Value::String(s)) => {
                let trimmed = s.trim();
                Ok((!trimmed.is_empty()).then(|| Value::String(trimmed.to_string())))
            }
            (ParamKind::String, Value::Number(n)) => Ok(Some(Value::String(n.to_string()))),
            (ParamKind::String, Value::Bool(b)) => Ok(Some(Value::String(b.to_string()))),

            (ParamKind::Integer { min, max }, raw) => {
                let parsed = match raw {
                    Value::Number(n) => n
                        .as_i64()
                        .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64)),
                    Value::String(s) if s.trim().is_empty() => return Ok(None),
                    Value::String(s) => s.trim().parse::<i64>().ok().or_else(|| {
                        s.trim()
                            .parse::<f64>()
                            .ok()
                            .filter(|f| f.fract() == 0.0)
                            .map(|f| f as i64)
                    }),
                    _ => None,
                };
                let value = parsed.ok_or_else(|| "expected a whole number".to_string())?;
                let clamped = clamp(value, min, max);
                if clamped != value {
                    tracing::debug!(
                        param = self.name,
                        requested = value,
                        clamped,
                        "integer parameter clamped to bounds"
                    );
                }
                Ok(Some(json!(clamped)))
            }

            (ParamKind::Number, Value::Number(n)) => Ok(Some(Value::Number(n.clone()))),
            (ParamKind::Number, Value::String(s)) if s.trim().is_empty() => Ok(None),
            (ParamKind::Number, Value::String(s)) => s
                .trim()
                .parse::<f64>()
                .ok()
                .and_then(serde_json::Number::from_f64)
                .map(|n| Some(Value::Number(n)))
                .ok_or_else(|| "expected a number".to_string()),

            (ParamKind::Boolean, Value::Bool(b)) => Ok(Some(Value::Bool(*b))),
            (ParamKind::Boolean, Value::Number(n)) => match n.as_i64() {
                Some(0) => Ok(Some(Value::Bool(false))),
                Some(1) => Ok(Some(Value::Bool(true))),
                _ => Err("expected true or false".to_string()),
            },
            (ParamKind::Boolean, Value::String(s)) => {
                match s.trim().to_ascii_lowercase().as_str() {
                    "" => Ok(None),
                    "true" | "yes" | "y" | "1" => Ok(Some(Value::Bool(true))),
                    "false" | "no" | "n" | "0" => Ok(Some(Value::Bool(false))),
                    _ => Err("expected true or false".to_string()),
                }
            }

            (ParamKind::StringList, Value::Array(items)) => {
                let mut out = Vec::with_capacity(items.len());
                for item in items {
                    match item {
                        Value::String(s) if !s.trim().is_empty() => {
                            out.push(Value::String(s.trim().to_string()))
                        }
                        Value::String(_) | Value::Null => {}
                        Value::Number(_) | Value::Bool(_) => {
                            out.push(Value::String(item.to_string()))
                        }
                        _ => return Err("expected a list of strings".to_string()),
                    }
                }
                Ok(Some(Value::Array(out)))
            }
            (ParamKind::StringList, Value::String(s)) => Ok(Some(Value::Array(
                split_list(s).into_iter().map(Value::String).collect(),
            ))),

            (kind, _) => Err(format!("expected {}", kind.json_type())),
        }
    }
}

fn clamp(value: i64, min: Option<i64>, max: Option<i64>) -> i64 {
    let value = min.map_or(value, |min| value.max(min));
    max.map_or(value, |max| value.min(max))
}

/// Validated parameters handed to a tool handler.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Params(BTreeMap<String, Value>);

impl Params {
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.get(name)
    }

    /// A required string parameter.
    pub fn text(&self, name: &str) -> Result<&str, DialogueError> {
        self.opt_text(name)
            .ok_or_else(|| DialogueError::invalid(format!("missing text parameter '{name}'")))
    }

    pub fn opt_text(&self, name: &str) -> Option<&str> {
        self.0.get(name).and_then(Value::as_str)
    }

    /// A required integer parameter.
    pub fn integer(&self, name: &str) -> Result<i64, DialogueError> {
        self.opt_integer(name)
            .ok_or_else(|| DialogueError::invalid(format!("missing integer parameter '{name}'")))
    }

    pub fn opt_integer(&self, name: &str) -> Option<i64> {
        self.0.get(name).and_then(Value::as_i64)
    }

    pub fn number(&self, name: &str) -> Result<f64, DialogueError> {
        self.0
            .get(name)
            .and_then(Value::as_f64)
            .ok_or_else(|| DialogueError::invalid(format!("missing number parameter '{name}'")))
    }

    pub fn flag(&self, name: &str) -> Option<bool> {
        self.0.get(name).and_then(Value::as_bool)
    }

    /// A list parameter; absent lists are empty.
    pub fn list(&self, name: &str) -> Vec<String> {
        self.0
            .get(name)
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(|v| v.as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// Handler signature: mutate the working copy of the session, return the
/// result text for the decision source.
pub type Handler<D> = dyn Fn(&mut Session<D>, &Params, &<D as Domain>::Refs) -> Result<String, DialogueError>
    + Send
    + Sync;

/// A named operation registered once and immutable afterwards.
pub struct ToolDescriptor<D: Domain> {
    name: &'static str,
    description: &'static str,
    params: Vec<ParamSpec>,
    effects: ToolEffects,
    handler: Box<Handler<D>>,
}

impl<D: Domain> std::fmt::Debug for ToolDescriptor<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolDescriptor")
            .field("name", &self.name)
            .field("params", &self.params)
            .field("effects", &self.effects)
            .finish_non_exhaustive()
    }
}

impl<D: Domain> ToolDescriptor<D> {
    pub fn new<F>(
        name: &'static str,
        description: &'static str,
        effects: ToolEffects,
        handler: F,
    ) -> Self
    where
        F: Fn(&mut Session<D>, &Params, &D::Refs) -> Result<String, DialogueError>
            + Send
            + Sync
            + 'static,
    {
        Self {
            name,
            description,
            params: Vec::new(),
            effects,
            handler: Box::new(handler),
        }
    }

    /// Adds a parameter declaration.
    pub fn param(mut self, spec: ParamSpec) -> Self {
        self.params.push(spec);
        self
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn description(&self) -> &'static str {
        self.description
    }

    pub fn params(&self) -> &[ParamSpec] {
        &self.params
    }

    pub fn effects(&self) -> ToolEffects {
        self.effects
    }

    pub(crate) fn call(
        &self,
        session: &mut Session<D>,
        params: &Params,
        refs: &D::Refs,
    ) -> Result<String, DialogueError> {
        (self.handler)(session, params, refs)
    }

    /// JSON function schema published to the decision source.
    pub fn schema(&self) -> Value {
        let properties: Map<String, Value> = self
            .params
            .iter()
            .map(|p| (p.name.to_string(), p.schema()))
            .collect();
        let required: Vec<&str> = self
            .params
            .iter()
            .filter(|p| p.required)
            .map(|p| p.name)
            .collect();

        json!({
            "name": self.name,
            "description": self.description,
            "parameters": {
                "type": "object",
                "properties": properties,
                "required": required,
            }
        })
    }

    fn validate(&self, raw: &Value) -> Result<Params, DialogueError> {
        let empty = Map::new();
        let object = match raw {
            Value::Object(map) => map,
            Value::Null => &empty,
            _ => {
                return Err(DialogueError::invalid(format!(
                    "parameters for '{}' must be an object",
                    self.name
                )))
            }
        };

        if let Some(unknown) = object
            .keys()
            .find(|key| !self.params.iter().any(|p| p.name == key.as_str()))
        {
            return Err(DialogueError::invalid(format!(
                "unknown parameter '{unknown}' for '{}'",
                self.name
            )));
        }

        let mut validated = BTreeMap::new();
        for spec in &self.params {
            let coerced = match object.get(spec.name) {
                Some(value) => spec.coerce(value).map_err(|reason| {
                    DialogueError::invalid(format!(
                        "parameter '{}' for '{}': {reason}",
                        spec.name, self.name
                    ))
                })?,
                None => None,
            };

            match (coerced, &spec.default) {
                (Some(value), _) => {
                    validated.insert(spec.name.to_string(), value);
                }
                (None, Some(default)) => {
                    validated.insert(spec.name.to_string(), default.clone());
                }
                (None, None) if spec.required => {
                    return Err(DialogueError::invalid(format!(
                        "missing required parameter '{}' for '{}'",
                        spec.name, self.name
                    )));
                }
                (None, None) => {}
            }
        }

        Ok(Params(validated))
    }
}

/// Name-to-descriptor map, built at startup and shared read-only.
pub struct ToolRegistry<D: Domain> {
    tools: BTreeMap<&'static str, Arc<ToolDescriptor<D>>>,
}

impl<D: Domain> Default for ToolRegistry<D> {
    fn default() -> Self {
        Self::new()
    }
}

impl<D: Domain> ToolRegistry<D> {
    pub fn new() -> Self {
        Self {
            tools: BTreeMap::new(),
        }
    }

    /// Registers a tool.
    ///
    /// # Errors
    ///
    /// Returns `RegistryError::DuplicateName` if the name is taken; the
    /// existing descriptor is kept.
    pub fn register(&mut self, descriptor: ToolDescriptor<D>) -> Result<(), RegistryError> {
        let name = descriptor.name;
        if self.tools.contains_key(name) {
            return Err(RegistryError::DuplicateName(name.to_string()));
        }
        tracing::debug!(domain = D::NAME, tool = name, "registering tool");
        self.tools.insert(name, Arc::new(descriptor));
        Ok(())
    }

    /// Looks a tool up by name.
    pub fn resolve(&self, name: &str) -> Result<Arc<ToolDescriptor<D>>, DialogueError> {
        self.tools
            .get(name)
            .cloned()
            .ok_or_else(|| DialogueError::ToolNotFound(name.to_string()))
    }

    /// Validates and coerces raw parameters for the named tool.
    pub fn validate(&self, name: &str, raw: &Value) -> Result<Params, DialogueError> {
        self.resolve(name)?.validate(raw)
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.tools.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Every tool's JSON schema, in name order.
    pub fn schema(&self) -> Value {
        Value::Array(self.tools.values().map(|t| t.schema()).collect())
    }
}
