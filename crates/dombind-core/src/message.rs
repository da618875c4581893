//! Wire message types
//!
//! Inbound change messages and outbound event messages, one JSON object per
//! text frame. Inbound text is decoded once, here, into [`ChangeMessage`];
//! nothing past this module looks at `type`/`name` strings.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::MessageError;

/// Outbound name for a click on a clickable element
pub const ON_CLICK: &str = "on_click";
/// Outbound name for a checkbox toggle
pub const CHECKED: &str = "checked";
/// Outbound name for a select or text input value
pub const VALUE: &str = "value";
/// Outbound name for a textarea value; also the inbound text-content slot
pub const TEXT: &str = "text";

/// Inbound update name carrying an attribute mapping
const ATTRS: &str = "attrs";

/// Change message as it appears on the wire
#[derive(Debug, Deserialize)]
struct WireChange {
    #[serde(rename = "ref", default)]
    reference: Option<String>,
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    value: Value,
}

/// A named local effect fired by a `trigger` change
#[derive(Debug, Clone, PartialEq)]
pub struct Effect {
    pub name: String,
    /// The full trigger value when it was an object, `null` otherwise
    pub payload: Value,
}

/// The property slot an `update` change writes
#[derive(Debug, Clone, PartialEq)]
pub enum Update {
    /// First text child of the node
    Text(String),
    /// Several properties at once
    Attrs(Vec<(String, Value)>),
    /// One named property
    Property { name: String, value: Value },
}

/// An inbound change, decoded
#[derive(Debug, Clone, PartialEq)]
pub enum ChangeMessage {
    /// Replace the node's inner content
    Refresh { target: String, markup: String },
    /// Fire a local effect on the node
    Trigger { target: String, effect: Effect },
    /// Set text content or properties
    Update { target: String, update: Update },
    /// Append markup as the node's last child
    Added { target: String, markup: String },
    /// Remove a descendant (or the node itself) by reference
    Removed { target: String, child: String },
    /// A type this client does not know; applying it does nothing
    Unrecognized {
        kind: String,
        target: Option<String>,
    },
}

impl ChangeMessage {
    /// Decode a change from one text frame
    pub fn decode(text: &str) -> Result<Self, MessageError> {
        let wire: WireChange = serde_json::from_str(text)?;
        Self::from_wire(wire)
    }

    fn from_wire(wire: WireChange) -> Result<Self, MessageError> {
        let known = matches!(
            wire.kind.as_str(),
            "refresh" | "trigger" | "update" | "added" | "removed"
        );
        if !known {
            return Ok(ChangeMessage::Unrecognized {
                kind: wire.kind,
                target: wire.reference,
            });
        }

        let Some(target) = wire.reference else {
            return Err(MessageError::MissingRef { kind: wire.kind });
        };
        let invalid = |expected: &'static str| MessageError::InvalidValue {
            kind: wire.kind.clone(),
            reference: target.clone(),
            expected,
        };

        let change = match wire.kind.as_str() {
            "refresh" => ChangeMessage::Refresh {
                markup: markup(&wire.value).ok_or_else(|| invalid("markup string"))?,
                target,
            },
            "added" => ChangeMessage::Added {
                markup: markup(&wire.value).ok_or_else(|| invalid("markup string"))?,
                target,
            },
            "removed" => ChangeMessage::Removed {
                child: scalar_text(&wire.value).ok_or_else(|| invalid("child reference"))?,
                target,
            },
            "trigger" => ChangeMessage::Trigger {
                effect: effect(wire.value.clone()).ok_or_else(|| invalid("effect name"))?,
                target,
            },
            _ => {
                let Some(name) = wire.name.as_deref() else {
                    return Err(MessageError::MissingName { reference: target });
                };
                let update = match name {
                    TEXT => Update::Text(
                        scalar_text(&wire.value)
                            .or_else(|| wire.value.is_null().then(String::new))
                            .ok_or_else(|| invalid("text"))?,
                    ),
                    ATTRS => Update::Attrs(
                        wire.value
                            .as_object()
                            .map(attr_pairs)
                            .ok_or_else(|| invalid("attribute mapping"))?,
                    ),
                    other => Update::Property {
                        name: property_name(other).to_string(),
                        value: wire.value.clone(),
                    },
                };
                ChangeMessage::Update { target, update }
            }
        };
        Ok(change)
    }

    /// Wire `type` of the change
    pub fn kind(&self) -> &str {
        match self {
            ChangeMessage::Refresh { .. } => "refresh",
            ChangeMessage::Trigger { .. } => "trigger",
            ChangeMessage::Update { .. } => "update",
            ChangeMessage::Added { .. } => "added",
            ChangeMessage::Removed { .. } => "removed",
            ChangeMessage::Unrecognized { kind, .. } => kind,
        }
    }

    /// Reference of the node the change addresses
    pub fn target(&self) -> Option<&str> {
        match self {
            ChangeMessage::Refresh { target, .. }
            | ChangeMessage::Trigger { target, .. }
            | ChangeMessage::Update { target, .. }
            | ChangeMessage::Added { target, .. }
            | ChangeMessage::Removed { target, .. } => Some(target),
            ChangeMessage::Unrecognized { target, .. } => target.as_deref(),
        }
    }
}

/// Logical property names that differ from the attribute they set
fn property_name(name: &str) -> &str {
    match name {
        "cls" => "class",
        other => other,
    }
}

fn attr_pairs(map: &Map<String, Value>) -> Vec<(String, Value)> {
    map.iter()
        .map(|(k, v)| (property_name(k).to_string(), v.clone()))
        .collect()
}

fn markup(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Null => Some(String::new()),
        _ => None,
    }
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn effect(value: Value) -> Option<Effect> {
    match value {
        Value::String(name) => Some(Effect {
            name,
            payload: Value::Null,
        }),
        Value::Object(ref map) => {
            let name = map.get("name").and_then(Value::as_str)?.to_string();
            Some(Effect {
                name,
                payload: value,
            })
        }
        _ => None,
    }
}

/// Outbound message `type`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    /// A user action with no value (clicks)
    Event,
    /// A new value for a node's property
    Update,
}

/// Outbound notification of a local interaction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventMessage {
    #[serde(rename = "ref")]
    pub reference: String,
    #[serde(rename = "type")]
    pub kind: EventKind,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
    /// Session identifier; empty until stamped by the engine
    #[serde(default)]
    pub id: String,
}

impl EventMessage {
    /// Create an `event` message with no value
    pub fn event(reference: &str, name: &str) -> Self {
        Self {
            reference: reference.to_string(),
            kind: EventKind::Event,
            name: name.to_string(),
            value: None,
            id: String::new(),
        }
    }

    /// Create an `update` message carrying a value
    pub fn update(reference: &str, name: &str, value: impl Into<Value>) -> Self {
        Self {
            reference: reference.to_string(),
            kind: EventKind::Update,
            name: name.to_string(),
            value: Some(value.into()),
            id: String::new(),
        }
    }

    /// Attach the session identifier
    pub fn stamped(mut self, session_id: &str) -> Self {
        self.id = session_id.to_string();
        self
    }

    /// Encode to JSON text
    pub fn encode(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}
