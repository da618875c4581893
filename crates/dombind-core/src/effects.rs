//! Local effects
//!
//! A `trigger` change fires a named effect on a node without touching its
//! markup. Handlers are registered by name by whatever owns the UI. The
//! most recent firings are kept in a bounded log whether or not a handler
//! exists.

use std::collections::{HashMap, VecDeque};
use std::fmt;

use serde_json::Value;
use tracing::debug;

use crate::dom::NodeId;
use crate::message::Effect;

/// Firings kept by default
pub const DEFAULT_HISTORY: usize = 64;

/// Callback for a named effect
pub type EffectHandler = Box<dyn FnMut(NodeId, &Effect) + Send>;

/// Record of one fired effect
#[derive(Debug, Clone, PartialEq)]
pub struct FiredEffect {
    pub node: NodeId,
    pub reference: String,
    pub name: String,
    pub payload: Value,
}

/// Registry of effect handlers plus a bounded log of fired effects
pub struct EffectRegistry {
    handlers: HashMap<String, EffectHandler>,
    fired: VecDeque<FiredEffect>,
    history: usize,
}

impl Default for EffectRegistry {
    fn default() -> Self {
        Self::with_history(DEFAULT_HISTORY)
    }
}

impl fmt::Debug for EffectRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EffectRegistry")
            .field("handlers", &self.handlers.keys().collect::<Vec<_>>())
            .field("fired", &self.fired)
            .finish()
    }
}

impl EffectRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry keeping at most `history` firings; 0 keeps none
    pub fn with_history(history: usize) -> Self {
        Self {
            handlers: HashMap::new(),
            fired: VecDeque::with_capacity(history.min(DEFAULT_HISTORY)),
            history,
        }
    }

    /// Register a handler, replacing any previous one for the same name
    pub fn register<F>(&mut self, name: &str, handler: F)
    where
        F: FnMut(NodeId, &Effect) + Send + 'static,
    {
        self.handlers.insert(name.to_string(), Box::new(handler));
    }

    /// Fire an effect on a node
    ///
    /// Returns true if a handler ran.
    pub fn fire(&mut self, node: NodeId, reference: &str, effect: &Effect) -> bool {
        if self.history > 0 {
            if self.fired.len() == self.history {
                self.fired.pop_front();
            }
            self.fired.push_back(FiredEffect {
                node,
                reference: reference.to_string(),
                name: effect.name.clone(),
                payload: effect.payload.clone(),
            });
        }

        match self.handlers.get_mut(&effect.name) {
            Some(handler) => {
                handler(node, effect);
                true
            }
            None => {
                debug!("No handler for effect '{}' on '{}'", effect.name, reference);
                false
            }
        }
    }

    /// Most recent fired effects, oldest first
    pub fn fired(&self) -> &VecDeque<FiredEffect> {
        &self.fired
    }

    /// Drain the fired-effect log
    pub fn take_fired(&mut self) -> Vec<FiredEffect> {
        self.fired.drain(..).collect()
    }
}
