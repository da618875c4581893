//! Interaction capture
//!
//! Listeners for local interaction are modelled as bindings: one
//! [`NodeBinding`] per kind of node (clickable element, checkbox, select,
//! text input, textarea). [`Capture::observe`] attaches every applicable
//! binding to each node of a subtree and [`Capture::unobserve`] detaches
//! exactly those, so repeated refreshes never leak or double-bind.
//!
//! Interactions bubble from the target node up to the root. Every binding
//! attached along that path for the interaction's event kind emits one
//! outbound message addressed by the bound node's reference.

use std::collections::HashMap;
use std::fmt;

use tracing::debug;

use crate::dom::{Document, Element, NodeId};
use crate::message::{EventMessage, CHECKED, ON_CLICK, TEXT, VALUE};

/// DOM event kinds the capture listens for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InteractionKind {
    Click,
    Input,
    Change,
}

impl InteractionKind {
    /// Map an effect name to the interaction it simulates, if any
    pub fn from_effect(name: &str) -> Option<Self> {
        match name {
            "click" => Some(InteractionKind::Click),
            "input" => Some(InteractionKind::Input),
            "change" => Some(InteractionKind::Change),
            _ => None,
        }
    }
}

/// A listener capability for one kind of node
pub trait NodeBinding: Send {
    /// Short name used in logs
    fn name(&self) -> &'static str;

    /// Event the binding listens for
    fn event(&self) -> InteractionKind;

    /// Whether the binding attaches to this element
    fn applies_to(&self, element: &Element) -> bool;

    /// Build the outbound message for an interaction on the bound node
    fn translate(&self, doc: &Document, node: NodeId, reference: &str) -> EventMessage;

    /// Whether the interaction's default action is suppressed
    fn prevents_default(&self) -> bool {
        false
    }
}

/// Click on an element flagged `clickable` or `data-onclick="1"`
pub struct ClickBinding;

impl NodeBinding for ClickBinding {
    fn name(&self) -> &'static str {
        "click"
    }

    fn event(&self) -> InteractionKind {
        InteractionKind::Click
    }

    fn applies_to(&self, element: &Element) -> bool {
        element.has_attr("clickable") || element.attr("data-onclick") == Some("1")
    }

    fn translate(&self, _doc: &Document, _node: NodeId, reference: &str) -> EventMessage {
        EventMessage::event(reference, ON_CLICK)
    }

    fn prevents_default(&self) -> bool {
        true
    }
}

/// Change on a checkbox
pub struct CheckboxBinding;

impl NodeBinding for CheckboxBinding {
    fn name(&self) -> &'static str {
        "checkbox"
    }

    fn event(&self) -> InteractionKind {
        InteractionKind::Change
    }

    fn applies_to(&self, element: &Element) -> bool {
        element.input_type().as_deref() == Some("checkbox")
    }

    fn translate(&self, doc: &Document, node: NodeId, reference: &str) -> EventMessage {
        let checked = doc.element(node).is_some_and(|el| el.has_attr("checked"));
        EventMessage::update(reference, CHECKED, if checked { "checked" } else { "" })
    }
}

/// Change on a select
pub struct SelectBinding;

impl NodeBinding for SelectBinding {
    fn name(&self) -> &'static str {
        "select"
    }

    fn event(&self) -> InteractionKind {
        InteractionKind::Change
    }

    fn applies_to(&self, element: &Element) -> bool {
        element.tag() == "select"
    }

    fn translate(&self, doc: &Document, node: NodeId, reference: &str) -> EventMessage {
        EventMessage::update(reference, VALUE, doc.form_value(node))
    }
}

/// Input on a text-like input
pub struct TextInputBinding;

impl NodeBinding for TextInputBinding {
    fn name(&self) -> &'static str {
        "text-input"
    }

    fn event(&self) -> InteractionKind {
        InteractionKind::Input
    }

    fn applies_to(&self, element: &Element) -> bool {
        matches!(element.input_type().as_deref(), Some(kind) if kind != "checkbox" && kind != "radio")
    }

    fn translate(&self, doc: &Document, node: NodeId, reference: &str) -> EventMessage {
        EventMessage::update(reference, VALUE, doc.form_value(node))
    }
}

/// Change on a textarea
pub struct TextAreaBinding;

impl NodeBinding for TextAreaBinding {
    fn name(&self) -> &'static str {
        "textarea"
    }

    fn event(&self) -> InteractionKind {
        InteractionKind::Change
    }

    fn applies_to(&self, element: &Element) -> bool {
        element.tag() == "textarea"
    }

    fn translate(&self, doc: &Document, node: NodeId, reference: &str) -> EventMessage {
        EventMessage::update(reference, TEXT, doc.form_value(node))
    }
}

/// The standard set of bindings
pub fn default_bindings() -> Vec<Box<dyn NodeBinding>> {
    vec![
        Box::new(ClickBinding),
        Box::new(CheckboxBinding),
        Box::new(SelectBinding),
        Box::new(TextInputBinding),
        Box::new(TextAreaBinding),
    ]
}

/// Result of dispatching one interaction
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Dispatch {
    /// Outbound messages, innermost bound node first (not yet stamped)
    pub messages: Vec<EventMessage>,
    /// Whether a binding suppressed the default action
    pub default_prevented: bool,
}

/// Attached bindings, keyed by node
pub struct Capture {
    bindings: Vec<Box<dyn NodeBinding>>,
    attached: HashMap<NodeId, Vec<usize>>,
}

impl Default for Capture {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Capture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Capture")
            .field(
                "bindings",
                &self.bindings.iter().map(|b| b.name()).collect::<Vec<_>>(),
            )
            .field("attached", &self.attached)
            .finish()
    }
}

impl Capture {
    /// Create a capture with the standard bindings
    pub fn new() -> Self {
        Self::with_bindings(default_bindings())
    }

    pub fn with_bindings(bindings: Vec<Box<dyn NodeBinding>>) -> Self {
        Self {
            bindings,
            attached: HashMap::new(),
        }
    }

    /// Attach every applicable binding to one node
    ///
    /// Attaching an already-bound node is a no-op. Returns the number of
    /// bindings newly attached.
    pub fn attach(&mut self, doc: &Document, node: NodeId) -> usize {
        if self.attached.contains_key(&node) {
            return 0;
        }
        let Some(element) = doc.element(node) else {
            return 0;
        };
        let matching: Vec<usize> = self
            .bindings
            .iter()
            .enumerate()
            .filter(|(_, binding)| binding.applies_to(element))
            .map(|(index, _)| index)
            .collect();

        let count = matching.len();
        if count > 0 {
            self.attached.insert(node, matching);
        }
        count
    }

    /// Detach everything attached to one node
    pub fn detach(&mut self, node: NodeId) -> usize {
        self.attached.remove(&node).map_or(0, |bound| bound.len())
    }

    /// Re-select the bindings of one node after its attributes changed
    pub fn rebind(&mut self, doc: &Document, node: NodeId) -> usize {
        self.detach(node);
        self.attach(doc, node)
    }

    /// Attach bindings across a subtree
    pub fn observe(&mut self, doc: &Document, root: NodeId) -> usize {
        let count: usize = doc
            .descendants(root)
            .into_iter()
            .map(|node| self.attach(doc, node))
            .sum();
        debug!("Observed subtree {:?}: {} bindings attached", root, count);
        count
    }

    /// Detach bindings across a subtree
    pub fn unobserve(&mut self, doc: &Document, root: NodeId) -> usize {
        let count: usize = doc
            .descendants(root)
            .into_iter()
            .map(|node| self.detach(node))
            .sum();
        debug!("Unobserved subtree {:?}: {} bindings detached", root, count);
        count
    }

    /// Whether any binding is attached to the node
    pub fn is_bound(&self, node: NodeId) -> bool {
        self.attached.contains_key(&node)
    }

    /// Total attached bindings
    pub fn attached_count(&self) -> usize {
        self.attached.values().map(Vec::len).sum()
    }

    /// Dispatch an interaction on `target`, bubbling to its ancestors
    pub fn dispatch(&self, doc: &Document, target: NodeId, kind: InteractionKind) -> Dispatch {
        let mut dispatch = Dispatch::default();

        for node in doc.ancestors(target) {
            let Some(bound) = self.attached.get(&node) else {
                continue;
            };
            for binding in bound.iter().filter_map(|&i| self.bindings.get(i)) {
                if binding.event() != kind {
                    continue;
                }
                dispatch.default_prevented |= binding.prevents_default();
                match doc.element(node).and_then(Element::reference) {
                    Some(reference) => {
                        dispatch
                            .messages
                            .push(binding.translate(doc, node, reference));
                    }
                    None => {
                        debug!("{} binding on {:?} has no reference", binding.name(), node);
                    }
                }
            }
        }

        dispatch
    }
}
