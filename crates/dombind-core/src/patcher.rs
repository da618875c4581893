//! Tree patcher
//!
//! Applies one decoded [`ChangeMessage`] to the document. Each change type
//! is one arm of an exhaustive match; the remote side has already computed
//! what changed, so there is no diffing here.
//!
//! Structural changes keep interaction capture in step with the tree:
//! `refresh` detaches bindings from the old content before replacing it and
//! attaches them to the new content afterwards, `added` attaches the
//! inserted nodes and `removed` detaches the subtree it deletes. An
//! `update` re-selects the bindings of the node it changes, since the
//! attributes bindings key on may have changed with it.

use tracing::{debug, warn};

use crate::capture::Capture;
use crate::dom::{Document, NodeId};
use crate::effects::EffectRegistry;
use crate::error::{PatchError, PatchResult};
use crate::message::{ChangeMessage, Effect, Update};
use crate::resolver::{resolve, resolve_within};

/// What a successfully applied change did
#[derive(Debug, Clone, PartialEq)]
pub enum PatchOutcome {
    /// Inner content replaced; counts of bindings detached and attached
    Refreshed {
        node: NodeId,
        detached: usize,
        attached: usize,
    },
    /// Effect fired on the node
    Triggered { node: NodeId, effect: Effect },
    /// Text or properties set on the node
    Updated { node: NodeId },
    /// Nodes appended to the node
    Added { node: NodeId, inserted: Vec<NodeId> },
    /// Descendant removed from the node's subtree
    Removed { node: NodeId, removed: NodeId },
    /// Unrecognized change type; nothing touched
    Ignored { kind: String },
}

/// Apply one change to the document
pub fn apply(
    doc: &mut Document,
    capture: &mut Capture,
    effects: &mut EffectRegistry,
    change: &ChangeMessage,
) -> PatchResult<PatchOutcome> {
    match change {
        ChangeMessage::Refresh { target, markup } => {
            let node = resolve(doc, target)?;

            let detached = capture.unobserve(doc, node);
            doc.clear_children(node);
            for child in doc.parse_fragment(node, markup) {
                doc.append_child(node, child);
            }
            let attached = capture.observe(doc, node);

            debug!("Refreshed '{}' ({} -> {} bindings)", target, detached, attached);
            Ok(PatchOutcome::Refreshed {
                node,
                detached,
                attached,
            })
        }

        ChangeMessage::Trigger { target, effect } => {
            let node = resolve(doc, target)?;
            effects.fire(node, target, effect);
            debug!("Triggered '{}' on '{}'", effect.name, target);
            Ok(PatchOutcome::Triggered {
                node,
                effect: effect.clone(),
            })
        }

        ChangeMessage::Update { target, update } => {
            let node = resolve(doc, target)?;
            apply_update(doc, node, update);
            capture.rebind(doc, node);
            debug!("Updated '{}'", target);
            Ok(PatchOutcome::Updated { node })
        }

        ChangeMessage::Added { target, markup } => {
            let node = resolve(doc, target)?;
            let inserted = doc.parse_fragment(node, markup);
            for &child in &inserted {
                doc.append_child(node, child);
                capture.observe(doc, child);
            }
            debug!("Added {} node(s) to '{}'", inserted.len(), target);
            Ok(PatchOutcome::Added { node, inserted })
        }

        ChangeMessage::Removed { target, child } => {
            let node = resolve(doc, target)?;
            let removed = resolve_within(doc, node, child)?;
            if removed == doc.root() {
                return Err(PatchError::RootRemoval {
                    reference: child.clone(),
                });
            }
            capture.unobserve(doc, removed);
            doc.remove(removed);
            debug!("Removed '{}' from '{}'", child, target);
            Ok(PatchOutcome::Removed { node, removed })
        }

        ChangeMessage::Unrecognized { kind, target } => {
            warn!(
                "Ignoring unrecognized change type '{}' for {:?}",
                kind, target
            );
            Ok(PatchOutcome::Ignored { kind: kind.clone() })
        }
    }
}

fn apply_update(doc: &mut Document, node: NodeId, update: &Update) {
    match update {
        Update::Text(text) => doc.set_first_text(node, text),
        Update::Attrs(pairs) => {
            for (name, value) in pairs {
                doc.set_property(node, name, value);
            }
        }
        Update::Property { name, value } => {
            // A textarea's value is its text
            let is_textarea = doc.element(node).is_some_and(|el| el.tag() == "textarea");
            match (is_textarea, name.as_str(), value.as_str()) {
                (true, "value", Some(text)) => doc.set_first_text(node, text),
                _ => doc.set_property(node, name, value),
            }
        }
    }
}
