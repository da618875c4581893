//! Reference resolution
//!
//! Maps an opaque reference string to the one node whose `ref` attribute
//! carries it. Zero or several matches are errors; callers decide what to
//! do with them, the resolver never guesses.

use crate::dom::{Document, NodeId, REF_ATTR};
use crate::error::ResolveError;

/// Resolve a reference anywhere in the document
pub fn resolve(doc: &Document, reference: &str) -> Result<NodeId, ResolveError> {
    resolve_within(doc, doc.root(), reference)
}

/// Resolve a reference inside `scope`'s subtree, `scope` included
pub fn resolve_within(
    doc: &Document,
    scope: NodeId,
    reference: &str,
) -> Result<NodeId, ResolveError> {
    let matches = find_all(doc, scope, reference);
    match matches.as_slice() {
        [node] => Ok(*node),
        [] => Err(ResolveError::Missing {
            reference: reference.to_string(),
        }),
        many => Err(ResolveError::Ambiguous {
            reference: reference.to_string(),
            count: many.len(),
        }),
    }
}

/// Every node in `scope`'s subtree carrying the reference, in document order
pub fn find_all(doc: &Document, scope: NodeId, reference: &str) -> Vec<NodeId> {
    doc.descendants(scope)
        .into_iter()
        .filter(|&node| doc.attr(node, REF_ATTR) == Some(reference))
        .collect()
}
