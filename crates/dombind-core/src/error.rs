//! Error handling
//!
//! Typed errors for the three ways an inbound change can fail: the text is
//! not a valid change message, its reference does not name exactly one node,
//! or the patch cannot be applied to the node it names.

use thiserror::Error;

/// Errors raised while decoding an inbound change message
#[derive(Error, Debug)]
pub enum MessageError {
    /// Payload is not a JSON object of the expected shape
    #[error("Malformed change message: {0}")]
    Json(#[from] serde_json::Error),

    /// A change type that targets a node arrived without `ref`
    #[error("Change message of type '{kind}' has no reference")]
    MissingRef { kind: String },

    /// An `update` arrived without `name`
    #[error("Update message for '{reference}' has no property name")]
    MissingName { reference: String },

    /// `value` has the wrong shape for the change type
    #[error("Invalid value for '{kind}' change on '{reference}': expected {expected}")]
    InvalidValue {
        kind: String,
        reference: String,
        expected: &'static str,
    },
}

/// Errors raised when a reference does not name exactly one node
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResolveError {
    /// No node carries the reference
    #[error("No node has reference '{reference}'")]
    Missing { reference: String },

    /// More than one node carries the reference
    #[error("Reference '{reference}' is ambiguous: {count} nodes match")]
    Ambiguous { reference: String, count: usize },
}

impl ResolveError {
    /// The reference that failed to resolve
    pub fn reference(&self) -> &str {
        match self {
            ResolveError::Missing { reference } | ResolveError::Ambiguous { reference, .. } => {
                reference
            }
        }
    }
}

/// Errors raised while applying a change to the tree
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PatchError {
    /// Target or child reference did not resolve
    #[error(transparent)]
    Unresolved(#[from] ResolveError),

    /// A `removed` change named the document root
    #[error("Refusing to remove the document root '{reference}'")]
    RootRemoval { reference: String },
}

/// Result type for patch operations
pub type PatchResult<T> = Result<T, PatchError>;
