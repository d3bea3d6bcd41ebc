//! Error type shared by the differentiation core and its collaborators.

use thiserror::Error;

/// Errors surfaced to the calling script.
///
/// All variants are local and recoverable: none of them leaves the
/// computation graph in a partially updated state.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum Error {
    /// A parameter path does not resolve to a differentiable scene attribute.
    #[error("parameter '{0}' does not resolve to a differentiable scene attribute")]
    KeyNotFound(String),

    /// A parameter path is not a well-formed dot-separated key.
    #[error("invalid parameter key '{key}': {reason}")]
    InvalidKey { key: String, reason: String },

    /// Two payloads that must agree in length do not.
    #[error("shape mismatch in {context}: expected {expected} elements, found {found}")]
    ShapeMismatch {
        context: String,
        expected: usize,
        found: usize,
    },

    /// A gradient was read from a value that was never tracked and the graph
    /// is configured with [`GradPolicy::Strict`](crate::GradPolicy::Strict).
    #[error("gradient requested for a value that is not tracked by this graph")]
    UntrackedGradientRequest,

    /// Tracked values from two different graphs met in one operation.
    #[error("operands are tracked by two different computation graphs")]
    ForeignGraph,
}

impl Error {
    /// Shorthand for [`Error::ShapeMismatch`].
    pub fn shape_mismatch(context: impl Into<String>, expected: usize, found: usize) -> Self {
        Error::ShapeMismatch {
            context: context.into(),
            expected,
            found,
        }
    }
}

/// Result alias used throughout the workspace.
pub type Result<T> = std::result::Result<T, Error>;
