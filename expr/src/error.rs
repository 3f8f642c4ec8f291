use crate::node::NodeType;

/// Errors raised while building or rewriting expression trees.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ExprError {
    /// A visitor removed a child that its parent cannot live without.
    #[error("expression node cannot be null (required child of a {node_type} node)")]
    NullNode { node_type: NodeType },
    #[error("{node_type} node expects at least {expected} arguments, got {actual}")]
    InvalidArity {
        node_type: NodeType,
        expected: usize,
        actual: usize,
    },
}
