//! # Floem Expr
//!
//! Immutable expression trees for binding expressions.
//!
//! An [`Expr`] is a reference-counted node. Trees are never mutated in place;
//! instead an [`ExprVisitor`] rewrites them through [`Expr::accept`], which
//! rebuilds a parent only when one of its children actually changed. Untouched
//! subtrees keep their identity, so `Expr::ptr_eq` can be used as a cheap
//! cache key by consumers.
//!
//! Producing trees from binding strings is left to the caller; this crate only
//! models and rewrites them.

mod error;
mod literal;
mod node;
mod visit;

pub use error::ExprError;
pub use literal::{Literal, POOLED_INT_MAX, POOLED_INT_MIN};
pub use node::{
    Binary, BinaryToken, Condition, Constant, Expr, ExprNode, Index, Lambda, Member, MemberHandle,
    MethodCall, NodeType, Parameter, Unary, UnaryToken,
};
pub use visit::{ExprVisitor, TraversalOrder};
