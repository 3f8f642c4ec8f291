//! The rewrite visitor protocol.
//!
//! [`Expr::accept`] walks a tree and lets an [`ExprVisitor`] replace nodes.
//! A parent is rebuilt only when at least one of its children came back as a
//! different node; otherwise the original `Expr` is returned, so a visitor that
//! changes nothing hands back the exact same tree.

use std::rc::Rc;

use crate::{
    error::ExprError,
    node::{
        Binary, Condition, Expr, ExprNode, Index, Lambda, Member, MethodCall, NodeType, Unary,
    },
};

/// When the visitor sees a node relative to its children.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum TraversalOrder {
    /// The node first. Replacing it skips its children.
    #[default]
    PreOrder,
    /// Children first, then the node with its (possibly rebuilt) children.
    PostOrder,
}

pub trait ExprVisitor {
    type Error: From<ExprError>;

    fn order(&self) -> TraversalOrder {
        TraversalOrder::PreOrder
    }

    /// Returns the node to use in place of `expr`: `expr` itself to keep it,
    /// another node to replace it, or `None` to remove it.
    fn visit(&mut self, expr: &Expr) -> Result<Option<Expr>, Self::Error>;
}

impl Expr {
    pub fn accept<V>(&self, visitor: &mut V) -> Result<Option<Expr>, V::Error>
    where
        V: ExprVisitor + ?Sized,
    {
        let order = visitor.order();
        if order == TraversalOrder::PreOrder {
            match visitor.visit(self)? {
                None => return Ok(None),
                Some(node) if !node.ptr_eq(self) => return Ok(Some(node)),
                Some(_) => {}
            }
        }

        let node = self.visit_children(visitor)?;
        if order == TraversalOrder::PostOrder {
            return visitor.visit(&node);
        }
        Ok(Some(node))
    }

    /// Like [`Expr::accept`], but removing the root is an error.
    pub fn accept_required<V>(&self, visitor: &mut V) -> Result<Expr, V::Error>
    where
        V: ExprVisitor + ?Sized,
    {
        let node_type = self.node_type();
        self.accept(visitor)?
            .ok_or_else(|| ExprError::NullNode { node_type }.into())
    }

    fn visit_children<V>(&self, visitor: &mut V) -> Result<Expr, V::Error>
    where
        V: ExprVisitor + ?Sized,
    {
        let parent = self.node_type();
        let rebuilt = match self.node() {
            ExprNode::Constant(_) | ExprNode::Parameter(_) => None,
            ExprNode::Member(m) => {
                let target = visit_optional(&m.target, visitor)?;
                target.map(|target| {
                    ExprNode::Member(Member {
                        target,
                        name: m.name.clone(),
                        member: m.member.clone(),
                    })
                })
            }
            ExprNode::Index(i) => {
                let target = visit_optional(&i.target, visitor)?;
                let args = visit_list(&i.args, visitor, parent)?;
                if target.is_none() && args.is_none() {
                    None
                } else {
                    Some(ExprNode::Index(Index {
                        target: target.unwrap_or_else(|| i.target.clone()),
                        args: args.unwrap_or_else(|| i.args.clone()),
                    }))
                }
            }
            ExprNode::MethodCall(m) => {
                let target = visit_optional(&m.target, visitor)?;
                let args = visit_list(&m.args, visitor, parent)?;
                if target.is_none() && args.is_none() {
                    None
                } else {
                    Some(ExprNode::MethodCall(MethodCall {
                        target: target.unwrap_or_else(|| m.target.clone()),
                        method: m.method.clone(),
                        args: args.unwrap_or_else(|| m.args.clone()),
                        type_args: m.type_args.clone(),
                    }))
                }
            }
            ExprNode::Unary(u) => {
                let operand = visit_required(&u.operand, visitor, parent)?;
                (!operand.ptr_eq(&u.operand)).then(|| {
                    ExprNode::Unary(Unary {
                        token: u.token,
                        operand,
                    })
                })
            }
            ExprNode::Binary(b) => {
                let left = visit_required(&b.left, visitor, parent)?;
                let right = visit_required(&b.right, visitor, parent)?;
                (!left.ptr_eq(&b.left) || !right.ptr_eq(&b.right)).then(|| {
                    ExprNode::Binary(Binary {
                        token: b.token,
                        left,
                        right,
                    })
                })
            }
            ExprNode::Condition(c) => {
                let condition = visit_required(&c.condition, visitor, parent)?;
                let if_true = visit_required(&c.if_true, visitor, parent)?;
                let if_false = visit_required(&c.if_false, visitor, parent)?;
                (!condition.ptr_eq(&c.condition)
                    || !if_true.ptr_eq(&c.if_true)
                    || !if_false.ptr_eq(&c.if_false))
                .then(|| {
                    ExprNode::Condition(Condition {
                        condition,
                        if_true,
                        if_false,
                    })
                })
            }
            ExprNode::Lambda(l) => {
                let body = visit_required(&l.body, visitor, parent)?;
                let params = visit_list(&l.params, visitor, parent)?;
                if body.ptr_eq(&l.body) && params.is_none() {
                    None
                } else {
                    Some(ExprNode::Lambda(Lambda {
                        body,
                        params: params.unwrap_or_else(|| l.params.clone()),
                    }))
                }
            }
        };

        Ok(match rebuilt {
            Some(node) => Expr::from_node(node),
            None => self.clone(),
        })
    }
}

fn visit_required<V>(child: &Expr, visitor: &mut V, parent: NodeType) -> Result<Expr, V::Error>
where
    V: ExprVisitor + ?Sized,
{
    child
        .accept(visitor)?
        .ok_or_else(|| ExprError::NullNode { node_type: parent }.into())
}

/// `Ok(None)` when the child is unchanged, `Ok(Some(new))` otherwise.
fn visit_optional<V>(
    child: &Option<Expr>,
    visitor: &mut V,
) -> Result<Option<Option<Expr>>, V::Error>
where
    V: ExprVisitor + ?Sized,
{
    let Some(child) = child else {
        return Ok(None);
    };
    Ok(match child.accept(visitor)? {
        Some(node) if node.ptr_eq(child) => None,
        other => Some(other),
    })
}

/// `Ok(None)` when every item is unchanged. The new list is only allocated
/// once the first changed item is seen.
fn visit_list<V>(
    items: &Rc<[Expr]>,
    visitor: &mut V,
    parent: NodeType,
) -> Result<Option<Rc<[Expr]>>, V::Error>
where
    V: ExprVisitor + ?Sized,
{
    let mut changed: Option<Vec<Expr>> = None;
    for (i, item) in items.iter().enumerate() {
        let node = visit_required(item, visitor, parent)?;
        match changed.as_mut() {
            Some(list) => list.push(node),
            None if !node.ptr_eq(item) => {
                let mut list = Vec::with_capacity(items.len());
                list.extend(items[..i].iter().cloned());
                list.push(node);
                changed = Some(list);
            }
            None => {}
        }
    }
    Ok(changed.map(Rc::from))
}
