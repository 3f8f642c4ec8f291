use std::{any::Any, fmt, rc::Rc};

use crate::{error::ExprError, literal::Literal};

/// The variant of an expression node. Fixed when the node is built.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum NodeType {
    Constant,
    Parameter,
    Member,
    Index,
    MethodCall,
    Unary,
    Binary,
    Condition,
    Lambda,
}

impl fmt::Display for NodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            NodeType::Constant => "constant",
            NodeType::Parameter => "parameter",
            NodeType::Member => "member",
            NodeType::Index => "index",
            NodeType::MethodCall => "method call",
            NodeType::Unary => "unary",
            NodeType::Binary => "binary",
            NodeType::Condition => "condition",
            NodeType::Lambda => "lambda",
        };
        f.write_str(name)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum UnaryToken {
    Minus,
    Plus,
    Not,
    BitwiseNot,
}

impl UnaryToken {
    pub fn symbol(&self) -> &'static str {
        match self {
            UnaryToken::Minus => "-",
            UnaryToken::Plus => "+",
            UnaryToken::Not => "!",
            UnaryToken::BitwiseNot => "~",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum BinaryToken {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Equal,
    NotEqual,
    Less,
    LessOrEqual,
    Greater,
    GreaterOrEqual,
    And,
    Or,
    NullCoalesce,
    BitAnd,
    BitOr,
    BitXor,
}

impl BinaryToken {
    pub fn symbol(&self) -> &'static str {
        match self {
            BinaryToken::Add => "+",
            BinaryToken::Sub => "-",
            BinaryToken::Mul => "*",
            BinaryToken::Div => "/",
            BinaryToken::Rem => "%",
            BinaryToken::Equal => "==",
            BinaryToken::NotEqual => "!=",
            BinaryToken::Less => "<",
            BinaryToken::LessOrEqual => "<=",
            BinaryToken::Greater => ">",
            BinaryToken::GreaterOrEqual => ">=",
            BinaryToken::And => "&&",
            BinaryToken::Or => "||",
            BinaryToken::NullCoalesce => "??",
            BinaryToken::BitAnd => "&",
            BinaryToken::BitOr => "|",
            BinaryToken::BitXor => "^",
        }
    }
}

/// An opaque handle to a member that was resolved ahead of time.
///
/// The expression model never looks inside it; whoever attached the handle
/// downcasts it back through [`MemberHandle::as_any`].
pub trait MemberHandle: fmt::Debug {
    fn name(&self) -> &str;

    fn as_any(&self) -> &dyn Any;
}

#[derive(Clone, Debug)]
pub struct Constant {
    pub value: Literal,
    /// Declared type, when it differs from the literal's natural type.
    pub ty: Option<Rc<str>>,
}

impl Constant {
    pub fn type_name(&self) -> &str {
        self.ty.as_deref().unwrap_or_else(|| self.value.type_name())
    }
}

#[derive(Clone, Debug)]
pub struct Parameter {
    pub name: Rc<str>,
    pub index: usize,
    pub ty: Option<Rc<str>>,
}

#[derive(Clone, Debug)]
pub struct Member {
    pub target: Option<Expr>,
    pub name: Rc<str>,
    pub member: Option<Rc<dyn MemberHandle>>,
}

#[derive(Clone, Debug)]
pub struct Index {
    pub target: Option<Expr>,
    pub args: Rc<[Expr]>,
}

#[derive(Clone, Debug)]
pub struct MethodCall {
    pub target: Option<Expr>,
    pub method: Rc<str>,
    pub args: Rc<[Expr]>,
    pub type_args: Rc<[Rc<str>]>,
}

#[derive(Clone, Debug)]
pub struct Unary {
    pub token: UnaryToken,
    pub operand: Expr,
}

#[derive(Clone, Debug)]
pub struct Binary {
    pub token: BinaryToken,
    pub left: Expr,
    pub right: Expr,
}

#[derive(Clone, Debug)]
pub struct Condition {
    pub condition: Expr,
    pub if_true: Expr,
    pub if_false: Expr,
}

#[derive(Clone, Debug)]
pub struct Lambda {
    pub body: Expr,
    /// Always `Parameter` nodes.
    pub params: Rc<[Expr]>,
}

#[derive(Clone, Debug)]
pub enum ExprNode {
    Constant(Constant),
    Parameter(Parameter),
    Member(Member),
    Index(Index),
    MethodCall(MethodCall),
    Unary(Unary),
    Binary(Binary),
    Condition(Condition),
    Lambda(Lambda),
}

impl ExprNode {
    pub fn node_type(&self) -> NodeType {
        match self {
            ExprNode::Constant(_) => NodeType::Constant,
            ExprNode::Parameter(_) => NodeType::Parameter,
            ExprNode::Member(_) => NodeType::Member,
            ExprNode::Index(_) => NodeType::Index,
            ExprNode::MethodCall(_) => NodeType::MethodCall,
            ExprNode::Unary(_) => NodeType::Unary,
            ExprNode::Binary(_) => NodeType::Binary,
            ExprNode::Condition(_) => NodeType::Condition,
            ExprNode::Lambda(_) => NodeType::Lambda,
        }
    }
}

/// A shared, immutable expression node.
///
/// Cloning is a reference count bump. Two `Expr`s are the *same* node when
/// [`Expr::ptr_eq`] holds; rewrites preserve that identity for every subtree
/// they leave untouched.
#[derive(Clone)]
pub struct Expr(Rc<ExprNode>);

impl Expr {
    pub(crate) fn from_node(node: ExprNode) -> Self {
        Expr(Rc::new(node))
    }

    pub fn node(&self) -> &ExprNode {
        &self.0
    }

    pub fn node_type(&self) -> NodeType {
        self.0.node_type()
    }

    pub fn ptr_eq(&self, other: &Expr) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    /// A constant node. Small integers, booleans, `null` and the empty string
    /// come from a per-thread pool.
    pub fn constant(value: impl Into<Literal>) -> Self {
        let value = value.into();
        crate::literal::pooled(&value)
            .unwrap_or_else(|| Expr::from_node(ExprNode::Constant(Constant { value, ty: None })))
    }

    pub fn null() -> Self {
        Expr::constant(Literal::Null)
    }

    /// A constant with an explicit declared type. Never pooled.
    pub fn typed_constant(value: impl Into<Literal>, ty: impl Into<Rc<str>>) -> Self {
        Expr::from_node(ExprNode::Constant(Constant {
            value: value.into(),
            ty: Some(ty.into()),
        }))
    }

    pub fn parameter(name: impl Into<Rc<str>>, index: usize) -> Self {
        Expr::from_node(ExprNode::Parameter(Parameter {
            name: name.into(),
            index,
            ty: None,
        }))
    }

    pub fn typed_parameter(name: impl Into<Rc<str>>, index: usize, ty: impl Into<Rc<str>>) -> Self {
        Expr::from_node(ExprNode::Parameter(Parameter {
            name: name.into(),
            index,
            ty: Some(ty.into()),
        }))
    }

    pub fn member(target: Option<Expr>, name: impl Into<Rc<str>>) -> Self {
        Expr::from_node(ExprNode::Member(Member {
            target,
            name: name.into(),
            member: None,
        }))
    }

    /// A member node carrying a member that has already been resolved.
    pub fn resolved_member(target: Option<Expr>, member: Rc<dyn MemberHandle>) -> Self {
        Expr::from_node(ExprNode::Member(Member {
            target,
            name: member.name().into(),
            member: Some(member),
        }))
    }

    pub fn index(target: Option<Expr>, args: Vec<Expr>) -> Result<Self, ExprError> {
        if args.is_empty() {
            return Err(ExprError::InvalidArity {
                node_type: NodeType::Index,
                expected: 1,
                actual: 0,
            });
        }
        Ok(Expr::from_node(ExprNode::Index(Index {
            target,
            args: args.into(),
        })))
    }

    pub fn method_call(target: Option<Expr>, method: impl Into<Rc<str>>, args: Vec<Expr>) -> Self {
        Expr::generic_method_call(target, method, args, Vec::new())
    }

    pub fn generic_method_call(
        target: Option<Expr>,
        method: impl Into<Rc<str>>,
        args: Vec<Expr>,
        type_args: Vec<Rc<str>>,
    ) -> Self {
        Expr::from_node(ExprNode::MethodCall(MethodCall {
            target,
            method: method.into(),
            args: args.into(),
            type_args: type_args.into(),
        }))
    }

    pub fn unary(token: UnaryToken, operand: Expr) -> Self {
        Expr::from_node(ExprNode::Unary(Unary { token, operand }))
    }

    pub fn binary(token: BinaryToken, left: Expr, right: Expr) -> Self {
        Expr::from_node(ExprNode::Binary(Binary { token, left, right }))
    }

    pub fn condition(condition: Expr, if_true: Expr, if_false: Expr) -> Self {
        Expr::from_node(ExprNode::Condition(Condition {
            condition,
            if_true,
            if_false,
        }))
    }

    pub fn lambda(body: Expr, params: Vec<Expr>) -> Self {
        Expr::from_node(ExprNode::Lambda(Lambda {
            body,
            params: params.into(),
        }))
    }

    pub fn as_constant(&self) -> Option<&Constant> {
        match self.node() {
            ExprNode::Constant(c) => Some(c),
            _ => None,
        }
    }

    pub fn as_parameter(&self) -> Option<&Parameter> {
        match self.node() {
            ExprNode::Parameter(p) => Some(p),
            _ => None,
        }
    }

    pub fn as_member(&self) -> Option<&Member> {
        match self.node() {
            ExprNode::Member(m) => Some(m),
            _ => None,
        }
    }
}

impl fmt::Debug for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

fn write_target(f: &mut fmt::Formatter<'_>, target: &Option<Expr>) -> fmt::Result {
    match target {
        Some(target) => write!(f, "{target}."),
        None => Ok(()),
    }
}

fn write_args(f: &mut fmt::Formatter<'_>, args: &[Expr]) -> fmt::Result {
    for (i, arg) in args.iter().enumerate() {
        if i > 0 {
            f.write_str(", ")?;
        }
        write!(f, "{arg}")?;
    }
    Ok(())
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.node() {
            ExprNode::Constant(c) => write!(f, "{}", c.value),
            ExprNode::Parameter(p) => f.write_str(&p.name),
            ExprNode::Member(m) => {
                write_target(f, &m.target)?;
                f.write_str(&m.name)
            }
            ExprNode::Index(i) => {
                if let Some(target) = &i.target {
                    write!(f, "{target}")?;
                }
                f.write_str("[")?;
                write_args(f, &i.args)?;
                f.write_str("]")
            }
            ExprNode::MethodCall(m) => {
                write_target(f, &m.target)?;
                f.write_str(&m.method)?;
                if !m.type_args.is_empty() {
                    f.write_str("<")?;
                    for (i, ty) in m.type_args.iter().enumerate() {
                        if i > 0 {
                            f.write_str(", ")?;
                        }
                        f.write_str(ty)?;
                    }
                    f.write_str(">")?;
                }
                f.write_str("(")?;
                write_args(f, &m.args)?;
                f.write_str(")")
            }
            ExprNode::Unary(u) => write!(f, "{}{}", u.token.symbol(), u.operand),
            ExprNode::Binary(b) => write!(f, "({} {} {})", b.left, b.token.symbol(), b.right),
            ExprNode::Condition(c) => {
                write!(f, "({} ? {} : {})", c.condition, c.if_true, c.if_false)
            }
            ExprNode::Lambda(l) => {
                f.write_str("(")?;
                write_args(f, &l.params)?;
                write!(f, ") => {}", l.body)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_renders_binding_syntax() {
        let chain = Expr::member(Some(Expr::member(None, "Items")), "Count");
        let expr = Expr::binary(BinaryToken::Greater, chain, Expr::constant(0));
        assert_eq!(expr.to_string(), "(Items.Count > 0)");

        let call = Expr::method_call(Some(Expr::parameter("x", 0)), "Format", vec![
            Expr::constant("a"),
            Expr::constant(1.5),
        ]);
        assert_eq!(call.to_string(), "x.Format(\"a\", 1.5)");
    }

    #[test]
    fn index_requires_arguments() {
        let err = Expr::index(None, Vec::new()).unwrap_err();
        assert_eq!(
            err,
            ExprError::InvalidArity {
                node_type: NodeType::Index,
                expected: 1,
                actual: 0
            }
        );
    }

    #[test]
    fn typed_constant_reports_declared_type() {
        let expr = Expr::typed_constant(3, "u8");
        assert_eq!(expr.as_constant().unwrap().type_name(), "u8");
        assert_eq!(Expr::constant(3).as_constant().unwrap().type_name(), "i64");
    }
}
