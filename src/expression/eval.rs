use std::{fmt, rc::Rc};

use floem_expr::{
    Binary, BinaryToken, Condition, Expr, ExprNode, Index, Literal, Member, MethodCall, Unary,
    UnaryToken,
};

use crate::{
    error::{BindingError, Result},
    expression::collect::MEMBER_PATH_PARAMETER,
    member::{MemberFlags, MemberKinds, MemberResolver, ResolvedMember},
    metadata::Metadata,
    object::Object,
};

/// Evaluates expression trees against host objects.
///
/// `None` stands for null. Arithmetic and comparisons understand `i64`, `f64`,
/// `bool`, `char` and strings (`String`, `&'static str`, `Rc<str>`); smaller
/// integer and float types are widened. Operators applied to null yield null,
/// except `==`, `!=` and `??`.
pub struct Evaluator<'a> {
    resolver: &'a dyn MemberResolver,
    member_flags: MemberFlags,
    source: Option<&'a Object>,
    values: &'a [Option<Object>],
    metadata: Option<&'a Metadata>,
}

impl<'a> Evaluator<'a> {
    pub fn new(resolver: &'a dyn MemberResolver) -> Self {
        Evaluator {
            resolver,
            member_flags: MemberFlags::default(),
            source: None,
            values: &[],
            metadata: None,
        }
    }

    /// The object members without a target are looked up on.
    pub fn with_source(mut self, source: &'a Object) -> Self {
        self.source = Some(source);
        self
    }

    /// Values of collected member path parameters, by index.
    pub fn with_values(mut self, values: &'a [Option<Object>]) -> Self {
        self.values = values;
        self
    }

    pub fn with_metadata(mut self, metadata: &'a Metadata) -> Self {
        self.metadata = Some(metadata);
        self
    }

    pub fn with_member_flags(mut self, flags: MemberFlags) -> Self {
        self.member_flags = flags;
        self
    }

    pub fn evaluate(&self, expr: &Expr) -> Result<Option<Object>> {
        match expr.node() {
            ExprNode::Constant(constant) => Ok(literal_object(&constant.value)),
            ExprNode::Parameter(param) => {
                if param.ty.as_deref() != Some(MEMBER_PATH_PARAMETER) {
                    return Err(evaluation(format_args!("unbound parameter `{}`", param.name)));
                }
                self.values.get(param.index).cloned().ok_or_else(|| {
                    evaluation(format_args!("no value for member path `{}`", param.name))
                })
            }
            ExprNode::Member(member) => self.member(member),
            ExprNode::Index(index) => self.index(index),
            ExprNode::MethodCall(call) => self.method_call(call),
            ExprNode::Unary(unary) => self.unary(unary),
            ExprNode::Binary(binary) => self.binary(binary),
            ExprNode::Condition(condition) => self.condition(condition),
            ExprNode::Lambda(_) => Err(evaluation("lambda expressions cannot be evaluated")),
        }
    }

    /// The value members are read from; `None` when it is null.
    fn target(&self, target: Option<&Expr>) -> Result<Option<Object>> {
        match target {
            Some(target) => self.evaluate(target),
            None => self
                .source
                .cloned()
                .map(Some)
                .ok_or_else(|| evaluation("member without target and no source")),
        }
    }

    fn resolve(&self, target: &Object, name: &str, kinds: MemberKinds) -> Result<ResolvedMember> {
        let ty = target.object_type();
        self.resolver
            .resolve(ty, name, kinds, self.member_flags)
            .ok_or_else(|| BindingError::missing_member(ty, name))
    }

    fn member(&self, member: &Member) -> Result<Option<Object>> {
        let Some(target) = self.target(member.target.as_ref())? else {
            return Ok(None);
        };
        let attached = member
            .member
            .as_ref()
            .and_then(|handle| handle.as_any().downcast_ref::<ResolvedMember>())
            .filter(|resolved| resolved.declaring_type() == target.object_type());
        let resolved = match attached {
            Some(resolved) => resolved.clone(),
            None => self.resolve(&target, &member.name, MemberKinds::ACCESSOR)?,
        };
        resolved.read(Some(&target), self.metadata)
    }

    fn index(&self, index: &Index) -> Result<Option<Object>> {
        let Some(target) = self.target(index.target.as_ref())? else {
            return Ok(None);
        };
        let mut segment = String::from("[");
        for (i, arg) in index.args.iter().enumerate() {
            if i > 0 {
                segment.push_str(", ");
            }
            let value = self.evaluate(arg)?;
            segment.push_str(&object_literal(value.as_ref())?.to_string());
        }
        segment.push(']');
        self.resolve(&target, &segment, MemberKinds::ACCESSOR)?
            .read(Some(&target), self.metadata)
    }

    fn method_call(&self, call: &MethodCall) -> Result<Option<Object>> {
        let Some(target) = self.target(call.target.as_ref())? else {
            return Ok(None);
        };
        let method = self.resolve(&target, &call.method, MemberKinds::METHOD)?;
        let args = call
            .args
            .iter()
            .map(|arg| self.evaluate(arg))
            .collect::<Result<Vec<_>>>()?;
        method.invoke(Some(&target), &args, self.metadata)
    }

    fn unary(&self, unary: &Unary) -> Result<Option<Object>> {
        let Some(operand) = self.evaluate(&unary.operand)? else {
            return Ok(None);
        };
        let value = scalar(&operand).ok_or_else(|| {
            evaluation(format_args!(
                "operator `{}` cannot be applied to {}",
                unary.token.symbol(),
                operand.object_type()
            ))
        })?;
        let result = match (unary.token, value) {
            (UnaryToken::Minus, Scalar::Int(v)) => {
                Scalar::Int(v.checked_neg().ok_or_else(|| evaluation("integer overflow"))?)
            }
            (UnaryToken::Minus, Scalar::Float(v)) => Scalar::Float(-v),
            (UnaryToken::Plus, v @ (Scalar::Int(_) | Scalar::Float(_))) => v,
            (UnaryToken::Not, Scalar::Bool(v)) => Scalar::Bool(!v),
            (UnaryToken::BitwiseNot, Scalar::Int(v)) => Scalar::Int(!v),
            (token, value) => {
                return Err(evaluation(format_args!(
                    "operator `{}` cannot be applied to {}",
                    token.symbol(),
                    value.type_name()
                )));
            }
        };
        Ok(Some(result.into_object()))
    }

    fn binary(&self, binary: &Binary) -> Result<Option<Object>> {
        match binary.token {
            BinaryToken::And => {
                return Ok(Some(Object::new(
                    self.boolean(&binary.left, "&&")? && self.boolean(&binary.right, "&&")?,
                )));
            }
            BinaryToken::Or => {
                return Ok(Some(Object::new(
                    self.boolean(&binary.left, "||")? || self.boolean(&binary.right, "||")?,
                )));
            }
            BinaryToken::NullCoalesce => {
                return match self.evaluate(&binary.left)? {
                    Some(value) => Ok(Some(value)),
                    None => self.evaluate(&binary.right),
                };
            }
            _ => {}
        }

        let left = self.evaluate(&binary.left)?;
        let right = self.evaluate(&binary.right)?;
        match binary.token {
            BinaryToken::Equal => return Ok(Some(Object::new(values_equal(&left, &right)))),
            BinaryToken::NotEqual => return Ok(Some(Object::new(!values_equal(&left, &right)))),
            _ => {}
        }
        let (Some(left), Some(right)) = (left, right) else {
            return Ok(None);
        };
        let incompatible = || {
            evaluation(format_args!(
                "operator `{}` cannot be applied to {} and {}",
                binary.token.symbol(),
                left.object_type(),
                right.object_type()
            ))
        };
        let (Some(l), Some(r)) = (scalar(&left), scalar(&right)) else {
            return Err(incompatible());
        };
        let result = apply(binary.token, l, r)?.ok_or_else(incompatible)?;
        Ok(Some(result.into_object()))
    }

    fn condition(&self, condition: &Condition) -> Result<Option<Object>> {
        if self.boolean(&condition.condition, "?:")? {
            self.evaluate(&condition.if_true)
        } else {
            self.evaluate(&condition.if_false)
        }
    }

    fn boolean(&self, expr: &Expr, operator: &str) -> Result<bool> {
        match self.evaluate(expr)? {
            Some(value) => value.downcast_ref::<bool>().copied().ok_or_else(|| {
                evaluation(format_args!(
                    "`{operator}` expects a bool, found {}",
                    value.object_type()
                ))
            }),
            None => Err(evaluation(format_args!("`{operator}` expects a bool, found null"))),
        }
    }
}

fn evaluation(message: impl fmt::Display) -> BindingError {
    BindingError::Evaluation(message.to_string())
}

pub(crate) fn literal_object(literal: &Literal) -> Option<Object> {
    match literal {
        Literal::Null => None,
        Literal::Bool(v) => Some(Object::new(*v)),
        Literal::Int(v) => Some(Object::new(*v)),
        Literal::Float(v) => Some(Object::new(*v)),
        Literal::Char(v) => Some(Object::new(*v)),
        Literal::Str(v) => Some(Object::new(v.to_string())),
    }
}

fn object_literal(value: Option<&Object>) -> Result<Literal> {
    let Some(value) = value else {
        return Ok(Literal::Null);
    };
    match scalar(value) {
        Some(Scalar::Bool(v)) => Ok(Literal::Bool(v)),
        Some(Scalar::Int(v)) => Ok(Literal::Int(v)),
        Some(Scalar::Float(v)) => Ok(Literal::Float(v)),
        Some(Scalar::Char(v)) => Ok(Literal::Char(v)),
        Some(Scalar::Str(v)) => Ok(Literal::Str(v)),
        None => Err(evaluation(format_args!(
            "{} cannot be used as an index",
            value.object_type()
        ))),
    }
}

#[derive(Clone, Debug, PartialEq)]
enum Scalar {
    Bool(bool),
    Int(i64),
    Float(f64),
    Char(char),
    Str(Rc<str>),
}

impl Scalar {
    fn type_name(&self) -> &'static str {
        match self {
            Scalar::Bool(_) => "bool",
            Scalar::Int(_) => "i64",
            Scalar::Float(_) => "f64",
            Scalar::Char(_) => "char",
            Scalar::Str(_) => "string",
        }
    }

    fn as_f64(&self) -> Option<f64> {
        match self {
            Scalar::Int(v) => Some(*v as f64),
            Scalar::Float(v) => Some(*v),
            _ => None,
        }
    }

    fn into_object(self) -> Object {
        match self {
            Scalar::Bool(v) => Object::new(v),
            Scalar::Int(v) => Object::new(v),
            Scalar::Float(v) => Object::new(v),
            Scalar::Char(v) => Object::new(v),
            Scalar::Str(v) => Object::new(v.to_string()),
        }
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::Bool(v) => write!(f, "{v}"),
            Scalar::Int(v) => write!(f, "{v}"),
            Scalar::Float(v) => write!(f, "{v}"),
            Scalar::Char(v) => write!(f, "{v}"),
            Scalar::Str(v) => f.write_str(v),
        }
    }
}

fn scalar(value: &Object) -> Option<Scalar> {
    if let Some(v) = value.downcast_ref::<i64>() {
        return Some(Scalar::Int(*v));
    }
    if let Some(v) = value.downcast_ref::<f64>() {
        return Some(Scalar::Float(*v));
    }
    if let Some(v) = value.downcast_ref::<bool>() {
        return Some(Scalar::Bool(*v));
    }
    if let Some(v) = value.downcast_ref::<String>() {
        return Some(Scalar::Str(v.as_str().into()));
    }
    if let Some(v) = value.downcast_ref::<&'static str>() {
        return Some(Scalar::Str((*v).into()));
    }
    if let Some(v) = value.downcast_ref::<Rc<str>>() {
        return Some(Scalar::Str(v.clone()));
    }
    if let Some(v) = value.downcast_ref::<char>() {
        return Some(Scalar::Char(*v));
    }
    if let Some(v) = value.downcast_ref::<i32>() {
        return Some(Scalar::Int(i64::from(*v)));
    }
    if let Some(v) = value.downcast_ref::<u32>() {
        return Some(Scalar::Int(i64::from(*v)));
    }
    if let Some(v) = value.downcast_ref::<usize>() {
        return i64::try_from(*v).ok().map(Scalar::Int);
    }
    if let Some(v) = value.downcast_ref::<f32>() {
        return Some(Scalar::Float(f64::from(*v)));
    }
    None
}

fn values_equal(left: &Option<Object>, right: &Option<Object>) -> bool {
    match (left, right) {
        (None, None) => true,
        (Some(left), Some(right)) => match (scalar(left), scalar(right)) {
            (Some(l), Some(r)) => match (l.as_f64(), r.as_f64()) {
                (Some(l), Some(r)) => l == r,
                _ => l == r,
            },
            (None, None) => left.ptr_eq(right),
            _ => false,
        },
        _ => false,
    }
}

/// `Ok(None)` when the operator does not apply to these operand types.
fn apply(token: BinaryToken, left: Scalar, right: Scalar) -> Result<Option<Scalar>> {
    use Scalar::{Bool, Int, Str};

    if token == BinaryToken::Add && (matches!(left, Str(_)) || matches!(right, Str(_))) {
        return Ok(Some(Str(format!("{left}{right}").into())));
    }
    match (left, right) {
        (Int(l), Int(r)) => int_op(token, l, r),
        (Bool(l), Bool(r)) => Ok(match token {
            BinaryToken::BitAnd => Some(Bool(l & r)),
            BinaryToken::BitOr => Some(Bool(l | r)),
            BinaryToken::BitXor => Some(Bool(l ^ r)),
            _ => None,
        }),
        (Str(l), Str(r)) => Ok(compare(token, l.cmp(&r)).map(Bool)),
        (l, r) => match (l.as_f64(), r.as_f64()) {
            (Some(l), Some(r)) => Ok(float_op(token, l, r)),
            _ => Ok(None),
        },
    }
}

fn int_op(token: BinaryToken, l: i64, r: i64) -> Result<Option<Scalar>> {
    let checked = |value: Option<i64>| {
        value.map(|v| Some(Scalar::Int(v))).ok_or_else(|| {
            if r == 0 && matches!(token, BinaryToken::Div | BinaryToken::Rem) {
                evaluation("division by zero")
            } else {
                evaluation("integer overflow")
            }
        })
    };
    match token {
        BinaryToken::Add => checked(l.checked_add(r)),
        BinaryToken::Sub => checked(l.checked_sub(r)),
        BinaryToken::Mul => checked(l.checked_mul(r)),
        BinaryToken::Div => checked(l.checked_div(r)),
        BinaryToken::Rem => checked(l.checked_rem(r)),
        BinaryToken::BitAnd => Ok(Some(Scalar::Int(l & r))),
        BinaryToken::BitOr => Ok(Some(Scalar::Int(l | r))),
        BinaryToken::BitXor => Ok(Some(Scalar::Int(l ^ r))),
        _ => Ok(compare(token, l.cmp(&r)).map(Scalar::Bool)),
    }
}

fn float_op(token: BinaryToken, l: f64, r: f64) -> Option<Scalar> {
    let value = match token {
        BinaryToken::Add => l + r,
        BinaryToken::Sub => l - r,
        BinaryToken::Mul => l * r,
        BinaryToken::Div => l / r,
        BinaryToken::Rem => l % r,
        _ => return l.partial_cmp(&r).and_then(|ord| compare(token, ord)).map(Scalar::Bool),
    };
    Some(Scalar::Float(value))
}

fn compare(token: BinaryToken, ordering: std::cmp::Ordering) -> Option<bool> {
    match token {
        BinaryToken::Less => Some(ordering.is_lt()),
        BinaryToken::LessOrEqual => Some(ordering.is_le()),
        BinaryToken::Greater => Some(ordering.is_gt()),
        BinaryToken::GreaterOrEqual => Some(ordering.is_ge()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::MemberRegistry;

    fn eval(expr: &Expr) -> Result<Option<Object>> {
        let registry = MemberRegistry::new();
        Evaluator::new(&registry).evaluate(expr)
    }

    fn int(expr: &Expr) -> i64 {
        *eval(expr).unwrap().unwrap().downcast_ref::<i64>().unwrap()
    }

    fn boolean(expr: &Expr) -> bool {
        *eval(expr).unwrap().unwrap().downcast_ref::<bool>().unwrap()
    }

    fn bin(token: BinaryToken, l: impl Into<Literal>, r: impl Into<Literal>) -> Expr {
        Expr::binary(token, Expr::constant(l), Expr::constant(r))
    }

    #[test]
    fn arithmetic_widens_mixed_operands() {
        assert_eq!(int(&bin(BinaryToken::Add, 2, 3)), 5);
        assert_eq!(int(&bin(BinaryToken::Rem, 7, 4)), 3);
        let mixed = eval(&bin(BinaryToken::Mul, 2, 1.5)).unwrap().unwrap();
        assert_eq!(mixed.downcast_ref::<f64>(), Some(&3.0));
    }

    #[test]
    fn integer_faults_are_errors() {
        assert_eq!(
            eval(&bin(BinaryToken::Div, 1, 0)).unwrap_err(),
            BindingError::Evaluation("division by zero".into())
        );
        assert!(eval(&bin(BinaryToken::Add, i64::MAX, 1)).is_err());
    }

    #[test]
    fn strings_concatenate_and_compare() {
        let joined = eval(&bin(BinaryToken::Add, "n=", 4)).unwrap().unwrap();
        assert_eq!(joined.downcast_ref::<String>().map(String::as_str), Some("n=4"));
        assert!(boolean(&bin(BinaryToken::Less, "a", "b")));
    }

    #[test]
    fn equality_handles_null_and_numbers() {
        assert!(boolean(&bin(BinaryToken::Equal, Literal::Null, Literal::Null)));
        assert!(!boolean(&bin(BinaryToken::Equal, 1, Literal::Null)));
        assert!(boolean(&bin(BinaryToken::Equal, 2, 2.0)));
        assert!(boolean(&bin(BinaryToken::NotEqual, "a", 1)));
    }

    #[test]
    fn null_propagates_through_arithmetic() {
        assert!(eval(&bin(BinaryToken::Add, 1, Literal::Null)).unwrap().is_none());
        let coalesced = bin(BinaryToken::NullCoalesce, Literal::Null, 9);
        assert_eq!(int(&coalesced), 9);
    }

    #[test]
    fn logic_short_circuits() {
        // The right-hand side would fail if evaluated.
        let failing = Expr::lambda(Expr::constant(true), Vec::new());
        let and = Expr::binary(BinaryToken::And, Expr::constant(false), failing.clone());
        assert!(!boolean(&and));
        let or = Expr::binary(BinaryToken::Or, Expr::constant(true), failing);
        assert!(boolean(&or));
    }

    #[test]
    fn unary_and_condition() {
        assert_eq!(int(&Expr::unary(UnaryToken::Minus, Expr::constant(4))), -4);
        assert!(!boolean(&Expr::unary(UnaryToken::Not, Expr::constant(true))));
        let pick = Expr::condition(
            bin(BinaryToken::Greater, 3, 2),
            Expr::constant(10),
            Expr::constant(20),
        );
        assert_eq!(int(&pick), 10);
        assert!(eval(&Expr::condition(Expr::constant(1), Expr::null(), Expr::null())).is_err());
    }

    #[test]
    fn lambdas_and_unbound_parameters_fail() {
        let lambda = Expr::lambda(Expr::constant(1), vec![Expr::parameter("x", 0)]);
        assert!(matches!(eval(&lambda), Err(BindingError::Evaluation(_))));
        assert!(matches!(
            eval(&Expr::parameter("x", 0)),
            Err(BindingError::Evaluation(_))
        ));
    }
}
