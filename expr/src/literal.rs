//! Literal values carried by constant nodes, and the per-thread constant pool.
//!
//! Parsers produce the same handful of literals over and over (`true`, `0`,
//! `null`, `""`). [`Expr::constant`](crate::Expr::constant) hands those out from
//! a pool so that repeated parses share one node, which also keeps reference
//! equality usable as a cache key.

use std::{cell::RefCell, fmt, rc::Rc};

use crate::node::{Constant, Expr, ExprNode};

/// Smallest integer served from the pool.
pub const POOLED_INT_MIN: i64 = -1;
/// Largest integer served from the pool.
pub const POOLED_INT_MAX: i64 = 255;

#[derive(Clone, Debug, PartialEq)]
pub enum Literal {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Char(char),
    Str(Rc<str>),
}

impl Literal {
    /// The name of the type this literal evaluates to.
    pub fn type_name(&self) -> &'static str {
        match self {
            Literal::Null => "null",
            Literal::Bool(_) => "bool",
            Literal::Int(_) => "i64",
            Literal::Float(_) => "f64",
            Literal::Char(_) => "char",
            Literal::Str(_) => "string",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Literal::Null)
    }
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Literal::Null => f.write_str("null"),
            Literal::Bool(v) => write!(f, "{v}"),
            Literal::Int(v) => write!(f, "{v}"),
            Literal::Float(v) => write!(f, "{v:?}"),
            Literal::Char(v) => write_quoted(f, '\'', v.encode_utf8(&mut [0; 4])),
            Literal::Str(v) => write_quoted(f, '"', v),
        }
    }
}

/// Writes `text` between `quote`s, escaping the quote and `\` with a backslash.
fn write_quoted(f: &mut fmt::Formatter<'_>, quote: char, text: &str) -> fmt::Result {
    use fmt::Write;

    f.write_char(quote)?;
    for c in text.chars() {
        if c == quote || c == '\\' {
            f.write_char('\\')?;
        }
        f.write_char(c)?;
    }
    f.write_char(quote)
}

impl From<bool> for Literal {
    fn from(value: bool) -> Self {
        Literal::Bool(value)
    }
}

impl From<i64> for Literal {
    fn from(value: i64) -> Self {
        Literal::Int(value)
    }
}

impl From<i32> for Literal {
    fn from(value: i32) -> Self {
        Literal::Int(value as i64)
    }
}

impl From<f64> for Literal {
    fn from(value: f64) -> Self {
        Literal::Float(value)
    }
}

impl From<char> for Literal {
    fn from(value: char) -> Self {
        Literal::Char(value)
    }
}

impl From<&str> for Literal {
    fn from(value: &str) -> Self {
        Literal::Str(value.into())
    }
}

impl From<String> for Literal {
    fn from(value: String) -> Self {
        Literal::Str(value.into())
    }
}

thread_local! {
    static POOL: ConstantPool = ConstantPool::new();
}

struct ConstantPool {
    null: Expr,
    true_: Expr,
    false_: Expr,
    empty_str: Expr,
    ints: RefCell<Vec<Option<Expr>>>,
}

impl ConstantPool {
    fn new() -> Self {
        Self {
            null: raw_constant(Literal::Null),
            true_: raw_constant(Literal::Bool(true)),
            false_: raw_constant(Literal::Bool(false)),
            empty_str: raw_constant(Literal::Str("".into())),
            ints: RefCell::new(vec![None; (POOLED_INT_MAX - POOLED_INT_MIN + 1) as usize]),
        }
    }

    fn get(&self, value: &Literal) -> Option<Expr> {
        match value {
            Literal::Null => Some(self.null.clone()),
            Literal::Bool(true) => Some(self.true_.clone()),
            Literal::Bool(false) => Some(self.false_.clone()),
            Literal::Str(s) if s.is_empty() => Some(self.empty_str.clone()),
            Literal::Int(v) if (POOLED_INT_MIN..=POOLED_INT_MAX).contains(v) => {
                let slot = (*v - POOLED_INT_MIN) as usize;
                let mut ints = self.ints.borrow_mut();
                Some(
                    ints[slot]
                        .get_or_insert_with(|| raw_constant(Literal::Int(*v)))
                        .clone(),
                )
            }
            _ => None,
        }
    }
}

fn raw_constant(value: Literal) -> Expr {
    Expr::from_node(ExprNode::Constant(Constant { value, ty: None }))
}

/// Returns the pooled node for `value`, if the value is poolable.
pub(crate) fn pooled(value: &Literal) -> Option<Expr> {
    POOL.with(|pool| pool.get(value))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quotes_and_backslashes_are_escaped() {
        assert_eq!(Literal::from("a\"b").to_string(), r#""a\"b""#);
        assert_eq!(Literal::from(r"c:\x").to_string(), r#""c:\\x""#);
        assert_eq!(Literal::from('\'').to_string(), r"'\''");
        assert_eq!(Literal::from("it's").to_string(), "\"it's\"");
    }
}
