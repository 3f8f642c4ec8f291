use std::rc::Rc;

use floem_expr::{Expr, ExprNode, ExprVisitor};
use indexmap::IndexSet;
use rustc_hash::FxBuildHasher;

use crate::{
    error::{BindingError, Result},
    path::MemberPath,
};

/// Type tag carried by the parameters [`MemberPathCollector`] produces.
pub const MEMBER_PATH_PARAMETER: &str = "member path";

/// Replaces member chains on the binding source with parameters.
///
/// `Items[0].Name` becomes a parameter named `Items[0].Name` whose index
/// points into [`MemberPathCollector::paths`]. Equal chains share one path and
/// one index. Index arguments must be constants for a chain to be collected;
/// anything else (method calls, computed indices) ends the chain, although its
/// own sub-expressions are still visited.
#[derive(Debug, Default)]
pub struct MemberPathCollector {
    source: Option<Rc<str>>,
    paths: IndexSet<MemberPath, FxBuildHasher>,
}

impl MemberPathCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Treats parameters called `name` as the binding source as well.
    pub fn with_source_parameter(mut self, name: impl Into<Rc<str>>) -> Self {
        self.source = Some(name.into());
        self
    }

    /// Rewrites `expr`, adding its chains to the collected paths.
    pub fn collect(&mut self, expr: &Expr) -> Result<Expr> {
        expr.accept_required(self)
    }

    pub fn paths(&self) -> impl ExactSizeIterator<Item = &MemberPath> {
        self.paths.iter()
    }

    pub fn into_paths(self) -> Vec<MemberPath> {
        self.paths.into_iter().collect()
    }

    /// The path text of `expr` if it is a chain rooted at the source.
    fn chain(&self, expr: &Expr) -> Option<String> {
        match expr.node() {
            ExprNode::Member(member) => {
                let mut text = self.prefix(member.target.as_ref())?;
                if !text.is_empty() {
                    text.push('.');
                }
                text.push_str(&member.name);
                Some(text)
            }
            ExprNode::Index(index) => {
                let mut text = self.prefix(index.target.as_ref())?;
                text.push('[');
                for (i, arg) in index.args.iter().enumerate() {
                    if i > 0 {
                        text.push_str(", ");
                    }
                    text.push_str(&arg.as_constant()?.value.to_string());
                }
                text.push(']');
                Some(text)
            }
            ExprNode::Parameter(param) if self.is_source(&param.name) => Some(String::new()),
            _ => None,
        }
    }

    fn prefix(&self, target: Option<&Expr>) -> Option<String> {
        match target {
            None => Some(String::new()),
            Some(target) => self.chain(target),
        }
    }

    fn is_source(&self, name: &str) -> bool {
        self.source.as_deref() == Some(name)
    }
}

impl ExprVisitor for MemberPathCollector {
    type Error = BindingError;

    fn visit(&mut self, expr: &Expr) -> Result<Option<Expr>> {
        let Some(text) = self.chain(expr) else {
            return Ok(Some(expr.clone()));
        };
        let path = MemberPath::parse(&text)?;
        let name: Rc<str> = path.path().into();
        let (index, _) = self.paths.insert_full(path);
        Ok(Some(Expr::typed_parameter(name, index, MEMBER_PATH_PARAMETER)))
    }
}
