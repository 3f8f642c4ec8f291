//! Binding expressions on top of path observers.
//!
//! [`CompiledExpression::compile`] pulls every member chain out of an
//! expression tree, so that each chain can be watched by its own
//! [`PathObserver`] and the remaining tree evaluated from their values.

mod collect;
mod eval;

use std::rc::Rc;

use floem_expr::Expr;

pub use collect::{MEMBER_PATH_PARAMETER, MemberPathCollector};
pub use eval::Evaluator;

use crate::{
    error::{BindingError, Result},
    member::{MemberFlags, MemberResolver},
    object::Object,
    observer::{ObserverFlags, PathObserver, Root},
    path::MemberPath,
    provider::ObserverProvider,
};

/// An expression whose member chains were replaced by path parameters.
#[derive(Clone)]
pub struct CompiledExpression {
    expr: Expr,
    paths: Rc<[MemberPath]>,
    resolver: Rc<dyn MemberResolver>,
    member_flags: MemberFlags,
}

impl CompiledExpression {
    pub fn compile(expr: &Expr, provider: &ObserverProvider) -> Result<Self> {
        let mut collector = MemberPathCollector::new();
        let expr = collector.collect(expr)?;
        Ok(CompiledExpression {
            expr,
            paths: collector.into_paths().into(),
            resolver: provider.resolver().clone(),
            member_flags: provider.config().member_flags,
        })
    }

    /// The rewritten tree.
    pub fn expr(&self) -> &Expr {
        &self.expr
    }

    /// The collected paths; a parameter's index points into this list.
    pub fn paths(&self) -> &[MemberPath] {
        &self.paths
    }

    /// One observer per collected path, in path order. `target` is held weakly.
    pub fn observe(&self, target: &Object, flags: ObserverFlags) -> Vec<PathObserver> {
        self.paths
            .iter()
            .map(|path| {
                PathObserver::create(
                    self.resolver.clone(),
                    Root::Weak(target.downgrade()),
                    path.clone(),
                    flags,
                    self.member_flags,
                )
            })
            .collect()
    }

    /// Evaluates with the current values of `observers`, as returned by
    /// [`CompiledExpression::observe`]. Their shared target is the source of
    /// method calls without a target.
    pub fn evaluate(&self, observers: &[PathObserver]) -> Result<Option<Object>> {
        let source = observers.iter().find_map(PathObserver::target);
        self.evaluate_with(observers, source.as_ref())
    }

    /// Evaluates once against `target` without keeping any observers.
    pub fn evaluate_on(&self, target: &Object) -> Result<Option<Object>> {
        let observers = self.observe(target, ObserverFlags::empty());
        let value = self.evaluate_with(&observers, Some(target));
        for observer in &observers {
            observer.dispose();
        }
        value
    }

    fn evaluate_with(
        &self,
        observers: &[PathObserver],
        source: Option<&Object>,
    ) -> Result<Option<Object>> {
        if observers.len() != self.paths.len() {
            return Err(BindingError::Evaluation(format!(
                "expected {} observers, got {}",
                self.paths.len(),
                observers.len()
            )));
        }
        let values = observers
            .iter()
            .map(|observer| observer.value(None))
            .collect::<Result<Vec<_>>>()?;
        let mut evaluator = Evaluator::new(&*self.resolver)
            .with_member_flags(self.member_flags)
            .with_values(&values);
        if let Some(source) = source {
            evaluator = evaluator.with_source(source);
        }
        evaluator.evaluate(&self.expr)
    }
}

impl std::fmt::Debug for CompiledExpression {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompiledExpression")
            .field("expr", &self.expr)
            .field("paths", &self.paths)
            .finish()
    }
}
