use std::any::Any;

use floem_expr::ExprError;

/// Errors produced while resolving, observing or evaluating member paths.
///
/// Observers keep the last error they hit and hand out copies, hence `Clone`.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum BindingError {
    /// A required path segment does not exist on the type it was resolved against.
    #[error("cannot resolve member `{member}` on type `{ty}`")]
    MissingMember { ty: String, member: String },
    #[error("invalid member path `{path}`: {reason}")]
    InvalidPath { path: String, reason: &'static str },
    #[error("member `{0}` cannot be read")]
    NotReadable(String),
    #[error("member `{0}` cannot be written")]
    NotWritable(String),
    #[error("member `{0}` cannot be invoked")]
    NotInvocable(String),
    /// A host accessor, event or method reported a failure.
    #[error("member `{member}` failed: {message}")]
    Member { member: String, message: String },
    #[error("evaluation failed: {0}")]
    Evaluation(String),
    #[error(transparent)]
    Expr(#[from] ExprError),
    #[error("listener panicked: {0}")]
    ListenerPanicked(String),
    /// Anything unexpected that happened while an observer was updating.
    #[error("observer fault: {0}")]
    InternalFault(String),
}

impl BindingError {
    pub fn missing_member(ty: impl ToString, member: impl Into<String>) -> Self {
        BindingError::MissingMember {
            ty: ty.to_string(),
            member: member.into(),
        }
    }

    pub fn member(member: impl Into<String>, message: impl ToString) -> Self {
        BindingError::Member {
            member: member.into(),
            message: message.to_string(),
        }
    }
}

pub type Result<T, E = BindingError> = std::result::Result<T, E>;

/// Best-effort text of a panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_owned()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_owned()
    }
}
