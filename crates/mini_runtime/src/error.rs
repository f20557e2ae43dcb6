use mini_syntax::{Diagnostic, Phase, Temp};
use thiserror::Error;

/// Terminal failure while executing IR. Execution stops at the first one.
#[derive(Clone, Debug, PartialEq, Error)]
pub enum RuntimeError {
    #[error("division by zero")]
    DivisionByZero,
    #[error("read of undefined temporary '{0}'")]
    UndefinedTemporary(Temp),
    #[error("undefined variable '{0}'")]
    UndefinedVariable(String),
    #[error("call to unknown function '{0}'")]
    UnknownFunction(String),
    #[error("jump to unknown label '{0}'")]
    UnknownLabel(String),
    #[error("function '{function}' expects {expected} arguments, got {found}")]
    ArityMismatch {
        function: String,
        expected: usize,
        found: usize,
    },
    #[error("cannot apply '{op}' to {operands}")]
    TypeMismatch { op: &'static str, operands: String },
    #[error("maximum call depth of {0} exceeded")]
    StackOverflow(usize),
    #[error("step limit of {0} instructions exceeded")]
    StepLimit(u64),
}

impl RuntimeError {
    pub fn kind(&self) -> &'static str {
        match self {
            RuntimeError::DivisionByZero => "division-by-zero",
            RuntimeError::UndefinedTemporary(_) => "undefined-temporary",
            RuntimeError::UndefinedVariable(_) => "undefined-variable",
            RuntimeError::UnknownFunction(_) => "unknown-function",
            RuntimeError::UnknownLabel(_) => "unknown-label",
            RuntimeError::ArityMismatch { .. } => "arity-mismatch",
            RuntimeError::TypeMismatch { .. } => "type-mismatch",
            RuntimeError::StackOverflow(_) => "stack-overflow",
            RuntimeError::StepLimit(_) => "step-limit",
        }
    }

    pub fn to_diagnostic(&self) -> Diagnostic {
        Diagnostic::error(Phase::Runtime, self.kind(), self.to_string(), None)
    }
}
