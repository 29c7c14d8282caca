//! Runtime errors
//!
//! Executor failures. They are never catchable by `try`; only values raised
//! with `throw` are.

use framejit_diagnostics::{Diagnostic, DiagnosticCode};
use framejit_ir::SpanTable;
use framejit_transform::CompileError;
use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum RuntimeError {
    #[error("type mismatch: expected {expected}, found {found}")]
    TypeMismatch { expected: &'static str, found: String },

    #[error("wrong number of arguments: expected {expected}, found {found}")]
    ArityMismatch { expected: usize, found: usize },

    #[error("variable '{name}' is not declared in this function")]
    UndeclaredVariable { name: String },

    #[error("cannot execute {kind} node")]
    UnexpectedNode { kind: &'static str },

    #[error("value of type {found} is not callable")]
    NotCallable { found: String },

    #[error("division by zero")]
    DivisionByZero,

    #[error("method table entry {index} is {found}, expected {expected}")]
    ThunkTypeMismatch {
        index: usize,
        expected: String,
        found: String,
    },

    #[error("method table has no entry {index}")]
    MissingThunk { index: usize },

    #[error("frame slot {slot} out of range (frame has {len} slot(s))")]
    SlotOutOfRange { slot: usize, len: usize },

    #[error("frame slot {slot} does not hold a cell")]
    NotACell { slot: usize },

    #[error("index {index} out of range for {len} variable(s)")]
    IndexOutOfRange { index: usize, len: usize },

    #[error("call depth exceeds {limit}")]
    CallDepthExceeded { limit: usize },

    #[error("uncaught exception: {value}")]
    UncaughtException { value: String },
}

impl RuntimeError {
    pub fn code(&self) -> DiagnosticCode {
        match self {
            RuntimeError::UncaughtException { .. } => DiagnosticCode::UncaughtException,
            _ => DiagnosticCode::RuntimeError,
        }
    }

    pub fn to_diagnostic(&self) -> Diagnostic {
        let builder = Diagnostic::error(self.code(), self.to_string());
        match self {
            RuntimeError::UncaughtException { .. } => builder
                .with_help("wrap the call in (try ... (catch (e any) ...)) to handle it")
                .build(),
            RuntimeError::CallDepthExceeded { .. } => builder
                .with_note("deep recursion is not supported by the reference executor")
                .build(),
            _ => builder.build(),
        }
    }
}

/// Failure of [`crate::compile_tree`]
#[derive(Debug, Clone, Error)]
pub enum ExecError {
    #[error(transparent)]
    Compile(#[from] CompileError),
    #[error(transparent)]
    Runtime(#[from] RuntimeError),
}

impl ExecError {
    pub fn to_diagnostic(&self, spans: &SpanTable) -> Diagnostic {
        match self {
            ExecError::Compile(err) => err.to_diagnostic(spans),
            ExecError::Runtime(err) => err.to_diagnostic(),
        }
    }
}
