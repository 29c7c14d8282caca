//! Compile errors
//!
//! Every failure halts the current compile. Errors name the node or
//! variable they concern so callers holding a [`SpanTable`] can point at
//! the source.

use framejit_diagnostics::{Diagnostic, DiagnosticCode};
use framejit_ir::{SpanTable, StorageKind, Variable};
use framejit_types::NodeId;
use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum CompileError {
    #[error("unbound variable '{}'", .variable.name())]
    UnboundVariable { variable: Variable, node: NodeId },

    #[error("by-reference variable '{}' cannot be captured ({storage} storage required)", .variable.name())]
    ByRefCapture {
        variable: Variable,
        storage: StorageKind,
        node: NodeId,
    },

    #[error("unexpected {kind} node")]
    UnexpectedNode { kind: &'static str, node: NodeId },

    #[error("scope for node {node} registered twice")]
    ScopeAlreadyRegistered { node: NodeId },

    #[error("variable '{}' is not in frame {frame}", .variable.name())]
    VariableNotInFrame { variable: Variable, frame: String },

    #[error("no scope recorded for {kind} node {node}")]
    MissingScope { kind: &'static str, node: NodeId },

    #[error("no frame in scope for hoisted variable '{}'", .variable.name())]
    MissingFrame { variable: Variable },

    #[error("expression nesting exceeds the depth limit of {limit}")]
    DepthLimitExceeded { limit: usize, node: NodeId },
}

impl CompileError {
    pub fn code(&self) -> DiagnosticCode {
        match self {
            CompileError::UnboundVariable { .. } => DiagnosticCode::UnboundVariable,
            CompileError::ByRefCapture { .. } => DiagnosticCode::ByRefCapture,
            CompileError::UnexpectedNode { .. } => DiagnosticCode::UnexpectedNode,
            CompileError::ScopeAlreadyRegistered { .. } => DiagnosticCode::ScopeAlreadyRegistered,
            CompileError::VariableNotInFrame { .. } => DiagnosticCode::VariableNotInFrame,
            CompileError::MissingScope { .. } => DiagnosticCode::MissingScope,
            CompileError::MissingFrame { .. } => DiagnosticCode::InternalError,
            CompileError::DepthLimitExceeded { .. } => DiagnosticCode::DepthLimitExceeded,
        }
    }

    /// Node the error was raised at, if any
    pub fn node(&self) -> Option<NodeId> {
        match self {
            CompileError::UnboundVariable { node, .. }
            | CompileError::ByRefCapture { node, .. }
            | CompileError::UnexpectedNode { node, .. }
            | CompileError::ScopeAlreadyRegistered { node }
            | CompileError::MissingScope { node, .. }
            | CompileError::DepthLimitExceeded { node, .. } => Some(*node),
            CompileError::VariableNotInFrame { .. } | CompileError::MissingFrame { .. } => None,
        }
    }

    /// Variable the error concerns, if any
    pub fn variable(&self) -> Option<&Variable> {
        match self {
            CompileError::UnboundVariable { variable, .. }
            | CompileError::ByRefCapture { variable, .. }
            | CompileError::VariableNotInFrame { variable, .. }
            | CompileError::MissingFrame { variable } => Some(variable),
            _ => None,
        }
    }

    pub fn is_internal(&self) -> bool {
        matches!(
            self,
            CompileError::ScopeAlreadyRegistered { .. }
                | CompileError::VariableNotInFrame { .. }
                | CompileError::MissingScope { .. }
                | CompileError::MissingFrame { .. }
        )
    }

    pub fn to_diagnostic(&self, spans: &SpanTable) -> Diagnostic {
        let span = match (self.node(), self.variable()) {
            (Some(node), _) if !spans.node(node).is_dummy() => spans.node(node),
            (_, Some(variable)) => spans.variable(variable.id()),
            _ => framejit_diagnostics::Span::DUMMY,
        };
        let builder = Diagnostic::error(self.code(), self.to_string()).with_span(span);

        match self {
            CompileError::UnboundVariable { variable, .. } => builder
                .with_help(format!(
                    "declare '{}' in an enclosing block, lambda or catch",
                    variable.name()
                ))
                .build(),
            CompileError::ByRefCapture { variable, .. } => builder
                .with_label(spans.variable(variable.id()), "declared by reference here")
                .with_help("copy the parameter into a local before capturing it")
                .build(),
            CompileError::UnexpectedNode { kind, .. } => builder
                .with_note(format!("'{}' must be reduced by the normalizer before closure conversion", kind))
                .build(),
            CompileError::DepthLimitExceeded { .. } => builder
                .with_help("raise compile.max_depth in framejit.toml")
                .build(),
            _ => builder
                .with_note("this is a compiler bug; please report it")
                .build(),
        }
    }
}
