//! Diagnostic types for compile and execution failures.

use crate::span::{Label, Span};
use serde::{Deserialize, Serialize};

/// Severity level of a diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Severity {
    Hint,
    Warning,
    Error,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Hint => "hint",
            Severity::Warning => "warning",
            Severity::Error => "error",
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Diagnostic codes organized by category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DiagnosticCode {
    // Reader and lowering (P001-P099)
    /// Tokenizer or reader failure
    ParseError,
    /// A special form with the wrong shape
    MalformedForm,
    /// Unknown type name in a declaration
    UnknownType,
    /// A name declared twice in the same scope
    DuplicateDeclaration,

    // Resolution (R001-R099)
    /// Variable reference without a declaration in any enclosing scope
    UnboundVariable,

    // Capture (C001-C099)
    /// By-reference variable captured by a nested function, quote or
    /// runtime-variables access
    ByRefCapture,

    // Structure (S001-S099)
    /// Node kind not accepted by the analyzer or rewriter
    UnexpectedNode,

    // Limits (L001-L099)
    /// Tree nesting deeper than the configured limit
    DepthLimitExceeded,

    // Internal invariants (I001-I099)
    /// A scope registered twice for the same node
    ScopeAlreadyRegistered,
    /// Frame lookup for a variable the frame does not hold
    VariableNotInFrame,
    /// Scope-introducing node with no analysis result
    MissingScope,
    /// Generic internal compiler error
    InternalError,

    // Execution (E001-E099)
    /// Failure while running converted code
    RuntimeError,
    /// A thrown value no handler caught
    UncaughtException,
}

impl DiagnosticCode {
    /// All codes, in documentation order.
    pub const ALL: &'static [DiagnosticCode] = &[
        Self::ParseError,
        Self::MalformedForm,
        Self::UnknownType,
        Self::DuplicateDeclaration,
        Self::UnboundVariable,
        Self::ByRefCapture,
        Self::UnexpectedNode,
        Self::DepthLimitExceeded,
        Self::ScopeAlreadyRegistered,
        Self::VariableNotInFrame,
        Self::MissingScope,
        Self::InternalError,
        Self::RuntimeError,
        Self::UncaughtException,
    ];

    /// Code string (e.g. "R001").
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ParseError => "P001",
            Self::MalformedForm => "P002",
            Self::UnknownType => "P003",
            Self::DuplicateDeclaration => "P004",

            Self::UnboundVariable => "R001",

            Self::ByRefCapture => "C001",

            Self::UnexpectedNode => "S001",

            Self::DepthLimitExceeded => "L001",

            Self::ScopeAlreadyRegistered => "I001",
            Self::VariableNotInFrame => "I002",
            Self::MissingScope => "I003",
            Self::InternalError => "I004",

            Self::RuntimeError => "E001",
            Self::UncaughtException => "E002",
        }
    }

    /// Look a code up by its string form.
    pub fn parse(code: &str) -> Option<DiagnosticCode> {
        let code = code.trim().to_ascii_uppercase();
        Self::ALL.iter().copied().find(|c| c.as_str() == code)
    }

    pub fn default_severity(&self) -> Severity {
        match self {
            Self::DuplicateDeclaration => Severity::Warning,
            _ => Severity::Error,
        }
    }
}

impl std::fmt::Display for DiagnosticCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A compiler diagnostic.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub code: DiagnosticCode,
    pub severity: Severity,
    /// Short message (single line)
    pub message: String,
    /// Longer explanation
    pub explanation: Option<String>,
    /// Primary span
    pub span: Span,
    /// Additional labels (related locations)
    pub labels: Vec<Label>,
    /// Free-form notes, printed after the labels
    pub notes: Vec<String>,
}

impl Diagnostic {
    pub fn error(code: DiagnosticCode, message: impl Into<String>) -> DiagnosticBuilder {
        DiagnosticBuilder::new(code, Severity::Error, message)
    }

    pub fn warning(code: DiagnosticCode, message: impl Into<String>) -> DiagnosticBuilder {
        DiagnosticBuilder::new(code, Severity::Warning, message)
    }

    /// Create a diagnostic with the code's default severity.
    pub fn new(code: DiagnosticCode, message: impl Into<String>) -> DiagnosticBuilder {
        DiagnosticBuilder::new(code, code.default_severity(), message)
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }

    pub fn is_warning(&self) -> bool {
        self.severity == Severity::Warning
    }

    pub fn is_hint(&self) -> bool {
        self.severity == Severity::Hint
    }
}

/// Builder for constructing diagnostics fluently.
pub struct DiagnosticBuilder {
    inner: Diagnostic,
}

impl DiagnosticBuilder {
    pub fn new(code: DiagnosticCode, severity: Severity, message: impl Into<String>) -> Self {
        Self {
            inner: Diagnostic {
                code,
                severity,
                message: message.into(),
                explanation: None,
                span: Span::DUMMY,
                labels: Vec::new(),
                notes: Vec::new(),
            },
        }
    }

    pub fn with_span(mut self, span: Span) -> Self {
        self.inner.span = span;
        self
    }

    /// Point at a related location. Dummy spans are dropped.
    pub fn with_label(mut self, span: Span, message: impl Into<String>) -> Self {
        if !span.is_dummy() {
            self.inner.labels.push(Label::new(span, message));
        }
        self
    }

    pub fn with_help(mut self, help: impl Into<String>) -> Self {
        self.inner.explanation = Some(help.into());
        self
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.inner.notes.push(note.into());
        self
    }

    pub fn build(self) -> Diagnostic {
        self.inner
    }
}

/// Collection of diagnostics with summary statistics.
#[derive(Debug, Clone, Default)]
pub struct Diagnostics {
    pub items: Vec<Diagnostic>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self { items: Vec::new() }
    }

    pub fn push(&mut self, diagnostic: Diagnostic) {
        self.items.push(diagnostic);
    }

    pub fn extend(&mut self, diagnostics: impl IntoIterator<Item = Diagnostic>) {
        self.items.extend(diagnostics);
    }

    pub fn has_errors(&self) -> bool {
        self.items.iter().any(|d| d.is_error())
    }

    pub fn error_count(&self) -> usize {
        self.items.iter().filter(|d| d.is_error()).count()
    }

    pub fn warning_count(&self) -> usize {
        self.items.iter().filter(|d| d.is_warning()).count()
    }

    pub fn hint_count(&self) -> usize {
        self.items.iter().filter(|d| d.is_hint()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Diagnostic> {
        self.items.iter()
    }
}

impl IntoIterator for Diagnostics {
    type Item = Diagnostic;
    type IntoIter = std::vec::IntoIter<Diagnostic>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.into_iter()
    }
}

impl<'a> IntoIterator for &'a Diagnostics {
    type Item = &'a Diagnostic;
    type IntoIter = std::slice::Iter<'a, Diagnostic>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_are_unique() {
        let mut seen = std::collections::HashSet::new();
        for code in DiagnosticCode::ALL {
            assert!(seen.insert(code.as_str()), "duplicate code {}", code);
        }
    }

    #[test]
    fn test_parse_code() {
        assert_eq!(DiagnosticCode::parse("c001"), Some(DiagnosticCode::ByRefCapture));
        assert_eq!(DiagnosticCode::parse(" R001 "), Some(DiagnosticCode::UnboundVariable));
        assert_eq!(DiagnosticCode::parse("X999"), None);
    }

    #[test]
    fn test_counts() {
        let mut diags = Diagnostics::new();
        diags.push(Diagnostic::new(DiagnosticCode::UnboundVariable, "unbound").build());
        diags.push(Diagnostic::new(DiagnosticCode::DuplicateDeclaration, "dup").build());
        assert!(diags.has_errors());
        assert_eq!(diags.error_count(), 1);
        assert_eq!(diags.warning_count(), 1);
        assert_eq!(diags.len(), 2);
    }

    #[test]
    fn test_dummy_labels_are_dropped() {
        let diag = Diagnostic::new(DiagnosticCode::ByRefCapture, "capture")
            .with_label(Span::DUMMY, "declared here")
            .build();
        assert!(diag.labels.is_empty());
    }
}
