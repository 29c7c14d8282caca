//! Diagnostic infrastructure for framejit.
//!
//! Every failure of the pipeline (reading `.fj` sources, lowering, scope
//! analysis, closure conversion, execution) is reported as a [`Diagnostic`]
//! with a stable [`DiagnosticCode`]. Diagnostics optionally point at a
//! [`Span`] in a file registered with the [`SourceCache`] and can be rendered
//! by any [`DiagnosticEmitter`].
//!
//! # Example
//!
//! ```
//! use framejit_diagnostics::{
//!     Diagnostic, DiagnosticCode, DiagnosticEmitter, SourceCache, Span, SimpleEmitter,
//! };
//!
//! let mut cache = SourceCache::new();
//! let file_id = cache.add_file("main.fj", "(lambda () y)".to_string());
//!
//! let diag = Diagnostic::new(DiagnosticCode::UnboundVariable, "unbound variable 'y'")
//!     .with_span(Span::new(file_id, 11, 12))
//!     .build();
//!
//! let mut out = Vec::new();
//! SimpleEmitter::new(&mut out).emit(&diag, &cache).unwrap();
//! assert!(String::from_utf8(out).unwrap().contains("[R001]"));
//! ```

pub mod diagnostic;
pub mod emitter;
pub mod source_cache;
pub mod span;

pub use diagnostic::{Diagnostic, DiagnosticBuilder, DiagnosticCode, Diagnostics, Severity};
pub use emitter::{DiagnosticEmitter, JsonEmitter, SimpleEmitter, TerminalEmitter};
pub use source_cache::{SourceCache, SourceFile};
pub use span::{FileId, Label, Location, Span};
