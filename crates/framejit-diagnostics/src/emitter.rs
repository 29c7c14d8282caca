//! Diagnostic emitters for different output formats.

use crate::diagnostic::{Diagnostic, Diagnostics, Severity};
use crate::source_cache::SourceCache;
use std::io::Write;

/// Trait for emitting diagnostics in various formats.
pub trait DiagnosticEmitter {
    fn emit(&mut self, diagnostic: &Diagnostic, cache: &SourceCache) -> std::io::Result<()>;

    fn emit_all(&mut self, diagnostics: &Diagnostics, cache: &SourceCache) -> std::io::Result<()> {
        for diag in diagnostics.iter() {
            self.emit(diag, cache)?;
        }
        Ok(())
    }

    fn emit_summary(&mut self, diagnostics: &Diagnostics) -> std::io::Result<()>;
}

/// Terminal output with colors and a source excerpt.
pub struct TerminalEmitter<W: Write> {
    writer: W,
    colored: bool,
}

impl<W: Write> TerminalEmitter<W> {
    pub fn new(writer: W, colored: bool) -> Self {
        Self { writer, colored }
    }

    fn paint(&self, code: &'static str) -> &'static str {
        if self.colored {
            code
        } else {
            ""
        }
    }

    fn severity_color(&self, severity: Severity) -> &'static str {
        self.paint(match severity {
            Severity::Error => "\x1b[31m",
            Severity::Warning => "\x1b[33m",
            Severity::Hint => "\x1b[34m",
        })
    }
}

impl<W: Write> DiagnosticEmitter for TerminalEmitter<W> {
    fn emit(&mut self, diagnostic: &Diagnostic, cache: &SourceCache) -> std::io::Result<()> {
        let color = self.severity_color(diagnostic.severity);
        let reset = self.paint("\x1b[0m");
        let bold = self.paint("\x1b[1m");
        let cyan = self.paint("\x1b[36m");

        // error[R001]: message
        writeln!(
            self.writer,
            "{}{}{}[{}]{}: {}",
            bold,
            color,
            diagnostic.severity.as_str(),
            diagnostic.code.as_str(),
            reset,
            diagnostic.message
        )?;

        if let Some(loc) = cache.location(diagnostic.span) {
            writeln!(self.writer, "  {}-->{} {}", cyan, reset, loc)?;

            let excerpt = cache
                .get_file(diagnostic.span.file_id)
                .and_then(|file| file.line_text(loc.line));
            if let Some(line_text) = excerpt {
                let gutter = loc.line.to_string();
                let padding = " ".repeat(gutter.len());
                let indent = " ".repeat((loc.column - 1) as usize);
                let room = line_text.len().saturating_sub((loc.column - 1) as usize);
                let carets = "^".repeat((diagnostic.span.width() as usize).min(room).max(1));

                writeln!(self.writer, "{} {}|{}", padding, cyan, reset)?;
                writeln!(self.writer, "{}{} |{} {}", cyan, gutter, reset, line_text)?;
                writeln!(
                    self.writer,
                    "{} {}|{} {}{}{}{}",
                    padding, cyan, reset, indent, color, carets, reset
                )?;
            }
        }

        for label in &diagnostic.labels {
            if let Some(loc) = cache.location(label.span) {
                writeln!(
                    self.writer,
                    "  {}note{}: {} ({})",
                    cyan, reset, label.message, loc
                )?;
            }
        }

        for note in &diagnostic.notes {
            writeln!(self.writer, "  {}= note:{} {}", cyan, reset, note)?;
        }

        if let Some(ref explanation) = diagnostic.explanation {
            writeln!(self.writer, "  {}= help:{} {}", cyan, reset, explanation)?;
        }

        writeln!(self.writer)?;
        Ok(())
    }

    fn emit_summary(&mut self, diagnostics: &Diagnostics) -> std::io::Result<()> {
        let errors = diagnostics.error_count();
        let warnings = diagnostics.warning_count();
        if errors == 0 && warnings == 0 {
            return Ok(());
        }

        let color = if errors > 0 {
            self.severity_color(Severity::Error)
        } else {
            self.severity_color(Severity::Warning)
        };
        let reset = self.paint("\x1b[0m");

        let mut parts = Vec::new();
        if errors > 0 {
            parts.push(format!("{} error{}", errors, if errors == 1 { "" } else { "s" }));
        }
        if warnings > 0 {
            parts.push(format!(
                "{} warning{}",
                warnings,
                if warnings == 1 { "" } else { "s" }
            ));
        }
        writeln!(self.writer, "{}{} emitted{}", color, parts.join(" and "), reset)
    }
}

/// JSON lines output for tooling integration.
pub struct JsonEmitter<W: Write> {
    writer: W,
}

impl<W: Write> JsonEmitter<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }
}

impl<W: Write> DiagnosticEmitter for JsonEmitter<W> {
    fn emit(&mut self, diagnostic: &Diagnostic, cache: &SourceCache) -> std::io::Result<()> {
        let loc = cache.location(diagnostic.span);

        let json = serde_json::json!({
            "code": diagnostic.code.as_str(),
            "severity": diagnostic.severity.as_str(),
            "message": diagnostic.message,
            "location": loc.map(|l| serde_json::json!({
                "file": l.file,
                "line": l.line,
                "column": l.column,
            })),
            "span": if diagnostic.span.is_dummy() {
                serde_json::Value::Null
            } else {
                serde_json::json!({
                    "start": diagnostic.span.start,
                    "end": diagnostic.span.end,
                })
            },
            "help": diagnostic.explanation,
            "notes": diagnostic.notes,
        });

        serde_json::to_writer(&mut self.writer, &json)?;
        writeln!(self.writer)?;
        Ok(())
    }

    fn emit_summary(&mut self, diagnostics: &Diagnostics) -> std::io::Result<()> {
        let summary = serde_json::json!({
            "type": "summary",
            "errors": diagnostics.error_count(),
            "warnings": diagnostics.warning_count(),
            "hints": diagnostics.hint_count(),
            "total": diagnostics.len(),
        });
        serde_json::to_writer(&mut self.writer, &summary)?;
        writeln!(self.writer)?;
        Ok(())
    }
}

/// Plain one-line-per-diagnostic output.
pub struct SimpleEmitter<W: Write> {
    writer: W,
}

impl<W: Write> SimpleEmitter<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }
}

impl<W: Write> DiagnosticEmitter for SimpleEmitter<W> {
    fn emit(&mut self, diagnostic: &Diagnostic, cache: &SourceCache) -> std::io::Result<()> {
        match cache.location(diagnostic.span) {
            Some(loc) => writeln!(
                self.writer,
                "{}: {}: {} [{}]",
                loc,
                diagnostic.severity.as_str(),
                diagnostic.message,
                diagnostic.code.as_str()
            ),
            None => writeln!(
                self.writer,
                "{}: {} [{}]",
                diagnostic.severity.as_str(),
                diagnostic.message,
                diagnostic.code.as_str()
            ),
        }
    }

    fn emit_summary(&mut self, diagnostics: &Diagnostics) -> std::io::Result<()> {
        writeln!(
            self.writer,
            "{} error(s), {} warning(s)",
            diagnostics.error_count(),
            diagnostics.warning_count()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostic::DiagnosticCode;
    use crate::span::Span;

    fn sample() -> (SourceCache, Diagnostic) {
        let mut cache = SourceCache::new();
        let id = cache.add_file("main.fj", "(lambda ((r int ref))\n  (lambda () r))".to_string());
        let diag = Diagnostic::new(DiagnosticCode::ByRefCapture, "cannot capture 'r'")
            .with_span(Span::new(id, 35, 36))
            .with_label(Span::new(id, 10, 11), "declared by reference here")
            .build();
        (cache, diag)
    }

    #[test]
    fn test_terminal_excerpt() {
        let (cache, diag) = sample();
        let mut out = Vec::new();
        TerminalEmitter::new(&mut out, false).emit(&diag, &cache).unwrap();
        let text = String::from_utf8(out).unwrap();

        assert!(text.starts_with("error[C001]: cannot capture 'r'"));
        assert!(text.contains("--> main.fj:2:14"));
        assert!(text.contains("2 |   (lambda () r))"));
        assert!(text.contains("note: declared by reference here (main.fj:1:11)"));
    }

    #[test]
    fn test_json_line() {
        let (cache, diag) = sample();
        let mut out = Vec::new();
        JsonEmitter::new(&mut out).emit(&diag, &cache).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&out).unwrap();

        assert_eq!(value["code"], "C001");
        assert_eq!(value["location"]["line"], 2);
    }

    #[test]
    fn test_simple_summary() {
        let (_, diag) = sample();
        let mut diags = Diagnostics::new();
        diags.push(diag);
        let mut out = Vec::new();
        SimpleEmitter::new(&mut out).emit_summary(&diags).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "1 error(s), 0 warning(s)\n");
    }
}
