//! Source file to converted tree, shared by the commands

use std::fs;
use std::io;
use std::path::Path;

use anyhow::{anyhow, Result};
use framejit_diagnostics::{DiagnosticEmitter, Diagnostics, JsonEmitter, SourceCache, TerminalEmitter};
use framejit_ir::{lower_with_limit, reduce, SpanTable};
use framejit_transform::{
    analyze_with, check_depth, factory_for, outer_variable, prepare, CompileOptions, Prepared, ScopeMap,
};

use crate::OutputFormat;

pub struct Compiled {
    pub spans: SpanTable,
    pub scopes: ScopeMap,
    pub prepared: Prepared,
    /// Non-fatal findings of reading and lowering
    pub diagnostics: Diagnostics,
}

pub fn read_source(path: &Path) -> Result<String> {
    fs::read_to_string(path).map_err(|e| anyhow!("Failed to read {}: {}", path.display(), e))
}

/// Read, lower, normalize, analyze and rewrite one source. On failure the
/// diagnostics gathered so far are returned, the fatal one last.
pub fn compile_source(
    source: &str,
    filename: &str,
    cache: &mut SourceCache,
    options: &CompileOptions,
) -> std::result::Result<Compiled, Diagnostics> {
    let mut diagnostics = Diagnostics::new();
    let parsed = match framejit_parser::parse_with_cache(source, filename, cache, options.max_depth) {
        Ok(parsed) => parsed,
        Err(e) => {
            diagnostics.push(e.to_diagnostic());
            return Err(diagnostics);
        }
    };
    diagnostics.extend(parsed.diagnostics);

    let lowered = match lower_with_limit(&parsed.form, options.max_depth) {
        Ok(lowered) => lowered,
        Err(e) => {
            diagnostics.push(e.to_diagnostic());
            return Err(diagnostics);
        }
    };
    diagnostics.extend(lowered.diagnostics);
    let spans = lowered.spans;
    if let Err(e) = check_depth(&lowered.root, options) {
        diagnostics.push(e.to_diagnostic(&spans));
        return Err(diagnostics);
    }
    let root = reduce(&lowered.root);

    let outer = outer_variable();
    let scopes = match analyze_with(&root, Some(&outer), options) {
        Ok(scopes) => scopes,
        Err(e) => {
            diagnostics.push(e.to_diagnostic(&spans));
            return Err(diagnostics);
        }
    };
    let factory = factory_for(options.thunks);
    let prepared = match prepare(&outer, &scopes, &root, factory.as_ref(), options) {
        Ok(prepared) => prepared,
        Err(e) => {
            diagnostics.push(e.to_diagnostic(&spans));
            return Err(diagnostics);
        }
    };

    Ok(Compiled {
        spans,
        scopes,
        prepared,
        diagnostics,
    })
}

/// Text goes to stderr with a summary line, JSON lines to stdout
pub fn emit(diagnostics: &Diagnostics, cache: &SourceCache, format: OutputFormat, use_color: bool) -> io::Result<()> {
    if diagnostics.is_empty() {
        return Ok(());
    }
    match format {
        OutputFormat::Text => {
            let stderr = io::stderr();
            let mut emitter = TerminalEmitter::new(stderr.lock(), use_color);
            emitter.emit_all(diagnostics, cache)?;
            emitter.emit_summary(diagnostics)
        }
        OutputFormat::Json => {
            let mut emitter = JsonEmitter::new(io::stdout().lock());
            emitter.emit_all(diagnostics, cache)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use framejit_diagnostics::DiagnosticCode;

    fn failure(source: &str) -> Diagnostics {
        let mut cache = SourceCache::new();
        match compile_source(source, "test.fj", &mut cache, &CompileOptions::default()) {
            Ok(_) => panic!("expected a failure"),
            Err(diagnostics) => diagnostics,
        }
    }

    #[test]
    fn test_compiles_a_closure() {
        let mut cache = SourceCache::new();
        let compiled = compile_source(
            "(lambda ((a int)) (lambda () a))",
            "test.fj",
            &mut cache,
            &CompileOptions::default(),
        )
        .unwrap();
        assert_eq!(compiled.prepared.method_table.len(), 1);
        assert_eq!(compiled.scopes.len(), 3);
    }

    #[test]
    fn test_each_stage_reports_its_code() {
        let codes = |source| failure(source).iter().map(|d| d.code).collect::<Vec<_>>();
        assert_eq!(codes("(lambda ("), vec![DiagnosticCode::ParseError]);
        assert_eq!(codes("(throw)"), vec![DiagnosticCode::MalformedForm]);
        assert_eq!(codes("(lambda () y)"), vec![DiagnosticCode::UnboundVariable]);
        assert_eq!(
            codes("(lambda ((r int ref)) (lambda () r))"),
            vec![DiagnosticCode::ByRefCapture]
        );
    }

    #[test]
    fn test_deep_sources_hit_the_depth_limit() {
        let levels = 20_000;
        let source = format!("(lambda () {}1{})", "(neg ".repeat(levels), ")".repeat(levels));
        let codes = failure(&source).iter().map(|d| d.code).collect::<Vec<_>>();
        assert_eq!(codes, vec![DiagnosticCode::DepthLimitExceeded]);

        let mut cache = SourceCache::new();
        let options = CompileOptions::default().with_max_depth(4);
        let result = compile_source("(lambda () (neg (neg (neg 1))))", "test.fj", &mut cache, &options);
        let diagnostics = match result {
            Ok(_) => panic!("expected the depth limit"),
            Err(diagnostics) => diagnostics,
        };
        assert_eq!(diagnostics.iter().last().map(|d| d.code), Some(DiagnosticCode::DepthLimitExceeded));
    }

    #[test]
    fn test_unbound_variables_point_at_their_use() {
        let diagnostics = failure("(lambda () (+ 1 missing))");
        let diagnostic = diagnostics.iter().last().unwrap();
        assert_eq!((diagnostic.span.start, diagnostic.span.end), (16, 23));
    }
}
