//! Explain command - explain error codes

use anyhow::{anyhow, Result};
use clap::Args;
use console::Style;
use framejit_diagnostics::DiagnosticCode;

use crate::OutputFormat;

#[derive(Args, Debug)]
pub struct ExplainArgs {
    /// Error code to explain (e.g., R001, C001)
    pub code: String,
}

struct ErrorExplanation {
    code: &'static str,
    title: &'static str,
    description: &'static str,
    example: Option<&'static str>,
    suggestion: Option<&'static str>,
    related: &'static [&'static str],
}

const ERROR_EXPLANATIONS: &[ErrorExplanation] = &[
    // Reader and lowering
    ErrorExplanation {
        code: "P001",
        title: "Parse Error",
        description: "The reader could not turn the source into a single s-expression.",
        example: Some("(lambda ((x int)) (+ x 1)"),
        suggestion: Some("Check for unbalanced parentheses, unterminated strings or stray tokens."),
        related: &["P002"],
    },
    ErrorExplanation {
        code: "P002",
        title: "Malformed Form",
        description: "A special form does not have the shape it requires.",
        example: Some("(throw)  ; throw needs a value"),
        suggestion: Some("Compare the form with the syntax listed in the help text of the form."),
        related: &["P001", "P003"],
    },
    ErrorExplanation {
        code: "P003",
        title: "Unknown Type",
        description: "A declaration names a type that does not exist.",
        example: Some("(block ((x integer)) x)"),
        suggestion: Some("Use one of int, float, bool, string, unit, any or (fn (T...) T)."),
        related: &["P002"],
    },
    ErrorExplanation {
        code: "P004",
        title: "Duplicate Declaration",
        description: "A name is declared twice in the same block, parameter list or handler. The later declaration shadows the earlier one.",
        example: Some("(block ((x int) (x int)) x)"),
        suggestion: Some("Rename one of the declarations."),
        related: &[],
    },
    // Resolution
    ErrorExplanation {
        code: "R001",
        title: "Unbound Variable",
        description: "A variable is referenced but no enclosing block, lambda or catch declares it.",
        example: Some("(lambda () (+ y 1))"),
        suggestion: Some("Declare the variable in an enclosing scope, or check for typos."),
        related: &[],
    },
    // Capture
    ErrorExplanation {
        code: "C001",
        title: "By-Reference Capture",
        description: r#"A by-reference parameter is used from a nested function, a quote or a
runtime-variables access. Such uses need the variable to live in a frame,
but a by-reference parameter is an alias of the caller's storage and must
stay a plain local."#,
        example: Some("(lambda ((r int ref)) (lambda () r))"),
        suggestion: Some(r#"Copy the parameter into a local first:

(lambda ((r int ref))
  (block ((copy int))
    (set! copy r)
    (lambda () copy)))"#),
        related: &["R001"],
    },
    // Structure
    ErrorExplanation {
        code: "S001",
        title: "Unexpected Node",
        description: "A node kind reached a pass that does not accept it: a reducible shape (set!op, ??, and/or) that was not normalized, an already converted node, or a handler outside a try.",
        example: None,
        suggestion: Some("Run the normalizer before closure conversion and convert each tree once."),
        related: &["I004"],
    },
    // Limits
    ErrorExplanation {
        code: "L001",
        title: "Depth Limit Exceeded",
        description: "The tree nests deeper than the configured limit.",
        example: None,
        suggestion: Some("Raise max_depth in the [compile] table of framejit.toml, or pass --max-depth."),
        related: &[],
    },
    // Internal
    ErrorExplanation {
        code: "I001",
        title: "Scope Registered Twice",
        description: "Scope analysis tried to register the same node twice. This is a compiler bug.",
        example: None,
        suggestion: None,
        related: &["I002", "I003", "I004"],
    },
    ErrorExplanation {
        code: "I002",
        title: "Variable Not In Frame",
        description: "The rewriter looked up a variable in a frame that does not hold it. This is a compiler bug.",
        example: None,
        suggestion: None,
        related: &["I001", "I003", "I004"],
    },
    ErrorExplanation {
        code: "I003",
        title: "Missing Scope",
        description: "The rewriter met a scope-introducing node that scope analysis never saw, usually because the analyzed tree and the rewritten tree differ.",
        example: None,
        suggestion: Some("Analyze and rewrite the same normalized tree with the same outer variable."),
        related: &["I001", "I002", "I004"],
    },
    ErrorExplanation {
        code: "I004",
        title: "Internal Error",
        description: "An internal invariant of the compiler does not hold. This is a compiler bug.",
        example: None,
        suggestion: None,
        related: &["I001", "I002", "I003"],
    },
    // Execution
    ErrorExplanation {
        code: "E001",
        title: "Runtime Error",
        description: "The reference executor failed while running converted code: a type mismatch, a wrong argument count, division by zero, or runaway recursion. Runtime errors cannot be caught by try.",
        example: Some("(lambda () (/ 1 0))"),
        suggestion: None,
        related: &["E002"],
    },
    ErrorExplanation {
        code: "E002",
        title: "Uncaught Exception",
        description: "A value raised with throw was not caught by any handler.",
        example: Some("(lambda () (throw 1 int))"),
        suggestion: Some("Wrap the code in (try ... (catch (e any) ...))."),
        related: &["E001"],
    },
];

/// Text rendering of one explanation. Styling is forced on or off so the
/// output does not depend on the terminal it is printed to.
fn render_text(explanation: &ErrorExplanation, use_color: bool) -> String {
    let paint = |style: Style, text: &str| style.force_styling(use_color).apply_to(text).to_string();
    let mut out = format!(
        "\n{}: {}\n{}\n\n{}\n\n",
        paint(Style::new().bold().cyan(), explanation.code),
        paint(Style::new().bold(), explanation.title),
        "=".repeat(explanation.code.len() + explanation.title.len() + 2),
        explanation.description
    );

    if let Some(example) = explanation.example {
        out.push_str(&format!("{}:\n", paint(Style::new().bold(), "Example")));
        for line in example.lines() {
            out.push_str(&format!("  {}\n", line));
        }
        out.push('\n');
    }

    if let Some(suggestion) = explanation.suggestion {
        out.push_str(&format!("{}:\n", paint(Style::new().bold().green(), "Suggestion")));
        for line in suggestion.lines() {
            out.push_str(&format!("  {}\n", line));
        }
        out.push('\n');
    }

    if !explanation.related.is_empty() {
        out.push_str(&format!(
            "{}: {}\n",
            paint(Style::new().dim(), "Related"),
            explanation.related.join(", ")
        ));
    }
    out
}

pub fn run(args: ExplainArgs, format: OutputFormat, use_color: bool) -> Result<()> {
    let code = args.code.trim().to_uppercase();

    let explanation = ERROR_EXPLANATIONS
        .iter()
        .find(|e| e.code == code)
        .ok_or_else(|| anyhow!("Unknown error code: {}", code))?;
    let severity = DiagnosticCode::parse(&code).map(|c| c.default_severity().as_str());

    match format {
        OutputFormat::Text => print!("{}", render_text(explanation, use_color)),
        OutputFormat::Json => {
            let output = serde_json::json!({
                "code": explanation.code,
                "title": explanation.title,
                "severity": severity,
                "description": explanation.description,
                "example": explanation.example,
                "suggestion": explanation.suggestion,
                "related": explanation.related,
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_code_is_explained() {
        for code in DiagnosticCode::ALL {
            assert!(
                ERROR_EXPLANATIONS.iter().any(|e| e.code == code.as_str()),
                "{} has no explanation",
                code.as_str()
            );
        }
        assert_eq!(ERROR_EXPLANATIONS.len(), DiagnosticCode::ALL.len());
    }

    fn explanation(code: &str) -> &'static ErrorExplanation {
        ERROR_EXPLANATIONS.iter().find(|e| e.code == code).unwrap()
    }

    #[test]
    fn test_plain_text_has_no_styling() {
        let text = render_text(explanation("E002"), false);
        assert!(!text.contains('\x1b'));
        assert!(text.contains("E002: Uncaught Exception\n========================\n"));
        assert!(text.contains("Example:\n  (lambda () (throw 1 int))\n"));
        assert!(text.contains("Suggestion:\n"));
        assert!(text.ends_with("Related: E001\n"));
    }

    #[test]
    fn test_colored_text_styles_headings() {
        let text = render_text(explanation("E002"), true);
        assert!(text.contains(&Style::new().bold().green().force_styling(true).apply_to("Suggestion").to_string()));
        assert!(text.contains("\x1b["));
    }

    #[test]
    fn test_related_codes_exist() {
        for explanation in ERROR_EXPLANATIONS {
            for related in explanation.related {
                assert!(DiagnosticCode::parse(related).is_some(), "{} -> {}", explanation.code, related);
            }
        }
    }
}
