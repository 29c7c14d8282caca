//! S-expression reader for framejit sources.
//!
//! A `.fj` file holds exactly one top-level form. The reader produces a
//! [`Sexp`] tree in which every form carries its [`Span`] in the
//! [`SourceCache`], so later stages can point diagnostics at the source.

pub mod lexer;
pub mod sexp;

use framejit_diagnostics::{Diagnostic, DiagnosticCode, Diagnostics, FileId, SourceCache, Span};
use lexer::{Spanned, Token};
use thiserror::Error;

pub use sexp::{Sexp, SexpKind};

/// Result of reading a source file.
#[derive(Debug)]
pub struct ParseResult {
    /// The single top-level form
    pub form: Sexp,
    /// The file ID in the source cache
    pub file_id: FileId,
    /// Non-fatal findings
    pub diagnostics: Diagnostics,
}

#[derive(Debug, Clone, Error)]
pub enum ParseError {
    #[error("invalid token '{text}'")]
    InvalidToken { text: String, span: Span },

    #[error("unterminated string literal")]
    UnterminatedString { span: Span },

    #[error("unexpected '{found}'")]
    UnexpectedToken { found: String, span: Span },

    #[error("unclosed '('")]
    UnclosedList { span: Span },

    #[error("expected a form, found end of input")]
    Empty { span: Span },

    #[error("expected end of input after the top-level form, found '{found}'")]
    TrailingInput { found: String, span: Span },

    #[error("lists nest deeper than the limit of {limit}")]
    NestingTooDeep { limit: usize, span: Span },
}

impl ParseError {
    pub fn span(&self) -> Span {
        match self {
            ParseError::InvalidToken { span, .. }
            | ParseError::UnterminatedString { span }
            | ParseError::UnexpectedToken { span, .. }
            | ParseError::UnclosedList { span }
            | ParseError::Empty { span }
            | ParseError::TrailingInput { span, .. }
            | ParseError::NestingTooDeep { span, .. } => *span,
        }
    }

    pub fn code(&self) -> DiagnosticCode {
        match self {
            ParseError::NestingTooDeep { .. } => DiagnosticCode::DepthLimitExceeded,
            _ => DiagnosticCode::ParseError,
        }
    }

    pub fn to_diagnostic(&self) -> Diagnostic {
        let builder = Diagnostic::error(self.code(), self.to_string()).with_span(self.span());
        match self {
            ParseError::NestingTooDeep { .. } => builder
                .with_help("raise compile.max_depth in framejit.toml")
                .build(),
            ParseError::TrailingInput { .. } => builder
                .with_help("a source file holds one top-level form; wrap several in (block () ...)")
                .build(),
            ParseError::UnclosedList { .. } => builder.with_help("add the missing ')'").build(),
            _ => builder.build(),
        }
    }
}

struct Reader<'a> {
    tokens: &'a [Spanned],
    position: usize,
    file_id: FileId,
    source_len: u32,
    /// Lists currently open
    depth: usize,
    max_depth: usize,
}

impl<'a> Reader<'a> {
    fn span(&self, start: u32, end: u32) -> Span {
        Span::new(self.file_id, start, end)
    }

    fn eof_span(&self) -> Span {
        Span::point(self.file_id, self.source_len)
    }

    fn peek(&self) -> Option<&'a Spanned> {
        self.tokens.get(self.position)
    }

    fn next(&mut self) -> Option<&'a Spanned> {
        let token = self.tokens.get(self.position)?;
        self.position += 1;
        Some(token)
    }

    fn read_form(&mut self) -> Result<Sexp, ParseError> {
        let spanned = self.next().ok_or(ParseError::Empty {
            span: self.eof_span(),
        })?;
        let span = self.span(spanned.start, spanned.end);

        let kind = match &spanned.token {
            Token::LParen => return self.read_list(spanned.start),
            Token::RParen => {
                return Err(ParseError::UnexpectedToken {
                    found: ")".to_string(),
                    span,
                })
            }
            Token::Int(i) => SexpKind::Int(*i),
            Token::Float(x) => SexpKind::Float(*x),
            Token::Str(s) => SexpKind::Str(s.clone()),
            Token::Symbol(s) => SexpKind::Symbol(s.clone()),
        };
        Ok(Sexp::new(kind, span))
    }

    fn read_list(&mut self, open: u32) -> Result<Sexp, ParseError> {
        if self.depth == self.max_depth {
            return Err(ParseError::NestingTooDeep {
                limit: self.max_depth,
                span: self.span(open, open + 1),
            });
        }
        self.depth += 1;
        let list = self.read_items(open);
        self.depth -= 1;
        list
    }

    fn read_items(&mut self, open: u32) -> Result<Sexp, ParseError> {
        let mut items = Vec::new();
        loop {
            match self.peek() {
                None => {
                    return Err(ParseError::UnclosedList {
                        span: self.span(open, open + 1),
                    })
                }
                Some(Spanned {
                    token: Token::RParen,
                    start,
                    end,
                }) => {
                    self.position += 1;
                    let span = self.span(open, open + 1).merge(self.span(*start, *end));
                    return Ok(Sexp::new(SexpKind::List(items), span));
                }
                Some(_) => items.push(self.read_form()?),
            }
        }
    }
}

/// Default bound on list nesting
pub const DEFAULT_MAX_NESTING: usize = 512;

/// Read `source` into one form, registering it in `cache` under `filename`.
/// Lists nested more than `max_depth` deep are rejected.
pub fn parse_with_cache(
    source: &str,
    filename: &str,
    cache: &mut SourceCache,
    max_depth: usize,
) -> Result<ParseResult, ParseError> {
    let file_id = cache.add_file(filename, source.to_string());
    let form = read(source, file_id, max_depth)?;
    log::trace!("read {} from {}", form.head().unwrap_or("atom"), filename);

    Ok(ParseResult {
        form,
        file_id,
        diagnostics: Diagnostics::new(),
    })
}

/// Read `source` into one form without a source cache.
pub fn parse(source: &str) -> Result<Sexp, ParseError> {
    read(source, FileId::DUMMY, DEFAULT_MAX_NESTING)
}

fn read(source: &str, file_id: FileId, max_depth: usize) -> Result<Sexp, ParseError> {
    let tokens = lexer::tokenize(source).map_err(|bad| {
        let span = Span::new(file_id, bad.start, bad.end);
        if bad.text.starts_with('"') {
            ParseError::UnterminatedString { span }
        } else {
            ParseError::InvalidToken {
                text: bad.text,
                span,
            }
        }
    })?;

    let mut reader = Reader {
        tokens: &tokens,
        position: 0,
        file_id,
        source_len: source.len() as u32,
        depth: 0,
        max_depth,
    };
    let form = reader.read_form()?;

    if let Some(extra) = reader.peek() {
        return Err(ParseError::TrailingInput {
            found: extra.token.to_string(),
            span: Span::new(file_id, extra.start, extra.end),
        });
    }
    Ok(form)
}
