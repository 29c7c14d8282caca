//! Tokenizer for `.fj` sources.

use logos::Logos;
use std::fmt;

fn unescape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(ch) = chars.next() {
        if ch != '\\' {
            out.push(ch);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some('0') => out.push('\0'),
            Some('"') => out.push('"'),
            Some('\\') => out.push('\\'),
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }
    out
}

#[derive(Logos, Debug, Clone, PartialEq)]
#[logos(skip r"([ \t\r\n]+|;[^\n]*)")]
pub enum Token {
    #[token("(")]
    LParen,
    #[token(")")]
    RParen,

    #[regex(r#""([^"\\]|\\.)*""#, |lex| {
        let slice = lex.slice();
        unescape(&slice[1..slice.len() - 1])
    })]
    Str(String),

    #[regex(r"-?[0-9]+", priority = 3, callback = |lex| lex.slice().parse::<i64>().ok())]
    Int(i64),

    #[regex(r"-?[0-9]+\.[0-9]+", priority = 3, callback = |lex| lex.slice().parse::<f64>().ok())]
    Float(f64),

    #[regex(r#"[^ \t\r\n()";]+"#, priority = 1, callback = |lex| lex.slice().to_owned())]
    Symbol(String),
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Token::LParen => write!(f, "("),
            Token::RParen => write!(f, ")"),
            Token::Str(s) => write!(f, "{:?}", s),
            Token::Int(i) => write!(f, "{}", i),
            Token::Float(x) => write!(f, "{}", x),
            Token::Symbol(s) => write!(f, "{}", s),
        }
    }
}

/// A token together with its byte range in the source.
#[derive(Debug, Clone, PartialEq)]
pub struct Spanned {
    pub token: Token,
    pub start: u32,
    pub end: u32,
}

/// A byte range the tokenizer could not turn into a token.
#[derive(Debug, Clone, PartialEq)]
pub struct BadToken {
    pub text: String,
    pub start: u32,
    pub end: u32,
}

/// Tokenize a whole source. Stops at the first invalid token.
pub fn tokenize(source: &str) -> Result<Vec<Spanned>, BadToken> {
    let mut lexer = Token::lexer(source);
    let mut tokens = Vec::new();

    while let Some(result) = lexer.next() {
        let range = lexer.span();
        match result {
            Ok(token) => tokens.push(Spanned {
                token,
                start: range.start as u32,
                end: range.end as u32,
            }),
            Err(()) => {
                return Err(BadToken {
                    text: lexer.slice().to_string(),
                    start: range.start as u32,
                    end: range.end as u32,
                })
            }
        }
    }

    Ok(tokens)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<Token> {
        tokenize(source)
            .unwrap()
            .into_iter()
            .map(|t| t.token)
            .collect()
    }

    #[test]
    fn test_numbers_and_symbols() {
        assert_eq!(
            kinds("(+ -3 4.5 x-1 -)"),
            vec![
                Token::LParen,
                Token::Symbol("+".into()),
                Token::Int(-3),
                Token::Float(4.5),
                Token::Symbol("x-1".into()),
                Token::Symbol("-".into()),
                Token::RParen,
            ]
        );
    }

    #[test]
    fn test_comments_are_skipped() {
        assert_eq!(
            kinds("; leading\n(unit) ; trailing"),
            vec![Token::LParen, Token::Symbol("unit".into()), Token::RParen]
        );
    }

    #[test]
    fn test_string_escapes() {
        assert_eq!(kinds(r#""a\n\"b\"""#), vec![Token::Str("a\n\"b\"".into())]);
    }

    #[test]
    fn test_spans() {
        let tokens = tokenize("  (set! x 1)").unwrap();
        assert_eq!((tokens[0].start, tokens[0].end), (2, 3));
        assert_eq!((tokens[1].start, tokens[1].end), (3, 7));
    }

    #[test]
    fn test_unterminated_string() {
        let err = tokenize("(print \"oops").unwrap_err();
        assert!(err.text.starts_with('"'));
        assert_eq!(err.start, 7);
    }
}
