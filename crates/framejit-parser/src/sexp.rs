//! S-expression values produced by the reader.

use framejit_diagnostics::Span;
use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub enum SexpKind {
    Int(i64),
    Float(f64),
    Str(String),
    Symbol(String),
    List(Vec<Sexp>),
}

/// One form together with the source span it was read from.
#[derive(Debug, Clone, PartialEq)]
pub struct Sexp {
    pub kind: SexpKind,
    pub span: Span,
}

impl Sexp {
    pub fn new(kind: SexpKind, span: Span) -> Self {
        Self { kind, span }
    }

    pub fn symbol(name: impl Into<String>) -> Self {
        Self::new(SexpKind::Symbol(name.into()), Span::DUMMY)
    }

    pub fn list(items: Vec<Sexp>) -> Self {
        Self::new(SexpKind::List(items), Span::DUMMY)
    }

    pub fn as_symbol(&self) -> Option<&str> {
        match &self.kind {
            SexpKind::Symbol(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Sexp]> {
        match &self.kind {
            SexpKind::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn is_symbol(&self, name: &str) -> bool {
        self.as_symbol() == Some(name)
    }

    /// Head symbol of a non-empty list, e.g. `lambda` for `(lambda ...)`.
    pub fn head(&self) -> Option<&str> {
        self.as_list()?.first()?.as_symbol()
    }

    /// First list nested more than `limit` lists deep, counting this form
    /// as level 1. Atoms do not add a level.
    pub fn deeper_than(&self, limit: usize) -> Option<&Sexp> {
        let mut stack = vec![(self, 1usize)];
        while let Some((form, level)) = stack.pop() {
            if let SexpKind::List(items) = &form.kind {
                if level > limit {
                    return Some(form);
                }
                stack.extend(items.iter().map(|item| (item, level + 1)));
            }
        }
        None
    }
}

impl fmt::Display for Sexp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            SexpKind::Int(i) => write!(f, "{}", i),
            SexpKind::Float(x) => write!(f, "{:?}", x),
            SexpKind::Str(s) => write!(f, "{:?}", s),
            SexpKind::Symbol(s) => write!(f, "{}", s),
            SexpKind::List(items) => {
                write!(f, "(")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, " ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, ")")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn nested(levels: usize) -> Sexp {
        let mut form = Sexp::symbol("x");
        for _ in 0..levels {
            form = Sexp::list(vec![Sexp::symbol("neg"), form]);
        }
        form
    }

    #[test]
    fn test_deeper_than_counts_lists_only() {
        let form = nested(3);
        assert!(form.deeper_than(3).is_none());
        let deepest = form.deeper_than(2).unwrap();
        assert_eq!(deepest.to_string(), "(neg x)");
        assert!(Sexp::symbol("x").deeper_than(0).is_none());
    }
}
