//! S-expression to IR lowering
//!
//! Resolves names lexically to fresh [`Variable`]s and records where every
//! node and variable came from. Names with no declaration in scope become
//! undeclared variables; reporting them is the scope analyzer's job.

use std::collections::HashMap;

use framejit_diagnostics::{Diagnostic, DiagnosticCode, Diagnostics, Span};
use framejit_parser::{Sexp, SexpKind};
use framejit_types::{NodeId, Type, VarId};
use thiserror::Error;

use crate::ir::{BinaryOp, Literal, LogicalOp, Node, UnaryOp, Variable};

/// Source locations of lowered nodes and variables
#[derive(Debug, Default, Clone)]
pub struct SpanTable {
    nodes: HashMap<NodeId, Span>,
    variables: HashMap<VarId, Span>,
}

impl SpanTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_node(&mut self, node: &Node, span: Span) {
        self.nodes.entry(node.id()).or_insert(span);
    }

    pub fn record_variable(&mut self, variable: &Variable, span: Span) {
        self.variables.entry(variable.id()).or_insert(span);
    }

    pub fn node(&self, id: NodeId) -> Span {
        self.nodes.get(&id).copied().unwrap_or(Span::DUMMY)
    }

    pub fn variable(&self, id: VarId) -> Span {
        self.variables.get(&id).copied().unwrap_or(Span::DUMMY)
    }
}

#[derive(Debug, Clone, Error)]
pub enum LowerError {
    #[error("malformed {form}: {message}")]
    MalformedForm {
        form: String,
        message: String,
        span: Span,
    },

    #[error("unknown type '{name}'")]
    UnknownType { name: String, span: Span },

    #[error("unknown shared node '{name}'")]
    UnknownShared { name: String, span: Span },

    #[error("forms nest deeper than the limit of {limit}")]
    NestingTooDeep { limit: usize, span: Span },
}

impl LowerError {
    pub fn span(&self) -> Span {
        match self {
            LowerError::MalformedForm { span, .. }
            | LowerError::UnknownType { span, .. }
            | LowerError::UnknownShared { span, .. }
            | LowerError::NestingTooDeep { span, .. } => *span,
        }
    }

    pub fn code(&self) -> DiagnosticCode {
        match self {
            LowerError::UnknownType { .. } => DiagnosticCode::UnknownType,
            LowerError::NestingTooDeep { .. } => DiagnosticCode::DepthLimitExceeded,
            _ => DiagnosticCode::MalformedForm,
        }
    }

    pub fn to_diagnostic(&self) -> Diagnostic {
        let builder = Diagnostic::error(self.code(), self.to_string()).with_span(self.span());
        match self {
            LowerError::UnknownType { .. } => builder
                .with_help("types are int, float, bool, string, unit, any or (fn (T...) T)")
                .build(),
            LowerError::NestingTooDeep { .. } => builder
                .with_help("raise compile.max_depth in framejit.toml")
                .build(),
            LowerError::UnknownShared { name, .. } => builder
                .with_help(format!("define it first with (shared {} expr)", name))
                .build(),
            _ => builder.build(),
        }
    }
}

/// Output of lowering one form
#[derive(Debug)]
pub struct Lowered {
    pub root: Node,
    pub spans: SpanTable,
    /// Names used without a declaration, in order of first use
    pub undeclared: Vec<Variable>,
    pub diagnostics: Diagnostics,
}

const RESERVED: &[&str] = &[
    "block",
    "lambda",
    "try",
    "catch",
    "finally",
    "when",
    "throw",
    "quote",
    "runtime-variables",
    "call",
    "if",
    "while",
    "set!",
    "set!op",
    "??",
    "and",
    "or",
    "neg",
    "not",
    "default",
    "shared",
];

/// Lower one top-level form.
pub fn lower(form: &Sexp) -> Result<Lowered, LowerError> {
    lower_with_limit(form, framejit_parser::DEFAULT_MAX_NESTING)
}

/// Lower one top-level form whose lists nest at most `max_depth` deep.
/// Lowering recurses along the nesting, so deeper input is refused up front.
pub fn lower_with_limit(form: &Sexp, max_depth: usize) -> Result<Lowered, LowerError> {
    if let Some(deep) = form.deeper_than(max_depth) {
        return Err(LowerError::NestingTooDeep {
            limit: max_depth,
            span: deep.span,
        });
    }
    let mut ctx = LoweringContext::new();
    let root = ctx.lower_expr(form)?;
    log::debug!(
        "lowered {} node(s), {} undeclared name(s)",
        ctx.spans.nodes.len(),
        ctx.undeclared.len()
    );
    Ok(Lowered {
        root,
        spans: ctx.spans,
        undeclared: ctx.undeclared.into_iter().map(|(_, v)| v).collect(),
        diagnostics: ctx.diagnostics,
    })
}

/// Parse a type expression
pub fn lower_type(form: &Sexp) -> Result<Type, LowerError> {
    match &form.kind {
        SexpKind::Symbol(name) => match name.as_str() {
            "int" => Ok(Type::Int),
            "float" => Ok(Type::Float),
            "bool" => Ok(Type::Bool),
            "string" => Ok(Type::String),
            "unit" => Ok(Type::Unit),
            "any" => Ok(Type::Any),
            _ => Err(LowerError::UnknownType {
                name: name.clone(),
                span: form.span,
            }),
        },
        SexpKind::List(items) if form.head() == Some("fn") && items.len() == 3 => {
            let params = items[1].as_list().ok_or_else(|| LowerError::MalformedForm {
                form: "fn type".to_string(),
                message: "expected a parameter type list".to_string(),
                span: items[1].span,
            })?;
            let params = params.iter().map(lower_type).collect::<Result<Vec<_>, _>>()?;
            Ok(Type::function(params, lower_type(&items[2])?))
        }
        _ => Err(LowerError::UnknownType {
            name: form.to_string(),
            span: form.span,
        }),
    }
}

fn is_type_form(form: &Sexp) -> bool {
    match &form.kind {
        SexpKind::Symbol(_) => lower_type(form).is_ok(),
        SexpKind::List(_) => form.head() == Some("fn"),
        _ => false,
    }
}

/// `(NAME TYPE)` with a non-reserved name
fn is_binding(form: &Sexp) -> bool {
    match form.as_list() {
        Some([name, ty]) => name
            .as_symbol()
            .map_or(false, |n| !RESERVED.contains(&n))
            && is_type_form(ty),
        _ => false,
    }
}

struct LoweringContext {
    /// Lexical scopes, innermost last
    scopes: Vec<Vec<(String, Variable)>>,
    shared: HashMap<String, Node>,
    undeclared: Vec<(String, Variable)>,
    spans: SpanTable,
    diagnostics: Diagnostics,
}

impl LoweringContext {
    fn new() -> Self {
        Self {
            scopes: Vec::new(),
            shared: HashMap::new(),
            undeclared: Vec::new(),
            spans: SpanTable::new(),
            diagnostics: Diagnostics::new(),
        }
    }

    fn malformed(form: &str, message: impl Into<String>, span: Span) -> LowerError {
        LowerError::MalformedForm {
            form: form.to_string(),
            message: message.into(),
            span,
        }
    }

    fn lookup(&mut self, name: &str, span: Span) -> Variable {
        for scope in self.scopes.iter().rev() {
            if let Some((_, v)) = scope.iter().rev().find(|(n, _)| n == name) {
                return v.clone();
            }
        }
        if let Some((_, v)) = self.undeclared.iter().find(|(n, _)| n == name) {
            return v.clone();
        }
        let v = Variable::new(name, Type::Any);
        self.spans.record_variable(&v, span);
        self.undeclared.push((name.to_string(), v.clone()));
        v
    }

    fn with_scope<T>(
        &mut self,
        variables: &[Variable],
        f: impl FnOnce(&mut Self) -> Result<T, LowerError>,
    ) -> Result<T, LowerError> {
        self.scopes.push(
            variables
                .iter()
                .map(|v| (v.name().to_string(), v.clone()))
                .collect(),
        );
        let result = f(self);
        self.scopes.pop();
        result
    }

    fn finish(&mut self, node: Node, span: Span) -> Node {
        self.spans.record_node(&node, span);
        node
    }

    /// Lower a binding list `((NAME TYPE [ref])...)`
    fn bindings(&mut self, form: &Sexp, allow_ref: bool) -> Result<Vec<Variable>, LowerError> {
        let items = form
            .as_list()
            .ok_or_else(|| Self::malformed("binding list", "expected ((name type) ...)", form.span))?;

        let mut variables: Vec<Variable> = Vec::with_capacity(items.len());
        for item in items {
            let parts = item
                .as_list()
                .ok_or_else(|| Self::malformed("binding", "expected (name type)", item.span))?;
            let (name_form, ty_form, by_ref) = match parts {
                [name, ty] => (name, ty, false),
                [name, ty, marker] if allow_ref && marker.is_symbol("ref") => (name, ty, true),
                _ => return Err(Self::malformed("binding", "expected (name type)", item.span)),
            };
            let name = name_form
                .as_symbol()
                .filter(|n| !RESERVED.contains(n))
                .ok_or_else(|| Self::malformed("binding", "expected a variable name", name_form.span))?;
            let ty = lower_type(ty_form)?;

            if let Some(previous) = variables.iter().find(|v| v.name() == name) {
                self.diagnostics.push(
                    Diagnostic::new(
                        DiagnosticCode::DuplicateDeclaration,
                        format!("'{}' is declared twice in the same list", name),
                    )
                    .with_span(name_form.span)
                    .with_label(self.spans.variable(previous.id()), "first declared here")
                    .build(),
                );
            }

            let variable = if by_ref {
                Variable::by_ref(name, ty)
            } else {
                Variable::new(name, ty)
            };
            self.spans.record_variable(&variable, name_form.span);
            variables.push(variable);
        }
        Ok(variables)
    }

    /// Lower a body of zero or more expressions into one node
    fn sequence(&mut self, forms: &[Sexp], span: Span) -> Result<Node, LowerError> {
        match forms {
            [] => Ok(self.finish(Node::unit(), span)),
            [single] => self.lower_expr(single),
            _ => {
                let body = forms
                    .iter()
                    .map(|f| self.lower_expr(f))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(self.finish(Node::block(Vec::new(), body), span))
            }
        }
    }

    fn lower_expr(&mut self, form: &Sexp) -> Result<Node, LowerError> {
        let span = form.span;
        let node = match &form.kind {
            SexpKind::Int(i) => Node::constant(Literal::Int(*i)),
            SexpKind::Float(x) => Node::constant(Literal::Float(*x)),
            SexpKind::Str(s) => Node::constant(Literal::String(s.clone())),
            SexpKind::Symbol(name) => match name.as_str() {
                "true" => Node::constant(Literal::Bool(true)),
                "false" => Node::constant(Literal::Bool(false)),
                "null" => Node::constant(Literal::Null),
                "unit" => Node::unit(),
                _ => {
                    let v = self.lookup(name, span);
                    Node::variable(&v)
                }
            },
            SexpKind::List(items) => return self.lower_list(form, items),
        };
        Ok(self.finish(node, span))
    }

    fn lower_list(&mut self, form: &Sexp, items: &[Sexp]) -> Result<Node, LowerError> {
        let span = form.span;
        let head = match items.first().and_then(Sexp::as_symbol) {
            Some(head) => head,
            None => return Err(Self::malformed("expression", "expected (form ...)", span)),
        };
        let args = &items[1..];

        let node = match head {
            "block" => {
                let (decls, body) = args
                    .split_first()
                    .ok_or_else(|| Self::malformed("block", "expected (block (bindings) expr...)", span))?;
                let variables = self.bindings(decls, false)?;
                let body = self.with_scope(&variables, |this| {
                    body.iter().map(|f| this.lower_expr(f)).collect::<Result<Vec<_>, _>>()
                })?;
                Node::block(variables, body)
            }
            "lambda" => self.lower_lambda(args, span)?,
            "try" => self.lower_try(args, span)?,
            "throw" => match args {
                [value] => Node::throw(self.lower_expr(value)?, Type::Unit),
                [value, ty] => Node::throw(self.lower_expr(value)?, lower_type(ty)?),
                _ => return Err(Self::malformed("throw", "expected (throw expr [type])", span)),
            },
            "quote" => match args {
                [operand] if operand.head() == Some("lambda") => Node::quote(self.lower_expr(operand)?),
                _ => return Err(Self::malformed("quote", "expected (quote (lambda ...))", span)),
            },
            "runtime-variables" => {
                let mut variables = Vec::with_capacity(args.len());
                for arg in args {
                    let name = arg
                        .as_symbol()
                        .ok_or_else(|| Self::malformed("runtime-variables", "expected variable names", arg.span))?;
                    variables.push(self.lookup(name, arg.span));
                }
                Node::runtime_variables(variables)
            }
            "call" => {
                let (callee, call_args) = args
                    .split_first()
                    .ok_or_else(|| Self::malformed("call", "expected (call f args...)", span))?;
                let callee = self.lower_expr(callee)?;
                let call_args = call_args
                    .iter()
                    .map(|a| self.lower_expr(a))
                    .collect::<Result<Vec<_>, _>>()?;
                Node::invoke(callee, call_args)
            }
            "if" => match args {
                [test, then] => Node::conditional(self.lower_expr(test)?, self.lower_expr(then)?, None),
                [test, then, otherwise] => Node::conditional(
                    self.lower_expr(test)?,
                    self.lower_expr(then)?,
                    Some(self.lower_expr(otherwise)?),
                ),
                _ => return Err(Self::malformed("if", "expected (if test then [else])", span)),
            },
            "while" => {
                let (test, body) = args
                    .split_first()
                    .ok_or_else(|| Self::malformed("while", "expected (while test expr...)", span))?;
                let test = self.lower_expr(test)?;
                let body = self.sequence(body, span)?;
                Node::loop_while(test, body)
            }
            "set!" => match args {
                [target, value] => {
                    let name = target
                        .as_symbol()
                        .ok_or_else(|| Self::malformed("set!", "expected a variable name", target.span))?;
                    let target_var = self.lookup(name, target.span);
                    let target_node = self.finish(Node::variable(&target_var), target.span);
                    Node::assign(target_node, self.lower_expr(value)?)
                }
                _ => return Err(Self::malformed("set!", "expected (set! name expr)", span)),
            },
            "set!op" => {
                let (op, target, value, conversion) = match args {
                    [op, target, value] => (op, target, value, None),
                    [op, target, value, conv] => (op, target, value, Some(conv)),
                    _ => {
                        return Err(Self::malformed(
                            "set!op",
                            "expected (set!op op name expr [(lambda ...)])",
                            span,
                        ))
                    }
                };
                let op = op
                    .as_symbol()
                    .and_then(BinaryOp::from_symbol)
                    .ok_or_else(|| Self::malformed("set!op", "expected an operator", op.span))?;
                let name = target
                    .as_symbol()
                    .ok_or_else(|| Self::malformed("set!op", "expected a variable name", target.span))?;
                let target = self.lookup(name, target.span);
                let value = self.lower_expr(value)?;
                let conversion = conversion.map(|c| self.lower_conversion(c)).transpose()?;
                Node::compound_assign(op, target, value, conversion)
            }
            "??" => {
                let (left, right, conversion) = match args {
                    [left, right] => (left, right, None),
                    [left, right, conv] => (left, right, Some(conv)),
                    _ => return Err(Self::malformed("??", "expected (?? expr expr [(lambda ...)])", span)),
                };
                let left = self.lower_expr(left)?;
                let right = self.lower_expr(right)?;
                let conversion = conversion.map(|c| self.lower_conversion(c)).transpose()?;
                Node::coalesce(left, right, conversion)
            }
            "and" | "or" => match args {
                [left, right] => {
                    let op = if head == "and" { LogicalOp::And } else { LogicalOp::Or };
                    Node::logical(op, self.lower_expr(left)?, self.lower_expr(right)?)
                }
                _ => return Err(Self::malformed(head, "expected two operands", span)),
            },
            "neg" | "not" => match args {
                [operand] => {
                    let op = if head == "neg" { UnaryOp::Neg } else { UnaryOp::Not };
                    Node::unary(op, self.lower_expr(operand)?)
                }
                _ => return Err(Self::malformed(head, "expected one operand", span)),
            },
            "default" => match args {
                [ty] => Node::default_of(lower_type(ty)?),
                _ => return Err(Self::malformed("default", "expected (default type)", span)),
            },
            "shared" => return self.lower_shared(args, span),
            _ => match BinaryOp::from_symbol(head) {
                Some(op) => match args {
                    [left, right] => Node::binary(op, self.lower_expr(left)?, self.lower_expr(right)?),
                    _ => return Err(Self::malformed(head, "expected two operands", span)),
                },
                None => {
                    return Err(Self::malformed(
                        "expression",
                        format!("unknown form '{}'; use (call {} ...) to call a function", head, head),
                        span,
                    ))
                }
            },
        };
        Ok(self.finish(node, span))
    }

    fn lower_lambda(&mut self, args: &[Sexp], span: Span) -> Result<Node, LowerError> {
        let (name, rest) = match args.split_first() {
            Some((first, rest)) if first.as_symbol().is_some() => (first.as_symbol().map(str::to_string), rest),
            _ => (None, args),
        };
        let (params, body) = rest
            .split_first()
            .ok_or_else(|| Self::malformed("lambda", "expected (lambda [name] (params) expr...)", span))?;
        let params = self.bindings(params, true)?;
        let body = self.with_scope(&params, |this| this.sequence(body, span))?;
        Ok(Node::lambda(name, params, body))
    }

    fn lower_conversion(&mut self, form: &Sexp) -> Result<Node, LowerError> {
        if form.head() != Some("lambda") {
            return Err(Self::malformed("conversion", "expected (lambda ((name type)) expr...)", form.span));
        }
        let conv = self.lower_expr(form)?;
        match conv.ty().as_function() {
            Some(f) if f.params.len() == 1 => Ok(conv),
            _ => Err(Self::malformed("conversion", "a conversion takes exactly one parameter", form.span)),
        }
    }

    fn lower_try(&mut self, args: &[Sexp], span: Span) -> Result<Node, LowerError> {
        let (body, clauses) = args
            .split_first()
            .ok_or_else(|| Self::malformed("try", "expected (try expr (catch ...)... [(finally ...)])", span))?;
        let body = self.lower_expr(body)?;

        let mut handlers = Vec::new();
        let mut finally = None;
        for (i, clause) in clauses.iter().enumerate() {
            match clause.head() {
                Some("catch") => handlers.push(self.lower_catch(clause)?),
                Some("finally") if i + 1 == clauses.len() => {
                    let items = clause.as_list().unwrap_or_default();
                    finally = Some(self.sequence(&items[1..], clause.span)?);
                }
                _ => {
                    return Err(Self::malformed(
                        "try",
                        "expected (catch ...) clauses followed by an optional (finally ...)",
                        clause.span,
                    ))
                }
            }
        }
        if handlers.is_empty() && finally.is_none() {
            return Err(Self::malformed("try", "needs at least one catch or a finally", span));
        }
        Ok(Node::try_catch(body, handlers, finally))
    }

    fn lower_catch(&mut self, clause: &Sexp) -> Result<Node, LowerError> {
        let items = clause.as_list().unwrap_or_default();
        let mut rest = &items[1..];

        let variable = match rest.first() {
            Some(binding) if is_binding(binding) => {
                rest = &rest[1..];
                let wrapped = Sexp::new(SexpKind::List(vec![binding.clone()]), binding.span);
                self.bindings(&wrapped, false)?.pop()
            }
            _ => None,
        };
        let declared: Vec<Variable> = variable.iter().cloned().collect();

        let node = self.with_scope(&declared, |this| {
            let filter = match rest.first() {
                Some(clause) if clause.head() == Some("when") => {
                    let parts = clause.as_list().unwrap_or_default();
                    let [_, test] = parts else {
                        return Err(Self::malformed("when", "expected (when expr)", clause.span));
                    };
                    rest = &rest[1..];
                    Some(this.lower_expr(test)?)
                }
                _ => None,
            };
            let body = this.sequence(rest, clause.span)?;
            Ok(Node::catch(variable, filter, body))
        })?;
        Ok(self.finish(node, clause.span))
    }

    fn lower_shared(&mut self, args: &[Sexp], span: Span) -> Result<Node, LowerError> {
        match args {
            [name] => {
                let name_str = name
                    .as_symbol()
                    .ok_or_else(|| Self::malformed("shared", "expected a name", name.span))?;
                self.shared
                    .get(name_str)
                    .cloned()
                    .ok_or_else(|| LowerError::UnknownShared {
                        name: name_str.to_string(),
                        span,
                    })
            }
            [name, expr] => {
                let name_str = name
                    .as_symbol()
                    .ok_or_else(|| Self::malformed("shared", "expected a name", name.span))?;
                let node = self.lower_expr(expr)?;
                self.shared.insert(name_str.to_string(), node.clone());
                Ok(node)
            }
            _ => Err(Self::malformed("shared", "expected (shared name [expr])", span)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::NodeKind;
    use framejit_diagnostics::SourceCache;

    fn lower_str(source: &str) -> Lowered {
        lower(&framejit_parser::parse(source).unwrap()).unwrap()
    }

    #[test]
    fn test_names_resolve_to_declarations() {
        let lowered = lower_str("(block ((x int)) (lambda ((y int)) (+ x y)))");
        let NodeKind::Block { variables, body } = lowered.root.kind() else {
            panic!("expected block");
        };
        let NodeKind::Lambda { params, body: lambda_body, .. } = body[0].kind() else {
            panic!("expected lambda");
        };
        let NodeKind::Binary { left, right, .. } = lambda_body.kind() else {
            panic!("expected binary");
        };
        assert!(matches!(left.kind(), NodeKind::Variable(v) if *v == variables[0]));
        assert!(matches!(right.kind(), NodeKind::Variable(v) if *v == params[0]));
        assert!(lowered.undeclared.is_empty());
    }

    #[test]
    fn test_shadowing_creates_distinct_variables() {
        let lowered = lower_str("(block ((x int)) (block ((x string)) x) x)");
        let NodeKind::Block { variables: outer, body } = lowered.root.kind() else {
            panic!("expected block");
        };
        let NodeKind::Block { variables: inner, body: inner_body } = body[0].kind() else {
            panic!("expected block");
        };
        assert_ne!(outer[0], inner[0]);
        assert!(matches!(inner_body[0].kind(), NodeKind::Variable(v) if *v == inner[0]));
        assert!(matches!(body[1].kind(), NodeKind::Variable(v) if *v == outer[0]));
    }

    #[test]
    fn test_undeclared_names_are_collected() {
        let lowered = lower_str("(lambda () (+ y y))");
        assert_eq!(lowered.undeclared.len(), 1);
        assert_eq!(lowered.undeclared[0].name(), "y");
    }

    #[test]
    fn test_catch_with_binding_and_filter() {
        let lowered = lower_str("(try (throw 1) (catch (e int) (when (> e 0)) e) (finally unit))");
        let NodeKind::Try { handlers, finally, .. } = lowered.root.kind() else {
            panic!("expected try");
        };
        let NodeKind::Catch { variable, filter, body } = handlers[0].kind() else {
            panic!("expected catch");
        };
        let e = variable.clone().unwrap();
        assert_eq!(e.ty(), &Type::Int);
        assert!(filter.is_some());
        assert!(matches!(body.kind(), NodeKind::Variable(v) if *v == e));
        assert!(finally.is_some());
    }

    #[test]
    fn test_catch_without_binding() {
        let lowered = lower_str("(try 1 (catch (call f)))");
        let NodeKind::Try { handlers, .. } = lowered.root.kind() else {
            panic!("expected try");
        };
        assert!(matches!(handlers[0].kind(), NodeKind::Catch { variable: None, .. }));
    }

    #[test]
    fn test_shared_nodes_keep_identity() {
        let lowered = lower_str("(block ((x int)) (shared inc (lambda () (set! x (+ x 1)))) (shared inc))");
        let NodeKind::Block { body, .. } = lowered.root.kind() else {
            panic!("expected block");
        };
        assert!(body[0].ptr_eq(&body[1]));
    }

    #[test]
    fn test_spans_are_recorded() {
        let mut cache = SourceCache::new();
        let parsed = framejit_parser::parse_with_cache(
            "(block ((x int))\n  x)",
            "t.fj",
            &mut cache,
            framejit_parser::DEFAULT_MAX_NESTING,
        )
        .unwrap();
        let lowered = lower(&parsed.form).unwrap();
        let NodeKind::Block { variables, body } = lowered.root.kind() else {
            panic!("expected block");
        };

        assert_eq!(cache.source_text(lowered.spans.node(body[0].id())), Some("x"));
        let decl = lowered.spans.variable(variables[0].id());
        assert_eq!(cache.location(decl).map(|l| (l.line, l.column)), Some((1, 10)));
    }

    #[test]
    fn test_duplicate_binding_warns() {
        let lowered = lower_str("(block ((x int) (x int)) x)");
        assert_eq!(lowered.diagnostics.warning_count(), 1);
    }

    #[test]
    fn test_errors() {
        let err = lower(&framejit_parser::parse("(block ((x integer)) x)").unwrap()).unwrap_err();
        assert_eq!(err.code(), DiagnosticCode::UnknownType);

        let err = lower(&framejit_parser::parse("(quote 1)").unwrap()).unwrap_err();
        assert_eq!(err.code(), DiagnosticCode::MalformedForm);

        let err = lower(&framejit_parser::parse("(shared nope)").unwrap()).unwrap_err();
        assert!(matches!(err, LowerError::UnknownShared { .. }));
    }

    #[test]
    fn test_deep_forms_are_refused() {
        let mut form = Sexp::symbol("x");
        for _ in 0..600 {
            form = Sexp::list(vec![Sexp::symbol("neg"), form]);
        }
        let err = lower(&form).unwrap_err();
        assert!(matches!(err, LowerError::NestingTooDeep { limit: 512, .. }));
        assert_eq!(err.code(), DiagnosticCode::DepthLimitExceeded);

        let shallow = framejit_parser::parse("(block ((f (fn (int) int))) f)").unwrap();
        assert!(lower_with_limit(&shallow, 5).is_ok());
        assert!(lower_with_limit(&shallow, 4).is_err());
    }

    #[test]
    fn test_by_ref_params() {
        let lowered = lower_str("(lambda ((r int ref) (v int)) (set! r v))");
        let NodeKind::Lambda { params, .. } = lowered.root.kind() else {
            panic!("expected lambda");
        };
        assert!(params[0].is_by_ref());
        assert!(!params[1].is_by_ref());
    }
}
