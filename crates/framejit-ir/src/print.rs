//! Textual rendering of IR trees.
//!
//! `Display` renders a node on one line in the surface syntax, extended
//! with forms for the nodes closure conversion introduces. [`pretty`] breaks
//! scope bodies onto indented lines.

use std::fmt::{self, Write};

use crate::ir::{Literal, Node, NodeKind, UnaryOp, Variable};

fn write_literal(out: &mut impl Write, literal: &Literal) -> fmt::Result {
    match literal {
        Literal::Unit => write!(out, "unit"),
        Literal::Null => write!(out, "null"),
        Literal::Bool(b) => write!(out, "{}", b),
        Literal::Int(i) => write!(out, "{}", i),
        Literal::Float(x) => write!(out, "{:?}", x),
        Literal::String(s) => write!(out, "{:?}", s),
    }
}

fn write_binding(out: &mut impl Write, variable: &Variable) -> fmt::Result {
    write!(out, "({} {}", variable.name(), variable.ty())?;
    if variable.is_by_ref() {
        write!(out, " ref")?;
    }
    write!(out, ")")
}

fn write_bindings(out: &mut impl Write, variables: &[Variable]) -> fmt::Result {
    write!(out, "(")?;
    for (i, v) in variables.iter().enumerate() {
        if i > 0 {
            write!(out, " ")?;
        }
        write_binding(out, v)?;
    }
    write!(out, ")")
}

struct Printer<'a, W: Write> {
    out: &'a mut W,
    /// `None` renders on one line
    indent: Option<usize>,
}

impl<'a, W: Write> Printer<'a, W> {
    fn newline(&mut self, depth: usize) -> fmt::Result {
        match self.indent {
            Some(base) => write!(self.out, "\n{:width$}", "", width = (base + depth) * 2),
            None => write!(self.out, " "),
        }
    }

    fn nested(&mut self, node: &Node, depth: usize) -> fmt::Result {
        let saved = self.indent;
        self.indent = saved.map(|base| base + depth);
        let result = self.node(node);
        self.indent = saved;
        result
    }

    fn list(&mut self, head: &str, items: &[&Node]) -> fmt::Result {
        write!(self.out, "({}", head)?;
        for item in items {
            write!(self.out, " ")?;
            self.node(item)?;
        }
        write!(self.out, ")")
    }

    fn body(&mut self, body: &[Node]) -> fmt::Result {
        for expr in body {
            self.newline(1)?;
            self.nested(expr, 1)?;
        }
        Ok(())
    }

    fn node(&mut self, node: &Node) -> fmt::Result {
        match node.kind() {
            NodeKind::Constant(literal) => write_literal(self.out, literal),
            NodeKind::Variable(v) => write!(self.out, "{}", v.name()),
            NodeKind::Lambda { name, params, body } => {
                write!(self.out, "(lambda ")?;
                if let Some(name) = name {
                    write!(self.out, "{} ", name)?;
                }
                write_bindings(self.out, params)?;
                self.body(std::slice::from_ref(body))?;
                write!(self.out, ")")
            }
            NodeKind::Block { variables, body } => {
                write!(self.out, "(block ")?;
                write_bindings(self.out, variables)?;
                self.body(body)?;
                write!(self.out, ")")
            }
            NodeKind::Catch {
                variable,
                filter,
                body,
            } => {
                write!(self.out, "(catch")?;
                if let Some(v) = variable {
                    write!(self.out, " ")?;
                    write_binding(self.out, v)?;
                }
                if let Some(filter) = filter {
                    write!(self.out, " (when ")?;
                    self.node(filter)?;
                    write!(self.out, ")")?;
                }
                self.body(std::slice::from_ref(body))?;
                write!(self.out, ")")
            }
            NodeKind::Try {
                body,
                handlers,
                finally,
            } => {
                write!(self.out, "(try")?;
                self.body(std::slice::from_ref(body))?;
                self.body(handlers)?;
                if let Some(finally) = finally {
                    self.newline(1)?;
                    write!(self.out, "(finally")?;
                    let saved = self.indent;
                    self.indent = saved.map(|base| base + 1);
                    self.body(std::slice::from_ref(finally))?;
                    self.indent = saved;
                    write!(self.out, ")")?;
                }
                write!(self.out, ")")
            }
            NodeKind::Throw(value) => self.list("throw", &[value]),
            NodeKind::Quote(operand) => self.list("quote", &[operand]),
            NodeKind::RuntimeVariables(vars) => {
                write!(self.out, "(runtime-variables")?;
                for v in vars {
                    write!(self.out, " {}", v.name())?;
                }
                write!(self.out, ")")
            }
            NodeKind::Invoke { callee, args } => {
                let items: Vec<&Node> = Some(callee).into_iter().chain(args.iter()).collect();
                self.list("call", &items)
            }
            NodeKind::Binary { op, left, right } => self.list(op.symbol(), &[left, right]),
            NodeKind::Unary { op, operand } => {
                let head = match op {
                    UnaryOp::Neg => "neg",
                    UnaryOp::Not => "not",
                };
                self.list(head, &[operand])
            }
            NodeKind::Conditional {
                test,
                then,
                otherwise,
            } => {
                let items: Vec<&Node> = vec![test, then].into_iter().chain(otherwise.iter()).collect();
                self.list("if", &items)
            }
            NodeKind::Loop { test, body } => self.list("while", &[test, body]),
            NodeKind::Assign { target, value } => self.list("set!", &[target, value]),
            NodeKind::Default => write!(self.out, "(default {})", node.ty()),
            NodeKind::CompoundAssign {
                op,
                target,
                value,
                conversion,
            } => {
                write!(self.out, "(set!op {} {} ", op.symbol(), target.name())?;
                self.node(value)?;
                if let Some(conv) = conversion {
                    write!(self.out, " ")?;
                    self.node(conv)?;
                }
                write!(self.out, ")")
            }
            NodeKind::Coalesce {
                left,
                right,
                conversion,
            } => {
                let items: Vec<&Node> = vec![left, right].into_iter().chain(conversion.iter()).collect();
                self.list("??", &items)
            }
            NodeKind::Logical { op, left, right } => {
                let head = match op {
                    crate::ir::LogicalOp::And => "and",
                    crate::ir::LogicalOp::Or => "or",
                };
                self.list(head, &[left, right])
            }
            NodeKind::NewFrame(layout) => {
                write!(self.out, "(new-frame {}#{}", layout.record.name, layout.record.id)?;
                for slot in &layout.slots {
                    write!(self.out, " {}:{}", slot.variable.name(), slot.storage)?;
                }
                write!(self.out, ")")
            }
            NodeKind::Field { frame, slot } => {
                write!(self.out, "(field ")?;
                self.node(frame)?;
                write!(self.out, " {})", slot)
            }
            NodeKind::NewBox(value) => self.list("new-box", &[value]),
            NodeKind::BoxValue(cell) => self.list("unbox", &[cell]),
            NodeKind::MaterializeThunk {
                table,
                index,
                frame,
                ..
            } => {
                write!(self.out, "(materialize ")?;
                self.node(table)?;
                write!(self.out, " {} ", index)?;
                self.node(frame)?;
                write!(self.out, ")")
            }
            NodeKind::RuntimeVariablesView { frame, slots } => {
                write!(self.out, "(runtime-variables-view ")?;
                self.node(frame)?;
                for encoded in slots {
                    let (hops, slot) = crate::frame::decode_location(*encoded);
                    write!(self.out, " {}:{}", hops, slot)?;
                }
                write!(self.out, ")")
            }
            NodeKind::FramedQuote {
                operand,
                frame,
                layout,
            } => {
                write!(self.out, "(framed-quote ")?;
                self.node(frame)?;
                match layout {
                    Some(layout) => write!(self.out, " {}#{}", layout.record.name, layout.record.id)?,
                    None => write!(self.out, " -")?,
                }
                self.newline(1)?;
                self.nested(operand, 1)?;
                write!(self.out, ")")
            }
        }
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut printer = Printer { out: f, indent: None };
        printer.node(self)
    }
}

/// Render `node` with scope bodies on indented lines.
pub fn pretty(node: &Node) -> String {
    let mut out = String::new();
    let mut printer = Printer {
        out: &mut out,
        indent: Some(0),
    };
    // Writing into a String cannot fail.
    let _ = printer.node(node);
    out
}
