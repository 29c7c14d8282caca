//! Function compiler
//!
//! Turns a function literal into a [`Function`]: every variable declared
//! anywhere in its body gets a local slot, every free variable becomes a
//! capture supplied by the closure, and nested literals are compiled ahead
//! with the slots their captures come from.

use std::collections::HashMap;
use std::rc::Rc;

use framejit_ir::{free_variables, Node, NodeKind, Variable};
use framejit_types::{FunctionType, NodeId, Type, VarId};

use crate::error::RuntimeError;

/// Where a compiled function finds a variable
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Slot {
    /// Index into the activation's locals
    Local(usize),
    /// Index into the closure's captured cells
    Captured(usize),
}

/// Nested literal compiled with its enclosing function
#[derive(Debug)]
pub(crate) struct Nested {
    pub function: Rc<Function>,
    /// Where each capture of `function` lives in the enclosing function
    pub sources: Vec<Slot>,
}

#[derive(Debug)]
pub struct Function {
    pub name: Option<String>,
    pub params: Vec<Variable>,
    pub ty: FunctionType,
    pub(crate) body: Node,
    /// Free variables, in the order the closure supplies their cells
    pub captures: Vec<Variable>,
    pub(crate) slots: HashMap<VarId, Slot>,
    pub(crate) local_count: usize,
    pub(crate) nested: HashMap<NodeId, Nested>,
}

impl Function {
    pub fn arity(&self) -> usize {
        self.params.len()
    }

    pub fn slot(&self, variable: &Variable) -> Option<Slot> {
        self.slots.get(&variable.id()).copied()
    }

    pub(crate) fn resolve(&self, variable: &Variable) -> Result<Slot, RuntimeError> {
        self.slot(variable).ok_or_else(|| RuntimeError::UndeclaredVariable {
            name: variable.name().to_string(),
        })
    }
}

/// Compile `lambda`. Its free variables must all appear in `bindings`;
/// the closure built for it supplies their cells in free-variable order.
pub fn compile_function(lambda: &Node, bindings: &[Variable]) -> Result<Rc<Function>, RuntimeError> {
    let captures = free_variables(lambda);
    if let Some(missing) = captures.iter().find(|v| !bindings.contains(v)) {
        return Err(RuntimeError::UndeclaredVariable {
            name: missing.name().to_string(),
        });
    }
    FunctionCompiler::new(captures).compile(lambda).map(Rc::new)
}

struct FunctionCompiler {
    captures: Vec<Variable>,
    slots: HashMap<VarId, Slot>,
    local_count: usize,
    nested: HashMap<NodeId, Nested>,
}

impl FunctionCompiler {
    fn new(captures: Vec<Variable>) -> Self {
        let slots = captures
            .iter()
            .enumerate()
            .map(|(i, v)| (v.id(), Slot::Captured(i)))
            .collect();
        Self {
            captures,
            slots,
            local_count: 0,
            nested: HashMap::new(),
        }
    }

    fn compile(mut self, lambda: &Node) -> Result<Function, RuntimeError> {
        let NodeKind::Lambda { name, params, body } = lambda.kind() else {
            return Err(RuntimeError::UnexpectedNode {
                kind: lambda.kind_name(),
            });
        };
        let ty = match lambda.ty() {
            Type::Function(ty) => ty.clone(),
            _ => FunctionType::new(params.iter().map(|p| p.ty().clone()).collect(), body.ty().clone()),
        };

        for param in params {
            self.declare(param);
        }
        self.walk(body)?;

        log::trace!(
            "compiled {}: {} local(s), {} capture(s), {} nested",
            name.as_deref().unwrap_or("<anonymous>"),
            self.local_count,
            self.captures.len(),
            self.nested.len()
        );
        Ok(Function {
            name: name.clone(),
            params: params.clone(),
            ty,
            body: body.clone(),
            captures: self.captures,
            slots: self.slots,
            local_count: self.local_count,
            nested: self.nested,
        })
    }

    /// A declaration seen twice (shared sub-tree) keeps its first slot.
    fn declare(&mut self, variable: &Variable) {
        if !self.slots.contains_key(&variable.id()) {
            self.slots.insert(variable.id(), Slot::Local(self.local_count));
            self.local_count += 1;
        }
    }

    fn lookup(&self, variable: &Variable) -> Result<Slot, RuntimeError> {
        self.slots
            .get(&variable.id())
            .copied()
            .ok_or_else(|| RuntimeError::UndeclaredVariable {
                name: variable.name().to_string(),
            })
    }

    fn walk(&mut self, node: &Node) -> Result<(), RuntimeError> {
        match node.kind() {
            NodeKind::Variable(v) => self.lookup(v).map(|_| ()),
            NodeKind::RuntimeVariables(vars) => vars.iter().try_for_each(|v| self.lookup(v).map(|_| ())),
            NodeKind::Block { variables, body } => {
                for v in variables {
                    self.declare(v);
                }
                body.iter().try_for_each(|expr| self.walk(expr))
            }
            NodeKind::Catch {
                variable,
                filter,
                body,
            } => {
                if let Some(v) = variable {
                    self.declare(v);
                }
                filter.iter().chain(Some(body)).try_for_each(|expr| self.walk(expr))
            }
            NodeKind::Lambda { .. } => {
                if self.nested.contains_key(&node.id()) {
                    return Ok(());
                }
                let captures = free_variables(node);
                let sources = captures
                    .iter()
                    .map(|v| self.lookup(v))
                    .collect::<Result<Vec<_>, _>>()?;
                let function = FunctionCompiler::new(captures).compile(node)?;
                self.nested.insert(
                    node.id(),
                    Nested {
                        function: Rc::new(function),
                        sources,
                    },
                );
                Ok(())
            }
            // Compiled when the quote is, against the cells it captures.
            NodeKind::Quote(operand) => free_variables(operand)
                .iter()
                .try_for_each(|v| self.lookup(v).map(|_| ())),
            // Its operand is compiled on demand against frame cells.
            NodeKind::FramedQuote { frame, .. } => self.walk(frame),
            NodeKind::CompoundAssign { .. } | NodeKind::Coalesce { .. } | NodeKind::Logical { .. } => {
                Err(RuntimeError::UnexpectedNode {
                    kind: node.kind_name(),
                })
            }
            _ => node.children().into_iter().try_for_each(|child| self.walk(child)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use framejit_ir::{lower, reduce, Literal};

    fn lambda(source: &str) -> Node {
        reduce(&lower(&framejit_parser::parse(source).unwrap()).unwrap().root)
    }

    #[test]
    fn test_every_declaration_gets_a_slot() {
        let node = lambda("(lambda ((a int)) (block ((x int)) (try (set! x a) (catch (e int) e))))");
        let function = compile_function(&node, &[]).unwrap();
        assert_eq!(function.local_count, 3);
        assert_eq!(function.arity(), 1);
        assert_eq!(function.slot(&function.params[0]), Some(Slot::Local(0)));
    }

    #[test]
    fn test_free_variables_need_bindings() {
        let node = lambda("(lambda () (+ y 1))");
        let err = compile_function(&node, &[]).unwrap_err();
        assert!(matches!(err, RuntimeError::UndeclaredVariable { ref name } if name == "y"));

        let free = free_variables(&node);
        let function = compile_function(&node, &free).unwrap();
        assert_eq!(function.slot(&free[0]), Some(Slot::Captured(0)));
    }

    #[test]
    fn test_nested_literals_record_capture_sources() {
        let node = lambda("(lambda ((a int)) (block ((b int)) (lambda () (+ a b))))");
        let function = compile_function(&node, &[]).unwrap();
        assert_eq!(function.nested.len(), 1);
        let nested = function.nested.values().next().unwrap();
        assert_eq!(nested.sources, vec![Slot::Local(0), Slot::Local(1)]);
        assert_eq!(nested.function.captures.len(), 2);
    }

    #[test]
    fn test_shared_block_reuses_slots() {
        let x = Variable::new("x", Type::Int);
        let shared = Node::block(vec![x.clone()], vec![Node::variable(&x)]);
        let node = Node::lambda(None, vec![], Node::block(vec![], vec![shared.clone(), shared]));
        let function = compile_function(&node, &[]).unwrap();
        assert_eq!(function.local_count, 1);
    }

    #[test]
    fn test_unreduced_nodes_are_rejected() {
        let x = Variable::new("x", Type::Bool);
        let node = Node::lambda(
            None,
            vec![x.clone()],
            Node::logical(framejit_ir::LogicalOp::And, Node::variable(&x), Node::constant(Literal::Bool(true))),
        );
        assert!(matches!(
            compile_function(&node, &[]),
            Err(RuntimeError::UnexpectedNode { kind: "logical" })
        ));
    }
}
