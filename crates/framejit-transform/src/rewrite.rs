//! Closure conversion
//!
//! Second walk over the tree, driven by the [`ScopeMap`]. Scopes with
//! hoisted locals allocate a frame on entry; references to hoisted
//! variables become field paths through parent links; nested function
//! literals move into the [`MethodTable`] and are replaced by thunk
//! materializations over the current frame.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use framejit_ir::{encode_location, pretty, FrameLayout, Node, NodeKind, StorageKind, Variable};
use framejit_types::{NodeId, ThunkType, Type};

use crate::error::CompileError;
use crate::frame::FrameDescriptor;
use crate::options::CompileOptions;
use crate::scope::{Scope, ScopeMap, OUTER_SCOPE};
use crate::thunk::ThunkFactory;

/// A rewritten nested function literal and the type of its thunk
#[derive(Debug, Clone)]
pub struct MethodTableEntry {
    /// Takes the enclosing frame as its first parameter
    pub lambda: Node,
    pub thunk: ThunkType,
}

/// Nested function literals of one compile, in first-visit order
#[derive(Debug, Clone, Default)]
pub struct MethodTable {
    entries: Vec<MethodTableEntry>,
}

impl MethodTable {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&MethodTableEntry> {
        self.entries.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &MethodTableEntry> {
        self.entries.iter()
    }
}

impl fmt::Display for MethodTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (index, entry) in self.entries.iter().enumerate() {
            let name = match entry.lambda.kind() {
                NodeKind::Lambda { name: Some(name), .. } => name.as_str(),
                _ => "<anonymous>",
            };
            writeln!(f, "[{}] {} : {}", index, name, entry.thunk)?;
            for line in pretty(&entry.lambda).lines() {
                writeln!(f, "    {}", line)?;
            }
        }
        Ok(())
    }
}

/// Output of closure conversion
#[derive(Debug, Clone)]
pub struct Prepared {
    /// The converted tree. A lambda root takes `outer` as its first
    /// parameter; any other root has `outer` free.
    pub root: Node,
    pub method_table: MethodTable,
    /// Receives the thunk table at invocation
    pub outer: Variable,
}

/// Reference to the innermost frame at some point of the rewrite
#[derive(Clone)]
struct FrameRef {
    expr: Node,
    layout: Arc<FrameLayout>,
}

/// How a hoisted slot is filled when its frame is allocated
#[derive(Clone, Copy)]
enum SlotInit {
    /// From the variable's own binding (parameters, caught exceptions)
    CopyIn,
    /// With the default of the variable's type (block variables)
    Default,
}

struct CompilerScope<'s> {
    scope: &'s Scope,
    frame: Option<FrameDescriptor>,
    /// Variable holding this scope's frame, while one is live
    frame_var: Option<Variable>,
    /// Closure parameter of a nested lambda, with the layout of the frame it
    /// receives
    closure: Option<(Variable, Option<Arc<FrameLayout>>)>,
}

/// Innermost frame visible from the end of `chain`. Lookup stops at the
/// closure of a nested lambda; frames outside it are only reachable through
/// parent links.
fn current_frame(chain: &[CompilerScope<'_>]) -> Option<FrameRef> {
    for entry in chain.iter().rev() {
        if let (Some(var), Some(frame)) = (&entry.frame_var, &entry.frame) {
            return Some(FrameRef {
                expr: Node::variable(var),
                layout: frame.layout().clone(),
            });
        }
        if let Some((closure, layout)) = &entry.closure {
            return layout.as_ref().map(|layout| FrameRef {
                expr: Node::variable(closure),
                layout: layout.clone(),
            });
        }
    }
    None
}

pub struct ClosureRewriter<'s> {
    scopes: &'s ScopeMap,
    chain: Vec<CompilerScope<'s>>,
    factory: &'s dyn ThunkFactory,
    outer: Variable,
    /// Reserved before a literal's body is rewritten, filled after
    table: Vec<Option<MethodTableEntry>>,
    /// Descriptors by scope and parent layout
    frames: HashMap<(NodeId, usize), FrameDescriptor>,
    depth: usize,
    max_depth: usize,
}

impl<'s> ClosureRewriter<'s> {
    pub fn new(
        outer: &Variable,
        scopes: &'s ScopeMap,
        factory: &'s dyn ThunkFactory,
        options: &CompileOptions,
    ) -> Self {
        Self {
            scopes,
            chain: Vec::new(),
            factory,
            outer: outer.clone(),
            table: Vec::new(),
            frames: HashMap::new(),
            depth: 0,
            max_depth: options.max_depth,
        }
    }

    pub fn run(mut self, root: &Node) -> Result<Prepared, CompileError> {
        let scopes = self.scopes;
        let outer_scope = scopes
            .outer()
            .filter(|scope| scope.declares(&self.outer))
            .ok_or(CompileError::MissingScope {
                kind: "outer",
                node: OUTER_SCOPE,
            })?;

        let frame = outer_scope
            .has_hoisted_locals()
            .then(|| self.descriptor(outer_scope, None));
        self.chain.push(CompilerScope {
            scope: outer_scope,
            frame,
            frame_var: None,
            closure: None,
        });
        let opened = self.open_frame(None, SlotInit::CopyIn)?;

        let converted = match root.kind() {
            NodeKind::Lambda { name, params, body } => {
                let body = self.rewrite_function(root, body, None)?;
                let body = Self::close_frame(opened, body);
                let mut params_out = Vec::with_capacity(params.len() + 1);
                params_out.push(self.outer.clone());
                params_out.extend(params.iter().cloned());
                Node::lambda(name.clone(), params_out, body)
            }
            _ => {
                let body = self.rewrite(root)?;
                Self::close_frame(opened, body)
            }
        };
        self.chain.pop();

        let method_table = MethodTable {
            entries: self.table.into_iter().flatten().collect(),
        };
        log::debug!(
            "closure conversion: {} method table entr{}, {} frame layout(s)",
            method_table.len(),
            if method_table.len() == 1 { "y" } else { "ies" },
            self.frames.len()
        );

        Ok(Prepared {
            root: converted,
            method_table,
            outer: self.outer,
        })
    }

    fn scope_for(&self, node: &Node) -> Result<&'s Scope, CompileError> {
        let scopes = self.scopes;
        scopes.get(node.id()).ok_or(CompileError::MissingScope {
            kind: node.kind_name(),
            node: node.id(),
        })
    }

    fn current_frame(&self) -> Option<FrameRef> {
        current_frame(&self.chain)
    }

    fn descriptor(&mut self, scope: &Scope, parent: Option<Arc<FrameLayout>>) -> FrameDescriptor {
        let key = (
            scope.node,
            parent.as_ref().map_or(0, |p| Arc::as_ptr(p) as usize),
        );
        if let Some(frame) = self.frames.get(&key) {
            return frame.clone();
        }

        let mut slots = Vec::new();
        if let Some(parent) = &parent {
            slots.push((Variable::new("parent", parent.record_type()), StorageKind::HOISTED));
        }
        slots.extend(scope.hoisted().map(|(v, kind)| (v.clone(), kind)));

        let frame = FrameDescriptor::build(format!("{}_frame_{}", scope.kind, scope.node), parent, &slots);
        log::trace!(
            "frame for {} {}: {} slot(s)",
            scope.kind,
            scope.node,
            frame.layout().len()
        );
        self.frames.insert(key, frame.clone());
        frame
    }

    /// Allocate the innermost scope's frame, if it has one: a fresh frame
    /// variable plus the statements filling the frame. The frame variable
    /// stays current until replaced or the scope is popped.
    fn open_frame(&mut self, parent: Option<Node>, init: SlotInit) -> Result<Option<(Variable, Vec<Node>)>, CompileError> {
        let Some(entry) = self.chain.last_mut() else {
            return Ok(None);
        };
        let Some(frame) = entry.frame.clone() else {
            return Ok(None);
        };

        let frame_var = Variable::new("frame", frame.record_type());
        let fv = Node::variable(&frame_var);
        let mut stmts = vec![Node::assign(fv.clone(), frame.allocate())];
        if let (Some(link), Some(parent)) = (frame.parent_link(fv.clone()), parent) {
            stmts.push(Node::assign(link, parent));
        }
        for (variable, _) in entry.scope.hoisted() {
            let value = match init {
                SlotInit::CopyIn => Node::variable(variable),
                SlotInit::Default => Node::default_of(variable.ty().clone()),
            };
            stmts.push(frame.assign(fv.clone(), variable, value)?);
        }

        entry.frame_var = Some(frame_var.clone());
        Ok(Some((frame_var, stmts)))
    }

    fn close_frame(opened: Option<(Variable, Vec<Node>)>, body: Node) -> Node {
        match opened {
            Some((frame_var, mut stmts)) => {
                let ty = body.ty().clone();
                stmts.push(body);
                Node::with_type(
                    NodeKind::Block {
                        variables: vec![frame_var],
                        body: stmts,
                    },
                    ty,
                )
            }
            None => body,
        }
    }

    /// Rewrite `expr` under a fresh frame of the innermost scope
    fn rewrite_framed(&mut self, expr: &Node, parent: Option<Node>, init: SlotInit) -> Result<Node, CompileError> {
        let opened = self.open_frame(parent, init)?;
        let body = self.rewrite(expr);
        if let Some(entry) = self.chain.last_mut() {
            entry.frame_var = None;
        }
        Ok(Self::close_frame(opened, body?))
    }

    /// Resolve a reference. `None` means the variable is still a plain
    /// local.
    fn resolve(&self, variable: &Variable, site: NodeId) -> Result<Option<Node>, CompileError> {
        let owner = self
            .chain
            .iter()
            .rposition(|entry| entry.scope.declares(variable))
            .ok_or_else(|| CompileError::UnboundVariable {
                variable: variable.clone(),
                node: site,
            })?;
        let entry = &self.chain[owner];
        let storage = entry.scope.storage(variable).unwrap_or_default();
        if storage.is_local() {
            return Ok(None);
        }

        let missing = || CompileError::MissingFrame {
            variable: variable.clone(),
        };
        let frame = entry.frame.as_ref().ok_or_else(missing)?;
        let current = self.current_frame().ok_or_else(missing)?;
        let hops = current.layout.hops_to(frame.layout()).ok_or_else(missing)?;

        let mut path = current.expr;
        for _ in 0..hops {
            path = Node::field(path, 0);
        }
        frame.access(path, variable).map(Some)
    }

    fn rewrite(&mut self, node: &Node) -> Result<Node, CompileError> {
        self.depth += 1;
        if self.depth > self.max_depth {
            return Err(CompileError::DepthLimitExceeded {
                limit: self.max_depth,
                node: node.id(),
            });
        }
        let result = self.rewrite_kind(node);
        self.depth -= 1;
        result
    }

    fn rewrite_kind(&mut self, node: &Node) -> Result<Node, CompileError> {
        match node.kind() {
            NodeKind::Constant(_) | NodeKind::Default => Ok(node.clone()),
            NodeKind::Variable(v) => Ok(self.resolve(v, node.id())?.unwrap_or_else(|| node.clone())),
            NodeKind::Lambda { .. } => self.rewrite_lambda(node),
            NodeKind::Block { body, .. } => self.rewrite_block(node, body),
            NodeKind::Try {
                body,
                handlers,
                finally,
            } => {
                let body = self.rewrite(body)?;
                let handlers = handlers
                    .iter()
                    .map(|handler| self.rewrite_catch(handler))
                    .collect::<Result<Vec<_>, _>>()?;
                let finally = finally.as_ref().map(|f| self.rewrite(f)).transpose()?;
                Ok(Node::with_type(
                    NodeKind::Try {
                        body,
                        handlers,
                        finally,
                    },
                    node.ty().clone(),
                ))
            }
            NodeKind::Quote(operand) => {
                let (frame, layout) = match self.current_frame() {
                    Some(frame) => (frame.expr, Some(frame.layout)),
                    None => (Node::unit(), None),
                };
                Ok(Node::framed_quote(operand.clone(), frame, layout))
            }
            NodeKind::RuntimeVariables(variables) => self.rewrite_runtime_variables(variables),
            NodeKind::Assign { target, value } => {
                let NodeKind::Variable(v) = target.kind() else {
                    return Err(CompileError::UnexpectedNode {
                        kind: target.kind_name(),
                        node: target.id(),
                    });
                };
                let target = self.resolve(v, target.id())?.unwrap_or_else(|| target.clone());
                let value = self.rewrite(value)?;
                Ok(Node::with_type(NodeKind::Assign { target, value }, node.ty().clone()))
            }
            NodeKind::Throw(_)
            | NodeKind::Invoke { .. }
            | NodeKind::Binary { .. }
            | NodeKind::Unary { .. }
            | NodeKind::Conditional { .. }
            | NodeKind::Loop { .. } => node.map_children(|child| self.rewrite(child)),
            _ => Err(CompileError::UnexpectedNode {
                kind: node.kind_name(),
                node: node.id(),
            }),
        }
    }

    fn rewrite_block(&mut self, node: &Node, body: &[Node]) -> Result<Node, CompileError> {
        let scope = self.scope_for(node)?;
        if !scope.has_hoisted_locals() {
            self.chain.push(CompilerScope {
                scope,
                frame: None,
                frame_var: None,
                closure: None,
            });
            let rewritten = body.iter().map(|expr| self.rewrite(expr)).collect::<Result<Vec<_>, _>>();
            self.chain.pop();
            let rewritten = rewritten?;

            if rewritten.iter().zip(body).all(|(new, old)| new.ptr_eq(old)) {
                return Ok(node.clone());
            }
            let variables = scope.locals().cloned().collect();
            return Ok(Node::with_type(
                NodeKind::Block {
                    variables,
                    body: rewritten,
                },
                node.ty().clone(),
            ));
        }

        let parent = if scope.needs_closure { self.current_frame() } else { None };
        let frame = self.descriptor(scope, parent.as_ref().map(|p| p.layout.clone()));
        self.chain.push(CompilerScope {
            scope,
            frame: Some(frame),
            frame_var: None,
            closure: None,
        });
        let result = self.rewrite_hoisting_block(scope, body, parent.map(|p| p.expr));
        self.chain.pop();
        let (variables, stmts) = result?;

        Ok(Node::with_type(
            NodeKind::Block {
                variables,
                body: stmts,
            },
            node.ty().clone(),
        ))
    }

    fn rewrite_hoisting_block(
        &mut self,
        scope: &Scope,
        body: &[Node],
        parent: Option<Node>,
    ) -> Result<(Vec<Variable>, Vec<Node>), CompileError> {
        let (frame_var, mut stmts) = self
            .open_frame(parent, SlotInit::Default)?
            .ok_or(CompileError::MissingScope {
                kind: "block",
                node: scope.node,
            })?;

        for expr in body {
            stmts.push(self.rewrite(expr)?);
        }
        if body.is_empty() {
            stmts.push(Node::unit());
        }

        let mut variables = vec![frame_var];
        variables.extend(scope.locals().cloned());
        Ok((variables, stmts))
    }

    fn rewrite_catch(&mut self, handler: &Node) -> Result<Node, CompileError> {
        let NodeKind::Catch {
            variable,
            filter,
            body,
        } = handler.kind()
        else {
            return Err(CompileError::UnexpectedNode {
                kind: handler.kind_name(),
                node: handler.id(),
            });
        };

        let scope = self.scope_for(handler)?;
        let parent = if scope.needs_closure { self.current_frame() } else { None };
        let frame = scope
            .has_hoisted_locals()
            .then(|| self.descriptor(scope, parent.as_ref().map(|p| p.layout.clone())));
        let link = parent.map(|p| p.expr);

        self.chain.push(CompilerScope {
            scope,
            frame,
            frame_var: None,
            closure: None,
        });
        let result = self.rewrite_handler(filter.as_ref(), body, link);
        self.chain.pop();
        let (filter, body) = result?;

        Ok(Node::with_type(
            NodeKind::Catch {
                variable: variable.clone(),
                filter,
                body,
            },
            handler.ty().clone(),
        ))
    }

    /// Filter and body each run with their own frame.
    fn rewrite_handler(
        &mut self,
        filter: Option<&Node>,
        body: &Node,
        link: Option<Node>,
    ) -> Result<(Option<Node>, Node), CompileError> {
        let filter = match filter {
            Some(filter) => Some(self.rewrite_framed(filter, link.clone(), SlotInit::CopyIn)?),
            None => None,
        };
        let body = self.rewrite_framed(body, link, SlotInit::CopyIn)?;
        Ok((filter, body))
    }

    /// Push the scope of a lambda and rewrite its body, copying hoisted
    /// parameters into its frame. `closure` is the implicit frame parameter
    /// of a nested lambda.
    fn rewrite_function(
        &mut self,
        lambda: &Node,
        body: &Node,
        closure: Option<(Variable, Option<FrameRef>)>,
    ) -> Result<Node, CompileError> {
        let scope = self.scope_for(lambda)?;

        // A nested lambda sees only its closure; the root sees the outer
        // scope directly.
        let (parent, closure) = match closure {
            Some((var, frame)) => {
                let parent = frame.map(|frame| FrameRef {
                    expr: Node::variable(&var),
                    layout: frame.layout,
                });
                let layout = parent.as_ref().map(|p| p.layout.clone());
                (parent, Some((var, layout)))
            }
            None if scope.needs_closure => (self.current_frame(), None),
            None => (None, None),
        };

        let frame = scope
            .has_hoisted_locals()
            .then(|| self.descriptor(scope, parent.as_ref().map(|p| p.layout.clone())));
        self.chain.push(CompilerScope {
            scope,
            frame,
            frame_var: None,
            closure,
        });
        let result = self.rewrite_framed(body, parent.map(|p| p.expr), SlotInit::CopyIn);
        self.chain.pop();
        result
    }

    fn rewrite_lambda(&mut self, node: &Node) -> Result<Node, CompileError> {
        let NodeKind::Lambda { name, params, body } = node.kind() else {
            return Err(CompileError::UnexpectedNode {
                kind: node.kind_name(),
                node: node.id(),
            });
        };
        let Type::Function(literal) = node.ty() else {
            return Err(CompileError::UnexpectedNode {
                kind: node.kind_name(),
                node: node.id(),
            });
        };
        let scope = self.scope_for(node)?;

        let index = self.table.len();
        self.table.push(None);

        let enclosing = if scope.needs_closure { self.current_frame() } else { None };
        let closure_ty = enclosing
            .as_ref()
            .map_or(Type::Unit, |frame| frame.layout.record_type());
        let closure = Variable::new("closure", closure_ty.clone());

        let body = self.rewrite_function(node, body, Some((closure.clone(), enclosing.clone())))?;
        let mut entry_params = Vec::with_capacity(params.len() + 1);
        entry_params.push(closure);
        entry_params.extend(params.iter().cloned());
        let entry = Node::lambda(name.clone(), entry_params, body);

        let thunk = self.factory.thunk_type(literal, &closure_ty);
        log::trace!(
            "method table [{}] <- {} ({})",
            index,
            name.as_deref().unwrap_or("<anonymous>"),
            thunk
        );
        self.table[index] = Some(MethodTableEntry {
            lambda: entry,
            thunk: thunk.clone(),
        });

        let table = self
            .resolve(&self.outer, node.id())?
            .unwrap_or_else(|| Node::variable(&self.outer));
        let frame = enclosing.map_or_else(Node::unit, |frame| frame.expr);
        Ok(Node::materialize_thunk(table, index, thunk, frame))
    }

    fn rewrite_runtime_variables(&self, variables: &[Variable]) -> Result<Node, CompileError> {
        let Some(frame) = self.current_frame() else {
            return match variables.first() {
                Some(variable) => Err(CompileError::MissingFrame {
                    variable: variable.clone(),
                }),
                None => Ok(Node::runtime_variables_view(Node::unit(), Vec::new())),
            };
        };

        let slots = variables
            .iter()
            .map(|variable| {
                frame
                    .layout
                    .locate(variable)
                    .map(|(hops, slot)| encode_location(hops, slot))
                    .ok_or_else(|| CompileError::VariableNotInFrame {
                        variable: variable.clone(),
                        frame: frame.layout.record.name.clone(),
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Node::runtime_variables_view(frame.expr, slots))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{analyze, convert, outer_variable, LazyThunks};
    use framejit_ir::{lower, reduce, Literal};

    fn converted(source: &str) -> Prepared {
        let root = reduce(&lower(&framejit_parser::parse(source).unwrap()).unwrap().root);
        convert(&root, &CompileOptions::default()).unwrap()
    }

    fn collect<'a>(node: &'a Node, out: &mut Vec<&'a Node>) {
        out.push(node);
        for child in node.children() {
            collect(child, out);
        }
    }

    fn count(node: &Node, pred: impl Fn(&Node) -> bool) -> usize {
        let mut nodes = Vec::new();
        collect(node, &mut nodes);
        nodes.into_iter().filter(|n| pred(n)).count()
    }

    fn is_new_frame(node: &Node) -> bool {
        matches!(node.kind(), NodeKind::NewFrame(_))
    }

    fn names(table: &MethodTable) -> Vec<String> {
        table
            .iter()
            .map(|entry| match entry.lambda.kind() {
                NodeKind::Lambda { name, .. } => name.clone().unwrap_or_default(),
                _ => panic!("expected lambda"),
            })
            .collect()
    }

    #[test]
    fn test_uncaptured_locals_stay_local() {
        let prepared = converted("(lambda ((a int)) (block ((x int)) (set! x a) (+ x 1)))");
        assert!(prepared.method_table.is_empty());
        assert_eq!(count(&prepared.root, is_new_frame), 0);

        let NodeKind::Lambda { params, .. } = prepared.root.kind() else {
            panic!("expected lambda");
        };
        assert_eq!(params.len(), 2);
        assert_eq!(params[0], prepared.outer);
    }

    #[test]
    fn test_captured_variable_gets_a_frame() {
        let prepared = converted("(block ((x int)) (set! x 5) (lambda () x))");
        assert_eq!(count(&prepared.root, is_new_frame), 1);
        assert_eq!(prepared.method_table.len(), 1);

        let NodeKind::Block { variables, body } = prepared.root.kind() else {
            panic!("expected block");
        };
        assert_eq!(variables.len(), 1);
        assert!(matches!(variables[0].ty(), Type::Record(_)));
        let Some(last) = body.last() else {
            panic!("empty block");
        };
        assert!(matches!(
            last.kind(),
            NodeKind::MaterializeThunk { index: 0, frame, .. } if matches!(frame.kind(), NodeKind::Variable(_))
        ));

        let entry = prepared.method_table.get(0).unwrap();
        let NodeKind::Lambda { params, body, .. } = entry.lambda.kind() else {
            panic!("expected lambda");
        };
        assert_eq!(params[0].name(), "closure");
        assert_eq!(params[0].ty(), &variables[0].ty().clone());
        assert!(matches!(body.kind(), NodeKind::Field { slot: 0, .. }));
        assert_eq!(*entry.thunk.frame, params[0].ty().clone());
    }

    #[test]
    fn test_method_table_follows_visit_order() {
        let prepared = converted("(block () (lambda a () (lambda b () 1)) (lambda c () 2))");
        assert_eq!(names(&prepared.method_table), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_identical_inputs_give_identical_tables() {
        let source = "(lambda ((n int)) (block ((k int)) (lambda f () (+ n k)) (lambda g ((z int)) (lambda h () z))))";
        let first = converted(source);
        let second = converted(source);

        assert_eq!(first.method_table.len(), 3);
        assert_eq!(names(&first.method_table), names(&second.method_table));
        for (a, b) in first.method_table.iter().zip(second.method_table.iter()) {
            assert_eq!(a.thunk.function, b.thunk.function);
            assert_eq!(a.thunk.strategy, b.thunk.strategy);
        }
    }

    #[test]
    fn test_runtime_variables_encode_hops_and_slots() {
        let prepared = converted("(block ((x int)) (lambda ((y int)) (runtime-variables x y)))");
        let entry = prepared.method_table.get(0).unwrap();

        let mut nodes = Vec::new();
        collect(&entry.lambda, &mut nodes);
        let slots = nodes
            .iter()
            .find_map(|n| match n.kind() {
                NodeKind::RuntimeVariablesView { slots, .. } => Some(slots.clone()),
                _ => None,
            })
            .unwrap();
        // x: one hop up, first slot of the block frame.
        // y: own frame, after the parent link.
        assert_eq!(slots, vec![encode_location(1, 0), encode_location(0, 1)]);
    }

    #[test]
    fn test_quote_keeps_operand_and_frame_chain() {
        let prepared = converted("(block ((x int)) (quote (lambda () x)))");
        assert!(prepared.method_table.is_empty());

        let NodeKind::Block { body, .. } = prepared.root.kind() else {
            panic!("expected block");
        };
        let NodeKind::FramedQuote { operand, layout, .. } = body.last().unwrap().kind() else {
            panic!("expected framed quote");
        };
        let layout = layout.as_ref().unwrap();
        let NodeKind::Lambda { body: quoted, .. } = operand.kind() else {
            panic!("expected lambda");
        };
        let NodeKind::Variable(x) = quoted.kind() else {
            panic!("expected variable");
        };
        assert_eq!(layout.locate(x), Some((0, 0)));
        assert!(layout.slot(0).unwrap().storage.is_boxed());
    }

    #[test]
    fn test_shared_lambda_gets_two_entries() {
        let shared = Node::lambda(None, vec![], Node::constant(Literal::Int(1)));
        let root = Node::block(vec![], vec![shared.clone(), shared]);
        let prepared = convert(&root, &CompileOptions::default()).unwrap();
        assert_eq!(prepared.method_table.len(), 2);
    }

    #[test]
    fn test_outer_is_hoisted_for_deep_literals() {
        let prepared = converted("(lambda () (lambda () (lambda () 1)))");
        assert_eq!(prepared.method_table.len(), 2);
        assert_eq!(count(&prepared.root, is_new_frame), 1);

        let entry = prepared.method_table.get(0).unwrap();
        let mut nodes = Vec::new();
        collect(&entry.lambda, &mut nodes);
        let table = nodes
            .iter()
            .find_map(|n| match n.kind() {
                NodeKind::MaterializeThunk { table, .. } => Some(table.clone()),
                _ => None,
            })
            .unwrap();
        assert!(matches!(table.kind(), NodeKind::Field { .. }));
    }

    #[test]
    fn test_catch_filter_and_body_get_separate_frames() {
        let without_filter = converted("(try (throw 1 int) (catch (e int) (lambda () e)))");
        assert_eq!(count(&without_filter.root, is_new_frame), 1);

        let with_filter = converted("(try (throw 1 int) (catch (e int) (when (> e 0)) (lambda () e)))");
        assert_eq!(count(&with_filter.root, is_new_frame), 2);
    }

    #[test]
    fn test_converted_nodes_are_rejected() {
        let root = Node::new_box(Node::constant(Literal::Int(1)));
        let err = convert(&root, &CompileOptions::default()).unwrap_err();
        assert!(matches!(err, CompileError::UnexpectedNode { kind: "new-box", .. }));
    }

    #[test]
    fn test_prepare_needs_the_outer_scope() {
        let root = Node::lambda(None, vec![], Node::unit());
        let scopes = analyze(&root, None).unwrap();
        let err = crate::prepare(&outer_variable(), &scopes, &root, &LazyThunks, &CompileOptions::default())
            .unwrap_err();
        assert!(matches!(err, CompileError::MissingScope { kind: "outer", .. }));
        assert!(err.is_internal());
    }

    #[test]
    fn test_rewriter_enforces_the_depth_limit() {
        let mut root = Node::constant(Literal::Int(0));
        for _ in 0..20 {
            root = Node::unary(framejit_ir::UnaryOp::Neg, root);
        }
        let outer = outer_variable();
        let scopes = crate::analyze_with(&root, Some(&outer), &CompileOptions::default()).unwrap();
        let shallow = CompileOptions::default().with_max_depth(10);
        let err = crate::prepare(&outer, &scopes, &root, &LazyThunks, &shallow).unwrap_err();
        assert!(matches!(err, CompileError::DepthLimitExceeded { limit: 10, .. }));

        assert!(matches!(
            crate::check_depth(&root, &shallow),
            Err(CompileError::DepthLimitExceeded { limit: 10, .. })
        ));
        assert!(crate::check_depth(&root, &CompileOptions::default()).is_ok());
    }

    #[test]
    fn test_independent_compiles_run_on_separate_threads() {
        let source = "(lambda ((a int)) (block ((b int)) (lambda () (+ a b))))";
        let root = reduce(&lower(&framejit_parser::parse(source).unwrap()).unwrap().root);
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let root = root.clone();
                std::thread::spawn(move || {
                    convert(&root, &CompileOptions::default()).map(|prepared| names(&prepared.method_table).len())
                })
            })
            .collect();
        for handle in handles {
            assert_eq!(handle.join().unwrap().unwrap(), 1);
        }
    }
}
