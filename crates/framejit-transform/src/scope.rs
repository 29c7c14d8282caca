//! Scope analysis
//!
//! One read-only walk over a normalized tree. Every lambda, block and
//! catch handler gets a [`Scope`] recording the variables it declares and
//! the storage each one needs; quotes get a variable-less marker scope.
//! Results live in a [`ScopeMap`] keyed by node identity, so a sub-tree
//! reached twice through sharing accumulates into a single record.
//!
//! A reference walks the scope stack outward until it reaches the
//! declaring scope. Crossing a lambda boundary requires hoisting, crossing
//! a quote boundary requires boxing, and every scope crossed has to forward
//! its frame chain (`needs_closure`).

use std::collections::HashMap;
use std::fmt;

use framejit_ir::{Node, NodeKind, StorageKind, Variable};
use framejit_types::NodeId;

use crate::error::CompileError;
use crate::options::CompileOptions;

/// Key of the synthetic scope declaring the outer frame variable.
/// Node ids start at 1, so it never collides with a real node.
pub const OUTER_SCOPE: NodeId = 0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeKind {
    /// Synthetic top scope holding the outer frame variable
    Outer,
    Lambda,
    Block,
    Catch,
    /// Capture-tracking marker, declares nothing
    Quote,
}

impl fmt::Display for ScopeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ScopeKind::Outer => "outer",
            ScopeKind::Lambda => "lambda",
            ScopeKind::Block => "block",
            ScopeKind::Catch => "catch",
            ScopeKind::Quote => "quote",
        };
        write!(f, "{}", name)
    }
}

/// Analysis record of one scope-introducing node
#[derive(Debug, Clone)]
pub struct Scope {
    pub node: NodeId,
    pub kind: ScopeKind,
    /// Nearest enclosing scope that is not a quote marker. A shared node
    /// keeps the parent of its first visit; the rewriter does not read this.
    pub parent: Option<NodeId>,
    /// A reference crossed this scope to reach a variable declared further
    /// out, so the scope must forward a frame chain
    pub needs_closure: bool,
    /// Declared variables in declaration order
    variables: Vec<(Variable, StorageKind)>,
}

impl Scope {
    fn new(node: NodeId, kind: ScopeKind, parent: Option<NodeId>, variables: &[Variable]) -> Self {
        Self {
            node,
            kind,
            parent,
            needs_closure: false,
            variables: variables
                .iter()
                .map(|v| (v.clone(), StorageKind::LOCAL))
                .collect(),
        }
    }

    pub fn variables(&self) -> &[(Variable, StorageKind)] {
        &self.variables
    }

    pub fn declares(&self, variable: &Variable) -> bool {
        self.variables.iter().any(|(v, _)| v == variable)
    }

    pub fn storage(&self, variable: &Variable) -> Option<StorageKind> {
        self.variables
            .iter()
            .find(|(v, _)| v == variable)
            .map(|(_, kind)| *kind)
    }

    /// At least one declared variable lives in a frame
    pub fn has_hoisted_locals(&self) -> bool {
        self.variables.iter().any(|(_, kind)| kind.is_hoisted())
    }

    /// Variables that live in this scope's frame, in declaration order
    pub fn hoisted(&self) -> impl Iterator<Item = (&Variable, StorageKind)> {
        self.variables
            .iter()
            .filter(|(_, kind)| kind.is_hoisted())
            .map(|(v, kind)| (v, *kind))
    }

    /// Variables that stay plain locals
    pub fn locals(&self) -> impl Iterator<Item = &Variable> {
        self.variables
            .iter()
            .filter(|(_, kind)| kind.is_local())
            .map(|(v, _)| v)
    }

    fn require(&mut self, variable: &Variable, kind: StorageKind) {
        if let Some((_, storage)) = self.variables.iter_mut().find(|(v, _)| v == variable) {
            *storage |= kind;
        }
    }
}

/// Scopes keyed by node identity
#[derive(Debug, Default)]
pub struct ScopeMap {
    scopes: HashMap<NodeId, Scope>,
    /// Registration order, for deterministic reporting
    order: Vec<NodeId>,
}

impl ScopeMap {
    pub fn get(&self, node: NodeId) -> Option<&Scope> {
        self.scopes.get(&node)
    }

    fn get_mut(&mut self, node: NodeId) -> Option<&mut Scope> {
        self.scopes.get_mut(&node)
    }

    pub fn contains(&self, node: NodeId) -> bool {
        self.scopes.contains_key(&node)
    }

    /// The synthetic scope of the outer frame variable, when one was given
    pub fn outer(&self) -> Option<&Scope> {
        self.scopes.get(&OUTER_SCOPE)
    }

    fn register(&mut self, scope: Scope) -> Result<(), CompileError> {
        if self.scopes.contains_key(&scope.node) {
            return Err(CompileError::ScopeAlreadyRegistered { node: scope.node });
        }
        log::trace!(
            "scope {} registered ({}, {} variable(s))",
            scope.node,
            scope.kind,
            scope.variables.len()
        );
        self.order.push(scope.node);
        self.scopes.insert(scope.node, scope);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.scopes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scopes.is_empty()
    }

    /// Scopes in the order they were first entered
    pub fn iter(&self) -> impl Iterator<Item = &Scope> {
        self.order.iter().filter_map(|id| self.scopes.get(id))
    }

    /// Number of scopes that will allocate a frame
    pub fn frame_count(&self) -> usize {
        self.scopes.values().filter(|s| s.has_hoisted_locals()).count()
    }
}

impl fmt::Display for ScopeMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for scope in self.iter() {
            write!(f, "{} {}", scope.kind, scope.node)?;
            if let Some(parent) = scope.parent {
                write!(f, " parent={}", parent)?;
            }
            if scope.has_hoisted_locals() {
                write!(f, " hoisted-locals")?;
            }
            if scope.needs_closure {
                write!(f, " needs-closure")?;
            }
            writeln!(f)?;
            for (variable, storage) in scope.variables() {
                writeln!(f, "  {} {}: {}", variable.name(), variable.ty(), storage)?;
            }
        }
        Ok(())
    }
}

/// Walks a tree and builds its [`ScopeMap`]
pub struct ScopeAnalyzer {
    map: ScopeMap,
    /// Node ids of the scopes enclosing the current position, innermost last
    stack: Vec<NodeId>,
    outer: Option<Variable>,
    root: NodeId,
    quote_depth: usize,
    depth: usize,
    max_depth: usize,
}

impl ScopeAnalyzer {
    pub fn new(root: &Node, outer: Option<&Variable>, options: &CompileOptions) -> Self {
        Self {
            map: ScopeMap::default(),
            stack: Vec::new(),
            outer: outer.cloned(),
            root: root.id(),
            quote_depth: 0,
            depth: 0,
            max_depth: options.max_depth,
        }
    }

    /// Analyze the tree this analyzer was created for.
    pub fn run(mut self, root: &Node) -> Result<ScopeMap, CompileError> {
        if let Some(outer) = self.outer.clone() {
            self.map
                .register(Scope::new(OUTER_SCOPE, ScopeKind::Outer, None, &[outer]))?;
            self.stack.push(OUTER_SCOPE);
        }
        self.visit(root)?;

        log::debug!(
            "scope analysis: {} scope(s), {} with hoisted locals",
            self.map.len(),
            self.map.frame_count()
        );
        Ok(self.map)
    }

    fn enter(&mut self, node: &Node, kind: ScopeKind, variables: &[Variable]) -> Result<(), CompileError> {
        if !self.map.contains(node.id()) {
            let parent = self
                .stack
                .iter()
                .rev()
                .copied()
                .find(|id| self.map.get(*id).map_or(false, |s| s.kind != ScopeKind::Quote));
            self.map.register(Scope::new(node.id(), kind, parent, variables))?;
        }
        self.stack.push(node.id());
        Ok(())
    }

    fn exit(&mut self) {
        self.stack.pop();
    }

    /// Record a use of `variable` at `site` needing at least `required`
    /// storage.
    fn reference(&mut self, variable: &Variable, required: StorageKind, site: NodeId) -> Result<(), CompileError> {
        let mut required = required;
        for index in (0..self.stack.len()).rev() {
            let id = self.stack[index];
            let root = self.root;
            let scope = self
                .map
                .get_mut(id)
                .ok_or(CompileError::MissingScope { kind: "scope", node: id })?;

            if scope.declares(variable) {
                if required.is_boxed() {
                    required |= StorageKind::HOISTED;
                }
                if variable.is_by_ref() && !required.is_local() {
                    return Err(CompileError::ByRefCapture {
                        variable: variable.clone(),
                        storage: required,
                        node: site,
                    });
                }
                scope.require(variable, required);
                return Ok(());
            }

            scope.needs_closure = true;
            match scope.kind {
                ScopeKind::Lambda if id != root => required |= StorageKind::HOISTED,
                ScopeKind::Quote => required |= StorageKind::BOXED | StorageKind::HOISTED,
                _ => {}
            }
        }

        Err(CompileError::UnboundVariable {
            variable: variable.clone(),
            node: site,
        })
    }

    fn visit(&mut self, node: &Node) -> Result<(), CompileError> {
        self.depth += 1;
        if self.depth > self.max_depth {
            return Err(CompileError::DepthLimitExceeded {
                limit: self.max_depth,
                node: node.id(),
            });
        }
        let result = self.visit_kind(node);
        self.depth -= 1;
        result
    }

    fn visit_kind(&mut self, node: &Node) -> Result<(), CompileError> {
        match node.kind() {
            NodeKind::Constant(_) | NodeKind::Default => Ok(()),
            NodeKind::Variable(v) => self.reference(v, StorageKind::LOCAL, node.id()),
            NodeKind::Lambda { params, body, .. } => {
                // Materializing a nested literal reads the method table.
                if node.id() != self.root && self.quote_depth == 0 {
                    if let Some(outer) = self.outer.clone() {
                        self.reference(&outer, StorageKind::LOCAL, node.id())?;
                    }
                }
                self.enter(node, ScopeKind::Lambda, params)?;
                let result = self.visit(body);
                self.exit();
                result
            }
            NodeKind::Block { variables, body } => {
                self.enter(node, ScopeKind::Block, variables)?;
                let result = body.iter().try_for_each(|expr| self.visit(expr));
                self.exit();
                result
            }
            NodeKind::Try {
                body,
                handlers,
                finally,
            } => {
                self.visit(body)?;
                for handler in handlers {
                    self.visit_handler(handler)?;
                }
                match finally {
                    Some(finally) => self.visit(finally),
                    None => Ok(()),
                }
            }
            NodeKind::Quote(operand) => {
                if !matches!(operand.kind(), NodeKind::Lambda { .. }) {
                    return Err(CompileError::UnexpectedNode {
                        kind: operand.kind_name(),
                        node: operand.id(),
                    });
                }
                self.enter(node, ScopeKind::Quote, &[])?;
                self.quote_depth += 1;
                let result = self.visit(operand);
                self.quote_depth -= 1;
                self.exit();
                result
            }
            NodeKind::RuntimeVariables(variables) => variables
                .iter()
                .try_for_each(|v| self.reference(v, StorageKind::HOISTED | StorageKind::BOXED, node.id())),
            NodeKind::Assign { target, value } => {
                match target.kind() {
                    NodeKind::Variable(v) => self.reference(v, StorageKind::LOCAL, target.id())?,
                    _ => {
                        return Err(CompileError::UnexpectedNode {
                            kind: target.kind_name(),
                            node: target.id(),
                        })
                    }
                }
                self.visit(value)
            }
            NodeKind::Throw(_)
            | NodeKind::Invoke { .. }
            | NodeKind::Binary { .. }
            | NodeKind::Unary { .. }
            | NodeKind::Conditional { .. }
            | NodeKind::Loop { .. } => node.children().into_iter().try_for_each(|c| self.visit(c)),
            _ => Err(CompileError::UnexpectedNode {
                kind: node.kind_name(),
                node: node.id(),
            }),
        }
    }

    fn visit_handler(&mut self, handler: &Node) -> Result<(), CompileError> {
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

        let declared: Vec<Variable> = variable.iter().cloned().collect();
        self.enter(handler, ScopeKind::Catch, &declared)?;
        let result = filter
            .iter()
            .chain(Some(body))
            .try_for_each(|expr| self.visit(expr));
        self.exit();
        result
    }
}

/// Analyze `root`. When `outer` is given, a synthetic scope declaring it
/// encloses the tree, and every nested function literal outside a quote
/// references it.
pub fn analyze_with(
    root: &Node,
    outer: Option<&Variable>,
    options: &CompileOptions,
) -> Result<ScopeMap, CompileError> {
    ScopeAnalyzer::new(root, outer, options).run(root)
}

/// [`analyze_with`] under default options
pub fn analyze(root: &Node, outer: Option<&Variable>) -> Result<ScopeMap, CompileError> {
    analyze_with(root, outer, &CompileOptions::default())
}

#[cfg(test)]
mod tests {
    use super::*;
    use framejit_ir::{lower, reduce, BinaryOp, Literal};
    use framejit_types::Type;

    fn lowered(source: &str) -> Node {
        reduce(&lower(&framejit_parser::parse(source).unwrap()).unwrap().root)
    }

    fn scope_of<'a>(map: &'a ScopeMap, node: &Node) -> &'a Scope {
        map.get(node.id()).expect("scope")
    }

    fn block_parts(node: &Node) -> (&[Variable], &[Node]) {
        match node.kind() {
            NodeKind::Block { variables, body } => (variables, body),
            _ => panic!("expected block"),
        }
    }

    #[test]
    fn test_plain_locals_stay_local() {
        let root = lowered("(block ((x int)) (set! x 1) (+ x 2))");
        let map = analyze(&root, None).unwrap();
        let scope = scope_of(&map, &root);
        assert!(!scope.has_hoisted_locals());
        assert!(!scope.needs_closure);
        assert_eq!(scope.storage(&block_parts(&root).0[0]), Some(StorageKind::LOCAL));
    }

    #[test]
    fn test_lambda_capture_hoists() {
        let root = lowered("(block ((x int)) (lambda () x))");
        let map = analyze(&root, None).unwrap();
        let (vars, body) = block_parts(&root);

        assert_eq!(scope_of(&map, &root).storage(&vars[0]), Some(StorageKind::HOISTED));
        assert!(scope_of(&map, &root).has_hoisted_locals());
        assert!(scope_of(&map, &body[0]).needs_closure);
        assert!(!scope_of(&map, &root).needs_closure);
    }

    #[test]
    fn test_quote_capture_boxes() {
        let root = lowered("(block ((x int)) (quote (lambda () x)))");
        let map = analyze(&root, None).unwrap();
        let (vars, body) = block_parts(&root);

        let storage = scope_of(&map, &root).storage(&vars[0]).unwrap();
        assert!(storage.is_boxed() && storage.is_hoisted());
        let marker = scope_of(&map, &body[0]);
        assert_eq!(marker.kind, ScopeKind::Quote);
        assert!(marker.variables().is_empty());
    }

    #[test]
    fn test_runtime_variables_box_in_place() {
        let root = lowered("(block ((x int) (y int)) (runtime-variables x))");
        let map = analyze(&root, None).unwrap();
        let (vars, _) = block_parts(&root);
        let scope = scope_of(&map, &root);

        assert!(scope.storage(&vars[0]).unwrap().is_boxed());
        assert!(scope.storage(&vars[1]).unwrap().is_local());
        assert_eq!(scope.hoisted().count(), 1);
        assert_eq!(scope.locals().count(), 1);
    }

    #[test]
    fn test_storage_is_union_of_uses() {
        // x captured by a lambda and exposed reflectively; the order of the
        // two uses does not matter.
        for source in [
            "(block ((x int)) (lambda () x) (runtime-variables x))",
            "(block ((x int)) (runtime-variables x) (lambda () x))",
        ] {
            let root = lowered(source);
            let map = analyze(&root, None).unwrap();
            let (vars, _) = block_parts(&root);
            assert_eq!(
                scope_of(&map, &root).storage(&vars[0]),
                Some(StorageKind::HOISTED | StorageKind::BOXED)
            );
        }
    }

    #[test]
    fn test_intermediate_scopes_need_closure() {
        let root = lowered("(block ((x int)) (lambda () (block ((y int)) (lambda () (+ x y)))))");
        let map = analyze(&root, None).unwrap();
        let (_, body) = block_parts(&root);
        let NodeKind::Lambda { body: inner_block, .. } = body[0].kind() else {
            panic!("expected lambda");
        };

        let block_scope = scope_of(&map, inner_block);
        assert!(block_scope.needs_closure);
        assert!(block_scope.has_hoisted_locals());
        assert!(scope_of(&map, &body[0]).needs_closure);
        assert!(!scope_of(&map, &body[0]).has_hoisted_locals());
    }

    #[test]
    fn test_scope_parents_skip_quotes() {
        let root = lowered("(block ((x int)) (quote (lambda () x)))");
        let map = analyze(&root, None).unwrap();
        let (_, body) = block_parts(&root);
        let NodeKind::Quote(lambda) = body[0].kind() else {
            panic!("expected quote");
        };
        assert_eq!(scope_of(&map, lambda).parent, Some(root.id()));
    }

    #[test]
    fn test_unbound_variable() {
        let root = lowered("(lambda () (+ y 1))");
        let err = analyze(&root, None).unwrap_err();
        assert!(matches!(err, CompileError::UnboundVariable { ref variable, .. } if variable.name() == "y"));
    }

    #[test]
    fn test_by_ref_capture_is_rejected() {
        let root = lowered("(lambda ((r int ref)) (lambda () r))");
        let err = analyze(&root, None).unwrap_err();
        assert!(matches!(err, CompileError::ByRefCapture { .. }));

        let root = lowered("(lambda ((r int ref)) (set! r 2) r)");
        assert!(analyze(&root, None).is_ok());
    }

    #[test]
    fn test_outer_variable_hoists_only_from_nested_lambdas() {
        let outer = Variable::new("methods", Type::MethodTable);

        let root = lowered("(lambda () (lambda () 1))");
        let map = analyze(&root, Some(&outer)).unwrap();
        assert_eq!(map.outer().unwrap().storage(&outer), Some(StorageKind::LOCAL));

        let root = lowered("(lambda () (lambda () (lambda () 1)))");
        let map = analyze(&root, Some(&outer)).unwrap();
        assert_eq!(map.outer().unwrap().storage(&outer), Some(StorageKind::HOISTED));
    }

    #[test]
    fn test_shared_scope_is_analyzed_once() {
        let x = Variable::new("x", Type::Int);
        let y = Variable::new("y", Type::Int);
        let shared = Node::block(vec![y.clone()], vec![Node::variable(&x), Node::variable(&y)]);
        let root = Node::block(
            vec![x.clone()],
            vec![
                shared.clone(),
                Node::lambda(None, vec![], shared.clone()),
            ],
        );

        let map = analyze(&root, None).unwrap();
        assert_eq!(map.len(), 3);
        assert_eq!(scope_of(&map, &root).storage(&x), Some(StorageKind::HOISTED));
        assert_eq!(scope_of(&map, &shared).storage(&y), Some(StorageKind::LOCAL));
        assert!(scope_of(&map, &shared).needs_closure);
    }

    #[test]
    fn test_shared_scope_keeps_first_parent() {
        let y = Variable::new("y", Type::Int);
        let shared = Node::block(vec![y.clone()], vec![Node::variable(&y)]);
        let lambda = Node::lambda(None, vec![], shared.clone());

        let root = Node::block(vec![], vec![shared.clone(), lambda.clone()]);
        let map = analyze(&root, None).unwrap();
        assert_eq!(scope_of(&map, &shared).parent, Some(root.id()));

        let root = Node::block(vec![], vec![lambda.clone(), shared.clone()]);
        let map = analyze(&root, None).unwrap();
        assert_eq!(scope_of(&map, &shared).parent, Some(lambda.id()));
    }

    #[test]
    fn test_unreduced_nodes_are_rejected() {
        let x = Variable::new("x", Type::Int);
        let root = Node::block(
            vec![x.clone()],
            vec![Node::compound_assign(BinaryOp::Add, x, Node::constant(Literal::Int(1)), None)],
        );
        let err = analyze(&root, None).unwrap_err();
        assert!(matches!(err, CompileError::UnexpectedNode { kind: "set!op", .. }));
    }

    #[test]
    fn test_depth_limit() {
        let mut node = Node::constant(Literal::Int(0));
        for _ in 0..20 {
            node = Node::unary(framejit_ir::UnaryOp::Neg, node);
        }
        let options = CompileOptions::default().with_max_depth(10);
        let err = analyze_with(&node, None, &options).unwrap_err();
        assert!(matches!(err, CompileError::DepthLimitExceeded { limit: 10, .. }));
        assert!(analyze(&node, None).is_ok());
    }
}
