//! Tree queries shared by the compiler passes and the executor.

use std::collections::{HashMap, HashSet};

use framejit_types::NodeId;

use crate::ir::{Node, NodeKind, Variable};

/// Variables referenced under `node` but declared outside it, in order of
/// first reference.
pub fn free_variables(node: &Node) -> Vec<Variable> {
    let mut collector = FreeVariables::default();
    collector.visit(node);
    collector.found
}

#[derive(Default)]
struct FreeVariables {
    bound: Vec<Variable>,
    seen: HashSet<Variable>,
    found: Vec<Variable>,
}

impl FreeVariables {
    fn reference(&mut self, variable: &Variable) {
        if !self.bound.contains(variable) && self.seen.insert(variable.clone()) {
            self.found.push(variable.clone());
        }
    }

    fn with_bound(&mut self, variables: &[Variable], f: impl FnOnce(&mut Self)) {
        let mark = self.bound.len();
        self.bound.extend(variables.iter().cloned());
        f(self);
        self.bound.truncate(mark);
    }

    fn visit(&mut self, node: &Node) {
        match node.kind() {
            NodeKind::Variable(v) => self.reference(v),
            NodeKind::RuntimeVariables(vars) => {
                for v in vars {
                    self.reference(v);
                }
            }
            NodeKind::CompoundAssign { target, .. } => {
                self.reference(target);
                for child in node.children() {
                    self.visit(child);
                }
            }
            NodeKind::Lambda { params, body, .. } => {
                self.with_bound(params, |this| this.visit(body));
            }
            NodeKind::Block { variables, body } => {
                self.with_bound(variables, |this| {
                    for expr in body {
                        this.visit(expr);
                    }
                });
            }
            NodeKind::Catch {
                variable,
                filter,
                body,
            } => {
                let declared: Vec<Variable> = variable.iter().cloned().collect();
                self.with_bound(&declared, |this| {
                    if let Some(filter) = filter {
                        this.visit(filter);
                    }
                    this.visit(body);
                });
            }
            // The operand's free variables live in the frame chain.
            NodeKind::FramedQuote { frame, .. } => self.visit(frame),
            _ => {
                for child in node.children() {
                    self.visit(child);
                }
            }
        }
    }
}

/// First node found more than `limit` levels below `root`, counting the
/// root as level 1. Walks an explicit stack, so trees of any depth can be
/// measured before a recursive pass runs over them. Shared nodes are
/// measured at the deepest level they occur.
pub fn deeper_than(root: &Node, limit: usize) -> Option<Node> {
    let mut deepest: HashMap<NodeId, usize> = HashMap::new();
    let mut stack = vec![(root.clone(), 1usize)];
    while let Some((node, level)) = stack.pop() {
        if level > limit {
            return Some(node);
        }
        if deepest.get(&node.id()).map_or(false, |&seen| seen >= level) {
            continue;
        }
        deepest.insert(node.id(), level);
        stack.extend(node.children().into_iter().map(|child| (child.clone(), level + 1)));
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{BinaryOp, Literal, UnaryOp};
    use framejit_types::Type;

    #[test]
    fn test_free_variables_skip_declared() {
        let x = Variable::new("x", Type::Int);
        let y = Variable::new("y", Type::Int);
        let z = Variable::new("z", Type::Int);

        // (lambda ((x int)) (block ((y int)) (+ x (+ y z)) z))
        let body = Node::block(
            vec![y.clone()],
            vec![
                Node::binary(
                    BinaryOp::Add,
                    Node::variable(&x),
                    Node::binary(BinaryOp::Add, Node::variable(&y), Node::variable(&z)),
                ),
                Node::variable(&z),
            ],
        );
        let lambda = Node::lambda(None, vec![x.clone()], body.clone());

        assert_eq!(free_variables(&lambda), vec![z.clone()]);
        assert_eq!(free_variables(&body), vec![x, z]);
    }

    #[test]
    fn test_catch_variable_is_bound() {
        let e = Variable::new("e", Type::Any);
        let handler = Node::catch(Some(e.clone()), None, Node::variable(&e));
        assert!(free_variables(&handler).is_empty());
    }

    #[test]
    fn test_deeper_than_finds_the_first_node_past_the_limit() {
        let leaf = Node::constant(Literal::Int(0));
        let mut node = leaf.clone();
        for _ in 0..4 {
            node = Node::unary(UnaryOp::Neg, node);
        }
        assert!(deeper_than(&node, 5).is_none());
        assert_eq!(deeper_than(&node, 4).map(|n| n.id()), Some(leaf.id()));
    }

    #[test]
    fn test_deeper_than_measures_shared_nodes_at_their_deepest_use() {
        let shared = Node::unary(UnaryOp::Neg, Node::constant(Literal::Int(1)));
        let root = Node::block(vec![], vec![shared.clone(), Node::unary(UnaryOp::Not, shared)]);
        assert!(deeper_than(&root, 4).is_none());
        assert!(deeper_than(&root, 3).is_some());
    }

    #[test]
    fn test_deeper_than_handles_long_chains() {
        let mut node = Node::constant(Literal::Int(0));
        for _ in 0..20_000 {
            node = Node::unary(UnaryOp::Neg, node);
        }
        assert!(deeper_than(&node, 512).is_some());
        assert!(deeper_than(&node, 20_001).is_none());
    }

    #[test]
    fn test_framed_quote_hides_operand() {
        let x = Variable::new("x", Type::Int);
        let frame = Variable::new("frame", Type::Unit);
        let quoted = Node::lambda(None, vec![], Node::variable(&x));
        let node = Node::framed_quote(quoted.clone(), Node::variable(&frame), None);
        assert_eq!(free_variables(&node), vec![frame]);
        assert_eq!(free_variables(&Node::quote(quoted)), vec![x]);
    }
}
