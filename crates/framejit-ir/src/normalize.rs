//! Normalizer
//!
//! Rewrites the high-level node shapes closure conversion does not accept
//! into the core node set:
//!
//! - `CompoundAssign(op, t, v, conv)` becomes `t = conv(t op v)`
//! - `Coalesce(l, r, conv)` becomes a block that evaluates `l` once into a
//!   temporary and picks `r` or `conv(tmp)`
//! - `Logical` becomes a `Conditional`
//!
//! The conversion function of the first two shapes would otherwise sit in a
//! position where replacing it with a materialized thunk does not type
//! check; after reduction it is an ordinary invoked literal.
//!
//! Reduction is memoized by node identity, so shared sub-trees stay shared,
//! and a node with nothing to reduce is returned as is. Consequently
//! `reduce(&reduce(t))` hands back the very node `reduce(t)` produced.

use std::collections::HashMap;
use std::convert::Infallible;

use framejit_types::{NodeId, Type};

use crate::ir::{BinaryOp, Literal, LogicalOp, Node, NodeKind, Variable};

/// Reduce `root` to the core node set. Recursion follows the tree's depth;
/// bound it with [`deeper_than`](crate::visit::deeper_than) first when the
/// input is untrusted.
pub fn reduce(root: &Node) -> Node {
    let mut normalizer = Normalizer::default();
    let reduced = normalizer.reduce(root);
    log::debug!(
        "normalizer: {} node(s) visited, {} reduction(s)",
        normalizer.memo.len(),
        normalizer.reductions
    );
    reduced
}

#[derive(Default)]
struct Normalizer {
    memo: HashMap<NodeId, Node>,
    reductions: usize,
}

impl Normalizer {
    fn reduce(&mut self, node: &Node) -> Node {
        if let Some(done) = self.memo.get(&node.id()) {
            return done.clone();
        }

        let children = match node.map_children(|child| Ok::<_, Infallible>(self.reduce(child))) {
            Ok(n) => n,
            Err(never) => match never {},
        };
        let rewritten = match children.kind() {
            NodeKind::CompoundAssign {
                op,
                target,
                value,
                conversion,
            } => Some(compound_assign(*op, target, value, conversion.as_ref())),
            NodeKind::Coalesce {
                left,
                right,
                conversion,
            } => Some(coalesce(left, right, conversion.as_ref(), children.ty())),
            NodeKind::Logical { op, left, right } => Some(logical(*op, left, right)),
            _ => None,
        };
        if rewritten.is_some() {
            self.reductions += 1;
        }
        let reduced = rewritten.unwrap_or(children);

        self.memo.insert(node.id(), reduced.clone());
        self.memo.insert(reduced.id(), reduced.clone());
        reduced
    }
}

fn compound_assign(op: BinaryOp, target: &Variable, value: &Node, conversion: Option<&Node>) -> Node {
    let combined = Node::binary(op, Node::variable(target), value.clone());
    let converted = match conversion {
        Some(conv) => Node::invoke(conv.clone(), vec![combined]),
        None => combined,
    };
    Node::assign(Node::variable(target), converted)
}

fn coalesce(left: &Node, right: &Node, conversion: Option<&Node>, ty: &Type) -> Node {
    let tmp = Variable::new("coalesce", left.ty().clone());
    let non_null = match conversion {
        Some(conv) => Node::invoke(conv.clone(), vec![Node::variable(&tmp)]),
        None => Node::variable(&tmp),
    };
    let is_null = Node::binary(
        BinaryOp::Eq,
        Node::variable(&tmp),
        Node::constant(Literal::Null),
    );
    let pick = Node::with_type(
        NodeKind::Conditional {
            test: is_null,
            then: right.clone(),
            otherwise: Some(non_null),
        },
        ty.clone(),
    );
    Node::block(
        vec![tmp.clone()],
        vec![Node::assign(Node::variable(&tmp), left.clone()), pick],
    )
}

fn logical(op: LogicalOp, left: &Node, right: &Node) -> Node {
    match op {
        LogicalOp::And => Node::with_type(
            NodeKind::Conditional {
                test: left.clone(),
                then: right.clone(),
                otherwise: Some(Node::constant(Literal::Bool(false))),
            },
            Type::Bool,
        ),
        LogicalOp::Or => Node::with_type(
            NodeKind::Conditional {
                test: left.clone(),
                then: Node::constant(Literal::Bool(true)),
                otherwise: Some(right.clone()),
            },
            Type::Bool,
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn contains_reducible(node: &Node) -> bool {
        node.is_reducible() || node.children().into_iter().any(contains_reducible)
    }

    fn sample() -> Node {
        let x = Variable::new("x", Type::Int);
        let s = Variable::new("s", Type::Any);
        let n = Variable::new("n", Type::Int);
        let conv = Node::lambda(None, vec![n.clone()], Node::variable(&n));
        Node::block(
            vec![x.clone(), s.clone()],
            vec![
                Node::compound_assign(BinaryOp::Add, x.clone(), Node::constant(Literal::Int(2)), Some(conv)),
                Node::coalesce(Node::variable(&s), Node::constant(Literal::Int(0)), None),
                Node::logical(
                    LogicalOp::Or,
                    Node::constant(Literal::Bool(false)),
                    Node::constant(Literal::Bool(true)),
                ),
            ],
        )
    }

    #[test]
    fn test_reduces_all_shapes() {
        let reduced = reduce(&sample());
        assert!(!contains_reducible(&reduced));

        let NodeKind::Block { body, .. } = reduced.kind() else {
            panic!("expected block");
        };
        assert!(matches!(body[0].kind(), NodeKind::Assign { value, .. }
            if matches!(value.kind(), NodeKind::Invoke { .. })));
        assert!(matches!(body[1].kind(), NodeKind::Block { variables, .. } if variables.len() == 1));
        assert!(matches!(body[2].kind(), NodeKind::Conditional { .. }));
    }

    #[test]
    fn test_reduce_is_idempotent() {
        let once = reduce(&sample());
        let twice = reduce(&once);
        assert!(twice.ptr_eq(&once));
    }

    #[test]
    fn test_unchanged_tree_is_returned_as_is() {
        let x = Variable::new("x", Type::Int);
        let tree = Node::block(vec![x.clone()], vec![Node::variable(&x)]);
        assert!(reduce(&tree).ptr_eq(&tree));
    }

    #[test]
    fn test_sharing_is_preserved() {
        let x = Variable::new("x", Type::Bool);
        let shared = Node::logical(LogicalOp::And, Node::variable(&x), Node::variable(&x));
        let tree = Node::block(vec![x.clone()], vec![shared.clone(), shared]);

        let reduced = reduce(&tree);
        let NodeKind::Block { body, .. } = reduced.kind() else {
            panic!("expected block");
        };
        assert!(body[0].ptr_eq(&body[1]));
    }
}
