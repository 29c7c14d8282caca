//! IR definitions
//!
//! Nodes are immutable and reference counted, so one node may appear under
//! several parents (the tree is a DAG). Identity, not structure, is what
//! side tables key on: every node and every variable carries a process-wide
//! unique id.

use framejit_types::{FunctionType, NodeId, ThunkType, Type, VarId};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::frame::FrameLayout;

static NEXT_NODE_ID: AtomicU64 = AtomicU64::new(1);
static NEXT_VAR_ID: AtomicU64 = AtomicU64::new(1);

/// A variable declaration site. Compared by identity, never by name.
#[derive(Clone)]
pub struct Variable(Arc<VariableData>);

#[derive(Debug)]
pub struct VariableData {
    pub id: VarId,
    pub name: String,
    pub ty: Type,
    /// Declared as an aliasing (by-reference) parameter
    pub by_ref: bool,
}

impl Variable {
    pub fn new(name: impl Into<String>, ty: Type) -> Self {
        Self::with_mode(name, ty, false)
    }

    /// A by-reference parameter: writes inside the callee are visible to
    /// the caller's argument variable.
    pub fn by_ref(name: impl Into<String>, ty: Type) -> Self {
        Self::with_mode(name, ty, true)
    }

    fn with_mode(name: impl Into<String>, ty: Type, by_ref: bool) -> Self {
        Variable(Arc::new(VariableData {
            id: NEXT_VAR_ID.fetch_add(1, Ordering::Relaxed),
            name: name.into(),
            ty,
            by_ref,
        }))
    }

    pub fn id(&self) -> VarId {
        self.0.id
    }

    pub fn name(&self) -> &str {
        &self.0.name
    }

    pub fn ty(&self) -> &Type {
        &self.0.ty
    }

    pub fn is_by_ref(&self) -> bool {
        self.0.by_ref
    }
}

impl PartialEq for Variable {
    fn eq(&self, other: &Self) -> bool {
        self.0.id == other.0.id
    }
}

impl Eq for Variable {}

impl std::hash::Hash for Variable {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.0.id.hash(state);
    }
}

impl fmt::Debug for Variable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.0.name, self.0.id)
    }
}

/// Literal values
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Unit,
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
}

impl Literal {
    pub fn ty(&self) -> Type {
        match self {
            Literal::Unit => Type::Unit,
            Literal::Null => Type::Any,
            Literal::Bool(_) => Type::Bool,
            Literal::Int(_) => Type::Int,
            Literal::Float(_) => Type::Float,
            Literal::String(_) => Type::String,
        }
    }
}

/// Binary operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl BinaryOp {
    pub fn is_comparison(&self) -> bool {
        matches!(
            self,
            BinaryOp::Eq | BinaryOp::Ne | BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge
        )
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Rem => "%",
            BinaryOp::Eq => "==",
            BinaryOp::Ne => "!=",
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Ge => ">=",
        }
    }

    pub fn from_symbol(symbol: &str) -> Option<BinaryOp> {
        Some(match symbol {
            "+" => BinaryOp::Add,
            "-" => BinaryOp::Sub,
            "*" => BinaryOp::Mul,
            "/" => BinaryOp::Div,
            "%" => BinaryOp::Rem,
            "==" => BinaryOp::Eq,
            "!=" => BinaryOp::Ne,
            "<" => BinaryOp::Lt,
            "<=" => BinaryOp::Le,
            ">" => BinaryOp::Gt,
            ">=" => BinaryOp::Ge,
            _ => return None,
        })
    }

    /// Result type of applying this operator to operands of the given types
    pub fn result_type(&self, left: &Type, right: &Type) -> Type {
        if self.is_comparison() {
            return Type::Bool;
        }
        match (left, right) {
            (Type::Int, Type::Int) => Type::Int,
            (Type::Float, Type::Float) | (Type::Int, Type::Float) | (Type::Float, Type::Int) => {
                Type::Float
            }
            (Type::String, Type::String) if *self == BinaryOp::Add => Type::String,
            _ => Type::Any,
        }
    }
}

/// Unary operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnaryOp {
    Neg,
    Not,
}

/// Short-circuit operators (reduced to conditionals by the normalizer)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LogicalOp {
    And,
    Or,
}

/// An IR node. Cloning is cheap and preserves identity.
#[derive(Clone)]
pub struct Node(Arc<NodeData>);

#[derive(Debug)]
pub struct NodeData {
    pub id: NodeId,
    pub ty: Type,
    pub kind: NodeKind,
}

#[derive(Debug, Clone)]
pub enum NodeKind {
    // Core node set accepted by scope analysis
    Constant(Literal),
    Variable(Variable),
    /// Function literal
    Lambda {
        name: Option<String>,
        params: Vec<Variable>,
        body: Node,
    },
    /// Lexical block: declared variables and an ordered expression sequence
    Block {
        variables: Vec<Variable>,
        body: Vec<Node>,
    },
    /// Exception handler, only valid as a handler of `Try`
    Catch {
        variable: Option<Variable>,
        filter: Option<Node>,
        body: Node,
    },
    Try {
        body: Node,
        handlers: Vec<Node>,
        finally: Option<Node>,
    },
    Throw(Node),
    /// Unevaluated function literal
    Quote(Node),
    /// Reflective access to a list of variables
    RuntimeVariables(Vec<Variable>),
    Invoke {
        callee: Node,
        args: Vec<Node>,
    },
    Binary {
        op: BinaryOp,
        left: Node,
        right: Node,
    },
    Unary {
        op: UnaryOp,
        operand: Node,
    },
    Conditional {
        test: Node,
        then: Node,
        otherwise: Option<Node>,
    },
    Loop {
        test: Node,
        body: Node,
    },
    /// Write `value` into `target` (a variable, frame field or cell)
    Assign {
        target: Node,
        value: Node,
    },
    /// Default value of a type
    Default,

    // Reducible shapes, removed by the normalizer
    /// `target op= value`, optionally passing the result through `conversion`
    CompoundAssign {
        op: BinaryOp,
        target: Variable,
        value: Node,
        conversion: Option<Node>,
    },
    /// `left ?? right`, optionally passing a non-null `left` through `conversion`
    Coalesce {
        left: Node,
        right: Node,
        conversion: Option<Node>,
    },
    Logical {
        op: LogicalOp,
        left: Node,
        right: Node,
    },

    // Produced by closure conversion only
    /// Allocate a frame with the given layout; all slots start empty
    NewFrame(Arc<FrameLayout>),
    /// Slot of a frame value
    Field {
        frame: Node,
        slot: usize,
    },
    /// Allocate a fresh cell holding `value`
    NewBox(Node),
    /// Contents of a cell
    BoxValue(Node),
    /// `table[index]`, checked against `thunk`, materialized with `frame`
    MaterializeThunk {
        table: Node,
        index: usize,
        thunk: ThunkType,
        frame: Node,
    },
    /// Reflective view over cells reached from `frame`; each entry is an
    /// encoded `(hops, slot)` pair
    RuntimeVariablesView {
        frame: Node,
        slots: Vec<u64>,
    },
    /// A quoted literal paired with the frame chain its free variables
    /// resolve against
    FramedQuote {
        operand: Node,
        frame: Node,
        layout: Option<Arc<FrameLayout>>,
    },
}

impl Node {
    /// Create a node with an explicit type
    pub fn with_type(kind: NodeKind, ty: Type) -> Self {
        Node(Arc::new(NodeData {
            id: NEXT_NODE_ID.fetch_add(1, Ordering::Relaxed),
            ty,
            kind,
        }))
    }

    pub fn id(&self) -> NodeId {
        self.0.id
    }

    pub fn ty(&self) -> &Type {
        &self.0.ty
    }

    pub fn kind(&self) -> &NodeKind {
        &self.0.kind
    }

    /// Same node (identity, not structure)
    pub fn ptr_eq(&self, other: &Node) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    pub fn constant(literal: Literal) -> Self {
        let ty = literal.ty();
        Self::with_type(NodeKind::Constant(literal), ty)
    }

    pub fn unit() -> Self {
        Self::constant(Literal::Unit)
    }

    pub fn variable(variable: &Variable) -> Self {
        Self::with_type(NodeKind::Variable(variable.clone()), variable.ty().clone())
    }

    pub fn lambda(name: Option<String>, params: Vec<Variable>, body: Node) -> Self {
        let ty = Type::Function(FunctionType::new(
            params.iter().map(|p| p.ty().clone()).collect(),
            body.ty().clone(),
        ));
        Self::with_type(NodeKind::Lambda { name, params, body }, ty)
    }

    pub fn block(variables: Vec<Variable>, body: Vec<Node>) -> Self {
        let ty = body.last().map(|n| n.ty().clone()).unwrap_or(Type::Unit);
        Self::with_type(NodeKind::Block { variables, body }, ty)
    }

    pub fn catch(variable: Option<Variable>, filter: Option<Node>, body: Node) -> Self {
        let ty = body.ty().clone();
        Self::with_type(
            NodeKind::Catch {
                variable,
                filter,
                body,
            },
            ty,
        )
    }

    pub fn try_catch(body: Node, handlers: Vec<Node>, finally: Option<Node>) -> Self {
        let ty = handlers
            .iter()
            .fold(body.ty().clone(), |acc, h| acc.join(h.ty()));
        Self::with_type(
            NodeKind::Try {
                body,
                handlers,
                finally,
            },
            ty,
        )
    }

    pub fn throw(value: Node, ty: Type) -> Self {
        Self::with_type(NodeKind::Throw(value), ty)
    }

    pub fn quote(lambda: Node) -> Self {
        let ty = Type::Quoted(Box::new(lambda.ty().clone()));
        Self::with_type(NodeKind::Quote(lambda), ty)
    }

    pub fn runtime_variables(variables: Vec<Variable>) -> Self {
        Self::with_type(NodeKind::RuntimeVariables(variables), Type::RuntimeVariables)
    }

    pub fn invoke(callee: Node, args: Vec<Node>) -> Self {
        let ty = callee
            .ty()
            .as_function()
            .map(|f| (*f.return_type).clone())
            .unwrap_or(Type::Any);
        Self::with_type(NodeKind::Invoke { callee, args }, ty)
    }

    pub fn binary(op: BinaryOp, left: Node, right: Node) -> Self {
        let ty = op.result_type(left.ty(), right.ty());
        Self::with_type(NodeKind::Binary { op, left, right }, ty)
    }

    pub fn unary(op: UnaryOp, operand: Node) -> Self {
        let ty = match op {
            UnaryOp::Not => Type::Bool,
            UnaryOp::Neg => operand.ty().clone(),
        };
        Self::with_type(NodeKind::Unary { op, operand }, ty)
    }

    pub fn conditional(test: Node, then: Node, otherwise: Option<Node>) -> Self {
        let ty = match &otherwise {
            Some(other) => then.ty().join(other.ty()),
            None => Type::Unit,
        };
        Self::with_type(
            NodeKind::Conditional {
                test,
                then,
                otherwise,
            },
            ty,
        )
    }

    pub fn loop_while(test: Node, body: Node) -> Self {
        Self::with_type(NodeKind::Loop { test, body }, Type::Unit)
    }

    pub fn assign(target: Node, value: Node) -> Self {
        let ty = value.ty().clone();
        Self::with_type(NodeKind::Assign { target, value }, ty)
    }

    pub fn default_of(ty: Type) -> Self {
        Self::with_type(NodeKind::Default, ty)
    }

    pub fn compound_assign(
        op: BinaryOp,
        target: Variable,
        value: Node,
        conversion: Option<Node>,
    ) -> Self {
        let ty = target.ty().clone();
        Self::with_type(
            NodeKind::CompoundAssign {
                op,
                target,
                value,
                conversion,
            },
            ty,
        )
    }

    pub fn coalesce(left: Node, right: Node, conversion: Option<Node>) -> Self {
        let ty = match &conversion {
            Some(conv) => match conv.ty().as_function() {
                Some(f) => f.return_type.join(right.ty()),
                None => Type::Any,
            },
            None => left.ty().join(right.ty()),
        };
        Self::with_type(
            NodeKind::Coalesce {
                left,
                right,
                conversion,
            },
            ty,
        )
    }

    pub fn logical(op: LogicalOp, left: Node, right: Node) -> Self {
        Self::with_type(NodeKind::Logical { op, left, right }, Type::Bool)
    }

    pub fn new_frame(layout: Arc<FrameLayout>) -> Self {
        let ty = layout.record_type();
        Self::with_type(NodeKind::NewFrame(layout), ty)
    }

    pub fn field(frame: Node, slot: usize) -> Self {
        let ty = frame
            .ty()
            .as_record()
            .and_then(|record| record.field(slot))
            .map(|field| field.ty.clone())
            .unwrap_or(Type::Any);
        Self::with_type(NodeKind::Field { frame, slot }, ty)
    }

    pub fn new_box(value: Node) -> Self {
        let ty = Type::strong_box(value.ty().clone());
        Self::with_type(NodeKind::NewBox(value), ty)
    }

    pub fn box_value(cell: Node) -> Self {
        let ty = match cell.ty() {
            Type::StrongBox(inner) => (**inner).clone(),
            _ => Type::Any,
        };
        Self::with_type(NodeKind::BoxValue(cell), ty)
    }

    pub fn materialize_thunk(table: Node, index: usize, thunk: ThunkType, frame: Node) -> Self {
        let ty = Type::Function(thunk.function.clone());
        Self::with_type(
            NodeKind::MaterializeThunk {
                table,
                index,
                thunk,
                frame,
            },
            ty,
        )
    }

    pub fn runtime_variables_view(frame: Node, slots: Vec<u64>) -> Self {
        Self::with_type(
            NodeKind::RuntimeVariablesView { frame, slots },
            Type::RuntimeVariables,
        )
    }

    pub fn framed_quote(operand: Node, frame: Node, layout: Option<Arc<FrameLayout>>) -> Self {
        let ty = Type::Quoted(Box::new(operand.ty().clone()));
        Self::with_type(
            NodeKind::FramedQuote {
                operand,
                frame,
                layout,
            },
            ty,
        )
    }

    /// Whether this node introduces a scope that declares variables
    pub fn is_scope(&self) -> bool {
        matches!(
            self.kind(),
            NodeKind::Lambda { .. } | NodeKind::Block { .. } | NodeKind::Catch { .. }
        )
    }

    /// Whether this node is one of the shapes the normalizer removes
    pub fn is_reducible(&self) -> bool {
        matches!(
            self.kind(),
            NodeKind::CompoundAssign { .. } | NodeKind::Coalesce { .. } | NodeKind::Logical { .. }
        )
    }

    /// Whether this node only appears in closure-converted output
    pub fn is_converted(&self) -> bool {
        matches!(
            self.kind(),
            NodeKind::NewFrame(_)
                | NodeKind::Field { .. }
                | NodeKind::NewBox(_)
                | NodeKind::BoxValue(_)
                | NodeKind::MaterializeThunk { .. }
                | NodeKind::RuntimeVariablesView { .. }
                | NodeKind::FramedQuote { .. }
        )
    }

    /// Short kind name for messages
    pub fn kind_name(&self) -> &'static str {
        match self.kind() {
            NodeKind::Constant(_) => "constant",
            NodeKind::Variable(_) => "variable",
            NodeKind::Lambda { .. } => "lambda",
            NodeKind::Block { .. } => "block",
            NodeKind::Catch { .. } => "catch",
            NodeKind::Try { .. } => "try",
            NodeKind::Throw(_) => "throw",
            NodeKind::Quote(_) => "quote",
            NodeKind::RuntimeVariables(_) => "runtime-variables",
            NodeKind::Invoke { .. } => "call",
            NodeKind::Binary { .. } => "binary",
            NodeKind::Unary { .. } => "unary",
            NodeKind::Conditional { .. } => "if",
            NodeKind::Loop { .. } => "while",
            NodeKind::Assign { .. } => "set!",
            NodeKind::Default => "default",
            NodeKind::CompoundAssign { .. } => "set!op",
            NodeKind::Coalesce { .. } => "??",
            NodeKind::Logical { .. } => "logical",
            NodeKind::NewFrame(_) => "new-frame",
            NodeKind::Field { .. } => "field",
            NodeKind::NewBox(_) => "new-box",
            NodeKind::BoxValue(_) => "unbox",
            NodeKind::MaterializeThunk { .. } => "materialize",
            NodeKind::RuntimeVariablesView { .. } => "runtime-variables-view",
            NodeKind::FramedQuote { .. } => "framed-quote",
        }
    }

    /// Direct child nodes, in evaluation order
    pub fn children(&self) -> Vec<&Node> {
        match self.kind() {
            NodeKind::Constant(_)
            | NodeKind::Variable(_)
            | NodeKind::RuntimeVariables(_)
            | NodeKind::Default
            | NodeKind::NewFrame(_) => Vec::new(),
            NodeKind::Lambda { body, .. } => vec![body],
            NodeKind::Block { body, .. } => body.iter().collect(),
            NodeKind::Catch { filter, body, .. } => filter.iter().chain(Some(body)).collect(),
            NodeKind::Try {
                body,
                handlers,
                finally,
            } => Some(body)
                .into_iter()
                .chain(handlers.iter())
                .chain(finally.iter())
                .collect(),
            NodeKind::Throw(value) | NodeKind::Quote(value) => vec![value],
            NodeKind::Invoke { callee, args } => Some(callee).into_iter().chain(args.iter()).collect(),
            NodeKind::Binary { left, right, .. } | NodeKind::Logical { left, right, .. } => {
                vec![left, right]
            }
            NodeKind::Unary { operand, .. } => vec![operand],
            NodeKind::Conditional {
                test,
                then,
                otherwise,
            } => vec![test, then].into_iter().chain(otherwise.iter()).collect(),
            NodeKind::Loop { test, body } => vec![test, body],
            NodeKind::Assign { target, value } => vec![target, value],
            NodeKind::CompoundAssign {
                value, conversion, ..
            } => Some(value).into_iter().chain(conversion.iter()).collect(),
            NodeKind::Coalesce {
                left,
                right,
                conversion,
            } => vec![left, right].into_iter().chain(conversion.iter()).collect(),
            NodeKind::Field { frame, .. } => vec![frame],
            NodeKind::NewBox(value) | NodeKind::BoxValue(value) => vec![value],
            NodeKind::MaterializeThunk { table, frame, .. } => vec![table, frame],
            NodeKind::RuntimeVariablesView { frame, .. } => vec![frame],
            NodeKind::FramedQuote { operand, frame, .. } => vec![operand, frame],
        }
    }

    /// Rebuild this node with every child replaced by `f(child)`. Returns
    /// this same node when `f` hands every child back unchanged, which keeps
    /// sharing intact. The node's type is preserved.
    pub fn map_children<E>(&self, mut f: impl FnMut(&Node) -> Result<Node, E>) -> Result<Node, E> {
        let mut changed = false;
        let mut map = |node: &Node| -> Result<Node, E> {
            let mapped = f(node)?;
            if !mapped.ptr_eq(node) {
                changed = true;
            }
            Ok(mapped)
        };

        let kind = match self.kind() {
            NodeKind::Constant(_)
            | NodeKind::Variable(_)
            | NodeKind::RuntimeVariables(_)
            | NodeKind::Default
            | NodeKind::NewFrame(_) => return Ok(self.clone()),
            NodeKind::Lambda { name, params, body } => NodeKind::Lambda {
                name: name.clone(),
                params: params.clone(),
                body: map(body)?,
            },
            NodeKind::Block { variables, body } => NodeKind::Block {
                variables: variables.clone(),
                body: body.iter().map(&mut map).collect::<Result<_, _>>()?,
            },
            NodeKind::Catch {
                variable,
                filter,
                body,
            } => NodeKind::Catch {
                variable: variable.clone(),
                filter: filter.as_ref().map(&mut map).transpose()?,
                body: map(body)?,
            },
            NodeKind::Try {
                body,
                handlers,
                finally,
            } => NodeKind::Try {
                body: map(body)?,
                handlers: handlers.iter().map(&mut map).collect::<Result<_, _>>()?,
                finally: finally.as_ref().map(&mut map).transpose()?,
            },
            NodeKind::Throw(value) => NodeKind::Throw(map(value)?),
            NodeKind::Quote(operand) => NodeKind::Quote(map(operand)?),
            NodeKind::Invoke { callee, args } => NodeKind::Invoke {
                callee: map(callee)?,
                args: args.iter().map(&mut map).collect::<Result<_, _>>()?,
            },
            NodeKind::Binary { op, left, right } => NodeKind::Binary {
                op: *op,
                left: map(left)?,
                right: map(right)?,
            },
            NodeKind::Unary { op, operand } => NodeKind::Unary {
                op: *op,
                operand: map(operand)?,
            },
            NodeKind::Conditional {
                test,
                then,
                otherwise,
            } => NodeKind::Conditional {
                test: map(test)?,
                then: map(then)?,
                otherwise: otherwise.as_ref().map(&mut map).transpose()?,
            },
            NodeKind::Loop { test, body } => NodeKind::Loop {
                test: map(test)?,
                body: map(body)?,
            },
            NodeKind::Assign { target, value } => NodeKind::Assign {
                target: map(target)?,
                value: map(value)?,
            },
            NodeKind::CompoundAssign {
                op,
                target,
                value,
                conversion,
            } => NodeKind::CompoundAssign {
                op: *op,
                target: target.clone(),
                value: map(value)?,
                conversion: conversion.as_ref().map(&mut map).transpose()?,
            },
            NodeKind::Coalesce {
                left,
                right,
                conversion,
            } => NodeKind::Coalesce {
                left: map(left)?,
                right: map(right)?,
                conversion: conversion.as_ref().map(&mut map).transpose()?,
            },
            NodeKind::Logical { op, left, right } => NodeKind::Logical {
                op: *op,
                left: map(left)?,
                right: map(right)?,
            },
            NodeKind::Field { frame, slot } => NodeKind::Field {
                frame: map(frame)?,
                slot: *slot,
            },
            NodeKind::NewBox(value) => NodeKind::NewBox(map(value)?),
            NodeKind::BoxValue(cell) => NodeKind::BoxValue(map(cell)?),
            NodeKind::MaterializeThunk {
                table,
                index,
                thunk,
                frame,
            } => NodeKind::MaterializeThunk {
                table: map(table)?,
                index: *index,
                thunk: thunk.clone(),
                frame: map(frame)?,
            },
            NodeKind::RuntimeVariablesView { frame, slots } => NodeKind::RuntimeVariablesView {
                frame: map(frame)?,
                slots: slots.clone(),
            },
            NodeKind::FramedQuote {
                operand,
                frame,
                layout,
            } => NodeKind::FramedQuote {
                operand: map(operand)?,
                frame: map(frame)?,
                layout: layout.clone(),
            },
        };

        if changed {
            Ok(Node::with_type(kind, self.ty().clone()))
        } else {
            Ok(self.clone())
        }
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Node#{}({})", self.id(), self)
    }
}
