//! Runtime values
//!
//! Values are reference counted and single-threaded. Frames and cells have
//! identity: two values referring to the same frame see each other's writes.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;
use std::sync::Arc;

use framejit_ir::FrameLayout;
use framejit_types::Type;

use crate::closure::Closure;
use crate::error::RuntimeError;
use crate::quote::QuoteValue;
use crate::thunk::ThunkTable;
use crate::variables::RuntimeVariables;

/// Shared mutable storage for one variable
pub type Cell = Rc<RefCell<Value>>;

pub fn new_cell(value: Value) -> Cell {
    Rc::new(RefCell::new(value))
}

#[derive(Clone)]
pub enum Value {
    Unit,
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(Rc<str>),
    Function(Rc<Closure>),
    Frame(Frame),
    /// Cell allocated by `new-box`
    Box(Cell),
    MethodTable(Rc<ThunkTable>),
    RuntimeVariables(Rc<RuntimeVariables>),
    Quote(Rc<QuoteValue>),
}

impl Value {
    pub fn string(s: impl Into<Rc<str>>) -> Value {
        Value::String(s.into())
    }

    /// Default value of a type
    pub fn default_of(ty: &Type) -> Value {
        match ty {
            Type::Unit => Value::Unit,
            Type::Bool => Value::Bool(false),
            Type::Int => Value::Int(0),
            Type::Float => Value::Float(0.0),
            Type::String => Value::string(""),
            _ => Value::Null,
        }
    }

    pub fn type_name(&self) -> String {
        match self {
            Value::Unit => "unit".to_string(),
            Value::Null => "null".to_string(),
            Value::Bool(_) => "bool".to_string(),
            Value::Int(_) => "int".to_string(),
            Value::Float(_) => "float".to_string(),
            Value::String(_) => "string".to_string(),
            Value::Function(closure) => closure.function().ty.to_string(),
            Value::Frame(frame) => frame.layout().record_type().to_string(),
            Value::Box(_) => "box".to_string(),
            Value::MethodTable(_) => "method-table".to_string(),
            Value::RuntimeVariables(_) => "runtime-variables".to_string(),
            Value::Quote(_) => "quote".to_string(),
        }
    }

    /// Whether this value inhabits `ty`. Used to select catch handlers.
    pub fn has_type(&self, ty: &Type) -> bool {
        match (self, ty) {
            (_, Type::Any) => true,
            (Value::Unit, Type::Unit) => true,
            (Value::Bool(_), Type::Bool) => true,
            (Value::Int(_), Type::Int) => true,
            (Value::Float(_), Type::Float) => true,
            (Value::String(_), Type::String) => true,
            (Value::Function(_), Type::Function(_)) => true,
            (Value::Frame(frame), Type::Record(record)) => frame.layout().record.id == record.id,
            (Value::Box(_), Type::StrongBox(_)) => true,
            (Value::MethodTable(_), Type::MethodTable) => true,
            (Value::RuntimeVariables(_), Type::RuntimeVariables) => true,
            (Value::Quote(_), Type::Quoted(_)) => true,
            _ => false,
        }
    }

    pub fn as_bool(&self) -> Result<bool, RuntimeError> {
        match self {
            Value::Bool(b) => Ok(*b),
            other => Err(RuntimeError::TypeMismatch {
                expected: "bool",
                found: other.type_name(),
            }),
        }
    }

    pub fn as_int(&self) -> Result<i64, RuntimeError> {
        match self {
            Value::Int(i) => Ok(*i),
            other => Err(RuntimeError::TypeMismatch {
                expected: "int",
                found: other.type_name(),
            }),
        }
    }

    pub fn as_frame(&self) -> Result<&Frame, RuntimeError> {
        match self {
            Value::Frame(frame) => Ok(frame),
            other => Err(RuntimeError::TypeMismatch {
                expected: "frame",
                found: other.type_name(),
            }),
        }
    }

    pub fn as_cell(&self) -> Result<&Cell, RuntimeError> {
        match self {
            Value::Box(cell) => Ok(cell),
            other => Err(RuntimeError::TypeMismatch {
                expected: "box",
                found: other.type_name(),
            }),
        }
    }

    pub fn as_function(&self) -> Result<&Rc<Closure>, RuntimeError> {
        match self {
            Value::Function(closure) => Ok(closure),
            other => Err(RuntimeError::NotCallable {
                found: other.type_name(),
            }),
        }
    }

    /// Equality of `==`: structural for scalars, identity for everything
    /// else.
    pub fn equals(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Unit, Value::Unit) | (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Int(a), Value::Float(b)) | (Value::Float(b), Value::Int(a)) => (*a as f64) == *b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Function(a), Value::Function(b)) => Rc::ptr_eq(a, b),
            (Value::Frame(a), Value::Frame(b)) => a.ptr_eq(b),
            (Value::Box(a), Value::Box(b)) => Rc::ptr_eq(a, b),
            (Value::MethodTable(a), Value::MethodTable(b)) => Rc::ptr_eq(a, b),
            (Value::RuntimeVariables(a), Value::RuntimeVariables(b)) => Rc::ptr_eq(a, b),
            (Value::Quote(a), Value::Quote(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Unit => write!(f, "unit"),
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(i) => write!(f, "{}", i),
            Value::Float(x) => write!(f, "{:?}", x),
            Value::String(s) => write!(f, "{}", s),
            Value::Function(closure) => match &closure.function().name {
                Some(name) => write!(f, "<fn {}>", name),
                None => write!(f, "<fn>"),
            },
            Value::Frame(frame) => write!(f, "<frame {}>", frame.layout().record_type()),
            Value::Box(cell) => write!(f, "<box {}>", cell.borrow()),
            Value::MethodTable(table) => write!(f, "<method-table {}>", table.len()),
            Value::RuntimeVariables(vars) => write!(f, "<runtime-variables {}>", vars.len()),
            Value::Quote(_) => write!(f, "<quote>"),
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::String(s) => write!(f, "{:?}", s),
            other => write!(f, "{}", other),
        }
    }
}

impl From<Cell> for Value {
    fn from(cell: Cell) -> Value {
        Value::Box(cell)
    }
}

/// A live closure frame
#[derive(Clone)]
pub struct Frame(Rc<FrameData>);

struct FrameData {
    layout: Arc<FrameLayout>,
    slots: RefCell<Vec<Value>>,
}

impl Frame {
    /// Allocate a frame; every slot starts as unit
    pub fn new(layout: Arc<FrameLayout>) -> Self {
        let slots = vec![Value::Unit; layout.len()];
        Frame(Rc::new(FrameData {
            layout,
            slots: RefCell::new(slots),
        }))
    }

    pub fn layout(&self) -> &Arc<FrameLayout> {
        &self.0.layout
    }

    pub fn ptr_eq(&self, other: &Frame) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    pub fn get(&self, slot: usize) -> Result<Value, RuntimeError> {
        let slots = self.0.slots.borrow();
        slots.get(slot).cloned().ok_or(RuntimeError::SlotOutOfRange {
            slot,
            len: slots.len(),
        })
    }

    pub fn set(&self, slot: usize, value: Value) -> Result<(), RuntimeError> {
        let mut slots = self.0.slots.borrow_mut();
        let len = slots.len();
        let target = slots
            .get_mut(slot)
            .ok_or(RuntimeError::SlotOutOfRange { slot, len })?;
        *target = value;
        Ok(())
    }

    /// Follow `hops` parent links
    pub fn ancestor(&self, hops: u32) -> Result<Frame, RuntimeError> {
        let mut frame = self.clone();
        for _ in 0..hops {
            let parent = frame.get(0)?;
            frame = parent.as_frame()?.clone();
        }
        Ok(frame)
    }

    /// Cell stored in a boxed slot
    pub fn cell(&self, slot: usize) -> Result<Cell, RuntimeError> {
        match self.get(slot)? {
            Value::Box(cell) => Ok(cell),
            _ => Err(RuntimeError::NotACell { slot }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use framejit_ir::{FrameSlot, StorageKind, Variable};

    fn layout(parent: Option<Arc<FrameLayout>>, names: &[&str]) -> Arc<FrameLayout> {
        let mut slots = Vec::new();
        if let Some(p) = &parent {
            slots.push(FrameSlot::new(Variable::new("parent", p.record_type()), StorageKind::HOISTED));
        }
        for name in names {
            slots.push(FrameSlot::new(Variable::new(*name, Type::Int), StorageKind::HOISTED | StorageKind::BOXED));
        }
        Arc::new(FrameLayout::new("test", parent, slots))
    }

    #[test]
    fn test_defaults() {
        assert!(Value::default_of(&Type::Int).equals(&Value::Int(0)));
        assert!(Value::default_of(&Type::String).equals(&Value::string("")));
        assert!(matches!(Value::default_of(&Type::function(vec![], Type::Int)), Value::Null));
    }

    #[test]
    fn test_has_type() {
        assert!(Value::Int(1).has_type(&Type::Int));
        assert!(Value::Int(1).has_type(&Type::Any));
        assert!(!Value::Int(1).has_type(&Type::String));
        assert!(!Value::Null.has_type(&Type::Int));
    }

    #[test]
    fn test_frames_share_state() {
        let frame = Frame::new(layout(None, &["x"]));
        let alias = frame.clone();
        frame.set(0, new_cell(Value::Int(5)).into()).unwrap();
        assert!(alias.cell(0).unwrap().borrow().equals(&Value::Int(5)));
        assert!(matches!(frame.get(3), Err(RuntimeError::SlotOutOfRange { slot: 3, len: 1 })));
    }

    #[test]
    fn test_ancestor_walks_slot_zero() {
        let outer_layout = layout(None, &["x"]);
        let inner_layout = layout(Some(outer_layout.clone()), &["y"]);
        let outer = Frame::new(outer_layout);
        let inner = Frame::new(inner_layout);
        inner.set(0, Value::Frame(outer.clone())).unwrap();

        assert!(inner.ancestor(1).unwrap().ptr_eq(&outer));
        assert!(inner.ancestor(0).unwrap().ptr_eq(&inner));
        assert!(matches!(outer.ancestor(1), Err(RuntimeError::TypeMismatch { .. })));
    }
}
