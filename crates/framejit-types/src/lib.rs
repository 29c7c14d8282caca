//! Type system for framejit
//!
//! Defines the nominal types carried by IR nodes, from source-level
//! primitives through the record, cell and thunk types synthesized by
//! closure conversion.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

/// Unique identifier for IR nodes
pub type NodeId = u64;

/// Unique identifier for variables
pub type VarId = u64;

/// Unique identifier for synthesized record types
pub type RecordId = u32;

static NEXT_RECORD_ID: AtomicU32 = AtomicU32::new(0);

/// Core type representation
#[derive(Debug, Clone, PartialEq)]
pub enum Type {
    /// No value
    Unit,
    /// Boolean type
    Bool,
    /// 64-bit signed integer
    Int,
    /// 64-bit float
    Float,
    /// String type
    String,
    /// Dynamically typed value (also the type of `null`)
    Any,
    /// Function type
    Function(FunctionType),
    /// Synthesized record (closure frames)
    Record(Arc<RecordType>),
    /// Independently allocated mutable cell wrapping a value
    StrongBox(Box<Type>),
    /// Deferred-compilation wrapper around one function literal
    Thunk(ThunkType),
    /// Indexable table of thunks, passed as the outer frame argument
    MethodTable,
    /// Reflective view over a set of variables
    RuntimeVariables,
    /// Unevaluated (quoted) function literal
    Quoted(Box<Type>),
}

/// Function type information
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionType {
    pub params: Vec<Type>,
    pub return_type: Box<Type>,
}

/// A record field
#[derive(Debug, Clone, PartialEq)]
pub struct RecordField {
    pub name: String,
    pub ty: Type,
}

/// Synthesized record type. Records are nominal: two records are the same
/// type only if they share an id.
#[derive(Debug, Clone)]
pub struct RecordType {
    pub id: RecordId,
    pub name: String,
    pub fields: Vec<RecordField>,
}

/// How a thunk turns its function literal into an executable value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThunkStrategy {
    /// Compile on first materialization, reuse afterwards
    #[default]
    Lazy,
    /// Compile when the thunk table is built
    Eager,
}

/// Thunk type: produces a `function` value when given a `frame`
#[derive(Debug, Clone, PartialEq)]
pub struct ThunkType {
    pub function: FunctionType,
    pub frame: Box<Type>,
    pub strategy: ThunkStrategy,
}

impl Type {
    /// Build a function type
    pub fn function(params: Vec<Type>, return_type: Type) -> Type {
        Type::Function(FunctionType {
            params,
            return_type: Box::new(return_type),
        })
    }

    /// Build a cell type around `inner`
    pub fn strong_box(inner: Type) -> Type {
        Type::StrongBox(Box::new(inner))
    }

    /// Check if this type is a primitive (unit, bool, int, float, string)
    pub fn is_primitive(&self) -> bool {
        matches!(
            self,
            Type::Unit | Type::Bool | Type::Int | Type::Float | Type::String
        )
    }

    /// Check if a value of this type may be null
    pub fn is_nullable(&self) -> bool {
        !matches!(self, Type::Unit | Type::Bool | Type::Int | Type::Float)
    }

    pub fn as_function(&self) -> Option<&FunctionType> {
        match self {
            Type::Function(f) => Some(f),
            _ => None,
        }
    }

    pub fn as_record(&self) -> Option<&Arc<RecordType>> {
        match self {
            Type::Record(r) => Some(r),
            _ => None,
        }
    }

    /// Join two branch types: equal types stay, anything else widens to `Any`
    pub fn join(&self, other: &Type) -> Type {
        if self == other {
            self.clone()
        } else {
            Type::Any
        }
    }
}

impl RecordType {
    /// Create a record type with a fresh id
    pub fn new(name: impl Into<String>, fields: Vec<RecordField>) -> Self {
        Self {
            id: NEXT_RECORD_ID.fetch_add(1, Ordering::Relaxed),
            name: name.into(),
            fields,
        }
    }

    pub fn field(&self, index: usize) -> Option<&RecordField> {
        self.fields.get(index)
    }
}

impl PartialEq for RecordType {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl FunctionType {
    pub fn new(params: Vec<Type>, return_type: Type) -> Self {
        Self {
            params,
            return_type: Box::new(return_type),
        }
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Unit => write!(f, "unit"),
            Type::Bool => write!(f, "bool"),
            Type::Int => write!(f, "int"),
            Type::Float => write!(f, "float"),
            Type::String => write!(f, "string"),
            Type::Any => write!(f, "any"),
            Type::Function(func) => write!(f, "{}", func),
            Type::Record(record) => write!(f, "{}#{}", record.name, record.id),
            Type::StrongBox(inner) => write!(f, "box<{}>", inner),
            Type::Thunk(thunk) => write!(f, "{}", thunk),
            Type::MethodTable => write!(f, "method-table"),
            Type::RuntimeVariables => write!(f, "runtime-variables"),
            Type::Quoted(inner) => write!(f, "quoted<{}>", inner),
        }
    }
}

impl fmt::Display for FunctionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(fn (")?;
        for (i, param) in self.params.iter().enumerate() {
            if i > 0 {
                write!(f, " ")?;
            }
            write!(f, "{}", param)?;
        }
        write!(f, ") {})", self.return_type)
    }
}

impl fmt::Display for ThunkStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ThunkStrategy::Lazy => write!(f, "lazy"),
            ThunkStrategy::Eager => write!(f, "eager"),
        }
    }
}

impl fmt::Display for ThunkType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "thunk<{}, {}, {}>", self.strategy, self.function, self.frame)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_records_are_nominal() {
        let fields = vec![RecordField {
            name: "x".to_string(),
            ty: Type::Int,
        }];
        let a = RecordType::new("frame", fields.clone());
        let b = RecordType::new("frame", fields);
        assert_ne!(a, b);
        assert_eq!(a, a.clone());
    }

    #[test]
    fn test_join_widens_to_any() {
        assert_eq!(Type::Int.join(&Type::Int), Type::Int);
        assert_eq!(Type::Int.join(&Type::String), Type::Any);
    }

    #[test]
    fn test_display_function_type() {
        let ty = Type::function(vec![Type::Int, Type::Bool], Type::String);
        assert_eq!(ty.to_string(), "(fn (int bool) string)");
    }
}
