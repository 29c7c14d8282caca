//! Thunk table
//!
//! Executable counterpart of a [`MethodTable`]. Each entry turns the
//! rewritten function literal into a closure bound to the frame it is
//! materialized with. Lazy entries compile on first use and keep the
//! result; eager entries compile while the table is built.

use std::rc::Rc;

use framejit_transform::{MethodTable, MethodTableEntry};
use framejit_types::{ThunkStrategy, ThunkType};
use once_cell::unsync::OnceCell;

use crate::closure::Closure;
use crate::compile::{compile_function, Function};
use crate::error::RuntimeError;
use crate::value::Value;

pub trait Thunk {
    /// Type recorded for this entry at conversion time
    fn thunk_type(&self) -> &ThunkType;

    /// Function value closing over `frame`
    fn materialize(&self, frame: Value) -> Result<Value, RuntimeError>;

    fn is_compiled(&self) -> bool;
}

pub struct LazyThunk {
    entry: MethodTableEntry,
    compiled: OnceCell<Rc<Function>>,
}

impl LazyThunk {
    pub fn new(entry: MethodTableEntry) -> Self {
        Self {
            entry,
            compiled: OnceCell::new(),
        }
    }
}

impl Thunk for LazyThunk {
    fn thunk_type(&self) -> &ThunkType {
        &self.entry.thunk
    }

    fn materialize(&self, frame: Value) -> Result<Value, RuntimeError> {
        let function = self.compiled.get_or_try_init(|| {
            log::trace!("compiling thunk {}", self.entry.thunk);
            compile_function(&self.entry.lambda, &[])
        })?;
        Ok(Value::Function(Rc::new(Closure::with_frame(function.clone(), frame))))
    }

    fn is_compiled(&self) -> bool {
        self.compiled.get().is_some()
    }
}

pub struct EagerThunk {
    thunk: ThunkType,
    function: Rc<Function>,
}

impl EagerThunk {
    pub fn new(entry: MethodTableEntry) -> Result<Self, RuntimeError> {
        let function = compile_function(&entry.lambda, &[])?;
        Ok(Self {
            thunk: entry.thunk,
            function,
        })
    }
}

impl Thunk for EagerThunk {
    fn thunk_type(&self) -> &ThunkType {
        &self.thunk
    }

    fn materialize(&self, frame: Value) -> Result<Value, RuntimeError> {
        Ok(Value::Function(Rc::new(Closure::with_frame(self.function.clone(), frame))))
    }

    fn is_compiled(&self) -> bool {
        true
    }
}

#[derive(Default)]
pub struct ThunkTable {
    thunks: Vec<Box<dyn Thunk>>,
}

impl ThunkTable {
    /// One thunk per method table entry, compiled per the strategy its
    /// thunk type records
    pub fn build(table: &MethodTable) -> Result<Self, RuntimeError> {
        let mut thunks: Vec<Box<dyn Thunk>> = Vec::with_capacity(table.len());
        for entry in table.iter() {
            match entry.thunk.strategy {
                ThunkStrategy::Lazy => thunks.push(Box::new(LazyThunk::new(entry.clone()))),
                ThunkStrategy::Eager => thunks.push(Box::new(EagerThunk::new(entry.clone())?)),
            }
        }
        log::debug!("thunk table: {} entr(ies)", thunks.len());
        Ok(Self { thunks })
    }

    pub fn len(&self) -> usize {
        self.thunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.thunks.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&dyn Thunk> {
        self.thunks.get(index).map(|t| t.as_ref())
    }

    /// Materialize entry `index`, which must have been recorded as `expected`
    pub fn materialize(&self, index: usize, expected: &ThunkType, frame: Value) -> Result<Value, RuntimeError> {
        let thunk = self.get(index).ok_or(RuntimeError::MissingThunk { index })?;
        if thunk.thunk_type() != expected {
            return Err(RuntimeError::ThunkTypeMismatch {
                index,
                expected: expected.to_string(),
                found: thunk.thunk_type().to_string(),
            });
        }
        thunk.materialize(frame)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use framejit_ir::{lower, reduce};
    use framejit_transform::{convert, CompileOptions};

    fn method_table(source: &str, strategy: ThunkStrategy) -> MethodTable {
        let root = reduce(&lower(&framejit_parser::parse(source).unwrap()).unwrap().root);
        convert(&root, &CompileOptions::default().with_thunks(strategy))
            .unwrap()
            .method_table
    }

    const SOURCE: &str = "(lambda ((a int)) (lambda ((b int)) (+ a b)))";

    #[test]
    fn test_lazy_thunks_compile_on_first_use() {
        let methods = method_table(SOURCE, ThunkStrategy::Lazy);
        let table = ThunkTable::build(&methods).unwrap();
        assert_eq!(table.len(), 1);
        let thunk = table.get(0).unwrap();
        assert!(!thunk.is_compiled());

        let expected = methods.get(0).unwrap().thunk.clone();
        table.materialize(0, &expected, Value::Unit).unwrap();
        assert!(table.get(0).unwrap().is_compiled());
    }

    #[test]
    fn test_eager_thunks_compile_up_front() {
        let table = ThunkTable::build(&method_table(SOURCE, ThunkStrategy::Eager)).unwrap();
        assert!(table.get(0).unwrap().is_compiled());
    }

    #[test]
    fn test_materialize_checks_the_recorded_type() {
        let methods = method_table(SOURCE, ThunkStrategy::Lazy);
        let table = ThunkTable::build(&methods).unwrap();

        let mut wrong = methods.get(0).unwrap().thunk.clone();
        wrong.strategy = ThunkStrategy::Eager;
        assert!(matches!(
            table.materialize(0, &wrong, Value::Unit),
            Err(RuntimeError::ThunkTypeMismatch { index: 0, .. })
        ));
        assert!(matches!(
            table.materialize(4, &wrong, Value::Unit),
            Err(RuntimeError::MissingThunk { index: 4 })
        ));
    }
}
