//! Callable function values

use std::rc::Rc;

use crate::compile::Function;
use crate::error::RuntimeError;
use crate::interp::{self, Unwind};
use crate::value::{Cell, Value};

/// A compiled function together with the cells of its free variables and,
/// for materialized thunks, the frame passed as its implicit first argument.
pub struct Closure {
    function: Rc<Function>,
    captured: Vec<Cell>,
    frame: Option<Value>,
}

impl Closure {
    pub fn new(function: Rc<Function>, captured: Vec<Cell>) -> Self {
        Self {
            function,
            captured,
            frame: None,
        }
    }

    /// Bind the closure frame of a method table entry
    pub fn with_frame(function: Rc<Function>, frame: Value) -> Self {
        Self {
            function,
            captured: Vec::new(),
            frame: Some(frame),
        }
    }

    pub fn function(&self) -> &Rc<Function> {
        &self.function
    }

    pub fn captured(&self) -> &[Cell] {
        &self.captured
    }

    pub fn frame(&self) -> Option<&Value> {
        self.frame.as_ref()
    }

    /// Number of arguments callers pass
    pub fn arity(&self) -> usize {
        self.function.arity() - usize::from(self.frame.is_some())
    }

    /// Call with `args`. A value thrown and not caught inside surfaces as
    /// [`RuntimeError::UncaughtException`].
    pub fn call(&self, args: Vec<Value>) -> Result<Value, RuntimeError> {
        match interp::call(self, args, 0) {
            Ok(returned) => Ok(returned.value),
            Err(Unwind::Throw(value)) => Err(RuntimeError::UncaughtException {
                value: format!("{:?}", value),
            }),
            Err(Unwind::Error(err)) => Err(err),
        }
    }
}
