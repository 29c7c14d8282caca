//! Quoted function literals
//!
//! A quote keeps its literal uncompiled, together with the cells of the
//! variables it closes over. Reads and writes through the quote go to the
//! same storage the enclosing code uses.

use std::rc::Rc;
use std::sync::Arc;

use framejit_ir::{free_variables, FrameLayout, Node, Variable};

use crate::closure::Closure;
use crate::compile::compile_function;
use crate::error::RuntimeError;
use crate::value::{Cell, Value};

pub struct QuoteValue {
    lambda: Node,
    bindings: Vec<(Variable, Cell)>,
}

impl QuoteValue {
    pub fn from_cells(lambda: Node, bindings: Vec<(Variable, Cell)>) -> Self {
        Self { lambda, bindings }
    }

    /// Resolve every free variable of `lambda` against the frame chain
    /// starting at `frame`, described by `layout`
    pub fn from_frame(lambda: Node, frame: &Value, layout: Option<&Arc<FrameLayout>>) -> Result<Self, RuntimeError> {
        let mut bindings = Vec::new();
        for variable in free_variables(&lambda) {
            let (hops, slot) = layout
                .and_then(|l| l.locate(&variable))
                .ok_or_else(|| RuntimeError::UndeclaredVariable {
                    name: variable.name().to_string(),
                })?;
            let cell = frame.as_frame()?.ancestor(hops)?.cell(slot)?;
            bindings.push((variable, cell));
        }
        Ok(Self { lambda, bindings })
    }

    pub fn lambda(&self) -> &Node {
        &self.lambda
    }

    /// Variables the literal closes over
    pub fn variables(&self) -> impl Iterator<Item = &Variable> {
        self.bindings.iter().map(|(v, _)| v)
    }

    fn binding(&self, name: &str) -> Option<&Cell> {
        self.bindings.iter().find(|(v, _)| v.name() == name).map(|(_, c)| c)
    }

    /// Current value of a captured variable
    pub fn read(&self, name: &str) -> Option<Value> {
        self.binding(name).map(|cell| cell.borrow().clone())
    }

    pub fn write(&self, name: &str, value: Value) -> Result<(), RuntimeError> {
        let cell = self.binding(name).ok_or_else(|| RuntimeError::UndeclaredVariable {
            name: name.to_string(),
        })?;
        *cell.borrow_mut() = value;
        Ok(())
    }

    /// Compile the literal into a function value sharing the captured cells
    pub fn compile(&self) -> Result<Value, RuntimeError> {
        let (variables, cells): (Vec<Variable>, Vec<Cell>) = self.bindings.iter().cloned().unzip();
        let function = compile_function(&self.lambda, &variables)?;
        let cells = function
            .captures
            .iter()
            .map(|v| {
                variables
                    .iter()
                    .position(|b| b == v)
                    .map(|i| cells[i].clone())
                    .ok_or_else(|| RuntimeError::UndeclaredVariable {
                        name: v.name().to_string(),
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Value::Function(Rc::new(Closure::new(function, cells))))
    }
}
