//! Entry point of a converted tree

use std::rc::Rc;

use framejit_ir::{Node, NodeKind};
use framejit_transform::Prepared;

use crate::closure::Closure;
use crate::compile::{compile_function, Function};
use crate::error::RuntimeError;
use crate::thunk::ThunkTable;
use crate::value::Value;

/// A converted tree ready to run: its entry function and the thunk table
/// passed to it as the outer frame
pub struct Executable {
    function: Rc<Function>,
    table: Rc<ThunkTable>,
}

impl Executable {
    pub fn build(prepared: &Prepared) -> Result<Self, RuntimeError> {
        let table = ThunkTable::build(&prepared.method_table)?;
        let entry = match prepared.root.kind() {
            NodeKind::Lambda { .. } => prepared.root.clone(),
            _ => Node::lambda(None, vec![prepared.outer.clone()], prepared.root.clone()),
        };
        let function = compile_function(&entry, &[])?;
        log::debug!(
            "executable: arity {}, {} thunk(s)",
            function.arity().saturating_sub(1),
            table.len()
        );
        Ok(Self {
            function,
            table: Rc::new(table),
        })
    }

    /// Arguments callers pass; the outer frame is supplied by `invoke`
    pub fn arity(&self) -> usize {
        self.function.arity().saturating_sub(1)
    }

    pub fn table(&self) -> &ThunkTable {
        &self.table
    }

    pub fn invoke(&self, args: Vec<Value>) -> Result<Value, RuntimeError> {
        if args.len() != self.arity() {
            return Err(RuntimeError::ArityMismatch {
                expected: self.arity(),
                found: args.len(),
            });
        }
        let mut values = Vec::with_capacity(args.len() + 1);
        values.push(Value::MethodTable(self.table.clone()));
        values.extend(args);
        Closure::new(self.function.clone(), Vec::new()).call(values)
    }
}
