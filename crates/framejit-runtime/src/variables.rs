//! Runtime-variables views

use framejit_ir::decode_location;

use crate::error::RuntimeError;
use crate::value::{Cell, Frame, Value};

/// Indexed read/write access to a list of variables. Entries alias the
/// variables' storage: a write through the view is seen by the code that
/// declared them and the other way round.
pub struct RuntimeVariables {
    cells: Vec<Cell>,
}

impl RuntimeVariables {
    pub fn new(cells: Vec<Cell>) -> Self {
        Self { cells }
    }

    /// View over boxed frame slots; each entry is an encoded
    /// `(hops, slot)` location relative to `frame`
    pub fn from_frame(frame: &Frame, locations: &[u64]) -> Result<Self, RuntimeError> {
        let cells = locations
            .iter()
            .map(|&encoded| {
                let (hops, slot) = decode_location(encoded);
                frame.ancestor(hops)?.cell(slot)
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { cells })
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    fn cell(&self, index: usize) -> Result<&Cell, RuntimeError> {
        self.cells.get(index).ok_or(RuntimeError::IndexOutOfRange {
            index,
            len: self.cells.len(),
        })
    }

    pub fn get(&self, index: usize) -> Result<Value, RuntimeError> {
        let value = self.cell(index)?.borrow().clone();
        Ok(value)
    }

    pub fn set(&self, index: usize, value: Value) -> Result<(), RuntimeError> {
        *self.cell(index)?.borrow_mut() = value;
        Ok(())
    }
}
