//! Reference executor for framejit
//!
//! Runs closure-converted trees: frames are shared records, boxed slots
//! hold cells, and nested function literals are materialized from a thunk
//! table built from the method table. Values are single-threaded.

pub mod closure;
pub mod compile;
pub mod error;
pub mod executable;
mod interp;
pub mod quote;
pub mod thunk;
pub mod value;
pub mod variables;

pub use closure::Closure;
pub use compile::{compile_function, Function, Slot};
pub use error::{ExecError, RuntimeError};
pub use executable::Executable;
pub use interp::MAX_CALL_DEPTH;
pub use quote::QuoteValue;
pub use thunk::{EagerThunk, LazyThunk, Thunk, ThunkTable};
pub use value::{new_cell, Cell, Frame, Value};
pub use variables::RuntimeVariables;

use framejit_ir::{reduce, Node};
use framejit_transform::{check_depth, convert, CompileOptions};

/// Normalize, convert and build `root`
pub fn compile_tree(root: &Node, options: &CompileOptions) -> Result<Executable, ExecError> {
    check_depth(root, options)?;
    let reduced = reduce(root);
    let prepared = convert(&reduced, options)?;
    Ok(Executable::build(&prepared)?)
}
