//! Closure conversion for framejit
//!
//! Two passes over a normalized tree:
//! - [`analyze`] records, per scope, the storage each declared variable
//!   needs (local, hoisted into a frame, or boxed in a frame cell)
//! - [`prepare`] rewrites the tree so every captured variable lives in an
//!   explicit frame and every nested function literal becomes a thunk
//!   materialization indexed into a [`MethodTable`]
//!
//! The method table is the only output that outlives the rewrite. The
//! caller builds one thunk per entry and passes the resulting table as the
//! outer frame argument of the converted root.

pub mod error;
pub mod frame;
pub mod options;
pub mod rewrite;
pub mod scope;
pub mod thunk;

pub use error::CompileError;
pub use frame::FrameDescriptor;
pub use options::{CompileOptions, DEFAULT_MAX_DEPTH};
pub use rewrite::{ClosureRewriter, MethodTable, MethodTableEntry, Prepared};
pub use scope::{analyze, analyze_with, Scope, ScopeAnalyzer, ScopeKind, ScopeMap, OUTER_SCOPE};
pub use thunk::{factory_for, EagerThunks, LazyThunks, ThunkFactory};

use framejit_ir::{deeper_than, Node, Variable};
use framejit_types::Type;

/// Fresh outer frame variable, typed as a method table
pub fn outer_variable() -> Variable {
    Variable::new("methods", Type::MethodTable)
}

/// Fail with [`CompileError::DepthLimitExceeded`] when `root` nests deeper
/// than `options.max_depth`. Measured without recursion, so it is safe to
/// run before the normalizer on trees of any depth.
pub fn check_depth(root: &Node, options: &CompileOptions) -> Result<(), CompileError> {
    match deeper_than(root, options.max_depth) {
        Some(node) => Err(CompileError::DepthLimitExceeded {
            limit: options.max_depth,
            node: node.id(),
        }),
        None => Ok(()),
    }
}

/// Rewrite `root` using a scope map produced by [`analyze`] with the same
/// `outer` variable.
pub fn prepare(
    outer: &Variable,
    scopes: &ScopeMap,
    root: &Node,
    factory: &dyn ThunkFactory,
    options: &CompileOptions,
) -> Result<Prepared, CompileError> {
    ClosureRewriter::new(outer, scopes, factory, options).run(root)
}

/// Analyze and rewrite `root` with a fresh outer variable and the thunk
/// strategy from `options`. The tree must already be normalized.
pub fn convert(root: &Node, options: &CompileOptions) -> Result<Prepared, CompileError> {
    let outer = outer_variable();
    let scopes = analyze_with(root, Some(&outer), options)?;
    let factory = factory_for(options.thunks);
    prepare(&outer, &scopes, root, factory.as_ref(), options)
}
