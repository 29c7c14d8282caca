//! Compile options

use framejit_types::ThunkStrategy;
use serde::Deserialize;

/// Default bound on expression nesting
pub const DEFAULT_MAX_DEPTH: usize = 512;

/// Options for one compile. Deserializes from the `[compile]` table of
/// `framejit.toml`; missing keys take their defaults.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CompileOptions {
    /// Deepest expression nesting the analyzer and rewriter accept
    pub max_depth: usize,
    /// Materialization strategy of the generated thunks
    pub thunks: ThunkStrategy,
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self {
            max_depth: DEFAULT_MAX_DEPTH,
            thunks: ThunkStrategy::Lazy,
        }
    }
}

impl CompileOptions {
    pub fn with_thunks(mut self, thunks: ThunkStrategy) -> Self {
        self.thunks = thunks;
        self
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }
}
