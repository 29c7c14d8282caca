//! Thunk factories
//!
//! The rewriter asks a factory for the type of the thunk standing in for
//! each nested function literal. The type records the literal's signature,
//! the frame it closes over and how the executor should materialize it.

use framejit_types::{FunctionType, ThunkStrategy, ThunkType, Type};

pub trait ThunkFactory {
    /// Thunk type producing a `literal` value from a frame of type `frame`
    fn thunk_type(&self, literal: &FunctionType, frame: &Type) -> ThunkType;
}

/// Compile each literal the first time it is materialized
#[derive(Debug, Default, Clone, Copy)]
pub struct LazyThunks;

impl ThunkFactory for LazyThunks {
    fn thunk_type(&self, literal: &FunctionType, frame: &Type) -> ThunkType {
        ThunkType {
            function: literal.clone(),
            frame: Box::new(frame.clone()),
            strategy: ThunkStrategy::Lazy,
        }
    }
}

/// Compile every literal up front, when the thunk table is built
#[derive(Debug, Default, Clone, Copy)]
pub struct EagerThunks;

impl ThunkFactory for EagerThunks {
    fn thunk_type(&self, literal: &FunctionType, frame: &Type) -> ThunkType {
        ThunkType {
            function: literal.clone(),
            frame: Box::new(frame.clone()),
            strategy: ThunkStrategy::Eager,
        }
    }
}

/// Factory for a configured strategy
pub fn factory_for(strategy: ThunkStrategy) -> Box<dyn ThunkFactory> {
    match strategy {
        ThunkStrategy::Lazy => Box::new(LazyThunks),
        ThunkStrategy::Eager => Box::new(EagerThunks),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_factories_record_strategy() {
        let literal = FunctionType::new(vec![Type::Int], Type::Int);
        let lazy = factory_for(ThunkStrategy::Lazy).thunk_type(&literal, &Type::Unit);
        let eager = factory_for(ThunkStrategy::Eager).thunk_type(&literal, &Type::Unit);

        assert_eq!(lazy.strategy, ThunkStrategy::Lazy);
        assert_eq!(eager.strategy, ThunkStrategy::Eager);
        assert_eq!(lazy.function, literal);
        assert_eq!(*lazy.frame, Type::Unit);
    }
}
