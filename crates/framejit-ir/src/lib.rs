//! Intermediate representation for framejit
//!
//! Expression trees with nested function literals, lexical blocks,
//! exception handlers, quotes and runtime-variables access, plus the frame
//! nodes closure conversion produces. The crate also lowers `.fj` forms into
//! trees and reduces high-level shapes to the core node set.

pub mod frame;
pub mod ir;
pub mod lower;
pub mod normalize;
pub mod print;
pub mod storage;
pub mod visit;

pub use frame::{decode_location, encode_location, FrameLayout, FrameSlot};
pub use ir::*;
pub use lower::{lower, lower_type, lower_with_limit, LowerError, Lowered, SpanTable};
pub use normalize::reduce;
pub use print::pretty;
pub use storage::StorageKind;
pub use visit::{deeper_than, free_variables};
