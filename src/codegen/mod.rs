//! Code emission: textual LLVM IR for lowered primitives and an IR printer
//! for debugging the rewrite.

pub mod llvm;
pub mod printer;

pub use llvm::{FnBuilder, FnSig, LlModule, LlType, LlValue};
pub use printer::{print_function, print_module};
