pub mod block;
pub mod function;
pub mod module;
pub mod stmt;
pub mod types;
pub mod var;

pub use block::{Block, Label};
pub use function::{FuncIr, VarFactory};
pub use module::{FuncBuilder, Module};
pub use stmt::{Expr, Literal, ModuleRef, SliceLit, Stmt, Terminator};
pub use types::{ArrayType, DType, UserTypes};
pub use var::{Loc, ScopeId, Var};
