//! Fixed native entry points this crate targets.
//!
//! - `io`: positional I/O ABI produced by the rewrite pass.
//! - `dist`: communication ABI produced by the distributed lowering.

pub mod dist;
pub mod io;

pub use dist::{DistEntry, ScalarKind};
pub use io::IoEntry;
