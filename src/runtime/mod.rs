//! Reference implementations of the native ABIs.
//!
//! Used to execute rewritten functions and to check the semantics the
//! lowered code relies on: partition math, collectives over a simulated
//! world, cumulative sums, chunk-bounded writes and positional I/O.

pub mod io;
pub mod partition;
pub mod scan;
pub mod world;

pub use io::{check_status, IoCall, IoRuntime, MemoryIo};
pub use partition::{get_end, get_item_pointer, get_node_portion, get_start};
pub use scan::{cumulative_sum, ChunkView};
pub use world::{Comm, Element, Request, World};
