//! hdlower: SPMD array-analytics middle-end.
//!
//! Two stages:
//!
//! ```text
//! FuncIr (h5py-style file calls)
//!   → IoRewritePass [SymbolTable → TypeResolver → rewrite] → DcePass
//!   → FuncIr (positional io_abi calls)
//!
//! distributed primitives (typed LLVM operands)
//!   → DistLowering → LLVM IR text calling the hdl_dist_* ABI
//! ```
//!
//! The `runtime` module implements both ABIs in process so rewritten IR can
//! be executed (`interp`) and lowered semantics checked.

pub mod abi;
pub mod catalog;
pub mod codegen;
pub mod config;
pub mod error;
pub mod interp;
pub mod ir;
pub mod lower;
pub mod pass;
pub mod runtime;

pub use catalog::{DatasetCatalog, DatasetInfo, MemoryCatalog};
pub use config::Config;
pub use error::Error;

use tracing::warn;

use crate::ir::Module;
use crate::pass::{IoRewritePass, PassManager};

/// Runs the I/O rewrite (which ends with dead code elimination) on every
/// function of `module`.
///
/// `catalog` backs compile-time introspection; it is ignored when
/// `config.static_introspection` is off. On error the failing function keeps
/// its original body; functions before it stay rewritten.
pub fn rewrite_module(
    module: &mut Module,
    config: &Config,
    catalog: Option<Box<dyn DatasetCatalog>>,
) -> Result<(), Error> {
    let mut pass = IoRewritePass::new(config.clone());
    if let Some(catalog) = catalog {
        pass = pass.with_catalog(catalog);
    }
    let mut pm = PassManager::new();
    pm.add_pass(pass);
    if config.dump_ir {
        pm.set_dump_after("io-rewrite");
    }
    pm.run(module).map_err(|(name, e)| {
        let err = Error::Pass(e);
        warn!(pass = %name, code = err.diagnostic_code(), "pass failed: {}", err);
        err
    })
}
