pub mod dce;
pub mod io_rewrite;
pub mod resolve;
pub mod symbols;

pub use dce::{remove_dead, DcePass};
pub use io_rewrite::{rewrite_function, IoRewritePass};
pub use resolve::TypeResolver;
pub use symbols::{DatasetRef, FileSource, SymbolTable};

use tracing::{debug, info};

use crate::error::PassError;
use crate::ir::Module;

/// A compiler pass that operates on a `Module` in place.
///
/// Passes must be deterministic: given the same module, the transformed
/// output must be identical across runs.
pub trait Pass {
    /// Human-readable name, used in error messages and diagnostics.
    fn name(&self) -> &'static str;

    /// Run the pass on the module.
    ///
    /// On error the pipeline aborts. Passes that commit per function leave
    /// the failing function unchanged.
    fn run(&mut self, module: &mut Module) -> Result<(), PassError>;
}

/// Manages and executes an ordered sequence of compiler passes.
///
/// Passes run in the order they were registered. The pipeline aborts at the
/// first error.
pub struct PassManager {
    passes: Vec<Box<dyn Pass>>,
    /// If set, logs the IR text after the pass with this name completes.
    dump_after: Option<String>,
}

impl PassManager {
    pub fn new() -> Self {
        Self {
            passes: Vec::new(),
            dump_after: None,
        }
    }

    /// Appends a pass to the end of the pipeline.
    pub fn add_pass(&mut self, pass: impl Pass + 'static) {
        self.passes.push(Box::new(pass));
    }

    /// Logs the module's IR at debug level after the named pass completes.
    pub fn set_dump_after(&mut self, pass_name: impl Into<String>) {
        self.dump_after = Some(pass_name.into());
    }

    /// Runs all passes in registration order on `module`.
    ///
    /// Returns `Err((pass_name, error))` at the first failure.
    pub fn run(&mut self, module: &mut Module) -> Result<(), (String, PassError)> {
        for pass in &mut self.passes {
            info!(pass = pass.name(), module = %module.name, "running pass");
            pass.run(module).map_err(|e| (pass.name().to_owned(), e))?;
            if self.dump_after.as_deref() == Some(pass.name()) {
                let text = crate::codegen::printer::print_module(module);
                debug!(pass = pass.name(), "IR after pass:\n{}", text);
            }
        }
        Ok(())
    }

    /// Returns the names of all registered passes in pipeline order.
    pub fn pass_names(&self) -> Vec<&'static str> {
        self.passes.iter().map(|p| p.name()).collect()
    }
}

impl Default for PassManager {
    fn default() -> Self {
        Self::new()
    }
}
