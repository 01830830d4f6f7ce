//! Lowering of hierarchical-data file calls into the positional I/O ABI.
//!
//! Recognized shapes, with `m` the front-end module and `f` a file handle:
//!
//! ```text
//! m.File(name, mode)              -> io_abi.open(name, mode, 0)
//! f.close()                       -> io_abi.close(f)
//! f.create_dataset(n, s, dtype=t) -> io_abi.create_dataset(f, n, len(s), s, t)
//! f.create_group(n)               -> io_abi.create_group(f, n)
//! x = f[n][:]                     -> io_abi.size(f, n, d) per dim; alloc; io_abi.read(...)
//! f[n][:] = a                     -> io_abi.write(f, n, rank, zeros, a.shape, 0, a)
//! ```
//!
//! Indexing a handle only records a dataset reference; nothing is emitted
//! until the dataset is read or written. A rewrite failure aborts the whole
//! function and leaves it untouched.

use tracing::{debug, trace};

use crate::abi::IoEntry;
use crate::catalog::DatasetCatalog;
use crate::codegen::printer::print_function;
use crate::config::Config;
use crate::error::PassError;
use crate::ir::{Expr, FuncIr, Literal, Loc, ModuleRef, Stmt, Var, VarFactory};
use crate::pass::dce::remove_dead;
use crate::pass::resolve::TypeResolver;
use crate::pass::symbols::{DatasetRef, FileSource, SymbolTable};
use crate::pass::Pass;

/// Rewrites every function of a module, then removes what became dead.
pub struct IoRewritePass {
    config: Config,
    catalog: Option<Box<dyn DatasetCatalog>>,
}

impl IoRewritePass {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            catalog: None,
        }
    }

    /// Source used for compile-time type recovery.
    pub fn with_catalog(mut self, catalog: impl DatasetCatalog + 'static) -> Self {
        self.catalog = Some(Box::new(catalog));
        self
    }
}

impl Pass for IoRewritePass {
    fn name(&self) -> &'static str {
        "io-rewrite"
    }

    fn run(&mut self, module: &mut crate::ir::Module) -> Result<(), PassError> {
        let catalog = if self.config.static_introspection {
            self.catalog.as_deref()
        } else {
            None
        };
        for func in &mut module.functions {
            rewrite_function(func, catalog, &self.config)?;
        }
        Ok(())
    }
}

/// Rewrites one function in place.
///
/// The rewrite runs on a copy which replaces `func` only on success, so a
/// failed function keeps its original body.
pub fn rewrite_function(
    func: &mut FuncIr,
    catalog: Option<&dyn DatasetCatalog>,
    config: &Config,
) -> Result<(), PassError> {
    debug!(func = %func.name, blocks = func.block_count(), "starting I/O rewrite");
    if config.dump_ir {
        debug!(func = %func.name, ir = %print_function(func), "IR before I/O rewrite");
    }

    let mut work = func.clone();
    let order = work.topo_order();
    let FuncIr {
        name,
        locals,
        blocks,
        temps,
        ..
    } = &mut work;

    let mut rw = Rewriter {
        func: name.as_str(),
        symbols: SymbolTable::new(),
        resolver: TypeResolver::new(name.as_str(), locals, catalog),
        temps,
    };
    for label in order {
        let Some(block) = blocks.get_mut(&label) else {
            continue;
        };
        let body = std::mem::take(&mut block.body);
        rw.symbols.collect_copies(&body);
        let mut new_body = Vec::with_capacity(body.len());
        for stmt in body {
            new_body.extend(rw.rewrite_stmt(stmt)?);
        }
        block.body = new_body;
    }
    rw.symbols.log_summary(rw.func);
    drop(rw);

    let removed = remove_dead(&mut work);
    *func = work;

    debug!(func = %func.name, removed, "finished I/O rewrite");
    if config.dump_ir {
        debug!(func = %func.name, ir = %print_function(func), "IR after I/O rewrite");
    }
    Ok(())
}

struct Rewriter<'a> {
    func: &'a str,
    symbols: SymbolTable,
    resolver: TypeResolver<'a>,
    temps: &'a mut VarFactory,
}

impl<'a> Rewriter<'a> {
    fn rewrite_stmt(&mut self, stmt: Stmt) -> Result<Vec<Stmt>, PassError> {
        match stmt {
            Stmt::Assign { target, value } => self.rewrite_assign(target, value),
            Stmt::StaticSetItem {
                target,
                index,
                value,
            } => self.rewrite_setitem(target, index, value),
        }
    }

    fn rewrite_assign(&mut self, target: Var, value: Expr) -> Result<Vec<Stmt>, PassError> {
        match &value {
            Expr::Global(ModuleRef::Hdf5) => {
                self.symbols.module_aliases.insert(target.name.clone());
            }
            Expr::Attr { base, name } if self.symbols.is_module_alias(base) => {
                if name == "File" {
                    self.symbols.open_call_targets.insert(target.name.clone());
                }
            }
            Expr::Attr { base, name } if self.symbols.file_source(base).is_some() => {
                self.record_file_attr(&target, base, name)?;
            }
            Expr::Call { func, .. } if self.symbols.is_open_callable(func) => {
                return self.gen_open(target, &value);
            }
            Expr::Call { func, .. } if self.symbols.close_targets.contains_key(&func.name) => {
                let file = self.symbols.close_targets[&func.name].clone();
                let mut out = Vec::new();
                self.emit_call(IoEntry::Close, vec![file], target, &mut out);
                return Ok(out);
            }
            Expr::Call { func, .. }
                if self.symbols.create_dataset_targets.contains_key(&func.name) =>
            {
                let file = self.symbols.create_dataset_targets[&func.name].clone();
                return self.gen_create_dataset(target, &value, file);
            }
            Expr::Call { func, .. }
                if self.symbols.create_group_targets.contains_key(&func.name) =>
            {
                let file = self.symbols.create_group_targets[&func.name].clone();
                return self.gen_create_group(target, &value, file);
            }
            Expr::StaticGetItem {
                base,
                index,
                index_var,
            } if self.symbols.file_source(base).is_some() => {
                return self.record_dataset_ref(
                    target,
                    base,
                    index,
                    index_var.as_ref(),
                    value.clone(),
                );
            }
            Expr::GetItem { base, index } if self.symbols.file_source(base).is_some() => {
                trace!(target = %target, file = %base, "dataset reference (dynamic key)");
                self.symbols.dataset_refs.insert(
                    target.name.clone(),
                    DatasetRef {
                        file: base.clone(),
                        name: index.clone(),
                    },
                );
            }
            Expr::StaticGetItem { base, index, .. } if self.symbols.dataset(base).is_some() => {
                if !index.is_full_slice() {
                    return Err(self.unsupported(
                        format!(
                            "reading '{}[{}]'; only full-slice reads `x = d[:]` are supported",
                            base, index
                        ),
                        target.loc,
                    ));
                }
                let base = base.clone();
                return self.gen_read(target, &base);
            }
            Expr::GetItem { base, .. } if self.symbols.dataset(base).is_some() => {
                return Err(self.unsupported(
                    format!("dynamic indexing of dataset '{}'", base),
                    target.loc,
                ));
            }
            Expr::BuildTuple(items) => {
                self.symbols
                    .tuple_contents
                    .insert(target.name.clone(), items.clone());
            }
            Expr::Var(src) => self.symbols.record_copy(&target, src),
            Expr::Const(lit) => self.symbols.record_const(&target, lit),
            _ => {}
        }
        Ok(vec![Stmt::Assign { target, value }])
    }

    fn rewrite_setitem(
        &mut self,
        target: Var,
        index: Literal,
        value: Var,
    ) -> Result<Vec<Stmt>, PassError> {
        if self.symbols.file_source(&target).is_some() {
            return Err(self.unsupported(
                format!("assigning into file handle '{}'; use create_dataset", target),
                target.loc,
            ));
        }
        let Some(dset) = self.symbols.dataset(&target).cloned() else {
            return Ok(vec![Stmt::StaticSetItem {
                target,
                index,
                value,
            }]);
        };
        if !index.is_full_slice() {
            return Err(self.unsupported(
                format!(
                    "writing '{}[{}]'; only full-slice writes `d[:] = a` are supported",
                    target, index
                ),
                target.loc,
            ));
        }
        self.gen_write(&target, &dset, &value)
    }

    fn record_file_attr(&mut self, target: &Var, file: &Var, attr: &str) -> Result<(), PassError> {
        let table = match attr {
            "close" => &mut self.symbols.close_targets,
            "create_dataset" => &mut self.symbols.create_dataset_targets,
            "create_group" => &mut self.symbols.create_group_targets,
            "keys" => {
                trace!(target = %target, file = %file, "keys() left as is");
                return Ok(());
            }
            other => {
                return Err(self.unsupported(
                    format!("attribute '{}' of file handle '{}'", other, file),
                    target.loc,
                ))
            }
        };
        table.insert(target.name.clone(), file.clone());
        trace!(target = %target, file = %file, attr, "file method recorded");
        Ok(())
    }

    fn record_dataset_ref(
        &mut self,
        target: Var,
        file: &Var,
        index: &Literal,
        index_var: Option<&Var>,
        value: Expr,
    ) -> Result<Vec<Stmt>, PassError> {
        let mut out = Vec::new();
        let name_var = match (index_var, index) {
            (Some(v), _) => {
                self.symbols.record_const(v, index);
                v.clone()
            }
            (None, Literal::Str(_)) => {
                let k = self.fresh("dset_name", target.loc);
                self.symbols.record_const(&k, index);
                out.push(Stmt::assign(k.clone(), Expr::Const(index.clone())));
                k
            }
            (None, other) => {
                return Err(self.unsupported(
                    format!(
                        "indexing file handle '{}' with {}; expected a dataset name",
                        file, other
                    ),
                    target.loc,
                ))
            }
        };
        trace!(target = %target, file = %file, name = %name_var, "dataset reference");
        self.symbols.dataset_refs.insert(
            target.name.clone(),
            DatasetRef {
                file: file.clone(),
                name: name_var,
            },
        );
        out.push(Stmt::Assign { target, value });
        Ok(out)
    }

    // -----------------------------------------------------------------------
    // Emission
    // -----------------------------------------------------------------------

    fn gen_open(&mut self, target: Var, call: &Expr) -> Result<Vec<Stmt>, PassError> {
        let Expr::Call { args, .. } = call else {
            return Ok(vec![Stmt::Assign {
                target,
                value: call.clone(),
            }]);
        };
        let name = args
            .first()
            .or_else(|| call.keyword("name"))
            .cloned()
            .ok_or_else(|| self.missing("File", "name", target.loc))?;

        let mut out = Vec::new();
        let mode = match args.get(1).or_else(|| call.keyword("mode")) {
            Some(m) => m.clone(),
            None => {
                let m = self.fresh("const_mode", target.loc);
                out.push(Stmt::assign(m.clone(), Expr::Const(Literal::Str("r".into()))));
                m
            }
        };
        // Non-parallel for now; later stages may flip it.
        let parallel = self.fresh("const_parallel", target.loc);
        out.push(Stmt::assign(parallel.clone(), Expr::Const(Literal::Int(0))));

        trace!(target = %target, name = %name, "open");
        self.symbols
            .file_handles
            .insert(target.name.clone(), FileSource::Named(name.clone()));
        self.emit_call(IoEntry::Open, vec![name, mode, parallel], target, &mut out);
        Ok(out)
    }

    fn gen_create_dataset(
        &mut self,
        target: Var,
        call: &Expr,
        file: Var,
    ) -> Result<Vec<Stmt>, PassError> {
        let Expr::Call { args, .. } = call else {
            return Ok(vec![Stmt::Assign {
                target,
                value: call.clone(),
            }]);
        };
        let loc = target.loc;
        let name = args
            .first()
            .or_else(|| call.keyword("name"))
            .cloned()
            .ok_or_else(|| self.missing("create_dataset", "name", loc))?;
        let shape = args
            .get(1)
            .or_else(|| call.keyword("shape"))
            .cloned()
            .ok_or_else(|| self.missing("create_dataset", "shape", loc))?;
        let dtype = call
            .keyword("dtype")
            .or_else(|| args.get(2))
            .cloned()
            .ok_or_else(|| self.missing("create_dataset", "dtype", loc))?;
        let dims = self.symbols.tuple(&shape).map(<[Var]>::to_vec).ok_or_else(|| {
            self.unsupported(
                format!(
                    "shape '{}' of create_dataset is not a tuple built in this function",
                    shape
                ),
                loc,
            )
        })?;

        let mut out = Vec::new();
        let rank = self.const_int("h5_ndims", dims.len() as i64, loc, &mut out);
        trace!(target = %target, file = %file, name = %name, rank = dims.len(), "create_dataset");
        self.emit_call(
            IoEntry::CreateDataset,
            vec![file.clone(), name.clone(), rank, shape, dtype],
            target.clone(),
            &mut out,
        );
        self.symbols
            .dataset_refs
            .insert(target.name.clone(), DatasetRef { file, name });
        self.symbols.dataset_shapes.insert(target.name, dims);
        Ok(out)
    }

    fn gen_create_group(
        &mut self,
        target: Var,
        call: &Expr,
        file: Var,
    ) -> Result<Vec<Stmt>, PassError> {
        let Expr::Call { args, .. } = call else {
            return Ok(vec![Stmt::Assign {
                target,
                value: call.clone(),
            }]);
        };
        let name = args
            .first()
            .or_else(|| call.keyword("name"))
            .cloned()
            .ok_or_else(|| self.missing("create_group", "name", target.loc))?;

        trace!(target = %target, file = %file, name = %name, "create_group");
        self.symbols
            .file_handles
            .insert(target.name.clone(), FileSource::Group);
        let mut out = Vec::new();
        self.emit_call(IoEntry::CreateGroup, vec![file, name], target, &mut out);
        Ok(out)
    }

    fn gen_read(&mut self, target: Var, dset_var: &Var) -> Result<Vec<Stmt>, PassError> {
        let Some(dset) = self.symbols.dataset(dset_var).cloned() else {
            return Err(self.unsupported(format!("'{}' is not a dataset", dset_var), target.loc));
        };
        let ty = self.resolver.resolve(&target, &dset, &self.symbols)?;
        let loc = target.loc;
        trace!(target = %target, dataset = %dset.name, ty = %ty, "full read");

        let mut out = Vec::new();
        let size_fn = self.abi_entry(IoEntry::Size, loc, &mut out);
        let mut extents = Vec::with_capacity(ty.ndim);
        for dim in 0..ty.ndim {
            let dim_var = self.const_int("h5_dim", dim as i64, loc, &mut out);
            let extent = self.fresh("h5_size", loc);
            out.push(Stmt::assign(
                extent.clone(),
                Expr::Call {
                    func: size_fn.clone(),
                    args: vec![dset.file.clone(), dset.name.clone(), dim_var],
                    kws: vec![],
                },
            ));
            extents.push(extent);
        }
        out.push(Stmt::assign(
            target.clone(),
            Expr::Alloc {
                shape: extents.clone(),
                dtype: ty.dtype,
            },
        ));
        self.gen_transfer(
            IoEntry::Read,
            &dset,
            ty.ndim,
            Expr::BuildTuple(extents),
            target,
            loc,
            &mut out,
        );
        Ok(out)
    }

    fn gen_write(
        &mut self,
        dset_var: &Var,
        dset: &DatasetRef,
        src: &Var,
    ) -> Result<Vec<Stmt>, PassError> {
        let rank = match self.symbols.dataset_shape(dset_var) {
            Some(shape) => shape.len(),
            None => match self.resolver.declared(src, &self.symbols) {
                Some(ty) => ty.ndim,
                None => self.resolver.introspect(dset_var, dset, &self.symbols)?.ndim,
            },
        };
        trace!(dataset = %dset.name, src = %src, rank, "full write");
        let mut out = Vec::new();
        let counts = Expr::Attr {
            base: src.clone(),
            name: "shape".to_owned(),
        };
        self.gen_transfer(IoEntry::Write, dset, rank, counts, src.clone(), dset_var.loc, &mut out);
        Ok(out)
    }

    /// Emits `entry(file, name, rank, zeros, counts, 0, buf)` into a fresh
    /// status variable.
    #[allow(clippy::too_many_arguments)]
    fn gen_transfer(
        &mut self,
        entry: IoEntry,
        dset: &DatasetRef,
        rank: usize,
        counts: Expr,
        buf: Var,
        loc: Loc,
        out: &mut Vec<Stmt>,
    ) {
        let ndims = self.const_int("h5_ndims", rank as i64, loc, out);
        let zero = self.const_int("const_zero", 0, loc, out);
        let starts = self.fresh("h5_starts", loc);
        out.push(Stmt::assign(
            starts.clone(),
            Expr::BuildTuple(vec![zero.clone(); rank]),
        ));
        let counts_var = self.fresh("h5_counts", loc);
        out.push(Stmt::assign(counts_var.clone(), counts));
        let status = self.fresh("h5_err", loc);
        self.emit_call(
            entry,
            vec![
                dset.file.clone(),
                dset.name.clone(),
                ndims,
                starts,
                counts_var,
                zero,
                buf,
            ],
            status,
            out,
        );
    }

    /// Loads the ABI module and the entry's attribute; returns the callee.
    fn abi_entry(&mut self, entry: IoEntry, loc: Loc, out: &mut Vec<Stmt>) -> Var {
        let module = self.fresh("io_abi", loc);
        out.push(Stmt::assign(module.clone(), Expr::Global(ModuleRef::IoAbi)));
        let callee = self.fresh(entry.name(), loc);
        out.push(Stmt::assign(
            callee.clone(),
            Expr::Attr {
                base: module,
                name: entry.name().to_owned(),
            },
        ));
        callee
    }

    fn emit_call(&mut self, entry: IoEntry, args: Vec<Var>, target: Var, out: &mut Vec<Stmt>) {
        debug_assert_eq!(args.len(), entry.arity(), "arity of io_abi.{}", entry);
        let callee = self.abi_entry(entry, target.loc, out);
        out.push(Stmt::assign(
            target,
            Expr::Call {
                func: callee,
                args,
                kws: vec![],
            },
        ));
    }

    fn const_int(&mut self, prefix: &str, value: i64, loc: Loc, out: &mut Vec<Stmt>) -> Var {
        let v = self.fresh(prefix, loc);
        out.push(Stmt::assign(v.clone(), Expr::Const(Literal::Int(value))));
        v
    }

    fn fresh(&mut self, prefix: &str, loc: Loc) -> Var {
        self.temps.fresh(prefix, loc)
    }

    fn unsupported(&self, detail: String, loc: Loc) -> PassError {
        PassError::UnsupportedOperation {
            func: self.func.to_owned(),
            detail,
            loc,
        }
    }

    fn missing(&self, call: &str, arg: &str, loc: Loc) -> PassError {
        PassError::MissingRequiredArgument {
            func: self.func.to_owned(),
            call: call.to_owned(),
            arg: arg.to_owned(),
            loc,
        }
    }
}
