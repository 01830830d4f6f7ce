use std::collections::HashMap;

use indexmap::IndexMap;

use crate::ir::block::{Block, Label};
use crate::ir::function::{FuncIr, VarFactory};
use crate::ir::stmt::{Expr, Literal, ModuleRef, SliceLit, Stmt, Terminator};
use crate::ir::types::{ArrayType, UserTypes};
use crate::ir::var::{Loc, ScopeId, Var};

/// The top-level IR container: every function handed over by the host.
///
/// Invariant: function names are unique within a module.
#[derive(Debug, Default)]
pub struct Module {
    pub name: String,
    pub(crate) functions: Vec<FuncIr>,
    pub(crate) function_index: HashMap<String, usize>,
}

impl Module {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            functions: Vec::new(),
            function_index: HashMap::new(),
        }
    }

    pub fn functions(&self) -> &[FuncIr] {
        &self.functions
    }

    pub fn function_by_name(&self, name: &str) -> Option<&FuncIr> {
        let idx = self.function_index.get(name)?;
        self.functions.get(*idx)
    }

    /// Registers a function. Returns `Err` if the name is already taken.
    pub fn add_function(&mut self, func: FuncIr) -> Result<usize, String> {
        if self.function_index.contains_key(&func.name) {
            return Err(format!("function '{}' already defined", func.name));
        }
        let idx = self.functions.len();
        self.function_index.insert(func.name.clone(), idx);
        self.functions.push(func);
        Ok(idx)
    }
}

/// Builder for constructing a `FuncIr` by hand, the way the host front-end
/// would hand one over.
///
/// The entry block is created up front and is the initial cursor. New blocks
/// start with a `return` terminator until `terminate()` replaces it. Each
/// emitted statement advances a synthetic source line.
pub struct FuncBuilder {
    func: FuncIr,
    current: Label,
    line: u32,
}

impl FuncBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        let scope = ScopeId(0);
        let entry = Label(0);
        let mut blocks = IndexMap::new();
        blocks.insert(entry, Block::new(entry, Terminator::Return(None)));
        let func = FuncIr {
            name: name.into(),
            arg_names: Vec::new(),
            scope,
            entry,
            locals: UserTypes::new(),
            blocks,
            temps: VarFactory::new(scope),
        };
        Self {
            func,
            current: entry,
            line: 1,
        }
    }

    pub fn entry(&self) -> Label {
        self.func.entry
    }

    /// Declares a function argument and returns its variable.
    pub fn arg(&mut self, name: &str) -> Var {
        self.func.arg_names.push(name.to_owned());
        self.var(name)
    }

    /// Records a user type declaration for a local.
    pub fn declare(&mut self, name: &str, ty: ArrayType) {
        self.func.locals.declare(name, ty);
    }

    pub fn create_block(&mut self) -> Label {
        let label = Label(self.func.blocks.len() as u32);
        self.func
            .blocks
            .insert(label, Block::new(label, Terminator::Return(None)));
        label
    }

    pub fn set_current_block(&mut self, label: Label) {
        self.current = label;
    }

    pub fn current_block(&self) -> Label {
        self.current
    }

    /// Makes a variable in the function scope at the current line.
    pub fn var(&self, name: &str) -> Var {
        Var::new(self.func.scope, name, Loc::new(self.line, 1))
    }

    pub fn push(&mut self, stmt: Stmt) {
        if let Some(block) = self.func.blocks.get_mut(&self.current) {
            block.body.push(stmt);
        }
        self.line += 1;
    }

    pub fn assign(&mut self, name: &str, value: Expr) -> Var {
        let target = self.var(name);
        self.push(Stmt::assign(target.clone(), value));
        target
    }

    pub fn global(&mut self, name: &str, module: ModuleRef) -> Var {
        self.assign(name, Expr::Global(module))
    }

    pub fn attr(&mut self, name: &str, base: &Var, attr: &str) -> Var {
        self.assign(
            name,
            Expr::Attr {
                base: base.clone(),
                name: attr.to_owned(),
            },
        )
    }

    pub fn call(&mut self, name: &str, func: &Var, args: &[&Var], kws: &[(&str, &Var)]) -> Var {
        self.assign(
            name,
            Expr::Call {
                func: func.clone(),
                args: args.iter().map(|v| (*v).clone()).collect(),
                kws: kws
                    .iter()
                    .map(|(k, v)| ((*k).to_owned(), (*v).clone()))
                    .collect(),
            },
        )
    }

    pub fn const_str(&mut self, name: &str, value: &str) -> Var {
        self.assign(name, Expr::Const(Literal::Str(value.to_owned())))
    }

    pub fn const_int(&mut self, name: &str, value: i64) -> Var {
        self.assign(name, Expr::Const(Literal::Int(value)))
    }

    pub fn tuple(&mut self, name: &str, items: &[&Var]) -> Var {
        self.assign(
            name,
            Expr::BuildTuple(items.iter().map(|v| (*v).clone()).collect()),
        )
    }

    pub fn copy(&mut self, name: &str, src: &Var) -> Var {
        self.assign(name, Expr::Var(src.clone()))
    }

    /// `name = base[key]` with a string key materialized in `key_var`.
    pub fn index_str(&mut self, name: &str, base: &Var, key_var: &Var, key: &str) -> Var {
        self.assign(
            name,
            Expr::StaticGetItem {
                base: base.clone(),
                index: Literal::Str(key.to_owned()),
                index_var: Some(key_var.clone()),
            },
        )
    }

    /// `name = base[index]` with a runtime key.
    pub fn index_dyn(&mut self, name: &str, base: &Var, index: &Var) -> Var {
        self.assign(
            name,
            Expr::GetItem {
                base: base.clone(),
                index: index.clone(),
            },
        )
    }

    /// `name = base[slice]`
    pub fn slice(&mut self, name: &str, base: &Var, slice: SliceLit) -> Var {
        self.assign(
            name,
            Expr::StaticGetItem {
                base: base.clone(),
                index: Literal::Slice(slice),
                index_var: None,
            },
        )
    }

    /// `target[slice] = value`
    pub fn set_slice(&mut self, target: &Var, slice: SliceLit, value: &Var) {
        self.push(Stmt::StaticSetItem {
            target: target.clone(),
            index: Literal::Slice(slice),
            value: value.clone(),
        });
    }

    /// Replaces the current block's terminator.
    pub fn terminate(&mut self, term: Terminator) {
        if let Some(block) = self.func.blocks.get_mut(&self.current) {
            block.term = term;
        }
    }

    pub fn build(self) -> FuncIr {
        self.func
    }
}
