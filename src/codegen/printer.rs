//! IR pretty-printer.
//!
//! Emits a human-readable text form of a `Module`. Output is deterministic:
//! functions in insertion order, blocks in insertion order, statements in
//! program order.

use std::fmt::{self, Write};

use crate::ir::{Block, Expr, FuncIr, Module, Stmt, Terminator};

/// Text dump of every function in `module`.
pub fn print_module(module: &Module) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "// module: {}", module.name);
    for func in module.functions() {
        out.push('\n');
        out.push_str(&print_function(func));
    }
    out
}

/// Text dump of a single function.
pub fn print_function(func: &FuncIr) -> String {
    FuncText(func).to_string()
}

struct FuncText<'a>(&'a FuncIr);

impl fmt::Display for FuncText<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let func = self.0;
        writeln!(f, "def {}({}) {{", func.name, func.arg_names.join(", "))?;
        for (name, ty) in func.locals.iter() {
            writeln!(f, "  local {}: {}", name, ty)?;
        }
        for block in func.blocks() {
            write_block(f, block)?;
        }
        writeln!(f, "}}")
    }
}

fn write_block(f: &mut fmt::Formatter<'_>, block: &Block) -> fmt::Result {
    writeln!(f, "  {}:", block.label)?;
    for stmt in &block.body {
        write!(f, "    ")?;
        write_stmt(f, stmt)?;
        writeln!(f)?;
    }
    write!(f, "    ")?;
    match &block.term {
        Terminator::Jump(target) => writeln!(f, "jump {}", target),
        Terminator::Branch {
            cond,
            truebr,
            falsebr,
        } => writeln!(f, "branch {}, {}, {}", cond, truebr, falsebr),
        Terminator::Return(Some(v)) => writeln!(f, "return {}", v),
        Terminator::Return(None) => writeln!(f, "return"),
    }
}

fn write_stmt(f: &mut fmt::Formatter<'_>, stmt: &Stmt) -> fmt::Result {
    match stmt {
        Stmt::Assign { target, value } => {
            write!(f, "{} = ", target)?;
            write_expr(f, value)
        }
        Stmt::StaticSetItem {
            target,
            index,
            value,
        } => write!(f, "{}[{}] = {}", target, index, value),
    }
}

fn write_expr(f: &mut fmt::Formatter<'_>, expr: &Expr) -> fmt::Result {
    match expr {
        Expr::Global(m) => write!(f, "global({})", m),
        Expr::Attr { base, name } => write!(f, "getattr({}, {})", base, name),
        Expr::Call { func, args, kws } => {
            write!(f, "call {}(", func)?;
            let mut first = true;
            for a in args {
                if !first {
                    write!(f, ", ")?;
                }
                first = false;
                write!(f, "{}", a)?;
            }
            for (k, v) in kws {
                if !first {
                    write!(f, ", ")?;
                }
                first = false;
                write!(f, "{}={}", k, v)?;
            }
            write!(f, ")")
        }
        Expr::StaticGetItem {
            base,
            index,
            index_var,
        } => match index_var {
            Some(iv) => write!(f, "static_getitem({}, {}, {})", base, index, iv),
            None => write!(f, "static_getitem({}, {})", base, index),
        },
        Expr::GetItem { base, index } => write!(f, "getitem({}, {})", base, index),
        Expr::BuildTuple(items) => write!(f, "build_tuple({})", join(items)),
        Expr::Const(lit) => write!(f, "const({})", lit),
        Expr::Var(v) => write!(f, "{}", v),
        Expr::Alloc { shape, dtype } => write!(f, "alloc(({}), {})", join(shape), dtype),
    }
}

fn join<T: fmt::Display>(items: &[T]) -> String {
    items
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{FuncBuilder, ModuleRef, SliceLit};

    #[test]
    fn prints_statements_in_order() {
        let mut b = FuncBuilder::new("load");
        let m = b.global("m", ModuleRef::Hdf5);
        let open = b.attr("open", &m, "File");
        let name = b.const_str("fname", "data.h5");
        let f = b.call("f", &open, &[&name], &[]);
        let x = b.slice("x", &f, SliceLit::FULL);
        b.terminate(Terminator::Return(Some(x)));
        let text = print_function(&b.build());

        let lines: Vec<&str> = text.lines().map(str::trim).collect();
        assert_eq!(lines[0], "def load() {");
        assert_eq!(lines[1], "block0:");
        assert_eq!(lines[2], "m = global(h5py)");
        assert_eq!(lines[3], "open = getattr(m, File)");
        assert_eq!(lines[4], "fname = const(\"data.h5\")");
        assert_eq!(lines[5], "f = call open(fname)");
        assert_eq!(lines[6], "x = static_getitem(f, slice(:))");
        assert_eq!(lines[7], "return x");
    }
}
