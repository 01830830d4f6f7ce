use crate::ir::block::Label;
use crate::ir::types::DType;
use crate::ir::var::{Loc, Var};

/// A `start:stop:step` slice literal. `None` parts are omitted bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SliceLit {
    pub start: Option<i64>,
    pub stop: Option<i64>,
    pub step: Option<i64>,
}

impl SliceLit {
    /// The `[:]` slice.
    pub const FULL: SliceLit = SliceLit {
        start: None,
        stop: None,
        step: None,
    };

    pub fn is_full(&self) -> bool {
        *self == Self::FULL
    }
}

impl std::fmt::Display for SliceLit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let part = |p: Option<i64>| p.map(|v| v.to_string()).unwrap_or_default();
        write!(f, "{}:{}", part(self.start), part(self.stop))?;
        if let Some(step) = self.step {
            write!(f, ":{}", step)?;
        }
        Ok(())
    }
}

/// Compile-time constant values.
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Int(i64),
    Float(f64),
    Bool(bool),
    Str(String),
    None,
    Slice(SliceLit),
}

impl Literal {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Literal::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn is_full_slice(&self) -> bool {
        matches!(self, Literal::Slice(s) if s.is_full())
    }
}

impl std::fmt::Display for Literal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Literal::Int(v) => write!(f, "{}", v),
            Literal::Float(v) => write!(f, "{:?}", v),
            Literal::Bool(b) => write!(f, "{}", b),
            Literal::Str(s) => write!(f, "{:?}", s),
            Literal::None => f.write_str("None"),
            Literal::Slice(s) => write!(f, "slice({})", s),
        }
    }
}

/// Modules a `Global` expression can load.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ModuleRef {
    /// The hierarchical-data file front-end (`h5py`).
    Hdf5,
    /// The positional I/O ABI the rewrite lowers into.
    IoAbi,
    /// Any other module; never matched by the rewrite.
    Other(String),
}

impl std::fmt::Display for ModuleRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ModuleRef::Hdf5 => f.write_str("h5py"),
            ModuleRef::IoAbi => f.write_str("io_abi"),
            ModuleRef::Other(name) => f.write_str(name),
        }
    }
}

/// Right-hand sides of assignments.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Global(ModuleRef),
    Attr {
        base: Var,
        name: String,
    },
    Call {
        func: Var,
        args: Vec<Var>,
        kws: Vec<(String, Var)>,
    },
    /// `base[<const>]`. `index_var` holds the same constant when the front-end
    /// materialized it into a variable.
    StaticGetItem {
        base: Var,
        index: Literal,
        index_var: Option<Var>,
    },
    GetItem {
        base: Var,
        index: Var,
    },
    BuildTuple(Vec<Var>),
    Const(Literal),
    /// Plain copy of another variable.
    Var(Var),
    /// Uninitialized C-contiguous buffer of the given extents.
    Alloc {
        shape: Vec<Var>,
        dtype: DType,
    },
}

impl Expr {
    /// Variables read by this expression, in operand order.
    pub fn uses(&self) -> Vec<&Var> {
        match self {
            Expr::Global(_) | Expr::Const(_) => vec![],
            Expr::Attr { base, .. } => vec![base],
            Expr::Call { func, args, kws } => {
                let mut v = vec![func];
                v.extend(args.iter());
                v.extend(kws.iter().map(|(_, var)| var));
                v
            }
            Expr::StaticGetItem {
                base, index_var, ..
            } => {
                let mut v = vec![base];
                v.extend(index_var.iter());
                v
            }
            Expr::GetItem { base, index } => vec![base, index],
            Expr::BuildTuple(items) => items.iter().collect(),
            Expr::Var(src) => vec![src],
            Expr::Alloc { shape, .. } => shape.iter().collect(),
        }
    }

    /// Expressions that may be dropped when their result is unused.
    /// Calls are assumed to have side effects.
    pub fn is_pure(&self) -> bool {
        !matches!(self, Expr::Call { .. })
    }

    /// Looks up a keyword argument of a call by name.
    pub fn keyword(&self, name: &str) -> Option<&Var> {
        match self {
            Expr::Call { kws, .. } => kws.iter().find(|(k, _)| k == name).map(|(_, v)| v),
            _ => None,
        }
    }
}

/// Statements inside a basic block body.
#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    Assign { target: Var, value: Expr },
    /// `target[<const>] = value`
    StaticSetItem {
        target: Var,
        index: Literal,
        value: Var,
    },
}

impl Stmt {
    pub fn assign(target: Var, value: Expr) -> Self {
        Stmt::Assign { target, value }
    }

    pub fn loc(&self) -> Loc {
        match self {
            Stmt::Assign { target, .. } | Stmt::StaticSetItem { target, .. } => target.loc,
        }
    }

    pub fn uses(&self) -> Vec<&Var> {
        match self {
            Stmt::Assign { value, .. } => value.uses(),
            Stmt::StaticSetItem { target, value, .. } => vec![target, value],
        }
    }
}

/// Block terminators. Successor edges come only from here.
#[derive(Debug, Clone, PartialEq)]
pub enum Terminator {
    Jump(Label),
    Branch {
        cond: Var,
        truebr: Label,
        falsebr: Label,
    },
    Return(Option<Var>),
}

impl Terminator {
    pub fn successors(&self) -> Vec<Label> {
        match self {
            Terminator::Jump(target) => vec![*target],
            Terminator::Branch {
                truebr, falsebr, ..
            } => vec![*truebr, *falsebr],
            Terminator::Return(_) => vec![],
        }
    }

    pub fn uses(&self) -> Vec<&Var> {
        match self {
            Terminator::Jump(_) | Terminator::Return(None) => vec![],
            Terminator::Branch { cond, .. } => vec![cond],
            Terminator::Return(Some(v)) => vec![v],
        }
    }
}
