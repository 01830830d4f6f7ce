//! Tree-walking interpreter for rewritten functions.
//!
//! Executes a `FuncIr` whose file operations have been lowered to the I/O
//! ABI, dispatching every ABI call to an [`IoRuntime`]. Front-end module
//! calls are not executable: run the rewrite first.

use std::collections::HashMap;
use std::fmt;

use tracing::trace;

use crate::abi::IoEntry;
use crate::error::RuntimeError;
use crate::ir::{DType, Expr, FuncIr, Literal, ModuleRef, SliceLit, Stmt, Terminator, Var};
use crate::runtime::io::{check_status, IoRuntime};

/// A dense C-contiguous array. Elements are held as `f64`.
#[derive(Debug, Clone, PartialEq)]
pub struct ArrayValue {
    pub dtype: DType,
    pub shape: Vec<usize>,
    pub data: Vec<f64>,
}

impl ArrayValue {
    pub fn zeros(dtype: DType, shape: &[usize]) -> Self {
        Self {
            dtype,
            shape: shape.to_vec(),
            data: vec![0.0; shape.iter().product()],
        }
    }

    pub fn from_vec(dtype: DType, shape: &[usize], data: Vec<f64>) -> Self {
        Self {
            dtype,
            shape: shape.to_vec(),
            data,
        }
    }
}

/// A runtime value produced or consumed by the interpreter.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    None,
    Int(i64),
    Float(f64),
    Bool(bool),
    Str(String),
    Slice(SliceLit),
    Tuple(Vec<Value>),
    Array(ArrayValue),
    /// File, group or dataset handle returned by the I/O runtime.
    Handle(i64),
    Module(ModuleRef),
    AbiFn(IoEntry),
}

impl From<&Literal> for Value {
    fn from(lit: &Literal) -> Self {
        match lit {
            Literal::Int(v) => Value::Int(*v),
            Literal::Float(v) => Value::Float(*v),
            Literal::Bool(b) => Value::Bool(*b),
            Literal::Str(s) => Value::Str(s.clone()),
            Literal::None => Value::None,
            Literal::Slice(s) => Value::Slice(*s),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::None => f.write_str("None"),
            Value::Int(v) => write!(f, "{}", v),
            Value::Float(v) => write!(f, "{}", v),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Str(s) => write!(f, "{:?}", s),
            Value::Slice(s) => write!(f, "slice({})", s),
            Value::Tuple(items) => {
                let parts: Vec<String> = items.iter().map(ToString::to_string).collect();
                write!(f, "({})", parts.join(", "))
            }
            Value::Array(a) => {
                let dims: Vec<String> = a.shape.iter().map(ToString::to_string).collect();
                write!(f, "array<{}>({})", a.dtype, dims.join("x"))
            }
            Value::Handle(h) => write!(f, "handle#{}", h),
            Value::Module(m) => write!(f, "module {}", m),
            Value::AbiFn(e) => write!(f, "io_abi.{}", e),
        }
    }
}

/// Runs `func` with `args` bound to its parameters, in order.
///
/// Returns the value of the `return` terminator. A negative ABI status
/// stops execution with `RuntimeError::CallFailed`.
pub fn eval_function(
    func: &FuncIr,
    args: &[Value],
    io: &mut dyn IoRuntime,
) -> Result<Option<Value>, RuntimeError> {
    let mut interp = Interpreter {
        values: HashMap::new(),
        io,
    };
    for (name, arg) in func.arg_names.iter().zip(args) {
        interp.values.insert(name.clone(), arg.clone());
    }
    interp.run(func)
}

// ---------------------------------------------------------------------------
// Interpreter state
// ---------------------------------------------------------------------------

struct Interpreter<'io> {
    values: HashMap<String, Value>,
    io: &'io mut dyn IoRuntime,
}

impl Interpreter<'_> {
    fn run(&mut self, func: &FuncIr) -> Result<Option<Value>, RuntimeError> {
        let mut current = func.entry;
        let mut steps = 0usize;
        const MAX_STEPS: usize = 1_000_000;

        loop {
            steps += 1;
            if steps > MAX_STEPS {
                return Err(RuntimeError::Unsupported(
                    "exceeded step limit (infinite loop?)".into(),
                ));
            }
            let block = func
                .block(current)
                .ok_or_else(|| RuntimeError::Unsupported(format!("missing block {}", current)))?;

            for stmt in &block.body {
                self.exec(stmt)?;
            }

            current = match &block.term {
                Terminator::Jump(target) => *target,
                Terminator::Branch {
                    cond,
                    truebr,
                    falsebr,
                } => {
                    if self.truthy(cond)? {
                        *truebr
                    } else {
                        *falsebr
                    }
                }
                Terminator::Return(v) => {
                    return v.as_ref().map(|v| self.get(v)).transpose();
                }
            };
        }
    }

    fn get(&self, var: &Var) -> Result<Value, RuntimeError> {
        self.values
            .get(&var.name)
            .cloned()
            .ok_or_else(|| RuntimeError::UndefinedVariable(var.name.clone()))
    }

    fn truthy(&self, var: &Var) -> Result<bool, RuntimeError> {
        match self.get(var)? {
            Value::Bool(b) => Ok(b),
            Value::Int(v) => Ok(v != 0),
            other => Err(RuntimeError::TypeError(format!("branch on {}", other))),
        }
    }

    fn exec(&mut self, stmt: &Stmt) -> Result<(), RuntimeError> {
        match stmt {
            Stmt::Assign { target, value } => {
                let v = self.eval(value)?;
                trace!(target = %target, value = %v, "assign");
                self.values.insert(target.name.clone(), v);
            }
            Stmt::StaticSetItem {
                target,
                index,
                value,
            } => {
                let src = self.get(value)?;
                let dst = self
                    .values
                    .get_mut(&target.name)
                    .ok_or_else(|| RuntimeError::UndefinedVariable(target.name.clone()))?;
                match (dst, src) {
                    (Value::Array(dst), Value::Array(src)) if index.is_full_slice() => {
                        if dst.shape != src.shape {
                            return Err(RuntimeError::TypeError(format!(
                                "cannot assign shape {:?} into {:?}",
                                src.shape, dst.shape
                            )));
                        }
                        dst.data = src.data;
                    }
                    (dst, _) => {
                        return Err(RuntimeError::Unsupported(format!(
                            "item assignment into {}",
                            dst
                        )))
                    }
                }
            }
        }
        Ok(())
    }

    fn eval(&mut self, expr: &Expr) -> Result<Value, RuntimeError> {
        match expr {
            Expr::Global(m) => Ok(Value::Module(m.clone())),
            Expr::Const(lit) => Ok(Value::from(lit)),
            Expr::Var(v) => self.get(v),
            Expr::BuildTuple(items) => Ok(Value::Tuple(
                items.iter().map(|v| self.get(v)).collect::<Result<_, _>>()?,
            )),
            Expr::Attr { base, name } => match self.get(base)? {
                Value::Module(ModuleRef::IoAbi) => IoEntry::from_name(name)
                    .map(Value::AbiFn)
                    .ok_or_else(|| {
                        RuntimeError::Unsupported(format!("io_abi has no entry '{}'", name))
                    }),
                Value::Array(a) if name == "shape" => Ok(Value::Tuple(
                    a.shape.iter().map(|&d| Value::Int(d as i64)).collect(),
                )),
                other => Err(RuntimeError::Unsupported(format!(
                    "attribute '{}' of {}",
                    name, other
                ))),
            },
            Expr::StaticGetItem { base, index, .. } => {
                let base = self.get(base)?;
                index_tuple(&base, &Value::from(index))
            }
            Expr::GetItem { base, index } => {
                let base = self.get(base)?;
                let index = self.get(index)?;
                index_tuple(&base, &index)
            }
            Expr::Alloc { shape, dtype } => {
                let dims = shape
                    .iter()
                    .map(|v| as_usize(&self.get(v)?))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(Value::Array(ArrayValue::zeros(*dtype, &dims)))
            }
            Expr::Call { func, args, kws } => {
                let entry = match self.get(func)? {
                    Value::AbiFn(entry) => entry,
                    other => {
                        return Err(RuntimeError::Unsupported(format!(
                            "call of {}; only io_abi entries are executable",
                            other
                        )))
                    }
                };
                if !kws.is_empty() || args.len() != entry.arity() {
                    return Err(RuntimeError::TypeError(format!(
                        "io_abi.{} takes {} positional arguments",
                        entry,
                        entry.arity()
                    )));
                }
                self.call_abi(entry, args)
            }
        }
    }

    fn call_abi(&mut self, entry: IoEntry, args: &[Var]) -> Result<Value, RuntimeError> {
        let a = args
            .iter()
            .map(|v| self.get(v))
            .collect::<Result<Vec<_>, _>>()?;
        trace!(entry = %entry, "io_abi call");
        match entry {
            IoEntry::Open => {
                let h = self.io.open(as_str(&a[0])?, as_str(&a[1])?, as_int(&a[2])?);
                check_status("open", h)?;
                Ok(Value::Handle(h))
            }
            IoEntry::Close => {
                let status = self.io.close(as_handle(&a[0])?);
                check_status("close", status)?;
                Ok(Value::Int(status))
            }
            IoEntry::Size => {
                let n = self.io.size(as_handle(&a[0])?, as_str(&a[1])?, as_int(&a[2])?);
                check_status("size", n)?;
                Ok(Value::Int(n))
            }
            IoEntry::Read => {
                let (file, name, start, count, stride) = transfer_args(&a)?;
                let mut dest = match a[6].clone() {
                    Value::Array(arr) => arr,
                    other => return Err(RuntimeError::TypeError(format!("read into {}", other))),
                };
                let status = self.io.read(file, &name, &start, &count, stride, &mut dest.data);
                check_status("read", status)?;
                self.values.insert(args[6].name.clone(), Value::Array(dest));
                Ok(Value::Int(status))
            }
            IoEntry::Write => {
                let (file, name, start, count, stride) = transfer_args(&a)?;
                let src = match &a[6] {
                    Value::Array(arr) => arr,
                    other => return Err(RuntimeError::TypeError(format!("write from {}", other))),
                };
                let status = self.io.write(file, &name, &start, &count, stride, &src.data);
                check_status("write", status)?;
                Ok(Value::Int(status))
            }
            IoEntry::CreateDataset => {
                let shape = as_ints(&a[3])?;
                if shape.len() as i64 != as_int(&a[2])? {
                    return Err(RuntimeError::TypeError(format!(
                        "create_dataset rank {} with shape of {} dims",
                        as_int(&a[2])?,
                        shape.len()
                    )));
                }
                let dtype = match &a[4] {
                    Value::Str(s) => DType::from_name(s)
                        .ok_or_else(|| RuntimeError::TypeError(format!("unknown dtype '{}'", s)))?,
                    other => return Err(RuntimeError::TypeError(format!("dtype {}", other))),
                };
                let h = self
                    .io
                    .create_dataset(as_handle(&a[0])?, as_str(&a[1])?, &shape, dtype);
                check_status("create_dataset", h)?;
                Ok(Value::Handle(h))
            }
            IoEntry::CreateGroup => {
                let h = self.io.create_group(as_handle(&a[0])?, as_str(&a[1])?);
                check_status("create_group", h)?;
                Ok(Value::Handle(h))
            }
        }
    }
}

/// `(file, name, start, count, stride)` of a read or write, checked against
/// the declared rank.
fn transfer_args(a: &[Value]) -> Result<(i64, String, Vec<i64>, Vec<i64>, i64), RuntimeError> {
    let rank = as_int(&a[2])?;
    let start = as_ints(&a[3])?;
    let count = as_ints(&a[4])?;
    if start.len() as i64 != rank || count.len() as i64 != rank {
        return Err(RuntimeError::TypeError(format!(
            "rank {} with {} starts and {} counts",
            rank,
            start.len(),
            count.len()
        )));
    }
    Ok((as_handle(&a[0])?, as_str(&a[1])?.to_owned(), start, count, as_int(&a[5])?))
}

fn index_tuple(base: &Value, index: &Value) -> Result<Value, RuntimeError> {
    match (base, index) {
        (Value::Tuple(items), Value::Int(i)) => usize::try_from(*i)
            .ok()
            .and_then(|i| items.get(i))
            .cloned()
            .ok_or_else(|| RuntimeError::TypeError(format!("tuple index {} out of range", i))),
        (base, index) => Err(RuntimeError::Unsupported(format!(
            "indexing {} with {}",
            base, index
        ))),
    }
}

fn as_int(v: &Value) -> Result<i64, RuntimeError> {
    match v {
        Value::Int(n) => Ok(*n),
        Value::Bool(b) => Ok(i64::from(*b)),
        other => Err(RuntimeError::TypeError(format!("expected an integer, got {}", other))),
    }
}

fn as_usize(v: &Value) -> Result<usize, RuntimeError> {
    let n = as_int(v)?;
    usize::try_from(n).map_err(|_| RuntimeError::TypeError(format!("negative extent {}", n)))
}

fn as_ints(v: &Value) -> Result<Vec<i64>, RuntimeError> {
    match v {
        Value::Tuple(items) => items.iter().map(as_int).collect(),
        other => Err(RuntimeError::TypeError(format!("expected a tuple, got {}", other))),
    }
}

fn as_str(v: &Value) -> Result<&str, RuntimeError> {
    match v {
        Value::Str(s) => Ok(s),
        other => Err(RuntimeError::TypeError(format!("expected a string, got {}", other))),
    }
}

fn as_handle(v: &Value) -> Result<i64, RuntimeError> {
    match v {
        Value::Handle(h) => Ok(*h),
        other => Err(RuntimeError::TypeError(format!("expected a handle, got {}", other))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::MemoryCatalog;
    use crate::ir::FuncBuilder;
    use crate::runtime::io::MemoryIo;

    #[test]
    fn front_end_calls_are_not_executable() {
        let mut b = FuncBuilder::new("f");
        let m = b.global("m", ModuleRef::Hdf5);
        let open = b.attr("open", &m, "File");
        let name = b.const_str("name", "a.h5");
        b.call("f", &open, &[&name], &[]);
        let func = b.build();
        let mut io = MemoryIo::new(MemoryCatalog::new());
        assert!(matches!(
            eval_function(&func, &[], &mut io),
            Err(RuntimeError::Unsupported(_))
        ));
    }

    #[test]
    fn negative_status_is_surfaced() {
        let mut b = FuncBuilder::new("f");
        let m = b.global("m", ModuleRef::IoAbi);
        let open = b.attr("open", &m, "open");
        let name = b.const_str("name", "missing.h5");
        let mode = b.const_str("mode", "r");
        let flag = b.const_int("flag", 0);
        b.call("f", &open, &[&name, &mode, &flag], &[]);
        let func = b.build();
        let mut io = MemoryIo::new(MemoryCatalog::new());
        assert!(matches!(
            eval_function(&func, &[], &mut io),
            Err(RuntimeError::CallFailed { entry: "open", status: -1 })
        ));
    }
}
