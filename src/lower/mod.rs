//! Distributed-array primitives → native communication ABI.
//!
//! `DistLowering` wraps the function builder of the code being generated and
//! emits one ABI call sequence per primitive. Every entry point is declared in
//! the module on first use with the signature from `abi::dist`; a spliced
//! helper (cumulative sum) is defined once per element kind.
//!
//! Collectives are emitted in source order and are not reordered; callers
//! keep control flow uniform across processes.

pub mod address;
mod cumsum;

pub use address::{AddressMode, ArrayOperand};

use tracing::trace;

use crate::abi::{DistEntry, ScalarKind};
use crate::codegen::llvm::{FnBuilder, LlType, LlValue};
use crate::error::LowerError;
use crate::ir::DType;

/// Operands of a non-blocking send or receive.
#[derive(Debug, Clone, PartialEq)]
pub struct Transfer {
    pub array: ArrayOperand,
    /// Number of elements (i32).
    pub count: LlValue,
    pub peer: LlValue,
    pub tag: LlValue,
    /// When false the native side returns without communicating.
    pub cond: LlValue,
}

/// A distributed primitive with lowered operands.
#[derive(Debug, Clone, PartialEq)]
pub enum DistPrimitive {
    Rank,
    Size,
    End {
        total: LlValue,
        chunks: LlValue,
        worker: LlValue,
        workers: LlValue,
    },
    Portion {
        total: LlValue,
        chunks: LlValue,
        worker: LlValue,
        workers: LlValue,
    },
    Time,
    Reduce(LlValue),
    ArrayReduce(ArrayOperand),
    ExclusiveScan(LlValue),
    CumulativeSum {
        input: ArrayOperand,
        output: ArrayOperand,
    },
    ISend(Transfer),
    IRecv(Transfer),
    Wait {
        request: LlValue,
        cond: LlValue,
    },
    SetItem {
        array: ArrayOperand,
        indices: Vec<LlValue>,
        value: LlValue,
        start: LlValue,
        count: LlValue,
    },
}

impl DistPrimitive {
    pub fn name(&self) -> &'static str {
        match self {
            DistPrimitive::Rank => "rank",
            DistPrimitive::Size => "size",
            DistPrimitive::End { .. } => "end",
            DistPrimitive::Portion { .. } => "portion",
            DistPrimitive::Time => "time",
            DistPrimitive::Reduce(_) => "reduce",
            DistPrimitive::ArrayReduce(_) => "array_reduce",
            DistPrimitive::ExclusiveScan(_) => "exclusive_scan",
            DistPrimitive::CumulativeSum { .. } => "cumulative_sum",
            DistPrimitive::ISend(_) => "isend",
            DistPrimitive::IRecv(_) => "irecv",
            DistPrimitive::Wait { .. } => "wait",
            DistPrimitive::SetItem { .. } => "dist_setitem",
        }
    }
}

/// Emits distributed primitives into the function under construction.
pub struct DistLowering<'a, 'm> {
    b: &'a mut FnBuilder<'m>,
}

impl<'a, 'm> DistLowering<'a, 'm> {
    pub fn new(b: &'a mut FnBuilder<'m>) -> Self {
        Self { b }
    }

    /// Lowers one primitive and returns its result value.
    pub fn lower(&mut self, prim: &DistPrimitive) -> Result<LlValue, LowerError> {
        trace!(primitive = prim.name(), "lowering distributed primitive");
        match prim {
            DistPrimitive::Rank => self.rank(),
            DistPrimitive::Size => self.size(),
            DistPrimitive::End {
                total,
                chunks,
                worker,
                workers,
            } => self.end(total, chunks, worker, workers),
            DistPrimitive::Portion {
                total,
                chunks,
                worker,
                workers,
            } => self.portion(total, chunks, worker, workers),
            DistPrimitive::Time => self.time(),
            DistPrimitive::Reduce(v) => self.reduce(v),
            DistPrimitive::ArrayReduce(a) => self.array_reduce(a),
            DistPrimitive::ExclusiveScan(v) => self.exclusive_scan(v),
            DistPrimitive::CumulativeSum { input, output } => self.cumulative_sum(input, output),
            DistPrimitive::ISend(t) => self.isend(t),
            DistPrimitive::IRecv(t) => self.irecv(t),
            DistPrimitive::Wait { request, cond } => self.wait(request, cond),
            DistPrimitive::SetItem {
                array,
                indices,
                value,
                start,
                count,
            } => self.dist_setitem(array, indices, value, start, count),
        }
    }

    pub fn rank(&mut self) -> Result<LlValue, LowerError> {
        self.call(DistEntry::GetRank, &[])
    }

    pub fn size(&mut self) -> Result<LlValue, LowerError> {
        self.call(DistEntry::GetSize, &[])
    }

    /// Exclusive end offset of `worker`'s chunk.
    pub fn end(
        &mut self,
        total: &LlValue,
        chunks: &LlValue,
        worker: &LlValue,
        workers: &LlValue,
    ) -> Result<LlValue, LowerError> {
        check_partition_args("end", total, chunks, worker, workers)?;
        self.call(
            DistEntry::GetEnd,
            &[total.clone(), chunks.clone(), worker.clone(), workers.clone()],
        )
    }

    /// Length of `worker`'s chunk.
    pub fn portion(
        &mut self,
        total: &LlValue,
        chunks: &LlValue,
        worker: &LlValue,
        workers: &LlValue,
    ) -> Result<LlValue, LowerError> {
        check_partition_args("portion", total, chunks, worker, workers)?;
        self.call(
            DistEntry::GetNodePortion,
            &[total.clone(), chunks.clone(), worker.clone(), workers.clone()],
        )
    }

    pub fn time(&mut self) -> Result<LlValue, LowerError> {
        self.call(DistEntry::GetTime, &[])
    }

    /// All-reduce (sum) of a scalar.
    pub fn reduce(&mut self, value: &LlValue) -> Result<LlValue, LowerError> {
        let kind = scalar_kind("reduce", &value.ty)?;
        self.call(DistEntry::Reduce(kind), &[value.clone()])
    }

    /// Element-wise in-place all-reduce of an array.
    ///
    /// The extents are spilled to a `[ndim x i64]` stack slot in the entry
    /// block whose address is passed alongside the rank and the element
    /// type tag.
    pub fn array_reduce(&mut self, array: &ArrayOperand) -> Result<LlValue, LowerError> {
        array.check("array_reduce")?;
        let ndim = array.ndim();
        let shape_ty = LlType::Array(ndim, Box::new(LlType::I64));
        let shape = self.b.alloca_in_entry(&shape_ty)?;
        for (k, extent) in array.shape.iter().enumerate() {
            let slot = self.b.gep(
                &shape_ty,
                &shape,
                &[LlValue::const_i64(0), LlValue::const_i64(k as i64)],
            )?;
            self.b.store(extent, &slot)?;
        }
        self.call(
            DistEntry::ArrReduce,
            &[
                array.data.clone(),
                shape,
                LlValue::const_i32(ndim as i32),
                LlValue::const_i32(array.dtype.type_tag()),
            ],
        )
    }

    /// Exclusive prefix sum across ranks; rank 0 receives zero.
    pub fn exclusive_scan(&mut self, value: &LlValue) -> Result<LlValue, LowerError> {
        let kind = scalar_kind("exclusive_scan", &value.ty)?;
        self.call(DistEntry::Exscan(kind), &[value.clone()])
    }

    /// Global inclusive prefix sum of the flattened local chunk of `input`
    /// into `output`. Returns the helper's status (i32 0).
    pub fn cumulative_sum(
        &mut self,
        input: &ArrayOperand,
        output: &ArrayOperand,
    ) -> Result<LlValue, LowerError> {
        input.check("cumulative_sum")?;
        output.check("cumulative_sum")?;
        if input.dtype != output.dtype {
            return Err(LowerError::InvalidOperand {
                primitive: "cumulative_sum",
                detail: format!("input is {} but output is {}", input.dtype, output.dtype),
            });
        }
        let kind = dtype_kind("cumulative_sum", input.dtype)?;

        let mut n = LlValue::const_i64(1);
        for extent in &input.shape {
            n = self.b.mul(&n, extent)?;
        }
        let helper = cumsum::ensure_helper(self.b.module(), kind)?;
        Ok(self.b.call(
            &helper,
            &cumsum::helper_sig(),
            &[input.data.clone(), output.data.clone(), n],
        )?)
    }

    pub fn isend(&mut self, t: &Transfer) -> Result<LlValue, LowerError> {
        let args = self.transfer_args("isend", t)?;
        self.call(DistEntry::Isend, &args)
    }

    pub fn irecv(&mut self, t: &Transfer) -> Result<LlValue, LowerError> {
        let args = self.transfer_args("irecv", t)?;
        self.call(DistEntry::Irecv, &args)
    }

    /// Blocks on a request returned by `isend`/`irecv`.
    pub fn wait(&mut self, request: &LlValue, cond: &LlValue) -> Result<LlValue, LowerError> {
        expect_ty("wait", "request", request, &LlType::I32)?;
        expect_ty("wait", "cond", cond, &LlType::I1)?;
        self.call(DistEntry::Wait, &[request.clone(), cond.clone()])
    }

    /// Stores `value` at the global index `indices` of a distributed array
    /// whose local chunk covers rows `[start, start + count)`.
    ///
    /// Rows owned by another process land in the dummy slot. Returns i32 0.
    pub fn dist_setitem(
        &mut self,
        array: &ArrayOperand,
        indices: &[LlValue],
        value: &LlValue,
        start: &LlValue,
        count: &LlValue,
    ) -> Result<LlValue, LowerError> {
        expect_ty("dist_setitem", "start", start, &LlType::I64)?;
        expect_ty("dist_setitem", "count", count, &LlType::I64)?;
        expect_ty("dist_setitem", "value", value, &array.elem_type())?;
        let mode = AddressMode::DistributedBounds {
            start: start.clone(),
            count: count.clone(),
        };
        let ptr = address::item_pointer(self.b, "dist_setitem", array, indices, &mode)?;
        self.b.store(value, &ptr)?;
        Ok(LlValue::const_i32(0))
    }

    /// Plain element read; reads are always chunk-local.
    pub fn getitem(
        &mut self,
        array: &ArrayOperand,
        indices: &[LlValue],
    ) -> Result<LlValue, LowerError> {
        let ptr = address::item_pointer(self.b, "getitem", array, indices, &AddressMode::Local)?;
        Ok(self.b.load(&array.elem_type(), &ptr)?)
    }

    fn transfer_args(
        &self,
        primitive: &'static str,
        t: &Transfer,
    ) -> Result<Vec<LlValue>, LowerError> {
        t.array.check(primitive)?;
        expect_ty(primitive, "count", &t.count, &LlType::I32)?;
        expect_ty(primitive, "peer", &t.peer, &LlType::I32)?;
        expect_ty(primitive, "tag", &t.tag, &LlType::I32)?;
        expect_ty(primitive, "cond", &t.cond, &LlType::I1)?;
        Ok(vec![
            t.array.data.clone(),
            t.count.clone(),
            LlValue::const_i32(t.array.dtype.type_tag()),
            t.peer.clone(),
            t.tag.clone(),
            t.cond.clone(),
        ])
    }

    fn call(&mut self, entry: DistEntry, args: &[LlValue]) -> Result<LlValue, LowerError> {
        Ok(self.b.call(&entry.symbol(), &entry.signature(), args)?)
    }
}

fn scalar_kind(primitive: &'static str, ty: &LlType) -> Result<ScalarKind, LowerError> {
    ScalarKind::from_ll(ty).ok_or_else(|| LowerError::UnsupportedType {
        primitive,
        ty: ty.to_string(),
    })
}

/// Signed and floating element types with scan entry points.
fn dtype_kind(primitive: &'static str, dtype: DType) -> Result<ScalarKind, LowerError> {
    match dtype {
        DType::I32 => Ok(ScalarKind::I32),
        DType::I64 => Ok(ScalarKind::I64),
        DType::F32 => Ok(ScalarKind::F32),
        DType::F64 => Ok(ScalarKind::F64),
        other => Err(LowerError::UnsupportedType {
            primitive,
            ty: other.to_string(),
        }),
    }
}

fn expect_ty(
    primitive: &'static str,
    what: &str,
    v: &LlValue,
    ty: &LlType,
) -> Result<(), LowerError> {
    if &v.ty == ty {
        return Ok(());
    }
    Err(LowerError::InvalidOperand {
        primitive,
        detail: format!("{} must be '{}', got '{}'", what, ty, v.ty),
    })
}

fn check_partition_args(
    primitive: &'static str,
    total: &LlValue,
    chunks: &LlValue,
    worker: &LlValue,
    workers: &LlValue,
) -> Result<(), LowerError> {
    expect_ty(primitive, "total", total, &LlType::I64)?;
    expect_ty(primitive, "chunks", chunks, &LlType::I64)?;
    expect_ty(primitive, "worker", worker, &LlType::I32)?;
    expect_ty(primitive, "workers", workers, &LlType::I32)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codegen::llvm::LlModule;
    use crate::config::Config;

    #[test]
    fn reduce_rejects_bool() {
        let mut m = LlModule::new("t", &Config::default());
        let mut b = FnBuilder::new(&mut m, "f", LlType::Void, &[]);
        let err = DistLowering::new(&mut b)
            .reduce(&LlValue::const_bool(true))
            .unwrap_err();
        assert!(matches!(err, LowerError::UnsupportedType { primitive: "reduce", .. }));
    }

    #[test]
    fn unsigned_cumsum_is_unsupported() {
        let mut m = LlModule::new("t", &Config::default());
        let mut b = FnBuilder::new(&mut m, "f", LlType::Void, &[(LlType::Ptr, "a")]);
        let a = ArrayOperand::new(
            LlValue::new(LlType::Ptr, "%a"),
            vec![LlValue::const_i64(4)],
            DType::U64,
        );
        let err = DistLowering::new(&mut b).cumulative_sum(&a, &a).unwrap_err();
        assert!(matches!(err, LowerError::UnsupportedType { .. }));
    }

    #[test]
    fn partition_args_are_type_checked() {
        let mut m = LlModule::new("t", &Config::default());
        let mut b = FnBuilder::new(&mut m, "f", LlType::Void, &[]);
        let err = DistLowering::new(&mut b)
            .end(
                &LlValue::const_i32(10),
                &LlValue::const_i64(2),
                &LlValue::const_i32(0),
                &LlValue::const_i32(2),
            )
            .unwrap_err();
        assert!(matches!(err, LowerError::InvalidOperand { primitive: "end", .. }));
    }
}
