//! Element addressing for C-contiguous arrays.

use crate::abi::DistEntry;
use crate::codegen::llvm::{FnBuilder, LlType, LlValue};
use crate::error::LowerError;
use crate::ir::DType;

/// A lowered array: data pointer, per-dimension extents (i64), element type.
///
/// For a distributed array the extents are those of the local chunk.
#[derive(Debug, Clone, PartialEq)]
pub struct ArrayOperand {
    pub data: LlValue,
    pub shape: Vec<LlValue>,
    pub dtype: DType,
}

impl ArrayOperand {
    pub fn new(data: LlValue, shape: Vec<LlValue>, dtype: DType) -> Self {
        Self { data, shape, dtype }
    }

    pub fn ndim(&self) -> usize {
        self.shape.len()
    }

    pub fn elem_type(&self) -> LlType {
        LlType::from_dtype(self.dtype)
    }

    pub(crate) fn check(&self, primitive: &'static str) -> Result<(), LowerError> {
        if self.data.ty != LlType::Ptr {
            return Err(LowerError::InvalidOperand {
                primitive,
                detail: format!("array data must be a pointer, got '{}'", self.data.ty),
            });
        }
        if let Some(dim) = self.shape.iter().find(|d| d.ty != LlType::I64) {
            return Err(LowerError::InvalidOperand {
                primitive,
                detail: format!("array extents must be i64, got '{}'", dim.ty),
            });
        }
        Ok(())
    }
}

/// How the first index of an element address is interpreted.
#[derive(Debug, Clone, PartialEq)]
pub enum AddressMode {
    /// Indices are local to the array.
    Local,
    /// The first index is global; this process holds rows
    /// `[start, start + count)`. Out-of-chunk addresses resolve to the
    /// runtime's dummy slot.
    DistributedBounds { start: LlValue, count: LlValue },
}

/// Emits the address of `array[indices]`.
pub(crate) fn item_pointer(
    b: &mut FnBuilder<'_>,
    primitive: &'static str,
    array: &ArrayOperand,
    indices: &[LlValue],
    mode: &AddressMode,
) -> Result<LlValue, LowerError> {
    array.check(primitive)?;
    if indices.len() != array.ndim() || indices.is_empty() {
        return Err(LowerError::InvalidOperand {
            primitive,
            detail: format!(
                "{} indices for an array of rank {}",
                indices.len(),
                array.ndim()
            ),
        });
    }
    if let Some(idx) = indices.iter().find(|i| i.ty != LlType::I64) {
        return Err(LowerError::InvalidOperand {
            primitive,
            detail: format!("indices must be i64, got '{}'", idx.ty),
        });
    }

    let first = match mode {
        AddressMode::Local => indices[0].clone(),
        AddressMode::DistributedBounds { start, count } => {
            let entry = DistEntry::GetItemPointer;
            b.call(
                &entry.symbol(),
                &entry.signature(),
                &[indices[0].clone(), start.clone(), count.clone()],
            )?
        }
    };

    // Row-major: ((i0 * s1 + i1) * s2 + i2) ...
    let mut offset = first.clone();
    for (idx, extent) in indices.iter().zip(&array.shape).skip(1) {
        let scaled = b.mul(&offset, extent)?;
        offset = b.add(&scaled, idx)?;
    }
    let ptr = b.gep(&array.elem_type(), &array.data, &[offset])?;

    match mode {
        AddressMode::Local => Ok(ptr),
        AddressMode::DistributedBounds { .. } => {
            let outside = b.icmp("eq", &first, &LlValue::const_i64(-1))?;
            let entry = DistEntry::GetDummyPtr;
            let dummy = b.call(&entry.symbol(), &entry.signature(), &[])?;
            Ok(b.select(&outside, &dummy, &ptr)?)
        }
    }
}
