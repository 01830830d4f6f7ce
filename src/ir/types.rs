use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Element types understood by both native ABIs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DType {
    I8,
    U8,
    I32,
    U32,
    I64,
    U64,
    F32,
    F64,
}

impl DType {
    /// Integer tag passed to native entry points that take untyped buffers.
    pub fn type_tag(self) -> i32 {
        match self {
            DType::I8 => 0,
            DType::U8 => 1,
            DType::I32 => 2,
            DType::U32 => 3,
            DType::I64 => 4,
            DType::U64 => 5,
            DType::F32 => 6,
            DType::F64 => 7,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            DType::I8 => "int8",
            DType::U8 => "uint8",
            DType::I32 => "int32",
            DType::U32 => "uint32",
            DType::I64 => "int64",
            DType::U64 => "uint64",
            DType::F32 => "float32",
            DType::F64 => "float64",
        }
    }

    /// Parses both long names (`float64`) and array-protocol codes (`f8`, `<f8`).
    pub fn from_name(s: &str) -> Option<DType> {
        let s = s.trim_start_matches(['<', '>', '=', '|']);
        let dt = match s {
            "int8" | "i1" => DType::I8,
            "uint8" | "u1" => DType::U8,
            "int32" | "i4" => DType::I32,
            "uint32" | "u4" => DType::U32,
            "int64" | "i8" => DType::I64,
            "uint64" | "u8" => DType::U64,
            "float32" | "f4" => DType::F32,
            "float64" | "f8" => DType::F64,
            _ => return None,
        };
        Some(dt)
    }

    pub fn is_float(self) -> bool {
        matches!(self, DType::F32 | DType::F64)
    }

    pub fn byte_width(self) -> usize {
        match self {
            DType::I8 | DType::U8 => 1,
            DType::I32 | DType::U32 | DType::F32 => 4,
            DType::I64 | DType::U64 | DType::F64 => 8,
        }
    }
}

impl std::fmt::Display for DType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// A C-contiguous array type: element type plus rank.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ArrayType {
    pub dtype: DType,
    pub ndim: usize,
}

impl ArrayType {
    pub fn new(dtype: DType, ndim: usize) -> Self {
        Self { dtype, ndim }
    }
}

impl std::fmt::Display for ArrayType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "array({}, {}d, C)", self.dtype, self.ndim)
    }
}

/// Types the user declared for local variables, keyed by final variable name.
#[derive(Debug, Clone, Default)]
pub struct UserTypes {
    decls: HashMap<String, ArrayType>,
}

impl UserTypes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn declare(&mut self, name: impl Into<String>, ty: ArrayType) -> &mut Self {
        self.decls.insert(name.into(), ty);
        self
    }

    pub fn get(&self, name: &str) -> Option<ArrayType> {
        self.decls.get(name).copied()
    }

    /// Declarations sorted by name.
    pub fn iter(&self) -> impl Iterator<Item = (&str, ArrayType)> + '_ {
        let mut v: Vec<_> = self.decls.iter().map(|(k, t)| (k.as_str(), *t)).collect();
        v.sort_by(|a, b| a.0.cmp(b.0));
        v.into_iter()
    }

    pub fn len(&self) -> usize {
        self.decls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.decls.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dtype_codes_round_through_names() {
        assert_eq!(DType::from_name("f8"), Some(DType::F64));
        assert_eq!(DType::from_name("<i4"), Some(DType::I32));
        assert_eq!(DType::from_name("float32"), Some(DType::F32));
        assert_eq!(DType::from_name("complex128"), None);
    }

    #[test]
    fn type_tags_are_distinct() {
        let all = [
            DType::I8,
            DType::U8,
            DType::I32,
            DType::U32,
            DType::I64,
            DType::U64,
            DType::F32,
            DType::F64,
        ];
        let mut tags: Vec<i32> = all.iter().map(|d| d.type_tag()).collect();
        tags.dedup();
        assert_eq!(tags.len(), all.len());
    }
}
