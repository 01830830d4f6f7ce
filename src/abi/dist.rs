use crate::codegen::llvm::{FnSig, LlType};

/// Scalar kinds with dedicated reduce/scan entry points.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScalarKind {
    I32,
    I64,
    F32,
    F64,
}

impl ScalarKind {
    pub fn from_ll(ty: &LlType) -> Option<ScalarKind> {
        match ty {
            LlType::I32 => Some(ScalarKind::I32),
            LlType::I64 => Some(ScalarKind::I64),
            LlType::F32 => Some(ScalarKind::F32),
            LlType::F64 => Some(ScalarKind::F64),
            _ => None,
        }
    }

    pub fn ll_type(self) -> LlType {
        match self {
            ScalarKind::I32 => LlType::I32,
            ScalarKind::I64 => LlType::I64,
            ScalarKind::F32 => LlType::F32,
            ScalarKind::F64 => LlType::F64,
        }
    }

    /// Symbol suffix: kind letter plus byte width.
    pub fn suffix(self) -> &'static str {
        match self {
            ScalarKind::I32 => "i4",
            ScalarKind::I64 => "i8",
            ScalarKind::F32 => "f4",
            ScalarKind::F64 => "f8",
        }
    }
}

/// Entry points of the distributed communication ABI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DistEntry {
    GetRank,
    GetSize,
    GetEnd,
    GetNodePortion,
    GetTime,
    Reduce(ScalarKind),
    ArrReduce,
    Exscan(ScalarKind),
    Isend,
    Irecv,
    Wait,
    GetItemPointer,
    GetDummyPtr,
}

const PREFIX: &str = "hdl_dist_";

impl DistEntry {
    pub fn symbol(self) -> String {
        let base = match self {
            DistEntry::GetRank => "get_rank".to_owned(),
            DistEntry::GetSize => "get_size".to_owned(),
            DistEntry::GetEnd => "get_end".to_owned(),
            DistEntry::GetNodePortion => "get_node_portion".to_owned(),
            DistEntry::GetTime => "get_time".to_owned(),
            DistEntry::Reduce(k) => format!("reduce_{}", k.suffix()),
            DistEntry::ArrReduce => "arr_reduce".to_owned(),
            DistEntry::Exscan(k) => format!("exscan_{}", k.suffix()),
            DistEntry::Isend => "isend".to_owned(),
            DistEntry::Irecv => "irecv".to_owned(),
            DistEntry::Wait => "wait".to_owned(),
            DistEntry::GetItemPointer => "get_item_pointer".to_owned(),
            DistEntry::GetDummyPtr => "get_dummy_ptr".to_owned(),
        };
        format!("{}{}", PREFIX, base)
    }

    pub fn signature(self) -> FnSig {
        use LlType::*;
        match self {
            DistEntry::GetRank | DistEntry::GetSize => FnSig::new(I32, vec![]),
            DistEntry::GetEnd | DistEntry::GetNodePortion => {
                FnSig::new(I64, vec![I64, I64, I32, I32])
            }
            DistEntry::GetTime => FnSig::new(F64, vec![]),
            DistEntry::Reduce(k) | DistEntry::Exscan(k) => {
                FnSig::new(k.ll_type(), vec![k.ll_type()])
            }
            // data, shape vector, rank, type tag
            DistEntry::ArrReduce => FnSig::new(I32, vec![Ptr, Ptr, I32, I32]),
            // data, count, type tag, peer, tag, cond
            DistEntry::Isend | DistEntry::Irecv => {
                FnSig::new(I32, vec![Ptr, I32, I32, I32, I32, I1])
            }
            DistEntry::Wait => FnSig::new(I32, vec![I32, I1]),
            DistEntry::GetItemPointer => FnSig::new(I64, vec![I64, I64, I64]),
            DistEntry::GetDummyPtr => FnSig::new(Ptr, vec![]),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn typed_entries_get_distinct_symbols() {
        assert_eq!(DistEntry::Reduce(ScalarKind::I32).symbol(), "hdl_dist_reduce_i4");
        assert_eq!(DistEntry::Exscan(ScalarKind::F64).symbol(), "hdl_dist_exscan_f8");
        assert_ne!(
            DistEntry::Reduce(ScalarKind::F32).symbol(),
            DistEntry::Reduce(ScalarKind::I32).symbol()
        );
    }

    #[test]
    fn scan_signature_follows_kind() {
        let sig = DistEntry::Exscan(ScalarKind::I64).signature();
        assert_eq!(sig.ret, LlType::I64);
        assert_eq!(sig.params, vec![LlType::I64]);
    }
}
