//! Integration tests for the distributed lowering.
//! Lowers primitives into a fresh LLVM module and inspects the emitted text.

use hdlower::abi::{DistEntry, ScalarKind};
use hdlower::codegen::{FnBuilder, LlModule, LlType, LlValue};
use hdlower::error::{CodegenError, LowerError};
use hdlower::ir::DType;
use hdlower::lower::{ArrayOperand, DistLowering, DistPrimitive, Transfer};
use hdlower::Config;

/// Lowers `prims` inside `define void @kernel(ptr %a, ptr %b, i64 %n)` and
/// returns the module text.
fn lower_all(prims: &[DistPrimitive]) -> Result<String, LowerError> {
    let mut module = LlModule::new("dist", &Config::default());
    let mut b = FnBuilder::new(
        &mut module,
        "kernel",
        LlType::Void,
        &[(LlType::Ptr, "a"), (LlType::Ptr, "b"), (LlType::I64, "n")],
    );
    {
        let mut lowering = DistLowering::new(&mut b);
        for p in prims {
            lowering.lower(p)?;
        }
    }
    b.ret(None)?;
    b.finish()?;
    Ok(module.emit()?)
}

fn array(name: &str, dtype: DType, shape: Vec<LlValue>) -> ArrayOperand {
    ArrayOperand::new(LlValue::new(LlType::Ptr, format!("%{}", name)), shape, dtype)
}

fn n() -> LlValue {
    LlValue::new(LlType::I64, "%n")
}

#[test]
fn rank_and_size_are_zero_argument_queries() {
    let text = lower_all(&[DistPrimitive::Rank, DistPrimitive::Size, DistPrimitive::Time]).unwrap();
    assert!(text.contains("declare i32 @hdl_dist_get_rank()"));
    assert!(text.contains("declare i32 @hdl_dist_get_size()"));
    assert!(text.contains("declare double @hdl_dist_get_time()"));
    assert!(text.contains("call i32 @hdl_dist_get_rank()"));
}

#[test]
fn partition_queries_pass_all_four_operands() {
    let args = || {
        (
            n(),
            LlValue::const_i64(4),
            LlValue::const_i32(1),
            LlValue::const_i32(4),
        )
    };
    let (total, chunks, worker, workers) = args();
    let end = DistPrimitive::End {
        total,
        chunks,
        worker,
        workers,
    };
    let (total, chunks, worker, workers) = args();
    let portion = DistPrimitive::Portion {
        total,
        chunks,
        worker,
        workers,
    };
    let text = lower_all(&[end, portion]).unwrap();
    assert!(text.contains("declare i64 @hdl_dist_get_end(i64, i64, i32, i32)"));
    assert!(text.contains("call i64 @hdl_dist_get_end(i64 %n, i64 4, i32 1, i32 4)"));
    assert!(text.contains("call i64 @hdl_dist_get_node_portion(i64 %n, i64 4, i32 1, i32 4)"));
}

#[test]
fn reduce_dispatches_on_operand_type() {
    let text = lower_all(&[
        DistPrimitive::Reduce(LlValue::const_i32(1)),
        DistPrimitive::Reduce(n()),
        DistPrimitive::Reduce(LlValue::new(LlType::F32, "1.0")),
        DistPrimitive::Reduce(LlValue::new(LlType::F64, "2.5")),
    ])
    .unwrap();
    for kind in [ScalarKind::I32, ScalarKind::I64, ScalarKind::F32, ScalarKind::F64] {
        let sym = DistEntry::Reduce(kind).symbol();
        assert!(text.contains(&format!("@{}(", sym)), "missing {}", sym);
    }
    assert!(text.contains("call double @hdl_dist_reduce_f8(double 2.5)"));
}

#[test]
fn reduce_on_bool_is_rejected() {
    let err = lower_all(&[DistPrimitive::Reduce(LlValue::const_bool(true))]).unwrap_err();
    assert!(matches!(
        err,
        LowerError::UnsupportedType { primitive: "reduce", ref ty } if ty == "i1"
    ));
}

#[test]
fn exclusive_scan_has_per_kind_entry() {
    let text = lower_all(&[DistPrimitive::ExclusiveScan(n())]).unwrap();
    assert!(text.contains("declare i64 @hdl_dist_exscan_i8(i64)"));
    assert!(text.contains("call i64 @hdl_dist_exscan_i8(i64 %n)"));
}

#[test]
fn array_reduce_spills_shape_to_stack() {
    let a = array("a", DType::F32, vec![n(), LlValue::const_i64(3)]);
    let text = lower_all(&[DistPrimitive::ArrayReduce(a)]).unwrap();
    assert!(text.contains("alloca [2 x i64]"));
    assert!(text.contains("store i64 %n,"));
    assert!(text.contains("store i64 3,"));
    // rank 2, f32 type tag 6
    assert!(text.contains("@hdl_dist_arr_reduce(ptr %a, ptr %t0, i32 2, i32 6)"));
}

#[test]
fn cumulative_sum_splices_one_helper_per_kind() {
    let prims = [
        DistPrimitive::CumulativeSum {
            input: array("a", DType::F64, vec![n()]),
            output: array("b", DType::F64, vec![n()]),
        },
        DistPrimitive::CumulativeSum {
            input: array("b", DType::F64, vec![n()]),
            output: array("a", DType::F64, vec![n()]),
        },
    ];
    let text = lower_all(&prims).unwrap();
    assert_eq!(text.matches("define internal i32 @hdl_cumsum_f8(").count(), 1);
    assert_eq!(text.matches("call i32 @hdl_cumsum_f8(").count(), 2);
    assert!(!text.contains("declare i32 @hdl_cumsum_f8"));

    // The helper scans its local total exactly once.
    let helper_start = text.find("define internal i32 @hdl_cumsum_f8(").unwrap();
    let helper = &text[helper_start..];
    let helper = &helper[..helper.find("\n}\n").unwrap()];
    assert_eq!(helper.matches("call double @hdl_dist_exscan_f8(").count(), 1);
    assert!(helper.contains("fadd double"));
    assert!(helper.contains("icmp slt i64"));

    // Local total first, then the scan, then the running write loop.
    let sum_end = helper.find("\nsum.end").unwrap();
    let scan = helper.find("call double @hdl_dist_exscan_f8(").unwrap();
    let write_cond = helper.find("\nwrite.cond").unwrap();
    assert!(sum_end < scan && scan < write_cond);

    // Accumulator and counter live in the entry block, ahead of both loops.
    let first_label = helper.find("\nsum.cond").unwrap();
    assert_eq!(helper[..first_label].matches(" = alloca ").count(), 2);
    assert_eq!(helper.matches(" = alloca ").count(), 2);
}

#[test]
fn array_reduce_in_loop_allocates_shape_once() {
    let mut module = LlModule::new("dist", &Config::default());
    let mut b = FnBuilder::new(
        &mut module,
        "kernel",
        LlType::Void,
        &[(LlType::Ptr, "a"), (LlType::I64, "n")],
    );
    let body = b.new_label("loop");
    b.br(&body).unwrap();
    b.position_at(&body).unwrap();
    DistLowering::new(&mut b)
        .array_reduce(&array("a", DType::F64, vec![n()]))
        .unwrap();
    b.br(&body).unwrap();
    b.finish().unwrap();
    let text = module.emit().unwrap();

    let alloca = text.find("alloca [1 x i64]").unwrap();
    let entry = text.find("entry:").unwrap();
    let loop_label = text.find("\nloop0:").unwrap();
    assert!(entry < alloca && alloca < loop_label);
    assert_eq!(text.matches("alloca").count(), 1);
    let in_loop = &text[loop_label..];
    assert!(in_loop.contains("call i32 @hdl_dist_arr_reduce(ptr %a, ptr %t0, i32 1, i32 7)"));
}

#[test]
fn cumulative_sum_requires_matching_types() {
    let err = lower_all(&[DistPrimitive::CumulativeSum {
        input: array("a", DType::F64, vec![n()]),
        output: array("b", DType::F32, vec![n()]),
    }])
    .unwrap_err();
    assert!(matches!(err, LowerError::InvalidOperand { primitive: "cumulative_sum", .. }));
}

#[test]
fn isend_irecv_wait_carry_condition_and_type_tag() {
    let transfer = Transfer {
        array: array("a", DType::I64, vec![n()]),
        count: LlValue::const_i32(8),
        peer: LlValue::const_i32(1),
        tag: LlValue::const_i32(11),
        cond: LlValue::const_bool(true),
    };
    let text = lower_all(&[
        DistPrimitive::ISend(transfer.clone()),
        DistPrimitive::IRecv(transfer),
        DistPrimitive::Wait {
            request: LlValue::new(LlType::I32, "%t0"),
            cond: LlValue::const_bool(false),
        },
    ])
    .unwrap();
    let operands = "(ptr %a, i32 8, i32 4, i32 1, i32 11, i1 true)";
    assert!(text.contains(&format!("call i32 @hdl_dist_isend{}", operands)));
    assert!(text.contains(&format!("call i32 @hdl_dist_irecv{}", operands)));
    assert!(text.contains("call i32 @hdl_dist_wait(i32 %t0, i1 false)"));
}

#[test]
fn transfer_count_must_be_i32() {
    let transfer = Transfer {
        array: array("a", DType::I64, vec![n()]),
        count: n(),
        peer: LlValue::const_i32(1),
        tag: LlValue::const_i32(0),
        cond: LlValue::const_bool(true),
    };
    let err = lower_all(&[DistPrimitive::ISend(transfer)]).unwrap_err();
    assert!(matches!(err, LowerError::InvalidOperand { primitive: "isend", .. }));
}

#[test]
fn dist_setitem_redirects_out_of_chunk_stores() {
    let a = array("a", DType::F64, vec![n(), LlValue::const_i64(4)]);
    let text = lower_all(&[DistPrimitive::SetItem {
        array: a,
        indices: vec![LlValue::const_i64(7), LlValue::const_i64(2)],
        value: LlValue::new(LlType::F64, "1.5"),
        start: LlValue::const_i64(5),
        count: n(),
    }])
    .unwrap();

    let body_start = text.find("define void @kernel(").unwrap();
    let body = &text[body_start..];
    let translate = body.find("call i64 @hdl_dist_get_item_pointer(i64 7, i64 5, i64 %n)").unwrap();
    let check = body.find("icmp eq i64").unwrap();
    let dummy = body.find("call ptr @hdl_dist_get_dummy_ptr()").unwrap();
    let select = body.find("select i1").unwrap();
    let store = body.find("store double 1.5, ptr").unwrap();
    assert!(translate < check && check < select && dummy < select && select < store);
    assert!(body.contains(", -1"));
}

#[test]
fn local_getitem_never_translates_indices() {
    let mut module = LlModule::new("dist", &Config::default());
    let mut b = FnBuilder::new(
        &mut module,
        "get",
        LlType::F64,
        &[(LlType::Ptr, "a"), (LlType::I64, "n")],
    );
    let a = array("a", DType::F64, vec![n(), LlValue::const_i64(4)]);
    let v = DistLowering::new(&mut b)
        .getitem(&a, &[LlValue::const_i64(1), LlValue::const_i64(2)])
        .unwrap();
    b.ret(Some(&v)).unwrap();
    b.finish().unwrap();
    let text = module.emit().unwrap();
    assert!(!text.contains("get_item_pointer"));
    assert!(!text.contains("get_dummy_ptr"));
    assert!(text.contains("getelementptr inbounds double, ptr %a"));
}

#[test]
fn conflicting_user_declaration_is_a_codegen_error() {
    let mut module = LlModule::new("dist", &Config::default());
    module
        .get_or_insert_function(
            &DistEntry::GetRank.symbol(),
            &hdlower::codegen::FnSig::new(LlType::I64, vec![]),
        )
        .unwrap();
    let mut b = FnBuilder::new(&mut module, "kernel", LlType::Void, &[]);
    let err = DistLowering::new(&mut b).rank().unwrap_err();
    assert!(matches!(err, LowerError::Codegen(CodegenError::SignatureConflict { .. })));
}
