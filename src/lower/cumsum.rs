//! Spliced cumulative-sum helper.
//!
//! ```text
//! i32 hdl_cumsum_<kind>(ptr input, ptr output, i64 n):
//!   total = sum(input[0..n])
//!   running = exscan(total)
//!   for i in 0..n: running += input[i]; output[i] = running
//!   return 0
//! ```

use crate::abi::{DistEntry, ScalarKind};
use crate::codegen::llvm::{FnBuilder, FnSig, LlModule, LlType, LlValue};
use crate::error::CodegenError;

pub(crate) fn helper_name(kind: ScalarKind) -> String {
    format!("hdl_cumsum_{}", kind.suffix())
}

pub(crate) fn helper_sig() -> FnSig {
    FnSig::new(LlType::I32, vec![LlType::Ptr, LlType::Ptr, LlType::I64])
}

/// Defines the helper for `kind` in `module` unless already present.
pub(crate) fn ensure_helper(
    module: &mut LlModule,
    kind: ScalarKind,
) -> Result<String, CodegenError> {
    let name = helper_name(kind);
    if module.is_defined(&name) {
        return Ok(name);
    }

    let elem = kind.ll_type();
    let mut b = FnBuilder::new(
        module,
        &name,
        LlType::I32,
        &[(LlType::Ptr, "input"), (LlType::Ptr, "output"), (LlType::I64, "n")],
    )
    .internal();
    let input = LlValue::new(LlType::Ptr, "%input");
    let output = LlValue::new(LlType::Ptr, "%output");
    let n = LlValue::new(LlType::I64, "%n");

    let acc = b.alloca_in_entry(&elem)?;
    let counter = b.alloca_in_entry(&LlType::I64)?;
    b.store(&LlValue::zero(elem.clone()), &acc)?;
    b.store(&LlValue::const_i64(0), &counter)?;

    // Local total.
    counted_loop(&mut b, "sum", &counter, &n, |b, i| {
        let p = b.gep(&elem, &input, &[i.clone()])?;
        let x = b.load(&elem, &p)?;
        let t = b.load(&elem, &acc)?;
        let t = b.add(&t, &x)?;
        b.store(&t, &acc)
    })?;

    let total = b.load(&elem, &acc)?;
    let scan = DistEntry::Exscan(kind);
    let offset = b.call(&scan.symbol(), &scan.signature(), &[total])?;
    b.store(&offset, &acc)?;
    b.store(&LlValue::const_i64(0), &counter)?;

    // Running sum from this process's offset.
    counted_loop(&mut b, "write", &counter, &n, |b, i| {
        let p = b.gep(&elem, &input, &[i.clone()])?;
        let x = b.load(&elem, &p)?;
        let r = b.load(&elem, &acc)?;
        let r = b.add(&r, &x)?;
        b.store(&r, &acc)?;
        let q = b.gep(&elem, &output, &[i.clone()])?;
        b.store(&r, &q)
    })?;

    b.ret(Some(&LlValue::const_i32(0)))?;
    b.finish()?;
    Ok(name)
}

/// `for (counter = current; counter < n; counter++) body(counter)`.
fn counted_loop(
    b: &mut FnBuilder<'_>,
    hint: &str,
    counter: &LlValue,
    n: &LlValue,
    body: impl FnOnce(&mut FnBuilder<'_>, &LlValue) -> Result<(), CodegenError>,
) -> Result<(), CodegenError> {
    let cond = b.new_label(&format!("{}.cond", hint));
    let step = b.new_label(&format!("{}.body", hint));
    let done = b.new_label(&format!("{}.end", hint));

    b.br(&cond)?;
    b.position_at(&cond)?;
    let i = b.load(&LlType::I64, counter)?;
    let more = b.icmp("slt", &i, n)?;
    b.cond_br(&more, &step, &done)?;

    b.position_at(&step)?;
    body(b, &i)?;
    let next = b.add(&i, &LlValue::const_i64(1))?;
    b.store(&next, counter)?;
    b.br(&cond)?;

    b.position_at(&done)
}
