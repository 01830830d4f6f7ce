//! Minimal LLVM IR text builder.
//!
//! Enough of a builder API (module, function builder, typed values)
//! for the distributed lowering to emit native ABI calls and to splice its
//! helper routines. Output is deterministic: declarations and definitions are
//! printed in first-use order.

use std::fmt::Write;

use indexmap::IndexMap;

use crate::config::Config;
use crate::error::CodegenError;
use crate::ir::DType;

/// First-class LLVM types used by the lowering.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum LlType {
    Void,
    I1,
    I8,
    I32,
    I64,
    F32,
    F64,
    /// Opaque pointer.
    Ptr,
    Array(usize, Box<LlType>),
}

impl LlType {
    /// Storage type of an array element.
    pub fn from_dtype(dtype: DType) -> LlType {
        match dtype {
            DType::I8 | DType::U8 => LlType::I8,
            DType::I32 | DType::U32 => LlType::I32,
            DType::I64 | DType::U64 => LlType::I64,
            DType::F32 => LlType::F32,
            DType::F64 => LlType::F64,
        }
    }

    pub fn is_float(&self) -> bool {
        matches!(self, LlType::F32 | LlType::F64)
    }

    pub fn is_int(&self) -> bool {
        matches!(self, LlType::I1 | LlType::I8 | LlType::I32 | LlType::I64)
    }
}

impl std::fmt::Display for LlType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LlType::Void => f.write_str("void"),
            LlType::I1 => f.write_str("i1"),
            LlType::I8 => f.write_str("i8"),
            LlType::I32 => f.write_str("i32"),
            LlType::I64 => f.write_str("i64"),
            LlType::F32 => f.write_str("float"),
            LlType::F64 => f.write_str("double"),
            LlType::Ptr => f.write_str("ptr"),
            LlType::Array(n, elem) => write!(f, "[{} x {}]", n, elem),
        }
    }
}

/// A typed operand: either a register (`%t3`, `%arg`) or an immediate.
#[derive(Debug, Clone, PartialEq)]
pub struct LlValue {
    pub ty: LlType,
    pub repr: String,
}

impl LlValue {
    pub fn new(ty: LlType, repr: impl Into<String>) -> Self {
        Self {
            ty,
            repr: repr.into(),
        }
    }

    pub fn const_int(ty: LlType, value: i64) -> Self {
        Self::new(ty, value.to_string())
    }

    pub fn const_i32(value: i32) -> Self {
        Self::const_int(LlType::I32, value as i64)
    }

    pub fn const_i64(value: i64) -> Self {
        Self::const_int(LlType::I64, value)
    }

    pub fn const_bool(value: bool) -> Self {
        Self::new(LlType::I1, if value { "true" } else { "false" })
    }

    /// The additive identity of `ty`.
    pub fn zero(ty: LlType) -> Self {
        let repr = match ty {
            LlType::F32 | LlType::F64 => "0.0",
            LlType::Ptr => "null",
            _ => "0",
        };
        Self::new(ty, repr)
    }

    fn void() -> Self {
        Self::new(LlType::Void, "")
    }

    /// `<type> <repr>` as used in operand lists.
    pub fn typed(&self) -> String {
        format!("{} {}", self.ty, self.repr)
    }
}

/// A function signature.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FnSig {
    pub ret: LlType,
    pub params: Vec<LlType>,
}

impl FnSig {
    pub fn new(ret: LlType, params: Vec<LlType>) -> Self {
        Self { ret, params }
    }
}

impl std::fmt::Display for FnSig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let params: Vec<String> = self.params.iter().map(|p| p.to_string()).collect();
        write!(f, "{} ({})", self.ret, params.join(", "))
    }
}

/// A module under construction: external declarations plus definitions.
#[derive(Debug)]
pub struct LlModule {
    pub name: String,
    target_triple: String,
    data_layout: String,
    declares: IndexMap<String, FnSig>,
    definitions: IndexMap<String, String>,
}

impl LlModule {
    pub fn new(name: impl Into<String>, config: &Config) -> Self {
        Self {
            name: name.into(),
            target_triple: config.target_triple.clone(),
            data_layout: config.data_layout.clone(),
            declares: IndexMap::new(),
            definitions: IndexMap::new(),
        }
    }

    /// Declares `name` with `sig` unless already present.
    ///
    /// Redeclaring with a different signature is an error: it would produce
    /// an ill-typed module.
    pub fn get_or_insert_function(&mut self, name: &str, sig: &FnSig) -> Result<(), CodegenError> {
        match self.declares.get(name) {
            Some(existing) if existing != sig => Err(CodegenError::SignatureConflict {
                symbol: name.to_owned(),
                existing: existing.to_string(),
                requested: sig.to_string(),
            }),
            Some(_) => Ok(()),
            None => {
                self.declares.insert(name.to_owned(), sig.clone());
                Ok(())
            }
        }
    }

    pub fn declaration(&self, name: &str) -> Option<&FnSig> {
        self.declares.get(name)
    }

    pub fn is_defined(&self, name: &str) -> bool {
        self.definitions.contains_key(name)
    }

    fn add_definition(&mut self, name: String, text: String) -> Result<(), CodegenError> {
        if self.definitions.contains_key(&name) {
            return Err(CodegenError::DuplicateDefinition(name));
        }
        self.definitions.insert(name, text);
        Ok(())
    }

    /// Renders the module as LLVM assembly text.
    pub fn emit(&self) -> Result<String, CodegenError> {
        let mut out = String::new();
        writeln!(out, "; ModuleID = '{}'", self.name)?;
        writeln!(out, "target datalayout = \"{}\"", self.data_layout)?;
        writeln!(out, "target triple = \"{}\"\n", self.target_triple)?;

        let mut any_declare = false;
        for (name, sig) in &self.declares {
            if self.definitions.contains_key(name) {
                continue;
            }
            let params: Vec<String> = sig.params.iter().map(|p| p.to_string()).collect();
            writeln!(out, "declare {} @{}({})", sig.ret, name, params.join(", "))?;
            any_declare = true;
        }
        if any_declare {
            writeln!(out)?;
        }
        for text in self.definitions.values() {
            writeln!(out, "{}", text)?;
        }
        Ok(out)
    }
}

/// Emits the body of one function into an `LlModule`.
///
/// Registers are numbered `%t0, %t1, ...` and labels get a numeric suffix so
/// that repeated lowerings inside one function never collide.
pub struct FnBuilder<'m> {
    module: &'m mut LlModule,
    name: String,
    sig: FnSig,
    linkage: Option<&'static str>,
    params: Vec<LlValue>,
    /// Stack slots hoisted to the top of the entry block.
    entry_allocas: String,
    body: String,
    next_tmp: u32,
    next_label: u32,
}

impl<'m> FnBuilder<'m> {
    pub fn new(
        module: &'m mut LlModule,
        name: &str,
        ret: LlType,
        params: &[(LlType, &str)],
    ) -> Self {
        let sig = FnSig::new(ret, params.iter().map(|(t, _)| t.clone()).collect());
        let params = params
            .iter()
            .map(|(t, n)| LlValue::new(t.clone(), format!("%{}", n)))
            .collect();
        Self {
            module,
            name: name.to_owned(),
            sig,
            linkage: None,
            params,
            entry_allocas: String::new(),
            body: String::new(),
            next_tmp: 0,
            next_label: 0,
        }
    }

    /// Marks the function `internal` (spliced helpers).
    pub fn internal(mut self) -> Self {
        self.linkage = Some("internal");
        self
    }

    pub fn param(&self, idx: usize) -> Option<&LlValue> {
        self.params.get(idx)
    }

    pub fn module(&mut self) -> &mut LlModule {
        &mut *self.module
    }

    fn fresh(&mut self) -> String {
        let name = format!("%t{}", self.next_tmp);
        self.next_tmp += 1;
        name
    }

    /// Reserves a unique label name.
    pub fn new_label(&mut self, hint: &str) -> String {
        let name = format!("{}{}", hint, self.next_label);
        self.next_label += 1;
        name
    }

    /// Starts emitting into `label`.
    pub fn position_at(&mut self, label: &str) -> Result<(), CodegenError> {
        writeln!(self.body, "{}:", label)?;
        Ok(())
    }

    pub fn call(
        &mut self,
        callee: &str,
        sig: &FnSig,
        args: &[LlValue],
    ) -> Result<LlValue, CodegenError> {
        self.module.get_or_insert_function(callee, sig)?;
        let args: Vec<String> = args.iter().map(|a| a.typed()).collect();
        if sig.ret == LlType::Void {
            writeln!(self.body, "  call void @{}({})", callee, args.join(", "))?;
            return Ok(LlValue::void());
        }
        let dst = self.fresh();
        writeln!(
            self.body,
            "  {} = call {} @{}({})",
            dst,
            sig.ret,
            callee,
            args.join(", ")
        )?;
        Ok(LlValue::new(sig.ret.clone(), dst))
    }

    /// Allocates a stack slot at the start of the entry block, whatever the
    /// current position. A slot requested inside a loop is allocated once.
    pub fn alloca_in_entry(&mut self, ty: &LlType) -> Result<LlValue, CodegenError> {
        let dst = self.fresh();
        writeln!(self.entry_allocas, "  {} = alloca {}", dst, ty)?;
        Ok(LlValue::new(LlType::Ptr, dst))
    }

    pub fn store(&mut self, value: &LlValue, ptr: &LlValue) -> Result<(), CodegenError> {
        writeln!(self.body, "  store {}, {}", value.typed(), ptr.typed())?;
        Ok(())
    }

    pub fn load(&mut self, ty: &LlType, ptr: &LlValue) -> Result<LlValue, CodegenError> {
        let dst = self.fresh();
        writeln!(self.body, "  {} = load {}, {}", dst, ty, ptr.typed())?;
        Ok(LlValue::new(ty.clone(), dst))
    }

    /// `getelementptr elem, ptr, idx...`
    pub fn gep(
        &mut self,
        elem: &LlType,
        ptr: &LlValue,
        indices: &[LlValue],
    ) -> Result<LlValue, CodegenError> {
        let dst = self.fresh();
        let idx: Vec<String> = indices.iter().map(|i| i.typed()).collect();
        writeln!(
            self.body,
            "  {} = getelementptr inbounds {}, {}, {}",
            dst,
            elem,
            ptr.typed(),
            idx.join(", ")
        )?;
        Ok(LlValue::new(LlType::Ptr, dst))
    }

    /// Integer or floating-point addition, picked by operand type.
    pub fn add(&mut self, lhs: &LlValue, rhs: &LlValue) -> Result<LlValue, CodegenError> {
        let op = if lhs.ty.is_float() { "fadd" } else { "add" };
        self.binop(op, lhs, rhs)
    }

    pub fn mul(&mut self, lhs: &LlValue, rhs: &LlValue) -> Result<LlValue, CodegenError> {
        let op = if lhs.ty.is_float() { "fmul" } else { "mul" };
        self.binop(op, lhs, rhs)
    }

    fn binop(&mut self, op: &str, lhs: &LlValue, rhs: &LlValue) -> Result<LlValue, CodegenError> {
        let dst = self.fresh();
        writeln!(self.body, "  {} = {} {}, {}", dst, op, lhs.typed(), rhs.repr)?;
        Ok(LlValue::new(lhs.ty.clone(), dst))
    }

    /// Signed integer comparison (`eq`, `ne`, `slt`, `sge`, ...).
    pub fn icmp(
        &mut self,
        pred: &str,
        lhs: &LlValue,
        rhs: &LlValue,
    ) -> Result<LlValue, CodegenError> {
        let dst = self.fresh();
        writeln!(self.body, "  {} = icmp {} {}, {}", dst, pred, lhs.typed(), rhs.repr)?;
        Ok(LlValue::new(LlType::I1, dst))
    }

    pub fn select(
        &mut self,
        cond: &LlValue,
        then: &LlValue,
        other: &LlValue,
    ) -> Result<LlValue, CodegenError> {
        let dst = self.fresh();
        writeln!(
            self.body,
            "  {} = select {}, {}, {}",
            dst,
            cond.typed(),
            then.typed(),
            other.typed()
        )?;
        Ok(LlValue::new(then.ty.clone(), dst))
    }

    pub fn br(&mut self, label: &str) -> Result<(), CodegenError> {
        writeln!(self.body, "  br label %{}", label)?;
        Ok(())
    }

    pub fn cond_br(&mut self, cond: &LlValue, then: &str, other: &str) -> Result<(), CodegenError> {
        writeln!(
            self.body,
            "  br {}, label %{}, label %{}",
            cond.typed(),
            then,
            other
        )?;
        Ok(())
    }

    pub fn ret(&mut self, value: Option<&LlValue>) -> Result<(), CodegenError> {
        match value {
            Some(v) => writeln!(self.body, "  ret {}", v.typed())?,
            None => writeln!(self.body, "  ret void")?,
        }
        Ok(())
    }

    /// Seals the function and adds its definition to the module.
    pub fn finish(self) -> Result<(), CodegenError> {
        let params: Vec<String> = self.params.iter().map(|p| p.typed()).collect();
        let linkage = self.linkage.map(|l| format!("{} ", l)).unwrap_or_default();
        let text = format!(
            "define {}{} @{}({}) {{\nentry:\n{}{}}}\n",
            linkage,
            self.sig.ret,
            self.name,
            params.join(", "),
            self.entry_allocas,
            self.body
        );
        self.module.get_or_insert_function(&self.name, &self.sig)?;
        self.module.add_definition(self.name, text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conflicting_redeclaration_is_rejected() {
        let mut m = LlModule::new("m", &Config::default());
        let a = FnSig::new(LlType::I32, vec![]);
        let b = FnSig::new(LlType::I64, vec![]);
        m.get_or_insert_function("f", &a).unwrap();
        m.get_or_insert_function("f", &a).unwrap();
        assert!(matches!(
            m.get_or_insert_function("f", &b),
            Err(CodegenError::SignatureConflict { .. })
        ));
    }

    #[test]
    fn defined_functions_are_not_redeclared() {
        let mut m = LlModule::new("m", &Config::default());
        let mut b = FnBuilder::new(&mut m, "helper", LlType::I32, &[]).internal();
        b.ret(Some(&LlValue::const_i32(0))).unwrap();
        b.finish().unwrap();
        let text = m.emit().unwrap();
        assert!(text.contains("define internal i32 @helper() {"));
        assert!(!text.contains("declare i32 @helper"));
    }
}
