//! Symbol tracking for the I/O rewrite.
//!
//! `SymbolTable` is the pass-scoped context: one is built when a function's
//! rewrite starts, it is filled by the single forward pass over the blocks in
//! topological order, and it is dropped when the function is done. Nothing
//! carries over between functions.

use std::collections::{HashMap, HashSet};

use tracing::debug;

use crate::ir::{Expr, Literal, Stmt, Var};

/// What a file handle was opened from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileSource {
    /// Opened by name; the variable holds the source name.
    Named(Var),
    /// A group created inside another handle. Groups expose the same call
    /// surface as files but have no literal source name.
    Group,
}

/// A dataset reached through a file handle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatasetRef {
    pub file: Var,
    pub name: Var,
}

/// Facts collected about variables of one function, keyed by variable name.
#[derive(Debug, Default)]
pub struct SymbolTable {
    pub(crate) module_aliases: HashSet<String>,
    pub(crate) open_call_targets: HashSet<String>,
    pub(crate) file_handles: HashMap<String, FileSource>,
    pub(crate) dataset_refs: HashMap<String, DatasetRef>,
    pub(crate) dataset_shapes: HashMap<String, Vec<Var>>,
    pub(crate) close_targets: HashMap<String, Var>,
    pub(crate) create_dataset_targets: HashMap<String, Var>,
    pub(crate) create_group_targets: HashMap<String, Var>,
    pub(crate) string_constants: HashMap<String, String>,
    pub(crate) tuple_contents: HashMap<String, Vec<Var>>,
    /// Copy source → copy target. Declared types are keyed by the final
    /// name, which may be the target of a later copy.
    pub(crate) alias_of: HashMap<String, String>,
}

impl SymbolTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records every plain copy `a = b` of a block body as `b → a`.
    ///
    /// Runs before the block's statements are processed so that a read
    /// site can see the name its result is eventually copied into.
    pub fn collect_copies(&mut self, body: &[Stmt]) {
        for stmt in body {
            if let Stmt::Assign {
                target,
                value: Expr::Var(src),
            } = stmt
            {
                self.alias_of.insert(src.name.clone(), target.name.clone());
            }
        }
    }

    /// Propagates facts across a plain copy `lhs = rhs`.
    pub fn record_copy(&mut self, lhs: &Var, rhs: &Var) {
        if let Some(src) = self.file_handles.get(&rhs.name).cloned() {
            self.file_handles.insert(lhs.name.clone(), src);
        }
        if let Some(s) = self.string_constants.get(&rhs.name).cloned() {
            self.string_constants.insert(lhs.name.clone(), s);
        }
        if let Some(d) = self.dataset_refs.get(&rhs.name).cloned() {
            self.dataset_refs.insert(lhs.name.clone(), d);
        }
        if let Some(shape) = self.dataset_shapes.get(&rhs.name).cloned() {
            self.dataset_shapes.insert(lhs.name.clone(), shape);
        }
        if let Some(items) = self.tuple_contents.get(&rhs.name).cloned() {
            self.tuple_contents.insert(lhs.name.clone(), items);
        }
    }

    pub fn record_const(&mut self, lhs: &Var, lit: &Literal) {
        if let Literal::Str(s) = lit {
            self.string_constants.insert(lhs.name.clone(), s.clone());
        }
    }

    pub fn is_module_alias(&self, var: &Var) -> bool {
        self.module_aliases.contains(&var.name)
    }

    pub fn is_open_callable(&self, var: &Var) -> bool {
        self.open_call_targets.contains(&var.name)
    }

    pub fn file_source(&self, var: &Var) -> Option<&FileSource> {
        self.file_handles.get(&var.name)
    }

    pub fn dataset(&self, var: &Var) -> Option<&DatasetRef> {
        self.dataset_refs.get(&var.name)
    }

    pub fn dataset_shape(&self, var: &Var) -> Option<&[Var]> {
        self.dataset_shapes.get(&var.name).map(Vec::as_slice)
    }

    pub fn string_const(&self, var: &Var) -> Option<&str> {
        self.string_constants.get(&var.name).map(String::as_str)
    }

    pub fn tuple(&self, var: &Var) -> Option<&[Var]> {
        self.tuple_contents.get(&var.name).map(Vec::as_slice)
    }

    /// Final name `var` is copied into, if any.
    pub fn alias_of(&self, var: &Var) -> Option<&str> {
        self.alias_of.get(&var.name).map(String::as_str)
    }

    /// Statically known source name of a file handle. `None` for groups and
    /// for names computed at run time.
    pub fn source_name(&self, file: &Var) -> Option<&str> {
        match self.file_source(file)? {
            FileSource::Named(name_var) => self.string_const(name_var),
            FileSource::Group => None,
        }
    }

    pub(crate) fn log_summary(&self, func: &str) {
        let mut files: Vec<String> = self
            .file_handles
            .iter()
            .map(|(k, v)| match v {
                FileSource::Named(n) => format!("{}<-{}", k, n),
                FileSource::Group => format!("{}<-group", k),
            })
            .collect();
        files.sort();
        let mut dsets: Vec<String> = self
            .dataset_refs
            .iter()
            .map(|(k, d)| format!("{}<-{}[{}]", k, d.file, d.name))
            .collect();
        dsets.sort();
        debug!(func, files = ?files, datasets = ?dsets, "symbol tables at end of rewrite");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{Loc, ScopeId};

    fn v(name: &str) -> Var {
        Var::new(ScopeId(0), name, Loc::default())
    }

    #[test]
    fn copies_carry_every_fact() {
        let mut t = SymbolTable::new();
        t.record_const(&v("fname"), &Literal::Str("data.h5".into()));
        t.file_handles
            .insert("f".into(), FileSource::Named(v("fname")));
        t.record_copy(&v("g"), &v("f"));
        assert_eq!(t.source_name(&v("g")), Some("data.h5"));
    }

    #[test]
    fn groups_have_no_source_name() {
        let mut t = SymbolTable::new();
        t.file_handles.insert("grp".into(), FileSource::Group);
        assert!(t.file_source(&v("grp")).is_some());
        assert_eq!(t.source_name(&v("grp")), None);
    }

    #[test]
    fn alias_points_at_copy_target() {
        let mut t = SymbolTable::new();
        let body = vec![Stmt::assign(v("x"), Expr::Var(v("$tmp.1")))];
        t.collect_copies(&body);
        assert_eq!(t.alias_of(&v("$tmp.1")), Some("x"));
        assert_eq!(t.alias_of(&v("x")), None);
    }
}
