//! Element type and rank recovery for dataset reads and writes.

use tracing::trace;

use crate::catalog::DatasetCatalog;
use crate::error::PassError;
use crate::ir::{ArrayType, UserTypes, Var};
use crate::pass::symbols::{DatasetRef, FileSource, SymbolTable};

/// Resolves the array type a dataset access produces or consumes.
///
/// Order: declaration of the variable itself, declaration of the name it is
/// copied into, compile-time introspection of the source, else
/// `TypeUnresolved`.
pub struct TypeResolver<'a> {
    func: &'a str,
    locals: &'a UserTypes,
    catalog: Option<&'a dyn DatasetCatalog>,
}

impl<'a> TypeResolver<'a> {
    /// `catalog` is `None` when compile-time introspection is disabled.
    pub fn new(
        func: &'a str,
        locals: &'a UserTypes,
        catalog: Option<&'a dyn DatasetCatalog>,
    ) -> Self {
        Self {
            func,
            locals,
            catalog,
        }
    }

    /// User declaration of `var` or of its copy target.
    pub fn declared(&self, var: &Var, symbols: &SymbolTable) -> Option<ArrayType> {
        if let Some(ty) = self.locals.get(&var.name) {
            return Some(ty);
        }
        symbols.alias_of(var).and_then(|alias| self.locals.get(alias))
    }

    pub fn resolve(
        &self,
        var: &Var,
        dset: &DatasetRef,
        symbols: &SymbolTable,
    ) -> Result<ArrayType, PassError> {
        if let Some(ty) = self.declared(var, symbols) {
            trace!(var = %var, ty = %ty, "dataset type from declaration");
            return Ok(ty);
        }
        self.introspect(var, dset, symbols)
    }

    /// Opens the source at compile time and reads the dataset's type.
    pub fn introspect(
        &self,
        var: &Var,
        dset: &DatasetRef,
        symbols: &SymbolTable,
    ) -> Result<ArrayType, PassError> {
        let unresolved = |reason: String| PassError::TypeUnresolved {
            func: self.func.to_owned(),
            var: var.name.clone(),
            loc: var.loc,
            reason,
        };

        if matches!(symbols.file_source(&dset.file), Some(FileSource::Group)) {
            return Err(unresolved(
                "the dataset belongs to a group, whose source cannot be opened at compile time"
                    .to_owned(),
            ));
        }
        let (Some(source), Some(dataset)) = (
            symbols.source_name(&dset.file),
            symbols.string_const(&dset.name),
        ) else {
            return Err(unresolved(
                "the file or dataset name is not a compile-time constant".to_owned(),
            ));
        };
        let Some(catalog) = self.catalog else {
            return Err(unresolved("compile-time introspection is disabled".to_owned()));
        };

        let ty = catalog
            .inspect(source, dataset)
            .map_err(|e| unresolved(e.to_string()))?;
        trace!(var = %var, source, dataset, ty = %ty, "dataset type from source");
        Ok(ty)
    }
}
