//! Compile-time dataset introspection.
//!
//! When neither the target variable nor its alias carries a user type
//! declaration, the rewrite pass opens the named source read-only and reads
//! the dataset's rank and element type. The actual file format reader lives
//! outside this crate; it plugs in through `DatasetCatalog`.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::CatalogError;
use crate::ir::{ArrayType, DType};

/// Read-only view of hierarchical data sources at compile time.
pub trait DatasetCatalog {
    /// Returns the array type of `dataset` inside `source`.
    fn inspect(&self, source: &str, dataset: &str) -> Result<ArrayType, CatalogError>;
}

impl<C: DatasetCatalog + ?Sized> DatasetCatalog for Box<C> {
    fn inspect(&self, source: &str, dataset: &str) -> Result<ArrayType, CatalogError> {
        (**self).inspect(source, dataset)
    }
}

/// Static description of one dataset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetInfo {
    pub dtype: DType,
    pub shape: Vec<u64>,
}

impl DatasetInfo {
    pub fn new(dtype: DType, shape: &[u64]) -> Self {
        Self {
            dtype,
            shape: shape.to_vec(),
        }
    }

    pub fn array_type(&self) -> ArrayType {
        ArrayType::new(self.dtype, self.shape.len())
    }

    pub fn len(&self) -> u64 {
        self.shape.iter().product()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A catalog held in memory: source name → dataset path → description.
///
/// Also serves as the backing store of the recording I/O runtime, so that
/// compile-time introspection and execution agree on shapes.
///
/// JSON form:
///
/// ```json
/// { "stock.h5": { "points": { "dtype": "f64", "shape": [100, 4] } } }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MemoryCatalog {
    sources: BTreeMap<String, BTreeMap<String, DatasetInfo>>,
}

impl MemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_json(text: &str) -> Result<Self, CatalogError> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn with_dataset(mut self, source: &str, dataset: &str, info: DatasetInfo) -> Self {
        self.insert(source, dataset, info);
        self
    }

    pub fn insert(&mut self, source: &str, dataset: &str, info: DatasetInfo) {
        self.sources
            .entry(source.to_owned())
            .or_default()
            .insert(dataset.to_owned(), info);
    }

    /// Registers an empty source if it is not known yet.
    pub fn add_source(&mut self, source: &str) {
        self.sources.entry(source.to_owned()).or_default();
    }

    /// Drops every dataset of `source`, keeping the source itself.
    pub fn clear_source(&mut self, source: &str) {
        self.sources.insert(source.to_owned(), BTreeMap::new());
    }

    pub fn has_source(&self, source: &str) -> bool {
        self.sources.contains_key(source)
    }

    pub fn get(&self, source: &str, dataset: &str) -> Option<&DatasetInfo> {
        self.sources.get(source)?.get(dataset)
    }
}

impl DatasetCatalog for MemoryCatalog {
    fn inspect(&self, source: &str, dataset: &str) -> Result<ArrayType, CatalogError> {
        let datasets = self
            .sources
            .get(source)
            .ok_or_else(|| CatalogError::SourceNotFound(source.to_owned()))?;
        let info = datasets
            .get(dataset)
            .ok_or_else(|| CatalogError::DatasetNotFound {
                source_name: source.to_owned(),
                dataset: dataset.to_owned(),
            })?;
        Ok(info.array_type())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_json_description() {
        let cat = MemoryCatalog::from_json(
            r#"{ "stock.h5": { "points": { "dtype": "f64", "shape": [100, 4] } } }"#,
        )
        .unwrap();
        let ty = cat.inspect("stock.h5", "points").unwrap();
        assert_eq!(ty, ArrayType::new(DType::F64, 2));
        assert_eq!(cat.get("stock.h5", "points").unwrap().len(), 400);
    }

    #[test]
    fn missing_source_and_dataset_are_distinct() {
        let cat =
            MemoryCatalog::new().with_dataset("a.h5", "x", DatasetInfo::new(DType::I32, &[3]));
        assert!(matches!(
            cat.inspect("b.h5", "x"),
            Err(CatalogError::SourceNotFound(_))
        ));
        assert!(matches!(
            cat.inspect("a.h5", "y"),
            Err(CatalogError::DatasetNotFound { .. })
        ));
    }
}
