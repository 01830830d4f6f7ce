//! The positional I/O ABI as a Rust trait, plus an in-memory implementation
//! that records every call.
//!
//! Every entry returns a status or handle; negative means failure. Callers
//! turn statuses into errors with [`check_status`].

use std::collections::HashMap;

use tracing::trace;

use crate::catalog::{DatasetInfo, MemoryCatalog};
use crate::error::RuntimeError;
use crate::ir::DType;

pub trait IoRuntime {
    fn open(&mut self, name: &str, mode: &str, parallel: i64) -> i64;
    fn close(&mut self, file: i64) -> i64;
    /// Extent of dimension `dim` of `dataset`.
    fn size(&mut self, file: i64, dataset: &str, dim: i64) -> i64;
    /// Reads the hyperslab `start..start+count` into `dest` (row-major).
    fn read(
        &mut self,
        file: i64,
        dataset: &str,
        start: &[i64],
        count: &[i64],
        stride: i64,
        dest: &mut [f64],
    ) -> i64;
    fn write(
        &mut self,
        file: i64,
        dataset: &str,
        start: &[i64],
        count: &[i64],
        stride: i64,
        src: &[f64],
    ) -> i64;
    fn create_dataset(&mut self, file: i64, name: &str, shape: &[i64], dtype: DType) -> i64;
    fn create_group(&mut self, file: i64, name: &str) -> i64;
}

/// Fails with `CallFailed` on a negative status.
pub fn check_status(entry: &'static str, status: i64) -> Result<(), RuntimeError> {
    if status < 0 {
        return Err(RuntimeError::CallFailed { entry, status });
    }
    Ok(())
}

/// One call observed by [`MemoryIo`], with its arguments as seen by the ABI.
#[derive(Debug, Clone, PartialEq)]
pub enum IoCall {
    Open { name: String, mode: String, parallel: i64 },
    Close { file: i64 },
    Size { dataset: String, dim: i64 },
    Read { dataset: String, start: Vec<i64>, count: Vec<i64> },
    Write { dataset: String, start: Vec<i64>, count: Vec<i64> },
    CreateDataset { name: String, shape: Vec<i64>, dtype: DType },
    CreateGroup { name: String },
}

#[derive(Debug, Clone)]
enum Handle {
    /// A file or a group: datasets below it live at `prefix + name`.
    Location { source: String, prefix: String },
    Dataset,
}

/// In-memory sources backed by a [`MemoryCatalog`].
///
/// Element values are held as `f64` whatever the declared type. Datasets
/// without explicit contents read as zeros.
#[derive(Debug, Default)]
pub struct MemoryIo {
    catalog: MemoryCatalog,
    contents: HashMap<(String, String), Vec<f64>>,
    handles: HashMap<i64, Handle>,
    next_handle: i64,
    calls: Vec<IoCall>,
}

impl MemoryIo {
    pub fn new(catalog: MemoryCatalog) -> Self {
        Self {
            catalog,
            next_handle: 1,
            ..Self::default()
        }
    }

    pub fn with_contents(mut self, source: &str, dataset: &str, values: Vec<f64>) -> Self {
        self.contents
            .insert((source.to_owned(), dataset.to_owned()), values);
        self
    }

    pub fn contents(&self, source: &str, dataset: &str) -> Option<&[f64]> {
        self.contents
            .get(&(source.to_owned(), dataset.to_owned()))
            .map(Vec::as_slice)
    }

    pub fn catalog(&self) -> &MemoryCatalog {
        &self.catalog
    }

    pub fn calls(&self) -> &[IoCall] {
        &self.calls
    }

    fn alloc_handle(&mut self, handle: Handle) -> i64 {
        let id = self.next_handle.max(1);
        self.next_handle = id + 1;
        self.handles.insert(id, handle);
        id
    }

    /// `(source, full dataset path)` for `name` below location `file`.
    fn locate(&self, file: i64, name: &str) -> Option<(String, String)> {
        match self.handles.get(&file)? {
            Handle::Location { source, prefix } => {
                Some((source.clone(), format!("{}{}", prefix, name)))
            }
            Handle::Dataset => None,
        }
    }

    fn dataset(&self, file: i64, name: &str) -> Option<(String, String, DatasetInfo)> {
        let (source, path) = self.locate(file, name)?;
        let info = self.catalog.get(&source, &path)?.clone();
        Some((source, path, info))
    }
}

/// Row-major linear indices of the hyperslab, or `None` if it does not fit.
fn slab(shape: &[u64], start: &[i64], count: &[i64], stride: i64) -> Option<Vec<usize>> {
    if start.len() != shape.len() || count.len() != shape.len() || stride > 1 {
        return None;
    }
    for ((&extent, &s), &c) in shape.iter().zip(start).zip(count) {
        if s < 0 || c < 0 || (s + c) as u64 > extent {
            return None;
        }
    }
    let total: i64 = count.iter().product();
    let mut out = Vec::with_capacity(total.max(0) as usize);
    if total == 0 {
        return Some(out);
    }
    let mut pos = vec![0i64; count.len()];
    loop {
        let mut linear = 0u64;
        for (d, &extent) in shape.iter().enumerate() {
            linear = linear * extent + (start[d] + pos[d]) as u64;
        }
        out.push(linear as usize);

        // Advance the innermost dimension first.
        let mut d = count.len();
        loop {
            if d == 0 {
                return Some(out);
            }
            d -= 1;
            pos[d] += 1;
            if pos[d] < count[d] {
                break;
            }
            pos[d] = 0;
        }
    }
}

impl IoRuntime for MemoryIo {
    fn open(&mut self, name: &str, mode: &str, parallel: i64) -> i64 {
        self.calls.push(IoCall::Open {
            name: name.to_owned(),
            mode: mode.to_owned(),
            parallel,
        });
        let exists = self.catalog.has_source(name);
        let ok = match mode {
            "r" | "r+" => exists,
            "w" | "a" => true,
            "w-" | "x" => !exists,
            _ => false,
        };
        if !ok {
            trace!(name, mode, "open refused");
            return -1;
        }
        if mode == "w" {
            trace!(name, "truncating source");
            self.catalog.clear_source(name);
            self.contents.retain(|(source, _), _| source != name);
        } else {
            self.catalog.add_source(name);
        }
        self.alloc_handle(Handle::Location {
            source: name.to_owned(),
            prefix: String::new(),
        })
    }

    fn close(&mut self, file: i64) -> i64 {
        self.calls.push(IoCall::Close { file });
        match self.handles.remove(&file) {
            Some(_) => 0,
            None => -1,
        }
    }

    fn size(&mut self, file: i64, dataset: &str, dim: i64) -> i64 {
        self.calls.push(IoCall::Size {
            dataset: dataset.to_owned(),
            dim,
        });
        let Some((_, _, info)) = self.dataset(file, dataset) else {
            return -1;
        };
        usize::try_from(dim)
            .ok()
            .and_then(|d| info.shape.get(d))
            .map_or(-1, |&e| e as i64)
    }

    fn read(
        &mut self,
        file: i64,
        dataset: &str,
        start: &[i64],
        count: &[i64],
        stride: i64,
        dest: &mut [f64],
    ) -> i64 {
        self.calls.push(IoCall::Read {
            dataset: dataset.to_owned(),
            start: start.to_vec(),
            count: count.to_vec(),
        });
        let Some((source, path, info)) = self.dataset(file, dataset) else {
            return -1;
        };
        let Some(idx) = slab(&info.shape, start, count, stride) else {
            return -1;
        };
        if dest.len() < idx.len() {
            return -1;
        }
        let stored = self.contents.get(&(source, path));
        for (out, i) in dest.iter_mut().zip(idx) {
            *out = stored.and_then(|v| v.get(i)).copied().unwrap_or(0.0);
        }
        0
    }

    fn write(
        &mut self,
        file: i64,
        dataset: &str,
        start: &[i64],
        count: &[i64],
        stride: i64,
        src: &[f64],
    ) -> i64 {
        self.calls.push(IoCall::Write {
            dataset: dataset.to_owned(),
            start: start.to_vec(),
            count: count.to_vec(),
        });
        let Some((source, path, info)) = self.dataset(file, dataset) else {
            return -1;
        };
        let Some(idx) = slab(&info.shape, start, count, stride) else {
            return -1;
        };
        if src.len() < idx.len() {
            return -1;
        }
        let stored = self
            .contents
            .entry((source, path))
            .or_insert_with(|| vec![0.0; info.len() as usize]);
        for (&v, i) in src.iter().zip(idx) {
            if let Some(slot) = stored.get_mut(i) {
                *slot = v;
            }
        }
        0
    }

    fn create_dataset(&mut self, file: i64, name: &str, shape: &[i64], dtype: DType) -> i64 {
        self.calls.push(IoCall::CreateDataset {
            name: name.to_owned(),
            shape: shape.to_vec(),
            dtype,
        });
        let Some((source, path)) = self.locate(file, name) else {
            return -1;
        };
        if shape.iter().any(|&e| e < 0) {
            return -1;
        }
        let dims: Vec<u64> = shape.iter().map(|&e| e as u64).collect();
        self.catalog.insert(&source, &path, DatasetInfo::new(dtype, &dims));
        self.alloc_handle(Handle::Dataset)
    }

    fn create_group(&mut self, file: i64, name: &str) -> i64 {
        self.calls.push(IoCall::CreateGroup {
            name: name.to_owned(),
        });
        let Some((source, path)) = self.locate(file, name) else {
            return -1;
        };
        self.alloc_handle(Handle::Location {
            source,
            prefix: format!("{}/", path),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn io() -> MemoryIo {
        let cat =
            MemoryCatalog::new().with_dataset("a.h5", "m", DatasetInfo::new(DType::F64, &[2, 3]));
        MemoryIo::new(cat).with_contents("a.h5", "m", vec![0.0, 1.0, 2.0, 3.0, 4.0, 5.0])
    }

    #[test]
    fn reads_a_hyperslab() {
        let mut io = io();
        let f = io.open("a.h5", "r", 0);
        let mut buf = [0.0; 2];
        assert_eq!(io.read(f, "m", &[0, 1], &[2, 1], 0, &mut buf), 0);
        assert_eq!(buf, [1.0, 4.0]);
    }

    #[test]
    fn failures_are_negative_statuses() {
        let mut io = io();
        assert_eq!(io.open("missing.h5", "r", 0), -1);
        let f = io.open("a.h5", "r", 0);
        assert_eq!(io.size(f, "m", 2), -1);
        let mut buf = [0.0; 6];
        assert_eq!(io.read(f, "m", &[1, 0], &[2, 3], 0, &mut buf), -1);
        assert!(check_status("read", -1).is_err());
    }

    #[test]
    fn write_mode_truncates_existing_source() {
        let mut io = io();
        let f = io.open("a.h5", "w", 0);
        assert!(f > 0);
        assert_eq!(io.size(f, "m", 0), -1);
        assert!(io.catalog().has_source("a.h5"));
        assert!(io.catalog().get("a.h5", "m").is_none());
        assert_eq!(io.contents("a.h5", "m"), None);

        // Append keeps what is there.
        let mut io = self::io();
        let f = io.open("a.h5", "a", 0);
        assert_eq!(io.size(f, "m", 1), 3);
        assert!(io.contents("a.h5", "m").is_some());
    }

    #[test]
    fn groups_prefix_dataset_paths() {
        let mut io = io();
        let f = io.open("a.h5", "a", 0);
        let g = io.create_group(f, "grp");
        assert!(io.create_dataset(g, "x", &[4], DType::I32) > 0);
        assert_eq!(io.size(g, "x", 0), 4);
        assert!(io.catalog().get("a.h5", "grp/x").is_some());
    }
}
