/// Entry points of the positional I/O ABI.
///
/// Every entry is reached through `Global(IoAbi)` followed by an attribute
/// load of `name()`, then a positional call with exactly `arity()` arguments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IoEntry {
    /// `(name, mode, parallel_flag) -> file`
    Open,
    /// `(file) -> status`
    Close,
    /// `(file, dataset_name, dim) -> extent`
    Size,
    /// `(file, dataset_name, rank, start, count, stride, dest) -> status`
    Read,
    /// `(file, dataset_name, rank, start, count, stride, src) -> status`
    Write,
    /// `(file, name, rank, shape, dtype) -> dataset`
    CreateDataset,
    /// `(file, name) -> group`
    CreateGroup,
}

impl IoEntry {
    pub const ALL: [IoEntry; 7] = [
        IoEntry::Open,
        IoEntry::Close,
        IoEntry::Size,
        IoEntry::Read,
        IoEntry::Write,
        IoEntry::CreateDataset,
        IoEntry::CreateGroup,
    ];

    pub fn name(self) -> &'static str {
        match self {
            IoEntry::Open => "open",
            IoEntry::Close => "close",
            IoEntry::Size => "size",
            IoEntry::Read => "read",
            IoEntry::Write => "write",
            IoEntry::CreateDataset => "create_dataset",
            IoEntry::CreateGroup => "create_group",
        }
    }

    pub fn from_name(name: &str) -> Option<IoEntry> {
        Self::ALL.into_iter().find(|e| e.name() == name)
    }

    pub fn arity(self) -> usize {
        match self {
            IoEntry::Open => 3,
            IoEntry::Close => 1,
            IoEntry::Size => 3,
            IoEntry::Read | IoEntry::Write => 7,
            IoEntry::CreateDataset => 5,
            IoEntry::CreateGroup => 2,
        }
    }
}

impl std::fmt::Display for IoEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}
