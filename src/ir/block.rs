use crate::ir::stmt::{Stmt, Terminator};

/// An opaque label identifying a basic block within a function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Label(pub u32);

impl std::fmt::Display for Label {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "block{}", self.0)
    }
}

/// A basic block: straight-line statements followed by one terminator.
///
/// The rewrite pass replaces `body` wholesale; the terminator is never
/// touched by it.
#[derive(Debug, Clone)]
pub struct Block {
    pub label: Label,
    /// Statements in program order.
    pub body: Vec<Stmt>,
    pub term: Terminator,
}

impl Block {
    pub fn new(label: Label, term: Terminator) -> Self {
        Self {
            label,
            body: Vec::new(),
            term,
        }
    }

    pub fn successors(&self) -> Vec<Label> {
        self.term.successors()
    }

    /// Variable names assigned in this block, in program order.
    pub fn defs(&self) -> impl Iterator<Item = &str> + '_ {
        self.body.iter().filter_map(|s| match s {
            Stmt::Assign { target, .. } => Some(target.name.as_str()),
            Stmt::StaticSetItem { .. } => None,
        })
    }
}
