use std::collections::HashSet;

use indexmap::IndexMap;

use crate::ir::block::{Block, Label};
use crate::ir::types::UserTypes;
use crate::ir::var::{Loc, ScopeId, Var};

/// Hands out unique compiler temporaries (`$prefix.N`) for one function.
#[derive(Debug, Clone, Default)]
pub struct VarFactory {
    scope: ScopeId,
    next: u32,
}

impl VarFactory {
    pub fn new(scope: ScopeId) -> Self {
        Self { scope, next: 0 }
    }

    pub fn fresh(&mut self, prefix: &str, loc: Loc) -> Var {
        let name = format!("${}.{}", prefix, self.next);
        self.next += 1;
        Var::new(self.scope, name, loc)
    }
}

/// One function's control-flow graph.
///
/// Blocks are kept in insertion order; `entry` names the first block to run.
/// Passes receive `&mut FuncIr` and mutate blocks through the `pub(crate)`
/// fields.
#[derive(Debug, Clone)]
pub struct FuncIr {
    pub name: String,
    pub arg_names: Vec<String>,
    pub scope: ScopeId,
    pub entry: Label,
    /// User-declared local types, bound by the host before compilation.
    pub locals: UserTypes,
    pub(crate) blocks: IndexMap<Label, Block>,
    pub(crate) temps: VarFactory,
}

impl FuncIr {
    pub fn block(&self, label: Label) -> Option<&Block> {
        self.blocks.get(&label)
    }

    pub fn blocks(&self) -> impl Iterator<Item = &Block> + '_ {
        self.blocks.values()
    }

    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }

    /// Allocates a fresh temporary in this function's scope.
    pub fn fresh_var(&mut self, prefix: &str, loc: Loc) -> Var {
        self.temps.fresh(prefix, loc)
    }

    /// Reverse post-order from the entry block.
    ///
    /// Every definition that dominates a use is visited before it. Blocks not
    /// reachable from the entry follow in insertion order so that no block is
    /// skipped by a forward pass.
    pub fn topo_order(&self) -> Vec<Label> {
        let mut post = Vec::with_capacity(self.blocks.len());
        let mut seen: HashSet<Label> = HashSet::new();
        // (label, next successor index to explore)
        let mut stack: Vec<(Label, usize)> = Vec::new();

        if self.blocks.contains_key(&self.entry) {
            seen.insert(self.entry);
            stack.push((self.entry, 0));
        }
        while let Some((label, idx)) = stack.pop() {
            let succs = self
                .blocks
                .get(&label)
                .map(|b| b.successors())
                .unwrap_or_default();
            if idx < succs.len() {
                stack.push((label, idx + 1));
                let next = succs[idx];
                if self.blocks.contains_key(&next) && seen.insert(next) {
                    stack.push((next, 0));
                }
            } else {
                post.push(label);
            }
        }
        post.reverse();

        for label in self.blocks.keys() {
            if !seen.contains(label) {
                post.push(*label);
            }
        }
        post
    }
}
