//! Dead code elimination over the statement IR.

use std::collections::{HashMap, HashSet, VecDeque};

use tracing::trace;

use crate::error::PassError;
use crate::ir::{FuncIr, Module, Stmt};
use crate::pass::Pass;

/// Removes pure assignments whose target is never used.
///
/// Calls and item stores are always kept, as are the operands of block
/// terminators. A variable assigned more than once is live if any use
/// reaches it.
pub struct DcePass;

impl Pass for DcePass {
    fn name(&self) -> &'static str {
        "dce"
    }

    fn run(&mut self, module: &mut Module) -> Result<(), PassError> {
        for func in &mut module.functions {
            remove_dead(func);
        }
        Ok(())
    }
}

fn is_side_effecting(stmt: &Stmt) -> bool {
    match stmt {
        Stmt::Assign { value, .. } => !value.is_pure(),
        Stmt::StaticSetItem { .. } => true,
    }
}

/// Runs DCE on one function and returns the number of removed statements.
pub fn remove_dead(func: &mut FuncIr) -> usize {
    // Variable name → names its definitions read.
    let mut deps: HashMap<&str, Vec<&str>> = HashMap::new();
    let mut live: HashSet<String> = HashSet::new();
    let mut queue: VecDeque<String> = VecDeque::new();

    for block in func.blocks.values() {
        for stmt in &block.body {
            if let Stmt::Assign { target, value } = stmt {
                deps.entry(target.name.as_str())
                    .or_default()
                    .extend(value.uses().into_iter().map(|v| v.name.as_str()));
            }
            if is_side_effecting(stmt) {
                for v in stmt.uses() {
                    if live.insert(v.name.clone()) {
                        queue.push_back(v.name.clone());
                    }
                }
            }
        }
        for v in block.term.uses() {
            if live.insert(v.name.clone()) {
                queue.push_back(v.name.clone());
            }
        }
    }

    while let Some(name) = queue.pop_front() {
        if let Some(ops) = deps.get(name.as_str()) {
            for &op in ops {
                if !live.contains(op) {
                    live.insert(op.to_owned());
                    queue.push_back(op.to_owned());
                }
            }
        }
    }
    drop(deps);

    let mut removed = 0;
    for block in func.blocks.values_mut() {
        block.body.retain(|stmt| {
            let keep = match stmt {
                Stmt::Assign { target, .. } => {
                    is_side_effecting(stmt) || live.contains(&target.name)
                }
                Stmt::StaticSetItem { .. } => true,
            };
            if !keep {
                trace!(stmt = ?stmt, "removing dead statement");
                removed += 1;
            }
            keep
        });
    }
    removed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{FuncBuilder, ModuleRef, Terminator};

    #[test]
    fn unused_pure_chain_is_removed() {
        let mut b = FuncBuilder::new("f");
        let m = b.global("m", ModuleRef::Hdf5);
        let _attr = b.attr("m_file", &m, "File");
        let kept = b.const_int("n", 3);
        b.terminate(Terminator::Return(Some(kept)));
        let mut func = b.build();

        assert_eq!(remove_dead(&mut func), 2);
        let body = &func.block(func.entry).unwrap().body;
        assert_eq!(body.len(), 1);
    }

    #[test]
    fn calls_and_their_operands_survive() {
        let mut b = FuncBuilder::new("f");
        let m = b.global("m", ModuleRef::IoAbi);
        let close = b.attr("close", &m, "close");
        let h = b.const_int("h", 1);
        let _status = b.call("status", &close, &[&h], &[]);
        let mut func = b.build();

        assert_eq!(remove_dead(&mut func), 0);
        assert_eq!(func.block(func.entry).unwrap().body.len(), 4);
    }
}
