//! Control Flow Analysis
//!
//! This module wires the control flow graph (CFG) of a parsed [`Function`] and provides the
//! orderings and diagnostics built on top of it.
//!
//! # Memory Optimizations
//! - Successor / predecessor lists are `SmallVec<[u32; 2]>` owned by each block
//! - Visited sets use `BitVec` (1 bit per block)
//! - Block ids use `u32`
//!
//! # CFG Construction Algorithm
//! 1. **Index labels**: build a label → block table once, so forward and backward references
//!    resolve the same way. A label on two blocks is rejected
//! 2. **Plan edges**: inspect each block's last instruction and resolve its target
//! 3. **Apply edges**: only once every target resolved, add each edge as a reciprocal pair
//!
//! Because edges are applied after planning, a failed construction leaves the function
//! without any edges.
//!
//! # Terminator Rules
//! - **Jump**: one edge to the target, never a fallthrough
//! - **Conditional branch**: taken target first, then the physical next block if any
//! - **Return**: no edges
//! - **Anything else / empty block**: fallthrough to the physical next block if any

use crate::backend::error::{IonError, IonResult};
use crate::backend::ir::{BlockId, Edge, EdgeKind, Function, TerminatorKind};
use bitvec::prelude::*;
use std::collections::HashMap;
use std::fmt::Write as _;

/// Builds and inspects control flow graphs.
pub struct CfgConstructor;

impl CfgConstructor {
    /// Wire successor and predecessor edges for every block of `func`.
    ///
    /// # Errors
    /// - `IonError::UnresolvedLabel` if a jump or branch names a label no block carries
    /// - `IonError::MalformedInstruction` if a jump or branch has no label operand
    /// - `IonError::DuplicateLabel` if two blocks carry the same label
    /// - `IonError::CfgAlreadyBuilt` if the edges were already wired
    ///
    /// On error the function is left unchanged.
    ///
    /// # Examples
    /// ```rust
    /// use ion_core::backend::analysis::control_flow::CfgConstructor;
    /// use ion_core::backend::parser::parse_function;
    ///
    /// let mut func = parse_function("f", "entry:\n  JMP exit\nexit:\n  RET\n")?;
    /// CfgConstructor::construct(&mut func)?;
    /// assert_eq!(func.blocks()[0].successors(), &[1]);
    /// # Ok::<(), ion_core::backend::error::IonError>(())
    /// ```
    pub fn construct(func: &mut Function) -> IonResult<()> {
        if func.is_cfg_built() {
            return Err(IonError::cfg_already_built(&func.name));
        }

        let plan = Self::plan_edges(func)?;

        // Apply deferred updates
        for edge in &plan {
            func.add_edge(edge.from, edge.to, edge.kind);
        }
        func.mark_cfg_built();

        log::debug!(
            "built CFG for '{}': {} block(s), {} edge(s)",
            func.name,
            func.len(),
            plan.len()
        );
        Ok(())
    }

    /// Resolve every edge without touching the function.
    fn plan_edges(func: &Function) -> IonResult<Vec<Edge>> {
        let mut label_to_block: HashMap<&str, BlockId> = HashMap::with_capacity(func.len());
        for block in func.blocks() {
            if let Some(label) = block.label() {
                if let Some(&first) = label_to_block.get(label) {
                    return Err(IonError::duplicate_label(label, first, block.id()));
                }
                label_to_block.insert(label, block.id());
            }
        }

        let mut plan: Vec<Edge> = Vec::with_capacity(func.len() * 2);
        for block in func.blocks() {
            let from = block.id();
            let next = func.next_block(from);

            let resolve = || -> IonResult<BlockId> {
                let index = block.instructions.len().saturating_sub(1);
                let target = block
                    .terminator()
                    .and_then(|inst| inst.branch_target())
                    .ok_or_else(|| {
                        IonError::malformed(from, index, "control transfer without a target label")
                    })?;
                label_to_block
                    .get(target)
                    .copied()
                    .ok_or_else(|| IonError::unresolved_label(from, block.label(), target))
            };

            match block.terminator_kind() {
                TerminatorKind::Jump => {
                    plan.push(Edge { from, to: resolve()?, kind: EdgeKind::Jump });
                }
                TerminatorKind::Branch => {
                    plan.push(Edge { from, to: resolve()?, kind: EdgeKind::Taken });
                    if let Some(to) = next {
                        plan.push(Edge { from, to, kind: EdgeKind::Fallthrough });
                    }
                }
                TerminatorKind::Return => {}
                TerminatorKind::None => {
                    if let Some(to) = next {
                        plan.push(Edge { from, to, kind: EdgeKind::Fallthrough });
                    }
                }
            }
        }
        Ok(plan)
    }

    /// Render the wired graph, one line per block in program order.
    ///
    /// Format: `bb<id> (<label or ->) -> [<successor ids>]`
    pub fn dump_cfg(func: &Function) -> String {
        let mut out = String::new();
        for block in func.blocks() {
            let succs: Vec<String> = block.successors().iter().map(u32::to_string).collect();
            // writing to a String cannot fail
            let _ = writeln!(
                out,
                "bb{} ({}) -> [{}]",
                block.id(),
                block.label().unwrap_or("-"),
                succs.join(", ")
            );
        }
        out
    }

    /// Reverse postorder of the whole graph.
    ///
    /// # Algorithm
    /// Depth-first search from block 0, then from every block not yet visited in program
    /// order. Each search contributes the reverse postorder of the region it discovers, in
    /// root order, so block 0 comes first and every block appears exactly once.
    /// Successors are explored in list order.
    pub fn reverse_postorder(func: &Function) -> Vec<BlockId> {
        let count = func.len();
        let mut visited: BitVec<u32> = bitvec![u32, Lsb0; 0; count];
        let mut order: Vec<BlockId> = Vec::with_capacity(count);

        for root in 0..count {
            if visited[root] {
                continue;
            }
            let mut postorder: Vec<BlockId> = Vec::new();
            // (block, index of next successor to explore)
            let mut stack: Vec<(BlockId, usize)> = vec![(root as BlockId, 0)];
            visited.set(root, true);

            while let Some(top) = stack.len().checked_sub(1) {
                let (node, next_succ) = stack[top];
                let succs: &[BlockId] = func.block(node).map(|b| b.successors()).unwrap_or_default();
                if let Some(&succ) = succs.get(next_succ) {
                    stack[top].1 += 1;
                    if !visited[succ as usize] {
                        visited.set(succ as usize, true);
                        stack.push((succ, 0));
                    }
                } else {
                    postorder.push(node);
                    stack.pop();
                }
            }

            order.extend(postorder.into_iter().rev());
        }

        order
    }

    /// Edges whose target does not come after the source in program order.
    pub fn back_edges(func: &Function) -> Vec<Edge> {
        func.edges()
            .iter()
            .copied()
            .filter(|edge| edge.to <= edge.from)
            .collect()
    }

    /// Blocks reachable from block 0.
    pub fn reachable(func: &Function) -> BitVec<u32> {
        let mut seen: BitVec<u32> = bitvec![u32, Lsb0; 0; func.len()];
        if func.is_empty() {
            return seen;
        }
        let mut work: Vec<BlockId> = vec![0];
        seen.set(0, true);
        while let Some(node) = work.pop() {
            if let Some(block) = func.block(node) {
                for &succ in block.successors() {
                    if !seen[succ as usize] {
                        seen.set(succ as usize, true);
                        work.push(succ);
                    }
                }
            }
        }
        seen
    }
}
