//! Functions and Basic Blocks
//!
//! A `Function` owns its blocks in a single vector, in program order. Blocks refer to each
//! other only through `BlockId` handles stored in their successor / predecessor lists, so the
//! graph has no ownership cycles and dropping the function drops every block.
//!
//! # Memory Optimizations
//! - `successors` and `predecessors` use `SmallVec<[BlockId; 2]>` (most blocks have ≤2)
//! - Block ids use `u32`
//!
//! # Edge Invariant
//! Edges are only added through [`Function::add_edge`], which appends to the source's
//! successor list and the target's predecessor list in the same call. A→B appears in
//! `A.successors` exactly as many times as A appears in `B.predecessors`.

use crate::backend::ir::instruction::{Instruction, TerminatorKind};
use smallvec::SmallVec;
use std::fmt;

/// Basic block identifier. Equal to the block's position in program order.
pub type BlockId = u32;

/// Why an edge exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum EdgeKind {
    /// Target of an unconditional jump
    Jump = 0,
    /// Taken side of a conditional branch
    Taken = 1,
    /// Physical next block (no terminator, or untaken branch)
    Fallthrough = 2,
}

impl fmt::Display for EdgeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            EdgeKind::Jump => "jump",
            EdgeKind::Taken => "taken",
            EdgeKind::Fallthrough => "fallthrough",
        })
    }
}

/// Directed control-flow edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Edge {
    pub from: BlockId,
    pub to: BlockId,
    pub kind: EdgeKind,
}

/// Straight-line instruction sequence with a single entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BasicBlock {
    id: BlockId,
    /// Symbolic name used for branch-target resolution
    pub label: Option<String>,
    /// Instructions in program order
    pub instructions: Vec<Instruction>,
    successors: SmallVec<[BlockId; 2]>,
    predecessors: SmallVec<[BlockId; 2]>,
}

impl BasicBlock {
    fn new(id: BlockId, label: Option<String>) -> Self {
        Self {
            id,
            label,
            instructions: Vec::new(),
            successors: SmallVec::new(),
            predecessors: SmallVec::new(),
        }
    }

    #[inline]
    pub fn id(&self) -> BlockId {
        self.id
    }

    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    #[inline]
    pub fn successors(&self) -> &[BlockId] {
        &self.successors
    }

    #[inline]
    pub fn predecessors(&self) -> &[BlockId] {
        &self.predecessors
    }

    /// The last instruction, if it transfers control.
    pub fn terminator(&self) -> Option<&Instruction> {
        self.instructions
            .last()
            .filter(|inst| inst.opcode.is_control_transfer())
    }

    /// How control leaves this block. Blocks without a terminator fall through.
    pub fn terminator_kind(&self) -> TerminatorKind {
        self.terminator()
            .map_or(TerminatorKind::None, |inst| inst.opcode.terminator_kind())
    }

    /// Highest register id referenced in this block.
    pub fn max_vreg(&self) -> Option<u32> {
        self.instructions.iter().filter_map(Instruction::max_vreg).max()
    }

    pub fn push(&mut self, inst: Instruction) {
        self.instructions.push(inst);
    }
}

/// A function: a name and its blocks in program order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Function {
    pub name: String,
    blocks: Vec<BasicBlock>,
    edges: Vec<Edge>,
    cfg_built: bool,
}

impl Function {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            blocks: Vec::new(),
            edges: Vec::new(),
            cfg_built: false,
        }
    }

    /// Append a new block in program order and return its id.
    pub fn add_block(&mut self, label: Option<&str>) -> BlockId {
        let id = self.blocks.len() as BlockId;
        self.blocks.push(BasicBlock::new(id, label.map(str::to_string)));
        id
    }

    #[inline]
    pub fn blocks(&self) -> &[BasicBlock] {
        &self.blocks
    }

    #[inline]
    pub fn block(&self, id: BlockId) -> Option<&BasicBlock> {
        self.blocks.get(id as usize)
    }

    /// Mutable access for populating instructions. Edges stay private to the CFG constructor.
    #[inline]
    pub fn block_mut(&mut self, id: BlockId) -> Option<&mut BasicBlock> {
        self.blocks.get_mut(id as usize)
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Every edge, in the order it was added.
    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    /// Physical next block in program order.
    pub fn next_block(&self, id: BlockId) -> Option<BlockId> {
        let next = id.checked_add(1)?;
        self.block(next).map(BasicBlock::id)
    }

    pub fn block_by_label(&self, label: &str) -> Option<&BasicBlock> {
        self.blocks.iter().find(|block| block.label() == Some(label))
    }

    /// Highest register id referenced anywhere in the function.
    pub fn max_vreg(&self) -> Option<u32> {
        self.blocks.iter().filter_map(BasicBlock::max_vreg).max()
    }

    /// Size of the function-wide register universe (`max_vreg + 1`, or 0).
    pub fn vreg_universe(&self) -> usize {
        self.max_vreg().map_or(0, |max| max as usize + 1)
    }

    /// Whether the CFG constructor has wired this function's edges.
    pub fn is_cfg_built(&self) -> bool {
        self.cfg_built
    }

    pub(crate) fn mark_cfg_built(&mut self) {
        self.cfg_built = true;
    }

    /// Add `from -> to` as a reciprocal pair.
    ///
    /// Both ids must belong to this function; out-of-range ids are ignored.
    pub(crate) fn add_edge(&mut self, from: BlockId, to: BlockId, kind: EdgeKind) {
        let count = self.blocks.len();
        if from as usize >= count || to as usize >= count {
            return;
        }
        self.blocks[from as usize].successors.push(to);
        self.blocks[to as usize].predecessors.push(from);
        self.edges.push(Edge { from, to, kind });
    }
}
