//! Liveness Analysis
//!
//! Computes which virtual registers are live on entry to and exit from every basic block.
//!
//! # Memory Optimizations
//! - Register sets use `BitVec<u32>` instead of `HashSet<u32>`
//!   - 1 bit per register id, O(1) membership tests
//!   - union is a bitwise OR over the whole set
//!
//! # Local Phase
//! For each block, independently and in program order:
//! - **UEVar** (upward-exposed uses): registers read before any write in the block
//! - **VarKill**: registers written anywhere in the block
//!
//! Uses of an instruction are checked before its destination is killed, so `%1 = ADD %1, %1`
//! puts `%1` in both sets.
//!
//! # Global Phase
//! Backward iterative data flow analysis over the CFG:
//! - **LiveOut(b)** = ⋃ LiveIn(s) for every successor s
//! - **LiveIn(b)** = UEVar(b) ∪ (LiveOut(b) \ VarKill(b))
//!
//! Every set starts empty and whole passes repeat until one changes nothing. Both equations are
//! monotone over a finite lattice, so any visiting order terminates at the same fixpoint; the
//! order only changes how many passes it takes.

use crate::backend::analysis::control_flow::CfgConstructor;
use crate::backend::error::{IonError, IonResult};
use crate::backend::ir::{BlockId, Function, VReg};
use crate::config::{AnalysisConfig, IterationOrder, SetSizing};
use bitvec::prelude::*;
use std::collections::HashMap;

/// Set of virtual register ids, indexed by id.
pub type RegSet = BitVec<u32, Lsb0>;

/// Empty register set able to hold ids `0..size`.
#[inline]
pub fn empty_set(size: usize) -> RegSet {
    bitvec![u32, Lsb0; 0; size]
}

#[inline]
fn contains(set: &RegSet, reg: VReg) -> bool {
    set.get(reg.index()).map_or(false, |bit| *bit)
}

/// Copy of `set` resized to exactly `universe` bits.
///
/// Fails if a register at or past `universe` is set.
fn fitted(set: &RegSet, universe: usize, block: BlockId, name: &str) -> IonResult<RegSet> {
    if let Some(reg) = set.iter_ones().find(|&idx| idx >= universe) {
        return Err(IonError::invalid_liveness_info(
            block,
            format!("{name} names %{reg}, but the function only uses registers below %{universe}"),
        ));
    }
    let mut out = set.clone();
    out.resize(universe, false);
    Ok(out)
}

fn regs_of(set: &RegSet) -> Vec<VReg> {
    set.iter_ones().map(|idx| VReg(idx as u32)).collect()
}

/// Local phase output: per-block upward-exposed uses and kills.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LivenessInfo {
    /// Block id -> upward-exposed uses
    pub ue_var: HashMap<BlockId, RegSet>,
    /// Block id -> registers defined in the block
    pub var_kill: HashMap<BlockId, RegSet>,
}

impl LivenessInfo {
    pub fn ue_var(&self, block: BlockId) -> Option<&RegSet> {
        self.ue_var.get(&block)
    }

    pub fn var_kill(&self, block: BlockId) -> Option<&RegSet> {
        self.var_kill.get(&block)
    }

    pub fn is_upward_exposed(&self, block: BlockId, reg: VReg) -> bool {
        self.ue_var(block).map_or(false, |set| contains(set, reg))
    }

    pub fn is_killed(&self, block: BlockId, reg: VReg) -> bool {
        self.var_kill(block).map_or(false, |set| contains(set, reg))
    }

    pub fn ue_var_regs(&self, block: BlockId) -> Vec<VReg> {
        self.ue_var(block).map(regs_of).unwrap_or_default()
    }

    pub fn var_kill_regs(&self, block: BlockId) -> Vec<VReg> {
        self.var_kill(block).map(regs_of).unwrap_or_default()
    }
}

/// Global phase output: per-block live-in and live-out sets.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LivenessResult {
    /// Block id -> registers live on entry
    pub live_in: HashMap<BlockId, RegSet>,
    /// Block id -> registers live on exit
    pub live_out: HashMap<BlockId, RegSet>,
    /// Number of register ids every set can hold (function max id + 1)
    pub universe: usize,
    /// Full passes the solver ran, including the final unchanged one
    pub passes: usize,
}

impl LivenessResult {
    pub fn live_in(&self, block: BlockId) -> Option<&RegSet> {
        self.live_in.get(&block)
    }

    pub fn live_out(&self, block: BlockId) -> Option<&RegSet> {
        self.live_out.get(&block)
    }

    pub fn is_live_in(&self, block: BlockId, reg: VReg) -> bool {
        self.live_in(block).map_or(false, |set| contains(set, reg))
    }

    pub fn is_live_out(&self, block: BlockId, reg: VReg) -> bool {
        self.live_out(block).map_or(false, |set| contains(set, reg))
    }

    /// Registers live on entry to `block`, ascending.
    pub fn live_in_regs(&self, block: BlockId) -> Vec<VReg> {
        self.live_in(block).map(regs_of).unwrap_or_default()
    }

    /// Registers live on exit from `block`, ascending.
    pub fn live_out_regs(&self, block: BlockId) -> Vec<VReg> {
        self.live_out(block).map(regs_of).unwrap_or_default()
    }

    /// Same sets, ignoring how many passes produced them.
    pub fn same_sets(&self, other: &LivenessResult) -> bool {
        self.live_in == other.live_in && self.live_out == other.live_out
    }
}

/// Compute UEVar and VarKill for every block, sizing each block's sets by its own highest
/// register id.
///
/// A block that references no register gets sets of length 0, not 1.
///
/// Only looks inside blocks; the CFG does not need to be built.
///
/// # Errors
/// Returns `IonError::MalformedInstruction` for an instruction whose uses do not fit its
/// opcode.
pub fn compute_use_def(func: &Function) -> IonResult<LivenessInfo> {
    compute_use_def_with(func, SetSizing::PerBlock)
}

/// [`compute_use_def`] with an explicit sizing policy.
pub fn compute_use_def_with(func: &Function, sizing: SetSizing) -> IonResult<LivenessInfo> {
    let function_size = func.vreg_universe();
    let mut info = LivenessInfo {
        ue_var: HashMap::with_capacity(func.len()),
        var_kill: HashMap::with_capacity(func.len()),
    };

    for block in func.blocks() {
        for (index, inst) in block.instructions.iter().enumerate() {
            inst.validate_shape()
                .map_err(|message| IonError::malformed(block.id(), index, message))?;
        }

        let size = match sizing {
            SetSizing::PerBlock => block.max_vreg().map_or(0, |max| max as usize + 1),
            SetSizing::FunctionWide => function_size,
        };
        let mut ue_var = empty_set(size);
        let mut var_kill = empty_set(size);

        for inst in &block.instructions {
            for reg in inst.used_vregs() {
                if !var_kill[reg.index()] {
                    ue_var.set(reg.index(), true);
                }
            }
            if let Some(dest) = inst.dest {
                var_kill.set(dest.index(), true);
            }
        }

        log::trace!(
            "bb{}: ue_var={:?} var_kill={:?}",
            block.id(),
            regs_of(&ue_var),
            regs_of(&var_kill)
        );
        info.ue_var.insert(block.id(), ue_var);
        info.var_kill.insert(block.id(), var_kill);
    }

    Ok(info)
}

/// Global liveness solver.
#[derive(Debug, Clone, Default)]
pub struct LivenessAnalysis {
    config: AnalysisConfig,
}

impl LivenessAnalysis {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: AnalysisConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    /// Run the local phase, then solve the global equations to a fixpoint.
    ///
    /// # Errors
    /// - `IonError::CfgNotBuilt` if the function's edges have not been wired
    /// - `IonError::MalformedInstruction` from the local phase
    ///
    /// # Examples
    /// ```rust
    /// use ion_core::backend::analysis::control_flow::CfgConstructor;
    /// use ion_core::backend::analysis::liveness::LivenessAnalysis;
    /// use ion_core::backend::ir::VReg;
    /// use ion_core::backend::parser::parse_function;
    ///
    /// let mut func = parse_function("f", "a:\n  MOV %1, 1\n  JMP b\nb:\n  RET %1\n")?;
    /// CfgConstructor::construct(&mut func)?;
    /// let result = LivenessAnalysis::new().analyse(&func)?;
    /// assert!(result.is_live_out(0, VReg(1)));
    /// assert!(!result.is_live_in(0, VReg(1)));
    /// # Ok::<(), ion_core::backend::error::IonError>(())
    /// ```
    pub fn analyse(&self, func: &Function) -> IonResult<LivenessResult> {
        if !func.is_cfg_built() {
            return Err(IonError::cfg_not_built(&func.name));
        }
        let info = compute_use_def_with(func, self.config.sizing)?;
        self.solve(func, &info, None)
    }

    /// Solve the global equations from `info`.
    ///
    /// With a `seed`, its LiveIn sets replace the empty initial LiveIn sets. Seeding with a
    /// solved result reproduces that result.
    ///
    /// # Errors
    /// - `IonError::CfgNotBuilt` if the function's edges have not been wired
    /// - `IonError::InvalidLivenessInfo` if `info` lacks a block, or a local or seed set names a
    ///   register the function never references
    pub fn solve(
        &self,
        func: &Function,
        info: &LivenessInfo,
        seed: Option<&LivenessResult>,
    ) -> IonResult<LivenessResult> {
        if !func.is_cfg_built() {
            return Err(IonError::cfg_not_built(&func.name));
        }

        let universe = func.vreg_universe();
        let count = func.len();

        // Local sets may be sized per block; bring them into one universe.
        let mut ue_var: Vec<RegSet> = Vec::with_capacity(count);
        let mut var_kill: Vec<RegSet> = Vec::with_capacity(count);
        let mut live_in: Vec<RegSet> = Vec::with_capacity(count);
        for block in func.blocks() {
            let id = block.id();
            let (Some(ue), Some(kill)) = (info.ue_var(id), info.var_kill(id)) else {
                return Err(IonError::invalid_liveness_info(id, "no local sets for this block"));
            };
            ue_var.push(fitted(ue, universe, id, "ue_var")?);
            var_kill.push(fitted(kill, universe, id, "var_kill")?);
            live_in.push(match seed.and_then(|s| s.live_in(id)) {
                Some(set) => fitted(set, universe, id, "seed live_in")?,
                None => empty_set(universe),
            });
        }
        let mut live_out: Vec<RegSet> = vec![empty_set(universe); count];

        let order = self.visit_order(func);
        let mut passes = 0usize;
        loop {
            passes += 1;
            let mut changed_blocks = 0usize;

            for &id in &order {
                let idx = id as usize;
                let Some(block) = func.block(id) else {
                    continue;
                };

                let mut out = empty_set(universe);
                for &succ in block.successors() {
                    if let Some(succ_in) = live_in.get(succ as usize) {
                        out |= succ_in.as_bitslice();
                    }
                }

                let mut new_in = out.clone();
                for killed in var_kill[idx].iter_ones() {
                    new_in.set(killed, false);
                }
                new_in |= ue_var[idx].as_bitslice();

                let mut changed = false;
                if out != live_out[idx] {
                    live_out[idx] = out;
                    changed = true;
                }
                if new_in != live_in[idx] {
                    live_in[idx] = new_in;
                    changed = true;
                }
                if changed {
                    changed_blocks += 1;
                }
            }

            log::trace!("liveness pass {}: {} block(s) changed", passes, changed_blocks);
            if changed_blocks == 0 {
                break;
            }
        }

        log::debug!(
            "liveness for '{}' reached fixpoint after {} pass(es) ({:?} order, {} register(s))",
            func.name,
            passes,
            self.config.order,
            universe
        );

        let ids = func.blocks().iter().map(|b| b.id());
        Ok(LivenessResult {
            live_in: ids.clone().zip(live_in).collect(),
            live_out: ids.zip(live_out).collect(),
            universe,
            passes,
        })
    }

    fn visit_order(&self, func: &Function) -> Vec<BlockId> {
        match self.config.order {
            IterationOrder::Postorder => {
                let mut order = CfgConstructor::reverse_postorder(func);
                order.reverse();
                order
            }
            IterationOrder::ReverseProgram => func.blocks().iter().rev().map(|b| b.id()).collect(),
            IterationOrder::Program => func.blocks().iter().map(|b| b.id()).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::ir::{Instruction, Opcode, Operand};
    use crate::backend::parser::parse_function;

    fn single_block(insts: Vec<Instruction>) -> Function {
        let mut func = Function::new("single");
        let id = func.add_block(Some("entry"));
        if let Some(block) = func.block_mut(id) {
            block.instructions = insts;
        }
        func
    }

    #[test]
    fn test_use_and_redefine_in_same_instruction() {
        let reg = Operand::Reg(VReg(1));
        let func = single_block(vec![Instruction::binary(Opcode::Add, VReg(1), reg.clone(), reg)]);
        let info = compute_use_def(&func).unwrap();
        assert!(info.is_upward_exposed(0, VReg(1)));
        assert!(info.is_killed(0, VReg(1)));
    }

    #[test]
    fn test_kill_suppresses_later_use() {
        let func = single_block(vec![
            Instruction::mov(VReg(1), Operand::Imm(5)),
            Instruction::binary(Opcode::Add, VReg(2), Operand::Reg(VReg(1)), Operand::Reg(VReg(1))),
        ]);
        let info = compute_use_def(&func).unwrap();
        assert_eq!(info.var_kill_regs(0), vec![VReg(1), VReg(2)]);
        assert!(info.ue_var_regs(0).is_empty());
    }

    #[test]
    fn test_first_instruction_is_processed() {
        let func = single_block(vec![Instruction::ret(Some(Operand::Reg(VReg(4))))]);
        let info = compute_use_def(&func).unwrap();
        assert_eq!(info.ue_var_regs(0), vec![VReg(4)]);
    }

    #[test]
    fn test_sizing_policies() {
        let func = parse_function("f", "a:\nMOV %1, 0\nb:\nMOV %5, 0\nc:\nJMP a\n").unwrap();
        let per_block = compute_use_def(&func).unwrap();
        let lens: Vec<usize> = (0..3).map(|id| per_block.ue_var(id).unwrap().len()).collect();
        assert_eq!(lens, vec![2, 6, 0]);

        let wide = compute_use_def_with(&func, SetSizing::FunctionWide).unwrap();
        assert!((0..3).all(|id| wide.var_kill(id).unwrap().len() == 6));
    }

    #[test]
    fn test_malformed_instruction_fails_fast() {
        let func = single_block(vec![
            Instruction::mov(VReg(1), Operand::Imm(0)),
            Instruction::new(Opcode::Add, Some(VReg(2)), [Operand::Label("x".to_string())]),
        ]);
        match compute_use_def(&func).unwrap_err() {
            IonError::MalformedInstruction { block, index, .. } => assert_eq!((block, index), (0, 1)),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_analyse_requires_cfg() {
        let func = single_block(vec![Instruction::ret(None)]);
        let err = LivenessAnalysis::new().analyse(&func).unwrap_err();
        assert!(matches!(err, IonError::CfgNotBuilt { .. }));
    }

    #[test]
    fn test_solve_rejects_sets_from_another_function() {
        let mut func = parse_function("f", "a:\nMOV %1, 0\nRET %1\n").unwrap();
        CfgConstructor::construct(&mut func).unwrap();
        let other = parse_function("g", "a:\nMOV %5, 0\nRET %5\n").unwrap();
        let info = compute_use_def(&other).unwrap();

        match LivenessAnalysis::new().solve(&func, &info, None).unwrap_err() {
            IonError::InvalidLivenessInfo { block, message, .. } => {
                assert_eq!(block, 0);
                assert!(message.contains("%5"), "message was: {message}");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_solve_accepts_wider_sets_with_no_extra_registers() {
        let mut func = parse_function("f", "a:\nMOV %1, 0\nRET %1\n").unwrap();
        CfgConstructor::construct(&mut func).unwrap();
        let mut info = compute_use_def(&func).unwrap();
        if let Some(kill) = info.var_kill.get_mut(&0) {
            kill.resize(16, false);
        }
        let result = LivenessAnalysis::new().solve(&func, &info, None).unwrap();
        assert_eq!(result.live_in(0).map(|set| set.len()), Some(2));
    }

    #[test]
    fn test_solve_requires_every_block() {
        let mut func = parse_function("f", "a:\nJMP b\nb:\nRET\n").unwrap();
        CfgConstructor::construct(&mut func).unwrap();
        let mut info = compute_use_def(&func).unwrap();
        info.ue_var.remove(&1);
        let err = LivenessAnalysis::new().solve(&func, &info, None).unwrap_err();
        assert!(matches!(err, IonError::InvalidLivenessInfo { block: 1, .. }));
    }

    #[test]
    fn test_empty_function() {
        let mut func = Function::new("empty");
        CfgConstructor::construct(&mut func).unwrap();
        let result = LivenessAnalysis::new().analyse(&func).unwrap();
        assert!(result.live_in.is_empty());
        assert_eq!(result.passes, 1);
        assert_eq!(result.universe, 0);
    }
}
