//! Pseudo-assembly Instructions
//!
//! This module defines the instruction model consumed by the CFG constructor and the
//! liveness engine.
//!
//! # Memory Optimizations
//! - `Opcode` uses `#[repr(u8)]` (1 byte discriminant)
//! - `Instruction.uses` uses `SmallVec<[Operand; 3]>` (no opcode takes more than 3 uses)
//! - Virtual register ids use `u32`
//!
//! # Shape Rules
//! | Opcode            | Destination | Uses                          |
//! |-------------------|-------------|-------------------------------|
//! | `MOV`             | yes         | value                         |
//! | `ADD` `SUB` `MUL` | yes         | lhs, rhs                      |
//! | `BEQ` `BNE`       | no          | lhs, rhs, target label        |
//! | `JMP`             | no          | target label                  |
//! | `RET`             | no          | optional value                |
//!
//! A "value" is a virtual register or an immediate; labels only appear as branch targets.

use smallvec::SmallVec;
use std::fmt;

/// Virtual register identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct VReg(pub u32);

impl VReg {
    #[inline]
    pub fn id(self) -> u32 {
        self.0
    }

    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for VReg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "%{}", self.0)
    }
}

/// Instruction operand. Exactly one kind is active at a time.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Operand {
    /// Virtual register read
    Reg(VReg),
    /// Literal integer value
    Imm(i64),
    /// Symbolic block name (branch targets only)
    Label(String),
}

impl Operand {
    /// The register this operand reads, if any.
    #[inline]
    pub fn as_vreg(&self) -> Option<VReg> {
        match self {
            Operand::Reg(reg) => Some(*reg),
            Operand::Imm(_) | Operand::Label(_) => None,
        }
    }

    #[inline]
    pub fn as_label(&self) -> Option<&str> {
        match self {
            Operand::Label(name) => Some(name),
            Operand::Reg(_) | Operand::Imm(_) => None,
        }
    }

    fn kind_name(&self) -> &'static str {
        match self {
            Operand::Reg(_) => "register",
            Operand::Imm(_) => "immediate",
            Operand::Label(_) => "label",
        }
    }
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::Reg(reg) => write!(f, "{reg}"),
            Operand::Imm(value) => write!(f, "{value}"),
            Operand::Label(name) => write!(f, "{name}"),
        }
    }
}

/// How an instruction transfers control when it ends a block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum TerminatorKind {
    /// Falls through to the physical next block
    None = 0,
    /// Unconditional jump to a label
    Jump = 1,
    /// Conditional branch: taken target, else fallthrough
    Branch = 2,
    /// Leaves the function
    Return = 3,
}

/// Instruction opcodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Opcode {
    /// `dst = value`
    Mov = 0,
    /// `dst = lhs + rhs`
    Add = 1,
    /// `dst = lhs - rhs`
    Sub = 2,
    /// `dst = lhs * rhs`
    Mul = 3,
    /// Branch to target if `lhs == rhs`
    Beq = 4,
    /// Branch to target if `lhs != rhs`
    Bne = 5,
    /// Unconditional jump
    Jmp = 6,
    /// Return, optionally with a value
    Ret = 7,
}

/// Expected kind of one use slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Slot {
    Value,
    Label,
}

impl Opcode {
    pub const ALL: [Opcode; 8] = [
        Opcode::Mov,
        Opcode::Add,
        Opcode::Sub,
        Opcode::Mul,
        Opcode::Beq,
        Opcode::Bne,
        Opcode::Jmp,
        Opcode::Ret,
    ];

    pub fn mnemonic(self) -> &'static str {
        match self {
            Opcode::Mov => "MOV",
            Opcode::Add => "ADD",
            Opcode::Sub => "SUB",
            Opcode::Mul => "MUL",
            Opcode::Beq => "BEQ",
            Opcode::Bne => "BNE",
            Opcode::Jmp => "JMP",
            Opcode::Ret => "RET",
        }
    }

    /// Look up an opcode by mnemonic, ignoring case.
    pub fn from_mnemonic(text: &str) -> Option<Opcode> {
        Self::ALL
            .iter()
            .copied()
            .find(|op| op.mnemonic().eq_ignore_ascii_case(text))
    }

    /// Whether instructions with this opcode write a destination register.
    #[inline]
    pub fn has_destination(self) -> bool {
        match self {
            Opcode::Mov | Opcode::Add | Opcode::Sub | Opcode::Mul => true,
            Opcode::Beq | Opcode::Bne | Opcode::Jmp | Opcode::Ret => false,
        }
    }

    #[inline]
    pub fn terminator_kind(self) -> TerminatorKind {
        match self {
            Opcode::Mov | Opcode::Add | Opcode::Sub | Opcode::Mul => TerminatorKind::None,
            Opcode::Beq | Opcode::Bne => TerminatorKind::Branch,
            Opcode::Jmp => TerminatorKind::Jump,
            Opcode::Ret => TerminatorKind::Return,
        }
    }

    #[inline]
    pub fn is_control_transfer(self) -> bool {
        self.terminator_kind() != TerminatorKind::None
    }

    /// Required use slots, followed by the number of optional trailing value slots.
    fn slots(self) -> (&'static [Slot], usize) {
        const UNARY: &[Slot] = &[Slot::Value];
        const BINARY: &[Slot] = &[Slot::Value, Slot::Value];
        const BRANCH: &[Slot] = &[Slot::Value, Slot::Value, Slot::Label];
        const JUMP: &[Slot] = &[Slot::Label];
        match self {
            Opcode::Mov => (UNARY, 0),
            Opcode::Add | Opcode::Sub | Opcode::Mul => (BINARY, 0),
            Opcode::Beq | Opcode::Bne => (BRANCH, 0),
            Opcode::Jmp => (JUMP, 0),
            Opcode::Ret => (&[], 1),
        }
    }

    /// Minimum and maximum number of use operands.
    pub fn arity(self) -> (usize, usize) {
        let (required, optional) = self.slots();
        (required.len(), required.len() + optional)
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.mnemonic())
    }
}

/// A single instruction: opcode, optional destination, ordered uses.
///
/// The destination is typed as `VReg`, so it can never be an immediate or a label.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Instruction {
    pub opcode: Opcode,
    pub dest: Option<VReg>,
    pub uses: SmallVec<[Operand; 3]>,
}

impl Instruction {
    pub fn new(opcode: Opcode, dest: Option<VReg>, uses: impl IntoIterator<Item = Operand>) -> Self {
        Self {
            opcode,
            dest,
            uses: uses.into_iter().collect(),
        }
    }

    /// `MOV dst, value`
    pub fn mov(dst: VReg, value: Operand) -> Self {
        Self::new(Opcode::Mov, Some(dst), [value])
    }

    /// Binary arithmetic: `op dst, lhs, rhs`
    pub fn binary(opcode: Opcode, dst: VReg, lhs: Operand, rhs: Operand) -> Self {
        Self::new(opcode, Some(dst), [lhs, rhs])
    }

    /// `BEQ lhs, rhs, target`
    pub fn beq(lhs: Operand, rhs: Operand, target: impl Into<String>) -> Self {
        Self::new(Opcode::Beq, None, [lhs, rhs, Operand::Label(target.into())])
    }

    /// `BNE lhs, rhs, target`
    pub fn bne(lhs: Operand, rhs: Operand, target: impl Into<String>) -> Self {
        Self::new(Opcode::Bne, None, [lhs, rhs, Operand::Label(target.into())])
    }

    /// `JMP target`
    pub fn jmp(target: impl Into<String>) -> Self {
        Self::new(Opcode::Jmp, None, [Operand::Label(target.into())])
    }

    /// `RET [value]`
    pub fn ret(value: Option<Operand>) -> Self {
        Self::new(Opcode::Ret, None, value)
    }

    /// Registers read by this instruction, in operand order.
    pub fn used_vregs(&self) -> impl Iterator<Item = VReg> + '_ {
        self.uses.iter().filter_map(Operand::as_vreg)
    }

    /// Label operand of a jump or conditional branch.
    pub fn branch_target(&self) -> Option<&str> {
        match self.opcode.terminator_kind() {
            TerminatorKind::Jump | TerminatorKind::Branch => {
                self.uses.iter().rev().find_map(Operand::as_label)
            }
            TerminatorKind::None | TerminatorKind::Return => None,
        }
    }

    /// Highest register id read or written by this instruction.
    pub fn max_vreg(&self) -> Option<u32> {
        self.used_vregs().chain(self.dest).map(VReg::id).max()
    }

    /// Check the use list against the opcode's arity and operand kinds.
    ///
    /// Returns a description of the first mismatch.
    pub fn validate_shape(&self) -> Result<(), String> {
        if self.opcode.has_destination() != self.dest.is_some() {
            return Err(if self.dest.is_some() {
                format!("{} does not write a destination", self.opcode)
            } else {
                format!("{} requires a destination register", self.opcode)
            });
        }

        let (min, max) = self.opcode.arity();
        if self.uses.len() < min || self.uses.len() > max {
            let expected = if min == max {
                min.to_string()
            } else {
                format!("{min}..={max}")
            };
            return Err(format!(
                "{} takes {} use operand(s), found {}",
                self.opcode,
                expected,
                self.uses.len()
            ));
        }

        let (required, _) = self.opcode.slots();
        for (position, operand) in self.uses.iter().enumerate() {
            // optional trailing slots only hold values
            let slot = required.get(position).copied().unwrap_or(Slot::Value);
            let fits = match (slot, operand) {
                (Slot::Value, Operand::Reg(_) | Operand::Imm(_)) => true,
                (Slot::Label, Operand::Label(_)) => true,
                _ => false,
            };
            if !fits {
                let wanted = match slot {
                    Slot::Value => "register or immediate",
                    Slot::Label => "label",
                };
                return Err(format!(
                    "{} operand {} must be a {}, found {}",
                    self.opcode,
                    position + 1,
                    wanted,
                    operand.kind_name()
                ));
            }
        }
        Ok(())
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.opcode)?;
        let mut first = true;
        for operand in self.dest.map(Operand::Reg).iter().chain(self.uses.iter()) {
            f.write_str(if first { " " } else { ", " })?;
            write!(f, "{operand}")?;
            first = false;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_destination_opcodes() {
        for op in Opcode::ALL {
            let expected = matches!(op, Opcode::Mov | Opcode::Add | Opcode::Sub | Opcode::Mul);
            assert_eq!(op.has_destination(), expected, "{op}");
            assert_eq!(op.is_control_transfer(), !expected, "{op}");
        }
    }

    #[test]
    fn test_mnemonic_lookup_is_case_insensitive() {
        assert_eq!(Opcode::from_mnemonic("beq"), Some(Opcode::Beq));
        assert_eq!(Opcode::from_mnemonic("Jmp"), Some(Opcode::Jmp));
        assert_eq!(Opcode::from_mnemonic("CALL"), None);
    }

    #[test]
    fn test_branch_target() {
        let beq = Instruction::beq(Operand::Reg(VReg(1)), Operand::Imm(10), "exit");
        assert_eq!(beq.branch_target(), Some("exit"));
        assert_eq!(Instruction::jmp("header").branch_target(), Some("header"));
        assert_eq!(Instruction::ret(Some(Operand::Reg(VReg(1)))).branch_target(), None);
        assert_eq!(Instruction::mov(VReg(1), Operand::Imm(0)).branch_target(), None);
    }

    #[test]
    fn test_validate_shape_accepts_well_formed() {
        let cases = [
            Instruction::mov(VReg(1), Operand::Imm(0)),
            Instruction::binary(Opcode::Add, VReg(2), Operand::Reg(VReg(1)), Operand::Imm(1)),
            Instruction::beq(Operand::Reg(VReg(1)), Operand::Imm(10), "exit"),
            Instruction::jmp("header"),
            Instruction::ret(None),
            Instruction::ret(Some(Operand::Reg(VReg(3)))),
        ];
        for inst in &cases {
            assert_eq!(inst.validate_shape(), Ok(()), "{inst}");
        }
    }

    #[test]
    fn test_validate_shape_rejects_bad_arity_and_kinds() {
        let short_add = Instruction::new(Opcode::Add, Some(VReg(1)), [Operand::Imm(1)]);
        assert!(short_add.validate_shape().is_err());

        let label_use = Instruction::mov(VReg(1), Operand::Label("x".to_string()));
        assert!(label_use.validate_shape().unwrap_err().contains("register or immediate"));

        let jmp_to_reg = Instruction::new(Opcode::Jmp, None, [Operand::Reg(VReg(1))]);
        assert!(jmp_to_reg.validate_shape().unwrap_err().contains("label"));

        let ret_with_dest = Instruction::new(Opcode::Ret, Some(VReg(1)), Vec::new());
        assert!(ret_with_dest.validate_shape().is_err());
    }

    #[test]
    fn test_display_round_trips_syntax() {
        let add = Instruction::binary(Opcode::Add, VReg(1), Operand::Reg(VReg(1)), Operand::Imm(1));
        assert_eq!(add.to_string(), "ADD %1, %1, 1");
        assert_eq!(Instruction::ret(None).to_string(), "RET");
        assert_eq!(
            Instruction::beq(Operand::Reg(VReg(1)), Operand::Imm(10), "exit").to_string(),
            "BEQ %1, 10, exit"
        );
    }

    #[test]
    fn test_max_vreg_covers_dest_and_uses() {
        let add = Instruction::binary(Opcode::Add, VReg(2), Operand::Reg(VReg(7)), Operand::Imm(1));
        assert_eq!(add.max_vreg(), Some(7));
        assert_eq!(Instruction::jmp("x").max_vreg(), None);
    }
}
