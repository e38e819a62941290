//! Intermediate Representation
//!
//! Passive data model shared by the front end and the analyses.

pub mod function;
pub mod instruction;

pub use function::{BasicBlock, BlockId, Edge, EdgeKind, Function};
pub use instruction::{Instruction, Opcode, Operand, TerminatorKind, VReg};
