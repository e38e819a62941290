//! Test Utilities
//!
//! Shared fixtures and assertion helpers for the integration tests.

use ion_core::backend::analysis::CfgConstructor;
use ion_core::backend::ir::{BlockId, Function, VReg};
use ion_core::backend::parser::parse_function;

pub const STRAIGHT_LINE_DAG: &str = "
INIT_BLOCK:
    MOV %1, 10
    MOV %2, 20
    JMP BLOCK_B

BLOCK_B:
    ADD %3, %1, %2
    BEQ %3, 30, BLOCK_C

BLOCK_C:
    RET %3
";

pub const SIMPLE_LOOP: &str = "
INIT_BLOCK:
    MOV %1, 0

main_block:
    BEQ %1, 40, BLOCK_C

BLOCK_A:
    ADD %1, %1, 1
    JMP main_block

BLOCK_C:
    RET %1
";

pub const NESTED_LOOP: &str = "
INIT_BLOCK:
    MOV %1, 0
    MOV %2, 0

OUTER_BLOCK:
    BEQ %1, 10, INNER_BLOCK

OUTER_BODY:
    ADD %1, %1, 1
    JMP OUTER_BLOCK

INNER_BLOCK:
    BEQ %2, 5, RET_BLOCK

INNER_BODY:
    ADD %2, %2, 1
    JMP INNER_BLOCK

RET_BLOCK:
    ADD %3, %1, %2
    RET %3
";

pub const DIAMOND: &str = "
INIT_BLOCK:
    MOV %1, 5

MAIN_BLOCK:
    BEQ %1, 5, COND_1
    JMP COND_2

COND_1:
    MOV %1, 1
    JMP RET_BLOCK

COND_2:
    MOV %1, -1
    JMP RET_BLOCK

RET_BLOCK:
    RET %1
";

pub const COUNTING_LOOP: &str = "
entry:
  MOV %1, 0
  JMP loop_header

loop_header:
  BEQ %1, 10, exit

loop_body:
  ADD %1, %1, 1
  JMP loop_header

exit:
  RET %1
";

/// Parse `source` into a function with its CFG already wired.
pub fn build(source: &str) -> Function {
    let mut func = parse_function("test", source).unwrap();
    CfgConstructor::construct(&mut func).unwrap();
    func
}

/// Check that `from -> to` is recorded on both ends.
pub fn has_edge(func: &Function, from: BlockId, to: BlockId) -> bool {
    func.blocks()[from as usize].successors().contains(&to)
        && func.blocks()[to as usize].predecessors().contains(&from)
}

/// Assert that every successor entry has a matching predecessor entry, counting multiplicity.
pub fn assert_reciprocal(func: &Function) {
    for block in func.blocks() {
        for &succ in block.successors() {
            let forward = block.successors().iter().filter(|&&s| s == succ).count();
            let backward = func.blocks()[succ as usize]
                .predecessors()
                .iter()
                .filter(|&&p| p == block.id())
                .count();
            assert_eq!(forward, backward, "bb{} -> bb{} is not reciprocal", block.id(), succ);
        }
    }
}

pub fn regs(ids: &[u32]) -> Vec<VReg> {
    ids.iter().copied().map(VReg).collect()
}
