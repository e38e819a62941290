//! Analysis Module
//!
//! Control flow graph construction and liveness analysis over the pseudo-assembly IR.

pub mod control_flow;
pub mod liveness;

// Re-export commonly used types
pub use control_flow::CfgConstructor;
pub use liveness::{
    compute_use_def, compute_use_def_with, LivenessAnalysis, LivenessInfo, LivenessResult, RegSet,
};
