//! ion: control-flow graph construction and liveness analysis for a small
//! pseudo-assembly compiler backend.
//!
//! Pipeline: source text → [`backend::parser`] → [`backend::analysis::CfgConstructor`] →
//! [`backend::analysis::LivenessAnalysis`]. [`backend::pipeline::AnalysisPipeline`] runs all
//! three.

pub mod backend;
pub mod config;
