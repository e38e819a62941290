//! Analysis Pipeline
//!
//! This module runs the whole analysis on source text, in order.
//!
//! # Pipeline Stages
//! 1. **Parsing**: source text → function with unlinked blocks
//! 2. **Control Flow Analysis**: wire successor / predecessor edges
//! 3. **Local Liveness**: UEVar / VarKill per block
//! 4. **Global Liveness**: LiveIn / LiveOut fixpoint
//!
//! The output can be rendered as text or turned into a serializable [`LivenessReport`].

use crate::backend::analysis::control_flow::CfgConstructor;
use crate::backend::analysis::liveness::{
    compute_use_def_with, LivenessAnalysis, LivenessInfo, LivenessResult,
};
use crate::backend::ir::{BlockId, Function, VReg};
use crate::backend::parser::parse_function;
use crate::config::AnalysisConfig;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use std::path::Path;

/// Pipeline orchestrator.
pub struct AnalysisPipeline;

/// Everything the pipeline produced.
#[derive(Debug, Clone)]
pub struct PipelineOutput {
    pub function: Function,
    pub info: LivenessInfo,
    pub liveness: LivenessResult,
    pub stats: PipelineStats,
}

/// Statistics collected during pipeline execution.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineStats {
    pub blocks: usize,
    pub edges: usize,
    pub back_edges: usize,
    pub instructions: usize,
    pub registers: usize,
    pub passes: usize,
}

/// Per-block liveness, with register ids as plain integers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockReport {
    pub id: BlockId,
    pub label: Option<String>,
    pub successors: Vec<BlockId>,
    pub predecessors: Vec<BlockId>,
    pub ue_var: Vec<u32>,
    pub kill: Vec<u32>,
    pub live_in: Vec<u32>,
    pub live_out: Vec<u32>,
}

/// Serializable view of a finished analysis.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LivenessReport {
    pub function: String,
    pub stats: PipelineStats,
    pub blocks: Vec<BlockReport>,
}

fn ids(regs: Vec<VReg>) -> Vec<u32> {
    regs.into_iter().map(VReg::id).collect()
}

impl AnalysisPipeline {
    /// Parse, build the CFG and solve liveness for `source`.
    ///
    /// # Errors
    /// Returns the first stage failure, with context naming the stage.
    ///
    /// # Examples
    /// ```rust
    /// use ion_core::backend::pipeline::AnalysisPipeline;
    /// use ion_core::config::AnalysisConfig;
    ///
    /// let out = AnalysisPipeline::run("f", "a:\n  MOV %1, 1\n  RET %1\n", &AnalysisConfig::default())?;
    /// assert_eq!(out.stats.blocks, 1);
    /// # Ok::<(), anyhow::Error>(())
    /// ```
    pub fn run(name: &str, source: &str, config: &AnalysisConfig) -> Result<PipelineOutput> {
        log::info!("Starting analysis pipeline for '{}'...", name);

        log::info!("Step 1: Parsing...");
        let mut function = parse_function(name, source).context("Failed to parse function")?;

        log::info!("Step 2: Building control flow graph...");
        CfgConstructor::construct(&mut function)
            .context("Failed to build control flow graph")?;

        log::info!("Step 3: Computing upward-exposed uses and kills...");
        let info = compute_use_def_with(&function, config.sizing)
            .context("Failed to compute local liveness")?;

        log::info!("Step 4: Solving liveness equations...");
        let liveness = LivenessAnalysis::with_config(*config)
            .solve(&function, &info, None)
            .context("Failed to solve liveness")?;

        let stats = PipelineStats {
            blocks: function.len(),
            edges: function.edges().len(),
            back_edges: CfgConstructor::back_edges(&function).len(),
            instructions: function.blocks().iter().map(|b| b.instructions.len()).sum(),
            registers: liveness.universe,
            passes: liveness.passes,
        };
        log::info!(
            "Pipeline complete: {} block(s), {} edge(s), fixpoint after {} pass(es)",
            stats.blocks,
            stats.edges,
            stats.passes
        );

        Ok(PipelineOutput { function, info, liveness, stats })
    }

    /// [`AnalysisPipeline::run`] on a file; the function is named after the file stem.
    pub fn run_file(path: &Path, config: &AnalysisConfig) -> Result<PipelineOutput> {
        let source = SourceFile::read(path)?;
        Self::run(&source.name, &source.text, config)
    }
}

/// Source text read from disk, with the function name derived from the file stem.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    pub name: String,
    pub text: String,
}

impl SourceFile {
    pub fn read(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read source file: {}", path.display()))?;
        let name = path
            .file_stem()
            .and_then(|stem| stem.to_str())
            .unwrap_or("main")
            .to_string();
        Ok(Self { name, text })
    }
}

impl PipelineOutput {
    pub fn report(&self) -> LivenessReport {
        let blocks = self
            .function
            .blocks()
            .iter()
            .map(|block| {
                let id = block.id();
                BlockReport {
                    id,
                    label: block.label.clone(),
                    successors: block.successors().to_vec(),
                    predecessors: block.predecessors().to_vec(),
                    ue_var: ids(self.info.ue_var_regs(id)),
                    kill: ids(self.info.var_kill_regs(id)),
                    live_in: ids(self.liveness.live_in_regs(id)),
                    live_out: ids(self.liveness.live_out_regs(id)),
                }
            })
            .collect();

        LivenessReport {
            function: self.function.name.clone(),
            stats: self.stats.clone(),
            blocks,
        }
    }

    /// Human-readable liveness table, one block per line group.
    pub fn render_text(&self) -> String {
        fn set(regs: &[u32]) -> String {
            let items: Vec<String> = regs.iter().map(|r| format!("%{r}")).collect();
            format!("{{{}}}", items.join(", "))
        }

        let report = self.report();
        let mut out = String::new();
        let _ = writeln!(out, "function {}", report.function);
        for block in &report.blocks {
            let _ = writeln!(out, "bb{} ({}):", block.id, block.label.as_deref().unwrap_or("-"));
            let _ = writeln!(out, "  ue_var   = {}", set(&block.ue_var));
            let _ = writeln!(out, "  kill     = {}", set(&block.kill));
            let _ = writeln!(out, "  live_in  = {}", set(&block.live_in));
            let _ = writeln!(out, "  live_out = {}", set(&block.live_out));
        }
        let _ = writeln!(
            out,
            "fixpoint after {} pass(es) over {} register(s)",
            report.stats.passes, report.stats.registers
        );
        out
    }
}
