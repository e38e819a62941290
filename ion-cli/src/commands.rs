// CLI command handlers
use anyhow::{Context, Result};
use ion_core::backend::analysis::CfgConstructor;
use ion_core::backend::parser::parse_function;
use ion_core::backend::pipeline::{AnalysisPipeline, SourceFile};
use ion_core::config::{AnalysisConfig, IterationOrder};
use std::path::Path;

/// Build the CFG of `input` and render it as text.
pub fn cfg_text(input: &Path) -> Result<String> {
    let source = SourceFile::read(input)?;

    let mut function =
        parse_function(&source.name, &source.text).context("Failed to parse source file")?;
    CfgConstructor::construct(&mut function).context("Failed to build control flow graph")?;

    let mut text = CfgConstructor::dump_cfg(&function);
    let back_edges = CfgConstructor::back_edges(&function);
    if back_edges.is_empty() {
        text.push_str("back edges: none\n");
    } else {
        let rendered: Vec<String> = back_edges
            .iter()
            .map(|edge| format!("bb{} -> bb{}", edge.from, edge.to))
            .collect();
        text.push_str(&format!("back edges: {}\n", rendered.join(", ")));
    }
    Ok(text)
}

pub fn dump_cfg(input: &Path) -> Result<()> {
    print!("{}", cfg_text(input)?);
    Ok(())
}

/// Resolve the effective config: file first, then command-line overrides.
pub fn resolve_config(
    order: Option<IterationOrder>,
    config_path: Option<&Path>,
) -> Result<AnalysisConfig> {
    let mut config = match config_path {
        Some(path) => AnalysisConfig::load(path)?,
        None => AnalysisConfig::default(),
    };
    if let Some(order) = order {
        config = config.with_order(order);
    }
    Ok(config)
}

/// Run the full pipeline on `input` and render liveness as text or JSON.
pub fn liveness_text(
    input: &Path,
    json: bool,
    order: Option<IterationOrder>,
    config_path: Option<&Path>,
) -> Result<String> {
    let config = resolve_config(order, config_path)?;
    let output = AnalysisPipeline::run_file(input, &config)?;

    if json {
        let mut text = serde_json::to_string_pretty(&output.report())
            .context("Failed to serialize liveness report")?;
        text.push('\n');
        Ok(text)
    } else {
        Ok(output.render_text())
    }
}

pub fn print_liveness(
    input: &Path,
    json: bool,
    order: Option<IterationOrder>,
    config_path: Option<&Path>,
) -> Result<()> {
    print!("{}", liveness_text(input, json, order, config_path)?);
    Ok(())
}
