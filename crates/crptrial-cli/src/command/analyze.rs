use std::path::{Path, PathBuf};

use anyhow::Context;
use crptrial_analysis::{
    analysis::{Analysis, AnalysisConfig},
    report::ConsoleSummary,
    secondary::DEFAULT_THRESHOLD,
};
use crptrial_data::long::{DEFAULT_VALUE_COLUMN, LongTable};

use super::{DEFAULT_OUTPUT_DIR, DEFAULT_REPORT_FILE, DEFAULT_WIDE_FILE};
use crate::util::{self, Output};

#[derive(Default, Debug, Clone, clap::Args)]
pub(crate) struct AnalyzeArg {
    /// Long-format input CSV
    input: PathBuf,
    /// Directory for the report, figures and wide table
    #[arg(long, default_value = DEFAULT_OUTPUT_DIR)]
    output_dir: PathBuf,
    /// Markdown report path [default: <OUTPUT_DIR>/crp_analysis_results.md]
    #[arg(long)]
    report: Option<PathBuf>,
    /// Wide-format CSV path [default: <OUTPUT_DIR>/crp_data_wide.csv]
    #[arg(long)]
    wide_output: Option<PathBuf>,
    /// Name of the measured value column
    #[arg(long, default_value = DEFAULT_VALUE_COLUMN)]
    value_column: String,
    /// Normalization threshold for the time-to-normalization test
    #[arg(long, default_value_t = DEFAULT_THRESHOLD)]
    threshold: f64,
    /// Skip rendering the PNG figures
    #[arg(long)]
    no_figures: bool,
    /// Also dump all results as JSON (`-` for stdout)
    #[arg(long)]
    results_json: Option<PathBuf>,
}

pub(crate) fn run(arg: &AnalyzeArg) -> anyhow::Result<()> {
    let config = AnalysisConfig {
        value_column: arg.value_column.clone(),
        threshold: arg.threshold,
        render_figures: !arg.no_figures,
    };
    let report_path = arg
        .report
        .clone()
        .unwrap_or_else(|| arg.output_dir.join(DEFAULT_REPORT_FILE));
    let wide_path = arg
        .wide_output
        .clone()
        .unwrap_or_else(|| arg.output_dir.join(DEFAULT_WIDE_FILE));

    let table = util::read_table_file(&arg.input, &config.value_column)?;
    analyze_table(
        table,
        &config,
        &report_path,
        &wide_path,
        arg.results_json.as_deref(),
    )
}

/// Runs the analysis and writes every output.
pub(super) fn analyze_table(
    table: LongTable,
    config: &AnalysisConfig,
    report_path: &Path,
    wide_path: &Path,
    results_json: Option<&Path>,
) -> anyhow::Result<()> {
    let analysis = Analysis::run(table, config).context("Failed to analyze data")?;
    print!("{}", ConsoleSummary::new(analysis.results()));

    analysis
        .write_outputs(report_path, wide_path)
        .context("Failed to write analysis outputs")?;
    if let Some(path) = results_json {
        Output::save_json(analysis.results(), path)?;
    }
    println!("Report: {}", report_path.display());
    println!("Wide-format data: {}", wide_path.display());
    Ok(())
}
