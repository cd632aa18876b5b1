use std::path::PathBuf;

use anyhow::Context;
use crptrial_analysis::analysis::AnalysisConfig;
use crptrial_generator::config::GeneratorConfig;
use serde::{Deserialize, Serialize};

use super::{
    DEFAULT_RAW_DATA_FILE, DEFAULT_REPORT_FILE, DEFAULT_WIDE_FILE, GeneratorArg, analyze,
    default_path,
};
use crate::util;

/// Contents of the `--config` JSON file.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct RunConfig {
    generator: GeneratorConfig,
    analysis: AnalysisConfig,
}

#[derive(Default, Debug, Clone, clap::Args)]
pub(crate) struct RunArg {
    /// Generate new data even if the input file exists
    #[arg(long)]
    generate: bool,
    /// Long-format data CSV, read or generated [default: output/crp_raw_data.csv]
    #[arg(long)]
    input_file: Option<PathBuf>,
    #[clap(flatten)]
    pub(super) generator: GeneratorArg,
    /// Markdown report path; figures are saved next to it [default: output/crp_analysis_results.md]
    #[arg(long)]
    output_md: Option<PathBuf>,
    /// Wide-format CSV path [default: output/crp_data_wide.csv]
    #[arg(long)]
    output_wide: Option<PathBuf>,
    /// JSON file with `generator` and `analysis` settings; flags override it
    #[arg(long)]
    config: Option<PathBuf>,
    /// Skip rendering the PNG figures
    #[arg(long)]
    no_figures: bool,
    /// Also dump all results as JSON (`-` for stdout)
    #[arg(long)]
    results_json: Option<PathBuf>,
}

pub(crate) fn run(arg: &RunArg) -> anyhow::Result<()> {
    let mut config = match &arg.config {
        Some(path) => util::read_json_file::<RunConfig, _>("run config", path)?,
        None => RunConfig::default(),
    };
    arg.generator.apply(&mut config.generator);
    if arg.no_figures {
        config.analysis.render_figures = false;
    }
    config
        .generator
        .validate()
        .context("Invalid generator configuration")?;

    let input = arg
        .input_file
        .clone()
        .unwrap_or_else(|| default_path(DEFAULT_RAW_DATA_FILE));
    let report_path = arg
        .output_md
        .clone()
        .unwrap_or_else(|| default_path(DEFAULT_REPORT_FILE));
    let wide_path = arg
        .output_wide
        .clone()
        .unwrap_or_else(|| default_path(DEFAULT_WIDE_FILE));

    if arg.generate {
        tracing::info!(day_effects = %config.generator.day_effects, "generating data");
        util::generate_to_file(&config.generator, &input, None)?;
    } else if !input.exists() {
        tracing::info!(
            path = %input.display(),
            "input file not found, generating data first"
        );
        util::generate_to_file(&config.generator, &input, None)?;
    }

    let table = util::read_table_file(&input, &config.analysis.value_column)?;
    analyze::analyze_table(
        table,
        &config.analysis,
        &report_path,
        &wide_path,
        arg.results_json.as_deref(),
    )
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;

    fn arg(dir: &std::path::Path) -> RunArg {
        RunArg {
            input_file: Some(dir.join("raw.csv")),
            output_md: Some(dir.join("report").join("results.md")),
            output_wide: Some(dir.join("wide.csv")),
            no_figures: true,
            generator: GeneratorArg {
                seed: Some(42),
                ..GeneratorArg::default()
            },
            ..RunArg::default()
        }
    }

    #[test]
    fn test_run_generates_missing_input() {
        let dir = tempfile::tempdir().unwrap();
        run(&arg(dir.path())).unwrap();

        let raw = fs::read_to_string(dir.path().join("raw.csv")).unwrap();
        assert_eq!(raw.lines().count(), 321);
        let report = fs::read_to_string(dir.path().join("report").join("results.md")).unwrap();
        assert!(report.contains("- Rows: 320"));
        assert!(dir.path().join("wide.csv").exists());
    }

    #[test]
    fn test_run_reuses_existing_input() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("raw.csv"),
            "patient_id,group,day,crp\n1,treated,0,5\n1,treated,1,150\n2,control,0,4\n2,control,1,160\n",
        )
        .unwrap();
        run(&arg(dir.path())).unwrap();
        let report = fs::read_to_string(dir.path().join("report").join("results.md")).unwrap();
        assert!(report.contains("- Rows: 4"));
    }

    #[test]
    fn test_config_file_and_flags() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join("config.json");
        fs::write(
            &config_path,
            r#"{"generator": {"patients_per_group": 4, "days": 5, "seed": 1}, "analysis": {"threshold": 80.0}}"#,
        )
        .unwrap();
        let arg = RunArg {
            generate: true,
            config: Some(config_path),
            ..arg(dir.path())
        };
        run(&arg).unwrap();

        // the seed flag overrides the file, the size comes from the file
        let raw = fs::read_to_string(dir.path().join("raw.csv")).unwrap();
        assert_eq!(raw.lines().count(), 1 + 8 * 6);
        let report = fs::read_to_string(dir.path().join("report").join("results.md")).unwrap();
        assert!(report.contains("first day below 80 after having reached it"));
    }

    #[test]
    fn test_invalid_config_fails_before_io() {
        let dir = tempfile::tempdir().unwrap();
        let arg = RunArg {
            generator: GeneratorArg {
                days: Some(2),
                ..GeneratorArg::default()
            },
            ..arg(dir.path())
        };
        let err = run(&arg).unwrap_err();
        assert!(err.to_string().contains("Invalid generator configuration"));
        assert!(!dir.path().join("raw.csv").exists());
    }
}
