use std::path::PathBuf;

use clap::{Parser, Subcommand};
use crptrial_generator::{config::GeneratorConfig, effects::DayEffects};

use self::{analyze::AnalyzeArg, generate::GenerateArg, run::RunArg};
use crate::util;

mod analyze;
mod generate;
mod run;

const DEFAULT_OUTPUT_DIR: &str = "output";
const DEFAULT_RAW_DATA_FILE: &str = "crp_raw_data.csv";
const DEFAULT_REPORT_FILE: &str = "crp_analysis_results.md";
const DEFAULT_WIDE_FILE: &str = "crp_data_wide.csv";

fn default_path(file_name: &str) -> PathBuf {
    PathBuf::from(DEFAULT_OUTPUT_DIR).join(file_name)
}

#[derive(Debug, Clone, Parser)]
#[command(author, version, about, long_about = None)]
pub struct CommandArgs {
    /// Log debug details (`RUST_LOG` takes precedence)
    #[arg(short, long, global = true)]
    verbose: bool,
    /// What to do; defaults to `run`
    #[command(subcommand)]
    mode: Option<Mode>,
}

#[derive(Debug, Clone, Subcommand)]
enum Mode {
    /// Generate a synthetic dataset
    Generate(#[clap(flatten)] GenerateArg),
    /// Analyze an existing dataset
    Analyze(#[clap(flatten)] AnalyzeArg),
    /// Generate (if requested or missing) and analyze
    Run(#[clap(flatten)] RunArg),
}

/// Generator options shared by `generate` and `run`; unset options keep
/// the configured value.
#[derive(Default, Debug, Clone, clap::Args)]
struct GeneratorArg {
    /// Number of patients in each group
    #[arg(long)]
    patients_per_group: Option<usize>,
    /// Last follow-up day
    #[arg(long)]
    days: Option<u32>,
    /// Extra reduction of treated values per day, e.g. `{5: 50, 3: 15}`; `{}` for none
    #[arg(long)]
    day_effects: Option<DayEffects>,
    /// Random seed
    #[arg(long)]
    seed: Option<u64>,
}

impl GeneratorArg {
    fn apply(&self, config: &mut GeneratorConfig) {
        if let Some(n) = self.patients_per_group {
            config.patients_per_group = n;
        }
        if let Some(days) = self.days {
            config.days = days;
        }
        if let Some(effects) = &self.day_effects {
            config.day_effects = effects.clone();
        }
        if self.seed.is_some() {
            config.seed = self.seed;
        }
    }
}

pub fn run() -> anyhow::Result<()> {
    let args = CommandArgs::parse();
    util::init_tracing(args.verbose);
    match args.mode.unwrap_or(Mode::Run(RunArg::default())) {
        Mode::Generate(arg) => generate::run(&arg)?,
        Mode::Analyze(arg) => analyze::run(&arg)?,
        Mode::Run(arg) => run::run(&arg)?,
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory as _;

    use super::*;

    #[test]
    fn test_command_definition() {
        CommandArgs::command().debug_assert();
    }

    #[test]
    fn test_parse_run_flags() {
        let args = CommandArgs::try_parse_from([
            "crptrial",
            "-v",
            "run",
            "--generate",
            "--day-effects",
            "{5: 50, 3: 15}",
            "--seed",
            "7",
        ])
        .unwrap();
        assert!(args.verbose);
        let Some(Mode::Run(arg)) = args.mode else {
            panic!("expected run");
        };
        let mut config = GeneratorConfig::default();
        arg.generator.apply(&mut config);
        assert_eq!(config.seed, Some(7));
        assert_eq!(config.day_effects.get(3), Some(15.0));
        assert_eq!(config.patients_per_group, 20);
    }

    #[test]
    fn test_parse_rejects_bad_effects() {
        let result = CommandArgs::try_parse_from(["crptrial", "generate", "--day-effects", "{5 50}"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_empty_effects_mean_none() {
        let args =
            CommandArgs::try_parse_from(["crptrial", "generate", "--day-effects", "{}"]).unwrap();
        let Some(Mode::Generate(arg)) = args.mode else {
            panic!("expected generate");
        };
        let mut config = GeneratorConfig::default();
        arg.generator.apply(&mut config);
        assert!(config.day_effects.is_empty());
    }
}
